// Modules are imported by bare name; the file behind "name" is "name.lia"
// looked up first in every directory given with -I, in order, then in the
// user's ~/.lia collection, with the working directory as the final
// fallback. The first existing file wins.

//! Search-path lookup for imported modules.

use std::env;
use std::path::PathBuf;

/// Resolves a module name to the path of its `.lia` file, or `None` when no
/// candidate exists.
pub fn resolve(paths: &[PathBuf], name: &str) -> Option<PathBuf> {
    let file = format!("{}.lia", name);

    for dir in paths {
        let candidate = dir.join(&file);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    if let Ok(home) = env::var("HOME") {
        let candidate = PathBuf::from(home).join(".lia").join(&file);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    let candidate = PathBuf::from(file);
    if candidate.is_file() {
        return Some(candidate);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_resolve_prefers_search_dirs() {
        let dir = env::temp_dir().join("lia-paths-test");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("answers.lia"), "push ra\n").unwrap();

        let found = resolve(&[dir.clone()], "answers").unwrap();
        assert_eq!(found, dir.join("answers.lia"));
    }

    #[test]
    fn test_resolve_misses_unknown_module() {
        let dir = env::temp_dir().join("lia-paths-test-empty");
        fs::create_dir_all(&dir).unwrap();
        assert!(resolve(&[dir], "no-module-under-this-name").is_none());
        assert!(resolve(&[], "no-module-under-this-name").is_none());
    }
}
