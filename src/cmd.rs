// User-defined commands are the [new ...] extension point of the language: a
// command couples a name with up to three typed operands and a template string
// that is pasted into the output at every call site, with single-letter
// placeholders standing in for the operands. This module only holds the
// registry; operand checking happens in the parser and placeholder substitution
// in the code generator. Commands live in a hash-keyed symbol tree like every
// other named entity, and redeclaring a name simply replaces the old template,
// so a program can shadow an imported command with a local variant.

//! Registry of user-defined commands.

use log::debug;

use crate::core::{hash, SymTree};
use crate::lexer::TokId;

/// Most operands a command can declare.
pub const CMD_MAX_ARGS: usize = 3;

/// Operand class of a command argument.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ArgKind {
    Register,
    Immediate,
    Procedure,
    Str,
}

impl ArgKind {
    /// Maps a declaration type letter to its class, case-insensitively.
    pub fn from_letter(c: char) -> Option<ArgKind> {
        match c.to_ascii_lowercase() {
            'r' => Some(ArgKind::Register),
            'i' => Some(ArgKind::Immediate),
            'p' => Some(ArgKind::Procedure),
            's' => Some(ArgKind::Str),
            _ => None,
        }
    }
}

/// One declared operand: the placeholder letter and its class.
///
/// The letter is stored lowercased; template matching is case-insensitive and
/// the case used in the template decides get versus set for registers.
#[derive(Clone, Copy, Debug)]
pub struct CmdArg {
    pub name: u8,
    pub kind: ArgKind,
}

/// A command definition. `body` is the first string token of the template run.
#[derive(Clone, Debug)]
pub struct Command {
    pub name: String,
    pub args: Vec<CmdArg>,
    pub body: TokId,
}

/// All commands known to a compilation.
pub struct Commands {
    tree: SymTree<Command>,
}

impl Commands {
    pub fn new() -> Self {
        Commands {
            tree: SymTree::new(),
        }
    }

    /// Registers `cmd`, replacing any previous definition of the same name.
    /// Returns `true` when an old definition was replaced.
    pub fn define(&mut self, cmd: Command) -> bool {
        debug!("command '{}' takes {} operands", cmd.name, cmd.args.len());
        let key = hash::symbol(&cmd.name);
        if let Some(slot) = self.tree.find_mut(key) {
            *slot = cmd;
            true
        } else {
            self.tree.insert(key, cmd);
            false
        }
    }

    pub fn find(&self, name: &str) -> Option<&Command> {
        self.tree.find(hash::symbol(name))
    }
}

impl Default for Commands {
    fn default() -> Self {
        Commands::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(name: &str, body: TokId) -> Command {
        Command {
            name: name.to_string(),
            args: vec![
                CmdArg {
                    name: b'x',
                    kind: ArgKind::Register,
                },
                CmdArg {
                    name: b'y',
                    kind: ArgKind::Immediate,
                },
            ],
            body,
        }
    }

    #[test]
    fn test_define_and_find() {
        let mut cmds = Commands::new();
        assert!(!cmds.define(cmd("add", 0)));

        let found = cmds.find("add").unwrap();
        assert_eq!(found.name, "add");
        assert_eq!(found.args.len(), 2);
        assert_eq!(found.args[0].kind, ArgKind::Register);
        assert!(cmds.find("sub").is_none());
    }

    #[test]
    fn test_redefine_replaces() {
        let mut cmds = Commands::new();
        cmds.define(cmd("add", 3));
        assert!(cmds.define(cmd("add", 9)));
        assert_eq!(cmds.find("add").unwrap().body, 9);
    }

    #[test]
    fn test_arg_kind_letters() {
        assert_eq!(ArgKind::from_letter('r'), Some(ArgKind::Register));
        assert_eq!(ArgKind::from_letter('I'), Some(ArgKind::Immediate));
        assert_eq!(ArgKind::from_letter('p'), Some(ArgKind::Procedure));
        assert_eq!(ArgKind::from_letter('S'), Some(ArgKind::Str));
        assert_eq!(ArgKind::from_letter('q'), None);
    }
}
