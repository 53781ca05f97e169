// Procedures compile to fixed slots in the target's memory tape, reached by
// emitting one '>' per slot index, so every procedure needs a small stable
// integer address. The first two slots are reserved by the runtime prologue,
// which is why numbering starts at 2. Indexes are handed out in first-sight
// order: a command template that takes a procedure operand may mention a name
// before its declaration, and that mention already fixes the address the later
// declaration will get. The registry is per-compilation state, so compiling
// twice in one process yields identical addresses.

//! Procedure registry and address assignment.

use crate::core::{hash, SymTree};

/// First address available to user procedures.
pub const PROC_BASE: u32 = 2;

/// All procedures seen so far, keyed by name hash.
pub struct Procs {
    tree: SymTree<u32>,
    next: u32,
}

impl Procs {
    pub fn new() -> Self {
        Procs {
            tree: SymTree::new(),
            next: PROC_BASE,
        }
    }

    /// Returns the address of `name`, assigning the next free one on first
    /// sight.
    pub fn index_of(&mut self, name: &str) -> u32 {
        let key = hash::symbol(name);
        if let Some(&index) = self.tree.find(key) {
            return index;
        }
        let index = self.next;
        self.next += 1;
        self.tree.insert(key, index);
        index
    }

    /// Address of `name` if it is already known.
    pub fn find(&self, name: &str) -> Option<u32> {
        self.tree.find(hash::symbol(name)).copied()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

impl Default for Procs {
    fn default() -> Self {
        Procs::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_addresses() {
        let mut procs = Procs::new();
        assert_eq!(procs.index_of("main"), 2);
        assert_eq!(procs.index_of("helper"), 3);
        assert_eq!(procs.index_of("exit"), 4);
    }

    #[test]
    fn test_index_is_stable() {
        let mut procs = Procs::new();
        let first = procs.index_of("main");
        procs.index_of("other");
        assert_eq!(procs.index_of("main"), first);
        assert_eq!(procs.len(), 2);
    }

    #[test]
    fn test_find_does_not_register() {
        let mut procs = Procs::new();
        assert_eq!(procs.find("main"), None);
        assert!(procs.is_empty());
        procs.index_of("main");
        assert_eq!(procs.find("main"), Some(2));
    }
}
