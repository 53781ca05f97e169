// This module provides the generic hash-keyed binary search tree backing all four
// registries of the compiler (commands, procedures, macros, imported files) as well
// as the throwaway capture tables built for each macro call. Nodes live in a flat
// Vec and reference each other through u32 indices, so the tree never reallocates
// individual nodes and lookups need no unsafe code. The tree is unbalanced on
// purpose: registry sizes are tiny (dozens of entries) and insertion order in real
// programs is effectively random through the hash. Insertion reports an existing
// key instead of replacing it, which is how the import registry doubles as an
// include guard; callers that want replace-on-redeclare semantics go through
// find_mut first. There is no removal: registries only grow during a compilation.

//! Hash-keyed binary search tree used by every registry.

/// An unbalanced binary search tree ordered by a 64-bit key.
///
/// Backed by a node arena; the root is always node 0 once any entry exists.
pub struct SymTree<T> {
    nodes: Vec<Node<T>>,
}

struct Node<T> {
    key: u64,
    left: Option<u32>,
    right: Option<u32>,
    value: T,
}

impl<T> SymTree<T> {
    pub fn new() -> Self {
        SymTree { nodes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Inserts `value` under `key`. Returns `None` when the key is already
    /// present; the existing entry is left untouched.
    pub fn insert(&mut self, key: u64, value: T) -> Option<u32> {
        if self.nodes.is_empty() {
            self.nodes.push(Node {
                key,
                left: None,
                right: None,
                value,
            });
            return Some(0);
        }

        let mut at = 0usize;
        loop {
            if self.nodes[at].key == key {
                return None;
            }

            let branch = if key > self.nodes[at].key {
                self.nodes[at].right
            } else {
                self.nodes[at].left
            };

            match branch {
                Some(next) => at = next as usize,
                None => {
                    let id = self.nodes.len() as u32;
                    self.nodes.push(Node {
                        key,
                        left: None,
                        right: None,
                        value,
                    });
                    if key > self.nodes[at].key {
                        self.nodes[at].right = Some(id);
                    } else {
                        self.nodes[at].left = Some(id);
                    }
                    return Some(id);
                }
            }
        }
    }

    pub fn find(&self, key: u64) -> Option<&T> {
        let mut at = self.locate(key)?;
        loop {
            let node = &self.nodes[at];
            if node.key == key {
                return Some(&node.value);
            }
            at = self.step(node, key)? as usize;
        }
    }

    pub fn find_mut(&mut self, key: u64) -> Option<&mut T> {
        let mut at = self.locate(key)?;
        loop {
            if self.nodes[at].key == key {
                return Some(&mut self.nodes[at].value);
            }
            at = self.step(&self.nodes[at], key)? as usize;
        }
    }

    pub fn contains(&self, key: u64) -> bool {
        self.find(key).is_some()
    }

    /// In-order traversal over all values, ascending by key.
    pub fn for_each(&self, mut visit: impl FnMut(&T)) {
        if !self.nodes.is_empty() {
            self.walk(0, &mut visit);
        }
    }

    fn walk(&self, at: usize, visit: &mut impl FnMut(&T)) {
        let node = &self.nodes[at];
        if let Some(left) = node.left {
            self.walk(left as usize, visit);
        }
        visit(&node.value);
        if let Some(right) = node.right {
            self.walk(right as usize, visit);
        }
    }

    fn locate(&self, _key: u64) -> Option<usize> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(0)
        }
    }

    fn step(&self, node: &Node<T>, key: u64) -> Option<u32> {
        if key > node.key {
            node.right
        } else {
            node.left
        }
    }
}

impl<T> Default for SymTree<T> {
    fn default() -> Self {
        SymTree::new()
    }
}
