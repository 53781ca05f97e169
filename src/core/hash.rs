// This module implements the djb2 string hash used for every symbol lookup in the
// compiler. Commands, procedures, macros, imported files and per-call macro capture
// tables are all keyed by the 64-bit djb2 hash of their name, never by the name
// itself: two distinct names that collide are treated as the same symbol. That is a
// documented property of the language implementation rather than an accident, and
// the wide hash keeps the collision probability negligible for realistic programs.
// The function is deliberately tiny and allocation-free so callers can hash on
// every lookup instead of caching keys.

//! djb2 string hashing for symbol identity.

/// Seed value of the djb2 algorithm.
pub const INITIAL_HASH: u64 = 5381;

/// Hashes a symbol name with djb2: `h = h * 33 + byte`, seeded with 5381.
///
/// All registries key their entries by this value alone, so `symbol(a) ==
/// symbol(b)` makes `a` and `b` the same symbol even when the spellings differ.
pub fn symbol(text: &str) -> u64 {
    let mut hash = INITIAL_HASH;
    for &byte in text.as_bytes() {
        hash = (hash << 5).wrapping_add(hash).wrapping_add(u64::from(byte));
    }
    hash
}
