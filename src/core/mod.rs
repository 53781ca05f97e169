// This module collects the infrastructure every other part of the compiler leans
// on: the djb2 hash that defines symbol identity, the generic hash-keyed binary
// search tree behind the command/procedure/macro/import registries, and the error
// types plus the diagnostic reporter. Nothing in here knows about the source
// language or the target encoding; the pieces are deliberately small so the
// registries built on top of them stay thin wrappers. All collection types use
// flat Vec storage with u32 index links rather than boxed nodes, which keeps
// splicing and traversal free of ownership gymnastics.

//! Shared infrastructure: hashing, symbol trees, errors.

pub mod error;
pub mod hash;
pub mod symtree;

pub use error::{report, DriverError, LexError};
pub use hash::symbol;
pub use symtree::SymTree;
