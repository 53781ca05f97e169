//! Lia - An assembly-like language compiled to Ases code.
//!
//! Lia translates a small fixed instruction set, user-defined commands and
//! pattern macros into the one-character opcodes of the esoteric Ases
//! machine. Sources run through a lexer and a parser into a flat instruction
//! list; a target backend then lowers that list to the final code, hoisting
//! procedure bodies to the front where the reserved address slots expect
//! them.
//!
//! # Primary Usage
//!
//! ```ignore
//! use lia::{Emitter, Session};
//!
//! let mut sess = Session::new();
//! lia::compiler::process(&mut sess, "hello.lia", &source);
//!
//! let target = lia::target::by_name("ases").unwrap();
//! let mut out = Emitter::new(&mut output);
//! let errors = lia::compiler::generate(&mut sess, target, &mut out)?;
//! ```
//!
//! # Architecture
//!
//! - [`lexer`] - Scanner building the doubly linked token chain
//! - [`parser`] - Statement dispatch, keywords and bracket meta-keywords
//! - [`macros`] - Pattern macros and their expansion
//! - [`cmd`] - User-defined command declarations
//! - [`target`] - Code generation backends
//! - [`core`] - Shared infrastructure (errors, hashing, symbol trees)

// Language front end
pub mod cmd;
pub mod lexer;
pub mod macros;
pub mod parser;
pub mod procs;
pub mod session;

// Compilation back end
pub mod compiler;
pub mod target;

// Shared infrastructure
pub mod core;
pub mod paths;

// Re-export the types every embedder touches.
pub use crate::core::{report, DriverError, LexError};
pub use crate::session::Session;
pub use crate::target::{Emitter, Target};
