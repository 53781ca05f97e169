// This module defines the error types of the compiler using the thiserror crate,
// plus the single diagnostic reporter every phase goes through. Lexical failures
// are the only errors modeled as a Result type (LexError): they abort the current
// file outright, so the lexer returns early and the driver decides what to do.
// Every other error (syntax, semantic, codegen) is a recoverable diagnostic: the
// detecting code prints it through `report` and the error counter in the program
// state is incremented by whoever handles the failure, which lets one run surface
// many independent errors. DriverError covers the process-level failures of the
// command-line front end (missing input, unwritable output, repeated stdin). The
// diagnostic format is stable and colorized on unix terminals.

//! Error types and the diagnostic reporter.

use thiserror::Error;

/// A fatal lexical error. Aborts tokenization of the offending file.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LexError {
    #[error("'\\{escape}' is not a valid escape character")]
    InvalidEscape { escape: char, line: u32, column: u32 },

    #[error("'{ch}' is not a valid character")]
    InvalidChar { ch: char, line: u32, column: u32 },

    #[error("Literal character should have one byte of length")]
    CharTooLong { line: u32, column: u32 },

    #[error("Maximum size of a string is {max} characters")]
    StringTooLong { max: usize, line: u32, column: u32 },

    #[error("Unexpected break of line inside a string")]
    StringLineBreak { line: u32, column: u32 },

    #[error("Invalid character 0x{ch:02x} ('{symbol}') inside a string")]
    StringBadChar {
        ch: u8,
        symbol: char,
        line: u32,
        column: u32,
    },

    #[error("Unexpected end-of-file inside a string")]
    UnterminatedString { line: u32, column: u32 },

    #[error("Maximum size of a token is {max} characters")]
    TokenTooLong { max: usize, line: u32, column: u32 },

    #[error("Invalid literal number '{text}'")]
    BadNumber { text: String, line: u32, column: u32 },

    #[error("Literal number should be between 0 and 255, instead: {value}")]
    NumberRange { value: u64, line: u32, column: u32 },

    #[error("Unexpected character '{ch}'")]
    Unexpected { ch: char, line: u32, column: u32 },
}

impl LexError {
    /// Source position the error should be attributed to.
    pub fn position(&self) -> (u32, u32) {
        match *self {
            LexError::InvalidEscape { line, column, .. }
            | LexError::InvalidChar { line, column, .. }
            | LexError::CharTooLong { line, column }
            | LexError::StringTooLong { line, column, .. }
            | LexError::StringLineBreak { line, column }
            | LexError::StringBadChar { line, column, .. }
            | LexError::UnterminatedString { line, column }
            | LexError::TokenTooLong { line, column, .. }
            | LexError::BadNumber { line, column, .. }
            | LexError::NumberRange { line, column, .. }
            | LexError::Unexpected { line, column, .. } => (line, column),
        }
    }
}

/// Process-level failures of the command-line driver.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Input file from stdin can't be repeated!")]
    StdinRepeated,

    #[error("File '{0}' not found.")]
    InputNotFound(String),

    #[error("The file '{0}' could not be opened for writing.")]
    OutputUnwritable(String),

    #[error("Unknown target '{0}'.")]
    UnknownTarget(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Prints one diagnostic to stderr in the fixed `file: error at line:col>` form.
///
/// Reporting and counting are separate on purpose: the code that detects a
/// problem calls this, and the code that recovers from it bumps the error
/// counter, so resynchronization never double-counts.
pub fn report(filename: &str, line: u32, column: u32, msg: &str) {
    #[cfg(unix)]
    eprintln!("\x1b[37;1m{filename}: \x1b[31;1merror\x1b[0m at {line}:{column}> {msg}");
    #[cfg(not(unix))]
    eprintln!("{filename}: error at {line}:{column}> {msg}");
}
