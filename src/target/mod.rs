// A target turns the instruction list into final code. Every backend gets the
// same three entry points: a prologue, one call per instruction, and an
// epilogue. Compile returns the instruction the main loop should continue
// from, which lets a backend consume more than one instruction at a time, as
// the inline conditional does. Output goes through an Emitter that counts the
// bytes written, because the pretty annotations align their comment column on
// the width of the code already emitted for the statement.

//! Code generation backends.

pub mod ases;

use std::io::{self, Write};

use crate::session::{InstId, Session};

/// Byte-counting wrapper around the output stream.
pub struct Emitter<'a> {
    out: &'a mut dyn Write,
    written: u64,
}

impl<'a> Emitter<'a> {
    pub fn new(out: &'a mut dyn Write) -> Self {
        Emitter { out, written: 0 }
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl Write for Emitter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.out.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// One code generation backend.
pub trait Target {
    /// Writes the file prologue.
    fn start(&self, out: &mut Emitter<'_>, sess: &Session) -> io::Result<()>;

    /// Compiles one instruction and returns the instruction to continue
    /// after, normally `inst` itself.
    fn compile(&self, out: &mut Emitter<'_>, sess: &mut Session, inst: InstId)
        -> io::Result<InstId>;

    /// Writes the file epilogue.
    fn end(&self, out: &mut Emitter<'_>, sess: &Session) -> io::Result<()>;
}

/// Looks a backend up by its command-line name.
pub fn by_name(name: &str) -> Option<&'static dyn Target> {
    match name {
        "ases" => Some(&ases::Ases),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emitter_counts_bytes() {
        let mut buf = Vec::new();
        let mut out = Emitter::new(&mut buf);
        out.write_all(b"abc").unwrap();
        assert_eq!(out.written(), 3);
        out.write_all(b"de").unwrap();
        assert_eq!(out.written(), 5);
        drop(out);
        assert_eq!(buf, b"abcde");
    }

    #[test]
    fn test_target_lookup() {
        assert!(by_name("ases").is_some());
        assert!(by_name("x86").is_none());
    }
}
