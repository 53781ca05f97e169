// The two phase drivers tying everything together. Processing a file means
// registering it, tokenizing its whole source and running the parser over the
// token chain; imports re-enter here recursively, and the registry makes a
// file that shows up twice a no-op instead of a loop. Code generation then
// runs over the finished instruction list in two passes: the first compiles
// every procedure block and splices it out of the list, so procedure bodies
// land right after the prologue where the reserved address slots expect them,
// and the second compiles whatever remained in order. A procedure or block
// left open at the end of the list is reported here, since no instruction
// remains that could close it.

//! Source processing and code generation drivers.

use std::io;

use log::debug;

use crate::core::report;
use crate::lexer;
use crate::parser;
use crate::session::{InstId, InstKind, Session};
use crate::target::{Emitter, Target};

/// Runs a source file through the lexer and parser, extending the session's
/// instruction list. Files already seen are skipped.
pub fn process(sess: &mut Session, name: &str, source: &str) {
    let Some(file) = sess.register_file(name) else {
        return;
    };
    debug!("processing {}", name);

    match lexer::tokenize(&mut sess.toks, source) {
        Ok(head) => {
            sess.files[file as usize].head = Some(head);
            parser::parse(sess, file);
        }
        Err(err) => {
            let (line, column) = err.position();
            report(name, line, column, &err.to_string());
            sess.errcount += 1;
        }
    }
}

/// Compiles the session's instruction list to final code and returns the
/// total error count. Nothing is written when the list is empty.
pub fn generate(
    sess: &mut Session,
    target: &dyn Target,
    out: &mut Emitter<'_>,
) -> io::Result<u32> {
    if sess.inst_head.is_none() {
        return Ok(sess.errcount);
    }
    debug!("generating code");

    target.start(out, sess)?;

    // First pass: compile each procedure block where it stands and unlink it,
    // leaving only top-level instructions for the second pass.
    let mut last: Option<InstId> = None;
    let mut cur = sess.inst_head;
    while let Some(this) = cur {
        if sess.insts[this].kind != InstKind::Proc {
            last = Some(this);
            cur = sess.insts[this].next;
            continue;
        }

        let mut p = this;
        let mut ran_off = false;
        while sess.insts[p].kind != InstKind::EndProc {
            let ret = target.compile(out, sess, p)?;
            match sess.insts[ret].next {
                Some(n) => p = n,
                None => {
                    ran_off = true;
                    break;
                }
            }
        }
        if !ran_off {
            target.compile(out, sess, p)?;
        }

        // A directly following procedure joins this splice.
        let next = sess.insts[p].next;
        let another = matches!(next, Some(n) if sess.insts[n].kind == InstKind::Proc);
        if !another {
            match last {
                None => sess.inst_head = next,
                Some(l) => sess.insts[l].next = next,
            }
        }
        sess.insts[p].next = None;
        cur = next;
    }

    let mut cur = sess.inst_head;
    while let Some(this) = cur {
        let ret = target.compile(out, sess, this)?;
        cur = sess.insts[ret].next;
    }

    if let Some(open) = sess.open_proc.take() {
        let child = sess.insts[open.inst].child;
        let file = sess.insts[open.inst].file;
        let name = match sess.toks[child].next {
            Some(n) => sess.toks[n].text.clone(),
            None => String::new(),
        };
        let (line, column) = (sess.toks[child].line, sess.toks[child].column);
        let msg = format!("Unexpected end-of-file inside procedure '{}'.", name);
        sess.diag(file, line, column, &msg);
        sess.errcount += 1;
    }

    while let Some(ctx) = sess.ctx.pop() {
        let child = sess.insts[ctx.opener].child;
        let file = sess.insts[ctx.opener].file;
        let (line, column) = (sess.toks[child].line, sess.toks[child].column);
        let msg = format!(
            "`{}' is a block, expects `endif' to close it.",
            sess.toks[child].text
        );
        sess.diag(file, line, column, &msg);
        sess.errcount += 1;
    }

    target.end(out, sess)?;
    Ok(sess.errcount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target;

    fn compile(src: &str) -> (String, u32) {
        let mut sess = Session::new();
        process(&mut sess, "test.lia", src);
        let target = target::by_name("ases").unwrap();

        let mut buf = Vec::new();
        let mut out = Emitter::new(&mut buf);
        let errs = generate(&mut sess, target, &mut out).unwrap();
        drop(out);
        (String::from_utf8(buf).unwrap(), errs)
    }

    fn header() -> String {
        format!("#!/usr/bin/env ases\n# Lia v{}\n\n>>", env!("CARGO_PKG_VERSION"))
    }

    #[test]
    fn test_empty_session_writes_nothing() {
        let (code, errs) = compile("");
        assert_eq!(errs, 0);
        assert_eq!(code, "");
    }

    #[test]
    fn test_output_framing() {
        let (code, errs) = compile("load ra\n");
        assert_eq!(errs, 0);
        assert_eq!(code, format!("{}=a.3\n", header()));
    }

    #[test]
    fn test_procedures_compile_first() {
        let (code, errs) = compile("load ra\nproc f\nendproc\ncall f\n");
        assert_eq!(errs, 0);
        // The procedure body lands right after the prologue, the rest keeps
        // its order.
        assert_eq!(
            code,
            format!("{}$(<=6+++d.*@L+!>=aPd.pD!$D!>>>=d.p=p*.3\n", header())
        );
    }

    #[test]
    fn test_consecutive_procedures_spliced_together() {
        let (code, errs) = compile("load ra\nproc f\nendproc\nproc g\nendproc\n");
        assert_eq!(errs, 0);
        assert_eq!(
            code,
            format!("{}$(<=6+++d.*@L+!>$(<=6++++d.*@L+!>=a.3\n", header())
        );
    }

    #[test]
    fn test_unclosed_procedure_reported() {
        let (code, errs) = compile("proc f\nload ra\n");
        assert_eq!(errs, 1);
        // The body still compiles, the epilogue is still written.
        assert_eq!(code, format!("{}$(=a.3\n", header()));
    }

    #[test]
    fn test_unclosed_if_block_reported() {
        let (code, errs) = compile("ifz\nload ra\n");
        assert_eq!(errs, 1);
        assert_eq!(code, format!("{}~(=a.3\n", header()));
    }

    #[test]
    fn test_lex_failure_counts_once() {
        let mut sess = Session::new();
        process(&mut sess, "bad.lia", "say \"never closed\n");
        assert_eq!(sess.errcount, 1);
        assert!(sess.files[0].head.is_none());
    }

    #[test]
    fn test_file_processed_once() {
        let mut sess = Session::new();
        process(&mut sess, "twice.lia", "load ra\n");
        process(&mut sess, "twice.lia", "load rb\n");
        assert_eq!(sess.files.len(), 1);

        let mut count = 0;
        let mut cur = sess.inst_head;
        while let Some(i) = cur {
            count += 1;
            cur = sess.insts[i].next;
        }
        assert_eq!(count, 1);
    }
}
