// Ases programs are strings of one-character opcodes working on an
// accumulator, a data pointer and a handful of registers, so everything here
// reduces to emitting the cheapest run of unit steps. Magnitudes use
// advance-by-ten opcodes with an overshoot-and-correct tail, which keeps any
// unit run at five steps or fewer. Strings ride on that: the encoder carries
// the previous character and writes only the delta, ascending with `6`/`+`
// and descending with `7`/`-`, each character closed by the repeat opcode
// `1`. Procedures are address slots counted from 2; a call is a fixed
// prologue, one `>` per slot, and a fixed epilogue, and a return rewinds the
// data pointer over that call frame. Conditionals wrap their body in
// `~(`/`?(` .. `@`. Register names shrink to one letter, lowercase to set,
// uppercase to get; the stack selector `ss` has no opcode at all.

//! The Ases backend.

use std::io::{self, Write};

use log::trace;

use crate::cmd::{ArgKind, Command, CMD_MAX_ARGS};
use crate::core::report;
use crate::lexer::{is_register, resolve_escape, TokenArena, TokenKind, TokId};
use crate::procs::{Procs, PROC_BASE};
use crate::session::{Ctx, InstId, InstKind, OpenProc, Session};
use crate::target::{Emitter, Target};

const CALL_ENTER: &[u8] = b"Pd.pD!$D!>";
const CALL_LEAVE: &[u8] = b"=d.p=p*";

// Opcodes a call executes after `$`, paid back when returning.
const CALL_OVERHEAD: u32 = 11;

// Column the pretty comments align to.
const NOTE_COLUMN: i64 = 40;

/// One classified operand, pulled from an instruction's token chain.
enum Operand {
    None,
    Imm(u8),
    Reg(String),
    Name(String),
    Str(TokId),
}

/// The Ases code generator.
pub struct Ases;

impl Target for Ases {
    fn start(&self, out: &mut Emitter<'_>, sess: &Session) -> io::Result<()> {
        write!(
            out,
            "#!/usr/bin/env ases\n# Lia v{}\n\n",
            env!("CARGO_PKG_VERSION")
        )?;

        // Reserve the procedure slots at the bottom of the memory.
        for _ in 0..PROC_BASE {
            out.write_all(b">")?;
        }

        if sess.pretty {
            out.write_all(b"\n\n")?;
        }
        Ok(())
    }

    fn end(&self, out: &mut Emitter<'_>, _sess: &Session) -> io::Result<()> {
        out.write_all(b".3\n")
    }

    fn compile(
        &self,
        out: &mut Emitter<'_>,
        sess: &mut Session,
        inst: InstId,
    ) -> io::Result<InstId> {
        let child = sess.insts[inst].child;
        let file = sess.insts[inst].file;
        let kind = sess.insts[inst].kind;
        let mut ret = inst;
        trace!("compiling {:?} from line {}", kind, sess.toks[child].line);

        let operands = collect_operands(sess, inst);
        let lastpos = out.written();

        match kind {
            InstKind::Cmd => {
                let name = sess.toks[child].text.clone();
                if let Some(cmd) = sess.cmds.find(&name).cloned() {
                    let Session {
                        ref toks,
                        ref mut procs,
                        ref files,
                        ..
                    } = *sess;
                    let errors = emit_command(
                        out,
                        toks,
                        procs,
                        &files[file as usize].name,
                        &cmd,
                        &operands,
                    )?;
                    sess.errcount += errors;
                }
            }
            InstKind::Func => {
                if let Some(op) = sess.toks[child].next {
                    out.write_all(&[b'0' + sess.toks[op].value])?;
                }
            }
            InstKind::Load => {
                out.write_all(b"=")?;
                if let Operand::Reg(reg) = &operands[0] {
                    emit_register(out, reg, false)?;
                }
            }
            InstKind::Store => {
                match &operands[0] {
                    Operand::Reg(reg) => emit_register(out, reg, true)?,
                    Operand::Imm(value) => emit_immediate(out, *value)?,
                    _ => {}
                }
                out.write_all(b"!")?;
            }
            InstKind::Push => {
                match &operands[0] {
                    Operand::Reg(reg) => emit_register(out, reg, true)?,
                    Operand::Imm(value) => emit_immediate(out, *value)?,
                    _ => {}
                }
                out.write_all(b"!>")?;
            }
            InstKind::Pop => {
                out.write_all(b"<=")?;
                if let Operand::Reg(reg) = &operands[0] {
                    emit_register(out, reg, false)?;
                }
            }
            InstKind::Call => {
                if let Operand::Name(name) = &operands[0] {
                    match sess.procs.find(name) {
                        Some(index) => emit_call(out, index)?,
                        None => {
                            if let Some(op) = sess.toks[child].next {
                                let tok = &sess.toks[op];
                                let (line, column) = (tok.line, tok.column);
                                let msg =
                                    format!("Procedure '{}' not defined.", tok.text);
                                sess.diag(file, line, column, &msg);
                                sess.errcount += 1;
                            }
                        }
                    }
                }
            }
            InstKind::Ret => match &sess.open_proc {
                None => {
                    let tok = &sess.toks[child];
                    let (line, column) = (tok.line, tok.column);
                    sess.diag(
                        file,
                        line,
                        column,
                        "`ret' instruction must be used inside a procedure.",
                    );
                    sess.errcount += 1;
                }
                Some(open) => {
                    emit_return(out, open.index)?;
                    if sess.toks[child].next.is_some() {
                        match &operands[0] {
                            Operand::Reg(reg) => emit_register(out, reg, true)?,
                            Operand::Imm(value) => emit_immediate(out, *value)?,
                            _ => {}
                        }
                    }
                    out.write_all(b"*")?;
                }
            },
            InstKind::Proc => {
                if let Operand::Name(name) = &operands[0] {
                    if sess.procs.find(name).is_some() {
                        if let Some(op) = sess.toks[child].next {
                            let tok = &sess.toks[op];
                            let (line, column) = (tok.line, tok.column);
                            let msg =
                                format!("Redefinition of the '{}' procedure.", tok.text);
                            sess.diag(file, line, column, &msg);
                            sess.errcount += 1;
                        }
                    } else if sess.open_proc.is_some() {
                        let tok = &sess.toks[child];
                        let (line, column) = (tok.line, tok.column);
                        sess.diag(
                            file,
                            line,
                            column,
                            "You can't declare a procedure inside another.",
                        );
                        sess.errcount += 1;
                    } else {
                        let index = sess.procs.index_of(name);
                        sess.open_proc = Some(OpenProc { index, inst });
                        out.write_all(b"$(")?;
                    }
                }
            }
            InstKind::EndProc => match sess.open_proc.take() {
                None => {
                    let tok = &sess.toks[child];
                    let (line, column) = (tok.line, tok.column);
                    sess.diag(
                        file,
                        line,
                        column,
                        "`endproc' must be used at a procedure declaration.",
                    );
                    sess.errcount += 1;
                }
                Some(open) => {
                    emit_return(out, open.index)?;
                    out.write_all(b".*@L+!>")?;
                }
            },
            InstKind::If => {
                if sess.toks[child].text == "ifz" {
                    out.write_all(b"~(")?;
                } else {
                    out.write_all(b"?(")?;
                }

                if let Some(body) = sess.insts[inst].next {
                    // The body's own pretty comment is suppressed; it prints
                    // inside this instruction's comment instead.
                    let saved = sess.pretty;
                    sess.pretty = false;
                    ret = self.compile(out, sess, body)?;
                    sess.pretty = saved;
                }
                out.write_all(b"@")?;
            }
            InstKind::IfBlock => {
                if sess.toks[child].text == "ifz" {
                    out.write_all(b"~(")?;
                } else {
                    out.write_all(b"?(")?;
                }
                sess.ctx.push(Ctx {
                    opener: inst,
                    closer: InstKind::EndIf,
                });
            }
            InstKind::EndIf => {
                let matched =
                    matches!(sess.ctx.pop(), Some(ctx) if ctx.closer == InstKind::EndIf);
                if !matched {
                    let tok = &sess.toks[child];
                    let (line, column) = (tok.line, tok.column);
                    sess.diag(
                        file,
                        line,
                        column,
                        "`endif' used outside a if..endif block.",
                    );
                    sess.errcount += 1;
                }
                out.write_all(b"@")?;
            }
            InstKind::Say => {
                if let Some(first) = sess.toks[child].next {
                    let name = &sess.files[file as usize].name;
                    if !emit_string(out, &sess.toks, name, first)? {
                        sess.errcount += 1;
                    }
                }
            }
            InstKind::Ases => {
                let mut cur = sess.toks[child].next;
                while let Some(t) = cur {
                    if sess.toks[t].kind != TokenKind::Str {
                        break;
                    }
                    out.write_all(sess.toks[t].text.as_bytes())?;
                    cur = sess.toks.next_nonsep(t);
                }
            }
            InstKind::PrTab => {
                let tok = &sess.toks[child];
                let (line, column) = (tok.line, tok.column);
                let msg = format!(
                    "Sorry but my programmers not implemented `{}' yet!",
                    tok.text
                );
                sess.diag(file, line, column, &msg);
                sess.errcount += 1;
            }
        }

        if sess.pretty {
            let mut pad = NOTE_COLUMN - (out.written() - lastpos) as i64;
            if pad < 0 {
                pad = 2;
            }
            let line = sess.toks[child].line;
            write!(out, "{:<width$}# Line {:04}: ", ' ', line, width = pad as usize)?;

            let mut show = inst;
            if kind == InstKind::If {
                write!(out, "{} ", sess.toks[child].text)?;
                if let Some(body) = sess.insts[inst].next {
                    show = body;
                }
            }

            let mut cur = Some(sess.insts[show].child);
            while let Some(t) = cur {
                let tok = &sess.toks[t];
                match tok.kind {
                    TokenKind::CharLit => write!(out, "'{}' ", tok.text)?,
                    TokenKind::Str => write!(out, "\"{}\" ", tok.text)?,
                    _ => write!(out, "{} ", tok.text)?,
                }
                cur = tok.next;
            }

            if sess.insts[show].kind == InstKind::EndProc {
                out.write_all(b"\n")?;
            }
            out.write_all(b"\n")?;
        }

        Ok(ret)
    }
}

// Splits an instruction's operand chain into classified values; string runs
// count as one operand. A bad token is reported but leaves the slot empty, so
// the rest of the statement still compiles.
fn collect_operands(sess: &mut Session, inst: InstId) -> [Operand; CMD_MAX_ARGS] {
    let child = sess.insts[inst].child;
    let file = sess.insts[inst].file;
    let mut operands = [Operand::None, Operand::None, Operand::None];

    let mut cur = sess.toks[child].next;
    let mut i = 0;
    while let Some(t) = cur {
        if i >= CMD_MAX_ARGS {
            break;
        }
        let mut end = t;
        let tok = &sess.toks[t];
        match tok.kind {
            TokenKind::CharLit | TokenKind::Immediate => {
                operands[i] = Operand::Imm(tok.value);
            }
            TokenKind::Id if is_register(tok) => {
                operands[i] = Operand::Reg(tok.text.clone());
            }
            TokenKind::Id => {
                operands[i] = Operand::Name(tok.text.clone());
            }
            TokenKind::Str => {
                operands[i] = Operand::Str(t);
                end = sess.toks.run_end(t, TokenKind::Str);
            }
            _ => {
                let (line, column) = (tok.line, tok.column);
                let msg = format!("Unexpected token `{}' at operand {}.", tok.text, i);
                sess.diag(file, line, column, &msg);
                sess.errcount += 1;
            }
        }
        i += 1;

        // Step over the comma between operands.
        cur = match sess.toks[end].next {
            None => break,
            Some(n) => sess.toks[n].next,
        };
    }
    operands
}

// One register access. Lowercase selects the register as destination,
// uppercase as source; `ss` is the implicit stack selector with no opcode.
fn emit_register(out: &mut Emitter<'_>, reg: &str, get: bool) -> io::Result<()> {
    if reg == "ss" {
        return Ok(());
    }
    let letter = if reg == "dp" {
        b'p'
    } else {
        match reg.as_bytes() {
            [b'r', l] => *l,
            _ => return Ok(()),
        }
    };
    let opcode = if get {
        letter.to_ascii_uppercase()
    } else {
        letter
    };
    out.write_all(&[opcode])
}

// Cheapest run of steps for a magnitude: advance-by-ten opcodes, then either
// up to five unit steps or one overshoot with the needed corrections.
fn emit_magnitude(out: &mut Emitter<'_>, n: u32) -> io::Result<()> {
    for _ in 0..n / 10 {
        out.write_all(b"6")?;
    }
    let rem = n % 10;
    if rem > 5 {
        out.write_all(b"6")?;
        for _ in 0..10 - rem {
            out.write_all(b"-")?;
        }
    } else {
        for _ in 0..rem {
            out.write_all(b"+")?;
        }
    }
    Ok(())
}

// An absolute value: reset the accumulator, then count up to it.
fn emit_immediate(out: &mut Emitter<'_>, value: u8) -> io::Result<()> {
    out.write_all(b".")?;
    emit_magnitude(out, u32::from(value))
}

/// The call sequence for the procedure at `index`.
pub fn emit_call(out: &mut Emitter<'_>, index: u32) -> io::Result<()> {
    out.write_all(CALL_ENTER)?;
    for _ in 0..index {
        out.write_all(b">")?;
    }
    out.write_all(CALL_LEAVE)
}

/// Rewinds the data pointer over the call frame of the procedure at `index`,
/// without the final jump.
pub fn emit_return(out: &mut Emitter<'_>, index: u32) -> io::Result<()> {
    out.write_all(b"<=")?;
    emit_magnitude(out, CALL_OVERHEAD + index)?;
    out.write_all(b"d")
}

// Delta-encodes a run of string tokens, separators between them allowed. The
// previous character starts at 0 and survives across the tokens of the run,
// so a split text costs the same as a joined one. Escapes resolve here; a bad
// one is reported and stops the string, returning false.
fn emit_string(
    out: &mut Emitter<'_>,
    toks: &TokenArena,
    file_name: &str,
    first: TokId,
) -> io::Result<bool> {
    out.write_all(b".")?;
    let mut last: i32 = 0;

    let mut cur = first;
    loop {
        let tok = &toks[cur];
        if tok.kind != TokenKind::Str {
            break;
        }
        let bytes = tok.text.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            let ch = if bytes[i] == b'\\' {
                i += 1;
                let esc = bytes.get(i).copied().unwrap_or(0);
                match resolve_escape(esc) {
                    Some(c) => c,
                    None => {
                        let msg = format!("Invalid escape '\\{}' at string.", esc as char);
                        report(file_name, tok.line, tok.column + i as u32 + 1, &msg);
                        return Ok(false);
                    }
                }
            } else {
                bytes[i]
            };

            let diff = (last - i32::from(ch)).unsigned_abs();
            if diff == 0 {
                out.write_all(b"1")?;
                i += 1;
                continue;
            }

            let down = last > i32::from(ch);
            let ten: &[u8] = if down { b"7" } else { b"6" };
            let unit: &[u8] = if down { b"-" } else { b"+" };
            let back: &[u8] = if down { b"+" } else { b"-" };

            for _ in 0..diff / 10 {
                out.write_all(ten)?;
            }
            let rem = diff % 10;
            if rem > 5 {
                out.write_all(ten)?;
                for _ in 0..10 - rem {
                    out.write_all(back)?;
                }
            } else {
                for _ in 0..rem {
                    out.write_all(unit)?;
                }
            }
            out.write_all(b"1")?;
            last = i32::from(ch);
            i += 1;
        }

        match toks.next_of(cur) {
            None => break,
            Some(_) => match toks.next_nonsep(cur) {
                Some(n) => cur = n,
                None => break,
            },
        }
    }
    Ok(true)
}

// Expands a command's template run. Characters matching an argument name are
// replaced by the operand's access code, with the template letter's case
// picking get or set for registers; everything else passes through verbatim.
fn emit_command(
    out: &mut Emitter<'_>,
    toks: &TokenArena,
    procs: &mut Procs,
    file_name: &str,
    cmd: &Command,
    ops: &[Operand; CMD_MAX_ARGS],
) -> io::Result<u32> {
    let mut errors = 0;

    let mut cur = cmd.body;
    loop {
        let tok = &toks[cur];
        if tok.kind != TokenKind::Str {
            break;
        }
        for &b in tok.text.as_bytes() {
            let slot = cmd
                .args
                .iter()
                .position(|a| a.name == b.to_ascii_lowercase());
            let Some(index) = slot else {
                out.write_all(&[b])?;
                continue;
            };
            match (cmd.args[index].kind, &ops[index]) {
                (ArgKind::Register, Operand::Reg(reg)) => {
                    emit_register(out, reg, b.is_ascii_uppercase())?;
                }
                (ArgKind::Immediate, Operand::Imm(value)) => {
                    emit_immediate(out, *value)?;
                }
                (ArgKind::Procedure, Operand::Name(name)) => {
                    let target = procs.index_of(name);
                    emit_call(out, target)?;
                }
                (ArgKind::Str, Operand::Str(first)) => {
                    if !emit_string(out, toks, file_name, *first)? {
                        errors += 1;
                    }
                }
                _ => {}
            }
        }

        match toks.next_of(cur) {
            None => break,
            Some(_) => match toks.next_nonsep(cur) {
                Some(n) => cur = n,
                None => break,
            },
        }
    }
    Ok(errors)
}
