// Keyword statements all follow the same contract: validate the operands,
// append one instruction whose child is the keyword token, cut the operand
// chain loose right after the last operand, and hand back the first token
// that was not consumed (normally the separator). `Ok(None)` means the chain
// simply ended there, which happens in expression-macro bodies that are
// parsed detached from the main stream. `Err` means the problem was already
// reported and the dispatcher only has to count it and resynchronize.
// Anything that is not a keyword is looked up in the user command table and
// checked against the command's declared operand types.

//! Keyword and user-command statement handlers.

use crate::lexer::{is_register, TokenKind, TokId};
use crate::session::{FileId, InstKind, Session};

/// A handler's verdict: the first unconsumed token, `None` at the end of a
/// detached chain, or an already-reported failure.
pub(crate) type KeyResult = Result<Option<TokId>, ()>;

/// Dispatches an identifier statement to its keyword handler, or to the user
/// command table when the name is no keyword.
pub(crate) fn handle(sess: &mut Session, file: FileId, kw: TokId) -> KeyResult {
    match sess.toks[kw].text.as_str() {
        "func" => key_func(sess, file, kw),
        "load" => op1_register(sess, file, kw, InstKind::Load),
        "store" => op1_value(sess, file, kw, InstKind::Store),
        "push" => op1_value(sess, file, kw, InstKind::Push),
        "pop" => op1_register(sess, file, kw, InstKind::Pop),
        "call" => op1_name(sess, file, kw, InstKind::Call),
        "proc" => op1_name(sess, file, kw, InstKind::Proc),
        "ret" => key_ret(sess, file, kw),
        "endproc" => no_operand(sess, kw, file, InstKind::EndProc),
        "prtab" => no_operand(sess, kw, file, InstKind::PrTab),
        "ifz" | "ifnz" => key_if(sess, file, kw),
        "endif" => no_operand(sess, kw, file, InstKind::EndIf),
        "say" => string_run(sess, file, kw, InstKind::Say),
        "ases" => string_run(sess, file, kw, InstKind::Ases),
        _ => cmd_verify(sess, file, kw),
    }
}

fn operand_of(sess: &mut Session, file: FileId, kw: TokId, what: &str) -> Result<TokId, ()> {
    match sess.toks[kw].next {
        Some(t) => Ok(t),
        None => {
            let tok = &sess.toks[kw];
            let (line, column) = (tok.line, tok.column);
            let msg = format!("Expected {}, instead have `'", what);
            sess.diag(file, line, column, &msg);
            Err(())
        }
    }
}

fn bad_operand(sess: &Session, file: FileId, tok: TokId, what: &str) {
    let t = &sess.toks[tok];
    let msg = format!("Expected {}, instead have `{}'", what, t.text);
    sess.diag(file, t.line, t.column, &msg);
}

// Cuts the statement's token chain after `last` and appends the instruction.
fn commit(sess: &mut Session, kind: InstKind, kw: TokId, last: TokId, file: FileId) -> KeyResult {
    let next = sess.toks[last].next;
    sess.inst_add(kind, kw, file);
    sess.toks[last].next = None;
    Ok(next)
}

fn op1_register(sess: &mut Session, file: FileId, kw: TokId, kind: InstKind) -> KeyResult {
    let what = "a register name";
    let op = operand_of(sess, file, kw, what)?;
    if !is_register(&sess.toks[op]) {
        bad_operand(sess, file, op, what);
        return Err(());
    }
    commit(sess, kind, kw, op, file)
}

fn op1_value(sess: &mut Session, file: FileId, kw: TokId, kind: InstKind) -> KeyResult {
    let what = "a register name or immediate value";
    let op = operand_of(sess, file, kw, what)?;
    let tok = &sess.toks[op];
    let ok = is_register(tok)
        || tok.kind == TokenKind::Immediate
        || tok.kind == TokenKind::CharLit;
    if !ok {
        bad_operand(sess, file, op, what);
        return Err(());
    }
    commit(sess, kind, kw, op, file)
}

fn op1_name(sess: &mut Session, file: FileId, kw: TokId, kind: InstKind) -> KeyResult {
    let what = "a procedure name";
    let op = operand_of(sess, file, kw, what)?;
    let tok = &sess.toks[op];
    if tok.kind != TokenKind::Id || is_register(tok) {
        bad_operand(sess, file, op, what);
        return Err(());
    }
    commit(sess, kind, kw, op, file)
}

fn no_operand(sess: &mut Session, kw: TokId, file: FileId, kind: InstKind) -> KeyResult {
    commit(sess, kind, kw, kw, file)
}

// The call frame selector: one digit baked into the opcode stream.
fn key_func(sess: &mut Session, file: FileId, kw: TokId) -> KeyResult {
    let op = operand_of(sess, file, kw, "number")?;
    let tok = &sess.toks[op];
    if tok.kind != TokenKind::Immediate {
        bad_operand(sess, file, op, "number");
        return Err(());
    }
    if tok.value > 9 {
        let (line, column, value) = (tok.line, tok.column, tok.value);
        let msg = format!("Expected number between 0 and 9, instead: {}", value);
        sess.diag(file, line, column, &msg);
        return Err(());
    }
    commit(sess, InstKind::Func, kw, op, file)
}

// `ret` takes an optional frame number; bare `ret` keeps only the keyword in
// its chain.
fn key_ret(sess: &mut Session, file: FileId, kw: TokId) -> KeyResult {
    match sess.toks[kw].next {
        None => {
            sess.inst_add(InstKind::Ret, kw, file);
            Ok(None)
        }
        Some(op) if sess.toks[op].kind == TokenKind::Immediate => {
            commit(sess, InstKind::Ret, kw, op, file)
        }
        Some(op) => {
            let kind = sess.toks[op].kind;
            if kind != TokenKind::Separator && kind != TokenKind::Eof {
                bad_operand(sess, file, op, "a literal number");
                return Err(());
            }
            sess.inst_add(InstKind::Ret, kw, file);
            sess.toks[kw].next = None;
            Ok(Some(op))
        }
    }
}

// The inline form `ifz cmd ...` wraps the rest of the statement, so the
// conditional becomes its own instruction and a separator is forged to let
// the wrapped statement be parsed on its own. The block form `ifz` alone
// pairs with `endif` later, in code generation.
fn key_if(sess: &mut Session, file: FileId, kw: TokId) -> KeyResult {
    match sess.toks[kw].next {
        Some(body) if sess.toks[body].kind == TokenKind::Id => {
            sess.inst_add(InstKind::If, kw, file);
            let line = sess.toks[kw].line;
            let sep = sess.toks.alloc(crate::lexer::Token {
                kind: TokenKind::Separator,
                text: String::new(),
                value: 0,
                line,
                column: 0,
                prev: Some(kw),
                next: Some(body),
            });
            sess.toks[kw].next = None;
            Ok(Some(sep))
        }
        next => {
            sess.inst_add(InstKind::IfBlock, kw, file);
            sess.toks[kw].next = None;
            Ok(next)
        }
    }
}

// `say` and the raw `ases` escape both take a run of string literals, which
// may span separators so long texts can be split over lines.
fn string_run(sess: &mut Session, file: FileId, kw: TokId, kind: InstKind) -> KeyResult {
    let what = "a string";
    let op = operand_of(sess, file, kw, what)?;
    if sess.toks[op].kind != TokenKind::Str {
        bad_operand(sess, file, op, what);
        return Err(());
    }
    let last = sess.toks.run_end(op, TokenKind::Str);
    commit(sess, kind, kw, last, file)
}

// Validates a user command call against its declaration: each operand must
// match the declared type letter, operands are comma separated, and the
// count must be exact.
fn cmd_verify(sess: &mut Session, file: FileId, name: TokId) -> KeyResult {
    let text = sess.toks[name].text.clone();
    let Some(cmd) = sess.cmds.find(&text) else {
        let tok = &sess.toks[name];
        let (line, column) = (tok.line, tok.column);
        let msg = format!("`{}' is not a valid keyword or defined command.", text);
        sess.diag(file, line, column, &msg);
        return Err(());
    };
    let args = cmd.args.clone();

    let mut cur = name;
    let mut matched = 0usize;
    for (i, arg) in args.iter().enumerate() {
        let Some(op) = sess.toks[cur].next else { break };
        cur = op;
        let tok = &sess.toks[cur];
        let ok = match arg.kind {
            crate::cmd::ArgKind::Register => is_register(tok),
            crate::cmd::ArgKind::Immediate => {
                tok.kind == TokenKind::Immediate || tok.kind == TokenKind::CharLit
            }
            crate::cmd::ArgKind::Procedure => tok.kind == TokenKind::Id && !is_register(tok),
            crate::cmd::ArgKind::Str => tok.kind == TokenKind::Str,
        };
        if !ok {
            let (line, column) = (tok.line, tok.column);
            let what = match arg.kind {
                crate::cmd::ArgKind::Register => "a register",
                crate::cmd::ArgKind::Immediate => "a immediate value",
                crate::cmd::ArgKind::Procedure => "a procedure name",
                crate::cmd::ArgKind::Str => "a string",
            };
            let msg = format!("Command '{}' expects {} at operand {}.", text, what, i + 1);
            sess.diag(file, line, column, &msg);
            return Err(());
        }
        matched += 1;
        match sess.toks[cur].next {
            Some(n) if sess.toks[n].kind == TokenKind::Comma => cur = n,
            _ => break,
        }
    }

    let next = sess.toks[cur].next;
    let terminated = match next {
        Some(n) => {
            let kind = sess.toks[n].kind;
            kind == TokenKind::Separator || kind == TokenKind::Eof
        }
        None => true,
    };
    if matched < args.len() || !terminated {
        let at = next.unwrap_or(cur);
        let tok = &sess.toks[at];
        let (line, column) = (tok.line, tok.column);
        let msg = format!("Command '{}' expects {} operands.", text, args.len());
        sess.diag(file, line, column, &msg);
        return Err(());
    }
    commit(sess, InstKind::Cmd, name, cur, file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::{ArgKind, CmdArg, Command};
    use crate::lexer;

    fn session_with(src: &str) -> (Session, FileId, TokId) {
        let mut sess = Session::new();
        let file = sess.register_file("test.lia").unwrap();
        let head = lexer::tokenize(&mut sess.toks, src).unwrap();
        sess.files[file as usize].head = Some(head);
        (sess, file, head)
    }

    fn child_texts(sess: &Session, inst: crate::session::InstId) -> Vec<String> {
        let mut out = Vec::new();
        let mut cur = Some(sess.insts[inst].child);
        while let Some(t) = cur {
            out.push(sess.toks[t].text.clone());
            cur = sess.toks[t].next;
        }
        out
    }

    #[test]
    fn test_load_requires_register() {
        let (mut sess, file, head) = session_with("load 5\n");
        assert!(handle(&mut sess, file, head).is_err());
        assert_eq!(sess.insts.len(), 0);
    }

    #[test]
    fn test_store_takes_register_or_immediate() {
        let (mut sess, file, head) = session_with("store 'x'\n");
        let ret = handle(&mut sess, file, head).unwrap().unwrap();
        assert_eq!(sess.toks[ret].kind, TokenKind::Separator);
        let inst = sess.inst_head.unwrap();
        assert_eq!(sess.insts[inst].kind, InstKind::Store);
        assert_eq!(child_texts(&sess, inst), vec!["store", "x"]);
    }

    #[test]
    fn test_func_rejects_large_frame() {
        let (mut sess, file, head) = session_with("func 12\n");
        assert!(handle(&mut sess, file, head).is_err());
    }

    #[test]
    fn test_ret_with_and_without_frame() {
        let (mut sess, file, head) = session_with("ret 3\n");
        assert!(handle(&mut sess, file, head).is_ok());
        let inst = sess.inst_head.unwrap();
        assert_eq!(child_texts(&sess, inst), vec!["ret", "3"]);

        let (mut sess, file, head) = session_with("ret\n");
        let ret = handle(&mut sess, file, head).unwrap().unwrap();
        assert_eq!(sess.toks[ret].kind, TokenKind::Separator);
        let inst = sess.inst_head.unwrap();
        assert_eq!(child_texts(&sess, inst), vec!["ret"]);
    }

    #[test]
    fn test_inline_if_forges_separator() {
        let (mut sess, file, head) = session_with("ifz pop ra\n");
        let ret = handle(&mut sess, file, head).unwrap().unwrap();
        assert_eq!(sess.toks[ret].kind, TokenKind::Separator);
        let body = sess.toks[ret].next.unwrap();
        assert_eq!(sess.toks[body].text, "pop");
        let inst = sess.inst_head.unwrap();
        assert_eq!(sess.insts[inst].kind, InstKind::If);
    }

    #[test]
    fn test_block_if_has_no_body() {
        let (mut sess, file, head) = session_with("ifnz\npop ra\n");
        assert!(handle(&mut sess, file, head).is_ok());
        let inst = sess.inst_head.unwrap();
        assert_eq!(sess.insts[inst].kind, InstKind::IfBlock);
        assert_eq!(child_texts(&sess, inst), vec!["ifnz"]);
    }

    #[test]
    fn test_say_absorbs_string_run() {
        let (mut sess, file, head) = session_with("say \"ab\" \"cd\"\n\"ef\"\nsay \"x\"\n");
        let ret = handle(&mut sess, file, head).unwrap().unwrap();
        let inst = sess.inst_head.unwrap();
        assert_eq!(child_texts(&sess, inst), vec!["say", "ab", "cd", ";", "ef"]);
        // Resumes at the separator before the next statement.
        assert_eq!(sess.toks[ret].kind, TokenKind::Separator);
    }

    #[test]
    fn test_command_operand_types_checked() {
        let (mut sess, file, head) = session_with("move ra, 5\n");
        sess.cmds.define(Command {
            name: "move".to_string(),
            args: vec![
                CmdArg { name: b'x', kind: ArgKind::Register },
                CmdArg { name: b'y', kind: ArgKind::Immediate },
            ],
            body: head,
        });
        assert!(handle(&mut sess, file, head).is_ok());
        let inst = sess.inst_head.unwrap();
        assert_eq!(sess.insts[inst].kind, InstKind::Cmd);
        assert_eq!(child_texts(&sess, inst), vec!["move", "ra", ",", "5"]);
    }

    #[test]
    fn test_command_operand_count_exact() {
        let (mut sess, file, head) = session_with("move ra\n");
        sess.cmds.define(Command {
            name: "move".to_string(),
            args: vec![
                CmdArg { name: b'x', kind: ArgKind::Register },
                CmdArg { name: b'y', kind: ArgKind::Immediate },
            ],
            body: head,
        });
        assert!(handle(&mut sess, file, head).is_err());

        let (mut sess, file, head) = session_with("move ra, 5, 6\n");
        sess.cmds.define(Command {
            name: "move".to_string(),
            args: vec![
                CmdArg { name: b'x', kind: ArgKind::Register },
                CmdArg { name: b'y', kind: ArgKind::Immediate },
            ],
            body: head,
        });
        assert!(handle(&mut sess, file, head).is_err());
    }

    #[test]
    fn test_unknown_command_reported() {
        let (mut sess, file, head) = session_with("nope ra\n");
        assert!(handle(&mut sess, file, head).is_err());
    }
}
