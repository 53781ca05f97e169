// Meta statements run at parse time and never reach code generation: they
// define commands and macros, pull other files in, guard regions behind
// compile-time conditions, and stop the current file. Each handler gets the
// token of its own keyword, works on the raw chain (separators are skipped
// between elements, so a declaration may span lines) and returns the token it
// expects to be the closing bracket; the dispatcher checks that and the
// separator after it. A failed handler has already reported its complaint.
// Conditions compare literals and value macros, where a bare identifier asks
// whether a parameterless macro of that name exists at all.

//! Bracketed meta statements: `new`, `import`, `macro`, `require`, `if`,
//! `action`.

use std::fs;

use log::debug;

use crate::cmd::{ArgKind, CmdArg, Command, CMD_MAX_ARGS};
use crate::lexer::{Token, TokenKind, TokId};
use crate::macros::{self, Slot, Variant};
use crate::paths;
use crate::session::{FileId, Session};

// Letters a command argument may not take: they name registers inside
// templates and would shadow the operand substitution.
const RESERVED_ARG_LETTERS: &[u8] = b"abcdp";

/// The meta keywords, in the bracketed statement position.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum MetaKeyword {
    New,
    Import,
    Macro,
    Require,
    If,
    Action,
}

/// Recognizes a meta keyword by spelling.
pub(crate) fn keyword_of(tok: &Token) -> Option<MetaKeyword> {
    match tok.text.as_str() {
        "new" => Some(MetaKeyword::New),
        "import" => Some(MetaKeyword::Import),
        "macro" => Some(MetaKeyword::Macro),
        "require" => Some(MetaKeyword::Require),
        "if" => Some(MetaKeyword::If),
        "action" => Some(MetaKeyword::Action),
        _ => None,
    }
}

/// Runs one meta statement. `Ok` carries the token expected to close the
/// bracket; `Err` means the problem was already reported.
pub(crate) fn handle(
    sess: &mut Session,
    file: FileId,
    keyword: MetaKeyword,
    kw: TokId,
) -> Result<TokId, ()> {
    match keyword {
        MetaKeyword::New => meta_new(sess, file, kw),
        MetaKeyword::Import => meta_import(sess, file, kw),
        MetaKeyword::Macro => meta_macro(sess, file, kw),
        MetaKeyword::Require => meta_require(sess, file, kw),
        MetaKeyword::If => meta_if(sess, file, kw),
        MetaKeyword::Action => meta_action(sess, file, kw),
    }
}

fn complain(sess: &Session, file: FileId, at: TokId, msg: &str) {
    let tok = &sess.toks[at];
    sess.diag(file, tok.line, tok.column, msg);
}

// [new name arg:type ... = "template"] declares a user command. Up to three
// typed arguments, no commas between them; redeclaring a name replaces it.
fn meta_new(sess: &mut Session, file: FileId, kw: TokId) -> Result<TokId, ()> {
    let Some(name_tok) = sess.toks.next_nonsep(kw) else { return Err(()) };
    if sess.toks[name_tok].kind != TokenKind::Id {
        let msg = format!(
            "Expected a identifier to command's name, instead have `{}'",
            sess.toks[name_tok].text
        );
        complain(sess, file, name_tok, &msg);
        return Err(());
    }
    let name = sess.toks[name_tok].text.clone();

    let mut args: Vec<CmdArg> = Vec::new();
    let Some(mut cur) = sess.toks.next_nonsep(name_tok) else { return Err(()) };
    while args.len() < CMD_MAX_ARGS && sess.toks[cur].kind != TokenKind::Equal {
        use TokenKind::{Colon, Id};
        match crate::parser::match_seq(&sess.toks, cur, &[Id, Colon, Id]) {
            None => {}
            Some(0) => {
                let msg = format!(
                    "Expected a argument name, instead have `{}'",
                    sess.toks[cur].text
                );
                complain(sess, file, cur, &msg);
                return Err(());
            }
            Some(1) => {
                let at = sess.toks[cur].next.unwrap_or(cur);
                let msg = format!("Expected ':', instead have `{}'", sess.toks[at].text);
                complain(sess, file, at, &msg);
                return Err(());
            }
            Some(_) => {
                let at = sess.toks[cur]
                    .next
                    .and_then(|n| sess.toks[n].next)
                    .unwrap_or(cur);
                let msg = format!("Expected a type name, instead have `{}'", sess.toks[at].text);
                complain(sess, file, at, &msg);
                return Err(());
            }
        }
        let Some(colon) = sess.toks[cur].next else { return Err(()) };
        let Some(typ) = sess.toks[colon].next else { return Err(()) };

        let arg_name = &sess.toks[cur].text;
        let first = arg_name.bytes().next().unwrap_or(0);
        let lower = first.to_ascii_lowercase();
        let usable = arg_name.len() == 1
            && first.is_ascii_alphabetic()
            && !RESERVED_ARG_LETTERS.contains(&lower);
        if !usable {
            let msg = format!("`{}' is a invalid argument name", arg_name);
            complain(sess, file, cur, &msg);
            return Err(());
        }

        let typ_first = sess.toks[typ].text.chars().next().unwrap_or('\0');
        let Some(kind) = ArgKind::from_letter(typ_first) else {
            let msg = format!("`{}' is a invalid type name", sess.toks[typ].text);
            complain(sess, file, typ, &msg);
            return Err(());
        };
        args.push(CmdArg { name: lower, kind });

        let Some(next) = sess.toks.next_nonsep(typ) else { return Err(()) };
        cur = next;
    }

    if sess.toks[cur].kind != TokenKind::Equal {
        let msg = format!("Expected '=', instead have `{}'", sess.toks[cur].text);
        complain(sess, file, cur, &msg);
        return Err(());
    }
    let Some(body) = sess.toks.next_nonsep(cur) else { return Err(()) };
    if sess.toks[body].kind != TokenKind::Str {
        let msg = format!("Expected a string, instead have `{}'", sess.toks[body].text);
        complain(sess, file, body, &msg);
        return Err(());
    }

    sess.cmds.define(Command { name, args, body });
    let last = sess.toks.run_end(body, TokenKind::Str);
    match sess.toks.next_nonsep(last) {
        Some(t) => Ok(t),
        None => Err(()),
    }
}

// [import "a", "b"] compiles each named module in place, once per name.
fn meta_import(sess: &mut Session, file: FileId, kw: TokId) -> Result<TokId, ()> {
    let mut cursor = kw;
    loop {
        let Some(name_tok) = sess.toks.next_nonsep(cursor) else { return Err(()) };
        if sess.toks[name_tok].kind != TokenKind::Str {
            let msg = format!(
                "Expected string, instead have: `{}'",
                sess.toks[name_tok].text
            );
            complain(sess, file, name_tok, &msg);
            return Err(());
        }
        let name = sess.toks[name_tok].text.clone();

        let source = paths::resolve(&sess.search_paths, &name)
            .and_then(|path| fs::read_to_string(path).ok());
        let Some(source) = source else {
            let msg = format!("Module \"{}\" not found.", name);
            complain(sess, file, kw, &msg);
            return Err(());
        };
        crate::compiler::process(sess, &name, &source);

        let Some(after) = sess.toks.next_nonsep(name_tok) else { return Err(()) };
        if sess.toks[after].kind != TokenKind::Comma {
            return Ok(after);
        }
        cursor = after;
    }
}

// [require "name"] asserts that a module was imported before this point and
// stops the file when it was not, so missing-symbol noise never follows.
fn meta_require(sess: &mut Session, file: FileId, kw: TokId) -> Result<TokId, ()> {
    let mut cursor = kw;
    loop {
        let Some(name_tok) = sess.toks.next_nonsep(cursor) else { return Err(()) };
        if sess.toks[name_tok].kind != TokenKind::Str {
            let msg = format!(
                "Expected string, instead have: `{}'",
                sess.toks[name_tok].text
            );
            complain(sess, file, name_tok, &msg);
            sess.files[file as usize].stop = true;
            return Err(());
        }
        let name = sess.toks[name_tok].text.clone();
        if !sess.imports.contains(crate::core::hash::symbol(&name)) {
            let msg = format!("Required module '{}' not imported yet.", name);
            complain(sess, file, name_tok, &msg);
            sess.files[file as usize].stop = true;
            return Err(());
        }

        let Some(after) = sess.toks.next_nonsep(name_tok) else { return Err(()) };
        if sess.toks[after].kind != TokenKind::Comma {
            return Ok(after);
        }
        cursor = after;
    }
}

// [macro name (pattern) = body] declares one variant of a macro. The name
// stays registered even when the declaration fails later, so calls to it
// complain about variants rather than about an unknown name.
fn meta_macro(sess: &mut Session, file: FileId, kw: TokId) -> Result<TokId, ()> {
    let Some(name_tok) = sess.toks.next_nonsep(kw) else { return Err(()) };
    if sess.toks[name_tok].kind != TokenKind::Id {
        let msg = format!(
            "Expected a valid macro name, instead have `{}'",
            sess.toks[name_tok].text
        );
        complain(sess, file, name_tok, &msg);
        return Err(());
    }
    let name = sess.toks[name_tok].text.clone();
    sess.macros.declare(&name);

    let Some(mut cur) = sess.toks.next_nonsep(name_tok) else { return Err(()) };
    let mut slots: Vec<Slot> = Vec::new();

    if sess.toks[cur].kind == TokenKind::OpenParens {
        let Some(mut t) = sess.toks.next_nonsep(cur) else { return Err(()) };
        while sess.toks[t].kind != TokenKind::CloseParens {
            match sess.toks[t].kind {
                TokenKind::Id => {
                    use TokenKind::{Colon, Id};
                    match crate::parser::match_seq(&sess.toks, t, &[Id, Colon, Id]) {
                        None => {}
                        Some(0) => {
                            let msg = format!(
                                "Expected a argument name, instead have `{}'",
                                sess.toks[t].text
                            );
                            complain(sess, file, t, &msg);
                            return Err(());
                        }
                        Some(1) => {
                            let at = sess.toks[t].next.unwrap_or(t);
                            let msg =
                                format!("Expected ':', instead have `{}'", sess.toks[at].text);
                            complain(sess, file, at, &msg);
                            return Err(());
                        }
                        Some(_) => {
                            let at = sess.toks[t]
                                .next
                                .and_then(|n| sess.toks[n].next)
                                .unwrap_or(t);
                            let msg = format!(
                                "Expected a token type name, instead have `{}'",
                                sess.toks[at].text
                            );
                            complain(sess, file, at, &msg);
                            return Err(());
                        }
                    }
                    let Some(colon) = sess.toks[t].next else { return Err(()) };
                    let Some(typ) = sess.toks[colon].next else { return Err(()) };
                    let Some(kind) = macros::slot_kind(&sess.toks[typ].text) else {
                        let msg = format!(
                            "`{}' is a invalid token type name.",
                            sess.toks[typ].text
                        );
                        complain(sess, file, typ, &msg);
                        return Err(());
                    };
                    slots.push(Slot {
                        kind,
                        name: Some(sess.toks[t].text.clone()),
                    });
                    t = typ;
                }
                TokenKind::CharLit => {
                    let Some(kind) = macros::slot_kind(&sess.toks[t].text) else {
                        let msg = format!("`{}' is a invalid token.", sess.toks[t].text);
                        complain(sess, file, t, &msg);
                        return Err(());
                    };
                    if kind == TokenKind::CloseParens {
                        complain(sess, file, t, "You can't use ')' inside a macro.");
                        return Err(());
                    }
                    slots.push(Slot { kind, name: None });
                }
                _ => {
                    let msg = format!(
                        "Expected a name or literal character, instead have: `{}'",
                        sess.toks[t].text
                    );
                    complain(sess, file, t, &msg);
                    return Err(());
                }
            }
            let Some(n) = sess.toks[t].next else {
                complain(sess, file, name_tok, "Unexpected end-of-file inside macro declaration.");
                return Err(());
            };
            t = n;
        }
        let Some(after) = sess.toks.next_nonsep(t) else { return Err(()) };
        cur = after;
    }

    if sess.toks[cur].kind != TokenKind::Equal {
        let msg = format!("Expected '=', instead have: `{}'", sess.toks[cur].text);
        complain(sess, file, cur, &msg);
        return Err(());
    }
    let Some(body) = sess.toks.next_nonsep(cur) else { return Err(()) };
    if sess.toks[body].kind == TokenKind::CloseBracket {
        complain(
            sess,
            file,
            body,
            "Expected a minimum of one token for the macro's body.",
        );
        return Err(());
    }
    if sess.macros.has_variant(&name, &slots) {
        let msg = format!(
            "Redeclaration of macro '{}' with the same sequence of tokens.",
            name
        );
        complain(sess, file, name_tok, &msg);
        return Err(());
    }

    // The body runs to the bracket that closes the declaration, counting
    // nested bracket pairs; it is cut out of the stream so only the macro
    // holds it.
    let mut depth = 1u32;
    let mut c = body;
    let close = loop {
        match sess.toks[c].kind {
            TokenKind::OpenBracket => depth += 1,
            TokenKind::CloseBracket => {
                depth -= 1;
                if depth == 0 {
                    break c;
                }
            }
            _ => {}
        }
        match sess.toks[c].next {
            Some(n) => c = n,
            None => {
                complain(sess, file, name_tok, "Unexpected end-of-file inside macro declaration.");
                return Err(());
            }
        }
    };
    let Some(last_body) = sess.toks[close].prev else { return Err(()) };
    sess.toks[last_body].next = None;
    sess.macros.add_variant(&name, Variant { slots, body });
    Ok(close)
}

// [if cond then ...] either parses the guarded region or skips it wholesale.
// The `!action` form runs an action instead of a region.
fn meta_if(sess: &mut Session, file: FileId, kw: TokId) -> Result<TokId, ()> {
    let mut cur = sess.toks.next_nonsep(kw);
    let truth = mif_expr(sess, file, kw, &mut cur)?;

    let then_tok = match cur {
        Some(t) if sess.toks[t].kind == TokenKind::Id && sess.toks[t].text == "then" => t,
        other => {
            let at = other.unwrap_or(kw);
            let msg = format!(
                "Expected 'then' keyword, instead have `{}'",
                sess.toks[at].text
            );
            complain(sess, file, at, &msg);
            return Err(());
        }
    };
    cur = sess.toks.next_nonsep(then_tok);
    debug!("meta-if condition is {}", truth);

    if !truth {
        let mut depth = 1u32;
        let mut c = cur;
        loop {
            let Some(t) = c else {
                complain(sess, file, kw, "Unexpected end-of-file inside meta-if");
                return Err(());
            };
            match sess.toks[t].kind {
                TokenKind::OpenBracket => depth += 1,
                TokenKind::CloseBracket => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(t);
                    }
                }
                TokenKind::Eof => {
                    complain(sess, file, t, "Unexpected end-of-file inside meta-if");
                    return Err(());
                }
                _ => {}
            }
            c = sess.toks[t].next;
        }
    }

    match cur {
        Some(t) if sess.toks[t].kind == TokenKind::Exclamation => {
            let Some(name) = sess.toks[t].next else {
                complain(sess, file, t, "Invalid action ''");
                return Err(());
            };
            action(sess, file, name)?;
            match sess.toks[name].next {
                Some(after) => Ok(after),
                None => Err(()),
            }
        }
        _ => {
            let mut c = cur;
            loop {
                let Some(t) = c else {
                    complain(sess, file, kw, "Unexpected end-of-file inside meta-if");
                    return Err(());
                };
                if sess.toks[t].kind == TokenKind::CloseBracket {
                    return Ok(t);
                }
                if sess.files[file as usize].stop {
                    return Ok(t);
                }
                if sess.toks[t].kind == TokenKind::Eof {
                    complain(sess, file, t, "Unexpected end-of-file inside meta-if");
                    return Err(());
                }
                c = crate::parser::statement(sess, file, t);
            }
        }
    }
}

// [action name] — and `!name` inside a meta-if.
fn meta_action(sess: &mut Session, file: FileId, kw: TokId) -> Result<TokId, ()> {
    let Some(name) = sess.toks.next_nonsep(kw) else { return Err(()) };
    action(sess, file, name)?;
    match sess.toks.next_nonsep(name) {
        Some(t) => Ok(t),
        None => Err(()),
    }
}

fn action(sess: &mut Session, file: FileId, name: TokId) -> Result<(), ()> {
    if sess.toks[name].text == "stop" {
        sess.files[file as usize].stop = true;
        return Ok(());
    }
    let msg = format!("Invalid action '{}'", sess.toks[name].text);
    complain(sess, file, name, &msg);
    Err(())
}

fn is_value(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Str | TokenKind::Immediate | TokenKind::CharLit | TokenKind::Id
    )
}

fn value_at(sess: &Session, file: FileId, kw: TokId, cur: Option<TokId>) -> Result<TokId, ()> {
    match cur {
        Some(t) if is_value(sess.toks[t].kind) => Ok(t),
        other => {
            let at = other.unwrap_or(kw);
            let msg = format!("Expected a value, instead have `{}'", sess.toks[at].text);
            complain(sess, file, at, &msg);
            Err(())
        }
    }
}

// An identifier names a value macro; on its own it tests existence, in a
// comparison it stands for its body. Unresolvable or mixed-type comparisons
// are plain false.
fn resolve(sess: &Session, tok: TokId) -> Option<TokId> {
    if sess.toks[tok].kind == TokenKind::Id {
        sess.macros.value_of(&sess.toks[tok].text)
    } else {
        Some(tok)
    }
}

// Evaluates the condition between `if` and `then`, leaving the cursor on the
// first token after it. Forms: `v`, `not v`, `a == b`, `a != b`.
fn mif_expr(
    sess: &mut Session,
    file: FileId,
    kw: TokId,
    cur: &mut Option<TokId>,
) -> Result<bool, ()> {
    let mut negated = false;
    if let Some(t) = *cur {
        let tok = &sess.toks[t];
        if tok.kind == TokenKind::Id && tok.text == "not" {
            negated = true;
            *cur = sess.toks.next_nonsep(t);
        }
    }
    let v1 = value_at(sess, file, kw, *cur)?;
    *cur = sess.toks.next_nonsep(v1);

    let op = match *cur {
        Some(t) if matches!(
            sess.toks[t].kind,
            TokenKind::Equal | TokenKind::Exclamation
        ) =>
        {
            t
        }
        _ => {
            let tok = &sess.toks[v1];
            let truth = if tok.kind == TokenKind::Id {
                sess.macros.value_of(&tok.text).is_some()
            } else {
                tok.kind == TokenKind::Str || tok.value != 0
            };
            return Ok(truth != negated);
        }
    };
    if sess.toks[op].kind != TokenKind::Equal {
        negated = !negated;
    }
    *cur = sess.toks.next_nonsep(op);
    match *cur {
        Some(t) if sess.toks[t].kind == TokenKind::Equal => {
            *cur = sess.toks.next_nonsep(t);
        }
        other => {
            let at = other.unwrap_or(kw);
            let msg = format!(
                "Unexpected token '{}' inside if's expression",
                sess.toks[at].text
            );
            complain(sess, file, at, &msg);
            return Err(());
        }
    }
    if let Some(t) = *cur {
        let tok = &sess.toks[t];
        if tok.kind == TokenKind::Id && tok.text == "then" {
            let (line, column) = (tok.line, tok.column);
            sess.diag(file, line, column, "Expected a value before 'then' keyword");
            return Err(());
        }
    }
    let v2 = value_at(sess, file, kw, *cur)?;
    *cur = sess.toks.next_nonsep(v2);

    let (Some(a), Some(b)) = (resolve(sess, v1), resolve(sess, v2)) else {
        return Ok(false);
    };
    if sess.toks[a].kind != sess.toks[b].kind {
        return Ok(false);
    }
    let equal = if sess.toks[a].kind == TokenKind::Str {
        sess.toks[a].text == sess.toks[b].text
    } else {
        sess.toks[a].value == sess.toks[b].value
    };
    Ok(equal != negated)
}
