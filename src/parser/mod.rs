// The parser walks the token chain one statement at a time and never stops at
// the first problem: every handler either consumes its statement and returns
// where the next one starts, or reports what it saw and lets the dispatcher
// resynchronize at the next separator (or closing bracket) so the rest of the
// file still gets checked. Keyword statements become instructions on the
// session's program list with their operand tokens cut loose from the stream;
// meta statements in brackets run entirely at parse time and leave nothing
// behind. Macro calls are expanded by splicing their instantiated bodies into
// the chain before the statement is read again, so everything downstream of
// the expander only ever sees plain keywords and commands.

//! Statement dispatch over the token chain.

pub mod keywords;
pub mod meta;

use log::debug;

use crate::lexer::{TokenArena, TokenKind, TokId};
use crate::macros::{self, Expansion};
use crate::session::{FileId, Session};

/// Parses every statement of an already-tokenized file.
pub fn parse(sess: &mut Session, file: FileId) {
    debug!("parsing {}", sess.files[file as usize].name);
    let mut cur = sess.files[file as usize].head;
    while let Some(tok) = cur {
        if sess.toks[tok].kind == TokenKind::Eof {
            break;
        }
        if sess.files[file as usize].stop {
            break;
        }
        cur = statement(sess, file, tok);
    }
}

/// Reads one statement starting at `this` and returns where the next one
/// begins, or `None` when the chain is exhausted.
pub fn statement(sess: &mut Session, file: FileId, this: TokId) -> Option<TokId> {
    match sess.toks[this].kind {
        TokenKind::Separator => sess.toks[this].next,
        TokenKind::OpenBracket => meta_statement(sess, file, this),
        TokenKind::OpenParens => match macros::expand(sess, file, this) {
            Expansion::Expanded(head) => Some(head),
            Expansion::Failed => {
                let close = sess.toks.seek(this, TokenKind::CloseParens);
                sess.toks[close].next
            }
            Expansion::NoMacro => {
                let tok = &sess.toks[this];
                let (line, column) = (tok.line, tok.column);
                sess.diag(file, line, column, "Parser: Unexpected token `('");
                sess.errcount += 1;
                let close = sess.toks.seek(this, TokenKind::CloseParens);
                sess.toks[close].next
            }
        },
        TokenKind::Id => keyword_statement(sess, file, this),
        _ => {
            let tok = &sess.toks[this];
            let (line, column) = (tok.line, tok.column);
            let msg = format!("Parser: Unexpected token `{}'", tok.text);
            sess.diag(file, line, column, &msg);
            sess.errcount += 1;
            Some(sess.toks.seek(this, TokenKind::Separator))
        }
    }
}

// A bracketed statement holds exactly one meta keyword. Whatever goes wrong
// inside, the stream is picked up again right after the closing bracket.
fn meta_statement(sess: &mut Session, file: FileId, opener: TokId) -> Option<TokId> {
    let candidate = match sess.toks.next_nonsep(opener) {
        Some(t) => t,
        None => return None,
    };
    let keyword = meta::keyword_of(&sess.toks[candidate]);
    let Some(keyword) = keyword else {
        // The name of the offence is the token after the candidate in the
        // original diagnostics; fall back to the candidate when the chain is
        // shorter than that.
        let at = sess.toks[candidate].next.unwrap_or(candidate);
        let tok = &sess.toks[at];
        let (line, column) = (tok.line, tok.column);
        let msg = format!("Expected a meta-keyword, instead have `{}'", tok.text);
        sess.diag(file, line, column, &msg);
        sess.errcount += 1;
        return resync_bracket(&sess.toks, candidate);
    };

    match meta::handle(sess, file, keyword, candidate) {
        Err(()) => {
            sess.errcount += 1;
            resync_bracket(&sess.toks, candidate)
        }
        Ok(ret) => {
            if sess.toks[ret].kind != TokenKind::CloseBracket {
                let tok = &sess.toks[ret];
                let (line, column) = (tok.line, tok.column);
                let msg = format!("Expected ']', instead have `{}'", tok.text);
                sess.diag(file, line, column, &msg);
                sess.errcount += 1;
                return sess.toks[ret].next;
            }
            let after = sess.toks[ret].next?;
            let kind = sess.toks[after].kind;
            if kind != TokenKind::Separator && kind != TokenKind::Eof {
                let tok = &sess.toks[after];
                let (line, column) = (tok.line, tok.column);
                let msg = format!("Expected a instruction separator, instead have `{}'", tok.text);
                sess.diag(file, line, column, &msg);
                sess.errcount += 1;
                return Some(sess.toks.seek(after, TokenKind::Separator));
            }
            sess.toks[after].next
        }
    }
}

// Skips to the token after the next ']' so a broken meta statement does not
// poison the statement that follows it.
fn resync_bracket(toks: &TokenArena, from: TokId) -> Option<TokId> {
    let mut at = toks.seek(from, TokenKind::CloseBracket);
    if let Some(next) = toks[at].next {
        at = next;
    }
    toks[at].next
}

// An identifier opens either a macro call or a keyword/command statement.
// Operands are scanned for nested calls first, so by the time a handler runs
// the chain holds only plain tokens.
fn keyword_statement(sess: &mut Session, file: FileId, this: TokId) -> Option<TokId> {
    match macros::expand(sess, file, this) {
        Expansion::Expanded(head) => return Some(head),
        Expansion::Failed => {
            return match sess.toks[this].next {
                Some(n) if sess.toks[n].kind == TokenKind::OpenParens => {
                    let close = sess.toks.seek(this, TokenKind::CloseParens);
                    sess.toks[close].next
                }
                _ => Some(sess.toks.seek(this, TokenKind::Separator)),
            };
        }
        Expansion::NoMacro => {}
    }

    // A call form on a name that is not a macro is its own diagnostic; the
    // keyword table would only say the arguments are wrong.
    if let Some(n) = sess.toks[this].next {
        if sess.toks[n].kind == TokenKind::OpenParens {
            let tok = &sess.toks[this];
            let (line, column) = (tok.line, tok.column);
            let msg = format!("Macro '{}' is not defined.", tok.text);
            sess.diag(file, line, column, &msg);
            sess.errcount += 1;
            let close = sess.toks.seek(this, TokenKind::CloseParens);
            return sess.toks[close].next;
        }
    }

    let mut scan = sess.toks[this].next;
    while let Some(tok) = scan {
        let kind = sess.toks[tok].kind;
        if kind == TokenKind::Separator || kind == TokenKind::Eof {
            break;
        }
        if kind == TokenKind::Id || kind == TokenKind::OpenParens {
            match macros::expand(sess, file, tok) {
                Expansion::Expanded(head) => {
                    // Rescan from the spliced-in tokens, not the detached
                    // call; the body may hold further calls.
                    scan = Some(head);
                    continue;
                }
                Expansion::Failed => {
                    return Some(sess.toks.seek(this, TokenKind::Separator));
                }
                Expansion::NoMacro => {}
            }
        }
        scan = sess.toks[tok].next;
    }

    match keywords::handle(sess, file, this) {
        Err(()) => {
            sess.errcount += 1;
            Some(sess.toks.seek(this, TokenKind::Separator))
        }
        Ok(None) => None,
        Ok(Some(ret)) => {
            let kind = sess.toks[ret].kind;
            if kind != TokenKind::Separator && kind != TokenKind::Eof {
                let tok = &sess.toks[ret];
                let (line, column) = (tok.line, tok.column);
                let msg = format!("Expected a instruction separator, instead have `{}'", tok.text);
                sess.diag(file, line, column, &msg);
                sess.errcount += 1;
                return Some(sess.toks.seek(ret, TokenKind::Separator));
            }
            sess.toks[ret].next
        }
    }
}

/// Matches a fixed sequence of token kinds starting at `from`. Returns the
/// index of the first mismatch, or `None` when the whole sequence is present.
pub(crate) fn match_seq(toks: &TokenArena, from: TokId, kinds: &[TokenKind]) -> Option<usize> {
    let mut cur = Some(from);
    for (i, &kind) in kinds.iter().enumerate() {
        match cur {
            Some(t) if toks[t].kind == kind => cur = toks[t].next,
            _ => return Some(i),
        }
    }
    None
}
