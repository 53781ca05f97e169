// This module turns raw source text into the doubly linked token chains every
// later phase works on. Tokens are allocated in one arena shared by all files of
// a compilation and reference each other through u32 indices, because macro
// expansion and instruction building constantly splice, duplicate and truncate
// token subsequences: with index links a splice is a couple of field writes and
// there is no danger of dangling nodes no matter how the stream is rearranged.
// The scanner itself is a single forward pass: blanks are skipped, newline and
// ';' both become separator tokens, '#' kills the rest of a line, and literals
// (identifiers, 0-255 immediates in decimal or 0x hex, escaped char literals,
// bounded strings) are range-checked on the spot. Any lexical error aborts the
// file: the partially built chain is released from the arena and the error is
// handed back to the driver.

//! Tokenizer and the token arena.

use crate::core::error::LexError;

/// Index of a token inside the [`TokenArena`].
pub type TokId = u32;

/// Longest accepted identifier or string payload, in bytes.
pub const TOKEN_MAX: usize = 128;

/// Kind tag of a token.
///
/// `Register` is never produced by the scanner; it is the register-class wildcard
/// used by macro pattern slots to match any register spelling.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TokenKind {
    Eof,
    Id,
    Separator,
    OpenBracket,
    CloseBracket,
    Colon,
    Comma,
    Equal,
    Immediate,
    CharLit,
    Str,
    OpenParens,
    CloseParens,
    Exclamation,
    Register,
}

/// One lexical unit with its stream links.
///
/// `value` is the resolved byte for immediates and char literals; `text` keeps
/// the raw spelling (escapes unexpanded) for diagnostics and template emission.
#[derive(Clone, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub value: u8,
    pub line: u32,
    pub column: u32,
    pub prev: Option<TokId>,
    pub next: Option<TokId>,
}

/// Flat storage for every token of a compilation, across all files.
///
/// Chains are threaded through the `prev`/`next` fields of the tokens
/// themselves; the arena never frees individual nodes, so splicing during macro
/// expansion can orphan subchains without invalidating anything.
pub struct TokenArena {
    toks: Vec<Token>,
}

impl TokenArena {
    pub fn new() -> Self {
        TokenArena { toks: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.toks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.toks.is_empty()
    }

    pub fn alloc(&mut self, tok: Token) -> TokId {
        let id = self.toks.len() as TokId;
        self.toks.push(tok);
        id
    }

    /// Drops every token allocated at or after `len`. Only valid when nothing
    /// before `len` links into the dropped range, which holds for a freshly
    /// scanned file.
    pub fn release_from(&mut self, len: usize) {
        self.toks.truncate(len);
    }

    pub fn next_of(&self, id: TokId) -> Option<TokId> {
        self.toks[id as usize].next
    }

    pub fn prev_of(&self, id: TokId) -> Option<TokId> {
        self.toks[id as usize].prev
    }

    /// Next token, skipping over separator runs.
    pub fn next_nonsep(&self, id: TokId) -> Option<TokId> {
        let mut cur = self.toks[id as usize].next;
        while let Some(t) = cur {
            if self.toks[t as usize].kind != TokenKind::Separator {
                return Some(t);
            }
            cur = self.toks[t as usize].next;
        }
        None
    }

    /// Last token of the separator-spanning run of `kind` that starts at
    /// `id`; `id` itself when it is not of that kind.
    pub fn run_end(&self, id: TokId, kind: TokenKind) -> TokId {
        if self.toks[id as usize].kind != kind {
            return id;
        }
        let mut cur = id;
        while let Some(next) = self.next_nonsep(cur) {
            if self.toks[next as usize].kind != kind {
                break;
            }
            cur = next;
        }
        cur
    }

    /// First token of `kind` at or after `id`. Stops at the end-of-file token
    /// or the end of the chain and returns that position when nothing
    /// matches.
    pub fn seek(&self, id: TokId, kind: TokenKind) -> TokId {
        let mut cur = id;
        loop {
            let tok = &self.toks[cur as usize];
            if tok.kind == kind || tok.kind == TokenKind::Eof {
                return cur;
            }
            match tok.next {
                Some(n) => cur = n,
                None => return cur,
            }
        }
    }
}

impl std::ops::Index<TokId> for TokenArena {
    type Output = Token;

    fn index(&self, id: TokId) -> &Token {
        &self.toks[id as usize]
    }
}

impl std::ops::IndexMut<TokId> for TokenArena {
    fn index_mut(&mut self, id: TokId) -> &mut Token {
        &mut self.toks[id as usize]
    }
}

impl Default for TokenArena {
    fn default() -> Self {
        TokenArena::new()
    }
}

/// Resolves one backslash escape to its byte value.
///
/// The table is shared by char literals at scan time and by string lowering at
/// code generation time, where escapes inside string literals are expanded.
pub fn resolve_escape(c: u8) -> Option<u8> {
    match c {
        b'n' => Some(b'\n'),
        b'r' => Some(b'\r'),
        b'b' => Some(0x08),
        b't' => Some(b'\t'),
        b'a' => Some(0x07),
        b'v' => Some(0x0b),
        b'f' => Some(0x0c),
        b'e' => Some(0x1b),
        b'0' => Some(0),
        b'\\' => Some(b'\\'),
        _ => None,
    }
}

/// True for the register spellings: `ra` through `rl`, the data pointer `dp`
/// and the void sink `ss`.
pub fn is_register(tok: &Token) -> bool {
    if tok.kind != TokenKind::Id {
        return false;
    }
    if tok.text == "ss" || tok.text == "dp" {
        return true;
    }
    let bytes = tok.text.as_bytes();
    bytes.len() == 2 && bytes[0] == b'r' && (b'a'..=b'l').contains(&bytes[1])
}

fn is_id_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_id_part(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Scans `source` into the arena and returns the head of the new chain.
///
/// The chain always ends in an `Eof` token whose `next` is `None`. On error the
/// partial chain is released and the caller reports the failure under the
/// file's name.
pub fn tokenize(arena: &mut TokenArena, source: &str) -> Result<TokId, LexError> {
    let mark = arena.len();
    match scan(arena, source) {
        Ok(head) => Ok(head),
        Err(err) => {
            arena.release_from(mark);
            Err(err)
        }
    }
}

fn scan(arena: &mut TokenArena, source: &str) -> Result<TokId, LexError> {
    let bytes = source.as_bytes();
    let mut pos = 0usize;
    let mut line: u32 = 1;
    let mut column: u32 = 0;
    let mut head: Option<TokId> = None;
    let mut prev: Option<TokId> = None;

    loop {
        // Skip blanks; every consumed byte advances the column, and so does
        // reading past the end (the end-of-file position is one past the last
        // column of the final line).
        let first = loop {
            match bytes.get(pos) {
                None => {
                    column += 1;
                    break None;
                }
                Some(&b) => {
                    pos += 1;
                    column += 1;
                    if b == b' ' || b == b'\t' {
                        continue;
                    }
                    break Some(b);
                }
            }
        };

        let tok_line = line;
        let tok_column = column;

        let (kind, text, value) = match first {
            None => (TokenKind::Eof, String::new(), 0),

            Some(b'#') => {
                while let Some(&b) = bytes.get(pos) {
                    if b == b'\n' {
                        break;
                    }
                    pos += 1;
                    column += 1;
                }
                continue;
            }

            Some(b'\n') => {
                line += 1;
                column = 0;
                (TokenKind::Separator, String::from(";"), 0)
            }
            Some(b';') => (TokenKind::Separator, String::from(";"), 0),
            Some(b'[') => (TokenKind::OpenBracket, String::from("["), 0),
            Some(b']') => (TokenKind::CloseBracket, String::from("]"), 0),
            Some(b'=') => (TokenKind::Equal, String::from("="), 0),
            Some(b':') => (TokenKind::Colon, String::from(":"), 0),
            Some(b',') => (TokenKind::Comma, String::from(","), 0),
            Some(b'(') => (TokenKind::OpenParens, String::from("("), 0),
            Some(b')') => (TokenKind::CloseParens, String::from(")"), 0),
            Some(b'!') => (TokenKind::Exclamation, String::from("!"), 0),

            Some(b'\'') => {
                let payload = match bytes.get(pos) {
                    None => {
                        return Err(LexError::CharTooLong {
                            line: tok_line,
                            column: tok_column,
                        })
                    }
                    Some(&b) => b,
                };
                pos += 1;

                let (text, value) = if payload == b'\\' {
                    let esc = match bytes.get(pos) {
                        None => {
                            return Err(LexError::CharTooLong {
                                line: tok_line,
                                column: tok_column,
                            })
                        }
                        Some(&b) => b,
                    };
                    pos += 1;
                    let value = resolve_escape(esc).ok_or(LexError::InvalidEscape {
                        escape: esc as char,
                        line: tok_line,
                        column: tok_column,
                    })?;
                    column += 2;
                    (format!("\\{}", esc as char), value)
                } else {
                    if payload == 0 || payload > 127 {
                        return Err(LexError::InvalidChar {
                            ch: payload as char,
                            line: tok_line,
                            column: tok_column,
                        });
                    }
                    column += 1;
                    ((payload as char).to_string(), payload)
                };

                match bytes.get(pos) {
                    Some(b'\'') => pos += 1,
                    _ => {
                        return Err(LexError::CharTooLong {
                            line: tok_line,
                            column: tok_column,
                        })
                    }
                }
                column += 1;

                (TokenKind::CharLit, text, value)
            }

            Some(b'"') => {
                let mut text = String::new();
                loop {
                    let b = match bytes.get(pos) {
                        None => {
                            return Err(LexError::UnterminatedString {
                                line,
                                column,
                            })
                        }
                        Some(&b) => b,
                    };
                    pos += 1;
                    if b == b'"' {
                        break;
                    }
                    column += 1;

                    if text.len() >= TOKEN_MAX {
                        return Err(LexError::StringTooLong {
                            max: TOKEN_MAX,
                            line: tok_line,
                            column: tok_column,
                        });
                    }
                    if b == b'\r' || b == b'\n' {
                        return Err(LexError::StringLineBreak { line, column });
                    }
                    if b == 0 || b > 127 {
                        return Err(LexError::StringBadChar {
                            ch: b,
                            symbol: b as char,
                            line,
                            column,
                        });
                    }
                    text.push(b as char);
                }
                column += 1;

                (TokenKind::Str, text, 0)
            }

            Some(b) if is_id_start(b) => {
                let mut text = (b as char).to_string();
                while let Some(&b) = bytes.get(pos) {
                    if !is_id_part(b) {
                        break;
                    }
                    if text.len() >= TOKEN_MAX {
                        return Err(LexError::TokenTooLong {
                            max: TOKEN_MAX,
                            line: tok_line,
                            column: tok_column,
                        });
                    }
                    text.push(b as char);
                    pos += 1;
                    column += 1;
                }
                (TokenKind::Id, text, 0)
            }

            Some(b) if b.is_ascii_digit() => {
                let mut text = (b as char).to_string();
                let hex = b == b'0'
                    && matches!(bytes.get(pos), Some(b'x') | Some(b'X'));
                if hex {
                    text.push(bytes[pos] as char);
                    pos += 1;
                    column += 1;
                    while let Some(&b) = bytes.get(pos) {
                        if !b.is_ascii_hexdigit() {
                            break;
                        }
                        text.push(b as char);
                        pos += 1;
                        column += 1;
                    }
                } else {
                    while let Some(&b) = bytes.get(pos) {
                        if !b.is_ascii_digit() {
                            break;
                        }
                        text.push(b as char);
                        pos += 1;
                        column += 1;
                    }
                }

                // A literal immediately followed by more identifier characters
                // ("12ab", "0xfg") is one malformed numeral, not two tokens.
                let mut malformed = hex && text.len() == 2;
                while let Some(&b) = bytes.get(pos) {
                    if !is_id_part(b) {
                        break;
                    }
                    malformed = true;
                    text.push(b as char);
                    pos += 1;
                    column += 1;
                }
                if malformed {
                    return Err(LexError::BadNumber {
                        text,
                        line: tok_line,
                        column: tok_column,
                    });
                }

                let parsed = if hex {
                    u64::from_str_radix(&text[2..], 16)
                } else {
                    text.parse::<u64>()
                };
                let value = match parsed {
                    Ok(v) if v <= 255 => v as u8,
                    Ok(v) => {
                        return Err(LexError::NumberRange {
                            value: v,
                            line: tok_line,
                            column: tok_column,
                        })
                    }
                    Err(_) => {
                        return Err(LexError::BadNumber {
                            text,
                            line: tok_line,
                            column: tok_column,
                        })
                    }
                };

                (TokenKind::Immediate, text, value)
            }

            Some(b) => {
                return Err(LexError::Unexpected {
                    ch: b as char,
                    line,
                    column,
                })
            }
        };

        let done = kind == TokenKind::Eof;
        let id = arena.alloc(Token {
            kind,
            text,
            value,
            line: tok_line,
            column: tok_column,
            prev,
            next: None,
        });
        if let Some(p) = prev {
            arena[p].next = Some(id);
        }
        if head.is_none() {
            head = Some(id);
        }
        prev = Some(id);

        if done {
            return Ok(head.unwrap_or(id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> (TokenArena, TokId) {
        let mut arena = TokenArena::new();
        let head = tokenize(&mut arena, source).unwrap();
        (arena, head)
    }

    fn kinds(arena: &TokenArena, head: TokId) -> Vec<TokenKind> {
        let mut out = Vec::new();
        let mut cur = Some(head);
        while let Some(id) = cur {
            out.push(arena[id].kind);
            cur = arena[id].next;
        }
        out
    }

    #[test]
    fn test_basic_stream() {
        let (arena, head) = lex("load ra\n");
        assert_eq!(
            kinds(&arena, head),
            vec![
                TokenKind::Id,
                TokenKind::Id,
                TokenKind::Separator,
                TokenKind::Eof
            ]
        );
        assert_eq!(arena[head].text, "load");
        assert_eq!(arena[head].line, 1);
        assert_eq!(arena[head].column, 1);
        let reg = arena[head].next.unwrap();
        assert_eq!(arena[reg].text, "ra");
        assert_eq!(arena[reg].column, 6);
    }

    #[test]
    fn test_punctuation() {
        let (arena, head) = lex("[new] (x), a:b = !");
        let got = kinds(&arena, head);
        assert_eq!(
            got,
            vec![
                TokenKind::OpenBracket,
                TokenKind::Id,
                TokenKind::CloseBracket,
                TokenKind::OpenParens,
                TokenKind::Id,
                TokenKind::CloseParens,
                TokenKind::Comma,
                TokenKind::Id,
                TokenKind::Colon,
                TokenKind::Id,
                TokenKind::Equal,
                TokenKind::Exclamation,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_separators_share_spelling() {
        let (arena, head) = lex("a;b\nc");
        let semi = arena[head].next.unwrap();
        assert_eq!(arena[semi].kind, TokenKind::Separator);
        assert_eq!(arena[semi].text, ";");
        let b = arena[semi].next.unwrap();
        let newline = arena[b].next.unwrap();
        assert_eq!(arena[newline].kind, TokenKind::Separator);
        assert_eq!(arena[newline].text, ";");
        let c = arena[newline].next.unwrap();
        assert_eq!(arena[c].line, 2);
        assert_eq!(arena[c].column, 1);
    }

    #[test]
    fn test_comment_runs_to_line_end() {
        let (arena, head) = lex("say # greeting\nret");
        assert_eq!(
            kinds(&arena, head),
            vec![
                TokenKind::Id,
                TokenKind::Separator,
                TokenKind::Id,
                TokenKind::Eof
            ]
        );
        let sep = arena[head].next.unwrap();
        let ret = arena[sep].next.unwrap();
        assert_eq!(arena[ret].text, "ret");
        assert_eq!(arena[ret].line, 2);
    }

    #[test]
    fn test_char_literals() {
        let (arena, head) = lex("'a' '\\n' '\\e'");
        assert_eq!(arena[head].kind, TokenKind::CharLit);
        assert_eq!(arena[head].value, b'a');
        assert_eq!(arena[head].text, "a");

        let nl = arena[head].next.unwrap();
        assert_eq!(arena[nl].value, b'\n');
        assert_eq!(arena[nl].text, "\\n");

        let esc = arena[nl].next.unwrap();
        assert_eq!(arena[esc].value, 0x1b);
    }

    #[test]
    fn test_bad_escape_is_fatal() {
        let mut arena = TokenArena::new();
        let err = tokenize(&mut arena, "'\\q'").unwrap_err();
        assert!(matches!(err, LexError::InvalidEscape { escape: 'q', .. }));
        assert_eq!(arena.len(), 0);
    }

    #[test]
    fn test_unterminated_char() {
        let mut arena = TokenArena::new();
        let err = tokenize(&mut arena, "'ab'").unwrap_err();
        assert!(matches!(err, LexError::CharTooLong { .. }));
    }

    #[test]
    fn test_strings() {
        let (arena, head) = lex("\"hi there\"");
        assert_eq!(arena[head].kind, TokenKind::Str);
        assert_eq!(arena[head].text, "hi there");
    }

    #[test]
    fn test_string_keeps_raw_escapes() {
        let (arena, head) = lex("\"a\\n\"");
        assert_eq!(arena[head].text, "a\\n");
    }

    #[test]
    fn test_string_rejects_line_break() {
        let mut arena = TokenArena::new();
        let err = tokenize(&mut arena, "\"a\nb\"").unwrap_err();
        assert!(matches!(err, LexError::StringLineBreak { .. }));
    }

    #[test]
    fn test_string_length_cap() {
        let mut arena = TokenArena::new();
        let long = format!("\"{}\"", "x".repeat(TOKEN_MAX + 1));
        let err = tokenize(&mut arena, &long).unwrap_err();
        assert!(matches!(err, LexError::StringTooLong { .. }));

        let ok = format!("\"{}\"", "x".repeat(TOKEN_MAX));
        assert!(tokenize(&mut arena, &ok).is_ok());
    }

    #[test]
    fn test_numbers() {
        let (arena, head) = lex("244 0x1f 0");
        assert_eq!(arena[head].value, 244);
        let hex = arena[head].next.unwrap();
        assert_eq!(arena[hex].value, 31);
        assert_eq!(arena[hex].text, "0x1f");
        let zero = arena[hex].next.unwrap();
        assert_eq!(arena[zero].value, 0);
    }

    #[test]
    fn test_leading_zero_is_decimal() {
        let (arena, head) = lex("077");
        assert_eq!(arena[head].value, 77);
    }

    #[test]
    fn test_number_range() {
        let mut arena = TokenArena::new();
        let err = tokenize(&mut arena, "256").unwrap_err();
        assert!(matches!(err, LexError::NumberRange { value: 256, .. }));
    }

    #[test]
    fn test_malformed_numbers() {
        let mut arena = TokenArena::new();
        assert!(matches!(
            tokenize(&mut arena, "12ab").unwrap_err(),
            LexError::BadNumber { .. }
        ));
        assert!(matches!(
            tokenize(&mut arena, "0x").unwrap_err(),
            LexError::BadNumber { .. }
        ));
        assert!(matches!(
            tokenize(&mut arena, "5x3").unwrap_err(),
            LexError::BadNumber { .. }
        ));
    }

    #[test]
    fn test_identifier_with_digits() {
        let (arena, head) = lex("tmp2");
        assert_eq!(arena[head].kind, TokenKind::Id);
        assert_eq!(arena[head].text, "tmp2");
    }

    #[test]
    fn test_unexpected_character() {
        let mut arena = TokenArena::new();
        let err = tokenize(&mut arena, "$").unwrap_err();
        assert!(matches!(err, LexError::Unexpected { ch: '$', .. }));
    }

    #[test]
    fn test_failed_lex_releases_tokens() {
        let mut arena = TokenArena::new();
        tokenize(&mut arena, "keep me\n").unwrap();
        let before = arena.len();
        assert!(tokenize(&mut arena, "ok so far $").is_err());
        assert_eq!(arena.len(), before);
    }

    #[test]
    fn test_eof_token_terminates() {
        let (arena, head) = lex("");
        assert_eq!(arena[head].kind, TokenKind::Eof);
        assert_eq!(arena[head].next, None);
        assert_eq!(arena[head].line, 1);
    }

    #[test]
    fn test_prev_links() {
        let (arena, head) = lex("a b");
        let b = arena[head].next.unwrap();
        assert_eq!(arena[b].prev, Some(head));
        assert_eq!(arena[head].prev, None);
    }

    #[test]
    fn test_register_names() {
        let (arena, head) = lex("ra rl rm dp ss r count");
        let mut cur = Some(head);
        let mut regs = Vec::new();
        while let Some(id) = cur {
            if arena[id].kind != TokenKind::Eof {
                regs.push(is_register(&arena[id]));
            }
            cur = arena[id].next;
        }
        assert_eq!(regs, vec![true, true, false, true, true, false, false]);
    }

    #[test]
    fn test_escape_table() {
        assert_eq!(resolve_escape(b'n'), Some(b'\n'));
        assert_eq!(resolve_escape(b'e'), Some(0x1b));
        assert_eq!(resolve_escape(b'0'), Some(0));
        assert_eq!(resolve_escape(b'\\'), Some(b'\\'));
        assert_eq!(resolve_escape(b'q'), None);
    }
}
