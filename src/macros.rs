// Macros are token-level rewrites selected by the shape of their call. One
// name can carry several variants, each keyed by its declared slot sequence:
// typed capture slots (id, str, char, number, reg) and literal punctuation
// slots written as char literals. A call is matched by walking its argument
// tokens, expanding nested calls in place first, and collapsing every register
// spelling into one register class, so `add (ra, 5)` and `add (rb, 5)` select
// the same variant while binding different tokens. Expansion splices a fresh
// copy of the winning body into the stream where the call stood; the copies
// take the call site's position so diagnostics point at the use, except for
// bound tokens, which keep the position of the argument they came from. The
// macro named `expr` is special: its parenthesized call form is parsed right
// away as statements and leaves behind a single `rc` token, the register an
// expression computes into.

//! Macro registry, variant matching and expansion.

use log::trace;

use crate::core::{hash, SymTree};
use crate::lexer::{is_register, Token, TokenArena, TokenKind, TokId};
use crate::parser;
use crate::session::{FileId, Session};

/// Name of the macro behind bare parenthesized calls.
pub const EXPR_MACRO: &str = "expr";

/// Token left in the stream after an `expr` expansion.
pub const EXPR_RESULT: &str = "rc";

/// One element of a variant's pattern.
#[derive(Clone, Debug)]
pub struct Slot {
    pub kind: TokenKind,
    pub name: Option<String>,
}

/// One body of a macro, selected by its slot sequence.
#[derive(Clone, Debug)]
pub struct Variant {
    pub slots: Vec<Slot>,
    pub body: TokId,
}

impl Variant {
    /// True when the collapsed kinds of a call line up with this pattern.
    pub fn matches(&self, kinds: &[TokenKind]) -> bool {
        self.slots.len() == kinds.len()
            && self.slots.iter().zip(kinds).all(|(s, k)| s.kind == *k)
    }

    /// Human-readable pattern, as shown when no variant matches a call.
    pub fn signature(&self) -> String {
        let mut out = String::from("(");
        for slot in &self.slots {
            out.push(' ');
            if let Some(name) = &slot.name {
                out.push_str(name);
                out.push_str(": ");
            }
            match slot.kind {
                TokenKind::Str => out.push_str("str"),
                TokenKind::CharLit => out.push_str("char"),
                TokenKind::Immediate => out.push_str("number"),
                TokenKind::Register => out.push_str("reg"),
                TokenKind::Id => out.push_str("id"),
                other => {
                    out.push('\'');
                    out.push_str(kind_name(other));
                    out.push('\'');
                }
            }
        }
        out.push_str(" )");
        out
    }
}

/// A named macro and all its variants, in declaration order.
#[derive(Debug)]
pub struct Macro {
    pub name: String,
    pub variants: Vec<Variant>,
}

/// All macros known to a compilation.
pub struct Macros {
    tree: SymTree<Macro>,
}

impl Macros {
    pub fn new() -> Self {
        Macros {
            tree: SymTree::new(),
        }
    }

    /// Makes sure `name` exists. A declaration whose pattern later turns out
    /// to be bad still leaves the name registered, with no new variant.
    pub fn declare(&mut self, name: &str) {
        let key = hash::symbol(name);
        if self.tree.contains(key) {
            return;
        }
        self.tree.insert(
            key,
            Macro {
                name: name.to_string(),
                variants: Vec::new(),
            },
        );
    }

    pub fn find(&self, name: &str) -> Option<&Macro> {
        self.tree.find(hash::symbol(name))
    }

    /// True when `name` already has a variant with the same slot shape.
    pub fn has_variant(&self, name: &str, slots: &[Slot]) -> bool {
        let kinds: Vec<TokenKind> = slots.iter().map(|s| s.kind).collect();
        self.find(name)
            .map_or(false, |m| m.variants.iter().any(|v| v.matches(&kinds)))
    }

    pub fn add_variant(&mut self, name: &str, variant: Variant) {
        let key = hash::symbol(name);
        if let Some(mac) = self.tree.find_mut(key) {
            mac.variants.push(variant);
        } else {
            self.tree.insert(
                key,
                Macro {
                    name: name.to_string(),
                    variants: vec![variant],
                },
            );
        }
    }

    /// Body head of the parameterless variant of `name`, if any. This is what
    /// conditional compilation reads when it mentions a macro by name.
    pub fn value_of(&self, name: &str) -> Option<TokId> {
        self.find(name)?
            .variants
            .iter()
            .find(|v| v.slots.is_empty())
            .map(|v| v.body)
    }

    /// Registers a parameterless macro whose body is one synthetic string
    /// token. The driver uses this to predefine names like `TARGET`.
    pub fn define_value(&mut self, toks: &mut TokenArena, name: &str, value: &str) {
        let body = toks.alloc(Token {
            kind: TokenKind::Str,
            text: value.to_string(),
            value: 0,
            line: 0,
            column: 0,
            prev: None,
            next: None,
        });
        self.declare(name);
        self.add_variant(
            name,
            Variant {
                slots: Vec::new(),
                body,
            },
        );
    }
}

impl Default for Macros {
    fn default() -> Self {
        Macros::new()
    }
}

/// Maps a slot type name (or literal character spelling) to the token kind it
/// stands for.
pub fn slot_kind(text: &str) -> Option<TokenKind> {
    match text {
        "id" => Some(TokenKind::Id),
        "str" => Some(TokenKind::Str),
        "char" => Some(TokenKind::CharLit),
        "number" => Some(TokenKind::Immediate),
        "reg" => Some(TokenKind::Register),
        "," => Some(TokenKind::Comma),
        ":" => Some(TokenKind::Colon),
        "=" => Some(TokenKind::Equal),
        "!" => Some(TokenKind::Exclamation),
        "(" => Some(TokenKind::OpenParens),
        ")" => Some(TokenKind::CloseParens),
        "[" => Some(TokenKind::OpenBracket),
        "]" => Some(TokenKind::CloseBracket),
        ";" => Some(TokenKind::Separator),
        _ => None,
    }
}

/// Display spelling of a token kind, the inverse of [`slot_kind`].
pub fn kind_name(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Eof => "end-of-file",
        TokenKind::Id => "id",
        TokenKind::Separator => ";",
        TokenKind::OpenBracket => "[",
        TokenKind::CloseBracket => "]",
        TokenKind::Colon => ":",
        TokenKind::Comma => ",",
        TokenKind::Equal => "=",
        TokenKind::Immediate => "number",
        TokenKind::CharLit => "char",
        TokenKind::Str => "str",
        TokenKind::OpenParens => "(",
        TokenKind::CloseParens => ")",
        TokenKind::Exclamation => "!",
        TokenKind::Register => "reg",
    }
}

/// Outcome of trying to expand a token as a macro call.
pub enum Expansion {
    /// The token does not name a macro; the stream is untouched.
    NoMacro,
    /// The call was replaced. The id is the first token the caller should
    /// continue from: the body head, or the `rc` token for `expr` calls.
    Expanded(TokId),
    /// A diagnostic was already printed and counted.
    Failed,
}

/// Expands the macro call starting at `call`, which is either the name token
/// or a bare open paren for `expr` calls.
pub fn expand(sess: &mut Session, file: FileId, call: TokId) -> Expansion {
    let call_kind = sess.toks[call].kind;
    let call_line = sess.toks[call].line;
    let call_column = sess.toks[call].column;
    let pred = sess.toks[call].prev;

    let (name, expr) = if call_kind == TokenKind::OpenParens {
        (String::from(EXPR_MACRO), true)
    } else {
        let text = sess.toks[call].text.clone();
        let expr = text == EXPR_MACRO;
        (text, expr)
    };

    if sess.macros.find(&name).is_none() {
        return Expansion::NoMacro;
    }

    let args_open = if call_kind == TokenKind::OpenParens {
        Some(call)
    } else {
        match sess.toks[call].next {
            Some(n) if sess.toks[n].kind == TokenKind::OpenParens => Some(n),
            _ => None,
        }
    };

    // Walk the arguments, expanding nested calls in place. Every remaining
    // token, commas included, contributes to the shape the variant is picked
    // by; a freshly spliced body is walked token by token like any other
    // argument text.
    let mut kinds: Vec<TokenKind> = Vec::new();
    let mut args: Vec<TokId> = Vec::new();
    let mut close: Option<TokId> = None;

    if let Some(open) = args_open {
        let mut cur = sess.toks[open].next;
        loop {
            let mut t = match cur {
                Some(t) if sess.toks[t].kind != TokenKind::Eof => t,
                _ => {
                    sess.diag(
                        file,
                        call_line,
                        call_column,
                        "Unexpected end-of-file inside macro's arguments.",
                    );
                    sess.errcount += 1;
                    return Expansion::Failed;
                }
            };
            if sess.toks[t].kind == TokenKind::CloseParens {
                close = Some(t);
                break;
            }
            if sess.toks[t].kind == TokenKind::Id
                || sess.toks[t].kind == TokenKind::OpenParens
            {
                match expand(sess, file, t) {
                    Expansion::Expanded(head) => t = head,
                    Expansion::NoMacro => {}
                    Expansion::Failed => return Expansion::Failed,
                }
            }
            let kind = if is_register(&sess.toks[t]) {
                TokenKind::Register
            } else {
                sess.toks[t].kind
            };
            kinds.push(kind);
            args.push(t);
            cur = sess.toks[t].next;
        }
    }

    // Resolve the variant; on a miss, list what the macro does accept.
    let variant = {
        let chosen = sess
            .macros
            .find(&name)
            .and_then(|m| m.variants.iter().find(|v| v.matches(&kinds)))
            .cloned();
        match chosen {
            Some(v) => v,
            None => {
                sess.diag(
                    file,
                    call_line,
                    call_column,
                    &format!(
                        "Macro '{}' don't have a variant with this sequence. Instead try:",
                        name
                    ),
                );
                if let Some(mac) = sess.macros.find(&name) {
                    for v in &mac.variants {
                        eprintln!("{}", v.signature());
                    }
                }
                sess.errcount += 1;
                return Expansion::Failed;
            }
        }
    };

    trace!("expanding '{}' over {} argument tokens", name, args.len());

    // Bind named slots to their concrete tokens. A name used twice keeps its
    // first binding.
    let mut bindings: SymTree<TokId> = SymTree::new();
    for (slot, &arg) in variant.slots.iter().zip(&args) {
        if let Some(slot_name) = &slot.name {
            bindings.insert(hash::symbol(slot_name), arg);
        }
    }

    // Instantiate the body: bound identifiers become copies of their argument
    // tokens, everything else is stamped with the call site's position.
    let mut new_head: Option<TokId> = None;
    let mut new_tail: Option<TokId> = None;
    let mut cur = Some(variant.body);
    while let Some(t) = cur {
        let bound = if sess.toks[t].kind == TokenKind::Id {
            bindings.find(hash::symbol(&sess.toks[t].text)).copied()
        } else {
            None
        };
        let mut copy = match bound {
            Some(src) => sess.toks[src].clone(),
            None => {
                let mut tok = sess.toks[t].clone();
                tok.line = call_line;
                tok.column = call_column;
                tok
            }
        };
        copy.prev = new_tail;
        copy.next = None;

        let id = sess.toks.alloc(copy);
        match new_tail {
            Some(tail) => sess.toks[tail].next = Some(id),
            None => new_head = Some(id),
        }
        new_tail = Some(id);
        cur = sess.toks[t].next;
    }

    let head = match new_head {
        Some(h) => h,
        None => return Expansion::NoMacro,
    };

    let after = match close {
        Some(c) => sess.toks[c].next,
        None => sess.toks[call].next,
    };

    if let Some(p) = pred {
        sess.toks[p].next = Some(head);
    }
    sess.toks[head].prev = pred;

    if expr {
        // The body is a statement sequence: parse it now, then stand a lone
        // `rc` token where the call was, which is the register the expression
        // left its result in.
        let mut cur = Some(head);
        while let Some(t) = cur {
            if sess.toks[t].kind == TokenKind::Eof {
                break;
            }
            cur = parser::statement(sess, file, t);
        }

        let rc = sess.toks.alloc(Token {
            kind: TokenKind::Id,
            text: String::from(EXPR_RESULT),
            value: 0,
            line: call_line,
            column: call_column,
            prev: pred,
            next: after,
        });
        if let Some(p) = pred {
            sess.toks[p].next = Some(rc);
        }
        if let Some(a) = after {
            sess.toks[a].prev = Some(rc);
        }
        Expansion::Expanded(rc)
    } else {
        if let Some(tail) = new_tail {
            sess.toks[tail].next = after;
        }
        if let Some(a) = after {
            sess.toks[a].prev = new_tail;
        }
        Expansion::Expanded(head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn session_with(source: &str) -> (Session, TokId) {
        let mut sess = Session::new();
        sess.register_file("test.lia");
        let head = tokenize(&mut sess.toks, source).unwrap();
        (sess, head)
    }

    fn template(sess: &mut Session, source: &str) -> TokId {
        // A template chain must end after its last meaningful token.
        let head = tokenize(&mut sess.toks, source).unwrap();
        let mut cur = head;
        loop {
            let next = sess.toks[cur].next.unwrap();
            if sess.toks[next].kind == TokenKind::Eof {
                sess.toks[cur].next = None;
                break;
            }
            cur = next;
        }
        head
    }

    fn texts_from(sess: &Session, head: TokId) -> Vec<String> {
        let mut out = Vec::new();
        let mut cur = Some(head);
        while let Some(id) = cur {
            out.push(sess.toks[id].text.clone());
            cur = sess.toks[id].next;
        }
        out
    }

    #[test]
    fn test_parameterless_expansion() {
        let (mut sess, call) = session_with("inc;rest");
        let body = template(&mut sess, "func 4");
        sess.macros.declare("inc");
        sess.macros.add_variant(
            "inc",
            Variant {
                slots: Vec::new(),
                body,
            },
        );

        match expand(&mut sess, 0, call) {
            Expansion::Expanded(head) => {
                assert_eq!(
                    texts_from(&sess, head),
                    vec!["func", "4", ";", "rest", ""]
                );
                // Copies report the call site.
                assert_eq!(sess.toks[head].line, 1);
                assert_eq!(sess.toks[head].column, 1);
            }
            _ => panic!("expected an expansion"),
        }
        assert_eq!(sess.errcount, 0);
    }

    #[test]
    fn test_bound_argument_keeps_its_token() {
        let (mut sess, call) = session_with("setv (9)");
        let body = template(&mut sess, "load ra, x");
        sess.macros.declare("setv");
        sess.macros.add_variant(
            "setv",
            Variant {
                slots: vec![Slot {
                    kind: TokenKind::Immediate,
                    name: Some(String::from("x")),
                }],
                body,
            },
        );

        match expand(&mut sess, 0, call) {
            Expansion::Expanded(head) => {
                let texts = texts_from(&sess, head);
                assert_eq!(&texts[..4], &["load", "ra", ",", "9"]);
                let mut cur = head;
                for _ in 0..3 {
                    cur = sess.toks[cur].next.unwrap();
                }
                assert_eq!(sess.toks[cur].value, 9);
                // The bound copy keeps the argument's own position.
                assert_eq!(sess.toks[cur].column, 7);
            }
            _ => panic!("expected an expansion"),
        }
    }

    #[test]
    fn test_register_class_collapse() {
        let (mut sess, call) = session_with("clr (rb)");
        let body = template(&mut sess, "load x, 0");
        sess.macros.declare("clr");
        sess.macros.add_variant(
            "clr",
            Variant {
                slots: vec![Slot {
                    kind: TokenKind::Register,
                    name: Some(String::from("x")),
                }],
                body,
            },
        );

        match expand(&mut sess, 0, call) {
            Expansion::Expanded(head) => {
                let texts = texts_from(&sess, head);
                assert_eq!(&texts[..4], &["load", "rb", ",", "0"]);
            }
            _ => panic!("expected an expansion"),
        }
    }

    #[test]
    fn test_no_matching_variant_fails() {
        let (mut sess, call) = session_with("setv (ra)");
        let body = template(&mut sess, "func 1");
        sess.macros.declare("setv");
        sess.macros.add_variant(
            "setv",
            Variant {
                slots: vec![Slot {
                    kind: TokenKind::Immediate,
                    name: Some(String::from("x")),
                }],
                body,
            },
        );

        assert!(matches!(
            expand(&mut sess, 0, call),
            Expansion::Failed
        ));
        assert_eq!(sess.errcount, 1);
    }

    #[test]
    fn test_unknown_name_is_not_a_macro() {
        let (mut sess, call) = session_with("plain ra");
        assert!(matches!(expand(&mut sess, 0, call), Expansion::NoMacro));
        assert_eq!(sess.errcount, 0);
        // Stream left alone.
        assert_eq!(
            texts_from(&sess, call),
            vec!["plain", "ra", ""]
        );
    }

    #[test]
    fn test_variant_shapes() {
        let v = Variant {
            slots: vec![
                Slot {
                    kind: TokenKind::Register,
                    name: Some(String::from("x")),
                },
                Slot {
                    kind: TokenKind::Comma,
                    name: None,
                },
                Slot {
                    kind: TokenKind::Immediate,
                    name: Some(String::from("y")),
                },
            ],
            body: 0,
        };
        assert!(v.matches(&[
            TokenKind::Register,
            TokenKind::Comma,
            TokenKind::Immediate
        ]));
        assert!(!v.matches(&[TokenKind::Register, TokenKind::Comma]));
        assert!(!v.matches(&[
            TokenKind::Id,
            TokenKind::Comma,
            TokenKind::Immediate
        ]));
        assert_eq!(v.signature(), "( x: reg ',' y: number )");
    }

    #[test]
    fn test_value_macros() {
        let mut sess = Session::new();
        sess.macros
            .define_value(&mut sess.toks, "TARGET", "ases");
        let body = sess.macros.value_of("TARGET").unwrap();
        assert_eq!(sess.toks[body].kind, TokenKind::Str);
        assert_eq!(sess.toks[body].text, "ases");
        assert_eq!(sess.macros.value_of("OTHER"), None);
    }

    #[test]
    fn test_slot_kind_table() {
        assert_eq!(slot_kind("number"), Some(TokenKind::Immediate));
        assert_eq!(slot_kind("reg"), Some(TokenKind::Register));
        assert_eq!(slot_kind(","), Some(TokenKind::Comma));
        assert_eq!(slot_kind("bogus"), None);
        assert_eq!(kind_name(TokenKind::Immediate), "number");
    }
}
