// One Session owns everything a compilation accumulates: the token arena, the
// instruction list the parser builds, the per-file records with their include
// guard, and the four name registries (commands, procedures, macros, imports).
// Instructions form a singly linked list threaded by arena indices, because
// code generation reorders it wholesale when procedure bodies are pulled to the
// front of the program; each instruction points at the head of its detached
// token chain, which carries the operands. Errors are reported the moment they
// are found and only counted here, so one bad statement never hides the next:
// the driver decides from the final count whether any output is kept.

//! Compilation state shared by parsing and code generation.

use std::path::PathBuf;

use crate::cmd::Commands;
use crate::core::{hash, report, SymTree};
use crate::lexer::{TokenArena, TokId};
use crate::macros::Macros;
use crate::procs::Procs;

/// Index of an instruction inside the [`InstArena`].
pub type InstId = u32;

/// Index of a source file inside [`Session::files`].
pub type FileId = u32;

/// Discriminates every statement the parser can produce.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InstKind {
    Func,
    Load,
    Store,
    Push,
    Pop,
    Call,
    Ret,
    Proc,
    EndProc,
    PrTab,
    If,
    IfBlock,
    EndIf,
    Say,
    Ases,
    Cmd,
}

/// One parsed statement.
///
/// `child` heads the statement's token chain, cut loose from the stream right
/// after the last operand; the keyword (or command name) token comes first.
#[derive(Debug)]
pub struct Inst {
    pub kind: InstKind,
    pub child: TokId,
    pub file: FileId,
    pub next: Option<InstId>,
}

/// Flat storage for instructions; list order lives in the `next` links.
pub struct InstArena {
    insts: Vec<Inst>,
}

impl InstArena {
    pub fn new() -> Self {
        InstArena { insts: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    pub fn alloc(&mut self, inst: Inst) -> InstId {
        let id = self.insts.len() as InstId;
        self.insts.push(inst);
        id
    }
}

impl std::ops::Index<InstId> for InstArena {
    type Output = Inst;

    fn index(&self, id: InstId) -> &Inst {
        &self.insts[id as usize]
    }
}

impl std::ops::IndexMut<InstId> for InstArena {
    fn index_mut(&mut self, id: InstId) -> &mut Inst {
        &mut self.insts[id as usize]
    }
}

impl Default for InstArena {
    fn default() -> Self {
        InstArena::new()
    }
}

/// Per-file record. `stop` is raised by `[action stop]` and by a failed
/// `[require ...]`, and ends parsing of this file only.
pub struct SourceFile {
    pub name: String,
    pub head: Option<TokId>,
    pub stop: bool,
}

/// An open block waiting for its closing keyword.
pub struct Ctx {
    pub opener: InstId,
    pub closer: InstKind,
}

/// The procedure currently being declared, if any.
pub struct OpenProc {
    pub index: u32,
    pub inst: InstId,
}

/// All state of one compilation.
pub struct Session {
    pub toks: TokenArena,
    pub insts: InstArena,
    pub inst_head: Option<InstId>,
    pub inst_tail: Option<InstId>,
    pub files: Vec<SourceFile>,
    pub imports: SymTree<FileId>,
    pub cmds: Commands,
    pub procs: Procs,
    pub macros: Macros,
    pub ctx: Vec<Ctx>,
    pub open_proc: Option<OpenProc>,
    pub search_paths: Vec<PathBuf>,
    pub errcount: u32,
    pub pretty: bool,
}

impl Session {
    pub fn new() -> Self {
        Session {
            toks: TokenArena::new(),
            insts: InstArena::new(),
            inst_head: None,
            inst_tail: None,
            files: Vec::new(),
            imports: SymTree::new(),
            cmds: Commands::new(),
            procs: Procs::new(),
            macros: Macros::new(),
            ctx: Vec::new(),
            open_proc: None,
            search_paths: Vec::new(),
            errcount: 0,
            pretty: false,
        }
    }

    /// Registers a file by the name it was requested with. Returns `None` when
    /// the name was seen before, which makes repeated imports a no-op.
    pub fn register_file(&mut self, name: &str) -> Option<FileId> {
        let key = hash::symbol(name);
        if self.imports.contains(key) {
            return None;
        }
        let id = self.files.len() as FileId;
        self.files.push(SourceFile {
            name: name.to_string(),
            head: None,
            stop: false,
        });
        self.imports.insert(key, id);
        Some(id)
    }

    /// Appends a statement to the program.
    pub fn inst_add(&mut self, kind: InstKind, child: TokId, file: FileId) -> InstId {
        let id = self.insts.alloc(Inst {
            kind,
            child,
            file,
            next: None,
        });
        match self.inst_tail {
            Some(tail) => self.insts[tail].next = Some(id),
            None => self.inst_head = Some(id),
        }
        self.inst_tail = Some(id);
        id
    }

    /// Prints a diagnostic under the given file's name. Counting is left to
    /// the caller, which knows whether the condition was already accounted.
    pub fn diag(&self, file: FileId, line: u32, column: u32, msg: &str) {
        report(&self.files[file as usize].name, line, column, msg);
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{Token, TokenKind};

    fn token(sess: &mut Session, text: &str) -> TokId {
        sess.toks.alloc(Token {
            kind: TokenKind::Id,
            text: text.to_string(),
            value: 0,
            line: 1,
            column: 1,
            prev: None,
            next: None,
        })
    }

    #[test]
    fn test_inst_list_links_in_order() {
        let mut sess = Session::new();
        let a = token(&mut sess, "push");
        let b = token(&mut sess, "pop");

        let first = sess.inst_add(InstKind::Push, a, 0);
        let second = sess.inst_add(InstKind::Pop, b, 0);

        assert_eq!(sess.inst_head, Some(first));
        assert_eq!(sess.inst_tail, Some(second));
        assert_eq!(sess.insts[first].next, Some(second));
        assert_eq!(sess.insts[second].next, None);
    }

    #[test]
    fn test_register_file_guards_repeats() {
        let mut sess = Session::new();
        assert_eq!(sess.register_file("main.lia"), Some(0));
        assert_eq!(sess.register_file("util.lia"), Some(1));
        assert_eq!(sess.register_file("main.lia"), None);
        assert_eq!(sess.files.len(), 2);
    }

    #[test]
    fn test_ctx_stack_order() {
        let mut sess = Session::new();
        let a = token(&mut sess, "ifz");
        let opener = sess.inst_add(InstKind::IfBlock, a, 0);
        sess.ctx.push(Ctx {
            opener,
            closer: InstKind::EndIf,
        });
        let popped = sess.ctx.pop().unwrap();
        assert_eq!(popped.opener, opener);
        assert!(sess.ctx.is_empty());
    }
}
