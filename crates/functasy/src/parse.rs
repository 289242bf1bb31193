//! Parser and function arena.
//!
//! A program is a tree of functions. Parsing flattens the tree into an arena
//! ([`Program`]) indexed by [`FunctionId`]; element lists refer to child
//! functions by id, so the arena fully owns the AST and closures can name
//! functions with a plain `u32`. Functions are stored in first-seen preorder
//! and index 0 is the implicit root (depth 0, wraps the whole source).
//!
//! While a function is being parsed, every identifier that occurs inside it is
//! attributed to the enclosing functions: the function whose argument the
//! identifier names gets `arg_used` set, and every function nested below that
//! one records the id in its free-identifier list. The evaluator later uses
//! these lists to decide which cells a literal captures and whether a call
//! allocates an argument cell.

use smallvec::SmallVec;

use crate::idents;
use crate::tokenize::{self, SyntaxError, Token};

/// Index of a function in a [`Program`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(u32);

impl FunctionId {
    /// The implicit outermost function.
    pub const ROOT: Self = Self(0);

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }
}

/// One element of a function body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elem {
    /// De Bruijn-style slot reference; `0` is the outermost binding.
    Ident(u32),
    /// Function literal.
    Func(FunctionId),
}

/// A parsed function: its nesting depth, body elements, and the binding
/// metadata the evaluator needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    depth: u32,
    elems: Vec<Elem>,
    free_idents: SmallVec<[u32; 4]>,
    arg_used: bool,
}

impl Function {
    fn new(depth: u32) -> Self {
        Self {
            depth,
            elems: Vec::new(),
            free_idents: SmallVec::new(),
            arg_used: false,
        }
    }

    /// Nesting depth; the function's own argument occupies slot `depth - 1`.
    #[inline]
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[inline]
    #[must_use]
    pub fn elems(&self) -> &[Elem] {
        &self.elems
    }

    /// Slots of enclosing bindings referenced anywhere inside this function,
    /// sorted ascending. The function's own argument slot is never listed.
    #[inline]
    #[must_use]
    pub fn free_idents(&self) -> &[u32] {
        &self.free_idents
    }

    /// Whether the function's own argument is referenced anywhere inside it.
    /// Calls to functions that ignore their argument drop it without
    /// allocating a cell.
    #[inline]
    #[must_use]
    pub fn arg_used(&self) -> bool {
        self.arg_used
    }

    /// The empty function. Evaluating it yields the meta closure.
    #[inline]
    #[must_use]
    pub fn is_meta(&self) -> bool {
        self.elems.is_empty()
    }
}

/// Incremental arena construction, shared by the parser and the snapshot
/// loader. Functions get their arena index when opened, so ids are assigned
/// in preorder.
pub(crate) struct ProgramBuilder {
    funcs: Vec<Function>,
    stack: Vec<usize>,
}

impl ProgramBuilder {
    pub(crate) fn new() -> Self {
        Self {
            funcs: vec![Function::new(0)],
            stack: vec![0],
        }
    }

    /// Current nesting depth; identifiers pushed now must be `< depth`.
    pub(crate) fn depth(&self) -> u32 {
        self.stack.len() as u32 - 1
    }

    pub(crate) fn open_func(&mut self) -> FunctionId {
        let id = FunctionId(self.funcs.len() as u32);
        self.funcs.push(Function::new(self.stack.len() as u32));
        self.stack.push(id.index());
        id
    }

    pub(crate) fn close_func(&mut self) {
        // Free idents are final once the function closes; nothing below it on
        // the stack can touch it again.
        let index = match self.stack.pop() {
            Some(index) => index,
            None => return,
        };
        self.funcs[index].free_idents.sort_unstable();
        self.funcs[index].free_idents.dedup();
        if let Some(&parent) = self.stack.last() {
            self.funcs[parent].elems.push(Elem::Func(FunctionId(index as u32)));
        }
    }

    /// Records identifier `id` in the innermost open function and attributes
    /// it to every function it is free in. The function at depth `id + 1`
    /// binds the slot as its own argument; the ones nested inside it list it
    /// as a free identifier.
    pub(crate) fn push_ident(&mut self, id: u32) {
        if let Some(&current) = self.stack.last() {
            self.funcs[current].elems.push(Elem::Ident(id));
        }
        for &index in &self.stack[(id as usize + 1)..] {
            let func = &mut self.funcs[index];
            if id == func.depth - 1 {
                func.arg_used = true;
            } else {
                func.free_idents.push(id);
            }
        }
    }

    pub(crate) fn finish(mut self) -> Program {
        while self.stack.len() > 1 {
            self.close_func();
        }
        self.stack.clear();
        Program { funcs: self.funcs }
    }
}

/// An immutable parsed program: the function arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    funcs: Vec<Function>,
}

impl Program {
    /// Parses source text. The resulting arena is never empty; the root is
    /// always present even for blank input.
    pub fn parse(src: &str) -> Result<Self, SyntaxError> {
        let mut builder = ProgramBuilder::new();
        for token in tokenize::tokenize(src)? {
            match token {
                Token::Open => {
                    builder.open_func();
                }
                Token::Close => builder.close_func(),
                Token::Ident { id, .. } => builder.push_ident(id),
            }
        }
        Ok(builder.finish())
    }

    #[inline]
    #[must_use]
    pub fn func(&self, id: FunctionId) -> &Function {
        &self.funcs[id.index()]
    }

    /// Number of functions in the arena, root included.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        // The root always exists.
        false
    }

    /// Renders a function back to canonical source text: no whitespace,
    /// identifiers at the minimal width their depth allows. The root renders
    /// bare; any other function is parenthesised.
    #[must_use]
    pub fn to_source(&self, id: FunctionId) -> String {
        let base_depth = self.func(id).depth;
        let mut out = String::new();
        let mut stack: Vec<(FunctionId, usize)> = vec![(id, 0)];

        while let Some(frame) = stack.last_mut() {
            let func = &self.funcs[frame.0.index()];
            if frame.1 == func.elems.len() {
                stack.pop();
                if !stack.is_empty() {
                    out.push(')');
                }
                continue;
            }
            let elem = func.elems[frame.1];
            frame.1 += 1;
            match elem {
                Elem::Ident(ident) => {
                    let depth = base_depth + stack.len() as u32 - 1;
                    out.push_str(&idents::encode(ident, idents::width_for_depth(depth)));
                }
                Elem::Func(child) => {
                    out.push('(');
                    stack.push((child, 0));
                }
            }
        }

        if base_depth == 0 {
            out
        } else {
            format!("({out})")
        }
    }
}
