//! The AST contract consumed from the (external, out-of-scope) parser.
//!
//! Lexing and parsing source text into a tree is someone else's job; this
//! crate only needs a tagged node with ordered children, a source location,
//! and optional lexical text. Everything in `function`/`program` is written
//! against this trait, never against a concrete parser's tree type.

use std::fmt;
use std::rc::Rc;

/// Symbolic tag of an AST node, per spec §6.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Declaration: child0 = name, child1 = type, child2 = initializer (optional)
    Colon,
    /// Function: child0 = name, child1 = return type, child2 = params, child3 = body
    Fn,
    /// child0 = expr
    Return,
    /// child0 = cond, child1 = then, child2 = else
    If,
    /// child0 = cond, child1 = body
    While,
    /// children = statements
    Block,
    /// Call: child0 = callee name, child1 = argument list
    LParen,
    Plus,
    Minus,
    /// Binary multiply, or (single child) pointer dereference
    Times,
    /// Address-of (unary)
    And,
    Ident,
    Number,
    Str,
    Char,
    True,
    False,
    Void,
    Bool,
    S8,
    S16,
    S32,
    S64,
    U8,
    U16,
    U32,
    U64,
    /// Array type: child0 = element type, child1 = count
    LSquare,
    /// Function-pointer type: child0 = return type, child1 = argument types
    FnPtr,
}

/// Where in the source a node came from. Carried through purely for error
/// reporting; this crate's logic never branches on it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct Location {
    pub line: u32,
    pub column: u32,
    pub file_id: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A node in the AST produced by the external parser.
pub trait AstNode {
    fn kind(&self) -> NodeKind;
    fn children(&self) -> &[NodeHandle];
    fn location(&self) -> Location;
    /// The lexical text backing this node, for identifiers, numbers and
    /// string/char literals. `None` for purely structural nodes.
    fn text(&self) -> Option<&str>;

    /// Convenience accessor for `children()[index]`, matching the spec's
    /// "child0/child1/..." phrasing.
    fn child(&self, index: usize) -> &NodeHandle {
        &self.children()[index]
    }
}

/// A shared handle to an AST node. `Rc` rather than a borrow because
/// `Global::initializer` and `Function`'s source body both need to retain a
/// reference past the lifetime of the top-level parse call.
pub type NodeHandle = Rc<dyn AstNode>;
