//! Shared AST fixture builders for the integration suites.
//!
//! There's no parser in this crate (see §1 Non-goals), so these tests build
//! the small ASTs they need directly against `cmmc::ast::AstNode`, the same
//! way a real parser's tree type would satisfy the trait.

use std::rc::Rc;

use cmmc::ast::{AstNode, Location, NodeHandle, NodeKind};

#[derive(Clone)]
pub struct TestNode {
    kind: NodeKind,
    children: Vec<NodeHandle>,
    text: Option<String>,
}

impl AstNode for TestNode {
    fn kind(&self) -> NodeKind {
        self.kind
    }
    fn children(&self) -> &[NodeHandle] {
        &self.children
    }
    fn location(&self) -> Location {
        Location::default()
    }
    fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

pub fn leaf(kind: NodeKind, text: &str) -> NodeHandle {
    Rc::new(TestNode { kind, children: vec![], text: Some(text.to_string()) })
}

pub fn tagged(kind: NodeKind, children: Vec<NodeHandle>) -> NodeHandle {
    Rc::new(TestNode { kind, children, text: None })
}

pub fn named(kind: NodeKind, text: &str, children: Vec<NodeHandle>) -> NodeHandle {
    Rc::new(TestNode { kind, children, text: Some(text.to_string()) })
}

/// Builds a `FN` node: `fn <name>(<params>) -> <ret> { <body stmts> }`.
pub fn function(name: &str, ret: NodeHandle, params: Vec<NodeHandle>, body: Vec<NodeHandle>) -> NodeHandle {
    tagged(
        NodeKind::Fn,
        vec![leaf(NodeKind::Ident, name), ret, tagged(NodeKind::Block, params), tagged(NodeKind::Block, body)],
    )
}

/// A `name: type` parameter/declaration node with no initializer.
pub fn param(name: &str, ty: NodeHandle) -> NodeHandle {
    named(NodeKind::Colon, name, vec![ty])
}

pub fn type_node(kind: NodeKind) -> NodeHandle {
    leaf(kind, "")
}

pub fn pointer_to(inner: NodeHandle) -> NodeHandle {
    tagged(NodeKind::Times, vec![inner])
}

pub fn ident(name: &str) -> NodeHandle {
    leaf(NodeKind::Ident, name)
}

pub fn number(text: &str) -> NodeHandle {
    leaf(NodeKind::Number, text)
}

pub fn ret(expr: NodeHandle) -> NodeHandle {
    tagged(NodeKind::Return, vec![expr])
}

pub fn plus(l: NodeHandle, r: NodeHandle) -> NodeHandle {
    tagged(NodeKind::Plus, vec![l, r])
}

pub fn call(callee: &str, args: Vec<NodeHandle>) -> NodeHandle {
    tagged(NodeKind::LParen, vec![ident(callee), tagged(NodeKind::Block, args)])
}
