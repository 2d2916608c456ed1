//! Lexical scoping for name resolution during lowering, per spec §4.2/§4.3.
//!
//! The original keeps an open hierarchy of `Scope` subclasses reached
//! through a shared pointer, so a `FunctionScope` can hold a live reference
//! back into the `Function` being built. Rust's aliasing rules don't allow
//! that here — the same `Function` is mutably borrowed while lowering runs —
//! so a scope instead owns a snapshot of the name bindings it introduces.
//! Since the set of scope shapes is closed and known up front, a plain enum
//! stands in for the virtual-dispatch hierarchy; nothing is lost by not
//! having a trait object here, since no one outside this module ever needs
//! to add a new kind of scope.

use indexmap::IndexMap;

use crate::vreg::VarId;

/// A name-resolution scope, innermost enclosing scope resolved first.
#[derive(Clone, Debug)]
pub enum Scope {
    /// Resolves nothing; the outermost failure case.
    Empty,
    /// A block's locally declared variables.
    Block(IndexMap<String, VarId>),
    /// A function's parameters.
    Function(IndexMap<String, VarId>),
    /// A chain of scopes, searched innermost-first.
    Multi(Vec<Scope>),
}

impl Scope {
    pub fn block() -> Self {
        Scope::Block(IndexMap::new())
    }

    pub fn function(params: IndexMap<String, VarId>) -> Self {
        Scope::Function(params)
    }

    pub fn multi(scopes: Vec<Scope>) -> Self {
        Scope::Multi(scopes)
    }

    /// Introduces `name` into this scope, shadowing any existing binding.
    /// On a `Multi` chain, targets the innermost (last) scope in the chain —
    /// a fresh `while`/`if`/`{}` body always appends its own `Block` scope
    /// as the chain's last element before lowering its statements, so
    /// "innermost" and "last" coincide. No-op on `Empty`.
    pub fn declare(&mut self, name: impl Into<String>, id: VarId) {
        match self {
            Scope::Block(vars) | Scope::Function(vars) => {
                vars.insert(name.into(), id);
            }
            Scope::Multi(scopes) => {
                if let Some(innermost) = scopes.last_mut() {
                    innermost.declare(name, id);
                }
            }
            Scope::Empty => {}
        }
    }

    pub fn lookup(&self, name: &str) -> Option<VarId> {
        match self {
            Scope::Empty => None,
            Scope::Block(vars) | Scope::Function(vars) => vars.get(name).copied(),
            Scope::Multi(scopes) => scopes.iter().rev().find_map(|s| s.lookup(name)),
        }
    }
}
