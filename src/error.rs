//! Error types produced at the boundary of this crate.
//!
//! Only [`Error::Uncolorable`] is recovered internally (it drives the
//! allocator's spill/retry loop); every other variant is fatal for the
//! current translation unit. Multiple errors are not collected here — that
//! is the parser's job, out of scope for this crate.

use crate::types::Type;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("couldn't resolve symbol `{name}`")]
    Resolution { name: String },

    #[error("not an lvalue: {expr}")]
    Lvalue { expr: String },

    #[error("variable `{name}` was never placed on the stack")]
    NotOnStack { name: String },

    #[error("no implicit conversion from `{from}` to `{to}`")]
    ImplicitConversion { from: Type, to: Type },

    #[error("not a pointer type: `{ty}`")]
    NotAPointer { ty: Type },

    #[error("cannot subtract a pointer from `{ty}`")]
    InvalidPointerArithmetic { ty: Type },

    #[error("duplicate declaration of `{name}` in the current scope")]
    NameConflict { name: String },

    #[error("interference graph is not {colors}-colorable over the given range")]
    Uncolorable { colors: usize },

    #[error("register allocation did not converge after {attempts} attempts")]
    AllocationFailed { attempts: u32 },

    #[error("call to `{name}` expected {expected} argument(s), got {got}")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("function `{name}` not found")]
    FunctionNotFound { name: String },

    #[error("`{name}` is already defined")]
    Redefinition { name: String },

    /// Propagated verbatim from the (external, out-of-scope) parser.
    #[error("{0}")]
    Parse(String),
}
