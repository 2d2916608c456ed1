//! Immediate operands: a compile-time integer, a reference to a not-yet
//! register-allocated variable (used transiently while lowering, before a
//! stack offset or physical register is known), or a symbolic label.

use std::fmt;

use crate::vreg::VarId;

/// An operand that isn't a register. Printing differs per variant;
/// equality is structural.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Immediate {
    Int(i64),
    Var(VarId),
    Label(String),
}

impl From<i64> for Immediate {
    fn from(v: i64) -> Self {
        Immediate::Int(v)
    }
}

impl From<String> for Immediate {
    fn from(v: String) -> Self {
        Immediate::Label(v)
    }
}

impl From<&str> for Immediate {
    fn from(v: &str) -> Self {
        Immediate::Label(v.to_string())
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int(v) => write!(f, "{}", v),
            Immediate::Var(id) => write!(f, "{}", id),
            Immediate::Label(label) => write!(f, "{}", label),
        }
    }
}
