//! The source-language type system: integer widths, signedness,
//! pointer/array/function-pointer types, and the assignability/casting
//! rules that govern implicit conversions during lowering.

use std::fmt;

use crate::error::{Error, Result};
use crate::function::Function;
use crate::instruction::{AluOp, Instruction};
use crate::vreg::Reg;
use serde::Serialize;

/// A type in the source language.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Type {
    Void,
    Bool,
    Int { width: u8, signed: bool },
    Pointer(Box<Type>),
    Array { element: Box<Type>, count: u64 },
    FnPointer { ret: Box<Type>, args: Vec<Type> },
}

impl Type {
    pub fn s8() -> Self {
        Type::Int { width: 8, signed: true }
    }
    pub fn s16() -> Self {
        Type::Int { width: 16, signed: true }
    }
    pub fn s32() -> Self {
        Type::Int { width: 32, signed: true }
    }
    pub fn s64() -> Self {
        Type::Int { width: 64, signed: true }
    }
    pub fn u8() -> Self {
        Type::Int { width: 8, signed: false }
    }
    pub fn u16() -> Self {
        Type::Int { width: 16, signed: false }
    }
    pub fn u32() -> Self {
        Type::Int { width: 32, signed: false }
    }
    pub fn u64() -> Self {
        Type::Int { width: 64, signed: false }
    }

    pub fn pointer(pointee: Type) -> Self {
        Type::Pointer(Box::new(pointee))
    }

    pub fn array(element: Type, count: u64) -> Self {
        Type::Array { element: Box::new(element), count }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int { .. })
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    /// Array-of-T decays to pointer-to-T everywhere except in declarations.
    pub fn decay(&self) -> Type {
        match self {
            Type::Array { element, .. } => Type::Pointer(element.clone()),
            other => other.clone(),
        }
    }

    /// The pointee type, decaying arrays first. Panics if `self` is not a
    /// pointer or array; callers must check `is_pointer`/array-ness first.
    pub fn pointee(&self) -> &Type {
        match self {
            Type::Pointer(inner) => inner,
            Type::Array { element, .. } => element,
            other => panic!("{} is not a pointer or array type", other),
        }
    }

    /// Size in bytes of a value of this type, for pointer-arithmetic scaling
    /// and stack-slot allocation. Every scalar occupies a full machine word
    /// on this architecture except explicitly narrow integers.
    pub fn size_of(&self) -> i64 {
        match self {
            Type::Void => 0,
            Type::Bool => 1,
            Type::Int { width, .. } => (*width as i64) / 8,
            Type::Pointer(_) | Type::FnPointer { .. } => crate::why::WORD_SIZE,
            Type::Array { element, count } => element.size_of() * (*count as i64),
        }
    }

    /// Assignability `self <- other`, per spec §3.
    pub fn assignable_from(&self, other: &Type) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (Type::Bool, Type::Int { .. }) | (Type::Int { .. }, Type::Bool) => true,
            (
                Type::Int { width: w1, signed: s1 },
                Type::Int { width: w2, signed: s2 },
            ) => w1 == w2 && s1 == s2,
            (Type::Pointer(a), Type::Pointer(b)) => {
                a.is_void() || b.is_void() || a.assignable_from(b) || **a == **b
            }
            (Type::Pointer(a), Type::Array { element, .. }) => {
                a.is_void() || a.assignable_from(element) || **a == **element
            }
            (Type::FnPointer { ret: r1, args: a1 }, Type::FnPointer { ret: r2, args: a2 }) => {
                r1 == r2 && a1 == a2
            }
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Bool => write!(f, "bool"),
            Type::Int { width, signed } => {
                write!(f, "{}{}", if *signed { "s" } else { "u" }, width)
            }
            Type::Pointer(inner) => write!(f, "{}*", inner),
            Type::Array { element, count } => write!(f, "{}[{}]", element, count),
            Type::FnPointer { ret, args } => {
                write!(f, "{}(", ret)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")*")
            }
        }
    }
}

/// A callable's declared shape: return type plus positional argument types.
/// Looked up by name during call lowering to arity-check and to decide
/// whether a call site's destination vreg should receive a moved result.
#[derive(Clone, Debug, PartialEq)]
pub struct Signature {
    pub ret: Type,
    pub args: Vec<Type>,
}

/// Attempts to insert the minimum instructions that make `vreg: from` usable
/// as `to`, per spec §4.1. Returns whether a legal coercion exists; emits
/// instructions into `function` as a side effect when one does.
pub fn try_cast(from: &Type, to: &Type, vreg: Reg, function: &mut Function) -> bool {
    let from = from.decay();
    let to = to.decay();

    if to.assignable_from(&from) {
        return true;
    }

    if let (Type::Int { width: fw, signed: fs }, Type::Int { width: tw, .. }) = (&from, &to) {
        if fw < tw {
            if *fs {
                function.push(Instruction::SignExtend { width: *fw, reg });
            } else {
                // Unsigned widening needs no instruction: the high bits are
                // already zero because every narrower write masked them.
            }
            return true;
        }
        // Narrowing (tw <= fw, and not already covered by assignable_from
        // above since widths/signs differ): mask to the target width.
        let mask = mask_for_width(*tw);
        function.push(Instruction::IType { op: AluOp::And, src: reg, dest: reg, imm: mask.into() });
        return true;
    }

    false
}

/// Type-checks an assignment, raising [`Error::ImplicitConversion`] if
/// `try_cast` cannot bridge `from` to `to`.
pub fn type_check(from: &Type, to: &Type, vreg: Reg, function: &mut Function) -> Result<()> {
    if try_cast(from, to, vreg, function) {
        Ok(())
    } else {
        Err(Error::ImplicitConversion { from: from.clone(), to: to.clone() })
    }
}

/// `2^width - 1`, computed without relying on a host-`int`-sized constant.
pub fn mask_for_width(width: u8) -> i64 {
    if width >= 64 {
        -1i64
    } else {
        (1i64 << width) - 1
    }
}
