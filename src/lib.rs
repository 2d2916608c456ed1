//! Compiler backend for CMM, targeting the Why RISC ISA: an instruction IR,
//! AST-to-IR lowering, and a graph-coloring register allocator.
//!
//! This crate starts after parsing: it consumes an AST built by an external
//! parser against the [`ast::AstNode`] contract, and produces textual
//! assembly for the Why ISA via `Display`. It does not lex, parse, link, or
//! emit object files — see each module's Non-goals for the exact boundary.
//!
//! ```
//! use cmmc::program::Program;
//! use cmmc::regalloc::AllocatorLimits;
//!
//! let mut program = Program::new();
//! // `source` is built by an external parser against `cmmc::ast::AstNode`.
//! // program.declare_signature("main", signature)?;
//! // program.compile_all(&[source], AllocatorLimits::default())?;
//! // println!("{}", program);
//! ```

#![deny(unused_must_use)]

pub mod ast;
pub mod block;
pub mod cfg;
pub mod error;
pub mod function;
pub mod graph;
pub mod imm;
pub mod instruction;
pub mod liveness;
pub mod program;
pub mod regalloc;
pub mod scope;
pub mod types;
pub mod vreg;
pub mod why;

pub use error::{Error, Result};
pub use function::Function;
pub use program::Program;
pub use regalloc::AllocatorLimits;
pub use types::Type;
