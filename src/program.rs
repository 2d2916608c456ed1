//! A whole compilation unit: globals, function signatures, and lowered
//! functions, plus the driver that runs lowering and allocation over all of
//! them. Per spec §4.7/§5.

use indexmap::IndexMap;
use tracing::{info, instrument};

use crate::ast::NodeHandle;
use crate::error::{Error, Result};
use crate::function::{Function, LowerCtx};
use crate::regalloc::{self, AllocatorLimits};
use crate::types::{Signature, Type};
use crate::vreg::Global;

/// A whole CMM translation unit, ready for (or having undergone) lowering.
#[derive(Default)]
pub struct Program {
    pub globals: IndexMap<String, Global>,
    pub signatures: IndexMap<String, Signature>,
    pub functions: IndexMap<String, Function>,
    /// String-literal interning table (`text -> $str<n>` id), shared across
    /// every function lowered in this program via `LowerCtx::intern`.
    strings: IndexMap<String, u32>,
}

impl Program {
    pub fn new() -> Self {
        Self {
            globals: IndexMap::new(),
            signatures: IndexMap::new(),
            functions: IndexMap::new(),
            strings: IndexMap::new(),
        }
    }

    /// Registers a global variable. Its label is the name itself, prefixed
    /// with `$`, matching the original's global-area addressing scheme.
    pub fn declare_global(&mut self, name: impl Into<String>, ty: Type, initializer: Option<NodeHandle>) -> Result<()> {
        let name = name.into();
        if self.globals.contains_key(&name) {
            return Err(Error::Redefinition { name });
        }
        let label = format!("${}", name);
        self.globals.insert(name.clone(), Global { name, ty, label, initializer });
        Ok(())
    }

    /// Registers a function's signature ahead of lowering its body, so
    /// mutually recursive and forward-referencing calls resolve regardless
    /// of declaration order.
    pub fn declare_signature(&mut self, name: impl Into<String>, signature: Signature) -> Result<()> {
        let name = name.into();
        if self.signatures.contains_key(&name) {
            return Err(Error::Redefinition { name });
        }
        self.signatures.insert(name, signature);
        Ok(())
    }

    /// Lowers one `FN` node into a fully register-allocated [`Function`],
    /// inserting it into `self.functions`. The function's signature must
    /// already be registered via [`Program::declare_signature`] (lowering
    /// doesn't infer one from the node, so mutual recursion works).
    #[instrument(skip(self, source))]
    pub fn compile_function(&mut self, source: &NodeHandle, limits: AllocatorLimits) -> Result<()> {
        let mut ctx = LowerCtx { globals: &self.globals, signatures: &self.signatures, strings: &mut self.strings };
        let mut function = Function::compile(source, &mut ctx)?;
        if self.functions.contains_key(&function.name) {
            return Err(Error::Redefinition { name: function.name });
        }
        regalloc::allocate(&mut function, limits)?;
        info!(name = %function.name, "compiled");
        self.functions.insert(function.name.clone(), function);
        Ok(())
    }

    /// Lowers every `FN` node in `sources`, in order, under one shared set of
    /// globals/signatures/string table. Signatures for every function must
    /// already be registered (typically gathered in a first pass over the
    /// same `sources` before this is called), so a call to a function
    /// declared later in the unit still resolves.
    pub fn compile_all(&mut self, sources: &[NodeHandle], limits: AllocatorLimits) -> Result<()> {
        for source in sources {
            self.compile_function(source, limits)?;
        }
        Ok(())
    }

}

impl std::fmt::Display for Program {
    /// Renders every function's blocks as assembly text, in declaration
    /// order, separated by a blank line. Globals and interned strings are
    /// not emitted here — their placement in a `.data` section is a linker
    /// concern out of scope for this crate (§1 Non-goals).
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, function) in self.functions.values().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            for block in &function.blocks {
                for instr in &block.instructions {
                    writeln!(f, "{}", instr)?;
                }
            }
        }
        Ok(())
    }
}
