//! AST-to-IR lowering: expressions, statements, calls, stack frame, and the
//! prologue/epilogue, per spec §4.2/§4.3. Grounded on `Expr.cpp` and
//! `Function.cpp`: the shape of the lowering (what gets compiled into which
//! destination register, in what order) follows those files variant for
//! variant, rewritten against this crate's IR instead of emitting assembly
//! text directly.

use indexmap::IndexMap;
use tracing::{debug, instrument};

use crate::ast::{NodeHandle, NodeKind};
use crate::block::{BasicBlock, BlockId};
use crate::error::{Error, Result};
use crate::instruction::{AluOp, Comparison, Condition, Instruction, Size};
use crate::scope::Scope;
use crate::types::{Signature, Type};
use crate::vreg::{Global, Reg, VarId, Variable};
use crate::why;

/// Shared lowering context: the pieces of program-level state expression and
/// statement lowering need read access to, threaded through instead of
/// giving `Function` a back-reference to its owning `Program` (which would
/// recreate the aliasing problem the scope chain already sidesteps — see
/// `scope.rs`).
pub struct LowerCtx<'a> {
    pub globals: &'a IndexMap<String, Global>,
    pub signatures: &'a IndexMap<String, Signature>,
    pub strings: &'a mut IndexMap<String, u32>,
}

impl<'a> LowerCtx<'a> {
    /// Interns `text`, returning the stable `$str<n>` label for it.
    fn intern(&mut self, text: &str) -> String {
        let next_id = self.strings.len() as u32;
        let id = *self.strings.entry(text.to_string()).or_insert(next_id);
        format!("$str{}", id)
    }
}

/// A function being (or already) lowered to IR.
#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    pub return_type: Type,
    pub arguments: Vec<String>,
    pub variables: IndexMap<String, VarId>,
    pub variable_table: IndexMap<VarId, Variable>,
    pub stack_usage: i64,
    /// Flat pre-split instruction stream, built during lowering. Partitioned
    /// into `blocks` by [`Function::finish`] once lowering completes.
    pub instructions: Vec<Instruction>,
    pub blocks: Vec<BasicBlock>,
    next_var: u32,
    next_block: u32,
}

impl Function {
    pub fn new(name: impl Into<String>, return_type: Type) -> Self {
        Self {
            name: name.into(),
            return_type,
            arguments: Vec::new(),
            variables: IndexMap::new(),
            variable_table: IndexMap::new(),
            stack_usage: 0,
            instructions: Vec::new(),
            blocks: Vec::new(),
            next_var: 0,
            next_block: 0,
        }
    }

    /// Builds a `Function` directly from already-formed blocks, bypassing
    /// lowering entirely. Used by tests that exercise `cfg`/`liveness`/
    /// `regalloc` in isolation without round-tripping through an AST.
    pub fn from_blocks(name: impl Into<String>, blocks: Vec<BasicBlock>) -> Self {
        Self { blocks, ..Self::new(name, Type::Void) }
    }

    pub fn new_var(&mut self, ty: Type) -> Reg {
        let id = VarId(self.next_var);
        self.next_var += 1;
        let name = format!("${}", id.0);
        self.variable_table.insert(id, Variable::new(id, name, ty));
        Reg::Virtual(id)
    }

    pub fn precolored(&self, offset: u8) -> Reg {
        Reg::Physical(offset)
    }

    /// An assembler-scratch register (`$m0`, `$m1`, ...), used to hold
    /// condition values while lowering `if`/`while`.
    pub fn mx(&self, n: u8) -> Reg {
        self.precolored(why::ASSEMBLER_OFFSET + n)
    }

    pub fn push(&mut self, instr: Instruction) {
        self.instructions.push(instr);
    }

    fn fresh_block_label(&mut self) -> String {
        let n = self.next_block;
        self.next_block += 1;
        format!(".{}${}", self.name, n)
    }

    fn add_to_stack(&mut self, id: VarId, ty: &Type) -> Result<i64> {
        let variable = self.variable_table.get(&id).expect("add_to_stack called with an unknown variable");
        if variable.stack_offset.is_some() {
            let name = variable.name.clone();
            return Err(Error::Redefinition { name });
        }
        let offset = self.stack_usage;
        self.variable_table.get_mut(&id).unwrap().stack_offset = Some(offset);
        self.stack_usage += ty.size_of();
        Ok(offset)
    }

    fn declare_param(&mut self, name: &str, ty: Type, physical: u8) -> VarId {
        let id = VarId(self.next_var);
        self.next_var += 1;
        self.variable_table.insert(id, Variable::precolored(id, name, ty, physical));
        self.variables.insert(name.to_string(), id);
        id
    }

    /// Looks up a local variable's type, given its id.
    fn var_type(&self, id: VarId) -> Type {
        self.variable_table.get(&id).map(|v| v.ty.clone()).unwrap_or(Type::Void)
    }

    fn var_reg(&self, id: VarId) -> Reg {
        self.variable_table.get(&id).map(|v| v.reg).unwrap_or(Reg::Virtual(id))
    }

    fn var_stack_offset(&self, id: VarId) -> Result<i64> {
        let variable = self.variable_table.get(&id);
        variable.and_then(|v| v.stack_offset).ok_or_else(|| {
            let name = variable.map(|v| v.name.clone()).unwrap_or_default();
            Error::NotOnStack { name }
        })
    }

    /// Resolves a source-type AST node (`§6`: `VOID/BOOL/S8.../LSQUARE/FNPTR`,
    /// and `TIMES` with a single child for pointer-to) into a [`Type`].
    fn type_from_node(node: &NodeHandle) -> Result<Type> {
        Ok(match node.kind() {
            NodeKind::Void => Type::Void,
            NodeKind::Bool => Type::Bool,
            NodeKind::S8 => Type::s8(),
            NodeKind::S16 => Type::s16(),
            NodeKind::S32 => Type::s32(),
            NodeKind::S64 => Type::s64(),
            NodeKind::U8 => Type::u8(),
            NodeKind::U16 => Type::u16(),
            NodeKind::U32 => Type::u32(),
            NodeKind::U64 => Type::u64(),
            NodeKind::Times => Type::pointer(Self::type_from_node(node.child(0))?),
            NodeKind::LSquare => {
                let element = Self::type_from_node(node.child(0))?;
                let count: u64 = node
                    .child(1)
                    .text()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| Error::Parse("array type missing element count".into()))?;
                Type::array(element, count)
            }
            NodeKind::FnPtr => {
                let ret = Self::type_from_node(node.child(0))?;
                let args = node.child(1).children().iter().map(Self::type_from_node).collect::<Result<_>>()?;
                Type::FnPointer { ret: Box::new(ret), args }
            }
            other => return Err(Error::Parse(format!("not a type node: {:?}", other))),
        })
    }

    /// Compiles a function definition node (`§6`: `FN — child0=name,
    /// child1=return-type, child2=params, child3=body`) end to end: binds
    /// parameters to the first architectural argument registers, lowers the
    /// body, and wraps it in the standard prologue/epilogue.
    #[instrument(skip(source, ctx), fields(name))]
    pub fn compile(source: &NodeHandle, ctx: &mut LowerCtx<'_>) -> Result<Function> {
        let name = source.child(0).text().unwrap_or_default().to_string();
        tracing::Span::current().record("name", &name.as_str());
        let return_type = Self::type_from_node(source.child(1))?;
        let mut function = Function::new(name.clone(), return_type);

        let params = source.child(2).children();
        if params.len() > why::ARGUMENT_COUNT as usize {
            return Err(Error::ArityMismatch {
                name: name.clone(),
                expected: why::ARGUMENT_COUNT as usize,
                got: params.len(),
            });
        }
        let mut param_bindings = IndexMap::new();
        for (i, param) in params.iter().enumerate() {
            let param_name = param.text().unwrap_or_default().to_string();
            let ty = Self::type_from_node(param.child(0))?;
            if function.variables.contains_key(&param_name) {
                return Err(Error::NameConflict { name: param_name });
            }
            let id = function.declare_param(&param_name, ty, why::ARGUMENT_OFFSET + i as u8);
            function.arguments.push(param_name.clone());
            param_bindings.insert(param_name, id);
        }

        let function_scope = Scope::function(param_bindings);
        let mut scope = Scope::multi(vec![function_scope, Scope::block()]);

        debug!(body_statements = source.child(3).children().len(), "lowering function body");
        for stmt in source.child(3).children() {
            function.compile_stmt(stmt, &mut scope, ctx)?;
        }

        function.emit_prologue_epilogue();
        function.finish();
        Ok(function)
    }

    fn emit_prologue_epilogue(&mut self) {
        let fp = self.precolored(why::FRAME_POINTER_OFFSET);
        let rt = self.precolored(why::RETURN_ADDRESS_OFFSET);
        let sp = self.precolored(why::STACK_POINTER_OFFSET);

        let prologue =
            [Instruction::StackPush { reg: rt }, Instruction::StackPush { reg: fp }, Instruction::Move { src: sp, dest: fp }];
        self.instructions.splice(0..0, prologue);

        self.push(Instruction::Label(format!(".{}$e", self.name)));
        self.push(Instruction::StackPop { reg: fp });
        self.push(Instruction::StackPop { reg: rt });
        self.push(Instruction::JumpRegister { reg: rt, link: false });
    }

    /// Partitions `instructions` into `blocks` at label boundaries and after
    /// every block-ending instruction, then wires predecessor/successor
    /// edges from jump targets and fallthrough.
    fn finish(&mut self) {
        let mut blocks = Vec::new();
        let mut current = BasicBlock::new(BlockId(0), format!(".{}$entry", self.name));

        for instr in std::mem::take(&mut self.instructions) {
            if let Instruction::Label(label) = &instr {
                if !current.instructions.is_empty() {
                    blocks.push(current);
                    current = BasicBlock::new(BlockId(blocks.len()), label.clone());
                } else {
                    current.label = label.clone();
                }
                continue;
            }
            let ends_block = instr.ends_block();
            current.push(instr);
            if ends_block {
                blocks.push(current);
                let label = self.fresh_block_label();
                current = BasicBlock::new(BlockId(blocks.len()), label);
            }
        }
        if !current.instructions.is_empty() || blocks.is_empty() {
            blocks.push(current);
        }
        for (i, block) in blocks.iter_mut().enumerate() {
            block.id = BlockId(i);
        }

        let label_to_block: IndexMap<String, BlockId> =
            blocks.iter().map(|b| (b.label.clone(), b.id)).collect();

        let successors: Vec<Vec<BlockId>> = blocks
            .iter()
            .enumerate()
            .map(|(i, block)| {
                let fallthrough = blocks.get(i + 1).map(|b| b.id);
                match block.terminator() {
                    Some(Instruction::Jump { target, link: false }) => {
                        target_block(target, &label_to_block).into_iter().collect()
                    }
                    Some(Instruction::JumpConditional { target, .. }) => {
                        let mut succs: Vec<BlockId> = target_block(target, &label_to_block).into_iter().collect();
                        succs.extend(fallthrough);
                        succs
                    }
                    Some(Instruction::JumpRegister { link: false, .. }) => vec![],
                    _ => fallthrough.into_iter().collect(),
                }
            })
            .collect();

        for (i, succs) in successors.into_iter().enumerate() {
            blocks[i].successors = succs;
        }
        let preds: Vec<(BlockId, BlockId)> = blocks
            .iter()
            .flat_map(|b| b.successors.iter().map(move |&s| (s, b.id)))
            .collect();
        for (target, from) in preds {
            if let Some(block) = blocks.iter_mut().find(|b| b.id == target) {
                block.predecessors.push(from);
            }
        }

        self.blocks = blocks;
    }

    /// Lowers a statement node, per spec §4.3.
    fn compile_stmt(&mut self, node: &NodeHandle, scope: &mut Scope, ctx: &mut LowerCtx<'_>) -> Result<()> {
        match node.kind() {
            NodeKind::Colon => {
                let var_name = node.child(0).text().unwrap_or_default().to_string();
                if scope.lookup(&var_name).is_some() {
                    return Err(Error::NameConflict { name: var_name });
                }
                let ty = Self::type_from_node(node.child(1))?;
                let init_ty =
                    if node.children().len() == 3 { Some(self.expr_type(node.child(2), scope, ctx)?) } else { None };

                let reg = self.new_var(ty.clone());
                let id = reg.as_var().expect("new_var always returns a virtual register");
                self.variable_table.get_mut(&id).unwrap().name = var_name.clone();
                self.add_to_stack(id, &ty)?;
                scope.declare(var_name, id);

                if let Some(init_ty) = init_ty {
                    self.compile_expr(node.child(2), Some(reg), scope, ctx, 1)?;
                    crate::types::type_check(&init_ty, &ty, reg, self)?;
                }
                Ok(())
            }
            NodeKind::Return => {
                let dest = self.precolored(why::RETURN_VALUE_OFFSET);
                let expr_ty = self.expr_type(node.child(0), scope, ctx)?;
                self.compile_expr(node.child(0), Some(dest), scope, ctx, 1)?;
                let return_type = self.return_type.clone();
                crate::types::type_check(&expr_ty, &return_type, dest, self)?;
                self.push(Instruction::Jump { target: format!(".{}$e", self.name).into(), link: false });
                Ok(())
            }
            NodeKind::LParen => {
                self.compile_expr(node, None, scope, ctx, 1)?;
                Ok(())
            }
            NodeKind::While => {
                let label = self.fresh_block_label();
                let start = format!("{}s", label);
                let end = format!("{}e", label);
                self.push(Instruction::Label(start.clone()));
                let cond_reg = self.mx(0);
                self.compile_expr(node.child(0), Some(cond_reg), scope, ctx, 1)?;
                self.push(Instruction::Not { reg: cond_reg });
                self.push(Instruction::JumpConditional {
                    target: end.clone().into(),
                    cond: Condition::Nonzero,
                    reg: cond_reg,
                    link: false,
                });
                self.compile_stmt(node.child(1), scope, ctx)?;
                self.push(Instruction::Jump { target: start.into(), link: false });
                self.push(Instruction::Label(end));
                Ok(())
            }
            NodeKind::Block => {
                let mut inner = Scope::multi(vec![scope.clone(), Scope::block()]);
                for child in node.children() {
                    self.compile_stmt(child, &mut inner, ctx)?;
                }
                Ok(())
            }
            NodeKind::If => {
                self.push(Instruction::Comment("<if>".to_string()));
                let label = self.fresh_block_label();
                let else_label = format!("{}e", label);
                let end_label = format!("{}end", else_label);
                let cond_reg = self.mx(0);
                self.compile_expr(node.child(0), Some(cond_reg), scope, ctx, 1)?;
                self.push(Instruction::Not { reg: cond_reg });
                self.push(Instruction::JumpConditional {
                    target: else_label.clone().into(),
                    cond: Condition::Nonzero,
                    reg: cond_reg,
                    link: false,
                });
                self.compile_stmt(node.child(1), scope, ctx)?;
                self.push(Instruction::Jump { target: end_label.clone().into(), link: false });
                self.push(Instruction::Label(else_label));
                self.compile_stmt(node.child(2), scope, ctx)?;
                self.push(Instruction::Label(end_label));
                self.push(Instruction::Comment("</if>".to_string()));
                Ok(())
            }
            other => Err(Error::Parse(format!("not a statement node: {:?}", other))),
        }
    }

    /// Resolves the type of an expression node without emitting anything,
    /// for deciding pointer-arithmetic scaling ahead of lowering.
    fn expr_type(&self, node: &NodeHandle, scope: &Scope, ctx: &LowerCtx<'_>) -> Result<Type> {
        Ok(match node.kind() {
            NodeKind::Number | NodeKind::Char => Type::s64(),
            NodeKind::True | NodeKind::False => Type::Bool,
            NodeKind::Str => Type::pointer(Type::u8()),
            NodeKind::Ident => {
                let name = node.text().unwrap_or_default();
                self.resolve_type(name, scope, ctx)?
            }
            NodeKind::And => Type::pointer(self.expr_type(node.child(0), scope, ctx)?),
            NodeKind::Times if node.children().len() == 1 => {
                let inner = self.expr_type(node.child(0), scope, ctx)?;
                if !inner.is_pointer() {
                    return Err(Error::NotAPointer { ty: inner });
                }
                inner.pointee().clone()
            }
            NodeKind::Plus | NodeKind::Minus | NodeKind::Times => self.expr_type(node.child(0), scope, ctx)?,
            NodeKind::LParen => {
                let callee = node.child(0).text().unwrap_or_default();
                ctx.signatures
                    .get(callee)
                    .map(|sig| sig.ret.clone())
                    .ok_or_else(|| Error::FunctionNotFound { name: callee.to_string() })?
            }
            other => return Err(Error::Parse(format!("not an expression node: {:?}", other))),
        })
    }

    fn resolve_type(&self, name: &str, scope: &Scope, ctx: &LowerCtx<'_>) -> Result<Type> {
        if let Some(id) = scope.lookup(name) {
            return Ok(self.var_type(id));
        }
        if let Some(global) = ctx.globals.get(name) {
            return Ok(global.ty.clone());
        }
        Err(Error::Resolution { name: name.to_string() })
    }

    /// Lowers an expression into `dest` (or, for statement-context calls,
    /// no destination at all), per spec §4.2.
    fn compile_expr(
        &mut self,
        node: &NodeHandle,
        dest: Option<Reg>,
        scope: &Scope,
        ctx: &mut LowerCtx<'_>,
        multiplier: i64,
    ) -> Result<()> {
        match node.kind() {
            NodeKind::Number => {
                let value: i64 = node
                    .text()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| Error::Parse("malformed number literal".into()))?;
                self.emit_set_immediate(dest, value * multiplier)
            }
            NodeKind::Char => {
                let value = node.text().and_then(|s| s.chars().next()).map(|c| c as i64).unwrap_or(0);
                self.emit_set_immediate(dest, value * multiplier)
            }
            NodeKind::True => self.emit_set_immediate(dest, multiplier),
            NodeKind::False => self.emit_set_immediate(dest, 0),
            NodeKind::Str => {
                let text = node.text().unwrap_or_default();
                let label = ctx.intern(text);
                if let Some(dest) = dest {
                    self.push(Instruction::SetI { dest, imm: label.into() });
                }
                Ok(())
            }
            NodeKind::Ident => {
                let name = node.text().unwrap_or_default().to_string();
                self.compile_variable_ref(&name, dest, scope, ctx, multiplier)
            }
            NodeKind::And => {
                if multiplier != 1 {
                    return Err(Error::Lvalue { expr: "cannot scale an address-of expression".to_string() });
                }
                self.compile_address_of(node.child(0), dest, scope, ctx)
            }
            NodeKind::Times if node.children().len() == 1 => {
                let inner_ty = self.expr_type(node.child(0), scope, ctx)?;
                if !inner_ty.is_pointer() {
                    return Err(Error::NotAPointer { ty: inner_ty });
                }
                self.compile_expr(node.child(0), dest, scope, ctx, multiplier)?;
                if let Some(dest) = dest {
                    self.push(Instruction::LoadR { addr: dest, dest, size: Size::for_type(inner_ty.pointee()) });
                }
                Ok(())
            }
            NodeKind::Plus => self.compile_additive(node, dest, scope, ctx, multiplier, AluOp::Add),
            NodeKind::Minus => self.compile_additive(node, dest, scope, ctx, multiplier, AluOp::Sub),
            NodeKind::Times => {
                let left_reg = self.new_var(Type::s64());
                let right_reg = self.new_var(Type::s64());
                self.compile_expr(node.child(0), Some(left_reg), scope, ctx, 1)?;
                self.compile_expr(node.child(1), Some(right_reg), scope, ctx, multiplier)?;
                self.push(Instruction::MultR { left: left_reg, right: right_reg, dest });
                Ok(())
            }
            NodeKind::LParen => self.compile_call(node, dest, scope, ctx, multiplier),
            other => Err(Error::Parse(format!("not an expression node: {:?}", other))),
        }
    }

    fn emit_set_immediate(&mut self, dest: Option<Reg>, value: i64) -> Result<()> {
        let Some(dest) = dest else { return Ok(()) };
        if (i32::MIN as i64..=i32::MAX as i64).contains(&value) {
            self.push(Instruction::SetI { dest, imm: value.into() });
        } else {
            let low = value & 0xFFFF_FFFF;
            let high = (value as u64 >> 32) as i64;
            self.push(Instruction::SetI { dest, imm: low.into() });
            self.push(Instruction::LuiI { dest, imm: high.into() });
        }
        Ok(())
    }

    fn compile_variable_ref(
        &mut self,
        name: &str,
        dest: Option<Reg>,
        scope: &Scope,
        ctx: &mut LowerCtx<'_>,
        multiplier: i64,
    ) -> Result<()> {
        let Some(dest) = dest else { return Ok(()) };
        if let Some(id) = scope.lookup(name) {
            let src = self.var_reg(id);
            self.push(Instruction::Move { src, dest });
        } else if let Some(global) = ctx.globals.get(name) {
            self.push(Instruction::LoadI { dest, imm: global.label.clone().into(), size: Size::for_type(&global.ty) });
        } else {
            return Err(Error::Resolution { name: name.to_string() });
        }
        if multiplier != 1 {
            self.push(Instruction::MultI { src: dest, dest: Some(dest), imm: multiplier.into() });
        }
        Ok(())
    }

    fn compile_address_of(
        &mut self,
        subexpr: &NodeHandle,
        dest: Option<Reg>,
        scope: &Scope,
        ctx: &LowerCtx<'_>,
    ) -> Result<()> {
        let Some(dest) = dest else {
            return Err(Error::Lvalue { expr: "address-of with no destination".to_string() });
        };
        if subexpr.kind() != NodeKind::Ident {
            return Err(Error::Lvalue { expr: subexpr.text().unwrap_or("<expr>").to_string() });
        }
        let name = subexpr.text().unwrap_or_default();
        if let Some(id) = scope.lookup(name) {
            let offset = self.var_stack_offset(id)?;
            let fp = self.precolored(why::FRAME_POINTER_OFFSET);
            self.push(Instruction::IType { op: AluOp::Add, src: fp, dest, imm: offset.into() });
            Ok(())
        } else if let Some(global) = ctx.globals.get(name) {
            self.push(Instruction::SetI { dest, imm: global.label.clone().into() });
            Ok(())
        } else {
            Err(Error::Resolution { name: name.to_string() })
        }
    }

    fn compile_additive(
        &mut self,
        node: &NodeHandle,
        dest: Option<Reg>,
        scope: &Scope,
        ctx: &mut LowerCtx<'_>,
        multiplier: i64,
        op: AluOp,
    ) -> Result<()> {
        let left_ty = self.expr_type(node.child(0), scope, ctx)?;
        let right_ty = self.expr_type(node.child(1), scope, ctx)?;
        let left_reg = self.new_var(Type::s64());
        let right_reg = self.new_var(Type::s64());

        match (left_ty.is_pointer(), right_ty.is_pointer()) {
            (true, false) => {
                if multiplier != 1 {
                    return Err(Error::Lvalue { expr: "cannot scale pointer arithmetic again".to_string() });
                }
                let scale = left_ty.pointee().size_of();
                self.compile_expr(node.child(0), Some(left_reg), scope, ctx, 1)?;
                self.compile_expr(node.child(1), Some(right_reg), scope, ctx, scale)?;
            }
            (false, true) => {
                if op == AluOp::Sub {
                    return Err(Error::InvalidPointerArithmetic { ty: right_ty });
                }
                if multiplier != 1 {
                    return Err(Error::Lvalue { expr: "cannot scale pointer arithmetic again".to_string() });
                }
                let scale = right_ty.pointee().size_of();
                self.compile_expr(node.child(0), Some(left_reg), scope, ctx, scale)?;
                self.compile_expr(node.child(1), Some(right_reg), scope, ctx, 1)?;
            }
            _ => {
                if !left_ty.assignable_from(&right_ty) && !right_ty.assignable_from(&left_ty) {
                    return Err(Error::ImplicitConversion { from: right_ty, to: left_ty });
                }
                self.compile_expr(node.child(0), Some(left_reg), scope, ctx, multiplier)?;
                self.compile_expr(node.child(1), Some(right_reg), scope, ctx, multiplier)?;
            }
        }

        if let Some(dest) = dest {
            self.push(Instruction::RType { op, left: left_reg, right: right_reg, dest });
        }
        Ok(())
    }

    fn compile_call(
        &mut self,
        node: &NodeHandle,
        dest: Option<Reg>,
        scope: &Scope,
        ctx: &mut LowerCtx<'_>,
        multiplier: i64,
    ) -> Result<()> {
        let callee = node.child(0).text().unwrap_or_default().to_string();
        let call_args = node.child(1).children();
        let signature = ctx
            .signatures
            .get(&callee)
            .cloned()
            .ok_or_else(|| Error::FunctionNotFound { name: callee.clone() })?;
        if signature.args.len() != call_args.len() {
            return Err(Error::ArityMismatch {
                name: callee.clone(),
                expected: signature.args.len(),
                got: call_args.len(),
            });
        }

        let to_push = self.arguments.len().min(call_args.len());
        for i in 0..to_push {
            self.push(Instruction::StackPush { reg: self.precolored(why::ARGUMENT_OFFSET + i as u8) });
        }

        for (i, arg) in call_args.iter().enumerate() {
            let arg_reg = self.precolored(why::ARGUMENT_OFFSET + i as u8);
            self.compile_expr(arg, Some(arg_reg), scope, ctx, 1)?;
        }

        self.push(Instruction::Jump { target: callee.clone().into(), link: true });

        for i in (0..to_push).rev() {
            self.push(Instruction::StackPop { reg: self.precolored(why::ARGUMENT_OFFSET + i as u8) });
        }

        if !signature.ret.is_void() {
            if let Some(dest) = dest {
                let return_value = self.precolored(why::RETURN_VALUE_OFFSET);
                if multiplier == 1 {
                    self.push(Instruction::Move { src: return_value, dest });
                } else {
                    self.push(Instruction::MultI { src: return_value, dest: Some(dest), imm: multiplier.into() });
                }
            }
        }
        Ok(())
    }

    /// Lowers a binary comparison into a boolean-valued register. Not
    /// reached by the `§6` grammar directly (comparisons arise from the
    /// parser's own expression grammar, out of scope here), but exercised
    /// by tests exercising the IR in isolation and available for a future
    /// parser integration to call directly.
    pub fn compile_comparison(
        &mut self,
        signed: bool,
        op: Comparison,
        left: &NodeHandle,
        right: &NodeHandle,
        dest: Reg,
        scope: &Scope,
        ctx: &mut LowerCtx<'_>,
    ) -> Result<()> {
        let left_reg = self.new_var(Type::s64());
        let right_reg = self.new_var(Type::s64());
        self.compile_expr(left, Some(left_reg), scope, ctx, 1)?;
        self.compile_expr(right, Some(right_reg), scope, ctx, 1)?;
        self.push(Instruction::Cmp { signed, op, left: left_reg, right: right_reg, dest });
        Ok(())
    }
}

fn target_block(target: &crate::imm::Immediate, labels: &IndexMap<String, BlockId>) -> Option<BlockId> {
    match target {
        crate::imm::Immediate::Label(label) => labels.get(label).copied(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AstNode, Location};
    use std::rc::Rc;

    #[derive(Clone)]
    struct TestNode {
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

    fn leaf(kind: NodeKind, text: &str) -> NodeHandle {
        Rc::new(TestNode { kind, children: vec![], text: Some(text.to_string()) })
    }

    fn tagged(kind: NodeKind, children: Vec<NodeHandle>) -> NodeHandle {
        Rc::new(TestNode { kind, children, text: None })
    }

    fn named(kind: NodeKind, text: &str, children: Vec<NodeHandle>) -> NodeHandle {
        Rc::new(TestNode { kind, children, text: Some(text.to_string()) })
    }

    fn empty_ctx() -> (IndexMap<String, Global>, IndexMap<String, Signature>, IndexMap<String, u32>) {
        (IndexMap::new(), IndexMap::new(), IndexMap::new())
    }

    /// `fn id(x: s32) -> s32 { return x; }`
    #[test]
    fn identity_function_moves_first_argument_into_return_value_register() {
        let param = named(NodeKind::Colon, "x", vec![leaf(NodeKind::S32, "s32")]);
        let ret_stmt = tagged(NodeKind::Return, vec![leaf(NodeKind::Ident, "x")]);
        let body = tagged(NodeKind::Block, vec![ret_stmt]);
        let source = tagged(
            NodeKind::Fn,
            vec![leaf(NodeKind::Ident, "id"), leaf(NodeKind::S32, "s32"), tagged(NodeKind::Block, vec![param]), body],
        );

        let (globals, signatures, mut strings) = empty_ctx();
        let mut ctx = LowerCtx { globals: &globals, signatures: &signatures, strings: &mut strings };
        let function = Function::compile(&source, &mut ctx).unwrap();

        let a0 = Reg::Physical(why::ARGUMENT_OFFSET);
        let r0 = Reg::Physical(why::RETURN_VALUE_OFFSET);
        let moved_return = function.blocks.iter().any(|b| {
            b.instructions.iter().any(|i| matches!(i, Instruction::Move { src, dest } if *src == a0 && *dest == r0))
        });
        assert!(moved_return, "expected a move from $a0 into $r0");

        let fp = Reg::Physical(why::FRAME_POINTER_OFFSET);
        let sp = Reg::Physical(why::STACK_POINTER_OFFSET);
        let rt = Reg::Physical(why::RETURN_ADDRESS_OFFSET);
        assert_eq!(function.blocks[0].instructions[0], Instruction::StackPush { reg: rt });
        assert_eq!(function.blocks[0].instructions[1], Instruction::StackPush { reg: fp });
        assert_eq!(function.blocks[0].instructions[2], Instruction::Move { src: sp, dest: fp });

        let jumps_via_rt = function
            .blocks
            .iter()
            .any(|b| b.instructions.iter().any(|i| matches!(i, Instruction::JumpRegister { reg, link: false } if *reg == rt)));
        assert!(jumps_via_rt, "epilogue should jump through $rt");
    }

    /// `fn add(a: s32, b: s32) -> s32 { return a + b; }`
    #[test]
    fn addition_lowers_to_an_rtype_add_between_the_two_arguments() {
        let params = tagged(
            NodeKind::Block,
            vec![
                named(NodeKind::Colon, "a", vec![leaf(NodeKind::S32, "s32")]),
                named(NodeKind::Colon, "b", vec![leaf(NodeKind::S32, "s32")]),
            ],
        );
        let plus = tagged(NodeKind::Plus, vec![leaf(NodeKind::Ident, "a"), leaf(NodeKind::Ident, "b")]);
        let body = tagged(NodeKind::Block, vec![tagged(NodeKind::Return, vec![plus])]);
        let source =
            tagged(NodeKind::Fn, vec![leaf(NodeKind::Ident, "add"), leaf(NodeKind::S32, "s32"), params, body]);

        let (globals, signatures, mut strings) = empty_ctx();
        let mut ctx = LowerCtx { globals: &globals, signatures: &signatures, strings: &mut strings };
        let function = Function::compile(&source, &mut ctx).unwrap();

        let found = function.blocks.iter().any(|b| {
            b.instructions.iter().any(|i| {
                matches!(
                    i,
                    Instruction::RType { op: AluOp::Add, .. }
                )
            })
        });
        assert!(found, "expected an RType Add instruction");
    }

    #[test]
    fn pointer_plus_int_scales_the_integer_by_pointee_size() {
        let param = named(NodeKind::Colon, "p", vec![tagged(NodeKind::Times, vec![leaf(NodeKind::S32, "s32")])]);
        let plus = tagged(NodeKind::Plus, vec![leaf(NodeKind::Ident, "p"), leaf(NodeKind::Number, "2")]);
        let body = tagged(NodeKind::Block, vec![tagged(NodeKind::Return, vec![plus])]);
        let source = tagged(
            NodeKind::Fn,
            vec![
                leaf(NodeKind::Ident, "f"),
                tagged(NodeKind::Times, vec![leaf(NodeKind::S32, "s32")]),
                tagged(NodeKind::Block, vec![param]),
                body,
            ],
        );

        let (globals, signatures, mut strings) = empty_ctx();
        let mut ctx = LowerCtx { globals: &globals, signatures: &signatures, strings: &mut strings };
        let function = Function::compile(&source, &mut ctx).unwrap();

        let scaled_set = function.blocks.iter().any(|b| {
            b.instructions.iter().any(|i| matches!(i, Instruction::SetI { imm, .. } if *imm == 8i64.into()))
        });
        assert!(scaled_set, "expected the literal 2 scaled by sizeof(s32)=4 to produce SetI 8");
    }

    #[test]
    fn declaration_places_the_new_variable_on_the_stack() {
        let params = tagged(NodeKind::Block, vec![]);
        let decl = tagged(
            NodeKind::Colon,
            vec![leaf(NodeKind::Ident, "y"), leaf(NodeKind::S32, "s32"), leaf(NodeKind::Number, "5")],
        );
        let body = tagged(NodeKind::Block, vec![decl]);
        let source =
            tagged(NodeKind::Fn, vec![leaf(NodeKind::Ident, "f"), leaf(NodeKind::Void, "void"), params, body]);

        let (globals, signatures, mut strings) = empty_ctx();
        let mut ctx = LowerCtx { globals: &globals, signatures: &signatures, strings: &mut strings };
        let function = Function::compile(&source, &mut ctx).unwrap();
        assert_eq!(function.stack_usage, 4);
    }
}
