// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Statement-oriented builder over the IR arena.

use super::{BinOp, Builtin, ExprId, ExprKind, FuncId, IrArena, IrType, Local, LocalId, StmtId, StmtKind, UnOp};

/// Builds one function's locals and body. Structured statements nest via
/// closures; the builder keeps a stack of open blocks.
pub struct FunctionBuilder<'a> {
	arena: &'a mut IrArena,
	func: FuncId,
	blocks: Vec<Vec<StmtId>>,
}

impl<'a> FunctionBuilder<'a> {
	pub fn new(arena: &'a mut IrArena, func: FuncId) -> Self {
		Self { arena, func, blocks: vec![Vec::new()] }
	}

	pub fn func_id(&self) -> FuncId {
		self.func
	}

	pub fn arena(&mut self) -> &mut IrArena {
		self.arena
	}

	fn push_stmt(&mut self, kind: StmtKind) -> StmtId {
		let id = self.arena.stmt(kind);
		self.blocks
			.last_mut()
			.expect("builder always has an open block")
			.push(id);
		id
	}

	// ── Locals ───────────────────────────────────────────────────────

	pub fn add_param(&mut self, name: impl Into<String>, ty: IrType) -> LocalId {
		let id = self.add_local(name, ty);
		self.arena.functions[self.func.index()].params.push(id);
		id
	}

	pub fn add_local(&mut self, name: impl Into<String>, ty: IrType) -> LocalId {
		let locals = &mut self.arena.functions[self.func.index()].locals;
		locals.push(Local { name: name.into(), ty });
		LocalId(locals.len() as u32 - 1)
	}

	pub fn local_type(&self, local: LocalId) -> IrType {
		self.arena.functions[self.func.index()].locals[local.index()].ty
	}

	/// Declare a local and initialize it from an expression.
	pub fn declare_assign(&mut self, name: impl Into<String>, ty: IrType, init: ExprId) -> LocalId {
		let local = self.add_local(name, ty);
		let dst = self.local_expr(local);
		self.assign(dst, init);
		local
	}

	// ── Expressions ──────────────────────────────────────────────────

	pub fn local_expr(&mut self, local: LocalId) -> ExprId {
		self.arena.expr(ExprKind::Local(local))
	}

	pub fn int_lit(&mut self, value: i64) -> ExprId {
		self.arena.expr(ExprKind::IntLit(value))
	}

	pub fn float_lit(&mut self, value: f64) -> ExprId {
		self.arena.expr(ExprKind::FloatLit(value))
	}

	pub fn bool_lit(&mut self, value: bool) -> ExprId {
		self.arena.expr(ExprKind::BoolLit(value))
	}

	pub fn str_lit(&mut self, value: impl Into<String>) -> ExprId {
		let id = self.arena.intern_string(value);
		self.arena.expr(ExprKind::StrLit(id))
	}

	pub fn u32_list_lit(&mut self, value: Vec<u32>) -> ExprId {
		let id = self.arena.intern_u32_list(value);
		self.arena.expr(ExprKind::U32ListLit(id))
	}

	pub fn func_lit(&mut self, func: FuncId) -> ExprId {
		self.arena.expr(ExprKind::FuncLit(func))
	}

	pub fn state_field(&mut self, base: LocalId, offset: u32, ty: IrType) -> ExprId {
		self.arena.expr(ExprKind::StateField { base, offset, ty })
	}

	pub fn binary(&mut self, op: BinOp, lhs: ExprId, rhs: ExprId) -> ExprId {
		self.arena.expr(ExprKind::Binary { op, lhs, rhs })
	}

	pub fn unary(&mut self, op: UnOp, operand: ExprId) -> ExprId {
		self.arena.expr(ExprKind::Unary { op, operand })
	}

	pub fn call(&mut self, builtin: Builtin, args: Vec<ExprId>) -> ExprId {
		self.arena.expr(ExprKind::Call { builtin, args })
	}

	// ── Statements ───────────────────────────────────────────────────

	pub fn emit(&mut self, expr: ExprId) {
		self.push_stmt(StmtKind::Expr(expr));
	}

	/// Call a builtin for its effect.
	pub fn emit_call(&mut self, builtin: Builtin, args: Vec<ExprId>) {
		let expr = self.call(builtin, args);
		self.emit(expr);
	}

	pub fn assign(&mut self, dst: ExprId, src: ExprId) {
		self.push_stmt(StmtKind::Assign { dst, src });
	}

	pub fn ret(&mut self, value: Option<ExprId>) {
		self.push_stmt(StmtKind::Return(value));
	}

	pub fn brk(&mut self) {
		self.push_stmt(StmtKind::Break);
	}

	/// Emit an if statement; the closure's result (commonly a `Result`)
	/// is handed back so emission errors propagate.
	pub fn emit_if<R>(&mut self, cond: ExprId, then_build: impl FnOnce(&mut Self) -> R) -> R {
		self.blocks.push(Vec::new());
		let out = then_build(self);
		let then_block = self.blocks.pop().unwrap_or_default();
		self.push_stmt(StmtKind::If { cond, then_block, else_block: Vec::new() });
		out
	}

	pub fn emit_if_else<R, S>(
		&mut self,
		cond: ExprId,
		then_build: impl FnOnce(&mut Self) -> R,
		else_build: impl FnOnce(&mut Self) -> S,
	) -> (R, S) {
		self.blocks.push(Vec::new());
		let r = then_build(self);
		let then_block = self.blocks.pop().unwrap_or_default();
		self.blocks.push(Vec::new());
		let s = else_build(self);
		let else_block = self.blocks.pop().unwrap_or_default();
		self.push_stmt(StmtKind::If { cond, then_block, else_block });
		(r, s)
	}

	pub fn emit_loop<R>(&mut self, body_build: impl FnOnce(&mut Self) -> R) -> R {
		self.blocks.push(Vec::new());
		let out = body_build(self);
		let body = self.blocks.pop().unwrap_or_default();
		self.push_stmt(StmtKind::Loop { body });
		out
	}

	/// Seal the function body. Must be called exactly once.
	pub fn finish(mut self) {
		let body = self.blocks.pop().unwrap_or_default();
		self.arena.functions[self.func.index()].body = body;
	}
}
