// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Bytecode generation: linearizes the typed IR into the opcode stream.
//!
//! Locals get frame byte offsets (8 bytes for primitives and handles, 16
//! for SQL values, return slot first), expressions evaluate into a
//! statement-scoped temp region, and control flow lowers to
//! forward-patched jumps. Every builtin maps to exactly one opcode; SQL
//! operators pick their typed variant from the semantic pass's types.

use quarry_compiler::ir::{
	BinOp, Builtin, ExprId, ExprKind, FuncId, Function, IrArena, IrType, StmtId, StmtKind, UnOp,
};
use quarry_compiler::CompiledQuery;
use tracing::instrument;

use crate::bytecode::{BytecodeEmitter, BytecodeModule, FunctionInfo, Label, Opcode, Operand};
use crate::error::{Result, VmError};
use crate::ptr;

/// Lower a compiled query into an executable module. The program must
/// have passed the semantic check; lowering trusts its types.
#[instrument(level = "debug", skip_all)]
pub fn lower(query: &CompiledQuery) -> Result<BytecodeModule> {
	let mut emitter = BytecodeEmitter::new();
	let mut functions = Vec::with_capacity(query.arena.functions.len());

	for function in &query.arena.functions {
		let entry = emitter.position();
		let mut gen = FnGen::new(&query.arena, &query.expr_types, function, &mut emitter)?;
		for stmt in &function.body {
			gen.gen_stmt(*stmt)?;
		}
		// Backstop for bodies whose last statement is conditional.
		gen.emitter.emit(Opcode::Return, &[])?;
		let frame_size = gen.frame_size();
		let params = gen.param_offsets();
		let ret_offset = gen.ret_offset;
		functions.push(FunctionInfo {
			name: function.name.clone(),
			entry,
			frame_size,
			params,
			ret_offset,
		});
	}

	Ok(BytecodeModule::new(
		emitter.finish()?,
		functions,
		query.arena.strings.clone(),
		query.arena.u32_lists.clone(),
		query.state_size as usize,
	))
}

struct FnGen<'a> {
	arena: &'a IrArena,
	types: &'a [Option<IrType>],
	function: &'a Function,
	emitter: &'a mut BytecodeEmitter,
	local_offsets: Vec<u16>,
	ret_offset: Option<u16>,
	temp_base: usize,
	temp_cur: usize,
	temp_max: usize,
	loop_exits: Vec<Label>,
}

impl<'a> FnGen<'a> {
	fn new(
		arena: &'a IrArena,
		types: &'a [Option<IrType>],
		function: &'a Function,
		emitter: &'a mut BytecodeEmitter,
	) -> Result<Self> {
		let mut cursor = 0usize;
		let ret_offset = if function.ret == IrType::Nil {
			None
		} else {
			if function.ret.is_sql() {
				return Err(VmError::Invariant("functions cannot return sql values".into()));
			}
			cursor = 8;
			Some(0u16)
		};
		let mut local_offsets = Vec::with_capacity(function.locals.len());
		for local in &function.locals {
			local_offsets.push(cursor as u16);
			cursor += local.ty.frame_size();
		}
		Ok(Self {
			arena,
			types,
			function,
			emitter,
			local_offsets,
			ret_offset,
			temp_base: cursor,
			temp_cur: cursor,
			temp_max: cursor,
			loop_exits: Vec::new(),
		})
	}

	fn frame_size(&self) -> usize {
		self.temp_max.max(self.temp_base)
	}

	fn param_offsets(&self) -> Vec<u16> {
		self.function.params.iter().map(|p| self.local_offsets[p.index()]).collect()
	}

	fn expr_type(&self, e: ExprId) -> Result<IrType> {
		self.types
			.get(e.index())
			.copied()
			.flatten()
			.ok_or_else(|| VmError::Invariant("expression missing a checked type".into()))
	}

	fn alloc_temp(&mut self, size: usize) -> u16 {
		let at = self.temp_cur;
		self.temp_cur += size;
		self.temp_max = self.temp_max.max(self.temp_cur);
		at as u16
	}

	fn reset_temps(&mut self) {
		self.temp_cur = self.temp_base;
	}

	fn kind(&self, e: ExprId) -> &ExprKind {
		&self.arena.exprs[e.index()]
	}

	// ── Immediate extraction ─────────────────────────────────────────

	fn imm_i64(&self, e: ExprId) -> Result<i64> {
		match self.kind(e) {
			ExprKind::IntLit(v) => Ok(*v),
			_ => Err(VmError::Invariant("expected integer immediate".into())),
		}
	}

	fn imm_u32(&self, e: ExprId) -> Result<u32> {
		Ok(self.imm_i64(e)? as u32)
	}

	fn imm_u8(&self, e: ExprId) -> Result<u8> {
		Ok(self.imm_i64(e)? as u8)
	}

	fn imm_f64(&self, e: ExprId) -> Result<f64> {
		match self.kind(e) {
			ExprKind::FloatLit(v) => Ok(*v),
			_ => Err(VmError::Invariant("expected float immediate".into())),
		}
	}

	fn str_id(&self, e: ExprId) -> Result<u32> {
		match self.kind(e) {
			ExprKind::StrLit(id) => Ok(id.0),
			_ => Err(VmError::Invariant("expected string immediate".into())),
		}
	}

	fn list_id(&self, e: ExprId) -> Result<u32> {
		match self.kind(e) {
			ExprKind::U32ListLit(id) => Ok(id.0),
			_ => Err(VmError::Invariant("expected column-list immediate".into())),
		}
	}

	fn func_id(&self, e: ExprId) -> Result<u16> {
		match self.kind(e) {
			ExprKind::FuncLit(FuncId(id)) => Ok(*id as u16),
			_ => Err(VmError::Invariant("expected function reference".into())),
		}
	}

	/// Operand for an object argument: a state field lowers to its
	/// address, a local is used in place (the slot holds the handle).
	fn obj_arg(&mut self, e: ExprId) -> Result<u16> {
		match self.kind(e).clone() {
			ExprKind::StateField { base, offset, .. } => {
				let base_off = self.local_offsets[base.index()];
				let temp = self.alloc_temp(8);
				self.emitter.emit(
					Opcode::Lea,
					&[Operand::Local(temp), Operand::Local(base_off), Operand::UImm4(offset)],
				)?;
				Ok(temp)
			}
			ExprKind::Local(local) => Ok(self.local_offsets[local.index()]),
			_ => Err(VmError::Invariant("object argument must be a local or state field".into())),
		}
	}

	// ── Statements ───────────────────────────────────────────────────

	fn gen_stmt(&mut self, stmt: StmtId) -> Result<()> {
		match self.arena.stmts[stmt.index()].clone() {
			StmtKind::Expr(e) => {
				self.gen_expr(e, None)?;
				self.reset_temps();
			}
			StmtKind::Assign { dst, src } => {
				match self.kind(dst).clone() {
					ExprKind::Local(local) => {
						let at = self.local_offsets[local.index()];
						self.gen_expr(src, Some(at))?;
					}
					ExprKind::StateField { base, offset, .. } => {
						let value = self.gen_expr(src, None)?;
						let base_off = self.local_offsets[base.index()];
						let addr = self.alloc_temp(8);
						self.emitter.emit(
							Opcode::Lea,
							&[
								Operand::Local(addr),
								Operand::Local(base_off),
								Operand::UImm4(offset),
							],
						)?;
						self.emitter.emit(
							Opcode::Store8,
							&[Operand::Local(addr), Operand::Local(value)],
						)?;
					}
					_ => {
						return Err(VmError::Invariant("unsupported assignment target".into()));
					}
				}
				self.reset_temps();
			}
			StmtKind::If { cond, then_block, else_block } => {
				let cond_off = self.gen_expr(cond, None)?;
				let else_label = self.emitter.new_label();
				self.emitter.emit(
					Opcode::JumpIfFalse,
					&[Operand::Local(cond_off), Operand::Jump(else_label)],
				)?;
				self.reset_temps();
				for s in &then_block {
					self.gen_stmt(*s)?;
				}
				if else_block.is_empty() {
					self.emitter.bind_label(else_label)?;
				} else {
					let end_label = self.emitter.new_label();
					self.emitter.emit(Opcode::Jump, &[Operand::Jump(end_label)])?;
					self.emitter.bind_label(else_label)?;
					for s in &else_block {
						self.gen_stmt(*s)?;
					}
					self.emitter.bind_label(end_label)?;
				}
			}
			StmtKind::Loop { body } => {
				let start = self.emitter.new_label();
				let exit = self.emitter.new_label();
				self.emitter.bind_label(start)?;
				self.loop_exits.push(exit);
				for s in &body {
					self.gen_stmt(*s)?;
				}
				self.loop_exits.pop();
				self.emitter.emit(Opcode::Jump, &[Operand::Jump(start)])?;
				self.emitter.bind_label(exit)?;
			}
			StmtKind::Break => {
				let exit = self
					.loop_exits
					.last()
					.copied()
					.ok_or_else(|| VmError::Invariant("break outside loop".into()))?;
				self.emitter.emit(Opcode::Jump, &[Operand::Jump(exit)])?;
			}
			StmtKind::Return(value) => {
				if let Some(value) = value {
					self.gen_expr(value, Some(0))?;
					self.reset_temps();
				}
				self.emitter.emit(Opcode::Return, &[])?;
			}
		}
		Ok(())
	}

	// ── Expressions ──────────────────────────────────────────────────

	fn copy(&mut self, dst: u16, src: u16, size: usize) -> Result<()> {
		self.emitter.emit(Opcode::Assign8, &[Operand::Local(dst), Operand::Local(src)])?;
		if size == 16 {
			self.emitter
				.emit(Opcode::Assign8, &[Operand::Local(dst + 8), Operand::Local(src + 8)])?;
		}
		Ok(())
	}

	fn gen_expr(&mut self, e: ExprId, dst: Option<u16>) -> Result<u16> {
		let ty = self.expr_type(e)?;
		match self.kind(e).clone() {
			ExprKind::IntLit(v) => {
				let at = dst.unwrap_or_else(|| self.alloc_temp(8));
				let operand = Operand::Local(at);
				match ty {
					IrType::Int8 | IrType::UInt8 | IrType::Bool => {
						self.emitter.emit(Opcode::AssignImm1, &[operand, Operand::Imm1(v as i8)])?;
					}
					IrType::Int16 | IrType::UInt16 => {
						self.emitter.emit(Opcode::AssignImm2, &[operand, Operand::Imm2(v as i16)])?;
					}
					IrType::Int32 | IrType::UInt32 => {
						self.emitter.emit(Opcode::AssignImm4, &[operand, Operand::Imm4(v as i32)])?;
					}
					_ => {
						self.emitter.emit(Opcode::AssignImm8, &[operand, Operand::Imm8(v)])?;
					}
				}
				Ok(at)
			}
			ExprKind::FloatLit(v) => {
				let at = dst.unwrap_or_else(|| self.alloc_temp(8));
				if ty == IrType::Float32 {
					self.emitter.emit(
						Opcode::AssignImm4F,
						&[Operand::Local(at), Operand::Imm4F(v as f32)],
					)?;
				} else {
					self.emitter
						.emit(Opcode::AssignImm8F, &[Operand::Local(at), Operand::Imm8F(v)])?;
				}
				Ok(at)
			}
			ExprKind::BoolLit(v) => {
				let at = dst.unwrap_or_else(|| self.alloc_temp(8));
				self.emitter
					.emit(Opcode::AssignImm1, &[Operand::Local(at), Operand::Imm1(v as i8)])?;
				Ok(at)
			}
			ExprKind::Local(local) => {
				let src = self.local_offsets[local.index()];
				match dst {
					Some(at) if at != src => {
						self.copy(at, src, ty.frame_size())?;
						Ok(at)
					}
					Some(at) => Ok(at),
					None => Ok(src),
				}
			}
			ExprKind::StateField { base, offset, .. } => {
				let base_off = self.local_offsets[base.index()];
				let addr = self.alloc_temp(8);
				self.emitter.emit(
					Opcode::Lea,
					&[Operand::Local(addr), Operand::Local(base_off), Operand::UImm4(offset)],
				)?;
				let at = dst.unwrap_or_else(|| self.alloc_temp(8));
				self.emitter.emit(Opcode::Deref8, &[Operand::Local(at), Operand::Local(addr)])?;
				Ok(at)
			}
			ExprKind::Binary { op, lhs, rhs } => {
				let operand_ty = self.expr_type(lhs)?;
				let a = self.gen_expr(lhs, None)?;
				let b = self.gen_expr(rhs, None)?;
				let at = dst.unwrap_or_else(|| self.alloc_temp(8));
				let opcode = binary_opcode(op, operand_ty)?;
				self.emitter.emit(
					opcode,
					&[Operand::Local(at), Operand::Local(a), Operand::Local(b)],
				)?;
				Ok(at)
			}
			ExprKind::Unary { op, operand } => {
				let operand_ty = self.expr_type(operand)?;
				let src = self.gen_expr(operand, None)?;
				let at = dst.unwrap_or_else(|| self.alloc_temp(8));
				let opcode = match op {
					UnOp::Not => Opcode::Not,
					UnOp::Neg => neg_opcode(operand_ty)?,
					UnOp::BitNot => bitneg_opcode(operand_ty)?,
				};
				self.emitter.emit(opcode, &[Operand::Local(at), Operand::Local(src)])?;
				Ok(at)
			}
			ExprKind::Call { builtin, args } => self.gen_call(e, builtin, &args, dst),
			ExprKind::StrLit(_) | ExprKind::U32ListLit(_) | ExprKind::FuncLit(_) => {
				Err(VmError::Invariant("immediate in value position".into()))
			}
		}
	}

	fn dst_for(&mut self, e: ExprId, dst: Option<u16>) -> Result<u16> {
		let size = self.expr_type(e)?.frame_size().max(8);
		Ok(dst.unwrap_or_else(|| self.alloc_temp(size)))
	}

	fn gen_call(&mut self, e: ExprId, builtin: Builtin, args: &[ExprId], dst: Option<u16>) -> Result<u16> {
		use Builtin as B;
		use Opcode as O;
		use Operand::*;

		macro_rules! arg {
			($i:expr) => {
				self.gen_expr(args[$i], None)?
			};
		}

		let out = match builtin {
			B::ExecAborted => {
				let at = self.dst_for(e, dst)?;
				self.emitter.emit(O::ExecAborted, &[Local(at)])?;
				at
			}
			B::TxnAbort => {
				self.emitter.emit(O::TxnAbort, &[])?;
				0
			}

			B::TviInit => {
				let lval = self.obj_arg(args[0])?;
				let table = self.imm_u32(args[2])?;
				let cols = self.list_id(args[3])?;
				self.emitter.emit(
					O::TableVectorIteratorInit,
					&[Local(lval), UImm4(table), UImm4(cols)],
				)?;
				0
			}
			B::TviNext => {
				let tvi = arg!(0);
				let at = self.dst_for(e, dst)?;
				self.emitter.emit(O::TableVectorIteratorNext, &[Local(at), Local(tvi)])?;
				at
			}
			B::TviGetPci => {
				let tvi = arg!(0);
				let at = self.dst_for(e, dst)?;
				self.emitter.emit(O::TableVectorIteratorGetPCI, &[Local(at), Local(tvi)])?;
				at
			}
			B::TviClose => {
				let tvi = arg!(0);
				self.emitter.emit(O::TableVectorIteratorFree, &[Local(tvi)])?;
				0
			}
			B::ParallelScanTable => {
				let table = self.imm_u32(args[1])?;
				let cols = self.list_id(args[2])?;
				let qs = self.gen_expr(args[3], None)?;
				let tsc = self.obj_arg(args[4])?;
				let f = self.func_id(args[5])?;
				self.emitter.emit(
					O::ParallelScanTable,
					&[UImm4(table), UImm4(cols), Local(qs), Local(tsc), Func(f)],
				)?;
				0
			}

			B::PciHasNext | B::PciHasNextFiltered => {
				let pci = arg!(0);
				let at = self.dst_for(e, dst)?;
				let opcode = if builtin == B::PciHasNext { O::PCIHasNext } else { O::PCIHasNextFiltered };
				self.emitter.emit(opcode, &[Local(at), Local(pci)])?;
				at
			}
			B::PciAdvance | B::PciAdvanceFiltered | B::PciReset | B::PciResetFiltered => {
				let pci = arg!(0);
				let opcode = match builtin {
					B::PciAdvance => O::PCIAdvance,
					B::PciAdvanceFiltered => O::PCIAdvanceFiltered,
					B::PciReset => O::PCIReset,
					_ => O::PCIResetFiltered,
				};
				self.emitter.emit(opcode, &[Local(pci)])?;
				0
			}
			B::PciMatch => {
				let pci = arg!(0);
				let cond = arg!(1);
				self.emitter.emit(O::PCIMatch, &[Local(pci), Local(cond)])?;
				0
			}
			B::PciGetBool | B::PciGetInt | B::PciGetReal | B::PciGetDate | B::PciGetString => {
				let pci = arg!(0);
				let col = self.imm_u32(args[1])?;
				let at = self.dst_for(e, dst)?;
				let opcode = match builtin {
					B::PciGetBool => O::PCIGetBool,
					B::PciGetInt => O::PCIGetInteger,
					B::PciGetReal => O::PCIGetReal,
					B::PciGetDate => O::PCIGetDate,
					_ => O::PCIGetVarlen,
				};
				self.emitter.emit(opcode, &[Local(at), Local(pci), UImm4(col)])?;
				at
			}
			B::PciGetSlot => {
				let pci = arg!(0);
				let at = self.dst_for(e, dst)?;
				self.emitter.emit(O::PCIGetSlot, &[Local(at), Local(pci)])?;
				at
			}

			B::FmInit => {
				let lval = self.obj_arg(args[0])?;
				self.emitter.emit(O::FilterManagerInit, &[Local(lval)])?;
				0
			}
			B::FmStartNewClause | B::FmFinalize | B::FmFree => {
				let fm = arg!(0);
				let opcode = match builtin {
					B::FmStartNewClause => O::FilterManagerStartNewClause,
					B::FmFinalize => O::FilterManagerFinalize,
					_ => O::FilterManagerFree,
				};
				self.emitter.emit(opcode, &[Local(fm)])?;
				0
			}
			B::FmInsertFlavor => {
				let fm = arg!(0);
				let f = self.func_id(args[1])?;
				self.emitter.emit(O::FilterManagerInsertFlavor, &[Local(fm), Func(f)])?;
				0
			}
			B::FmRunFilters => {
				let fm = arg!(0);
				let pci = arg!(1);
				self.emitter.emit(O::FilterManagerRunFilters, &[Local(fm), Local(pci)])?;
				0
			}

			B::InitSqlInt => {
				let at = self.dst_for(e, dst)?;
				let v = self.imm_i64(args[0])?;
				self.emitter.emit(O::InitInteger, &[Local(at), Imm8(v)])?;
				at
			}
			B::InitSqlBool => {
				let at = self.dst_for(e, dst)?;
				let v = self.imm_i64(args[0])?;
				self.emitter.emit(O::InitBool, &[Local(at), Imm1((v != 0) as i8)])?;
				at
			}
			B::InitSqlReal => {
				let at = self.dst_for(e, dst)?;
				let v = self.imm_f64(args[0])?;
				self.emitter.emit(O::InitReal, &[Local(at), Imm8F(v)])?;
				at
			}
			B::InitSqlDate => {
				let at = self.dst_for(e, dst)?;
				let v = self.imm_i64(args[0])?;
				self.emitter.emit(O::InitDate, &[Local(at), Imm4(v as i32)])?;
				at
			}
			B::InitSqlString => {
				let at = self.dst_for(e, dst)?;
				let id = self.str_id(args[0])?;
				self.emitter.emit(O::InitString, &[Local(at), UImm4(id)])?;
				at
			}
			B::InitSqlIntNull
			| B::InitSqlBoolNull
			| B::InitSqlRealNull
			| B::InitSqlDateNull
			| B::InitSqlStringNull => {
				let at = self.dst_for(e, dst)?;
				let opcode = match builtin {
					B::InitSqlIntNull => O::InitIntegerNull,
					B::InitSqlBoolNull => O::InitBoolNull,
					B::InitSqlRealNull => O::InitRealNull,
					B::InitSqlDateNull => O::InitDateNull,
					_ => O::InitStringNull,
				};
				self.emitter.emit(opcode, &[Local(at)])?;
				at
			}
			B::BoolToSql => {
				let src = arg!(0);
				let at = self.dst_for(e, dst)?;
				self.emitter.emit(O::BoolToSql, &[Local(at), Local(src)])?;
				at
			}
			B::ForceTruth => {
				let src = arg!(0);
				let at = self.dst_for(e, dst)?;
				self.emitter.emit(O::ForceBoolTruth, &[Local(at), Local(src)])?;
				at
			}
			B::SqlIsNull | B::SqlIsNotNull => {
				let src = arg!(0);
				let at = self.dst_for(e, dst)?;
				let opcode = if builtin == B::SqlIsNull { O::ValIsNull } else { O::ValIsNotNull };
				self.emitter.emit(opcode, &[Local(at), Local(src)])?;
				at
			}
			B::SqlIntToReal => {
				let src = arg!(0);
				let at = self.dst_for(e, dst)?;
				self.emitter.emit(O::IntToReal, &[Local(at), Local(src)])?;
				at
			}

			B::SqlAdd | B::SqlSub | B::SqlMul | B::SqlDiv | B::SqlRem => {
				let operand_ty = self.expr_type(args[0])?;
				let a = arg!(0);
				let b = arg!(1);
				let at = self.dst_for(e, dst)?;
				let opcode = sql_arith_opcode(builtin, operand_ty)?;
				self.emitter.emit(opcode, &[Local(at), Local(a), Local(b)])?;
				at
			}
			B::SqlCmpLt | B::SqlCmpLe | B::SqlCmpGt | B::SqlCmpGe | B::SqlCmpEq | B::SqlCmpNe => {
				let operand_ty = self.expr_type(args[0])?;
				let a = arg!(0);
				let b = arg!(1);
				let at = self.dst_for(e, dst)?;
				let opcode = sql_cmp_opcode(builtin, operand_ty)?;
				self.emitter.emit(opcode, &[Local(at), Local(a), Local(b)])?;
				at
			}

			B::SqlAbs => {
				let operand_ty = self.expr_type(args[0])?;
				let src = arg!(0);
				let at = self.dst_for(e, dst)?;
				let opcode = if operand_ty == IrType::SqlReal { O::AbsReal } else { O::AbsInteger };
				self.emitter.emit(opcode, &[Local(at), Local(src)])?;
				at
			}
			B::SqlSqrt | B::SqlExp | B::SqlLn | B::SqlFloor | B::SqlCeil | B::SqlSin | B::SqlCos
			| B::SqlTan | B::SqlLower | B::SqlUpper | B::SqlLength => {
				let src = arg!(0);
				let at = self.dst_for(e, dst)?;
				let opcode = match builtin {
					B::SqlSqrt => O::Sqrt,
					B::SqlExp => O::Exp,
					B::SqlLn => O::Ln,
					B::SqlFloor => O::Floor,
					B::SqlCeil => O::Ceil,
					B::SqlSin => O::Sin,
					B::SqlCos => O::Cos,
					B::SqlTan => O::Tan,
					B::SqlLower => O::Lower,
					B::SqlUpper => O::Upper,
					_ => O::Length,
				};
				self.emitter.emit(opcode, &[Local(at), Local(src)])?;
				at
			}

			B::HashVal => {
				let operand_ty = self.expr_type(args[0])?;
				let src = arg!(0);
				let at = self.dst_for(e, dst)?;
				let opcode = match operand_ty {
					IrType::SqlReal => O::HashReal,
					IrType::SqlString => O::HashString,
					_ => O::HashInt,
				};
				self.emitter.emit(opcode, &[Local(at), Local(src)])?;
				at
			}
			B::HashCombine => {
				let a = arg!(0);
				let b = arg!(1);
				let at = self.dst_for(e, dst)?;
				self.emitter.emit(O::HashCombine, &[Local(at), Local(a), Local(b)])?;
				at
			}

			B::AggHtInit => {
				let ht = self.obj_arg(args[0])?;
				let payload = self.imm_u32(args[1])?;
				self.emitter.emit(O::AggregationHashTableInit, &[Local(ht), UImm4(payload)])?;
				0
			}
			B::AggHtFree => {
				let ht = self.obj_arg(args[0])?;
				self.emitter.emit(O::AggregationHashTableFree, &[Local(ht)])?;
				0
			}
			B::AggHtLookup => {
				let ht = self.obj_arg(args[0])?;
				let hash = arg!(1);
				let key_eq = self.func_id(args[2])?;
				let probe = arg!(3);
				let at = self.dst_for(e, dst)?;
				self.emitter.emit(
					O::AggregationHashTableLookup,
					&[Local(at), Local(ht), Local(hash), Func(key_eq), Local(probe)],
				)?;
				at
			}
			B::AggHtInsert => {
				let ht = self.obj_arg(args[0])?;
				let hash = arg!(1);
				let at = self.dst_for(e, dst)?;
				self.emitter.emit(
					O::AggregationHashTableInsert,
					&[Local(at), Local(ht), Local(hash)],
				)?;
				at
			}
			B::AggHtProcessBatch => {
				let ht = self.obj_arg(args[0])?;
				let pci = arg!(1);
				let hash_fn = self.func_id(args[2])?;
				let key_eq = self.func_id(args[3])?;
				let init_fn = self.func_id(args[4])?;
				let advance_fn = self.func_id(args[5])?;
				self.emitter.emit(
					O::AggregationHashTableProcessBatch,
					&[Local(ht), Local(pci), Func(hash_fn), Func(key_eq), Func(init_fn), Func(advance_fn)],
				)?;
				0
			}
			B::AggHtMovePartitions => {
				let ht = self.obj_arg(args[0])?;
				let tsc = self.obj_arg(args[1])?;
				let offset = self.imm_u32(args[2])?;
				let merge = self.func_id(args[3])?;
				self.emitter.emit(
					O::AggregationHashTableTransferPartitions,
					&[Local(ht), Local(tsc), UImm4(offset), Func(merge)],
				)?;
				0
			}
			B::AggHtParallelPartScan => {
				let ht = self.obj_arg(args[0])?;
				let qs = self.gen_expr(args[1], None)?;
				let tsc = self.obj_arg(args[2])?;
				let scan = self.func_id(args[3])?;
				self.emitter.emit(
					O::AggregationHashTableParallelPartitionedScan,
					&[Local(ht), Local(qs), Local(tsc), Func(scan)],
				)?;
				0
			}
			B::AggHtIterInit => {
				let iter = self.obj_arg(args[0])?;
				let ht = self.obj_arg(args[1])?;
				self.emitter.emit(O::AggregationHashTableIteratorInit, &[Local(iter), Local(ht)])?;
				0
			}
			B::AggHtIterHasNext => {
				let iter = arg!(0);
				let at = self.dst_for(e, dst)?;
				self.emitter
					.emit(O::AggregationHashTableIteratorHasNext, &[Local(at), Local(iter)])?;
				at
			}
			B::AggHtIterNext => {
				let iter = arg!(0);
				self.emitter.emit(O::AggregationHashTableIteratorNext, &[Local(iter)])?;
				0
			}
			B::AggHtIterGetRow => {
				let iter = arg!(0);
				let at = self.dst_for(e, dst)?;
				self.emitter
					.emit(O::AggregationHashTableIteratorGetRow, &[Local(at), Local(iter)])?;
				at
			}
			B::AggHtIterFree => {
				let iter = arg!(0);
				self.emitter.emit(O::AggregationHashTableIteratorFree, &[Local(iter)])?;
				0
			}

			B::AggInit => {
				let kind = self.imm_u8(args[0])?;
				let agg = arg!(1);
				self.emitter.emit(O::AggregatorInit, &[UImm1(kind), Local(agg)])?;
				0
			}
			B::AggAdvance => {
				let kind = self.imm_u8(args[0])?;
				let agg = arg!(1);
				let val = arg!(2);
				self.emitter.emit(O::AggregatorAdvance, &[UImm1(kind), Local(agg), Local(val)])?;
				0
			}
			B::AggMerge => {
				let kind = self.imm_u8(args[0])?;
				let dst_ptr = arg!(1);
				let src_ptr = arg!(2);
				self.emitter
					.emit(O::AggregatorMerge, &[UImm1(kind), Local(dst_ptr), Local(src_ptr)])?;
				0
			}
			B::AggResult => {
				let kind = self.imm_u8(args[0])?;
				let agg = arg!(1);
				let at = self.dst_for(e, dst)?;
				self.emitter.emit(O::AggregatorResult, &[UImm1(kind), Local(at), Local(agg)])?;
				at
			}

			B::JhtInit => {
				let jht = self.obj_arg(args[0])?;
				let size = self.imm_u32(args[1])?;
				self.emitter.emit(O::JoinHashTableInit, &[Local(jht), UImm4(size)])?;
				0
			}
			B::JhtFree => {
				let jht = self.obj_arg(args[0])?;
				self.emitter.emit(O::JoinHashTableFree, &[Local(jht)])?;
				0
			}
			B::JhtAllocTuple => {
				let jht = self.obj_arg(args[0])?;
				let hash = arg!(1);
				let at = self.dst_for(e, dst)?;
				self.emitter
					.emit(O::JoinHashTableAllocTuple, &[Local(at), Local(jht), Local(hash)])?;
				at
			}
			B::JhtBuild => {
				let jht = self.obj_arg(args[0])?;
				self.emitter.emit(O::JoinHashTableBuild, &[Local(jht)])?;
				0
			}
			B::JhtBuildParallel => {
				let jht = self.obj_arg(args[0])?;
				let tsc = self.obj_arg(args[1])?;
				let offset = self.imm_u32(args[2])?;
				self.emitter
					.emit(O::JoinHashTableBuildParallel, &[Local(jht), Local(tsc), UImm4(offset)])?;
				0
			}
			B::JhtIterInit => {
				let iter = self.obj_arg(args[0])?;
				let jht = self.obj_arg(args[1])?;
				let hash = arg!(2);
				self.emitter
					.emit(O::JoinHashTableIterInit, &[Local(iter), Local(jht), Local(hash)])?;
				0
			}
			B::JhtIterHasNext => {
				let iter = arg!(0);
				let at = self.dst_for(e, dst)?;
				self.emitter.emit(O::JoinHashTableIterHasNext, &[Local(at), Local(iter)])?;
				at
			}
			B::JhtIterGetRow => {
				let iter = arg!(0);
				let at = self.dst_for(e, dst)?;
				self.emitter.emit(O::JoinHashTableIterGetRow, &[Local(at), Local(iter)])?;
				at
			}

			B::SorterInit => {
				let sorter = self.obj_arg(args[0])?;
				let cmp = self.func_id(args[1])?;
				let size = self.imm_u32(args[2])?;
				self.emitter.emit(O::SorterInit, &[Local(sorter), Func(cmp), UImm4(size)])?;
				0
			}
			B::SorterFree => {
				let sorter = self.obj_arg(args[0])?;
				self.emitter.emit(O::SorterFree, &[Local(sorter)])?;
				0
			}
			B::SorterAllocTuple => {
				let sorter = self.obj_arg(args[0])?;
				let at = self.dst_for(e, dst)?;
				self.emitter.emit(O::SorterAllocTuple, &[Local(at), Local(sorter)])?;
				at
			}
			B::SorterAllocTupleTopK => {
				let sorter = self.obj_arg(args[0])?;
				let k = self.imm_u32(args[1])?;
				let at = self.dst_for(e, dst)?;
				self.emitter.emit(O::SorterAllocTupleTopK, &[Local(at), Local(sorter), UImm4(k)])?;
				at
			}
			B::SorterAllocTupleTopKFinish => {
				let sorter = self.obj_arg(args[0])?;
				let k = self.imm_u32(args[1])?;
				self.emitter.emit(O::SorterAllocTupleTopKFinish, &[Local(sorter), UImm4(k)])?;
				0
			}
			B::SorterSort => {
				let sorter = self.obj_arg(args[0])?;
				self.emitter.emit(O::SorterSort, &[Local(sorter)])?;
				0
			}
			B::SorterSortParallel => {
				let sorter = self.obj_arg(args[0])?;
				let tsc = self.obj_arg(args[1])?;
				let offset = self.imm_u32(args[2])?;
				self.emitter
					.emit(O::SorterSortParallel, &[Local(sorter), Local(tsc), UImm4(offset)])?;
				0
			}
			B::SorterSortTopKParallel => {
				let sorter = self.obj_arg(args[0])?;
				let tsc = self.obj_arg(args[1])?;
				let offset = self.imm_u32(args[2])?;
				let k = self.imm_u32(args[3])?;
				self.emitter.emit(
					O::SorterSortTopKParallel,
					&[Local(sorter), Local(tsc), UImm4(offset), UImm4(k)],
				)?;
				0
			}
			B::SorterIterInit => {
				let iter = self.obj_arg(args[0])?;
				let sorter = self.obj_arg(args[1])?;
				self.emitter.emit(O::SorterIteratorInit, &[Local(iter), Local(sorter)])?;
				0
			}
			B::SorterIterHasNext => {
				let iter = arg!(0);
				let at = self.dst_for(e, dst)?;
				self.emitter.emit(O::SorterIteratorHasNext, &[Local(at), Local(iter)])?;
				at
			}
			B::SorterIterNext => {
				let iter = arg!(0);
				self.emitter.emit(O::SorterIteratorNext, &[Local(iter)])?;
				0
			}
			B::SorterIterGetRow => {
				let iter = arg!(0);
				let at = self.dst_for(e, dst)?;
				self.emitter.emit(O::SorterIteratorGetRow, &[Local(at), Local(iter)])?;
				at
			}

			B::PtrIsNull | B::PtrIsNotNull => {
				let src = arg!(0);
				let at = self.dst_for(e, dst)?;
				let opcode = if builtin == B::PtrIsNull { O::IsNullPtr } else { O::IsNotNullPtr };
				self.emitter.emit(opcode, &[Local(at), Local(src)])?;
				at
			}
			B::PtrOffset => {
				let src = arg!(0);
				let offset = self.imm_u32(args[1])?;
				let at = self.dst_for(e, dst)?;
				self.emitter.emit(O::Lea, &[Local(at), Local(src), UImm4(offset)])?;
				at
			}
			B::StateBase => {
				let at = self.dst_for(e, dst)?;
				self.emitter.emit(
					O::AssignImm8,
					&[Local(at), Imm8(ptr::state_ptr(0) as i64)],
				)?;
				at
			}

			B::RowAlloc => {
				let size = self.imm_u32(args[0])?;
				let at = self.dst_for(e, dst)?;
				self.emitter.emit(O::RowAlloc, &[Local(at), UImm4(size)])?;
				at
			}
			B::RowWrite => {
				let row = arg!(0);
				let offset = self.imm_u32(args[1])?;
				let val = arg!(2);
				self.emitter.emit(O::RowWrite, &[Local(row), UImm4(offset), Local(val)])?;
				0
			}
			B::RowReadBool | B::RowReadInt | B::RowReadReal | B::RowReadDate | B::RowReadString => {
				let row = arg!(0);
				let offset = self.imm_u32(args[1])?;
				let at = self.dst_for(e, dst)?;
				let opcode = match builtin {
					B::RowReadBool => O::RowReadBool,
					B::RowReadInt => O::RowReadInteger,
					B::RowReadReal => O::RowReadReal,
					B::RowReadDate => O::RowReadDate,
					_ => O::RowReadString,
				};
				self.emitter.emit(opcode, &[Local(at), Local(row), UImm4(offset)])?;
				at
			}

			B::OutputAlloc => {
				let at = self.dst_for(e, dst)?;
				self.emitter.emit(O::OutputAlloc, &[Local(at)])?;
				at
			}
			B::OutputAdvance => {
				self.emitter.emit(O::OutputAdvance, &[])?;
				0
			}
			B::OutputFinalize => {
				self.emitter.emit(O::OutputFinalize, &[])?;
				0
			}

			B::TableInsert => {
				let table = self.imm_u32(args[1])?;
				let cols = self.list_id(args[2])?;
				let row = arg!(3);
				let at = self.dst_for(e, dst)?;
				self.emitter.emit(
					O::TableInsert,
					&[Local(at), UImm4(table), UImm4(cols), Local(row)],
				)?;
				at
			}
			B::TableUpdate => {
				let table = self.imm_u32(args[1])?;
				let cols = self.list_id(args[2])?;
				let slot = arg!(3);
				let row = arg!(4);
				let at = self.dst_for(e, dst)?;
				self.emitter.emit(
					O::TableUpdate,
					&[Local(at), UImm4(table), UImm4(cols), Local(slot), Local(row)],
				)?;
				at
			}
			B::TableDelete => {
				let table = self.imm_u32(args[1])?;
				let slot = arg!(2);
				let at = self.dst_for(e, dst)?;
				self.emitter.emit(O::TableDelete, &[Local(at), UImm4(table), Local(slot)])?;
				at
			}

			B::IndexInsert => {
				let index = self.imm_u32(args[1])?;
				let key = arg!(2);
				let slot = arg!(3);
				let unique = self.imm_u8(args[4])?;
				let at = self.dst_for(e, dst)?;
				self.emitter.emit(
					O::IndexInsert,
					&[Local(at), UImm4(index), Local(key), Local(slot), UImm1(unique)],
				)?;
				at
			}
			B::IndexIterInit => {
				let iter = self.obj_arg(args[0])?;
				let index = self.imm_u32(args[2])?;
				let table = self.imm_u32(args[3])?;
				let cols = self.list_id(args[4])?;
				self.emitter.emit(
					O::IndexIteratorInit,
					&[Local(iter), UImm4(index), UImm4(table), UImm4(cols)],
				)?;
				0
			}
			B::IndexIterScanKey => {
				let iter = arg!(0);
				let key = arg!(1);
				self.emitter.emit(O::IndexIteratorScanKey, &[Local(iter), Local(key)])?;
				0
			}
			B::IndexIterScanRange => {
				let iter = arg!(0);
				let lo = arg!(1);
				let hi = arg!(2);
				let asc = self.imm_u8(args[3])?;
				let limit = self.imm_u32(args[4])?;
				self.emitter.emit(
					O::IndexIteratorScanRange,
					&[Local(iter), Local(lo), Local(hi), UImm1(asc), UImm4(limit)],
				)?;
				0
			}
			B::IndexIterAdvance => {
				let iter = arg!(0);
				let at = self.dst_for(e, dst)?;
				self.emitter.emit(O::IndexIteratorAdvance, &[Local(at), Local(iter)])?;
				at
			}
			B::IndexIterGetBool
			| B::IndexIterGetInt
			| B::IndexIterGetReal
			| B::IndexIterGetDate
			| B::IndexIterGetString => {
				let iter = arg!(0);
				let col = self.imm_u32(args[1])?;
				let at = self.dst_for(e, dst)?;
				let opcode = match builtin {
					B::IndexIterGetBool => O::IndexIteratorGetBool,
					B::IndexIterGetInt => O::IndexIteratorGetInteger,
					B::IndexIterGetReal => O::IndexIteratorGetReal,
					B::IndexIterGetDate => O::IndexIteratorGetDate,
					_ => O::IndexIteratorGetString,
				};
				self.emitter.emit(opcode, &[Local(at), Local(iter), UImm4(col)])?;
				at
			}
			B::IndexIterFree => {
				let iter = arg!(0);
				self.emitter.emit(O::IndexIteratorFree, &[Local(iter)])?;
				0
			}

			B::TscReset => {
				let tsc = self.obj_arg(args[0])?;
				let size = self.imm_u32(args[1])?;
				let init_fn = self.func_id(args[2])?;
				let fini_fn = self.func_id(args[3])?;
				let ctx = arg!(4);
				self.emitter.emit(
					O::ThreadStateContainerReset,
					&[Local(tsc), UImm4(size), Func(init_fn), Func(fini_fn), Local(ctx)],
				)?;
				0
			}
			B::TscIterate => {
				let tsc = self.obj_arg(args[0])?;
				let ctx = arg!(1);
				let f = self.func_id(args[2])?;
				self.emitter
					.emit(O::ThreadStateContainerIterate, &[Local(tsc), Local(ctx), Func(f)])?;
				0
			}
			B::TscFree => {
				let tsc = self.obj_arg(args[0])?;
				self.emitter.emit(O::ThreadStateContainerFree, &[Local(tsc)])?;
				0
			}

			B::CallFn => {
				let target = self.func_id(args[0])?;
				let mut arg_offsets = Vec::with_capacity(args.len() - 1);
				for arg in &args[1..] {
					arg_offsets.push(self.gen_expr(*arg, None)?);
				}
				self.emitter.emit_function_call(target, &arg_offsets)?;
				0
			}
		};
		Ok(out)
	}
}

fn binary_opcode(op: BinOp, ty: IrType) -> Result<Opcode> {
	use IrType::*;
	use Opcode as O;

	macro_rules! per_type {
		($i8:ident, $i16:ident, $i32:ident, $i64:ident, $u8:ident, $u16:ident, $u32:ident, $u64:ident, $f32:ident, $f64:ident) => {
			match ty {
				Int8 => O::$i8,
				Int16 => O::$i16,
				Int32 => O::$i32,
				Int64 => O::$i64,
				UInt8 | Bool => O::$u8,
				UInt16 => O::$u16,
				UInt32 => O::$u32,
				UInt64 => O::$u64,
				Float32 => O::$f32,
				Float64 => O::$f64,
				_ => {
					return Err(VmError::Invariant(format!(
						"primitive operator over {:?}",
						ty
					)));
				}
			}
		};
	}
	macro_rules! int_type {
		($i8:ident, $i16:ident, $i32:ident, $i64:ident, $u8:ident, $u16:ident, $u32:ident, $u64:ident) => {
			match ty {
				Int8 => O::$i8,
				Int16 => O::$i16,
				Int32 => O::$i32,
				Int64 => O::$i64,
				UInt8 | Bool => O::$u8,
				UInt16 => O::$u16,
				UInt32 => O::$u32,
				UInt64 => O::$u64,
				_ => {
					return Err(VmError::Invariant(format!(
						"integer operator over {:?}",
						ty
					)));
				}
			}
		};
	}

	Ok(match op {
		BinOp::Add => per_type!(AddI8, AddI16, AddI32, AddI64, AddU8, AddU16, AddU32, AddU64, AddF32, AddF64),
		BinOp::Sub => per_type!(SubI8, SubI16, SubI32, SubI64, SubU8, SubU16, SubU32, SubU64, SubF32, SubF64),
		BinOp::Mul => per_type!(MulI8, MulI16, MulI32, MulI64, MulU8, MulU16, MulU32, MulU64, MulF32, MulF64),
		BinOp::Div => per_type!(DivI8, DivI16, DivI32, DivI64, DivU8, DivU16, DivU32, DivU64, DivF32, DivF64),
		BinOp::Rem => per_type!(RemI8, RemI16, RemI32, RemI64, RemU8, RemU16, RemU32, RemU64, RemF32, RemF64),
		BinOp::BitAnd | BinOp::And => {
			int_type!(BitAndI8, BitAndI16, BitAndI32, BitAndI64, BitAndU8, BitAndU16, BitAndU32, BitAndU64)
		}
		BinOp::BitOr | BinOp::Or => {
			int_type!(BitOrI8, BitOrI16, BitOrI32, BitOrI64, BitOrU8, BitOrU16, BitOrU32, BitOrU64)
		}
		BinOp::BitXor => {
			int_type!(BitXorI8, BitXorI16, BitXorI32, BitXorI64, BitXorU8, BitXorU16, BitXorU32, BitXorU64)
		}
		BinOp::Lt => per_type!(
			LessThanI8, LessThanI16, LessThanI32, LessThanI64, LessThanU8, LessThanU16, LessThanU32,
			LessThanU64, LessThanF32, LessThanF64
		),
		BinOp::Le => per_type!(
			LessThanEqualI8, LessThanEqualI16, LessThanEqualI32, LessThanEqualI64, LessThanEqualU8,
			LessThanEqualU16, LessThanEqualU32, LessThanEqualU64, LessThanEqualF32, LessThanEqualF64
		),
		BinOp::Gt => per_type!(
			GreaterThanI8, GreaterThanI16, GreaterThanI32, GreaterThanI64, GreaterThanU8,
			GreaterThanU16, GreaterThanU32, GreaterThanU64, GreaterThanF32, GreaterThanF64
		),
		BinOp::Ge => per_type!(
			GreaterThanEqualI8, GreaterThanEqualI16, GreaterThanEqualI32, GreaterThanEqualI64,
			GreaterThanEqualU8, GreaterThanEqualU16, GreaterThanEqualU32, GreaterThanEqualU64,
			GreaterThanEqualF32, GreaterThanEqualF64
		),
		BinOp::Eq => per_type!(
			EqualI8, EqualI16, EqualI32, EqualI64, EqualU8, EqualU16, EqualU32, EqualU64, EqualF32,
			EqualF64
		),
		BinOp::Ne => per_type!(
			NotEqualI8, NotEqualI16, NotEqualI32, NotEqualI64, NotEqualU8, NotEqualU16, NotEqualU32,
			NotEqualU64, NotEqualF32, NotEqualF64
		),
	})
}

fn neg_opcode(ty: IrType) -> Result<Opcode> {
	use IrType::*;
	use Opcode as O;
	Ok(match ty {
		Int8 => O::NegI8,
		Int16 => O::NegI16,
		Int32 => O::NegI32,
		Int64 => O::NegI64,
		UInt8 => O::NegU8,
		UInt16 => O::NegU16,
		UInt32 => O::NegU32,
		UInt64 => O::NegU64,
		Float32 => O::NegF32,
		Float64 => O::NegF64,
		_ => {
			return Err(VmError::Invariant(format!("negation over {:?}", ty)));
		}
	})
}

fn bitneg_opcode(ty: IrType) -> Result<Opcode> {
	use IrType::*;
	use Opcode as O;
	Ok(match ty {
		Int8 => O::BitNegI8,
		Int16 => O::BitNegI16,
		Int32 => O::BitNegI32,
		Int64 => O::BitNegI64,
		UInt8 => O::BitNegU8,
		UInt16 => O::BitNegU16,
		UInt32 => O::BitNegU32,
		UInt64 => O::BitNegU64,
		_ => {
			return Err(VmError::Invariant(format!("bit complement over {:?}", ty)));
		}
	})
}

fn sql_arith_opcode(builtin: Builtin, ty: IrType) -> Result<Opcode> {
	use Builtin as B;
	use Opcode as O;
	Ok(match (builtin, ty) {
		(B::SqlAdd, IrType::SqlInt) => O::AddInteger,
		(B::SqlSub, IrType::SqlInt) => O::SubInteger,
		(B::SqlMul, IrType::SqlInt) => O::MulInteger,
		(B::SqlDiv, IrType::SqlInt) => O::DivInteger,
		(B::SqlRem, IrType::SqlInt) => O::RemInteger,
		(B::SqlAdd, IrType::SqlReal) => O::AddReal,
		(B::SqlSub, IrType::SqlReal) => O::SubReal,
		(B::SqlMul, IrType::SqlReal) => O::MulReal,
		(B::SqlDiv, IrType::SqlReal) => O::DivReal,
		(B::SqlRem, IrType::SqlReal) => O::RemReal,
		_ => {
			return Err(VmError::Invariant(format!("sql arithmetic over {:?}", ty)));
		}
	})
}

fn sql_cmp_opcode(builtin: Builtin, ty: IrType) -> Result<Opcode> {
	use Builtin as B;
	use Opcode as O;
	let family = match ty {
		// Bool payloads are widened integers; they compare numerically.
		IrType::SqlInt | IrType::SqlBool => 0,
		IrType::SqlReal => 1,
		IrType::SqlString => 2,
		IrType::SqlDate => 3,
		_ => {
			return Err(VmError::Invariant(format!("sql comparison over {:?}", ty)));
		}
	};
	Ok(match (builtin, family) {
		(B::SqlCmpLt, 0) => O::LessThanInteger,
		(B::SqlCmpLe, 0) => O::LessThanEqualInteger,
		(B::SqlCmpGt, 0) => O::GreaterThanInteger,
		(B::SqlCmpGe, 0) => O::GreaterThanEqualInteger,
		(B::SqlCmpEq, 0) => O::EqualInteger,
		(B::SqlCmpNe, 0) => O::NotEqualInteger,
		(B::SqlCmpLt, 1) => O::LessThanReal,
		(B::SqlCmpLe, 1) => O::LessThanEqualReal,
		(B::SqlCmpGt, 1) => O::GreaterThanReal,
		(B::SqlCmpGe, 1) => O::GreaterThanEqualReal,
		(B::SqlCmpEq, 1) => O::EqualReal,
		(B::SqlCmpNe, 1) => O::NotEqualReal,
		(B::SqlCmpLt, 2) => O::LessThanString,
		(B::SqlCmpLe, 2) => O::LessThanEqualString,
		(B::SqlCmpGt, 2) => O::GreaterThanString,
		(B::SqlCmpGe, 2) => O::GreaterThanEqualString,
		(B::SqlCmpEq, 2) => O::EqualString,
		(B::SqlCmpNe, 2) => O::NotEqualString,
		(B::SqlCmpLt, 3) => O::LessThanDate,
		(B::SqlCmpLe, 3) => O::LessThanEqualDate,
		(B::SqlCmpGt, 3) => O::GreaterThanDate,
		(B::SqlCmpGe, 3) => O::GreaterThanEqualDate,
		(B::SqlCmpEq, 3) => O::EqualDate,
		(B::SqlCmpNe, 3) => O::NotEqualDate,
		_ => {
			return Err(VmError::Invariant("sql comparison lowering".into()));
		}
	})
}
