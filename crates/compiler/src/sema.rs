// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Semantic checker.
//!
//! Walks every emitted function after translation and before lowering,
//! assigning types bottom-up and validating builtin signatures, branch
//! conditions, assignments, and returns. Diagnostics accumulate over the
//! whole pass; lowering is gated on a clean report.

use crate::error::{ErrorReporter, SourcePos};
use crate::ir::{AggKind, BinOp, Builtin, ExprId, ExprKind, Function, IrArena, IrType, StmtId, StmtKind, UnOp};

/// Per-argument requirement of a builtin.
#[derive(Debug, Clone, Copy)]
enum Param {
	/// Exact type.
	T(IrType),
	/// Any SQL value.
	AnySql,
	/// SQL integer or real.
	SqlNum,
	/// Any comparable SQL value.
	SqlCmp,
	/// Same type as argument 0.
	Same0,
	/// Integer literal immediate.
	IntImm,
	/// Float literal immediate.
	FloatImm,
	/// String literal immediate.
	StrImm,
	/// Interned u32-list immediate.
	ListImm,
	/// Function reference immediate.
	FnImm,
	/// A local of the given type the runtime writes into.
	Lval(IrType),
}

#[derive(Debug, Clone, Copy)]
enum Ret {
	T(IrType),
	/// Same type as argument 0.
	Same0,
	/// Result type of the aggregator kind in argument 0.
	AggResult,
}

fn signature(builtin: Builtin) -> (Vec<Param>, Ret) {
	use Builtin::*;
	use IrType::*;
	use Param as P;
	use Ret as R;
	match builtin {
		ExecAborted => (vec![P::T(ExecCtx)], R::T(Bool)),
		TxnAbort => (vec![P::T(ExecCtx)], R::T(Nil)),

		TviInit => (vec![P::Lval(Tvi), P::T(ExecCtx), P::IntImm, P::ListImm], R::T(Nil)),
		TviNext => (vec![P::T(Tvi)], R::T(Bool)),
		TviGetPci => (vec![P::T(Tvi)], R::T(Pci)),
		TviClose => (vec![P::T(Tvi)], R::T(Nil)),
		ParallelScanTable => (
			vec![P::T(ExecCtx), P::IntImm, P::ListImm, P::T(StatePtr), P::T(ThreadStates), P::FnImm],
			R::T(Nil),
		),

		PciHasNext | PciHasNextFiltered => (vec![P::T(Pci)], R::T(Bool)),
		PciAdvance | PciAdvanceFiltered | PciReset | PciResetFiltered => (vec![P::T(Pci)], R::T(Nil)),
		PciMatch => (vec![P::T(Pci), P::T(Bool)], R::T(Nil)),
		PciGetBool => (vec![P::T(Pci), P::IntImm], R::T(SqlBool)),
		PciGetInt => (vec![P::T(Pci), P::IntImm], R::T(SqlInt)),
		PciGetReal => (vec![P::T(Pci), P::IntImm], R::T(SqlReal)),
		PciGetDate => (vec![P::T(Pci), P::IntImm], R::T(SqlDate)),
		PciGetString => (vec![P::T(Pci), P::IntImm], R::T(SqlString)),
		PciGetSlot => (vec![P::T(Pci)], R::T(UInt64)),

		FmInit => (vec![P::Lval(FilterManager)], R::T(Nil)),
		FmStartNewClause | FmFinalize | FmFree => (vec![P::T(FilterManager)], R::T(Nil)),
		FmInsertFlavor => (vec![P::T(FilterManager), P::FnImm], R::T(Nil)),
		FmRunFilters => (vec![P::T(FilterManager), P::T(Pci)], R::T(Nil)),

		InitSqlInt => (vec![P::IntImm], R::T(SqlInt)),
		InitSqlBool => (vec![P::IntImm], R::T(SqlBool)),
		InitSqlReal => (vec![P::FloatImm], R::T(SqlReal)),
		InitSqlDate => (vec![P::IntImm], R::T(SqlDate)),
		InitSqlString => (vec![P::StrImm], R::T(SqlString)),
		InitSqlIntNull => (vec![], R::T(SqlInt)),
		InitSqlBoolNull => (vec![], R::T(SqlBool)),
		InitSqlRealNull => (vec![], R::T(SqlReal)),
		InitSqlDateNull => (vec![], R::T(SqlDate)),
		InitSqlStringNull => (vec![], R::T(SqlString)),
		BoolToSql => (vec![P::T(Bool)], R::T(SqlBool)),
		ForceTruth => (vec![P::T(SqlBool)], R::T(Bool)),
		SqlIsNull | SqlIsNotNull => (vec![P::AnySql], R::T(Bool)),
		SqlIntToReal => (vec![P::T(SqlInt)], R::T(SqlReal)),

		SqlAdd | SqlSub | SqlMul | SqlDiv | SqlRem => (vec![P::SqlNum, P::Same0], R::Same0),
		SqlCmpLt | SqlCmpLe | SqlCmpGt | SqlCmpGe | SqlCmpEq | SqlCmpNe => {
			(vec![P::SqlCmp, P::Same0], R::T(SqlBool))
		}

		SqlAbs => (vec![P::SqlNum], R::Same0),
		SqlSqrt | SqlExp | SqlLn | SqlFloor | SqlCeil | SqlSin | SqlCos | SqlTan => {
			(vec![P::T(SqlReal)], R::T(SqlReal))
		}
		SqlLower | SqlUpper => (vec![P::T(SqlString)], R::T(SqlString)),
		SqlLength => (vec![P::T(SqlString)], R::T(SqlInt)),

		HashVal => (vec![P::AnySql], R::T(UInt64)),
		HashCombine => (vec![P::T(UInt64), P::T(UInt64)], R::T(UInt64)),

		AggHtInit => (vec![P::T(AggHashTable), P::IntImm], R::T(Nil)),
		AggHtFree => (vec![P::T(AggHashTable)], R::T(Nil)),
		AggHtLookup => (vec![P::T(AggHashTable), P::T(UInt64), P::FnImm, P::T(RowPtr)], R::T(RowPtr)),
		AggHtInsert => (vec![P::T(AggHashTable), P::T(UInt64)], R::T(RowPtr)),
		AggHtProcessBatch => (
			vec![P::T(AggHashTable), P::T(Pci), P::FnImm, P::FnImm, P::FnImm, P::FnImm],
			R::T(Nil),
		),
		AggHtMovePartitions => {
			(vec![P::T(AggHashTable), P::T(ThreadStates), P::IntImm, P::FnImm], R::T(Nil))
		}
		AggHtParallelPartScan => {
			(vec![P::T(AggHashTable), P::T(StatePtr), P::T(ThreadStates), P::FnImm], R::T(Nil))
		}
		AggHtIterInit => (vec![P::Lval(AggHashTableIter), P::T(AggHashTable)], R::T(Nil)),
		AggHtIterHasNext => (vec![P::T(AggHashTableIter)], R::T(Bool)),
		AggHtIterNext | AggHtIterFree => (vec![P::T(AggHashTableIter)], R::T(Nil)),
		AggHtIterGetRow => (vec![P::T(AggHashTableIter)], R::T(RowPtr)),

		AggInit => (vec![P::IntImm, P::T(RowPtr)], R::T(Nil)),
		AggAdvance => (vec![P::IntImm, P::T(RowPtr), P::AnySql], R::T(Nil)),
		AggMerge => (vec![P::IntImm, P::T(RowPtr), P::T(RowPtr)], R::T(Nil)),
		AggResult => (vec![P::IntImm, P::T(RowPtr)], R::AggResult),

		JhtInit => (vec![P::T(JoinHashTable), P::IntImm], R::T(Nil)),
		JhtFree | JhtBuild => (vec![P::T(JoinHashTable)], R::T(Nil)),
		JhtAllocTuple => (vec![P::T(JoinHashTable), P::T(UInt64)], R::T(RowPtr)),
		JhtBuildParallel => (vec![P::T(JoinHashTable), P::T(ThreadStates), P::IntImm], R::T(Nil)),
		JhtIterInit => (vec![P::Lval(JoinHashTableIter), P::T(JoinHashTable), P::T(UInt64)], R::T(Nil)),
		JhtIterHasNext => (vec![P::T(JoinHashTableIter)], R::T(Bool)),
		JhtIterGetRow => (vec![P::T(JoinHashTableIter)], R::T(RowPtr)),

		SorterInit => (vec![P::T(Sorter), P::FnImm, P::IntImm], R::T(Nil)),
		SorterFree | SorterSort => (vec![P::T(Sorter)], R::T(Nil)),
		SorterAllocTuple => (vec![P::T(Sorter)], R::T(RowPtr)),
		SorterAllocTupleTopK => (vec![P::T(Sorter), P::IntImm], R::T(RowPtr)),
		SorterAllocTupleTopKFinish => (vec![P::T(Sorter), P::IntImm], R::T(Nil)),
		SorterSortParallel => (vec![P::T(Sorter), P::T(ThreadStates), P::IntImm], R::T(Nil)),
		SorterSortTopKParallel => {
			(vec![P::T(Sorter), P::T(ThreadStates), P::IntImm, P::IntImm], R::T(Nil))
		}
		SorterIterInit => (vec![P::Lval(SorterIter), P::T(Sorter)], R::T(Nil)),
		SorterIterHasNext => (vec![P::T(SorterIter)], R::T(Bool)),
		SorterIterNext => (vec![P::T(SorterIter)], R::T(Nil)),
		SorterIterGetRow => (vec![P::T(SorterIter)], R::T(RowPtr)),

		PtrIsNull | PtrIsNotNull => (vec![P::T(RowPtr)], R::T(Bool)),
		PtrOffset => (vec![P::T(RowPtr), P::IntImm], R::T(RowPtr)),
		StateBase => (vec![], R::T(StatePtr)),

		RowAlloc => (vec![P::IntImm], R::T(RowPtr)),
		RowWrite => (vec![P::T(RowPtr), P::IntImm, P::AnySql], R::T(Nil)),
		RowReadBool => (vec![P::T(RowPtr), P::IntImm], R::T(SqlBool)),
		RowReadInt => (vec![P::T(RowPtr), P::IntImm], R::T(SqlInt)),
		RowReadReal => (vec![P::T(RowPtr), P::IntImm], R::T(SqlReal)),
		RowReadDate => (vec![P::T(RowPtr), P::IntImm], R::T(SqlDate)),
		RowReadString => (vec![P::T(RowPtr), P::IntImm], R::T(SqlString)),

		OutputAlloc => (vec![P::T(ExecCtx)], R::T(RowPtr)),
		OutputAdvance | OutputFinalize => (vec![P::T(ExecCtx)], R::T(Nil)),

		TableInsert => (vec![P::T(ExecCtx), P::IntImm, P::ListImm, P::T(RowPtr)], R::T(UInt64)),
		TableUpdate => {
			(vec![P::T(ExecCtx), P::IntImm, P::ListImm, P::T(UInt64), P::T(RowPtr)], R::T(Bool))
		}
		TableDelete => (vec![P::T(ExecCtx), P::IntImm, P::T(UInt64)], R::T(Bool)),

		IndexInsert => {
			(vec![P::T(ExecCtx), P::IntImm, P::T(RowPtr), P::T(UInt64), P::IntImm], R::T(Bool))
		}
		IndexIterInit => {
			(vec![P::Lval(IndexIter), P::T(ExecCtx), P::IntImm, P::IntImm, P::ListImm], R::T(Nil))
		}
		IndexIterScanKey => (vec![P::T(IndexIter), P::T(RowPtr)], R::T(Nil)),
		IndexIterScanRange => {
			(vec![P::T(IndexIter), P::T(RowPtr), P::T(RowPtr), P::IntImm, P::IntImm], R::T(Nil))
		}
		IndexIterAdvance => (vec![P::T(IndexIter)], R::T(Bool)),
		IndexIterGetBool => (vec![P::T(IndexIter), P::IntImm], R::T(SqlBool)),
		IndexIterGetInt => (vec![P::T(IndexIter), P::IntImm], R::T(SqlInt)),
		IndexIterGetReal => (vec![P::T(IndexIter), P::IntImm], R::T(SqlReal)),
		IndexIterGetDate => (vec![P::T(IndexIter), P::IntImm], R::T(SqlDate)),
		IndexIterGetString => (vec![P::T(IndexIter), P::IntImm], R::T(SqlString)),
		IndexIterFree => (vec![P::T(IndexIter)], R::T(Nil)),

		TscReset => {
			(vec![P::T(ThreadStates), P::IntImm, P::FnImm, P::FnImm, P::T(StatePtr)], R::T(Nil))
		}
		TscIterate => (vec![P::T(ThreadStates), P::T(StatePtr), P::FnImm], R::T(Nil)),
		TscFree => (vec![P::T(ThreadStates)], R::T(Nil)),

		// Checked structurally against the callee's declaration.
		CallFn => (vec![], R::T(Nil)),
	}
}

pub struct TypeCheck<'a> {
	arena: &'a IrArena,
	pub types: Vec<Option<IrType>>,
	pub reporter: ErrorReporter,
	fn_name: String,
	loop_depth: usize,
}

/// Type-check every function in the arena. Returns the per-expression
/// types and the accumulated diagnostics.
pub fn check(arena: &IrArena) -> (Vec<Option<IrType>>, ErrorReporter) {
	let mut checker = TypeCheck {
		arena,
		types: vec![None; arena.exprs.len()],
		reporter: ErrorReporter::new(),
		fn_name: String::new(),
		loop_depth: 0,
	};
	for function in arena.functions.iter() {
		checker.fn_name = function.name.clone();
		checker.loop_depth = 0;
		for stmt in &function.body {
			checker.check_stmt(function, *stmt);
		}
	}
	(checker.types, checker.reporter)
}

impl<'a> TypeCheck<'a> {
	fn pos(&self, node: u32) -> SourcePos {
		SourcePos { function: self.fn_name.clone(), node }
	}

	fn error(&mut self, node: u32, code: &'static str, message: String) {
		let pos = self.pos(node);
		self.reporter.error(pos, code, message);
	}

	fn check_stmt(&mut self, function: &Function, stmt: StmtId) {
		match self.arena.stmts[stmt.index()].clone() {
			StmtKind::Expr(expr) => {
				self.check_expr(function, expr, None);
			}
			StmtKind::Assign { dst, src } => {
				let dst_ty = match &self.arena.exprs[dst.index()] {
					ExprKind::Local(local) => {
						let ty = function.locals[local.index()].ty;
						self.types[dst.index()] = Some(ty);
						Some(ty)
					}
					ExprKind::StateField { ty, .. } => {
						if ty.is_sql() {
							self.error(
								dst.0,
								"TY010",
								"state fields cannot hold SQL values".into(),
							);
						}
						self.types[dst.index()] = Some(*ty);
						Some(*ty)
					}
					_ => {
						self.error(dst.0, "TY011", "assignment target must be a local or state field".into());
						None
					}
				};
				self.check_expr(function, src, dst_ty);
			}
			StmtKind::If { cond, then_block, else_block } => {
				self.check_expr(function, cond, Some(IrType::Bool));
				for s in then_block {
					self.check_stmt(function, s);
				}
				for s in else_block {
					self.check_stmt(function, s);
				}
			}
			StmtKind::Loop { body } => {
				self.loop_depth += 1;
				for s in body {
					self.check_stmt(function, s);
				}
				self.loop_depth -= 1;
			}
			StmtKind::Break => {
				if self.loop_depth == 0 {
					self.error(stmt.0, "TY012", "break outside of a loop".into());
				}
			}
			StmtKind::Return(value) => match (value, function.ret) {
				(None, IrType::Nil) => {}
				(None, ret) => {
					self.error(stmt.0, "TY013", format!("missing return value of type {:?}", ret));
				}
				(Some(expr), ret) => {
					if ret == IrType::Nil {
						self.error(stmt.0, "TY014", "return value in a void function".into());
					} else {
						self.check_expr(function, expr, Some(ret));
					}
				}
			},
		}
	}

	fn check_expr(&mut self, function: &Function, expr: ExprId, expected: Option<IrType>) -> IrType {
		let found = match self.arena.exprs[expr.index()].clone() {
			ExprKind::IntLit(_) => match expected {
				Some(ty) if ty.is_primitive_int() => ty,
				_ => IrType::Int64,
			},
			ExprKind::FloatLit(_) => match expected {
				Some(ty) if ty.is_primitive_float() => ty,
				_ => IrType::Float64,
			},
			ExprKind::BoolLit(_) => IrType::Bool,
			ExprKind::StrLit(_) | ExprKind::U32ListLit(_) | ExprKind::FuncLit(_) => {
				self.error(expr.0, "TY020", "immediate used in value position".into());
				expected.unwrap_or(IrType::Nil)
			}
			ExprKind::Local(local) => function.locals[local.index()].ty,
			ExprKind::StateField { ty, .. } => ty,
			ExprKind::Binary { op, lhs, rhs } => self.check_binary(function, expr, op, lhs, rhs),
			ExprKind::Unary { op, operand } => {
				let ty = self.check_expr(function, operand, None);
				match op {
					UnOp::Not if ty != IrType::Bool => {
						self.error(expr.0, "TY021", format!("logical not over {:?}", ty));
					}
					UnOp::Neg if !(ty.is_primitive_int() || ty.is_primitive_float()) => {
						self.error(expr.0, "TY022", format!("negation over {:?}", ty));
					}
					UnOp::BitNot if !ty.is_primitive_int() => {
						self.error(expr.0, "TY023", format!("bit complement over {:?}", ty));
					}
					_ => {}
				}
				ty
			}
			ExprKind::Call { builtin, args } => self.check_call(function, expr, builtin, &args),
		};
		if let Some(expected) = expected {
			if expected != found && found != IrType::Nil {
				self.error(
					expr.0,
					"TY001",
					format!("expected {:?}, found {:?}", expected, found),
				);
			}
		}
		self.types[expr.index()] = Some(found);
		found
	}

	fn check_binary(&mut self, function: &Function, expr: ExprId, op: BinOp, lhs: ExprId, rhs: ExprId) -> IrType {
		if op.is_logical() {
			self.check_expr(function, lhs, Some(IrType::Bool));
			self.check_expr(function, rhs, Some(IrType::Bool));
			return IrType::Bool;
		}
		let lhs_ty = self.check_expr(function, lhs, None);
		self.check_expr(function, rhs, Some(lhs_ty));
		if !(lhs_ty.is_primitive_int() || lhs_ty.is_primitive_float() || lhs_ty == IrType::Bool) {
			self.error(expr.0, "TY002", format!("primitive operator over {:?}", lhs_ty));
		}
		if op.is_comparison() {
			IrType::Bool
		} else {
			lhs_ty
		}
	}

	fn check_call(&mut self, function: &Function, expr: ExprId, builtin: Builtin, args: &[ExprId]) -> IrType {
		if builtin == Builtin::CallFn {
			return self.check_call_fn(function, expr, args);
		}
		let (params, ret) = signature(builtin);
		if args.len() != params.len() {
			self.error(
				expr.0,
				"TY003",
				format!("{:?} takes {} argument(s), got {}", builtin, params.len(), args.len()),
			);
			return match ret {
				Ret::T(ty) => ty,
				_ => IrType::Nil,
			};
		}
		let mut arg0_ty = IrType::Nil;
		for (i, (arg, param)) in args.iter().zip(&params).enumerate() {
			let ty = self.check_param(function, builtin, *arg, *param, arg0_ty);
			if i == 0 {
				arg0_ty = ty;
			}
		}
		match ret {
			Ret::T(ty) => ty,
			Ret::Same0 => arg0_ty,
			Ret::AggResult => self.agg_result_type(expr, args),
		}
	}

	fn agg_result_type(&mut self, expr: ExprId, args: &[ExprId]) -> IrType {
		let kind = args
			.first()
			.and_then(|a| match self.arena.exprs[a.index()] {
				ExprKind::IntLit(v) => AggKind::from_ordinal(v as u8),
				_ => None,
			});
		match kind {
			Some(kind) => kind.result_type(),
			None => {
				self.error(expr.0, "TY004", "aggregator kind must be a literal ordinal".into());
				IrType::SqlInt
			}
		}
	}

	fn check_param(
		&mut self,
		function: &Function,
		builtin: Builtin,
		arg: ExprId,
		param: Param,
		arg0_ty: IrType,
	) -> IrType {
		let kind = self.arena.exprs[arg.index()].clone();
		match param {
			Param::IntImm => {
				if !matches!(kind, ExprKind::IntLit(_)) {
					self.error(arg.0, "TY005", format!("{:?} needs an integer immediate", builtin));
				}
				self.types[arg.index()] = Some(IrType::Int64);
				IrType::Int64
			}
			Param::FloatImm => {
				if !matches!(kind, ExprKind::FloatLit(_)) {
					self.error(arg.0, "TY005", format!("{:?} needs a float immediate", builtin));
				}
				self.types[arg.index()] = Some(IrType::Float64);
				IrType::Float64
			}
			Param::StrImm => {
				if !matches!(kind, ExprKind::StrLit(_)) {
					self.error(arg.0, "TY005", format!("{:?} needs a string immediate", builtin));
				}
				IrType::SqlString
			}
			Param::ListImm => {
				if !matches!(kind, ExprKind::U32ListLit(_)) {
					self.error(arg.0, "TY005", format!("{:?} needs a column-list immediate", builtin));
				}
				IrType::Nil
			}
			Param::FnImm => {
				if !matches!(kind, ExprKind::FuncLit(_)) {
					self.error(arg.0, "TY005", format!("{:?} needs a function reference", builtin));
				}
				IrType::Nil
			}
			Param::Lval(ty) => {
				match kind {
					ExprKind::Local(local) => {
						let local_ty = function.locals[local.index()].ty;
						if local_ty != ty {
							self.error(
								arg.0,
								"TY006",
								format!("{:?} writes a {:?}, local holds {:?}", builtin, ty, local_ty),
							);
						}
					}
					_ => {
						self.error(arg.0, "TY006", format!("{:?} needs a local to write into", builtin));
					}
				}
				self.types[arg.index()] = Some(ty);
				ty
			}
			Param::T(ty) => self.check_expr(function, arg, Some(ty)),
			Param::AnySql => {
				let ty = self.check_expr(function, arg, None);
				if !ty.is_sql() {
					self.error(arg.0, "TY007", format!("{:?} expects a SQL value, found {:?}", builtin, ty));
				}
				ty
			}
			Param::SqlNum => {
				let ty = self.check_expr(function, arg, None);
				if !matches!(ty, IrType::SqlInt | IrType::SqlReal) {
					self.error(arg.0, "TY008", format!("{:?} expects a numeric SQL value, found {:?}", builtin, ty));
				}
				ty
			}
			Param::SqlCmp => {
				let ty = self.check_expr(function, arg, None);
				if !ty.is_sql() {
					self.error(arg.0, "TY008", format!("{:?} expects a comparable SQL value, found {:?}", builtin, ty));
				}
				ty
			}
			Param::Same0 => self.check_expr(function, arg, Some(arg0_ty)),
		}
	}

	fn check_call_fn(&mut self, function: &Function, expr: ExprId, args: &[ExprId]) -> IrType {
		let Some((target, rest)) = args.split_first() else {
			self.error(expr.0, "TY030", "call without a target function".into());
			return IrType::Nil;
		};
		let callee = match self.arena.exprs[target.index()] {
			ExprKind::FuncLit(fid) => fid,
			_ => {
				self.error(target.0, "TY030", "call target must be a function reference".into());
				return IrType::Nil;
			}
		};
		let callee_fn = self.arena.function(callee);
		if callee_fn.params.len() != rest.len() {
			self.error(
				expr.0,
				"TY031",
				format!(
					"`{}` takes {} argument(s), got {}",
					callee_fn.name,
					callee_fn.params.len(),
					rest.len()
				),
			);
			return IrType::Nil;
		}
		let param_types: Vec<IrType> =
			callee_fn.params.iter().map(|p| callee_fn.locals[p.index()].ty).collect();
		for (arg, ty) in rest.iter().zip(param_types) {
			self.check_expr(function, *arg, Some(ty));
		}
		IrType::Nil
	}
}
