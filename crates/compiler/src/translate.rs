// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Scalar expression lowering: plan expressions over in-flight rows into
//! IR values.

use quarry_core::{SqlType, Value};

use crate::context::RowValues;
use crate::error::{CompileError, Result};
use crate::expr::{ArithOp, CmpOp, ConjOp, Expr, ScalarFunc};
use crate::ir::{BinOp, Builtin, ExprId, FunctionBuilder, IrType};

/// The IR value type a SQL type evaluates to. Integer widths collapse to
/// one runtime integer, float widths to one runtime real.
pub fn sql_value_type(ty: SqlType) -> IrType {
	match ty {
		SqlType::Bool => IrType::SqlBool,
		SqlType::SmallInt | SqlType::Int | SqlType::BigInt => IrType::SqlInt,
		SqlType::Real | SqlType::Double => IrType::SqlReal,
		SqlType::Date => IrType::SqlDate,
		SqlType::Varchar => IrType::SqlString,
	}
}

/// The IR type an expression evaluates to.
pub fn expr_value_type(expr: &Expr) -> IrType {
	sql_value_type(expr.result_type())
}

fn arith_builtin(op: ArithOp) -> Builtin {
	match op {
		ArithOp::Add => Builtin::SqlAdd,
		ArithOp::Sub => Builtin::SqlSub,
		ArithOp::Mul => Builtin::SqlMul,
		ArithOp::Div => Builtin::SqlDiv,
		ArithOp::Rem => Builtin::SqlRem,
	}
}

fn cmp_builtin(op: CmpOp) -> Builtin {
	match op {
		CmpOp::Lt => Builtin::SqlCmpLt,
		CmpOp::Le => Builtin::SqlCmpLe,
		CmpOp::Gt => Builtin::SqlCmpGt,
		CmpOp::Ge => Builtin::SqlCmpGe,
		CmpOp::Eq => Builtin::SqlCmpEq,
		CmpOp::Ne => Builtin::SqlCmpNe,
	}
}

/// Lower a constant to a SQL value expression.
pub fn value_to_sql(b: &mut FunctionBuilder<'_>, value: &Value) -> Result<ExprId> {
	Ok(match value {
		Value::Null => {
			let args = Vec::new();
			b.call(Builtin::InitSqlIntNull, args)
		}
		Value::Bool(v) => {
			let lit = b.int_lit(*v as i64);
			b.call(Builtin::InitSqlBool, vec![lit])
		}
		Value::SmallInt(v) => {
			let lit = b.int_lit(*v as i64);
			b.call(Builtin::InitSqlInt, vec![lit])
		}
		Value::Int(v) => {
			let lit = b.int_lit(*v as i64);
			b.call(Builtin::InitSqlInt, vec![lit])
		}
		Value::BigInt(v) => {
			let lit = b.int_lit(*v);
			b.call(Builtin::InitSqlInt, vec![lit])
		}
		Value::Real(v) => {
			let lit = b.float_lit(*v as f64);
			b.call(Builtin::InitSqlReal, vec![lit])
		}
		Value::Double(v) => {
			let lit = b.float_lit(*v);
			b.call(Builtin::InitSqlReal, vec![lit])
		}
		Value::Date(v) => {
			let lit = b.int_lit(*v as i64);
			b.call(Builtin::InitSqlDate, vec![lit])
		}
		Value::Varchar(s) => {
			let lit = b.str_lit(s.clone());
			b.call(Builtin::InitSqlString, vec![lit])
		}
	})
}

/// Insert an int-to-real conversion when one side of a numeric operator
/// is real and the other integral.
fn promote(
	b: &mut FunctionBuilder<'_>,
	left: (ExprId, IrType),
	right: (ExprId, IrType),
) -> Result<(ExprId, ExprId, IrType)> {
	match (left.1, right.1) {
		(l, r) if l == r => Ok((left.0, right.0, l)),
		(IrType::SqlInt, IrType::SqlReal) => {
			let l = b.call(Builtin::SqlIntToReal, vec![left.0]);
			Ok((l, right.0, IrType::SqlReal))
		}
		(IrType::SqlReal, IrType::SqlInt) => {
			let r = b.call(Builtin::SqlIntToReal, vec![right.0]);
			Ok((left.0, r, IrType::SqlReal))
		}
		(l, r) => Err(CompileError::Internal(format!("no promotion between {:?} and {:?}", l, r))),
	}
}

/// Lower an expression in value position. Returns the IR expression and
/// its value type.
pub fn translate_expr(
	b: &mut FunctionBuilder<'_>,
	expr: &Expr,
	inputs: &[&RowValues],
) -> Result<(ExprId, IrType)> {
	match expr {
		Expr::ColumnRef { input, ordinal, ty } => {
			let row = inputs.get(*input).ok_or_else(|| {
				CompileError::Internal(format!("column ref to missing input {}", input))
			})?;
			let col = row.cols.get(*ordinal).copied().ok_or_else(|| {
				CompileError::Internal(format!("column ref to missing ordinal {}", ordinal))
			})?;
			Ok((col, sql_value_type(*ty)))
		}
		Expr::Constant(value) => {
			let id = value_to_sql(b, value)?;
			let ty = value
				.sql_type()
				.map(sql_value_type)
				.unwrap_or(IrType::SqlInt);
			Ok((id, ty))
		}
		Expr::Arithmetic { op, left, right } => {
			let l = translate_expr(b, left, inputs)?;
			let r = translate_expr(b, right, inputs)?;
			let (l, r, ty) = promote(b, l, r)?;
			Ok((b.call(arith_builtin(*op), vec![l, r]), ty))
		}
		Expr::Comparison { op, left, right } => {
			let l = translate_expr(b, left, inputs)?;
			let r = translate_expr(b, right, inputs)?;
			let (l, r, _) = promote(b, l, r)?;
			Ok((b.call(cmp_builtin(*op), vec![l, r]), IrType::SqlBool))
		}
		Expr::Conjunction { .. } => {
			let cond = translate_predicate(b, expr, inputs)?;
			Ok((b.call(Builtin::BoolToSql, vec![cond]), IrType::SqlBool))
		}
		Expr::AggCall { .. } => {
			Err(CompileError::Internal("aggregate call outside aggregation".into()))
		}
		Expr::Function { func, args } => translate_function(b, *func, args, inputs),
	}
}

/// Lower an expression in predicate position to a primitive bool; a null
/// result filters the row out.
pub fn translate_predicate(b: &mut FunctionBuilder<'_>, expr: &Expr, inputs: &[&RowValues]) -> Result<ExprId> {
	match expr {
		Expr::Conjunction { op, terms } => {
			let bin = match op {
				ConjOp::And => BinOp::And,
				ConjOp::Or => BinOp::Or,
			};
			let mut acc: Option<ExprId> = None;
			for term in terms {
				let cond = translate_predicate(b, term, inputs)?;
				acc = Some(match acc {
					Some(prev) => b.binary(bin, prev, cond),
					None => cond,
				});
			}
			acc.ok_or_else(|| CompileError::Internal("empty conjunction".into()))
		}
		_ => {
			let (value, _) = translate_expr(b, expr, inputs)?;
			Ok(b.call(Builtin::ForceTruth, vec![value]))
		}
	}
}

fn translate_function(
	b: &mut FunctionBuilder<'_>,
	func: ScalarFunc,
	args: &[Expr],
	inputs: &[&RowValues],
) -> Result<(ExprId, IrType)> {
	let mut lowered = Vec::with_capacity(args.len());
	for arg in args {
		lowered.push(translate_expr(b, arg, inputs)?);
	}
	let one = |lowered: &Vec<(ExprId, IrType)>| -> Result<(ExprId, IrType)> {
		lowered
			.first()
			.copied()
			.ok_or_else(|| CompileError::Internal("scalar function missing argument".into()))
	};
	let as_real = |b: &mut FunctionBuilder<'_>, (id, ty): (ExprId, IrType)| -> ExprId {
		if ty == IrType::SqlInt {
			b.call(Builtin::SqlIntToReal, vec![id])
		} else {
			id
		}
	};
	Ok(match func {
		ScalarFunc::Abs => {
			let (id, ty) = one(&lowered)?;
			(b.call(Builtin::SqlAbs, vec![id]), ty)
		}
		ScalarFunc::Sqrt
		| ScalarFunc::Exp
		| ScalarFunc::Ln
		| ScalarFunc::Floor
		| ScalarFunc::Ceil
		| ScalarFunc::Sin
		| ScalarFunc::Cos
		| ScalarFunc::Tan => {
			let arg = one(&lowered)?;
			let arg = as_real(b, arg);
			let builtin = match func {
				ScalarFunc::Sqrt => Builtin::SqlSqrt,
				ScalarFunc::Exp => Builtin::SqlExp,
				ScalarFunc::Ln => Builtin::SqlLn,
				ScalarFunc::Floor => Builtin::SqlFloor,
				ScalarFunc::Sin => Builtin::SqlSin,
				ScalarFunc::Cos => Builtin::SqlCos,
				ScalarFunc::Tan => Builtin::SqlTan,
				_ => Builtin::SqlCeil,
			};
			(b.call(builtin, vec![arg]), IrType::SqlReal)
		}
		ScalarFunc::Lower | ScalarFunc::Upper => {
			let (id, _) = one(&lowered)?;
			let builtin = if func == ScalarFunc::Lower { Builtin::SqlLower } else { Builtin::SqlUpper };
			(b.call(builtin, vec![id]), IrType::SqlString)
		}
		ScalarFunc::Length => {
			let (id, _) = one(&lowered)?;
			(b.call(Builtin::SqlLength, vec![id]), IrType::SqlInt)
		}
	})
}
