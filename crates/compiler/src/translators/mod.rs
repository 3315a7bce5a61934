// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Operator translators: one module per operator family, plus small
//! emission helpers they all share.

pub use aggregate::{AggBuildTranslator, AggScanTranslator};
pub use dml::{DeleteTranslator, InsertTranslator, UpdateTranslator};
pub use hash_join::{JoinBuildTranslator, JoinProbeTranslator};
pub use index_ops::{IndexJoinTranslator, IndexScanTranslator};
pub use nested_loop::NestLoopTranslator;
pub use passthrough::{LimitTranslator, OutputTranslator, ProjectionTranslator};
pub use scan::SeqScanTranslator;
pub use sort::{SortBuildTranslator, SortScanTranslator};

mod aggregate;
mod dml;
mod hash_join;
mod index_ops;
mod nested_loop;
mod passthrough;
mod scan;
mod sort;

use quarry_core::SqlType;

use crate::error::{CompileError, Result};
use crate::ir::{Builtin, ExprId, FunctionBuilder, IrType};

/// PCI accessor for a storage column type.
pub(crate) fn pci_get_builtin(ty: SqlType) -> Builtin {
	match ty {
		SqlType::Bool => Builtin::PciGetBool,
		SqlType::SmallInt | SqlType::Int | SqlType::BigInt => Builtin::PciGetInt,
		SqlType::Real | SqlType::Double => Builtin::PciGetReal,
		SqlType::Date => Builtin::PciGetDate,
		SqlType::Varchar => Builtin::PciGetString,
	}
}

/// Index-iterator accessor for a storage column type.
pub(crate) fn index_get_builtin(ty: SqlType) -> Builtin {
	match ty {
		SqlType::Bool => Builtin::IndexIterGetBool,
		SqlType::SmallInt | SqlType::Int | SqlType::BigInt => Builtin::IndexIterGetInt,
		SqlType::Real | SqlType::Double => Builtin::IndexIterGetReal,
		SqlType::Date => Builtin::IndexIterGetDate,
		SqlType::Varchar => Builtin::IndexIterGetString,
	}
}

/// Row-arena read for an IR value type.
pub(crate) fn row_read_builtin(ty: IrType) -> Result<Builtin> {
	Ok(match ty {
		IrType::SqlBool => Builtin::RowReadBool,
		IrType::SqlInt => Builtin::RowReadInt,
		IrType::SqlReal => Builtin::RowReadReal,
		IrType::SqlDate => Builtin::RowReadDate,
		IrType::SqlString => Builtin::RowReadString,
		other => {
			return Err(CompileError::Internal(format!("row read of non-sql type {:?}", other)));
		}
	})
}

/// Advance a row pointer by a byte offset; zero offsets pass through.
pub(crate) fn ptr_offset(b: &mut FunctionBuilder<'_>, ptr: ExprId, offset: u32) -> ExprId {
	if offset == 0 {
		return ptr;
	}
	let off = b.int_lit(offset as i64);
	b.call(Builtin::PtrOffset, vec![ptr, off])
}

/// Hash a list of bound SQL values into one 64-bit hash local.
pub(crate) fn emit_hash(b: &mut FunctionBuilder<'_>, values: &[ExprId]) -> Result<ExprId> {
	let mut iter = values.iter();
	let first = iter
		.next()
		.ok_or_else(|| CompileError::Internal("hash of empty key".into()))?;
	let mut hash = b.call(Builtin::HashVal, vec![*first]);
	for value in iter {
		let next = b.call(Builtin::HashVal, vec![*value]);
		hash = b.call(Builtin::HashCombine, vec![hash, next]);
	}
	let name = format!("hash_{}", b.arena().exprs.len());
	let local = b.declare_assign(name, IrType::UInt64, hash);
	Ok(b.local_expr(local))
}
