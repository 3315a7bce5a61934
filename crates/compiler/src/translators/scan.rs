// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Sequential scan translator.
//!
//! Emits the canonical driving loop: open a table vector iterator,
//! refill the projected-columns buffer, run the filter manager over the
//! batch, then walk the matching tuples, materialize referenced columns
//! into SQL locals and hand the row to the parent.

use quarry_core::TableOid;

use crate::context::{CompilationContext, OperatorTranslator, RowValues};
use crate::error::Result;
use crate::expr::Expr;
use crate::ir::{Builtin, FuncId, FunctionBuilder, IrArena, IrType, UnOp};
use crate::plan::{OutputSchema, ScanColumn};
use crate::translate::{expr_value_type, sql_value_type, translate_expr, translate_predicate};
use crate::translators::pci_get_builtin;

pub struct SeqScanTranslator {
	idx: usize,
	table: TableOid,
	columns: Vec<ScanColumn>,
	predicate: Option<Expr>,
	schema: OutputSchema,
	/// Whether the consumer needs tuple slots (updates and deletes do).
	expose_slot: bool,
	flavor_fn: Option<FuncId>,
}

impl SeqScanTranslator {
	pub fn new(
		idx: usize,
		table: TableOid,
		columns: Vec<ScanColumn>,
		predicate: Option<Expr>,
		schema: OutputSchema,
		expose_slot: bool,
	) -> Self {
		Self { idx, table, columns, predicate, schema, expose_slot, flavor_fn: None }
	}

	fn column_oids(&self) -> Vec<u32> {
		self.columns.iter().map(|c| c.oid.0).collect()
	}

	/// Materialize every scan column at the current PCI position.
	fn materialize(&self, b: &mut FunctionBuilder<'_>, pci: crate::ir::ExprId) -> RowValues {
		let mut cols = Vec::with_capacity(self.columns.len());
		for (ordinal, column) in self.columns.iter().enumerate() {
			let ord = b.int_lit(ordinal as i64);
			let get = b.call(pci_get_builtin(column.ty), vec![pci, ord]);
			let name = format!("scan_col{}_{}", ordinal, b.arena().exprs.len());
			let local = b.declare_assign(name, sql_value_type(column.ty), get);
			cols.push(b.local_expr(local));
		}
		if self.expose_slot {
			let slot_call = b.call(Builtin::PciGetSlot, vec![pci]);
			let name = format!("scan_slot_{}", b.arena().exprs.len());
			let local = b.declare_assign(name, IrType::UInt64, slot_call);
			let slot = b.local_expr(local);
			RowValues::with_slot(cols, slot)
		} else {
			RowValues::new(cols)
		}
	}
}

impl OperatorTranslator for SeqScanTranslator {
	fn name(&self) -> &'static str {
		"seq_scan"
	}

	/// Build the filter flavor function when a predicate exists: it walks
	/// the unfiltered batch and records a match bit per tuple.
	fn prepare(&mut self, _ctx: &mut CompilationContext, arena: &mut IrArena) -> Result<()> {
		let Some(predicate) = self.predicate.clone() else {
			return Ok(());
		};
		let fid = arena.declare_function(format!("seq_scan_filter_{}", self.idx), IrType::Nil);
		let mut b = FunctionBuilder::new(arena, fid);
		let pci_param = b.add_param("pci", IrType::Pci);
		let pci = b.local_expr(pci_param);
		b.emit_loop(|b| {
			let has_next = b.call(Builtin::PciHasNext, vec![pci]);
			let done = b.unary(UnOp::Not, has_next);
			b.emit_if(done, |b| b.brk());
			let row = self.materialize(b, pci);
			let cond = translate_predicate(b, &predicate, &[&row])?;
			b.emit_call(Builtin::PciMatch, vec![pci, cond]);
			b.emit_call(Builtin::PciAdvance, vec![pci]);
			Ok(())
		})?;
		b.emit_call(Builtin::PciReset, vec![pci]);
		b.ret(None);
		b.finish();
		self.flavor_fn = Some(fid);
		Ok(())
	}

	fn produce(&self, ctx: &mut CompilationContext, b: &mut FunctionBuilder<'_>) -> Result<()> {
		let exec = b.local_expr(ctx.exec_param);

		// Filter manager set up ahead of the loop when filtering.
		let fm = if let Some(fid) = self.flavor_fn {
			let fm_local = b.add_local(format!("fm_{}", self.idx), IrType::FilterManager);
			let fm = b.local_expr(fm_local);
			b.emit_call(Builtin::FmInit, vec![fm]);
			b.emit_call(Builtin::FmStartNewClause, vec![fm]);
			let flavor = b.func_lit(fid);
			b.emit_call(Builtin::FmInsertFlavor, vec![fm, flavor]);
			b.emit_call(Builtin::FmFinalize, vec![fm]);
			Some(fm)
		} else {
			None
		};

		let tvi_local = b.add_local(format!("tvi_{}", self.idx), IrType::Tvi);
		let tvi = b.local_expr(tvi_local);
		let table = b.int_lit(self.table.0 as i64);
		let cols = b.u32_list_lit(self.column_oids());
		b.emit_call(Builtin::TviInit, vec![tvi, exec, table, cols]);

		b.emit_loop(|b| {
			let next = b.call(Builtin::TviNext, vec![tvi]);
			let done = b.unary(UnOp::Not, next);
			b.emit_if(done, |b| b.brk());

			let pci_call = b.call(Builtin::TviGetPci, vec![tvi]);
			let name = format!("pci_{}_{}", self.idx, b.arena().exprs.len());
			let pci_local = b.declare_assign(name, IrType::Pci, pci_call);
			let pci = b.local_expr(pci_local);

			if let Some(fm) = fm {
				b.emit_call(Builtin::FmRunFilters, vec![fm, pci]);
			}

			b.emit_loop(|b| {
				let has = b.call(Builtin::PciHasNextFiltered, vec![pci]);
				let done = b.unary(UnOp::Not, has);
				b.emit_if(done, |b| b.brk());

				let scan_row = self.materialize(b, pci);

				// Evaluate the scan's output schema over the columns.
				let mut out = Vec::with_capacity(self.schema.arity());
				for column in &self.schema.columns {
					let (value, _) = translate_expr(b, &column.expr, &[&scan_row])?;
					let ty = expr_value_type(&column.expr);
					let name = format!("scan_out_{}", b.arena().exprs.len());
					let local = b.declare_assign(name, ty, value);
					out.push(b.local_expr(local));
				}
				let out_row = RowValues { cols: out, slot: scan_row.slot };
				ctx.consume_parent(b, self.idx, &out_row)?;

				b.emit_call(Builtin::PciAdvanceFiltered, vec![pci]);
				Ok(())
			})?;
			Ok(())
		})?;

		b.emit_call(Builtin::TviClose, vec![tvi]);
		if let Some(fm) = fm {
			b.emit_call(Builtin::FmFree, vec![fm]);
		}
		Ok(())
	}
}
