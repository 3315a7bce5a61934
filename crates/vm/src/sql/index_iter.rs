// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Index iterator: runs key and range scans against an ordered index and
//! materializes matching table rows version-checked against the reading
//! transaction.

use std::sync::Arc;

use quarry_core::{ColumnOid, SqlType};
use quarry_index::OrderedIndex;
use quarry_storage::{ProjectedRow, SqlTable, TransactionContext, TupleSlot};

use crate::error::Result;

pub struct IndexIterator {
	pub index: Arc<OrderedIndex>,
	pub table: Arc<SqlTable>,
	pub columns: Vec<(ColumnOid, SqlType)>,
	results: Vec<TupleSlot>,
	pos: usize,
	current: Option<ProjectedRow>,
	current_slot: Option<TupleSlot>,
}

impl IndexIterator {
	pub fn new(index: Arc<OrderedIndex>, table: Arc<SqlTable>, columns: Vec<(ColumnOid, SqlType)>) -> Self {
		Self { index, table, columns, results: Vec::new(), pos: 0, current: None, current_slot: None }
	}

	pub fn set_results(&mut self, results: Vec<TupleSlot>) {
		self.results = results;
		self.pos = 0;
		self.current = None;
		self.current_slot = None;
	}

	/// Move to the next slot whose row is visible to the transaction.
	/// Index results were already filtered by the scan's snapshot; the
	/// re-check here guards against slots whose table row has since been
	/// superseded for this transaction.
	pub fn advance(&mut self, txn: &TransactionContext) -> Result<bool> {
		while self.pos < self.results.len() {
			let slot = self.results[self.pos];
			self.pos += 1;
			let mut row = ProjectedRow::new(self.columns.iter().map(|(oid, _)| *oid).collect());
			if self.table.select(txn, slot, &mut row)? {
				self.current = Some(row);
				self.current_slot = Some(slot);
				return Ok(true);
			}
		}
		self.current = None;
		self.current_slot = None;
		Ok(false)
	}

	pub fn current(&self) -> Option<&ProjectedRow> {
		self.current.as_ref()
	}

	pub fn current_slot(&self) -> Option<TupleSlot> {
		self.current_slot
	}
}
