// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Table vector iterator and the projected-columns iterator over its
//! refill buffer.

use std::sync::Arc;

use quarry_storage::{ProjectedColumns, SlotIterator, SqlTable};

/// Drives block-ordered scans, refilling a PCI batch at a time. The
/// optional end block bounds a partition of a partitioned scan.
pub struct TableVectorIterator {
	pub table: Arc<SqlTable>,
	pub iter: SlotIterator,
	pub end_block: Option<usize>,
	/// Handle of the PCI object owning the refill buffer.
	pub pci: u64,
}

/// Per-tuple cursor over one projected-columns batch, with an optional
/// selection built by the filter manager.
pub struct ProjectedColumnsIterator {
	pub buffer: ProjectedColumns,
	pos: usize,
	matches: Vec<bool>,
	selection: Option<Vec<u32>>,
	fpos: usize,
}

impl ProjectedColumnsIterator {
	pub fn new(buffer: ProjectedColumns) -> Self {
		Self { buffer, pos: 0, matches: Vec::new(), selection: None, fpos: 0 }
	}

	/// Called after each refill: fresh batch, no filter applied yet.
	pub fn on_refill(&mut self) {
		self.pos = 0;
		self.fpos = 0;
		self.matches.clear();
		self.selection = None;
	}

	/// The row the cursor currently points at, filtered-aware.
	pub fn current(&self) -> Option<usize> {
		match &self.selection {
			Some(selection) => selection.get(self.fpos).map(|r| *r as usize),
			None => (self.pos < self.buffer.num_tuples()).then_some(self.pos),
		}
	}

	pub fn has_next(&self) -> bool {
		self.pos < self.buffer.num_tuples()
	}

	pub fn advance(&mut self) {
		self.pos += 1;
	}

	pub fn has_next_filtered(&self) -> bool {
		match &self.selection {
			Some(selection) => self.fpos < selection.len(),
			None => self.pos < self.buffer.num_tuples(),
		}
	}

	pub fn advance_filtered(&mut self) {
		match self.selection {
			Some(_) => self.fpos += 1,
			None => self.pos += 1,
		}
	}

	pub fn reset(&mut self) {
		self.pos = 0;
	}

	pub fn reset_filtered(&mut self) {
		self.fpos = 0;
	}

	/// Record the match bit for the current (unfiltered) tuple; bits from
	/// separate filter clauses accumulate disjunctively.
	pub fn match_tuple(&mut self, matched: bool) {
		if self.matches.len() < self.buffer.num_tuples() {
			self.matches.resize(self.buffer.num_tuples(), false);
		}
		if let Some(row) = (self.pos < self.buffer.num_tuples()).then_some(self.pos) {
			self.matches[row] = self.matches[row] || matched;
		}
	}

	/// Freeze the accumulated match bits into the selection vector.
	pub fn finish_filter(&mut self) {
		let selection = self
			.matches
			.iter()
			.enumerate()
			.filter(|(_, m)| **m)
			.map(|(i, _)| i as u32)
			.collect();
		self.selection = Some(selection);
		self.fpos = 0;
	}
}
