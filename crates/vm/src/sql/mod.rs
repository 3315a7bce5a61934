// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Operator runtime primitives: the objects bytecode handles refer to.

pub use agg::{
	aggregator_advance, aggregator_init, aggregator_merge, aggregator_result, AggSlot,
	AggregationHashTable,
};
pub use arena::RowArena;
pub use filter::FilterManager;
pub use index_iter::IndexIterator;
pub use join::JoinHashTable;
pub use sorter::Sorter;
pub use thread_state::ThreadStateContainer;
pub use tvi::{ProjectedColumnsIterator, TableVectorIterator};
pub use value::{SqlTag, SqlVal, VarlenPool, SQL_VAL_SIZE};

mod agg;
mod arena;
mod filter;
mod index_iter;
mod join;
mod sorter;
mod thread_state;
mod tvi;
mod value;

/// Cursor over a snapshot of tuple rows; shared by the aggregation,
/// join, and sorter iterators.
pub struct RowsIter {
	pub rows: Vec<u32>,
	pub pos: usize,
}

impl RowsIter {
	pub fn new(rows: Vec<u32>) -> Self {
		Self { rows, pos: 0 }
	}

	pub fn has_next(&self) -> bool {
		self.pos < self.rows.len()
	}

	pub fn current(&self) -> Option<u32> {
		self.rows.get(self.pos).copied()
	}

	pub fn advance(&mut self) {
		self.pos += 1;
	}
}

/// Every runtime object a handle can address.
pub enum RuntimeObject {
	Tvi(TableVectorIterator),
	Pci(ProjectedColumnsIterator),
	Filter(FilterManager),
	AggHt(AggregationHashTable),
	AggHtIter(RowsIter),
	Jht(JoinHashTable),
	JhtIter(RowsIter),
	Sorter(Sorter),
	SorterIter(RowsIter),
	IndexIter(IndexIterator),
	Tsc(ThreadStateContainer),
}

impl RuntimeObject {
	pub fn kind(&self) -> &'static str {
		match self {
			RuntimeObject::Tvi(_) => "table vector iterator",
			RuntimeObject::Pci(_) => "projected columns iterator",
			RuntimeObject::Filter(_) => "filter manager",
			RuntimeObject::AggHt(_) => "aggregation hash table",
			RuntimeObject::AggHtIter(_) => "aggregation iterator",
			RuntimeObject::Jht(_) => "join hash table",
			RuntimeObject::JhtIter(_) => "join iterator",
			RuntimeObject::Sorter(_) => "sorter",
			RuntimeObject::SorterIter(_) => "sorter iterator",
			RuntimeObject::IndexIter(_) => "index iterator",
			RuntimeObject::Tsc(_) => "thread state container",
		}
	}
}
