// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Execution context: everything a running query touches outside its own
//! state buffer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use quarry_core::{EngineConfig, IndexOid, TableOid, Value};
use quarry_index::OrderedIndex;
use quarry_storage::{SqlTable, TransactionContext};

/// The catalog surface the runtime resolves oids through. Implemented by
/// the embedding system; tests ship a simple in-memory accessor.
pub trait CatalogAccessor: Send + Sync {
	fn table(&self, oid: TableOid) -> Option<Arc<SqlTable>>;
	fn table_oid(&self, name: &str) -> Option<TableOid>;
	fn index(&self, oid: IndexOid) -> Option<Arc<OrderedIndex>>;
}

/// Output rows are delivered in batches through this callback.
pub type OutputCallback<'a> = Box<dyn FnMut(&[Vec<Value>]) + 'a>;

pub struct OutputBuffer<'a> {
	callback: OutputCallback<'a>,
	batch: Vec<Vec<Value>>,
	batch_size: usize,
}

impl<'a> OutputBuffer<'a> {
	pub fn new(callback: OutputCallback<'a>, batch_size: usize) -> Self {
		Self { callback, batch: Vec::new(), batch_size }
	}

	pub fn push(&mut self, row: Vec<Value>) {
		self.batch.push(row);
		if self.batch.len() >= self.batch_size {
			self.flush();
		}
	}

	pub fn flush(&mut self) {
		if !self.batch.is_empty() {
			(self.callback)(&self.batch);
			self.batch.clear();
		}
	}
}

pub struct ExecutionContext<'a> {
	pub catalog: &'a dyn CatalogAccessor,
	pub txn: &'a TransactionContext,
	pub config: EngineConfig,
	output: OutputBuffer<'a>,
	output_arity: usize,
	cancel: Arc<AtomicBool>,
	aborted: bool,
}

impl<'a> ExecutionContext<'a> {
	pub fn new(
		catalog: &'a dyn CatalogAccessor,
		txn: &'a TransactionContext,
		config: EngineConfig,
		callback: OutputCallback<'a>,
	) -> Self {
		let batch_size = config.batch_size;
		Self {
			catalog,
			txn,
			config,
			output: OutputBuffer::new(callback, batch_size),
			output_arity: 0,
			cancel: Arc::new(AtomicBool::new(false)),
			aborted: false,
		}
	}

	/// Width of output rows; set from the plan's output schema before a
	/// query runs.
	pub fn set_output_arity(&mut self, arity: usize) {
		self.output_arity = arity;
	}

	pub fn output_arity(&self) -> usize {
		self.output_arity
	}

	/// Handle that cancels the query from another thread; checked at
	/// iterator-refill boundaries.
	pub fn cancel_flag(&self) -> Arc<AtomicBool> {
		self.cancel.clone()
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancel.load(Ordering::Acquire)
	}

	/// Set when generated code hit a conflict and aborted the
	/// transaction; the caller must roll the transaction back.
	pub fn is_aborted(&self) -> bool {
		self.aborted
	}

	pub fn mark_aborted(&mut self) {
		self.aborted = true;
	}

	pub fn output(&mut self) -> &mut OutputBuffer<'a> {
		&mut self.output
	}
}

/// In-memory catalog for embedding and tests.
#[derive(Default)]
pub struct MemoryCatalog {
	tables: Vec<Arc<SqlTable>>,
	indexes: Vec<Arc<OrderedIndex>>,
}

impl MemoryCatalog {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register_table(&mut self, table: Arc<SqlTable>) {
		self.tables.push(table);
	}

	pub fn register_index(&mut self, index: Arc<OrderedIndex>) {
		self.indexes.push(index);
	}
}

impl CatalogAccessor for MemoryCatalog {
	fn table(&self, oid: TableOid) -> Option<Arc<SqlTable>> {
		self.tables.iter().find(|t| t.oid() == oid).cloned()
	}

	fn table_oid(&self, name: &str) -> Option<TableOid> {
		self.tables.iter().find(|t| t.name() == name).map(|t| t.oid())
	}

	fn index(&self, oid: IndexOid) -> Option<Arc<OrderedIndex>> {
		self.indexes.iter().find(|i| i.oid() == oid).cloned()
	}
}
