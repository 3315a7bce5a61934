// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Per-transaction context: snapshot timestamps plus undo and redo chains.

use std::sync::Arc;

use parking_lot::Mutex;
use quarry_core::TableOid;

use crate::mvcc::{Timestamp, TxnState, TxnStatus, UndoRecord};
use crate::slot::TupleSlot;
use crate::table::SqlTable;

/// One registered undo record, together with the table whose chain it was
/// installed into. Abort walks these in reverse, the garbage collector
/// unlinks them once the transaction falls below the watermark.
pub struct UndoEntry {
	pub table: Arc<SqlTable>,
	pub record: Arc<UndoRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedoOp {
	Insert,
	Update,
	Delete,
}

/// After-image log entry. The wire format of a write-ahead log is outside
/// this crate; the chain records what a log writer would consume.
#[derive(Debug, Clone, Copy)]
pub struct RedoEntry {
	pub table: TableOid,
	pub slot: TupleSlot,
	pub op: RedoOp,
}

pub struct TransactionContext {
	status: Arc<TxnStatus>,
	undo: Mutex<Vec<UndoEntry>>,
	redo: Mutex<Vec<RedoEntry>>,
}

impl TransactionContext {
	pub(crate) fn new(status: Arc<TxnStatus>) -> Self {
		Self { status, undo: Mutex::new(Vec::new()), redo: Mutex::new(Vec::new()) }
	}

	pub fn txn_id(&self) -> Timestamp {
		self.status.txn_id()
	}

	pub fn start_ts(&self) -> Timestamp {
		self.status.start_ts()
	}

	/// Commit timestamp, zero while the transaction is in flight.
	pub fn commit_ts(&self) -> Timestamp {
		self.status.commit_ts()
	}

	pub fn state(&self) -> TxnState {
		self.status.state()
	}

	pub fn status(&self) -> &Arc<TxnStatus> {
		&self.status
	}

	pub fn record_undo(&self, table: Arc<SqlTable>, record: Arc<UndoRecord>) {
		self.undo.lock().push(UndoEntry { table, record });
	}

	pub fn record_redo(&self, entry: RedoEntry) {
		self.redo.lock().push(entry);
	}

	pub fn redo_len(&self) -> usize {
		self.redo.lock().len()
	}

	pub(crate) fn take_undo(&self) -> Vec<UndoEntry> {
		std::mem::take(&mut self.undo.lock())
	}
}
