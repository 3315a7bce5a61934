// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Transaction manager: timestamp allocation, the active-transaction set,
//! and the queue of committed transactions awaiting garbage collection.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::instrument;

use crate::mvcc::{Timestamp, TransactionContext, TxnStatus, UndoEntry, TXN_ID_FLAG};

/// A committed transaction handed to the garbage collector.
pub struct FinishedTxn {
	pub status: Arc<TxnStatus>,
	pub undo: Vec<UndoEntry>,
}

pub struct TransactionManager {
	clock: AtomicU64,
	txn_ids: AtomicU64,
	active: Mutex<BTreeSet<Timestamp>>,
	completed: Mutex<VecDeque<FinishedTxn>>,
}

impl Default for TransactionManager {
	fn default() -> Self {
		Self::new()
	}
}

impl TransactionManager {
	pub fn new() -> Self {
		Self {
			clock: AtomicU64::new(0),
			txn_ids: AtomicU64::new(0),
			active: Mutex::new(BTreeSet::new()),
			completed: Mutex::new(VecDeque::new()),
		}
	}

	fn next_ts(&self) -> Timestamp {
		self.clock.fetch_add(1, Ordering::SeqCst) + 1
	}

	pub fn current_ts(&self) -> Timestamp {
		self.clock.load(Ordering::SeqCst)
	}

	#[instrument(level = "debug", skip(self))]
	pub fn begin(&self) -> TransactionContext {
		let start_ts = self.next_ts();
		let txn_id = TXN_ID_FLAG | (self.txn_ids.fetch_add(1, Ordering::SeqCst) + 1);
		self.active.lock().insert(start_ts);
		TransactionContext::new(Arc::new(TxnStatus::new(txn_id, start_ts)))
	}

	/// Install the commit timestamp and hand the undo chain to the GC
	/// queue. Versions become visible to later snapshots the instant the
	/// status flips to committed.
	#[instrument(level = "debug", skip_all, fields(txn_id = txn.txn_id()))]
	pub fn commit(&self, txn: TransactionContext) -> Timestamp {
		let commit_ts = self.next_ts();
		txn.status().mark_committed(commit_ts);
		self.active.lock().remove(&txn.start_ts());
		let finished = FinishedTxn { status: txn.status().clone(), undo: txn.take_undo() };
		self.completed.lock().push_back(finished);
		commit_ts
	}

	/// Roll back every write in reverse installation order, then flip the
	/// status. Rolled-back records leave their version chains here, so a
	/// concurrent reader can never observe a half-aborted transaction.
	#[instrument(level = "debug", skip_all, fields(txn_id = txn.txn_id()))]
	pub fn abort(&self, txn: TransactionContext) {
		let undo = txn.take_undo();
		for entry in undo.iter().rev() {
			entry.table.rollback(&entry.record);
		}
		txn.status().mark_aborted();
		self.active.lock().remove(&txn.start_ts());
	}

	/// Oldest start timestamp still running, or one past the clock when
	/// the system is idle. Nothing committed below this needs its undo
	/// records anymore.
	pub fn oldest_active_ts(&self) -> Timestamp {
		let active = self.active.lock();
		match active.first() {
			Some(ts) => *ts,
			None => self.current_ts() + 1,
		}
	}

	pub(crate) fn drain_completed(&self) -> Vec<FinishedTxn> {
		self.completed.lock().drain(..).collect()
	}

	pub(crate) fn requeue_completed(&self, txns: Vec<FinishedTxn>) {
		let mut completed = self.completed.lock();
		for txn in txns {
			completed.push_back(txn);
		}
	}
}
