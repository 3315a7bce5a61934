// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Transaction-epoch garbage collection.
//!
//! Two phases per cycle: unlink undo records of transactions committed
//! below the oldest active start timestamp, then deallocate the buffers
//! unlinked in a *previous* cycle. The one-cycle gap guarantees no reader
//! that captured a chain before the unlink is still mid-traversal when the
//! records are freed.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::debug;

use crate::mvcc::{FinishedTxn, TransactionManager};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GcReport {
	pub txns_unlinked: usize,
	pub records_unlinked: usize,
	pub buffers_deallocated: usize,
}

pub struct GarbageCollector {
	manager: Arc<TransactionManager>,
	/// Undo buffers unlinked last cycle, deallocated next cycle.
	cooling: Vec<FinishedTxn>,
}

impl GarbageCollector {
	pub fn new(manager: Arc<TransactionManager>) -> Self {
		Self { manager, cooling: Vec::new() }
	}

	/// Run one unlink + deallocate cycle.
	pub fn cycle(&mut self) -> GcReport {
		let mut report = GcReport::default();

		// Phase 2 first: everything that cooled for a full cycle goes away.
		for finished in self.cooling.drain(..) {
			report.buffers_deallocated += 1;
			drop(finished);
		}

		// Phase 1: unlink whatever has fallen below the watermark.
		let watermark = self.manager.oldest_active_ts();
		let mut not_ready = Vec::new();
		for finished in self.manager.drain_completed() {
			if finished.status.commit_ts() < watermark {
				for entry in &finished.undo {
					entry.table.unlink(&entry.record);
					report.records_unlinked += 1;
				}
				report.txns_unlinked += 1;
				self.cooling.push(finished);
			} else {
				not_ready.push(finished);
			}
		}
		self.manager.requeue_completed(not_ready);

		if report != GcReport::default() {
			debug!(?report, watermark, "gc cycle");
		}
		report
	}
}

/// Background GC thread with a shutdown handle.
pub struct GcDaemon {
	shutdown: Sender<()>,
	handle: Option<JoinHandle<()>>,
}

impl GcDaemon {
	/// # Panics
	///
	/// Panics if the OS refuses to spawn the collector thread.
	pub fn spawn(manager: Arc<TransactionManager>, interval: Duration) -> Self {
		let (shutdown, shutdown_rx): (Sender<()>, Receiver<()>) = bounded(1);
		let handle = std::thread::Builder::new()
			.name("quarry-gc".into())
			.spawn(move || {
				let mut gc = GarbageCollector::new(manager);
				loop {
					match shutdown_rx.recv_timeout(interval) {
						Ok(()) | Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
							// Drain what is already eligible, then stop.
							gc.cycle();
							gc.cycle();
							return;
						}
						Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
							gc.cycle();
						}
					}
				}
			})
			.expect("failed to spawn gc thread");
		Self { shutdown, handle: Some(handle) }
	}

	pub fn stop(mut self) {
		let _ = self.shutdown.send(());
		if let Some(handle) = self.handle.take() {
			let _ = handle.join();
		}
	}
}

impl Drop for GcDaemon {
	fn drop(&mut self) {
		let _ = self.shutdown.send(());
		if let Some(handle) = self.handle.take() {
			let _ = handle.join();
		}
	}
}
