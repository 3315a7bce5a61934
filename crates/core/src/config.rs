// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Tunables threaded through the storage layer and the execution context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
	/// Rows per projected-columns buffer refill and per output batch.
	pub batch_size: usize,
	/// Tuples per storage block.
	pub block_capacity: usize,
	/// Worker states used when a scan is partitioned.
	pub scan_partitions: usize,
	/// Milliseconds between garbage collection cycles.
	pub gc_interval_ms: u64,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self { batch_size: 1024, block_capacity: 2048, scan_partitions: 4, gc_interval_ms: 50 }
	}
}
