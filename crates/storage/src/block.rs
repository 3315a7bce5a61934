// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Fixed-capacity tuple blocks.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use quarry_core::Value;

use crate::layout::BlockLayout;
use crate::mvcc::UndoRecord;
use crate::projection::ColumnVector;

/// Per-slot chain of undo records, newest first. Guarded by the slot's
/// mutex; readers hold it across image copy and chain walk so a rollback
/// can never race a reconstruction.
pub type VersionChain = Mutex<Vec<Arc<UndoRecord>>>;

/// Current materialized images for one block.
pub struct BlockData {
	/// Whether the slot currently holds a live row image.
	pub present: Vec<bool>,
	/// One vector per layout column, pre-sized to the block capacity.
	pub columns: Vec<ColumnVector>,
}

impl BlockData {
	pub fn read_row(&self, offset: usize) -> Vec<Value> {
		self.columns.iter().map(|c| c.get_value(offset)).collect()
	}
}

pub struct Block {
	capacity: u32,
	/// Slots handed out so far; may briefly exceed capacity under racing
	/// inserts, losers retry on a fresh block.
	insert_head: AtomicU32,
	data: RwLock<BlockData>,
	versions: Vec<VersionChain>,
}

impl Block {
	pub fn new(layout: &BlockLayout, capacity: usize) -> Self {
		let columns =
			layout.columns().iter().map(|c| ColumnVector::filled(c.ty, capacity)).collect();
		let mut versions = Vec::with_capacity(capacity);
		for _ in 0..capacity {
			versions.push(Mutex::new(Vec::new()));
		}
		Self {
			capacity: capacity as u32,
			insert_head: AtomicU32::new(0),
			data: RwLock::new(BlockData { present: vec![false; capacity], columns }),
			versions,
		}
	}

	pub fn capacity(&self) -> u32 {
		self.capacity
	}

	/// Reserve the next free offset, or `None` when the block is full.
	pub fn reserve_slot(&self) -> Option<u32> {
		let offset = self.insert_head.fetch_add(1, Ordering::Relaxed);
		(offset < self.capacity).then_some(offset)
	}

	/// Offsets that have been handed out (upper bound for scans).
	pub fn allocated(&self) -> u32 {
		self.insert_head.load(Ordering::Acquire).min(self.capacity)
	}

	pub fn data(&self) -> &RwLock<BlockData> {
		&self.data
	}

	pub fn chain(&self, offset: u32) -> &VersionChain {
		&self.versions[offset as usize]
	}
}
