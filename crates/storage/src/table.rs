// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! `SqlTable`: a sequence of blocks under one layout, with MVCC
//! insert/update/delete/select/scan.

use std::sync::Arc;

use parking_lot::RwLock;
use quarry_core::{TableOid, Value};
use tracing::trace;

use crate::block::Block;
use crate::error::{Result, StorageError};
use crate::layout::BlockLayout;
use crate::mvcc::{RedoEntry, RedoOp, TransactionContext, TxnState, UndoDelta, UndoRecord};
use crate::projection::{ProjectedColumns, ProjectedRow};
use crate::slot::TupleSlot;

pub struct SqlTable {
	oid: TableOid,
	name: String,
	layout: BlockLayout,
	block_capacity: usize,
	blocks: RwLock<Vec<Arc<Block>>>,
}

/// Yields slots in block-then-offset order. The block list length is
/// captured lazily so a scan sees at least every block that existed when
/// it started.
pub struct SlotIterator {
	block: usize,
	offset: u32,
}

impl Default for SlotIterator {
	fn default() -> Self {
		Self::new()
	}
}

impl SlotIterator {
	pub fn new() -> Self {
		Self { block: 0, offset: 0 }
	}

	/// Start at the given block; partitioned scans hand each worker a
	/// disjoint block range.
	pub fn starting_at(block: usize) -> Self {
		Self { block, offset: 0 }
	}

	pub fn block(&self) -> usize {
		self.block
	}

	pub fn position(&self) -> TupleSlot {
		TupleSlot::new(self.block as u32, self.offset)
	}
}

impl SqlTable {
	pub fn new(oid: TableOid, name: impl Into<String>, layout: BlockLayout, block_capacity: usize) -> Arc<Self> {
		Arc::new(Self {
			oid,
			name: name.into(),
			layout,
			block_capacity,
			blocks: RwLock::new(Vec::new()),
		})
	}

	pub fn oid(&self) -> TableOid {
		self.oid
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn layout(&self) -> &BlockLayout {
		&self.layout
	}

	pub fn num_blocks(&self) -> usize {
		self.blocks.read().len()
	}

	fn block(&self, idx: u32) -> Result<Arc<Block>> {
		self.blocks
			.read()
			.get(idx as usize)
			.cloned()
			.ok_or(StorageError::InvalidSlot { slot: TupleSlot::new(idx, 0) })
	}

	fn allocate_slot(&self) -> (Arc<Block>, TupleSlot) {
		loop {
			{
				let blocks = self.blocks.read();
				if let Some(block) = blocks.last() {
					if let Some(offset) = block.reserve_slot() {
						let slot = TupleSlot::new(blocks.len() as u32 - 1, offset);
						return (block.clone(), slot);
					}
				}
			}
			let mut blocks = self.blocks.write();
			let full = blocks.last().map(|b| b.allocated() >= b.capacity()).unwrap_or(true);
			if full {
				blocks.push(Arc::new(Block::new(&self.layout, self.block_capacity)));
			}
		}
	}

	/// Map a projected row onto full-layout column indices.
	fn resolve_columns(&self, row: &ProjectedRow) -> Result<Vec<usize>> {
		row.column_oids().iter().map(|oid| self.layout.column_index(*oid)).collect()
	}

	/// Insert a new row. The projected row must cover the full layout.
	pub fn insert(self: &Arc<Self>, txn: &TransactionContext, row: &ProjectedRow) -> Result<TupleSlot> {
		if row.num_columns() != self.layout.num_columns() {
			return Err(StorageError::LayoutMismatch);
		}
		let indices = self.resolve_columns(row)?;
		let (block, slot) = self.allocate_slot();

		let mut chain = block.chain(slot.offset).lock();
		{
			let mut data = block.data().write();
			data.present[slot.offset as usize] = true;
			for (value_idx, col_idx) in indices.iter().enumerate() {
				data.columns[*col_idx].set_value(slot.offset as usize, row.get(value_idx));
			}
		}
		let record = Arc::new(UndoRecord::new(txn.status().clone(), slot, UndoDelta::Insert));
		chain.insert(0, record.clone());
		drop(chain);

		txn.record_undo(self.clone(), record);
		txn.record_redo(RedoEntry { table: self.oid, slot, op: RedoOp::Insert });
		trace!(table = %self.name, %slot, "insert");
		Ok(slot)
	}

	/// Update a subset of columns in place, installing a before-image
	/// delta. Fails with a write-write conflict when another in-flight
	/// transaction owns the newest version, or a serialization failure
	/// when a version newer than the writer's snapshot has committed.
	pub fn update(self: &Arc<Self>, txn: &TransactionContext, slot: TupleSlot, row: &ProjectedRow) -> Result<()> {
		let indices = self.resolve_columns(row)?;
		let block = self.block(slot.block)?;

		let mut chain = block.chain(slot.offset).lock();
		Self::check_write_conflict(&chain, txn, slot)?;

		let mut data = block.data().write();
		if !data.present[slot.offset as usize] {
			return Err(StorageError::InvalidSlot { slot });
		}
		let befores = indices
			.iter()
			.map(|col_idx| (*col_idx, data.columns[*col_idx].get_value(slot.offset as usize)))
			.collect();
		for (value_idx, col_idx) in indices.iter().enumerate() {
			data.columns[*col_idx].set_value(slot.offset as usize, row.get(value_idx));
		}
		drop(data);

		let record = Arc::new(UndoRecord::new(txn.status().clone(), slot, UndoDelta::Update(befores)));
		chain.insert(0, record.clone());
		drop(chain);

		txn.record_undo(self.clone(), record);
		txn.record_redo(RedoEntry { table: self.oid, slot, op: RedoOp::Update });
		Ok(())
	}

	/// Logically delete the row; the slot is never reused, the undo delta
	/// restores the full image.
	pub fn delete(self: &Arc<Self>, txn: &TransactionContext, slot: TupleSlot) -> Result<()> {
		let block = self.block(slot.block)?;

		let mut chain = block.chain(slot.offset).lock();
		Self::check_write_conflict(&chain, txn, slot)?;

		let mut data = block.data().write();
		if !data.present[slot.offset as usize] {
			return Err(StorageError::InvalidSlot { slot });
		}
		let before = data.read_row(slot.offset as usize);
		data.present[slot.offset as usize] = false;
		drop(data);

		let record = Arc::new(UndoRecord::new(txn.status().clone(), slot, UndoDelta::Delete(before)));
		chain.insert(0, record.clone());
		drop(chain);

		txn.record_undo(self.clone(), record);
		txn.record_redo(RedoEntry { table: self.oid, slot, op: RedoOp::Delete });
		Ok(())
	}

	fn check_write_conflict(
		chain: &[Arc<UndoRecord>],
		txn: &TransactionContext,
		slot: TupleSlot,
	) -> Result<()> {
		let Some(head) = chain.first() else {
			return Ok(());
		};
		if head.status().txn_id() == txn.txn_id() {
			return Ok(());
		}
		match head.status().state() {
			TxnState::Active | TxnState::Aborted => Err(StorageError::WriteWriteConflict { slot }),
			TxnState::Committed => {
				if head.status().commit_ts() > txn.start_ts() {
					Err(StorageError::SerializationFailure { slot })
				} else {
					Ok(())
				}
			}
		}
	}

	/// Reconstruct the version of the row visible to `txn`, or `None` when
	/// the slot holds no visible row.
	fn read_visible(&self, txn: &TransactionContext, slot: TupleSlot) -> Result<Option<Vec<Value>>> {
		let block = self.block(slot.block)?;
		if slot.offset >= block.allocated() {
			return Err(StorageError::InvalidSlot { slot });
		}

		// Chain lock held across image copy and delta replay; see block.rs.
		let chain = block.chain(slot.offset).lock();
		let (mut present, mut values) = {
			let data = block.data().read();
			(data.present[slot.offset as usize], data.read_row(slot.offset as usize))
		};
		for record in chain.iter() {
			if record.status().visible_to(txn) {
				break;
			}
			record.apply(&mut present, &mut values);
		}
		drop(chain);

		Ok(present.then_some(values))
	}

	/// Materialize a single visible row into the projected row. Returns
	/// false when the slot is invisible to the transaction.
	pub fn select(&self, txn: &TransactionContext, slot: TupleSlot, out: &mut ProjectedRow) -> Result<bool> {
		let Some(values) = self.read_visible(txn, slot)? else {
			return Ok(false);
		};
		for idx in 0..out.num_columns() {
			let col = self.layout.column_index(out.column_oids()[idx])?;
			out.set(idx, values[col].clone());
		}
		Ok(true)
	}

	/// Fill the buffer with up to its capacity of visible rows, advancing
	/// the iterator. The caller loops until the iterator is exhausted and
	/// the buffer comes back empty.
	pub fn scan(
		&self,
		txn: &TransactionContext,
		iter: &mut SlotIterator,
		out: &mut ProjectedColumns,
	) -> Result<()> {
		self.scan_bounded(txn, iter, out, None)
	}

	/// Like `scan`, stopping before `end_block` when one is given.
	pub fn scan_bounded(
		&self,
		txn: &TransactionContext,
		iter: &mut SlotIterator,
		out: &mut ProjectedColumns,
		end_block: Option<usize>,
	) -> Result<()> {
		out.clear();
		let projected: Vec<usize> = out
			.column_oids()
			.iter()
			.map(|oid| self.layout.column_index(*oid))
			.collect::<Result<_>>()?;

		loop {
			if out.is_full() {
				return Ok(());
			}
			if let Some(end) = end_block {
				if iter.block >= end {
					return Ok(());
				}
			}
			let block = {
				let blocks = self.blocks.read();
				match blocks.get(iter.block) {
					Some(block) => block.clone(),
					None => return Ok(()),
				}
			};
			if iter.offset >= block.allocated() {
				iter.block += 1;
				iter.offset = 0;
				continue;
			}
			let slot = TupleSlot::new(iter.block as u32, iter.offset);
			iter.offset += 1;
			if let Some(values) = self.read_visible(txn, slot)? {
				let row: Vec<Value> = projected.iter().map(|idx| values[*idx].clone()).collect();
				out.push_row(slot, &row);
			}
		}
	}

	/// True once the iterator has moved past every allocated slot.
	pub fn exhausted(&self, iter: &SlotIterator) -> bool {
		let blocks = self.blocks.read();
		match blocks.get(iter.block) {
			Some(block) => iter.block == blocks.len() - 1 && iter.offset >= block.allocated(),
			None => true,
		}
	}

	/// Undo a single record: re-apply its before image and take it out of
	/// the slot's chain. Used by transaction abort.
	pub(crate) fn rollback(&self, record: &Arc<UndoRecord>) {
		let slot = record.slot();
		let Ok(block) = self.block(slot.block) else {
			return;
		};
		let mut chain = block.chain(slot.offset).lock();
		let Some(pos) = chain.iter().position(|r| Arc::ptr_eq(r, record)) else {
			return;
		};
		{
			let mut data = block.data().write();
			let mut present = data.present[slot.offset as usize];
			let mut values = data.read_row(slot.offset as usize);
			record.apply(&mut present, &mut values);
			data.present[slot.offset as usize] = present;
			for (idx, value) in values.iter().enumerate() {
				data.columns[idx].set_value(slot.offset as usize, value);
			}
		}
		chain.remove(pos);
	}

	/// Splice a record out of its chain without touching the image. Used
	/// by the garbage collector for committed transactions below the
	/// watermark.
	pub(crate) fn unlink(&self, record: &Arc<UndoRecord>) {
		let slot = record.slot();
		let Ok(block) = self.block(slot.block) else {
			return;
		};
		let mut chain = block.chain(slot.offset).lock();
		if let Some(pos) = chain.iter().position(|r| Arc::ptr_eq(r, record)) {
			chain.remove(pos);
		}
	}
}
