// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Undo records: reverse deltas enabling older-version reconstruction.

use std::sync::Arc;

use quarry_core::Value;

use crate::mvcc::TxnStatus;
use crate::slot::TupleSlot;

/// Before-image of the change an undo record reverses.
#[derive(Debug)]
pub enum UndoDelta {
	/// The row did not exist before; applying marks the slot absent.
	Insert,
	/// Per-column before values, indexed into the full layout.
	Update(Vec<(usize, Value)>),
	/// The full row that was deleted; applying restores it.
	Delete(Vec<Value>),
}

#[derive(Debug)]
pub struct UndoRecord {
	status: Arc<TxnStatus>,
	slot: TupleSlot,
	delta: UndoDelta,
}

impl UndoRecord {
	pub fn new(status: Arc<TxnStatus>, slot: TupleSlot, delta: UndoDelta) -> Self {
		Self { status, slot, delta }
	}

	pub fn status(&self) -> &Arc<TxnStatus> {
		&self.status
	}

	pub fn slot(&self) -> TupleSlot {
		self.slot
	}

	pub fn delta(&self) -> &UndoDelta {
		&self.delta
	}

	/// Roll the delta back into a materialized row copy.
	pub fn apply(&self, present: &mut bool, values: &mut [Value]) {
		match &self.delta {
			UndoDelta::Insert => *present = false,
			UndoDelta::Update(befores) => {
				for (idx, value) in befores {
					values[*idx] = value.clone();
				}
			}
			UndoDelta::Delete(row) => {
				*present = true;
				values.clone_from_slice(row);
			}
		}
	}
}
