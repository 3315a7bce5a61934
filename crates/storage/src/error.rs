// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use quarry_core::ColumnOid;

use crate::slot::TupleSlot;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
	/// Another transaction holds an uncommitted version of the slot.
	#[error("write-write conflict on slot {slot}")]
	WriteWriteConflict { slot: TupleSlot },

	/// A version newer than the writer's snapshot has already committed.
	#[error("serialization failure on slot {slot}")]
	SerializationFailure { slot: TupleSlot },

	#[error("column {0} is not part of the table layout")]
	UnknownColumn(ColumnOid),

	#[error("projected row does not match the table layout")]
	LayoutMismatch,

	#[error("slot {slot} does not address an allocated tuple")]
	InvalidSlot { slot: TupleSlot },
}

pub type Result<T> = std::result::Result<T, StorageError>;
