// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! The ordered index proper.

use std::collections::HashMap;
use std::ops::Bound;

use crossbeam_skiplist::SkipMap;
use parking_lot::Mutex;
use quarry_core::{IndexOid, Value};
use quarry_storage::{TransactionContext, TupleSlot, TxnState, TxnStatus};
use std::sync::Arc;
use tracing::instrument;

use crate::error::Result;
use crate::key::{encode_key, EncodedKey, KeySchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexOp {
	Put,
	Del,
}

struct IndexVersion {
	status: Arc<TxnStatus>,
	slot: TupleSlot,
	op: IndexOp,
}

/// Per-key version list, newest first. The list mutex is the only point
/// where writers on the same key serialize; distinct keys never contend.
#[derive(Default)]
struct KeyVersions {
	versions: Mutex<Vec<IndexVersion>>,
}

pub struct OrderedIndex {
	oid: IndexOid,
	name: String,
	schema: KeySchema,
	unique: bool,
	map: SkipMap<EncodedKey, KeyVersions>,
}

impl OrderedIndex {
	pub fn new(oid: IndexOid, name: impl Into<String>, schema: KeySchema, unique: bool) -> Arc<Self> {
		Arc::new(Self { oid, name: name.into(), schema, unique, map: SkipMap::new() })
	}

	pub fn oid(&self) -> IndexOid {
		self.oid
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn schema(&self) -> &KeySchema {
		&self.schema
	}

	pub fn is_unique(&self) -> bool {
		self.unique
	}

	/// Map a tuple slot under the key. Non-unique entry point; duplicates
	/// of the same key are allowed and kept as separate slot versions.
	pub fn insert(&self, txn: &TransactionContext, key: &[Value], slot: TupleSlot) -> Result<()> {
		let encoded = encode_key(&self.schema, key)?;
		let entry = self.map.get_or_insert(encoded, KeyVersions::default());
		let mut versions = entry.value().versions.lock();
		Self::prune_aborted(&mut versions);
		versions.insert(0, IndexVersion { status: txn.status().clone(), slot, op: IndexOp::Put });
		Ok(())
	}

	/// Map the key iff no live or in-flight mapping exists. Returns false
	/// when the caller must abort: either a committed row owns the key or
	/// another transaction's insert is still pending. Versions left behind
	/// by aborted writers never block.
	#[instrument(level = "trace", skip_all, fields(index = %self.name), ret)]
	pub fn insert_unique(&self, txn: &TransactionContext, key: &[Value], slot: TupleSlot) -> Result<bool> {
		let encoded = encode_key(&self.schema, key)?;
		let entry = self.map.get_or_insert(encoded, KeyVersions::default());
		let mut versions = entry.value().versions.lock();
		Self::prune_aborted(&mut versions);

		if let Some(newest) = versions.first() {
			let blocked = match newest.status.state() {
				// A pending writer other than us may still commit; the
				// contract admits at most one winner, so the later
				// arrival loses. Our own pending Put is a duplicate.
				TxnState::Active => newest.op == IndexOp::Put || newest.status.txn_id() != txn.txn_id(),
				// Any committed Put owns the key regardless of the
				// caller's snapshot; a committed Del frees it.
				TxnState::Committed => newest.op == IndexOp::Put,
				TxnState::Aborted => false,
			};
			if blocked {
				return Ok(false);
			}
		}
		versions.insert(0, IndexVersion { status: txn.status().clone(), slot, op: IndexOp::Put });
		Ok(true)
	}

	/// Install a delete marker for the slot under the key.
	pub fn delete(&self, txn: &TransactionContext, key: &[Value], slot: TupleSlot) -> Result<()> {
		let encoded = encode_key(&self.schema, key)?;
		let entry = self.map.get_or_insert(encoded, KeyVersions::default());
		let mut versions = entry.value().versions.lock();
		Self::prune_aborted(&mut versions);
		versions.insert(0, IndexVersion { status: txn.status().clone(), slot, op: IndexOp::Del });
		Ok(())
	}

	fn prune_aborted(versions: &mut Vec<IndexVersion>) {
		versions.retain(|v| v.status.state() != TxnState::Aborted);
	}

	/// Slots whose newest visible version under this key is a Put.
	fn visible_slots(&self, versions: &[IndexVersion], txn: &TransactionContext) -> Vec<TupleSlot> {
		let mut decided: HashMap<TupleSlot, IndexOp> = HashMap::new();
		for version in versions {
			if !version.status.visible_to(txn) {
				continue;
			}
			decided.entry(version.slot).or_insert(version.op);
		}
		let mut slots: Vec<TupleSlot> =
			decided.into_iter().filter(|(_, op)| *op == IndexOp::Put).map(|(slot, _)| slot).collect();
		slots.sort_unstable();
		slots
	}

	/// Exact-key lookup.
	pub fn scan_key(&self, txn: &TransactionContext, key: &[Value]) -> Result<Vec<TupleSlot>> {
		let encoded = encode_key(&self.schema, key)?;
		let Some(entry) = self.map.get(&encoded) else {
			return Ok(Vec::new());
		};
		let versions = entry.value().versions.lock();
		Ok(self.visible_slots(&versions, txn))
	}

	/// Inclusive ascending range scan in total key order.
	pub fn scan_ascending(&self, txn: &TransactionContext, lo: &[Value], hi: &[Value]) -> Result<Vec<TupleSlot>> {
		self.scan_range(txn, lo, hi, true, None)
	}

	/// Inclusive descending range scan in total key order.
	pub fn scan_descending(&self, txn: &TransactionContext, lo: &[Value], hi: &[Value]) -> Result<Vec<TupleSlot>> {
		self.scan_range(txn, lo, hi, false, None)
	}

	pub fn scan_limit_ascending(
		&self,
		txn: &TransactionContext,
		lo: &[Value],
		hi: &[Value],
		limit: usize,
	) -> Result<Vec<TupleSlot>> {
		self.scan_range(txn, lo, hi, true, Some(limit))
	}

	pub fn scan_limit_descending(
		&self,
		txn: &TransactionContext,
		lo: &[Value],
		hi: &[Value],
		limit: usize,
	) -> Result<Vec<TupleSlot>> {
		self.scan_range(txn, lo, hi, false, Some(limit))
	}

	pub fn scan_range(
		&self,
		txn: &TransactionContext,
		lo: &[Value],
		hi: &[Value],
		ascending: bool,
		limit: Option<usize>,
	) -> Result<Vec<TupleSlot>> {
		let lo_key = encode_key(&self.schema, lo)?;
		let hi_key = encode_key(&self.schema, hi)?;
		let mut out = Vec::new();
		if lo_key > hi_key {
			return Ok(out);
		}

		let mut cursor = if ascending {
			self.map.lower_bound(Bound::Included(&lo_key))
		} else {
			self.map.upper_bound(Bound::Included(&hi_key))
		};
		while let Some(entry) = cursor {
			let in_range =
				entry.key() >= &lo_key && entry.key() <= &hi_key;
			if !in_range {
				break;
			}
			{
				let versions = entry.value().versions.lock();
				for slot in self.visible_slots(&versions, txn) {
					out.push(slot);
					if let Some(limit) = limit {
						if out.len() >= limit {
							return Ok(out);
						}
					}
				}
			}
			cursor = if ascending { entry.next() } else { entry.prev() };
		}
		Ok(out)
	}
}
