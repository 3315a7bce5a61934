// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Aggregation hash table and the fixed-size aggregator states stored in
//! its entry payloads.

use quarry_compiler::ir::AggKind;

use crate::error::{Result, VmError};
use crate::sql::value::SqlVal;

const EMPTY: u32 = u32::MAX;
const PARTITION_COUNT: usize = 256;

#[derive(Debug, Clone, Copy)]
pub struct AggSlot {
	pub hash: u64,
	pub row: u32,
}

/// Open-addressed table keyed by `(hash, key bytes)`. The probe array is
/// used for lookups; the entry list preserves insertion order for
/// iteration and partition redistribution.
pub struct AggregationHashTable {
	payload_size: usize,
	slots: Vec<AggSlot>,
	entries: Vec<AggSlot>,
	partitions: Option<Vec<Vec<AggSlot>>>,
}

impl AggregationHashTable {
	pub fn new(payload_size: usize) -> Self {
		Self {
			payload_size,
			slots: vec![AggSlot { hash: 0, row: EMPTY }; 256],
			entries: Vec::new(),
			partitions: None,
		}
	}

	pub fn payload_size(&self) -> usize {
		self.payload_size
	}

	pub fn num_entries(&self) -> usize {
		self.entries.len()
	}

	/// Rows whose hash matches, in probe order. The caller confirms the
	/// key bytes through the emitted key-equality function.
	pub fn probe_candidates(&self, hash: u64) -> Vec<u32> {
		let mask = self.slots.len() - 1;
		let mut idx = (hash as usize) & mask;
		let mut out = Vec::new();
		loop {
			let slot = self.slots[idx];
			if slot.row == EMPTY {
				return out;
			}
			if slot.hash == hash {
				out.push(slot.row);
			}
			idx = (idx + 1) & mask;
		}
	}

	/// Record a freshly allocated entry row under its hash.
	pub fn place(&mut self, hash: u64, row: u32) {
		if (self.entries.len() + 1) * 10 > self.slots.len() * 7 {
			self.grow();
		}
		let mask = self.slots.len() - 1;
		let mut idx = (hash as usize) & mask;
		while self.slots[idx].row != EMPTY {
			idx = (idx + 1) & mask;
		}
		self.slots[idx] = AggSlot { hash, row };
		self.entries.push(AggSlot { hash, row });
	}

	fn grow(&mut self) {
		let new_cap = self.slots.len() * 2;
		let mut slots = vec![AggSlot { hash: 0, row: EMPTY }; new_cap];
		let mask = new_cap - 1;
		for entry in &self.entries {
			let mut idx = (entry.hash as usize) & mask;
			while slots[idx].row != EMPTY {
				idx = (idx + 1) & mask;
			}
			slots[idx] = *entry;
		}
		self.slots = slots;
	}

	/// Entry rows in insertion order.
	pub fn entry_rows(&self) -> Vec<u32> {
		self.entries.iter().map(|e| e.row).collect()
	}

	/// Redistribute entries into overflow partitions by hash high bits.
	pub fn transfer_partitions(&mut self, incoming: Vec<AggSlot>) {
		let partitions = self
			.partitions
			.get_or_insert_with(|| vec![Vec::new(); PARTITION_COUNT]);
		for entry in incoming {
			partitions[(entry.hash >> 56) as usize].push(entry);
		}
	}

	pub fn take_own_entries(&mut self) -> Vec<AggSlot> {
		self.slots = vec![AggSlot { hash: 0, row: EMPTY }; 256];
		std::mem::take(&mut self.entries)
	}

	/// Non-empty partitions, drained.
	pub fn drain_partitions(&mut self) -> Vec<Vec<AggSlot>> {
		match self.partitions.take() {
			Some(partitions) => partitions.into_iter().filter(|p| !p.is_empty()).collect(),
			None => Vec::new(),
		}
	}
}

// ── Aggregator states ────────────────────────────────────────────────
//
// Every aggregator occupies a fixed 24-byte slot in an entry payload:
// byte 0 holds the seen flag, bytes 8..16 the primary accumulator, bytes
// 16..24 the row count (averages).

fn read_i64(state: &[u8], at: usize) -> i64 {
	i64::from_le_bytes(state[at..at + 8].try_into().unwrap_or_default())
}

fn write_i64(state: &mut [u8], at: usize, value: i64) {
	state[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

fn read_f64(state: &[u8], at: usize) -> f64 {
	f64::from_bits(u64::from_le_bytes(state[at..at + 8].try_into().unwrap_or_default()))
}

fn write_f64(state: &mut [u8], at: usize, value: f64) {
	state[at..at + 8].copy_from_slice(&value.to_bits().to_le_bytes());
}

pub fn aggregator_init(kind: AggKind, state: &mut [u8]) -> Result<()> {
	if state.len() < AggKind::STATE_SIZE {
		return Err(VmError::Invariant("aggregator state slot too small".into()));
	}
	state[..AggKind::STATE_SIZE].fill(0);
	let _ = kind;
	Ok(())
}

pub fn aggregator_advance(kind: AggKind, state: &mut [u8], val: &SqlVal) -> Result<()> {
	match kind {
		AggKind::CountStar => write_i64(state, 8, read_i64(state, 8) + 1),
		AggKind::Count => {
			if !val.null {
				write_i64(state, 8, read_i64(state, 8) + 1);
			}
		}
		AggKind::SumInt => {
			if !val.null {
				state[0] = 1;
				write_i64(state, 8, read_i64(state, 8).wrapping_add(val.as_i64()));
			}
		}
		AggKind::MaxInt => {
			if !val.null {
				let v = val.as_i64();
				if state[0] == 0 || v > read_i64(state, 8) {
					write_i64(state, 8, v);
				}
				state[0] = 1;
			}
		}
		AggKind::MinInt => {
			if !val.null {
				let v = val.as_i64();
				if state[0] == 0 || v < read_i64(state, 8) {
					write_i64(state, 8, v);
				}
				state[0] = 1;
			}
		}
		AggKind::SumReal => {
			if !val.null {
				state[0] = 1;
				write_f64(state, 8, read_f64(state, 8) + val.as_f64());
			}
		}
		AggKind::MaxReal => {
			if !val.null {
				let v = val.as_f64();
				if state[0] == 0 || v > read_f64(state, 8) {
					write_f64(state, 8, v);
				}
				state[0] = 1;
			}
		}
		AggKind::MinReal => {
			if !val.null {
				let v = val.as_f64();
				if state[0] == 0 || v < read_f64(state, 8) {
					write_f64(state, 8, v);
				}
				state[0] = 1;
			}
		}
		AggKind::Avg => {
			if !val.null {
				state[0] = 1;
				let addend = match val.tag {
					crate::sql::value::SqlTag::Real => val.as_f64(),
					_ => val.as_i64() as f64,
				};
				write_f64(state, 8, read_f64(state, 8) + addend);
				write_i64(state, 16, read_i64(state, 16) + 1);
			}
		}
	}
	Ok(())
}

pub fn aggregator_merge(kind: AggKind, dst: &mut [u8], src: &[u8]) -> Result<()> {
	match kind {
		AggKind::CountStar | AggKind::Count => {
			write_i64(dst, 8, read_i64(dst, 8) + read_i64(src, 8));
		}
		AggKind::SumInt => {
			if src[0] != 0 {
				dst[0] = 1;
				write_i64(dst, 8, read_i64(dst, 8).wrapping_add(read_i64(src, 8)));
			}
		}
		AggKind::MaxInt => {
			if src[0] != 0 && (dst[0] == 0 || read_i64(src, 8) > read_i64(dst, 8)) {
				write_i64(dst, 8, read_i64(src, 8));
				dst[0] = 1;
			}
		}
		AggKind::MinInt => {
			if src[0] != 0 && (dst[0] == 0 || read_i64(src, 8) < read_i64(dst, 8)) {
				write_i64(dst, 8, read_i64(src, 8));
				dst[0] = 1;
			}
		}
		AggKind::SumReal => {
			if src[0] != 0 {
				dst[0] = 1;
				write_f64(dst, 8, read_f64(dst, 8) + read_f64(src, 8));
			}
		}
		AggKind::MaxReal => {
			if src[0] != 0 && (dst[0] == 0 || read_f64(src, 8) > read_f64(dst, 8)) {
				write_f64(dst, 8, read_f64(src, 8));
				dst[0] = 1;
			}
		}
		AggKind::MinReal => {
			if src[0] != 0 && (dst[0] == 0 || read_f64(src, 8) < read_f64(dst, 8)) {
				write_f64(dst, 8, read_f64(src, 8));
				dst[0] = 1;
			}
		}
		AggKind::Avg => {
			if src[0] != 0 {
				dst[0] = 1;
				write_f64(dst, 8, read_f64(dst, 8) + read_f64(src, 8));
				write_i64(dst, 16, read_i64(dst, 16) + read_i64(src, 16));
			}
		}
	}
	Ok(())
}

pub fn aggregator_result(kind: AggKind, state: &[u8]) -> SqlVal {
	match kind {
		AggKind::CountStar | AggKind::Count => SqlVal::int(read_i64(state, 8)),
		AggKind::SumInt | AggKind::MaxInt | AggKind::MinInt => {
			if state[0] == 0 {
				SqlVal::null_of(crate::sql::value::SqlTag::Int)
			} else {
				SqlVal::int(read_i64(state, 8))
			}
		}
		AggKind::SumReal | AggKind::MaxReal | AggKind::MinReal => {
			if state[0] == 0 {
				SqlVal::null_of(crate::sql::value::SqlTag::Real)
			} else {
				SqlVal::real(read_f64(state, 8))
			}
		}
		AggKind::Avg => {
			let count = read_i64(state, 16);
			if count == 0 {
				SqlVal::null_of(crate::sql::value::SqlTag::Real)
			} else {
				SqlVal::real(read_f64(state, 8) / count as f64)
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn probe_candidates_stop_at_first_empty() {
		let mut ht = AggregationHashTable::new(24);
		ht.place(42, 0);
		ht.place(42, 1);
		ht.place(7, 2);
		assert_eq!(ht.probe_candidates(42), vec![0, 1]);
		assert_eq!(ht.probe_candidates(9999), Vec::<u32>::new());
	}

	#[test]
	fn growth_keeps_every_entry_reachable() {
		let mut ht = AggregationHashTable::new(24);
		for i in 0..10_000u64 {
			ht.place(i.wrapping_mul(0x9E37_79B9_7F4A_7C15), i as u32);
		}
		assert_eq!(ht.num_entries(), 10_000);
		for i in 0..10_000u64 {
			let hash = i.wrapping_mul(0x9E37_79B9_7F4A_7C15);
			assert!(ht.probe_candidates(hash).contains(&(i as u32)));
		}
	}

	#[test]
	fn transfer_redistributes_by_hash_high_bits() {
		let mut main = AggregationHashTable::new(24);
		let mut thread_a = AggregationHashTable::new(24);
		let mut thread_b = AggregationHashTable::new(24);
		for i in 0..64u64 {
			thread_a.place(i << 56 | 1, i as u32);
			thread_b.place(i << 56 | 2, 1000 + i as u32);
		}
		main.transfer_partitions(thread_a.take_own_entries());
		main.transfer_partitions(thread_b.take_own_entries());
		assert_eq!(thread_a.num_entries(), 0);

		let partitions = main.drain_partitions();
		// 64 distinct high bytes, two entries each.
		assert_eq!(partitions.len(), 64);
		let total: usize = partitions.iter().map(Vec::len).sum();
		assert_eq!(total, 128);
		for partition in &partitions {
			let first = partition[0].hash >> 56;
			assert!(partition.iter().all(|e| e.hash >> 56 == first));
		}
		// A second drain is empty.
		assert!(main.drain_partitions().is_empty());
	}

	#[test]
	fn sum_and_avg_aggregators() {
		let mut state = vec![0u8; AggKind::STATE_SIZE];
		aggregator_init(AggKind::SumInt, &mut state).unwrap();
		for v in [1i64, 2, 3] {
			aggregator_advance(AggKind::SumInt, &mut state, &SqlVal::int(v)).unwrap();
		}
		aggregator_advance(AggKind::SumInt, &mut state, &SqlVal::null_of(crate::sql::value::SqlTag::Int))
			.unwrap();
		assert_eq!(aggregator_result(AggKind::SumInt, &state), SqlVal::int(6));

		let mut avg = vec![0u8; AggKind::STATE_SIZE];
		aggregator_init(AggKind::Avg, &mut avg).unwrap();
		for v in [2i64, 4] {
			aggregator_advance(AggKind::Avg, &mut avg, &SqlVal::int(v)).unwrap();
		}
		assert_eq!(aggregator_result(AggKind::Avg, &avg), SqlVal::real(3.0));
	}

	#[test]
	fn merge_combines_partial_states() {
		let mut a = vec![0u8; AggKind::STATE_SIZE];
		let mut b = vec![0u8; AggKind::STATE_SIZE];
		aggregator_init(AggKind::MaxInt, &mut a).unwrap();
		aggregator_init(AggKind::MaxInt, &mut b).unwrap();
		aggregator_advance(AggKind::MaxInt, &mut a, &SqlVal::int(10)).unwrap();
		aggregator_advance(AggKind::MaxInt, &mut b, &SqlVal::int(99)).unwrap();
		aggregator_merge(AggKind::MaxInt, &mut a, &b).unwrap();
		assert_eq!(aggregator_result(AggKind::MaxInt, &a), SqlVal::int(99));
	}
}
