// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Join hash table: tuples accumulate during the build pipeline, the
//! bucket index is frozen by `build`, probes read bucket chains.

use std::collections::HashMap;

use crate::error::{Result, VmError};

pub struct JoinHashTable {
	tuple_size: usize,
	pending: Vec<(u64, u32)>,
	buckets: HashMap<u64, Vec<u32>>,
	built: bool,
}

impl JoinHashTable {
	pub fn new(tuple_size: usize) -> Self {
		Self { tuple_size, pending: Vec::new(), buckets: HashMap::new(), built: false }
	}

	pub fn tuple_size(&self) -> usize {
		self.tuple_size
	}

	pub fn num_tuples(&self) -> usize {
		self.pending.len() + self.buckets.values().map(Vec::len).sum::<usize>()
	}

	pub fn is_built(&self) -> bool {
		self.built
	}

	pub fn push(&mut self, hash: u64, row: u32) -> Result<()> {
		if self.built {
			return Err(VmError::Invariant("tuple added to a built join table".into()));
		}
		self.pending.push((hash, row));
		Ok(())
	}

	/// Merge another table's unbuilt tuples (partitioned builds).
	pub fn absorb(&mut self, mut other_pending: Vec<(u64, u32)>) -> Result<()> {
		if self.built {
			return Err(VmError::Invariant("tuples merged into a built join table".into()));
		}
		self.pending.append(&mut other_pending);
		Ok(())
	}

	pub fn take_pending(&mut self) -> Vec<(u64, u32)> {
		std::mem::take(&mut self.pending)
	}

	pub fn build(&mut self) {
		for (hash, row) in self.pending.drain(..) {
			self.buckets.entry(hash).or_default().push(row);
		}
		self.built = true;
	}

	pub fn matches(&self, hash: u64) -> Result<Vec<u32>> {
		if !self.built {
			return Err(VmError::Invariant("probe of an unbuilt join table".into()));
		}
		Ok(self.buckets.get(&hash).cloned().unwrap_or_default())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn probe_before_build_is_rejected() {
		let mut jht = JoinHashTable::new(16);
		jht.push(1, 0).unwrap();
		assert!(jht.matches(1).is_err());
		jht.build();
		assert_eq!(jht.matches(1).unwrap(), vec![0]);
		assert!(jht.matches(2).unwrap().is_empty());
	}

	#[test]
	fn duplicate_hashes_chain() {
		let mut jht = JoinHashTable::new(16);
		jht.push(5, 1).unwrap();
		jht.push(5, 2).unwrap();
		jht.build();
		assert_eq!(jht.matches(5).unwrap(), vec![1, 2]);
	}
}
