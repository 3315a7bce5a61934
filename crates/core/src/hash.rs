// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Hash types and functions.
//!
//! Provides xxHash3 hashing behind a newtype so call sites never depend on
//! the concrete algorithm.

use core::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3;

use crate::value::Value;

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hash64(pub u64);

impl From<u64> for Hash64 {
	fn from(value: u64) -> Self {
		Hash64(value)
	}
}

impl From<Hash64> for u64 {
	fn from(hash: Hash64) -> Self {
		hash.0
	}
}

impl Hash for Hash64 {
	fn hash<H: Hasher>(&self, state: &mut H) {
		state.write_u64(self.0)
	}
}

pub fn hash_bytes(bytes: &[u8]) -> Hash64 {
	Hash64(xxh3::xxh3_64(bytes))
}

/// Combine two hashes order-sensitively.
pub fn hash_combine(seed: Hash64, next: Hash64) -> Hash64 {
	let mut buf = [0u8; 16];
	buf[..8].copy_from_slice(&seed.0.to_le_bytes());
	buf[8..].copy_from_slice(&next.0.to_le_bytes());
	hash_bytes(&buf)
}

pub fn hash_value(value: &Value) -> Hash64 {
	match value {
		Value::Null => Hash64(0),
		Value::Bool(v) => hash_bytes(&[*v as u8]),
		Value::SmallInt(v) => hash_bytes(&(*v as i64).to_le_bytes()),
		Value::Int(v) => hash_bytes(&(*v as i64).to_le_bytes()),
		Value::BigInt(v) => hash_bytes(&v.to_le_bytes()),
		Value::Real(v) => hash_bytes(&(*v as f64).to_le_bytes()),
		Value::Double(v) => hash_bytes(&v.to_le_bytes()),
		Value::Date(v) => hash_bytes(&v.to_le_bytes()),
		Value::Varchar(v) => hash_bytes(v.as_bytes()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn widened_integers_hash_alike() {
		assert_eq!(hash_value(&Value::SmallInt(42)), hash_value(&Value::BigInt(42)));
	}

	#[test]
	fn combine_is_order_sensitive() {
		let a = hash_bytes(b"a");
		let b = hash_bytes(b"b");
		assert_ne!(hash_combine(a, b), hash_combine(b, a));
	}
}
