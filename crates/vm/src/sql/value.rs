// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! The 16-byte SQL value cell used in frames and operator tuples, and
//! the per-invocation varlen pool backing string payloads.

use quarry_core::Value;

use crate::error::{Result, VmError};

pub const SQL_VAL_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlTag {
	Bool = 0,
	Int = 1,
	Real = 2,
	Date = 3,
	String = 4,
}

impl SqlTag {
	pub fn from_u8(raw: u8) -> Result<SqlTag> {
		Ok(match raw {
			0 => SqlTag::Bool,
			1 => SqlTag::Int,
			2 => SqlTag::Real,
			3 => SqlTag::Date,
			4 => SqlTag::String,
			other => {
				return Err(VmError::Invariant(format!("bad sql value tag {}", other)));
			}
		})
	}
}

/// Decoded SQL value cell: null flag, type tag, 8-byte payload.
/// Integer-like payloads (bool, int, date) store a widened i64 so the
/// integer comparison handlers work across all of them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SqlVal {
	pub null: bool,
	pub tag: SqlTag,
	pub payload: u64,
}

impl SqlVal {
	pub fn null_of(tag: SqlTag) -> SqlVal {
		SqlVal { null: true, tag, payload: 0 }
	}

	pub fn int(value: i64) -> SqlVal {
		SqlVal { null: false, tag: SqlTag::Int, payload: value as u64 }
	}

	pub fn real(value: f64) -> SqlVal {
		SqlVal { null: false, tag: SqlTag::Real, payload: value.to_bits() }
	}

	pub fn boolean(value: bool) -> SqlVal {
		SqlVal { null: false, tag: SqlTag::Bool, payload: value as u64 }
	}

	pub fn date(value: u32) -> SqlVal {
		SqlVal { null: false, tag: SqlTag::Date, payload: value as u64 }
	}

	pub fn string(handle: u64) -> SqlVal {
		SqlVal { null: false, tag: SqlTag::String, payload: handle }
	}

	pub fn as_i64(&self) -> i64 {
		self.payload as i64
	}

	pub fn as_f64(&self) -> f64 {
		f64::from_bits(self.payload)
	}

	pub fn as_bool(&self) -> bool {
		self.payload != 0
	}

	pub fn encode(&self, out: &mut [u8]) {
		out[..SQL_VAL_SIZE].fill(0);
		out[0] = self.null as u8;
		out[1] = self.tag as u8;
		out[8..16].copy_from_slice(&self.payload.to_le_bytes());
	}

	pub fn decode(bytes: &[u8]) -> Result<SqlVal> {
		if bytes.len() < SQL_VAL_SIZE {
			return Err(VmError::Invariant("sql value cell out of bounds".into()));
		}
		let payload = u64::from_le_bytes(
			bytes[8..16]
				.try_into()
				.map_err(|_| VmError::Invariant("sql value cell misaligned".into()))?,
		);
		Ok(SqlVal { null: bytes[0] != 0, tag: SqlTag::from_u8(bytes[1])?, payload })
	}

	/// Materialize into an owned value, resolving string handles.
	pub fn to_value(&self, pool: &VarlenPool) -> Result<Value> {
		if self.null {
			return Ok(Value::Null);
		}
		Ok(match self.tag {
			SqlTag::Bool => Value::Bool(self.as_bool()),
			SqlTag::Int => Value::BigInt(self.as_i64()),
			SqlTag::Real => Value::Double(self.as_f64()),
			SqlTag::Date => Value::Date(self.payload as u32),
			SqlTag::String => Value::Varchar(pool.get(self.payload)?.to_string()),
		})
	}

	/// Lower an owned value, interning any string payload.
	pub fn from_value(value: &Value, pool: &mut VarlenPool) -> SqlVal {
		match value {
			Value::Null => SqlVal::null_of(SqlTag::Int),
			Value::Bool(v) => SqlVal::boolean(*v),
			Value::SmallInt(v) => SqlVal::int(*v as i64),
			Value::Int(v) => SqlVal::int(*v as i64),
			Value::BigInt(v) => SqlVal::int(*v),
			Value::Real(v) => SqlVal::real(*v as f64),
			Value::Double(v) => SqlVal::real(*v),
			Value::Date(v) => SqlVal::date(*v),
			Value::Varchar(s) => SqlVal::string(pool.intern(s.clone())),
		}
	}
}

/// Owns every transient string materialized during one VM invocation;
/// handles stay valid until the invocation ends.
#[derive(Debug, Default)]
pub struct VarlenPool {
	strings: Vec<String>,
}

impl VarlenPool {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn intern(&mut self, value: String) -> u64 {
		self.strings.push(value);
		self.strings.len() as u64 - 1
	}

	pub fn get(&self, handle: u64) -> Result<&str> {
		self.strings
			.get(handle as usize)
			.map(String::as_str)
			.ok_or_else(|| VmError::Invariant(format!("dangling varlen handle {}", handle)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cells_round_trip() {
		let mut buf = [0u8; SQL_VAL_SIZE];
		for val in [SqlVal::int(-42), SqlVal::real(2.5), SqlVal::boolean(true), SqlVal::date(20250101)] {
			val.encode(&mut buf);
			assert_eq!(SqlVal::decode(&buf).unwrap(), val);
		}
	}

	#[test]
	fn null_flag_survives() {
		let mut buf = [0u8; SQL_VAL_SIZE];
		SqlVal::null_of(SqlTag::Int).encode(&mut buf);
		let decoded = SqlVal::decode(&buf).unwrap();
		assert!(decoded.null);
		assert_eq!(decoded.tag, SqlTag::Int);
	}

	#[test]
	fn strings_resolve_through_the_pool() {
		let mut pool = VarlenPool::new();
		let val = SqlVal::from_value(&Value::Varchar("hello".into()), &mut pool);
		assert_eq!(val.to_value(&pool).unwrap(), Value::Varchar("hello".into()));
	}
}
