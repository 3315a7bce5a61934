// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Row- and batch-oriented views over a chosen column subset.

use quarry_core::{ColumnOid, SqlType, Value, VarlenEntry};

use crate::slot::TupleSlot;

/// Typed column vector with a parallel null bitmap.
#[derive(Debug, Clone)]
pub struct ColumnVector {
	nulls: Vec<bool>,
	values: ColumnValues,
}

#[derive(Debug, Clone)]
enum ColumnValues {
	Bool(Vec<bool>),
	SmallInt(Vec<i16>),
	Int(Vec<i32>),
	BigInt(Vec<i64>),
	Real(Vec<f32>),
	Double(Vec<f64>),
	Date(Vec<u32>),
	Varchar(Vec<VarlenEntry>),
}

impl ColumnVector {
	/// An empty, appendable vector.
	pub fn empty(ty: SqlType) -> Self {
		Self { nulls: Vec::new(), values: ColumnValues::new(ty, 0) }
	}

	/// A pre-sized vector of `len` null cells, addressable by `set_value`.
	pub fn filled(ty: SqlType, len: usize) -> Self {
		Self { nulls: vec![true; len], values: ColumnValues::new(ty, len) }
	}

	pub fn sql_type(&self) -> SqlType {
		self.values.sql_type()
	}

	pub fn is_null(&self, row: usize) -> bool {
		self.nulls[row]
	}

	pub fn push_value(&mut self, value: &Value) {
		self.nulls.push(value.is_null());
		self.values.push(value);
	}

	pub fn set_value(&mut self, row: usize, value: &Value) {
		self.nulls[row] = value.is_null();
		self.values.set(row, value);
	}

	pub fn get_value(&self, row: usize) -> Value {
		if self.nulls[row] {
			return Value::Null;
		}
		self.values.get(row)
	}

	pub fn clear(&mut self) {
		self.nulls.clear();
		self.values.clear();
	}
}

impl ColumnValues {
	fn new(ty: SqlType, len: usize) -> Self {
		match ty {
			SqlType::Bool => ColumnValues::Bool(vec![false; len]),
			SqlType::SmallInt => ColumnValues::SmallInt(vec![0; len]),
			SqlType::Int => ColumnValues::Int(vec![0; len]),
			SqlType::BigInt => ColumnValues::BigInt(vec![0; len]),
			SqlType::Real => ColumnValues::Real(vec![0.0; len]),
			SqlType::Double => ColumnValues::Double(vec![0.0; len]),
			SqlType::Date => ColumnValues::Date(vec![0; len]),
			SqlType::Varchar => {
				ColumnValues::Varchar(vec![VarlenEntry::from_bytes(&[]); len])
			}
		}
	}

	fn sql_type(&self) -> SqlType {
		match self {
			ColumnValues::Bool(_) => SqlType::Bool,
			ColumnValues::SmallInt(_) => SqlType::SmallInt,
			ColumnValues::Int(_) => SqlType::Int,
			ColumnValues::BigInt(_) => SqlType::BigInt,
			ColumnValues::Real(_) => SqlType::Real,
			ColumnValues::Double(_) => SqlType::Double,
			ColumnValues::Date(_) => SqlType::Date,
			ColumnValues::Varchar(_) => SqlType::Varchar,
		}
	}

	fn push(&mut self, value: &Value) {
		match self {
			ColumnValues::Bool(v) => v.push(value.as_bool().unwrap_or(false)),
			ColumnValues::SmallInt(v) => v.push(value.as_i64().unwrap_or(0) as i16),
			ColumnValues::Int(v) => v.push(value.as_i64().unwrap_or(0) as i32),
			ColumnValues::BigInt(v) => v.push(value.as_i64().unwrap_or(0)),
			ColumnValues::Real(v) => v.push(value.as_f64().unwrap_or(0.0) as f32),
			ColumnValues::Double(v) => v.push(value.as_f64().unwrap_or(0.0)),
			ColumnValues::Date(v) => v.push(match value {
				Value::Date(d) => *d,
				_ => 0,
			}),
			ColumnValues::Varchar(v) => v.push(match value {
				Value::Varchar(s) => VarlenEntry::from_bytes(s.as_bytes()),
				_ => VarlenEntry::from_bytes(&[]),
			}),
		}
	}

	fn set(&mut self, row: usize, value: &Value) {
		match self {
			ColumnValues::Bool(v) => v[row] = value.as_bool().unwrap_or(false),
			ColumnValues::SmallInt(v) => v[row] = value.as_i64().unwrap_or(0) as i16,
			ColumnValues::Int(v) => v[row] = value.as_i64().unwrap_or(0) as i32,
			ColumnValues::BigInt(v) => v[row] = value.as_i64().unwrap_or(0),
			ColumnValues::Real(v) => v[row] = value.as_f64().unwrap_or(0.0) as f32,
			ColumnValues::Double(v) => v[row] = value.as_f64().unwrap_or(0.0),
			ColumnValues::Date(v) => {
				v[row] = match value {
					Value::Date(d) => *d,
					_ => 0,
				}
			}
			ColumnValues::Varchar(v) => {
				v[row] = match value {
					Value::Varchar(s) => VarlenEntry::from_bytes(s.as_bytes()),
					_ => VarlenEntry::from_bytes(&[]),
				}
			}
		}
	}

	fn get(&self, row: usize) -> Value {
		match self {
			ColumnValues::Bool(v) => Value::Bool(v[row]),
			ColumnValues::SmallInt(v) => Value::SmallInt(v[row]),
			ColumnValues::Int(v) => Value::Int(v[row]),
			ColumnValues::BigInt(v) => Value::BigInt(v[row]),
			ColumnValues::Real(v) => Value::Real(v[row]),
			ColumnValues::Double(v) => Value::Double(v[row]),
			ColumnValues::Date(v) => Value::Date(v[row]),
			ColumnValues::Varchar(v) => {
				Value::Varchar(String::from_utf8_lossy(v[row].as_bytes()).into_owned())
			}
		}
	}

	fn clear(&mut self) {
		match self {
			ColumnValues::Bool(v) => v.clear(),
			ColumnValues::SmallInt(v) => v.clear(),
			ColumnValues::Int(v) => v.clear(),
			ColumnValues::BigInt(v) => v.clear(),
			ColumnValues::Real(v) => v.clear(),
			ColumnValues::Double(v) => v.clear(),
			ColumnValues::Date(v) => v.clear(),
			ColumnValues::Varchar(v) => v.clear(),
		}
	}
}

/// Vectorized buffer for up to `capacity` rows over a column subset.
/// Column order is fixed at construction and stable for the buffer's
/// lifetime; the populated row count never exceeds the capacity.
#[derive(Debug)]
pub struct ProjectedColumns {
	oids: Vec<ColumnOid>,
	columns: Vec<ColumnVector>,
	slots: Vec<TupleSlot>,
	capacity: usize,
}

impl ProjectedColumns {
	pub fn new(specs: &[(ColumnOid, SqlType)], capacity: usize) -> Self {
		Self {
			oids: specs.iter().map(|(oid, _)| *oid).collect(),
			columns: specs.iter().map(|(_, ty)| ColumnVector::empty(*ty)).collect(),
			slots: Vec::with_capacity(capacity),
			capacity,
		}
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	pub fn num_tuples(&self) -> usize {
		self.slots.len()
	}

	pub fn is_full(&self) -> bool {
		self.slots.len() >= self.capacity
	}

	pub fn column_oids(&self) -> &[ColumnOid] {
		&self.oids
	}

	pub fn num_columns(&self) -> usize {
		self.columns.len()
	}

	pub fn column_type(&self, col: usize) -> SqlType {
		self.columns[col].sql_type()
	}

	/// Append one row. `values` follow the buffer's column order.
	pub fn push_row(&mut self, slot: TupleSlot, values: &[Value]) {
		debug_assert!(self.slots.len() < self.capacity);
		debug_assert_eq!(values.len(), self.columns.len());
		self.slots.push(slot);
		for (column, value) in self.columns.iter_mut().zip(values) {
			column.push_value(value);
		}
	}

	pub fn value(&self, col: usize, row: usize) -> Value {
		self.columns[col].get_value(row)
	}

	pub fn is_null(&self, col: usize, row: usize) -> bool {
		self.columns[col].is_null(row)
	}

	pub fn slot(&self, row: usize) -> TupleSlot {
		self.slots[row]
	}

	pub fn clear(&mut self) {
		self.slots.clear();
		for column in &mut self.columns {
			column.clear();
		}
	}
}

/// A single-row view over a column subset, used for inserts, updates, and
/// key material.
#[derive(Debug, Clone)]
pub struct ProjectedRow {
	oids: Vec<ColumnOid>,
	values: Vec<Value>,
}

impl ProjectedRow {
	pub fn new(oids: Vec<ColumnOid>) -> Self {
		let values = vec![Value::Null; oids.len()];
		Self { oids, values }
	}

	pub fn from_values(oids: Vec<ColumnOid>, values: Vec<Value>) -> Self {
		debug_assert_eq!(oids.len(), values.len());
		Self { oids, values }
	}

	pub fn column_oids(&self) -> &[ColumnOid] {
		&self.oids
	}

	pub fn num_columns(&self) -> usize {
		self.oids.len()
	}

	pub fn set(&mut self, idx: usize, value: Value) {
		self.values[idx] = value;
	}

	pub fn get(&self, idx: usize) -> &Value {
		&self.values[idx]
	}

	pub fn values(&self) -> &[Value] {
		&self.values
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn buffer_round_trips_values_and_nulls() {
		let specs = [(ColumnOid(1), SqlType::Int), (ColumnOid(2), SqlType::Varchar)];
		let mut buffer = ProjectedColumns::new(&specs, 4);
		buffer.push_row(TupleSlot::new(0, 0), &[Value::Int(7), Value::Varchar("abc".into())]);
		buffer.push_row(TupleSlot::new(0, 1), &[Value::Null, Value::Null]);

		assert_eq!(buffer.num_tuples(), 2);
		assert_eq!(buffer.value(0, 0), Value::Int(7));
		assert_eq!(buffer.value(1, 0), Value::Varchar("abc".into()));
		assert!(buffer.is_null(0, 1));
		assert!(buffer.is_null(1, 1));
	}

	#[test]
	fn clear_keeps_column_order() {
		let specs = [(ColumnOid(1), SqlType::Int), (ColumnOid(2), SqlType::Bool)];
		let mut buffer = ProjectedColumns::new(&specs, 2);
		buffer.push_row(TupleSlot::new(0, 0), &[Value::Int(1), Value::Bool(true)]);
		buffer.clear();
		assert_eq!(buffer.num_tuples(), 0);
		assert_eq!(buffer.column_oids(), &[ColumnOid(1), ColumnOid(2)]);
		assert_eq!(buffer.column_type(1), SqlType::Bool);
	}
}
