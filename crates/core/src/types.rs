// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! SQL type tags.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// The SQL types the engine stores and computes over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
	Bool,
	SmallInt,
	Int,
	BigInt,
	Real,
	Double,
	Date,
	Varchar,
}

impl SqlType {
	/// Size in bytes of one value of this type in the block row format.
	/// Varchars occupy a fixed-width varlen entry slot.
	pub fn size(&self) -> usize {
		match self {
			SqlType::Bool => 1,
			SqlType::SmallInt => 2,
			SqlType::Int => 4,
			SqlType::BigInt => 8,
			SqlType::Real => 4,
			SqlType::Double => 8,
			SqlType::Date => 4,
			SqlType::Varchar => 16,
		}
	}

	pub fn is_integer(&self) -> bool {
		matches!(self, SqlType::SmallInt | SqlType::Int | SqlType::BigInt)
	}

	pub fn is_floating(&self) -> bool {
		matches!(self, SqlType::Real | SqlType::Double)
	}
}

impl Display for SqlType {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			SqlType::Bool => f.write_str("bool"),
			SqlType::SmallInt => f.write_str("smallint"),
			SqlType::Int => f.write_str("int"),
			SqlType::BigInt => f.write_str("bigint"),
			SqlType::Real => f.write_str("real"),
			SqlType::Double => f.write_str("double"),
			SqlType::Date => f.write_str("date"),
			SqlType::Varchar => f.write_str("varchar"),
		}
	}
}
