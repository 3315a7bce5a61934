// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use quarry_core::SqlType;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IndexError {
	#[error("key has {got} columns, index expects {expected}")]
	KeyArityMismatch { expected: usize, got: usize },

	#[error("key column {column} has type {got}, index expects {expected}")]
	KeyTypeMismatch { column: usize, expected: SqlType, got: SqlType },
}

pub type Result<T> = std::result::Result<T, IndexError>;
