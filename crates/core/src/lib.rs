// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Core types shared across the quarry execution engine: SQL type tags,
//! owned values, catalog handles, hashing, and engine configuration.

pub use config::EngineConfig;
pub use hash::{hash_bytes, hash_combine, hash_value, Hash64};
pub use oid::{ColumnOid, IndexOid, TableOid};
pub use types::SqlType;
pub use value::{Value, VarlenEntry, VARLEN_INLINE_CAPACITY};

mod config;
mod hash;
mod oid;
mod types;
mod value;
