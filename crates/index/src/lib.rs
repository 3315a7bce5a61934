// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Concurrent ordered index.
//!
//! A lock-free skiplist maps packed, memcmp-ordered keys to per-key MVCC
//! version lists. Node installation contends through the skiplist's CAS;
//! writers racing on a single key serialize on that key's version list,
//! so at most one unique insert ever wins. Range scans walk entries in
//! key order and filter by the reading transaction's snapshot.

pub use error::{IndexError, Result};
pub use index::OrderedIndex;
pub use key::{encode_key, EncodedKey, KeySchema};

mod error;
mod index;
mod key;
