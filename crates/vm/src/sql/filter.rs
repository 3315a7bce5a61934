// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Filter manager: clauses of filter flavors run over a batch. Clauses
//! combine disjunctively, the terms inside a flavor conjunctively.

use crate::error::{Result, VmError};

#[derive(Debug, Default)]
pub struct FilterManager {
	clauses: Vec<Vec<u16>>,
	finalized: bool,
}

impl FilterManager {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn start_new_clause(&mut self) -> Result<()> {
		if self.finalized {
			return Err(VmError::Invariant("filter manager already finalized".into()));
		}
		self.clauses.push(Vec::new());
		Ok(())
	}

	pub fn insert_flavor(&mut self, function: u16) -> Result<()> {
		match self.clauses.last_mut() {
			Some(clause) => {
				clause.push(function);
				Ok(())
			}
			None => Err(VmError::Invariant("flavor inserted before any clause".into())),
		}
	}

	pub fn finalize(&mut self) -> Result<()> {
		if self.clauses.iter().any(Vec::is_empty) {
			return Err(VmError::Invariant("filter clause without flavors".into()));
		}
		self.finalized = true;
		Ok(())
	}

	pub fn is_finalized(&self) -> bool {
		self.finalized
	}

	/// One flavor per clause to run over the batch. Flavor selection is
	/// a single pick today; the clause keeps the list so alternatives
	/// can rotate in.
	pub fn selected_flavors(&self) -> Result<Vec<u16>> {
		if !self.finalized {
			return Err(VmError::Invariant("filters run before finalize".into()));
		}
		self.clauses
			.iter()
			.map(|clause| {
				clause.first().copied().ok_or_else(|| {
					VmError::Invariant("filter clause without flavors".into())
				})
			})
			.collect()
	}
}
