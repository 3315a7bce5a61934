// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Thread state container: one opaque byte slice per worker, with init
//! and finalize callbacks supplied as function ids. Workers only ever
//! touch their own slice.

pub struct ThreadStateContainer {
	state_size: usize,
	init_fn: u16,
	fini_fn: u16,
	/// Context pointer handed to the callbacks (the query state).
	ctx_ptr: u64,
	states: Vec<Vec<u8>>,
}

impl ThreadStateContainer {
	pub fn new() -> Self {
		Self { state_size: 0, init_fn: 0, fini_fn: 0, ctx_ptr: 0, states: Vec::new() }
	}

	pub fn reset(&mut self, state_size: usize, init_fn: u16, fini_fn: u16, ctx_ptr: u64) {
		self.state_size = state_size;
		self.init_fn = init_fn;
		self.fini_fn = fini_fn;
		self.ctx_ptr = ctx_ptr;
		self.states.clear();
	}

	pub fn state_size(&self) -> usize {
		self.state_size
	}

	pub fn init_fn(&self) -> u16 {
		self.init_fn
	}

	pub fn fini_fn(&self) -> u16 {
		self.fini_fn
	}

	pub fn ctx_ptr(&self) -> u64 {
		self.ctx_ptr
	}

	pub fn num_states(&self) -> usize {
		self.states.len()
	}

	/// Whether the indexed state already exists; missing states must be
	/// materialized (and their init callback run) by the caller.
	pub fn has_state(&self, index: usize) -> bool {
		index < self.states.len()
	}

	pub fn ensure_state(&mut self, index: usize) {
		while self.states.len() <= index {
			self.states.push(vec![0u8; self.state_size]);
		}
	}

	pub fn state(&self, index: usize) -> Option<&[u8]> {
		self.states.get(index).map(Vec::as_slice)
	}

	pub fn state_mut(&mut self, index: usize) -> Option<&mut [u8]> {
		self.states.get_mut(index).map(Vec::as_mut_slice)
	}

	pub fn clear(&mut self) {
		self.states.clear();
	}
}

impl Default for ThreadStateContainer {
	fn default() -> Self {
		Self::new()
	}
}
