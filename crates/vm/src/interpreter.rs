// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! The bytecode interpreter.
//!
//! Execution is single-threaded and cooperative per invocation: a frame
//! is a byte buffer, runtime objects live behind handles, operator tuples
//! live in the row arena, and emitted helper functions (comparators, key
//! checks, filter flavors) re-enter the machine by function id.

use std::cmp::Ordering;
use std::sync::Arc;

use quarry_compiler::ir::AggKind;
use quarry_core::{hash_bytes, hash_combine, ColumnOid, Hash64, IndexOid, SqlType, TableOid, Value};
use quarry_index::OrderedIndex;
use quarry_storage::{ProjectedRow, SlotIterator, SqlTable, StorageError, TupleSlot};

use crate::bytecode::{BytecodeModule, BytecodeReader, Opcode};
use crate::error::{Result, VmError};
use crate::exec::ExecutionContext;
use crate::ptr;
use crate::sql::{
	aggregator_advance, aggregator_init, aggregator_merge, aggregator_result, AggregationHashTable,
	FilterManager, IndexIterator, JoinHashTable, ProjectedColumnsIterator, RowArena, RowsIter,
	RuntimeObject, Sorter, SqlTag, SqlVal, TableVectorIterator, ThreadStateContainer, VarlenPool,
	SQL_VAL_SIZE,
};

/// Primitive frame values the typed opcode families operate on.
trait Prim: Copy {
	const SIZE: usize;
	fn load(bytes: &[u8]) -> Self;
	fn store(self, bytes: &mut [u8]);
}

macro_rules! impl_prim {
	($($t:ty => $size:expr),+ $(,)?) => {
		$(impl Prim for $t {
			const SIZE: usize = $size;

			fn load(bytes: &[u8]) -> Self {
				<$t>::from_le_bytes(bytes[..$size].try_into().unwrap_or([0u8; $size]))
			}

			fn store(self, bytes: &mut [u8]) {
				bytes[..$size].copy_from_slice(&self.to_le_bytes());
			}
		})+
	};
}

impl_prim!(i8 => 1, i16 => 2, i32 => 4, i64 => 8, u8 => 1, u16 => 2, u32 => 4, u64 => 8);

impl Prim for f32 {
	const SIZE: usize = 4;

	fn load(bytes: &[u8]) -> Self {
		f32::from_bits(u32::load(bytes))
	}

	fn store(self, bytes: &mut [u8]) {
		self.to_bits().store(bytes)
	}
}

impl Prim for f64 {
	const SIZE: usize = 8;

	fn load(bytes: &[u8]) -> Self {
		f64::from_bits(u64::load(bytes))
	}

	fn store(self, bytes: &mut [u8]) {
		self.to_bits().store(bytes)
	}
}

fn rd<T: Prim>(frame: &[u8], at: u16) -> T {
	T::load(&frame[at as usize..])
}

fn wr<T: Prim>(frame: &mut [u8], at: u16, value: T) {
	value.store(&mut frame[at as usize..]);
}

fn rd_sql(frame: &[u8], at: u16) -> Result<SqlVal> {
	SqlVal::decode(&frame[at as usize..at as usize + SQL_VAL_SIZE])
}

fn wr_sql(frame: &mut [u8], at: u16, value: SqlVal) {
	value.encode(&mut frame[at as usize..at as usize + SQL_VAL_SIZE]);
}

fn sql_tag_for(ty: SqlType) -> SqlTag {
	match ty {
		SqlType::Bool => SqlTag::Bool,
		SqlType::SmallInt | SqlType::Int | SqlType::BigInt => SqlTag::Int,
		SqlType::Real | SqlType::Double => SqlTag::Real,
		SqlType::Date => SqlTag::Date,
		SqlType::Varchar => SqlTag::String,
	}
}

pub struct Machine<'a, 'e> {
	module: &'a BytecodeModule,
	pub exec: &'a mut ExecutionContext<'e>,
	state: Vec<u8>,
	objects: Vec<Option<RuntimeObject>>,
	arena: RowArena,
	varlens: VarlenPool,
	pending_output: Option<u32>,
}

/// Run a lowered module's `main` against the execution context.
pub fn execute(module: &BytecodeModule, exec: &mut ExecutionContext<'_>) -> Result<i32> {
	let mut machine = Machine::new(module, exec);
	let main = module.function_id("main")?;
	let ret = machine.invoke(main, &[0])?;
	Ok(ret as u32 as i32)
}

impl<'a, 'e> Machine<'a, 'e> {
	pub fn new(module: &'a BytecodeModule, exec: &'a mut ExecutionContext<'e>) -> Self {
		Self {
			module,
			exec,
			state: vec![0u8; module.state_size()],
			objects: Vec::new(),
			arena: RowArena::new(),
			varlens: VarlenPool::new(),
			pending_output: None,
		}
	}

	/// Objects allocated and not yet freed. Balanced setup/teardown
	/// leaves zero.
	pub fn live_objects(&self) -> usize {
		self.objects.iter().filter(|o| o.is_some()).count()
	}

	pub fn invoke_by_name(&mut self, name: &str, args: &[u64]) -> Result<u64> {
		let fid = self.module.function_id(name)?;
		self.invoke(fid, args)
	}

	/// Run one function to completion; returns the value in its return
	/// slot (zero for void functions).
	pub fn invoke(&mut self, fid: u16, args: &[u64]) -> Result<u64> {
		let info = self.module.function(fid)?.clone();
		if info.params.len() != args.len() {
			return Err(VmError::Invariant(format!(
				"`{}` takes {} argument(s), got {}",
				info.name,
				info.params.len(),
				args.len()
			)));
		}
		let mut frame = vec![0u8; info.frame_size.max(8)];
		for (offset, value) in info.params.iter().zip(args) {
			wr(&mut frame, *offset, *value);
		}
		self.dispatch(&mut frame, info.entry)?;
		Ok(match info.ret_offset {
			Some(at) => rd(&frame, at),
			None => 0,
		})
	}

	// ── Object registry ──────────────────────────────────────────────

	fn new_object(&mut self, object: RuntimeObject) -> u64 {
		self.objects.push(Some(object));
		self.objects.len() as u64
	}

	/// Reuse the slot an old same-kind handle points at, otherwise
	/// allocate; loop bodies re-initializing an iterator local stay at
	/// one object.
	fn install_object(&mut self, existing: u64, object: RuntimeObject) -> u64 {
		if existing != 0 {
			if let Some(slot) = self.objects.get_mut(existing as usize - 1) {
				if slot.as_ref().map(|o| o.kind()) == Some(object.kind()) {
					*slot = Some(object);
					return existing;
				}
			}
		}
		self.new_object(object)
	}

	fn object(&self, handle: u64) -> Result<&RuntimeObject> {
		self.objects
			.get(handle.wrapping_sub(1) as usize)
			.and_then(Option::as_ref)
			.ok_or_else(|| VmError::Invariant(format!("dangling object handle {}", handle)))
	}

	fn object_mut(&mut self, handle: u64) -> Result<&mut RuntimeObject> {
		self.objects
			.get_mut(handle.wrapping_sub(1) as usize)
			.and_then(Option::as_mut)
			.ok_or_else(|| VmError::Invariant(format!("dangling object handle {}", handle)))
	}

	fn take_object(&mut self, handle: u64) -> Result<RuntimeObject> {
		self.objects
			.get_mut(handle.wrapping_sub(1) as usize)
			.and_then(Option::take)
			.ok_or_else(|| VmError::Invariant(format!("dangling object handle {}", handle)))
	}

	fn put_back(&mut self, handle: u64, object: RuntimeObject) {
		if let Some(slot) = self.objects.get_mut(handle.wrapping_sub(1) as usize) {
			*slot = Some(object);
		}
	}

	fn free_object(&mut self, handle: u64) -> Result<()> {
		let slot = self
			.objects
			.get_mut(handle.wrapping_sub(1) as usize)
			.ok_or_else(|| VmError::Invariant(format!("dangling object handle {}", handle)))?;
		*slot = None;
		Ok(())
	}

	// ── Tagged memory ────────────────────────────────────────────────

	fn mem_read(&self, pointer: u64, out: &mut [u8]) -> Result<()> {
		let len = out.len();
		match ptr::tag(pointer) {
			ptr::TAG_STATE => {
				let at = ptr::state_offset(pointer);
				let src = self
					.state
					.get(at..at + len)
					.ok_or_else(|| VmError::Invariant("state read out of bounds".into()))?;
				out.copy_from_slice(src);
			}
			ptr::TAG_ROW => {
				let row = self.arena.row(ptr::row_of(pointer))?;
				let at = ptr::row_offset(pointer);
				let src = row
					.get(at..at + len)
					.ok_or_else(|| VmError::Invariant("row read out of bounds".into()))?;
				out.copy_from_slice(src);
			}
			ptr::TAG_THREAD => {
				let tsc = self.tsc_ref(ptr::thread_tsc(pointer) as u64)?;
				let state = tsc
					.state(ptr::thread_index(pointer) as usize)
					.ok_or_else(|| VmError::Invariant("thread state read out of bounds".into()))?;
				let at = ptr::thread_offset(pointer);
				let src = state
					.get(at..at + len)
					.ok_or_else(|| VmError::Invariant("thread state read out of bounds".into()))?;
				out.copy_from_slice(src);
			}
			_ => {
				return Err(VmError::Invariant("read through a null or bad pointer".into()));
			}
		}
		Ok(())
	}

	fn mem_write(&mut self, pointer: u64, data: &[u8]) -> Result<()> {
		let len = data.len();
		match ptr::tag(pointer) {
			ptr::TAG_STATE => {
				let at = ptr::state_offset(pointer);
				let dst = self
					.state
					.get_mut(at..at + len)
					.ok_or_else(|| VmError::Invariant("state write out of bounds".into()))?;
				dst.copy_from_slice(data);
			}
			ptr::TAG_ROW => {
				let row = self.arena.row_mut(ptr::row_of(pointer))?;
				let at = ptr::row_offset(pointer);
				let dst = row
					.get_mut(at..at + len)
					.ok_or_else(|| VmError::Invariant("row write out of bounds".into()))?;
				dst.copy_from_slice(data);
			}
			ptr::TAG_THREAD => {
				let handle = ptr::thread_tsc(pointer) as u64;
				let index = ptr::thread_index(pointer) as usize;
				let at = ptr::thread_offset(pointer);
				let tsc = self.tsc_mut(handle)?;
				let state = tsc
					.state_mut(index)
					.ok_or_else(|| VmError::Invariant("thread state write out of bounds".into()))?;
				let dst = state
					.get_mut(at..at + len)
					.ok_or_else(|| VmError::Invariant("thread state write out of bounds".into()))?;
				dst.copy_from_slice(data);
			}
			_ => {
				return Err(VmError::Invariant("write through a null or bad pointer".into()));
			}
		}
		Ok(())
	}

	fn read_u64_at(&self, pointer: u64) -> Result<u64> {
		let mut buf = [0u8; 8];
		self.mem_read(pointer, &mut buf)?;
		Ok(u64::from_le_bytes(buf))
	}

	fn write_u64_at(&mut self, pointer: u64, value: u64) -> Result<()> {
		self.mem_write(pointer, &value.to_le_bytes())
	}

	fn read_sql_at(&self, pointer: u64) -> Result<SqlVal> {
		let mut buf = [0u8; SQL_VAL_SIZE];
		self.mem_read(pointer, &mut buf)?;
		SqlVal::decode(&buf)
	}

	fn write_sql_at(&mut self, pointer: u64, value: SqlVal) -> Result<()> {
		let mut buf = [0u8; SQL_VAL_SIZE];
		value.encode(&mut buf);
		self.mem_write(pointer, &buf)
	}

	/// Object handle stored behind a state/thread pointer.
	fn handle_via_ptr(&self, pointer: u64) -> Result<u64> {
		self.read_u64_at(pointer)
	}

	// ── Typed object accessors ───────────────────────────────────────

	fn pci_mut(&mut self, handle: u64) -> Result<&mut ProjectedColumnsIterator> {
		match self.object_mut(handle)? {
			RuntimeObject::Pci(pci) => Ok(pci),
			other => Err(VmError::Invariant(format!("expected pci, found {}", other.kind()))),
		}
	}

	fn pci_ref(&self, handle: u64) -> Result<&ProjectedColumnsIterator> {
		match self.object(handle)? {
			RuntimeObject::Pci(pci) => Ok(pci),
			other => Err(VmError::Invariant(format!("expected pci, found {}", other.kind()))),
		}
	}

	fn filter_mut(&mut self, handle: u64) -> Result<&mut FilterManager> {
		match self.object_mut(handle)? {
			RuntimeObject::Filter(fm) => Ok(fm),
			other => Err(VmError::Invariant(format!("expected filter manager, found {}", other.kind()))),
		}
	}

	fn agg_mut(&mut self, handle: u64) -> Result<&mut AggregationHashTable> {
		match self.object_mut(handle)? {
			RuntimeObject::AggHt(agg) => Ok(agg),
			other => {
				Err(VmError::Invariant(format!("expected aggregation table, found {}", other.kind())))
			}
		}
	}

	fn agg_ref(&self, handle: u64) -> Result<&AggregationHashTable> {
		match self.object(handle)? {
			RuntimeObject::AggHt(agg) => Ok(agg),
			other => {
				Err(VmError::Invariant(format!("expected aggregation table, found {}", other.kind())))
			}
		}
	}

	fn jht_mut(&mut self, handle: u64) -> Result<&mut JoinHashTable> {
		match self.object_mut(handle)? {
			RuntimeObject::Jht(jht) => Ok(jht),
			other => Err(VmError::Invariant(format!("expected join table, found {}", other.kind()))),
		}
	}

	fn sorter_mut(&mut self, handle: u64) -> Result<&mut Sorter> {
		match self.object_mut(handle)? {
			RuntimeObject::Sorter(sorter) => Ok(sorter),
			other => Err(VmError::Invariant(format!("expected sorter, found {}", other.kind()))),
		}
	}

	fn rows_iter_mut(&mut self, handle: u64) -> Result<&mut RowsIter> {
		match self.object_mut(handle)? {
			RuntimeObject::AggHtIter(iter)
			| RuntimeObject::JhtIter(iter)
			| RuntimeObject::SorterIter(iter) => Ok(iter),
			other => Err(VmError::Invariant(format!("expected rows iterator, found {}", other.kind()))),
		}
	}

	fn tsc_ref(&self, handle: u64) -> Result<&ThreadStateContainer> {
		match self.object(handle)? {
			RuntimeObject::Tsc(tsc) => Ok(tsc),
			other => {
				Err(VmError::Invariant(format!("expected thread states, found {}", other.kind())))
			}
		}
	}

	fn tsc_mut(&mut self, handle: u64) -> Result<&mut ThreadStateContainer> {
		match self.object_mut(handle)? {
			RuntimeObject::Tsc(tsc) => Ok(tsc),
			other => {
				Err(VmError::Invariant(format!("expected thread states, found {}", other.kind())))
			}
		}
	}

	// ── External resolution ──────────────────────────────────────────

	fn resolve_table(&self, oid: u32) -> Result<Arc<SqlTable>> {
		self.exec
			.catalog
			.table(TableOid(oid))
			.ok_or(VmError::UnknownTable(oid))
	}

	fn resolve_index(&self, oid: u32) -> Result<Arc<OrderedIndex>> {
		self.exec
			.catalog
			.index(IndexOid(oid))
			.ok_or(VmError::UnknownIndex(oid))
	}

	fn scan_columns(&self, table: &SqlTable, cols_id: u32) -> Result<Vec<(ColumnOid, SqlType)>> {
		let list = self.module.column_list(cols_id)?;
		list.iter()
			.map(|raw| {
				let oid = ColumnOid(*raw);
				let ty = table.layout().column_type(oid)?;
				Ok((oid, ty))
			})
			.collect()
	}

	/// Decode 16-byte cells from an arena row into owned values.
	fn decode_row_values(&self, pointer: u64, arity: usize) -> Result<Vec<Value>> {
		let mut out = Vec::with_capacity(arity);
		for i in 0..arity {
			let val = self.read_sql_at(pointer + (i * SQL_VAL_SIZE) as u64)?;
			out.push(val.to_value(&self.varlens)?);
		}
		Ok(out)
	}

	fn make_tvi(&mut self, table_oid: u32, cols_id: u32, start: usize, end: Option<usize>) -> Result<u64> {
		let table = self.resolve_table(table_oid)?;
		let columns = self.scan_columns(&table, cols_id)?;
		let buffer =
			quarry_storage::ProjectedColumns::new(&columns, self.exec.config.batch_size);
		let pci = self.new_object(RuntimeObject::Pci(ProjectedColumnsIterator::new(buffer)));
		Ok(self.new_object(RuntimeObject::Tvi(TableVectorIterator {
			table,
			iter: SlotIterator::starting_at(start),
			end_block: end,
			pci,
		})))
	}

	fn invoke_compare(&mut self, cmp_fn: u16, lhs: u32, rhs: u32) -> Result<i32> {
		let raw = self.invoke(cmp_fn, &[ptr::row_ptr(lhs, 0), ptr::row_ptr(rhs, 0)])?;
		Ok(raw as u32 as i32)
	}

	fn sort_rows(&mut self, cmp_fn: u16, rows: &mut [u32]) -> Result<()> {
		let mut error: Option<VmError> = None;
		rows.sort_by(|a, b| {
			if error.is_some() {
				return Ordering::Equal;
			}
			match self.invoke_compare(cmp_fn, *a, *b) {
				Ok(v) => v.cmp(&0),
				Err(e) => {
					error = Some(e);
					Ordering::Equal
				}
			}
		});
		match error {
			Some(e) => Err(e),
			None => Ok(()),
		}
	}

	/// Lazily materialize one thread state, running its init callback.
	fn access_thread_state(&mut self, tsc_handle: u64, index: usize) -> Result<u64> {
		let (needs_init, init_fn, ctx_ptr) = {
			let tsc = self.tsc_mut(tsc_handle)?;
			let needs_init = !tsc.has_state(index);
			tsc.ensure_state(index);
			(needs_init, tsc.init_fn(), tsc.ctx_ptr())
		};
		let ts_ptr = ptr::thread_ptr(tsc_handle as u16, index as u16, 0);
		if needs_init {
			self.invoke(init_fn, &[ctx_ptr, ts_ptr])?;
		}
		Ok(ts_ptr)
	}

	// ── Dispatch ─────────────────────────────────────────────────────

	#[allow(clippy::too_many_lines)]
	fn dispatch(&mut self, frame: &mut Vec<u8>, entry: usize) -> Result<()> {
		// Detach the code borrow from `self` so handlers can re-borrow
		// the machine mutably while a reader is positioned.
		let module = self.module;
		let code = module.code();
		let mut ip = entry;

		loop {
			let mut reader = BytecodeReader::new(code);
			reader.set_position(ip);
			let at = reader.position();
			let opcode = reader.read_opcode().ok_or(VmError::InvalidBytecode { position: at })?;

			macro_rules! local {
				() => {
					reader.read_u16().ok_or(VmError::UnexpectedEndOfBytecode)?
				};
			}
			macro_rules! uimm1 {
				() => {
					reader.read_u8().ok_or(VmError::UnexpectedEndOfBytecode)?
				};
			}
			macro_rules! imm1 {
				() => {
					reader.read_i8().ok_or(VmError::UnexpectedEndOfBytecode)?
				};
			}
			macro_rules! imm2 {
				() => {
					reader.read_i16().ok_or(VmError::UnexpectedEndOfBytecode)?
				};
			}
			macro_rules! imm4 {
				() => {
					reader.read_i32().ok_or(VmError::UnexpectedEndOfBytecode)?
				};
			}
			macro_rules! uimm4 {
				() => {
					reader.read_u32().ok_or(VmError::UnexpectedEndOfBytecode)?
				};
			}
			macro_rules! imm8 {
				() => {
					reader.read_i64().ok_or(VmError::UnexpectedEndOfBytecode)?
				};
			}
			macro_rules! jump_off {
				() => {
					reader.read_i32().ok_or(VmError::UnexpectedEndOfBytecode)?
				};
			}
			macro_rules! func {
				() => {
					reader.read_u16().ok_or(VmError::UnexpectedEndOfBytecode)?
				};
			}
			macro_rules! advance {
				() => {
					ip = reader.position()
				};
			}

			// Typed primitive families.
			macro_rules! arith {
				($t:ty, $f:ident) => {{
					let d = local!();
					let a = local!();
					let b = local!();
					advance!();
					let x: $t = rd(frame, a);
					let y: $t = rd(frame, b);
					wr(frame, d, x.$f(y));
				}};
			}
			macro_rules! arith_div {
				($t:ty, $f:ident) => {{
					let d = local!();
					let a = local!();
					let b = local!();
					advance!();
					let x: $t = rd(frame, a);
					let y: $t = rd(frame, b);
					if y == 0 {
						return Err(VmError::DivideByZero);
					}
					wr(frame, d, x.$f(y));
				}};
			}
			macro_rules! arith_f {
				($t:ty, $op:tt) => {{
					let d = local!();
					let a = local!();
					let b = local!();
					advance!();
					let x: $t = rd(frame, a);
					let y: $t = rd(frame, b);
					wr(frame, d, x $op y);
				}};
			}
			macro_rules! neg {
				($t:ty) => {{
					let d = local!();
					let s = local!();
					advance!();
					let x: $t = rd(frame, s);
					wr(frame, d, x.wrapping_neg());
				}};
			}
			macro_rules! neg_f {
				($t:ty) => {{
					let d = local!();
					let s = local!();
					advance!();
					let x: $t = rd(frame, s);
					wr(frame, d, -x);
				}};
			}
			macro_rules! bitneg {
				($t:ty) => {{
					let d = local!();
					let s = local!();
					advance!();
					let x: $t = rd(frame, s);
					wr(frame, d, !x);
				}};
			}
			macro_rules! cmp {
				($t:ty, $op:tt) => {{
					let d = local!();
					let a = local!();
					let b = local!();
					advance!();
					let x: $t = rd(frame, a);
					let y: $t = rd(frame, b);
					wr(frame, d, (x $op y) as u8);
				}};
			}
			// SQL integer-payload binary arithmetic with null propagation.
			macro_rules! sql_arith_int {
				($f:ident) => {{
					let d = local!();
					let a = local!();
					let b = local!();
					advance!();
					let x = rd_sql(frame, a)?;
					let y = rd_sql(frame, b)?;
					let out = if x.null || y.null {
						SqlVal::null_of(SqlTag::Int)
					} else {
						SqlVal::int(x.as_i64().$f(y.as_i64()))
					};
					wr_sql(frame, d, out);
				}};
			}
			macro_rules! sql_arith_real {
				($op:tt) => {{
					let d = local!();
					let a = local!();
					let b = local!();
					advance!();
					let x = rd_sql(frame, a)?;
					let y = rd_sql(frame, b)?;
					let out = if x.null || y.null {
						SqlVal::null_of(SqlTag::Real)
					} else {
						SqlVal::real(x.as_f64() $op y.as_f64())
					};
					wr_sql(frame, d, out);
				}};
			}
			macro_rules! sql_cmp_int {
				($op:tt) => {{
					let d = local!();
					let a = local!();
					let b = local!();
					advance!();
					let x = rd_sql(frame, a)?;
					let y = rd_sql(frame, b)?;
					let out = if x.null || y.null {
						SqlVal::null_of(SqlTag::Bool)
					} else {
						SqlVal::boolean(x.as_i64() $op y.as_i64())
					};
					wr_sql(frame, d, out);
				}};
			}
			macro_rules! sql_cmp_real {
				($op:tt) => {{
					let d = local!();
					let a = local!();
					let b = local!();
					advance!();
					let x = rd_sql(frame, a)?;
					let y = rd_sql(frame, b)?;
					let out = if x.null || y.null {
						SqlVal::null_of(SqlTag::Bool)
					} else {
						SqlVal::boolean(x.as_f64() $op y.as_f64())
					};
					wr_sql(frame, d, out);
				}};
			}
			macro_rules! sql_cmp_str {
				($op:tt) => {{
					let d = local!();
					let a = local!();
					let b = local!();
					advance!();
					let x = rd_sql(frame, a)?;
					let y = rd_sql(frame, b)?;
					let out = if x.null || y.null {
						SqlVal::null_of(SqlTag::Bool)
					} else {
						let xs = self.varlens.get(x.payload)?;
						let ys = self.varlens.get(y.payload)?;
						SqlVal::boolean(xs $op ys)
					};
					wr_sql(frame, d, out);
				}};
			}
			macro_rules! pci_get {
				($expected:expr) => {{
					let d = local!();
					let p = local!();
					let col = uimm4!() as usize;
					advance!();
					let handle: u64 = rd(frame, p);
					let (value, ty) = {
						let pci = self.pci_ref(handle)?;
						let row = pci.current().ok_or_else(|| {
							VmError::Invariant("column read past the batch".into())
						})?;
						(pci.buffer.value(col, row), pci.buffer.column_type(col))
					};
					let expected: SqlTag = $expected;
					if sql_tag_for(ty) != expected {
						return Err(VmError::Invariant("column type mismatch".into()));
					}
					let out = match value {
						Value::Null => SqlVal::null_of(expected),
						other => SqlVal::from_value(&other, &mut self.varlens),
					};
					wr_sql(frame, d, out);
				}};
			}
			macro_rules! index_get {
				($expected:expr) => {{
					let d = local!();
					let it = local!();
					let col = uimm4!() as usize;
					advance!();
					let handle: u64 = rd(frame, it);
					let (value, ty) = {
						let iter = match self.object(handle)? {
							RuntimeObject::IndexIter(iter) => iter,
							other => {
								return Err(VmError::Invariant(format!(
									"expected index iterator, found {}",
									other.kind()
								)));
							}
						};
						let row = iter.current().ok_or_else(|| {
							VmError::Invariant("index column read before advance".into())
						})?;
						(row.get(col).clone(), iter.columns[col].1)
					};
					let expected: SqlTag = $expected;
					if sql_tag_for(ty) != expected {
						return Err(VmError::Invariant("index column type mismatch".into()));
					}
					let out = match value {
						Value::Null => SqlVal::null_of(expected),
						other => SqlVal::from_value(&other, &mut self.varlens),
					};
					wr_sql(frame, d, out);
				}};
			}
			macro_rules! row_read {
				($expected:expr) => {{
					let d = local!();
					let r = local!();
					let off = uimm4!() as u64;
					advance!();
					let pointer: u64 = rd(frame, r);
					let val = self.read_sql_at(pointer + off)?;
					let expected: SqlTag = $expected;
					if val.tag != expected {
						return Err(VmError::Invariant("row cell type mismatch".into()));
					}
					wr_sql(frame, d, val);
				}};
			}

			match opcode {
				// ── Primitive arithmetic ─────────────────────────
				Opcode::AddI8 => arith!(i8, wrapping_add),
				Opcode::AddI16 => arith!(i16, wrapping_add),
				Opcode::AddI32 => arith!(i32, wrapping_add),
				Opcode::AddI64 => arith!(i64, wrapping_add),
				Opcode::AddU8 => arith!(u8, wrapping_add),
				Opcode::AddU16 => arith!(u16, wrapping_add),
				Opcode::AddU32 => arith!(u32, wrapping_add),
				Opcode::AddU64 => arith!(u64, wrapping_add),
				Opcode::AddF32 => arith_f!(f32, +),
				Opcode::AddF64 => arith_f!(f64, +),
				Opcode::SubI8 => arith!(i8, wrapping_sub),
				Opcode::SubI16 => arith!(i16, wrapping_sub),
				Opcode::SubI32 => arith!(i32, wrapping_sub),
				Opcode::SubI64 => arith!(i64, wrapping_sub),
				Opcode::SubU8 => arith!(u8, wrapping_sub),
				Opcode::SubU16 => arith!(u16, wrapping_sub),
				Opcode::SubU32 => arith!(u32, wrapping_sub),
				Opcode::SubU64 => arith!(u64, wrapping_sub),
				Opcode::SubF32 => arith_f!(f32, -),
				Opcode::SubF64 => arith_f!(f64, -),
				Opcode::MulI8 => arith!(i8, wrapping_mul),
				Opcode::MulI16 => arith!(i16, wrapping_mul),
				Opcode::MulI32 => arith!(i32, wrapping_mul),
				Opcode::MulI64 => arith!(i64, wrapping_mul),
				Opcode::MulU8 => arith!(u8, wrapping_mul),
				Opcode::MulU16 => arith!(u16, wrapping_mul),
				Opcode::MulU32 => arith!(u32, wrapping_mul),
				Opcode::MulU64 => arith!(u64, wrapping_mul),
				Opcode::MulF32 => arith_f!(f32, *),
				Opcode::MulF64 => arith_f!(f64, *),
				Opcode::DivI8 => arith_div!(i8, wrapping_div),
				Opcode::DivI16 => arith_div!(i16, wrapping_div),
				Opcode::DivI32 => arith_div!(i32, wrapping_div),
				Opcode::DivI64 => arith_div!(i64, wrapping_div),
				Opcode::DivU8 => arith_div!(u8, wrapping_div),
				Opcode::DivU16 => arith_div!(u16, wrapping_div),
				Opcode::DivU32 => arith_div!(u32, wrapping_div),
				Opcode::DivU64 => arith_div!(u64, wrapping_div),
				Opcode::DivF32 => arith_f!(f32, /),
				Opcode::DivF64 => arith_f!(f64, /),
				Opcode::RemI8 => arith_div!(i8, wrapping_rem),
				Opcode::RemI16 => arith_div!(i16, wrapping_rem),
				Opcode::RemI32 => arith_div!(i32, wrapping_rem),
				Opcode::RemI64 => arith_div!(i64, wrapping_rem),
				Opcode::RemU8 => arith_div!(u8, wrapping_rem),
				Opcode::RemU16 => arith_div!(u16, wrapping_rem),
				Opcode::RemU32 => arith_div!(u32, wrapping_rem),
				Opcode::RemU64 => arith_div!(u64, wrapping_rem),
				Opcode::RemF32 => arith_f!(f32, %),
				Opcode::RemF64 => arith_f!(f64, %),
				Opcode::NegI8 => neg!(i8),
				Opcode::NegI16 => neg!(i16),
				Opcode::NegI32 => neg!(i32),
				Opcode::NegI64 => neg!(i64),
				Opcode::NegU8 => neg!(u8),
				Opcode::NegU16 => neg!(u16),
				Opcode::NegU32 => neg!(u32),
				Opcode::NegU64 => neg!(u64),
				Opcode::NegF32 => neg_f!(f32),
				Opcode::NegF64 => neg_f!(f64),

				Opcode::BitAndI8 => arith_f!(i8, &),
				Opcode::BitAndI16 => arith_f!(i16, &),
				Opcode::BitAndI32 => arith_f!(i32, &),
				Opcode::BitAndI64 => arith_f!(i64, &),
				Opcode::BitAndU8 => arith_f!(u8, &),
				Opcode::BitAndU16 => arith_f!(u16, &),
				Opcode::BitAndU32 => arith_f!(u32, &),
				Opcode::BitAndU64 => arith_f!(u64, &),
				Opcode::BitOrI8 => arith_f!(i8, |),
				Opcode::BitOrI16 => arith_f!(i16, |),
				Opcode::BitOrI32 => arith_f!(i32, |),
				Opcode::BitOrI64 => arith_f!(i64, |),
				Opcode::BitOrU8 => arith_f!(u8, |),
				Opcode::BitOrU16 => arith_f!(u16, |),
				Opcode::BitOrU32 => arith_f!(u32, |),
				Opcode::BitOrU64 => arith_f!(u64, |),
				Opcode::BitXorI8 => arith_f!(i8, ^),
				Opcode::BitXorI16 => arith_f!(i16, ^),
				Opcode::BitXorI32 => arith_f!(i32, ^),
				Opcode::BitXorI64 => arith_f!(i64, ^),
				Opcode::BitXorU8 => arith_f!(u8, ^),
				Opcode::BitXorU16 => arith_f!(u16, ^),
				Opcode::BitXorU32 => arith_f!(u32, ^),
				Opcode::BitXorU64 => arith_f!(u64, ^),
				Opcode::BitNegI8 => bitneg!(i8),
				Opcode::BitNegI16 => bitneg!(i16),
				Opcode::BitNegI32 => bitneg!(i32),
				Opcode::BitNegI64 => bitneg!(i64),
				Opcode::BitNegU8 => bitneg!(u8),
				Opcode::BitNegU16 => bitneg!(u16),
				Opcode::BitNegU32 => bitneg!(u32),
				Opcode::BitNegU64 => bitneg!(u64),

				Opcode::LessThanI8 => cmp!(i8, <),
				Opcode::LessThanI16 => cmp!(i16, <),
				Opcode::LessThanI32 => cmp!(i32, <),
				Opcode::LessThanI64 => cmp!(i64, <),
				Opcode::LessThanU8 => cmp!(u8, <),
				Opcode::LessThanU16 => cmp!(u16, <),
				Opcode::LessThanU32 => cmp!(u32, <),
				Opcode::LessThanU64 => cmp!(u64, <),
				Opcode::LessThanF32 => cmp!(f32, <),
				Opcode::LessThanF64 => cmp!(f64, <),
				Opcode::LessThanEqualI8 => cmp!(i8, <=),
				Opcode::LessThanEqualI16 => cmp!(i16, <=),
				Opcode::LessThanEqualI32 => cmp!(i32, <=),
				Opcode::LessThanEqualI64 => cmp!(i64, <=),
				Opcode::LessThanEqualU8 => cmp!(u8, <=),
				Opcode::LessThanEqualU16 => cmp!(u16, <=),
				Opcode::LessThanEqualU32 => cmp!(u32, <=),
				Opcode::LessThanEqualU64 => cmp!(u64, <=),
				Opcode::LessThanEqualF32 => cmp!(f32, <=),
				Opcode::LessThanEqualF64 => cmp!(f64, <=),
				Opcode::GreaterThanI8 => cmp!(i8, >),
				Opcode::GreaterThanI16 => cmp!(i16, >),
				Opcode::GreaterThanI32 => cmp!(i32, >),
				Opcode::GreaterThanI64 => cmp!(i64, >),
				Opcode::GreaterThanU8 => cmp!(u8, >),
				Opcode::GreaterThanU16 => cmp!(u16, >),
				Opcode::GreaterThanU32 => cmp!(u32, >),
				Opcode::GreaterThanU64 => cmp!(u64, >),
				Opcode::GreaterThanF32 => cmp!(f32, >),
				Opcode::GreaterThanF64 => cmp!(f64, >),
				Opcode::GreaterThanEqualI8 => cmp!(i8, >=),
				Opcode::GreaterThanEqualI16 => cmp!(i16, >=),
				Opcode::GreaterThanEqualI32 => cmp!(i32, >=),
				Opcode::GreaterThanEqualI64 => cmp!(i64, >=),
				Opcode::GreaterThanEqualU8 => cmp!(u8, >=),
				Opcode::GreaterThanEqualU16 => cmp!(u16, >=),
				Opcode::GreaterThanEqualU32 => cmp!(u32, >=),
				Opcode::GreaterThanEqualU64 => cmp!(u64, >=),
				Opcode::GreaterThanEqualF32 => cmp!(f32, >=),
				Opcode::GreaterThanEqualF64 => cmp!(f64, >=),
				Opcode::EqualI8 => cmp!(i8, ==),
				Opcode::EqualI16 => cmp!(i16, ==),
				Opcode::EqualI32 => cmp!(i32, ==),
				Opcode::EqualI64 => cmp!(i64, ==),
				Opcode::EqualU8 => cmp!(u8, ==),
				Opcode::EqualU16 => cmp!(u16, ==),
				Opcode::EqualU32 => cmp!(u32, ==),
				Opcode::EqualU64 => cmp!(u64, ==),
				Opcode::EqualF32 => cmp!(f32, ==),
				Opcode::EqualF64 => cmp!(f64, ==),
				Opcode::NotEqualI8 => cmp!(i8, !=),
				Opcode::NotEqualI16 => cmp!(i16, !=),
				Opcode::NotEqualI32 => cmp!(i32, !=),
				Opcode::NotEqualI64 => cmp!(i64, !=),
				Opcode::NotEqualU8 => cmp!(u8, !=),
				Opcode::NotEqualU16 => cmp!(u16, !=),
				Opcode::NotEqualU32 => cmp!(u32, !=),
				Opcode::NotEqualU64 => cmp!(u64, !=),
				Opcode::NotEqualF32 => cmp!(f32, !=),
				Opcode::NotEqualF64 => cmp!(f64, !=),

				Opcode::Not => {
					let d = local!();
					let s = local!();
					advance!();
					let x: u8 = rd(frame, s);
					wr(frame, d, (x == 0) as u8);
				}

				// ── Branching ────────────────────────────────────
				Opcode::Jump => {
					let offset = jump_off!();
					ip = (reader.position() as i64 + offset as i64) as usize;
				}
				Opcode::JumpIfTrue => {
					let cond = local!();
					let offset = jump_off!();
					let next = reader.position();
					let value: u8 = rd(frame, cond);
					ip = if value != 0 { (next as i64 + offset as i64) as usize } else { next };
				}
				Opcode::JumpIfFalse => {
					let cond = local!();
					let offset = jump_off!();
					let next = reader.position();
					let value: u8 = rd(frame, cond);
					ip = if value == 0 { (next as i64 + offset as i64) as usize } else { next };
				}

				// ── Memory ───────────────────────────────────────
				Opcode::IsNullPtr => {
					let d = local!();
					let s = local!();
					advance!();
					let value: u64 = rd(frame, s);
					wr(frame, d, (value == 0) as u8);
				}
				Opcode::IsNotNullPtr => {
					let d = local!();
					let s = local!();
					advance!();
					let value: u64 = rd(frame, s);
					wr(frame, d, (value != 0) as u8);
				}
				Opcode::Deref1 | Opcode::Deref2 | Opcode::Deref4 | Opcode::Deref8 => {
					let d = local!();
					let p = local!();
					advance!();
					let size = match opcode {
						Opcode::Deref1 => 1,
						Opcode::Deref2 => 2,
						Opcode::Deref4 => 4,
						_ => 8,
					};
					let pointer: u64 = rd(frame, p);
					let mut buf = [0u8; 8];
					self.mem_read(pointer, &mut buf[..size])?;
					frame[d as usize..d as usize + size].copy_from_slice(&buf[..size]);
				}
				Opcode::DerefN => {
					let d = local!();
					let p = local!();
					let len = uimm4!() as usize;
					advance!();
					let pointer: u64 = rd(frame, p);
					let mut buf = vec![0u8; len];
					self.mem_read(pointer, &mut buf)?;
					frame[d as usize..d as usize + len].copy_from_slice(&buf);
				}
				Opcode::Assign1 | Opcode::Assign2 | Opcode::Assign4 | Opcode::Assign8 => {
					let d = local!();
					let s = local!();
					advance!();
					let size = match opcode {
						Opcode::Assign1 => 1,
						Opcode::Assign2 => 2,
						Opcode::Assign4 => 4,
						_ => 8,
					};
					let mut buf = [0u8; 8];
					buf[..size].copy_from_slice(&frame[s as usize..s as usize + size]);
					frame[d as usize..d as usize + size].copy_from_slice(&buf[..size]);
				}
				Opcode::AssignImm1 => {
					let d = local!();
					let v = imm1!();
					advance!();
					wr(frame, d, v);
				}
				Opcode::AssignImm2 => {
					let d = local!();
					let v = imm2!();
					advance!();
					wr(frame, d, v);
				}
				Opcode::AssignImm4 => {
					let d = local!();
					let v = imm4!();
					advance!();
					wr(frame, d, v);
				}
				Opcode::AssignImm8 => {
					let d = local!();
					let v = imm8!();
					advance!();
					wr(frame, d, v);
				}
				Opcode::AssignImm4F => {
					let d = local!();
					let v = reader.read_f32().ok_or(VmError::UnexpectedEndOfBytecode)?;
					advance!();
					wr(frame, d, v);
				}
				Opcode::AssignImm8F => {
					let d = local!();
					let v = reader.read_f64().ok_or(VmError::UnexpectedEndOfBytecode)?;
					advance!();
					wr(frame, d, v);
				}
				Opcode::Store1 | Opcode::Store2 | Opcode::Store4 | Opcode::Store8 => {
					let p = local!();
					let s = local!();
					advance!();
					let size = match opcode {
						Opcode::Store1 => 1,
						Opcode::Store2 => 2,
						Opcode::Store4 => 4,
						_ => 8,
					};
					let pointer: u64 = rd(frame, p);
					let data: Vec<u8> = frame[s as usize..s as usize + size].to_vec();
					self.mem_write(pointer, &data)?;
				}
				Opcode::Lea => {
					let d = local!();
					let s = local!();
					let offset = uimm4!() as u64;
					advance!();
					let base: u64 = rd(frame, s);
					wr(frame, d, base + offset);
				}
				Opcode::LeaScaled => {
					let d = local!();
					let base = local!();
					let index = local!();
					let scale = uimm4!() as u64;
					let offset = uimm4!() as u64;
					advance!();
					let b: u64 = rd(frame, base);
					let i: u64 = rd(frame, index);
					wr(frame, d, b + i * scale + offset);
				}

				// ── Calls ────────────────────────────────────────
				Opcode::Call => {
					let fid = func!();
					let count = reader.read_u16().ok_or(VmError::UnexpectedEndOfBytecode)?;
					let mut args = Vec::with_capacity(count as usize);
					for _ in 0..count {
						let arg = local!();
						args.push(rd::<u64>(frame, arg));
					}
					advance!();
					self.invoke(fid, &args)?;
				}
				Opcode::Return => {
					return Ok(());
				}

				// ── Execution context ────────────────────────────
				Opcode::ExecAborted => {
					let d = local!();
					advance!();
					wr(frame, d, self.exec.is_aborted() as u8);
				}
				Opcode::TxnAbort => {
					advance!();
					self.exec.mark_aborted();
				}

				// ── Table vector iterator ────────────────────────
				Opcode::TableVectorIteratorInit => {
					let lval = local!();
					let table = uimm4!();
					let cols = uimm4!();
					advance!();
					let handle = self.make_tvi(table, cols, 0, None)?;
					wr(frame, lval, handle);
				}
				Opcode::TableVectorIteratorNext => {
					let d = local!();
					let t = local!();
					advance!();
					if self.exec.is_cancelled() {
						wr(frame, d, 0u8);
						continue;
					}
					let handle: u64 = rd(frame, t);
					let mut tvi = match self.take_object(handle)? {
						RuntimeObject::Tvi(tvi) => tvi,
						other => {
							self.put_back(handle, other);
							return Err(VmError::Invariant(
								"expected table vector iterator".into(),
							));
						}
					};
					let filled = {
						let txn = self.exec.txn;
						let table = tvi.table.clone();
						let end = tvi.end_block;
						let pci = match self.object_mut(tvi.pci)? {
							RuntimeObject::Pci(pci) => pci,
							other => {
								return Err(VmError::Invariant(format!(
									"expected pci, found {}",
									other.kind()
								)));
							}
						};
						table.scan_bounded(txn, &mut tvi.iter, &mut pci.buffer, end)?;
						pci.on_refill();
						pci.buffer.num_tuples() > 0
					};
					self.put_back(handle, RuntimeObject::Tvi(tvi));
					wr(frame, d, filled as u8);
				}
				Opcode::TableVectorIteratorGetPCI => {
					let d = local!();
					let t = local!();
					advance!();
					let handle: u64 = rd(frame, t);
					let pci = match self.object(handle)? {
						RuntimeObject::Tvi(tvi) => tvi.pci,
						other => {
							return Err(VmError::Invariant(format!(
								"expected table vector iterator, found {}",
								other.kind()
							)));
						}
					};
					wr(frame, d, pci);
				}
				Opcode::TableVectorIteratorFree => {
					let t = local!();
					advance!();
					let handle: u64 = rd(frame, t);
					let pci = match self.object(handle)? {
						RuntimeObject::Tvi(tvi) => tvi.pci,
						other => {
							return Err(VmError::Invariant(format!(
								"expected table vector iterator, found {}",
								other.kind()
							)));
						}
					};
					self.free_object(pci)?;
					self.free_object(handle)?;
				}
				Opcode::ParallelScanTable => {
					let table_oid = uimm4!();
					let cols = uimm4!();
					let qs = local!();
					let tsc_local = local!();
					let scan_fn = func!();
					advance!();
					let qs_ptr: u64 = rd(frame, qs);
					let tsc_ptr: u64 = rd(frame, tsc_local);
					let tsc_handle = self.handle_via_ptr(tsc_ptr)?;
					let table = self.resolve_table(table_oid)?;
					let blocks = table.num_blocks();
					let partitions = self.exec.config.scan_partitions.max(1);
					let chunk = blocks.div_ceil(partitions).max(1);
					let mut start = 0usize;
					let mut worker = 0usize;
					while start < blocks {
						let end = (start + chunk).min(blocks);
						let ts_ptr = self.access_thread_state(tsc_handle, worker)?;
						let tvi = self.make_tvi(table_oid, cols, start, Some(end))?;
						self.invoke(scan_fn, &[qs_ptr, ts_ptr, tvi])?;
						start = end;
						worker += 1;
					}
				}

				// ── PCI ──────────────────────────────────────────
				Opcode::PCIHasNext => {
					let d = local!();
					let p = local!();
					advance!();
					let handle: u64 = rd(frame, p);
					let has = self.pci_ref(handle)?.has_next();
					wr(frame, d, has as u8);
				}
				Opcode::PCIHasNextFiltered => {
					let d = local!();
					let p = local!();
					advance!();
					let handle: u64 = rd(frame, p);
					let has = self.pci_ref(handle)?.has_next_filtered();
					wr(frame, d, has as u8);
				}
				Opcode::PCIAdvance => {
					let p = local!();
					advance!();
					let handle: u64 = rd(frame, p);
					self.pci_mut(handle)?.advance();
				}
				Opcode::PCIAdvanceFiltered => {
					let p = local!();
					advance!();
					let handle: u64 = rd(frame, p);
					self.pci_mut(handle)?.advance_filtered();
				}
				Opcode::PCIMatch => {
					let p = local!();
					let c = local!();
					advance!();
					let handle: u64 = rd(frame, p);
					let matched: u8 = rd(frame, c);
					self.pci_mut(handle)?.match_tuple(matched != 0);
				}
				Opcode::PCIReset => {
					let p = local!();
					advance!();
					let handle: u64 = rd(frame, p);
					self.pci_mut(handle)?.reset();
				}
				Opcode::PCIResetFiltered => {
					let p = local!();
					advance!();
					let handle: u64 = rd(frame, p);
					self.pci_mut(handle)?.reset_filtered();
				}
				Opcode::PCIGetBool => pci_get!(SqlTag::Bool),
				Opcode::PCIGetInteger => pci_get!(SqlTag::Int),
				Opcode::PCIGetReal => pci_get!(SqlTag::Real),
				Opcode::PCIGetDate => pci_get!(SqlTag::Date),
				Opcode::PCIGetVarlen => pci_get!(SqlTag::String),
				Opcode::PCIGetSlot => {
					let d = local!();
					let p = local!();
					advance!();
					let handle: u64 = rd(frame, p);
					let slot = {
						let pci = self.pci_ref(handle)?;
						let row = pci.current().ok_or_else(|| {
							VmError::Invariant("slot read past the batch".into())
						})?;
						pci.buffer.slot(row)
					};
					wr(frame, d, slot.pack());
				}

				// ── Filter manager ───────────────────────────────
				Opcode::FilterManagerInit => {
					let lval = local!();
					advance!();
					let existing: u64 = rd(frame, lval);
					let handle =
						self.install_object(existing, RuntimeObject::Filter(FilterManager::new()));
					wr(frame, lval, handle);
				}
				Opcode::FilterManagerStartNewClause => {
					let f = local!();
					advance!();
					let handle: u64 = rd(frame, f);
					self.filter_mut(handle)?.start_new_clause()?;
				}
				Opcode::FilterManagerInsertFlavor => {
					let f = local!();
					let flavor = func!();
					advance!();
					let handle: u64 = rd(frame, f);
					self.filter_mut(handle)?.insert_flavor(flavor)?;
				}
				Opcode::FilterManagerFinalize => {
					let f = local!();
					advance!();
					let handle: u64 = rd(frame, f);
					self.filter_mut(handle)?.finalize()?;
				}
				Opcode::FilterManagerRunFilters => {
					let f = local!();
					let p = local!();
					advance!();
					let fm_handle: u64 = rd(frame, f);
					let pci_handle: u64 = rd(frame, p);
					let flavors = self.filter_mut(fm_handle)?.selected_flavors()?;
					for flavor in flavors {
						self.invoke(flavor, &[pci_handle])?;
					}
					self.pci_mut(pci_handle)?.finish_filter();
				}
				Opcode::FilterManagerFree => {
					let f = local!();
					advance!();
					let handle: u64 = rd(frame, f);
					self.free_object(handle)?;
				}

				// ── SQL values ───────────────────────────────────
				Opcode::InitBool => {
					let d = local!();
					let v = imm1!();
					advance!();
					wr_sql(frame, d, SqlVal::boolean(v != 0));
				}
				Opcode::InitInteger => {
					let d = local!();
					let v = imm8!();
					advance!();
					wr_sql(frame, d, SqlVal::int(v));
				}
				Opcode::InitReal => {
					let d = local!();
					let v = reader.read_f64().ok_or(VmError::UnexpectedEndOfBytecode)?;
					advance!();
					wr_sql(frame, d, SqlVal::real(v));
				}
				Opcode::InitDate => {
					let d = local!();
					let v = imm4!();
					advance!();
					wr_sql(frame, d, SqlVal::date(v as u32));
				}
				Opcode::InitString => {
					let d = local!();
					let id = uimm4!();
					advance!();
					let text = self.module.string(id)?.to_string();
					let handle = self.varlens.intern(text);
					wr_sql(frame, d, SqlVal::string(handle));
				}
				Opcode::InitBoolNull => {
					let d = local!();
					advance!();
					wr_sql(frame, d, SqlVal::null_of(SqlTag::Bool));
				}
				Opcode::InitIntegerNull => {
					let d = local!();
					advance!();
					wr_sql(frame, d, SqlVal::null_of(SqlTag::Int));
				}
				Opcode::InitRealNull => {
					let d = local!();
					advance!();
					wr_sql(frame, d, SqlVal::null_of(SqlTag::Real));
				}
				Opcode::InitDateNull => {
					let d = local!();
					advance!();
					wr_sql(frame, d, SqlVal::null_of(SqlTag::Date));
				}
				Opcode::InitStringNull => {
					let d = local!();
					advance!();
					wr_sql(frame, d, SqlVal::null_of(SqlTag::String));
				}
				Opcode::BoolToSql => {
					let d = local!();
					let s = local!();
					advance!();
					let v: u8 = rd(frame, s);
					wr_sql(frame, d, SqlVal::boolean(v != 0));
				}
				Opcode::ForceBoolTruth => {
					let d = local!();
					let s = local!();
					advance!();
					let v = rd_sql(frame, s)?;
					wr(frame, d, (!v.null && v.as_bool()) as u8);
				}
				Opcode::ValIsNull => {
					let d = local!();
					let s = local!();
					advance!();
					let v = rd_sql(frame, s)?;
					wr(frame, d, v.null as u8);
				}
				Opcode::ValIsNotNull => {
					let d = local!();
					let s = local!();
					advance!();
					let v = rd_sql(frame, s)?;
					wr(frame, d, (!v.null) as u8);
				}
				Opcode::IntToReal => {
					let d = local!();
					let s = local!();
					advance!();
					let v = rd_sql(frame, s)?;
					let out = if v.null {
						SqlVal::null_of(SqlTag::Real)
					} else {
						SqlVal::real(v.as_i64() as f64)
					};
					wr_sql(frame, d, out);
				}

				// ── SQL arithmetic ───────────────────────────────
				Opcode::AddInteger => sql_arith_int!(wrapping_add),
				Opcode::SubInteger => sql_arith_int!(wrapping_sub),
				Opcode::MulInteger => sql_arith_int!(wrapping_mul),
				Opcode::DivInteger => {
					let d = local!();
					let a = local!();
					let b = local!();
					advance!();
					let x = rd_sql(frame, a)?;
					let y = rd_sql(frame, b)?;
					let out = if x.null || y.null || y.as_i64() == 0 {
						SqlVal::null_of(SqlTag::Int)
					} else {
						SqlVal::int(x.as_i64().wrapping_div(y.as_i64()))
					};
					wr_sql(frame, d, out);
				}
				Opcode::RemInteger => {
					let d = local!();
					let a = local!();
					let b = local!();
					advance!();
					let x = rd_sql(frame, a)?;
					let y = rd_sql(frame, b)?;
					let out = if x.null || y.null || y.as_i64() == 0 {
						SqlVal::null_of(SqlTag::Int)
					} else {
						SqlVal::int(x.as_i64().wrapping_rem(y.as_i64()))
					};
					wr_sql(frame, d, out);
				}
				Opcode::AddReal => sql_arith_real!(+),
				Opcode::SubReal => sql_arith_real!(-),
				Opcode::MulReal => sql_arith_real!(*),
				Opcode::DivReal => sql_arith_real!(/),
				Opcode::RemReal => sql_arith_real!(%),

				// ── SQL comparisons ──────────────────────────────
				Opcode::LessThanInteger | Opcode::LessThanDate => sql_cmp_int!(<),
				Opcode::LessThanEqualInteger | Opcode::LessThanEqualDate => sql_cmp_int!(<=),
				Opcode::GreaterThanInteger | Opcode::GreaterThanDate => sql_cmp_int!(>),
				Opcode::GreaterThanEqualInteger | Opcode::GreaterThanEqualDate => sql_cmp_int!(>=),
				Opcode::EqualInteger | Opcode::EqualDate => sql_cmp_int!(==),
				Opcode::NotEqualInteger | Opcode::NotEqualDate => sql_cmp_int!(!=),
				Opcode::LessThanReal => sql_cmp_real!(<),
				Opcode::LessThanEqualReal => sql_cmp_real!(<=),
				Opcode::GreaterThanReal => sql_cmp_real!(>),
				Opcode::GreaterThanEqualReal => sql_cmp_real!(>=),
				Opcode::EqualReal => sql_cmp_real!(==),
				Opcode::NotEqualReal => sql_cmp_real!(!=),
				Opcode::LessThanString => sql_cmp_str!(<),
				Opcode::LessThanEqualString => sql_cmp_str!(<=),
				Opcode::GreaterThanString => sql_cmp_str!(>),
				Opcode::GreaterThanEqualString => sql_cmp_str!(>=),
				Opcode::EqualString => sql_cmp_str!(==),
				Opcode::NotEqualString => sql_cmp_str!(!=),

				// ── SQL scalar library ───────────────────────────
				Opcode::AbsInteger => {
					let d = local!();
					let s = local!();
					advance!();
					let v = rd_sql(frame, s)?;
					let out = if v.null {
						v
					} else {
						SqlVal::int(v.as_i64().wrapping_abs())
					};
					wr_sql(frame, d, out);
				}
				Opcode::AbsReal => {
					let d = local!();
					let s = local!();
					advance!();
					let v = rd_sql(frame, s)?;
					let out = if v.null { v } else { SqlVal::real(v.as_f64().abs()) };
					wr_sql(frame, d, out);
				}
				Opcode::Sqrt
				| Opcode::Exp
				| Opcode::Ln
				| Opcode::Floor
				| Opcode::Ceil
				| Opcode::Sin
				| Opcode::Cos
				| Opcode::Tan => {
					let d = local!();
					let s = local!();
					advance!();
					let v = rd_sql(frame, s)?;
					let out = if v.null {
						SqlVal::null_of(SqlTag::Real)
					} else {
						let x = v.as_f64();
						SqlVal::real(match opcode {
							Opcode::Sqrt => x.sqrt(),
							Opcode::Exp => x.exp(),
							Opcode::Ln => x.ln(),
							Opcode::Floor => x.floor(),
							Opcode::Sin => x.sin(),
							Opcode::Cos => x.cos(),
							Opcode::Tan => x.tan(),
							_ => x.ceil(),
						})
					};
					wr_sql(frame, d, out);
				}
				Opcode::Lower | Opcode::Upper => {
					let d = local!();
					let s = local!();
					advance!();
					let v = rd_sql(frame, s)?;
					let out = if v.null {
						SqlVal::null_of(SqlTag::String)
					} else {
						let text = self.varlens.get(v.payload)?;
						let converted = if opcode == Opcode::Lower {
							text.to_lowercase()
						} else {
							text.to_uppercase()
						};
						SqlVal::string(self.varlens.intern(converted))
					};
					wr_sql(frame, d, out);
				}
				Opcode::Length => {
					let d = local!();
					let s = local!();
					advance!();
					let v = rd_sql(frame, s)?;
					let out = if v.null {
						SqlVal::null_of(SqlTag::Int)
					} else {
						SqlVal::int(self.varlens.get(v.payload)?.chars().count() as i64)
					};
					wr_sql(frame, d, out);
				}

				// ── Hashing ──────────────────────────────────────
				Opcode::HashInt => {
					let d = local!();
					let s = local!();
					advance!();
					let v = rd_sql(frame, s)?;
					let hash =
						if v.null { 0 } else { hash_bytes(&v.as_i64().to_le_bytes()).0 };
					wr(frame, d, hash);
				}
				Opcode::HashReal => {
					let d = local!();
					let s = local!();
					advance!();
					let v = rd_sql(frame, s)?;
					let hash =
						if v.null { 0 } else { hash_bytes(&v.as_f64().to_le_bytes()).0 };
					wr(frame, d, hash);
				}
				Opcode::HashString => {
					let d = local!();
					let s = local!();
					advance!();
					let v = rd_sql(frame, s)?;
					let hash = if v.null {
						0
					} else {
						hash_bytes(self.varlens.get(v.payload)?.as_bytes()).0
					};
					wr(frame, d, hash);
				}
				Opcode::HashCombine => {
					let d = local!();
					let a = local!();
					let b = local!();
					advance!();
					let x: u64 = rd(frame, a);
					let y: u64 = rd(frame, b);
					wr(frame, d, hash_combine(Hash64(x), Hash64(y)).0);
				}

				// ── Aggregation hash table ───────────────────────
				Opcode::AggregationHashTableInit => {
					let p = local!();
					let payload = uimm4!() as usize;
					advance!();
					let pointer: u64 = rd(frame, p);
					let handle =
						self.new_object(RuntimeObject::AggHt(AggregationHashTable::new(payload)));
					self.write_u64_at(pointer, handle)?;
				}
				Opcode::AggregationHashTableFree => {
					let p = local!();
					advance!();
					let pointer: u64 = rd(frame, p);
					let handle = self.handle_via_ptr(pointer)?;
					self.free_object(handle)?;
					self.write_u64_at(pointer, 0)?;
				}
				Opcode::AggregationHashTableLookup => {
					let d = local!();
					let p = local!();
					let h = local!();
					let key_eq = func!();
					let probe = local!();
					advance!();
					let pointer: u64 = rd(frame, p);
					let hash: u64 = rd(frame, h);
					let probe_ptr: u64 = rd(frame, probe);
					let handle = self.handle_via_ptr(pointer)?;
					let candidates = self.agg_ref(handle)?.probe_candidates(hash);
					let mut found = 0u64;
					for row in candidates {
						let matched =
							self.invoke(key_eq, &[ptr::row_ptr(row, 0), probe_ptr])?;
						if matched & 0xFF != 0 {
							found = ptr::row_ptr(row, 0);
							break;
						}
					}
					wr(frame, d, found);
				}
				Opcode::AggregationHashTableInsert => {
					let d = local!();
					let p = local!();
					let h = local!();
					advance!();
					let pointer: u64 = rd(frame, p);
					let hash: u64 = rd(frame, h);
					let handle = self.handle_via_ptr(pointer)?;
					let payload = self.agg_ref(handle)?.payload_size();
					let row = self.arena.alloc(payload);
					self.agg_mut(handle)?.place(hash, row);
					wr(frame, d, ptr::row_ptr(row, 0));
				}
				Opcode::AggregationHashTableProcessBatch => {
					let p = local!();
					let pci_local = local!();
					let hash_fn = func!();
					let key_eq = func!();
					let init_fn = func!();
					let advance_fn = func!();
					advance!();
					let pointer: u64 = rd(frame, p);
					let pci_handle: u64 = rd(frame, pci_local);
					let handle = self.handle_via_ptr(pointer)?;
					loop {
						if !self.pci_ref(pci_handle)?.has_next_filtered() {
							break;
						}
						let hash = self.invoke(hash_fn, &[pci_handle])?;
						let candidates = self.agg_ref(handle)?.probe_candidates(hash);
						let mut entry = 0u64;
						for row in candidates {
							let matched = self
								.invoke(key_eq, &[ptr::row_ptr(row, 0), pci_handle])?;
							if matched & 0xFF != 0 {
								entry = ptr::row_ptr(row, 0);
								break;
							}
						}
						if entry == 0 {
							let payload = self.agg_ref(handle)?.payload_size();
							let row = self.arena.alloc(payload);
							self.agg_mut(handle)?.place(hash, row);
							entry = ptr::row_ptr(row, 0);
							self.invoke(init_fn, &[entry, pci_handle])?;
						}
						self.invoke(advance_fn, &[entry, pci_handle])?;
						self.pci_mut(pci_handle)?.advance_filtered();
					}
				}
				Opcode::AggregationHashTableTransferPartitions => {
					let p = local!();
					let tsc_local = local!();
					let offset = uimm4!() as usize;
					let _merge = func!();
					advance!();
					let pointer: u64 = rd(frame, p);
					let tsc_ptr: u64 = rd(frame, tsc_local);
					let handle = self.handle_via_ptr(pointer)?;
					let tsc_handle = self.handle_via_ptr(tsc_ptr)?;
					let count = self.tsc_ref(tsc_handle)?.num_states();
					for index in 0..count {
						let thread_handle = self.read_u64_at(ptr::thread_ptr(
							tsc_handle as u16,
							index as u16,
							offset as u32,
						))?;
						if thread_handle == 0 {
							continue;
						}
						let entries = self.agg_mut(thread_handle)?.take_own_entries();
						self.agg_mut(handle)?.transfer_partitions(entries);
					}
				}
				Opcode::AggregationHashTableParallelPartitionedScan => {
					let p = local!();
					let qs = local!();
					let tsc_local = local!();
					let scan_fn = func!();
					advance!();
					let pointer: u64 = rd(frame, p);
					let qs_ptr: u64 = rd(frame, qs);
					let _ = tsc_local;
					let handle = self.handle_via_ptr(pointer)?;
					let payload = self.agg_ref(handle)?.payload_size();
					let partitions = self.agg_mut(handle)?.drain_partitions();
					for partition in partitions {
						let mut partial = AggregationHashTable::new(payload);
						for entry in partition {
							partial.place(entry.hash, entry.row);
						}
						let part_handle = self.new_object(RuntimeObject::AggHt(partial));
						self.invoke(scan_fn, &[qs_ptr, part_handle])?;
						self.free_object(part_handle)?;
					}
				}
				Opcode::AggregationHashTableIteratorInit => {
					let lval = local!();
					let p = local!();
					advance!();
					let pointer: u64 = rd(frame, p);
					let ht = self.handle_via_ptr(pointer)?;
					let rows = self.agg_ref(ht)?.entry_rows();
					let existing: u64 = rd(frame, lval);
					let handle =
						self.install_object(existing, RuntimeObject::AggHtIter(RowsIter::new(rows)));
					wr(frame, lval, handle);
				}
				Opcode::AggregationHashTableIteratorHasNext => {
					let d = local!();
					let it = local!();
					advance!();
					let handle: u64 = rd(frame, it);
					let has = self.rows_iter_mut(handle)?.has_next();
					wr(frame, d, has as u8);
				}
				Opcode::AggregationHashTableIteratorNext => {
					let it = local!();
					advance!();
					let handle: u64 = rd(frame, it);
					self.rows_iter_mut(handle)?.advance();
				}
				Opcode::AggregationHashTableIteratorGetRow => {
					let d = local!();
					let it = local!();
					advance!();
					let handle: u64 = rd(frame, it);
					let row = self
						.rows_iter_mut(handle)?
						.current()
						.ok_or_else(|| VmError::Invariant("iterator read past the end".into()))?;
					wr(frame, d, ptr::row_ptr(row, 0));
				}
				Opcode::AggregationHashTableIteratorFree => {
					let it = local!();
					advance!();
					let handle: u64 = rd(frame, it);
					self.free_object(handle)?;
				}

				// ── Aggregators ──────────────────────────────────
				Opcode::AggregatorInit => {
					let kind = uimm1!();
					let p = local!();
					advance!();
					let kind = AggKind::from_ordinal(kind)
						.ok_or_else(|| VmError::Invariant("bad aggregator kind".into()))?;
					let pointer: u64 = rd(frame, p);
					let row = self.arena.row_mut(ptr::row_of(pointer))?;
					let at = ptr::row_offset(pointer);
					aggregator_init(kind, &mut row[at..])?;
				}
				Opcode::AggregatorAdvance => {
					let kind = uimm1!();
					let p = local!();
					let v = local!();
					advance!();
					let kind = AggKind::from_ordinal(kind)
						.ok_or_else(|| VmError::Invariant("bad aggregator kind".into()))?;
					let val = rd_sql(frame, v)?;
					let pointer: u64 = rd(frame, p);
					let row = self.arena.row_mut(ptr::row_of(pointer))?;
					let at = ptr::row_offset(pointer);
					aggregator_advance(kind, &mut row[at..], &val)?;
				}
				Opcode::AggregatorMerge => {
					let kind = uimm1!();
					let dp = local!();
					let sp = local!();
					advance!();
					let kind = AggKind::from_ordinal(kind)
						.ok_or_else(|| VmError::Invariant("bad aggregator kind".into()))?;
					let dst_ptr: u64 = rd(frame, dp);
					let src_ptr: u64 = rd(frame, sp);
					let src = {
						let row = self.arena.row(ptr::row_of(src_ptr))?;
						let at = ptr::row_offset(src_ptr);
						row[at..at + AggKind::STATE_SIZE].to_vec()
					};
					let row = self.arena.row_mut(ptr::row_of(dst_ptr))?;
					let at = ptr::row_offset(dst_ptr);
					aggregator_merge(kind, &mut row[at..], &src)?;
				}
				Opcode::AggregatorResult => {
					let kind = uimm1!();
					let d = local!();
					let p = local!();
					advance!();
					let kind = AggKind::from_ordinal(kind)
						.ok_or_else(|| VmError::Invariant("bad aggregator kind".into()))?;
					let pointer: u64 = rd(frame, p);
					let row = self.arena.row(ptr::row_of(pointer))?;
					let at = ptr::row_offset(pointer);
					let out = aggregator_result(kind, &row[at..]);
					wr_sql(frame, d, out);
				}

				// ── Join hash table ──────────────────────────────
				Opcode::JoinHashTableInit => {
					let p = local!();
					let size = uimm4!() as usize;
					advance!();
					let pointer: u64 = rd(frame, p);
					let handle = self.new_object(RuntimeObject::Jht(JoinHashTable::new(size)));
					self.write_u64_at(pointer, handle)?;
				}
				Opcode::JoinHashTableAllocTuple => {
					let d = local!();
					let p = local!();
					let h = local!();
					advance!();
					let pointer: u64 = rd(frame, p);
					let hash: u64 = rd(frame, h);
					let handle = self.handle_via_ptr(pointer)?;
					let size = self.jht_mut(handle)?.tuple_size();
					let row = self.arena.alloc(size);
					self.jht_mut(handle)?.push(hash, row)?;
					wr(frame, d, ptr::row_ptr(row, 0));
				}
				Opcode::JoinHashTableBuild => {
					let p = local!();
					advance!();
					let pointer: u64 = rd(frame, p);
					let handle = self.handle_via_ptr(pointer)?;
					self.jht_mut(handle)?.build();
				}
				Opcode::JoinHashTableBuildParallel => {
					let p = local!();
					let tsc_local = local!();
					let offset = uimm4!() as usize;
					advance!();
					let pointer: u64 = rd(frame, p);
					let tsc_ptr: u64 = rd(frame, tsc_local);
					let handle = self.handle_via_ptr(pointer)?;
					let tsc_handle = self.handle_via_ptr(tsc_ptr)?;
					let count = self.tsc_ref(tsc_handle)?.num_states();
					for index in 0..count {
						let thread_handle = self.read_u64_at(ptr::thread_ptr(
							tsc_handle as u16,
							index as u16,
							offset as u32,
						))?;
						if thread_handle == 0 {
							continue;
						}
						let pending = self.jht_mut(thread_handle)?.take_pending();
						self.jht_mut(handle)?.absorb(pending)?;
					}
					self.jht_mut(handle)?.build();
				}
				Opcode::JoinHashTableFree => {
					let p = local!();
					advance!();
					let pointer: u64 = rd(frame, p);
					let handle = self.handle_via_ptr(pointer)?;
					self.free_object(handle)?;
					self.write_u64_at(pointer, 0)?;
				}
				Opcode::JoinHashTableIterInit => {
					let lval = local!();
					let p = local!();
					let h = local!();
					advance!();
					let pointer: u64 = rd(frame, p);
					let hash: u64 = rd(frame, h);
					let ht = self.handle_via_ptr(pointer)?;
					let rows = self.jht_mut(ht)?.matches(hash)?;
					let existing: u64 = rd(frame, lval);
					let handle =
						self.install_object(existing, RuntimeObject::JhtIter(RowsIter::new(rows)));
					wr(frame, lval, handle);
				}
				Opcode::JoinHashTableIterHasNext => {
					let d = local!();
					let it = local!();
					advance!();
					let handle: u64 = rd(frame, it);
					let has = self.rows_iter_mut(handle)?.has_next();
					wr(frame, d, has as u8);
				}
				Opcode::JoinHashTableIterGetRow => {
					let d = local!();
					let it = local!();
					advance!();
					let handle: u64 = rd(frame, it);
					let iter = self.rows_iter_mut(handle)?;
					let row = iter
						.current()
						.ok_or_else(|| VmError::Invariant("join iterator past the end".into()))?;
					iter.advance();
					wr(frame, d, ptr::row_ptr(row, 0));
				}

				// ── Sorter ───────────────────────────────────────
				Opcode::SorterInit => {
					let p = local!();
					let cmp = func!();
					let size = uimm4!() as usize;
					advance!();
					let pointer: u64 = rd(frame, p);
					let handle = self.new_object(RuntimeObject::Sorter(Sorter::new(cmp, size)));
					self.write_u64_at(pointer, handle)?;
				}
				Opcode::SorterAllocTuple => {
					let d = local!();
					let p = local!();
					advance!();
					let pointer: u64 = rd(frame, p);
					let handle = self.handle_via_ptr(pointer)?;
					let size = self.sorter_mut(handle)?.tuple_size();
					let row = self.arena.alloc(size);
					self.sorter_mut(handle)?.push_row(row);
					wr(frame, d, ptr::row_ptr(row, 0));
				}
				Opcode::SorterAllocTupleTopK => {
					let d = local!();
					let p = local!();
					let k = uimm4!() as usize;
					advance!();
					let pointer: u64 = rd(frame, p);
					let handle = self.handle_via_ptr(pointer)?;
					let (size, len) = {
						let sorter = self.sorter_mut(handle)?;
						(sorter.tuple_size(), sorter.len())
					};
					let row = self.arena.alloc(size);
					if len < k {
						self.sorter_mut(handle)?.push_row(row);
					} else {
						self.sorter_mut(handle)?.set_scratch(row);
					}
					wr(frame, d, ptr::row_ptr(row, 0));
				}
				Opcode::SorterAllocTupleTopKFinish => {
					let p = local!();
					let _k = uimm4!();
					advance!();
					let pointer: u64 = rd(frame, p);
					let handle = self.handle_via_ptr(pointer)?;
					let (cmp, scratch, rows) = {
						let sorter = self.sorter_mut(handle)?;
						(sorter.cmp_fn(), sorter.take_scratch(), sorter.rows().to_vec())
					};
					if let Some(candidate) = scratch {
						if rows.is_empty() {
							self.sorter_mut(handle)?.push_row(candidate);
						} else {
							let mut worst = 0usize;
							for i in 1..rows.len() {
								if self.invoke_compare(cmp, rows[i], rows[worst])? > 0 {
									worst = i;
								}
							}
							if self.invoke_compare(cmp, candidate, rows[worst])? < 0 {
								self.sorter_mut(handle)?.replace_row(worst, candidate);
							}
						}
					}
				}
				Opcode::SorterSort => {
					let p = local!();
					advance!();
					let pointer: u64 = rd(frame, p);
					let handle = self.handle_via_ptr(pointer)?;
					let (cmp, mut rows) = {
						let sorter = self.sorter_mut(handle)?;
						(sorter.cmp_fn(), sorter.take_rows())
					};
					self.sort_rows(cmp, &mut rows)?;
					self.sorter_mut(handle)?.set_rows(rows);
				}
				Opcode::SorterSortParallel | Opcode::SorterSortTopKParallel => {
					let p = local!();
					let tsc_local = local!();
					let offset = uimm4!() as usize;
					let limit = if opcode == Opcode::SorterSortTopKParallel {
						Some(uimm4!() as usize)
					} else {
						None
					};
					advance!();
					let pointer: u64 = rd(frame, p);
					let tsc_ptr: u64 = rd(frame, tsc_local);
					let handle = self.handle_via_ptr(pointer)?;
					let tsc_handle = self.handle_via_ptr(tsc_ptr)?;
					let count = self.tsc_ref(tsc_handle)?.num_states();
					for index in 0..count {
						let thread_handle = self.read_u64_at(ptr::thread_ptr(
							tsc_handle as u16,
							index as u16,
							offset as u32,
						))?;
						if thread_handle == 0 {
							continue;
						}
						let rows = self.sorter_mut(thread_handle)?.take_rows();
						for row in rows {
							self.sorter_mut(handle)?.push_row(row);
						}
					}
					let (cmp, mut rows) = {
						let sorter = self.sorter_mut(handle)?;
						(sorter.cmp_fn(), sorter.take_rows())
					};
					self.sort_rows(cmp, &mut rows)?;
					if let Some(limit) = limit {
						rows.truncate(limit);
					}
					self.sorter_mut(handle)?.set_rows(rows);
				}
				Opcode::SorterFree => {
					let p = local!();
					advance!();
					let pointer: u64 = rd(frame, p);
					let handle = self.handle_via_ptr(pointer)?;
					self.free_object(handle)?;
					self.write_u64_at(pointer, 0)?;
				}
				Opcode::SorterIteratorInit => {
					let lval = local!();
					let p = local!();
					advance!();
					let pointer: u64 = rd(frame, p);
					let ht = self.handle_via_ptr(pointer)?;
					let rows = self.sorter_mut(ht)?.rows().to_vec();
					let existing: u64 = rd(frame, lval);
					let handle = self
						.install_object(existing, RuntimeObject::SorterIter(RowsIter::new(rows)));
					wr(frame, lval, handle);
				}
				Opcode::SorterIteratorHasNext => {
					let d = local!();
					let it = local!();
					advance!();
					let handle: u64 = rd(frame, it);
					let has = self.rows_iter_mut(handle)?.has_next();
					wr(frame, d, has as u8);
				}
				Opcode::SorterIteratorNext => {
					let it = local!();
					advance!();
					let handle: u64 = rd(frame, it);
					self.rows_iter_mut(handle)?.advance();
				}
				Opcode::SorterIteratorGetRow => {
					let d = local!();
					let it = local!();
					advance!();
					let handle: u64 = rd(frame, it);
					let row = self
						.rows_iter_mut(handle)?
						.current()
						.ok_or_else(|| VmError::Invariant("sorter iterator past the end".into()))?;
					wr(frame, d, ptr::row_ptr(row, 0));
				}

				// ── Row arena ────────────────────────────────────
				Opcode::RowAlloc => {
					let d = local!();
					let size = uimm4!() as usize;
					advance!();
					let row = self.arena.alloc(size);
					wr(frame, d, ptr::row_ptr(row, 0));
				}
				Opcode::RowWrite => {
					let r = local!();
					let off = uimm4!() as u64;
					let v = local!();
					advance!();
					let pointer: u64 = rd(frame, r);
					let val = rd_sql(frame, v)?;
					self.write_sql_at(pointer + off, val)?;
				}
				Opcode::RowReadBool => row_read!(SqlTag::Bool),
				Opcode::RowReadInteger => row_read!(SqlTag::Int),
				Opcode::RowReadReal => row_read!(SqlTag::Real),
				Opcode::RowReadDate => row_read!(SqlTag::Date),
				Opcode::RowReadString => row_read!(SqlTag::String),

				// ── Output ───────────────────────────────────────
				Opcode::OutputAlloc => {
					let d = local!();
					advance!();
					let arity = self.exec.output_arity();
					let row = self.arena.alloc(arity * SQL_VAL_SIZE);
					self.pending_output = Some(row);
					wr(frame, d, ptr::row_ptr(row, 0));
				}
				Opcode::OutputAdvance => {
					advance!();
					let row = self
						.pending_output
						.take()
						.ok_or_else(|| VmError::Invariant("output advanced without alloc".into()))?;
					let arity = self.exec.output_arity();
					let values =
						self.decode_row_values(ptr::row_ptr(row, 0), arity)?;
					self.exec.output().push(values);
				}
				Opcode::OutputFinalize => {
					advance!();
					self.exec.output().flush();
				}

				// ── Table DML ────────────────────────────────────
				Opcode::TableInsert => {
					let d = local!();
					let table_oid = uimm4!();
					let cols = uimm4!();
					let r = local!();
					advance!();
					let pointer: u64 = rd(frame, r);
					let table = self.resolve_table(table_oid)?;
					let oids: Vec<ColumnOid> =
						self.module.column_list(cols)?.iter().map(|c| ColumnOid(*c)).collect();
					let values = self.decode_row_values(pointer, oids.len())?;
					let row = ProjectedRow::from_values(oids, values);
					let slot = table.insert(self.exec.txn, &row)?;
					wr(frame, d, slot.pack());
				}
				Opcode::TableUpdate => {
					let d = local!();
					let table_oid = uimm4!();
					let cols = uimm4!();
					let s = local!();
					let r = local!();
					advance!();
					let pointer: u64 = rd(frame, r);
					let slot = TupleSlot::unpack(rd(frame, s));
					let table = self.resolve_table(table_oid)?;
					let oids: Vec<ColumnOid> =
						self.module.column_list(cols)?.iter().map(|c| ColumnOid(*c)).collect();
					let values = self.decode_row_values(pointer, oids.len())?;
					let row = ProjectedRow::from_values(oids, values);
					let ok = match table.update(self.exec.txn, slot, &row) {
						Ok(()) => true,
						Err(StorageError::WriteWriteConflict { .. })
						| Err(StorageError::SerializationFailure { .. }) => false,
						Err(other) => return Err(other.into()),
					};
					wr(frame, d, ok as u8);
				}
				Opcode::TableDelete => {
					let d = local!();
					let table_oid = uimm4!();
					let s = local!();
					advance!();
					let slot = TupleSlot::unpack(rd(frame, s));
					let table = self.resolve_table(table_oid)?;
					let ok = match table.delete(self.exec.txn, slot) {
						Ok(()) => true,
						Err(StorageError::WriteWriteConflict { .. })
						| Err(StorageError::SerializationFailure { .. }) => false,
						Err(other) => return Err(other.into()),
					};
					wr(frame, d, ok as u8);
				}

				// ── Index ────────────────────────────────────────
				Opcode::IndexInsert => {
					let d = local!();
					let index_oid = uimm4!();
					let key = local!();
					let s = local!();
					let unique = uimm1!();
					advance!();
					let key_ptr: u64 = rd(frame, key);
					let slot = TupleSlot::unpack(rd(frame, s));
					let index = self.resolve_index(index_oid)?;
					let values = self.decode_row_values(key_ptr, index.schema().arity())?;
					let ok = if unique != 0 {
						index.insert_unique(self.exec.txn, &values, slot)?
					} else {
						index.insert(self.exec.txn, &values, slot)?;
						true
					};
					wr(frame, d, ok as u8);
				}
				Opcode::IndexIteratorInit => {
					let lval = local!();
					let index_oid = uimm4!();
					let table_oid = uimm4!();
					let cols = uimm4!();
					advance!();
					let index = self.resolve_index(index_oid)?;
					let table = self.resolve_table(table_oid)?;
					let columns = self.scan_columns(&table, cols)?;
					let existing: u64 = rd(frame, lval);
					let handle = self.install_object(
						existing,
						RuntimeObject::IndexIter(IndexIterator::new(index, table, columns)),
					);
					wr(frame, lval, handle);
				}
				Opcode::IndexIteratorScanKey => {
					let it = local!();
					let key = local!();
					advance!();
					let handle: u64 = rd(frame, it);
					let key_ptr: u64 = rd(frame, key);
					let (index, arity) = match self.object(handle)? {
						RuntimeObject::IndexIter(iter) => {
							(iter.index.clone(), iter.index.schema().arity())
						}
						other => {
							return Err(VmError::Invariant(format!(
								"expected index iterator, found {}",
								other.kind()
							)));
						}
					};
					let values = self.decode_row_values(key_ptr, arity)?;
					let results = index.scan_key(self.exec.txn, &values)?;
					match self.object_mut(handle)? {
						RuntimeObject::IndexIter(iter) => iter.set_results(results),
						_ => unreachable!(),
					}
				}
				Opcode::IndexIteratorScanRange => {
					let it = local!();
					let lo = local!();
					let hi = local!();
					let asc = uimm1!();
					let limit = uimm4!();
					advance!();
					let handle: u64 = rd(frame, it);
					let lo_ptr: u64 = rd(frame, lo);
					let hi_ptr: u64 = rd(frame, hi);
					let (index, arity) = match self.object(handle)? {
						RuntimeObject::IndexIter(iter) => {
							(iter.index.clone(), iter.index.schema().arity())
						}
						other => {
							return Err(VmError::Invariant(format!(
								"expected index iterator, found {}",
								other.kind()
							)));
						}
					};
					let lo_vals = self.decode_row_values(lo_ptr, arity)?;
					let hi_vals = self.decode_row_values(hi_ptr, arity)?;
					let limit = if limit == 0 { None } else { Some(limit as usize) };
					let results = index.scan_range(
						self.exec.txn,
						&lo_vals,
						&hi_vals,
						asc != 0,
						limit,
					)?;
					match self.object_mut(handle)? {
						RuntimeObject::IndexIter(iter) => iter.set_results(results),
						_ => unreachable!(),
					}
				}
				Opcode::IndexIteratorAdvance => {
					let d = local!();
					let it = local!();
					advance!();
					let handle: u64 = rd(frame, it);
					let mut iter = match self.take_object(handle)? {
						RuntimeObject::IndexIter(iter) => iter,
						other => {
							self.put_back(handle, other);
							return Err(VmError::Invariant("expected index iterator".into()));
						}
					};
					let has = iter.advance(self.exec.txn)?;
					self.put_back(handle, RuntimeObject::IndexIter(iter));
					wr(frame, d, has as u8);
				}
				Opcode::IndexIteratorGetBool => index_get!(SqlTag::Bool),
				Opcode::IndexIteratorGetInteger => index_get!(SqlTag::Int),
				Opcode::IndexIteratorGetReal => index_get!(SqlTag::Real),
				Opcode::IndexIteratorGetDate => index_get!(SqlTag::Date),
				Opcode::IndexIteratorGetString => index_get!(SqlTag::String),
				Opcode::IndexIteratorFree => {
					let it = local!();
					advance!();
					let handle: u64 = rd(frame, it);
					self.free_object(handle)?;
				}

				// ── Thread state container ───────────────────────
				Opcode::ThreadStateContainerReset => {
					let p = local!();
					let size = uimm4!() as usize;
					let init_fn = func!();
					let fini_fn = func!();
					let ctx = local!();
					advance!();
					let pointer: u64 = rd(frame, p);
					let ctx_ptr: u64 = rd(frame, ctx);
					let mut handle = self.handle_via_ptr(pointer)?;
					if handle == 0 {
						handle = self.new_object(RuntimeObject::Tsc(ThreadStateContainer::new()));
						self.write_u64_at(pointer, handle)?;
					}
					self.tsc_mut(handle)?.reset(size, init_fn, fini_fn, ctx_ptr);
				}
				Opcode::ThreadStateContainerIterate => {
					let p = local!();
					let ctx = local!();
					let f = func!();
					advance!();
					let pointer: u64 = rd(frame, p);
					let ctx_ptr: u64 = rd(frame, ctx);
					let handle = self.handle_via_ptr(pointer)?;
					let count = self.tsc_ref(handle)?.num_states();
					for index in 0..count {
						if self.exec.is_cancelled() {
							break;
						}
						let ts_ptr = ptr::thread_ptr(handle as u16, index as u16, 0);
						self.invoke(f, &[ctx_ptr, ts_ptr])?;
					}
				}
				Opcode::ThreadStateContainerFree => {
					let p = local!();
					advance!();
					let pointer: u64 = rd(frame, p);
					let handle = self.handle_via_ptr(pointer)?;
					let (count, fini_fn, ctx_ptr) = {
						let tsc = self.tsc_ref(handle)?;
						(tsc.num_states(), tsc.fini_fn(), tsc.ctx_ptr())
					};
					for index in 0..count {
						let ts_ptr = ptr::thread_ptr(handle as u16, index as u16, 0);
						self.invoke(fini_fn, &[ctx_ptr, ts_ptr])?;
					}
					self.free_object(handle)?;
					self.write_u64_at(pointer, 0)?;
				}
			}
		}
	}
}
