// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Machine-level tests over hand-assembled modules: the emitter writes
//! the stream, the interpreter runs it, no compiler involved.

mod common;

use common::TestDb;
use quarry_core::{EngineConfig, Value};
use quarry_vm::{
	BytecodeEmitter, BytecodeModule, ExecutionContext, FunctionInfo, Machine, Opcode, Operand,
};

use Operand::{Func, Imm8, Jump, Local, UImm1, UImm4};

fn module_of(
	emitter: BytecodeEmitter,
	functions: Vec<FunctionInfo>,
	column_lists: Vec<Vec<u32>>,
	state_size: usize,
) -> BytecodeModule {
	BytecodeModule::new(emitter.finish().unwrap(), functions, Vec::new(), column_lists, state_size)
}

fn run<const N: usize>(module: &BytecodeModule, name: &str, args: [u64; N]) -> u64 {
	let db = TestDb::new();
	let txn = db.manager.begin();
	let out = {
		let callback = Box::new(|_: &[Vec<Value>]| {});
		let mut exec = ExecutionContext::new(&db.catalog, &txn, EngineConfig::default(), callback);
		let mut machine = Machine::new(module, &mut exec);
		machine.invoke_by_name(name, &args).unwrap()
	};
	db.manager.commit(txn);
	out
}

/// Sum 1..=10 with a backward jump: the classic loop smoke test.
#[test]
fn loop_sums_first_ten_integers() {
	let mut e = BytecodeEmitter::new();
	// Frame: ret@0, i@8, acc@16, limit@24, one@32, cond@40.
	e.emit(Opcode::AssignImm8, &[Local(8), Imm8(1)]).unwrap();
	e.emit(Opcode::AssignImm8, &[Local(16), Imm8(0)]).unwrap();
	e.emit(Opcode::AssignImm8, &[Local(24), Imm8(10)]).unwrap();
	e.emit(Opcode::AssignImm8, &[Local(32), Imm8(1)]).unwrap();
	let start = e.new_label();
	let exit = e.new_label();
	e.bind_label(start).unwrap();
	e.emit(Opcode::LessThanEqualI64, &[Local(40), Local(8), Local(24)]).unwrap();
	e.emit(Opcode::JumpIfFalse, &[Local(40), Jump(exit)]).unwrap();
	e.emit(Opcode::AddI64, &[Local(16), Local(16), Local(8)]).unwrap();
	e.emit(Opcode::AddI64, &[Local(8), Local(8), Local(32)]).unwrap();
	e.emit(Opcode::Jump, &[Jump(start)]).unwrap();
	e.bind_label(exit).unwrap();
	e.emit(Opcode::Assign8, &[Local(0), Local(16)]).unwrap();
	e.emit(Opcode::Return, &[]).unwrap();

	let module = module_of(
		e,
		vec![FunctionInfo {
			name: "sum".into(),
			entry: 0,
			frame_size: 48,
			params: vec![],
			ret_offset: Some(0),
		}],
		Vec::new(),
		0,
	);
	assert_eq!(run(&module, "sum", []), 55);
}

/// Calls copy arguments into the callee frame; results flow back through
/// query state.
#[test]
fn call_and_state_round_trip() {
	let mut e = BytecodeEmitter::new();
	let mut functions = Vec::new();

	// double(ptr@0): store(ptr, deref(ptr) * 2)
	let entry = e.position();
	e.emit(Opcode::Deref8, &[Local(8), Local(0)]).unwrap();
	e.emit(Opcode::AddI64, &[Local(8), Local(8), Local(8)]).unwrap();
	e.emit(Opcode::Store8, &[Local(0), Local(8)]).unwrap();
	e.emit(Opcode::Return, &[]).unwrap();
	functions.push(FunctionInfo {
		name: "double".into(),
		entry,
		frame_size: 16,
		params: vec![0],
		ret_offset: None,
	});

	// main: state[0] = 21; double(&state[0]); ret = state[0]
	let entry = e.position();
	e.emit(Opcode::AssignImm8, &[Local(8), Imm8(quarry_vm::ptr::state_ptr(0) as i64)]).unwrap();
	e.emit(Opcode::AssignImm8, &[Local(16), Imm8(21)]).unwrap();
	e.emit(Opcode::Store8, &[Local(8), Local(16)]).unwrap();
	e.emit_function_call(0, &[8]).unwrap();
	e.emit(Opcode::Deref8, &[Local(24), Local(8)]).unwrap();
	e.emit(Opcode::Assign8, &[Local(0), Local(24)]).unwrap();
	e.emit(Opcode::Return, &[]).unwrap();
	functions.push(FunctionInfo {
		name: "main".into(),
		entry,
		frame_size: 32,
		params: vec![],
		ret_offset: Some(0),
	});

	let module = module_of(e, functions, Vec::new(), 8);
	assert_eq!(run(&module, "main", []), 42);
}

#[test]
fn lea_scaled_walks_an_array() {
	let mut e = BytecodeEmitter::new();
	// ret@0, row@8, idx@16, addr@24, val@32, tmp@40
	e.emit(Opcode::RowAlloc, &[Local(8), UImm4(64)]).unwrap();
	// row[i * 8] = i for i in 0..8, then sum them back.
	for i in 0..8i64 {
		e.emit(Opcode::AssignImm8, &[Local(16), Imm8(i)]).unwrap();
		e.emit(Opcode::LeaScaled, &[Local(24), Local(8), Local(16), UImm4(8), UImm4(0)])
			.unwrap();
		e.emit(Opcode::AssignImm8, &[Local(32), Imm8(i * 3)]).unwrap();
		e.emit(Opcode::Store8, &[Local(24), Local(32)]).unwrap();
	}
	e.emit(Opcode::AssignImm8, &[Local(0), Imm8(0)]).unwrap();
	for i in 0..8i64 {
		e.emit(Opcode::AssignImm8, &[Local(16), Imm8(i)]).unwrap();
		e.emit(Opcode::LeaScaled, &[Local(24), Local(8), Local(16), UImm4(8), UImm4(0)])
			.unwrap();
		e.emit(Opcode::Deref8, &[Local(40), Local(24)]).unwrap();
		e.emit(Opcode::AddI64, &[Local(0), Local(0), Local(40)]).unwrap();
	}
	e.emit(Opcode::Return, &[]).unwrap();

	let module = module_of(
		e,
		vec![FunctionInfo {
			name: "arr".into(),
			entry: 0,
			frame_size: 48,
			params: vec![],
			ret_offset: Some(0),
		}],
		Vec::new(),
		0,
	);
	// 3 * (0 + 1 + ... + 7)
	assert_eq!(run(&module, "arr", []), 84);
}

#[test]
fn disassembler_round_trips_names_and_jumps() {
	let mut e = BytecodeEmitter::new();
	let exit = e.new_label();
	e.emit(Opcode::AssignImm8, &[Local(0), Imm8(7)]).unwrap();
	e.emit(Opcode::JumpIfTrue, &[Local(0), Jump(exit)]).unwrap();
	e.emit(Opcode::AddI64, &[Local(0), Local(0), Local(0)]).unwrap();
	e.bind_label(exit).unwrap();
	e.emit(Opcode::Return, &[]).unwrap();

	let module = module_of(
		e,
		vec![FunctionInfo {
			name: "f".into(),
			entry: 0,
			frame_size: 8,
			params: vec![],
			ret_offset: Some(0),
		}],
		Vec::new(),
		0,
	);
	let listing = module.disassemble(0).unwrap();
	assert!(listing[0].contains("AssignImm8"));
	assert!(listing[1].contains("JumpIfTrue"));
	assert!(listing.iter().any(|l| l.contains("Return")));
}

/// Partitioned scan: block ranges fan out over thread states; each
/// worker counts its partition's tuples, an iterate pass folds the
/// per-thread counts into query state.
#[test]
fn parallel_scan_partitions_over_thread_states() {
	let mut e = BytecodeEmitter::new();
	let mut functions = Vec::new();

	// ts_init(ctx@0, ts@8): zeroed slices are fine as-is.
	let entry = e.position();
	e.emit(Opcode::Return, &[]).unwrap();
	functions.push(FunctionInfo {
		name: "ts_init".into(),
		entry,
		frame_size: 16,
		params: vec![0, 8],
		ret_offset: None,
	});

	// worker(qs@0, ts@8, tvi@16): count visible tuples into ts[0].
	let entry = e.position();
	let outer = e.new_label();
	let outer_exit = e.new_label();
	let inner = e.new_label();
	let inner_exit = e.new_label();
	e.bind_label(outer).unwrap();
	e.emit(Opcode::TableVectorIteratorNext, &[Local(24), Local(16)]).unwrap();
	e.emit(Opcode::JumpIfFalse, &[Local(24), Jump(outer_exit)]).unwrap();
	e.emit(Opcode::TableVectorIteratorGetPCI, &[Local(32), Local(16)]).unwrap();
	e.bind_label(inner).unwrap();
	e.emit(Opcode::PCIHasNextFiltered, &[Local(40), Local(32)]).unwrap();
	e.emit(Opcode::JumpIfFalse, &[Local(40), Jump(inner_exit)]).unwrap();
	e.emit(Opcode::Deref8, &[Local(48), Local(8)]).unwrap();
	e.emit(Opcode::AssignImm8, &[Local(56), Imm8(1)]).unwrap();
	e.emit(Opcode::AddI64, &[Local(48), Local(48), Local(56)]).unwrap();
	e.emit(Opcode::Store8, &[Local(8), Local(48)]).unwrap();
	e.emit(Opcode::PCIAdvanceFiltered, &[Local(32)]).unwrap();
	e.emit(Opcode::Jump, &[Jump(inner)]).unwrap();
	e.bind_label(inner_exit).unwrap();
	e.emit(Opcode::Jump, &[Jump(outer)]).unwrap();
	e.bind_label(outer_exit).unwrap();
	e.emit(Opcode::TableVectorIteratorFree, &[Local(16)]).unwrap();
	e.emit(Opcode::Return, &[]).unwrap();
	functions.push(FunctionInfo {
		name: "worker".into(),
		entry,
		frame_size: 64,
		params: vec![0, 8, 16],
		ret_offset: None,
	});

	// fold(ctx@0, ts@8): ctx[8] += ts[0]
	let entry = e.position();
	e.emit(Opcode::Deref8, &[Local(16), Local(8)]).unwrap();
	e.emit(Opcode::Lea, &[Local(24), Local(0), UImm4(8)]).unwrap();
	e.emit(Opcode::Deref8, &[Local(32), Local(24)]).unwrap();
	e.emit(Opcode::AddI64, &[Local(32), Local(32), Local(16)]).unwrap();
	e.emit(Opcode::Store8, &[Local(24), Local(32)]).unwrap();
	e.emit(Opcode::Return, &[]).unwrap();
	functions.push(FunctionInfo {
		name: "fold".into(),
		entry,
		frame_size: 40,
		params: vec![0, 8],
		ret_offset: None,
	});

	// driver: reset tsc, parallel scan test_1, fold counts, return total.
	let entry = e.position();
	e.emit(Opcode::AssignImm8, &[Local(8), Imm8(quarry_vm::ptr::state_ptr(0) as i64)]).unwrap();
	e.emit(Opcode::Lea, &[Local(16), Local(8), UImm4(0)]).unwrap();
	e.emit(
		Opcode::ThreadStateContainerReset,
		&[Local(16), UImm4(8), Func(0), Func(0), Local(8)],
	)
	.unwrap();
	e.emit(
		Opcode::ParallelScanTable,
		&[UImm4(1), UImm4(0), Local(8), Local(16), Func(1)],
	)
	.unwrap();
	e.emit(Opcode::ThreadStateContainerIterate, &[Local(16), Local(8), Func(2)]).unwrap();
	e.emit(Opcode::ThreadStateContainerFree, &[Local(16)]).unwrap();
	e.emit(Opcode::Lea, &[Local(24), Local(8), UImm4(8)]).unwrap();
	e.emit(Opcode::Deref8, &[Local(0), Local(24)]).unwrap();
	e.emit(Opcode::Return, &[]).unwrap();
	functions.push(FunctionInfo {
		name: "driver".into(),
		entry,
		frame_size: 32,
		params: vec![],
		ret_offset: Some(0),
	});

	let module = module_of(e, functions, vec![vec![1, 2]], 16);
	assert_eq!(run(&module, "driver", []), 1000);
}

/// The batched aggregation path: hash, key-check, init, and advance are
/// all supplied as function ids and run per filtered tuple.
#[test]
fn aggregation_process_batch_groups_a_batch() {
	let mut e = BytecodeEmitter::new();
	let mut functions = Vec::new();

	// hash_fn(pci@0) -> hash of col2
	let entry = e.position();
	e.emit(Opcode::PCIGetInteger, &[Local(8), Local(0), UImm4(1)]).unwrap();
	e.emit(Opcode::HashInt, &[Local(24), Local(8)]).unwrap();
	e.emit(Opcode::Assign8, &[Local(0), Local(24)]).unwrap();
	e.emit(Opcode::Return, &[]).unwrap();
	functions.push(FunctionInfo {
		name: "hash_fn".into(),
		entry,
		frame_size: 32,
		params: vec![0],
		ret_offset: Some(0),
	});

	// key_eq(entry@8, pci@24) -> entry key == col2  (ret bool @0)
	let entry = e.position();
	e.emit(Opcode::RowReadInteger, &[Local(32), Local(8), UImm4(0)]).unwrap();
	e.emit(Opcode::PCIGetInteger, &[Local(48), Local(24), UImm4(1)]).unwrap();
	e.emit(Opcode::EqualInteger, &[Local(64), Local(32), Local(48)]).unwrap();
	e.emit(Opcode::ForceBoolTruth, &[Local(0), Local(64)]).unwrap();
	e.emit(Opcode::Return, &[]).unwrap();
	functions.push(FunctionInfo {
		name: "key_eq".into(),
		entry,
		frame_size: 80,
		params: vec![8, 24],
		ret_offset: Some(0),
	});

	// init(entry@0, pci@8): write group key, init count aggregator.
	let entry = e.position();
	e.emit(Opcode::PCIGetInteger, &[Local(16), Local(8), UImm4(1)]).unwrap();
	e.emit(Opcode::RowWrite, &[Local(0), UImm4(0), Local(16)]).unwrap();
	e.emit(Opcode::Lea, &[Local(32), Local(0), UImm4(16)]).unwrap();
	e.emit(Opcode::AggregatorInit, &[UImm1(0), Local(32)]).unwrap();
	e.emit(Opcode::Return, &[]).unwrap();
	functions.push(FunctionInfo {
		name: "init".into(),
		entry,
		frame_size: 40,
		params: vec![0, 8],
		ret_offset: None,
	});

	// advance(entry@0, pci@8): count-star advance.
	let entry = e.position();
	e.emit(Opcode::Lea, &[Local(16), Local(0), UImm4(16)]).unwrap();
	e.emit(Opcode::InitInteger, &[Local(24), Imm8(0)]).unwrap();
	e.emit(Opcode::AggregatorAdvance, &[UImm1(0), Local(16), Local(24)]).unwrap();
	e.emit(Opcode::Return, &[]).unwrap();
	functions.push(FunctionInfo {
		name: "advance".into(),
		entry,
		frame_size: 40,
		params: vec![0, 8],
		ret_offset: None,
	});

	// driver: one refill of test_1 (batch 1024 >= 1000 rows), process,
	// count groups through the iterator.
	let entry = e.position();
	e.emit(Opcode::AssignImm8, &[Local(8), Imm8(quarry_vm::ptr::state_ptr(0) as i64)]).unwrap();
	e.emit(Opcode::AggregationHashTableInit, &[Local(8), UImm4(40)]).unwrap();
	e.emit(Opcode::TableVectorIteratorInit, &[Local(16), UImm4(1), UImm4(0)]).unwrap();
	e.emit(Opcode::TableVectorIteratorNext, &[Local(24), Local(16)]).unwrap();
	e.emit(Opcode::TableVectorIteratorGetPCI, &[Local(32), Local(16)]).unwrap();
	e.emit(
		Opcode::AggregationHashTableProcessBatch,
		&[Local(8), Local(32), Func(0), Func(1), Func(2), Func(3)],
	)
	.unwrap();
	// Count entries.
	e.emit(Opcode::AggregationHashTableIteratorInit, &[Local(40), Local(8)]).unwrap();
	let loop_start = e.new_label();
	let loop_exit = e.new_label();
	e.bind_label(loop_start).unwrap();
	e.emit(Opcode::AggregationHashTableIteratorHasNext, &[Local(48), Local(40)]).unwrap();
	e.emit(Opcode::JumpIfFalse, &[Local(48), Jump(loop_exit)]).unwrap();
	e.emit(Opcode::AssignImm8, &[Local(56), Imm8(1)]).unwrap();
	e.emit(Opcode::AddI64, &[Local(0), Local(0), Local(56)]).unwrap();
	e.emit(Opcode::AggregationHashTableIteratorNext, &[Local(40)]).unwrap();
	e.emit(Opcode::Jump, &[Jump(loop_start)]).unwrap();
	e.bind_label(loop_exit).unwrap();
	e.emit(Opcode::AggregationHashTableIteratorFree, &[Local(40)]).unwrap();
	e.emit(Opcode::TableVectorIteratorFree, &[Local(16)]).unwrap();
	e.emit(Opcode::AggregationHashTableFree, &[Local(8)]).unwrap();
	e.emit(Opcode::Return, &[]).unwrap();
	functions.push(FunctionInfo {
		name: "driver".into(),
		entry,
		frame_size: 64,
		params: vec![],
		ret_offset: Some(0),
	});

	let module = module_of(e, functions, vec![vec![1, 2]], 8);
	assert_eq!(run(&module, "driver", []), 10);
}
