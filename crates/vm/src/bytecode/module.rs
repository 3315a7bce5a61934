// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! The compiled bytecode module: immutable opcode stream, constant
//! pools, and the function table.

use std::collections::HashMap;

use crate::bytecode::{BytecodeReader, OperandKind};
use crate::error::{Result, VmError};

#[derive(Debug, Clone)]
pub struct FunctionInfo {
	pub name: String,
	/// Entry offset into the code stream.
	pub entry: usize,
	/// Frame size in bytes.
	pub frame_size: usize,
	/// Byte offsets of the parameters, in declaration order.
	pub params: Vec<u16>,
	/// Offset of the return slot, when the function returns a value.
	pub ret_offset: Option<u16>,
}

/// Immutable after lowering.
pub struct BytecodeModule {
	code: Vec<u8>,
	functions: Vec<FunctionInfo>,
	by_name: HashMap<String, u16>,
	strings: Vec<String>,
	column_lists: Vec<Vec<u32>>,
	state_size: usize,
}

impl BytecodeModule {
	pub fn new(
		code: Vec<u8>,
		functions: Vec<FunctionInfo>,
		strings: Vec<String>,
		column_lists: Vec<Vec<u32>>,
		state_size: usize,
	) -> Self {
		let by_name = functions
			.iter()
			.enumerate()
			.map(|(i, f)| (f.name.clone(), i as u16))
			.collect();
		Self { code, functions, by_name, strings, column_lists, state_size }
	}

	pub fn code(&self) -> &[u8] {
		&self.code
	}

	pub fn state_size(&self) -> usize {
		self.state_size
	}

	pub fn functions(&self) -> &[FunctionInfo] {
		&self.functions
	}

	pub fn function(&self, id: u16) -> Result<&FunctionInfo> {
		self.functions
			.get(id as usize)
			.ok_or(VmError::UnknownFunctionId(id))
	}

	pub fn function_id(&self, name: &str) -> Result<u16> {
		self.by_name
			.get(name)
			.copied()
			.ok_or_else(|| VmError::UnknownFunction(name.to_string()))
	}

	pub fn string(&self, id: u32) -> Result<&str> {
		self.strings
			.get(id as usize)
			.map(String::as_str)
			.ok_or_else(|| VmError::Invariant(format!("string constant {} out of range", id)))
	}

	pub fn column_list(&self, id: u32) -> Result<&[u32]> {
		self.column_lists
			.get(id as usize)
			.map(Vec::as_slice)
			.ok_or_else(|| VmError::Invariant(format!("column list constant {} out of range", id)))
	}

	/// Render one function's instructions, used by tests and debugging.
	pub fn disassemble(&self, id: u16) -> Result<Vec<String>> {
		let info = self.function(id)?;
		let end = self
			.functions
			.iter()
			.map(|f| f.entry)
			.filter(|e| *e > info.entry)
			.min()
			.unwrap_or(self.code.len());

		let mut out = Vec::new();
		let mut reader = BytecodeReader::new(&self.code);
		reader.set_position(info.entry);
		while reader.position() < end {
			let at = reader.position();
			let opcode = reader
				.read_opcode()
				.ok_or(VmError::InvalidBytecode { position: at })?;
			let mut line = format!("{:6} {}", at, opcode.name());
			for kind in opcode.info().operands {
				let rendered = match kind {
					OperandKind::Local => format!("l{}", read(&mut reader, 2)?),
					OperandKind::Imm1 | OperandKind::UImm1 => format!("{}", read(&mut reader, 1)?),
					OperandKind::Imm2 => format!("{}", read(&mut reader, 2)?),
					OperandKind::Imm4 | OperandKind::UImm4 => format!("{}", read(&mut reader, 4)?),
					OperandKind::Imm8 => format!("{}", read(&mut reader, 8)?),
					OperandKind::Imm4F => format!(
						"{}",
						reader.read_f32().ok_or(VmError::UnexpectedEndOfBytecode)?
					),
					OperandKind::Imm8F => format!(
						"{}",
						reader.read_f64().ok_or(VmError::UnexpectedEndOfBytecode)?
					),
					OperandKind::JumpOffset => {
						let offset =
							reader.read_i32().ok_or(VmError::UnexpectedEndOfBytecode)?;
						format!("-> {}", (reader.position() as i64 + offset as i64))
					}
					OperandKind::FunctionId => {
						let fid = reader.read_u16().ok_or(VmError::UnexpectedEndOfBytecode)?;
						format!("fn#{}", fid)
					}
					OperandKind::LocalCount => {
						let count =
							reader.read_u16().ok_or(VmError::UnexpectedEndOfBytecode)?;
						let mut args = Vec::new();
						for _ in 0..count {
							args.push(format!(
								"l{}",
								reader.read_u16()
									.ok_or(VmError::UnexpectedEndOfBytecode)?
							));
						}
						format!("({})", args.join(", "))
					}
				};
				line.push(' ');
				line.push_str(&rendered);
			}
			out.push(line);
		}
		Ok(out)
	}
}

fn read(reader: &mut BytecodeReader<'_>, size: usize) -> Result<i64> {
	let value = match size {
		1 => reader.read_u8().map(|v| v as i64),
		2 => reader.read_u16().map(|v| v as i64),
		4 => reader.read_u32().map(|v| v as i64),
		8 => reader.read_i64(),
		_ => None,
	};
	value.ok_or(VmError::UnexpectedEndOfBytecode)
}
