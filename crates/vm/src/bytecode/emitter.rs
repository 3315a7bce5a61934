// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Bytecode emission with forward-patched jumps.
//!
//! Unresolved labels keep a list of patch sites; binding a label rewrites
//! each site with the signed 32-bit offset relative to the end of the
//! operand.

use crate::bytecode::{Opcode, OperandKind};
use crate::error::{Result, VmError};

/// A jump target. Created unbound, patched on bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(pub(crate) usize);

#[derive(Debug)]
enum LabelState {
	Unbound(Vec<usize>),
	Bound(usize),
}

/// One operand value, matched against the opcode's metadata at emit time
/// so the stream can never drift from the table.
#[derive(Debug, Clone, Copy)]
pub enum Operand {
	Local(u16),
	Imm1(i8),
	Imm2(i16),
	Imm4(i32),
	Imm8(i64),
	Imm4F(f32),
	Imm8F(f64),
	UImm1(u8),
	UImm4(u32),
	Jump(Label),
	Func(u16),
	Count(u16),
}

impl Operand {
	fn kind(&self) -> OperandKind {
		match self {
			Operand::Local(_) => OperandKind::Local,
			Operand::Imm1(_) => OperandKind::Imm1,
			Operand::Imm2(_) => OperandKind::Imm2,
			Operand::Imm4(_) => OperandKind::Imm4,
			Operand::Imm8(_) => OperandKind::Imm8,
			Operand::Imm4F(_) => OperandKind::Imm4F,
			Operand::Imm8F(_) => OperandKind::Imm8F,
			Operand::UImm1(_) => OperandKind::UImm1,
			Operand::UImm4(_) => OperandKind::UImm4,
			Operand::Jump(_) => OperandKind::JumpOffset,
			Operand::Func(_) => OperandKind::FunctionId,
			Operand::Count(_) => OperandKind::LocalCount,
		}
	}
}

#[derive(Debug, Default)]
pub struct BytecodeEmitter {
	code: Vec<u8>,
	labels: Vec<LabelState>,
}

impl BytecodeEmitter {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn position(&self) -> usize {
		self.code.len()
	}

	pub fn new_label(&mut self) -> Label {
		self.labels.push(LabelState::Unbound(Vec::new()));
		Label(self.labels.len() - 1)
	}

	/// Bind a label to the current position, rewriting every recorded
	/// site with its relative offset.
	pub fn bind_label(&mut self, label: Label) -> Result<()> {
		let target = self.code.len();
		match std::mem::replace(&mut self.labels[label.0], LabelState::Bound(target)) {
			LabelState::Unbound(sites) => {
				for site in sites {
					self.patch_jump(site, target)?;
				}
				Ok(())
			}
			LabelState::Bound(_) => {
				Err(VmError::Invariant("label bound twice".into()))
			}
		}
	}

	fn patch_jump(&mut self, site: usize, target: usize) -> Result<()> {
		let base = site + 4;
		let offset = target as i64 - base as i64;
		let offset = i32::try_from(offset)
			.map_err(|_| VmError::Invariant("jump offset exceeds 32 bits".into()))?;
		self.code[site..site + 4].copy_from_slice(&offset.to_le_bytes());
		Ok(())
	}

	fn emit_jump_site(&mut self, label: Label) -> Result<()> {
		let site = self.code.len();
		match &mut self.labels[label.0] {
			LabelState::Unbound(sites) => {
				sites.push(site);
				self.code.extend_from_slice(&0i32.to_le_bytes());
				Ok(())
			}
			LabelState::Bound(target) => {
				let target = *target;
				self.code.extend_from_slice(&0i32.to_le_bytes());
				self.patch_jump(site, target)
			}
		}
	}

	/// Emit one instruction. Operand kinds must match the opcode's
	/// metadata exactly; a mismatch is a lowering bug.
	pub fn emit(&mut self, opcode: Opcode, operands: &[Operand]) -> Result<()> {
		let info = opcode.info();
		if info.operands.len() != operands.len()
			|| info.operands.iter().zip(operands).any(|(kind, op)| *kind != op.kind())
		{
			return Err(VmError::Invariant(format!(
				"operand mismatch emitting {}",
				info.name
			)));
		}
		self.code.extend_from_slice(&(opcode as u16).to_le_bytes());
		for operand in operands {
			match operand {
				Operand::Local(v) | Operand::Func(v) | Operand::Count(v) => {
					self.code.extend_from_slice(&v.to_le_bytes());
				}
				Operand::Imm1(v) => self.code.push(*v as u8),
				Operand::UImm1(v) => self.code.push(*v),
				Operand::Imm2(v) => self.code.extend_from_slice(&v.to_le_bytes()),
				Operand::Imm4(v) => self.code.extend_from_slice(&v.to_le_bytes()),
				Operand::UImm4(v) => self.code.extend_from_slice(&v.to_le_bytes()),
				Operand::Imm8(v) => self.code.extend_from_slice(&v.to_le_bytes()),
				Operand::Imm4F(v) => self.code.extend_from_slice(&v.to_bits().to_le_bytes()),
				Operand::Imm8F(v) => self.code.extend_from_slice(&v.to_bits().to_le_bytes()),
				Operand::Jump(label) => self.emit_jump_site(*label)?,
			}
		}
		Ok(())
	}

	/// Emit a call with its trailing argument locals.
	pub fn emit_function_call(&mut self, function: u16, args: &[u16]) -> Result<()> {
		self.emit(Opcode::Call, &[Operand::Func(function), Operand::Count(args.len() as u16)])?;
		for arg in args {
			self.code.extend_from_slice(&arg.to_le_bytes());
		}
		Ok(())
	}

	/// Verify no label was left unbound, then hand out the stream.
	pub fn finish(self) -> Result<Vec<u8>> {
		for state in &self.labels {
			if let LabelState::Unbound(sites) = state {
				if !sites.is_empty() {
					return Err(VmError::Invariant("unbound label with patch sites".into()));
				}
			}
		}
		Ok(self.code)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn forward_patch_resolves_to_relative_offset() {
		let mut e = BytecodeEmitter::new();
		let label = e.new_label();
		e.emit(Opcode::Jump, &[Operand::Jump(label)]).unwrap();
		// Offset field sits right after the 2-byte opcode.
		e.emit(Opcode::Return, &[]).unwrap();
		e.bind_label(label).unwrap();
		let code = e.finish().unwrap();
		let offset = i32::from_le_bytes(code[2..6].try_into().unwrap());
		// Jump lands just past Return: site end is 6, target is 8.
		assert_eq!(offset, 2);
	}

	#[test]
	fn backward_jumps_are_negative() {
		let mut e = BytecodeEmitter::new();
		let label = e.new_label();
		e.bind_label(label).unwrap();
		e.emit(Opcode::Return, &[]).unwrap();
		e.emit(Opcode::Jump, &[Operand::Jump(label)]).unwrap();
		let code = e.finish().unwrap();
		let offset = i32::from_le_bytes(code[4..8].try_into().unwrap());
		assert_eq!(offset, -8);
	}

	#[test]
	fn operand_mismatch_is_rejected() {
		let mut e = BytecodeEmitter::new();
		assert!(e.emit(Opcode::Return, &[Operand::Local(0)]).is_err());
		assert!(e.emit(Opcode::AddI64, &[Operand::Local(0), Operand::Local(8)]).is_err());
	}
}
