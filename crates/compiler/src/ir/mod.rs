// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! The typed intermediate program.
//!
//! All nodes live in one per-query arena and reference each other through
//! typed indices; nothing owns a pointer into the tree. The arena is
//! dropped with the query.

pub use builder::FunctionBuilder;

mod builder;

/// Types an IR expression or local can carry.
///
/// Primitives and handles occupy one 8-byte frame slot; SQL values carry a
/// null flag and tag and occupy 16 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrType {
	Bool,
	Int8,
	Int16,
	Int32,
	Int64,
	UInt8,
	UInt16,
	UInt32,
	UInt64,
	Float32,
	Float64,

	SqlBool,
	SqlInt,
	SqlReal,
	SqlDate,
	SqlString,

	StatePtr,
	RowPtr,
	ExecCtx,

	Tvi,
	Pci,
	FilterManager,
	AggHashTable,
	AggHashTableIter,
	JoinHashTable,
	JoinHashTableIter,
	Sorter,
	SorterIter,
	IndexIter,
	ThreadStates,

	Nil,
}

impl IrType {
	pub fn frame_size(&self) -> usize {
		match self {
			IrType::SqlBool | IrType::SqlInt | IrType::SqlReal | IrType::SqlDate | IrType::SqlString => 16,
			IrType::Nil => 0,
			_ => 8,
		}
	}

	pub fn is_sql(&self) -> bool {
		matches!(
			self,
			IrType::SqlBool | IrType::SqlInt | IrType::SqlReal | IrType::SqlDate | IrType::SqlString
		)
	}

	pub fn is_primitive_int(&self) -> bool {
		matches!(
			self,
			IrType::Int8
				| IrType::Int16 | IrType::Int32
				| IrType::Int64 | IrType::UInt8
				| IrType::UInt16 | IrType::UInt32
				| IrType::UInt64
		)
	}

	pub fn is_primitive_float(&self) -> bool {
		matches!(self, IrType::Float32 | IrType::Float64)
	}
}

macro_rules! define_id {
	($name:ident) => {
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
		pub struct $name(pub u32);

		impl $name {
			pub fn index(self) -> usize {
				self.0 as usize
			}
		}
	};
}

define_id!(ExprId);
define_id!(StmtId);
define_id!(LocalId);
define_id!(FuncId);
define_id!(StrId);
define_id!(U32ListId);

/// Binary operators over primitive values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
	Add,
	Sub,
	Mul,
	Div,
	Rem,
	BitAnd,
	BitOr,
	BitXor,
	Lt,
	Le,
	Gt,
	Ge,
	Eq,
	Ne,
	And,
	Or,
}

impl BinOp {
	pub fn is_comparison(&self) -> bool {
		matches!(self, BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne)
	}

	pub fn is_logical(&self) -> bool {
		matches!(self, BinOp::And | BinOp::Or)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
	Neg,
	Not,
	BitNot,
}

/// Aggregator kinds, shared with the runtime by ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggKind {
	CountStar = 0,
	Count = 1,
	SumInt = 2,
	MaxInt = 3,
	MinInt = 4,
	SumReal = 5,
	MaxReal = 6,
	MinReal = 7,
	Avg = 8,
}

impl AggKind {
	/// Bytes one aggregator occupies in an aggregation payload.
	pub const STATE_SIZE: usize = 24;

	pub fn result_type(&self) -> IrType {
		match self {
			AggKind::SumReal | AggKind::MaxReal | AggKind::MinReal | AggKind::Avg => IrType::SqlReal,
			_ => IrType::SqlInt,
		}
	}

	pub fn from_ordinal(ordinal: u8) -> Option<AggKind> {
		Some(match ordinal {
			0 => AggKind::CountStar,
			1 => AggKind::Count,
			2 => AggKind::SumInt,
			3 => AggKind::MaxInt,
			4 => AggKind::MinInt,
			5 => AggKind::SumReal,
			6 => AggKind::MaxReal,
			7 => AggKind::MinReal,
			8 => AggKind::Avg,
			_ => return None,
		})
	}
}

#[derive(Debug, Clone)]
pub enum ExprKind {
	IntLit(i64),
	FloatLit(f64),
	BoolLit(bool),
	/// Interned string literal (becomes a constant-pool entry).
	StrLit(StrId),
	/// Interned u32 list (column projections, becomes a pool entry).
	U32ListLit(U32ListId),
	/// Reference to an emitted function.
	FuncLit(FuncId),
	Local(LocalId),
	/// Address of a query-state field: the state pointer local plus a
	/// fixed byte offset.
	StateField { base: LocalId, offset: u32, ty: IrType },
	Binary { op: BinOp, lhs: ExprId, rhs: ExprId },
	Unary { op: UnOp, operand: ExprId },
	Call { builtin: Builtin, args: Vec<ExprId> },
}

#[derive(Debug, Clone)]
pub enum StmtKind {
	Expr(ExprId),
	/// Assign into a local or through a scalar state field.
	Assign { dst: ExprId, src: ExprId },
	If { cond: ExprId, then_block: Vec<StmtId>, else_block: Vec<StmtId> },
	Loop { body: Vec<StmtId> },
	Break,
	Return(Option<ExprId>),
}

#[derive(Debug, Clone)]
pub struct Local {
	pub name: String,
	pub ty: IrType,
}

#[derive(Debug, Clone)]
pub struct Function {
	pub name: String,
	pub params: Vec<LocalId>,
	pub ret: IrType,
	pub locals: Vec<Local>,
	pub body: Vec<StmtId>,
}

/// The per-query arena holding every IR node.
#[derive(Debug, Default)]
pub struct IrArena {
	pub exprs: Vec<ExprKind>,
	pub stmts: Vec<StmtKind>,
	pub strings: Vec<String>,
	pub u32_lists: Vec<Vec<u32>>,
	pub functions: Vec<Function>,
}

impl IrArena {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn expr(&mut self, kind: ExprKind) -> ExprId {
		self.exprs.push(kind);
		ExprId(self.exprs.len() as u32 - 1)
	}

	pub fn stmt(&mut self, kind: StmtKind) -> StmtId {
		self.stmts.push(kind);
		StmtId(self.stmts.len() as u32 - 1)
	}

	pub fn intern_string(&mut self, value: impl Into<String>) -> StrId {
		let value = value.into();
		if let Some(idx) = self.strings.iter().position(|s| *s == value) {
			return StrId(idx as u32);
		}
		self.strings.push(value);
		StrId(self.strings.len() as u32 - 1)
	}

	pub fn intern_u32_list(&mut self, value: Vec<u32>) -> U32ListId {
		if let Some(idx) = self.u32_lists.iter().position(|l| *l == value) {
			return U32ListId(idx as u32);
		}
		self.u32_lists.push(value);
		U32ListId(self.u32_lists.len() as u32 - 1)
	}

	/// Declare a function up front so forward references by id work; the
	/// body is filled in by a `FunctionBuilder`.
	pub fn declare_function(&mut self, name: impl Into<String>, ret: IrType) -> FuncId {
		self.functions.push(Function {
			name: name.into(),
			params: Vec::new(),
			ret,
			locals: Vec::new(),
			body: Vec::new(),
		});
		FuncId(self.functions.len() as u32 - 1)
	}

	pub fn function(&self, id: FuncId) -> &Function {
		&self.functions[id.index()]
	}
}

/// Runtime primitives callable from emitted code. Each lowers to exactly
/// one opcode; immediate-kind arguments must be literals, `lval` ones
/// must name a local the runtime writes a handle into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
	// Execution context
	ExecAborted,
	TxnAbort,

	// Table vector iterator
	TviInit,
	TviNext,
	TviGetPci,
	TviClose,
	ParallelScanTable,

	// Projected-columns iterator
	PciHasNext,
	PciHasNextFiltered,
	PciAdvance,
	PciAdvanceFiltered,
	PciMatch,
	PciReset,
	PciResetFiltered,
	PciGetBool,
	PciGetInt,
	PciGetReal,
	PciGetDate,
	PciGetString,
	PciGetSlot,

	// Filter manager
	FmInit,
	FmStartNewClause,
	FmInsertFlavor,
	FmFinalize,
	FmRunFilters,
	FmFree,

	// SQL value construction and inspection
	InitSqlInt,
	InitSqlBool,
	InitSqlReal,
	InitSqlDate,
	InitSqlString,
	InitSqlIntNull,
	InitSqlBoolNull,
	InitSqlRealNull,
	InitSqlDateNull,
	InitSqlStringNull,
	BoolToSql,
	ForceTruth,
	SqlIsNull,
	SqlIsNotNull,
	SqlIntToReal,

	// SQL arithmetic and comparison
	SqlAdd,
	SqlSub,
	SqlMul,
	SqlDiv,
	SqlRem,
	SqlCmpLt,
	SqlCmpLe,
	SqlCmpGt,
	SqlCmpGe,
	SqlCmpEq,
	SqlCmpNe,

	// SQL scalar library
	SqlAbs,
	SqlSqrt,
	SqlExp,
	SqlLn,
	SqlFloor,
	SqlCeil,
	SqlSin,
	SqlCos,
	SqlTan,
	SqlLower,
	SqlUpper,
	SqlLength,

	// Hashing
	HashVal,
	HashCombine,

	// Aggregation hash table
	AggHtInit,
	AggHtFree,
	AggHtLookup,
	AggHtInsert,
	AggHtProcessBatch,
	AggHtMovePartitions,
	AggHtParallelPartScan,
	AggHtIterInit,
	AggHtIterHasNext,
	AggHtIterNext,
	AggHtIterGetRow,
	AggHtIterFree,

	// Aggregators
	AggInit,
	AggAdvance,
	AggMerge,
	AggResult,

	// Join hash table
	JhtInit,
	JhtFree,
	JhtAllocTuple,
	JhtBuild,
	JhtBuildParallel,
	JhtIterInit,
	JhtIterHasNext,
	JhtIterGetRow,

	// Sorter
	SorterInit,
	SorterFree,
	SorterAllocTuple,
	SorterAllocTupleTopK,
	SorterAllocTupleTopKFinish,
	SorterSort,
	SorterSortParallel,
	SorterSortTopKParallel,
	SorterIterInit,
	SorterIterHasNext,
	SorterIterNext,
	SorterIterGetRow,

	// Pointers
	PtrIsNull,
	PtrIsNotNull,
	PtrOffset,
	/// The base address of the query-state buffer.
	StateBase,

	// Row arena
	RowAlloc,
	RowWrite,
	RowReadBool,
	RowReadInt,
	RowReadReal,
	RowReadDate,
	RowReadString,

	// Output buffer
	OutputAlloc,
	OutputAdvance,
	OutputFinalize,

	// Table DML
	TableInsert,
	TableUpdate,
	TableDelete,

	// Index
	IndexInsert,
	IndexIterInit,
	IndexIterScanKey,
	IndexIterScanRange,
	IndexIterAdvance,
	IndexIterGetBool,
	IndexIterGetInt,
	IndexIterGetReal,
	IndexIterGetDate,
	IndexIterGetString,
	IndexIterFree,

	// Thread state container
	TscReset,
	TscIterate,
	TscFree,

	// Emitted-function calls
	CallFn,
}
