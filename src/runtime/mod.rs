//! The execution engine.
//!
//! This module provides the stack machine that runs a parsed module: value
//! representation, operand stack, linear memory, tables, control-flow
//! pre-indexing, call frames and the instruction dispatcher.

pub mod control;
pub mod executor;
pub mod frame;
pub mod memory;
pub mod ops;
pub mod stack;
pub mod table;
pub mod test_utils;
pub mod value;

pub use control::{ControlMap, Label, LabelKind};
pub use executor::Vm;
pub use memory::Memory;
pub use stack::Stack;
pub use table::Table;
pub use value::Value;

use crate::parser::module::ValueType;
use crate::parser::reader::ReaderError;

/// A guest-level runtime error. Any `Trap` terminates the current run and is
/// surfaced on stdout as a single `!trap` line.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Trap {
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: ValueType,
        actual: ValueType,
    },
    #[error("local index {0} out of bounds")]
    LocalIndexOutOfBounds(u32),
    #[error("global index {0} out of bounds")]
    GlobalIndexOutOfBounds(u32),
    #[error("function index {0} out of bounds")]
    FunctionIndexOutOfBounds(u32),
    #[error("type index {0} out of bounds")]
    TypeIndexOutOfBounds(u32),
    #[error("branch label {0} out of bounds")]
    LabelIndexOutOfBounds(u32),
    #[error("table index {0} out of bounds")]
    TableIndexOutOfBounds(u32),
    #[error("table element {0} out of bounds")]
    ElementIndexOutOfBounds(u32),
    #[error("uninitialized table element {0}")]
    NullTableElement(u32),
    #[error("indirect call signature mismatch")]
    IndirectCallTypeMismatch,
    #[error("cannot call imported function {0}")]
    ImportedFunctionCall(u32),
    #[error("cannot access imported table {0}")]
    ImportedTableAccess(u32),
    #[error("out of bounds memory access at address {addr} width {width}")]
    MemoryOutOfBounds { addr: u64, width: u32 },
    #[error("negative memory address {0}")]
    NegativeAddress(i32),
    #[error("integer divide by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    IntegerOverflow,
    #[error("unreachable executed")]
    Unreachable,
    #[error("unsupported opcode {0:#04x}")]
    UnsupportedOpcode(u8),
    #[error("unsupported block type {0:#04x}")]
    UnsupportedBlockType(u8),
    #[error("else without matching if")]
    ElseWithoutIf,
    #[error("end with no active label")]
    EndWithoutLabel,
    #[error("program counter ran past end of code")]
    CodeOverrun,
    #[error("call stack exhausted")]
    CallStackExhausted,
}

impl From<ReaderError> for Trap {
    fn from(_: ReaderError) -> Trap {
        Trap::CodeOverrun
    }
}

/// A driver-level failure: something went wrong before, after or outside the
/// execution of guest code. Reported to the caller, never printed as `!trap`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("module does not export a main function")]
    NoMainFunction,
    #[error("main takes {expected} arguments, but {provided} were provided")]
    MainArgCount { expected: usize, provided: usize },
    #[error("argument {index} ({value:?}) is not a valid {ty}")]
    InvalidArgument {
        index: usize,
        ty: ValueType,
        value: String,
    },
    #[error("data segment at offset {offset} ({len} bytes) does not fit in linear memory")]
    DataSegmentOutOfBounds { offset: u32, len: usize },
    #[error("element segment at offset {offset} exceeds table bounds")]
    ElementSegmentOutOfBounds { offset: u32 },
    #[error("element segment references function {0} which does not exist")]
    ElementFunctionOutOfBounds(u32),
    #[error("element segments into imported tables are unsupported")]
    ImportedTableInit,
    #[error("element segment references a missing table")]
    ElementSegmentMissingTable,
    #[error("else without matching if at offset {0}")]
    PreIndexElse(usize),
    #[error("end without matching header at offset {0}")]
    PreIndexEnd(usize),
    #[error("unclosed structured header at offset {0}")]
    PreIndexUnclosed(usize),
    #[error("code truncated at offset {0}")]
    PreIndexTruncated(usize),
    #[error("operand stack holds {actual} values but main returns {expected}")]
    ResultCount { expected: usize, actual: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The sum of both failure categories, as produced by the dispatcher. The
/// driver splits it: traps print `!trap`, engine errors are reported.
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Trap(#[from] Trap),
}

impl From<ReaderError> for VmError {
    fn from(err: ReaderError) -> VmError {
        VmError::Trap(Trap::from(err))
    }
}
