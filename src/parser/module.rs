//! The parsed-module representation consumed by the runtime.
//!
//! The decoder in [`crate::parser`] produces a [`Module`]; the execution
//! engine only ever reads it. Global initialisers and segment offsets are
//! already evaluated to plain values by the decoder, so the runtime never
//! interprets constant expressions itself.

use crate::runtime::Value;
use std::fmt;

/// The four WebAssembly MVP value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
}

impl ValueType {
    /// Decode a value-type byte (0x7f..0x7c).
    pub fn from_byte(byte: u8) -> Option<ValueType> {
        match byte {
            0x7f => Some(ValueType::I32),
            0x7e => Some(ValueType::I64),
            0x7d => Some(ValueType::F32),
            0x7c => Some(ValueType::F64),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::I32 => write!(f, "i32"),
            ValueType::I64 => write!(f, "i64"),
            ValueType::F32 => write!(f, "f32"),
            ValueType::F64 => write!(f, "f64"),
        }
    }
}

/// A function signature: parameter and result types.
///
/// `call_indirect` compares signatures structurally, so equality covers both
/// lists.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FuncType {
    pub params: Vec<ValueType>,
    pub results: Vec<ValueType>,
}

/// One run of same-typed locals in a function body's local declarations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalGroup {
    pub count: u32,
    pub ty: ValueType,
}

/// A defined function: signature reference, extra locals, raw code bytes.
///
/// `code` is the complete body expression including the terminating `end`
/// opcode; the runtime pre-indexes and then interprets these bytes in place.
#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub type_index: u32,
    pub locals: Vec<LocalGroup>,
    /// Total count of pure (non-parameter) locals across all groups.
    pub num_locals: u32,
    pub code: Vec<u8>,
}

/// The kind tag shared by imports and exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalKind {
    Function,
    Table,
    Memory,
    Global,
}

impl ExternalKind {
    pub fn from_byte(byte: u8) -> Option<ExternalKind> {
        match byte {
            0x00 => Some(ExternalKind::Function),
            0x01 => Some(ExternalKind::Table),
            0x02 => Some(ExternalKind::Memory),
            0x03 => Some(ExternalKind::Global),
            _ => None,
        }
    }
}

/// An import entry. The engine does not link imports; these are kept so the
/// index spaces (imports precede defined entities) stay correct.
#[derive(Debug, Clone)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub kind: ExternalKind,
}

/// An export entry.
#[derive(Debug, Clone)]
pub struct Export {
    pub name: String,
    pub kind: ExternalKind,
    pub index: u32,
}

/// Size limits for memories and tables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    pub min: u32,
    pub max: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
pub struct MemoryDecl {
    pub limits: Limits,
}

#[derive(Debug, Clone, Copy)]
pub struct TableDecl {
    pub limits: Limits,
}

/// A global with its pre-evaluated initial value.
///
/// Mutability is carried for completeness but not enforced at runtime; the
/// module is assumed validated.
#[derive(Debug, Clone)]
pub struct GlobalDecl {
    pub ty: ValueType,
    pub mutable: bool,
    pub init: Value,
}

/// An active data segment targeting memory 0.
#[derive(Debug, Clone)]
pub struct DataSegment {
    pub offset: u32,
    pub bytes: Vec<u8>,
}

/// An active element segment targeting table 0.
#[derive(Debug, Clone)]
pub struct ElementSegment {
    pub offset: u32,
    pub func_indices: Vec<u32>,
}

/// A fully decoded module.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub types: Vec<FuncType>,
    pub imports: Vec<Import>,
    /// Defined functions, in definition order. Function index space is
    /// imported functions first, then these.
    pub functions: Vec<FuncDecl>,
    pub tables: Vec<TableDecl>,
    pub memories: Vec<MemoryDecl>,
    pub globals: Vec<GlobalDecl>,
    pub exports: Vec<Export>,
    pub elements: Vec<ElementSegment>,
    pub data: Vec<DataSegment>,
    pub start: Option<u32>,
}

impl Module {
    pub fn new() -> Module {
        Module::default()
    }

    fn count_imports(&self, kind: ExternalKind) -> u32 {
        self.imports.iter().filter(|i| i.kind == kind).count() as u32
    }

    pub fn num_imported_functions(&self) -> u32 {
        self.count_imports(ExternalKind::Function)
    }

    pub fn num_imported_tables(&self) -> u32 {
        self.count_imports(ExternalKind::Table)
    }

    pub fn num_imported_memories(&self) -> u32 {
        self.count_imports(ExternalKind::Memory)
    }

    pub fn num_imported_globals(&self) -> u32 {
        self.count_imports(ExternalKind::Global)
    }

    /// Look up a signature by type index.
    pub fn signature(&self, type_index: u32) -> Option<&FuncType> {
        self.types.get(type_index as usize)
    }

    /// Look up a defined function by its position in the defined-function
    /// index space (i.e. after subtracting imported functions).
    pub fn function(&self, defined_index: u32) -> Option<&FuncDecl> {
        self.functions.get(defined_index as usize)
    }

    /// The signature of a defined function.
    pub fn func_type(&self, func: &FuncDecl) -> Option<&FuncType> {
        self.signature(func.type_index)
    }

    /// Find an export by name and kind.
    pub fn find_export(&self, name: &str, kind: ExternalKind) -> Option<&Export> {
        self.exports.iter().find(|e| e.name == name && e.kind == kind)
    }
}
