//! Binary format decoder.
//!
//! Reads a `.wasm` byte stream into a [`module::Module`]. Only the MVP
//! grammar the engine consumes is supported: no extended proposals, active
//! data/element segments only, and constant initialiser expressions are
//! evaluated here so the runtime sees plain values.

pub mod module;
pub mod opcode;
pub mod reader;

use crate::runtime::Value;
use module::{
    DataSegment, ElementSegment, Export, ExternalKind, FuncDecl, FuncType, GlobalDecl, Import,
    Limits, LocalGroup, MemoryDecl, Module, TableDecl, ValueType,
};
use reader::{Reader, ReaderError};

const MAGIC: u32 = 0x6d73_6100; // "\0asm"
const VERSION: u32 = 1;

/// Errors produced while decoding a module. These are driver-level failures,
/// never guest traps.
#[derive(Debug, thiserror::Error)]
pub enum ParserError {
    #[error(transparent)]
    Read(#[from] ReaderError),
    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),
    #[error("unsupported version {0}")]
    BadVersion(u32),
    #[error("unknown section id {0}")]
    UnknownSection(u8),
    #[error("section id {id} declared {declared} bytes but used {used}")]
    SectionSizeMismatch { id: u8, declared: usize, used: usize },
    #[error("invalid value type byte {0:#04x}")]
    InvalidValueType(u8),
    #[error("invalid function type tag {0:#04x}")]
    InvalidFuncTypeTag(u8),
    #[error("invalid external kind {0:#04x}")]
    InvalidExternalKind(u8),
    #[error("invalid limits flag {0:#04x}")]
    InvalidLimits(u8),
    #[error("invalid element type {0:#04x}")]
    InvalidElemType(u8),
    #[error("type index {0} out of bounds")]
    TypeIndexOutOfBounds(u32),
    #[error("{functions} function declarations but {bodies} code bodies")]
    FunctionCountMismatch { functions: usize, bodies: usize },
    #[error("unsupported opcode {0:#04x} in constant expression")]
    UnsupportedConstExpr(u8),
    #[error("constant expression for {expected} evaluated to {actual}")]
    ConstExprTypeMismatch { expected: ValueType, actual: ValueType },
    #[error("only segments targeting index 0 are supported, got {0}")]
    UnsupportedSegmentTarget(u32),
}

/// Decode a complete binary module.
pub fn parse(bytes: &[u8]) -> Result<Module, ParserError> {
    let mut r = Reader::new(bytes);

    let magic = r.read_u32()?;
    if magic != MAGIC {
        return Err(ParserError::BadMagic(magic));
    }
    let version = r.read_u32()?;
    if version != VERSION {
        return Err(ParserError::BadVersion(version));
    }

    let mut module = Module::new();
    let mut declared_types: Vec<u32> = Vec::new();

    while !r.at_end() {
        let id = r.read_byte()?;
        let len = r.read_vu32()? as usize;
        if len > r.remaining() {
            return Err(ReaderError::UnexpectedEof(r.pos()).into());
        }
        let start = r.pos();

        match id {
            0 => {
                // Custom section: name + payload, both skipped.
                r.seek(start + len);
            }
            1 => read_type_section(&mut r, &mut module)?,
            2 => read_import_section(&mut r, &mut module)?,
            3 => read_function_section(&mut r, &module, &mut declared_types)?,
            4 => read_table_section(&mut r, &mut module)?,
            5 => read_memory_section(&mut r, &mut module)?,
            6 => read_global_section(&mut r, &mut module)?,
            7 => read_export_section(&mut r, &mut module)?,
            8 => module.start = Some(r.read_vu32()?),
            9 => read_element_section(&mut r, &mut module)?,
            10 => read_code_section(&mut r, &mut module, &declared_types)?,
            11 => read_data_section(&mut r, &mut module)?,
            other => return Err(ParserError::UnknownSection(other)),
        }

        let used = r.pos() - start;
        if used != len {
            return Err(ParserError::SectionSizeMismatch {
                id,
                declared: len,
                used,
            });
        }
    }

    if module.functions.len() != declared_types.len() {
        return Err(ParserError::FunctionCountMismatch {
            functions: declared_types.len(),
            bodies: module.functions.len(),
        });
    }

    Ok(module)
}

fn read_value_type(r: &mut Reader) -> Result<ValueType, ParserError> {
    let byte = r.read_byte()?;
    ValueType::from_byte(byte).ok_or(ParserError::InvalidValueType(byte))
}

fn read_limits(r: &mut Reader) -> Result<Limits, ParserError> {
    match r.read_byte()? {
        0x00 => Ok(Limits {
            min: r.read_vu32()?,
            max: None,
        }),
        0x01 => Ok(Limits {
            min: r.read_vu32()?,
            max: Some(r.read_vu32()?),
        }),
        flag => Err(ParserError::InvalidLimits(flag)),
    }
}

fn read_type_section(r: &mut Reader, module: &mut Module) -> Result<(), ParserError> {
    let count = r.read_vu32()?;
    for _ in 0..count {
        let tag = r.read_byte()?;
        if tag != 0x60 {
            return Err(ParserError::InvalidFuncTypeTag(tag));
        }
        let mut ty = FuncType::default();
        for _ in 0..r.read_vu32()? {
            ty.params.push(read_value_type(r)?);
        }
        for _ in 0..r.read_vu32()? {
            ty.results.push(read_value_type(r)?);
        }
        module.types.push(ty);
    }
    Ok(())
}

fn read_import_section(r: &mut Reader, module: &mut Module) -> Result<(), ParserError> {
    let count = r.read_vu32()?;
    for _ in 0..count {
        let import_module = r.read_name()?;
        let name = r.read_name()?;
        let kind_byte = r.read_byte()?;
        let kind =
            ExternalKind::from_byte(kind_byte).ok_or(ParserError::InvalidExternalKind(kind_byte))?;
        // The type payload must be consumed even though imports are never
        // linked; index spaces depend on the counts.
        match kind {
            ExternalKind::Function => {
                r.read_vu32()?;
            }
            ExternalKind::Table => {
                let elem = r.read_byte()?;
                if elem != 0x70 {
                    return Err(ParserError::InvalidElemType(elem));
                }
                read_limits(r)?;
            }
            ExternalKind::Memory => {
                read_limits(r)?;
            }
            ExternalKind::Global => {
                read_value_type(r)?;
                r.read_byte()?;
            }
        }
        module.imports.push(Import {
            module: import_module,
            name,
            kind,
        });
    }
    Ok(())
}

fn read_function_section(
    r: &mut Reader,
    module: &Module,
    declared_types: &mut Vec<u32>,
) -> Result<(), ParserError> {
    let count = r.read_vu32()?;
    for _ in 0..count {
        let type_index = r.read_vu32()?;
        if module.signature(type_index).is_none() {
            return Err(ParserError::TypeIndexOutOfBounds(type_index));
        }
        declared_types.push(type_index);
    }
    Ok(())
}

fn read_table_section(r: &mut Reader, module: &mut Module) -> Result<(), ParserError> {
    let count = r.read_vu32()?;
    for _ in 0..count {
        let elem = r.read_byte()?;
        if elem != 0x70 {
            return Err(ParserError::InvalidElemType(elem));
        }
        module.tables.push(TableDecl {
            limits: read_limits(r)?,
        });
    }
    Ok(())
}

fn read_memory_section(r: &mut Reader, module: &mut Module) -> Result<(), ParserError> {
    let count = r.read_vu32()?;
    for _ in 0..count {
        module.memories.push(MemoryDecl {
            limits: read_limits(r)?,
        });
    }
    Ok(())
}

/// Evaluate a constant initialiser expression to a single value.
fn eval_const_expr(r: &mut Reader) -> Result<Value, ParserError> {
    let op = r.read_byte()?;
    let value = match op {
        opcode::I32_CONST => Value::I32(r.read_vs32()?),
        opcode::I64_CONST => Value::I64(r.read_vs64()?),
        opcode::F32_CONST => Value::F32(r.read_f32()?),
        opcode::F64_CONST => Value::F64(r.read_f64()?),
        other => return Err(ParserError::UnsupportedConstExpr(other)),
    };
    let end = r.read_byte()?;
    if end != opcode::END {
        return Err(ParserError::UnsupportedConstExpr(end));
    }
    Ok(value)
}

/// Evaluate a segment offset expression, which must be an i32 constant.
fn eval_offset_expr(r: &mut Reader) -> Result<u32, ParserError> {
    match eval_const_expr(r)? {
        Value::I32(v) => Ok(v as u32),
        other => Err(ParserError::ConstExprTypeMismatch {
            expected: ValueType::I32,
            actual: other.typ(),
        }),
    }
}

fn read_global_section(r: &mut Reader, module: &mut Module) -> Result<(), ParserError> {
    let count = r.read_vu32()?;
    for _ in 0..count {
        let ty = read_value_type(r)?;
        let mutable = r.read_byte()? != 0;
        let init = eval_const_expr(r)?;
        if init.typ() != ty {
            return Err(ParserError::ConstExprTypeMismatch {
                expected: ty,
                actual: init.typ(),
            });
        }
        module.globals.push(GlobalDecl { ty, mutable, init });
    }
    Ok(())
}

fn read_export_section(r: &mut Reader, module: &mut Module) -> Result<(), ParserError> {
    let count = r.read_vu32()?;
    for _ in 0..count {
        let name = r.read_name()?;
        let kind_byte = r.read_byte()?;
        let kind =
            ExternalKind::from_byte(kind_byte).ok_or(ParserError::InvalidExternalKind(kind_byte))?;
        let index = r.read_vu32()?;
        module.exports.push(Export { name, kind, index });
    }
    Ok(())
}

fn read_element_section(r: &mut Reader, module: &mut Module) -> Result<(), ParserError> {
    let count = r.read_vu32()?;
    for _ in 0..count {
        let table_index = r.read_vu32()?;
        if table_index != 0 {
            return Err(ParserError::UnsupportedSegmentTarget(table_index));
        }
        let offset = eval_offset_expr(r)?;
        let mut func_indices = Vec::new();
        for _ in 0..r.read_vu32()? {
            func_indices.push(r.read_vu32()?);
        }
        module.elements.push(ElementSegment {
            offset,
            func_indices,
        });
    }
    Ok(())
}

fn read_code_section(
    r: &mut Reader,
    module: &mut Module,
    declared_types: &[u32],
) -> Result<(), ParserError> {
    let count = r.read_vu32()? as usize;
    if count != declared_types.len() {
        return Err(ParserError::FunctionCountMismatch {
            functions: declared_types.len(),
            bodies: count,
        });
    }
    for type_index in declared_types {
        let body_size = r.read_vu32()? as usize;
        let body_start = r.pos();

        let mut locals = Vec::new();
        let mut num_locals: u32 = 0;
        for _ in 0..r.read_vu32()? {
            let group_count = r.read_vu32()?;
            let ty = read_value_type(r)?;
            num_locals = num_locals.saturating_add(group_count);
            locals.push(LocalGroup {
                count: group_count,
                ty,
            });
        }

        let locals_size = r.pos() - body_start;
        if locals_size > body_size {
            return Err(ReaderError::UnexpectedEof(r.pos()).into());
        }
        let code = r.read_bytes(body_size - locals_size)?.to_vec();

        module.functions.push(FuncDecl {
            type_index: *type_index,
            locals,
            num_locals,
            code,
        });
    }
    Ok(())
}

fn read_data_section(r: &mut Reader, module: &mut Module) -> Result<(), ParserError> {
    let count = r.read_vu32()?;
    for _ in 0..count {
        let memory_index = r.read_vu32()?;
        if memory_index != 0 {
            return Err(ParserError::UnsupportedSegmentTarget(memory_index));
        }
        let offset = eval_offset_expr(r)?;
        let len = r.read_vu32()? as usize;
        let bytes = r.read_bytes(len)?.to_vec();
        module.data.push(DataSegment { offset, bytes });
    }
    Ok(())
}
