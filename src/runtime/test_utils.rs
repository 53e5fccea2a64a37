//! Builders for assembling modules and function bodies in tests and benches.
//!
//! Bodies are emitted as raw code bytes, the same form the decoder produces,
//! so tests exercise the real pre-indexing and dispatch paths.

use crate::parser::module::{
    DataSegment, ElementSegment, Export, ExternalKind, FuncDecl, FuncType, GlobalDecl, Limits,
    LocalGroup, MemoryDecl, Module, TableDecl, ValueType,
};
use crate::parser::opcode;
use crate::runtime::{Value, Vm};

fn write_vu32(buf: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

fn write_vs64(buf: &mut Vec<u8>, mut value: i64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let sign_clear = byte & 0x40 == 0;
        if (value == 0 && sign_clear) || (value == -1 && !sign_clear) {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Fluent builder for one function body's code bytes.
#[derive(Debug, Default)]
pub struct BodyBuilder {
    bytes: Vec<u8>,
}

impl BodyBuilder {
    pub fn new() -> Self {
        BodyBuilder::default()
    }

    /// Append a bare opcode byte.
    pub fn op(mut self, op: u8) -> Self {
        self.bytes.push(op);
        self
    }

    pub fn i32_const(mut self, value: i32) -> Self {
        self.bytes.push(opcode::I32_CONST);
        write_vs64(&mut self.bytes, i64::from(value));
        self
    }

    pub fn i64_const(mut self, value: i64) -> Self {
        self.bytes.push(opcode::I64_CONST);
        write_vs64(&mut self.bytes, value);
        self
    }

    pub fn f32_const(mut self, value: f32) -> Self {
        self.bytes.push(opcode::F32_CONST);
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn f64_const(mut self, value: f64) -> Self {
        self.bytes.push(opcode::F64_CONST);
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    fn with_index(mut self, op: u8, index: u32) -> Self {
        self.bytes.push(op);
        write_vu32(&mut self.bytes, index);
        self
    }

    pub fn local_get(self, index: u32) -> Self {
        self.with_index(opcode::LOCAL_GET, index)
    }

    pub fn local_set(self, index: u32) -> Self {
        self.with_index(opcode::LOCAL_SET, index)
    }

    pub fn local_tee(self, index: u32) -> Self {
        self.with_index(opcode::LOCAL_TEE, index)
    }

    pub fn global_get(self, index: u32) -> Self {
        self.with_index(opcode::GLOBAL_GET, index)
    }

    pub fn global_set(self, index: u32) -> Self {
        self.with_index(opcode::GLOBAL_SET, index)
    }

    pub fn block(mut self) -> Self {
        self.bytes.push(opcode::BLOCK);
        self.bytes.push(opcode::EMPTY_BLOCK_TYPE);
        self
    }

    pub fn loop_(mut self) -> Self {
        self.bytes.push(opcode::LOOP);
        self.bytes.push(opcode::EMPTY_BLOCK_TYPE);
        self
    }

    pub fn if_(mut self) -> Self {
        self.bytes.push(opcode::IF);
        self.bytes.push(opcode::EMPTY_BLOCK_TYPE);
        self
    }

    pub fn else_(self) -> Self {
        self.op(opcode::ELSE)
    }

    pub fn end(self) -> Self {
        self.op(opcode::END)
    }

    pub fn br(self, depth: u32) -> Self {
        self.with_index(opcode::BR, depth)
    }

    pub fn br_if(self, depth: u32) -> Self {
        self.with_index(opcode::BR_IF, depth)
    }

    pub fn br_table(mut self, targets: &[u32], default: u32) -> Self {
        self.bytes.push(opcode::BR_TABLE);
        write_vu32(&mut self.bytes, targets.len() as u32);
        for target in targets {
            write_vu32(&mut self.bytes, *target);
        }
        write_vu32(&mut self.bytes, default);
        self
    }

    pub fn call(self, func_index: u32) -> Self {
        self.with_index(opcode::CALL, func_index)
    }

    pub fn call_indirect(mut self, type_index: u32, table_index: u32) -> Self {
        self.bytes.push(opcode::CALL_INDIRECT);
        write_vu32(&mut self.bytes, type_index);
        write_vu32(&mut self.bytes, table_index);
        self
    }

    /// Any load or store opcode with its align/offset immediates.
    pub fn mem_op(mut self, op: u8, align: u32, offset: u32) -> Self {
        self.bytes.push(op);
        write_vu32(&mut self.bytes, align);
        write_vu32(&mut self.bytes, offset);
        self
    }

    /// Terminate the body with the function-level `end` and return the bytes.
    pub fn finish(mut self) -> Vec<u8> {
        self.bytes.push(opcode::END);
        self.bytes
    }

    /// Return the bytes as-is, without a terminating `end`.
    pub fn into_raw(self) -> Vec<u8> {
        self.bytes
    }
}

/// Fluent builder for a whole module.
///
/// Type and function indices are assigned in insertion order; tests track
/// them by position.
#[derive(Debug, Default)]
pub struct ModuleBuilder {
    module: Module,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        ModuleBuilder::default()
    }

    pub fn sig(mut self, params: &[ValueType], results: &[ValueType]) -> Self {
        self.module.types.push(FuncType {
            params: params.to_vec(),
            results: results.to_vec(),
        });
        self
    }

    pub fn func(mut self, type_index: u32, locals: &[(u32, ValueType)], code: Vec<u8>) -> Self {
        let num_locals = locals.iter().map(|(count, _)| *count).sum();
        self.module.functions.push(FuncDecl {
            type_index,
            locals: locals
                .iter()
                .map(|(count, ty)| LocalGroup {
                    count: *count,
                    ty: *ty,
                })
                .collect(),
            num_locals,
            code,
        });
        self
    }

    pub fn export_func(mut self, name: &str, func_index: u32) -> Self {
        self.module.exports.push(Export {
            name: name.to_string(),
            kind: ExternalKind::Function,
            index: func_index,
        });
        self
    }

    pub fn export_main(self, func_index: u32) -> Self {
        self.export_func("main", func_index)
    }

    pub fn memory(mut self, pages: u32) -> Self {
        self.module.memories.push(MemoryDecl {
            limits: Limits {
                min: pages,
                max: None,
            },
        });
        self
    }

    pub fn table(mut self, size: u32) -> Self {
        self.module.tables.push(TableDecl {
            limits: Limits {
                min: size,
                max: None,
            },
        });
        self
    }

    pub fn global(mut self, mutable: bool, init: Value) -> Self {
        self.module.globals.push(GlobalDecl {
            ty: init.typ(),
            mutable,
            init,
        });
        self
    }

    pub fn data(mut self, offset: u32, bytes: &[u8]) -> Self {
        self.module.data.push(DataSegment {
            offset,
            bytes: bytes.to_vec(),
        });
        self
    }

    pub fn elem(mut self, offset: u32, func_indices: &[u32]) -> Self {
        self.module.elements.push(ElementSegment {
            offset,
            func_indices: func_indices.to_vec(),
        });
        self
    }

    pub fn build(self) -> Module {
        self.module
    }
}

/// Run a module's `main` with the given textual arguments and capture stdout.
pub fn run_to_string(module: &Module, args: &[&str]) -> String {
    let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    let mut out = Vec::new();
    let mut vm = Vm::new(module);
    vm.run_with_output(&args, &mut out).expect("engine error");
    String::from_utf8(out).expect("output is UTF-8")
}
