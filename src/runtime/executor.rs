//! The virtual machine: setup, reset, instruction dispatch and result
//! printing.
//!
//! A [`Vm`] binds to one module and owns all mutable runtime state. `run`
//! resets that state, coerces the textual arguments to the entry signature,
//! drives the dispatch loop until the call stack empties, and prints the
//! results (or a single `!trap` line when execution trapped).

use super::control::{ControlMap, Label, LabelKind};
use super::frame::Frame;
use super::ops;
use super::stack::Stack;
use super::{EngineError, Memory, Table, Trap, Value, VmError};
use crate::parser::module::{ExternalKind, Module};
use crate::parser::opcode;
use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;

/// Maximum call stack depth.
const MAX_CALL_DEPTH: usize = 1000;

/// The execution engine for one module.
pub struct Vm<'m> {
    module: &'m Module,
    stack: Stack,
    call_stack: Vec<Frame<'m>>,
    memory: Memory,
    tables: Vec<Table>,
    globals: Vec<Value>,
    /// Control maps by defined-function index, built on first call.
    ctrl_maps: HashMap<u32, Rc<ControlMap>>,
    /// Defined-function index of the exported `main`, resolved once.
    main: Option<u32>,
    /// Cached layout constants, used to rebuild state on each run.
    initial_pages: u32,
    table_sizes: Vec<u32>,
}

impl<'m> Vm<'m> {
    /// Bind a VM to a module. Nothing is allocated until [`Vm::run`].
    pub fn new(module: &'m Module) -> Self {
        let num_imported = module.num_imported_functions();
        let main = module
            .find_export("main", ExternalKind::Function)
            .and_then(|e| e.index.checked_sub(num_imported))
            .filter(|&i| module.function(i).is_some());

        let initial_pages = module.memories.first().map(|m| m.limits.min).unwrap_or(0);
        let table_sizes = module.tables.iter().map(|t| t.limits.min).collect();

        Vm {
            module,
            stack: Stack::new(),
            call_stack: Vec::new(),
            memory: Memory::new(0),
            tables: Vec::new(),
            globals: Vec::new(),
            ctrl_maps: HashMap::new(),
            main,
            initial_pages,
            table_sizes,
        }
    }

    /// Execute `main` with the given arguments, printing results to stdout.
    pub fn run(&mut self, args: &[String]) -> Result<(), EngineError> {
        let stdout = io::stdout();
        self.run_with_output(args, &mut stdout.lock())
    }

    /// Execute `main` and write the result lines (or `!trap`) to `out`.
    pub fn run_with_output(
        &mut self,
        args: &[String],
        out: &mut dyn Write,
    ) -> Result<(), EngineError> {
        match self.invoke_main(args) {
            Ok(results) => {
                for value in results {
                    match value {
                        Value::I32(v) => writeln!(out, "{v}")?,
                        Value::I64(v) => writeln!(out, "{v}")?,
                        Value::F32(v) => writeln!(out, "{v:.6}")?,
                        Value::F64(v) => writeln!(out, "{v:.6}")?,
                    }
                }
                Ok(())
            }
            Err(VmError::Trap(_)) => {
                writeln!(out, "!trap")?;
                Ok(())
            }
            Err(VmError::Engine(err)) => Err(err),
        }
    }

    /// Execute `main` with the given arguments and return its results.
    ///
    /// Runtime state is fully reset first, so repeated invocations are
    /// independent.
    pub fn invoke_main(&mut self, args: &[String]) -> Result<Vec<Value>, VmError> {
        let main = self.main.ok_or(EngineError::NoMainFunction)?;
        self.reset()?;

        let module = self.module;
        let func = module.function(main).ok_or(EngineError::NoMainFunction)?;
        let sig = module.func_type(func).ok_or(EngineError::NoMainFunction)?;
        if args.len() != sig.params.len() {
            return Err(EngineError::MainArgCount {
                expected: sig.params.len(),
                provided: args.len(),
            }
            .into());
        }
        for (index, (arg, ty)) in args.iter().zip(&sig.params).enumerate() {
            let value = Value::parse_arg(*ty, arg).ok_or_else(|| EngineError::InvalidArgument {
                index,
                ty: *ty,
                value: arg.clone(),
            })?;
            self.stack.push(value);
        }
        let result_arity = sig.results.len();

        self.invoke(main)?;

        if self.stack.height() != result_arity {
            return Err(EngineError::ResultCount {
                expected: result_arity,
                actual: self.stack.height(),
            }
            .into());
        }
        Ok(self.stack.peek_top(result_arity)?)
    }

    /// Rebuild all runtime state from the module.
    fn reset(&mut self) -> Result<(), EngineError> {
        self.stack.clear();
        self.call_stack.clear();
        self.ctrl_maps.clear();

        self.memory = Memory::new(self.initial_pages);
        for segment in &self.module.data {
            if !self.memory.init(segment.offset, &segment.bytes) {
                return Err(EngineError::DataSegmentOutOfBounds {
                    offset: segment.offset,
                    len: segment.bytes.len(),
                });
            }
        }

        self.tables = self.table_sizes.iter().map(|&size| Table::new(size)).collect();
        self.globals = self.module.globals.iter().map(|g| g.init).collect();

        let imported_functions = self.module.num_imported_functions();
        for segment in &self.module.elements {
            // Active segments target table 0; imported tables cannot be
            // populated without linking.
            if self.module.num_imported_tables() > 0 {
                return Err(EngineError::ImportedTableInit);
            }
            let table = self
                .tables
                .first_mut()
                .ok_or(EngineError::ElementSegmentMissingTable)?;
            for (i, &func_index) in segment.func_indices.iter().enumerate() {
                let defined = func_index
                    .checked_sub(imported_functions)
                    .filter(|&d| self.module.function(d).is_some())
                    .ok_or(EngineError::ElementFunctionOutOfBounds(func_index))?;
                let slot = segment.offset as u64 + i as u64;
                if slot > u32::MAX as u64 || !table.set(slot as u32, defined) {
                    return Err(EngineError::ElementSegmentOutOfBounds {
                        offset: segment.offset,
                    });
                }
            }
        }

        Ok(())
    }

    /// Drive the dispatch loop until the call stack is empty.
    fn invoke(&mut self, defined_index: u32) -> Result<(), VmError> {
        self.push_frame(defined_index)?;
        while !self.call_stack.is_empty() {
            self.step()?;
        }
        Ok(())
    }

    /// Push a frame for a defined function, popping its parameters from the
    /// operand stack into locals.
    fn push_frame(&mut self, defined_index: u32) -> Result<(), VmError> {
        if self.call_stack.len() >= MAX_CALL_DEPTH {
            return Err(Trap::CallStackExhausted.into());
        }
        let module = self.module;
        let func = module
            .function(defined_index)
            .ok_or(Trap::FunctionIndexOutOfBounds(defined_index))?;
        let sig = module
            .func_type(func)
            .ok_or(Trap::TypeIndexOutOfBounds(func.type_index))?;

        let ctrl = match self.ctrl_maps.get(&defined_index) {
            Some(map) => Rc::clone(map),
            None => {
                let map = Rc::new(ControlMap::build(&func.code)?);
                self.ctrl_maps.insert(defined_index, Rc::clone(&map));
                map
            }
        };

        // Parameters leave the stack in reverse order: top of stack becomes
        // the last parameter.
        let mut locals = vec![Value::I32(0); sig.params.len()];
        for (i, ty) in sig.params.iter().enumerate().rev() {
            locals[i] = self.stack.pop_typed(*ty)?;
        }
        for group in &func.locals {
            for _ in 0..group.count {
                locals.push(Value::zero(group.ty));
            }
        }

        let entry_height = self.stack.height();
        let mut frame = Frame::new(&func.code, locals, entry_height, sig.results.len(), ctrl);
        frame.labels.push(Label {
            kind: LabelKind::Implicit,
            pc_target: frame.ctrl.body_end(),
            pc_else: None,
            stack_height: entry_height,
        });
        self.call_stack.push(frame);
        Ok(())
    }

    /// Pop the L labels above the branch target, restore the target's stack
    /// height, and jump. The target label itself stays: a loop target serves
    /// the next iteration, a block/if target is closed by the `end` opcode
    /// the jump lands on.
    fn branch(frame: &mut Frame, stack: &mut Stack, depth: u32) -> Result<(), Trap> {
        let target = frame.branch_target(depth)?;
        stack.trim_to(target.stack_height);
        frame.pc.seek(target.pc_target);
        Ok(())
    }

    /// Close the innermost label. Closing the last one returns from the
    /// function; otherwise the operand stack is restored to the region's
    /// entry height (blocks in this subset carry no results).
    fn exec_end(&mut self) -> Result<(), VmError> {
        let frame = self.call_stack.last_mut().ok_or(Trap::EndWithoutLabel)?;
        let closed = frame.labels.pop().ok_or(Trap::EndWithoutLabel)?;
        if frame.labels.is_empty() {
            self.return_from_function()
        } else {
            self.stack.trim_to(closed.stack_height);
            Ok(())
        }
    }

    /// Snapshot the current function's results, restore the caller's operand
    /// stack, pop the frame and push the results back in order.
    fn return_from_function(&mut self) -> Result<(), VmError> {
        let frame = self.call_stack.last().ok_or(Trap::EndWithoutLabel)?;
        let arity = frame.result_arity;
        let entry_height = frame.entry_height;
        if self.stack.height() < entry_height + arity {
            return Err(Trap::StackUnderflow.into());
        }
        let results = self.stack.peek_top(arity)?;
        self.stack.trim_to(entry_height);
        self.call_stack.pop();
        for value in results {
            self.stack.push(value);
        }
        Ok(())
    }

    fn call_indirect(&mut self, type_index: u32, table_index: u32) -> Result<(), VmError> {
        let element = self.stack.pop_i32()?;
        if element < 0 {
            return Err(Trap::ElementIndexOutOfBounds(element as u32).into());
        }
        let imported_tables = self.module.num_imported_tables();
        if table_index < imported_tables {
            return Err(Trap::ImportedTableAccess(table_index).into());
        }
        let table = self
            .tables
            .get((table_index - imported_tables) as usize)
            .ok_or(Trap::TableIndexOutOfBounds(table_index))?;
        let slot = table.get(element as u32)?;
        let target = slot.ok_or(Trap::NullTableElement(element as u32))?;

        let expected = self
            .module
            .signature(type_index)
            .ok_or(Trap::TypeIndexOutOfBounds(type_index))?;
        let func = self
            .module
            .function(target)
            .ok_or(Trap::FunctionIndexOutOfBounds(target))?;
        let actual = self
            .module
            .func_type(func)
            .ok_or(Trap::TypeIndexOutOfBounds(func.type_index))?;
        if expected != actual {
            return Err(Trap::IndirectCallTypeMismatch.into());
        }
        self.push_frame(target)
    }

    /// Decode and execute one instruction of the current frame.
    fn step(&mut self) -> Result<(), VmError> {
        let Some(frame) = self.call_stack.last_mut() else {
            return Ok(());
        };
        if frame.pc.at_end() {
            return Err(Trap::CodeOverrun.into());
        }
        let header = frame.pc.pos();
        let op = frame.pc.read_byte()?;

        match op {
            opcode::NOP => {}
            opcode::UNREACHABLE => return Err(Trap::Unreachable.into()),

            // Constants
            opcode::I32_CONST => {
                let v = frame.pc.read_vs32()?;
                self.stack.push(Value::I32(v));
            }
            opcode::I64_CONST => {
                let v = frame.pc.read_vs64()?;
                self.stack.push(Value::I64(v));
            }
            opcode::F32_CONST => {
                let v = frame.pc.read_f32()?;
                self.stack.push(Value::F32(v));
            }
            opcode::F64_CONST => {
                let v = frame.pc.read_f64()?;
                self.stack.push(Value::F64(v));
            }

            // Locals and globals
            opcode::LOCAL_GET => {
                let index = frame.pc.read_vu32()?;
                let value = *frame
                    .locals
                    .get(index as usize)
                    .ok_or(Trap::LocalIndexOutOfBounds(index))?;
                self.stack.push(value);
            }
            opcode::LOCAL_SET => {
                let index = frame.pc.read_vu32()?;
                let value = self.stack.pop()?;
                let slot = frame
                    .locals
                    .get_mut(index as usize)
                    .ok_or(Trap::LocalIndexOutOfBounds(index))?;
                *slot = value;
            }
            opcode::LOCAL_TEE => {
                let index = frame.pc.read_vu32()?;
                let value = self.stack.pop()?;
                let slot = frame
                    .locals
                    .get_mut(index as usize)
                    .ok_or(Trap::LocalIndexOutOfBounds(index))?;
                *slot = value;
                self.stack.push(value);
            }
            opcode::GLOBAL_GET => {
                let index = frame.pc.read_vu32()?;
                let value = *self
                    .globals
                    .get(index as usize)
                    .ok_or(Trap::GlobalIndexOutOfBounds(index))?;
                self.stack.push(value);
            }
            opcode::GLOBAL_SET => {
                let index = frame.pc.read_vu32()?;
                let value = self.stack.pop()?;
                let slot = self
                    .globals
                    .get_mut(index as usize)
                    .ok_or(Trap::GlobalIndexOutOfBounds(index))?;
                *slot = value;
            }

            // Structured control
            opcode::BLOCK => {
                let block_type = frame.pc.read_byte()?;
                if block_type != opcode::EMPTY_BLOCK_TYPE {
                    return Err(Trap::UnsupportedBlockType(block_type).into());
                }
                let meta = *frame.ctrl.get(header).ok_or(Trap::CodeOverrun)?;
                frame.labels.push(Label {
                    kind: LabelKind::Block,
                    pc_target: meta.end_pc,
                    pc_else: None,
                    stack_height: self.stack.height(),
                });
            }
            opcode::LOOP => {
                let block_type = frame.pc.read_byte()?;
                if block_type != opcode::EMPTY_BLOCK_TYPE {
                    return Err(Trap::UnsupportedBlockType(block_type).into());
                }
                // Branches to a loop jump back to the first body byte.
                frame.labels.push(Label {
                    kind: LabelKind::Loop,
                    pc_target: frame.pc.pos(),
                    pc_else: None,
                    stack_height: self.stack.height(),
                });
            }
            opcode::IF => {
                let block_type = frame.pc.read_byte()?;
                if block_type != opcode::EMPTY_BLOCK_TYPE {
                    return Err(Trap::UnsupportedBlockType(block_type).into());
                }
                let meta = *frame.ctrl.get(header).ok_or(Trap::CodeOverrun)?;
                // The recorded height still includes the condition, which
                // lets the region's one result (if any) survive the trim at
                // its `end`.
                frame.labels.push(Label {
                    kind: LabelKind::If,
                    pc_target: meta.end_pc,
                    pc_else: meta.else_pc,
                    stack_height: self.stack.height(),
                });
                let condition = self.stack.pop_i32()?;
                if condition == 0 {
                    frame.pc.seek(meta.else_pc.unwrap_or(meta.end_pc));
                }
            }
            opcode::ELSE => {
                // Reached only by falling out of a then-arm: jump to the
                // region's end and close its label.
                let label = *frame.labels.last().ok_or(Trap::ElseWithoutIf)?;
                if label.kind != LabelKind::If {
                    return Err(Trap::ElseWithoutIf.into());
                }
                frame.pc.seek(label.pc_target);
                frame.labels.pop();
            }
            opcode::END => self.exec_end()?,
            opcode::RETURN => self.return_from_function()?,

            // Branches
            opcode::BR => {
                let depth = frame.pc.read_vu32()?;
                Self::branch(frame, &mut self.stack, depth)?;
            }
            opcode::BR_IF => {
                let depth = frame.pc.read_vu32()?;
                let condition = self.stack.pop_i32()?;
                if condition != 0 {
                    Self::branch(frame, &mut self.stack, depth)?;
                }
            }
            opcode::BR_TABLE => {
                let count = frame.pc.read_vu32()?;
                let mut targets = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    targets.push(frame.pc.read_vu32()?);
                }
                let default = frame.pc.read_vu32()?;
                let index = self.stack.pop_i32()? as u32;
                let depth = targets.get(index as usize).copied().unwrap_or(default);
                Self::branch(frame, &mut self.stack, depth)?;
            }

            // Calls
            opcode::CALL => {
                let index = frame.pc.read_vu32()?;
                let imported = self.module.num_imported_functions();
                if index < imported {
                    return Err(Trap::ImportedFunctionCall(index).into());
                }
                self.push_frame(index - imported)?;
            }
            opcode::CALL_INDIRECT => {
                let type_index = frame.pc.read_vu32()?;
                let table_index = frame.pc.read_vu32()?;
                self.call_indirect(type_index, table_index)?;
            }

            // Parametric
            opcode::DROP => ops::parametric::drop(&mut self.stack)?,
            opcode::SELECT => ops::parametric::select(&mut self.stack)?,

            // Memory
            opcode::I32_LOAD
            | opcode::I64_LOAD
            | opcode::F32_LOAD
            | opcode::F64_LOAD
            | opcode::I32_LOAD8_S
            | opcode::I32_LOAD8_U
            | opcode::I32_LOAD16_S
            | opcode::I32_LOAD16_U
            | opcode::I32_STORE
            | opcode::I64_STORE
            | opcode::F32_STORE
            | opcode::F64_STORE
            | opcode::I32_STORE8
            | opcode::I32_STORE16 => {
                let _align = frame.pc.read_vu32()?;
                let offset = frame.pc.read_vu32()?;
                let stack = &mut self.stack;
                match op {
                    opcode::I32_LOAD => ops::memory::i32_load(stack, &self.memory, offset)?,
                    opcode::I64_LOAD => ops::memory::i64_load(stack, &self.memory, offset)?,
                    opcode::F32_LOAD => ops::memory::f32_load(stack, &self.memory, offset)?,
                    opcode::F64_LOAD => ops::memory::f64_load(stack, &self.memory, offset)?,
                    opcode::I32_LOAD8_S => ops::memory::i32_load8_s(stack, &self.memory, offset)?,
                    opcode::I32_LOAD8_U => ops::memory::i32_load8_u(stack, &self.memory, offset)?,
                    opcode::I32_LOAD16_S => ops::memory::i32_load16_s(stack, &self.memory, offset)?,
                    opcode::I32_LOAD16_U => ops::memory::i32_load16_u(stack, &self.memory, offset)?,
                    opcode::I32_STORE => ops::memory::i32_store(stack, &mut self.memory, offset)?,
                    opcode::I64_STORE => ops::memory::i64_store(stack, &mut self.memory, offset)?,
                    opcode::F32_STORE => ops::memory::f32_store(stack, &mut self.memory, offset)?,
                    opcode::F64_STORE => ops::memory::f64_store(stack, &mut self.memory, offset)?,
                    opcode::I32_STORE8 => ops::memory::i32_store8(stack, &mut self.memory, offset)?,
                    _ => ops::memory::i32_store16(stack, &mut self.memory, offset)?,
                }
            }

            // Comparisons
            opcode::I32_EQZ => ops::comparison::i32_eqz(&mut self.stack)?,
            opcode::I32_EQ => ops::comparison::i32_eq(&mut self.stack)?,
            opcode::I32_NE => ops::comparison::i32_ne(&mut self.stack)?,
            opcode::I32_LT_S => ops::comparison::i32_lt_s(&mut self.stack)?,
            opcode::I32_LT_U => ops::comparison::i32_lt_u(&mut self.stack)?,
            opcode::I32_GT_S => ops::comparison::i32_gt_s(&mut self.stack)?,
            opcode::I32_GT_U => ops::comparison::i32_gt_u(&mut self.stack)?,
            opcode::I32_LE_S => ops::comparison::i32_le_s(&mut self.stack)?,
            opcode::I32_LE_U => ops::comparison::i32_le_u(&mut self.stack)?,
            opcode::I32_GE_S => ops::comparison::i32_ge_s(&mut self.stack)?,
            opcode::I32_GE_U => ops::comparison::i32_ge_u(&mut self.stack)?,
            opcode::I64_EQZ => ops::comparison::i64_eqz(&mut self.stack)?,
            opcode::I64_EQ => ops::comparison::i64_eq(&mut self.stack)?,
            opcode::I64_NE => ops::comparison::i64_ne(&mut self.stack)?,
            opcode::I64_LT_S => ops::comparison::i64_lt_s(&mut self.stack)?,
            opcode::F64_EQ => ops::comparison::f64_eq(&mut self.stack)?,
            opcode::F64_NE => ops::comparison::f64_ne(&mut self.stack)?,
            opcode::F64_LT => ops::comparison::f64_lt(&mut self.stack)?,
            opcode::F64_GT => ops::comparison::f64_gt(&mut self.stack)?,
            opcode::F64_LE => ops::comparison::f64_le(&mut self.stack)?,
            opcode::F64_GE => ops::comparison::f64_ge(&mut self.stack)?,

            // Arithmetic
            opcode::I32_ADD => ops::numeric::i32_add(&mut self.stack)?,
            opcode::I32_SUB => ops::numeric::i32_sub(&mut self.stack)?,
            opcode::I32_MUL => ops::numeric::i32_mul(&mut self.stack)?,
            opcode::I32_DIV_S => ops::numeric::i32_div_s(&mut self.stack)?,
            opcode::I32_DIV_U => ops::numeric::i32_div_u(&mut self.stack)?,
            opcode::I32_REM_S => ops::numeric::i32_rem_s(&mut self.stack)?,
            opcode::I32_REM_U => ops::numeric::i32_rem_u(&mut self.stack)?,
            opcode::I32_AND => ops::numeric::i32_and(&mut self.stack)?,
            opcode::I32_OR => ops::numeric::i32_or(&mut self.stack)?,
            opcode::I32_XOR => ops::numeric::i32_xor(&mut self.stack)?,
            opcode::I32_SHL => ops::numeric::i32_shl(&mut self.stack)?,
            opcode::I32_SHR_S => ops::numeric::i32_shr_s(&mut self.stack)?,
            opcode::I32_SHR_U => ops::numeric::i32_shr_u(&mut self.stack)?,
            opcode::I64_ADD => ops::numeric::i64_add(&mut self.stack)?,
            opcode::I64_SUB => ops::numeric::i64_sub(&mut self.stack)?,
            opcode::I64_MUL => ops::numeric::i64_mul(&mut self.stack)?,
            opcode::F32_ADD => ops::numeric::f32_add(&mut self.stack)?,
            opcode::F32_SUB => ops::numeric::f32_sub(&mut self.stack)?,
            opcode::F32_MUL => ops::numeric::f32_mul(&mut self.stack)?,
            opcode::F32_DIV => ops::numeric::f32_div(&mut self.stack)?,
            opcode::F64_ADD => ops::numeric::f64_add(&mut self.stack)?,
            opcode::F64_SUB => ops::numeric::f64_sub(&mut self.stack)?,
            opcode::F64_MUL => ops::numeric::f64_mul(&mut self.stack)?,
            opcode::F64_DIV => ops::numeric::f64_div(&mut self.stack)?,

            other => return Err(Trap::UnsupportedOpcode(other).into()),
        }
        Ok(())
    }
}
