//! Structured control flow: labels and branch-target pre-indexing.
//!
//! Before a function first executes, its code bytes are scanned once and
//! every structured header (`block`, `loop`, `if`) is mapped to its matching
//! `else`/`end` addresses. Branches then execute in O(1): the target of a
//! block or if is the address of its `end` opcode, whose execution performs
//! the label closure; the target of a loop is the first byte after the loop
//! header.

use super::{EngineError, Trap, VmError};
use crate::parser::opcode;
use crate::parser::reader::Reader;
use std::collections::HashMap;

/// What kind of structured region a label belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    /// The implicit label around the whole function body. Closing it returns
    /// from the function.
    Implicit,
    Block,
    Loop,
    If,
}

/// One active structured region inside a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Label {
    pub kind: LabelKind,
    /// Branch destination: the matching `end` opcode for blocks and ifs, the
    /// first body byte for loops.
    pub pc_target: usize,
    /// For `if` labels, the first byte after the matching `else`.
    pub pc_else: Option<usize>,
    /// Operand-stack height recorded when the region was entered.
    pub stack_height: usize,
}

/// Pre-indexed addresses for one structured header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CtrlMeta {
    pub kind: LabelKind,
    /// First byte after the matching `else`, when the header is an `if` with
    /// an else arm.
    pub else_pc: Option<usize>,
    /// Address of the matching `end` opcode.
    pub end_pc: usize,
}

/// The per-function control map: one entry per structured header, keyed by
/// the byte offset of the header opcode, plus the address of the `end` that
/// closes the function body itself.
///
/// The body entry is stored apart from the header entries so a structured
/// header at offset 0 cannot collide with it.
#[derive(Debug)]
pub struct ControlMap {
    headers: HashMap<usize, CtrlMeta>,
    body_end: usize,
}

struct OpenCtrl {
    /// Header opcode offset; `None` for the implicit function-body entry.
    header: Option<usize>,
    kind: LabelKind,
    else_pc: Option<usize>,
}

impl ControlMap {
    /// Scan a function body and record every header's `else`/`end` address.
    ///
    /// A non-empty block type is a guest trap (it would also trap when
    /// executed); unbalanced structure or truncated immediates are malformed
    /// input and reported as engine errors.
    pub fn build(code: &[u8]) -> Result<ControlMap, VmError> {
        let mut headers = HashMap::new();
        let mut body_end = None;
        let mut open = vec![OpenCtrl {
            header: None,
            kind: LabelKind::Implicit,
            else_pc: None,
        }];

        let mut r = Reader::new(code);
        while !r.at_end() {
            let at = r.pos();
            let op = r.read_byte().map_err(|_| EngineError::PreIndexTruncated(at))?;
            match op {
                opcode::BLOCK | opcode::LOOP | opcode::IF => {
                    let block_type = r
                        .read_byte()
                        .map_err(|_| EngineError::PreIndexTruncated(at))?;
                    if block_type != opcode::EMPTY_BLOCK_TYPE {
                        return Err(Trap::UnsupportedBlockType(block_type).into());
                    }
                    let kind = match op {
                        opcode::BLOCK => LabelKind::Block,
                        opcode::LOOP => LabelKind::Loop,
                        _ => LabelKind::If,
                    };
                    open.push(OpenCtrl {
                        header: Some(at),
                        kind,
                        else_pc: None,
                    });
                }
                opcode::ELSE => {
                    match open.last_mut() {
                        Some(entry) if entry.kind == LabelKind::If => {
                            // The else arm starts right after the opcode byte.
                            entry.else_pc = Some(r.pos());
                        }
                        _ => return Err(EngineError::PreIndexElse(at).into()),
                    }
                }
                opcode::END => {
                    let entry = open.pop().ok_or(EngineError::PreIndexEnd(at))?;
                    match entry.header {
                        Some(header) => {
                            headers.insert(
                                header,
                                CtrlMeta {
                                    kind: entry.kind,
                                    else_pc: entry.else_pc,
                                    end_pc: at,
                                },
                            );
                        }
                        None => body_end = Some(at),
                    }
                }
                other => {
                    skip_immediates(other, &mut r)
                        .map_err(|_| EngineError::PreIndexTruncated(at))?;
                }
            }
        }

        if let Some(entry) = open.last() {
            return Err(EngineError::PreIndexUnclosed(entry.header.unwrap_or(0)).into());
        }
        let body_end = body_end.ok_or(EngineError::PreIndexUnclosed(0))?;

        Ok(ControlMap { headers, body_end })
    }

    /// The pre-indexed addresses for the header at the given offset.
    pub fn get(&self, header: usize) -> Option<&CtrlMeta> {
        self.headers.get(&header)
    }

    /// Address of the `end` opcode that closes the function body.
    pub fn body_end(&self) -> usize {
        self.body_end
    }
}

/// Advance the cursor past an opcode's immediates so the scan stays aligned
/// with opcode boundaries. Opcodes without immediates (including ones the
/// dispatcher does not implement) need no skipping.
fn skip_immediates(op: u8, r: &mut Reader) -> Result<(), crate::parser::reader::ReaderError> {
    match op {
        opcode::BR
        | opcode::BR_IF
        | opcode::CALL
        | opcode::LOCAL_GET
        | opcode::LOCAL_SET
        | opcode::LOCAL_TEE
        | opcode::GLOBAL_GET
        | opcode::GLOBAL_SET
        | opcode::MEMORY_SIZE
        | opcode::MEMORY_GROW => {
            r.read_vu32()?;
        }
        opcode::CALL_INDIRECT
        | opcode::I32_LOAD
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
            r.read_vu32()?;
            r.read_vu32()?;
        }
        opcode::BR_TABLE => {
            let count = r.read_vu32()?;
            for _ in 0..count {
                r.read_vu32()?;
            }
            r.read_vu32()?;
        }
        opcode::I32_CONST => {
            r.read_vs32()?;
        }
        opcode::I64_CONST => {
            r.read_vs64()?;
        }
        opcode::F32_CONST => {
            r.read_bytes(4)?;
        }
        opcode::F64_CONST => {
            r.read_bytes(8)?;
        }
        _ => {}
    }
    Ok(())
}
