//! Call frames.
//!
//! One frame per function activation. A frame owns its locals and label
//! stack, borrows the function's code bytes from the module through its PC
//! cursor, and remembers the operand-stack height at entry so returning can
//! restore the caller's stack.

use super::control::{ControlMap, Label};
use super::{Trap, Value};
use crate::parser::reader::Reader;
use std::rc::Rc;

/// An activation of a defined function.
#[derive(Debug)]
pub struct Frame<'m> {
    /// Program counter over the function's code bytes.
    pub pc: Reader<'m>,
    /// `[params.., zero-initialised pure locals..]`.
    pub locals: Vec<Value>,
    /// Active structured regions, innermost last. Holds at least the
    /// implicit function-body label while the frame executes.
    pub labels: Vec<Label>,
    /// Operand-stack height when the frame was entered (after the params
    /// were popped into locals).
    pub entry_height: usize,
    /// Number of results the function returns.
    pub result_arity: usize,
    /// Pre-indexed control map for this function's code.
    pub ctrl: Rc<ControlMap>,
}

impl<'m> Frame<'m> {
    pub fn new(
        code: &'m [u8],
        locals: Vec<Value>,
        entry_height: usize,
        result_arity: usize,
        ctrl: Rc<ControlMap>,
    ) -> Self {
        Frame {
            pc: Reader::new(code),
            locals,
            labels: Vec::new(),
            entry_height,
            result_arity,
            ctrl,
        }
    }

    /// The label at `depth` from the top of the label stack (0 = innermost).
    pub fn label_at(&self, depth: u32) -> Result<&Label, Trap> {
        let len = self.labels.len();
        if (depth as usize) >= len {
            return Err(Trap::LabelIndexOutOfBounds(depth));
        }
        Ok(&self.labels[len - 1 - depth as usize])
    }

    /// Pop the labels above the one at `depth`, leaving the target itself on
    /// the stack, and return a copy of the target.
    pub fn branch_target(&mut self, depth: u32) -> Result<Label, Trap> {
        let target = *self.label_at(depth)?;
        let keep = self.labels.len() - depth as usize;
        self.labels.truncate(keep);
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::control::LabelKind;

    fn label(kind: LabelKind, pc_target: usize) -> Label {
        Label {
            kind,
            pc_target,
            pc_else: None,
            stack_height: 0,
        }
    }

    fn test_frame(code: &'static [u8]) -> Frame<'static> {
        let ctrl = Rc::new(ControlMap::build(code).expect("balanced code"));
        Frame::new(code, Vec::new(), 0, 0, ctrl)
    }

    #[test]
    fn label_at_counts_from_the_top() {
        let mut frame = test_frame(&[0x0b]);
        frame.labels.push(label(LabelKind::Implicit, 10));
        frame.labels.push(label(LabelKind::Block, 20));
        assert_eq!(frame.label_at(0).unwrap().pc_target, 20);
        assert_eq!(frame.label_at(1).unwrap().pc_target, 10);
        assert_eq!(frame.label_at(2), Err(Trap::LabelIndexOutOfBounds(2)));
    }

    #[test]
    fn branch_target_keeps_the_target_label() {
        let mut frame = test_frame(&[0x0b]);
        frame.labels.push(label(LabelKind::Implicit, 10));
        frame.labels.push(label(LabelKind::Loop, 20));
        frame.labels.push(label(LabelKind::Block, 30));

        let target = frame.branch_target(1).unwrap();
        assert_eq!(target.pc_target, 20);
        assert_eq!(frame.labels.len(), 2);
        assert_eq!(frame.labels.last().unwrap().pc_target, 20);
    }

    #[test]
    fn branch_target_at_depth_zero_pops_nothing() {
        let mut frame = test_frame(&[0x0b]);
        frame.labels.push(label(LabelKind::Loop, 5));
        let target = frame.branch_target(0).unwrap();
        assert_eq!(target.pc_target, 5);
        assert_eq!(frame.labels.len(), 1);
    }
}
