//! Function-reference tables.
//!
//! A table is a fixed-length vector of nullable function references, indexed
//! by `call_indirect`. Slots hold positions in the defined-function index
//! space; null slots trap when called.

use super::Trap;

/// A table of optional function references.
#[derive(Debug)]
pub struct Table {
    elements: Vec<Option<u32>>,
}

impl Table {
    /// Create a table of the given size with every slot null.
    pub fn new(size: u32) -> Self {
        Table {
            elements: vec![None; size as usize],
        }
    }

    pub fn size(&self) -> u32 {
        self.elements.len() as u32
    }

    /// Read a slot. `Ok(None)` is a null slot; an out-of-range index traps.
    pub fn get(&self, index: u32) -> Result<Option<u32>, Trap> {
        self.elements
            .get(index as usize)
            .copied()
            .ok_or(Trap::ElementIndexOutOfBounds(index))
    }

    /// Write a slot during element-segment initialisation. `false` means the
    /// index is out of range.
    pub fn set(&mut self, index: u32, func_index: u32) -> bool {
        match self.elements.get_mut(index as usize) {
            Some(slot) => {
                *slot = Some(func_index);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_table_is_all_null() {
        let table = Table::new(3);
        assert_eq!(table.size(), 3);
        for i in 0..3 {
            assert_eq!(table.get(i).unwrap(), None);
        }
    }

    #[test]
    fn set_then_get() {
        let mut table = Table::new(2);
        assert!(table.set(1, 7));
        assert_eq!(table.get(1).unwrap(), Some(7));
        assert_eq!(table.get(0).unwrap(), None);
    }

    #[test]
    fn out_of_range() {
        let mut table = Table::new(1);
        assert!(!table.set(1, 0));
        assert_eq!(table.get(1), Err(Trap::ElementIndexOutOfBounds(1)));
    }
}
