//! Linear memory.
//!
//! A byte-addressed store of `initial_pages * 64KiB`, zero-filled at
//! creation. The subset has no `memory.grow`, so the length is fixed for the
//! whole run. All access is bounds-checked; integer accessors use
//! little-endian layout and float accessors transfer raw bit patterns.

use super::Trap;
use byteorder::{ByteOrder, LittleEndian};

/// WebAssembly page size in bytes.
pub const PAGE_SIZE: usize = 65536;

/// A fixed-size linear memory instance.
#[derive(Debug)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    /// Allocate a zero-filled memory of the given page count.
    pub fn new(initial_pages: u32) -> Self {
        Memory {
            data: vec![0u8; initial_pages as usize * PAGE_SIZE],
        }
    }

    /// Total size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copy a data segment into memory at a fixed offset. `false` means the
    /// segment does not fit.
    pub fn init(&mut self, offset: u32, bytes: &[u8]) -> bool {
        let offset = offset as usize;
        match offset.checked_add(bytes.len()) {
            Some(end) if end <= self.data.len() => {
                self.data[offset..end].copy_from_slice(bytes);
                true
            }
            _ => false,
        }
    }

    /// Check `[addr, addr + width)` lies inside memory and return the start
    /// as a usize index.
    #[inline]
    fn check(&self, addr: u64, width: u32) -> Result<usize, Trap> {
        let end = addr
            .checked_add(u64::from(width))
            .ok_or(Trap::MemoryOutOfBounds { addr, width })?;
        if end > self.data.len() as u64 {
            return Err(Trap::MemoryOutOfBounds { addr, width });
        }
        Ok(addr as usize)
    }

    pub fn read_u8(&self, addr: u64) -> Result<u8, Trap> {
        let at = self.check(addr, 1)?;
        Ok(self.data[at])
    }

    pub fn read_u16(&self, addr: u64) -> Result<u16, Trap> {
        let at = self.check(addr, 2)?;
        Ok(LittleEndian::read_u16(&self.data[at..at + 2]))
    }

    pub fn read_u32(&self, addr: u64) -> Result<u32, Trap> {
        let at = self.check(addr, 4)?;
        Ok(LittleEndian::read_u32(&self.data[at..at + 4]))
    }

    pub fn read_u64(&self, addr: u64) -> Result<u64, Trap> {
        let at = self.check(addr, 8)?;
        Ok(LittleEndian::read_u64(&self.data[at..at + 8]))
    }

    pub fn read_f32(&self, addr: u64) -> Result<f32, Trap> {
        Ok(f32::from_bits(self.read_u32(addr)?))
    }

    pub fn read_f64(&self, addr: u64) -> Result<f64, Trap> {
        Ok(f64::from_bits(self.read_u64(addr)?))
    }

    pub fn write_u8(&mut self, addr: u64, value: u8) -> Result<(), Trap> {
        let at = self.check(addr, 1)?;
        self.data[at] = value;
        Ok(())
    }

    pub fn write_u16(&mut self, addr: u64, value: u16) -> Result<(), Trap> {
        let at = self.check(addr, 2)?;
        LittleEndian::write_u16(&mut self.data[at..at + 2], value);
        Ok(())
    }

    pub fn write_u32(&mut self, addr: u64, value: u32) -> Result<(), Trap> {
        let at = self.check(addr, 4)?;
        LittleEndian::write_u32(&mut self.data[at..at + 4], value);
        Ok(())
    }

    pub fn write_u64(&mut self, addr: u64, value: u64) -> Result<(), Trap> {
        let at = self.check(addr, 8)?;
        LittleEndian::write_u64(&mut self.data[at..at + 8], value);
        Ok(())
    }

    pub fn write_f32(&mut self, addr: u64, value: f32) -> Result<(), Trap> {
        self.write_u32(addr, value.to_bits())
    }

    pub fn write_f64(&mut self, addr: u64, value: f64) -> Result<(), Trap> {
        self.write_u64(addr, value.to_bits())
    }
}
