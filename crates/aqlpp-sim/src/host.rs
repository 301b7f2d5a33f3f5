//! Host memory model
//!
//! Images, argument blobs and completion signals live here. Addresses are
//! absolute and start at [`HOST_BASE`] so a valid address is never zero.
//! Allocation is bump-only.

use aqlpp_core::error::{PpError, Result};
use aqlpp_core::packet::SignalHandle;

use crate::region::MmapRegion;

pub const HOST_BASE: u64 = 0x0000_1000_0000;

pub struct HostMemory {
    region: MmapRegion,
    next: u64,
}

impl HostMemory {
    pub fn new(bytes: usize) -> Result<Self> {
        Ok(Self {
            region: MmapRegion::new(bytes)?,
            next: 0,
        })
    }

    /// Reserve `size` bytes aligned to `align` (a power of two)
    pub fn alloc(&mut self, size: u64, align: u64) -> Result<u64> {
        let align = align.max(1);
        let start = (self.next + align - 1) & !(align - 1);
        let end = start
            .checked_add(size)
            .filter(|&end| end <= self.region.len() as u64)
            .ok_or(PpError::Memory("host memory exhausted"))?;
        self.next = end;
        Ok(HOST_BASE + start)
    }

    /// Allocate and fill
    pub fn alloc_bytes(&mut self, data: &[u8]) -> Result<u64> {
        let addr = self.alloc(data.len().max(1) as u64, 64)?;
        self.write(addr, data)?;
        Ok(addr)
    }

    pub fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        self.region.read(offset(addr)?, buf)
    }

    pub fn write(&mut self, addr: u64, data: &[u8]) -> Result<()> {
        self.region.write(offset(addr)?, data)
    }

    pub fn read_vec(&self, addr: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read(addr, &mut buf)?;
        Ok(buf)
    }

    /// New signal holding `initial`
    pub fn alloc_signal(&mut self, initial: i64) -> Result<SignalHandle> {
        let addr = self.alloc(8, 8)?;
        self.write(addr, &initial.to_le_bytes())?;
        Ok(SignalHandle(addr))
    }

    pub fn load_signal(&self, handle: SignalHandle) -> Result<i64> {
        let mut b = [0u8; 8];
        self.read(handle.0, &mut b)?;
        Ok(i64::from_le_bytes(b))
    }

    pub fn store_signal(&mut self, handle: SignalHandle, value: i64) -> Result<()> {
        self.write(handle.0, &value.to_le_bytes())
    }

    /// Subtract one; returns the new value
    pub fn decrement_signal(&mut self, handle: SignalHandle) -> Result<i64> {
        let value = self.load_signal(handle)? - 1;
        self.store_signal(handle, value)?;
        Ok(value)
    }

    /// Bytes handed out so far
    pub fn used(&self) -> u64 {
        self.next
    }
}

fn offset(addr: u64) -> Result<u64> {
    addr.checked_sub(HOST_BASE).ok_or(PpError::BadAddress(addr))
}
