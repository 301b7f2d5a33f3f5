//! Anonymous memory regions
//!
//! Backing store for simulated device memory, the register file and host
//! memory. Zero-filled on creation.

use aqlpp_core::error::{PpError, Result};

pub struct MmapRegion {
    base: *mut u8,
    len: usize,
}

impl MmapRegion {
    pub fn new(len: usize) -> Result<Self> {
        if len == 0 {
            return Err(PpError::Memory("zero-length region"));
        }
        let base = map_anonymous(len)?;
        Ok(Self { base, len })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: base..base+len is mapped read/write for our lifetime
        unsafe { std::slice::from_raw_parts(self.base, self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and &mut self gives exclusive access
        unsafe { std::slice::from_raw_parts_mut(self.base, self.len) }
    }

    /// Copy `buf.len()` bytes starting at `offset`
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let range = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.as_slice()[range]);
        Ok(())
    }

    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let range = self.range(offset, data.len())?;
        self.as_mut_slice()[range].copy_from_slice(data);
        Ok(())
    }

    pub fn read_u64(&self, offset: u64) -> Result<u64> {
        let mut b = [0u8; 8];
        self.read(offset, &mut b)?;
        Ok(u64::from_le_bytes(b))
    }

    pub fn write_u64(&mut self, offset: u64, value: u64) -> Result<()> {
        self.write(offset, &value.to_le_bytes())
    }

    fn range(&self, offset: u64, len: usize) -> Result<std::ops::Range<usize>> {
        let start = usize::try_from(offset).map_err(|_| PpError::BadAddress(offset))?;
        match start.checked_add(len) {
            Some(end) if end <= self.len => Ok(start..end),
            _ => Err(PpError::BadAddress(offset)),
        }
    }
}

impl Drop for MmapRegion {
    fn drop(&mut self) {
        // SAFETY: base/len came from map_anonymous and are unmapped once
        unsafe { unmap(self.base, self.len) }
    }
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        fn map_anonymous(len: usize) -> Result<*mut u8> {
            // SAFETY: fresh private anonymous mapping, no aliasing
            let base = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    len,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                )
            };
            if base == libc::MAP_FAILED {
                return Err(PpError::Memory("mmap failed"));
            }
            Ok(base as *mut u8)
        }

        unsafe fn unmap(base: *mut u8, len: usize) {
            libc::munmap(base as *mut libc::c_void, len);
        }
    } else {
        fn map_anonymous(len: usize) -> Result<*mut u8> {
            let buf = vec![0u8; len].into_boxed_slice();
            Ok(Box::into_raw(buf) as *mut u8)
        }

        unsafe fn unmap(base: *mut u8, len: usize) {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(base, len)));
        }
    }
}
