//! Filter coefficient upload
//!
//! Coefficients go to a core's MASK0 / MASK1 register arrays as
//! consecutive 32-bit words.

use aqlpp_core::error::{PpError, Result};
use aqlpp_core::hw::Mmio;
use aqlpp_core::kernarg::CustomMask;
use aqlpp_core::layout::core_regs;
use aqlpp_core::ops::{Mask, MaskSelection, Operation};

/// Load the coefficient tables `op` needs into `core`. Returns the number
/// of words written.
pub fn write_mask<M: Mmio + ?Sized>(
    mmio: &M,
    core: usize,
    op: Operation,
    custom: Option<&CustomMask>,
) -> Result<usize> {
    match op.mask_selection() {
        MaskSelection::None => Ok(0),
        MaskSelection::Single(table) => Ok(write_table(mmio, core, core_regs::MASK0, table)),
        MaskSelection::Pair(x, y) => {
            let n = write_table(mmio, core, core_regs::MASK0, x);
            Ok(n + write_table(mmio, core, core_regs::MASK1, y))
        }
        MaskSelection::Custom(len) => {
            let mask = custom.ok_or(PpError::MalformedArgs("custom filter without coefficients"))?;
            let words = &mask.as_slice()[..len.min(mask.len())];
            write_words(mmio, core, core_regs::MASK0, words.iter().copied());
            Ok(words.len())
        }
    }
}

fn write_table<M: Mmio + ?Sized>(mmio: &M, core: usize, base: u64, table: &Mask) -> usize {
    write_words(mmio, core, base, table.iter().map(|&c| c as i32));
    table.len()
}

fn write_words<M, I>(mmio: &M, core: usize, base: u64, words: I)
where
    M: Mmio + ?Sized,
    I: Iterator<Item = i32>,
{
    for (i, w) in words.enumerate() {
        mmio.write32(core_regs::offset(core, base + 4 * i as u64), w as u32);
    }
}
