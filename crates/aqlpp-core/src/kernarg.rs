//! Kernel argument blob
//!
//! The argument blob lives in host memory and is DMA'd into the slot's
//! staging buffer before anything else happens to a request.
//!
//! ```text
//! 0x00 src_address      u64
//! 0x08 dst_address      u64
//! 0x10 color_model      u8
//! 0x11 border_handling  u8
//! 0x12 threshold        u16
//! -- custom filters only --
//! 0x14 normalization    u16 (+2 bytes padding)
//! 0x18 mask             i32 x 9 (3x3) or x 25 (5x5)
//! ```

use crate::error::{PpError, Result};
use crate::ops::{BorderHandling, ColorModel, Operation, MASK_ENTRIES};

/// Blob size for built-in filters
pub const BASE_SIZE: usize = 20;

/// Custom 3x3: base + normalization word + 9 coefficients
pub const CUSTOM_3X3_SIZE: usize = BASE_SIZE + 4 + 9 * 4;

/// Custom 5x5: base + normalization word + 25 coefficients
pub const CUSTOM_5X5_SIZE: usize = BASE_SIZE + 4 + 25 * 4;

/// Largest blob any operation needs
pub const MAX_SIZE: usize = CUSTOM_5X5_SIZE;

const COLOR_MODEL_OFFSET: usize = 0x10;
const BORDER_HANDLING_OFFSET: usize = 0x11;
const THRESHOLD_OFFSET: usize = 0x12;
const NORMALIZATION_OFFSET: usize = 0x14;
const MASK_OFFSET: usize = 0x18;

/// Bytes to fetch for an operation's argument blob
pub const fn blob_size(op: Operation) -> usize {
    match op {
        Operation::CustomFilter3x3 => CUSTOM_3X3_SIZE,
        Operation::CustomFilter5x5 => CUSTOM_5X5_SIZE,
        _ => BASE_SIZE,
    }
}

/// Coefficients supplied by a custom filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomMask {
    coefficients: [i32; MASK_ENTRIES],
    len: usize,
}

impl CustomMask {
    /// Build from up to 25 coefficients; extra entries are ignored
    pub fn new(coefficients: &[i32]) -> Self {
        let len = coefficients.len().min(MASK_ENTRIES);
        let mut buf = [0i32; MASK_ENTRIES];
        buf[..len].copy_from_slice(&coefficients[..len]);
        Self { coefficients: buf, len }
    }

    #[inline]
    pub fn as_slice(&self) -> &[i32] {
        &self.coefficients[..self.len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Decoded argument blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelArgs {
    /// Host address of the source image
    pub src_address: u64,
    /// Host address the result is stored to
    pub dst_address: u64,
    pub color_model: ColorModel,
    pub border_handling: BorderHandling,
    pub threshold: u16,
    /// Only present for custom filters
    pub normalization: u16,
    pub custom_mask: Option<CustomMask>,
}

impl KernelArgs {
    /// Parse a staged blob for `op`
    pub fn parse(op: Operation, blob: &[u8]) -> Result<Self> {
        if blob.len() < blob_size(op) {
            return Err(PpError::MalformedArgs("blob shorter than operation requires"));
        }

        let mut args = KernelArgs {
            src_address: read_u64(blob, 0x00),
            dst_address: read_u64(blob, 0x08),
            color_model: ColorModel::from_raw(blob[COLOR_MODEL_OFFSET]),
            border_handling: BorderHandling::from_raw(blob[BORDER_HANDLING_OFFSET]),
            threshold: read_u16(blob, THRESHOLD_OFFSET),
            normalization: 0,
            custom_mask: None,
        };

        if let Some(len) = op.custom_mask_len() {
            args.normalization = read_u16(blob, NORMALIZATION_OFFSET);
            let mut coefficients = [0i32; MASK_ENTRIES];
            for (i, c) in coefficients.iter_mut().take(len).enumerate() {
                *c = read_i32(blob, MASK_OFFSET + 4 * i);
            }
            args.custom_mask = Some(CustomMask::new(&coefficients[..len]));
        }

        Ok(args)
    }

    /// Serialize into the layout `parse` reads. Used by the host side to
    /// author blobs.
    pub fn encode(&self) -> Vec<u8> {
        let size = match self.custom_mask {
            Some(mask) => BASE_SIZE + 4 + 4 * mask.len(),
            None => BASE_SIZE,
        };
        let mut blob = vec![0u8; size];
        blob[0x00..0x08].copy_from_slice(&self.src_address.to_le_bytes());
        blob[0x08..0x10].copy_from_slice(&self.dst_address.to_le_bytes());
        blob[COLOR_MODEL_OFFSET] = self.color_model.raw();
        blob[BORDER_HANDLING_OFFSET] = self.border_handling.raw();
        blob[THRESHOLD_OFFSET..THRESHOLD_OFFSET + 2].copy_from_slice(&self.threshold.to_le_bytes());
        if let Some(mask) = self.custom_mask {
            blob[NORMALIZATION_OFFSET..NORMALIZATION_OFFSET + 2]
                .copy_from_slice(&self.normalization.to_le_bytes());
            for (i, c) in mask.as_slice().iter().enumerate() {
                let off = MASK_OFFSET + 4 * i;
                blob[off..off + 4].copy_from_slice(&c.to_le_bytes());
            }
        }
        blob
    }

    /// Bytes occupied by a `width` x `height` image in this blob's colour model
    #[inline]
    pub fn image_bytes(&self, width: u32, height: u32) -> u64 {
        width as u64 * height as u64 * self.color_model.bytes_per_pixel()
    }
}

fn read_u16(blob: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([blob[off], blob[off + 1]])
}

fn read_i32(blob: &[u8], off: usize) -> i32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&blob[off..off + 4]);
    i32::from_le_bytes(b)
}

fn read_u64(blob: &[u8], off: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&blob[off..off + 8]);
    u64::from_le_bytes(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_sizes() {
        assert_eq!(blob_size(Operation::SobelXY3x3), 20);
        assert_eq!(blob_size(Operation::MedianFilter5x5), 20);
        assert_eq!(blob_size(Operation::CustomFilter3x3), 60);
        assert_eq!(blob_size(Operation::CustomFilter5x5), 124);
    }

    #[test]
    fn test_parse_base_layout() {
        let mut blob = [0u8; BASE_SIZE];
        blob[0..8].copy_from_slice(&0x1000u64.to_le_bytes());
        blob[8..16].copy_from_slice(&0x2000u64.to_le_bytes());
        blob[16] = 1;
        blob[17] = 1;
        blob[18..20].copy_from_slice(&300u16.to_le_bytes());

        let args = KernelArgs::parse(Operation::Gauss3x3, &blob).unwrap();
        assert_eq!(args.src_address, 0x1000);
        assert_eq!(args.dst_address, 0x2000);
        assert_eq!(args.color_model, ColorModel::Rgb8);
        assert_eq!(args.border_handling, BorderHandling::ClampToEdge);
        assert_eq!(args.threshold, 300);
        assert_eq!(args.custom_mask, None);
        assert_eq!(args.image_bytes(4, 5), 60);
    }

    #[test]
    fn test_parse_custom_mask() {
        let coeffs: Vec<i32> = (0..25).map(|i| i - 12).collect();
        let args = KernelArgs {
            src_address: 1,
            dst_address: 2,
            color_model: ColorModel::Gray16,
            border_handling: BorderHandling::ClampToZero,
            threshold: 0,
            normalization: 48,
            custom_mask: Some(CustomMask::new(&coeffs)),
        };
        let blob = args.encode();
        assert_eq!(blob.len(), CUSTOM_5X5_SIZE);
        assert_eq!(&blob[0x18..0x1C], &(-12i32).to_le_bytes());

        let parsed = KernelArgs::parse(Operation::CustomFilter5x5, &blob).unwrap();
        assert_eq!(parsed.normalization, 48);
        assert_eq!(parsed.custom_mask.unwrap().as_slice(), coeffs.as_slice());
    }

    #[test]
    fn test_short_blob_rejected() {
        let blob = [0u8; BASE_SIZE];
        assert!(matches!(
            KernelArgs::parse(Operation::CustomFilter3x3, &blob),
            Err(PpError::MalformedArgs(_))
        ));
    }
}
