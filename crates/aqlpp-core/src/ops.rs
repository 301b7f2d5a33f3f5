//! Accelerator operations, pixel formats and filter coefficient tables
//!
//! The `kernel_object` field of a kernel-dispatch packet is not a code
//! object handle on this device: its low 16 bits name one of the fixed
//! filter operations the compute cores implement.

/// Filter operation selected by a kernel-dispatch packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    SobelX3x3,
    SobelY3x3,
    SobelXY3x3,
    SobelX5x5,
    SobelY5x5,
    SobelXY5x5,
    Gauss3x3,
    Gauss5x5,
    MinFilter3x3,
    MinFilter5x5,
    MaxFilter3x3,
    MaxFilter5x5,
    MedianFilter3x3,
    MedianFilter5x5,
    CustomFilter3x3,
    CustomFilter5x5,
    /// Code the processor has no table for; forwarded to the core as-is
    Other(u16),
}

impl Operation {
    /// Decode from a packet's `kernel_object`. Only the low 16 bits reach
    /// the core's task register.
    pub const fn from_code(code: u64) -> Self {
        match code as u16 {
            0x01 => Operation::SobelX3x3,
            0x02 => Operation::SobelY3x3,
            0x03 => Operation::SobelXY3x3,
            0x04 => Operation::SobelX5x5,
            0x05 => Operation::SobelY5x5,
            0x06 => Operation::SobelXY5x5,
            0x11 => Operation::Gauss3x3,
            0x12 => Operation::Gauss5x5,
            0x21 => Operation::MinFilter3x3,
            0x22 => Operation::MinFilter5x5,
            0x23 => Operation::MaxFilter3x3,
            0x24 => Operation::MaxFilter5x5,
            0x25 => Operation::MedianFilter3x3,
            0x26 => Operation::MedianFilter5x5,
            0x31 => Operation::CustomFilter3x3,
            0x32 => Operation::CustomFilter5x5,
            other => Operation::Other(other),
        }
    }

    /// Value written to the core's task register
    pub const fn code(self) -> u16 {
        match self {
            Operation::SobelX3x3 => 0x01,
            Operation::SobelY3x3 => 0x02,
            Operation::SobelXY3x3 => 0x03,
            Operation::SobelX5x5 => 0x04,
            Operation::SobelY5x5 => 0x05,
            Operation::SobelXY5x5 => 0x06,
            Operation::Gauss3x3 => 0x11,
            Operation::Gauss5x5 => 0x12,
            Operation::MinFilter3x3 => 0x21,
            Operation::MinFilter5x5 => 0x22,
            Operation::MaxFilter3x3 => 0x23,
            Operation::MaxFilter5x5 => 0x24,
            Operation::MedianFilter3x3 => 0x25,
            Operation::MedianFilter5x5 => 0x26,
            Operation::CustomFilter3x3 => 0x31,
            Operation::CustomFilter5x5 => 0x32,
            Operation::Other(code) => code,
        }
    }

    /// Number of coefficients a custom filter carries in its argument blob
    pub const fn custom_mask_len(self) -> Option<usize> {
        match self {
            Operation::CustomFilter3x3 => Some(9),
            Operation::CustomFilter5x5 => Some(25),
            _ => None,
        }
    }

    #[inline]
    pub const fn is_custom(self) -> bool {
        self.custom_mask_len().is_some()
    }

    /// Normalization constant for built-in filters. Custom filters read
    /// theirs from the argument blob; everything else runs unnormalized.
    pub const fn fixed_normalization(self) -> u16 {
        match self {
            Operation::Gauss3x3 => GAUSS_3X3_NORMALIZATION,
            Operation::Gauss5x5 => GAUSS_5X5_NORMALIZATION,
            _ => 0,
        }
    }

    /// Which coefficient tables the mask writer has to load
    pub fn mask_selection(self) -> MaskSelection {
        match self {
            Operation::SobelX3x3 => MaskSelection::Single(&SOBEL_X_3X3),
            Operation::SobelY3x3 => MaskSelection::Single(&SOBEL_Y_3X3),
            Operation::SobelXY3x3 => MaskSelection::Pair(&SOBEL_X_3X3, &SOBEL_Y_3X3),
            Operation::SobelX5x5 => MaskSelection::Single(&SOBEL_X_5X5),
            Operation::SobelY5x5 => MaskSelection::Single(&SOBEL_Y_5X5),
            Operation::SobelXY5x5 => MaskSelection::Pair(&SOBEL_X_5X5, &SOBEL_Y_5X5),
            Operation::Gauss3x3 => MaskSelection::Single(&GAUSS_3X3),
            Operation::Gauss5x5 => MaskSelection::Single(&GAUSS_5X5),
            Operation::MinFilter3x3
            | Operation::MinFilter5x5
            | Operation::MaxFilter3x3
            | Operation::MaxFilter5x5
            | Operation::MedianFilter3x3
            | Operation::MedianFilter5x5
            | Operation::Other(_) => MaskSelection::None,
            Operation::CustomFilter3x3 => MaskSelection::Custom(9),
            Operation::CustomFilter5x5 => MaskSelection::Custom(25),
        }
    }
}

/// Coefficient tables required by an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskSelection {
    /// Rank filters and unknown codes
    None,
    Single(&'static Mask),
    /// Written to MASK0 and MASK1
    Pair(&'static Mask, &'static Mask),
    /// Coefficients come from the argument blob (9 or 25 of them)
    Custom(usize),
}

/// A 5x5 coefficient table; 3x3 filters use the top-left corner
pub type Mask = [i8; MASK_ENTRIES];

pub const MASK_ENTRIES: usize = 25;

pub const GAUSS_3X3_NORMALIZATION: u16 = 16;
pub const GAUSS_5X5_NORMALIZATION: u16 = 256;

#[rustfmt::skip]
pub const SOBEL_X_3X3: Mask = [
    1, 0, -1, 0, 0,
    2, 0, -2, 0, 0,
    1, 0, -1, 0, 0,
    0, 0,  0, 0, 0,
    0, 0,  0, 0, 0,
];

#[rustfmt::skip]
pub const SOBEL_Y_3X3: Mask = [
     1,  2,  1, 0, 0,
     0,  0,  0, 0, 0,
    -1, -2, -1, 0, 0,
     0,  0,  0, 0, 0,
     0,  0,  0, 0, 0,
];

#[rustfmt::skip]
pub const SOBEL_X_5X5: Mask = [
    1,  2, 0,  -2, -1,
    4,  8, 0,  -8, -4,
    6, 12, 0, -12, -6,
    4,  8, 0,  -8, -4,
    1,  2, 0,  -2, -1,
];

#[rustfmt::skip]
pub const SOBEL_Y_5X5: Mask = [
     1,  4,   6,  4,  1,
     2,  8,  12,  8,  2,
     0,  0,   0,  0,  0,
    -2, -8, -12, -8, -2,
    -1, -4,  -6, -4, -1,
];

#[rustfmt::skip]
pub const GAUSS_3X3: Mask = [
    1, 2, 1, 0, 0,
    2, 4, 2, 0, 0,
    1, 2, 1, 0, 0,
    0, 0, 0, 0, 0,
    0, 0, 0, 0, 0,
];

#[rustfmt::skip]
pub const GAUSS_5X5: Mask = [
    1,  4,  6,  4, 1,
    4, 16, 24, 16, 4,
    6, 24, 36, 24, 6,
    4, 16, 24, 16, 4,
    1,  4,  6,  4, 1,
];

/// Pixel format of source and destination images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorModel {
    Gray16,
    Rgb8,
    Other(u8),
}

impl ColorModel {
    pub const fn from_raw(v: u8) -> Self {
        match v {
            0 => ColorModel::Gray16,
            1 => ColorModel::Rgb8,
            other => ColorModel::Other(other),
        }
    }

    pub const fn raw(self) -> u8 {
        match self {
            ColorModel::Gray16 => 0,
            ColorModel::Rgb8 => 1,
            ColorModel::Other(v) => v,
        }
    }

    /// Storage per pixel; unknown models occupy nothing
    pub const fn bytes_per_pixel(self) -> u64 {
        match self {
            ColorModel::Gray16 => 2,
            ColorModel::Rgb8 => 3,
            ColorModel::Other(_) => 0,
        }
    }
}

/// How the core treats pixels outside the image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderHandling {
    ClampToZero,
    ClampToEdge,
    Other(u8),
}

impl BorderHandling {
    pub const fn from_raw(v: u8) -> Self {
        match v {
            0 => BorderHandling::ClampToZero,
            1 => BorderHandling::ClampToEdge,
            other => BorderHandling::Other(other),
        }
    }

    pub const fn raw(self) -> u8 {
        match self {
            BorderHandling::ClampToZero => 0,
            BorderHandling::ClampToEdge => 1,
            BorderHandling::Other(v) => v,
        }
    }
}

/// DMA transfer direction, as written to `DMA_LDST`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DmaDirection {
    /// Host memory to device memory
    Load = 0,
    /// Device memory to host memory
    Store = 1,
}

impl DmaDirection {
    pub const fn from_raw(v: u32) -> Option<Self> {
        match v {
            0 => Some(DmaDirection::Load),
            1 => Some(DmaDirection::Store),
            _ => None,
        }
    }
}
