//! Fixed-point stereo sample formats
//!
//! The ring buffer stores [`StereoOut32`] at *working precision*: 16-bit
//! device values shifted left by [`VOLUME_SHIFT`], which leaves headroom for
//! mixing without clipping. Devices receive [`StereoOut16`] (the common path),
//! 32-bit integers, or floats.
//!
//! Conversions:
//! - 32 → 16: arithmetic right shift by [`VOLUME_SHIFT`] (lossy, rounds toward
//!   negative infinity)
//! - 16 → 32: arithmetic left shift by [`VOLUME_SHIFT`] (exact)
//! - 32 ↔ float: scale by `1 / 2147483647`, independent of the shift

use std::fmt::Debug;

/// Bits dropped when converting working precision down to 16-bit device precision.
pub const VOLUME_SHIFT: u32 = 12;

/// Bits added when converting working precision up to 32-bit device precision.
pub const VOLUME_SHIFT_32: u32 = 16 - VOLUME_SHIFT;

/// Full-scale signed 32-bit range used for float conversion.
pub const FLOAT_SCALE: f32 = 2_147_483_647.0;

/// Stereo sample at 16-bit device precision
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StereoOut16 {
    /// Left channel
    pub left: i16,
    /// Right channel
    pub right: i16,
}

/// Stereo sample at 32-bit working precision
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StereoOut32 {
    /// Left channel
    pub left: i32,
    /// Right channel
    pub right: i32,
}

/// Stereo sample as normalized floats
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StereoOutFloat {
    /// Left channel
    pub left: f32,
    /// Right channel
    pub right: f32,
}

impl StereoOut16 {
    /// Create a 16-bit sample
    pub const fn new(left: i16, right: i16) -> Self {
        StereoOut16 { left, right }
    }

    /// Widen to working precision.
    ///
    /// Exact: `s.upsample().downsample() == s` for every 16-bit sample.
    #[inline]
    pub fn upsample(self) -> StereoOut32 {
        StereoOut32 {
            left: (self.left as i32) << VOLUME_SHIFT,
            right: (self.right as i32) << VOLUME_SHIFT,
        }
    }
}

impl StereoOut32 {
    /// Silent sample
    pub const EMPTY: StereoOut32 = StereoOut32 { left: 0, right: 0 };

    /// Create a working-precision sample
    pub const fn new(left: i32, right: i32) -> Self {
        StereoOut32 { left, right }
    }

    /// Narrow to 16-bit device precision.
    ///
    /// Drops the low [`VOLUME_SHIFT`] bits. Values outside the 16-bit range
    /// after shifting wrap, as the working-precision contract assumes the
    /// producer stays within `i16 << VOLUME_SHIFT`.
    #[inline]
    pub fn downsample(self) -> StereoOut16 {
        StereoOut16 {
            left: (self.left >> VOLUME_SHIFT) as i16,
            right: (self.right >> VOLUME_SHIFT) as i16,
        }
    }
}

impl StereoOutFloat {
    /// Create a float sample
    pub const fn new(left: f32, right: f32) -> Self {
        StereoOutFloat { left, right }
    }

    /// Convert to working precision.
    ///
    /// The float is first scaled to the full 32-bit range, then narrowed by
    /// [`VOLUME_SHIFT_32`], the inverse of the 32-bit device conversion, so
    /// `1.0` lands on `i16::MAX` after [`StereoOut32::downsample`].
    #[inline]
    pub fn to_working(self) -> StereoOut32 {
        let full = StereoOut32::from(self);
        StereoOut32 {
            left: full.left >> VOLUME_SHIFT_32,
            right: full.right >> VOLUME_SHIFT_32,
        }
    }
}

impl From<StereoOutFloat> for StereoOut32 {
    /// Scale normalized floats to the full signed 32-bit range.
    ///
    /// Out-of-range inputs saturate.
    fn from(src: StereoOutFloat) -> Self {
        StereoOut32 {
            left: (src.left * FLOAT_SCALE) as i32,
            right: (src.right * FLOAT_SCALE) as i32,
        }
    }
}

impl From<StereoOut32> for StereoOutFloat {
    fn from(src: StereoOut32) -> Self {
        StereoOutFloat {
            left: src.left as f32 / FLOAT_SCALE,
            right: src.right as f32 / FLOAT_SCALE,
        }
    }
}

/// A single-channel value at device precision
///
/// Implemented for `i16` (the common downsampling path), `i32` and `f32`.
/// Speaker layouts are generic over this trait so each layout is written once
/// for every precision.
pub trait DeviceSample: Copy + Default + PartialEq + Debug + Send + Sync + 'static {
    /// Value emitted for silence
    const SILENCE: Self;

    /// Convert a working-precision value, dropping `extra_shift` additional
    /// bits (used for folded channels such as center and LFE).
    fn from_working(value: i64, extra_shift: u32) -> Self;

    /// Apply a linear gain, saturating at the precision's limits.
    fn scaled(self, gain: f32) -> Self;
}

impl DeviceSample for i16 {
    const SILENCE: Self = 0;

    #[inline]
    fn from_working(value: i64, extra_shift: u32) -> Self {
        (value >> (VOLUME_SHIFT + extra_shift)) as i16
    }

    #[inline]
    fn scaled(self, gain: f32) -> Self {
        (self as f32 * gain) as i16
    }
}

impl DeviceSample for i32 {
    const SILENCE: Self = 0;

    #[inline]
    fn from_working(value: i64, extra_shift: u32) -> Self {
        ((value << VOLUME_SHIFT_32) >> extra_shift) as i32
    }

    #[inline]
    fn scaled(self, gain: f32) -> Self {
        (self as f32 * gain) as i32
    }
}

impl DeviceSample for f32 {
    const SILENCE: Self = 0.0;

    #[inline]
    fn from_working(value: i64, extra_shift: u32) -> Self {
        i32::from_working(value, extra_shift) as f32 / FLOAT_SCALE
    }

    #[inline]
    fn scaled(self, gain: f32) -> Self {
        self * gain
    }
}
