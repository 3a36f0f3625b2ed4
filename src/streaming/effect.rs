//! Optional post-processing stage
//!
//! The effect sees packets at device precision, after downsampling and before
//! the commit. It may produce more or fewer samples than it was given; only
//! whole packets of its output are committed and the remainder is carried
//! into the next cycle.

use crate::sample::StereoOut16;

/// External post-processing plugin
pub trait DspEffect: Send {
    /// Process `input_len` samples at the start of `buffer` in place.
    ///
    /// `buffer` extends past the input so the effect can emit more than it
    /// consumed. Returns the number of samples produced at the start of
    /// `buffer`; values above `buffer.len()` are clamped.
    fn process(&mut self, buffer: &mut [StereoOut16], input_len: usize) -> usize;

    /// Reset internal state after the buffer was cleared.
    fn reset(&mut self) {}
}
