//! Emulator audio output layer
//!
//! Sits between an emulated sound core and the host audio device. The core
//! submits stereo samples at its own emulated rate; the device pulls them at
//! its own hardware rate. In between sit a lock-free single-producer/
//! single-consumer ring, a drift recovery state machine and a speaker layout
//! conversion layer.
//!
//! # Features
//! - Fixed-point working precision (16-bit values shifted by [`sample::VOLUME_SHIFT`])
//! - Lock-free sample ring with wrap-aware bulk copies
//! - Underrun freeze with refill threshold, drop-newest overrun policy
//! - Stereo, 2.1, quad, 4.1, 5.1 (plain and two matrix decoders) and 7.1 layouts
//!   at 16-bit, 32-bit or float device precision
//! - Pluggable output modules with a silent fallback that never fails
//! - Hooks for an external time-stretcher, a post-processing effect and a
//!   recording tap
//!
//! # Crate feature flags
//! - `streaming` (opt-in): system audio output via `rodio` ([`output::RodioOut`])
//!
//! # Quick start
//! ```no_run
//! use sndout::{SndOut, SndOutConfig, StereoOut16};
//!
//! let mut out = SndOut::new();
//! let outcome = out.init(&SndOutConfig::default().output_module("rodio"));
//! if let Some(reason) = &outcome.fallback_reason {
//!     eprintln!("using {} instead: {reason}", outcome.module);
//! }
//! for i in 0..48_000 {
//!     let value = ((i % 100) as i16 - 50) * 200;
//!     out.write(StereoOut16::new(value, value).upsample());
//! }
//! out.cleanup();
//! ```

#![warn(missing_docs)]

pub mod config; // Configuration
pub mod output; // Output Modules & Registry
pub mod sample; // Sample Formats
pub mod sndout; // Pipeline Driver
pub mod speakers; // Speaker Layouts
pub mod streaming; // Ring Buffer, Reader & Writer

/// Error types for sound output operations
#[derive(thiserror::Error, Debug)]
pub enum SndOutError {
    /// The ring buffer storage could not be allocated
    #[error("Out of memory allocating {samples} samples of output buffer")]
    Allocation {
        /// Requested ring size in samples
        samples: usize,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// An output device refused to open
    #[error("Output module '{module}' failed to initialize: {reason}")]
    DeviceInit {
        /// Identifier of the failing module
        module: &'static str,
        /// Device-reported reason
        reason: String,
    },

    /// No registered module has the requested identifier
    #[error("Unknown output module '{0}'")]
    UnknownModule(String),

    /// IO error from filesystem or device thread
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for SndOutError {
    /// Converts a String into `SndOutError::Other`.
    ///
    /// Prefer a specific variant where one fits; `Other` carries no
    /// information about what went wrong.
    fn from(msg: String) -> Self {
        SndOutError::Other(msg)
    }
}

impl From<&str> for SndOutError {
    /// Converts a string slice into `SndOutError::Other`.
    fn from(msg: &str) -> Self {
        SndOutError::Other(msg.to_string())
    }
}

/// Result type for sound output operations
pub type Result<T> = std::result::Result<T, SndOutError>;

// Public API exports
pub use config::{SndOutConfig, SyncMode};
pub use output::{NullOut, OutputContext, OutputModule, OutputRegistry, NULL_OUT_ID};
pub use sample::{StereoOut16, StereoOut32, StereoOutFloat};
pub use sndout::{InitOutcome, SndOut};
pub use speakers::{SpeakerFrame, SpeakerLayout, SpeakerMask, VolumeAdjust};
pub use streaming::{
    BufferStats, DspEffect, PacketSink, PassthroughStretcher, SampleTap, SndReader, SndWriter,
    TimeStretcher,
};

#[cfg(feature = "streaming")]
pub use output::RodioOut;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SndOutError::DeviceInit {
            module: "rodio",
            reason: "no device".into(),
        };
        assert_eq!(
            err.to_string(),
            "Output module 'rodio' failed to initialize: no device"
        );
        assert_eq!(
            SndOutError::Allocation { samples: 64 }.to_string(),
            "Out of memory allocating 64 samples of output buffer"
        );
    }

    #[test]
    fn test_string_conversions_map_to_other() {
        assert!(matches!(SndOutError::from("x"), SndOutError::Other(ref m) if m == "x"));
        assert!(matches!(
            SndOutError::from(String::from("y")),
            SndOutError::Other(ref m) if m == "y"
        ));
    }
}
