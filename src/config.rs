//! Output configuration
//!
//! Loaded and persisted by the host; this module only defines the typed shape,
//! defaults and validation.

use crate::sample::StereoOut32;
use crate::speakers::{SpeakerLayout, VolumeAdjust};
use crate::streaming::{DEFAULT_SAMPLE_RATE, SND_OUT_PACKET_SIZE};
use crate::{Result, SndOutError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Ring size as a multiple of the requested latency
pub const LATENCY_MULTIPLIER: u32 = 16;

/// Largest ring accepted by [`SndOutConfig::validate`]: 512 MB of samples
pub const MAX_BUFFER_SAMPLES: usize = 512 * 1024 * 1024 / std::mem::size_of::<StereoOut32>();

/// Refill divisor used while adaptive-rate compensation is active
pub const REFILL_DIVISOR_ADAPTIVE: usize = 32;

/// Refill divisor used for fixed-rate output
pub const REFILL_DIVISOR_FIXED: usize = 400;

/// Producer/consumer synchronization strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Adaptive-rate compensation through the time-stretcher
    #[default]
    TimeStretch,
    /// Asynchronous mixing; the buffer runs at a fixed rate
    Async,
    /// No compensation
    None,
}

impl SyncMode {
    /// Whether packets are routed through the time-stretcher
    pub fn is_adaptive(self) -> bool {
        self == SyncMode::TimeStretch
    }

    /// Divisor applied to the buffer size to get the underrun refill threshold
    pub fn refill_divisor(self) -> usize {
        if self.is_adaptive() {
            REFILL_DIVISOR_ADAPTIVE
        } else {
            REFILL_DIVISOR_FIXED
        }
    }
}

/// Configuration consumed by [`crate::SndOut`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SndOutConfig {
    /// Target output latency in milliseconds
    pub latency_ms: u32,
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Drift compensation strategy
    pub sync_mode: SyncMode,
    /// Per-speaker gains; `Some` selects the volume-adjusting conversion
    pub volume_adjust: Option<VolumeAdjust>,
    /// Device speaker layout
    pub speaker_layout: SpeakerLayout,
    /// Identifier of the output module to activate
    pub output_module: String,
    /// Emit a diagnostic line for each underrun recovery and overrun drop
    pub log_overruns: bool,
    /// Samples per packet
    pub packet_size: usize,
}

impl Default for SndOutConfig {
    fn default() -> Self {
        Self {
            latency_ms: 100,
            sample_rate: DEFAULT_SAMPLE_RATE,
            sync_mode: SyncMode::default(),
            volume_adjust: None,
            speaker_layout: SpeakerLayout::default(),
            output_module: crate::output::NULL_OUT_ID.to_string(),
            log_overruns: false,
            packet_size: SND_OUT_PACKET_SIZE,
        }
    }
}

impl SndOutConfig {
    /// Set the target latency
    pub fn latency_ms(mut self, latency_ms: u32) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Set the sample rate
    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Set the sync mode
    pub fn sync_mode(mut self, mode: SyncMode) -> Self {
        self.sync_mode = mode;
        self
    }

    /// Enable per-speaker volume adjustment
    pub fn volume_adjust(mut self, gains: Option<VolumeAdjust>) -> Self {
        self.volume_adjust = gains;
        self
    }

    /// Set the speaker layout
    pub fn speaker_layout(mut self, layout: SpeakerLayout) -> Self {
        self.speaker_layout = layout;
        self
    }

    /// Select the output module by identifier
    pub fn output_module(mut self, ident: impl Into<String>) -> Self {
        self.output_module = ident.into();
        self
    }

    /// Enable underrun/overrun diagnostics
    pub fn log_overruns(mut self, enabled: bool) -> Self {
        self.log_overruns = enabled;
        self
    }

    /// Set the packet size
    pub fn packet_size(mut self, samples: usize) -> Self {
        self.packet_size = samples;
        self
    }

    /// Check the configuration for values that cannot produce a buffer
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(SndOutError::Config("sample rate must be greater than 0".into()));
        }
        if self.latency_ms == 0 {
            return Err(SndOutError::Config("latency must be greater than 0".into()));
        }
        if self.packet_size == 0 {
            return Err(SndOutError::Config("packet size must be greater than 0".into()));
        }

        let size = self.checked_buffer_size().ok_or_else(|| {
            SndOutError::Config(format!(
                "buffer size overflows for {} ms at {} Hz",
                self.latency_ms, self.sample_rate
            ))
        })?;
        if size > MAX_BUFFER_SAMPLES {
            return Err(SndOutError::Config(format!(
                "buffer size {size} exceeds maximum of {MAX_BUFFER_SAMPLES} samples"
            )));
        }
        // A one-packet ring refuses every write
        if size < self.packet_size.saturating_mul(2) {
            return Err(SndOutError::Config(format!(
                "buffer size {size} must hold at least two {}-sample packets",
                self.packet_size
            )));
        }
        Ok(())
    }

    /// Round `samples` up to a whole number of packets
    pub fn align_to_packet(&self, samples: usize) -> usize {
        aligned_buffer_size(samples, self.packet_size)
    }

    /// Ring buffer size in samples for this latency target
    ///
    /// Saturates at `usize::MAX` when the size does not fit; [`Self::validate`]
    /// rejects such configurations.
    pub fn buffer_size(&self) -> usize {
        self.checked_buffer_size().unwrap_or(usize::MAX)
    }

    /// Ring buffer size, or `None` on overflow or a zero packet size
    pub fn checked_buffer_size(&self) -> Option<usize> {
        let samples = (self.latency_ms as u64)
            .checked_mul(LATENCY_MULTIPLIER as u64)?
            .checked_mul(self.sample_rate as u64)?
            / 1000;
        let samples = usize::try_from(samples).ok()?;
        if self.packet_size == 0 {
            return None;
        }
        samples
            .div_ceil(self.packet_size)
            .checked_mul(self.packet_size)
    }

    /// Parse a configuration from JSON
    pub fn from_json(text: &str) -> Result<Self> {
        let config: SndOutConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Round `samples` up to a multiple of `packet_size`
#[inline]
pub fn aligned_buffer_size(samples: usize, packet_size: usize) -> usize {
    samples.div_ceil(packet_size) * packet_size
}
