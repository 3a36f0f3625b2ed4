//! Consumer side of the pipeline
//!
//! [`SndReader`] is owned by the output module and driven from the device
//! callback. Each read request goes through the drift recovery state machine
//! before any samples leave the ring:
//!
//! - **Normal**: if the ring holds fewer samples than requested, serve what is
//!   there, pad with silence and enter **UnderrunFrozen**.
//! - **UnderrunFrozen**: serve only silence until occupancy reaches the refill
//!   threshold (`size / divisor`, aligned up to a whole packet), then resume.
//!
//! Reads never block.

use super::ring_buffer::{RingConsumer, RingMonitor};
use super::READ_CHUNK;
use crate::config::SndOutConfig;
use crate::sample::StereoOut32;
use crate::speakers::{SpeakerFrame, VolumeAdjust};
use tracing::debug;

/// How ring samples are mapped onto the device layout
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConversionStrategy {
    /// Duplicate/fold without gain
    Resample,
    /// Duplicate/fold, then apply per-speaker gains
    Adjust(VolumeAdjust),
}

impl ConversionStrategy {
    /// Strategy selected by a configuration
    pub fn from_config(config: &SndOutConfig) -> Self {
        match config.volume_adjust {
            Some(gains) => ConversionStrategy::Adjust(gains),
            None => ConversionStrategy::Resample,
        }
    }

    #[inline]
    fn convert<F: SpeakerFrame>(&self, frame: &mut F, sample: StereoOut32) {
        match self {
            ConversionStrategy::Resample => frame.resample_from(sample),
            ConversionStrategy::Adjust(gains) => frame.adjust_from(sample, gains),
        }
    }
}

/// Device-side reader with underrun recovery
pub struct SndReader {
    consumer: RingConsumer,
    underrun_frozen: bool,
    refill_threshold: usize,
    packet_size: usize,
    strategy: ConversionStrategy,
    log_overruns: bool,
    scratch: Vec<StereoOut32>,
}

impl SndReader {
    /// Wrap the consumer end of a ring.
    pub fn new(consumer: RingConsumer, config: &SndOutConfig) -> Self {
        let refill_threshold =
            config.align_to_packet(consumer.size() / config.sync_mode.refill_divisor());
        SndReader {
            consumer,
            underrun_frozen: false,
            refill_threshold,
            packet_size: config.packet_size,
            strategy: ConversionStrategy::from_config(config),
            log_overruns: config.log_overruns,
            scratch: vec![StereoOut32::EMPTY; READ_CHUNK],
        }
    }

    /// Fill `out` with converted samples, padding with silence on underrun.
    ///
    /// Returns the number of real (non-silent) samples written.
    pub fn read_samples<F: SpeakerFrame>(&mut self, out: &mut [F]) -> usize {
        if self.consumer.take_flush_request() {
            debug!("output buffer flushed");
        }

        let served = self.check_underrun(out.len());

        let mut done = 0;
        while done < served {
            let n = (served - done).min(self.scratch.len());
            self.consumer.read_unchecked(&mut self.scratch[..n]);
            for (frame, &sample) in out[done..done + n].iter_mut().zip(&self.scratch[..n]) {
                self.strategy.convert(frame, sample);
            }
            done += n;
        }

        out[served..].fill(F::default());
        served
    }

    /// Number of real samples a request for `requested` may take.
    fn check_underrun(&mut self, requested: usize) -> usize {
        let available = self.consumer.occupancy();

        if self.underrun_frozen {
            if available < self.refill_threshold {
                return 0;
            }
            self.underrun_frozen = false;
            self.consumer.record_recovery();
            if self.log_overruns {
                debug!(
                    "underrun compensation ({} packets buffered)",
                    self.refill_threshold / self.packet_size
                );
            }
        }

        if available < requested {
            self.underrun_frozen = true;
            self.consumer.record_underrun();
            return available;
        }

        requested
    }

    /// Whether output is currently suppressed waiting for a refill
    pub fn is_frozen(&self) -> bool {
        self.underrun_frozen
    }

    /// Occupancy needed to leave the underrun freeze
    pub fn refill_threshold(&self) -> usize {
        self.refill_threshold
    }

    /// Active conversion strategy
    pub fn strategy(&self) -> ConversionStrategy {
        self.strategy
    }

    /// Samples currently buffered
    pub fn occupancy(&self) -> usize {
        self.consumer.occupancy()
    }

    /// Read-only view of the underlying ring
    pub fn monitor(&self) -> RingMonitor {
        self.consumer.monitor()
    }
}

impl std::fmt::Debug for SndReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SndReader")
            .field("underrun_frozen", &self.underrun_frozen)
            .field("refill_threshold", &self.refill_threshold)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}
