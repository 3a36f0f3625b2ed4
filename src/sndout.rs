//! Output driver tying the pipeline to an output module
//!
//! [`SndOut`] owns the module registry, the active module index and the
//! producer side of the pipeline. The emulated sound core talks only to this
//! type: `init`, `write`, `set_paused`, `clear_contents`, `cleanup`.
//!
//! Initialization never fails from the caller's point of view. If the
//! configured module is unknown, the configuration is unusable, the ring
//! cannot be allocated or the device refuses to open, the null module is
//! activated instead and the reason is returned once in [`InitOutcome`].

use crate::config::SndOutConfig;
use crate::output::{OutputContext, OutputModule, OutputRegistry, NullOut, NULL_OUT_ID};
use crate::sample::{StereoOut32, StereoOutFloat};
use crate::streaming::{
    BufferStats, DspEffect, PassthroughStretcher, RingMonitor, SampleRing, SampleTap,
    SndReader, SndWriter, TimeStretcher,
};
use crate::{Result, SndOutError};
use tracing::{error, info, warn};

/// Ring size the null module falls back to when the configured one cannot be
/// allocated
const NULL_FALLBACK_RING_SIZE: usize = 2;

/// Result of [`SndOut::init`]
#[derive(Debug)]
pub struct InitOutcome {
    /// Identifier of the module that ended up active
    pub module: &'static str,
    /// Why the configured module was not used, if it was not
    pub fallback_reason: Option<SndOutError>,
}

impl InitOutcome {
    /// Whether the null module was activated in place of the configured one
    pub fn fell_back(&self) -> bool {
        self.fallback_reason.is_some()
    }
}

/// Audio output front end for the emulated sound core
pub struct SndOut {
    registry: OutputRegistry,
    active: usize,
    writer: Option<SndWriter>,
    monitor: Option<RingMonitor>,
    config: SndOutConfig,
    stretcher: Option<Box<dyn TimeStretcher>>,
    effect: Option<Box<dyn DspEffect>>,
    tap: Option<Box<dyn SampleTap>>,
}

impl SndOut {
    /// Driver over every backend compiled into the crate
    pub fn new() -> Self {
        Self::with_registry(OutputRegistry::with_defaults())
    }

    /// Driver over a custom registry
    pub fn with_registry(registry: OutputRegistry) -> Self {
        SndOut {
            registry,
            active: OutputRegistry::NULL_INDEX,
            writer: None,
            monitor: None,
            config: SndOutConfig::default(),
            stretcher: None,
            effect: None,
            tap: None,
        }
    }

    /// Use `stretcher` when [`crate::SyncMode::TimeStretch`] is selected.
    pub fn with_stretcher(mut self, stretcher: Box<dyn TimeStretcher>) -> Self {
        self.stretcher = Some(stretcher);
        self
    }

    /// Insert a post-processing effect.
    pub fn with_effect(mut self, effect: Box<dyn DspEffect>) -> Self {
        self.effect = Some(effect);
        self
    }

    /// Record every submitted sample.
    pub fn with_tap(mut self, tap: Box<dyn SampleTap>) -> Self {
        self.tap = Some(tap);
        self
    }

    /// Registered modules
    pub fn registry(&self) -> &OutputRegistry {
        &self.registry
    }

    /// Currently selected module
    pub fn active_module(&self) -> &dyn OutputModule {
        self.registry.get(self.active).unwrap_or(&NullOut)
    }

    /// Configuration of the running session
    pub fn config(&self) -> &SndOutConfig {
        &self.config
    }

    /// Whether a session is running
    pub fn is_initialized(&self) -> bool {
        self.writer.is_some()
    }

    /// Start output with `config`, falling back to the null module on any
    /// failure. A running session is shut down first.
    pub fn init(&mut self, config: &SndOutConfig) -> InitOutcome {
        self.cleanup();

        let requested = self.registry.find_by_id(&config.output_module);
        let result = if requested == self.registry.sentinel() {
            Err(SndOutError::UnknownModule(config.output_module.clone()))
        } else {
            self.start(config, requested)
        };

        match result {
            Ok(()) => {
                let module = self.active_module().ident();
                info!(
                    module,
                    buffer_size = self.config.buffer_size(),
                    latency_ms = self.config.latency_ms,
                    "sound output initialized"
                );
                InitOutcome {
                    module,
                    fallback_reason: None,
                }
            }
            Err(reason) => {
                warn!(
                    "output module '{}' unavailable ({}), falling back to {}",
                    config.output_module, reason, NULL_OUT_ID
                );
                self.start_null(config);
                InitOutcome {
                    module: NULL_OUT_ID,
                    fallback_reason: Some(reason),
                }
            }
        }
    }

    fn start(&mut self, config: &SndOutConfig, index: usize) -> Result<()> {
        config.validate()?;

        let ring = SampleRing::new(config.buffer_size()).map_err(|err| {
            error!("failed to allocate sound output buffer: {err}");
            err
        })?;
        self.attach(config, index, ring)
    }

    /// Activate the null module. Does not depend on the ring that may have
    /// just failed to allocate.
    fn start_null(&mut self, requested: &SndOutConfig) {
        let config = if requested.validate().is_ok() {
            requested.clone()
        } else {
            SndOutConfig::default()
        }
        .output_module(NULL_OUT_ID);

        self.active = OutputRegistry::NULL_INDEX;
        let Some(ring) = fallback_ring(config.buffer_size()) else {
            error!("no memory left for the null output buffer");
            return;
        };
        if let Err(err) = self.attach(&config, OutputRegistry::NULL_INDEX, ring) {
            error!("null output failed to initialize: {err}");
        }
    }

    fn attach(&mut self, config: &SndOutConfig, index: usize, ring: SampleRing) -> Result<()> {
        let (producer, consumer) = ring.split();
        let monitor = producer.monitor();

        let module = self
            .registry
            .get_mut(index)
            .ok_or_else(|| SndOutError::UnknownModule(config.output_module.clone()))?;
        module.init(OutputContext {
            reader: SndReader::new(consumer, config),
            sample_rate: config.sample_rate,
            layout: config.speaker_layout,
            monitor: monitor.clone(),
        })?;
        let bypass = module.ident() == NULL_OUT_ID;

        let mut writer = SndWriter::new(producer, config).bypass(bypass);
        if config.sync_mode.is_adaptive() && !bypass {
            let mut stretcher = self
                .stretcher
                .take()
                .unwrap_or_else(|| Box::new(PassthroughStretcher) as Box<dyn TimeStretcher>);
            stretcher.init(config.sample_rate);
            writer = writer.with_stretcher(stretcher);
        }
        if let Some(effect) = self.effect.take() {
            writer = writer.with_effect(effect);
        }
        if let Some(tap) = self.tap.take() {
            writer = writer.with_tap(tap);
        }

        self.active = index;
        self.writer = Some(writer);
        self.monitor = Some(monitor);
        self.config = config.clone();
        Ok(())
    }

    /// Close the active module and release the buffer.
    pub fn cleanup(&mut self) {
        let Some(writer) = self.writer.take() else {
            return;
        };
        if let Some(module) = self.registry.get_mut(self.active) {
            module.close();
        }

        let parts = writer.into_parts();
        if let Some(mut stretcher) = parts.stretcher {
            stretcher.cleanup();
            self.stretcher = Some(stretcher);
        }
        self.effect = parts.effect;
        if let Some(mut tap) = parts.tap {
            tap.finish();
            self.tap = Some(tap);
        }
        self.monitor = None;
        info!("sound output closed");
    }

    /// Pause or resume the active module.
    pub fn set_paused(&mut self, paused: bool) {
        if let Some(module) = self.registry.get_mut(self.active) {
            module.set_paused(paused);
        }
    }

    /// Discard buffered audio and silence the next packets.
    pub fn clear_contents(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            writer.clear_contents();
        }
    }

    /// Submit one sample at working precision.
    #[inline]
    pub fn write(&mut self, sample: StereoOut32) {
        if let Some(writer) = self.writer.as_mut() {
            writer.write(sample);
        }
    }

    /// Submit one float sample.
    #[inline]
    pub fn write_float(&mut self, sample: StereoOutFloat) {
        if let Some(writer) = self.writer.as_mut() {
            writer.write_float(sample);
        }
    }

    /// Buffer statistics of the running session
    pub fn stats(&self) -> Option<BufferStats> {
        self.monitor.as_ref().map(RingMonitor::stats)
    }

    /// Headroom reported by the active module
    pub fn empty_sample_count(&self) -> usize {
        self.active_module().empty_sample_count()
    }
}

/// Ring for the null module: full size if possible, else the smallest usable
/// one. The null module never buffers, so only the statistics see the size.
fn fallback_ring(size: usize) -> Option<SampleRing> {
    SampleRing::new(size)
        .or_else(|err| {
            warn!("null output using a minimal buffer: {err}");
            SampleRing::new(NULL_FALLBACK_RING_SIZE)
        })
        .ok()
}

impl Default for SndOut {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SndOut {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncMode;

    #[test]
    fn test_default_init_uses_null_module() {
        let mut out = SndOut::with_registry(OutputRegistry::new());
        let outcome = out.init(&SndOutConfig::default());
        assert_eq!(outcome.module, NULL_OUT_ID);
        assert!(!outcome.fell_back());
        assert!(out.is_initialized());
        assert_eq!(out.stats().unwrap().size, 76_800);
    }

    #[test]
    fn test_null_module_does_not_buffer() {
        let mut out = SndOut::with_registry(OutputRegistry::new());
        out.init(&SndOutConfig::default().packet_size(4));
        for i in 0..64 {
            out.write(StereoOut32::new(i << 12, 0));
        }
        assert_eq!(out.stats().unwrap().occupancy, 0);
        assert_eq!(out.stats().unwrap().samples_written, 0);
    }

    #[test]
    fn test_unknown_module_falls_back() {
        let mut out = SndOut::with_registry(OutputRegistry::new());
        let outcome = out.init(&SndOutConfig::default().output_module("missing"));
        assert_eq!(outcome.module, NULL_OUT_ID);
        assert!(matches!(
            outcome.fallback_reason,
            Some(SndOutError::UnknownModule(ref id)) if id == "missing"
        ));
        assert!(out.is_initialized());
        assert_eq!(out.active_module().ident(), NULL_OUT_ID);
    }

    #[test]
    fn test_invalid_config_falls_back_with_defaults() {
        let mut out = SndOut::with_registry(OutputRegistry::new());
        let outcome = out.init(&SndOutConfig::default().sample_rate(0));
        assert!(matches!(outcome.fallback_reason, Some(SndOutError::Config(_))));
        assert!(out.is_initialized());
        assert_eq!(out.config().sample_rate, SndOutConfig::default().sample_rate);
    }

    #[test]
    fn test_fallback_ring_survives_allocation_failure() {
        let ring = fallback_ring(usize::MAX).unwrap();
        assert_eq!(ring.size(), NULL_FALLBACK_RING_SIZE);
        assert_eq!(fallback_ring(128).unwrap().size(), 128);
    }

    #[test]
    fn test_null_fallback_when_ring_is_empty() {
        // 10 Hz * 1 ms * 16 rounds down to no samples at all
        let mut out = SndOut::with_registry(OutputRegistry::new());
        let outcome = out.init(&SndOutConfig::default().sample_rate(10).latency_ms(1));
        assert_eq!(outcome.module, NULL_OUT_ID);
        assert!(matches!(outcome.fallback_reason, Some(SndOutError::Config(_))));
        assert!(out.is_initialized());
        assert_eq!(out.active_module().ident(), NULL_OUT_ID);
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let mut out = SndOut::with_registry(OutputRegistry::new());
        out.cleanup();
        out.init(&SndOutConfig::default().sync_mode(SyncMode::Async));
        out.cleanup();
        out.cleanup();
        assert!(!out.is_initialized());
        assert!(out.stats().is_none());
        // Writes after cleanup are ignored
        out.write(StereoOut32::EMPTY);
        out.clear_contents();
    }
}
