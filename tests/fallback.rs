mod common;

use common::{CaptureOut, FailingOut};
use parking_lot::Mutex;
use sndout::{
    OutputRegistry, SampleTap, SndOut, SndOutConfig, SndOutError, StereoOut16, SyncMode,
    NULL_OUT_ID,
};
use std::sync::Arc;

fn capture_config() -> SndOutConfig {
    SndOutConfig::default()
        .sample_rate(1000)
        .latency_ms(5)
        .packet_size(16)
        .output_module(CaptureOut::ID)
}

#[test]
fn unknown_module_runs_null_output() {
    let (capture, reader, calls) = CaptureOut::new();
    let mut out = SndOut::with_registry(OutputRegistry::new().with_module(Box::new(capture)));

    let outcome = out.init(&capture_config().output_module("does-not-exist"));
    assert!(outcome.fell_back());
    assert_eq!(outcome.module, NULL_OUT_ID);
    assert!(matches!(
        outcome.fallback_reason,
        Some(SndOutError::UnknownModule(ref id)) if id == "does-not-exist"
    ));
    assert_eq!(out.active_module().ident(), NULL_OUT_ID);
    assert_eq!(out.config().output_module, NULL_OUT_ID);
    assert_eq!(calls.lock().inits, 0);
    assert!(reader.lock().is_none());

    // The null module never buffers
    for v in 0..64 {
        out.write(StereoOut16::new(v, v).upsample());
    }
    assert_eq!(out.stats().unwrap().occupancy, 0);
}

#[test]
fn failing_device_falls_back_then_recovers() {
    let (capture, _reader, calls) = CaptureOut::new();
    let mut out = SndOut::with_registry(
        OutputRegistry::new()
            .with_module(Box::new(FailingOut))
            .with_module(Box::new(capture)),
    );

    let outcome = out.init(&capture_config().output_module(FailingOut::ID));
    assert_eq!(outcome.module, NULL_OUT_ID);
    match outcome.fallback_reason {
        Some(SndOutError::DeviceInit { module, ref reason }) => {
            assert_eq!(module, FailingOut::ID);
            assert_eq!(reason, "no such device");
        }
        ref other => panic!("unexpected fallback reason: {other:?}"),
    }
    assert!(out.is_initialized());

    let outcome = out.init(&capture_config());
    assert!(!outcome.fell_back());
    assert_eq!(outcome.module, CaptureOut::ID);
    assert_eq!(out.active_module().ident(), CaptureOut::ID);
    assert_eq!(calls.lock().inits, 1);
}

#[test]
fn module_is_closed_on_cleanup_and_reinit() {
    let (capture, reader, calls) = CaptureOut::new();
    let mut out = SndOut::with_registry(OutputRegistry::new().with_module(Box::new(capture)));

    out.init(&capture_config());
    assert!(reader.lock().is_some());

    out.init(&capture_config().sync_mode(SyncMode::Async));
    assert_eq!(*calls.lock(), common::ModuleCalls {
        inits: 2,
        closes: 1,
        paused: Vec::new(),
    });

    out.cleanup();
    assert_eq!(calls.lock().closes, 2);
    assert!(reader.lock().is_none());
    assert!(!out.is_initialized());

    drop(out);
    assert_eq!(calls.lock().closes, 2);
}

#[test]
fn pause_is_forwarded_to_active_module() {
    let (capture, _reader, calls) = CaptureOut::new();
    let mut out = SndOut::with_registry(OutputRegistry::new().with_module(Box::new(capture)));
    out.init(&capture_config());

    out.set_paused(true);
    out.set_paused(false);
    assert_eq!(calls.lock().paused, vec![true, false]);
}

#[test]
fn empty_sample_count_reports_headroom() {
    let (capture, _reader, _calls) = CaptureOut::new();
    let mut out = SndOut::with_registry(OutputRegistry::new().with_module(Box::new(capture)));
    out.init(&capture_config().sync_mode(SyncMode::None));
    assert_eq!(out.empty_sample_count(), 80);

    for v in 0..32 {
        out.write(StereoOut16::new(v, 0).upsample());
    }
    assert_eq!(out.empty_sample_count(), 48);
}

struct Recorder(Arc<Mutex<(Vec<StereoOut16>, usize)>>);

impl SampleTap for Recorder {
    fn record(&mut self, sample: StereoOut16) {
        self.0.lock().0.push(sample);
    }

    fn finish(&mut self) {
        self.0.lock().1 += 1;
    }
}

#[test]
fn tap_records_even_without_a_device() {
    let log = Arc::new(Mutex::new((Vec::new(), 0)));
    let mut out = SndOut::with_registry(OutputRegistry::new())
        .with_tap(Box::new(Recorder(Arc::clone(&log))));
    out.init(&SndOutConfig::default());

    for v in 0..10 {
        out.write(StereoOut16::new(v, -v).upsample());
    }
    out.cleanup();

    let log = log.lock();
    assert_eq!(log.0.len(), 10);
    assert_eq!(log.0[3], StereoOut16::new(3, -3));
    assert_eq!(log.1, 1);
}

#[test]
fn registry_lookup_uses_sentinel() {
    let (capture, _reader, _calls) = CaptureOut::new();
    let registry = OutputRegistry::new()
        .with_module(Box::new(capture))
        .with_module(Box::new(FailingOut));

    assert_eq!(registry.len(), 3);
    assert_eq!(registry.find_by_id(NULL_OUT_ID), OutputRegistry::NULL_INDEX);
    assert_eq!(registry.find_by_id(CaptureOut::ID), 1);
    assert_eq!(registry.find_by_id(FailingOut::ID), 2);
    assert_eq!(registry.find_by_id("pulse"), registry.sentinel());
    assert!(registry.get(registry.sentinel()).is_none());

    let idents: Vec<&str> = registry.iter().map(|m| m.ident()).collect();
    assert_eq!(idents, vec![NULL_OUT_ID, CaptureOut::ID, FailingOut::ID]);
}

#[test]
fn unbuildable_ring_still_activates_null_output() {
    let log = Arc::new(Mutex::new((Vec::new(), 0)));
    let (capture, reader, calls) = CaptureOut::new();
    let mut out = SndOut::with_registry(OutputRegistry::new().with_module(Box::new(capture)))
        .with_tap(Box::new(Recorder(Arc::clone(&log))));

    // 10 Hz * 1 ms * 16 rounds down to an empty ring
    let config = capture_config().sample_rate(10).latency_ms(1);
    let outcome = out.init(&config);
    assert_eq!(outcome.module, NULL_OUT_ID);
    assert!(matches!(outcome.fallback_reason, Some(SndOutError::Config(_))));
    assert!(out.is_initialized());
    assert_eq!(out.active_module().ident(), NULL_OUT_ID);
    assert_eq!(calls.lock().inits, 0);
    assert!(reader.lock().is_none());
    assert_eq!(out.config().sample_rate, SndOutConfig::default().sample_rate);

    for v in 0..5 {
        out.write(StereoOut16::new(v, 0).upsample());
    }
    assert_eq!(out.stats().unwrap().occupancy, 0);
    assert_eq!(log.lock().0.len(), 5);
}

#[test]
fn single_packet_ring_is_refused() {
    let (capture, _reader, calls) = CaptureOut::new();
    let mut out = SndOut::with_registry(OutputRegistry::new().with_module(Box::new(capture)));

    // 4000 Hz * 1 ms * 16 = 64 samples, one packet of 64
    let config = capture_config().sample_rate(4000).latency_ms(1).packet_size(64);
    let outcome = out.init(&config);
    assert!(outcome.fell_back());
    assert_eq!(calls.lock().inits, 0);
    assert!(out.is_initialized());
}
