#![allow(dead_code)]

use parking_lot::Mutex;
use sndout::{OutputContext, OutputModule, SndOutError, SndReader};
use std::sync::Arc;

/// Lifecycle calls observed on a test module
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ModuleCalls {
    pub inits: usize,
    pub closes: usize,
    pub paused: Vec<bool>,
}

/// Output module that hands its reader back to the test instead of playing
pub struct CaptureOut {
    pub reader: Arc<Mutex<Option<SndReader>>>,
    pub calls: Arc<Mutex<ModuleCalls>>,
}

impl CaptureOut {
    pub const ID: &'static str = "capture";

    pub fn new() -> (Self, Arc<Mutex<Option<SndReader>>>, Arc<Mutex<ModuleCalls>>) {
        let reader = Arc::new(Mutex::new(None));
        let calls = Arc::new(Mutex::new(ModuleCalls::default()));
        (
            CaptureOut {
                reader: Arc::clone(&reader),
                calls: Arc::clone(&calls),
            },
            reader,
            calls,
        )
    }
}

impl OutputModule for CaptureOut {
    fn init(&mut self, ctx: OutputContext) -> sndout::Result<()> {
        *self.reader.lock() = Some(ctx.reader);
        self.calls.lock().inits += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.reader.lock().take();
        self.calls.lock().closes += 1;
    }

    fn set_paused(&mut self, paused: bool) {
        self.calls.lock().paused.push(paused);
    }

    fn empty_sample_count(&self) -> usize {
        self.reader
            .lock()
            .as_ref()
            .map(|reader| {
                let monitor = reader.monitor();
                monitor.size() - monitor.occupancy()
            })
            .unwrap_or(0)
    }

    fn ident(&self) -> &'static str {
        Self::ID
    }

    fn long_name(&self) -> &'static str {
        "Test capture"
    }
}

/// Output module whose device never opens
pub struct FailingOut;

impl FailingOut {
    pub const ID: &'static str = "broken";
}

impl OutputModule for FailingOut {
    fn init(&mut self, _ctx: OutputContext) -> sndout::Result<()> {
        Err(SndOutError::DeviceInit {
            module: Self::ID,
            reason: "no such device".into(),
        })
    }

    fn close(&mut self) {}

    fn set_paused(&mut self, _paused: bool) {}

    fn empty_sample_count(&self) -> usize {
        0
    }

    fn ident(&self) -> &'static str {
        Self::ID
    }

    fn long_name(&self) -> &'static str {
        "Always fails"
    }
}
