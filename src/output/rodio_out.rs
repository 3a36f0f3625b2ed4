//! System audio output using rodio
//!
//! The rodio stream is created and owned by a dedicated device thread, since
//! the platform stream handle cannot move between threads. The module talks
//! to that thread over a command channel. Samples are pulled from the
//! [`SndReader`] by a rodio [`Source`] that converts each frame into the
//! configured speaker layout.

use super::{OutputContext, OutputModule};
use crate::sample::StereoOut16;
use crate::speakers::{
    SpeakerFrame, SpeakerLayout, Stereo21Out16, Stereo40Out16, Stereo41Out16, Stereo51Out16,
    Stereo51Out16Dpl, Stereo51Out16DplII, Stereo71Out16,
};
use crate::streaming::{RingMonitor, SndReader};
use crate::{Result, SndOutError};
use rodio::{OutputStream, Sink, Source};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

/// Identifier of the rodio module
pub const RODIO_OUT_ID: &str = "rodio";

/// Frames converted per pull from the reader
const FRAMES_PER_PULL: usize = 256;

/// rodio source reading from the ring in one speaker layout
struct LayoutSource<F: SpeakerFrame<Sample = i16>> {
    reader: SndReader,
    sample_rate: u32,
    frames: Vec<F>,
    interleaved: Vec<i16>,
    pos: usize,
    finished: Arc<AtomicBool>,
}

impl<F: SpeakerFrame<Sample = i16>> LayoutSource<F> {
    fn new(reader: SndReader, sample_rate: u32, finished: Arc<AtomicBool>) -> Self {
        let interleaved = vec![0; FRAMES_PER_PULL * F::CHANNELS];
        LayoutSource {
            reader,
            sample_rate,
            frames: vec![F::default(); FRAMES_PER_PULL],
            pos: interleaved.len(),
            interleaved,
            finished,
        }
    }

    fn refill(&mut self) {
        self.reader.read_samples(&mut self.frames);
        for (frame, out) in self
            .frames
            .iter()
            .zip(self.interleaved.chunks_exact_mut(F::CHANNELS))
        {
            frame.write_interleaved(out);
        }
        self.pos = 0;
    }
}

impl<F: SpeakerFrame<Sample = i16>> Iterator for LayoutSource<F> {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        if self.finished.load(Ordering::Relaxed) {
            return None;
        }
        if self.pos >= self.interleaved.len() {
            self.refill();
        }
        let sample = self.interleaved[self.pos];
        self.pos += 1;
        Some(sample)
    }
}

impl<F: SpeakerFrame<Sample = i16>> Source for LayoutSource<F> {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.interleaved.len() - self.pos).filter(|&n| n > 0)
    }

    fn channels(&self) -> u16 {
        F::CHANNELS as u16
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

fn append_layout(
    sink: &Sink,
    layout: SpeakerLayout,
    reader: SndReader,
    sample_rate: u32,
    finished: Arc<AtomicBool>,
) {
    match layout {
        SpeakerLayout::Stereo => {
            sink.append(LayoutSource::<StereoOut16>::new(reader, sample_rate, finished))
        }
        SpeakerLayout::Stereo21 => {
            sink.append(LayoutSource::<Stereo21Out16>::new(reader, sample_rate, finished))
        }
        SpeakerLayout::Quad => {
            sink.append(LayoutSource::<Stereo40Out16>::new(reader, sample_rate, finished))
        }
        SpeakerLayout::Surround41 => {
            sink.append(LayoutSource::<Stereo41Out16>::new(reader, sample_rate, finished))
        }
        SpeakerLayout::Surround51 => {
            sink.append(LayoutSource::<Stereo51Out16>::new(reader, sample_rate, finished))
        }
        SpeakerLayout::Surround51Dpl => {
            sink.append(LayoutSource::<Stereo51Out16Dpl>::new(reader, sample_rate, finished))
        }
        SpeakerLayout::Surround51DplII => {
            sink.append(LayoutSource::<Stereo51Out16DplII>::new(reader, sample_rate, finished))
        }
        SpeakerLayout::Surround71 => {
            sink.append(LayoutSource::<Stereo71Out16>::new(reader, sample_rate, finished))
        }
    }
}

enum DeviceCommand {
    Pause,
    Play,
    Close,
}

struct DeviceWorker {
    commands: mpsc::Sender<DeviceCommand>,
    handle: JoinHandle<()>,
    finished: Arc<AtomicBool>,
}

fn device_error(reason: impl Into<String>) -> SndOutError {
    SndOutError::DeviceInit {
        module: RODIO_OUT_ID,
        reason: reason.into(),
    }
}

fn spawn_device(ctx: OutputContext) -> Result<DeviceWorker> {
    let (commands, command_rx) = mpsc::channel();
    let (ready_tx, ready_rx) = mpsc::sync_channel(1);
    let finished = Arc::new(AtomicBool::new(false));
    let source_finished = Arc::clone(&finished);

    let handle = thread::Builder::new()
        .name("sndout-rodio".into())
        .spawn(move || {
            let (stream, stream_handle) = match OutputStream::try_default() {
                Ok(pair) => pair,
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("failed to open output stream: {e}")));
                    return;
                }
            };
            let sink = match Sink::try_new(&stream_handle) {
                Ok(sink) => sink,
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("failed to create sink: {e}")));
                    return;
                }
            };

            append_layout(&sink, ctx.layout, ctx.reader, ctx.sample_rate, source_finished);
            let _ = ready_tx.send(Ok(()));

            for command in command_rx {
                match command {
                    DeviceCommand::Pause => sink.pause(),
                    DeviceCommand::Play => sink.play(),
                    DeviceCommand::Close => break,
                }
            }
            sink.stop();
            drop(stream);
            debug!("rodio device thread exiting");
        })?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(DeviceWorker {
            commands,
            handle,
            finished,
        }),
        Ok(Err(reason)) => {
            let _ = handle.join();
            Err(device_error(reason))
        }
        Err(_) => {
            let _ = handle.join();
            Err(device_error("device thread exited during startup"))
        }
    }
}

/// Output module backed by the default system device
#[derive(Default)]
pub struct RodioOut {
    worker: Option<DeviceWorker>,
    monitor: Option<RingMonitor>,
}

impl RodioOut {
    /// Create an unopened module
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the device thread is running
    pub fn is_open(&self) -> bool {
        self.worker.is_some()
    }

    fn send(&self, command: DeviceCommand) {
        if let Some(worker) = &self.worker {
            if worker.commands.send(command).is_err() {
                error!("rodio device thread is gone");
            }
        }
    }
}

impl OutputModule for RodioOut {
    fn init(&mut self, ctx: OutputContext) -> Result<()> {
        self.close();
        let monitor = ctx.monitor.clone();
        let channels = ctx.layout.channels();
        let sample_rate = ctx.sample_rate;
        self.worker = Some(spawn_device(ctx)?);
        self.monitor = Some(monitor);
        info!(sample_rate, channels, "rodio output opened");
        Ok(())
    }

    fn close(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.finished.store(true, Ordering::Relaxed);
            let _ = worker.commands.send(DeviceCommand::Close);
            if worker.handle.join().is_err() {
                error!("rodio device thread panicked");
            }
        }
        self.monitor = None;
    }

    fn set_paused(&mut self, paused: bool) {
        self.send(if paused {
            DeviceCommand::Pause
        } else {
            DeviceCommand::Play
        });
    }

    fn empty_sample_count(&self) -> usize {
        self.monitor
            .as_ref()
            .map(|monitor| monitor.size() - monitor.occupancy())
            .unwrap_or(0)
    }

    fn ident(&self) -> &'static str {
        RODIO_OUT_ID
    }

    fn long_name(&self) -> &'static str {
        "Default system device (rodio)"
    }
}

impl Drop for RodioOut {
    fn drop(&mut self) {
        self.close();
    }
}
