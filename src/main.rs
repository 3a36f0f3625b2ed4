use std::env;
use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use parking_lot::Mutex;
use sndout::{
    SampleTap, SndOut, SndOutConfig, SpeakerLayout, StereoOut16, StereoOut32, SyncMode,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Producer wake-up period
const PRODUCER_TICK_MS: u64 = 10;

/// Tone amplitude as a fraction of full scale
const TONE_LEVEL: f32 = 0.25;

/// Recording tap writing 16-bit stereo WAV
struct WavTap {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    failed: bool,
}

impl WavTap {
    fn create(path: &str, sample_rate: u32) -> anyhow::Result<Self> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("failed to create WAV file '{path}'"))?;
        Ok(WavTap {
            writer: Some(writer),
            failed: false,
        })
    }
}

impl SampleTap for WavTap {
    fn record(&mut self, sample: StereoOut16) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let result = writer
            .write_sample(sample.left)
            .and_then(|_| writer.write_sample(sample.right));
        if let Err(e) = result {
            if !self.failed {
                warn!("WAV capture stopped: {e}");
                self.failed = true;
            }
            self.writer = None;
        }
    }

    fn finish(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("failed to finalize WAV capture: {e}");
            }
        }
    }
}

struct Options {
    config: SndOutConfig,
    seconds: f32,
    frequency: f32,
    wav_path: Option<String>,
    list_modules: bool,
}

fn parse_named<T: serde::de::DeserializeOwned>(kind: &str, value: &str) -> anyhow::Result<T> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .with_context(|| format!("unknown {kind} '{value}'"))
}

fn print_usage() {
    eprintln!(
        "Usage:\n  sndout [options]\n\nOptions:\n  --list                 List output modules and exit\n  --config <file.json>   Load configuration (flags below override it)\n  --module <id>          Output module (default: nullout)\n  --layout <name>        stereo | stereo21 | quad | surround41 | surround51 |\n                         surround51_dpl | surround51_dpl2 | surround71\n  --sync <mode>          time_stretch | async | none\n  --latency <ms>         Target latency in milliseconds\n  --rate <hz>            Output sample rate\n  --seconds <n>          Tone duration (default 3)\n  --freq <hz>            Tone frequency (default 440)\n  --wav <file.wav>       Capture submitted samples to WAV\n  --log-overruns         Log underrun/overrun events (RUST_LOG=debug)\n  -h, --help             Show this help\n"
    );
}

fn parse_args() -> anyhow::Result<Option<Options>> {
    let mut config = SndOutConfig::default();
    let mut seconds = 3.0;
    let mut frequency = 440.0;
    let mut wav_path = None;
    let mut list_modules = false;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .with_context(|| format!("{name} requires an argument"))
        };
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                return Ok(None);
            }
            "--list" => list_modules = true,
            "--log-overruns" => config.log_overruns = true,
            "--config" => {
                let path = value("--config")?;
                config = SndOutConfig::load(&path)
                    .with_context(|| format!("failed to load config '{path}'"))?;
            }
            "--module" => config.output_module = value("--module")?,
            "--layout" => {
                config.speaker_layout = parse_named::<SpeakerLayout>("layout", &value("--layout")?)?
            }
            "--sync" => config.sync_mode = parse_named::<SyncMode>("sync mode", &value("--sync")?)?,
            "--latency" => config.latency_ms = value("--latency")?.parse()?,
            "--rate" => config.sample_rate = value("--rate")?.parse()?,
            "--seconds" => seconds = value("--seconds")?.parse()?,
            "--freq" => frequency = value("--freq")?.parse()?,
            "--wav" => wav_path = Some(value("--wav")?),
            _ => {
                print_usage();
                bail!("unknown argument: {arg}");
            }
        }
    }

    Ok(Some(Options {
        config,
        seconds,
        frequency,
        wav_path,
        list_modules,
    }))
}

fn tone_sample(phase: f32) -> StereoOut32 {
    let value = (phase.sin() * TONE_LEVEL * i16::MAX as f32) as i16;
    StereoOut16::new(value, value).upsample()
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let Some(options) = parse_args()? else {
        return Ok(());
    };

    let mut out = SndOut::new();
    if options.list_modules {
        println!("Output modules:");
        for module in out.registry().iter() {
            println!("  {:<10} {}", module.ident(), module.long_name());
        }
        return Ok(());
    }

    let config = options.config;
    if let Some(path) = &options.wav_path {
        out = out.with_tap(Box::new(WavTap::create(path, config.sample_rate)?));
    }

    let outcome = out.init(&config);
    if let Some(reason) = &outcome.fallback_reason {
        warn!("{reason}");
    }
    info!(
        module = outcome.module,
        layout = ?config.speaker_layout,
        sync = ?config.sync_mode,
        "playing {:.1}s tone at {} Hz",
        options.seconds,
        options.frequency
    );

    let out = Arc::new(Mutex::new(out));
    let total_samples = (options.seconds * config.sample_rate as f32) as u64;

    let producer = {
        let out = Arc::clone(&out);
        let sample_rate = config.sample_rate;
        let step = std::f32::consts::TAU * options.frequency / sample_rate as f32;
        thread::Builder::new()
            .name("sndout-producer".into())
            .spawn(move || {
                let start = Instant::now();
                let mut produced = 0u64;
                let mut phase = 0.0f32;
                while produced < total_samples {
                    let due = (start.elapsed().as_secs_f64() * sample_rate as f64) as u64;
                    let due = due.min(total_samples);
                    let mut out = out.lock();
                    while produced < due {
                        out.write(tone_sample(phase));
                        phase = (phase + step) % std::f32::consts::TAU;
                        produced += 1;
                    }
                    drop(out);
                    thread::sleep(Duration::from_millis(PRODUCER_TICK_MS));
                }
                produced
            })
            .context("failed to spawn producer thread")?
    };

    let Ok(produced) = producer.join() else {
        bail!("producer thread panicked");
    };

    let mut out = out.lock();
    let stats = out.stats();
    out.cleanup();

    println!("\n=== Output Statistics ===");
    println!("Module:            {}", outcome.module);
    println!("Samples submitted: {produced}");
    if let Some(stats) = stats {
        println!("Buffer size:       {} samples", stats.size);
        println!("Samples buffered:  {}", stats.samples_written);
        println!("Samples played:    {}", stats.samples_read);
        println!("Underruns:         {}", stats.underrun_count);
        println!("Recoveries:        {}", stats.recovery_count);
        println!("Overruns:          {} ({} samples dropped)", stats.overrun_count, stats.dropped_samples);
    }
    if let Some(path) = &options.wav_path {
        println!("WAV capture:       {path}");
    }

    Ok(())
}
