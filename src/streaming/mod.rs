//! Sample pipeline between the emulated sound core and the output device
//!
//! The producer side ([`SndWriter`]) batches samples into packets and commits
//! them to a lock-free [`SampleRing`]; the consumer side ([`SndReader`]) runs
//! in the device callback, applies drift recovery and converts ring samples
//! into the device's speaker layout.
//!
//! ```text
//! write() ─► packet ─► [effect] ─► [time-stretcher] ─► overrun check ─► SampleRing
//!                                                                          │
//! device callback ◄── layout conversion ◄── underrun freeze ◄──────────────┘
//! ```

pub mod effect;
pub mod reader;
pub mod ring_buffer;
pub mod stretch;
pub mod writer;

pub use effect::DspEffect;
pub use reader::{ConversionStrategy, SndReader};
pub use ring_buffer::{
    BufferStats, RingConsumer, RingEvents, RingMonitor, RingProducer, SampleRing,
};
pub use stretch::{PacketSink, PassthroughStretcher, TimeStretcher};
pub use writer::{SampleTap, SndWriter};

/// Samples per packet, the unit of commit and drop.
pub const SND_OUT_PACKET_SIZE: usize = 64;

/// Default output sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Samples converted per batch on the consumer side
pub(crate) const READ_CHUNK: usize = 512;
