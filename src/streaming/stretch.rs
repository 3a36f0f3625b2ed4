//! Adaptive-rate compensation hooks
//!
//! When [`crate::SyncMode::TimeStretch`] is selected, every full packet is
//! handed to a [`TimeStretcher`] instead of being committed directly. The
//! stretcher decides when and how much to forward into the ring through the
//! [`PacketSink`] it is given; every forwarded write still goes through the
//! overrun drop policy.
//!
//! The stretching algorithm itself lives outside this crate. Hosts inject one
//! with [`crate::SndOut::with_stretcher`]; without one, [`PassthroughStretcher`]
//! forwards packets unchanged.

use crate::sample::StereoOut32;

/// Destination for stretched packets
pub trait PacketSink {
    /// Commit `samples` to the ring, applying the overrun drop policy.
    ///
    /// Returns `false` if the whole write was discarded.
    fn write(&mut self, samples: &[StereoOut32]) -> bool;

    /// Samples currently buffered
    fn occupancy(&self) -> usize;

    /// Ring size in samples
    fn size(&self) -> usize;
}

/// External time-stretching collaborator
///
/// All methods run on the producer thread. Event notifications that originate
/// on the consumer side (underruns, recoveries) are delivered on the next
/// packet flush.
pub trait TimeStretcher: Send {
    /// Prepare for output at `sample_rate`.
    fn init(&mut self, _sample_rate: u32) {}

    /// Release resources when output shuts down.
    fn cleanup(&mut self) {}

    /// Discard internal state after the buffer was cleared.
    fn clear(&mut self) {}

    /// Process one packet and forward any output to `sink`.
    fn process_write(&mut self, packet: &[StereoOut32], sink: &mut dyn PacketSink);

    /// The consumer found less data than it needed.
    fn notify_underrun(&mut self) {}

    /// A write was discarded because the ring was full.
    ///
    /// Returns the number of buffered samples the stretcher would like
    /// dropped to catch up.
    fn notify_overrun(&mut self) -> usize {
        0
    }

    /// Re-normalize the internal rate estimate.
    fn notify_rate_reset(&mut self) {}
}

/// Rate-neutral stretcher: forwards every packet as-is.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughStretcher;

impl TimeStretcher for PassthroughStretcher {
    fn process_write(&mut self, packet: &[StereoOut32], sink: &mut dyn PacketSink) {
        sink.write(packet);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct VecSink {
        written: Vec<StereoOut32>,
        limit: usize,
    }

    impl PacketSink for VecSink {
        fn write(&mut self, samples: &[StereoOut32]) -> bool {
            if self.size() - self.occupancy() <= samples.len() {
                return false;
            }
            self.written.extend_from_slice(samples);
            true
        }

        fn occupancy(&self) -> usize {
            self.written.len()
        }

        fn size(&self) -> usize {
            self.limit
        }
    }

    #[test]
    fn test_passthrough_forwards_unchanged() {
        let mut sink = VecSink {
            limit: 64,
            ..Default::default()
        };
        let packet = [StereoOut32::new(1, 2), StereoOut32::new(3, 4)];
        let mut stretcher = PassthroughStretcher;
        stretcher.process_write(&packet, &mut sink);
        assert_eq!(sink.written, packet);
        assert_eq!(stretcher.notify_overrun(), 0);
    }

    #[test]
    fn test_passthrough_respects_sink_refusal() {
        let mut sink = VecSink {
            limit: 3,
            ..Default::default()
        };
        let packet = [StereoOut32::new(1, 1); 3];
        PassthroughStretcher.process_write(&packet, &mut sink);
        assert!(sink.written.is_empty());
    }
}
