//! Producer side of the pipeline
//!
//! [`SndWriter`] accumulates samples from the emulated sound core into fixed
//! packets. Each full packet is optionally silenced (after a buffer clear),
//! optionally run through a [`DspEffect`], then committed either through the
//! [`TimeStretcher`] or straight into the ring. Every commit applies the
//! overrun policy: a packet that does not fit is dropped whole.

use super::effect::DspEffect;
use super::ring_buffer::{RingMonitor, RingProducer};
use super::stretch::{PacketSink, TimeStretcher};
use crate::config::SndOutConfig;
use crate::sample::{StereoOut16, StereoOut32, StereoOutFloat};
use tracing::debug;

/// Packets forced to silence after [`SndWriter::clear_contents`]
pub const POST_CLEAR_SILENCE_PACKETS: u32 = 256;

/// Recording hook fed with every submitted sample at device precision
pub trait SampleTap: Send {
    /// Receive one sample.
    fn record(&mut self, sample: StereoOut16);

    /// Flush anything buffered; called when output shuts down.
    fn finish(&mut self) {}
}

/// Ring writer applying the drop-newest overrun policy
struct RingCommitter {
    producer: RingProducer,
    log_overruns: bool,
    overruns_pending: u32,
}

impl PacketSink for RingCommitter {
    fn write(&mut self, samples: &[StereoOut32]) -> bool {
        if self.producer.try_write(samples) {
            return true;
        }
        self.producer.record_overrun(samples.len());
        self.overruns_pending += 1;
        if self.log_overruns {
            debug!("overrun: 1 packet tossed ({} samples)", samples.len());
        }
        false
    }

    fn occupancy(&self) -> usize {
        self.producer.occupancy()
    }

    fn size(&self) -> usize {
        self.producer.size()
    }
}

/// Effect plugin plus its device-precision carry buffer
struct EffectStage {
    effect: Box<dyn DspEffect>,
    /// Two packets: leftover output followed by the packet being processed
    buffer: Vec<StereoOut16>,
    progress: usize,
    upsampled: Vec<StereoOut32>,
}

impl EffectStage {
    fn new(effect: Box<dyn DspEffect>, packet_size: usize) -> Self {
        EffectStage {
            effect,
            buffer: vec![StereoOut16::default(); packet_size * 2],
            progress: 0,
            upsampled: vec![StereoOut32::EMPTY; packet_size],
        }
    }

    fn process(&mut self, packet: &[StereoOut32], mut commit: impl FnMut(&[StereoOut32])) {
        let packet_size = packet.len();
        let start = self.progress;
        for (dst, src) in self.buffer[start..start + packet_size].iter_mut().zip(packet) {
            *dst = src.downsample();
        }

        let room = self.buffer.len() - start;
        let produced = self
            .effect
            .process(&mut self.buffer[start..], packet_size)
            .min(room);
        self.progress += produced;

        while self.progress >= packet_size {
            for (dst, src) in self.upsampled.iter_mut().zip(&self.buffer[..packet_size]) {
                *dst = src.upsample();
            }
            commit(&self.upsampled);
            self.buffer.copy_within(packet_size..self.progress, 0);
            self.progress -= packet_size;
        }
    }

    fn reset(&mut self) {
        self.progress = 0;
        self.effect.reset();
    }
}

/// Components a writer hands back on shutdown so they can be reused
pub(crate) struct WriterParts {
    pub stretcher: Option<Box<dyn TimeStretcher>>,
    pub effect: Option<Box<dyn DspEffect>>,
    pub tap: Option<Box<dyn SampleTap>>,
}

/// Producer-side packetizer
pub struct SndWriter {
    committer: RingCommitter,
    packet: Vec<StereoOut32>,
    packet_size: usize,
    silence_packets: u32,
    effect: Option<EffectStage>,
    stretcher: Option<Box<dyn TimeStretcher>>,
    tap: Option<Box<dyn SampleTap>>,
    bypass: bool,
}

impl SndWriter {
    /// Wrap the producer end of a ring.
    pub fn new(producer: RingProducer, config: &SndOutConfig) -> Self {
        SndWriter {
            committer: RingCommitter {
                producer,
                log_overruns: config.log_overruns,
                overruns_pending: 0,
            },
            packet: Vec::with_capacity(config.packet_size),
            packet_size: config.packet_size,
            silence_packets: 0,
            effect: None,
            stretcher: None,
            tap: None,
            bypass: false,
        }
    }

    /// Route packets through a time-stretcher.
    pub fn with_stretcher(mut self, stretcher: Box<dyn TimeStretcher>) -> Self {
        self.stretcher = Some(stretcher);
        self
    }

    /// Insert a post-processing effect before the commit.
    pub fn with_effect(mut self, effect: Box<dyn DspEffect>) -> Self {
        self.effect = Some(EffectStage::new(effect, self.packet_size));
        self
    }

    /// Record every submitted sample.
    pub fn with_tap(mut self, tap: Box<dyn SampleTap>) -> Self {
        self.tap = Some(tap);
        self
    }

    /// Skip buffering entirely; only the tap sees samples.
    pub fn bypass(mut self, bypass: bool) -> Self {
        self.bypass = bypass;
        self
    }

    /// Submit one working-precision sample.
    pub fn write(&mut self, sample: StereoOut32) {
        if let Some(tap) = self.tap.as_mut() {
            tap.record(sample.downsample());
        }
        if self.bypass {
            return;
        }

        self.packet.push(sample);
        if self.packet.len() < self.packet_size {
            return;
        }
        self.flush_packet();
    }

    /// Submit one float sample.
    pub fn write_float(&mut self, sample: StereoOutFloat) {
        self.write(sample.to_working());
    }

    fn flush_packet(&mut self) {
        if self.silence_packets > 0 {
            self.silence_packets -= 1;
            self.packet.fill(StereoOut32::EMPTY);
        }

        let committer = &mut self.committer;
        let stretcher = &mut self.stretcher;
        match self.effect.as_mut() {
            Some(stage) => stage.process(&self.packet, |out| commit(committer, stretcher, out)),
            None => commit(committer, stretcher, &self.packet),
        }
        self.packet.clear();

        self.dispatch_events();
    }

    /// Forward consumer events and pending overruns to the stretcher.
    fn dispatch_events(&mut self) {
        let events = self.committer.producer.poll_events();
        let overruns = std::mem::take(&mut self.committer.overruns_pending);
        let Some(stretcher) = self.stretcher.as_mut() else {
            return;
        };

        for _ in 0..events.underruns {
            stretcher.notify_underrun();
        }
        for _ in 0..overruns {
            let wanted = stretcher.notify_overrun();
            if wanted > 0 && self.committer.log_overruns {
                debug!("time-stretcher asked to drop {wanted} samples; newest packet dropped instead");
            }
        }
        if overruns > 0 || events.recoveries > 0 {
            stretcher.notify_rate_reset();
        }
    }

    /// Discard buffered audio and silence the next
    /// [`POST_CLEAR_SILENCE_PACKETS`] packets.
    pub fn clear_contents(&mut self) {
        self.committer.producer.request_flush();
        if let Some(stretcher) = self.stretcher.as_mut() {
            stretcher.clear();
        }
        if let Some(stage) = self.effect.as_mut() {
            stage.reset();
        }
        self.packet.clear();
        self.silence_packets = POST_CLEAR_SILENCE_PACKETS;
    }

    /// Packets still to be silenced after a clear
    pub fn silence_packets_remaining(&self) -> u32 {
        self.silence_packets
    }

    /// Samples waiting in the packet accumulator
    pub fn pending_samples(&self) -> usize {
        self.packet.len()
    }

    /// Whether buffering is skipped
    pub fn is_bypassed(&self) -> bool {
        self.bypass
    }

    /// Read-only view of the ring
    pub fn monitor(&self) -> RingMonitor {
        self.committer.producer.monitor()
    }

    pub(crate) fn into_parts(self) -> WriterParts {
        WriterParts {
            stretcher: self.stretcher,
            effect: self.effect.map(|stage| stage.effect),
            tap: self.tap,
        }
    }
}

fn commit(
    committer: &mut RingCommitter,
    stretcher: &mut Option<Box<dyn TimeStretcher>>,
    packet: &[StereoOut32],
) {
    match stretcher {
        Some(stretcher) => stretcher.process_write(packet, committer),
        None => {
            committer.write(packet);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::ring_buffer::{RingConsumer, SampleRing};
    use crate::streaming::PassthroughStretcher;
    use parking_lot::Mutex;
    use std::sync::Arc;

    const PACKET: usize = 4;

    fn writer(size: usize) -> (SndWriter, RingConsumer) {
        let config = SndOutConfig::default().packet_size(PACKET);
        let (producer, consumer) = SampleRing::new(size).unwrap().split();
        (SndWriter::new(producer, &config), consumer)
    }

    fn sample(value: i16) -> StereoOut32 {
        StereoOut16::new(value, value).upsample()
    }

    fn drain(consumer: &mut RingConsumer) -> Vec<i16> {
        let mut out = vec![StereoOut32::EMPTY; consumer.occupancy()];
        consumer.read(&mut out);
        out.iter().map(|s| s.downsample().left).collect()
    }

    #[test]
    fn test_packet_committed_only_when_full() {
        let (mut writer, mut consumer) = writer(64);
        for v in 1..=3 {
            writer.write(sample(v));
        }
        assert_eq!(consumer.occupancy(), 0);
        assert_eq!(writer.pending_samples(), 3);

        writer.write(sample(4));
        assert_eq!(writer.pending_samples(), 0);
        assert_eq!(drain(&mut consumer), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_overrun_drops_whole_packet() {
        // 9 samples: two packets fit (occupancy 8), the third is refused
        let (mut writer, mut consumer) = writer(9);
        for v in 0..12 {
            writer.write(sample(v));
        }
        let stats = writer.monitor().stats();
        assert_eq!(stats.overrun_count, 1);
        assert_eq!(stats.dropped_samples, PACKET as u64);
        assert_eq!(drain(&mut consumer), (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_clear_contents_silences_following_packets() {
        let (mut writer, mut consumer) = writer(4096);
        for v in 0..8 {
            writer.write(sample(v + 1));
        }
        writer.clear_contents();
        assert_eq!(writer.silence_packets_remaining(), POST_CLEAR_SILENCE_PACKETS);

        // The flush happens on the consumer's next read
        assert!(consumer.take_flush_request());
        assert_eq!(consumer.occupancy(), 0);

        for _ in 0..PACKET * 3 {
            writer.write(sample(100));
        }
        assert_eq!(writer.silence_packets_remaining(), POST_CLEAR_SILENCE_PACKETS - 3);
        // Silenced packets are still written, not skipped
        assert_eq!(drain(&mut consumer), vec![0; PACKET * 3]);
    }

    #[test]
    fn test_bypass_skips_buffer_but_feeds_tap() {
        struct Counter(Arc<Mutex<Vec<StereoOut16>>>);
        impl SampleTap for Counter {
            fn record(&mut self, sample: StereoOut16) {
                self.0.lock().push(sample);
            }
        }

        let recorded = Arc::new(Mutex::new(Vec::new()));
        let (writer, consumer) = writer(64);
        let mut writer = writer
            .with_tap(Box::new(Counter(Arc::clone(&recorded))))
            .bypass(true);
        for v in 0..10 {
            writer.write(sample(v));
        }
        assert_eq!(consumer.occupancy(), 0);
        assert_eq!(writer.pending_samples(), 0);
        assert_eq!(recorded.lock().len(), 10);
        assert_eq!(recorded.lock()[9], StereoOut16::new(9, 9));
    }

    #[test]
    fn test_write_float_full_scale() {
        let (mut writer, mut consumer) = writer(64);
        for _ in 0..PACKET {
            writer.write_float(StereoOutFloat::new(1.0, -1.0));
        }
        let mut out = [StereoOut32::EMPTY; PACKET];
        consumer.read(&mut out);
        assert_eq!(out[0].downsample(), StereoOut16::new(i16::MAX, -i16::MAX - 1));
    }

    /// Emits one sample for every two it receives, so output lags input
    struct HalfRate;

    impl DspEffect for HalfRate {
        fn process(&mut self, buffer: &mut [StereoOut16], input_len: usize) -> usize {
            let out = input_len / 2;
            for i in 0..out {
                buffer[i] = buffer[i * 2];
            }
            out
        }
    }

    /// Emits every input sample twice
    struct Doubler;

    impl DspEffect for Doubler {
        fn process(&mut self, buffer: &mut [StereoOut16], input_len: usize) -> usize {
            let input: Vec<StereoOut16> = buffer[..input_len].to_vec();
            for (i, s) in input.iter().enumerate() {
                buffer[i * 2] = *s;
                buffer[i * 2 + 1] = *s;
            }
            input_len * 2
        }
    }

    #[test]
    fn test_effect_leftover_carried_to_next_cycle() {
        let (writer, mut consumer) = writer(64);
        let mut writer = writer.with_effect(Box::new(HalfRate));

        for v in 0..PACKET as i16 {
            writer.write(sample(v));
        }
        // Two samples produced, not a whole packet yet
        assert_eq!(consumer.occupancy(), 0);

        for v in PACKET as i16..(PACKET * 2) as i16 {
            writer.write(sample(v));
        }
        assert_eq!(drain(&mut consumer), vec![0, 2, 4, 6]);
    }

    #[test]
    fn test_effect_output_larger_than_packet() {
        let (writer, mut consumer) = writer(64);
        let mut writer = writer.with_effect(Box::new(Doubler));
        for v in 1..=PACKET as i16 {
            writer.write(sample(v));
        }
        assert_eq!(drain(&mut consumer), vec![1, 1, 2, 2, 3, 3, 4, 4]);
    }

    #[derive(Default)]
    struct Events {
        writes: usize,
        underruns: usize,
        overruns: usize,
        resets: usize,
        clears: usize,
    }

    struct Recording(Arc<Mutex<Events>>);

    impl TimeStretcher for Recording {
        fn clear(&mut self) {
            self.0.lock().clears += 1;
        }

        fn process_write(&mut self, packet: &[StereoOut32], sink: &mut dyn PacketSink) {
            self.0.lock().writes += 1;
            PassthroughStretcher.process_write(packet, sink);
        }

        fn notify_underrun(&mut self) {
            self.0.lock().underruns += 1;
        }

        fn notify_overrun(&mut self) -> usize {
            self.0.lock().overruns += 1;
            PACKET
        }

        fn notify_rate_reset(&mut self) {
            self.0.lock().resets += 1;
        }
    }

    #[test]
    fn test_stretcher_routing_and_notifications() {
        let events = Arc::new(Mutex::new(Events::default()));
        let (writer, consumer) = writer(9);
        let mut writer = writer.with_stretcher(Box::new(Recording(Arc::clone(&events))));

        for v in 0..PACKET as i16 * 3 {
            writer.write(sample(v));
        }
        {
            let e = events.lock();
            assert_eq!(e.writes, 3);
            assert_eq!(e.overruns, 1);
            assert_eq!(e.resets, 1);
        }

        // Consumer-side underrun reaches the stretcher on the next flush
        consumer.record_underrun();
        consumer.record_recovery();
        for v in 0..PACKET as i16 {
            writer.write(sample(v));
        }
        {
            let e = events.lock();
            assert_eq!(e.underruns, 1);
            // one more overrun (ring still full) plus the recovery
            assert_eq!(e.resets, 2);
        }

        writer.clear_contents();
        assert_eq!(events.lock().clears, 1);
    }
}
