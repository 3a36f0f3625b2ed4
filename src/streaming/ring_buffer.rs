//! Lock-free single-producer/single-consumer sample ring
//!
//! The ring stores [`StereoOut32`] samples at working precision. After
//! [`SampleRing::split`] exactly one [`RingProducer`] and one [`RingConsumer`]
//! exist, so the single-writer/single-reader discipline is enforced by
//! ownership rather than by a lock:
//! - `write_pos` is stored only by the producer (Release) and loaded by both
//! - `read_pos` is stored only by the consumer (Release) and loaded by both
//!
//! Occupancy is `(write_pos + size - read_pos) % size`, so at most `size - 1`
//! samples are ever buffered. An occupancy computed from a stale cursor is
//! conservative on both sides: the producer sees less free space, the
//! consumer sees less data.
//!
//! Besides the cursors, the ring carries the event counters surfaced through
//! [`BufferStats`] and a flush request the producer uses to ask the consumer
//! to discard everything buffered.

use crate::sample::StereoOut32;
use crate::{Result, SndOutError};
use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Fixed-size circular buffer of working-precision samples
pub struct SampleRing {
    storage: Box<[UnsafeCell<StereoOut32>]>,
    write_pos: AtomicUsize,
    read_pos: AtomicUsize,
    flush_requested: AtomicBool,
    underruns: AtomicU64,
    recoveries: AtomicU64,
    overruns: AtomicU64,
    dropped_samples: AtomicU64,
    samples_written: AtomicU64,
    samples_read: AtomicU64,
}

// SAFETY: cells in [read_pos, write_pos) are only touched by the consumer and
// cells outside it only by the producer. Ownership of each region changes
// hands through a Release store of the owning cursor paired with an Acquire
// load on the other side.
unsafe impl Sync for SampleRing {}

/// Snapshot of ring health for hosts and diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BufferStats {
    /// Ring size in samples
    pub size: usize,
    /// Samples currently buffered
    pub occupancy: usize,
    /// Occupancy as a fraction of the size (0.0 to 1.0)
    pub fill_percentage: f32,
    /// Reads that found less data than requested
    pub underrun_count: u64,
    /// Exits from the underrun freeze
    pub recovery_count: u64,
    /// Packets discarded because the ring was full
    pub overrun_count: u64,
    /// Samples discarded by overruns
    pub dropped_samples: u64,
    /// Samples committed by the producer
    pub samples_written: u64,
    /// Real samples handed to the device
    pub samples_read: u64,
}

/// Split a `len`-sample span starting at `start` into the part before the
/// physical end of the buffer and the part that wraps to index 0.
#[inline]
pub(crate) fn split_at_wrap(start: usize, len: usize, size: usize) -> (usize, usize) {
    let first = len.min(size - start);
    (first, len - first)
}

/// Advance a cursor by `len` samples, wrapping at `size`.
#[inline]
pub(crate) fn advance(pos: usize, len: usize, size: usize) -> usize {
    let next = pos + len;
    if next >= size {
        next - size
    } else {
        next
    }
}

#[inline]
fn occupancy_of(write: usize, read: usize, size: usize) -> usize {
    (write + size - read) % size
}

impl SampleRing {
    /// Allocate a ring of `size` samples.
    ///
    /// # Errors
    ///
    /// - [`SndOutError::Config`] if `size` is below 2 (no usable capacity)
    /// - [`SndOutError::Allocation`] if the storage cannot be reserved
    pub fn new(size: usize) -> Result<Self> {
        if size < 2 {
            return Err(SndOutError::Config(format!(
                "ring buffer size must be at least 2 samples, got {size}"
            )));
        }

        let mut storage = Vec::new();
        storage
            .try_reserve_exact(size)
            .map_err(|_| SndOutError::Allocation { samples: size })?;
        storage.resize_with(size, || UnsafeCell::new(StereoOut32::EMPTY));

        Ok(SampleRing {
            storage: storage.into_boxed_slice(),
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
            flush_requested: AtomicBool::new(false),
            underruns: AtomicU64::new(0),
            recoveries: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            dropped_samples: AtomicU64::new(0),
            samples_written: AtomicU64::new(0),
            samples_read: AtomicU64::new(0),
        })
    }

    /// Hand out the producer and consumer ends.
    pub fn split(self) -> (RingProducer, RingConsumer) {
        let ring = Arc::new(self);
        let producer = RingProducer {
            ring: Arc::clone(&ring),
            seen_underruns: 0,
            seen_recoveries: 0,
        };
        (producer, RingConsumer { ring })
    }

    /// Ring size in samples
    #[inline]
    pub fn size(&self) -> usize {
        self.storage.len()
    }

    fn snapshot_occupancy(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        occupancy_of(write, read, self.size())
    }

    fn stats(&self) -> BufferStats {
        let occupancy = self.snapshot_occupancy();
        BufferStats {
            size: self.size(),
            occupancy,
            fill_percentage: occupancy as f32 / self.size() as f32,
            underrun_count: self.underruns.load(Ordering::Relaxed),
            recovery_count: self.recoveries.load(Ordering::Relaxed),
            overrun_count: self.overruns.load(Ordering::Relaxed),
            dropped_samples: self.dropped_samples.load(Ordering::Relaxed),
            samples_written: self.samples_written.load(Ordering::Relaxed),
            samples_read: self.samples_read.load(Ordering::Relaxed),
        }
    }

    /// Copy `src` into the cells starting at `start`.
    ///
    /// # Safety
    ///
    /// `start + src.len() <= size` and the cells must belong to the caller.
    unsafe fn copy_in(&self, start: usize, src: &[StereoOut32]) {
        if src.is_empty() {
            return;
        }
        let dst = UnsafeCell::raw_get(self.storage.as_ptr().add(start));
        ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len());
    }

    /// Copy the cells starting at `start` into `dst`.
    ///
    /// # Safety
    ///
    /// `start + dst.len() <= size` and the cells must belong to the caller.
    unsafe fn copy_out(&self, start: usize, dst: &mut [StereoOut32]) {
        if dst.is_empty() {
            return;
        }
        let src = UnsafeCell::raw_get(self.storage.as_ptr().add(start));
        ptr::copy_nonoverlapping(src as *const StereoOut32, dst.as_mut_ptr(), dst.len());
    }
}

/// Read-only view of a ring, shareable with any thread
#[derive(Clone)]
pub struct RingMonitor {
    ring: Arc<SampleRing>,
}

impl RingMonitor {
    /// Ring size in samples
    pub fn size(&self) -> usize {
        self.ring.size()
    }

    /// Samples currently buffered (approximate)
    pub fn occupancy(&self) -> usize {
        self.ring.snapshot_occupancy()
    }

    /// Current statistics snapshot
    pub fn stats(&self) -> BufferStats {
        self.ring.stats()
    }
}

impl std::fmt::Debug for RingMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingMonitor")
            .field("size", &self.size())
            .field("occupancy", &self.occupancy())
            .finish()
    }
}

/// Consumer-side events observed by the producer since its last poll
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingEvents {
    /// New underrun entries
    pub underruns: u64,
    /// New underrun recoveries
    pub recoveries: u64,
}

/// Producer end of a [`SampleRing`]
pub struct RingProducer {
    ring: Arc<SampleRing>,
    seen_underruns: u64,
    seen_recoveries: u64,
}

impl RingProducer {
    /// Ring size in samples
    pub fn size(&self) -> usize {
        self.ring.size()
    }

    /// Samples currently buffered, as seen from the producer
    pub fn occupancy(&self) -> usize {
        let write = self.ring.write_pos.load(Ordering::Relaxed);
        let read = self.ring.read_pos.load(Ordering::Acquire);
        occupancy_of(write, read, self.size())
    }

    /// Free space, `size - occupancy`
    pub fn free(&self) -> usize {
        self.size() - self.occupancy()
    }

    /// Write `src` if it fits; otherwise leave the ring untouched.
    ///
    /// A packet is refused whole when `free() <= src.len()`, which keeps
    /// occupancy strictly below the size. Returns whether the samples were
    /// committed.
    pub fn try_write(&mut self, src: &[StereoOut32]) -> bool {
        if self.free() <= src.len() {
            return false;
        }
        self.write_unchecked(src);
        true
    }

    /// Bulk write without a capacity check.
    ///
    /// Caller must have verified `src.len() < free()`.
    pub(crate) fn write_unchecked(&mut self, src: &[StereoOut32]) {
        let ring = &*self.ring;
        let size = ring.size();
        debug_assert!(src.len() < self.free(), "ring write exceeds free space");

        let write = ring.write_pos.load(Ordering::Relaxed);
        let (first, second) = split_at_wrap(write, src.len(), size);
        // SAFETY: both segments lie within storage and outside the consumer's
        // region because the caller checked free space.
        unsafe {
            ring.copy_in(write, &src[..first]);
            ring.copy_in(0, &src[first..first + second]);
        }
        ring.write_pos
            .store(advance(write, src.len(), size), Ordering::Release);
        ring.samples_written
            .fetch_add(src.len() as u64, Ordering::Relaxed);
    }

    /// Count one discarded packet of `samples` samples.
    pub fn record_overrun(&self, samples: usize) {
        self.ring.overruns.fetch_add(1, Ordering::Relaxed);
        self.ring
            .dropped_samples
            .fetch_add(samples as u64, Ordering::Relaxed);
    }

    /// Ask the consumer to discard everything buffered on its next read.
    pub fn request_flush(&self) {
        self.ring.flush_requested.store(true, Ordering::Release);
    }

    /// Collect consumer events that happened since the previous poll.
    pub fn poll_events(&mut self) -> RingEvents {
        let underruns = self.ring.underruns.load(Ordering::Relaxed);
        let recoveries = self.ring.recoveries.load(Ordering::Relaxed);
        let events = RingEvents {
            underruns: underruns - self.seen_underruns,
            recoveries: recoveries - self.seen_recoveries,
        };
        self.seen_underruns = underruns;
        self.seen_recoveries = recoveries;
        events
    }

    /// Read-only view for statistics
    pub fn monitor(&self) -> RingMonitor {
        RingMonitor {
            ring: Arc::clone(&self.ring),
        }
    }
}

/// Consumer end of a [`SampleRing`]
pub struct RingConsumer {
    ring: Arc<SampleRing>,
}

impl RingConsumer {
    /// Ring size in samples
    pub fn size(&self) -> usize {
        self.ring.size()
    }

    /// Samples currently buffered, as seen from the consumer
    pub fn occupancy(&self) -> usize {
        let write = self.ring.write_pos.load(Ordering::Acquire);
        let read = self.ring.read_pos.load(Ordering::Relaxed);
        occupancy_of(write, read, self.size())
    }

    /// Read up to `dst.len()` samples; returns how many were copied.
    pub fn read(&mut self, dst: &mut [StereoOut32]) -> usize {
        let count = dst.len().min(self.occupancy());
        self.read_unchecked(&mut dst[..count]);
        count
    }

    /// Discard up to `count` samples without copying; returns how many were
    /// dropped.
    pub fn drop_samples(&mut self, count: usize) -> usize {
        let count = count.min(self.occupancy());
        let size = self.size();
        let read = self.ring.read_pos.load(Ordering::Relaxed);
        self.ring
            .read_pos
            .store(advance(read, count, size), Ordering::Release);
        count
    }

    /// Bulk read without an occupancy check.
    ///
    /// Caller must have verified `dst.len() <= occupancy()`.
    pub(crate) fn read_unchecked(&mut self, dst: &mut [StereoOut32]) {
        let ring = &*self.ring;
        let size = ring.size();
        debug_assert!(dst.len() <= self.occupancy(), "ring read exceeds occupancy");

        let read = ring.read_pos.load(Ordering::Relaxed);
        let (first, second) = split_at_wrap(read, dst.len(), size);
        // SAFETY: both segments lie within storage and inside the region the
        // producer published with its Release store.
        unsafe {
            let (head, tail) = dst.split_at_mut(first);
            ring.copy_out(read, head);
            ring.copy_out(0, &mut tail[..second]);
        }
        ring.read_pos
            .store(advance(read, dst.len(), size), Ordering::Release);
        ring.samples_read
            .fetch_add(dst.len() as u64, Ordering::Relaxed);
    }

    /// Honour a pending flush request by dropping everything buffered.
    ///
    /// Returns `true` if a flush was performed.
    pub fn take_flush_request(&mut self) -> bool {
        if !self.ring.flush_requested.swap(false, Ordering::AcqRel) {
            return false;
        }
        let write = self.ring.write_pos.load(Ordering::Acquire);
        self.ring.read_pos.store(write, Ordering::Release);
        true
    }

    /// Count an underrun entry.
    pub fn record_underrun(&self) {
        self.ring.underruns.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an underrun recovery.
    pub fn record_recovery(&self) {
        self.ring.recoveries.fetch_add(1, Ordering::Relaxed);
    }

    /// Read-only view for statistics
    pub fn monitor(&self) -> RingMonitor {
        RingMonitor {
            ring: Arc::clone(&self.ring),
        }
    }
}
