//! Shared audio ring: fixed-capacity, single-writer/multi-reader
//! circular store of fixed-width audio words.
//!
//! The writer never blocks: a write that cannot fully fit is truncated,
//! and a reader that falls behind by more than the capacity loses the
//! overwritten words instead of stalling the producer.

use crate::{Result, TimbreError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Fixed bookkeeping block at the head of the buffer layout.
pub const RING_HEADER_SIZE: usize = 64;

/// Per-reader cursor slot in the buffer layout.
pub const READER_CURSOR_SIZE: usize = 8;

/// Required byte capacity for a ring holding `duration_words` words of
/// `word_size` bytes with up to `max_readers` concurrent readers.
///
/// Downstream components size shared memory from this value, so the
/// formula is fixed: header block, one cursor slot per reader, then the
/// data region. Deterministic and monotonically increasing in every
/// argument.
pub const fn calculate_buffer_size(
    duration_words: usize,
    word_size: usize,
    max_readers: usize,
) -> usize {
    RING_HEADER_SIZE + max_readers * READER_CURSOR_SIZE + duration_words * word_size
}

/// Writer policy. Only the non-blocking policy exists: a write that
/// would overrun is cut short rather than suspending the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterPolicy {
    NonBlocking,
}

/// Ring counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RingStats {
    pub words_written: u64,
    pub words_truncated: u64,
    pub reader_overruns: u64,
}

/// Shared audio ring buffer. Created once at pipeline start and closed
/// at shutdown; ownership is shared between the capture bridge (writer)
/// and downstream consumers (readers).
pub struct AudioRing {
    word_size: usize,
    capacity_words: u64,
    max_readers: usize,

    // Data region; the lock also serializes cursor movement against
    // in-progress copies.
    data: Mutex<Box<[u8]>>,

    // Total words ever written (absolute, never wraps).
    write_cursor: AtomicU64,

    writer_claimed: AtomicBool,
    reader_count: AtomicUsize,
    closed: AtomicBool,

    words_written: AtomicU64,
    words_truncated: AtomicU64,
    reader_overruns: AtomicU64,
}

impl AudioRing {
    /// Build a ring inside `size_bytes` of backing storage, as computed
    /// by [`calculate_buffer_size`]. Fails when the size cannot hold the
    /// bookkeeping overhead plus at least one word.
    pub fn new(size_bytes: usize, word_size: usize, max_readers: usize) -> Result<Arc<Self>> {
        if word_size == 0 {
            return Err(TimbreError::AudioStreamError(
                "word size must be non-zero".to_string(),
            ));
        }
        let overhead = RING_HEADER_SIZE + max_readers * READER_CURSOR_SIZE;
        let capacity_words = size_bytes.saturating_sub(overhead) / word_size;
        if capacity_words == 0 {
            return Err(TimbreError::AudioStreamError(format!(
                "buffer of {} bytes cannot hold any words (overhead {} bytes, word size {})",
                size_bytes, overhead, word_size
            )));
        }

        info!(
            capacity_words,
            word_size, max_readers, "Audio ring created"
        );
        Ok(Arc::new(Self {
            word_size,
            capacity_words: capacity_words as u64,
            max_readers,
            data: Mutex::new(vec![0u8; capacity_words * word_size].into_boxed_slice()),
            write_cursor: AtomicU64::new(0),
            writer_claimed: AtomicBool::new(false),
            reader_count: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            words_written: AtomicU64::new(0),
            words_truncated: AtomicU64::new(0),
            reader_overruns: AtomicU64::new(0),
        }))
    }

    /// Claim the single writer handle. A second call fails while the
    /// first handle is alive.
    pub fn create_writer(self: &Arc<Self>, policy: WriterPolicy) -> Result<RingWriter> {
        if self
            .writer_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TimbreError::AudioStreamError(
                "ring already has an active writer".to_string(),
            ));
        }
        debug!(?policy, "Ring writer created");
        Ok(RingWriter {
            ring: Arc::clone(self),
            policy,
        })
    }

    /// Attach a reader starting at the current write position. Fails
    /// once `max_readers` readers are alive.
    pub fn create_reader(self: &Arc<Self>) -> Result<RingReader> {
        if self.is_closed() {
            return Err(TimbreError::AudioStreamError(
                "ring is closed".to_string(),
            ));
        }
        let mut count = self.reader_count.load(Ordering::Acquire);
        loop {
            if count >= self.max_readers {
                return Err(TimbreError::AudioStreamError(format!(
                    "reader limit reached ({})",
                    self.max_readers
                )));
            }
            match self.reader_count.compare_exchange(
                count,
                count + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => count = actual,
            }
        }
        Ok(RingReader {
            cursor: self.write_cursor.load(Ordering::Acquire),
            ring: Arc::clone(self),
        })
    }

    /// Mark the medium gone. Subsequent writes and reads fail.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        info!("Audio ring closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn word_size(&self) -> usize {
        self.word_size
    }

    pub fn capacity_words(&self) -> u64 {
        self.capacity_words
    }

    /// Total words ever written (absolute position of the write cursor).
    pub fn write_cursor(&self) -> u64 {
        self.write_cursor.load(Ordering::Acquire)
    }

    /// Snapshot of the ring counters.
    pub fn stats(&self) -> RingStats {
        RingStats {
            words_written: self.words_written.load(Ordering::Relaxed),
            words_truncated: self.words_truncated.load(Ordering::Relaxed),
            reader_overruns: self.reader_overruns.load(Ordering::Relaxed),
        }
    }
}

/// The exclusive writer handle. Held by the capture bridge.
pub struct RingWriter {
    ring: Arc<AudioRing>,
    #[allow(dead_code)]
    policy: WriterPolicy,
}

impl RingWriter {
    pub fn word_size(&self) -> usize {
        self.ring.word_size
    }

    /// Append `bytes.len() / word_size` words at the write cursor.
    /// Trailing bytes that do not fill a whole word are dropped. A
    /// single write larger than the ring is truncated to the capacity.
    /// Returns the number of words written; fails only when the ring
    /// has been closed. Not retried by callers: audio is time-sensitive
    /// and there is nothing to retry against.
    pub fn write(&self, bytes: &[u8]) -> Result<usize> {
        if self.ring.is_closed() {
            return Err(TimbreError::AudioStreamError("ring closed".to_string()));
        }
        let word_size = self.ring.word_size;
        let capacity = self.ring.capacity_words;
        let mut words = (bytes.len() / word_size) as u64;
        if words == 0 {
            return Ok(0);
        }
        if words > capacity {
            self.ring
                .words_truncated
                .fetch_add(words - capacity, Ordering::Relaxed);
            words = capacity;
        }

        let mut data = self.ring.data.lock().unwrap();
        let cursor = self.ring.write_cursor.load(Ordering::Relaxed);
        let start = (cursor % capacity) as usize;
        let words_usize = words as usize;
        let first = (capacity as usize - start).min(words_usize);
        data[start * word_size..(start + first) * word_size]
            .copy_from_slice(&bytes[..first * word_size]);
        if words_usize > first {
            let rest = words_usize - first;
            data[..rest * word_size]
                .copy_from_slice(&bytes[first * word_size..words_usize * word_size]);
        }
        self.ring.write_cursor.store(cursor + words, Ordering::Release);
        drop(data);

        self.ring.words_written.fetch_add(words, Ordering::Relaxed);
        Ok(words_usize)
    }
}

impl Drop for RingWriter {
    fn drop(&mut self) {
        self.ring.writer_claimed.store(false, Ordering::Release);
    }
}

/// An independent reader cursor over the shared ring.
pub struct RingReader {
    ring: Arc<AudioRing>,
    cursor: u64,
}

impl RingReader {
    pub fn word_size(&self) -> usize {
        self.ring.word_size
    }

    /// Copy up to `buf.len() / word_size` words into `buf` without
    /// blocking; returns the number of words read (0 when no data is
    /// pending). When the writer has lapped this reader the overwritten
    /// words are reported once as [`TimbreError::ReaderOverrun`] and the
    /// cursor snaps to the oldest retained word.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.ring.is_closed() {
            return Err(TimbreError::AudioStreamError("ring closed".to_string()));
        }
        let word_size = self.ring.word_size;
        let capacity = self.ring.capacity_words;

        let data = self.ring.data.lock().unwrap();
        let write_cursor = self.ring.write_cursor.load(Ordering::Acquire);
        let behind = write_cursor - self.cursor;
        if behind > capacity {
            let lost = behind - capacity;
            self.cursor = write_cursor - capacity;
            self.ring.reader_overruns.fetch_add(1, Ordering::Relaxed);
            return Err(TimbreError::ReaderOverrun { lost });
        }

        let words = ((buf.len() / word_size) as u64).min(behind) as usize;
        if words == 0 {
            return Ok(0);
        }
        let start = (self.cursor % capacity) as usize;
        let first = (capacity as usize - start).min(words);
        buf[..first * word_size].copy_from_slice(&data[start * word_size..(start + first) * word_size]);
        if words > first {
            let rest = words - first;
            buf[first * word_size..words * word_size].copy_from_slice(&data[..rest * word_size]);
        }
        self.cursor += words as u64;
        Ok(words)
    }

    /// Absolute position of this reader's cursor, in words.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }
}

impl Drop for RingReader {
    fn drop(&mut self) {
        self.ring.reader_count.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_ring(capacity_words: usize) -> Arc<AudioRing> {
        let size = calculate_buffer_size(capacity_words, 2, 2);
        AudioRing::new(size, 2, 2).unwrap()
    }

    fn pcm(words: std::ops::Range<u16>) -> Vec<u8> {
        words.flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn test_buffer_size_deterministic_and_monotonic() {
        let base = calculate_buffer_size(240_000, 2, 10);
        assert_eq!(base, calculate_buffer_size(240_000, 2, 10));
        assert!(calculate_buffer_size(240_001, 2, 10) > base);
        assert!(calculate_buffer_size(240_000, 4, 10) > base);
        assert!(calculate_buffer_size(240_000, 2, 11) > base);
    }

    #[test]
    fn test_buffer_size_reference_profile() {
        // 16 kHz * 15 s of PCM16 with 10 readers
        let size = calculate_buffer_size(16_000 * 15, 2, 10);
        assert_eq!(size, 64 + 10 * 8 + 16_000 * 15 * 2);
    }

    #[test]
    fn test_single_writer_invariant() {
        let ring = small_ring(16);
        let writer = ring.create_writer(WriterPolicy::NonBlocking).unwrap();
        assert!(ring.create_writer(WriterPolicy::NonBlocking).is_err());
        drop(writer);
        // Writer slot is released with the handle
        assert!(ring.create_writer(WriterPolicy::NonBlocking).is_ok());
    }

    #[test]
    fn test_write_wraps_and_reads_back() {
        let ring = small_ring(8);
        let writer = ring.create_writer(WriterPolicy::NonBlocking).unwrap();
        let mut reader = ring.create_reader().unwrap();

        let mut buf = vec![0u8; 16];
        assert_eq!(writer.write(&pcm(0..6)).unwrap(), 6);
        assert_eq!(reader.read(&mut buf).unwrap(), 6);
        assert_eq!(buf[..12], pcm(0..6)[..]);

        // Second write wraps around the end of the data region
        assert_eq!(writer.write(&pcm(6..12)).unwrap(), 6);
        assert_eq!(reader.read(&mut buf).unwrap(), 6);
        assert_eq!(buf[..12], pcm(6..12)[..]);
    }

    #[test]
    fn test_partial_word_bytes_dropped() {
        let ring = small_ring(8);
        let writer = ring.create_writer(WriterPolicy::NonBlocking).unwrap();
        assert_eq!(writer.write(&[1u8, 2, 3]).unwrap(), 1);
        assert_eq!(writer.write(&[9u8]).unwrap(), 0);
    }

    #[test]
    fn test_reader_overrun_snaps_to_oldest() {
        let ring = small_ring(4);
        let writer = ring.create_writer(WriterPolicy::NonBlocking).unwrap();
        let mut reader = ring.create_reader().unwrap();

        // Lap the reader: 6 words total through a 4-word ring
        writer.write(&pcm(0..4)).unwrap();
        writer.write(&pcm(4..6)).unwrap();
        let mut buf = vec![0u8; 16];
        match reader.read(&mut buf) {
            Err(TimbreError::ReaderOverrun { lost }) => assert_eq!(lost, 2),
            other => panic!("expected overrun, got {:?}", other.map(|_| ())),
        }
        // Next read resumes from the oldest retained word
        assert_eq!(reader.read(&mut buf).unwrap(), 4);
        assert_eq!(buf[..8], pcm(2..6)[..]);
        assert_eq!(ring.stats().reader_overruns, 1);
    }

    #[test]
    fn test_oversized_write_truncated() {
        let ring = small_ring(4);
        let writer = ring.create_writer(WriterPolicy::NonBlocking).unwrap();
        assert_eq!(writer.write(&pcm(0..9)).unwrap(), 4);
        assert_eq!(ring.stats().words_truncated, 5);
    }

    #[test]
    fn test_closed_ring_rejects_io() {
        let ring = small_ring(8);
        let writer = ring.create_writer(WriterPolicy::NonBlocking).unwrap();
        let mut reader = ring.create_reader().unwrap();
        ring.close();
        assert!(writer.write(&pcm(0..2)).is_err());
        assert!(reader.read(&mut [0u8; 4]).is_err());
    }

    #[test]
    fn test_max_readers_enforced() {
        let ring = small_ring(8);
        let r1 = ring.create_reader().unwrap();
        let _r2 = ring.create_reader().unwrap();
        assert!(ring.create_reader().is_err());
        drop(r1);
        assert!(ring.create_reader().is_ok());
    }
}
