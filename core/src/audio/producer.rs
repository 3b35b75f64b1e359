//! The boundary to the external audio-producing component.
//!
//! A producer pushes audio on its own thread through three callbacks:
//! `start` and `stop` frame zero or more `data` calls. Resolution by
//! callsign happens through the [`ComponentHost`](crate::host).

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Audio profile reported by the producer at transmission start. Stays
/// the same between `start()` and `stop()`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioProfile {
    pub sample_rate_hz: u32,
    pub channels: u16,
    /// Size of one sample word in bytes
    pub word_size: usize,
}

impl Default for AudioProfile {
    fn default() -> Self {
        Self {
            sample_rate_hz: 16_000,
            channels: 1,
            word_size: 2,
        }
    }
}

/// One push of audio data. Transient: produced and consumed within a
/// single callback invocation.
#[derive(Clone, Copy, Debug)]
pub struct AudioFrame<'a> {
    /// Ordered sequence number of this frame
    pub seq: u32,
    pub bytes: &'a [u8],
}

impl<'a> AudioFrame<'a> {
    pub fn new(seq: u32, bytes: &'a [u8]) -> Self {
        Self { seq, bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Receiving end of a producer's push interface. Implemented by the
/// capture bridge; invoked on the producer's delivery thread.
pub trait VoiceSink: Send + Sync {
    /// Invoked at each start of audio transmission.
    fn start(&self, profile: &AudioProfile);

    /// Invoked for each push of audio data between `start` and `stop`.
    fn data(&self, frame: AudioFrame<'_>);

    /// Invoked at each stop of audio transmission; the profile given to
    /// `start` is no longer valid afterwards.
    fn stop(&self);
}

/// An external component generating raw audio. Exactly one sink is
/// attached at a time; attaching replaces the previous sink.
pub trait VoiceProducer: Send + Sync {
    fn attach_sink(&self, sink: Arc<dyn VoiceSink>);
}
