// Audio capture surface: shared ring, producer boundary, capture bridge

pub mod bridge;
pub mod producer;
pub mod ring;

pub use bridge::{BindingState, CaptureBridge};
pub use producer::{AudioFrame, AudioProfile, VoiceProducer, VoiceSink};
pub use ring::{calculate_buffer_size, AudioRing, RingReader, RingStats, RingWriter, WriterPolicy};

#[cfg(feature = "mic")]
pub mod mic;

#[cfg(feature = "mic")]
pub use mic::{MicProducer, MicProducerConfig};
