// Timbre Core Library
// Bridges a live audio source into a voice-processing pipeline and
// coordinates cross-cutting interaction state for that pipeline.

pub mod audio;
pub mod dialog;
pub mod host;
pub mod interaction;

// Export core types
pub use audio::bridge::{BindingState, CaptureBridge};
pub use audio::producer::{AudioFrame, AudioProfile, VoiceProducer, VoiceSink};
pub use audio::ring::{
    calculate_buffer_size, AudioRing, RingReader, RingStats, RingWriter, WriterPolicy,
};
pub use dialog::{
    DialogStateCoordinator, DialogStateObserver, DialogUxState, DialogUxStateObserver,
    NormalizedState, PlayerActivity, PlayerActivityObserver,
};
pub use host::{ComponentHost, ComponentState, LifecycleObserver};
pub use interaction::{
    AuthState, AuthStateObserver, CapabilitiesState, CapabilitiesStateObserver, ExecStatus,
    InputCommand, InteractionGate, InteractionHandler, LogoutObserver,
};

use std::sync::Arc;

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TimbreError {
    #[error("Audio stream error: {0}")]
    AudioStreamError(String),

    #[error("Reader overrun: {lost} words lost")]
    ReaderOverrun { lost: u64 },

    #[error("Binding error: {0}")]
    BindingError(String),

    #[error("Host error: {0}")]
    HostError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
pub type Result<T> = std::result::Result<T, TimbreError>;

/// Pipeline configuration. Defaults match the reference device profile:
/// 16 kHz mono PCM16, a 15 second ring, up to 10 concurrent readers.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct PipelineConfig {
    /// Audio sample rate in Hz
    pub sample_rate_hz: u32,
    /// Size of one audio word in bytes (2 for PCM16)
    pub word_size: usize,
    /// Maximum number of concurrent ring readers
    pub max_readers: usize,
    /// Amount of audio data held in the ring, in seconds
    pub buffer_seconds: u32,
    /// Callsign of the component providing voice audio input
    pub producer_callsign: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let producer_callsign =
            std::env::var("BRIDGE_CALLSIGN").unwrap_or_else(|_| "VoiceControl".to_string());
        let buffer_seconds = std::env::var("BRIDGE_BUFFER_SECS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(15);
        Self {
            sample_rate_hz: 16_000,
            word_size: 2,
            max_readers: 10,
            buffer_seconds,
            producer_callsign,
        }
    }
}

impl PipelineConfig {
    /// Byte capacity of the shared ring for this configuration.
    pub fn buffer_size_bytes(&self) -> usize {
        let duration_words = self.sample_rate_hz as usize * self.buffer_seconds as usize;
        calculate_buffer_size(duration_words, self.word_size, self.max_readers)
    }
}

/// Core runtime: wires the shared ring, the capture bridge, the
/// interaction gate and the dialog state coordinator together. Owns no
/// threads; every component is driven by its callers.
pub struct Pipeline {
    pub host: Arc<ComponentHost>,
    pub ring: Arc<AudioRing>,
    pub bridge: Arc<CaptureBridge>,
    pub gate: Arc<InteractionGate>,
    pub coordinator: Arc<DialogStateCoordinator>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, handler: Arc<dyn InteractionHandler>) -> Result<Self> {
        let host = Arc::new(ComponentHost::new());
        let ring = AudioRing::new(
            config.buffer_size_bytes(),
            config.word_size,
            config.max_readers,
        )?;
        let bridge = CaptureBridge::create(
            Arc::clone(&ring),
            Arc::clone(&host),
            &config.producer_callsign,
            Some(Arc::clone(&handler)),
        )?;
        let gate = Arc::new(InteractionGate::new(handler));
        let coordinator = Arc::new(DialogStateCoordinator::new());

        tracing::info!(
            callsign = %config.producer_callsign,
            sample_rate_hz = config.sample_rate_hz,
            buffer_seconds = config.buffer_seconds,
            "Pipeline started"
        );
        Ok(Self {
            host,
            ring,
            bridge,
            gate,
            coordinator,
        })
    }

    /// Close the shared ring. Subsequent writes and reads fail; the
    /// bridge keeps absorbing producer callbacks without touching it.
    pub fn shutdown(&self) {
        self.ring.close();
        tracing::info!("Pipeline shut down");
    }
}
