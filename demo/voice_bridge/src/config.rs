use std::fs;
use std::path::Path;

use serde::Deserialize;
use timbre_core::PipelineConfig;

/// High-level configuration for the Voice Bridge demo
#[derive(Clone, Debug)]
pub struct VoiceBridgeConfig {
    pub pipeline: PipelineConfig,
    /// How long the simulated producer streams, in seconds
    pub run_seconds: u64,
    /// Tone frequency for the synthetic producer, in Hz
    pub tone_hz: f32,
    /// Delay before the producer component activates, in milliseconds
    pub activation_delay_ms: u64,
}

impl Default for VoiceBridgeConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            run_seconds: std::env::var("BRIDGE_RUN_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(3),
            tone_hz: 440.0,
            activation_delay_ms: 500,
        }
    }
}

impl VoiceBridgeConfig {
    /// Load configuration from a TOML file (path via VOICE_BRIDGE_CONFIG or
    /// ./voice_bridge.toml), overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let default = Self::default();
        let path =
            std::env::var("VOICE_BRIDGE_CONFIG").unwrap_or_else(|_| "voice_bridge.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target = "voice_bridge", path = %path, "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match toml::from_str::<VoiceBridgeToml>(&s) {
                Ok(t) => t.overlay(default),
                Err(e) => {
                    tracing::warn!(target = "voice_bridge", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target = "voice_bridge", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }
}

/// On-disk TOML shape; every field optional so a partial file overlays
/// cleanly.
#[derive(Debug, Deserialize)]
struct VoiceBridgeToml {
    sample_rate_hz: Option<u32>,
    max_readers: Option<usize>,
    buffer_seconds: Option<u32>,
    producer_callsign: Option<String>,
    run_seconds: Option<u64>,
    tone_hz: Option<f32>,
    activation_delay_ms: Option<u64>,
}

impl VoiceBridgeToml {
    fn overlay(self, mut cfg: VoiceBridgeConfig) -> VoiceBridgeConfig {
        if let Some(v) = self.sample_rate_hz {
            cfg.pipeline.sample_rate_hz = v;
        }
        if let Some(v) = self.max_readers {
            cfg.pipeline.max_readers = v;
        }
        if let Some(v) = self.buffer_seconds {
            cfg.pipeline.buffer_seconds = v;
        }
        if let Some(v) = self.producer_callsign {
            cfg.pipeline.producer_callsign = v;
        }
        if let Some(v) = self.run_seconds {
            cfg.run_seconds = v;
        }
        if let Some(v) = self.tone_hz {
            cfg.tone_hz = v;
        }
        if let Some(v) = self.activation_delay_ms {
            cfg.activation_delay_ms = v;
        }
        cfg
    }
}
