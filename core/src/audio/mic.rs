//! Live microphone producer backed by cpal.
//!
//! Linux build note: you need ALSA development headers for `cpal`.
//! On Debian/Ubuntu:
//!   sudo apt-get update && sudo apt-get install -y libasound2-dev pkg-config
//! Then run the example with:
//!   cargo run -p timbre-core --example mic_capture --features mic
//!
//! The capture thread owns the (non-Send) cpal stream and plays the
//! role of the producer's delivery thread: frames reach the attached
//! sink in capture order, and packets arriving before a sink is
//! attached are dropped.

use crate::audio::producer::{AudioFrame, AudioProfile, VoiceProducer, VoiceSink};
use crate::{Result, TimbreError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Configuration for the microphone producer
#[derive(Clone, Debug)]
pub struct MicProducerConfig {
    /// Desired sample rate; the device's default config wins if it differs
    pub sample_rate_hz: u32,
    /// Desired channels; default mono
    pub channels: u16,
    /// Chunk size in milliseconds per emitted frame
    pub chunk_ms: u32,
    /// Optional input device name substring to match
    pub device_name: Option<String>,
}

impl Default for MicProducerConfig {
    fn default() -> Self {
        let chunk_ms = std::env::var("MIC_CHUNK_MS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(20);
        Self {
            sample_rate_hz: 16_000,
            channels: 1,
            chunk_ms,
            device_name: std::env::var("MIC_DEVICE").ok(),
        }
    }
}

/// A [`VoiceProducer`] that pushes PCM16LE frames captured from the
/// default (or name-matched) input device.
pub struct MicProducer {
    config: MicProducerConfig,
    sink: Mutex<Option<Arc<dyn VoiceSink>>>,
}

impl VoiceProducer for MicProducer {
    fn attach_sink(&self, sink: Arc<dyn VoiceSink>) {
        *self.sink.lock().unwrap() = Some(sink);
    }
}

struct AudioPacket {
    samples: Vec<i16>,
    sample_rate_hz: u32,
    channels: u16,
}

impl MicProducer {
    pub fn new(config: MicProducerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            sink: Mutex::new(None),
        })
    }

    /// Start the capture loop. Returns a handle to the background task
    /// pumping frames into the attached sink.
    pub async fn start(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        let producer = Arc::clone(self);
        let cfg = self.config.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = run_capture_loop(producer, cfg).await {
                error!("MicProducer stopped with error: {}", e);
            }
        });
        Ok(handle)
    }
}

async fn run_capture_loop(producer: Arc<MicProducer>, config: MicProducerConfig) -> Result<()> {
    // Channel from the cpal callback thread to the async pump
    let (tx, mut rx) = mpsc::channel::<AudioPacket>(64);

    // Producer thread owns the cpal stream (non-Send)
    let cfg_for_thread = config.clone();
    std::thread::spawn(move || {
        if let Err(e) = capture_thread(tx, cfg_for_thread) {
            error!("capture thread failed: {}", e);
        }
    });

    let mut seq: u32 = 0;
    let mut current: Option<Arc<dyn VoiceSink>> = None;
    while let Some(pkt) = rx.recv().await {
        let sink = producer.sink.lock().unwrap().clone();
        let Some(sink) = sink else {
            // No sink bound yet; the frame is lost by design
            continue;
        };
        if current.is_none() {
            sink.start(&AudioProfile {
                sample_rate_hz: pkt.sample_rate_hz,
                channels: pkt.channels,
                word_size: 2,
            });
            current = Some(Arc::clone(&sink));
        }

        // Serialize to little-endian bytes
        let mut payload = Vec::with_capacity(pkt.samples.len() * 2);
        for sample in pkt.samples.iter() {
            payload.extend_from_slice(&sample.to_le_bytes());
        }
        sink.data(AudioFrame::new(seq, &payload));
        seq = seq.wrapping_add(1);
    }

    if let Some(sink) = current {
        sink.stop();
    }
    Ok(())
}

fn capture_thread(tx: mpsc::Sender<AudioPacket>, config: MicProducerConfig) -> Result<()> {
    let host = cpal::default_host();

    // Enumerate devices and optionally filter by name
    let input_device = if let Some(ref needle) = config.device_name {
        let mut found: Option<cpal::Device> = None;
        match host.input_devices() {
            Ok(devices) => {
                for dev in devices {
                    if let Ok(name) = dev.name() {
                        if name.to_lowercase().contains(&needle.to_lowercase()) {
                            info!("Selected input device by MIC_DEVICE='{}': {}", needle, name);
                            found = Some(dev);
                            break;
                        }
                    }
                }
            }
            Err(e) => warn!("Failed to list input devices: {}", e),
        }
        found.or_else(|| host.default_input_device())
    } else {
        host.default_input_device()
    };

    let input_device = input_device
        .ok_or_else(|| TimbreError::AudioStreamError("No input device available".to_string()))?;
    let device_name = input_device.name().unwrap_or_else(|_| "unknown".into());

    let supported = input_device.default_input_config().map_err(|e| {
        TimbreError::AudioStreamError(format!("failed to get default input config: {}", e))
    })?;
    let actual_rate = supported.sample_rate().0;
    let actual_channels = supported.channels();
    if actual_rate != config.sample_rate_hz || actual_channels != config.channels {
        warn!(
            "Mic using rate={}Hz channels={} (requested {}Hz/{}ch)",
            actual_rate, actual_channels, config.sample_rate_hz, config.channels
        );
    }

    let samples_per_chunk = ((actual_rate as u64) * (config.chunk_ms as u64) / 1000) as usize
        * (actual_channels as usize);
    let stream_config: cpal::StreamConfig = supported.clone().into();
    let err_fn = |err| {
        error!("cpal input stream error: {}", err);
    };

    // Accumulator lives on this thread
    let mut acc: Vec<i16> = Vec::with_capacity(samples_per_chunk * 2);
    let emit = move |converted: &[i16], acc: &mut Vec<i16>, tx: &mpsc::Sender<AudioPacket>| {
        acc.extend_from_slice(converted);
        while acc.len() >= samples_per_chunk {
            let chunk: Vec<i16> = acc.drain(..samples_per_chunk).collect();
            let _ = tx.try_send(AudioPacket {
                samples: chunk,
                sample_rate_hz: actual_rate,
                channels: actual_channels,
            });
        }
    };

    let stream = match supported.sample_format() {
        cpal::SampleFormat::I16 => {
            let tx = tx.clone();
            input_device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _| emit(data, &mut acc, &tx),
                    err_fn,
                    None,
                )
                .map_err(stream_error)?
        }
        cpal::SampleFormat::F32 => {
            let tx = tx.clone();
            input_device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _| {
                        let converted: Vec<i16> = data.iter().map(|&s| f32_to_i16(s)).collect();
                        emit(&converted, &mut acc, &tx)
                    },
                    err_fn,
                    None,
                )
                .map_err(stream_error)?
        }
        cpal::SampleFormat::U16 => {
            let tx = tx.clone();
            input_device
                .build_input_stream(
                    &stream_config,
                    move |data: &[u16], _| {
                        let converted: Vec<i16> = data.iter().map(|&s| u16_to_i16(s)).collect();
                        emit(&converted, &mut acc, &tx)
                    },
                    err_fn,
                    None,
                )
                .map_err(stream_error)?
        }
        other => {
            return Err(TimbreError::AudioStreamError(format!(
                "Unsupported sample format: {:?}",
                other
            )));
        }
    };

    stream
        .play()
        .map_err(|e| TimbreError::AudioStreamError(format!("failed to start stream: {}", e)))?;

    info!(
        "MicProducer started: device=\"{}\" chunk={}ms rate={}Hz ch={}",
        device_name, config.chunk_ms, actual_rate, actual_channels
    );

    // Keep thread alive while the stream runs; callbacks push packets.
    // Exits once the consumer side of the channel is gone.
    while !tx.is_closed() {
        std::thread::sleep(std::time::Duration::from_millis(500));
    }
    drop(stream);
    Ok(())
}

fn stream_error(e: cpal::BuildStreamError) -> TimbreError {
    TimbreError::AudioStreamError(format!("failed to build input stream: {}", e))
}

#[inline]
fn f32_to_i16(s: f32) -> i16 {
    let s = s.clamp(-1.0, 1.0);
    (s * i16::MAX as f32) as i16
}

#[inline]
fn u16_to_i16(s: u16) -> i16 {
    // Map 0..=65535 to -32768..=32767
    (s as i32 - 32768) as i16
}
