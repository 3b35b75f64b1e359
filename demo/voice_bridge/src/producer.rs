use std::sync::{Arc, Mutex};
use std::time::Duration;

use timbre_core::{AudioFrame, AudioProfile, VoiceProducer, VoiceSink};
use tracing::info;

/// Synthetic voice producer: streams a sine tone in 20 ms PCM16 frames
/// once a sink is attached, framing the session with start/stop the way
/// a push-to-talk capture component does.
pub struct SimProducer {
    sink: Mutex<Option<Arc<dyn VoiceSink>>>,
    profile: AudioProfile,
    tone_hz: f32,
}

impl SimProducer {
    pub fn new(sample_rate_hz: u32, tone_hz: f32) -> Arc<Self> {
        Arc::new(Self {
            sink: Mutex::new(None),
            profile: AudioProfile {
                sample_rate_hz,
                channels: 1,
                word_size: 2,
            },
            tone_hz,
        })
    }

    /// Stream one capture session on a dedicated thread; returns once
    /// the thread is spawned.
    pub fn stream_for(self: &Arc<Self>, duration: Duration) {
        let producer = Arc::clone(self);
        std::thread::spawn(move || producer.run_session(duration));
    }

    fn run_session(&self, duration: Duration) {
        let sink = match self.sink.lock().unwrap().clone() {
            Some(s) => s,
            None => {
                info!(target = "voice_bridge", "No sink attached; session skipped");
                return;
            }
        };

        let rate = self.profile.sample_rate_hz;
        let frame_samples = (rate / 50) as usize;
        let total_frames = (duration.as_millis() / 20) as u32;

        sink.start(&self.profile);
        let mut phase = 0usize;
        for seq in 0..total_frames {
            let mut payload = Vec::with_capacity(frame_samples * 2);
            for _ in 0..frame_samples {
                let t = phase as f32 / rate as f32;
                let s = ((t * self.tone_hz * 2.0 * std::f32::consts::PI).sin() * 8000.0) as i16;
                payload.extend_from_slice(&s.to_le_bytes());
                phase += 1;
            }
            sink.data(AudioFrame::new(seq, &payload));
            std::thread::sleep(Duration::from_millis(20));
        }
        sink.stop();
        info!(target = "voice_bridge", frames = total_frames, "Session finished");
    }
}

impl VoiceProducer for SimProducer {
    fn attach_sink(&self, sink: Arc<dyn VoiceSink>) {
        *self.sink.lock().unwrap() = Some(sink);
    }
}
