//! Capture bridge: binds to a named external audio producer and turns
//! its push callbacks into non-blocking ring writes.
//!
//! The producer may not exist when the bridge is created. In that case
//! the bridge waits on component lifecycle notifications and re-attempts
//! binding whenever its target callsign reports activation. Rebind
//! attempts are idempotent and repeatable.

use crate::audio::producer::{AudioFrame, AudioProfile, VoiceProducer, VoiceSink};
use crate::audio::ring::{AudioRing, RingWriter, WriterPolicy};
use crate::host::{ComponentHost, ComponentState, LifecycleObserver};
use crate::interaction::InteractionHandler;
use crate::Result;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, error, info};

/// Binding progress towards the named producer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingState {
    Unbound,
    AwaitingProducer,
    Bound,
}

// Mutable bridge state, all under one mutex: binding transitions, the
// advisory streaming flag and the profile held between start()/stop().
struct BridgeState {
    binding: BindingState,
    streaming: bool,
    profile: Option<AudioProfile>,
}

/// Bridges a named audio producer into the shared ring. Writer side of
/// the ring; sole data sink of the producer once bound.
pub struct CaptureBridge {
    writer: RingWriter,
    host: Arc<ComponentHost>,
    callsign: String,
    state: Mutex<BridgeState>,
    interaction: Option<Arc<dyn InteractionHandler>>,
    // Handle to self for rebinding from lifecycle callbacks.
    weak_self: Weak<CaptureBridge>,
}

impl CaptureBridge {
    /// Create the bridge and attempt to bind immediately. When the
    /// producer is not yet available the bridge subscribes to lifecycle
    /// notifications and binds later; that is not an error.
    pub fn create(
        ring: Arc<AudioRing>,
        host: Arc<ComponentHost>,
        callsign: &str,
        interaction: Option<Arc<dyn InteractionHandler>>,
    ) -> Result<Arc<Self>> {
        let writer = ring.create_writer(WriterPolicy::NonBlocking)?;
        let bridge = Arc::new_cyclic(|weak_self| Self {
            writer,
            host,
            callsign: callsign.to_string(),
            state: Mutex::new(BridgeState {
                binding: BindingState::Unbound,
                streaming: false,
                profile: None,
            }),
            interaction,
            weak_self: weak_self.clone(),
        });

        if !bridge.try_bind() {
            debug!(
                callsign,
                "Producer not yet available; subscribing for lifecycle notifications"
            );
            bridge
                .host
                .register_observer(&(Arc::clone(&bridge) as Arc<dyn LifecycleObserver>));
        }
        Ok(bridge)
    }

    /// Attempt to resolve the producer and attach as its sole sink.
    /// Idempotent: once bound, later calls are no-ops reporting success.
    fn try_bind(self: &Arc<Self>) -> bool {
        let producer: Arc<dyn VoiceProducer> = {
            let mut state = self.state.lock().unwrap();
            if state.binding == BindingState::Bound {
                return true;
            }
            match self.host.resolve(&self.callsign) {
                Some(producer) => {
                    // Transition before attaching: the producer may
                    // start pushing from another thread the moment the
                    // sink is in place, and data() must already see
                    // Bound by then.
                    state.binding = BindingState::Bound;
                    producer
                }
                None => {
                    state.binding = BindingState::AwaitingProducer;
                    return false;
                }
            }
        };
        producer.attach_sink(Arc::clone(self) as Arc<dyn VoiceSink>);
        info!(callsign = %self.callsign, "Bound to audio producer");
        true
    }

    pub fn binding_state(&self) -> BindingState {
        self.state.lock().unwrap().binding
    }

    /// Advisory: streaming state is tracked but reported successful even
    /// before binding completes, since it has no effect until then.
    pub fn start_streaming_microphone_data(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        state.streaming = true;
        info!(callsign = %self.callsign, "startStreamingMicrophoneData");
        true
    }

    /// Advisory counterpart of
    /// [`start_streaming_microphone_data`](Self::start_streaming_microphone_data).
    pub fn stop_streaming_microphone_data(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        state.streaming = false;
        info!(callsign = %self.callsign, "stopStreamingMicrophoneData");
        true
    }

    pub fn is_streaming(&self) -> bool {
        self.state.lock().unwrap().streaming
    }

    /// Profile of the transmission currently framed by start()/stop().
    pub fn current_profile(&self) -> Option<AudioProfile> {
        self.state.lock().unwrap().profile.clone()
    }

    fn notify_hold_to_talk(&self) {
        // Absent handler is a no-op, not an error.
        if let Some(handler) = &self.interaction {
            handler.hold_to_talk();
        }
    }
}

impl VoiceSink for CaptureBridge {
    fn start(&self, profile: &AudioProfile) {
        debug!(callsign = %self.callsign, ?profile, "Transmission start");
        self.state.lock().unwrap().profile = Some(profile.clone());
        self.notify_hold_to_talk();
    }

    fn data(&self, frame: AudioFrame<'_>) {
        // Binding must have completed before data is accepted; anything
        // arriving earlier is dropped without touching the ring.
        if self.state.lock().unwrap().binding != BindingState::Bound {
            return;
        }
        let word_size = self.writer.word_size();
        let words = frame.len() / word_size;
        match self.writer.write(&frame.bytes[..words * word_size]) {
            Ok(written) if written > 0 => {}
            Ok(_) => {
                // Transient loss; binding is not revoked.
                error!(seq = frame.seq, "Failed to write to stream: 0 words written");
            }
            Err(e) => {
                error!(seq = frame.seq, error = %e, "Failed to write to stream");
            }
        }
    }

    fn stop(&self) {
        debug!(callsign = %self.callsign, "Transmission stop");
        self.state.lock().unwrap().profile = None;
        self.notify_hold_to_talk();
    }
}

impl LifecycleObserver for CaptureBridge {
    fn state_change(&self, callsign: &str, state: ComponentState) {
        if callsign != self.callsign || state != ComponentState::Activated {
            return;
        }
        // Opportunistic rebind on the lifecycle thread.
        if let Some(this) = self.weak_self.upgrade() {
            if !this.try_bind() {
                error!(callsign, "Failed to bind after activation");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ring::calculate_buffer_size;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeProducer {
        sink: Mutex<Option<Arc<dyn VoiceSink>>>,
    }

    impl FakeProducer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sink: Mutex::new(None),
            })
        }

        fn push(&self, seq: u32, bytes: &[u8]) {
            if let Some(sink) = self.sink.lock().unwrap().clone() {
                sink.data(AudioFrame::new(seq, bytes));
            }
        }

        fn has_sink(&self) -> bool {
            self.sink.lock().unwrap().is_some()
        }
    }

    impl VoiceProducer for FakeProducer {
        fn attach_sink(&self, sink: Arc<dyn VoiceSink>) {
            *self.sink.lock().unwrap() = Some(sink);
        }
    }

    struct HoldCounter {
        holds: AtomicUsize,
    }

    impl InteractionHandler for HoldCounter {
        fn tap(&self) {}
        fn hold_to_talk(&self) {
            self.holds.fetch_add(1, Ordering::SeqCst);
        }
        fn set_mute(&self, _mute: bool) {}
    }

    fn test_ring() -> Arc<AudioRing> {
        AudioRing::new(calculate_buffer_size(64, 2, 2), 2, 2).unwrap()
    }

    #[test]
    fn test_binds_immediately_when_producer_present() {
        let host = Arc::new(ComponentHost::new());
        let producer = FakeProducer::new();
        host.activate("VoiceControl", Arc::clone(&producer) as Arc<dyn VoiceProducer>);

        let bridge = CaptureBridge::create(test_ring(), host, "VoiceControl", None).unwrap();
        assert_eq!(bridge.binding_state(), BindingState::Bound);
        assert!(producer.has_sink());
    }

    #[test]
    fn test_awaiting_producer_then_bound_on_activation() {
        let host = Arc::new(ComponentHost::new());
        let ring = test_ring();
        let bridge =
            CaptureBridge::create(Arc::clone(&ring), Arc::clone(&host), "VoiceControl", None)
                .unwrap();
        assert_eq!(bridge.binding_state(), BindingState::AwaitingProducer);

        // Data before binding is a no-op: no write, no crash
        bridge.data(AudioFrame::new(0, &[1u8, 2, 3, 4]));
        assert_eq!(ring.write_cursor(), 0);

        let producer = FakeProducer::new();
        host.activate("VoiceControl", Arc::clone(&producer) as Arc<dyn VoiceProducer>);
        assert_eq!(bridge.binding_state(), BindingState::Bound);

        producer.push(1, &[1u8, 2, 3, 4]);
        assert_eq!(ring.write_cursor(), 2);
    }

    #[test]
    fn test_unrelated_activation_is_ignored() {
        let host = Arc::new(ComponentHost::new());
        let bridge = CaptureBridge::create(test_ring(), Arc::clone(&host), "VoiceControl", None)
            .unwrap();

        host.activate("Bluetooth", FakeProducer::new() as Arc<dyn VoiceProducer>);
        assert_eq!(bridge.binding_state(), BindingState::AwaitingProducer);
    }

    #[test]
    fn test_streaming_ops_report_success_while_awaiting() {
        let host = Arc::new(ComponentHost::new());
        let bridge = CaptureBridge::create(test_ring(), host, "VoiceControl", None).unwrap();
        assert_eq!(bridge.binding_state(), BindingState::AwaitingProducer);

        assert!(bridge.start_streaming_microphone_data());
        assert!(bridge.is_streaming());
        assert!(bridge.stop_streaming_microphone_data());
        assert!(!bridge.is_streaming());
    }

    #[test]
    fn test_start_stop_frame_profile_and_notify_handler() {
        let host = Arc::new(ComponentHost::new());
        let producer = FakeProducer::new();
        host.activate("VoiceControl", Arc::clone(&producer) as Arc<dyn VoiceProducer>);
        let handler = Arc::new(HoldCounter {
            holds: AtomicUsize::new(0),
        });
        let bridge = CaptureBridge::create(
            test_ring(),
            host,
            "VoiceControl",
            Some(Arc::clone(&handler) as Arc<dyn InteractionHandler>),
        )
        .unwrap();

        bridge.start(&AudioProfile::default());
        assert_eq!(bridge.current_profile(), Some(AudioProfile::default()));
        bridge.stop();
        assert_eq!(bridge.current_profile(), None);
        assert_eq!(handler.holds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_write_failure_does_not_revoke_binding() {
        let host = Arc::new(ComponentHost::new());
        let producer = FakeProducer::new();
        host.activate("VoiceControl", Arc::clone(&producer) as Arc<dyn VoiceProducer>);
        let ring = test_ring();
        let bridge =
            CaptureBridge::create(Arc::clone(&ring), host, "VoiceControl", None).unwrap();

        ring.close();
        producer.push(0, &[0u8; 8]);
        assert_eq!(bridge.binding_state(), BindingState::Bound);
    }
}
