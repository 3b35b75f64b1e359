//! Dialog/audio state coordinator: normalizes upstream dialog-UX and
//! audio-player transitions into a small closed state set and fans the
//! normalized state out to registered observers.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, warn};

/// Upstream conversational phase reported by the voice SDK.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogUxState {
    Idle,
    Listening,
    Expecting,
    Thinking,
    Speaking,
    Finished,
}

/// Upstream audio-player activity reported by the voice SDK.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerActivity {
    Idle,
    Playing,
    Stopped,
    Paused,
    BufferUnderrun,
    Finished,
}

/// The coordinator's reduced, closed state set. `Unhandled` covers
/// transitions with no mapping; it is never fanned out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalizedState {
    Idle,
    Listening,
    Expecting,
    Thinking,
    Speaking,
    Unhandled,
}

impl From<DialogUxState> for NormalizedState {
    fn from(state: DialogUxState) -> Self {
        match state {
            DialogUxState::Idle => NormalizedState::Idle,
            DialogUxState::Listening => NormalizedState::Listening,
            DialogUxState::Expecting => NormalizedState::Expecting,
            DialogUxState::Thinking => NormalizedState::Thinking,
            DialogUxState::Speaking => NormalizedState::Speaking,
            DialogUxState::Finished => NormalizedState::Unhandled,
        }
    }
}

/// Outbound notification surface. Observers are invoked in registration
/// order with the normalized state and the current audio-activity
/// reading. An observer must not mutate the registry during fan-out;
/// this is a caller obligation, not enforced here.
pub trait DialogStateObserver: Send + Sync {
    fn dialogue_state_change(&self, state: NormalizedState, audio_playing: bool);
}

/// Narrow upstream capabilities consumed by the coordinator.
pub trait DialogUxStateObserver: Send + Sync {
    fn on_dialog_ux_state_changed(&self, new_state: DialogUxState);
}

pub trait PlayerActivityObserver: Send + Sync {
    fn on_player_activity_changed(&self, state: PlayerActivity);
}

/// Subscribes to upstream dialog and player transitions and drives its
/// own observer set. Recomputes state on every event; persists nothing.
pub struct DialogStateCoordinator {
    player_state: Mutex<PlayerActivity>,
    // Insertion order is notification order. The registry holds weak
    // handles: dead observers are skipped at fan-out but an entry is
    // only removed by explicit unregister.
    observers: Mutex<Vec<Weak<dyn DialogStateObserver>>>,
}

impl Default for DialogStateCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl DialogStateCoordinator {
    pub fn new() -> Self {
        Self {
            player_state: Mutex::new(PlayerActivity::Idle),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Append an observer. Registering an already-present observer is a
    /// no-op, not an error.
    pub fn register(&self, observer: &Arc<dyn DialogStateObserver>) {
        let mut observers = self.observers.lock().unwrap();
        let handle = Arc::downgrade(observer);
        if observers.iter().any(|o| Weak::ptr_eq(o, &handle)) {
            return;
        }
        observers.push(handle);
        debug!(count = observers.len(), "Dialog state observer registered");
    }

    /// Remove an observer; further transitions are not delivered to it.
    pub fn unregister(&self, observer: &Arc<dyn DialogStateObserver>) {
        let handle = Arc::downgrade(observer);
        self.observers
            .lock()
            .unwrap()
            .retain(|o| !Weak::ptr_eq(o, &handle));
    }

    /// True exactly while the upstream player is in `Playing`,
    /// `BufferUnderrun` or `Paused`. Read by the dialog-transition
    /// handler; never triggers a notification by itself.
    pub fn is_audio_playing(&self) -> bool {
        matches!(
            *self.player_state.lock().unwrap(),
            PlayerActivity::Playing | PlayerActivity::BufferUnderrun | PlayerActivity::Paused
        )
    }
}

impl DialogUxStateObserver for DialogStateCoordinator {
    fn on_dialog_ux_state_changed(&self, new_state: DialogUxState) {
        let normalized = NormalizedState::from(new_state);
        if normalized == NormalizedState::Unhandled {
            warn!(?new_state, "Unmapped dialog state; not forwarded");
            return;
        }
        let audio_playing = self.is_audio_playing();
        debug!(?normalized, audio_playing, "Dialog state change");

        // Fan out over a snapshot so concurrent register/unregister sees
        // a consistent view.
        let snapshot: Vec<Arc<dyn DialogStateObserver>> = {
            let observers = self.observers.lock().unwrap();
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        for observer in snapshot {
            observer.dialogue_state_change(normalized, audio_playing);
        }
    }
}

impl PlayerActivityObserver for DialogStateCoordinator {
    fn on_player_activity_changed(&self, state: PlayerActivity) {
        debug!(?state, "Player activity change");
        *self.player_state.lock().unwrap() = state;
    }
}
