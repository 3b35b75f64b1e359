// Component host: named-producer registry plus lifecycle notifications.
// Stands in for the platform's plugin shell at this subsystem's boundary:
// resolve-by-callsign returns the producer or nothing ("not yet
// available", never an error), and observers hear about activation on
// the caller's thread.

use crate::audio::producer::VoiceProducer;
use dashmap::DashMap;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info};

/// Lifecycle state of a hosted component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ComponentState {
    Activated,
    Deactivated,
}

/// Callback for component lifecycle changes.
pub trait LifecycleObserver: Send + Sync {
    fn state_change(&self, callsign: &str, state: ComponentState);
}

/// Registry of named audio producers.
pub struct ComponentHost {
    producers: DashMap<String, Arc<dyn VoiceProducer>>,
    observers: Mutex<Vec<Weak<dyn LifecycleObserver>>>,
}

impl Default for ComponentHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHost {
    pub fn new() -> Self {
        Self {
            producers: DashMap::new(),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Resolve a producer by callsign. `None` means the component has
    /// not been activated yet.
    pub fn resolve(&self, callsign: &str) -> Option<Arc<dyn VoiceProducer>> {
        self.producers.get(callsign).map(|p| Arc::clone(&p))
    }

    /// Register `producer` under `callsign` and notify lifecycle
    /// observers synchronously on this thread.
    pub fn activate(&self, callsign: &str, producer: Arc<dyn VoiceProducer>) {
        self.producers.insert(callsign.to_string(), producer);
        info!(callsign, "Component activated");
        self.notify(callsign, ComponentState::Activated);
    }

    /// Drop the producer registered under `callsign`, if any, and
    /// notify lifecycle observers.
    pub fn deactivate(&self, callsign: &str) {
        if self.producers.remove(callsign).is_some() {
            info!(callsign, "Component deactivated");
            self.notify(callsign, ComponentState::Deactivated);
        }
    }

    /// Subscribe to lifecycle changes. Duplicate registration of the
    /// same observer is a no-op.
    pub fn register_observer(&self, observer: &Arc<dyn LifecycleObserver>) {
        let mut observers = self.observers.lock().unwrap();
        let handle = Arc::downgrade(observer);
        if observers.iter().any(|o| Weak::ptr_eq(o, &handle)) {
            return;
        }
        observers.push(handle);
        debug!("Lifecycle observer registered");
    }

    pub fn unregister_observer(&self, observer: &Arc<dyn LifecycleObserver>) {
        let handle = Arc::downgrade(observer);
        self.observers
            .lock()
            .unwrap()
            .retain(|o| !Weak::ptr_eq(o, &handle));
    }

    fn notify(&self, callsign: &str, state: ComponentState) {
        // Snapshot before invoking: observers may re-enter the host
        // (the capture bridge resolves during its state_change).
        let snapshot: Vec<Arc<dyn LifecycleObserver>> = {
            let observers = self.observers.lock().unwrap();
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        for observer in snapshot {
            observer.state_change(callsign, state);
        }
    }
}
