//! Interaction gate: serializes user-initiated interaction commands
//! against concurrent execution and against unrecoverable upstream
//! error states.
//!
//! One shared "limited interaction" flag backs both uses: it is taken
//! as a non-reentrant lock around a single command's execution, and it
//! is latched permanently on logout or fatal auth/capability errors.
//! The two uses deliberately share storage; the observed semantics of
//! the merged flag are preserved as-is (a permanent latch racing an
//! in-flight `exec` gets clobbered by the unconditional clear).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Downstream voice-client surface invoked by the gate and by the
/// capture bridge's transmission framing.
#[cfg_attr(test, mockall::automock)]
pub trait InteractionHandler: Send + Sync {
    /// Tap-to-talk
    fn tap(&self);
    /// Hold-to-talk, driven by producer start/stop callbacks
    fn hold_to_talk(&self);
    fn set_mute(&self, mute: bool);
}

/// User-initiated interaction commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputCommand {
    Tap,
    Mute(bool),
    /// Present on the command surface but not routed here: hold-to-talk
    /// arrives through the producer's framing callbacks instead.
    Hold,
}

/// Outcome of [`InteractionGate::exec`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecStatus {
    Ok,
    /// Another command is in flight, or interaction is permanently
    /// degraded. Distinct from failure so callers can tell them apart.
    Busy,
    Error,
}

/// Upstream auth-state values delivered to the gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthState {
    Uninitialized,
    Refreshed,
    Expired,
    UnrecoverableError,
}

/// Upstream capability-delegate state values delivered to the gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapabilitiesState {
    Uninitialized,
    Success,
    RetriableError,
    FatalError,
}

/// Narrow upstream capabilities consumed by the gate, one per event
/// source.
pub trait AuthStateObserver: Send + Sync {
    fn on_auth_state_change(&self, new_state: AuthState);
}

pub trait CapabilitiesStateObserver: Send + Sync {
    fn on_capabilities_state_change(&self, new_state: CapabilitiesState);
}

pub trait LogoutObserver: Send + Sync {
    fn on_logout(&self);
}

/// Non-queueing command gate in front of the interaction handler.
pub struct InteractionGate {
    limited: AtomicBool,
    handler: Arc<dyn InteractionHandler>,
}

impl InteractionGate {
    pub fn new(handler: Arc<dyn InteractionHandler>) -> Self {
        Self {
            limited: AtomicBool::new(false),
            handler,
        }
    }

    /// Execute one interaction command. Returns `Busy` without queueing
    /// when another command is in flight or interaction is permanently
    /// limited; unknown commands yield `Error`. The flag is cleared
    /// unconditionally after dispatch.
    pub fn exec(&self, command: InputCommand) -> ExecStatus {
        if self
            .limited
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return ExecStatus::Busy;
        }
        let status = match command {
            InputCommand::Tap => {
                self.handler.tap();
                ExecStatus::Ok
            }
            InputCommand::Mute(mute) => {
                self.handler.set_mute(mute);
                ExecStatus::Ok
            }
            other => {
                warn!(?other, "Command not routed through the gate");
                ExecStatus::Error
            }
        };
        self.limited.store(false, Ordering::Release);
        status
    }

    /// Whether interaction is currently limited (command in flight or
    /// permanently degraded).
    pub fn is_limited(&self) -> bool {
        self.limited.load(Ordering::Acquire)
    }
}

impl LogoutObserver for InteractionGate {
    fn on_logout(&self) {
        info!("Logout: interaction permanently limited");
        self.limited.store(true, Ordering::Release);
    }
}

impl AuthStateObserver for InteractionGate {
    fn on_auth_state_change(&self, new_state: AuthState) {
        if new_state == AuthState::UnrecoverableError {
            warn!("Unrecoverable auth error: interaction permanently limited");
            self.limited.store(true, Ordering::Release);
        }
    }
}

impl CapabilitiesStateObserver for InteractionGate {
    fn on_capabilities_state_change(&self, new_state: CapabilitiesState) {
        if new_state == CapabilitiesState::FatalError {
            warn!("Fatal capabilities error: interaction permanently limited");
            self.limited.store(true, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    fn gate_with_mock<F: FnOnce(&mut MockInteractionHandler)>(configure: F) -> InteractionGate {
        let mut handler = MockInteractionHandler::new();
        configure(&mut handler);
        InteractionGate::new(Arc::new(handler))
    }

    #[test]
    fn test_tap_dispatches_once() {
        let gate = gate_with_mock(|h| {
            h.expect_tap().times(1).return_const(());
        });
        assert_eq!(gate.exec(InputCommand::Tap), ExecStatus::Ok);
        assert!(!gate.is_limited());
    }

    #[test]
    fn test_mute_dispatches_with_value() {
        let gate = gate_with_mock(|h| {
            h.expect_set_mute()
                .withf(|&mute| mute)
                .times(1)
                .return_const(());
        });
        assert_eq!(gate.exec(InputCommand::Mute(true)), ExecStatus::Ok);
    }

    #[test]
    fn test_unrouted_command_is_error_without_dispatch() {
        // No expectations: any handler call would fail the test
        let gate = gate_with_mock(|_| {});
        assert_eq!(gate.exec(InputCommand::Hold), ExecStatus::Error);
        // The flag is still released afterwards
        assert_eq!(
            gate_with_mock(|h| {
                h.expect_tap().times(1).return_const(());
            })
            .exec(InputCommand::Tap),
            ExecStatus::Ok
        );
    }

    #[test]
    fn test_concurrent_exec_yields_one_ok_one_busy() {
        let entered = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));

        let mut handler = MockInteractionHandler::new();
        let entered_cb = Arc::clone(&entered);
        let release_cb = Arc::clone(&release);
        handler.expect_tap().times(1).returning(move || {
            entered_cb.wait();
            release_cb.wait();
        });
        let gate = Arc::new(InteractionGate::new(Arc::new(handler)));

        let gate_bg = Arc::clone(&gate);
        let first = std::thread::spawn(move || gate_bg.exec(InputCommand::Tap));

        // Second call lands while the first is mid-dispatch
        entered.wait();
        assert_eq!(gate.exec(InputCommand::Tap), ExecStatus::Busy);
        release.wait();
        assert_eq!(first.join().unwrap(), ExecStatus::Ok);

        // And the gate is released afterwards
        assert!(!gate.is_limited());
    }

    #[test]
    fn test_logout_limits_interaction_permanently() {
        let gate = gate_with_mock(|_| {});
        gate.on_logout();
        assert_eq!(gate.exec(InputCommand::Tap), ExecStatus::Busy);
        assert_eq!(gate.exec(InputCommand::Tap), ExecStatus::Busy);
        assert_eq!(gate.exec(InputCommand::Mute(false)), ExecStatus::Busy);
    }

    #[test]
    fn test_only_fatal_upstream_states_limit() {
        let gate = gate_with_mock(|h| {
            h.expect_tap().times(2).return_const(());
        });
        gate.on_auth_state_change(AuthState::Refreshed);
        assert_eq!(gate.exec(InputCommand::Tap), ExecStatus::Ok);
        gate.on_capabilities_state_change(CapabilitiesState::RetriableError);
        assert_eq!(gate.exec(InputCommand::Tap), ExecStatus::Ok);

        gate.on_auth_state_change(AuthState::UnrecoverableError);
        assert_eq!(gate.exec(InputCommand::Tap), ExecStatus::Busy);
    }

    #[test]
    fn test_fatal_capabilities_state_limits() {
        let gate = gate_with_mock(|_| {});
        gate.on_capabilities_state_change(CapabilitiesState::FatalError);
        assert_eq!(gate.exec(InputCommand::Tap), ExecStatus::Busy);
    }
}
