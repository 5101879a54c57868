//! The router lifecycle state machine.
//!
//! The FSM is the single authority on "is the router started / navigating /
//! disposed". Sends that the current state does not allow are no-ops here;
//! the facade decides whether a rejected send is an error worth surfacing.
//! Accepted sends that carry a payload publish it through the event bus
//! atomically with the state change, which is what keeps lifecycle state
//! and event order consistent.

use std::sync::RwLock;

use crate::error::RouterError;
use crate::events::{EventBus, RouterEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Starting,
    Ready,
    Transitioning,
    Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Start,
    Started,
    Fail,
    Stop,
    Navigate,
    Complete,
    Cancel,
    Dispose,
}

/// The transition table. `None` means the event is not allowed from the
/// given state.
fn next(state: LifecycleState, event: LifecycleEvent) -> Option<LifecycleState> {
    use LifecycleEvent as E;
    use LifecycleState as S;
    match (state, event) {
        (S::Idle, E::Start) => Some(S::Starting),
        (S::Starting, E::Started) => Some(S::Ready),
        (S::Starting, E::Fail | E::Stop) => Some(S::Idle),
        (S::Ready, E::Navigate) => Some(S::Transitioning),
        (S::Ready, E::Stop) => Some(S::Idle),
        (S::Ready, E::Dispose) => Some(S::Disposed),
        (S::Transitioning, E::Complete | E::Cancel | E::Fail) => Some(S::Ready),
        (S::Transitioning, E::Stop) => Some(S::Idle),
        _ => None,
    }
}

pub struct RouterFsm {
    state: RwLock<LifecycleState>,
    bus: EventBus,
}

impl RouterFsm {
    pub fn new(bus: EventBus) -> Self {
        Self {
            state: RwLock::new(LifecycleState::Idle),
            bus,
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read().expect("fsm lock poisoned")
    }

    /// Send an event, optionally publishing `payload` when accepted.
    ///
    /// Returns whether the event was accepted. The only error is a
    /// recursion-depth overflow from the bus.
    pub fn send(
        &self,
        event: LifecycleEvent,
        payload: Option<RouterEvent>,
    ) -> Result<bool, RouterError> {
        let accepted = {
            let mut state = self.state.write().expect("fsm lock poisoned");
            match next(*state, event) {
                Some(target) => {
                    *state = target;
                    true
                }
                None => false,
            }
        };
        if accepted {
            if let Some(payload) = payload {
                self.bus.emit(&payload)?;
            }
        }
        Ok(accepted)
    }

    /// Irreversibly mark the router disposed, from any state.
    ///
    /// `dispose()` must succeed even from `Idle`, which the table has no
    /// edge for; this is that escape hatch. Idempotent.
    pub fn dispose(&self) {
        *self.state.write().expect("fsm lock poisoned") = LifecycleState::Disposed;
    }

    pub fn is_started(&self) -> bool {
        matches!(
            self.state(),
            LifecycleState::Ready | LifecycleState::Transitioning
        )
    }

    pub fn is_navigating(&self) -> bool {
        self.state() == LifecycleState::Transitioning
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == LifecycleState::Disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::Limits;
    use crate::logging::RouterLogger;

    fn fsm() -> RouterFsm {
        RouterFsm::new(EventBus::new(&Limits::default(), RouterLogger::default()))
    }

    #[test]
    fn happy_path_walk() {
        let fsm = fsm();
        assert_eq!(fsm.state(), LifecycleState::Idle);
        assert!(fsm.send(LifecycleEvent::Start, None).unwrap());
        assert_eq!(fsm.state(), LifecycleState::Starting);
        assert!(fsm.send(LifecycleEvent::Started, None).unwrap());
        assert!(fsm.is_started());
        assert!(fsm.send(LifecycleEvent::Navigate, None).unwrap());
        assert!(fsm.is_navigating());
        assert!(fsm.send(LifecycleEvent::Complete, None).unwrap());
        assert_eq!(fsm.state(), LifecycleState::Ready);
    }

    #[test]
    fn rejected_send_is_a_no_op() {
        let fsm = fsm();
        assert!(!fsm.send(LifecycleEvent::Navigate, None).unwrap());
        assert_eq!(fsm.state(), LifecycleState::Idle);
        assert!(!fsm.send(LifecycleEvent::Complete, None).unwrap());
        assert_eq!(fsm.state(), LifecycleState::Idle);
    }

    #[test]
    fn stop_returns_to_idle_from_anywhere_active() {
        for walk in [
            vec![LifecycleEvent::Start],
            vec![LifecycleEvent::Start, LifecycleEvent::Started],
            vec![
                LifecycleEvent::Start,
                LifecycleEvent::Started,
                LifecycleEvent::Navigate,
            ],
        ] {
            let fsm = fsm();
            for event in walk {
                fsm.send(event, None).unwrap();
            }
            assert!(fsm.send(LifecycleEvent::Stop, None).unwrap());
            assert_eq!(fsm.state(), LifecycleState::Idle);
        }
    }

    #[test]
    fn failed_start_falls_back_to_idle() {
        let fsm = fsm();
        fsm.send(LifecycleEvent::Start, None).unwrap();
        assert!(fsm.send(LifecycleEvent::Fail, None).unwrap());
        assert_eq!(fsm.state(), LifecycleState::Idle);
    }

    #[test]
    fn cancel_and_fail_leave_transitioning() {
        for terminal in [LifecycleEvent::Cancel, LifecycleEvent::Fail] {
            let fsm = fsm();
            fsm.send(LifecycleEvent::Start, None).unwrap();
            fsm.send(LifecycleEvent::Started, None).unwrap();
            fsm.send(LifecycleEvent::Navigate, None).unwrap();
            assert!(fsm.send(terminal, None).unwrap());
            assert_eq!(fsm.state(), LifecycleState::Ready);
        }
    }

    #[test]
    fn disposed_accepts_nothing() {
        let fsm = fsm();
        fsm.send(LifecycleEvent::Start, None).unwrap();
        fsm.send(LifecycleEvent::Started, None).unwrap();
        assert!(fsm.send(LifecycleEvent::Dispose, None).unwrap());
        for event in [
            LifecycleEvent::Start,
            LifecycleEvent::Navigate,
            LifecycleEvent::Stop,
            LifecycleEvent::Dispose,
        ] {
            assert!(!fsm.send(event, None).unwrap());
        }
        assert!(fsm.is_disposed());
    }

    #[test]
    fn forced_dispose_works_from_idle() {
        let fsm = fsm();
        fsm.dispose();
        assert!(fsm.is_disposed());
        fsm.dispose();
        assert!(fsm.is_disposed());
    }
}
