//! The typed pub/sub bus carrying router lifecycle events.
//!
//! Listeners are invoked synchronously, in registration order, over a
//! snapshot of the listener set — mutations during an emission only affect
//! future emissions. A panicking listener is reported to the error sink and
//! never disturbs its siblings; the only failure `emit` itself surfaces is
//! a recursion-depth overflow, which aborts every emit frame on the stack.

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::error::RouterError;
use crate::limits::Limits;
use crate::logging::RouterLogger;
use crate::state::{NavigationOptions, State};

/// The six events the core emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RouterStart,
    RouterStop,
    TransitionStart,
    TransitionSuccess,
    TransitionError,
    TransitionCancel,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::RouterStart,
        EventKind::RouterStop,
        EventKind::TransitionStart,
        EventKind::TransitionSuccess,
        EventKind::TransitionError,
        EventKind::TransitionCancel,
    ];

    /// The wire name of this event, as used in error codes and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::RouterStart => "router_start",
            EventKind::RouterStop => "router_stop",
            EventKind::TransitionStart => "transition_start",
            EventKind::TransitionSuccess => "transition_success",
            EventKind::TransitionError => "transition_error",
            EventKind::TransitionCancel => "transition_cancel",
        }
    }
}

/// One emitted event with its payload.
#[derive(Debug, Clone)]
pub enum RouterEvent {
    RouterStart,
    RouterStop,
    TransitionStart {
        to: Arc<State>,
        from: Option<Arc<State>>,
    },
    TransitionSuccess {
        to: Arc<State>,
        from: Option<Arc<State>>,
        options: NavigationOptions,
    },
    TransitionError {
        to: Option<Arc<State>>,
        from: Option<Arc<State>>,
        error: RouterError,
    },
    TransitionCancel {
        to: Arc<State>,
        from: Option<Arc<State>>,
    },
}

impl RouterEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            RouterEvent::RouterStart => EventKind::RouterStart,
            RouterEvent::RouterStop => EventKind::RouterStop,
            RouterEvent::TransitionStart { .. } => EventKind::TransitionStart,
            RouterEvent::TransitionSuccess { .. } => EventKind::TransitionSuccess,
            RouterEvent::TransitionError { .. } => EventKind::TransitionError,
            RouterEvent::TransitionCancel { .. } => EventKind::TransitionCancel,
        }
    }
}

/// A bus listener. Identity (for duplicate detection and `off`) is the
/// `Arc` pointer, the Rust counterpart of function identity.
pub type Listener = Arc<dyn Fn(&RouterEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
struct BusLimits {
    max_listeners: usize,
    warn_listeners: usize,
    max_event_depth: usize,
}

struct BusInner {
    listeners: Mutex<HashMap<EventKind, Vec<(u64, Listener)>>>,
    warned: Mutex<HashSet<EventKind>>,
    depth: Mutex<HashMap<EventKind, usize>>,
    /// Set when some frame overflowed; aborts every emit on the stack.
    overflow: Mutex<Option<EventKind>>,
    global_depth: AtomicUsize,
    limits: Mutex<BusLimits>,
    next_id: AtomicU64,
    logger: RouterLogger,
}

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

/// Handle returned by [`EventBus::on`]; unsubscribing is idempotent.
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<BusInner>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if let Some(bus) = self.bus.upgrade() {
            let mut listeners = bus.listeners.lock().expect("listener lock poisoned");
            if let Some(list) = listeners.get_mut(&self.kind) {
                list.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

impl EventBus {
    pub fn new(limits: &Limits, logger: RouterLogger) -> Self {
        Self {
            inner: Arc::new(BusInner {
                listeners: Mutex::new(HashMap::new()),
                warned: Mutex::new(HashSet::new()),
                depth: Mutex::new(HashMap::new()),
                overflow: Mutex::new(None),
                global_depth: AtomicUsize::new(0),
                limits: Mutex::new(BusLimits {
                    max_listeners: limits.max_listeners,
                    warn_listeners: limits.warn_listeners,
                    max_event_depth: limits.max_event_depth,
                }),
                next_id: AtomicU64::new(1),
                logger,
            }),
        }
    }

    /// Register a listener.
    ///
    /// Fails with `duplicate_listener` when the same `Arc` is already
    /// registered for this event, and with `listener_limit` once the
    /// per-event cap is reached.
    pub fn on(&self, kind: EventKind, listener: Listener) -> Result<Subscription, RouterError> {
        let limits = *self.inner.limits.lock().expect("limits lock poisoned");
        let mut listeners = self.inner.listeners.lock().expect("listener lock poisoned");
        let list = listeners.entry(kind).or_default();
        if list.iter().any(|(_, l)| Arc::ptr_eq(l, &listener)) {
            return Err(RouterError::DuplicateListener {
                event: kind.as_str(),
            });
        }
        if list.len() >= limits.max_listeners {
            return Err(RouterError::ListenerLimit {
                event: kind.as_str(),
            });
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        list.push((id, listener));
        if list.len() >= limits.warn_listeners {
            let mut warned = self.inner.warned.lock().expect("warned lock poisoned");
            if warned.insert(kind) {
                self.inner.logger.warn(&format!(
                    "'{}' has {} listeners; cap is {}",
                    kind.as_str(),
                    list.len(),
                    limits.max_listeners
                ));
            }
        }
        Ok(Subscription {
            bus: Arc::downgrade(&self.inner),
            kind,
            id,
        })
    }

    /// Remove a listener by identity. Returns whether anything was removed.
    pub fn off(&self, kind: EventKind, listener: &Listener) -> bool {
        let mut listeners = self.inner.listeners.lock().expect("listener lock poisoned");
        match listeners.get_mut(&kind) {
            Some(list) => {
                let before = list.len();
                list.retain(|(_, l)| !Arc::ptr_eq(l, listener));
                list.len() != before
            }
            None => false,
        }
    }

    /// Deliver an event to every listener registered for its kind.
    ///
    /// The only error is `recursion_depth`: re-entrant emits past the
    /// configured depth abort the whole emit stack.
    pub fn emit(&self, event: &RouterEvent) -> Result<(), RouterError> {
        let kind = event.kind();
        let max_depth = self
            .inner
            .limits
            .lock()
            .expect("limits lock poisoned")
            .max_event_depth;

        {
            let mut depth = self.inner.depth.lock().expect("depth lock poisoned");
            let entry = depth.entry(kind).or_insert(0);
            if *entry >= max_depth {
                *self.inner.overflow.lock().expect("overflow lock poisoned") = Some(kind);
                return Err(RouterError::RecursionDepth {
                    event: kind.as_str(),
                });
            }
            *entry += 1;
        }
        self.inner.global_depth.fetch_add(1, Ordering::SeqCst);

        let snapshot: Vec<Listener> = {
            let listeners = self.inner.listeners.lock().expect("listener lock poisoned");
            listeners
                .get(&kind)
                .map(|list| list.iter().map(|(_, l)| l.clone()).collect())
                .unwrap_or_default()
        };

        for listener in snapshot {
            if self
                .inner
                .overflow
                .lock()
                .expect("overflow lock poisoned")
                .is_some()
            {
                break;
            }
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                self.inner
                    .logger
                    .error(&format!("listener for '{}' panicked", kind.as_str()));
            }
        }

        {
            let mut depth = self.inner.depth.lock().expect("depth lock poisoned");
            if let Some(entry) = depth.get_mut(&kind) {
                *entry = entry.saturating_sub(1);
            }
        }
        let outermost = self.inner.global_depth.fetch_sub(1, Ordering::SeqCst) == 1;
        let mut overflow = self.inner.overflow.lock().expect("overflow lock poisoned");
        let overflowed = if outermost { overflow.take() } else { *overflow };
        match overflowed {
            Some(kind) => Err(RouterError::RecursionDepth {
                event: kind.as_str(),
            }),
            None => Ok(()),
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.inner
            .listeners
            .lock()
            .expect("listener lock poisoned")
            .get(&kind)
            .map(|list| list.len())
            .unwrap_or(0)
    }

    pub fn clear_all(&self) {
        self.inner
            .listeners
            .lock()
            .expect("listener lock poisoned")
            .clear();
        self.inner.warned.lock().expect("warned lock poisoned").clear();
    }

    /// Adopt new listener and depth caps. Existing registrations above a
    /// lowered cap stay; only future `on` calls see the new limit.
    pub fn set_limits(&self, limits: &Limits) {
        *self.inner.limits.lock().expect("limits lock poisoned") = BusLimits {
            max_listeners: limits.max_listeners,
            warn_listeners: limits.warn_listeners,
            max_event_depth: limits.max_event_depth,
        };
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn bus() -> EventBus {
        EventBus::new(&Limits::default(), RouterLogger::default())
    }

    fn counting_listener() -> (Listener, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let listener: Listener = Arc::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (listener, count)
    }

    #[test]
    fn emit_reaches_listeners_in_order() {
        let bus = bus();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = order.clone();
            bus.on(
                EventKind::RouterStart,
                Arc::new(move |_| order.lock().unwrap().push(tag)),
            )
            .unwrap();
        }
        bus.emit(&RouterEvent::RouterStart).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn duplicate_listener_rejected() {
        let bus = bus();
        let (listener, _) = counting_listener();
        bus.on(EventKind::RouterStart, listener.clone()).unwrap();
        let err = bus.on(EventKind::RouterStart, listener).unwrap_err();
        assert_eq!(err.code(), "duplicate_listener");
    }

    #[test]
    fn same_listener_allowed_on_other_event() {
        let bus = bus();
        let (listener, count) = counting_listener();
        bus.on(EventKind::RouterStart, listener.clone()).unwrap();
        bus.on(EventKind::RouterStop, listener).unwrap();
        bus.emit(&RouterEvent::RouterStart).unwrap();
        bus.emit(&RouterEvent::RouterStop).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn listener_limit_enforced() {
        let bus = EventBus::new(
            &Limits {
                max_listeners: 2,
                warn_listeners: 2,
                ..Limits::default()
            },
            RouterLogger::default(),
        );
        bus.on(EventKind::RouterStart, counting_listener().0).unwrap();
        bus.on(EventKind::RouterStart, counting_listener().0).unwrap();
        let err = bus
            .on(EventKind::RouterStart, counting_listener().0)
            .unwrap_err();
        assert_eq!(err.code(), "listener_limit");
    }

    #[test]
    fn warn_threshold_fires_once() {
        let warns = Arc::new(AtomicUsize::new(0));
        let w = warns.clone();
        let logger = RouterLogger::default().with_warn(Arc::new(move |_| {
            w.fetch_add(1, Ordering::SeqCst);
        }));
        let bus = EventBus::new(
            &Limits {
                max_listeners: 10,
                warn_listeners: 2,
                ..Limits::default()
            },
            logger,
        );
        for _ in 0..4 {
            bus.on(EventKind::RouterStart, counting_listener().0).unwrap();
        }
        assert_eq!(warns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let bus = bus();
        let (listener, count) = counting_listener();
        let sub = bus.on(EventKind::RouterStart, listener).unwrap();
        sub.unsubscribe();
        sub.unsubscribe();
        bus.emit(&RouterEvent::RouterStart).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(bus.listener_count(EventKind::RouterStart), 0);
    }

    #[test]
    fn off_removes_by_identity() {
        let bus = bus();
        let (listener, count) = counting_listener();
        bus.on(EventKind::RouterStart, listener.clone()).unwrap();
        assert!(bus.off(EventKind::RouterStart, &listener));
        assert!(!bus.off(EventKind::RouterStart, &listener));
        bus.emit(&RouterEvent::RouterStart).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn mutation_during_emit_affects_future_emits_only() {
        let bus = bus();
        let (late, late_count) = counting_listener();
        {
            let bus2 = bus.clone();
            let late = late.clone();
            bus.on(
                EventKind::RouterStart,
                Arc::new(move |_| {
                    let _ = bus2.on(EventKind::RouterStart, late.clone());
                }),
            )
            .unwrap();
        }
        bus.emit(&RouterEvent::RouterStart).unwrap();
        assert_eq!(late_count.load(Ordering::SeqCst), 0);
        bus.emit(&RouterEvent::RouterStart).unwrap();
        assert_eq!(late_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_listener_is_isolated() {
        let errors = Arc::new(AtomicUsize::new(0));
        let e = errors.clone();
        let logger = RouterLogger::default().with_error(Arc::new(move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        }));
        let bus = EventBus::new(&Limits::default(), logger);
        bus.on(EventKind::RouterStart, Arc::new(|_| panic!("boom")))
            .unwrap();
        let (listener, count) = counting_listener();
        bus.on(EventKind::RouterStart, listener).unwrap();

        bus.emit(&RouterEvent::RouterStart).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn recursion_overflow_propagates_to_outer_emit() {
        let bus = EventBus::new(
            &Limits {
                max_event_depth: 3,
                ..Limits::default()
            },
            RouterLogger::default(),
        );
        let bus2 = bus.clone();
        bus.on(
            EventKind::RouterStart,
            Arc::new(move |event| {
                let _ = bus2.emit(event);
            }),
        )
        .unwrap();
        let err = bus.emit(&RouterEvent::RouterStart).unwrap_err();
        assert_eq!(err.code(), "recursion_depth");
        // The bus recovers once the stack unwinds.
        bus.clear_all();
        bus.emit(&RouterEvent::RouterStart).unwrap();
    }

    #[test]
    fn clear_all_drops_every_listener() {
        let bus = bus();
        let (listener, count) = counting_listener();
        bus.on(EventKind::TransitionStart, listener).unwrap();
        bus.clear_all();
        assert_eq!(bus.listener_count(EventKind::TransitionStart), 0);
        let state = Arc::new(State {
            id: 1,
            name: "a".into(),
            params: Default::default(),
            path: "/a".into(),
            meta: None,
        });
        bus.emit(&RouterEvent::TransitionStart {
            to: state,
            from: None,
        })
        .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
