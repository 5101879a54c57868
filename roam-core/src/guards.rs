//! Per-route activation and deactivation guards.
//!
//! A guard is instantiated from a factory (with access to the dependency
//! container) when its route is registered, and consulted on every
//! transition that enters or leaves the route's segment. Guards answer
//! synchronously when they can — `can_navigate_to` relies on that — and
//! defer to a future when they must.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use futures_core::future::BoxFuture;

use crate::dependencies::Dependencies;
use crate::error::RouterError;
use crate::logging::RouterLogger;
use crate::state::State;

/// A guard's verdict on one transition.
pub enum GuardCheck {
    Allow,
    Deny,
    /// Resolve asynchronously; `false` denies. Dry runs
    /// ([`Router::can_navigate_to`](crate::Router::can_navigate_to))
    /// treat a deferred verdict as allowing.
    Defer(BoxFuture<'static, bool>),
}

impl From<bool> for GuardCheck {
    fn from(allow: bool) -> Self {
        if allow {
            GuardCheck::Allow
        } else {
            GuardCheck::Deny
        }
    }
}

/// An instantiated guard: `(to_state, from_state) -> verdict`.
pub type GuardFn = Arc<dyn Fn(&State, Option<&State>) -> GuardCheck + Send + Sync>;

/// A guard factory, invoked once at registration time.
pub type GuardFactory = Arc<dyn Fn(&Dependencies) -> GuardFn + Send + Sync>;

/// What callers hand to guard registration: a factory, or a boolean
/// shorthand lifted to a trivial guard.
#[derive(Clone)]
pub enum GuardSpec {
    Factory(GuardFactory),
    Always(bool),
}

impl std::fmt::Debug for GuardSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuardSpec::Factory(_) => f.debug_tuple("Factory").field(&"<fn>").finish(),
            GuardSpec::Always(b) => f.debug_tuple("Always").field(b).finish(),
        }
    }
}

impl GuardSpec {
    /// A factory receiving the dependency container.
    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn(&Dependencies) -> GuardFn + Send + Sync + 'static,
    {
        GuardSpec::Factory(Arc::new(factory))
    }

    /// A guard that never needs the container.
    pub fn check<F>(check: F) -> Self
    where
        F: Fn(&State, Option<&State>) -> GuardCheck + Send + Sync + 'static,
    {
        let guard: GuardFn = Arc::new(check);
        GuardSpec::Factory(Arc::new(move |_| guard.clone()))
    }

    fn into_parts(self, deps: &Dependencies) -> (GuardFactory, GuardFn) {
        match self {
            GuardSpec::Factory(factory) => {
                let func = factory(deps);
                (factory, func)
            }
            GuardSpec::Always(allow) => {
                let factory: GuardFactory =
                    Arc::new(move |_| Arc::new(move |_, _| GuardCheck::from(allow)));
                let func = factory(deps);
                (factory, func)
            }
        }
    }
}

impl From<bool> for GuardSpec {
    fn from(allow: bool) -> Self {
        GuardSpec::Always(allow)
    }
}

struct GuardSlot {
    factory: GuardFactory,
    func: GuardFn,
}

#[derive(Default)]
struct Registered {
    activate: HashMap<String, GuardSlot>,
    deactivate: HashMap<String, GuardSlot>,
}

/// Stores guard factories and their instantiated functions per route.
pub struct GuardRegistry {
    registered: Mutex<Registered>,
    /// Routes currently mid-registration; a factory that re-registers its
    /// own route would otherwise recurse forever.
    registering: Mutex<HashSet<String>>,
    max_handlers: usize,
    logger: RouterLogger,
}

#[derive(Clone, Copy)]
pub(crate) enum GuardPhase {
    Activate,
    Deactivate,
}

impl GuardRegistry {
    pub fn new(max_handlers: usize, logger: RouterLogger) -> Self {
        Self {
            registered: Mutex::new(Registered::default()),
            registering: Mutex::new(HashSet::new()),
            max_handlers,
            logger,
        }
    }

    pub fn add_activate(
        &self,
        name: &str,
        spec: impl Into<GuardSpec>,
        deps: &Dependencies,
    ) -> Result<(), RouterError> {
        self.add(GuardPhase::Activate, name, spec.into(), deps)
    }

    pub fn add_deactivate(
        &self,
        name: &str,
        spec: impl Into<GuardSpec>,
        deps: &Dependencies,
    ) -> Result<(), RouterError> {
        self.add(GuardPhase::Deactivate, name, spec.into(), deps)
    }

    fn add(
        &self,
        phase: GuardPhase,
        name: &str,
        spec: GuardSpec,
        deps: &Dependencies,
    ) -> Result<(), RouterError> {
        {
            let mut registering = self.registering.lock().expect("guard lock poisoned");
            if !registering.insert(name.to_string()) {
                return Err(RouterError::InvalidRoute {
                    name: name.to_string(),
                    reason: "guard factory re-registered its own route".to_string(),
                });
            }
        }
        // The factory may call back into the router, so it runs outside
        // every registry lock; the latch above stops self-recursion.
        let parts = spec.into_parts(deps);
        self.registering
            .lock()
            .expect("guard lock poisoned")
            .remove(name);
        let (factory, func) = parts;

        let mut registered = self.registered.lock().expect("guard lock poisoned");
        let map = match phase {
            GuardPhase::Activate => &mut registered.activate,
            GuardPhase::Deactivate => &mut registered.deactivate,
        };
        let replacing = map.contains_key(name);
        if !replacing {
            let total = registered.activate.len() + registered.deactivate.len();
            if total >= self.max_handlers {
                return Err(RouterError::LifecycleHandlerLimit);
            }
        } else {
            self.logger
                .warn(&format!("guard for '{}' replaced", name));
        }
        let map = match phase {
            GuardPhase::Activate => &mut registered.activate,
            GuardPhase::Deactivate => &mut registered.deactivate,
        };
        map.insert(name.to_string(), GuardSlot { factory, func });
        Ok(())
    }

    pub fn remove_activate(&self, name: &str) -> bool {
        self.registered
            .lock()
            .expect("guard lock poisoned")
            .activate
            .remove(name)
            .is_some()
    }

    pub fn remove_deactivate(&self, name: &str) -> bool {
        self.registered
            .lock()
            .expect("guard lock poisoned")
            .deactivate
            .remove(name)
            .is_some()
    }

    /// Drop both guards of `name` and of every route underneath it.
    pub fn clear_subtree(&self, name: &str) {
        let prefix = format!("{}.", name);
        let mut registered = self.registered.lock().expect("guard lock poisoned");
        registered
            .activate
            .retain(|key, _| key != name && !key.starts_with(&prefix));
        registered
            .deactivate
            .retain(|key, _| key != name && !key.starts_with(&prefix));
    }

    pub fn clear_all(&self) {
        let mut registered = self.registered.lock().expect("guard lock poisoned");
        registered.activate.clear();
        registered.deactivate.clear();
    }

    /// Total number of registered guard functions.
    pub fn count(&self) -> usize {
        let registered = self.registered.lock().expect("guard lock poisoned");
        registered.activate.len() + registered.deactivate.len()
    }

    pub(crate) fn guard_fn(&self, phase: GuardPhase, name: &str) -> Option<GuardFn> {
        let registered = self.registered.lock().expect("guard lock poisoned");
        let map = match phase {
            GuardPhase::Activate => &registered.activate,
            GuardPhase::Deactivate => &registered.deactivate,
        };
        map.get(name).map(|slot| slot.func.clone())
    }

    /// Factories, for [`Router::fork`](crate::Router::fork).
    pub(crate) fn factories(&self) -> (Vec<(String, GuardFactory)>, Vec<(String, GuardFactory)>) {
        let registered = self.registered.lock().expect("guard lock poisoned");
        let collect = |map: &HashMap<String, GuardSlot>| {
            map.iter()
                .map(|(name, slot)| (name.clone(), slot.factory.clone()))
                .collect()
        };
        (collect(&registered.activate), collect(&registered.deactivate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::Limits;

    fn deps() -> Dependencies {
        Dependencies::new(Limits::default().max_dependencies, RouterLogger::default())
    }

    fn registry() -> GuardRegistry {
        GuardRegistry::new(Limits::default().max_lifecycle_handlers, RouterLogger::default())
    }

    fn state(name: &str) -> State {
        State {
            id: 1,
            name: name.to_string(),
            params: Default::default(),
            path: format!("/{}", name),
            meta: None,
        }
    }

    #[test]
    fn bool_shorthand_lifts_to_guard() {
        let registry = registry();
        registry.add_activate("a", true, &deps()).unwrap();
        registry.add_activate("b", false, &deps()).unwrap();

        let to = state("a");
        let allow = registry.guard_fn(GuardPhase::Activate, "a").unwrap();
        assert!(matches!(allow(&to, None), GuardCheck::Allow));
        let deny = registry.guard_fn(GuardPhase::Activate, "b").unwrap();
        assert!(matches!(deny(&to, None), GuardCheck::Deny));
    }

    #[test]
    fn factory_sees_dependencies() {
        let registry = registry();
        let deps = deps();
        deps.set_value("allowed", false).unwrap();
        registry
            .add_activate(
                "a",
                GuardSpec::factory(|deps| {
                    let allowed = *deps.get_as::<bool>("allowed").unwrap();
                    Arc::new(move |_, _| GuardCheck::from(allowed))
                }),
                &deps,
            )
            .unwrap();
        let guard = registry.guard_fn(GuardPhase::Activate, "a").unwrap();
        assert!(matches!(guard(&state("a"), None), GuardCheck::Deny));
    }

    #[test]
    fn handler_limit_enforced() {
        let registry = GuardRegistry::new(2, RouterLogger::default());
        registry.add_activate("a", true, &deps()).unwrap();
        registry.add_deactivate("a", true, &deps()).unwrap();
        let err = registry.add_activate("b", true, &deps()).unwrap_err();
        assert_eq!(err.code(), "lifecycle_handler_limit");
        // Replacing an existing guard is not a new handler.
        registry.add_activate("a", false, &deps()).unwrap();
    }

    #[test]
    fn clear_subtree_spares_siblings() {
        let registry = registry();
        for name in ["users", "users.view", "users.view.tab", "usersx"] {
            registry.add_activate(name, true, &deps()).unwrap();
        }
        registry.clear_subtree("users");
        assert!(registry.guard_fn(GuardPhase::Activate, "users").is_none());
        assert!(registry.guard_fn(GuardPhase::Activate, "users.view").is_none());
        assert!(registry.guard_fn(GuardPhase::Activate, "usersx").is_some());
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn remove_and_clear_all() {
        let registry = registry();
        registry.add_activate("a", true, &deps()).unwrap();
        registry.add_deactivate("a", true, &deps()).unwrap();
        assert!(registry.remove_activate("a"));
        assert!(!registry.remove_activate("a"));
        registry.clear_all();
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn deferred_guard_resolves() {
        let registry = registry();
        registry
            .add_activate(
                "a",
                GuardSpec::check(|_, _| GuardCheck::Defer(Box::pin(async { false }))),
                &deps(),
            )
            .unwrap();
        let guard = registry.guard_fn(GuardPhase::Activate, "a").unwrap();
        match guard(&state("a"), None) {
            GuardCheck::Defer(fut) => {
                let denied = !futures_util::FutureExt::now_or_never(fut).unwrap();
                assert!(denied);
            }
            _ => panic!("expected a deferred verdict"),
        }
    }
}
