//! Plugins: bundles of event handlers with shared teardown.
//!
//! A plugin is an object of optional handlers, one per router event, plus a
//! `teardown` that runs exactly once — whether cleanup comes from its
//! handle, a failed batch rolling back, or `dispose()`. Handlers are plain
//! bus listeners underneath, so they count toward the listener caps and
//! inherit the bus's ordering and isolation rules.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::dependencies::Dependencies;
use crate::error::RouterError;
use crate::events::{EventBus, EventKind, Listener, RouterEvent, Subscription};
use crate::logging::RouterLogger;
use crate::state::{NavigationOptions, State};

pub type LifecycleHandler = Arc<dyn Fn() + Send + Sync>;
pub type TransitionHandler = Arc<dyn Fn(&State, Option<&State>) + Send + Sync>;
pub type SuccessHandler = Arc<dyn Fn(&State, Option<&State>, NavigationOptions) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(Option<&State>, Option<&State>, &RouterError) + Send + Sync>;

/// An instantiated plugin. Every handler is optional.
#[derive(Default, Clone)]
pub struct Plugin {
    name: Option<String>,
    on_start: Option<LifecycleHandler>,
    on_stop: Option<LifecycleHandler>,
    on_transition_start: Option<TransitionHandler>,
    on_transition_success: Option<SuccessHandler>,
    on_transition_error: Option<ErrorHandler>,
    on_transition_cancel: Option<TransitionHandler>,
    teardown: Option<LifecycleHandler>,
}

impl Plugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name used in diagnostics.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn on_start<F: Fn() + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_start = Some(Arc::new(f));
        self
    }

    pub fn on_stop<F: Fn() + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_stop = Some(Arc::new(f));
        self
    }

    pub fn on_transition_start<F>(mut self, f: F) -> Self
    where
        F: Fn(&State, Option<&State>) + Send + Sync + 'static,
    {
        self.on_transition_start = Some(Arc::new(f));
        self
    }

    pub fn on_transition_success<F>(mut self, f: F) -> Self
    where
        F: Fn(&State, Option<&State>, NavigationOptions) + Send + Sync + 'static,
    {
        self.on_transition_success = Some(Arc::new(f));
        self
    }

    pub fn on_transition_error<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&State>, Option<&State>, &RouterError) + Send + Sync + 'static,
    {
        self.on_transition_error = Some(Arc::new(f));
        self
    }

    pub fn on_transition_cancel<F>(mut self, f: F) -> Self
    where
        F: Fn(&State, Option<&State>) + Send + Sync + 'static,
    {
        self.on_transition_cancel = Some(Arc::new(f));
        self
    }

    pub fn teardown<F: Fn() + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.teardown = Some(Arc::new(f));
        self
    }
}

/// A plugin factory, run once per registration with the container.
pub type PluginFactory = Arc<dyn Fn(&Dependencies) -> Result<Plugin, RouterError> + Send + Sync>;

struct PluginEntry {
    id: u64,
    factory: PluginFactory,
    subscriptions: Vec<Subscription>,
    teardown: Option<LifecycleHandler>,
    torn_down: Arc<AtomicBool>,
}

impl PluginEntry {
    fn detach(&self) {
        for sub in &self.subscriptions {
            sub.unsubscribe();
        }
        if !self.torn_down.swap(true, Ordering::SeqCst) {
            if let Some(teardown) = &self.teardown {
                teardown();
            }
        }
    }
}

struct RegistryInner {
    entries: Mutex<Vec<PluginEntry>>,
    next_id: AtomicU64,
    max_plugins: usize,
    logger: RouterLogger,
}

pub struct PluginRegistry {
    inner: Arc<RegistryInner>,
}

/// Detaches the batch that created it and runs each plugin's teardown
/// exactly once. Idempotent, also against `dispose()`.
#[derive(Debug)]
pub struct PluginHandle {
    registry: Weak<RegistryInner>,
    ids: Vec<u64>,
}

impl PluginHandle {
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut entries = registry.entries.lock().expect("plugin lock poisoned");
            entries.retain(|entry| {
                if self.ids.contains(&entry.id) {
                    entry.detach();
                    false
                } else {
                    true
                }
            });
        }
    }
}

impl PluginRegistry {
    pub fn new(max_plugins: usize, logger: RouterLogger) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                entries: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                max_plugins,
                logger,
            }),
        }
    }

    /// Instantiate and subscribe a batch of plugin factories.
    ///
    /// A mid-batch failure (factory error or listener cap) rolls the whole
    /// batch back: subscriptions detach and teardowns of already-live batch
    /// members run.
    pub fn use_plugins(
        &self,
        factories: Vec<PluginFactory>,
        deps: &Dependencies,
        bus: &EventBus,
        already_started: bool,
    ) -> Result<PluginHandle, RouterError> {
        {
            let entries = self.inner.entries.lock().expect("plugin lock poisoned");
            if entries.len() + factories.len() > self.inner.max_plugins {
                return Err(RouterError::PluginLimit);
            }
        }

        let mut batch: Vec<PluginEntry> = Vec::with_capacity(factories.len());
        for factory in factories {
            let plugin = match factory(deps) {
                Ok(plugin) => plugin,
                Err(error) => {
                    for entry in &batch {
                        entry.detach();
                    }
                    return Err(error);
                }
            };
            if already_started && plugin.on_start.is_some() {
                self.inner.logger.warn(&format!(
                    "plugin{} registered after start; its on_start will not fire for the historical start",
                    plugin
                        .name
                        .as_deref()
                        .map(|n| format!(" '{}'", n))
                        .unwrap_or_default()
                ));
            }
            match subscribe_plugin(&plugin, bus) {
                Ok(subscriptions) => {
                    batch.push(PluginEntry {
                        id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
                        factory,
                        subscriptions,
                        teardown: plugin.teardown.clone(),
                        torn_down: Arc::new(AtomicBool::new(false)),
                    });
                }
                Err(error) => {
                    for entry in &batch {
                        entry.detach();
                    }
                    return Err(error);
                }
            }
        }

        let ids: Vec<u64> = batch.iter().map(|entry| entry.id).collect();
        self.inner
            .entries
            .lock()
            .expect("plugin lock poisoned")
            .extend(batch);
        Ok(PluginHandle {
            registry: Arc::downgrade(&self.inner),
            ids,
        })
    }

    /// Detach every live plugin and run its teardown once. Used by
    /// `dispose()`.
    pub fn dispose_all(&self) {
        let mut entries = self.inner.entries.lock().expect("plugin lock poisoned");
        for entry in entries.drain(..) {
            entry.detach();
        }
    }

    pub fn count(&self) -> usize {
        self.inner.entries.lock().expect("plugin lock poisoned").len()
    }

    /// Factories of live plugins, for [`Router::fork`](crate::Router::fork).
    pub(crate) fn factories(&self) -> Vec<PluginFactory> {
        self.inner
            .entries
            .lock()
            .expect("plugin lock poisoned")
            .iter()
            .map(|entry| entry.factory.clone())
            .collect()
    }
}

/// Subscribe each present handler to its event. On failure the caller
/// rolls back; the partial subscriptions made here are detached first.
fn subscribe_plugin(plugin: &Plugin, bus: &EventBus) -> Result<Vec<Subscription>, RouterError> {
    let mut subscriptions = Vec::new();
    let mut pending: Vec<(EventKind, Listener)> = Vec::new();

    if let Some(f) = plugin.on_start.clone() {
        pending.push((
            EventKind::RouterStart,
            Arc::new(move |event: &RouterEvent| {
                if matches!(event, RouterEvent::RouterStart) {
                    f();
                }
            }),
        ));
    }
    if let Some(f) = plugin.on_stop.clone() {
        pending.push((
            EventKind::RouterStop,
            Arc::new(move |event: &RouterEvent| {
                if matches!(event, RouterEvent::RouterStop) {
                    f();
                }
            }),
        ));
    }
    if let Some(f) = plugin.on_transition_start.clone() {
        pending.push((
            EventKind::TransitionStart,
            Arc::new(move |event: &RouterEvent| {
                if let RouterEvent::TransitionStart { to, from } = event {
                    f(to, from.as_deref());
                }
            }),
        ));
    }
    if let Some(f) = plugin.on_transition_success.clone() {
        pending.push((
            EventKind::TransitionSuccess,
            Arc::new(move |event: &RouterEvent| {
                if let RouterEvent::TransitionSuccess { to, from, options } = event {
                    f(to, from.as_deref(), *options);
                }
            }),
        ));
    }
    if let Some(f) = plugin.on_transition_error.clone() {
        pending.push((
            EventKind::TransitionError,
            Arc::new(move |event: &RouterEvent| {
                if let RouterEvent::TransitionError { to, from, error } = event {
                    f(to.as_deref(), from.as_deref(), error);
                }
            }),
        ));
    }
    if let Some(f) = plugin.on_transition_cancel.clone() {
        pending.push((
            EventKind::TransitionCancel,
            Arc::new(move |event: &RouterEvent| {
                if let RouterEvent::TransitionCancel { to, from } = event {
                    f(to, from.as_deref());
                }
            }),
        ));
    }

    for (kind, listener) in pending {
        match bus.on(kind, listener) {
            Ok(subscription) => subscriptions.push(subscription),
            Err(error) => {
                for subscription in &subscriptions {
                    subscription.unsubscribe();
                }
                return Err(error);
            }
        }
    }
    Ok(subscriptions)
}
