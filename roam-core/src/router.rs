//! The router facade.
//!
//! [`Router`] owns every component and orchestrates them: it validates
//! input, consults the lifecycle FSM before acting, runs the transition
//! pipeline, and keeps FSM sends and event emissions consistent. Components
//! never reference the facade back; everything they need arrives as an
//! argument, which keeps the ownership tree a tree.
//!
//! Cancellation protocol: each navigation parks an entry in `in_flight`.
//! Whoever removes that entry — a newer navigation, `stop`, `dispose`, or
//! the transition task itself at commit — owns the terminal event for that
//! transition. That single rule is what makes `transition_cancel` fire
//! exactly once and `set_state` never race a canceller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use roam_paths::Params;

use crate::dependencies::{Dep, Dependencies};
use crate::error::RouterError;
use crate::events::{EventBus, EventKind, Listener, RouterEvent, Subscription};
use crate::fsm::{LifecycleEvent, LifecycleState, RouterFsm};
use crate::guards::{GuardRegistry, GuardSpec};
use crate::middleware::{MiddlewareFactory, MiddlewareHandle, MiddlewarePipeline};
use crate::options::RouterOptions;
use crate::plugins::{PluginFactory, PluginHandle, PluginRegistry};
use crate::routes::{MatchedPath, Route, RouteStore, RouteUpdate, Update};
use crate::state::{states_equal, NavigationOptions, State, StateMeta, StateStore, UNKNOWN_ROUTE};
use crate::transition::{dry_run_guards, run_pipeline, should_update_node, TransitionContext};

struct InFlight {
    id: u64,
    token: CancellationToken,
    to: Arc<State>,
    from: Option<Arc<State>>,
}

pub(crate) struct RouterInner {
    pub(crate) options: RouterOptions,
    pub(crate) deps: Dependencies,
    pub(crate) bus: EventBus,
    pub(crate) fsm: RouterFsm,
    pub(crate) routes: RouteStore,
    pub(crate) guards: GuardRegistry,
    pub(crate) middleware: MiddlewarePipeline,
    pub(crate) plugins: PluginRegistry,
    pub(crate) states: StateStore,
    in_flight: Mutex<Option<InFlight>>,
    nav_counter: AtomicU64,
}

/// A client-side router: route tree, lifecycle FSM, transition pipeline,
/// event bus, and dependency injection, behind one validating facade.
pub struct Router {
    pub(crate) inner: Arc<RouterInner>,
}

impl Router {
    /// Build an unstarted router from route definitions and options.
    pub fn new(routes: Vec<Route>, options: RouterOptions) -> Result<Router, RouterError> {
        Self::with_dependencies(routes, options, Vec::new())
    }

    /// Like [`new`](Self::new), with initial dependencies.
    pub fn with_dependencies(
        routes: Vec<Route>,
        options: RouterOptions,
        dependencies: Vec<(String, Dep)>,
    ) -> Result<Router, RouterError> {
        let options = RouterOptions {
            limits: options.limits.clamped(),
            ..options
        };
        let logger = options.logger.clone();
        let deps = Dependencies::new(options.limits.max_dependencies, logger.clone());
        deps.set_many(dependencies)?;
        let bus = EventBus::new(&options.limits, logger.clone());
        let inner = Arc::new(RouterInner {
            fsm: RouterFsm::new(bus.clone()),
            routes: RouteStore::new(&options),
            guards: GuardRegistry::new(options.limits.max_lifecycle_handlers, logger.clone()),
            middleware: MiddlewarePipeline::new(options.limits.max_middleware, logger.clone()),
            plugins: PluginRegistry::new(options.limits.max_plugins, logger.clone()),
            states: StateStore::new(),
            in_flight: Mutex::new(None),
            nav_counter: AtomicU64::new(1),
            deps,
            bus,
            options,
        });
        let router = Router { inner };
        router.add_routes(routes)?;
        Ok(router)
    }

    fn ensure_not_disposed(&self) -> Result<(), RouterError> {
        if self.inner.fsm.is_disposed() {
            Err(RouterError::Disposed)
        } else {
            Ok(())
        }
    }

    fn validate_route_name(&self, name: &str) -> Result<(), RouterError> {
        if self.inner.options.no_validate {
            return Ok(());
        }
        if name.is_empty() || name.split('.').any(|segment| segment.is_empty()) {
            return Err(RouterError::InvalidRoute {
                name: name.to_string(),
                reason: "route names are non-empty dot-separated segments".to_string(),
            });
        }
        Ok(())
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn get_state(&self) -> Option<Arc<State>> {
        self.inner.states.current()
    }

    pub fn get_previous_state(&self) -> Option<Arc<State>> {
        self.inner.states.previous()
    }

    pub fn get_options(&self) -> &RouterOptions {
        &self.inner.options
    }

    /// The shared dependency container.
    pub fn get_dependencies(&self) -> Dependencies {
        self.inner.deps.clone()
    }

    pub fn set_dependency(&self, name: impl Into<String>, value: Dep) -> Result<(), RouterError> {
        self.ensure_not_disposed()?;
        self.inner.deps.set(name, value)
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.inner.fsm.state()
    }

    pub fn is_started(&self) -> bool {
        self.inner.fsm.is_started()
    }

    pub fn is_navigating(&self) -> bool {
        self.inner.fsm.is_navigating()
    }

    pub fn has_route(&self, name: &str) -> bool {
        self.inner.routes.has_route(name)
    }

    pub fn route_count(&self) -> usize {
        self.inner.routes.route_count()
    }

    // ── Events ──────────────────────────────────────────────────────────

    pub fn add_event_listener(
        &self,
        kind: EventKind,
        listener: Listener,
    ) -> Result<Subscription, RouterError> {
        self.ensure_not_disposed()?;
        self.inner.bus.on(kind, listener)
    }

    pub fn remove_event_listener(&self, kind: EventKind, listener: &Listener) -> bool {
        self.inner.bus.off(kind, listener)
    }

    /// Success-only observer: called with `(to, from)` after every
    /// committed transition.
    pub fn subscribe<F>(&self, f: F) -> Result<Subscription, RouterError>
    where
        F: Fn(&State, Option<&State>) + Send + Sync + 'static,
    {
        self.add_event_listener(
            EventKind::TransitionSuccess,
            Arc::new(move |event| {
                if let RouterEvent::TransitionSuccess { to, from, .. } = event {
                    f(to, from.as_deref());
                }
            }),
        )
    }

    // ── Route mutation ──────────────────────────────────────────────────

    pub fn add_routes(&self, routes: Vec<Route>) -> Result<(), RouterError> {
        self.add_routes_under(routes, None)
    }

    pub fn add_routes_under(
        &self,
        routes: Vec<Route>,
        parent: Option<&str>,
    ) -> Result<(), RouterError> {
        self.ensure_not_disposed()?;
        let hooks = self.inner.routes.add_routes(routes, parent)?;
        for hook in hooks {
            if let Some(spec) = hook.can_activate {
                self.inner
                    .guards
                    .add_activate(&hook.name, spec, &self.inner.deps)?;
            }
            if let Some(spec) = hook.can_deactivate {
                self.inner
                    .guards
                    .add_deactivate(&hook.name, spec, &self.inner.deps)?;
            }
        }
        Ok(())
    }

    pub fn remove_route(&self, name: &str) -> Result<(), RouterError> {
        self.ensure_not_disposed()?;
        if self.inner.fsm.is_navigating() {
            return Err(RouterError::InvalidRoute {
                name: name.to_string(),
                reason: "cannot mutate routes while a transition is in flight".to_string(),
            });
        }
        self.inner
            .routes
            .remove_route(name, self.inner.states.current().as_deref())?;
        self.inner.guards.clear_subtree(name);
        Ok(())
    }

    pub fn clear_routes(&self) -> Result<(), RouterError> {
        self.ensure_not_disposed()?;
        if self.inner.fsm.is_navigating() {
            return Err(RouterError::InvalidRoute {
                name: String::new(),
                reason: "cannot mutate routes while a transition is in flight".to_string(),
            });
        }
        self.inner.routes.clear();
        self.inner.guards.clear_all();
        self.inner.states.reset();
        Ok(())
    }

    pub fn update_route(&self, name: &str, update: RouteUpdate) -> Result<(), RouterError> {
        self.ensure_not_disposed()?;
        let (activate, deactivate) = self.inner.routes.update_route(name, update)?;
        match activate {
            Update::Keep => {}
            Update::Clear => {
                self.inner.guards.remove_activate(name);
            }
            Update::Set(spec) => {
                self.inner.guards.add_activate(name, spec, &self.inner.deps)?;
            }
        }
        match deactivate {
            Update::Keep => {}
            Update::Clear => {
                self.inner.guards.remove_deactivate(name);
            }
            Update::Set(spec) => {
                self.inner
                    .guards
                    .add_deactivate(name, spec, &self.inner.deps)?;
            }
        }
        Ok(())
    }

    /// Register an activation guard for `name`.
    pub fn can_activate(&self, name: &str, spec: impl Into<GuardSpec>) -> Result<(), RouterError> {
        self.ensure_not_disposed()?;
        self.inner.guards.add_activate(name, spec, &self.inner.deps)
    }

    /// Register a deactivation guard for `name`.
    pub fn can_deactivate(
        &self,
        name: &str,
        spec: impl Into<GuardSpec>,
    ) -> Result<(), RouterError> {
        self.ensure_not_disposed()?;
        self.inner.guards.add_deactivate(name, spec, &self.inner.deps)
    }

    // ── Middleware and plugins ──────────────────────────────────────────

    pub fn use_middleware(
        &self,
        factories: Vec<MiddlewareFactory>,
    ) -> Result<MiddlewareHandle, RouterError> {
        self.ensure_not_disposed()?;
        self.inner.middleware.use_middleware(factories, &self.inner.deps)
    }

    pub fn use_plugins(&self, factories: Vec<PluginFactory>) -> Result<PluginHandle, RouterError> {
        self.ensure_not_disposed()?;
        self.inner.plugins.use_plugins(
            factories,
            &self.inner.deps,
            &self.inner.bus,
            self.inner.fsm.is_started(),
        )
    }

    // ── Paths and states ────────────────────────────────────────────────

    pub fn build_path(&self, name: &str, params: Params) -> Result<String, RouterError> {
        self.validate_route_name(name)?;
        self.inner.routes.build_path(name, params)
    }

    /// Match a path against the tree, resolving forwards. With
    /// `allow_not_found`, an unmatched path yields the unknown-route
    /// sentinel state instead of `None`.
    pub fn match_path(
        &self,
        path: &str,
        source: Option<&str>,
    ) -> Result<Option<Arc<State>>, RouterError> {
        match self.inner.routes.match_path(path, source, &self.inner.deps)? {
            Some(matched) => Ok(Some(self.matched_to_state(matched, NavigationOptions::default()))),
            None if self.inner.options.allow_not_found => Ok(Some(
                self.inner
                    .states
                    .make_not_found_state(path, NavigationOptions::default()),
            )),
            None => Ok(None),
        }
    }

    /// Build a state for `name` as a navigation would, without navigating.
    pub fn build_state(&self, name: &str, params: Params) -> Result<Arc<State>, RouterError> {
        self.build_nav_state(name, params, NavigationOptions::default(), None)
    }

    pub fn is_active(
        &self,
        name: &str,
        params: Option<&Params>,
        strict_equality: bool,
        ignore_query_params: bool,
    ) -> bool {
        self.inner.routes.is_active_route(
            name,
            params,
            strict_equality,
            ignore_query_params,
            self.inner.states.current(),
        )
    }

    /// Should the view node `node_name` re-render for `(to, from)`?
    pub fn should_update_node(&self, node_name: &str, to: &State, from: Option<&State>) -> bool {
        should_update_node(node_name, to, from)
    }

    fn matched_to_state(&self, matched: MatchedPath, options: NavigationOptions) -> Arc<State> {
        let options = NavigationOptions {
            redirected: options.redirected || matched.redirected,
            ..options
        };
        self.inner.states.make_state(
            matched.name,
            matched.params,
            matched.path,
            Some(StateMeta {
                id: 0,
                params: matched.segment_params,
                options,
                redirected: matched.redirected,
                source: matched.source,
            }),
            None,
        )
    }

    fn build_nav_state(
        &self,
        name: &str,
        params: Params,
        options: NavigationOptions,
        source: Option<String>,
    ) -> Result<Arc<State>, RouterError> {
        let path = self.inner.routes.build_path(name, params.clone())?;
        let segment_params = self.inner.routes.segment_params(name).unwrap_or_default();
        Ok(self.inner.states.make_state(
            name,
            params,
            path,
            Some(StateMeta {
                id: 0,
                params: segment_params,
                options,
                redirected: options.redirected,
                source,
            }),
            None,
        ))
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Start the router with an initial path.
    ///
    /// Emits `router_start`, attempts the initial navigation (falling back
    /// to the default route for an empty or unmatched path), and becomes
    /// READY on success or IDLE again on failure.
    pub async fn start(&self, path: &str) -> Result<Arc<State>, RouterError> {
        self.ensure_not_disposed()?;
        if !self
            .inner
            .fsm
            .send(LifecycleEvent::Start, Some(RouterEvent::RouterStart))?
        {
            return Err(RouterError::AlreadyStarted);
        }
        let result = self.start_inner(path).await;
        match result {
            Ok(state) => {
                self.inner.fsm.send(LifecycleEvent::Started, None)?;
                Ok(state)
            }
            Err(error) => {
                self.inner.fsm.send(LifecycleEvent::Fail, None)?;
                Err(error)
            }
        }
    }

    /// Start from a pre-built state instead of a path.
    pub async fn start_with_state(&self, state: State) -> Result<Arc<State>, RouterError> {
        self.ensure_not_disposed()?;
        if !self
            .inner
            .fsm
            .send(LifecycleEvent::Start, Some(RouterEvent::RouterStart))?
        {
            return Err(RouterError::AlreadyStarted);
        }
        let result = self
            .navigate_to_state(
                Arc::new(state),
                None,
                NavigationOptions::default(),
            )
            .await;
        match result {
            Ok(state) => {
                self.inner.fsm.send(LifecycleEvent::Started, None)?;
                Ok(state)
            }
            Err(error) => {
                self.inner.fsm.send(LifecycleEvent::Fail, None)?;
                Err(error)
            }
        }
    }

    async fn start_inner(&self, path: &str) -> Result<Arc<State>, RouterError> {
        if path.is_empty() {
            if self.inner.options.default_route.is_none() {
                return Err(RouterError::NoStartPathOrState);
            }
            return self.navigate_to_default_internal(NavigationOptions::default()).await;
        }
        match self.inner.routes.match_path(path, None, &self.inner.deps)? {
            Some(matched) => {
                let options = NavigationOptions {
                    redirected: matched.redirected,
                    ..NavigationOptions::default()
                };
                let to = self.matched_to_state(matched, options);
                self.navigate_to_state(to, None, options).await
            }
            None if self.inner.options.allow_not_found => {
                let to = self
                    .inner
                    .states
                    .make_not_found_state(path, NavigationOptions::default());
                self.navigate_to_state(to, None, NavigationOptions::default()).await
            }
            None if self.inner.options.default_route.is_some() => {
                self.navigate_to_default_internal(NavigationOptions::default()).await
            }
            None => {
                let error = RouterError::RouteNotFound {
                    name: path.to_string(),
                };
                self.inner.bus.emit(&RouterEvent::TransitionError {
                    to: None,
                    from: None,
                    error: error.clone(),
                })?;
                Err(error)
            }
        }
    }

    /// Stop the router: cancel any in-flight transition, emit
    /// `router_stop`, return to IDLE.
    pub fn stop(&self) -> Result<(), RouterError> {
        self.ensure_not_disposed()?;
        if self.inner.fsm.state() == LifecycleState::Idle {
            return Err(RouterError::NotStarted);
        }
        self.cancel_in_flight()?;
        self.inner
            .fsm
            .send(LifecycleEvent::Stop, Some(RouterEvent::RouterStop))?;
        Ok(())
    }

    /// Irreversibly tear the router down.
    ///
    /// Cancels the in-flight transition, tears every plugin down, clears
    /// listeners, guards, middleware and states. Idempotent; every mutator
    /// afterwards fails with `router_disposed`.
    pub fn dispose(&self) {
        if self.inner.fsm.is_disposed() {
            return;
        }
        let _ = self.cancel_in_flight();
        self.inner.fsm.dispose();
        self.inner.plugins.dispose_all();
        self.inner.bus.clear_all();
        self.inner.middleware.clear();
        self.inner.guards.clear_all();
        self.inner.states.reset();
        tracing::debug!(target: "roam", "router disposed");
    }

    // ── Navigation ──────────────────────────────────────────────────────

    pub async fn navigate(&self, name: &str, params: Params) -> Result<Arc<State>, RouterError> {
        self.navigate_with_options(name, params, NavigationOptions::default())
            .await
    }

    pub async fn navigate_with_options(
        &self,
        name: &str,
        params: Params,
        options: NavigationOptions,
    ) -> Result<Arc<State>, RouterError> {
        self.ensure_not_disposed()?;
        if !self.inner.fsm.is_started() {
            return Err(RouterError::NotStarted);
        }
        self.validate_route_name(name)?;
        self.navigate_internal(name, params, options).await
    }

    /// Navigate to the configured default route.
    pub async fn navigate_to_default(&self) -> Result<Arc<State>, RouterError> {
        self.navigate_to_default_with_options(NavigationOptions::default())
            .await
    }

    pub async fn navigate_to_default_with_options(
        &self,
        options: NavigationOptions,
    ) -> Result<Arc<State>, RouterError> {
        self.ensure_not_disposed()?;
        if !self.inner.fsm.is_started() {
            return Err(RouterError::NotStarted);
        }
        self.navigate_to_default_internal(options).await
    }

    async fn navigate_to_default_internal(
        &self,
        options: NavigationOptions,
    ) -> Result<Arc<State>, RouterError> {
        let Some(default_route) = &self.inner.options.default_route else {
            return Err(RouterError::NoStartPathOrState);
        };
        let name = default_route.resolve(&self.inner.deps);
        let params = self
            .inner
            .options
            .default_params
            .as_ref()
            .map(|p| p.resolve(&self.inner.deps))
            .unwrap_or_default();
        self.navigate_internal(&name, params, options).await
    }

    async fn navigate_internal(
        &self,
        name: &str,
        params: Params,
        options: NavigationOptions,
    ) -> Result<Arc<State>, RouterError> {
        let (resolved, merged) = self
            .inner
            .routes
            .forward_state(name, params, &self.inner.deps)?;
        let from = self.inner.states.current();
        if !self.inner.routes.has_route(&resolved) {
            let error = RouterError::RouteNotFound { name: resolved };
            self.inner.bus.emit(&RouterEvent::TransitionError {
                to: None,
                from,
                error: error.clone(),
            })?;
            return Err(error);
        }
        let options = NavigationOptions {
            redirected: options.redirected || resolved != name,
            ..options
        };
        let to = self.build_nav_state(&resolved, merged, options, None)?;

        if !options.force && !options.reload {
            if let Some(from) = &from {
                if states_equal(from, &to, false) {
                    return Err(RouterError::SameStates);
                }
            }
        }
        self.navigate_to_state(to, from, options).await
    }

    /// Synchronous dry run: would a navigation to `name` pass its guards?
    ///
    /// Only synchronous guard verdicts are consulted; a deferred (async)
    /// guard is assumed to allow.
    pub fn can_navigate_to(&self, name: &str, params: Params) -> bool {
        if self.inner.fsm.is_disposed() {
            return false;
        }
        let Ok((resolved, merged)) = self
            .inner
            .routes
            .forward_state(name, params, &self.inner.deps)
        else {
            return false;
        };
        if !self.inner.routes.has_route(&resolved) {
            return false;
        }
        let Ok(to) = self.build_nav_state(&resolved, merged, NavigationOptions::default(), None)
        else {
            return false;
        };
        dry_run_guards(
            &self.inner.guards,
            &to,
            self.inner.states.current().as_deref(),
        )
    }

    /// Cancel the parked transition, if any, and emit its
    /// `transition_cancel`. Taking the entry is what transfers terminal
    /// ownership to this caller.
    fn cancel_in_flight(&self) -> Result<(), RouterError> {
        let entry = self
            .inner
            .in_flight
            .lock()
            .expect("in-flight lock poisoned")
            .take();
        if let Some(entry) = entry {
            entry.token.cancel();
            let payload = RouterEvent::TransitionCancel {
                to: entry.to,
                from: entry.from,
            };
            if !self.inner.fsm.send(LifecycleEvent::Cancel, Some(payload.clone()))? {
                self.inner.bus.emit(&payload)?;
            }
        }
        Ok(())
    }

    /// Attempt a terminal FSM send; when the FSM is not in a state that
    /// allows it (initial navigation runs under STARTING), emit directly so
    /// every `transition_start`-bearing transition still gets exactly one
    /// terminal event.
    fn send_terminal(
        &self,
        event: LifecycleEvent,
        payload: RouterEvent,
    ) -> Result<(), RouterError> {
        if !self.inner.fsm.send(event, Some(payload.clone()))? {
            self.inner.bus.emit(&payload)?;
        }
        Ok(())
    }

    async fn navigate_to_state(
        &self,
        to: Arc<State>,
        from: Option<Arc<State>>,
        options: NavigationOptions,
    ) -> Result<Arc<State>, RouterError> {
        self.cancel_in_flight()?;

        let id = self.inner.nav_counter.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        *self
            .inner
            .in_flight
            .lock()
            .expect("in-flight lock poisoned") = Some(InFlight {
            id,
            token: token.clone(),
            to: to.clone(),
            from: from.clone(),
        });

        // READY -> TRANSITIONING emits transition_start; under STARTING the
        // send is rejected and the initial navigation runs without one.
        self.inner.fsm.send(
            LifecycleEvent::Navigate,
            Some(RouterEvent::TransitionStart {
                to: to.clone(),
                from: from.clone(),
            }),
        )?;

        // Racing the token means a cancelled navigation rejects promptly
        // even while a guard future is still pending.
        let result = tokio::select! {
            result = run_pipeline(
                TransitionContext {
                    guards: &self.inner.guards,
                    middleware: &self.inner.middleware,
                    token: &token,
                },
                to.clone(),
                from.clone(),
            ) => result,
            _ = token.cancelled() => Err(RouterError::TransitionCancelled),
        };

        // Reclaim the slot; if it is gone, a canceller owns the terminal
        // event and already emitted transition_cancel.
        let owns = {
            let mut in_flight = self
                .inner
                .in_flight
                .lock()
                .expect("in-flight lock poisoned");
            match in_flight.as_ref() {
                Some(entry) if entry.id == id => {
                    *in_flight = None;
                    true
                }
                _ => false,
            }
        };
        if !owns {
            return Err(RouterError::TransitionCancelled);
        }

        match result {
            Ok(final_state) => {
                // Routes may have been removed while a guard was awaited.
                if final_state.name != UNKNOWN_ROUTE
                    && !self.inner.routes.has_route(&final_state.name)
                {
                    let error = RouterError::RouteNotFound {
                        name: final_state.name.clone(),
                    };
                    self.send_terminal(
                        LifecycleEvent::Fail,
                        RouterEvent::TransitionError {
                            to: Some(final_state),
                            from,
                            error: error.clone(),
                        },
                    )?;
                    return Err(error);
                }
                self.inner.states.set_state(final_state.clone());
                self.send_terminal(
                    LifecycleEvent::Complete,
                    RouterEvent::TransitionSuccess {
                        to: final_state.clone(),
                        from,
                        options,
                    },
                )?;
                Ok(final_state)
            }
            Err(RouterError::TransitionCancelled) => {
                self.send_terminal(
                    LifecycleEvent::Cancel,
                    RouterEvent::TransitionCancel { to, from },
                )?;
                Err(RouterError::TransitionCancelled)
            }
            Err(error) => {
                self.send_terminal(
                    LifecycleEvent::Fail,
                    RouterEvent::TransitionError {
                        to: Some(to),
                        from,
                        error: error.clone(),
                    },
                )?;
                Err(error)
            }
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("lifecycle", &self.inner.fsm.state())
            .field("routes", &self.inner.routes.route_count())
            .finish()
    }
}
