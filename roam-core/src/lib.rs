//! Core engine of the roam client-side router.
//!
//! The crate is organized component-per-module:
//!
//! - [`router`] — the validating facade and navigation orchestration
//! - [`routes`] — route definitions, per-route config, the compiled tree
//! - [`transition`] — transition path computation and the guard/middleware
//!   pipeline
//! - [`fsm`] — the lifecycle state machine
//! - [`events`] — the synchronous pub/sub bus
//! - [`guards`], [`middleware`], [`plugins`] — the extension registries
//! - [`dependencies`] — the named service container
//! - [`state`] — immutable states and the current/previous store
//! - [`forward`] — declarative redirect chains
//! - [`options`], [`limits`], [`logging`], [`error`] — configuration and
//!   diagnostics

pub mod clone;
pub mod dependencies;
pub mod error;
pub mod events;
pub mod forward;
pub mod fsm;
pub mod guards;
pub mod limits;
pub mod logging;
pub mod middleware;
pub mod options;
pub mod plugins;
pub mod prelude;
pub mod router;
pub mod routes;
pub mod state;
pub mod transition;

pub use dependencies::{Dep, Dependencies};
pub use error::RouterError;
pub use events::{EventKind, Listener, RouterEvent, Subscription};
pub use forward::{ForwardFn, MAX_FORWARD_DEPTH};
pub use fsm::{LifecycleEvent, LifecycleState};
pub use guards::{GuardCheck, GuardFactory, GuardFn, GuardSpec};
pub use limits::Limits;
pub use logging::{init_tracing, LogSink, RouterLogger};
pub use middleware::{
    middleware_fn, MiddlewareCheck, MiddlewareFactory, MiddlewareFn, MiddlewareHandle,
    MiddlewareStep,
};
pub use options::{DefaultParams, DefaultRoute, RouterOptions};
pub use plugins::{Plugin, PluginFactory, PluginHandle};
pub use router::Router;
pub use routes::{ForwardTo, MatchedPath, ParamsMapper, Route, RouteUpdate, Update};
pub use state::{states_equal, NavigationOptions, State, StateMeta, UNKNOWN_ROUTE};
pub use transition::{should_update_node, transition_path, TransitionPath};
