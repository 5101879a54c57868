//! roam prelude — import everything you need with a single `use`.
//!
//! ```ignore
//! use roam_core::prelude::*;
//!
//! let router = Router::new(
//!     vec![
//!         Route::new("home", "/"),
//!         Route::new("users", "/users").child(Route::new("view", "/:id")),
//!     ],
//!     RouterOptions::new().with_default_route("home"),
//! )?;
//! ```

pub use crate::dependencies::{Dep, Dependencies};
pub use crate::error::RouterError;
pub use crate::events::{EventKind, Listener, RouterEvent, Subscription};
pub use crate::fsm::LifecycleState;
pub use crate::guards::{GuardCheck, GuardFactory, GuardFn, GuardSpec};
pub use crate::limits::Limits;
pub use crate::logging::{init_tracing, RouterLogger};
pub use crate::middleware::{
    middleware_fn, MiddlewareCheck, MiddlewareFactory, MiddlewareFn, MiddlewareHandle,
    MiddlewareStep,
};
pub use crate::options::{DefaultParams, DefaultRoute, RouterOptions};
pub use crate::plugins::{Plugin, PluginFactory, PluginHandle};
pub use crate::router::Router;
pub use crate::routes::{ForwardTo, MatchedPath, ParamsMapper, Route, RouteUpdate, Update};
pub use crate::state::{states_equal, NavigationOptions, State, StateMeta, UNKNOWN_ROUTE};
pub use crate::transition::{should_update_node, transition_path, TransitionPath};

pub use roam_paths::{
    ArrayFormat, MatchOptions, ParamKind, Params, QueryParamsMode, QueryParamsOptions,
    TrailingSlash, UrlParamsEncoding,
};
