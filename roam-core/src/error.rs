//! The router error taxonomy.
//!
//! Every failure the engine can surface is one [`RouterError`] variant with
//! a stable [`code`](RouterError::code) string. Codes are part of the public
//! contract: plugins and listeners match on them, so they never change.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum RouterError {
    /// A navigation was requested before `start` completed.
    NotStarted,
    /// `start` was called while the router is already running.
    AlreadyStarted,
    /// Any mutating operation after `dispose`.
    Disposed,
    /// `start` had neither a usable path nor a default route to fall back on.
    NoStartPathOrState,
    /// The named route does not exist (or vanished mid-transition).
    RouteNotFound { name: String },
    /// Navigation to the current state without `reload` or `force`.
    SameStates,
    /// The in-flight transition was cancelled by a newer navigation,
    /// `stop` or `dispose`.
    TransitionCancelled,
    /// A middleware blocked or failed the transition.
    TransitionErr { message: String },
    /// An activate guard denied the transition at `segment`.
    CannotActivate { segment: String },
    /// A deactivate guard denied the transition at `segment`.
    CannotDeactivate { segment: String },
    /// A forward chain revisited a route.
    CircularForward { chain: Vec<String> },
    /// A forward chain exceeded the depth cap.
    ForwardDepthExceeded { from: String },
    /// A forward target requires a URL param its source cannot provide.
    ForwardParamMismatch {
        from: String,
        to: String,
        param: String,
    },
    /// `Dependencies::get` for an unknown name (or a type mismatch).
    DependencyNotFound { name: String },
    /// The same callback was registered twice for one event.
    DuplicateListener { event: &'static str },
    /// The same middleware factory appears twice in the pipeline.
    DuplicateMiddleware,
    /// Listener cap reached for an event.
    ListenerLimit { event: &'static str },
    /// `emit` re-entered itself past the configured depth.
    RecursionDepth { event: &'static str },
    PluginLimit,
    MiddlewareLimit,
    DependencyLimit,
    LifecycleHandlerLimit,
    /// A route definition failed validation.
    InvalidRoute { name: String, reason: String },
}

impl RouterError {
    /// The stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            RouterError::NotStarted => "router_not_started",
            RouterError::AlreadyStarted => "router_already_started",
            RouterError::Disposed => "router_disposed",
            RouterError::NoStartPathOrState => "no_start_path_or_state",
            RouterError::RouteNotFound { .. } => "route_not_found",
            RouterError::SameStates => "same_states",
            RouterError::TransitionCancelled => "transition_cancelled",
            RouterError::TransitionErr { .. } => "transition_err",
            RouterError::CannotActivate { .. } => "cannot_activate",
            RouterError::CannotDeactivate { .. } => "cannot_deactivate",
            RouterError::CircularForward { .. } => "circular_forward",
            RouterError::ForwardDepthExceeded { .. } => "forward_depth_exceeded",
            RouterError::ForwardParamMismatch { .. } => "forward_param_mismatch",
            RouterError::DependencyNotFound { .. } => "dependency_not_found",
            RouterError::DuplicateListener { .. } => "duplicate_listener",
            RouterError::DuplicateMiddleware => "duplicate_middleware",
            RouterError::ListenerLimit { .. } => "listener_limit",
            RouterError::RecursionDepth { .. } => "recursion_depth",
            RouterError::PluginLimit => "plugin_limit",
            RouterError::MiddlewareLimit => "middleware_limit",
            RouterError::DependencyLimit => "dependency_limit",
            RouterError::LifecycleHandlerLimit => "lifecycle_handler_limit",
            RouterError::InvalidRoute { .. } => "invalid_route",
        }
    }
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterError::NotStarted => write!(f, "router is not started"),
            RouterError::AlreadyStarted => write!(f, "router is already started"),
            RouterError::Disposed => write!(f, "router has been disposed"),
            RouterError::NoStartPathOrState => {
                write!(f, "start needs a path, a state, or a default route")
            }
            RouterError::RouteNotFound { name } => write!(f, "route '{}' not found", name),
            RouterError::SameStates => write!(f, "already in the requested state"),
            RouterError::TransitionCancelled => write!(f, "transition cancelled"),
            RouterError::TransitionErr { message } => write!(f, "transition failed: {}", message),
            RouterError::CannotActivate { segment } => {
                write!(f, "activation blocked at '{}'", segment)
            }
            RouterError::CannotDeactivate { segment } => {
                write!(f, "deactivation blocked at '{}'", segment)
            }
            RouterError::CircularForward { chain } => {
                write!(f, "circular forward: {}", chain.join(" -> "))
            }
            RouterError::ForwardDepthExceeded { from } => {
                write!(f, "forward chain from '{}' exceeds the depth limit", from)
            }
            RouterError::ForwardParamMismatch { from, to, param } => write!(
                f,
                "forward '{}' -> '{}' requires param '{}' the source does not declare",
                from, to, param
            ),
            RouterError::DependencyNotFound { name } => {
                write!(f, "dependency '{}' not found", name)
            }
            RouterError::DuplicateListener { event } => {
                write!(f, "listener already registered for '{}'", event)
            }
            RouterError::DuplicateMiddleware => {
                write!(f, "middleware already registered")
            }
            RouterError::ListenerLimit { event } => {
                write!(f, "listener limit reached for '{}'", event)
            }
            RouterError::RecursionDepth { event } => {
                write!(f, "event '{}' exceeded the emit recursion depth", event)
            }
            RouterError::PluginLimit => write!(f, "plugin limit reached"),
            RouterError::MiddlewareLimit => write!(f, "middleware limit reached"),
            RouterError::DependencyLimit => write!(f, "dependency limit reached"),
            RouterError::LifecycleHandlerLimit => {
                write!(f, "lifecycle handler limit reached")
            }
            RouterError::InvalidRoute { name, reason } => {
                write!(f, "invalid route '{}': {}", name, reason)
            }
        }
    }
}

impl std::error::Error for RouterError {}
