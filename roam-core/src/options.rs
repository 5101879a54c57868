//! The immutable router options snapshot.
//!
//! Options are captured once at construction (or fork) and never change for
//! the lifetime of a router; anything dynamic goes through callbacks
//! resolved against the dependency container at use time.

use std::fmt;
use std::sync::Arc;

use roam_paths::{MatchOptions, Params, QueryParamsMode, QueryParamsOptions, TrailingSlash, UrlParamsEncoding};

use crate::dependencies::Dependencies;
use crate::limits::Limits;
use crate::logging::RouterLogger;

/// The route `navigate_to_default` falls back to: a fixed name or a
/// callback resolved against the dependency container.
#[derive(Clone)]
pub enum DefaultRoute {
    Name(String),
    Resolver(Arc<dyn Fn(&Dependencies) -> String + Send + Sync>),
}

impl DefaultRoute {
    pub fn resolve(&self, deps: &Dependencies) -> String {
        match self {
            DefaultRoute::Name(name) => name.clone(),
            DefaultRoute::Resolver(f) => f(deps),
        }
    }
}

impl fmt::Debug for DefaultRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultRoute::Name(name) => f.debug_tuple("Name").field(name).finish(),
            DefaultRoute::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

/// Params used together with [`DefaultRoute`].
#[derive(Clone)]
pub enum DefaultParams {
    Value(Params),
    Resolver(Arc<dyn Fn(&Dependencies) -> Params + Send + Sync>),
}

impl DefaultParams {
    pub fn resolve(&self, deps: &Dependencies) -> Params {
        match self {
            DefaultParams::Value(params) => params.clone(),
            DefaultParams::Resolver(f) => f(deps),
        }
    }
}

impl fmt::Debug for DefaultParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultParams::Value(params) => f.debug_tuple("Value").field(params).finish(),
            DefaultParams::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

/// Immutable configuration snapshot for one router instance.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub default_route: Option<DefaultRoute>,
    pub default_params: Option<DefaultParams>,
    pub trailing_slash: TrailingSlash,
    pub url_params_encoding: UrlParamsEncoding,
    pub query_params_mode: QueryParamsMode,
    pub query_params: QueryParamsOptions,
    /// Unmatched paths become the reserved unknown-route state instead of
    /// failing the match.
    pub allow_not_found: bool,
    /// After a forward, rewrite the state path for the terminal route.
    pub rewrite_path_on_match: bool,
    /// Skip facade-level input validation. Structural invariants (forward
    /// cycles, limits) are enforced regardless.
    pub no_validate: bool,
    /// Prefix prepended to every built path and stripped before matching.
    pub root_path: String,
    pub limits: Limits,
    pub logger: RouterLogger,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            default_route: None,
            default_params: None,
            trailing_slash: TrailingSlash::default(),
            url_params_encoding: UrlParamsEncoding::default(),
            query_params_mode: QueryParamsMode::default(),
            query_params: QueryParamsOptions::default(),
            allow_not_found: false,
            rewrite_path_on_match: true,
            no_validate: false,
            root_path: String::new(),
            limits: Limits::default(),
            logger: RouterLogger::default(),
        }
    }
}

impl RouterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_route(mut self, name: impl Into<String>) -> Self {
        self.default_route = Some(DefaultRoute::Name(name.into()));
        self
    }

    pub fn with_default_route_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&Dependencies) -> String + Send + Sync + 'static,
    {
        self.default_route = Some(DefaultRoute::Resolver(Arc::new(resolver)));
        self
    }

    pub fn with_default_params(mut self, params: Params) -> Self {
        self.default_params = Some(DefaultParams::Value(params));
        self
    }

    pub fn with_default_params_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&Dependencies) -> Params + Send + Sync + 'static,
    {
        self.default_params = Some(DefaultParams::Resolver(Arc::new(resolver)));
        self
    }

    pub fn with_trailing_slash(mut self, mode: TrailingSlash) -> Self {
        self.trailing_slash = mode;
        self
    }

    pub fn with_url_params_encoding(mut self, mode: UrlParamsEncoding) -> Self {
        self.url_params_encoding = mode;
        self
    }

    pub fn with_query_params_mode(mut self, mode: QueryParamsMode) -> Self {
        self.query_params_mode = mode;
        self
    }

    pub fn with_query_params(mut self, options: QueryParamsOptions) -> Self {
        self.query_params = options;
        self
    }

    pub fn with_allow_not_found(mut self, allow: bool) -> Self {
        self.allow_not_found = allow;
        self
    }

    pub fn with_rewrite_path_on_match(mut self, rewrite: bool) -> Self {
        self.rewrite_path_on_match = rewrite;
        self
    }

    pub fn with_no_validate(mut self, no_validate: bool) -> Self {
        self.no_validate = no_validate;
        self
    }

    pub fn with_root_path(mut self, root_path: impl Into<String>) -> Self {
        self.root_path = root_path.into();
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits.clamped();
        self
    }

    pub fn with_logger(mut self, logger: RouterLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Derive the option subset the path layer consumes.
    pub fn to_match_options(&self) -> MatchOptions {
        MatchOptions {
            trailing_slash: self.trailing_slash,
            url_params_encoding: self.url_params_encoding,
            query_params_mode: self.query_params_mode,
            query_params: self.query_params,
        }
    }
}
