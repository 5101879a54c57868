//! Path primitives for the roam router.
//!
//! This crate is the collaborator layer underneath `roam-core`: it owns the
//! path template grammar, the compiled route tree, segment matching, path
//! building, and the query-string codec. The core engine consumes it through
//! a handful of entry points and never parses a URL itself:
//!
//! - [`RouteTree::compile`] — definitions to tree
//! - [`match_route`] — path to `(name, params)`
//! - [`build_route_path`] — `(name, params)` to path
//!
//! Template grammar: static segments, `:name` URL params, `*name` splat
//! params (consume the rest of the path), and a trailing `?a&b` list of
//! declared query params.

pub mod error;
pub mod options;
pub mod pattern;
pub mod query;
pub mod tree;

mod build;
mod matching;

pub use build::build_route_path;
pub use error::PathError;
pub use matching::{match_route, RouteMatch};
pub use options::{
    ArrayFormat, MatchOptions, QueryParamsMode, QueryParamsOptions, TrailingSlash,
    UrlParamsEncoding,
};
pub use pattern::{ParamKind, PathPattern};
pub use query::{build_query, parse_query};
pub use tree::{RouteTree, TreeDef};

/// Route params as delivered to and from the matcher.
///
/// Values are JSON values: URL and splat params decode to strings, query
/// params may decode to strings, arrays or null depending on the codec
/// options.
pub type Params = serde_json::Map<String, serde_json::Value>;
