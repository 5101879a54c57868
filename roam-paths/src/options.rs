//! Options consumed by the matcher, the path builder and the query codec.
//!
//! `roam-core` derives a [`MatchOptions`] snapshot from its own router
//! options; nothing in this crate reads configuration from anywhere else.

/// How trailing slashes are treated when matching and building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrailingSlash {
    /// The path must match the template exactly, slash included.
    Strict,
    /// Trailing slashes are stripped before matching and never emitted.
    Never,
    /// Built paths always carry a trailing slash; matching accepts either.
    Always,
    /// Matching accepts either form; building keeps the template's form.
    #[default]
    Preserve,
}

/// Percent-encoding applied to URL (and splat) param values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UrlParamsEncoding {
    /// Encode segment params fully; splat params keep their `/` separators.
    #[default]
    Default,
    /// Encode like `encodeURI`: reserved URI characters pass through.
    Uri,
    /// Encode every param fully, slashes included.
    UriComponent,
    /// No encoding or decoding at all.
    None,
}

/// What happens to query params the matched route chain never declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryParamsMode {
    /// Undeclared query params make the match fail; `build` drops extras.
    Strict,
    /// Undeclared query params are kept on match and appended on build.
    #[default]
    Loose,
}

/// Serialization of array values in query strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArrayFormat {
    /// `a=1&a=2`
    #[default]
    Repeat,
    /// `a[]=1&a[]=2`
    Brackets,
    /// `a[0]=1&a[1]=2`
    Index,
}

/// Query codec options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryParamsOptions {
    pub array_format: ArrayFormat,
}

/// The full option set handed to [`match_route`](crate::match_route) and
/// [`build_route_path`](crate::build_route_path).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchOptions {
    pub trailing_slash: TrailingSlash,
    pub url_params_encoding: UrlParamsEncoding,
    pub query_params_mode: QueryParamsMode,
    pub query_params: QueryParamsOptions,
}
