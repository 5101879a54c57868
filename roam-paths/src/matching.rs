//! Matching a concrete path against the route tree.

use crate::options::{MatchOptions, QueryParamsMode, TrailingSlash};
use crate::pattern::ParamKind;
use crate::query::parse_query;
use crate::tree::{NodeRef, RouteTree};
use crate::Params;

/// A successful match: the deepest matched route, its merged params, and
/// the per-segment param kinds along the matched chain.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub name: String,
    pub params: Params,
    /// `(segment name, [(param name, kind)])` from root to matched node.
    pub segment_params: Vec<(String, Vec<(String, ParamKind)>)>,
}

/// Match `path` against the tree.
///
/// The path is split at `?`; the path part is walked depth-first through
/// the tree (static-leading siblings first), the query part goes through
/// the query codec and, in strict mode, must only contain params the
/// matched chain declares.
pub fn match_route(tree: &RouteTree, path: &str, options: &MatchOptions) -> Option<RouteMatch> {
    let (path_part, query_part) = match path.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path, None),
    };

    // An empty remainder is still fine: "/app" matches root path "/app".
    let path_part = if tree.root_path().is_empty() {
        path_part
    } else {
        path_part.strip_prefix(tree.root_path())?
    };

    let had_trailing_slash = path_part.len() > 1 && path_part.ends_with('/');
    let segments: Vec<&str> = path_part.split('/').filter(|s| !s.is_empty()).collect();

    let mut chain = Vec::new();
    if !descend(tree.root_nodes(), &segments, options, &mut chain) {
        return None;
    }

    // Trailing-slash agreement is only enforced in strict mode.
    if options.trailing_slash == TrailingSlash::Strict {
        let template_has = chain
            .last()
            .map(|(node, _): &(NodeRef<'_>, Params)| node.pattern().has_trailing_slash())
            .unwrap_or(false);
        if !segments.is_empty() && template_has != had_trailing_slash {
            return None;
        }
    }

    let mut params = Params::new();
    let mut segment_params = Vec::with_capacity(chain.len());
    for (node, captured) in &chain {
        let mut kinds: Vec<(String, ParamKind)> = Vec::new();
        for name in node.pattern().url_params() {
            kinds.push((name.to_string(), ParamKind::Url));
        }
        if let Some(name) = node.pattern().splat_param() {
            kinds.push((name.to_string(), ParamKind::Splat));
        }
        for name in node.pattern().query_params() {
            kinds.push((name.to_string(), ParamKind::Query));
        }
        segment_params.push((node.name().to_string(), kinds));
        for (k, v) in captured {
            params.insert(k.clone(), v.clone());
        }
    }

    if let Some(query) = query_part {
        let query_params = parse_query(query, &options.query_params);
        if options.query_params_mode == QueryParamsMode::Strict {
            let declared: Vec<&str> = chain
                .iter()
                .flat_map(|(node, _)| node.pattern().query_params())
                .collect();
            if query_params.keys().any(|k| !declared.contains(&k.as_str())) {
                return None;
            }
        }
        for (k, v) in query_params {
            params.insert(k, v);
        }
    }

    let name = chain.last()?.0.name().to_string();
    tracing::trace!(target: "roam", %path, route = %name, "path matched");
    Some(RouteMatch {
        name,
        params,
        segment_params,
    })
}

/// Depth-first walk: try each candidate node against the remaining
/// segments; a node matches terminally when nothing remains after it,
/// otherwise its children get the rest. Backtracks on dead ends.
fn descend<'a>(
    candidates: impl Iterator<Item = NodeRef<'a>>,
    remaining: &[&str],
    options: &MatchOptions,
    chain: &mut Vec<(NodeRef<'a>, Params)>,
) -> bool {
    for node in candidates {
        if let Some((consumed, captured)) =
            node.pattern().match_segments(remaining, options.url_params_encoding)
        {
            chain.push((node, captured));
            let rest = &remaining[consumed..];
            if rest.is_empty() {
                return true;
            }
            if descend(node.children(), rest, options, chain) {
                return true;
            }
            chain.pop();
        }
    }
    false
}
