//! Building a concrete path for a named route.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::PathError;
use crate::options::{QueryParamsMode, TrailingSlash};
use crate::query::build_query;
use crate::tree::RouteTree;
use crate::Params;

/// Build the path for `name` from `params`.
///
/// URL and splat params are rendered into segments; declared query params
/// with values become the query string. In loose mode, leftover params the
/// chain never mentions are appended to the query as well; strict mode
/// drops them.
pub fn build_route_path(
    tree: &RouteTree,
    name: &str,
    params: &Params,
    options: &crate::options::MatchOptions,
) -> Result<String, PathError> {
    let chain = tree.chain(name).ok_or_else(|| PathError::UnknownRoute {
        name: name.to_string(),
    })?;

    let mut segments = Vec::new();
    let mut used: Vec<&str> = Vec::new();
    let mut declared_query: Vec<&str> = Vec::new();
    for node in &chain {
        let rendered = node
            .pattern()
            .build_segments(params, options.url_params_encoding)
            .map_err(|param| PathError::MissingParam {
                name: name.to_string(),
                param,
            })?;
        segments.extend(rendered);
        used.extend(node.pattern().url_params());
        used.extend(node.pattern().splat_param());
        declared_query.extend(node.pattern().query_params());
    }

    let mut path = format!("{}/{}", tree.root_path(), segments.join("/"));
    if segments.is_empty() {
        path = format!("{}/", tree.root_path());
    }

    let template_trailing = chain
        .last()
        .map(|node| node.pattern().has_trailing_slash())
        .unwrap_or(false);
    match options.trailing_slash {
        TrailingSlash::Never => {
            while path.len() > 1 && path.ends_with('/') {
                path.pop();
            }
        }
        TrailingSlash::Always => {
            if !path.ends_with('/') {
                path.push('/');
            }
        }
        TrailingSlash::Strict | TrailingSlash::Preserve => {
            if template_trailing && !path.ends_with('/') {
                path.push('/');
            }
        }
    }

    // Declared query params first, in declaration order, then loose extras
    // in a stable order.
    let mut query_pairs: Vec<(&str, &Value)> = Vec::new();
    for key in &declared_query {
        if let Some(value) = params.get(*key) {
            query_pairs.push((key, value));
        }
    }
    if options.query_params_mode == QueryParamsMode::Loose {
        let extras: BTreeMap<&str, &Value> = params
            .iter()
            .filter(|(k, _)| !used.contains(&k.as_str()) && !declared_query.contains(&k.as_str()))
            .map(|(k, v)| (k.as_str(), v))
            .collect();
        query_pairs.extend(extras);
    }

    let query = build_query(query_pairs, &options.query_params);
    if !query.is_empty() {
        path.push('?');
        path.push_str(&query);
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::MatchOptions;
    use crate::tree::TreeDef;
    use serde_json::json;

    fn tree() -> RouteTree {
        let defs = vec![
            TreeDef::new("home", "/"),
            TreeDef {
                name: "users".to_string(),
                path: "/users".to_string(),
                children: vec![TreeDef::new("view", "/:id?tab")],
            },
        ];
        RouteTree::compile(&defs, "").unwrap()
    }

    fn params(pairs: &[(&str, Value)]) -> Params {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn builds_nested_path() {
        let path = build_route_path(
            &tree(),
            "users.view",
            &params(&[("id", json!("7"))]),
            &MatchOptions::default(),
        )
        .unwrap();
        assert_eq!(path, "/users/7");
    }

    #[test]
    fn builds_root() {
        let path =
            build_route_path(&tree(), "home", &Params::new(), &MatchOptions::default()).unwrap();
        assert_eq!(path, "/");
    }

    #[test]
    fn unknown_route_errors() {
        let err =
            build_route_path(&tree(), "nope", &Params::new(), &MatchOptions::default()).unwrap_err();
        assert!(matches!(err, PathError::UnknownRoute { .. }));
    }

    #[test]
    fn missing_param_errors() {
        let err = build_route_path(
            &tree(),
            "users.view",
            &Params::new(),
            &MatchOptions::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            PathError::MissingParam {
                name: "users.view".to_string(),
                param: "id".to_string(),
            }
        );
    }

    #[test]
    fn declared_query_param_serializes() {
        let path = build_route_path(
            &tree(),
            "users.view",
            &params(&[("id", json!("7")), ("tab", json!("files"))]),
            &MatchOptions::default(),
        )
        .unwrap();
        assert_eq!(path, "/users/7?tab=files");
    }

    #[test]
    fn loose_extras_append_strict_drops() {
        let p = params(&[("id", json!("7")), ("zz", json!("1"))]);
        let loose = build_route_path(&tree(), "users.view", &p, &MatchOptions::default()).unwrap();
        assert_eq!(loose, "/users/7?zz=1");

        let strict = build_route_path(
            &tree(),
            "users.view",
            &p,
            &MatchOptions {
                query_params_mode: QueryParamsMode::Strict,
                ..MatchOptions::default()
            },
        )
        .unwrap();
        assert_eq!(strict, "/users/7");
    }

    #[test]
    fn trailing_slash_modes() {
        let p = params(&[("id", json!("7"))]);
        let always = build_route_path(
            &tree(),
            "users.view",
            &p,
            &MatchOptions {
                trailing_slash: TrailingSlash::Always,
                ..MatchOptions::default()
            },
        )
        .unwrap();
        assert_eq!(always, "/users/7/");

        let never = build_route_path(
            &tree(),
            "home",
            &Params::new(),
            &MatchOptions {
                trailing_slash: TrailingSlash::Never,
                ..MatchOptions::default()
            },
        )
        .unwrap();
        assert_eq!(never, "/");
    }

    #[test]
    fn root_path_prefixes_built_paths() {
        let defs = vec![TreeDef {
            name: "users".to_string(),
            path: "/users".to_string(),
            children: vec![],
        }];
        let tree = RouteTree::compile(&defs, "/app").unwrap();
        let path =
            build_route_path(&tree, "users", &Params::new(), &MatchOptions::default()).unwrap();
        assert_eq!(path, "/app/users");
    }
}
