//! Forward chains: declarative redirects between route names.
//!
//! A route may forward to another route, statically by name or dynamically
//! through a callback. Chains are followed until a route without a forward;
//! a revisited name or a chain past [`MAX_FORWARD_DEPTH`] hops is an error
//! no matter how it was configured — the resolver enforces this even when
//! facade validation is switched off. Fully static chains are resolved once
//! and cached; any forward-affecting mutation rebuilds the cache.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use roam_paths::{Params, RouteTree};

use crate::dependencies::Dependencies;
use crate::error::RouterError;

/// Dynamic forward target: `(deps, params) -> route name`.
pub type ForwardFn = Arc<dyn Fn(&Dependencies, &Params) -> String + Send + Sync>;

/// Hard cap on forward chain length.
pub const MAX_FORWARD_DEPTH: usize = 100;

#[derive(Default, Clone)]
pub(crate) struct ForwardMaps {
    static_map: HashMap<String, String>,
    dynamic_map: HashMap<String, ForwardFn>,
    /// Cache of fully static chains: source -> terminal.
    resolved: HashMap<String, String>,
}

impl ForwardMaps {
    pub(crate) fn set_static(&mut self, from: impl Into<String>, to: impl Into<String>) {
        let from = from.into();
        self.dynamic_map.remove(&from);
        self.static_map.insert(from, to.into());
    }

    pub(crate) fn set_dynamic(&mut self, from: impl Into<String>, f: ForwardFn) {
        let from = from.into();
        self.static_map.remove(&from);
        self.dynamic_map.insert(from, f);
    }

    pub(crate) fn clear_from(&mut self, from: &str) {
        self.static_map.remove(from);
        self.dynamic_map.remove(from);
    }

    pub(crate) fn static_target(&self, from: &str) -> Option<&str> {
        self.static_map.get(from).map(|s| s.as_str())
    }

    /// The cached terminal of a fully static chain, if one exists.
    pub(crate) fn static_terminal(&self, from: &str) -> Option<&str> {
        self.resolved.get(from).map(|s| s.as_str())
    }

    pub(crate) fn has_forward(&self, from: &str) -> bool {
        self.static_map.contains_key(from) || self.dynamic_map.contains_key(from)
    }

    pub(crate) fn static_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.static_map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub(crate) fn dynamic_entries(&self) -> impl Iterator<Item = (&str, &ForwardFn)> {
        self.dynamic_map.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Drop every forward whose source or static target is in `removed`.
    pub(crate) fn remove_routes(&mut self, removed: &HashSet<String>) {
        self.static_map
            .retain(|from, to| !removed.contains(from) && !removed.contains(to));
        self.dynamic_map.retain(|from, _| !removed.contains(from));
    }

    fn next_hop(&self, from: &str, deps: &Dependencies, params: &Params) -> Option<String> {
        if let Some(to) = self.static_map.get(from) {
            return Some(to.clone());
        }
        self.dynamic_map.get(from).map(|f| f(deps, params))
    }

    /// Follow the chain from `from` to its terminal route name.
    pub(crate) fn resolve(
        &self,
        from: &str,
        deps: &Dependencies,
        params: &Params,
    ) -> Result<String, RouterError> {
        if let Some(terminal) = self.resolved.get(from) {
            return Ok(terminal.clone());
        }
        let mut visited: HashSet<String> = HashSet::new();
        let mut chain = vec![from.to_string()];
        visited.insert(from.to_string());
        let mut current = from.to_string();
        while let Some(next) = self.next_hop(&current, deps, params) {
            if !visited.insert(next.clone()) {
                chain.push(next);
                return Err(RouterError::CircularForward { chain });
            }
            chain.push(next.clone());
            if chain.len() > MAX_FORWARD_DEPTH {
                return Err(RouterError::ForwardDepthExceeded {
                    from: from.to_string(),
                });
            }
            current = next;
        }
        Ok(current)
    }

    /// Recompute the static-chain cache. Chains touching a dynamic hop are
    /// left to runtime resolution; static cycles and over-deep chains fail
    /// here.
    pub(crate) fn rebuild_cache(&mut self) -> Result<(), RouterError> {
        let mut resolved = HashMap::new();
        for from in self.static_map.keys() {
            let mut visited: HashSet<&str> = HashSet::new();
            let mut chain = vec![from.clone()];
            visited.insert(from.as_str());
            let mut current = from.as_str();
            let terminal = loop {
                if self.dynamic_map.contains_key(current) {
                    // Not cacheable; resolved at match time.
                    break None;
                }
                match self.static_map.get(current) {
                    Some(next) => {
                        if !visited.insert(next.as_str()) {
                            chain.push(next.clone());
                            return Err(RouterError::CircularForward { chain });
                        }
                        chain.push(next.clone());
                        if chain.len() > MAX_FORWARD_DEPTH {
                            return Err(RouterError::ForwardDepthExceeded {
                                from: from.clone(),
                            });
                        }
                        current = next.as_str();
                    }
                    None => break Some(current.to_string()),
                }
            };
            if let Some(terminal) = terminal {
                resolved.insert(from.clone(), terminal);
            }
        }
        self.resolved = resolved;
        Ok(())
    }
}

/// Check that `to` (a resolved forward target) only requires URL and splat
/// params the source route also declares along its chain.
pub(crate) fn check_param_compatibility(
    tree: &RouteTree,
    from: &str,
    to: &str,
) -> Result<(), RouterError> {
    let collect = |name: &str| -> Option<Vec<String>> {
        let chain = tree.chain(name)?;
        let mut params = Vec::new();
        for node in chain {
            params.extend(node.pattern().url_params().iter().map(|s| s.to_string()));
            params.extend(node.pattern().splat_param().map(|s| s.to_string()));
        }
        Some(params)
    };
    let available = collect(from).unwrap_or_default();
    let required = collect(to).unwrap_or_default();
    for param in required {
        if !available.contains(&param) {
            return Err(RouterError::ForwardParamMismatch {
                from: from.to_string(),
                to: to.to_string(),
                param,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::Limits;
    use crate::logging::RouterLogger;
    use roam_paths::TreeDef;

    fn deps() -> Dependencies {
        Dependencies::new(Limits::default().max_dependencies, RouterLogger::default())
    }

    #[test]
    fn static_chain_resolves_and_caches() {
        let mut maps = ForwardMaps::default();
        maps.set_static("a", "b");
        maps.set_static("b", "c");
        maps.rebuild_cache().unwrap();
        assert_eq!(maps.resolve("a", &deps(), &Params::new()).unwrap(), "c");
        assert_eq!(maps.resolve("b", &deps(), &Params::new()).unwrap(), "c");
        assert_eq!(maps.resolve("c", &deps(), &Params::new()).unwrap(), "c");
    }

    #[test]
    fn cycle_is_detected_in_cache_rebuild() {
        let mut maps = ForwardMaps::default();
        maps.set_static("a", "b");
        maps.set_static("b", "a");
        let err = maps.rebuild_cache().unwrap_err();
        assert_eq!(err.code(), "circular_forward");
    }

    #[test]
    fn runtime_cycle_via_dynamic_hop_is_detected() {
        let mut maps = ForwardMaps::default();
        maps.set_dynamic("a", Arc::new(|_, _| "b".to_string()));
        maps.set_static("b", "a");
        maps.rebuild_cache().unwrap();
        let err = maps.resolve("a", &deps(), &Params::new()).unwrap_err();
        assert_eq!(err.code(), "circular_forward");
    }

    #[test]
    fn self_forward_is_a_cycle() {
        let mut maps = ForwardMaps::default();
        maps.set_static("a", "a");
        assert_eq!(
            maps.rebuild_cache().unwrap_err().code(),
            "circular_forward"
        );
    }

    #[test]
    fn dynamic_forward_sees_deps_and_params() {
        let mut maps = ForwardMaps::default();
        let deps = deps();
        deps.set_value("fallback", "login".to_string()).unwrap();
        maps.set_dynamic(
            "home",
            Arc::new(|deps, params| {
                if params.contains_key("token") {
                    "dashboard".to_string()
                } else {
                    (*deps.get_as::<String>("fallback").unwrap()).clone()
                }
            }),
        );
        assert_eq!(maps.resolve("home", &deps, &Params::new()).unwrap(), "login");
        let mut params = Params::new();
        params.insert("token".into(), serde_json::json!("x"));
        assert_eq!(maps.resolve("home", &deps, &params).unwrap(), "dashboard");
    }

    #[test]
    fn setting_one_kind_clears_the_other() {
        let mut maps = ForwardMaps::default();
        maps.set_dynamic("a", Arc::new(|_, _| "b".to_string()));
        maps.set_static("a", "c");
        assert_eq!(maps.resolve("a", &deps(), &Params::new()).unwrap(), "c");
    }

    #[test]
    fn remove_routes_drops_both_directions() {
        let mut maps = ForwardMaps::default();
        maps.set_static("a", "gone");
        maps.set_static("gone", "b");
        maps.set_static("c", "d");
        let removed: HashSet<String> = ["gone".to_string()].into();
        maps.remove_routes(&removed);
        assert!(!maps.has_forward("a"));
        assert!(!maps.has_forward("gone"));
        assert!(maps.has_forward("c"));
    }

    #[test]
    fn param_compatibility_requires_source_params() {
        let defs = vec![
            TreeDef::new("a", "/a"),
            TreeDef::new("b", "/b/:x"),
            TreeDef::new("c", "/c/:x"),
        ];
        let tree = RouteTree::compile(&defs, "").unwrap();
        let err = check_param_compatibility(&tree, "a", "b").unwrap_err();
        assert_eq!(err.code(), "forward_param_mismatch");
        check_param_compatibility(&tree, "c", "b").unwrap();
    }
}
