//! Route definitions, per-route configuration, and the route store.
//!
//! [`Route`] is the builder consumers hand to the router: name, path,
//! children, plus optional behavior (guards, forwards, param codecs,
//! defaults). The store sanitizes definitions down to name/path/children,
//! keeps the compiled tree in sync, and owns everything per-route that is
//! not a guard — guards live in the guard registry and are wired by the
//! facade from the hooks this module returns.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use roam_paths::{
    build_route_path, match_route, MatchOptions, ParamKind, Params, PathError, RouteTree, TreeDef,
};

use crate::dependencies::Dependencies;
use crate::error::RouterError;
use crate::forward::{check_param_compatibility, ForwardFn, ForwardMaps};
use crate::guards::GuardSpec;
use crate::logging::RouterLogger;
use crate::options::RouterOptions;
use crate::state::State;

/// A params transformer attached to a route (`encode_params` /
/// `decode_params`).
pub type ParamsMapper = Arc<dyn Fn(Params) -> Params + Send + Sync>;

/// Where a route forwards to.
#[derive(Clone)]
pub enum ForwardTo {
    Route(String),
    Dynamic(ForwardFn),
}

/// One route definition with its optional behavior.
#[derive(Clone)]
pub struct Route {
    pub name: String,
    pub path: String,
    pub children: Vec<Route>,
    pub(crate) can_activate: Option<GuardSpec>,
    pub(crate) can_deactivate: Option<GuardSpec>,
    pub(crate) forward_to: Option<ForwardTo>,
    pub(crate) encode_params: Option<ParamsMapper>,
    pub(crate) decode_params: Option<ParamsMapper>,
    pub(crate) default_params: Option<Params>,
}

impl Route {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            children: Vec::new(),
            can_activate: None,
            can_deactivate: None,
            forward_to: None,
            encode_params: None,
            decode_params: None,
            default_params: None,
        }
    }

    pub fn child(mut self, child: Route) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: Vec<Route>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn can_activate(mut self, spec: impl Into<GuardSpec>) -> Self {
        self.can_activate = Some(spec.into());
        self
    }

    pub fn can_deactivate(mut self, spec: impl Into<GuardSpec>) -> Self {
        self.can_deactivate = Some(spec.into());
        self
    }

    pub fn forward_to(mut self, target: impl Into<String>) -> Self {
        self.forward_to = Some(ForwardTo::Route(target.into()));
        self
    }

    pub fn forward_to_dynamic<F>(mut self, f: F) -> Self
    where
        F: Fn(&Dependencies, &Params) -> String + Send + Sync + 'static,
    {
        self.forward_to = Some(ForwardTo::Dynamic(Arc::new(f)));
        self
    }

    pub fn encode_params<F>(mut self, f: F) -> Self
    where
        F: Fn(Params) -> Params + Send + Sync + 'static,
    {
        self.encode_params = Some(Arc::new(f));
        self
    }

    pub fn decode_params<F>(mut self, f: F) -> Self
    where
        F: Fn(Params) -> Params + Send + Sync + 'static,
    {
        self.decode_params = Some(Arc::new(f));
        self
    }

    pub fn default_params(mut self, params: Params) -> Self {
        self.default_params = Some(params);
        self
    }

    fn to_tree_def(&self) -> TreeDef {
        TreeDef {
            name: self.name.clone(),
            path: self.path.clone(),
            children: self.children.iter().map(Route::to_tree_def).collect(),
        }
    }
}

/// A deserialized route table entry is a behavior-free route.
impl From<TreeDef> for Route {
    fn from(def: TreeDef) -> Self {
        let mut route = Route::new(def.name, def.path);
        route.children = def.children.into_iter().map(Route::from).collect();
        route
    }
}

/// Tri-state field in a [`RouteUpdate`]: keep, clear, or set.
#[derive(Clone)]
pub enum Update<T> {
    Keep,
    Clear,
    Set(T),
}

impl<T> Default for Update<T> {
    fn default() -> Self {
        Update::Keep
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Update<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Update::Keep => write!(f, "Keep"),
            Update::Clear => write!(f, "Clear"),
            Update::Set(v) => f.debug_tuple("Set").field(v).finish(),
        }
    }
}

/// Partial update for one route; untouched fields keep their value.
#[derive(Clone, Default)]
pub struct RouteUpdate {
    pub(crate) forward_to: Update<ForwardTo>,
    pub(crate) default_params: Update<Params>,
    pub(crate) encode_params: Update<ParamsMapper>,
    pub(crate) decode_params: Update<ParamsMapper>,
    pub(crate) can_activate: Update<GuardSpec>,
    pub(crate) can_deactivate: Update<GuardSpec>,
}

impl RouteUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward_to(mut self, target: impl Into<String>) -> Self {
        self.forward_to = Update::Set(ForwardTo::Route(target.into()));
        self
    }

    pub fn forward_to_dynamic<F>(mut self, f: F) -> Self
    where
        F: Fn(&Dependencies, &Params) -> String + Send + Sync + 'static,
    {
        self.forward_to = Update::Set(ForwardTo::Dynamic(Arc::new(f)));
        self
    }

    pub fn clear_forward_to(mut self) -> Self {
        self.forward_to = Update::Clear;
        self
    }

    pub fn default_params(mut self, params: Params) -> Self {
        self.default_params = Update::Set(params);
        self
    }

    pub fn clear_default_params(mut self) -> Self {
        self.default_params = Update::Clear;
        self
    }

    pub fn encode_params<F>(mut self, f: F) -> Self
    where
        F: Fn(Params) -> Params + Send + Sync + 'static,
    {
        self.encode_params = Update::Set(Arc::new(f));
        self
    }

    pub fn clear_encode_params(mut self) -> Self {
        self.encode_params = Update::Clear;
        self
    }

    pub fn decode_params<F>(mut self, f: F) -> Self
    where
        F: Fn(Params) -> Params + Send + Sync + 'static,
    {
        self.decode_params = Update::Set(Arc::new(f));
        self
    }

    pub fn clear_decode_params(mut self) -> Self {
        self.decode_params = Update::Clear;
        self
    }

    pub fn can_activate(mut self, spec: impl Into<GuardSpec>) -> Self {
        self.can_activate = Update::Set(spec.into());
        self
    }

    pub fn clear_can_activate(mut self) -> Self {
        self.can_activate = Update::Clear;
        self
    }

    pub fn can_deactivate(mut self, spec: impl Into<GuardSpec>) -> Self {
        self.can_deactivate = Update::Set(spec.into());
        self
    }

    pub fn clear_can_deactivate(mut self) -> Self {
        self.can_deactivate = Update::Clear;
        self
    }
}

/// Guard registrations extracted from added routes, applied by the facade.
#[derive(Debug)]
pub(crate) struct GuardHook {
    pub(crate) name: String,
    pub(crate) can_activate: Option<GuardSpec>,
    pub(crate) can_deactivate: Option<GuardSpec>,
}

/// A successful `match_path`, forwards already resolved.
#[derive(Debug, Clone)]
pub struct MatchedPath {
    pub name: String,
    pub params: Params,
    pub path: String,
    pub segment_params: Vec<(String, Vec<(String, ParamKind)>)>,
    pub redirected: bool,
    pub source: Option<String>,
}

#[derive(Clone, Default)]
pub(crate) struct RouteConfig {
    pub(crate) encoders: HashMap<String, ParamsMapper>,
    pub(crate) decoders: HashMap<String, ParamsMapper>,
    pub(crate) default_params: HashMap<String, Params>,
    pub(crate) forwards: ForwardMaps,
}

pub(crate) struct RouteStore {
    defs: RwLock<Vec<TreeDef>>,
    tree: RwLock<Arc<RouteTree>>,
    config: RwLock<RouteConfig>,
    match_options: MatchOptions,
    rewrite_path_on_match: bool,
    root_path: String,
    logger: RouterLogger,
}

fn validate_local_name(name: &str) -> Result<(), RouterError> {
    let well_formed = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if well_formed {
        Ok(())
    } else {
        Err(RouterError::InvalidRoute {
            name: name.to_string(),
            reason: "route names may only contain letters, digits, '_' and '-'".to_string(),
        })
    }
}

fn validate_path(name: &str, path: &str) -> Result<(), RouterError> {
    if path.starts_with('/') || path.starts_with('?') {
        Ok(())
    } else {
        Err(RouterError::InvalidRoute {
            name: name.to_string(),
            reason: format!("path '{}' must start with '/' or '?'", path),
        })
    }
}

fn map_path_error(error: PathError) -> RouterError {
    match error {
        PathError::UnknownRoute { name } => RouterError::RouteNotFound { name },
        PathError::MissingParam { name, param } => RouterError::InvalidRoute {
            name,
            reason: format!("missing param '{}'", param),
        },
        PathError::InvalidTemplate { template, reason } => RouterError::InvalidRoute {
            name: template,
            reason,
        },
    }
}

fn find_def_mut<'a>(defs: &'a mut Vec<TreeDef>, fqn: &str) -> Option<&'a mut TreeDef> {
    let (head, rest) = match fqn.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (fqn, None),
    };
    let def = defs.iter_mut().find(|d| d.name == head)?;
    match rest {
        Some(rest) => find_def_mut(&mut def.children, rest),
        None => Some(def),
    }
}

fn find_def<'a>(defs: &'a [TreeDef], fqn: &str) -> Option<&'a TreeDef> {
    let (head, rest) = match fqn.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (fqn, None),
    };
    let def = defs.iter().find(|d| d.name == head)?;
    match rest {
        Some(rest) => find_def(&def.children, rest),
        None => Some(def),
    }
}

fn remove_def(defs: &mut Vec<TreeDef>, fqn: &str) -> bool {
    match fqn.split_once('.') {
        None => {
            let before = defs.len();
            defs.retain(|d| d.name != fqn);
            defs.len() != before
        }
        Some((head, rest)) => match defs.iter_mut().find(|d| d.name == head) {
            Some(def) => remove_def(&mut def.children, rest),
            None => false,
        },
    }
}

/// Walk a route subtree collecting `(fqn, behavior)` pairs and validating
/// child names along the way.
fn collect_behaviors(
    route: &Route,
    prefix: &str,
    out: &mut Vec<(String, Route)>,
) -> Result<(), RouterError> {
    let fqn = if prefix.is_empty() {
        route.name.clone()
    } else {
        format!("{}.{}", prefix, route.name)
    };
    out.push((fqn.clone(), route.clone()));
    for child in &route.children {
        validate_local_name(&child.name)?;
        validate_path(&child.name, &child.path)?;
        collect_behaviors(child, &fqn, out)?;
    }
    Ok(())
}

impl RouteStore {
    pub(crate) fn new(options: &RouterOptions) -> Self {
        let root_path = options.root_path.clone();
        let tree = RouteTree::compile(&[], &root_path).expect("empty tree always compiles");
        Self {
            defs: RwLock::new(Vec::new()),
            tree: RwLock::new(Arc::new(tree)),
            config: RwLock::new(RouteConfig::default()),
            match_options: options.to_match_options(),
            rewrite_path_on_match: options.rewrite_path_on_match,
            root_path,
            logger: options.logger.clone(),
        }
    }

    pub(crate) fn tree(&self) -> Arc<RouteTree> {
        self.tree.read().expect("route lock poisoned").clone()
    }

    pub(crate) fn has_route(&self, name: &str) -> bool {
        name == crate::state::UNKNOWN_ROUTE || self.tree().has(name)
    }

    pub(crate) fn route_count(&self) -> usize {
        self.tree().len()
    }

    pub(crate) fn definitions(&self) -> Vec<TreeDef> {
        self.defs.read().expect("route lock poisoned").clone()
    }

    /// Add routes, optionally under `parent`. Top-level entries may use a
    /// dotted name to attach to an existing route. Validation covers names,
    /// paths, duplicates, parent existence, forward targets, forward param
    /// compatibility, and forward cycles; nothing commits on failure.
    pub(crate) fn add_routes(
        &self,
        routes: Vec<Route>,
        parent: Option<&str>,
    ) -> Result<Vec<GuardHook>, RouterError> {
        if let Some(parent) = parent {
            if !self.has_route(parent) {
                return Err(RouterError::RouteNotFound {
                    name: parent.to_string(),
                });
            }
        }

        let mut candidate_defs = self.definitions();
        let mut behaviors: Vec<(String, Route)> = Vec::new();

        for route in routes {
            let (dotted_prefix, local) = match route.name.rsplit_once('.') {
                Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
                None => (None, route.name.clone()),
            };
            validate_local_name(&local)?;
            validate_path(&route.name, &route.path)?;

            let parent_fqn = match (parent, dotted_prefix.as_deref()) {
                (Some(p), Some(pre)) => Some(format!("{}.{}", p, pre)),
                (Some(p), None) => Some(p.to_string()),
                (None, Some(pre)) => Some(pre.to_string()),
                (None, None) => None,
            };
            if let Some(parent_fqn) = &parent_fqn {
                if find_def(&candidate_defs, parent_fqn).is_none() {
                    return Err(RouterError::RouteNotFound {
                        name: parent_fqn.clone(),
                    });
                }
            }

            let mut route = route;
            route.name = local;
            collect_behaviors(&route, parent_fqn.as_deref().unwrap_or(""), &mut behaviors)?;
            let def = route.to_tree_def();
            match &parent_fqn {
                Some(parent_fqn) => find_def_mut(&mut candidate_defs, parent_fqn)
                    .expect("parent presence checked above")
                    .children
                    .push(def),
                None => candidate_defs.push(def),
            }
        }

        // Compiling catches malformed templates and duplicate names.
        let candidate_tree =
            RouteTree::compile(&candidate_defs, &self.root_path).map_err(map_path_error)?;

        let mut config = self.config.read().expect("route lock poisoned").clone();
        for (fqn, route) in &behaviors {
            if let Some(forward) = &route.forward_to {
                match forward {
                    ForwardTo::Route(to) => config.forwards.set_static(fqn.clone(), to.clone()),
                    ForwardTo::Dynamic(f) => config.forwards.set_dynamic(fqn.clone(), f.clone()),
                }
            }
            if let Some(mapper) = &route.encode_params {
                config.encoders.insert(fqn.clone(), mapper.clone());
            }
            if let Some(mapper) = &route.decode_params {
                config.decoders.insert(fqn.clone(), mapper.clone());
            }
            if let Some(defaults) = &route.default_params {
                config.default_params.insert(fqn.clone(), defaults.clone());
            }
        }

        for (_, to) in config.forwards.static_entries() {
            if !candidate_tree.has(to) {
                return Err(RouterError::RouteNotFound {
                    name: to.to_string(),
                });
            }
        }
        config.forwards.rebuild_cache()?;
        let static_sources: Vec<String> = config
            .forwards
            .static_entries()
            .map(|(from, _)| from.to_string())
            .collect();
        for from in static_sources {
            if let Some(terminal) = config.forwards.static_terminal(&from) {
                check_param_compatibility(&candidate_tree, &from, terminal)?;
            }
        }

        *self.defs.write().expect("route lock poisoned") = candidate_defs;
        *self.tree.write().expect("route lock poisoned") = Arc::new(candidate_tree);
        *self.config.write().expect("route lock poisoned") = config;

        Ok(behaviors
            .into_iter()
            .filter(|(_, route)| route.can_activate.is_some() || route.can_deactivate.is_some())
            .map(|(name, route)| GuardHook {
                name,
                can_activate: route.can_activate,
                can_deactivate: route.can_deactivate,
            })
            .collect())
    }

    /// Remove a route subtree. Refused for the active route or one of its
    /// ancestors.
    pub(crate) fn remove_route(
        &self,
        name: &str,
        active: Option<&State>,
    ) -> Result<(), RouterError> {
        if let Some(active) = active {
            if active.name == name || active.name.starts_with(&format!("{}.", name)) {
                return Err(RouterError::InvalidRoute {
                    name: name.to_string(),
                    reason: "route is active or an ancestor of the active route".to_string(),
                });
            }
        }

        let removed: HashSet<String> = {
            let tree = self.tree();
            if !tree.has(name) {
                return Err(RouterError::RouteNotFound {
                    name: name.to_string(),
                });
            }
            let prefix = format!("{}.", name);
            tree.names()
                .into_iter()
                .filter(|n| *n == name || n.starts_with(&prefix))
                .map(|n| n.to_string())
                .collect()
        };

        let mut defs = self.definitions();
        remove_def(&mut defs, name);
        let new_tree = RouteTree::compile(&defs, &self.root_path).map_err(map_path_error)?;

        let mut config = self.config.read().expect("route lock poisoned").clone();
        config.encoders.retain(|key, _| !removed.contains(key));
        config.decoders.retain(|key, _| !removed.contains(key));
        config.default_params.retain(|key, _| !removed.contains(key));
        config.forwards.remove_routes(&removed);
        config.forwards.rebuild_cache()?;

        *self.defs.write().expect("route lock poisoned") = defs;
        *self.tree.write().expect("route lock poisoned") = Arc::new(new_tree);
        *self.config.write().expect("route lock poisoned") = config;
        Ok(())
    }

    pub(crate) fn clear(&self) {
        let tree = RouteTree::compile(&[], &self.root_path).expect("empty tree always compiles");
        *self.defs.write().expect("route lock poisoned") = Vec::new();
        *self.tree.write().expect("route lock poisoned") = Arc::new(tree);
        *self.config.write().expect("route lock poisoned") = RouteConfig::default();
    }

    /// Apply a partial update; returns the guard changes for the facade.
    pub(crate) fn update_route(
        &self,
        name: &str,
        update: RouteUpdate,
    ) -> Result<(Update<GuardSpec>, Update<GuardSpec>), RouterError> {
        let tree = self.tree();
        if !tree.has(name) {
            return Err(RouterError::RouteNotFound {
                name: name.to_string(),
            });
        }

        let mut config = self.config.read().expect("route lock poisoned").clone();
        match update.forward_to {
            Update::Keep => {}
            Update::Clear => config.forwards.clear_from(name),
            Update::Set(ForwardTo::Route(to)) => {
                if !tree.has(&to) {
                    return Err(RouterError::RouteNotFound { name: to });
                }
                config.forwards.set_static(name.to_string(), to);
            }
            Update::Set(ForwardTo::Dynamic(f)) => {
                config.forwards.set_dynamic(name.to_string(), f);
            }
        }
        config.forwards.rebuild_cache()?;
        if let Some(terminal) = config.forwards.static_terminal(name) {
            check_param_compatibility(&tree, name, terminal)?;
        }

        match update.default_params {
            Update::Keep => {}
            Update::Clear => {
                config.default_params.remove(name);
            }
            Update::Set(params) => {
                config.default_params.insert(name.to_string(), params);
            }
        }
        match update.encode_params {
            Update::Keep => {}
            Update::Clear => {
                config.encoders.remove(name);
            }
            Update::Set(mapper) => {
                config.encoders.insert(name.to_string(), mapper);
            }
        }
        match update.decode_params {
            Update::Keep => {}
            Update::Clear => {
                config.decoders.remove(name);
            }
            Update::Set(mapper) => {
                config.decoders.insert(name.to_string(), mapper);
            }
        }

        *self.config.write().expect("route lock poisoned") = config;
        Ok((update.can_activate, update.can_deactivate))
    }

    /// Build a path: defaults, then the route's encoder, then the path
    /// layer.
    pub(crate) fn build_path(&self, name: &str, params: Params) -> Result<String, RouterError> {
        let tree = self.tree();
        if !tree.has(name) {
            return Err(RouterError::RouteNotFound {
                name: name.to_string(),
            });
        }
        let merged = {
            let config = self.config.read().expect("route lock poisoned");
            let mut merged = config.default_params.get(name).cloned().unwrap_or_default();
            for (key, value) in params {
                merged.insert(key, value);
            }
            match config.encoders.get(name) {
                Some(encode) => encode(merged),
                None => merged,
            }
        };
        build_route_path(&tree, name, &merged, &self.match_options).map_err(map_path_error)
    }

    /// Match a path: decode params, resolve forwards, optionally rewrite
    /// the URL for the terminal route.
    pub(crate) fn match_path(
        &self,
        path: &str,
        source: Option<&str>,
        deps: &Dependencies,
    ) -> Result<Option<MatchedPath>, RouterError> {
        let tree = self.tree();
        let Some(matched) = match_route(&tree, path, &self.match_options) else {
            return Ok(None);
        };

        let (resolved, params, redirected) = {
            let config = self.config.read().expect("route lock poisoned");
            let decoded = match config.decoders.get(&matched.name) {
                Some(decode) => decode(matched.params.clone()),
                None => matched.params.clone(),
            };
            let resolved = config.forwards.resolve(&matched.name, deps, &decoded)?;
            if resolved == matched.name {
                (resolved, decoded, false)
            } else {
                let mut params = config
                    .default_params
                    .get(&matched.name)
                    .cloned()
                    .unwrap_or_default();
                if let Some(defaults) = config.default_params.get(&resolved) {
                    for (key, value) in defaults {
                        params.insert(key.clone(), value.clone());
                    }
                }
                for (key, value) in decoded {
                    params.insert(key, value);
                }
                (resolved, params, true)
            }
        };

        if !redirected {
            return Ok(Some(MatchedPath {
                name: resolved,
                params,
                path: path.to_string(),
                segment_params: matched.segment_params,
                redirected,
                source: source.map(|s| s.to_string()),
            }));
        }

        let segment_params = self.segment_params(&resolved).unwrap_or_default();
        let final_path = if self.rewrite_path_on_match {
            self.build_path(&resolved, params.clone())
                .unwrap_or_else(|_| path.to_string())
        } else {
            path.to_string()
        };
        Ok(Some(MatchedPath {
            name: resolved,
            params,
            path: final_path,
            segment_params,
            redirected,
            source: source.map(|s| s.to_string()),
        }))
    }

    /// Resolve forwards for a named navigation: source defaults, target
    /// defaults, then the provided params, later entries winning.
    pub(crate) fn forward_state(
        &self,
        name: &str,
        params: Params,
        deps: &Dependencies,
    ) -> Result<(String, Params), RouterError> {
        let config = self.config.read().expect("route lock poisoned");
        let resolved = config.forwards.resolve(name, deps, &params)?;
        let mut merged = config.default_params.get(name).cloned().unwrap_or_default();
        if resolved != name {
            if let Some(defaults) = config.default_params.get(&resolved) {
                for (key, value) in defaults {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }
        for (key, value) in params {
            merged.insert(key, value);
        }
        Ok((resolved, merged))
    }

    /// Per-segment param kinds along the chain of `name`.
    pub(crate) fn segment_params(
        &self,
        name: &str,
    ) -> Option<Vec<(String, Vec<(String, ParamKind)>)>> {
        let tree = self.tree();
        let chain = tree.chain(name)?;
        Some(
            chain
                .iter()
                .map(|node| {
                    let mut kinds: Vec<(String, ParamKind)> = Vec::new();
                    for param in node.pattern().url_params() {
                        kinds.push((param.to_string(), ParamKind::Url));
                    }
                    if let Some(param) = node.pattern().splat_param() {
                        kinds.push((param.to_string(), ParamKind::Splat));
                    }
                    for param in node.pattern().query_params() {
                        kinds.push((param.to_string(), ParamKind::Query));
                    }
                    (node.name().to_string(), kinds)
                })
                .collect(),
        )
    }

    /// URL and splat params declared along the chain of `name`.
    fn url_params_of(&self, name: &str) -> Vec<String> {
        self.segment_params(name)
            .unwrap_or_default()
            .into_iter()
            .flat_map(|(_, kinds)| kinds)
            .filter(|(_, kind)| matches!(kind, ParamKind::Url | ParamKind::Splat))
            .map(|(param, _)| param)
            .collect()
    }

    /// Is `name` the active route (exact) or an ancestor of it?
    pub(crate) fn is_active_route(
        &self,
        name: &str,
        params: Option<&Params>,
        strict_equality: bool,
        ignore_query_params: bool,
        active: Option<Arc<State>>,
    ) -> bool {
        if name.is_empty() {
            self.logger
                .warn("is_active_route called with an empty name; the root is not a parent");
            return false;
        }
        let Some(active) = active else {
            return false;
        };

        if strict_equality || active.name == name {
            if active.name != name {
                return false;
            }
            let provided = params.cloned().unwrap_or_default();
            if ignore_query_params {
                self.url_params_of(name)
                    .iter()
                    .all(|param| active.params.get(param) == provided.get(param))
            } else {
                active.params == provided
            }
        } else {
            let prefix = format!("{}.", name);
            if !active.name.starts_with(&prefix) {
                return false;
            }
            let config = self.config.read().expect("route lock poisoned");
            let mut expected = config.default_params.get(name).cloned().unwrap_or_default();
            if let Some(provided) = params {
                for (key, value) in provided {
                    expected.insert(key.clone(), value.clone());
                }
            }
            expected
                .iter()
                .all(|(key, value)| active.params.get(key) == Some(value))
        }
    }

    /// Everything a fork needs: sanitized definitions plus the config.
    /// Encoders, decoders and forward callbacks are shared by `Arc`;
    /// default params are value types and deep-copy with `clone`.
    pub(crate) fn clone_parts(&self) -> (Vec<TreeDef>, RouteConfig) {
        (
            self.definitions(),
            self.config.read().expect("route lock poisoned").clone(),
        )
    }

    /// Install cloned parts into a fresh store (fork only).
    pub(crate) fn restore(
        &self,
        defs: Vec<TreeDef>,
        mut config: RouteConfig,
    ) -> Result<(), RouterError> {
        let tree = RouteTree::compile(&defs, &self.root_path).map_err(map_path_error)?;
        config.forwards.rebuild_cache()?;
        *self.defs.write().expect("route lock poisoned") = defs;
        *self.tree.write().expect("route lock poisoned") = Arc::new(tree);
        *self.config.write().expect("route lock poisoned") = config;
        Ok(())
    }
}
