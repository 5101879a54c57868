//! Router states and the current/previous state store.
//!
//! A [`State`] is immutable once created and always shared as
//! `Arc<State>`, which is what makes every delivered state safely
//! read-only — there is no freezing step because there is nothing to
//! mutate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;

use roam_paths::{ParamKind, Params};

/// Reserved route name used for not-found states.
pub const UNKNOWN_ROUTE: &str = "@@router/UNKNOWN_ROUTE";

/// Options attached to a navigation.
///
/// `reload` re-runs guards and node updates even when nothing changed;
/// `force` only bypasses the same-state short-circuit; `replace` is a hint
/// carried through to listeners; `redirected` marks a state produced by a
/// forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NavigationOptions {
    pub replace: bool,
    pub reload: bool,
    pub force: bool,
    pub redirected: bool,
}

/// Per-segment param kinds plus the navigation context of a state.
#[derive(Debug, Clone, Default)]
pub struct StateMeta {
    /// Mirrors the owning state's id.
    pub id: u64,
    /// `(segment name, [(param name, kind)])` from root to the matched
    /// node.
    pub params: Vec<(String, Vec<(String, ParamKind)>)>,
    pub options: NavigationOptions,
    pub redirected: bool,
    /// Where the state came from (e.g. a plugin's popstate handler).
    pub source: Option<String>,
}

/// One router state: a matched (or built) route plus its params and path.
#[derive(Debug, Clone)]
pub struct State {
    /// Monotonic within a router instance.
    pub id: u64,
    pub name: String,
    pub params: Params,
    pub path: String,
    pub meta: Option<StateMeta>,
}

impl State {
    /// The dot-joined name split into fully-qualified segment names:
    /// `"a.b.c"` becomes `["a", "a.b", "a.b.c"]`.
    pub fn segment_names(&self) -> Vec<String> {
        segment_names(&self.name)
    }

    /// URL and splat param names of this state, read from its meta.
    fn url_param_names(&self) -> Vec<&str> {
        match &self.meta {
            Some(meta) => meta
                .params
                .iter()
                .flat_map(|(_, kinds)| kinds.iter())
                .filter(|(_, kind)| matches!(kind, ParamKind::Url | ParamKind::Splat))
                .map(|(name, _)| name.as_str())
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Split a dot-joined name into fully-qualified prefixes.
pub(crate) fn segment_names(name: &str) -> Vec<String> {
    if name.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut acc = String::new();
    for part in name.split('.') {
        if !acc.is_empty() {
            acc.push('.');
        }
        acc.push_str(part);
        out.push(acc.clone());
    }
    out
}

/// Compare two states.
///
/// With `ignore_query_params` the comparison covers only the URL and splat
/// params of the route (read from state meta); otherwise every param must
/// be deeply equal (arrays by position). Names must always match.
pub fn states_equal(a: &State, b: &State, ignore_query_params: bool) -> bool {
    if a.name != b.name {
        return false;
    }
    if ignore_query_params {
        let mut names = a.url_param_names();
        names.extend(b.url_param_names());
        names.sort_unstable();
        names.dedup();
        names
            .into_iter()
            .all(|name| value_at(a, name) == value_at(b, name))
    } else {
        a.params == b.params
    }
}

fn value_at<'a>(state: &'a State, name: &str) -> Option<&'a Value> {
    state.params.get(name)
}

/// Holds the current and previous state plus the id counter.
pub struct StateStore {
    current: RwLock<Option<Arc<State>>>,
    previous: RwLock<Option<Arc<State>>>,
    counter: AtomicU64,
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
            previous: RwLock::new(None),
            counter: AtomicU64::new(1),
        }
    }

    /// Build a state, assigning the next id unless `force_id` pins one
    /// (used when re-emitting an existing state unchanged).
    pub fn make_state(
        &self,
        name: impl Into<String>,
        params: Params,
        path: impl Into<String>,
        meta: Option<StateMeta>,
        force_id: Option<u64>,
    ) -> Arc<State> {
        let id = force_id.unwrap_or_else(|| self.counter.fetch_add(1, Ordering::Relaxed));
        let meta = meta.map(|mut meta| {
            meta.id = id;
            meta
        });
        Arc::new(State {
            id,
            name: name.into(),
            params,
            path: path.into(),
            meta,
        })
    }

    /// The not-found sentinel state for an unmatched path.
    pub fn make_not_found_state(
        &self,
        path: &str,
        options: NavigationOptions,
    ) -> Arc<State> {
        let mut params = Params::new();
        params.insert("path".to_string(), Value::String(path.to_string()));
        self.make_state(
            UNKNOWN_ROUTE,
            params,
            path,
            Some(StateMeta {
                options,
                ..StateMeta::default()
            }),
            None,
        )
    }

    pub fn set_state(&self, state: Arc<State>) {
        let mut current = self.current.write().expect("state lock poisoned");
        let mut previous = self.previous.write().expect("state lock poisoned");
        *previous = current.take();
        *current = Some(state);
    }

    pub fn current(&self) -> Option<Arc<State>> {
        self.current.read().expect("state lock poisoned").clone()
    }

    pub fn previous(&self) -> Option<Arc<State>> {
        self.previous.read().expect("state lock poisoned").clone()
    }

    pub fn reset(&self) {
        *self.current.write().expect("state lock poisoned") = None;
        *self.previous.write().expect("state lock poisoned") = None;
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> Params {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn state_with_meta(name: &str, p: Params, url_params: &[&str]) -> State {
        let kinds = url_params
            .iter()
            .map(|n| (n.to_string(), ParamKind::Url))
            .collect();
        State {
            id: 1,
            name: name.to_string(),
            params: p,
            path: String::new(),
            meta: Some(StateMeta {
                id: 1,
                params: vec![(name.to_string(), kinds)],
                options: NavigationOptions::default(),
                redirected: false,
                source: None,
            }),
        }
    }

    #[test]
    fn segment_names_expand_prefixes() {
        assert_eq!(
            segment_names("a.b.c"),
            vec!["a".to_string(), "a.b".to_string(), "a.b.c".to_string()]
        );
        assert!(segment_names("").is_empty());
    }

    #[test]
    fn ids_are_monotonic() {
        let store = StateStore::new();
        let a = store.make_state("a", Params::new(), "/a", None, None);
        let b = store.make_state("b", Params::new(), "/b", None, None);
        assert!(b.id > a.id);
    }

    #[test]
    fn force_id_pins_the_id() {
        let store = StateStore::new();
        let a = store.make_state("a", Params::new(), "/a", None, Some(7));
        assert_eq!(a.id, 7);
    }

    #[test]
    fn set_state_rotates_previous() {
        let store = StateStore::new();
        let a = store.make_state("a", Params::new(), "/a", None, None);
        let b = store.make_state("b", Params::new(), "/b", None, None);
        store.set_state(a.clone());
        store.set_state(b.clone());
        assert_eq!(store.current().unwrap().name, "b");
        assert_eq!(store.previous().unwrap().name, "a");
        store.reset();
        assert!(store.current().is_none());
        assert!(store.previous().is_none());
    }

    #[test]
    fn not_found_state_carries_the_path() {
        let store = StateStore::new();
        let state = store.make_not_found_state("/missing", NavigationOptions::default());
        assert_eq!(state.name, UNKNOWN_ROUTE);
        assert_eq!(state.params["path"], json!("/missing"));
        assert_eq!(state.path, "/missing");
    }

    #[test]
    fn states_equal_is_name_sensitive() {
        let a = state_with_meta("a", Params::new(), &[]);
        let b = state_with_meta("b", Params::new(), &[]);
        assert!(!states_equal(&a, &b, true));
        assert!(states_equal(&a, &a, true));
    }

    #[test]
    fn full_comparison_sees_every_param() {
        let a = state_with_meta("a", params(&[("id", json!("1")), ("tab", json!("x"))]), &["id"]);
        let b = state_with_meta("a", params(&[("id", json!("1")), ("tab", json!("y"))]), &["id"]);
        assert!(!states_equal(&a, &b, false));
        assert!(states_equal(&a, &b, true));
    }

    #[test]
    fn array_params_compare_by_position() {
        let a = state_with_meta("a", params(&[("xs", json!(["1", "2"]))]), &[]);
        let b = state_with_meta("a", params(&[("xs", json!(["2", "1"]))]), &[]);
        assert!(!states_equal(&a, &b, false));
    }

    #[test]
    fn url_param_comparison_covers_both_sides() {
        // b declares `id` as a URL param even though a's meta is empty.
        let a = state_with_meta("a", Params::new(), &[]);
        let b = state_with_meta("a", params(&[("id", json!("1"))]), &["id"]);
        assert!(!states_equal(&a, &b, true));
    }

    #[test]
    fn meta_id_mirrors_state_id() {
        let store = StateStore::new();
        let state = store.make_state(
            "a",
            Params::new(),
            "/a",
            Some(StateMeta::default()),
            None,
        );
        assert_eq!(state.meta.as_ref().unwrap().id, state.id);
    }
}
