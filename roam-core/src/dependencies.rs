//! The named dependency container.
//!
//! Dependencies are opaque `Arc<dyn Any>` values keyed by name. The
//! container is handed to guard, middleware, plugin and forward callbacks
//! so they can reach application services without the router knowing their
//! types. Cloning the container is cheap and shares the same entries;
//! [`Router::fork`](crate::Router::fork) gets a fresh one instead.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::RouterError;
use crate::logging::RouterLogger;

/// One stored dependency value.
pub type Dep = Arc<dyn Any + Send + Sync>;

struct ContainerInner {
    entries: DashMap<String, Dep>,
    max_entries: usize,
    logger: RouterLogger,
}

#[derive(Clone)]
pub struct Dependencies {
    inner: Arc<ContainerInner>,
}

impl Dependencies {
    pub fn new(max_entries: usize, logger: RouterLogger) -> Self {
        Self {
            inner: Arc::new(ContainerInner {
                entries: DashMap::new(),
                max_entries,
                logger,
            }),
        }
    }

    /// Store a dependency under `name`.
    ///
    /// Overwriting an existing entry logs a warning unless the new value is
    /// the same `Arc` (a self-overwrite carries no information). Fails with
    /// `dependency_limit` once the container is full.
    pub fn set(&self, name: impl Into<String>, value: Dep) -> Result<(), RouterError> {
        let name = name.into();
        match self.inner.entries.get(&name) {
            Some(existing) => {
                if !Arc::ptr_eq(existing.value(), &value) {
                    self.inner
                        .logger
                        .warn(&format!("dependency '{}' overwritten", name));
                }
            }
            None => {
                if self.inner.entries.len() >= self.inner.max_entries {
                    return Err(RouterError::DependencyLimit);
                }
            }
        }
        self.inner.entries.insert(name, value);
        Ok(())
    }

    /// Convenience for [`set`](Self::set) wrapping the value in an `Arc`.
    pub fn set_value<T: Any + Send + Sync>(
        &self,
        name: impl Into<String>,
        value: T,
    ) -> Result<(), RouterError> {
        self.set(name, Arc::new(value))
    }

    /// Store several dependencies; stops at the first failure.
    pub fn set_many<I>(&self, entries: I) -> Result<(), RouterError>
    where
        I: IntoIterator<Item = (String, Dep)>,
    {
        for (name, value) in entries {
            self.set(name, value)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Dep, RouterError> {
        self.inner
            .entries
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RouterError::DependencyNotFound {
                name: name.to_string(),
            })
    }

    /// Retrieve and downcast; a type mismatch reads as absence.
    pub fn get_as<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, RouterError> {
        self.get(name)?
            .downcast::<T>()
            .map_err(|_| RouterError::DependencyNotFound {
                name: name.to_string(),
            })
    }

    /// A shallow copy of every entry.
    pub fn get_all(&self) -> HashMap<String, Dep> {
        self.inner
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.inner.entries.contains_key(name)
    }

    pub fn remove(&self, name: &str) -> bool {
        self.inner.entries.remove(name).is_some()
    }

    pub fn reset(&self) {
        self.inner.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}

impl std::fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependencies")
            .field("len", &self.len())
            .field("max_entries", &self.inner.max_entries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_logger() -> (RouterLogger, Arc<AtomicUsize>) {
        let warns = Arc::new(AtomicUsize::new(0));
        let w = warns.clone();
        let logger = RouterLogger::default().with_warn(Arc::new(move |_| {
            w.fetch_add(1, Ordering::SeqCst);
        }));
        (logger, warns)
    }

    #[test]
    fn set_and_get_round_trip() {
        let deps = Dependencies::new(16, RouterLogger::default());
        deps.set_value("answer", 42u32).unwrap();
        assert_eq!(*deps.get_as::<u32>("answer").unwrap(), 42);
        assert!(deps.has("answer"));
    }

    #[test]
    fn missing_dependency_errors() {
        let deps = Dependencies::new(16, RouterLogger::default());
        let err = deps.get("nope").unwrap_err();
        assert_eq!(err.code(), "dependency_not_found");
    }

    #[test]
    fn type_mismatch_reads_as_missing() {
        let deps = Dependencies::new(16, RouterLogger::default());
        deps.set_value("answer", 42u32).unwrap();
        assert!(deps.get_as::<String>("answer").is_err());
    }

    #[test]
    fn limit_is_enforced() {
        let deps = Dependencies::new(2, RouterLogger::default());
        deps.set_value("a", 1u8).unwrap();
        deps.set_value("b", 2u8).unwrap();
        let err = deps.set_value("c", 3u8).unwrap_err();
        assert_eq!(err.code(), "dependency_limit");
        // Overwriting within the limit is still allowed.
        deps.set_value("a", 9u8).unwrap();
    }

    #[test]
    fn overwrite_warns_once() {
        let (logger, warns) = counting_logger();
        let deps = Dependencies::new(16, logger);
        deps.set_value("svc", 1u8).unwrap();
        deps.set_value("svc", 2u8).unwrap();
        assert_eq!(warns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn identical_arc_overwrite_is_silent() {
        let (logger, warns) = counting_logger();
        let deps = Dependencies::new(16, logger);
        let value: Dep = Arc::new(1u8);
        deps.set("svc", value.clone()).unwrap();
        deps.set("svc", value).unwrap();
        assert_eq!(warns.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn remove_and_reset() {
        let deps = Dependencies::new(16, RouterLogger::default());
        deps.set_value("a", 1u8).unwrap();
        deps.set_value("b", 2u8).unwrap();
        assert!(deps.remove("a"));
        assert!(!deps.remove("a"));
        deps.reset();
        assert!(deps.is_empty());
    }

    #[test]
    fn get_all_is_a_shallow_copy() {
        let deps = Dependencies::new(16, RouterLogger::default());
        deps.set_value("a", 1u8).unwrap();
        let all = deps.get_all();
        assert_eq!(all.len(), 1);
        deps.set_value("b", 2u8).unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn clones_share_entries() {
        let deps = Dependencies::new(16, RouterLogger::default());
        let other = deps.clone();
        deps.set_value("a", 1u8).unwrap();
        assert!(other.has("a"));
    }
}
