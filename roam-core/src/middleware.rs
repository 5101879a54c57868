//! The router-wide middleware pipeline.
//!
//! Middleware run after every guard has allowed a transition, in
//! registration order, each seeing the current in-flight target state. A
//! middleware may halt the transition or substitute a new target for the
//! middleware that follow it and for the final commit — substitution never
//! re-runs the guard phases for the new path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use futures_core::future::BoxFuture;

use crate::dependencies::Dependencies;
use crate::error::RouterError;
use crate::logging::RouterLogger;
use crate::state::State;

/// Outcome of an asynchronous middleware step.
pub enum MiddlewareStep {
    Continue,
    /// Block the transition (`transition_err`).
    Halt,
    /// Replace the in-flight target state.
    Redirect(State),
}

/// A middleware's immediate answer.
pub enum MiddlewareCheck {
    Continue,
    Halt,
    Redirect(State),
    Defer(BoxFuture<'static, MiddlewareStep>),
}

/// An instantiated middleware: `(to_state, from_state) -> answer`.
pub type MiddlewareFn = Arc<dyn Fn(&State, Option<&State>) -> MiddlewareCheck + Send + Sync>;

/// A middleware factory, invoked once when its batch is committed.
pub type MiddlewareFactory = Arc<dyn Fn(&Dependencies) -> MiddlewareFn + Send + Sync>;

struct Entry {
    batch: u64,
    factory: MiddlewareFactory,
    func: MiddlewareFn,
}

struct PipelineInner {
    entries: Mutex<Vec<Entry>>,
    next_batch: AtomicU64,
    max_middleware: usize,
    #[allow(dead_code)]
    logger: RouterLogger,
}

/// Insertion-ordered middleware with batch-wise removal.
pub struct MiddlewarePipeline {
    inner: Arc<PipelineInner>,
}

/// Removes exactly the batch that created it; idempotent.
#[derive(Debug)]
pub struct MiddlewareHandle {
    pipeline: Weak<PipelineInner>,
    batch: u64,
}

impl MiddlewareHandle {
    pub fn unsubscribe(&self) {
        if let Some(pipeline) = self.pipeline.upgrade() {
            let mut entries = pipeline.entries.lock().expect("middleware lock poisoned");
            entries.retain(|entry| entry.batch != self.batch);
        }
    }
}

impl MiddlewarePipeline {
    pub fn new(max_middleware: usize, logger: RouterLogger) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                entries: Mutex::new(Vec::new()),
                next_batch: AtomicU64::new(1),
                max_middleware,
                logger,
            }),
        }
    }

    /// Register a batch of middleware factories.
    ///
    /// The whole batch is validated (duplicates by factory identity, the
    /// `middleware_limit` cap), instantiated, and only then committed;
    /// a failing batch leaves the pipeline untouched.
    pub fn use_middleware(
        &self,
        factories: Vec<MiddlewareFactory>,
        deps: &Dependencies,
    ) -> Result<MiddlewareHandle, RouterError> {
        let batch = self.inner.next_batch.fetch_add(1, Ordering::Relaxed);

        {
            let entries = self.inner.entries.lock().expect("middleware lock poisoned");
            for (i, factory) in factories.iter().enumerate() {
                let dup_existing = entries
                    .iter()
                    .any(|entry| Arc::ptr_eq(&entry.factory, factory));
                let dup_in_batch = factories[..i]
                    .iter()
                    .any(|earlier| Arc::ptr_eq(earlier, factory));
                if dup_existing || dup_in_batch {
                    return Err(RouterError::DuplicateMiddleware);
                }
            }
            if entries.len() + factories.len() > self.inner.max_middleware {
                return Err(RouterError::MiddlewareLimit);
            }
        }

        // Factories run outside the lock; they may consult the container.
        let instantiated: Vec<(MiddlewareFactory, MiddlewareFn)> = factories
            .into_iter()
            .map(|factory| {
                let func = factory(deps);
                (factory, func)
            })
            .collect();

        let mut entries = self.inner.entries.lock().expect("middleware lock poisoned");
        if entries.len() + instantiated.len() > self.inner.max_middleware {
            return Err(RouterError::MiddlewareLimit);
        }
        for (factory, func) in instantiated {
            entries.push(Entry {
                batch,
                factory,
                func,
            });
        }
        Ok(MiddlewareHandle {
            pipeline: Arc::downgrade(&self.inner),
            batch,
        })
    }

    /// Snapshot of the live middleware functions, in order.
    pub(crate) fn functions(&self) -> Vec<MiddlewareFn> {
        self.inner
            .entries
            .lock()
            .expect("middleware lock poisoned")
            .iter()
            .map(|entry| entry.func.clone())
            .collect()
    }

    /// Factories in order, for [`Router::fork`](crate::Router::fork).
    pub(crate) fn factories(&self) -> Vec<MiddlewareFactory> {
        self.inner
            .entries
            .lock()
            .expect("middleware lock poisoned")
            .iter()
            .map(|entry| entry.factory.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.inner
            .entries
            .lock()
            .expect("middleware lock poisoned")
            .len()
    }

    pub fn clear(&self) {
        self.inner
            .entries
            .lock()
            .expect("middleware lock poisoned")
            .clear();
    }
}

/// Wrap a plain function as a dependency-blind middleware factory.
pub fn middleware_fn<F>(f: F) -> MiddlewareFactory
where
    F: Fn(&State, Option<&State>) -> MiddlewareCheck + Send + Sync + 'static,
{
    let func: MiddlewareFn = Arc::new(f);
    Arc::new(move |_| func.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::Limits;

    fn deps() -> Dependencies {
        Dependencies::new(Limits::default().max_dependencies, RouterLogger::default())
    }

    fn pipeline() -> MiddlewarePipeline {
        MiddlewarePipeline::new(Limits::default().max_middleware, RouterLogger::default())
    }

    fn pass() -> MiddlewareFactory {
        middleware_fn(|_, _| MiddlewareCheck::Continue)
    }

    #[test]
    fn batches_commit_in_order() {
        let pipeline = pipeline();
        pipeline.use_middleware(vec![pass(), pass()], &deps()).unwrap();
        pipeline.use_middleware(vec![pass()], &deps()).unwrap();
        assert_eq!(pipeline.count(), 3);
        assert_eq!(pipeline.functions().len(), 3);
    }

    #[test]
    fn duplicate_factory_rejected() {
        let pipeline = pipeline();
        let shared = pass();
        pipeline.use_middleware(vec![shared.clone()], &deps()).unwrap();
        let err = pipeline.use_middleware(vec![shared], &deps()).unwrap_err();
        assert_eq!(err.code(), "duplicate_middleware");
        assert_eq!(pipeline.count(), 1);
    }

    #[test]
    fn duplicate_within_batch_rejected() {
        let pipeline = pipeline();
        let shared = pass();
        let err = pipeline
            .use_middleware(vec![shared.clone(), shared], &deps())
            .unwrap_err();
        assert_eq!(err.code(), "duplicate_middleware");
        assert_eq!(pipeline.count(), 0);
    }

    #[test]
    fn limit_fails_the_whole_batch() {
        let pipeline = MiddlewarePipeline::new(2, RouterLogger::default());
        pipeline.use_middleware(vec![pass()], &deps()).unwrap();
        let err = pipeline
            .use_middleware(vec![pass(), pass()], &deps())
            .unwrap_err();
        assert_eq!(err.code(), "middleware_limit");
        assert_eq!(pipeline.count(), 1);
    }

    #[test]
    fn unsubscribe_removes_only_its_batch() {
        let pipeline = pipeline();
        let first = pipeline.use_middleware(vec![pass(), pass()], &deps()).unwrap();
        pipeline.use_middleware(vec![pass()], &deps()).unwrap();
        first.unsubscribe();
        assert_eq!(pipeline.count(), 1);
        // Idempotent.
        first.unsubscribe();
        assert_eq!(pipeline.count(), 1);
    }

    #[test]
    fn factory_receives_dependencies() {
        let pipeline = pipeline();
        let deps = deps();
        deps.set_value("blocked", true).unwrap();
        let factory: MiddlewareFactory = Arc::new(|deps: &Dependencies| {
            let blocked = *deps.get_as::<bool>("blocked").unwrap();
            Arc::new(move |_: &State, _: Option<&State>| {
                if blocked {
                    MiddlewareCheck::Halt
                } else {
                    MiddlewareCheck::Continue
                }
            })
        });
        pipeline.use_middleware(vec![factory], &deps).unwrap();
        let func = &pipeline.functions()[0];
        let state = State {
            id: 1,
            name: "a".into(),
            params: Default::default(),
            path: "/a".into(),
            meta: None,
        };
        assert!(matches!(func(&state, None), MiddlewareCheck::Halt));
    }
}
