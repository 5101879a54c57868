//! Forking: deep-copy a router's configuration into an independent,
//! unstarted instance.

use crate::dependencies::Dep;
use crate::error::RouterError;
use crate::guards::GuardSpec;
use crate::router::Router;

impl Router {
    /// Produce an independent, unstarted router with this router's routes,
    /// options, and guard/middleware/plugin factories.
    ///
    /// Dependencies are NOT carried over — the fork gets exactly the
    /// entries passed here. Factories are shared by `Arc` but re-run
    /// against the fork's own container, so the two routers share no
    /// mutable state: routes, listeners, guards, middleware, plugins and
    /// states all diverge freely after the fork.
    pub fn fork(&self, dependencies: Vec<(String, Dep)>) -> Result<Router, RouterError> {
        if self.inner.fsm.is_disposed() {
            return Err(RouterError::Disposed);
        }
        let fork = Router::with_dependencies(
            Vec::new(),
            self.inner.options.clone(),
            dependencies,
        )?;

        // Route tree and per-route config: definitions round-trip through
        // their sanitized form; default params deep-copy, codec and forward
        // callbacks are shared immutable Arcs. The forward cache is rebuilt
        // from scratch on restore.
        let (defs, config) = self.inner.routes.clone_parts();
        fork.inner.routes.restore(defs, config)?;

        // Guards: factories re-instantiate against the fork's container.
        let (activate, deactivate) = self.inner.guards.factories();
        for (name, factory) in activate {
            fork.inner
                .guards
                .add_activate(&name, GuardSpec::Factory(factory), &fork.inner.deps)?;
        }
        for (name, factory) in deactivate {
            fork.inner
                .guards
                .add_deactivate(&name, GuardSpec::Factory(factory), &fork.inner.deps)?;
        }

        let middleware = self.inner.middleware.factories();
        if !middleware.is_empty() {
            fork.inner
                .middleware
                .use_middleware(middleware, &fork.inner.deps)?;
        }

        let plugins = self.inner.plugins.factories();
        if !plugins.is_empty() {
            fork.inner
                .plugins
                .use_plugins(plugins, &fork.inner.deps, &fork.inner.bus, false)?;
        }

        Ok(fork)
    }
}
