//! The transition pipeline: path computation, guard phases, middleware.
//!
//! A transition between two states is computed purely from their names:
//! the shared ancestor stays put, everything below it on the `from` side
//! deactivates (deepest first), everything below it on the `to` side
//! activates (shallowest first). The async pipeline runs deactivate
//! guards, activate guards, then middleware, observing the cancellation
//! token between every suspension point. Commit and event emission belong
//! to the facade.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::RouterError;
use crate::guards::{GuardCheck, GuardPhase, GuardRegistry};
use crate::middleware::{MiddlewareCheck, MiddlewarePipeline, MiddlewareStep};
use crate::state::{segment_names, State};

/// The three segment sets of one transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPath {
    /// Fully-qualified name of the deepest shared segment; empty at the
    /// root.
    pub intersection: String,
    /// Deepest first.
    pub to_deactivate: Vec<String>,
    /// Shallowest first.
    pub to_activate: Vec<String>,
}

/// Compare the two states' segment chains and split them at the deepest
/// common prefix. A reload navigation deactivates and re-activates the
/// full chains so every guard runs again.
pub fn transition_path(to: &State, from: Option<&State>) -> TransitionPath {
    let to_segments = segment_names(&to.name);
    let from_segments = from.map(|f| segment_names(&f.name)).unwrap_or_default();

    let reload = to
        .meta
        .as_ref()
        .map(|meta| meta.options.reload)
        .unwrap_or(false);

    let mut common = 0;
    while !reload
        && common < to_segments.len()
        && common < from_segments.len()
        && to_segments[common] == from_segments[common]
    {
        common += 1;
    }

    let intersection = if common == 0 {
        String::new()
    } else {
        to_segments[common - 1].clone()
    };
    let mut to_deactivate: Vec<String> = from_segments[common..].to_vec();
    to_deactivate.reverse();
    let to_activate = to_segments[common..].to_vec();

    TransitionPath {
        intersection,
        to_deactivate,
        to_activate,
    }
}

/// Should the view node `node_name` re-render for this transition?
///
/// True for a reload, for the root on initial navigation, for the
/// intersection node, and for every activated or deactivated segment.
pub fn should_update_node(node_name: &str, to: &State, from: Option<&State>) -> bool {
    let reload = to
        .meta
        .as_ref()
        .map(|meta| meta.options.reload)
        .unwrap_or(false);
    if reload {
        return true;
    }
    if node_name.is_empty() && from.is_none() {
        return true;
    }
    let path = transition_path(to, from);
    node_name == path.intersection
        || path.to_activate.iter().any(|name| name == node_name)
        || path.to_deactivate.iter().any(|name| name == node_name)
}

pub(crate) struct TransitionContext<'a> {
    pub guards: &'a GuardRegistry,
    pub middleware: &'a MiddlewarePipeline,
    pub token: &'a CancellationToken,
}

/// Run the guard phases and the middleware pipeline for one transition.
///
/// Returns the final target state — the input `to`, unless a middleware
/// substituted it. Substitution keeps the original deactivate/activate
/// path; only the committed state changes. The caller commits and emits.
pub(crate) async fn run_pipeline(
    ctx: TransitionContext<'_>,
    to: Arc<State>,
    from: Option<Arc<State>>,
) -> Result<Arc<State>, RouterError> {
    let path = transition_path(&to, from.as_deref());

    for segment in &path.to_deactivate {
        run_guard(&ctx, GuardPhase::Deactivate, segment, &to, from.as_deref()).await?;
    }
    for segment in &path.to_activate {
        run_guard(&ctx, GuardPhase::Activate, segment, &to, from.as_deref()).await?;
    }

    let mut current = to;
    for middleware in ctx.middleware.functions() {
        if ctx.token.is_cancelled() {
            return Err(RouterError::TransitionCancelled);
        }
        let step = match middleware(&current, from.as_deref()) {
            MiddlewareCheck::Continue => MiddlewareStep::Continue,
            MiddlewareCheck::Halt => MiddlewareStep::Halt,
            MiddlewareCheck::Redirect(state) => MiddlewareStep::Redirect(state),
            MiddlewareCheck::Defer(future) => {
                let step = future.await;
                if ctx.token.is_cancelled() {
                    return Err(RouterError::TransitionCancelled);
                }
                step
            }
        };
        match step {
            MiddlewareStep::Continue => {}
            MiddlewareStep::Halt => {
                return Err(RouterError::TransitionErr {
                    message: "middleware blocked the transition".to_string(),
                });
            }
            MiddlewareStep::Redirect(state) => {
                current = Arc::new(state);
            }
        }
    }

    if ctx.token.is_cancelled() {
        return Err(RouterError::TransitionCancelled);
    }
    Ok(current)
}

async fn run_guard(
    ctx: &TransitionContext<'_>,
    phase: GuardPhase,
    segment: &str,
    to: &Arc<State>,
    from: Option<&State>,
) -> Result<(), RouterError> {
    if ctx.token.is_cancelled() {
        return Err(RouterError::TransitionCancelled);
    }
    let Some(guard) = ctx.guards.guard_fn(phase, segment) else {
        return Ok(());
    };
    let allowed = match guard(to, from) {
        GuardCheck::Allow => true,
        GuardCheck::Deny => false,
        GuardCheck::Defer(future) => {
            let allowed = future.await;
            if ctx.token.is_cancelled() {
                return Err(RouterError::TransitionCancelled);
            }
            allowed
        }
    };
    if allowed {
        Ok(())
    } else {
        Err(match phase {
            GuardPhase::Activate => RouterError::CannotActivate {
                segment: segment.to_string(),
            },
            GuardPhase::Deactivate => RouterError::CannotDeactivate {
                segment: segment.to_string(),
            },
        })
    }
}

/// Synchronous dry run over the guards of a prospective transition.
///
/// Deferred (async) guards are conservatively assumed to allow.
pub(crate) fn dry_run_guards(
    guards: &GuardRegistry,
    to: &State,
    from: Option<&State>,
) -> bool {
    let path = transition_path(to, from);
    let check = |phase: GuardPhase, segment: &str| -> bool {
        match guards.guard_fn(phase, segment) {
            Some(guard) => !matches!(guard(to, from), GuardCheck::Deny),
            None => true,
        }
    };
    path.to_deactivate
        .iter()
        .all(|segment| check(GuardPhase::Deactivate, segment))
        && path
            .to_activate
            .iter()
            .all(|segment| check(GuardPhase::Activate, segment))
}
