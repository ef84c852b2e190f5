//! Before/after lifecycle handlers scoped to exact request paths.
//!
//! An entry with no paths is global. Otherwise it runs only when the
//! normalized request path is one of its paths. This is set membership, not
//! pattern matching: `/users/{id}` in a path set only matches the literal
//! string `/users/{id}`.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::Context;
use crate::error::JoltResult;
use crate::router::normalize_path;

/// Boxed future returned by lifecycle handlers.
pub type LifecycleFuture = Pin<Box<dyn Future<Output = JoltResult<()>> + Send>>;

/// A callback run before or after the route handler.
///
/// Implemented for any `Fn(Context) -> impl Future<Output = JoltResult<()>>`.
pub trait LifecycleHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> LifecycleFuture;
}

impl<T, F> LifecycleHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = JoltResult<()>> + Send + 'static,
{
    fn call(&self, ctx: Context) -> LifecycleFuture {
        Box::pin((self)(ctx))
    }
}

/// A registered handler plus the paths it applies to.
#[derive(Clone)]
pub struct LifecycleEntry {
    paths: HashSet<String>,
    handler: Arc<dyn LifecycleHandler>,
}

impl LifecycleEntry {
    /// A handler bound to the given exact paths. An empty path list makes it
    /// global. Paths are normalized the same way routes are.
    pub fn new<I, S, F, Fut>(paths: I, handler: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JoltResult<()>> + Send + 'static,
    {
        Self {
            paths: paths.into_iter().map(|p| normalize_path(p.as_ref())).collect(),
            handler: Arc::new(handler),
        }
    }

    /// `true` when the entry runs for every request.
    pub fn is_global(&self) -> bool {
        self.paths.is_empty()
    }

    /// `true` when the entry runs for the normalized `path`.
    pub fn applies_to(&self, path: &str) -> bool {
        self.is_global() || self.paths.contains(path)
    }
}

impl std::fmt::Debug for LifecycleEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleEntry")
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

/// Before and after handler lists, in registration order.
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    before: Vec<LifecycleEntry>,
    after: Vec<LifecycleEntry>,
}

impl Lifecycle {
    /// Empty registries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a before-handler.
    pub fn add_before(&mut self, entry: LifecycleEntry) {
        self.before.push(entry);
    }

    /// Appends an after-handler.
    pub fn add_after(&mut self, entry: LifecycleEntry) {
        self.after.push(entry);
    }

    /// Number of registered before-handlers.
    pub fn before_len(&self) -> usize {
        self.before.len()
    }

    /// Number of registered after-handlers.
    pub fn after_len(&self) -> usize {
        self.after.len()
    }

    /// Runs matching before-handlers in order; the first error aborts the rest.
    pub async fn run_before(&self, ctx: &Context) -> JoltResult<()> {
        let path = ctx.request().path();
        for entry in self.before.iter().filter(|e| e.applies_to(path)) {
            debug!(path, "before handler");
            entry.handler.call(ctx.clone()).await?;
        }
        Ok(())
    }

    /// Runs every matching after-handler once.
    ///
    /// The response is committed by now, so failures are logged and the
    /// remaining handlers still run.
    pub async fn run_after(&self, ctx: &Context) {
        let path = ctx.request().path();
        for entry in self.after.iter().filter(|e| e.applies_to(path)) {
            if let Err(e) = entry.handler.call(ctx.clone()).await {
                warn!(path, error = %e, "after handler failed");
            }
        }
    }
}
