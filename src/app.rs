//! Application assembly: the registration surface and the built [`App`].
//!
//! # Examples
//!
//! ```rust
//! use jolt::app::App;
//! use jolt::binding::{Args, Endpoint, Reply, ScalarKind};
//! use jolt::context::Context;
//! use jolt::error::JoltResult;
//!
//! async fn index(ctx: Context) -> JoltResult<()> {
//!     ctx.text("welcome")?;
//!     Ok(())
//! }
//!
//! async fn order(args: Args) -> JoltResult<Reply> {
//!     let id: i64 = args.get(0)?;
//!     Reply::json(&serde_json::json!({ "order": id }))
//! }
//!
//! # fn main() -> JoltResult<()> {
//! let mut builder = App::builder();
//! builder.get("/", Endpoint::from_fn(index))?;
//! builder.versioned_group("/api", 1, |api| {
//!     api.get("/orders/{id}", Endpoint::new(order).path("id", ScalarKind::Long))?;
//!     Ok(())
//! })?;
//! let app = builder.build();
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use crate::binding::Endpoint;
use crate::config::JoltConfig;
use crate::context::Context;
use crate::dispatcher::Dispatcher;
use crate::error::JoltResult;
use crate::exception::{DefaultExceptionHandler, ExceptionHandler};
use crate::filter::Filter;
use crate::http::{Method, Request, Response};
use crate::lifecycle::{Lifecycle, LifecycleEntry};
use crate::pipeline::RoutePipeline;
use crate::router::{RouterBuilder, Scope};
use crate::static_files::{ResourceResolver, StaticFiles};
use crate::template::{MiniJinjaTemplates, TemplateEngine};

/// Collects routes, handlers and collaborators before the application starts.
pub struct AppBuilder {
    router: RouterBuilder<Endpoint>,
    lifecycle: Lifecycle,
    filters: Vec<Arc<dyn Filter>>,
    resolver: Option<Arc<dyn ResourceResolver>>,
    templates: Option<Arc<dyn TemplateEngine>>,
    exception_handler: Arc<dyn ExceptionHandler>,
}

impl std::fmt::Debug for AppBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppBuilder")
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AppBuilder {
    /// An empty application with the default exception handler.
    pub fn new() -> Self {
        Self {
            router: RouterBuilder::new(),
            lifecycle: Lifecycle::new(),
            filters: Vec::new(),
            resolver: None,
            templates: None,
            exception_handler: Arc::new(DefaultExceptionHandler),
        }
    }

    /// A builder with static files and templates set up from `config`.
    pub fn from_config(config: &JoltConfig) -> Self {
        let mut builder = Self::new();
        if config.static_files.enabled {
            builder.static_files(
                StaticFiles::new(&config.static_files.directory).mount(&config.static_files.mount),
            );
        }
        if let Some(dir) = &config.templates.directory {
            builder.templates(MiniJinjaTemplates::new(dir));
        }
        builder
    }

    // ── Routes ───────────────────────────────────────────────────────────────

    /// Registers `endpoint` for `method` and `path`.
    ///
    /// # Errors
    ///
    /// [`JoltError::DuplicateRoute`](crate::error::JoltError::DuplicateRoute) if the
    /// normalized path is already taken for `method`.
    pub fn route(&mut self, method: Method, path: &str, endpoint: Endpoint) -> JoltResult<&mut Self> {
        self.router.route(method, path, endpoint)?;
        Ok(self)
    }

    /// Registers a `GET` route.
    pub fn get(&mut self, path: &str, endpoint: Endpoint) -> JoltResult<&mut Self> {
        self.route(Method::Get, path, endpoint)
    }

    /// Registers a `POST` route.
    pub fn post(&mut self, path: &str, endpoint: Endpoint) -> JoltResult<&mut Self> {
        self.route(Method::Post, path, endpoint)
    }

    /// Registers a `PUT` route.
    pub fn put(&mut self, path: &str, endpoint: Endpoint) -> JoltResult<&mut Self> {
        self.route(Method::Put, path, endpoint)
    }

    /// Registers a `DELETE` route.
    pub fn delete(&mut self, path: &str, endpoint: Endpoint) -> JoltResult<&mut Self> {
        self.route(Method::Delete, path, endpoint)
    }

    /// Registers a `PATCH` route.
    pub fn patch(&mut self, path: &str, endpoint: Endpoint) -> JoltResult<&mut Self> {
        self.route(Method::Patch, path, endpoint)
    }

    /// Registers the routes declared in `block` under `prefix`.
    pub fn group<F>(&mut self, prefix: &str, block: F) -> JoltResult<&mut Self>
    where
        F: FnOnce(&mut Scope<'_, Endpoint>) -> JoltResult<()>,
    {
        self.router.group(prefix, block)?;
        Ok(self)
    }

    /// Registers `block` under `prefix/v{version}`. Versioned groups do not nest.
    pub fn versioned_group<F>(&mut self, prefix: &str, version: u32, block: F) -> JoltResult<&mut Self>
    where
        F: FnOnce(&mut Scope<'_, Endpoint>) -> JoltResult<()>,
    {
        self.router.versioned_group(prefix, version, block)?;
        Ok(self)
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Runs `handler` before routing for the given exact paths, or for every
    /// request when `paths` is empty.
    pub fn before<I, S, F, Fut>(&mut self, paths: I, handler: F) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JoltResult<()>> + Send + 'static,
    {
        self.lifecycle.add_before(LifecycleEntry::new(paths, handler));
        self
    }

    /// Runs `handler` after the response is committed, once per request.
    pub fn after<I, S, F, Fut>(&mut self, paths: I, handler: F) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JoltResult<()>> + Send + 'static,
    {
        self.lifecycle.add_after(LifecycleEntry::new(paths, handler));
        self
    }

    // ── Collaborators ────────────────────────────────────────────────────────

    /// Appends a filter. Filters run in registration order, before any
    /// before-handler.
    pub fn filter(&mut self, filter: impl Filter) -> &mut Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Serves static assets for unrouted `GET` and `HEAD` requests.
    pub fn static_files(&mut self, resolver: impl ResourceResolver) -> &mut Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Installs the engine used to render [`Reply::Template`](crate::binding::Reply::Template).
    pub fn templates(&mut self, engine: impl TemplateEngine) -> &mut Self {
        self.templates = Some(Arc::new(engine));
        self
    }

    /// Replaces the [`DefaultExceptionHandler`].
    pub fn exception_handler(&mut self, handler: impl ExceptionHandler) -> &mut Self {
        self.exception_handler = Arc::new(handler);
        self
    }

    /// Freezes the configuration into a runnable [`App`].
    pub fn build(self) -> App {
        let routes = Arc::new(self.router.build());
        let lifecycle = Arc::new(self.lifecycle);
        info!(
            routes = routes.len(),
            filters = self.filters.len(),
            before = lifecycle.before_len(),
            after = lifecycle.after_len(),
            static_files = self.resolver.is_some(),
            templates = self.templates.is_some(),
            "application built"
        );
        let pipeline = RoutePipeline::standard(
            routes,
            self.filters,
            Arc::clone(&lifecycle),
            self.resolver,
            self.templates,
        );
        App {
            dispatcher: Arc::new(Dispatcher::new(pipeline, lifecycle, self.exception_handler)),
        }
    }
}

/// A built application. Cheap to clone; clones share the dispatcher.
#[derive(Debug, Clone)]
pub struct App {
    dispatcher: Arc<Dispatcher>,
}

impl App {
    /// Shorthand for [`AppBuilder::new`].
    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }

    /// Handles one request end to end.
    pub async fn dispatch(&self, request: Request, peer: Option<SocketAddr>) -> Response {
        self.dispatcher.dispatch(request, peer).await
    }

    /// The dispatcher behind this application.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}
