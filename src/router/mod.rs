//! Request routing: map `(method, path)` pairs to handlers.
//!
//! Routes are registered through [`RouterBuilder`] at startup and frozen into
//! an immutable [`RouteTable`]. Three pattern styles are supported:
//!
//! | Pattern              | Example match            | Captured params              |
//! |----------------------|--------------------------|------------------------------|
//! | `/users/me`          | `/users/me`              | *(none)*                     |
//! | `/users/{id}`        | `/users/42`              | `id → "42"`                  |
//! | `/static/*`          | `/static/css/site.css`   | `wildcard → "/css/site.css"` |
//!
//! Resolution runs three passes over the method's routes: exact literals
//! first, then parameterized patterns in registration order, then wildcard
//! prefixes in registration order. The first hit of the earliest pass wins;
//! there is no specificity ranking within a pass.
//!
//! # Examples
//!
//! ```
//! use jolt::http::Method;
//! use jolt::router::RouterBuilder;
//!
//! let mut builder = RouterBuilder::new();
//! builder.get("/users/{id}", "by-id").unwrap();
//! builder.get("/users/me", "me").unwrap();
//! builder
//!     .versioned_group("/api", 1, |api| {
//!         api.post("/orders", "create-order")?;
//!         Ok(())
//!     })
//!     .unwrap();
//! let table = builder.build();
//!
//! let hit = table.find(&Method::Get, "/users/me").unwrap();
//! assert_eq!(*hit.route.handler(), "me");
//! assert!(table.find(&Method::Post, "/api/v1/orders").is_some());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::context::Parameters;
use crate::error::{JoltError, JoltResult};
use crate::http::Method;

mod pattern;

pub use pattern::{Tier, normalize_path};
use pattern::Pattern;

/// A registered `(method, path pattern) → handler` association.
#[derive(Debug)]
pub struct Route<H> {
    method: Method,
    path: String,
    pattern: Pattern,
    handler: H,
}

impl<H> Route<H> {
    fn new(method: Method, path: String, handler: H) -> JoltResult<Self> {
        let pattern = Pattern::compile(&path)?;
        Ok(Self {
            method,
            path,
            pattern,
            handler,
        })
    }

    /// The method this route answers.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The normalized pattern this route was registered with.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The handler registered for this route.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Which precedence tier the route's pattern falls in.
    pub fn tier(&self) -> Tier {
        self.pattern.tier()
    }

    /// Placeholder names in declaration order; empty for exact and wildcard routes.
    pub fn param_names(&self) -> &[String] {
        match &self.pattern {
            Pattern::Parameterized { names, .. } => names,
            _ => &[],
        }
    }

    /// Matches a normalized request path against this route's pattern,
    /// ignoring the method.
    pub fn matches(&self, path: &str) -> Option<Parameters> {
        self.pattern.matches(&self.path, path)
    }
}

/// Result of resolving a request against the route table.
#[derive(Debug)]
pub struct RouteMatch<H> {
    pub route: Arc<Route<H>>,
    pub params: Parameters,
}

/// Immutable route table produced by [`RouterBuilder::build`].
#[derive(Debug)]
pub struct RouteTable<H> {
    routes: HashMap<Method, Vec<Arc<Route<H>>>>,
    // Methods in first-registration order, for stable `Allow` headers.
    methods: Vec<Method>,
}

impl<H> Default for RouteTable<H> {
    fn default() -> Self {
        Self {
            routes: HashMap::new(),
            methods: Vec::new(),
        }
    }
}

impl<H> RouteTable<H> {
    /// Resolves `(method, path)`; `path` must already be normalized.
    pub fn find(&self, method: &Method, path: &str) -> Option<RouteMatch<H>> {
        let routes = self.routes.get(method)?;
        [Tier::Exact, Tier::Parameterized, Tier::Wildcard]
            .into_iter()
            .find_map(|tier| {
                routes
                    .iter()
                    .filter(|route| route.tier() == tier)
                    .find_map(|route| {
                        route.matches(path).map(|params| RouteMatch {
                            route: Arc::clone(route),
                            params,
                        })
                    })
            })
    }

    /// Every method with at least one route matching `path`, in the order
    /// methods were first registered.
    pub fn allowed_methods(&self, path: &str) -> Vec<Method> {
        self.methods
            .iter()
            .filter(|method| {
                self.routes
                    .get(*method)
                    .is_some_and(|routes| routes.iter().any(|r| r.matches(path).is_some()))
            })
            .cloned()
            .collect()
    }

    /// `true` when `path` is routable under some method other than `method`.
    pub fn path_exists_with_different_method(&self, method: &Method, path: &str) -> bool {
        self.allowed_methods(path).iter().any(|m| m != method)
    }

    /// Total number of routes across all methods.
    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All routes, grouped by method in first-registration order.
    pub fn routes(&self) -> impl Iterator<Item = &Route<H>> {
        self.methods
            .iter()
            .filter_map(|m| self.routes.get(m))
            .flat_map(|routes| routes.iter().map(|r| r.as_ref()))
    }
}

/// Startup-time route registration.
///
/// Not shared across threads: build the table once, then hand the
/// [`RouteTable`] to the dispatcher.
#[derive(Debug)]
pub struct RouterBuilder<H> {
    table: RouteTable<H>,
}

impl<H> Default for RouterBuilder<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> RouterBuilder<H> {
    /// An empty builder.
    pub fn new() -> Self {
        Self {
            table: RouteTable::default(),
        }
    }

    /// Registers `handler` for `method` and `path`.
    ///
    /// # Errors
    ///
    /// [`JoltError::DuplicateRoute`] if the normalized path is already
    /// registered for `method`; the table is left unchanged.
    pub fn route(&mut self, method: Method, path: &str, handler: H) -> JoltResult<&mut Self> {
        self.insert(method, normalize_path(path), handler)?;
        Ok(self)
    }

    /// Registers a `GET` route.
    pub fn get(&mut self, path: &str, handler: H) -> JoltResult<&mut Self> {
        self.route(Method::Get, path, handler)
    }

    /// Registers a `POST` route.
    pub fn post(&mut self, path: &str, handler: H) -> JoltResult<&mut Self> {
        self.route(Method::Post, path, handler)
    }

    /// Registers a `PUT` route.
    pub fn put(&mut self, path: &str, handler: H) -> JoltResult<&mut Self> {
        self.route(Method::Put, path, handler)
    }

    /// Registers a `DELETE` route.
    pub fn delete(&mut self, path: &str, handler: H) -> JoltResult<&mut Self> {
        self.route(Method::Delete, path, handler)
    }

    /// Registers a `PATCH` route.
    pub fn patch(&mut self, path: &str, handler: H) -> JoltResult<&mut Self> {
        self.route(Method::Patch, path, handler)
    }

    /// Registers the routes declared in `block` under `prefix`.
    pub fn group<F>(&mut self, prefix: &str, block: F) -> JoltResult<&mut Self>
    where
        F: FnOnce(&mut Scope<'_, H>) -> JoltResult<()>,
    {
        self.root().group(prefix, block)?;
        Ok(self)
    }

    /// Like [`group`](Self::group), with a `/v{version}` segment after `prefix`.
    pub fn versioned_group<F>(&mut self, prefix: &str, version: u32, block: F) -> JoltResult<&mut Self>
    where
        F: FnOnce(&mut Scope<'_, H>) -> JoltResult<()>,
    {
        self.root().versioned_group(prefix, version, block)?;
        Ok(self)
    }

    /// Number of routes registered so far.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Freezes the registrations into an immutable table.
    pub fn build(self) -> RouteTable<H> {
        self.table
    }

    fn root(&mut self) -> Scope<'_, H> {
        Scope {
            builder: self,
            prefix: String::new(),
            versioned: None,
        }
    }

    fn insert(&mut self, method: Method, path: String, handler: H) -> JoltResult<()> {
        let routes = self.table.routes.entry(method.clone()).or_default();
        if routes.iter().any(|r| r.path == path) {
            return Err(JoltError::DuplicateRoute { method, path });
        }
        let route = Route::new(method.clone(), path, handler)?;
        debug!(method = %route.method, path = %route.path, tier = ?route.tier(), "route registered");
        routes.push(Arc::new(route));
        if !self.table.methods.contains(&method) {
            self.table.methods.push(method);
        }
        Ok(())
    }
}

/// A prefix scope opened by [`RouterBuilder::group`] or
/// [`RouterBuilder::versioned_group`]. Routes registered here are prefixed,
/// and nested groups accumulate prefixes.
#[derive(Debug)]
pub struct Scope<'a, H> {
    builder: &'a mut RouterBuilder<H>,
    prefix: String,
    // Full path of the enclosing versioned group, if any.
    versioned: Option<String>,
}

impl<H> Scope<'_, H> {
    /// The accumulated prefix of this scope.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Registers `handler` for `method` at `path` under this scope's prefix.
    pub fn route(&mut self, method: Method, path: &str, handler: H) -> JoltResult<&mut Self> {
        let full = normalize_path(&format!("{}/{}", self.prefix, path));
        self.builder.insert(method, full, handler)?;
        Ok(self)
    }

    /// Registers a `GET` route under this scope.
    pub fn get(&mut self, path: &str, handler: H) -> JoltResult<&mut Self> {
        self.route(Method::Get, path, handler)
    }

    /// Registers a `POST` route under this scope.
    pub fn post(&mut self, path: &str, handler: H) -> JoltResult<&mut Self> {
        self.route(Method::Post, path, handler)
    }

    /// Registers a `PUT` route under this scope.
    pub fn put(&mut self, path: &str, handler: H) -> JoltResult<&mut Self> {
        self.route(Method::Put, path, handler)
    }

    /// Registers a `DELETE` route under this scope.
    pub fn delete(&mut self, path: &str, handler: H) -> JoltResult<&mut Self> {
        self.route(Method::Delete, path, handler)
    }

    /// Registers a `PATCH` route under this scope.
    pub fn patch(&mut self, path: &str, handler: H) -> JoltResult<&mut Self> {
        self.route(Method::Patch, path, handler)
    }

    /// Opens a nested scope whose prefix extends this one.
    pub fn group<F>(&mut self, prefix: &str, block: F) -> JoltResult<&mut Self>
    where
        F: FnOnce(&mut Scope<'_, H>) -> JoltResult<()>,
    {
        let mut nested = Scope {
            prefix: join(&self.prefix, prefix),
            versioned: self.versioned.clone(),
            builder: &mut *self.builder,
        };
        block(&mut nested)?;
        Ok(self)
    }

    /// Opens a `prefix/v{version}` scope.
    ///
    /// # Errors
    ///
    /// [`JoltError::NestedVersionedGroup`] when this scope is already inside
    /// a versioned group.
    pub fn versioned_group<F>(&mut self, prefix: &str, version: u32, block: F) -> JoltResult<&mut Self>
    where
        F: FnOnce(&mut Scope<'_, H>) -> JoltResult<()>,
    {
        let full = join(&join(&self.prefix, prefix), &format!("v{version}"));
        if let Some(outer) = &self.versioned {
            return Err(JoltError::NestedVersionedGroup {
                outer: outer.clone(),
                inner: full,
            });
        }
        let mut nested = Scope {
            prefix: full.clone(),
            versioned: Some(full),
            builder: &mut *self.builder,
        };
        block(&mut nested)?;
        Ok(self)
    }
}

fn join(prefix: &str, segment: &str) -> String {
    let joined = normalize_path(&format!("{prefix}/{segment}"));
    if joined == "/" { String::new() } else { joined }
}
