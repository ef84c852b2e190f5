//! Per-request context handed to filters, lifecycle handlers and endpoints.
//!
//! [`Context`] bundles the read-only [`RequestContext`], the shared
//! [`ResponseContext`] buffer, the path parameters bound by the router and a
//! typed [`Extensions`] map. It is cheap to clone; every clone refers to the
//! same response buffer and extensions, so a handler may take it by value and
//! the pipeline still commits what the handler wrote.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::Arc,
};

use parking_lot::Mutex;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::JoltResult;
use crate::http::StatusCode;

pub mod request;
pub mod response;

pub use request::RequestContext;
pub use response::{ResponseBody, ResponseContext, Transport};

/// Type-erased request extensions map, used to pass per-request state from
/// before-handlers and filters to endpoints.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Stores `value`, replacing any earlier value of the same type.
    pub fn insert<T>(&mut self, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.map.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Borrows the stored value of type `T`.
    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Removes and returns the stored value of type `T`.
    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }
}

/// Raw path parameters bound by the router, keyed by placeholder name.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Parameters {
    map: HashMap<String, String>,
}

impl Parameters {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Binds a placeholder name to its raw segment.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    /// Raw, undecoded segment bound to `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|value| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}

/// Per-request context.
#[derive(Clone)]
pub struct Context {
    request: Arc<RequestContext>,
    response: ResponseContext,
    params: Parameters,
    extensions: Arc<Mutex<Extensions>>,
}

impl Context {
    /// A fresh context with an empty response buffer and no bound parameters.
    pub fn new(request: RequestContext) -> Self {
        Self {
            request: Arc::new(request),
            response: ResponseContext::new(),
            params: Parameters::new(),
            extensions: Arc::new(Mutex::new(Extensions::new())),
        }
    }

    pub(crate) fn set_params(&mut self, params: Parameters) {
        self.params = params;
    }

    /// Read-only request facade.
    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    /// Response buffer shared by every clone of this context.
    pub fn response(&self) -> &ResponseContext {
        &self.response
    }

    /// Path parameters bound by the router.
    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// A path parameter by placeholder name.
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// A decoded query string parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.request.query_param(name)
    }

    /// Deserialize the request body.
    pub fn body_json<T: DeserializeOwned>(&self) -> JoltResult<T> {
        self.request.json()
    }

    /// Store a typed value for later handlers of this request.
    pub fn insert_extension<T>(&self, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.extensions.lock().insert(value);
    }

    /// Clone of a previously stored extension value.
    pub fn extension<T>(&self) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.extensions.lock().get::<T>().cloned()
    }

    /// Removes a previously stored extension value and returns it.
    pub fn take_extension<T>(&self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.extensions.lock().remove::<T>()
    }

    // ── Response shortcuts ───────────────────────────────────────────────────

    /// Sets the response status.
    pub fn status(&self, status: StatusCode) -> JoltResult<&Self> {
        self.response.set_status(status)?;
        Ok(self)
    }

    /// Sets a response header. `Content-Type` overrides the body's default
    /// content type.
    pub fn header(&self, name: impl Into<String>, value: impl Into<String>) -> JoltResult<&Self> {
        self.response.set_header(name, value)?;
        Ok(self)
    }

    /// Sets a plain-text body.
    pub fn text(&self, body: impl Into<String>) -> JoltResult<&Self> {
        self.response.text(body)?;
        Ok(self)
    }

    /// Sets an HTML body.
    pub fn html(&self, body: impl Into<String>) -> JoltResult<&Self> {
        self.response.html(body)?;
        Ok(self)
    }

    /// Serializes `value` as the JSON body.
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> JoltResult<&Self> {
        self.response.json(value)?;
        Ok(self)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", self.request.method())
            .field("path", &self.request.path())
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}
