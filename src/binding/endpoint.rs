use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::context::Context;
use crate::error::JoltResult;
use crate::template::View;

use super::{Args, ParamSpec, ScalarKind};

/// What an endpoint returned, and how the pipeline writes it.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Keep whatever the endpoint already buffered on the context.
    Empty,
    /// Use this context's response buffer as the result.
    Context(Context),
    /// Written as `text/html`.
    Html(String),
    /// Rendered through the installed template engine, then written as HTML.
    Template(View),
    /// Written as `application/json`.
    Json(Value),
}

impl Reply {
    /// Serializes any value into a JSON reply.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> JoltResult<Self> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }
}

impl From<()> for Reply {
    fn from((): ()) -> Self {
        Self::Empty
    }
}

impl From<String> for Reply {
    fn from(html: String) -> Self {
        Self::Html(html)
    }
}

impl From<&str> for Reply {
    fn from(html: &str) -> Self {
        Self::Html(html.to_owned())
    }
}

impl From<View> for Reply {
    fn from(view: View) -> Self {
        Self::Template(view)
    }
}

impl From<Context> for Reply {
    fn from(ctx: Context) -> Self {
        Self::Context(ctx)
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl<T: Into<Reply>> From<Option<T>> for Reply {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Empty, Into::into)
    }
}

/// Boxed future returned by an endpoint invocation.
pub type ReplyFuture = Pin<Box<dyn Future<Output = JoltResult<Reply>> + Send>>;

type Invoke = Arc<dyn Fn(Args) -> ReplyFuture + Send + Sync>;

/// A routable handler: its parameter descriptors plus the function to call.
///
/// # Examples
///
/// ```rust
/// use jolt::binding::{Args, Endpoint, Reply, ScalarKind};
/// use jolt::error::JoltResult;
/// use serde_json::json;
///
/// async fn show_user(args: Args) -> JoltResult<Reply> {
///     let id: i64 = args.get(0)?;
///     let fields: Option<String> = args.get(1)?;
///     Reply::json(&json!({ "id": id, "fields": fields }))
/// }
///
/// let endpoint = Endpoint::new(show_user)
///     .path("id", ScalarKind::Long)
///     .query("fields", ScalarKind::String);
/// assert_eq!(endpoint.params().len(), 2);
/// ```
#[derive(Clone)]
pub struct Endpoint {
    params: Vec<ParamSpec>,
    invoke: Invoke,
}

impl Endpoint {
    /// An endpoint with no declared parameters yet.
    pub fn new<F, Fut, R>(handler: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JoltResult<R>> + Send + 'static,
        R: Into<Reply> + 'static,
    {
        let invoke: Invoke = Arc::new(move |args: Args| -> ReplyFuture {
            let fut = handler(args);
            Box::pin(async move { fut.await.map(Into::<Reply>::into) })
        });
        Self {
            params: Vec::new(),
            invoke,
        }
    }

    /// An endpoint taking just the request context.
    pub fn from_fn<F, Fut, R>(handler: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JoltResult<R>> + Send + 'static,
        R: Into<Reply> + 'static,
    {
        let handler = Arc::new(handler);
        Self::new(move |args: Args| {
            let handler = Arc::clone(&handler);
            async move {
                let ctx = args.context(0)?;
                handler(ctx).await
            }
        })
        .context()
    }

    #[must_use]
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    #[must_use]
    pub fn path(self, name: impl Into<String>, kind: ScalarKind) -> Self {
        self.param(ParamSpec::Path {
            name: name.into(),
            kind,
        })
    }

    #[must_use]
    pub fn query(self, name: impl Into<String>, kind: ScalarKind) -> Self {
        self.param(ParamSpec::Query {
            name: name.into(),
            kind,
        })
    }

    /// The whole JSON body.
    #[must_use]
    pub fn body(self) -> Self {
        self.param(ParamSpec::Body { field: None })
    }

    /// One top-level field of the JSON body.
    #[must_use]
    pub fn body_field(self, field: impl Into<String>) -> Self {
        self.param(ParamSpec::Body {
            field: Some(field.into()),
        })
    }

    #[must_use]
    pub fn form(self) -> Self {
        self.param(ParamSpec::Form)
    }

    #[must_use]
    pub fn context(self) -> Self {
        self.param(ParamSpec::Context)
    }

    /// Parameter descriptors in declaration order.
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Calls the handler with already-bound arguments.
    pub fn invoke(&self, args: Args) -> ReplyFuture {
        (self.invoke)(args)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::bind;
    use crate::context::RequestContext;
    use crate::error::JoltError;
    use crate::http::{Headers, Method, Request};

    fn ctx(target: &str) -> Context {
        let req = Request::from_parts(Method::Get, target, Headers::new(), "");
        Context::new(RequestContext::new(req, None))
    }

    async fn greet(args: Args) -> JoltResult<String> {
        let name: Option<String> = args.get(0)?;
        Ok(format!("<p>hi {}</p>", name.as_deref().unwrap_or("stranger")))
    }

    async fn nothing(_ctx: Context) -> JoltResult<()> {
        Ok(())
    }

    async fn fail(_args: Args) -> JoltResult<Reply> {
        Err(JoltError::http(crate::http::StatusCode::Conflict, "taken"))
    }

    #[tokio::test]
    async fn invokes_with_bound_args() {
        let endpoint = Endpoint::new(greet).query("name", ScalarKind::String);
        let c = ctx("/hello?name=Ada");
        let args = bind(endpoint.params(), &c).unwrap();
        match endpoint.invoke(args).await.unwrap() {
            Reply::Html(html) => assert_eq!(html, "<p>hi Ada</p>"),
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[tokio::test]
    async fn from_fn_declares_a_context_param() {
        let endpoint = Endpoint::from_fn(nothing);
        assert_eq!(endpoint.params(), &[ParamSpec::Context]);
        let args = bind(endpoint.params(), &ctx("/")).unwrap();
        assert!(matches!(endpoint.invoke(args).await.unwrap(), Reply::Empty));
    }

    #[tokio::test]
    async fn handler_errors_propagate() {
        let endpoint = Endpoint::new(fail);
        let err = endpoint.invoke(Args::default()).await.unwrap_err();
        assert_eq!(err.status(), crate::http::StatusCode::Conflict);
    }

    #[test]
    fn reply_conversions() {
        assert!(matches!(Reply::from(()), Reply::Empty));
        assert!(matches!(Reply::from("x"), Reply::Html(_)));
        assert!(matches!(Reply::from(None::<String>), Reply::Empty));
        assert!(matches!(Reply::from(serde_json::json!([1])), Reply::Json(_)));
        let reply = Reply::json(&vec![1, 2]).unwrap();
        assert!(matches!(reply, Reply::Json(Value::Array(ref a)) if a.len() == 2));
    }
}
