//! Request filters, the first pipeline step.
//!
//! A filter sees every request before lifecycle handlers and routing. It can
//! decorate the buffered response (headers, status) and either let the
//! request continue or halt the pipeline, in which case whatever it buffered
//! is committed as the final response.
//!
//! ## Core types
//!
//! - [`Filter`]: trait implemented by all filters.
//! - [`Flow`]: the continue/halt decision.
//! - [`from_fn`]: adapts an async closure into a filter.
//! - [`CorsFilter`]: built-in CORS handling with preflight short-circuit.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::JoltResult;

mod cors;

pub use cors::CorsFilter;

/// What the pipeline does after a filter ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Proceed to the next filter, then the rest of the pipeline.
    Continue,
    /// Stop here and commit the buffered response.
    Halt,
}

/// Boxed future returned by [`Filter::apply`].
pub type FilterFuture = Pin<Box<dyn Future<Output = JoltResult<Flow>> + Send>>;

/// The core trait for request filters.
///
/// # Contract
///
/// - Implementations must be `Send + Sync`; one instance serves every request.
/// - Returning `Err` hands the error to the exception handler exactly like a
///   failing endpoint.
pub trait Filter: Send + Sync + 'static {
    fn apply(&self, ctx: Context) -> FilterFuture;
}

impl<T: Filter + ?Sized> Filter for Arc<T> {
    fn apply(&self, ctx: Context) -> FilterFuture {
        (**self).apply(ctx)
    }
}

struct FnFilter<F>(F);

impl<F, Fut> Filter for FnFilter<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JoltResult<Flow>> + Send + 'static,
{
    fn apply(&self, ctx: Context) -> FilterFuture {
        Box::pin((self.0)(ctx))
    }
}

/// Wraps an async closure as a shareable filter.
///
/// # Examples
///
/// ```rust,no_run
/// use jolt::context::Context;
/// use jolt::error::JoltResult;
/// use jolt::filter::{Flow, from_fn};
/// use jolt::http::StatusCode;
///
/// async fn maintenance(ctx: Context) -> JoltResult<Flow> {
///     ctx.status(StatusCode::ServiceUnavailable)?.text("back soon")?;
///     Ok(Flow::Halt)
/// }
///
/// let filter = from_fn(maintenance);
/// ```
pub fn from_fn<F, Fut>(f: F) -> Arc<dyn Filter>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JoltResult<Flow>> + Send + 'static,
{
    Arc::new(FnFilter(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::http::{Headers, Method, Request, StatusCode};

    async fn block_all(ctx: Context) -> JoltResult<Flow> {
        ctx.status(StatusCode::Forbidden)?;
        Ok(Flow::Halt)
    }

    #[tokio::test]
    async fn fn_filter_can_halt_and_write() {
        let req = Request::from_parts(Method::Get, "/", Headers::new(), "");
        let ctx = Context::new(RequestContext::new(req, None));

        let flow = from_fn(block_all).apply(ctx.clone()).await.unwrap();
        assert_eq!(flow, Flow::Halt);
        assert_eq!(ctx.response().status(), StatusCode::Forbidden);
    }
}
