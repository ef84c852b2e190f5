//! CORS filter: `Origin` validation, preflight short-circuit and
//! `Access-Control-*` header injection.

use crate::context::Context;
use crate::error::JoltResult;
use crate::http::{Method, StatusCode};

use super::{Filter, FilterFuture, Flow};

/// CORS filter.
///
/// # Behavior
///
/// - No `Origin` header, or an origin outside the allow-list: the request
///   continues untouched.
/// - `OPTIONS` preflight: the response becomes `204 No Content` with the
///   `Access-Control-*` headers and the pipeline halts before routing.
/// - Any other request: the headers are buffered and the request continues,
///   so the endpoint's response carries them.
/// - A specific (non-wildcard) origin also gets `Vary: Origin`.
///
/// # Examples
///
/// ```rust
/// use jolt::filter::CorsFilter;
///
/// let cors = CorsFilter::new()
///     .allow_origin("https://app.example.com")
///     .allow_method("PATCH")
///     .allow_header("X-Request-ID");
/// ```
#[derive(Debug, Clone)]
pub struct CorsFilter {
    allowed_origins: Vec<String>,
    allowed_methods: Vec<String>,
    allowed_headers: Vec<String>,
    max_age_secs: u32,
}

impl Default for CorsFilter {
    fn default() -> Self {
        Self::permissive()
    }
}

impl CorsFilter {
    /// A filter with no allowed origins; add them with [`allow_origin`](Self::allow_origin).
    ///
    /// Methods default to `GET, POST, PUT, DELETE` and headers to
    /// `Content-Type, Authorization`.
    pub fn new() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allowed_methods: ["GET", "POST", "PUT", "DELETE"].map(String::from).to_vec(),
            allowed_headers: ["Content-Type", "Authorization"].map(String::from).to_vec(),
            max_age_secs: 3600,
        }
    }

    /// Like [`new`](Self::new) but accepting every origin (`*`).
    pub fn permissive() -> Self {
        Self::new().allow_origin("*")
    }

    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origins.push(origin.into());
        self
    }

    #[must_use]
    pub fn allow_method(mut self, method: impl Into<String>) -> Self {
        self.allowed_methods.push(method.into());
        self
    }

    #[must_use]
    pub fn allow_header(mut self, header: impl Into<String>) -> Self {
        self.allowed_headers.push(header.into());
        self
    }

    #[must_use]
    pub fn max_age(mut self, secs: u32) -> Self {
        self.max_age_secs = secs;
        self
    }

    fn resolve_origin(&self, origin: &str) -> Option<String> {
        if self.allowed_origins.iter().any(|o| o == "*") {
            Some("*".to_owned())
        } else if self.allowed_origins.iter().any(|o| o == origin) {
            Some(origin.to_owned())
        } else {
            None
        }
    }

    fn decorate(&self, ctx: &Context, allow_origin: &str, preflight: bool) -> JoltResult<()> {
        let res = ctx.response();
        res.set_header("Access-Control-Allow-Origin", allow_origin)?;
        res.set_header("Access-Control-Allow-Methods", self.allowed_methods.join(", "))?;
        res.set_header("Access-Control-Allow-Headers", self.allowed_headers.join(", "))?;
        if preflight {
            res.set_header("Access-Control-Max-Age", self.max_age_secs.to_string())?;
        }
        if allow_origin != "*" {
            res.set_header("Vary", "Origin")?;
        }
        Ok(())
    }
}

impl Filter for CorsFilter {
    fn apply(&self, ctx: Context) -> FilterFuture {
        let this = self.clone();
        Box::pin(async move {
            let Some(origin) = ctx.request().header("origin").map(str::to_owned) else {
                return Ok(Flow::Continue);
            };
            let Some(allow_origin) = this.resolve_origin(&origin) else {
                return Ok(Flow::Continue);
            };

            if ctx.request().method() == &Method::Options {
                this.decorate(&ctx, &allow_origin, true)?;
                ctx.response().set_status(StatusCode::NoContent)?;
                return Ok(Flow::Halt);
            }

            this.decorate(&ctx, &allow_origin, false)?;
            Ok(Flow::Continue)
        })
    }
}
