//! Turning pipeline errors into responses.

use serde_json::json;
use tracing::{error, warn};

use crate::context::Context;
use crate::error::{JoltError, JoltResult};

/// Maps an error that escaped the pipeline onto the response buffer.
///
/// Called at most once per request, before the response is committed.
pub trait ExceptionHandler: Send + Sync + 'static {
    fn handle(&self, error: &JoltError, ctx: &Context);
}

/// Writes `{"error": …, "status": …}` for JSON clients and plain text
/// otherwise. 405 responses carry an `Allow` header.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExceptionHandler;

impl DefaultExceptionHandler {
    fn write(&self, error: &JoltError, ctx: &Context) -> JoltResult<()> {
        let status = error.status();
        let res = ctx.response();
        res.clear_body()?;
        res.set_status(status)?;

        if let JoltError::MethodNotAllowed { allowed, .. } = error {
            let allow = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
            res.set_header("Allow", allow)?;
        }

        let message = error.public_message();
        if wants_json(ctx) {
            res.json_value(json!({ "error": message, "status": status.as_u16() }))?;
        } else {
            res.text(message)?;
        }
        Ok(())
    }
}

impl ExceptionHandler for DefaultExceptionHandler {
    fn handle(&self, error: &JoltError, ctx: &Context) {
        let status = error.status();
        let path = ctx.request().path();
        if status.is_server_error() {
            error!(path, status = status.as_u16(), error = %error, "request failed");
        } else {
            warn!(path, status = status.as_u16(), error = %error, "request rejected");
        }

        if ctx.response().is_committed() {
            return;
        }
        if let Err(e) = self.write(error, ctx) {
            error!(path, error = %e, "exception handler could not write response");
        }
    }
}

fn wants_json(ctx: &Context) -> bool {
    let request = ctx.request();
    request.is_json()
        || request
            .header("accept")
            .is_some_and(|accept| accept.to_ascii_lowercase().contains("application/json"))
}
