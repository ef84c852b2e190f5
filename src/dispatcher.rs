//! Per-request entry point: pipeline, error mapping, commit, after-handlers.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info};

use crate::context::{Context, RequestContext};
use crate::exception::ExceptionHandler;
use crate::http::{Method, Request, Response, StatusCode};
use crate::lifecycle::Lifecycle;
use crate::pipeline::{ProcessingContext, RoutePipeline};

/// Drives one request through the [`RoutePipeline`].
///
/// Order of events:
///
/// 1. The pipeline runs until it commits, halts or fails.
/// 2. A failure is handed to the [`ExceptionHandler`], once, which writes
///    into the still-uncommitted buffer.
/// 3. The buffer is committed (a no-op if the pipeline already did).
/// 4. Matching after-handlers run exactly once, against the committed response.
pub struct Dispatcher {
    pipeline: RoutePipeline,
    lifecycle: Arc<Lifecycle>,
    exception_handler: Arc<dyn ExceptionHandler>,
}

impl Dispatcher {
    /// Assembles a dispatcher from a built pipeline and its collaborators.
    pub fn new(
        pipeline: RoutePipeline,
        lifecycle: Arc<Lifecycle>,
        exception_handler: Arc<dyn ExceptionHandler>,
    ) -> Self {
        Self {
            pipeline,
            lifecycle,
            exception_handler,
        }
    }

    /// The pipeline run for every request.
    pub fn pipeline(&self) -> &RoutePipeline {
        &self.pipeline
    }

    /// Handles one parsed request and returns the wire response.
    pub async fn dispatch(&self, request: Request, peer: Option<SocketAddr>) -> Response {
        let keep_alive = request.is_keep_alive();
        let ctx = Context::new(RequestContext::new(request, peer));
        let mut pc = ProcessingContext::new(ctx);

        if let Err(err) = self.pipeline.run(&mut pc).await {
            self.exception_handler.handle(&err, &pc.ctx);
        }

        let written = match pc.commit() {
            Ok(_) => true,
            Err(err) => {
                error!(path = pc.ctx.request().path(), error = %err, "commit failed");
                false
            }
        };

        self.lifecycle.run_after(&pc.ctx).await;

        let elapsed = pc.elapsed();
        let (ctx, mut wire) = pc.finish();
        if !written {
            wire = Response::new(StatusCode::InternalServerError);
        }
        wire.set_keep_alive(keep_alive);
        if ctx.request().method() == &Method::Head {
            wire.set_body(Vec::new());
        }

        info!(
            method = %ctx.request().method(),
            path = ctx.request().path(),
            status = wire.status().as_u16(),
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "request completed"
        );
        wire
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pipeline", &self.pipeline)
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}
