//! The fixed per-request step sequence.
//!
//! ```text
//! Filter → Before → Routing → StaticResource → ParamBinding → Invocation → Commit
//! ```
//!
//! Steps share one [`ProcessingContext`]. A step ends the run early by
//! halting it (a filter short-circuit, a static file hit) or by returning an
//! error, which the [`Dispatcher`](crate::dispatcher::Dispatcher) hands to the
//! exception handler. After-handlers are not a step: the dispatcher runs them
//! once the pipeline has returned, whatever the outcome.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::binding::{Args, Endpoint};
use crate::context::Context;
use crate::error::JoltResult;
use crate::filter::Filter;
use crate::http::{Response, StatusCode};
use crate::lifecycle::Lifecycle;
use crate::router::{RouteMatch, RouteTable};
use crate::static_files::ResourceResolver;
use crate::template::TemplateEngine;

mod steps;

pub use steps::{
    BeforeStep, CommitStep, FilterStep, InvocationStep, ParamBindingStep, RoutingStep,
    StaticResourceStep,
};

/// Mutable per-request state threaded through the steps.
#[derive(Debug)]
pub struct ProcessingContext {
    pub ctx: Context,
    pub started: Instant,
    pub matched: Option<RouteMatch<Endpoint>>,
    pub args: Option<Args>,
    halted: bool,
    wire: Response,
}

impl ProcessingContext {
    /// Fresh state for one request; the clock starts now.
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            started: Instant::now(),
            matched: None,
            args: None,
            halted: false,
            wire: Response::new(StatusCode::Ok),
        }
    }

    /// Stops the run after the current step; the buffered response is kept.
    pub fn halt(&mut self) {
        self.halted = true;
    }

    /// `true` once a step has called [`halt`](Self::halt).
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// `true` once the response buffer has been committed.
    pub fn is_committed(&self) -> bool {
        self.ctx.response().is_committed()
    }

    /// Commits the buffered response to the wire response.
    ///
    /// Idempotent: returns `Ok(false)` if it was already committed.
    pub fn commit(&mut self) -> JoltResult<bool> {
        self.ctx.response().commit(&mut self.wire)
    }

    /// Time since the request entered the pipeline.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Consumes the state, yielding the context and the wire response.
    pub fn finish(self) -> (Context, Response) {
        (self.ctx, self.wire)
    }
}

/// Boxed future returned by [`PipelineStep::execute`].
pub type StepFuture<'a> = Pin<Box<dyn Future<Output = JoltResult<()>> + Send + 'a>>;

/// One stage of request processing.
pub trait PipelineStep: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn execute<'a>(&'a self, pc: &'a mut ProcessingContext) -> StepFuture<'a>;
}

/// An ordered list of steps run against each request.
pub struct RoutePipeline {
    steps: Vec<Box<dyn PipelineStep>>,
}

impl RoutePipeline {
    /// A pipeline running `steps` in the given order.
    pub fn new(steps: Vec<Box<dyn PipelineStep>>) -> Self {
        Self { steps }
    }

    /// The standard seven-step pipeline.
    pub fn standard(
        routes: Arc<RouteTable<Endpoint>>,
        filters: Vec<Arc<dyn Filter>>,
        lifecycle: Arc<Lifecycle>,
        resolver: Option<Arc<dyn ResourceResolver>>,
        templates: Option<Arc<dyn TemplateEngine>>,
    ) -> Self {
        Self::new(vec![
            Box::new(FilterStep::new(filters)),
            Box::new(BeforeStep::new(lifecycle)),
            Box::new(RoutingStep::new(Arc::clone(&routes))),
            Box::new(StaticResourceStep::new(routes, resolver)),
            Box::new(ParamBindingStep),
            Box::new(InvocationStep::new(templates)),
            Box::new(CommitStep),
        ])
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Runs the steps in order until one halts, commits or fails.
    pub async fn run(&self, pc: &mut ProcessingContext) -> JoltResult<()> {
        for step in &self.steps {
            debug!(step = step.name(), path = pc.ctx.request().path(), "pipeline step");
            step.execute(pc).await?;
            if pc.is_halted() || pc.is_committed() {
                debug!(step = step.name(), "pipeline stopped early");
                break;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for RoutePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutePipeline")
            .field("steps", &self.step_names())
            .finish()
    }
}
