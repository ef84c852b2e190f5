use std::sync::Arc;

use tracing::debug;

use crate::binding::{Endpoint, Reply, bind};
use crate::error::JoltError;
use crate::filter::{Filter, Flow};
use crate::lifecycle::Lifecycle;
use crate::router::RouteTable;
use crate::static_files::ResourceResolver;
use crate::template::TemplateEngine;

use super::{PipelineStep, ProcessingContext, StepFuture};

/// Runs request filters in registration order; [`Flow::Halt`] stops the run.
pub struct FilterStep {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterStep {
    /// Runs `filters` in order.
    pub fn new(filters: Vec<Arc<dyn Filter>>) -> Self {
        Self { filters }
    }
}

impl PipelineStep for FilterStep {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn execute<'a>(&'a self, pc: &'a mut ProcessingContext) -> StepFuture<'a> {
        Box::pin(async move {
            for filter in &self.filters {
                if filter.apply(pc.ctx.clone()).await? == Flow::Halt {
                    debug!(path = pc.ctx.request().path(), "filter halted request");
                    pc.halt();
                    break;
                }
            }
            Ok(())
        })
    }
}

/// Runs the before-handlers matching the request path.
pub struct BeforeStep {
    lifecycle: Arc<Lifecycle>,
}

impl BeforeStep {
    pub fn new(lifecycle: Arc<Lifecycle>) -> Self {
        Self { lifecycle }
    }
}

impl PipelineStep for BeforeStep {
    fn name(&self) -> &'static str {
        "before"
    }

    fn execute<'a>(&'a self, pc: &'a mut ProcessingContext) -> StepFuture<'a> {
        Box::pin(async move { self.lifecycle.run_before(&pc.ctx).await })
    }
}

/// Resolves the request against the route table and records the match.
///
/// A miss is not an error here; [`StaticResourceStep`] decides between a
/// static file, 404 and 405.
pub struct RoutingStep {
    routes: Arc<RouteTable<Endpoint>>,
}

impl RoutingStep {
    /// Matches against `routes`.
    pub fn new(routes: Arc<RouteTable<Endpoint>>) -> Self {
        Self { routes }
    }
}

impl PipelineStep for RoutingStep {
    fn name(&self) -> &'static str {
        "routing"
    }

    fn execute<'a>(&'a self, pc: &'a mut ProcessingContext) -> StepFuture<'a> {
        Box::pin(async move {
            let request = pc.ctx.request();
            let found = self.routes.find(request.method(), request.path());
            if let Some(found) = found {
                debug!(route = found.route.path(), params = found.params.len(), "route matched");
                pc.ctx.set_params(found.params.clone());
                pc.matched = Some(found);
            }
            Ok(())
        })
    }
}

/// Fallback for requests no route claimed.
///
/// Read-only requests (`GET`, `HEAD`) are offered to the resource resolver;
/// a hit becomes the response and halts the run. Otherwise the request fails
/// with 405 when the path is routable under another method, 404 if not.
pub struct StaticResourceStep {
    routes: Arc<RouteTable<Endpoint>>,
    resolver: Option<Arc<dyn ResourceResolver>>,
}

impl StaticResourceStep {
    /// Falls back to `resolver`. `routes` decides between 404 and 405 on a miss.
    pub fn new(routes: Arc<RouteTable<Endpoint>>, resolver: Option<Arc<dyn ResourceResolver>>) -> Self {
        Self { routes, resolver }
    }
}

impl PipelineStep for StaticResourceStep {
    fn name(&self) -> &'static str {
        "static"
    }

    fn execute<'a>(&'a self, pc: &'a mut ProcessingContext) -> StepFuture<'a> {
        Box::pin(async move {
            if pc.matched.is_some() {
                return Ok(());
            }
            let method = pc.ctx.request().method().clone();
            let path = pc.ctx.request().path().to_owned();

            if method.is_read_only() {
                if let Some(resolver) = &self.resolver {
                    if let Some(asset) = resolver.resolve(&path).await? {
                        pc.ctx.response().binary(asset.data, asset.content_type)?;
                        pc.halt();
                        return Ok(());
                    }
                }
            }

            let allowed = self.routes.allowed_methods(&path);
            if allowed.is_empty() {
                Err(JoltError::NotFound { method, path })
            } else {
                Err(JoltError::MethodNotAllowed {
                    method,
                    path,
                    allowed,
                })
            }
        })
    }
}

/// Binds the matched endpoint's declared parameters.
pub struct ParamBindingStep;

impl PipelineStep for ParamBindingStep {
    fn name(&self) -> &'static str {
        "binding"
    }

    fn execute<'a>(&'a self, pc: &'a mut ProcessingContext) -> StepFuture<'a> {
        Box::pin(async move {
            if let Some(matched) = &pc.matched {
                let args = bind(matched.route.handler().params(), &pc.ctx)?;
                pc.args = Some(args);
            }
            Ok(())
        })
    }
}

/// Calls the endpoint and writes its [`Reply`] into the response buffer.
pub struct InvocationStep {
    templates: Option<Arc<dyn TemplateEngine>>,
}

impl InvocationStep {
    /// Renders [`Reply::Template`] through `templates`, when installed.
    pub fn new(templates: Option<Arc<dyn TemplateEngine>>) -> Self {
        Self { templates }
    }
}

impl PipelineStep for InvocationStep {
    fn name(&self) -> &'static str {
        "invocation"
    }

    fn execute<'a>(&'a self, pc: &'a mut ProcessingContext) -> StepFuture<'a> {
        Box::pin(async move {
            let Some(route) = pc.matched.as_ref().map(|m| Arc::clone(&m.route)) else {
                return Ok(());
            };
            let args = pc.args.take().unwrap_or_default();
            let reply = route.handler().invoke(args).await?;

            match reply {
                Reply::Empty => {}
                Reply::Context(ctx) => pc.ctx = ctx,
                Reply::Html(html) => pc.ctx.response().html(html)?,
                Reply::Json(value) => pc.ctx.response().json_value(value)?,
                Reply::Template(view) => {
                    let engine = self.templates.as_ref().ok_or_else(|| JoltError::Template {
                        template: view.template().to_owned(),
                        reason: "no template engine installed".to_owned(),
                    })?;
                    let engine = Arc::clone(engine);
                    let name = view.template().to_owned();
                    let html = tokio::task::spawn_blocking(move || {
                        engine.render(view.template(), &view.model())
                    })
                    .await
                    .map_err(|e| JoltError::Template {
                        template: name,
                        reason: e.to_string(),
                    })??;
                    pc.ctx.response().html(html)?;
                }
            }
            Ok(())
        })
    }
}

/// Flushes the buffered response.
pub struct CommitStep;

impl PipelineStep for CommitStep {
    fn name(&self) -> &'static str {
        "commit"
    }

    fn execute<'a>(&'a self, pc: &'a mut ProcessingContext) -> StepFuture<'a> {
        Box::pin(async move {
            pc.commit()?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{Args, ScalarKind};
    use crate::context::{Context, RequestContext, ResponseBody};
    use crate::error::JoltResult;
    use crate::http::{Headers, Method, Request, StatusCode};
    use crate::router::RouterBuilder;
    use crate::static_files::{ResolveFuture, StaticAsset};
    use crate::template::View;

    fn pc(method: Method, target: &str) -> ProcessingContext {
        let req = Request::from_parts(method, target, Headers::new(), "");
        ProcessingContext::new(Context::new(RequestContext::new(req, None)))
    }

    async fn item(args: Args) -> JoltResult<Reply> {
        let id: i32 = args.get(0)?;
        Reply::json(&serde_json::json!({ "id": id }))
    }

    async fn page(_ctx: Context) -> JoltResult<View> {
        Ok(View::new("page.html"))
    }

    fn routes() -> Arc<RouteTable<Endpoint>> {
        let mut b = RouterBuilder::new();
        b.get("/items/{id}", Endpoint::new(item).path("id", ScalarKind::Int))
            .unwrap();
        b.post("/widgets", Endpoint::from_fn(page)).unwrap();
        b.get("/page", Endpoint::from_fn(page)).unwrap();
        Arc::new(b.build())
    }

    struct OneFile;

    impl ResourceResolver for OneFile {
        fn resolve<'a>(&'a self, path: &'a str) -> ResolveFuture<'a> {
            Box::pin(async move {
                Ok((path == "/robots.txt").then(|| StaticAsset {
                    data: "User-agent: *".into(),
                    content_type: "text/plain; charset=utf-8",
                }))
            })
        }
    }

    #[tokio::test]
    async fn routing_then_binding_then_invocation() {
        let routes = routes();
        let mut pc = pc(Method::Get, "/items/5");
        RoutingStep::new(routes).execute(&mut pc).await.unwrap();
        assert_eq!(pc.ctx.path_param("id"), Some("5"));
        ParamBindingStep.execute(&mut pc).await.unwrap();
        InvocationStep::new(None).execute(&mut pc).await.unwrap();
        assert_eq!(
            pc.ctx.response().body(),
            ResponseBody::Json(serde_json::json!({ "id": 5 }))
        );
    }

    #[tokio::test]
    async fn unmatched_path_distinguishes_404_and_405() {
        let routes = routes();
        let step = StaticResourceStep::new(Arc::clone(&routes), None);

        let mut p = pc(Method::Get, "/widgets");
        let err = step.execute(&mut p).await.unwrap_err();
        assert!(matches!(err, JoltError::MethodNotAllowed { ref allowed, .. } if allowed == &[Method::Post]));

        let mut p = pc(Method::Get, "/nonexistent");
        let err = step.execute(&mut p).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn static_fallback_only_for_read_only_methods() {
        let step = StaticResourceStep::new(routes(), Some(Arc::new(OneFile)));

        let mut p = pc(Method::Get, "/robots.txt");
        step.execute(&mut p).await.unwrap();
        assert!(p.is_halted());
        assert_eq!(
            p.ctx.response().content_type().as_deref(),
            Some("text/plain; charset=utf-8")
        );

        let mut p = pc(Method::Delete, "/robots.txt");
        assert!(step.execute(&mut p).await.is_err());
        assert!(!p.is_halted());
    }

    #[tokio::test]
    async fn template_reply_without_engine_fails() {
        let mut p = pc(Method::Get, "/page");
        RoutingStep::new(routes()).execute(&mut p).await.unwrap();
        ParamBindingStep.execute(&mut p).await.unwrap();
        let err = InvocationStep::new(None).execute(&mut p).await.unwrap_err();
        assert!(matches!(err, JoltError::Template { ref template, .. } if template == "page.html"));
    }

    #[tokio::test]
    async fn commit_step_is_idempotent() {
        let mut p = pc(Method::Get, "/");
        p.ctx.text("once").unwrap();
        CommitStep.execute(&mut p).await.unwrap();
        CommitStep.execute(&mut p).await.unwrap();
        assert!(p.is_committed());
        let (_, wire) = p.finish();
        assert_eq!(wire.body_ref(), b"once");
    }
}
