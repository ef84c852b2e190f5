//! End-to-end request dispatch through a built `App`, without sockets.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use jolt::app::{App, AppBuilder};
use jolt::binding::{Args, Endpoint, Reply, ScalarKind};
use jolt::context::Context;
use jolt::error::{JoltError, JoltResult};
use jolt::exception::ExceptionHandler;
use jolt::filter::{CorsFilter, Flow, from_fn};
use jolt::http::{Headers, Method, Request, Response, StatusCode};
use jolt::lifecycle::LifecycleFuture;
use jolt::static_files::StaticFiles;
use jolt::template::{MiniJinjaTemplates, View};
use serde_json::{Value, json};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn request(method: Method, target: &str) -> Request {
    Request::from_parts(method, target, Headers::new(), "")
}

fn with_headers(method: Method, target: &str, headers: &[(&str, &str)], body: &'static str) -> Request {
    let mut h = Headers::new();
    for (k, v) in headers {
        h.append(*k, *v);
    }
    Request::from_parts(method, target, h, body)
}

async fn send(app: &App, req: Request) -> Response {
    app.dispatch(req, None).await
}

fn json_body(res: &Response) -> Value {
    serde_json::from_slice(res.body_ref()).unwrap()
}

fn counting(counter: &Arc<AtomicUsize>) -> impl Fn(Context) -> LifecycleFuture + Send + Sync + 'static {
    let counter = Arc::clone(counter);
    move |_ctx: Context| -> LifecycleFuture {
        let counter = Arc::clone(&counter);
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            JoltResult::Ok(())
        })
    }
}

async fn reply_text(ctx: Context, text: &str) -> JoltResult<()> {
    ctx.text(text)?;
    Ok(())
}

async fn me(ctx: Context) -> JoltResult<()> {
    reply_text(ctx, "me").await
}

async fn by_id(args: Args) -> JoltResult<String> {
    let id: String = args.get(0)?;
    Ok(format!("user {id}"))
}

async fn ok(ctx: Context) -> JoltResult<()> {
    reply_text(ctx, "ok").await
}

async fn boom(_ctx: Context) -> JoltResult<()> {
    Err(JoltError::internal("database unreachable"))
}

async fn wildcard(ctx: Context) -> JoltResult<()> {
    let rest = ctx.path_param("wildcard").unwrap_or("").to_owned();
    ctx.text(format!("rest={rest}"))?;
    Ok(())
}

#[test]
fn pipeline_runs_the_standard_steps_in_order() {
    let app = App::builder().build();
    assert_eq!(
        app.dispatcher().pipeline().step_names(),
        ["filter", "before", "routing", "static", "binding", "invocation", "commit"]
    );
}

// ── Route precedence & registration ──────────────────────────────────────────

#[tokio::test]
async fn exact_route_beats_parameterized() {
    let mut b = App::builder();
    b.get("/users/{id}", Endpoint::new(by_id).path("id", ScalarKind::String))
        .unwrap();
    b.get("/users/me", Endpoint::from_fn(me)).unwrap();
    let app = b.build();

    let res = send(&app, request(Method::Get, "/users/me")).await;
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(res.text(), "me");

    let res = send(&app, request(Method::Get, "/users/42")).await;
    assert_eq!(res.text(), "user 42");
    assert_eq!(res.headers().get("content-type"), Some("text/html; charset=utf-8"));
}

#[tokio::test]
async fn duplicate_registration_is_rejected_and_first_route_kept() {
    async fn second(ctx: Context) -> JoltResult<()> {
        reply_text(ctx, "second").await
    }

    let mut b = App::builder();
    b.get("/items", Endpoint::from_fn(ok)).unwrap();
    let err = b.get("/items/", Endpoint::from_fn(second)).unwrap_err();
    assert!(matches!(err, JoltError::DuplicateRoute { ref path, .. } if path == "/items"));

    let app = b.build();
    assert_eq!(send(&app, request(Method::Get, "/items")).await.text(), "ok");
}

#[tokio::test]
async fn nested_versioned_group_is_a_configuration_error() {
    let mut b = App::builder();
    let err = b
        .versioned_group("/api", 1, |api| {
            api.versioned_group("/inner", 2, |_| Ok(()))?;
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(err, JoltError::NestedVersionedGroup { .. }));
}

#[tokio::test]
async fn groups_prefix_routes() {
    let mut b = App::builder();
    b.group("/admin", |admin| {
        admin.versioned_group("/api", 2, |api| {
            api.get("/ping", Endpoint::from_fn(ok))?;
            Ok(())
        })?;
        Ok(())
    })
    .unwrap();
    let app = b.build();

    assert_eq!(send(&app, request(Method::Get, "/admin/api/v2/ping")).await.status(), StatusCode::Ok);
    assert_eq!(send(&app, request(Method::Get, "/api/v2/ping")).await.status(), StatusCode::NotFound);
}

// ── 404 / 405 ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn method_mismatch_is_405_with_allow_and_unknown_path_is_404() {
    let mut b = App::builder();
    b.post("/widgets", Endpoint::from_fn(ok)).unwrap();
    let app = b.build();

    let res = send(&app, request(Method::Get, "/widgets")).await;
    assert_eq!(res.status(), StatusCode::MethodNotAllowed);
    assert_eq!(res.headers().get("Allow"), Some("POST"));

    let res = send(&app, request(Method::Get, "/nonexistent")).await;
    assert_eq!(res.status(), StatusCode::NotFound);
    assert!(res.headers().get("Allow").is_none());
}

#[tokio::test]
async fn allow_lists_methods_in_registration_order() {
    let mut b = App::builder();
    b.put("/doc/{id}", Endpoint::from_fn(ok)).unwrap();
    b.delete("/doc/{id}", Endpoint::from_fn(ok)).unwrap();
    b.post("/doc/{id}", Endpoint::from_fn(ok)).unwrap();
    let app = b.build();

    let res = send(&app, request(Method::Get, "/doc/7")).await;
    assert_eq!(res.headers().get("Allow"), Some("PUT, DELETE, POST"));
}

#[tokio::test]
async fn json_clients_receive_json_errors() {
    let app = App::builder().build();
    let req = with_headers(Method::Get, "/missing", &[("Accept", "application/json")], "");
    let res = send(&app, req).await;
    assert_eq!(res.status(), StatusCode::NotFound);
    assert_eq!(json_body(&res), json!({ "error": "Not Found", "status": 404 }));
}

// ── Path handling ────────────────────────────────────────────────────────────

#[tokio::test]
async fn wildcard_contains_prefix_and_descendants_only() {
    let mut b = App::builder();
    b.get("/static/*", Endpoint::from_fn(wildcard)).unwrap();
    let app = b.build();

    for path in ["/static", "/static/a", "/static/a/b"] {
        assert_eq!(send(&app, request(Method::Get, path)).await.status(), StatusCode::Ok, "{path}");
    }
    assert_eq!(send(&app, request(Method::Get, "/static/a/b")).await.text(), "rest=/a/b");
    assert_eq!(send(&app, request(Method::Get, "/staticX")).await.status(), StatusCode::NotFound);
}

#[tokio::test]
async fn request_paths_are_normalized_before_matching() {
    let mut b = App::builder();
    b.get("/a/b", Endpoint::from_fn(ok)).unwrap();
    let app = b.build();

    assert_eq!(send(&app, request(Method::Get, "//a//b/")).await.text(), "ok");
    assert_eq!(send(&app, request(Method::Get, "/a/b?x=1")).await.text(), "ok");
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn after_handlers_run_exactly_once_for_every_outcome() {
    let global = Arc::new(AtomicUsize::new(0));
    let scoped = Arc::new(AtomicUsize::new(0));

    let mut b = App::builder();
    b.get("/ok", Endpoint::from_fn(ok)).unwrap();
    b.get("/boom", Endpoint::from_fn(boom)).unwrap();
    b.after(Vec::<String>::new(), counting(&global));
    b.after(["/ok"], counting(&scoped));
    let app = b.build();

    let res = send(&app, request(Method::Get, "/ok")).await;
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(global.load(Ordering::SeqCst), 1);
    assert_eq!(scoped.load(Ordering::SeqCst), 1);

    let res = send(&app, request(Method::Get, "/missing")).await;
    assert_eq!(res.status(), StatusCode::NotFound);
    assert_eq!(global.load(Ordering::SeqCst), 2);

    let res = send(&app, request(Method::Get, "/boom")).await;
    assert_eq!(res.status(), StatusCode::InternalServerError);
    assert!(!res.text().contains("database"));
    assert_eq!(global.load(Ordering::SeqCst), 3);
    assert_eq!(scoped.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn after_handler_cannot_rewrite_committed_response() {
    async fn rewrite(ctx: Context) -> JoltResult<()> {
        let err = ctx.text("late").unwrap_err();
        assert!(matches!(err, JoltError::ResponseCommitted));
        Err(err)
    }

    let mut b = App::builder();
    b.get("/ok", Endpoint::from_fn(ok)).unwrap();
    b.after(["/ok"], rewrite);
    let app = b.build();

    let res = send(&app, request(Method::Get, "/ok")).await;
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(res.text(), "ok");
}

#[tokio::test]
async fn failing_before_handler_skips_endpoint_but_not_after() {
    async fn deny(_ctx: Context) -> JoltResult<()> {
        Err(JoltError::http(StatusCode::Unauthorized, "login required"))
    }

    let invoked = Arc::new(AtomicUsize::new(0));
    let after = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&invoked);

    let mut b = App::builder();
    b.get(
        "/private",
        Endpoint::from_fn(move |ctx: Context| {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                ctx.text("secret")?;
                JoltResult::Ok(())
            }
        }),
    )
    .unwrap();
    b.before(["/private"], deny);
    b.after(["/private"], counting(&after));
    let app = b.build();

    let res = send(&app, request(Method::Get, "/private")).await;
    assert_eq!(res.status(), StatusCode::Unauthorized);
    assert_eq!(res.text(), "login required");
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    assert_eq!(after.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn before_handlers_pass_data_through_extensions() {
    #[derive(Clone)]
    struct User(String);

    async fn authenticate(ctx: Context) -> JoltResult<()> {
        if let Some(token) = ctx.request().bearer_token() {
            ctx.insert_extension(User(token.to_owned()));
        }
        Ok(())
    }

    async fn whoami(ctx: Context) -> JoltResult<String> {
        let user = ctx
            .extension::<User>()
            .ok_or_else(|| JoltError::http(StatusCode::Unauthorized, "anonymous"))?;
        Ok(user.0)
    }

    let mut b = App::builder();
    b.before(Vec::<String>::new(), authenticate);
    b.get("/whoami", Endpoint::from_fn(whoami)).unwrap();
    let app = b.build();

    let req = with_headers(Method::Get, "/whoami", &[("Authorization", "Bearer ada")], "");
    assert_eq!(send(&app, req).await.text(), "ada");
    assert_eq!(send(&app, request(Method::Get, "/whoami")).await.status(), StatusCode::Unauthorized);
}

// ── Filters ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn cors_preflight_short_circuits_before_routing() {
    let mut b = App::builder();
    b.filter(CorsFilter::new().allow_origin("https://app.example"));
    b.post("/orders", Endpoint::from_fn(ok)).unwrap();
    let app = b.build();

    let preflight = with_headers(Method::Options, "/orders", &[("Origin", "https://app.example")], "");
    let res = send(&app, preflight).await;
    assert_eq!(res.status(), StatusCode::NoContent);
    assert_eq!(res.headers().get("Access-Control-Allow-Origin"), Some("https://app.example"));

    let post = with_headers(Method::Post, "/orders", &[("Origin", "https://app.example")], "");
    let res = send(&app, post).await;
    assert_eq!(res.text(), "ok");
    assert_eq!(res.headers().get("Vary"), Some("Origin"));
}

#[tokio::test]
async fn halting_filter_status_is_final() {
    async fn maintenance(ctx: Context) -> JoltResult<Flow> {
        ctx.status(StatusCode::ServiceUnavailable)?.text("back soon")?;
        Ok(Flow::Halt)
    }

    let mut b = App::builder();
    b.filter(from_fn(maintenance));
    b.get("/", Endpoint::from_fn(ok)).unwrap();
    let app = b.build();

    let res = send(&app, request(Method::Get, "/")).await;
    assert_eq!(res.status(), StatusCode::ServiceUnavailable);
    assert_eq!(res.text(), "back soon");
}

// ── Binding & replies ────────────────────────────────────────────────────────

#[tokio::test]
async fn binds_path_query_and_body() {
    async fn update(args: Args) -> JoltResult<Reply> {
        let id: i32 = args.get(0)?;
        let dry_run: Option<bool> = args.get(1)?;
        let name: String = args.get(2)?;
        Reply::json(&json!({ "id": id, "dry_run": dry_run.unwrap_or(false), "name": name }))
    }

    let mut b = App::builder();
    b.put(
        "/items/{id}",
        Endpoint::new(update)
            .path("id", ScalarKind::Int)
            .query("dry_run", ScalarKind::Boolean)
            .body_field("name"),
    )
    .unwrap();
    let app = b.build();

    let req = with_headers(
        Method::Put,
        "/items/9?dry_run=TRUE",
        &[("Content-Type", "application/json")],
        r#"{"name":"lamp"}"#,
    );
    let res = send(&app, req).await;
    assert_eq!(res.headers().get("Content-Type"), Some("application/json"));
    assert_eq!(json_body(&res), json!({ "id": 9, "dry_run": true, "name": "lamp" }));

    let res = send(&app, request(Method::Put, "/items/nine")).await;
    assert_eq!(res.status(), StatusCode::BadRequest);

    let req = with_headers(Method::Put, "/items/9", &[("Content-Type", "application/json")], "{");
    assert_eq!(send(&app, req).await.status(), StatusCode::BadRequest);
}

#[tokio::test]
async fn endpoint_content_type_header_reaches_the_wire() {
    async fn export(ctx: Context) -> JoltResult<()> {
        ctx.header("Content-Type", "text/csv")?.text("id,name\n1,lamp")?;
        Ok(())
    }

    let mut b = App::builder();
    b.get("/export", Endpoint::from_fn(export)).unwrap();
    let app = b.build();

    let res = send(&app, request(Method::Get, "/export")).await;
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(res.headers().get("Content-Type"), Some("text/csv"));
    assert_eq!(res.headers().get_all("content-type").count(), 1);
}

#[tokio::test]
async fn form_merges_sources_with_path_params_last() {
    async fn echo(args: Args) -> JoltResult<Reply> {
        let form = args.form(0)?;
        Reply::json(&json!({
            "id": form.get("id"),
            "name": form.get("name"),
            "page": form.get("page"),
        }))
    }

    let mut b = App::builder();
    b.post("/things/{id}", Endpoint::new(echo).form()).unwrap();
    let app = b.build();

    let req = with_headers(
        Method::Post,
        "/things/3?id=q&page=2",
        &[("Content-Type", "application/x-www-form-urlencoded")],
        "name=Lamp+Shade&id=body",
    );
    let res = send(&app, req).await;
    assert_eq!(json_body(&res), json!({ "id": "3", "name": "Lamp Shade", "page": "2" }));
}

#[tokio::test]
async fn returned_context_and_empty_reply_keep_buffered_response() {
    async fn created(args: Args) -> JoltResult<Context> {
        let ctx = args.context(0)?;
        ctx.status(StatusCode::Created)?.json(&json!({ "ok": true }))?;
        Ok(ctx)
    }

    async fn redirect(ctx: Context) -> JoltResult<()> {
        ctx.response().redirect("/login")?;
        Ok(())
    }

    let mut b = App::builder();
    b.post("/things", Endpoint::new(created).context()).unwrap();
    b.get("/old", Endpoint::from_fn(redirect)).unwrap();
    let app = b.build();

    let res = send(&app, request(Method::Post, "/things")).await;
    assert_eq!(res.status(), StatusCode::Created);
    assert_eq!(json_body(&res), json!({ "ok": true }));

    let res = send(&app, request(Method::Get, "/old")).await;
    assert_eq!(res.status(), StatusCode::Found);
    assert_eq!(res.headers().get("Location"), Some("/login"));
}

#[tokio::test]
async fn template_replies_render_through_engine() {
    async fn greet(args: Args) -> JoltResult<View> {
        let name: String = args.get(0)?;
        View::new("greet.html").with("name", name)
    }

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("greet.html"), "<p>Hi {{ name }}</p>").unwrap();

    let mut b = App::builder();
    b.templates(MiniJinjaTemplates::new(dir.path()));
    b.get("/greet/{name}", Endpoint::new(greet).path("name", ScalarKind::String))
        .unwrap();
    let app = b.build();

    let res = send(&app, request(Method::Get, "/greet/Ada")).await;
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(res.text(), "<p>Hi Ada</p>");
    assert_eq!(res.headers().get("Content-Type"), Some("text/html; charset=utf-8"));

    let mut b = App::builder();
    b.get("/greet/{name}", Endpoint::new(greet).path("name", ScalarKind::String))
        .unwrap();
    let res = send(&b.build(), request(Method::Get, "/greet/Ada")).await;
    assert_eq!(res.status(), StatusCode::InternalServerError);
}

// ── Static fallback ──────────────────────────────────────────────────────────

#[tokio::test]
async fn static_files_serve_read_only_misses() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("app.js"), "console.log(1)").unwrap();

    let mut b = AppBuilder::new();
    b.static_files(StaticFiles::new(dir.path()).mount("/assets"));
    b.post("/assets/app.js", Endpoint::from_fn(ok)).unwrap();
    let app = b.build();

    let res = send(&app, request(Method::Get, "/assets/app.js")).await;
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(res.headers().get("Content-Type"), Some("application/javascript"));
    assert_eq!(res.body_ref(), b"console.log(1)");

    let res = send(&app, request(Method::Head, "/assets/app.js")).await;
    assert_eq!(res.status(), StatusCode::Ok);
    assert!(res.body_ref().is_empty());

    let res = send(&app, request(Method::Get, "/assets/missing.js")).await;
    assert_eq!(res.status(), StatusCode::NotFound);

    let res = send(&app, request(Method::Put, "/assets/app.js")).await;
    assert_eq!(res.status(), StatusCode::MethodNotAllowed);
    assert_eq!(res.headers().get("Allow"), Some("POST"));
}

// ── Exception handler ────────────────────────────────────────────────────────

#[tokio::test]
async fn custom_exception_handler_replaces_default() {
    struct Plain;

    impl ExceptionHandler for Plain {
        fn handle(&self, error: &JoltError, ctx: &Context) {
            let _ = ctx
                .status(error.status())
                .and_then(|c| c.text(format!("custom {}", error.status().as_u16())));
        }
    }

    let mut b = App::builder();
    b.exception_handler(Plain);
    let app = b.build();

    let res = send(&app, request(Method::Get, "/nope")).await;
    assert_eq!(res.status(), StatusCode::NotFound);
    assert_eq!(res.text(), "custom 404");
}
