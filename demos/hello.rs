//! Small jolt application.
//!
//! ```text
//! RUST_LOG=jolt=debug cargo run --example hello
//! curl localhost:8080/
//! curl localhost:8080/api/v1/users/42?fields=name
//! curl -X POST -H 'Content-Type: application/json' -d '{"name":"Ada"}' localhost:8080/api/v1/users
//! ```
//!
//! Pass a TOML file path as the first argument to load settings from it.

use jolt::app::AppBuilder;
use jolt::binding::{Args, Endpoint, Reply, ScalarKind};
use jolt::config::JoltConfig;
use jolt::context::Context;
use jolt::error::{JoltError, JoltResult};
use jolt::filter::CorsFilter;
use jolt::http::StatusCode;
use jolt::server::Server;
use serde::Deserialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct NewUser {
    name: String,
}

async fn index(ctx: Context) -> JoltResult<()> {
    ctx.html("<h1>jolt</h1><p>try <code>/api/v1/users/42</code></p>")?;
    Ok(())
}

async fn show_user(args: Args) -> JoltResult<Reply> {
    let id: i64 = args.get(0)?;
    let fields: Option<String> = args.get(1)?;
    Reply::json(&json!({ "id": id, "fields": fields }))
}

async fn create_user(args: Args) -> JoltResult<Reply> {
    let user: NewUser = args.get(0)?;
    if user.name.trim().is_empty() {
        return Err(JoltError::http(StatusCode::UnprocessableEntity, "name must not be empty"));
    }
    let ctx = args.context(1)?;
    ctx.status(StatusCode::Created)?;
    Reply::json(&json!({ "created": user.name }))
}

async fn stamp(ctx: Context) -> JoltResult<()> {
    ctx.header("X-Powered-By", "jolt")?;
    Ok(())
}

async fn audit(ctx: Context) -> JoltResult<()> {
    tracing::info!(
        path = ctx.request().path(),
        status = ctx.response().status().as_u16(),
        client = ctx.request().client_ip().as_deref().unwrap_or("-"),
        "audit"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => JoltConfig::load(path)?,
        None => JoltConfig::default(),
    };

    let mut app = AppBuilder::from_config(&config);
    app.filter(CorsFilter::permissive());
    app.before(Vec::<String>::new(), stamp);
    app.after(["/api/v1/users"], audit);

    app.get("/", Endpoint::from_fn(index))?;
    app.versioned_group("/api", 1, |api| {
        api.get(
            "/users/{id}",
            Endpoint::new(show_user)
                .path("id", ScalarKind::Long)
                .query("fields", ScalarKind::String),
        )?;
        api.post("/users", Endpoint::new(create_user).body().context())?;
        Ok(())
    })?;

    let server = Server::from_config(&config.server).await?;
    println!("Listening on http://{}", server.local_addr());
    server.serve(app.build()).await?;
    Ok(())
}
