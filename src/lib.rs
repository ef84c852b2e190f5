//! # jolt
//!
//! An async HTTP/1.1 web framework with an explicit request pipeline.
//!
//! Each request flows through a fixed sequence of steps (filters,
//! before-handlers, routing, static fallback, parameter binding, invocation,
//! commit), then any after-handlers. Responses are buffered on the
//! [`Context`](context::Context) and written to the wire exactly once.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use jolt::app::App;
//! use jolt::binding::{Args, Endpoint, Reply, ScalarKind};
//! use jolt::context::Context;
//! use jolt::error::JoltResult;
//! use jolt::server::Server;
//!
//! async fn hello(ctx: Context) -> JoltResult<()> {
//!     ctx.text("Hello, World!")?;
//!     Ok(())
//! }
//!
//! async fn user(args: Args) -> JoltResult<Reply> {
//!     let id: i64 = args.get(0)?;
//!     Reply::json(&serde_json::json!({ "id": id }))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut app = App::builder();
//!     app.get("/", Endpoint::from_fn(hello))?;
//!     app.get("/users/{id}", Endpoint::new(user).path("id", ScalarKind::Long))?;
//!
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     println!("Listening on http://{}", server.local_addr());
//!     server.serve(app.build()).await?;
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod binding;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod exception;
pub mod filter;
pub mod http;
pub mod lifecycle;
pub mod pipeline;
pub mod router;
pub mod server;
pub mod static_files;
pub mod template;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use app::{App, AppBuilder};
pub use binding::{Args, Endpoint, Reply, ScalarKind};
pub use config::JoltConfig;
pub use context::Context;
pub use error::{JoltError, JoltResult};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use server::{Server, ServerError};
