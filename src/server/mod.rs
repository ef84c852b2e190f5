//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and hands each parsed HTTP/1.1 request to an
//! [`App`]. Connections are persistent unless the client sends
//! `Connection: close` or keep-alive is disabled in [`ServerConfig`].

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::app::App;
use crate::config::ServerConfig;
use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy)]
struct Limits {
    max_request_size: usize,
    keep_alive: bool,
}

/// The jolt HTTP server.
///
/// # Examples
///
/// ```rust,no_run
/// use jolt::app::App;
/// use jolt::binding::Endpoint;
/// use jolt::context::Context;
/// use jolt::error::JoltResult;
/// use jolt::server::Server;
///
/// async fn hello(ctx: Context) -> JoltResult<()> {
///     ctx.text("Hello!")?;
///     Ok(())
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut app = App::builder();
///     app.get("/", Endpoint::from_fn(hello))?;
///     Server::bind("127.0.0.1:8080").await?.serve(app.build()).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    limits: Limits,
}

impl Server {
    /// Binds the server to the given TCP address with default limits.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let defaults = ServerConfig::default();
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            limits: Limits {
                max_request_size: defaults.max_request_size,
                keep_alive: defaults.keep_alive,
            },
        })
    }

    /// Binds to `config.bind_address` and applies its limits.
    pub async fn from_config(config: &ServerConfig) -> Result<Self, ServerError> {
        Ok(Self::bind(&config.bind_address)
            .await?
            .max_request_size(config.max_request_size)
            .keep_alive(config.keep_alive))
    }

    /// Largest request (head plus body) buffered before answering 413.
    #[must_use]
    pub fn max_request_size(mut self, bytes: usize) -> Self {
        self.limits.max_request_size = bytes;
        self
    }

    /// When `false`, every connection is closed after one response.
    #[must_use]
    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.limits.keep_alive = enabled;
        self
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves `app` until the listener fails.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn serve(self, app: App) -> Result<(), ServerError> {
        self.serve_with_shutdown(app, std::future::pending()).await
    }

    /// Serves `app` until `shutdown` resolves. Connections already accepted
    /// finish on their own tasks.
    pub async fn serve_with_shutdown<S>(self, app: App, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()> + Send,
    {
        let app = Arc::new(app);
        info!(address = %self.local_addr, "jolt listening");
        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                () = &mut shutdown => {
                    info!(address = %self.local_addr, "shutting down");
                    return Ok(());
                }
            };
            let (stream, peer_addr) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let app = Arc::clone(&app);
            let limits = self.limits;

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, app, limits).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Handles a single TCP connection over its lifetime.
///
/// One request per iteration, until the peer closes the connection or the
/// request asks for `Connection: close`.
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    app: Arc<App>,
    limits: Limits,
) -> Result<(), std::io::Error> {
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        // Bytes of a pipelined request may already be buffered.
        if buf.is_empty() {
            let bytes_read = stream.read_buf(&mut buf).await?;
            if bytes_read == 0 {
                debug!(peer = %peer_addr, "connection closed by peer");
                break;
            }
        }

        let (request, body_offset) = match Request::parse(&buf) {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => {
                // The buffer holds nothing but this request's unfinished head.
                if buf.len() > limits.max_request_size {
                    reject_too_large(&mut stream, peer_addr).await?;
                    break;
                }
                if stream.read_buf(&mut buf).await? == 0 {
                    break;
                }
                continue;
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                let response = Response::new(StatusCode::BadRequest)
                    .body(format!("Bad Request: {e}"))
                    .keep_alive(false);
                stream.write_all(&response.into_bytes()).await?;
                break;
            }
        };

        let Some(total_needed) = body_offset
            .checked_add(request.content_length().unwrap_or(0))
            .filter(|&total| total <= limits.max_request_size)
        else {
            reject_too_large(&mut stream, peer_addr).await?;
            break;
        };
        if buf.len() < total_needed {
            if stream.read_buf(&mut buf).await? == 0 {
                break;
            }
            continue;
        }

        let keep_alive = limits.keep_alive && request.is_keep_alive();

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let mut response = app.dispatch(request, Some(peer_addr)).await;
        response.set_keep_alive(keep_alive);
        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;

        let _ = buf.split_to(total_needed);

        if !keep_alive {
            debug!(peer = %peer_addr, "closing connection");
            break;
        }
    }

    Ok(())
}

async fn reject_too_large(stream: &mut TcpStream, peer_addr: SocketAddr) -> Result<(), std::io::Error> {
    warn!(peer = %peer_addr, "request too large, sending 413");
    let response = Response::new(StatusCode::PayloadTooLarge)
        .body("Request entity too large")
        .keep_alive(false);
    stream.write_all(&response.into_bytes()).await
}
