//! Read-side request facade.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{JoltError, JoltResult};
use crate::http::multipart::{self, UploadedFile};
use crate::http::request::parse_query_string;
use crate::http::{Headers, Method, Request};
use crate::router::normalize_path;

/// Framework-level view of an incoming request.
///
/// Wraps the parsed wire [`Request`] together with the peer address and adds
/// the lookups handlers actually need: a normalized path, client IP
/// resolution through proxy headers, bearer tokens, JSON and multipart bodies.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request: Request,
    peer_addr: Option<SocketAddr>,
    path: String,
}

impl RequestContext {
    /// Wraps a parsed request. `peer_addr` is `None` for requests that did not
    /// arrive over a socket.
    pub fn new(request: Request, peer_addr: Option<SocketAddr>) -> Self {
        let path = resolve_path(&request);
        Self {
            request,
            peer_addr,
            path,
        }
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// Normalized request path.
    ///
    /// Taken from the parsed path, falling back to the raw request target when
    /// that is empty, and to `/` when both are.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.headers().get(name)
    }

    /// All request headers.
    pub fn headers(&self) -> &Headers {
        self.request.headers()
    }

    /// A decoded query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.request.query_param(name)
    }

    /// Every decoded query parameter.
    pub fn query_params(&self) -> &HashMap<String, String> {
        self.request.query_params()
    }

    /// Raw `Content-Type` header value, parameters included.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// `true` when the body is declared as JSON.
    pub fn is_json(&self) -> bool {
        self.content_type()
            .map(|ct| mime_of(ct).eq_ignore_ascii_case("application/json"))
            .unwrap_or(false)
    }

    /// Address of the originating client.
    ///
    /// Order: first entry of `X-Forwarded-For`, then `X-Real-IP`, then the TCP
    /// peer. Returns `None` only for requests built without a peer.
    pub fn client_ip(&self) -> Option<String> {
        if let Some(forwarded) = self.header("x-forwarded-for") {
            let first = forwarded.split(',').next().unwrap_or("").trim();
            if !first.is_empty() {
                return Some(first.to_owned());
            }
        }
        if let Some(real) = self.header("x-real-ip").map(str::trim) {
            if !real.is_empty() {
                return Some(real.to_owned());
            }
        }
        self.peer_addr.map(|addr| addr.ip().to_string())
    }

    /// TCP peer address, ignoring proxy headers.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Token from an `Authorization: Bearer <token>` header.
    ///
    /// The scheme is matched case-insensitively; an empty token yields `None`.
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.header("authorization")?.trim();
        let (scheme, token) = value.split_at_checked(7)?;
        if !scheme.eq_ignore_ascii_case("bearer ") {
            return None;
        }
        let token = token.trim();
        (!token.is_empty()).then_some(token)
    }

    /// Raw body bytes, capped at `Content-Length`.
    pub fn body(&self) -> &Bytes {
        self.request.body()
    }

    /// Body decoded as UTF-8, with invalid sequences replaced.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(self.request.body()).into_owned()
    }

    /// Deserialize the body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> JoltResult<T> {
        Ok(serde_json::from_slice(self.request.body())?)
    }

    /// Deserialize the body into an untyped JSON value.
    ///
    /// An empty body yields `Value::Null`.
    pub fn json_value(&self) -> JoltResult<Value> {
        if self.request.body().is_empty() {
            return Ok(Value::Null);
        }
        self.json()
    }

    /// Fields of an `application/x-www-form-urlencoded` body.
    ///
    /// Empty for any other content type.
    pub fn form_params(&self) -> HashMap<String, String> {
        let urlencoded = self
            .content_type()
            .map(|ct| mime_of(ct).eq_ignore_ascii_case("application/x-www-form-urlencoded"))
            .unwrap_or(false);
        if !urlencoded {
            return HashMap::new();
        }
        parse_query_string(&self.body_text())
    }

    /// Uploaded files from a `multipart/form-data` body.
    ///
    /// Parts without a filename or with an empty body are skipped.
    pub fn files(&self) -> JoltResult<Vec<UploadedFile>> {
        let content_type = self
            .content_type()
            .ok_or(JoltError::Multipart(multipart::MultipartError::NotMultipart))?;
        let boundary = multipart::parse_boundary(content_type)?;
        let parts = multipart::parse_parts(self.request.body(), &boundary)?;
        Ok(multipart::uploaded_files(parts))
    }

    /// The underlying wire request.
    pub fn raw(&self) -> &Request {
        &self.request
    }
}

fn resolve_path(request: &Request) -> String {
    let primary = request.path();
    if !primary.is_empty() {
        return normalize_path(primary);
    }
    let secondary = request.target().split('?').next().unwrap_or("");
    if !secondary.is_empty() {
        return normalize_path(secondary);
    }
    "/".to_owned()
}

fn mime_of(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or("").trim()
}
