//! Buffered response state and the one-time commit to the transport.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::error::{JoltError, JoltResult};
use crate::http::{Headers, Response, StatusCode};

/// The single body a response carries. Setting one kind replaces any other.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    Text(String),
    Json(Value),
    Binary(Bytes),
}

impl ResponseBody {
    fn default_content_type(&self) -> Option<&'static str> {
        match self {
            Self::Empty => None,
            Self::Text(_) => Some("text/plain; charset=utf-8"),
            Self::Json(_) => Some("application/json"),
            Self::Binary(_) => Some("application/octet-stream"),
        }
    }

    fn to_bytes(&self) -> JoltResult<Vec<u8>> {
        Ok(match self {
            Self::Empty => Vec::new(),
            Self::Text(text) => text.as_bytes().to_vec(),
            Self::Json(value) => serde_json::to_vec(value)?,
            Self::Binary(bytes) => bytes.to_vec(),
        })
    }
}

/// Destination of a committed response.
///
/// [`ResponseContext::commit`] calls these in a fixed order: status, every
/// header, content type (if any), body.
pub trait Transport {
    fn write_status(&mut self, status: StatusCode) -> JoltResult<()>;
    fn write_header(&mut self, name: &str, value: &str) -> JoltResult<()>;
    fn write_content_type(&mut self, content_type: &str) -> JoltResult<()>;
    fn write_body(&mut self, body: &[u8]) -> JoltResult<()>;
}

impl Transport for Response {
    fn write_status(&mut self, status: StatusCode) -> JoltResult<()> {
        self.set_status(status);
        Ok(())
    }

    fn write_header(&mut self, name: &str, value: &str) -> JoltResult<()> {
        self.add_header(name, value);
        Ok(())
    }

    fn write_content_type(&mut self, content_type: &str) -> JoltResult<()> {
        self.add_header("Content-Type", content_type);
        Ok(())
    }

    fn write_body(&mut self, body: &[u8]) -> JoltResult<()> {
        self.set_body(body.to_vec());
        Ok(())
    }
}

#[derive(Debug)]
struct ResponseBuffer {
    status: StatusCode,
    headers: Headers,
    content_type: Option<String>,
    body: ResponseBody,
    committed: bool,
}

/// Write-side response facade.
///
/// All writes land in a buffer and only reach the transport on
/// [`commit`](Self::commit). Clones share the same buffer, so the pipeline,
/// filters, lifecycle handlers and the endpoint all see one response. Once
/// committed, every mutator fails with [`JoltError::ResponseCommitted`].
#[derive(Debug, Clone)]
pub struct ResponseContext {
    inner: Arc<Mutex<ResponseBuffer>>,
}

impl Default for ResponseContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseContext {
    /// An empty `200 OK` response buffer.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ResponseBuffer {
                status: StatusCode::Ok,
                headers: Headers::new(),
                content_type: None,
                body: ResponseBody::Empty,
                committed: false,
            })),
        }
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut ResponseBuffer) -> R) -> JoltResult<R> {
        let mut buffer = self.inner.lock();
        if buffer.committed {
            return Err(JoltError::ResponseCommitted);
        }
        Ok(f(&mut buffer))
    }

    /// Sets the status code.
    pub fn set_status(&self, status: StatusCode) -> JoltResult<()> {
        self.mutate(|b| b.status = status)
    }

    /// Sets a header, replacing previous values for the same name.
    ///
    /// `Content-Type` is stored as the content type, exactly as
    /// [`set_content_type`](Self::set_content_type) would.
    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) -> JoltResult<()> {
        let (name, value) = (name.into(), value.into());
        if is_content_type(&name) {
            return self.set_content_type(value);
        }
        self.mutate(|b| b.headers.set(name, value))
    }

    /// Adds a header value, keeping any earlier ones.
    ///
    /// A response has one content type, so `Content-Type` replaces it.
    pub fn append_header(&self, name: impl Into<String>, value: impl Into<String>) -> JoltResult<()> {
        let (name, value) = (name.into(), value.into());
        if is_content_type(&name) {
            return self.set_content_type(value);
        }
        self.mutate(|b| b.headers.append(name, value))
    }

    /// Overrides the content type the body kind would otherwise imply.
    pub fn set_content_type(&self, content_type: impl Into<String>) -> JoltResult<()> {
        let content_type = content_type.into();
        self.mutate(|b| b.content_type = Some(content_type))
    }

    /// Plain-text body.
    pub fn text(&self, body: impl Into<String>) -> JoltResult<()> {
        let body = ResponseBody::Text(body.into());
        self.mutate(|b| b.body = body)
    }

    /// HTML body; sets `Content-Type: text/html; charset=utf-8`.
    pub fn html(&self, body: impl Into<String>) -> JoltResult<()> {
        let body = ResponseBody::Text(body.into());
        self.mutate(|b| {
            b.body = body;
            b.content_type = Some("text/html; charset=utf-8".to_owned());
        })
    }

    /// JSON body serialized from any `Serialize` value.
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> JoltResult<()> {
        self.json_value(serde_json::to_value(value)?)
    }

    /// Sets an already-built JSON body.
    pub fn json_value(&self, value: Value) -> JoltResult<()> {
        self.mutate(|b| {
            b.body = ResponseBody::Json(value);
            b.content_type = Some("application/json".to_owned());
        })
    }

    /// Binary body with an explicit content type.
    pub fn binary(&self, data: impl Into<Bytes>, content_type: impl Into<String>) -> JoltResult<()> {
        let body = ResponseBody::Binary(data.into());
        let content_type = content_type.into();
        self.mutate(|b| {
            b.body = body;
            b.content_type = Some(content_type);
        })
    }

    /// `302 Found` with a `Location` header.
    pub fn redirect(&self, location: impl Into<String>) -> JoltResult<()> {
        let location = location.into();
        self.mutate(|b| {
            b.status = StatusCode::Found;
            b.headers.set("Location", location);
        })
    }

    /// Drops the buffered body and content type, keeping status and headers.
    pub fn clear_body(&self) -> JoltResult<()> {
        self.mutate(|b| {
            b.body = ResponseBody::Empty;
            b.content_type = None;
        })
    }

    /// The buffered status code.
    pub fn status(&self) -> StatusCode {
        self.inner.lock().status
    }

    /// First buffered value of a header. `Content-Type` is reported by
    /// [`content_type`](Self::content_type) instead.
    pub fn header(&self, name: &str) -> Option<String> {
        self.inner.lock().headers.get(name).map(str::to_owned)
    }

    /// Explicit content type, if one was set. The body kind's default is
    /// only applied on commit.
    pub fn content_type(&self) -> Option<String> {
        self.inner.lock().content_type.clone()
    }

    /// A copy of the buffered body.
    pub fn body(&self) -> ResponseBody {
        self.inner.lock().body.clone()
    }

    /// `true` once [`commit`](Self::commit) has run.
    pub fn is_committed(&self) -> bool {
        self.inner.lock().committed
    }

    /// Flushes the buffered state to `transport`.
    ///
    /// Returns `Ok(true)` on the first call and `Ok(false)` on every later
    /// call without touching the transport. The buffer is marked committed
    /// before writing so a failing transport is never written twice.
    pub fn commit(&self, transport: &mut dyn Transport) -> JoltResult<bool> {
        let (status, headers, content_type, body) = {
            let mut buffer = self.inner.lock();
            if buffer.committed {
                return Ok(false);
            }
            buffer.committed = true;
            let content_type = buffer
                .content_type
                .clone()
                .or_else(|| buffer.body.default_content_type().map(str::to_owned));
            (
                buffer.status,
                buffer.headers.clone(),
                content_type,
                buffer.body.to_bytes()?,
            )
        };

        transport.write_status(status)?;
        for (name, value) in headers.iter() {
            transport.write_header(name, value)?;
        }
        if let Some(content_type) = content_type.as_deref() {
            transport.write_content_type(content_type)?;
        }
        transport.write_body(&body)?;
        Ok(true)
    }
}

fn is_content_type(name: &str) -> bool {
    name.eq_ignore_ascii_case("content-type")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl Transport for Recorder {
        fn write_status(&mut self, status: StatusCode) -> JoltResult<()> {
            self.events.push(format!("status {}", status.as_u16()));
            Ok(())
        }
        fn write_header(&mut self, name: &str, value: &str) -> JoltResult<()> {
            self.events.push(format!("header {name}={value}"));
            Ok(())
        }
        fn write_content_type(&mut self, content_type: &str) -> JoltResult<()> {
            self.events.push(format!("type {content_type}"));
            Ok(())
        }
        fn write_body(&mut self, body: &[u8]) -> JoltResult<()> {
            self.events.push(format!("body {}", String::from_utf8_lossy(body)));
            Ok(())
        }
    }

    #[test]
    fn commit_writes_in_fixed_order() {
        let res = ResponseContext::new();
        res.set_status(StatusCode::Created).unwrap();
        res.set_header("X-Id", "7").unwrap();
        res.json(&serde_json::json!({"ok": true})).unwrap();

        let mut rec = Recorder::default();
        assert!(res.commit(&mut rec).unwrap());
        assert_eq!(
            rec.events,
            vec![
                "status 201",
                "header X-Id=7",
                "type application/json",
                r#"body {"ok":true}"#,
            ]
        );
    }

    #[test]
    fn content_type_header_overrides_the_body_default() {
        let res = ResponseContext::new();
        res.set_header("content-type", "text/csv").unwrap();
        res.text("a,b\n1,2").unwrap();
        assert_eq!(res.content_type().as_deref(), Some("text/csv"));
        assert_eq!(res.header("Content-Type"), None);

        let mut wire = Response::new(StatusCode::Ok);
        res.commit(&mut wire).unwrap();
        assert_eq!(wire.headers().get("content-type"), Some("text/csv"));
        assert_eq!(wire.headers().get_all("content-type").count(), 1);
    }

    #[test]
    fn second_commit_is_a_no_op() {
        let res = ResponseContext::new();
        res.text("once").unwrap();

        let mut rec = Recorder::default();
        assert!(res.commit(&mut rec).unwrap());
        assert!(!res.commit(&mut rec).unwrap());
        assert_eq!(rec.events.iter().filter(|e| e.starts_with("body")).count(), 1);
        assert_eq!(rec.events.iter().filter(|e| e.starts_with("status")).count(), 1);
    }

    #[test]
    fn mutation_after_commit_fails() {
        let res = ResponseContext::new();
        res.commit(&mut Recorder::default()).unwrap();

        assert!(matches!(res.text("late"), Err(JoltError::ResponseCommitted)));
        assert!(matches!(
            res.set_status(StatusCode::NotFound),
            Err(JoltError::ResponseCommitted)
        ));
        assert!(matches!(
            res.set_header("X", "y"),
            Err(JoltError::ResponseCommitted)
        ));
    }

    #[test]
    fn setting_a_body_kind_replaces_the_previous_one() {
        let res = ResponseContext::new();
        res.text("hello").unwrap();
        res.binary(Bytes::from_static(b"\x00\x01"), "image/png").unwrap();
        assert_eq!(res.body(), ResponseBody::Binary(Bytes::from_static(b"\x00\x01")));

        res.json_value(serde_json::json!([1, 2])).unwrap();
        assert_eq!(res.body(), ResponseBody::Json(serde_json::json!([1, 2])));
        assert_eq!(res.content_type().as_deref(), Some("application/json"));
    }

    #[test]
    fn clones_share_the_buffer() {
        let res = ResponseContext::new();
        let other = res.clone();
        other.set_status(StatusCode::Accepted).unwrap();
        assert_eq!(res.status(), StatusCode::Accepted);
    }

    #[test]
    fn commit_into_wire_response() {
        let res = ResponseContext::new();
        res.html("<h1>hi</h1>").unwrap();

        let mut wire = Response::new(StatusCode::Ok);
        res.commit(&mut wire).unwrap();
        assert_eq!(wire.headers().get("content-type"), Some("text/html; charset=utf-8"));
        assert_eq!(wire.text(), "<h1>hi</h1>");
    }
}
