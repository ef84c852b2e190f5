//! `multipart/form-data` body parsing.
//!
//! Only the pieces the request facade needs: split the body on the boundary,
//! read each part's `Content-Disposition` and `Content-Type`, and hand back
//! the raw bytes. Streaming and nested multipart are not supported.

use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MultipartError {
    #[error("content type is not multipart/form-data")]
    NotMultipart,

    #[error("missing multipart boundary")]
    MissingBoundary,

    #[error("malformed part: {0}")]
    MalformedPart(&'static str),
}

/// One part of a multipart body.
#[derive(Debug, Clone)]
pub struct Part {
    pub name: Option<String>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// A submitted file extracted from a multipart request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub field: String,
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

impl UploadedFile {
    /// Size of the uploaded content in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Extracts the boundary parameter from a `Content-Type` header value.
pub fn parse_boundary(content_type: &str) -> Result<String, MultipartError> {
    let mut params = content_type.split(';');
    let mime = params.next().unwrap_or("").trim();
    if !mime.eq_ignore_ascii_case("multipart/form-data") {
        return Err(MultipartError::NotMultipart);
    }
    params
        .filter_map(|p| p.trim().split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, v)| v.trim().trim_matches('"').to_owned())
        .filter(|b| !b.is_empty())
        .ok_or(MultipartError::MissingBoundary)
}

/// Splits `body` into its parts.
pub fn parse_parts(body: &Bytes, boundary: &str) -> Result<Vec<Part>, MultipartError> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();
    // Every delimiter after the opening one starts on a new line.
    let part_end = format!("\r\n--{boundary}");
    let part_end = part_end.as_bytes();
    let mut parts = Vec::new();

    let Some(mut cursor) = find(body, delimiter, 0) else {
        return Err(MultipartError::MalformedPart("opening boundary not found"));
    };

    loop {
        cursor += delimiter.len();
        if body[cursor..].starts_with(b"--") {
            break;
        }
        cursor = skip_crlf(body, cursor);

        let Some(head_end) = find(body, b"\r\n\r\n", cursor) else {
            return Err(MultipartError::MalformedPart("part headers not terminated"));
        };
        let head = std::str::from_utf8(&body[cursor..head_end])
            .map_err(|_| MultipartError::MalformedPart("part headers are not UTF-8"))?;
        let data_start = head_end + 4;

        let Some(data_end) = find(body, part_end, data_start) else {
            return Err(MultipartError::MalformedPart("closing boundary not found"));
        };

        let mut part = Part {
            name: None,
            filename: None,
            content_type: None,
            data: body.slice(data_start..data_end),
        };
        for line in head.split("\r\n") {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            if name.trim().eq_ignore_ascii_case("content-disposition") {
                part.name = disposition_param(value, "name");
                part.filename = disposition_param(value, "filename");
            } else if name.trim().eq_ignore_ascii_case("content-type") {
                part.content_type = Some(value.trim().to_owned());
            }
        }
        parts.push(part);
        cursor = data_end + 2;
    }

    Ok(parts)
}

/// Parts that carry a real upload: a non-empty filename and a non-empty body.
pub fn uploaded_files(parts: Vec<Part>) -> Vec<UploadedFile> {
    parts
        .into_iter()
        .filter_map(|part| {
            let filename = part.filename.filter(|f| !f.is_empty())?;
            if part.data.is_empty() {
                return None;
            }
            Some(UploadedFile {
                field: part.name.unwrap_or_default(),
                filename,
                content_type: part
                    .content_type
                    .unwrap_or_else(|| "application/octet-stream".to_owned()),
                data: part.data,
            })
        })
        .collect()
}

fn disposition_param(value: &str, key: &str) -> Option<String> {
    value
        .split(';')
        .filter_map(|p| p.trim().split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case(key))
        .map(|(_, v)| v.trim().trim_matches('"').to_owned())
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

fn skip_crlf(body: &[u8], at: usize) -> usize {
    if body[at..].starts_with(b"\r\n") { at + 2 } else { at }
}
