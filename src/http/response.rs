//! HTTP/1.1 response and its wire encoding.

use bytes::{BufMut, Bytes, BytesMut};

use super::{Headers, StatusCode, header};

/// An HTTP response.
///
/// [`into_bytes`](Self::into_bytes) is deterministic: the same status,
/// headers, and body always encode to the same bytes.
///
/// ```
/// use rttp_cache::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok)
///     .header("Content-Type", "application/json")
///     .text(r#"{"status":"ok"}"#);
///
/// let wire = response.into_bytes();
/// let text = std::str::from_utf8(&wire).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 15\r\n"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    pub(crate) fn from_parts(status: StatusCode, headers: Headers, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Appends a header; repeated names are kept.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Bytes::from(body.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_parts(self) -> (StatusCode, Headers, Bytes) {
        (self.status, self.headers, self.body)
    }

    /// Encodes status line, headers in order, then `Content-Length` and the
    /// body. A non-empty body without a `Content-Type` is sent as UTF-8 text.
    pub fn into_bytes(self) -> BytesMut {
        let Self {
            status,
            mut headers,
            body,
        } = self;

        if !body.is_empty() && !headers.contains(header::CONTENT_TYPE) {
            headers.insert(header::CONTENT_TYPE, "text/plain; charset=utf-8");
        }
        headers.remove(header::CONTENT_LENGTH);

        let mut buf = BytesMut::with_capacity(64 + headers.len() * 48 + body.len());
        buf.put(format!("HTTP/1.1 {status}\r\n").as_bytes());
        buf.put(headers.to_string().as_bytes());
        buf.put(format!("{}: {}\r\n\r\n", header::CONTENT_LENGTH, body.len()).as_bytes());
        buf.put(body);
        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}
