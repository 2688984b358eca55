//! HTTP/1.1 request, parsed with [`httparse`] or assembled in code.

use std::collections::HashMap;

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete, more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// An HTTP request as seen by a cached handler.
///
/// ```
/// use rttp_cache::http::{Method, Request};
///
/// let raw = b"GET /report?year=2024 HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let (parsed, _) = Request::parse(raw).unwrap();
/// let built = Request::new(Method::Get, "/report?year=2024").header("Host", "localhost");
///
/// assert_eq!(parsed.path(), built.path());
/// assert_eq!(parsed.query_param("year").as_deref(), Some("2024"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    headers: Headers,
    body: Bytes,
}

impl Request {
    const MAX_HEADERS: usize = 64;

    /// A request for `target`, which may carry a `?query`.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = split_target(target);
        Self {
            method,
            path,
            query,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Parses the head of `buf`. Everything after the blank line becomes the
    /// body. Returns the request and the offset at which the body starts.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut slots = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw = httparse::Request::new(&mut slots);

        let body_offset = match raw.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = Method::from(raw.method.ok_or(RequestError::MissingField { field: "method" })?);
        let target = raw.path.ok_or(RequestError::MissingField { field: "path" })?;

        let mut request = Self::new(method, target);
        for field in raw.headers.iter() {
            // Non UTF-8 values cannot be keyed on; skip them.
            if let Ok(value) = std::str::from_utf8(field.value) {
                request.headers.insert(field.name, value);
            }
        }
        request.body = Bytes::copy_from_slice(&buf[body_offset..]);

        Ok((request, body_offset))
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// First value of query parameter `key`, with `+` read as a space.
    pub fn query_param(&self, key: &str) -> Option<String> {
        self.query_params().remove(key)
    }

    pub fn query_params(&self) -> HashMap<String, String> {
        let mut params = HashMap::new();
        for pair in self.query.as_deref().unwrap_or("").split('&') {
            if pair.is_empty() {
                continue;
            }
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            params
                .entry(k.replace('+', " "))
                .or_insert_with(|| v.replace('+', " "));
        }
        params
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

fn split_target(target: &str) -> (String, Option<String>) {
    match target.split_once('?') {
        Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
        None => (target.to_owned(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, offset) = Request::parse(raw).unwrap();
        assert_eq!(req.method(), &Method::Get);
        assert_eq!(req.path(), "/");
        assert_eq!(req.query(), None);
        assert_eq!(req.headers().get("host"), Some("localhost"));
        assert_eq!(offset, raw.len());
        assert!(req.body().is_empty());
    }

    #[test]
    fn parse_query_and_body() {
        let raw = b"POST /search?q=rust+cache&page=2&q=ignored HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let (req, offset) = Request::parse(raw).unwrap();
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query(), Some("q=rust+cache&page=2&q=ignored"));
        assert_eq!(req.query_param("q").as_deref(), Some("rust cache"));
        assert_eq!(req.query_param("page").as_deref(), Some("2"));
        assert_eq!(req.query_param("missing"), None);
        assert_eq!(&raw[offset..], b"hello");
        assert_eq!(req.body().as_ref(), b"hello");
    }

    #[test]
    fn incomplete_request() {
        let raw = b"GET / HTTP/1.1\r\nHost:";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }

    #[test]
    fn malformed_request() {
        let raw = b"GET / HTTP/9\r\n\r\n";
        assert!(matches!(Request::parse(raw), Err(RequestError::Parse(_))));
    }

    #[test]
    fn built_request_matches_parsed() {
        let req = Request::new(Method::from("REPORT"), "/a/b?x=1")
            .header("Accept", "text/csv")
            .with_body("q");
        assert_eq!(req.method().as_str(), "REPORT");
        assert_eq!(req.path(), "/a/b");
        assert_eq!(req.query_param("x").as_deref(), Some("1"));
        assert_eq!(req.headers().get("accept"), Some("text/csv"));
        assert_eq!(req.body().as_ref(), b"q");
    }
}
