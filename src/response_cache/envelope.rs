use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::codec::{CacheValue, TypeTag};
use crate::error::{CacheError, CacheResult};
use crate::http::{Headers, Response, StatusCode, header};

const ENVELOPE_TAG: &str = "rttp.ResponseEnvelope";

/// One cached HTTP response.
///
/// Built once on a miss by [`capture`](Self::capture), which fixes the ETag
/// and Expires headers. Replays never recompute them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    status: u16,
    #[serde(with = "hex")]
    body: Vec<u8>,
    headers: Vec<(String, String)>,
    computed_at: DateTime<Utc>,
}

impl CacheValue for ResponseEnvelope {
    fn type_tag() -> TypeTag {
        TypeTag::Record(ENVELOPE_TAG.to_owned())
    }
}

impl ResponseEnvelope {
    /// Freezes `response` as computed at `now`, replacing any ETag or
    /// Expires the handler set.
    pub fn capture(response: Response, ttl: Duration, now: DateTime<Utc>) -> Self {
        let (status, mut headers, body) = response.into_parts();

        headers.set(header::ETAG, entity_tag(&body));
        headers.set(header::EXPIRES, http_date(expires_at(now, ttl)));

        Self {
            status: status.as_u16(),
            body: body.to_vec(),
            headers: headers.into_iter().collect(),
            computed_at: now,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn etag(&self) -> Option<&str> {
        self.header(header::ETAG)
    }

    pub fn expires(&self) -> Option<&str> {
        self.header(header::EXPIRES)
    }

    pub fn computed_at(&self) -> DateTime<Utc> {
        self.computed_at
    }

    /// Rebuilds the response exactly as it was captured.
    ///
    /// # Errors
    ///
    /// [`CacheError::Deserialization`] if the stored status is not one this
    /// crate can send.
    pub fn to_response(&self) -> CacheResult<Response> {
        let status = self.status_code()?;
        let headers: Headers = self.headers.iter().cloned().collect();
        Ok(Response::from_parts(
            status,
            headers,
            Bytes::copy_from_slice(&self.body),
        ))
    }

    /// `304 Not Modified` carrying the stored validators and no body.
    pub fn not_modified(&self) -> Response {
        let mut response = Response::new(StatusCode::NotModified);
        for name in [header::ETAG, header::EXPIRES] {
            if let Some(value) = self.header(name) {
                response.headers_mut().insert(name, value);
            }
        }
        response
    }

    /// Whether an `If-None-Match` value names this envelope's ETag.
    ///
    /// Uses weak comparison, so `W/"x"` matches `"x"`.
    pub fn matches(&self, if_none_match: &str) -> bool {
        let Some(etag) = self.etag() else {
            return false;
        };
        if if_none_match.trim() == "*" {
            return true;
        }
        if_none_match
            .split(',')
            .map(str::trim)
            .map(|tag| tag.strip_prefix("W/").unwrap_or(tag))
            .any(|tag| tag == etag)
    }

    fn status_code(&self) -> CacheResult<StatusCode> {
        StatusCode::from_u16(self.status).ok_or_else(|| CacheError::Deserialization {
            type_tag: Self::type_tag().to_string(),
            reason: format!("unsupported status {}", self.status),
        })
    }
}

/// Strong validator for `body`: the quoted hex SHA-256 digest.
pub fn entity_tag(body: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Sha256::digest(body)))
}

/// IMF-fixdate, as used by `Expires` (RFC 9110 §5.6.7).
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn expires_at(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
