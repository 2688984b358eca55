//! Value codec: typed values to and from the bytes kept in the store.
//!
//! Every stored value carries a one-line type header followed by its payload:
//!
//! ```text
//! long\n-42
//! string\nhello
//! seq<double>\n3:1.5,3:inf,
//! record:app::User\n{"id":7,"name":"ada"}
//! ```
//!
//! Sequences frame each element's own payload as `<len>:<payload>,`, so an
//! element keeps exactly the encoding it has on its own.
//!
//! The header lets [`decode`] tell a corrupt payload
//! ([`CacheError::Deserialization`]) apart from a caller asking for the wrong
//! type ([`CacheError::TypeMismatch`]).

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{CacheError, CacheResult};

mod tag;

pub use tag::TypeTag;

const HEADER_END: u8 = b'\n';

/// A value that can live in a named cache.
///
/// Scalars, [`String`], [`Bytes`] and `Vec<T>` are covered out of the box.
/// Structured records opt in with an empty impl and get a JSON payload tagged
/// with their Rust type name:
///
/// ```
/// use rttp_cache::codec::CacheValue;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// impl CacheValue for User {}
/// ```
///
/// Override [`type_tag`](Self::type_tag) to pin a name that survives moving
/// the type between modules.
pub trait CacheValue: Serialize + DeserializeOwned {
    /// The tag written in front of every stored payload of this type.
    fn type_tag() -> TypeTag {
        TypeTag::Record(std::any::type_name::<Self>().to_owned())
    }

    /// Encodes the value body (without the header).
    ///
    /// The default JSON payload is read back before it is returned: JSON has
    /// no non-finite floats, so a record holding `NaN` or `inf` would
    /// otherwise be written in a form that can never be decoded.
    fn to_payload(&self) -> CacheResult<Vec<u8>> {
        let serialization = |reason: String| CacheError::Serialization {
            type_tag: Self::type_tag().to_string(),
            reason,
        };
        let payload = serde_json::to_vec(self).map_err(|e| serialization(e.to_string()))?;
        serde_json::from_slice::<Self>(&payload)
            .map_err(|e| serialization(format!("payload would not read back: {e}")))?;
        Ok(payload)
    }

    /// Decodes a value body (without the header).
    fn from_payload(payload: &[u8]) -> CacheResult<Self> {
        serde_json::from_slice(payload).map_err(deserialization::<Self>)
    }
}

fn deserialization<T: CacheValue>(reason: impl fmt::Display) -> CacheError {
    CacheError::Deserialization {
        type_tag: T::type_tag().to_string(),
        reason: reason.to_string(),
    }
}

fn payload_text<T: CacheValue>(payload: &[u8]) -> CacheResult<&str> {
    std::str::from_utf8(payload).map_err(deserialization::<T>)
}

// Scalars are kept as plain text so they stay readable with redis-cli.
macro_rules! text_scalar {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(
            impl CacheValue for $ty {
                fn type_tag() -> TypeTag {
                    TypeTag::$tag
                }

                fn to_payload(&self) -> CacheResult<Vec<u8>> {
                    Ok(self.to_string().into_bytes())
                }

                fn from_payload(payload: &[u8]) -> CacheResult<Self> {
                    payload_text::<Self>(payload)?
                        .parse::<$ty>()
                        .map_err(deserialization::<Self>)
                }
            }
        )*
    };
}

text_scalar! {
    bool => Bool,
    i32 => Int,
    i64 => Long,
    u64 => ULong,
    f64 => Double,
}

impl CacheValue for String {
    fn type_tag() -> TypeTag {
        TypeTag::String
    }

    fn to_payload(&self) -> CacheResult<Vec<u8>> {
        Ok(self.as_bytes().to_vec())
    }

    fn from_payload(payload: &[u8]) -> CacheResult<Self> {
        payload_text::<Self>(payload).map(str::to_owned)
    }
}

impl CacheValue for Bytes {
    fn type_tag() -> TypeTag {
        TypeTag::Bytes
    }

    fn to_payload(&self) -> CacheResult<Vec<u8>> {
        Ok(self.to_vec())
    }

    fn from_payload(payload: &[u8]) -> CacheResult<Self> {
        Ok(Bytes::copy_from_slice(payload))
    }
}

impl<T: CacheValue> CacheValue for Vec<T> {
    fn type_tag() -> TypeTag {
        TypeTag::Seq(Box::new(T::type_tag()))
    }

    fn to_payload(&self) -> CacheResult<Vec<u8>> {
        let mut out = Vec::new();
        for item in self {
            let payload = item.to_payload()?;
            out.extend_from_slice(payload.len().to_string().as_bytes());
            out.push(b':');
            out.extend_from_slice(&payload);
            out.push(b',');
        }
        Ok(out)
    }

    fn from_payload(mut payload: &[u8]) -> CacheResult<Self> {
        let mut items = Vec::new();
        while !payload.is_empty() {
            let colon = payload
                .iter()
                .position(|&b| b == b':')
                .ok_or_else(|| deserialization::<Self>("element without a length"))?;
            let len = std::str::from_utf8(&payload[..colon])
                .ok()
                .and_then(|digits| digits.parse::<usize>().ok())
                .ok_or_else(|| deserialization::<Self>("malformed element length"))?;
            let rest = &payload[colon + 1..];
            if rest.len() <= len || rest[len] != b',' {
                return Err(deserialization::<Self>("truncated element"));
            }
            items.push(T::from_payload(&rest[..len])?);
            payload = &rest[len + 1..];
        }
        Ok(items)
    }
}

/// Encodes `value` into its stored representation.
///
/// # Errors
///
/// [`CacheError::Serialization`] if the payload cannot be produced, e.g. a
/// record containing a map with non-string keys.
pub fn encode<T: CacheValue>(value: &T) -> CacheResult<Vec<u8>> {
    let tag = T::type_tag().to_string();
    let payload = value.to_payload()?;

    let mut raw = Vec::with_capacity(tag.len() + 1 + payload.len());
    raw.extend_from_slice(tag.as_bytes());
    raw.push(HEADER_END);
    raw.extend_from_slice(&payload);
    Ok(raw)
}

/// Decodes stored bytes as a `T`.
///
/// # Errors
///
/// - [`CacheError::TypeMismatch`]: the entry was written for a type `T`
///   cannot be read as (see [`TypeTag::accepts`]).
/// - [`CacheError::Deserialization`]: the header is missing or unknown, or
///   the payload does not parse.
pub fn decode<T: CacheValue>(raw: &[u8]) -> CacheResult<T> {
    let (found, payload) = split_header(raw).map_err(deserialization::<T>)?;
    let expected = T::type_tag();
    if !expected.accepts(&found) {
        return Err(CacheError::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        });
    }
    T::from_payload(payload)
}

/// Reads only the type header of a stored value.
pub fn peek_tag(raw: &[u8]) -> CacheResult<TypeTag> {
    split_header(raw)
        .map(|(tag, _)| tag)
        .map_err(|reason| CacheError::Deserialization {
            type_tag: "unknown".to_owned(),
            reason,
        })
}

fn split_header(raw: &[u8]) -> Result<(TypeTag, &[u8]), String> {
    let end = raw
        .iter()
        .position(|&b| b == HEADER_END)
        .ok_or_else(|| "missing type header".to_owned())?;
    let header = std::str::from_utf8(&raw[..end]).map_err(|e| e.to_string())?;
    let tag = TypeTag::from_str(header)?;
    Ok((tag, &raw[end + 1..]))
}

/// A raw stored entry, as seen through one namespace.
///
/// Returned by [`NamedCache::entry`](crate::cache::NamedCache::entry) for
/// inspection; normal reads go through [`decode`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// The key as the caller knows it, without the namespace prefix.
    pub key: String,
    /// Header and payload exactly as stored.
    pub raw_value: Vec<u8>,
    pub type_tag: TypeTag,
    /// `None` when the entry has no TTL.
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Decodes the entry as a `T`, with the same rules as [`decode`].
    pub fn decode<T: CacheValue>(&self) -> CacheResult<T> {
        decode(&self.raw_value)
    }
}
