//! Type tags written in front of every stored payload.

use std::fmt;
use std::str::FromStr;

/// Identifies the type a stored payload was written as.
///
/// The text form is what appears in the store:
///
/// ```
/// use rttp_cache::codec::TypeTag;
///
/// let tag = TypeTag::Seq(Box::new(TypeTag::Long));
/// assert_eq!(tag.to_string(), "seq<long>");
/// assert_eq!("seq<long>".parse::<TypeTag>().unwrap(), tag);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    String,
    Bool,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    /// 64-bit unsigned integer.
    ULong,
    Double,
    Bytes,
    /// Homogeneous sequence.
    Seq(Box<TypeTag>),
    /// Structured record, identified by name.
    Record(String),
}

impl TypeTag {
    /// Returns `true` if a payload written under `stored` can be read as `self`.
    ///
    /// Identical tags always match. An `int` also reads as `long` or `double`,
    /// both of which hold every `int` exactly. A `long` does not read as
    /// `double`. Sequence tags must match exactly.
    pub fn accepts(&self, stored: &TypeTag) -> bool {
        match (self, stored) {
            (Self::Long, Self::Int) => true,
            (Self::Double, Self::Int) => true,
            (want, have) => want == have,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Long => f.write_str("long"),
            Self::ULong => f.write_str("ulong"),
            Self::Double => f.write_str("double"),
            Self::Bytes => f.write_str("bytes"),
            Self::Seq(inner) => write!(f, "seq<{inner}>"),
            Self::Record(name) => write!(f, "record:{name}"),
        }
    }
}

impl FromStr for TypeTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(name) = s.strip_prefix("record:") {
            if name.is_empty() {
                return Err("record tag without a name".to_owned());
            }
            return Ok(Self::Record(name.to_owned()));
        }
        if let Some(inner) = s.strip_prefix("seq<").and_then(|r| r.strip_suffix('>')) {
            return inner.parse().map(|tag| Self::Seq(Box::new(tag)));
        }
        Ok(match s {
            "string" => Self::String,
            "bool" => Self::Bool,
            "int" => Self::Int,
            "long" => Self::Long,
            "ulong" => Self::ULong,
            "double" => Self::Double,
            "bytes" => Self::Bytes,
            other => return Err(format!("unknown type tag `{other}`")),
        })
    }
}
