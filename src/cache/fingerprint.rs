//! Deterministic cache fingerprints from named parameters.
//!
//! Parameters are sorted by key, rendered in a type-stable way, concatenated
//! as `key=value&key=value...`, and hashed. The result is a short hex string
//! used as a cache file name — a cache key, not a security boundary.

use std::fmt;

use sha2::{Digest, Sha256};

/// Fingerprint of the empty parameter set.
pub const EMPTY_FINGERPRINT: &str = "empty";

/// Number of hex characters in a fingerprint.
pub const FINGERPRINT_LEN: usize = 16;

/// A parameter value that can participate in a fingerprint.
///
/// A closed set keeps the rendering type-stable: primitives render directly,
/// byte strings render as a length tag (so large payloads don't blow up the
/// key string), and anything else must be rendered by the caller through
/// [`ParamValue::Tagged`] with an explicit type name.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    /// Fallback for non-primitive values: `<type-name>:<display>`.
    Tagged {
        type_name: String,
        display: String,
    },
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{}", s),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Bytes(b) => write!(f, "bytes:{}", b.len()),
            Self::Tagged { type_name, display } => write!(f, "{}:{}", type_name, display),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for ParamValue {
    fn from(v: u64) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&[u8]> for ParamValue {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(v.to_vec())
    }
}

/// Compute the fingerprint of a parameter list.
///
/// Insertion order does not matter: parameters are sorted by key before
/// hashing. The empty list maps to [`EMPTY_FINGERPRINT`].
pub fn fingerprint(params: &[(&str, ParamValue)]) -> String {
    if params.is_empty() {
        return EMPTY_FINGERPRINT.to_string();
    }

    let mut sorted: Vec<_> = params.iter().collect();
    sorted.sort_by_key(|(k, _)| *k);

    let mut canonical = String::new();
    for (i, (key, value)) in sorted.iter().enumerate() {
        if i > 0 {
            canonical.push('&');
        }
        canonical.push_str(key);
        canonical.push('=');
        canonical.push_str(&value.to_string());
    }

    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(&digest[..FINGERPRINT_LEN / 2])
}
