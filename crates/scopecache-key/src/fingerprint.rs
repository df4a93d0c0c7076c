//! Parameter fingerprints
//!
//! Provides [`Fingerprint`], a strongly-typed 32-byte Blake3 digest of a
//! parameter object's canonical form. Deep-equal parameters produce equal
//! fingerprints regardless of property order.

use crate::canonical;
use serde::Serialize;
use serde_json::Value;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// A 32-byte fingerprint (Blake3 over canonical JSON)
///
/// Immutable and cheap to clone (Copy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Create a fingerprint from raw bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Underlying bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Fingerprint a JSON value
    #[inline]
    #[must_use]
    pub fn of_value(value: &Value) -> Self {
        let text = canonical::canonical_string(value);
        Self::new(*blake3::hash(text.as_bytes()).as_bytes())
    }

    /// Fingerprint any serializable value
    ///
    /// # Errors
    /// Returns error if serialization fails
    #[inline]
    pub fn of<T: Serialize + ?Sized>(value: &T) -> Result<Self, FingerprintError> {
        let json = serde_json::to_value(value)?;
        Ok(Self::of_value(&json))
    }

    /// Short string representation (first 16 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }

    /// Create fingerprint from byte slice
    ///
    /// # Errors
    /// Returns error if slice length is not exactly 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, FingerprintError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| FingerprintError::InvalidLength {
            expected: 32,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }
}

impl Serialize for Fingerprint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Errors that can occur when working with fingerprints
#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    /// Invalid digest length
    #[error("invalid fingerprint length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Hex encoding error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fingerprint_ignores_property_order() {
        let a = Fingerprint::of_value(&json!({"query": {"only": ["name"], "filter": []}, "x": 1}));
        let b = Fingerprint::of_value(&json!({"x": 1, "query": {"filter": [], "only": ["name"]}}));
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_differs_for_different_values() {
        let a = Fingerprint::of_value(&json!({"page": 1}));
        let b = Fingerprint::of_value(&json!({"page": 2}));
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_display_and_parse() {
        let fp = Fingerprint::of_value(&json!({"a": 1}));
        let parsed: Fingerprint = fp.to_string().parse().unwrap();
        assert_eq!(fp, parsed);
    }

    #[test]
    fn fingerprint_short_is_prefix() {
        let fp = Fingerprint::of_value(&json!([1, 2, 3]));
        assert_eq!(fp.short().len(), 16);
        assert!(fp.to_string().starts_with(&fp.short()));
    }

    #[test]
    fn fingerprint_from_slice_invalid_length() {
        let result = Fingerprint::from_slice(&[0u8; 31]);
        assert!(matches!(
            result,
            Err(FingerprintError::InvalidLength { expected: 32, actual: 31 })
        ));
    }

    #[test]
    fn fingerprint_of_serializable() {
        let fp = Fingerprint::of(&vec!["a", "b"]).unwrap();
        assert_eq!(fp, Fingerprint::of_value(&json!(["a", "b"])));
    }
}
