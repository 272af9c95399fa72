//! SHA-256 content addresses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as Sha2Digest, Sha256};

use crate::error::StateError;

/// SHA-256 digest used as a content address.
///
/// Rendered as 64 lowercase hex characters on the wire and in refs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 32]);

impl ObjectId {
    /// Compute the SHA-256 id of `data`.
    pub fn for_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hash);
        Self(bytes)
    }

    /// Return the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded string (64 lowercase chars).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short form (first 8 hex chars), for messages and logs.
    pub fn short(&self) -> String {
        self.to_hex().chars().take(8).collect()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short())
    }
}

impl FromStr for ObjectId {
    type Err = StateError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| StateError::InvalidObjectId(s.to_string()))?;
        if bytes.len() != 32 {
            return Err(StateError::InvalidObjectId(s.to_string()));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

// Serialized as the hex string so ids stay readable in refs, audit rows
// and commit metadata.
impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let id = ObjectId::for_bytes(b"hello world");
        let hex = id.to_string();
        assert_eq!(hex.len(), 64);
        let parsed: ObjectId = hex.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_invalid_hex() {
        assert!("not-valid-hex".parse::<ObjectId>().is_err());
    }

    #[test]
    fn rejects_wrong_length() {
        assert!("abcd".parse::<ObjectId>().is_err());
    }

    #[test]
    fn deterministic() {
        assert_eq!(ObjectId::for_bytes(b"state"), ObjectId::for_bytes(b"state"));
        assert_ne!(ObjectId::for_bytes(b"a"), ObjectId::for_bytes(b"b"));
    }

    #[test]
    fn serde_uses_hex_string() {
        let id = ObjectId::for_bytes(b"x");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.to_hex()));
        let back: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
