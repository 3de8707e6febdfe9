//! Canonical object hashing.
//!
//! Hashes must be independent of JSON whitespace and field order in any
//! received form, so values are re-serialized through [`serde_json::Value`]
//! before digesting: object keys sort lexicographically at every level,
//! giving a canonical byte encoding. The digest is blake3, rendered base58.

use serde::Serialize;

/// Canonical 32-byte digest of a serializable value.
pub fn object_hash<T: Serialize>(value: &T) -> [u8; 32] {
    let canonical = serde_json::to_value(value).expect("value should be encodable");
    let bytes = serde_json::to_vec(&canonical).expect("canonical value should be encodable");
    *blake3::hash(&bytes).as_bytes()
}

/// Canonical digest rendered as a base58 string.
pub fn object_hash_string<T: Serialize>(value: &T) -> String {
    hash_string(&object_hash(value))
}

/// Base58 rendering of raw digest bytes.
pub fn hash_string(digest: &[u8]) -> String {
    bs58::encode(digest).into_string()
}
