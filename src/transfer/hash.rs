//! Content hashing for change detection.
//!
//! By hashing the serialized JSON of a record we can tell an unchanged
//! re-import apart from a real conflict without comparing every field.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Compute a SHA256 hash of a serializable value.
///
/// The value is serialized to JSON, then hashed, giving a deterministic
/// fingerprint of its content.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized to JSON.
pub fn content_hash<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let json = serde_json::to_vec(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&json);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Whether two values have identical content.
///
/// Values that cannot be serialized never compare equal.
#[must_use]
pub fn same_content<T: Serialize>(a: &T, b: &T) -> bool {
    match (content_hash(a), content_hash(b)) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}
