// crates/governance-core/src/core/hashing.rs
// ============================================================================
// Module: Canonical Hashing
// Description: RFC 8785 canonical JSON serialization and SHA-256 digests.
// Purpose: Provide the deterministic byte form used for hashing and signing.
// Dependencies: serde, serde_jcs, serde_json, sha2
// ============================================================================

//! ## Overview
//! Every payload and manifest is hashed over its canonical JSON byte form:
//! UTF-8, keys sorted lexicographically at every nesting level, no
//! insignificant whitespace, RFC 8785 numeric normalization. Two semantically
//! equal inputs therefore produce identical bytes and identical digests, and
//! canonicalization is idempotent. Manifest canonicalization additionally
//! rejects floating-point numbers and excludes the `signature` field so the
//! signable bytes never cover the signature itself.
//!
//! Security posture: hashed inputs are untrusted; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Hash Algorithm
// ============================================================================

/// Default hash algorithm for all registry digests.
pub const DEFAULT_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

/// Supported content hash algorithms.
///
/// # Invariants
/// - Wire form is the lowercase algorithm label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// SHA-256 (FIPS 180-4).
    Sha256,
}

impl HashAlgorithm {
    /// Returns the stable label for the algorithm.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Hash Digest
// ============================================================================

/// Content digest with its algorithm label.
///
/// # Invariants
/// - `value` is lowercase hexadecimal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HashDigest {
    /// Algorithm used to compute the digest.
    pub algorithm: HashAlgorithm,
    /// Lowercase hexadecimal digest value.
    pub value: String,
}

impl HashDigest {
    /// Creates a digest from raw bytes, hex-encoding them lowercase.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm, bytes: &[u8]) -> Self {
        Self {
            algorithm,
            value: hex_lower(bytes),
        }
    }
}

impl fmt::Display for HashDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.value)
    }
}

/// Encodes bytes as lowercase hexadecimal.
fn hex_lower(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(char::from_digit(u32::from(byte >> 4), 16).unwrap_or('0'));
        out.push(char::from_digit(u32::from(byte & 0x0f), 16).unwrap_or('0'));
    }
    out
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Canonicalization and hashing errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HashError {
    /// Canonical serialization failed (non-finite floats, invalid map keys).
    #[error("canonicalization failed: {0}")]
    Canonicalization(String),
    /// Canonical byte form exceeded the configured size limit.
    #[error("canonical form exceeds size limit: {actual} bytes (limit {limit})")]
    SizeLimitExceeded {
        /// Configured size limit in bytes.
        limit: usize,
        /// Actual canonical size in bytes.
        actual: usize,
    },
    /// Input contained a floating-point number where none is permitted.
    #[error("floating-point value forbidden at {path}")]
    FloatForbidden {
        /// JSON pointer to the offending value.
        path: String,
    },
}

// ============================================================================
// SECTION: Canonical Serialization
// ============================================================================

/// Serializes a value to RFC 8785 canonical JSON bytes.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when the value cannot be
/// canonicalized (for example non-finite floats).
pub fn canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Hashes raw bytes with the given algorithm.
#[must_use]
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> HashDigest {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            HashDigest::new(algorithm, &hasher.finalize())
        }
    }
}

/// Canonicalizes a value and hashes the canonical bytes.
///
/// # Errors
///
/// Returns [`HashError`] when canonical serialization fails.
pub fn hash_canonical_json<T: Serialize>(
    algorithm: HashAlgorithm,
    value: &T,
) -> Result<HashDigest, HashError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(hash_bytes(algorithm, &bytes))
}

/// Canonicalizes and hashes a value, enforcing a canonical size limit.
///
/// # Errors
///
/// Returns [`HashError::SizeLimitExceeded`] when the canonical form is larger
/// than `limit`, or [`HashError::Canonicalization`] when serialization fails.
pub fn hash_canonical_json_with_limit<T: Serialize>(
    algorithm: HashAlgorithm,
    value: &T,
    limit: usize,
) -> Result<HashDigest, HashError> {
    let bytes = canonical_json_bytes(value)?;
    if bytes.len() > limit {
        return Err(HashError::SizeLimitExceeded {
            limit,
            actual: bytes.len(),
        });
    }
    Ok(hash_bytes(algorithm, &bytes))
}

// ============================================================================
// SECTION: Float Rejection
// ============================================================================

/// Returns the JSON pointer of the first float found in `value`, if any.
#[must_use]
pub fn find_float(value: &Value) -> Option<String> {
    find_float_at(value, String::new())
}

/// Walks a JSON value iteratively looking for non-integer numbers.
fn find_float_at(root: &Value, root_path: String) -> Option<String> {
    let mut stack = vec![(root, root_path)];
    while let Some((value, path)) = stack.pop() {
        match value {
            Value::Number(number) => {
                if !number.is_i64() && !number.is_u64() {
                    return Some(if path.is_empty() {
                        "/".to_string()
                    } else {
                        path
                    });
                }
            }
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    stack.push((item, format!("{path}/{index}")));
                }
            }
            Value::Object(map) => {
                for (key, item) in map {
                    stack.push((item, format!("{path}/{key}")));
                }
            }
            Value::Null | Value::Bool(_) | Value::String(_) => {}
        }
    }
    None
}

/// Canonicalizes a value after rejecting floating-point numbers anywhere in it.
///
/// Used for manifests, where floats are disallowed outright.
///
/// # Errors
///
/// Returns [`HashError::FloatForbidden`] when any float is present, or
/// [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_bytes_no_floats<T: Serialize>(value: &T) -> Result<Vec<u8>, HashError> {
    let as_value = serde_json::to_value(value)
        .map_err(|err| HashError::Canonicalization(err.to_string()))?;
    if let Some(path) = find_float(&as_value) {
        return Err(HashError::FloatForbidden {
            path,
        });
    }
    canonical_json_bytes(&as_value)
}
