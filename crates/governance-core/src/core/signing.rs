// crates/governance-core/src/core/signing.rs
// ============================================================================
// Module: Signing Authorities
// Description: Ed25519 manifest signatures and HMAC event-chain MACs.
// Purpose: Sign and verify canonical bytes under stable key identities.
// Dependencies: base64, ed25519-dalek, hmac, sha2, subtle
// ============================================================================

//! ## Overview
//! Two signing authorities back the registry: asymmetric Ed25519 signatures
//! over canonical manifest bytes, and an HMAC-SHA256 shared secret that chains
//! event journal entries. Keys are identified by a stable [`KeyId`] recorded
//! in the manifest; signing requests against revoked keys are rejected.
//! Verification runs on every publish and on journal replay.
//!
//! Security posture: signatures and key identifiers arrive from untrusted
//! inputs; comparisons are constant-time. See `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::Signer as _;
use ed25519_dalek::SigningKey;
use ed25519_dalek::VerifyingKey;
use hmac::Hmac;
use hmac::Mac;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::core::identifiers::KeyId;

// ============================================================================
// SECTION: Signature Types
// ============================================================================

/// Signature algorithms supported by the registry.
///
/// # Invariants
/// - Wire form is the lowercase algorithm label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureAlgorithm {
    /// Ed25519 detached signatures (manifests).
    Ed25519,
    /// HMAC-SHA256 (event chain).
    HmacSha256,
}

impl SignatureAlgorithm {
    /// Returns the stable label for the algorithm.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ed25519 => "ed25519",
            Self::HmacSha256 => "hmac_sha256",
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detached signature over canonical bytes.
///
/// # Invariants
/// - `value` is standard base64 of the raw signature bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Identifier of the signing key.
    pub key_id: KeyId,
    /// Signature algorithm.
    pub algorithm: SignatureAlgorithm,
    /// Base64-encoded signature bytes.
    pub value: String,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Signing and verification errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Messages never embed key material.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SigningError {
    /// Key identifier is not registered.
    #[error("unknown signing key: {0}")]
    UnknownKey(KeyId),
    /// Key has been revoked and must not sign.
    #[error("revoked signing key: {0}")]
    RevokedKey(KeyId),
    /// Key material could not be decoded.
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),
    /// Signature bytes could not be decoded.
    #[error("malformed signature: {0}")]
    MalformedSignature(String),
}

// ============================================================================
// SECTION: Signing Authority
// ============================================================================

/// Abstraction over asymmetric signing authorities.
pub trait SigningAuthority: Send + Sync {
    /// Signs canonical bytes under the identified key.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError`] when the key is unknown or revoked.
    fn sign(&self, bytes: &[u8], key_id: &KeyId) -> Result<Signature, SigningError>;

    /// Verifies a detached signature against canonical bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError`] when the key is unknown or the signature bytes
    /// are malformed. A well-formed but wrong signature yields `Ok(false)`.
    fn verify(&self, bytes: &[u8], signature: &Signature) -> Result<bool, SigningError>;
}

// ============================================================================
// SECTION: Ed25519 Signer
// ============================================================================

/// Ed25519 signing authority over a key ring.
///
/// # Invariants
/// - Revoked keys never sign; verification against them still succeeds so
///   previously published manifests remain checkable.
#[derive(Default)]
pub struct Ed25519Signer {
    /// Private signing keys by identifier.
    signers: BTreeMap<KeyId, SigningKey>,
    /// Public verification keys by identifier.
    verifiers: BTreeMap<KeyId, VerifyingKey>,
    /// Revoked key identifiers.
    revoked: BTreeSet<KeyId>,
}

impl Ed25519Signer {
    /// Creates an empty key ring.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a signing key from a base64-encoded 32-byte seed.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::InvalidKeyMaterial`] when the seed does not
    /// decode to exactly 32 bytes.
    pub fn add_signing_key(
        &mut self,
        key_id: KeyId,
        seed_base64: &str,
    ) -> Result<(), SigningError> {
        let seed = BASE64
            .decode(seed_base64)
            .map_err(|err| SigningError::InvalidKeyMaterial(err.to_string()))?;
        let seed: [u8; 32] = seed
            .try_into()
            .map_err(|_| SigningError::InvalidKeyMaterial("seed must be 32 bytes".to_string()))?;
        let signing = SigningKey::from_bytes(&seed);
        self.verifiers.insert(key_id.clone(), signing.verifying_key());
        self.signers.insert(key_id, signing);
        Ok(())
    }

    /// Registers a verification-only key from base64-encoded public key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::InvalidKeyMaterial`] when the value does not
    /// decode to a valid Ed25519 public key.
    pub fn add_verifying_key(
        &mut self,
        key_id: KeyId,
        public_base64: &str,
    ) -> Result<(), SigningError> {
        let raw = BASE64
            .decode(public_base64)
            .map_err(|err| SigningError::InvalidKeyMaterial(err.to_string()))?;
        let raw: [u8; 32] = raw.try_into().map_err(|_| {
            SigningError::InvalidKeyMaterial("public key must be 32 bytes".to_string())
        })?;
        let verifying = VerifyingKey::from_bytes(&raw)
            .map_err(|err| SigningError::InvalidKeyMaterial(err.to_string()))?;
        self.verifiers.insert(key_id, verifying);
        Ok(())
    }

    /// Marks a key as revoked; subsequent signing requests are rejected.
    pub fn revoke(&mut self, key_id: KeyId) {
        self.revoked.insert(key_id);
    }

    /// Returns whether a key is registered for verification.
    #[must_use]
    pub fn knows(&self, key_id: &KeyId) -> bool {
        self.verifiers.contains_key(key_id)
    }
}

impl SigningAuthority for Ed25519Signer {
    fn sign(&self, bytes: &[u8], key_id: &KeyId) -> Result<Signature, SigningError> {
        if self.revoked.contains(key_id) {
            return Err(SigningError::RevokedKey(key_id.clone()));
        }
        let signing =
            self.signers.get(key_id).ok_or_else(|| SigningError::UnknownKey(key_id.clone()))?;
        let signature = signing.sign(bytes);
        Ok(Signature {
            key_id: key_id.clone(),
            algorithm: SignatureAlgorithm::Ed25519,
            value: BASE64.encode(signature.to_bytes()),
        })
    }

    fn verify(&self, bytes: &[u8], signature: &Signature) -> Result<bool, SigningError> {
        let verifying = self
            .verifiers
            .get(&signature.key_id)
            .ok_or_else(|| SigningError::UnknownKey(signature.key_id.clone()))?;
        let raw = BASE64
            .decode(&signature.value)
            .map_err(|err| SigningError::MalformedSignature(err.to_string()))?;
        let decoded = ed25519_dalek::Signature::from_slice(&raw)
            .map_err(|err| SigningError::MalformedSignature(err.to_string()))?;
        Ok(verifying.verify_strict(bytes, &decoded).is_ok())
    }
}

// ============================================================================
// SECTION: Event Chain MAC
// ============================================================================

/// HMAC-SHA256 type alias for the event chain.
type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 authority for event-chain links.
///
/// # Invariants
/// - The secret is loaded once at startup and never serialized.
#[derive(Clone)]
pub struct EventChainMac {
    /// Keyed MAC prototype cloned per link computation.
    prototype: HmacSha256,
}

impl EventChainMac {
    /// Creates a chain MAC authority from the shared secret bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::InvalidKeyMaterial`] when the secret is empty.
    pub fn new(secret: &[u8]) -> Result<Self, SigningError> {
        if secret.is_empty() {
            return Err(SigningError::InvalidKeyMaterial(
                "event chain secret must not be empty".to_string(),
            ));
        }
        let prototype = HmacSha256::new_from_slice(secret)
            .map_err(|err| SigningError::InvalidKeyMaterial(err.to_string()))?;
        Ok(Self {
            prototype,
        })
    }

    /// Computes the chain link `HMAC(secret, prev_hmac || canonical_bytes)`.
    #[must_use]
    pub fn chain_link(&self, prev_hmac_hex: &str, canonical_bytes: &[u8]) -> String {
        let mut mac = self.prototype.clone();
        mac.update(prev_hmac_hex.as_bytes());
        mac.update(canonical_bytes);
        let digest = mac.finalize().into_bytes();
        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest {
            out.push(char::from_digit(u32::from(byte >> 4), 16).unwrap_or('0'));
            out.push(char::from_digit(u32::from(byte & 0x0f), 16).unwrap_or('0'));
        }
        out
    }

    /// Verifies a chain link in constant time.
    #[must_use]
    pub fn verify_link(
        &self,
        prev_hmac_hex: &str,
        canonical_bytes: &[u8],
        expected_hex: &str,
    ) -> bool {
        let computed = self.chain_link(prev_hmac_hex, canonical_bytes);
        computed.as_bytes().ct_eq(expected_hex.as_bytes()).into()
    }
}

impl fmt::Debug for EventChainMac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChainMac").finish_non_exhaustive()
    }
}
