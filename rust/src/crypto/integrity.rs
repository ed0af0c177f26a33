//! Digest and message authentication helpers. Each operation comes in two
//! shapes: `*_digest` returns the raw bytes, `*_hex` the lowercase hex string.

use std::fmt;
use std::fs;
use std::path::Path;

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;
use zeroize::Zeroize;

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("application key not configured: {0}")]
    ConfigurationMissing(String),
    #[error("key source unreadable: {0}")]
    KeySourceUnreadable(String),
    #[error("hmac failed: {0}")]
    HashingPrimitiveFailure(String),
}

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Produces a raw SHA-256 digest of the provided bytes.
pub fn sha256_digest(data: impl AsRef<[u8]>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data.as_ref());
    hasher.finalize().into()
}

/// Returns the hexadecimal representation of a SHA-256 digest.
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(sha256_digest(data))
}

/// Produces a raw SHA-512 digest of the provided bytes.
pub fn sha512_digest(data: impl AsRef<[u8]>) -> [u8; 64] {
    let mut hasher = Sha512::new();
    hasher.update(data.as_ref());
    let mut out = [0u8; 64];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Returns the hexadecimal representation of a SHA-512 digest.
pub fn sha512_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(sha512_digest(data))
}

/// The application-wide secret used as the HMAC key. Never empty.
#[derive(Clone)]
pub struct ApplicationKey {
    bytes: Vec<u8>,
}

impl ApplicationKey {
    /// Wraps raw key bytes, rejecting an empty key.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, IntegrityError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(IntegrityError::ConfigurationMissing(
                "application key is empty".to_string(),
            ));
        }
        Ok(Self { bytes })
    }

    /// Reads the key from an environment variable, used verbatim.
    pub fn from_env_var(var: &str) -> Result<Self, IntegrityError> {
        let value = std::env::var(var)
            .map_err(|e| IntegrityError::ConfigurationMissing(format!("{var}: {e}")))?;
        Self::new(value)
    }

    /// Reads the key from a file, ignoring surrounding whitespace.
    pub fn from_key_file(path: &Path) -> Result<Self, IntegrityError> {
        let mut content = fs::read_to_string(path)
            .map_err(|e| IntegrityError::KeySourceUnreadable(format!("{}: {e}", path.display())))?;
        let key = Self::new(content.trim());
        content.zeroize();
        key
    }

    /// Raw key bytes for the MAC primitives.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for ApplicationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApplicationKey(<redacted>)")
    }
}

impl Drop for ApplicationKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

/// Generates an HMAC-SHA256 tag for the provided data.
pub fn hmac_sha256_digest(
    key: &ApplicationKey,
    data: impl AsRef<[u8]>,
) -> Result<[u8; 32], IntegrityError> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| IntegrityError::HashingPrimitiveFailure(format!("{e}")))?;
    mac.update(data.as_ref());
    Ok(mac.finalize().into_bytes().into())
}

/// Returns the hexadecimal representation of an HMAC-SHA256 tag.
pub fn hmac_sha256_hex(key: &ApplicationKey, data: impl AsRef<[u8]>) -> Result<String, IntegrityError> {
    hmac_sha256_digest(key, data).map(hex::encode)
}

/// Generates an HMAC-SHA512 tag for the provided data.
pub fn hmac_sha512_digest(
    key: &ApplicationKey,
    data: impl AsRef<[u8]>,
) -> Result<[u8; 64], IntegrityError> {
    let mut mac = HmacSha512::new_from_slice(key.as_bytes())
        .map_err(|e| IntegrityError::HashingPrimitiveFailure(format!("{e}")))?;
    mac.update(data.as_ref());
    let mut out = [0u8; 64];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// Returns the hexadecimal representation of an HMAC-SHA512 tag.
pub fn hmac_sha512_hex(key: &ApplicationKey, data: impl AsRef<[u8]>) -> Result<String, IntegrityError> {
    hmac_sha512_digest(key, data).map(hex::encode)
}
