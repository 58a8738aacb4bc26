//! Key provider abstraction.
//!
//! A key provider issues data encryption keys (DEKs) and unwraps them
//! again. It is the only component that ever sees a key-encryption key:
//! the vault receives a plaintext DEK plus an opaque wrapped copy, uses the
//! plaintext once, and stores only the wrapped copy.
//!
//! Implementations may call out to a network KMS, so the trait is async.
//! The bundled [`LocalKeyProvider`] derives wrapping keys from a local root
//! key for environments without one.

pub mod cache;
pub mod local;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::crypto::DataKey;
use crate::errors::ProviderError;

pub use cache::DataKeyCache;
pub use local::LocalKeyProvider;

/// Non-secret data bound to a key-wrap operation.
///
/// Unwrapping must fail when the context differs from the one used at
/// wrap time. Entries are kept sorted so the canonical byte form is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncryptionContext(BTreeMap<String, String>);

impl EncryptionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// The context the envelope services bind every credential key to.
    pub fn for_tenant(tenant_id: &str) -> Self {
        Self::new()
            .with("purpose", "credential")
            .with("tenant_id", tenant_id)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Unambiguous byte encoding, used as AEAD associated data.
    ///
    /// Each key and value is length-prefixed so `{"a": "b=c"}` and
    /// `{"a=b": "c"}` never collide.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (k, v) in &self.0 {
            for part in [k, v] {
                out.extend_from_slice(&(part.len() as u32).to_be_bytes());
                out.extend_from_slice(part.as_bytes());
            }
        }
        out
    }
}

/// A freshly issued DEK: the plaintext for one use, the wrapped copy for storage.
#[derive(Debug)]
pub struct GeneratedDataKey {
    pub plaintext: DataKey,
    pub wrapped: Vec<u8>,
}

/// Client contract the vault requires from a key management service.
///
/// Implementations must be thread-safe (`Send + Sync`) to support
/// concurrent encryption operations.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Short name for logs (e.g. `"local"`).
    fn name(&self) -> &str;

    /// Issue a new 32-byte DEK under the key-encryption key `key_id`.
    ///
    /// # Errors
    ///
    /// `InvalidKeyId` for an empty or malformed id, `Unavailable` when the
    /// service cannot be reached, `InvalidKeySize` when the service returns
    /// a key of the wrong length.
    async fn generate_data_key(
        &self,
        key_id: &str,
        context: &EncryptionContext,
    ) -> Result<GeneratedDataKey, ProviderError>;

    /// Unwrap a DEK previously returned by [`KeyProvider::generate_data_key`].
    ///
    /// # Errors
    ///
    /// `UnwrapFailed` when the blob was wrapped under another key or
    /// context, or has been tampered with.
    async fn decrypt_data_key(
        &self,
        wrapped: &[u8],
        context: &EncryptionContext,
    ) -> Result<DataKey, ProviderError>;
}

/// Check a key id: 1–256 chars of `[A-Za-z0-9/_:.-]`.
pub fn validate_key_id(key_id: &str) -> Result<(), ProviderError> {
    if key_id.is_empty() || key_id.len() > 256 {
        return Err(ProviderError::InvalidKeyId(key_id.to_string()));
    }
    if !key_id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'/' | b'_' | b':' | b'.' | b'-'))
    {
        return Err(ProviderError::InvalidKeyId(key_id.to_string()));
    }
    Ok(())
}
