//! In-process key provider backed by a local root key.
//!
//! Stands in for a network KMS: every key id gets its own wrapping key,
//! derived from the root with HKDF, and wrapped DEKs carry the key id in a
//! small header so unwrapping needs nothing but the blob and the context.
//!
//! Wrapped blob layout:
//!
//! ```text
//! [version: 1 byte][key_id_len: u16 BE][key_id][nonce: 12][sealed DEK: 32][tag: 16]
//! ```

use async_trait::async_trait;
use tracing::debug;

use super::{validate_key_id, EncryptionContext, GeneratedDataKey, KeyProvider};
use crate::crypto::{cipher, DataKey, MasterKey};
use crate::errors::ProviderError;

/// Current wrapped-blob format version.
const WRAP_VERSION: u8 = 1;

/// version + key_id_len
const HEADER_LEN: usize = 3;

/// Key provider that never leaves the process.
pub struct LocalKeyProvider {
    root: MasterKey,
}

impl LocalKeyProvider {
    pub fn new(root: MasterKey) -> Self {
        Self { root }
    }

    fn wrap(
        &self,
        key_id: &str,
        dek: &DataKey,
        context: &EncryptionContext,
    ) -> Result<Vec<u8>, ProviderError> {
        let kek = self.root.derive_wrapping_key(key_id)?;
        let sealed = cipher::seal_combined(kek.as_bytes(), dek.as_bytes(), &context.canonical_bytes())
            .map_err(|e| ProviderError::Unavailable(format!("wrap failed: {e}")))?;

        let id_len = u16::try_from(key_id.len())
            .map_err(|_| ProviderError::InvalidKeyId(key_id.to_string()))?;

        let mut blob = Vec::with_capacity(HEADER_LEN + key_id.len() + sealed.len());
        blob.push(WRAP_VERSION);
        blob.extend_from_slice(&id_len.to_be_bytes());
        blob.extend_from_slice(key_id.as_bytes());
        blob.extend_from_slice(&sealed);
        Ok(blob)
    }
}

/// Split a wrapped blob into its key id and sealed DEK.
fn parse_wrapped(wrapped: &[u8]) -> Result<(&str, &[u8]), ProviderError> {
    if wrapped.len() < HEADER_LEN {
        return Err(ProviderError::UnwrapFailed("wrapped key too short".into()));
    }
    if wrapped[0] != WRAP_VERSION {
        return Err(ProviderError::UnwrapFailed(format!(
            "unsupported wrapped key version {}",
            wrapped[0]
        )));
    }

    let id_len = usize::from(u16::from_be_bytes([wrapped[1], wrapped[2]]));
    let rest = &wrapped[HEADER_LEN..];
    if rest.len() < id_len {
        return Err(ProviderError::UnwrapFailed("wrapped key header truncated".into()));
    }

    let (id_bytes, sealed) = rest.split_at(id_len);
    let key_id = std::str::from_utf8(id_bytes)
        .map_err(|_| ProviderError::UnwrapFailed("key id is not valid UTF-8".into()))?;
    Ok((key_id, sealed))
}

#[async_trait]
impl KeyProvider for LocalKeyProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn generate_data_key(
        &self,
        key_id: &str,
        context: &EncryptionContext,
    ) -> Result<GeneratedDataKey, ProviderError> {
        validate_key_id(key_id)?;

        let plaintext = DataKey::generate()
            .map_err(|e| ProviderError::Unavailable(format!("cannot generate data key: {e}")))?;
        let wrapped = self.wrap(key_id, &plaintext, context)?;

        debug!(key_id = %key_id, "local provider issued data key");
        Ok(GeneratedDataKey { plaintext, wrapped })
    }

    async fn decrypt_data_key(
        &self,
        wrapped: &[u8],
        context: &EncryptionContext,
    ) -> Result<DataKey, ProviderError> {
        let (key_id, sealed) = parse_wrapped(wrapped)?;
        validate_key_id(key_id)?;

        let kek = self.root.derive_wrapping_key(key_id)?;
        let plain = cipher::open_combined(kek.as_bytes(), sealed, &context.canonical_bytes())
            .map_err(|e| ProviderError::UnwrapFailed(e.to_string()))?;

        DataKey::from_slice(&plain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(byte: u8) -> LocalKeyProvider {
        LocalKeyProvider::new(MasterKey::new([byte; 32]))
    }

    #[tokio::test]
    async fn generate_then_decrypt_returns_same_key() {
        let kms = provider(1);
        let ctx = EncryptionContext::for_tenant("acme");

        let issued = kms.generate_data_key("alias/creds", &ctx).await.unwrap();
        let unwrapped = kms.decrypt_data_key(&issued.wrapped, &ctx).await.unwrap();

        assert_eq!(issued.plaintext.as_bytes(), unwrapped.as_bytes());
    }

    #[tokio::test]
    async fn context_mismatch_fails() {
        let kms = provider(2);
        let issued = kms
            .generate_data_key("alias/creds", &EncryptionContext::for_tenant("acme"))
            .await
            .unwrap();

        let err = kms
            .decrypt_data_key(&issued.wrapped, &EncryptionContext::for_tenant("globex"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnwrapFailed(_)));
    }

    #[tokio::test]
    async fn other_root_key_cannot_unwrap() {
        let ctx = EncryptionContext::for_tenant("acme");
        let issued = provider(3)
            .generate_data_key("alias/creds", &ctx)
            .await
            .unwrap();

        assert!(provider(4)
            .decrypt_data_key(&issued.wrapped, &ctx)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn rewriting_the_key_id_header_fails() {
        let kms = provider(5);
        let ctx = EncryptionContext::new();
        let issued = kms.generate_data_key("key-a", &ctx).await.unwrap();

        let mut forged = issued.wrapped.clone();
        // "key-a" -> "key-b"; same length so the header still parses.
        let pos = HEADER_LEN + 4;
        forged[pos] = b'b';

        assert!(kms.decrypt_data_key(&forged, &ctx).await.is_err());
    }

    #[tokio::test]
    async fn rejects_invalid_key_ids_and_malformed_blobs() {
        let kms = provider(6);
        let ctx = EncryptionContext::new();

        assert!(matches!(
            kms.generate_data_key("", &ctx).await.unwrap_err(),
            ProviderError::InvalidKeyId(_)
        ));
        assert!(matches!(
            kms.decrypt_data_key(&[1, 0], &ctx).await.unwrap_err(),
            ProviderError::UnwrapFailed(_)
        ));
        assert!(matches!(
            kms.decrypt_data_key(&[9, 0, 1, b'k'], &ctx).await.unwrap_err(),
            ProviderError::UnwrapFailed(_)
        ));
    }
}
