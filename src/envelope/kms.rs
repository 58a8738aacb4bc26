//! Envelope encryption with data keys issued by a key provider.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{
    assemble, open_payload, seal_payload, serialize_payload, until_cancelled, CredentialData,
    EncryptedSecret, EncryptionService,
};
use crate::errors::{CryptoOp, ProviderError, Result, VaultError};
use crate::kms::{validate_key_id, DataKeyCache, EncryptionContext, GeneratedDataKey, KeyProvider};

/// KMS-backed [`EncryptionService`].
pub struct KmsEnvelopeService {
    provider: Arc<dyn KeyProvider>,
    cache: Option<Arc<DataKeyCache>>,
    key_id: String,
}

impl KmsEnvelopeService {
    /// Build a service that requests DEKs under `key_id`.
    pub fn new(provider: Arc<dyn KeyProvider>, key_id: impl Into<String>) -> Result<Self> {
        let key_id = key_id.into();
        validate_key_id(&key_id)?;
        Ok(Self {
            provider,
            cache: None,
            key_id,
        })
    }

    /// Reuse issued DEKs through `cache` until they expire.
    pub fn with_cache(mut self, cache: Arc<DataKeyCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache(&self) -> Option<&Arc<DataKeyCache>> {
        self.cache.as_ref()
    }

    /// Fetch a DEK from the cache, or from the provider on a miss.
    ///
    /// No cache lock is held while the provider call is in flight.
    async fn data_key(
        &self,
        context: &EncryptionContext,
        cancel: &CancellationToken,
    ) -> Result<GeneratedDataKey> {
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(&self.key_id, context)) {
            debug!(key_id = %self.key_id, "data key cache hit");
            return Ok(hit);
        }

        let issued = until_cancelled(
            cancel,
            self.provider.generate_data_key(&self.key_id, context),
        )
        .await??;

        if let Some(cache) = &self.cache {
            cache.put(&self.key_id, context, &issued);
        }
        Ok(issued)
    }
}

#[async_trait]
impl EncryptionService for KmsEnvelopeService {
    fn backend(&self) -> &'static str {
        "kms"
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn encrypt(
        &self,
        tenant_id: &str,
        data: &CredentialData,
        cancel: &CancellationToken,
    ) -> Result<EncryptedSecret> {
        if cancel.is_cancelled() {
            return Err(VaultError::Cancelled);
        }

        let plaintext = serialize_payload(data)?;
        let context = EncryptionContext::for_tenant(tenant_id);
        let dek = self.data_key(&context, cancel).await?;

        let sealed = seal_payload(&dek.plaintext, &plaintext)?;

        debug!(
            tenant_id = %tenant_id,
            key_id = %self.key_id,
            provider = self.provider.name(),
            "encrypted credential payload"
        );
        Ok(assemble(sealed, dek.wrapped.clone(), &self.key_id))
    }

    async fn decrypt(
        &self,
        tenant_id: &str,
        secret: &EncryptedSecret,
        cancel: &CancellationToken,
    ) -> Result<CredentialData> {
        if cancel.is_cancelled() {
            return Err(VaultError::Cancelled);
        }
        secret.check_shape()?;

        let context = EncryptionContext::for_tenant(tenant_id);
        let dek = until_cancelled(
            cancel,
            self.provider.decrypt_data_key(&secret.encrypted_dek, &context),
        )
        .await?
        .map_err(|e| match e {
            ProviderError::UnwrapFailed(reason) => {
                VaultError::decryption(CryptoOp::UnwrapDataKey, reason)
            }
            other => VaultError::Provider(other),
        })?;

        let data = open_payload(&dek, secret)?;
        debug!(tenant_id = %tenant_id, key_id = %secret.key_id, "decrypted credential payload");
        Ok(data)
    }
}
