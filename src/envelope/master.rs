//! Envelope encryption under a fixed local master key.
//!
//! For environments without a KMS. DEKs are generated locally and wrapped
//! as `dek_nonce (12) || AES-GCM(master, DEK) || tag (16)`, with the
//! tenant encryption context as associated data.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{
    assemble, open_payload, seal_payload, serialize_payload, CredentialData, EncryptedSecret,
    EncryptionService,
};
use crate::crypto::{cipher, DataKey, MasterKey, KEY_LEN, NONCE_LEN, TAG_LEN};
use crate::errors::{CryptoOp, Result, VaultError};
use crate::kms::EncryptionContext;

/// Exact size of a master-key-wrapped DEK.
const WRAPPED_DEK_LEN: usize = NONCE_LEN + KEY_LEN + TAG_LEN;

/// Master-key-backed [`EncryptionService`].
pub struct MasterKeyEnvelopeService {
    master_key: MasterKey,
    key_id: String,
}

impl MasterKeyEnvelopeService {
    /// `key_id` is only a label recorded on ciphertexts (e.g. `"master-v1"`).
    pub fn new(master_key: MasterKey, key_id: impl Into<String>) -> Self {
        Self {
            master_key,
            key_id: key_id.into(),
        }
    }

    fn wrap(&self, dek: &DataKey, context: &EncryptionContext) -> Result<Vec<u8>> {
        cipher::seal_combined(
            self.master_key.as_bytes(),
            dek.as_bytes(),
            &context.canonical_bytes(),
        )
        .map_err(|e| VaultError::encryption(CryptoOp::WrapDataKey, e))
    }

    fn unwrap(&self, wrapped: &[u8], context: &EncryptionContext) -> Result<DataKey> {
        if wrapped.len() != WRAPPED_DEK_LEN {
            return Err(VaultError::decryption(
                CryptoOp::UnwrapDataKey,
                format!(
                    "wrapped data key must be {WRAPPED_DEK_LEN} bytes, got {}",
                    wrapped.len()
                ),
            ));
        }

        let plain = cipher::open_combined(
            self.master_key.as_bytes(),
            wrapped,
            &context.canonical_bytes(),
        )
        .map_err(|e| VaultError::decryption(CryptoOp::UnwrapDataKey, e))?;

        DataKey::from_slice(&plain).map_err(|e| VaultError::decryption(CryptoOp::UnwrapDataKey, e))
    }
}

#[async_trait]
impl EncryptionService for MasterKeyEnvelopeService {
    fn backend(&self) -> &'static str {
        "master-key"
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

        let dek = DataKey::generate().map_err(|e| VaultError::encryption(CryptoOp::GenerateDataKey, e))?;
        let encrypted_dek = self.wrap(&dek, &context)?;
        let sealed = seal_payload(&dek, &plaintext)?;

        debug!(tenant_id = %tenant_id, key_id = %self.key_id, "encrypted credential payload");
        Ok(assemble(sealed, encrypted_dek, &self.key_id))
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
        let dek = self.unwrap(&secret.encrypted_dek, &context)?;
        open_payload(&dek, secret)
    }
}
