//! Envelope encryption of credential payloads.
//!
//! Every payload is sealed under its own data encryption key (DEK); only a
//! wrapped copy of the DEK is stored next to the ciphertext. Two backends
//! implement [`EncryptionService`]:
//! - [`KmsEnvelopeService`]: DEKs come from a [`KeyProvider`](crate::kms::KeyProvider),
//!   optionally through a [`DataKeyCache`](crate::kms::DataKeyCache).
//! - [`MasterKeyEnvelopeService`]: DEKs are generated locally and wrapped
//!   under a fixed 32-byte master key.
//!
//! Plaintext DEKs are [`DataKey`] values and zero themselves on drop, on
//! every return path and when a future is cancelled mid-call.

pub mod framing;
pub mod kms;
pub mod master;

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use crate::crypto::{cipher, DataKey, Sealed, NONCE_LEN, TAG_LEN};
use crate::errors::{CryptoOp, Result, VaultError};

pub use framing::FramedSecret;
pub use kms::KmsEnvelopeService;
pub use master::MasterKeyEnvelopeService;

/// Plaintext credential payload. Never persisted.
pub type CredentialData = serde_json::Map<String, serde_json::Value>;

/// The stored form of one credential value, split into named fields.
///
/// `ciphertext` excludes the GCM tag, which lives in `auth_tag`.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedSecret {
    pub encrypted_dek: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub auth_tag: Vec<u8>,
    pub key_id: String,
}

impl EncryptedSecret {
    /// Reject malformed field sizes before any key is unwrapped.
    pub fn check_shape(&self) -> Result<()> {
        if self.nonce.len() != NONCE_LEN {
            return Err(VaultError::decryption(
                CryptoOp::Open,
                format!("nonce must be {NONCE_LEN} bytes, got {}", self.nonce.len()),
            ));
        }
        if self.auth_tag.len() != TAG_LEN {
            return Err(VaultError::decryption(
                CryptoOp::Open,
                format!("auth tag must be {TAG_LEN} bytes, got {}", self.auth_tag.len()),
            ));
        }
        if self.ciphertext.is_empty() {
            return Err(VaultError::decryption(CryptoOp::Open, "ciphertext is empty"));
        }
        if self.encrypted_dek.is_empty() {
            return Err(VaultError::decryption(
                CryptoOp::UnwrapDataKey,
                "encrypted data key is empty",
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for EncryptedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedSecret")
            .field("key_id", &self.key_id)
            .field("encrypted_dek_len", &self.encrypted_dek.len())
            .field("ciphertext_len", &self.ciphertext.len())
            .field("nonce_len", &self.nonce.len())
            .field("auth_tag_len", &self.auth_tag.len())
            .finish()
    }
}

/// Encrypt and decrypt credential payloads for a tenant.
///
/// The tenant id only feeds the encryption context that binds the wrapped
/// DEK; decrypting under a different tenant fails.
#[async_trait]
pub trait EncryptionService: Send + Sync {
    /// Backend name for logs and audit (`"kms"` or `"master-key"`).
    fn backend(&self) -> &'static str;

    /// Identifier recorded as `EncryptedSecret::key_id` on new ciphertexts.
    fn key_id(&self) -> &str;

    async fn encrypt(
        &self,
        tenant_id: &str,
        data: &CredentialData,
        cancel: &CancellationToken,
    ) -> Result<EncryptedSecret>;

    async fn decrypt(
        &self,
        tenant_id: &str,
        secret: &EncryptedSecret,
        cancel: &CancellationToken,
    ) -> Result<CredentialData>;

    /// Encrypt and return the concatenated-buffer framing.
    async fn encrypt_framed(
        &self,
        tenant_id: &str,
        data: &CredentialData,
        cancel: &CancellationToken,
    ) -> Result<FramedSecret> {
        let secret = self.encrypt(tenant_id, data, cancel).await?;
        Ok(secret.to_framed())
    }

    /// Decrypt `encrypted_data = nonce || ciphertext || tag` plus its wrapped key.
    async fn decrypt_framed(
        &self,
        tenant_id: &str,
        encrypted_data: &[u8],
        encrypted_key: &[u8],
        cancel: &CancellationToken,
    ) -> Result<CredentialData> {
        let secret = EncryptedSecret::from_framed(encrypted_data, encrypted_key, self.key_id())?;
        self.decrypt(tenant_id, &secret, cancel).await
    }
}

/// Serialize a payload into a buffer that is wiped on drop.
pub(crate) fn serialize_payload(data: &CredentialData) -> Result<Zeroizing<Vec<u8>>> {
    if data.is_empty() {
        return Err(VaultError::encryption(
            CryptoOp::Serialize,
            "credential data is empty",
        ));
    }
    serde_json::to_vec(data)
        .map(Zeroizing::new)
        .map_err(|_| VaultError::encryption(CryptoOp::Serialize, "payload is not serializable"))
}

/// Seal serialized payload bytes under a DEK with a fresh nonce.
pub(crate) fn seal_payload(dek: &DataKey, plaintext: &[u8]) -> Result<Sealed> {
    cipher::seal(dek.as_bytes(), plaintext, &[]).map_err(|e| VaultError::encryption(CryptoOp::Seal, e))
}

/// Recombine ciphertext and tag, open, and parse the payload.
///
/// Error messages never include decrypted bytes.
pub(crate) fn open_payload(dek: &DataKey, secret: &EncryptedSecret) -> Result<CredentialData> {
    let plaintext = cipher::open(
        dek.as_bytes(),
        &secret.nonce,
        &secret.ciphertext,
        &secret.auth_tag,
        &[],
    )
    .map_err(|e| VaultError::decryption(CryptoOp::Open, e))?;

    serde_json::from_slice::<CredentialData>(&plaintext).map_err(|_| {
        VaultError::decryption(CryptoOp::Deserialize, "payload is not a JSON object")
    })
}

/// Assemble an `EncryptedSecret` from a sealed payload and a wrapped DEK.
pub(crate) fn assemble(sealed: Sealed, encrypted_dek: Vec<u8>, key_id: &str) -> EncryptedSecret {
    EncryptedSecret {
        encrypted_dek,
        ciphertext: sealed.ciphertext,
        nonce: sealed.nonce.to_vec(),
        auth_tag: sealed.tag.to_vec(),
        key_id: key_id.to_string(),
    }
}

/// Race `fut` against `cancel`; a fired token wins ties.
pub(crate) async fn until_cancelled<F, T>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(VaultError::Cancelled),
        out = fut => Ok(out),
    }
}
