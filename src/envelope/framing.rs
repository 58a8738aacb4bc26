//! Conversion between the two wire framings of an encrypted credential.
//!
//! - **split fields**: [`EncryptedSecret`] with separate `nonce`,
//!   `ciphertext`, `auth_tag`, `encrypted_dek`, and `key_id`.
//! - **concatenated buffer**: one `encrypted_data` blob plus one
//!   `encrypted_key` blob, where
//!
//! ```text
//! encrypted_data[0..12]          nonce
//! encrypted_data[12..len-16]     ciphertext (at least 1 byte)
//! encrypted_data[len-16..len]    auth tag
//! ```
//!
//! Boundaries are never inferred: buffers shorter than 29 bytes are
//! rejected before any slicing.

use super::EncryptedSecret;
use crate::crypto::{NONCE_LEN, TAG_LEN};
use crate::errors::{CryptoOp, Result, VaultError};

/// Smallest valid `encrypted_data`: nonce + 1 ciphertext byte + tag.
pub const MIN_FRAMED_LEN: usize = NONCE_LEN + 1 + TAG_LEN;

/// Concatenated-buffer form used at the service boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramedSecret {
    pub encrypted_data: Vec<u8>,
    pub encrypted_key: Vec<u8>,
}

impl EncryptedSecret {
    /// Split fields -> `nonce || ciphertext || tag` and the wrapped key.
    pub fn to_framed(&self) -> FramedSecret {
        let mut encrypted_data =
            Vec::with_capacity(self.nonce.len() + self.ciphertext.len() + self.auth_tag.len());
        encrypted_data.extend_from_slice(&self.nonce);
        encrypted_data.extend_from_slice(&self.ciphertext);
        encrypted_data.extend_from_slice(&self.auth_tag);

        FramedSecret {
            encrypted_data,
            encrypted_key: self.encrypted_dek.clone(),
        }
    }

    /// Concatenated buffer -> split fields.
    ///
    /// `key_id` is not carried by the concatenated framing and must be
    /// supplied by the caller.
    pub fn from_framed(encrypted_data: &[u8], encrypted_key: &[u8], key_id: &str) -> Result<Self> {
        if encrypted_data.len() < MIN_FRAMED_LEN {
            return Err(VaultError::decryption(
                CryptoOp::Frame,
                format!(
                    "encrypted data must be at least {MIN_FRAMED_LEN} bytes, got {}",
                    encrypted_data.len()
                ),
            ));
        }
        if encrypted_key.is_empty() {
            return Err(VaultError::decryption(CryptoOp::Frame, "encrypted key is empty"));
        }

        let tag_start = encrypted_data.len() - TAG_LEN;
        Ok(Self {
            encrypted_dek: encrypted_key.to_vec(),
            nonce: encrypted_data[..NONCE_LEN].to_vec(),
            ciphertext: encrypted_data[NONCE_LEN..tag_start].to_vec(),
            auth_tag: encrypted_data[tag_start..].to_vec(),
            key_id: key_id.to_string(),
        })
    }
}

impl FramedSecret {
    pub fn into_secret(self, key_id: &str) -> Result<EncryptedSecret> {
        EncryptedSecret::from_framed(&self.encrypted_data, &self.encrypted_key, key_id)
    }
}
