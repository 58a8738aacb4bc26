//! Key material wrappers and key-encryption-key derivation.
//!
//! Every plaintext key in the vault lives in one of two types:
//! - [`DataKey`]: a per-operation data encryption key (DEK) or a derived
//!   key-encryption key.
//! - [`MasterKey`]: the long-lived local master/root key.
//!
//! Both zero their bytes when dropped, so a key can never outlive the scope
//! that owns it, whichever way that scope is left.

use std::fmt;

use base64::Engine;
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::TryRngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::errors::{CipherError, ProviderError, Result, VaultError};

/// Length of every symmetric key in the vault (AES-256).
pub const KEY_LEN: usize = 32;

/// A 32-byte symmetric key that is zeroed on drop.
///
/// `Clone` produces an independent buffer: zeroing one copy never touches
/// another. The data-key cache relies on this.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DataKey {
    bytes: [u8; KEY_LEN],
}

impl DataKey {
    /// Wrap raw key bytes.
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Generate a fresh random key from the OS RNG.
    pub fn generate() -> std::result::Result<Self, CipherError> {
        let mut key = Self {
            bytes: [0u8; KEY_LEN],
        };
        OsRng
            .try_fill_bytes(&mut key.bytes)
            .map_err(|_| CipherError::Rng)?;
        Ok(key)
    }

    /// Copy key bytes returned by a provider.
    ///
    /// Anything other than exactly 32 bytes is rejected; keys are never
    /// padded or truncated.
    pub fn from_slice(bytes: &[u8]) -> std::result::Result<Self, ProviderError> {
        if bytes.len() != KEY_LEN {
            return Err(ProviderError::InvalidKeySize {
                expected: KEY_LEN,
                actual: bytes.len(),
            });
        }
        let mut key = Self {
            bytes: [0u8; KEY_LEN],
        };
        key.bytes.copy_from_slice(bytes);
        Ok(key)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataKey([REDACTED])")
    }
}

/// A wrapper around a 32-byte master key that automatically zeroes
/// its memory when dropped.
///
/// Used directly by the master-key envelope backend, and as the root key
/// from which the local key provider derives per-key-id wrapping keys.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct MasterKey {
    bytes: [u8; KEY_LEN],
}

impl MasterKey {
    /// Create a new `MasterKey` from raw bytes.
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Decode a base64-encoded 32-byte key (the format of `credvault keygen`).
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let decoded = Zeroizing::new(
            base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| VaultError::Config(format!("master key is not valid base64: {e}")))?,
        );

        if decoded.len() != KEY_LEN {
            return Err(VaultError::Config(format!(
                "master key must be {KEY_LEN} bytes, got {}",
                decoded.len()
            )));
        }

        let mut key = Self {
            bytes: [0u8; KEY_LEN],
        };
        key.bytes.copy_from_slice(&decoded);
        Ok(key)
    }

    /// Generate a random master key and return it base64-encoded.
    pub fn generate_base64() -> Result<Zeroizing<String>> {
        let key = DataKey::generate()
            .map_err(|e| VaultError::encryption(crate::errors::CryptoOp::GenerateDataKey, e))?;
        Ok(Zeroizing::new(
            base64::engine::general_purpose::STANDARD.encode(key.as_bytes()),
        ))
    }

    /// Access the raw key bytes (e.g. to pass to HKDF or encryption).
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Derive the key-encryption key for a provider key id.
    pub fn derive_wrapping_key(&self, key_id: &str) -> std::result::Result<DataKey, ProviderError> {
        derive_wrapping_key(&self.bytes, key_id)
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

/// Derive a key-encryption key for `key_id` from a root key.
///
/// `info` is `"credvault-kek:<key_id>"`, so every key id gets an
/// independent wrapping key and compromising one wrapped DEK reveals
/// nothing about DEKs wrapped under other ids.
pub fn derive_wrapping_key(
    root: &[u8],
    key_id: &str,
) -> std::result::Result<DataKey, ProviderError> {
    let info = format!("credvault-kek:{key_id}");

    // The root key is already uniformly random, so no salt is needed.
    let hk = Hkdf::<Sha256>::new(None, root);

    let mut okm = DataKey::new([0u8; KEY_LEN]);
    hk.expand(info.as_bytes(), &mut okm.bytes)
        .map_err(|e| ProviderError::KeyDerivation(format!("HKDF expand failed: {e}")))?;

    Ok(okm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_slice_rejects_wrong_sizes() {
        assert!(DataKey::from_slice(&[7u8; 32]).is_ok());

        let err = DataKey::from_slice(&[7u8; 16]).unwrap_err();
        assert!(matches!(
            err,
            ProviderError::InvalidKeySize {
                expected: 32,
                actual: 16
            }
        ));
        assert!(DataKey::from_slice(&[7u8; 33]).is_err());
    }

    #[test]
    fn cloned_key_is_an_independent_buffer() {
        let original = DataKey::new([0x42u8; KEY_LEN]);
        let mut copy = original.clone();
        copy.zeroize();

        assert_eq!(copy.as_bytes(), &[0u8; KEY_LEN]);
        assert_eq!(original.as_bytes(), &[0x42u8; KEY_LEN]);
    }

    #[test]
    fn generated_keys_differ() {
        let a = DataKey::generate().unwrap();
        let b = DataKey::generate().unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn wrapping_keys_are_bound_to_key_id() {
        let root = MasterKey::new([0x99u8; KEY_LEN]);

        let a1 = root.derive_wrapping_key("tenant-keys/a").unwrap();
        let a2 = root.derive_wrapping_key("tenant-keys/a").unwrap();
        let b = root.derive_wrapping_key("tenant-keys/b").unwrap();

        assert_eq!(a1.as_bytes(), a2.as_bytes());
        assert_ne!(a1.as_bytes(), b.as_bytes());
    }

    #[test]
    fn master_key_base64_roundtrip() {
        let encoded = MasterKey::generate_base64().unwrap();
        let key = MasterKey::from_base64(&encoded).unwrap();
        assert_ne!(key.as_bytes(), &[0u8; KEY_LEN]);
    }

    #[test]
    fn master_key_rejects_short_or_invalid_input() {
        let short = base64::engine::general_purpose::STANDARD.encode([1u8; 16]);
        assert!(MasterKey::from_base64(&short).is_err());
        assert!(MasterKey::from_base64("not base64 !!").is_err());
    }

    #[test]
    fn debug_output_hides_key_bytes() {
        let key = DataKey::new([0xABu8; KEY_LEN]);
        let rendered = format!("{key:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("171"));
    }
}
