//! AES-256-GCM authenticated encryption.
//!
//! Each call to [`seal`] generates a fresh random 12-byte nonce from the
//! OS RNG. Nonces are never derived or counted: reusing a nonce under the
//! same GCM key destroys confidentiality, so the only way to get one is
//! [`generate_nonce`].
//!
//! Two layouts are produced:
//! - detached: `nonce`, `ciphertext` (same length as the plaintext) and a
//!   16-byte `tag`, kept as separate fields by the envelope layer;
//! - combined: `[ 12-byte nonce | ciphertext | 16-byte tag ]`, used to wrap
//!   data keys.

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::TryRngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::errors::CipherError;

/// Size of the AES-256-GCM nonce in bytes.
pub const NONCE_LEN: usize = 12;

/// Size of the AES-256-GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Output of [`seal`] with the tag split out.
#[derive(Clone)]
pub struct Sealed {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

/// Generate a random 12-byte nonce.
pub fn generate_nonce() -> Result<[u8; NONCE_LEN], CipherError> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|_| CipherError::Rng)?;
    Ok(nonce)
}

fn build_cipher(key: &[u8]) -> Result<Aes256Gcm, CipherError> {
    Aes256Gcm::new_from_slice(key).map_err(|_| CipherError::InvalidKeyLength(key.len()))
}

/// Encrypt `plaintext` under a 32-byte `key`, authenticating `aad`.
pub fn seal(key: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Sealed, CipherError> {
    let cipher = build_cipher(key)?;
    let nonce = generate_nonce()?;

    let mut buffer = plaintext.to_vec();
    let tag = match cipher.encrypt_in_place_detached(Nonce::from_slice(&nonce), aad, &mut buffer)
    {
        Ok(tag) => tag,
        Err(_) => {
            // The buffer may still hold plaintext.
            buffer.zeroize();
            return Err(CipherError::Authentication);
        }
    };

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(&tag);

    Ok(Sealed {
        nonce,
        ciphertext: buffer,
        tag: tag_bytes,
    })
}

/// Decrypt a detached ciphertext produced by [`seal`].
///
/// Fails closed: a wrong-size nonce or tag is rejected before any work,
/// and a tag mismatch returns an error without exposing any bytes.
pub fn open(
    key: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CipherError> {
    if nonce.len() != NONCE_LEN {
        return Err(CipherError::InvalidNonceLength(nonce.len()));
    }
    if tag.len() != TAG_LEN {
        return Err(CipherError::InvalidTagLength(tag.len()));
    }

    let cipher = build_cipher(key)?;

    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(nonce),
            aad,
            buffer.as_mut_slice(),
            GenericArray::from_slice(tag),
        )
        .map_err(|_| CipherError::Authentication)?;

    Ok(buffer)
}

/// Encrypt and return `nonce || ciphertext || tag` as one buffer.
pub fn seal_combined(key: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CipherError> {
    let sealed = seal(key, plaintext, aad)?;

    let mut output = Vec::with_capacity(NONCE_LEN + sealed.ciphertext.len() + TAG_LEN);
    output.extend_from_slice(&sealed.nonce);
    output.extend_from_slice(&sealed.ciphertext);
    output.extend_from_slice(&sealed.tag);
    Ok(output)
}

/// Decrypt a buffer produced by [`seal_combined`].
pub fn open_combined(
    key: &[u8],
    sealed: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CipherError> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(CipherError::Truncated(sealed.len()));
    }

    let (nonce, rest) = sealed.split_at(NONCE_LEN);
    let (ciphertext, tag) = rest.split_at(rest.len() - TAG_LEN);
    open(key, nonce, ciphertext, tag, aad)
}
