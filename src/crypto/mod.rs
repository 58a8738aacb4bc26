//! Cryptographic primitives for the vault.
//!
//! This module provides:
//! - AES-256-GCM seal and open, detached and combined layouts (`cipher`)
//! - Zeroize-on-drop key buffers and HKDF wrapping-key derivation (`keys`)

pub mod cipher;
pub mod keys;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{seal, open, DataKey, ...};
pub use cipher::{open, open_combined, seal, seal_combined, Sealed, NONCE_LEN, TAG_LEN};
pub use keys::{derive_wrapping_key, DataKey, MasterKey, KEY_LEN};
