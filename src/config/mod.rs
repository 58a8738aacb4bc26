//! Configuration from `.credvault.toml` and the environment.

pub mod settings;

pub use settings::{Backend, EncryptionSetup, Settings};
