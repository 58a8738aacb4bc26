//! Credential records, their semantic types, and payload validation.

pub mod model;
pub mod types;

pub use model::{
    validate_name, Credential, CredentialFilter, CredentialStatus, CredentialSummary,
    CredentialUpdate, CredentialVersion, Metadata, NewCredential,
};
pub use types::{CredentialType, CredentialTypeSchema};
