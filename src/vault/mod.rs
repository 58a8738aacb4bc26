//! Vault module: the credential service and its rotation protocol.
//!
//! - `CredentialService` is the entry point for create / read / update /
//!   rotate / delete (`service`)
//! - `RotationManager` installs new values as versions (`rotation`)

pub mod rotation;
pub mod service;

use tokio_util::sync::CancellationToken;

pub use rotation::RotationManager;
pub use service::CredentialService;

/// Who is calling, on behalf of which tenant, and how to abort the call.
#[derive(Debug, Clone)]
pub struct AccessContext {
    pub tenant_id: String,
    /// Recorded as `accessed_by` / `created_by` in audit rows.
    pub actor: String,
    pub cancel: CancellationToken,
}

impl AccessContext {
    pub fn new(tenant_id: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            actor: actor.into(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}
