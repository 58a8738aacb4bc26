//! Persistence contract for credentials, versions, and audit rows.
//!
//! Every method is scoped to a tenant; a row belonging to another tenant is
//! indistinguishable from a missing one. [`SqliteStore`] is the reference
//! implementation.

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::audit::{AccessLogEntry, AccessType, NewAccessLog, RotationAuditEntry};
use crate::credential::{
    Credential, CredentialFilter, CredentialStatus, CredentialType, CredentialVersion, Metadata,
};
use crate::envelope::EncryptedSecret;
use crate::errors::Result;

pub use sqlite::SqliteStore;

/// Everything the store needs to install a new value as the active version.
#[derive(Debug, Clone)]
pub struct RotationRequest {
    pub tenant_id: String,
    pub credential_id: Uuid,
    /// Type the value was validated against; the stored credential must
    /// still have it when the transaction runs.
    pub expected_type: CredentialType,
    pub secret: EncryptedSecret,
    pub actor: String,
    pub reason: Option<String>,
    /// `Rotate` also appends a rotation audit row; `Update` does not.
    pub access_type: AccessType,
    /// Non-secret fields written in the same transaction as the new value.
    pub fields: Option<FieldChanges>,
}

/// Full replacement values for a credential's non-secret fields.
#[derive(Debug, Clone)]
pub struct FieldChanges {
    pub name: String,
    pub status: CredentialStatus,
    pub metadata: Metadata,
    pub expires_at: Option<DateTime<Utc>>,
}

impl FieldChanges {
    pub fn of(credential: &Credential) -> Self {
        Self {
            name: credential.name.clone(),
            status: credential.status,
            metadata: credential.metadata.clone(),
            expires_at: credential.expires_at,
        }
    }
}

/// Result of a committed rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationOutcome {
    pub credential_id: Uuid,
    pub previous_version: Option<i64>,
    pub new_version: i64,
    pub previous_key_id: Option<String>,
    pub new_key_id: String,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a credential. When it carries a value, version 1 is recorded
    /// in the same transaction. Duplicate `(tenant, name)` is a `Conflict`.
    async fn create(&self, credential: &Credential) -> Result<()>;

    async fn get_by_id(&self, tenant_id: &str, id: Uuid) -> Result<Credential>;

    async fn get_by_name(&self, tenant_id: &str, name: &str) -> Result<Credential>;

    /// Persist non-secret fields (name, status, metadata, expiry).
    async fn update(&self, credential: &Credential) -> Result<()>;

    /// Remove a credential and its versions. Audit rows are kept.
    async fn delete(&self, tenant_id: &str, id: Uuid) -> Result<()>;

    async fn list(&self, tenant_id: &str, filter: &CredentialFilter) -> Result<Vec<Credential>>;

    /// Append a raw version row. The single-active-version rule still holds.
    async fn create_version(&self, version: &CredentialVersion) -> Result<()>;

    /// All versions, newest first.
    async fn get_versions(&self, tenant_id: &str, credential_id: Uuid)
        -> Result<Vec<CredentialVersion>>;

    async fn get_active_version(
        &self,
        tenant_id: &str,
        credential_id: Uuid,
    ) -> Result<CredentialVersion>;

    async fn log_access(&self, entry: NewAccessLog) -> Result<()>;

    /// Newest first. `credential_id = None` returns the whole tenant's log.
    async fn get_access_logs(
        &self,
        tenant_id: &str,
        credential_id: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<AccessLogEntry>>;

    /// Newest first.
    async fn get_rotation_audit(
        &self,
        tenant_id: &str,
        credential_id: Uuid,
    ) -> Result<Vec<RotationAuditEntry>>;

    /// Install `request.secret` as the new active version in one
    /// transaction: next version number, deactivate the old version, insert
    /// the new one, overwrite the live fields (plus `request.fields` when
    /// given), append the rotation audit row (for `Rotate`) and the
    /// access-log row. Nothing is visible unless every step succeeds.
    async fn rotate_credential(&self, request: RotationRequest) -> Result<RotationOutcome>;

    async fn touch_last_used(&self, tenant_id: &str, id: Uuid, at: DateTime<Utc>) -> Result<()>;
}
