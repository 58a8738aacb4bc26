//! Audit trail: per-access log rows and rotation records.
//!
//! Both tables are append-only. Access-log writes outside a rotation
//! transaction are best-effort: a failure is logged and the primary
//! operation carries on.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::errors::{Result, VaultError};
use crate::store::CredentialStore;

/// Kind of access recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    Read,
    Update,
    Rotate,
    Delete,
}

impl AccessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Update => "update",
            Self::Rotate => "rotate",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessType {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "read" => Ok(Self::Read),
            "update" => Ok(Self::Update),
            "rotate" => Ok(Self::Rotate),
            "delete" => Ok(Self::Delete),
            other => Err(VaultError::Serialization(format!(
                "unknown access type '{other}'"
            ))),
        }
    }
}

/// A stored access-log row.
#[derive(Debug, Clone, Serialize)]
pub struct AccessLogEntry {
    pub id: i64,
    pub credential_id: Uuid,
    pub tenant_id: String,
    pub accessed_by: String,
    pub access_type: AccessType,
    pub accessed_at: DateTime<Utc>,
    pub success: bool,
    pub error_message: Option<String>,
}

/// An access-log row about to be written.
#[derive(Debug, Clone)]
pub struct NewAccessLog {
    pub credential_id: Uuid,
    pub tenant_id: String,
    pub accessed_by: String,
    pub access_type: AccessType,
    pub success: bool,
    pub error_message: Option<String>,
}

impl NewAccessLog {
    pub fn succeeded(
        credential_id: Uuid,
        tenant_id: &str,
        accessed_by: &str,
        access_type: AccessType,
    ) -> Self {
        Self {
            credential_id,
            tenant_id: tenant_id.to_string(),
            accessed_by: accessed_by.to_string(),
            access_type,
            success: true,
            error_message: None,
        }
    }

    /// `error` is rendered through its `Display`, which never carries
    /// secret material.
    pub fn failed(
        credential_id: Uuid,
        tenant_id: &str,
        accessed_by: &str,
        access_type: AccessType,
        error: &VaultError,
    ) -> Self {
        Self {
            success: false,
            error_message: Some(error.to_string()),
            ..Self::succeeded(credential_id, tenant_id, accessed_by, access_type)
        }
    }
}

/// Record of one completed rotation.
#[derive(Debug, Clone, Serialize)]
pub struct RotationAuditEntry {
    pub id: i64,
    pub credential_id: Uuid,
    pub tenant_id: String,
    pub previous_key_id: Option<String>,
    pub new_key_id: String,
    pub previous_version: Option<i64>,
    pub new_version: i64,
    pub rotated_by: String,
    pub reason: Option<String>,
    pub rotated_at: DateTime<Utc>,
}

/// Write an access-log row, logging instead of failing on error.
pub async fn record_access(store: &dyn CredentialStore, entry: NewAccessLog) {
    let credential_id = entry.credential_id;
    let access_type = entry.access_type;
    if let Err(e) = store.log_access(entry).await {
        warn!(
            %credential_id,
            access_type = access_type.as_str(),
            error = %e,
            "failed to write access log"
        );
    }
}
