//! Stored credential records and the requests that create or change them.
//!
//! None of the persisted types ever hold plaintext: encrypted fields live in
//! an `Option<EncryptedSecret>` that is either fully populated or absent.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::CredentialType;
use crate::envelope::{CredentialData, EncryptedSecret};
use crate::errors::{Result, VaultError};

/// JSON object carried alongside a credential. Never secret.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Lifecycle state of a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialStatus {
    Active,
    Expired,
    Revoked,
}

impl CredentialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
        }
    }
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialStatus {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            "revoked" => Ok(Self::Revoked),
            other => Err(VaultError::Validation(format!(
                "unknown credential status '{other}' (expected active, expired, or revoked)"
            ))),
        }
    }
}

/// A tenant-scoped credential record.
#[derive(Debug, Clone)]
pub struct Credential {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub credential_type: CredentialType,
    pub status: CredentialStatus,
    /// `None` until a value has been stored.
    pub secret: Option<EncryptedSecret>,
    pub metadata: Metadata,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    pub fn has_value(&self) -> bool {
        self.secret.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == CredentialStatus::Expired || self.expires_at.is_some_and(|at| at <= now)
    }

    /// Refuse to hand out values of revoked or expired credentials.
    pub fn ensure_usable(&self, now: DateTime<Utc>) -> Result<()> {
        if self.status == CredentialStatus::Revoked {
            return Err(VaultError::Validation(format!(
                "credential '{}' has been revoked",
                self.name
            )));
        }
        if self.is_expired_at(now) {
            return Err(VaultError::Validation(format!(
                "credential '{}' has expired",
                self.name
            )));
        }
        Ok(())
    }

    /// Lightweight listing view without any encrypted bytes.
    pub fn summary(&self) -> CredentialSummary {
        CredentialSummary {
            id: self.id,
            name: self.name.clone(),
            credential_type: self.credential_type.clone(),
            status: self.status,
            has_value: self.has_value(),
            key_id: self.secret.as_ref().map(|s| s.key_id.clone()),
            expires_at: self.expires_at,
            last_used_at: self.last_used_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// What `list` and the CLI show about a credential.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialSummary {
    pub id: Uuid,
    pub name: String,
    pub credential_type: CredentialType,
    pub status: CredentialStatus,
    pub has_value: bool,
    pub key_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of a credential's append-only version history.
#[derive(Debug, Clone)]
pub struct CredentialVersion {
    pub credential_id: Uuid,
    pub tenant_id: String,
    pub version: i64,
    pub secret: EncryptedSecret,
    pub is_active: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub deactivated_by: Option<String>,
    pub rotation_reason: Option<String>,
}

/// Request to create a credential.
///
/// `data` is plaintext; it is validated and encrypted before anything is
/// stored.
#[derive(Clone)]
pub struct NewCredential {
    pub name: String,
    pub credential_type: CredentialType,
    pub data: Option<CredentialData>,
    pub metadata: Metadata,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewCredential {
    pub fn new(name: impl Into<String>, credential_type: CredentialType) -> Self {
        Self {
            name: name.into(),
            credential_type,
            data: None,
            metadata: Metadata::new(),
            expires_at: None,
        }
    }

    pub fn with_data(mut self, data: CredentialData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }
}

impl fmt::Debug for NewCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewCredential")
            .field("name", &self.name)
            .field("credential_type", &self.credential_type)
            .field("has_data", &self.data.is_some())
            .field("metadata", &self.metadata)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Partial update of a credential. `None` fields are left unchanged.
///
/// Supplying `data` stores a new version through the same transactional
/// path as a rotation.
#[derive(Clone, Default)]
pub struct CredentialUpdate {
    pub name: Option<String>,
    pub status: Option<CredentialStatus>,
    pub metadata: Option<Metadata>,
    /// `Some(None)` clears the expiry.
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub data: Option<CredentialData>,
}

impl CredentialUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.status.is_none()
            && self.metadata.is_none()
            && self.expires_at.is_none()
            && self.data.is_none()
    }

    /// Apply the non-secret fields to `credential`.
    pub(crate) fn apply_to(&self, credential: &mut Credential) {
        if let Some(name) = &self.name {
            credential.name = name.clone();
        }
        if let Some(status) = self.status {
            credential.status = status;
        }
        if let Some(metadata) = &self.metadata {
            credential.metadata = metadata.clone();
        }
        if let Some(expires_at) = self.expires_at {
            credential.expires_at = expires_at;
        }
    }
}

impl fmt::Debug for CredentialUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialUpdate")
            .field("name", &self.name)
            .field("status", &self.status)
            .field("metadata", &self.metadata)
            .field("expires_at", &self.expires_at)
            .field("has_data", &self.data.is_some())
            .finish()
    }
}

/// Filters for `list`. Empty filter lists everything in the tenant.
#[derive(Debug, Clone, Default)]
pub struct CredentialFilter {
    pub credential_type: Option<CredentialType>,
    pub status: Option<CredentialStatus>,
    pub name_prefix: Option<String>,
    pub limit: Option<usize>,
}

/// Reject names that cannot be shown or typed reliably.
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(VaultError::Validation("credential name cannot be empty".into()));
    }
    if name.len() > 255 {
        return Err(VaultError::Validation(
            "credential name cannot exceed 255 bytes".into(),
        ));
    }
    if name.chars().any(char::is_control) {
        return Err(VaultError::Validation(
            "credential name cannot contain control characters".into(),
        ));
    }
    Ok(())
}
