//! Versioned rotation of credential values.
//!
//! [`RotationManager`] loads the credential, validates the new payload
//! against the credential's *existing* type, and encrypts it. The store
//! then commits the new version, the live-field overwrite, and the audit
//! rows in a single transaction (see
//! [`CredentialStore::rotate_credential`]).

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::AccessContext;
use crate::audit::{self, AccessType, NewAccessLog};
use crate::envelope::{CredentialData, EncryptionService};
use crate::errors::{Result, VaultError};
use crate::store::{CredentialStore, FieldChanges, RotationOutcome, RotationRequest};

/// Re-encrypts credential values and records each one as a new version.
///
/// Written against the store and encryption traits only; the backend is
/// chosen by whoever constructs it.
pub struct RotationManager {
    store: Arc<dyn CredentialStore>,
    encryption: Arc<dyn EncryptionService>,
}

impl RotationManager {
    pub fn new(store: Arc<dyn CredentialStore>, encryption: Arc<dyn EncryptionService>) -> Self {
        Self { store, encryption }
    }

    /// Replace a credential's value with `new_data` as a new active version.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id, credential_id = %credential_id))]
    pub async fn rotate(
        &self,
        ctx: &AccessContext,
        credential_id: Uuid,
        new_data: &CredentialData,
        reason: Option<&str>,
    ) -> Result<RotationOutcome> {
        let outcome = self
            .install(ctx, credential_id, new_data, reason, AccessType::Rotate, None)
            .await?;
        info!(
            version = outcome.new_version,
            key_id = %outcome.new_key_id,
            "rotated credential"
        );
        Ok(outcome)
    }

    /// Shared by rotation and value-changing updates; `access_type` decides
    /// which audit rows the transaction appends. `fields` commit or roll
    /// back together with the new value.
    pub(crate) async fn install(
        &self,
        ctx: &AccessContext,
        credential_id: Uuid,
        new_data: &CredentialData,
        reason: Option<&str>,
        access_type: AccessType,
        fields: Option<FieldChanges>,
    ) -> Result<RotationOutcome> {
        let result = self
            .try_install(ctx, credential_id, new_data, reason, access_type, fields)
            .await;

        // The transaction has rolled back; the failure row is written on its own.
        // Unknown ids leave no audit rows.
        match &result {
            Ok(_) | Err(VaultError::NotFound(_)) => {}
            Err(e) => {
                warn!(access_type = access_type.as_str(), error = %e, "credential value change failed");
                audit::record_access(
                    self.store.as_ref(),
                    NewAccessLog::failed(credential_id, &ctx.tenant_id, &ctx.actor, access_type, e),
                )
                .await;
            }
        }
        result
    }

    async fn try_install(
        &self,
        ctx: &AccessContext,
        credential_id: Uuid,
        new_data: &CredentialData,
        reason: Option<&str>,
        access_type: AccessType,
        fields: Option<FieldChanges>,
    ) -> Result<RotationOutcome> {
        let current = self.store.get_by_id(&ctx.tenant_id, credential_id).await?;

        current.credential_type.validate(new_data)?;

        let secret = self
            .encryption
            .encrypt(&ctx.tenant_id, new_data, &ctx.cancel)
            .await?;

        self.store
            .rotate_credential(RotationRequest {
                tenant_id: ctx.tenant_id.clone(),
                credential_id,
                expected_type: current.credential_type,
                secret,
                actor: ctx.actor.clone(),
                reason: reason.map(str::to_string),
                access_type,
                fields,
            })
            .await
    }
}
