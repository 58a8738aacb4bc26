//! High-level credential operations.
//!
//! `CredentialService` ties the validator registry, the encryption service,
//! and the store together so callers work with plaintext payloads and never
//! touch key material or ciphertext layout.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{AccessContext, RotationManager};
use crate::audit::{self, AccessLogEntry, AccessType, NewAccessLog, RotationAuditEntry};
use crate::credential::{
    validate_name, Credential, CredentialFilter, CredentialStatus, CredentialSummary,
    CredentialType, CredentialTypeSchema, CredentialUpdate, CredentialVersion, NewCredential,
};
use crate::envelope::{CredentialData, EncryptionService};
use crate::errors::{Result, VaultError};
use crate::store::{CredentialStore, FieldChanges, RotationOutcome};

/// Credential vault façade.
pub struct CredentialService {
    store: Arc<dyn CredentialStore>,
    encryption: Arc<dyn EncryptionService>,
    rotation: RotationManager,
}

impl CredentialService {
    pub fn new(store: Arc<dyn CredentialStore>, encryption: Arc<dyn EncryptionService>) -> Self {
        let rotation = RotationManager::new(Arc::clone(&store), Arc::clone(&encryption));
        Self {
            store,
            encryption,
            rotation,
        }
    }

    pub fn encryption(&self) -> &Arc<dyn EncryptionService> {
        &self.encryption
    }

    pub fn rotation(&self) -> &RotationManager {
        &self.rotation
    }

    // ------------------------------------------------------------------
    // Create / read
    // ------------------------------------------------------------------

    /// Validate, encrypt, and store a new credential.
    ///
    /// A credential created with data starts at version 1; one created
    /// without data has no versions until its first rotation.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id, name = %request.name))]
    pub async fn create(&self, ctx: &AccessContext, request: NewCredential) -> Result<Credential> {
        validate_name(&request.name)?;

        let secret = match &request.data {
            Some(data) => {
                request.credential_type.validate(data)?;
                Some(
                    self.encryption
                        .encrypt(&ctx.tenant_id, data, &ctx.cancel)
                        .await?,
                )
            }
            None => None,
        };

        let now = Utc::now();
        let credential = Credential {
            id: Uuid::new_v4(),
            tenant_id: ctx.tenant_id.clone(),
            name: request.name,
            credential_type: request.credential_type,
            status: CredentialStatus::Active,
            secret,
            metadata: request.metadata,
            expires_at: request.expires_at,
            last_used_at: None,
            created_by: ctx.actor.clone(),
            created_at: now,
            updated_at: now,
        };

        self.store.create(&credential).await?;
        info!(
            credential_id = %credential.id,
            credential_type = %credential.credential_type,
            has_value = credential.has_value(),
            "created credential"
        );
        Ok(credential)
    }

    /// Decrypt and return a credential's current value.
    ///
    /// Every attempt on an existing credential is written to the access
    /// log. Revoked and expired credentials are refused.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id, credential_id = %id))]
    pub async fn get_value(&self, ctx: &AccessContext, id: Uuid) -> Result<CredentialData> {
        let credential = self.store.get_by_id(&ctx.tenant_id, id).await?;

        match self.decrypt_current(ctx, &credential).await {
            Ok(data) => {
                audit::record_access(
                    self.store.as_ref(),
                    NewAccessLog::succeeded(id, &ctx.tenant_id, &ctx.actor, AccessType::Read),
                )
                .await;
                if let Err(e) = self.store.touch_last_used(&ctx.tenant_id, id, Utc::now()).await {
                    warn!(error = %e, "failed to update last-used timestamp");
                }
                debug!("credential value read");
                Ok(data)
            }
            Err(e) => {
                audit::record_access(
                    self.store.as_ref(),
                    NewAccessLog::failed(id, &ctx.tenant_id, &ctx.actor, AccessType::Read, &e),
                )
                .await;
                Err(e)
            }
        }
    }

    /// Like [`get_value`](Self::get_value), addressed by name.
    pub async fn get_value_by_name(&self, ctx: &AccessContext, name: &str) -> Result<CredentialData> {
        let credential = self.store.get_by_name(&ctx.tenant_id, name).await?;
        self.get_value(ctx, credential.id).await
    }

    async fn decrypt_current(
        &self,
        ctx: &AccessContext,
        credential: &Credential,
    ) -> Result<CredentialData> {
        credential.ensure_usable(Utc::now())?;
        let secret = credential.secret.as_ref().ok_or_else(|| {
            VaultError::Validation(format!("credential '{}' has no value yet", credential.name))
        })?;
        self.encryption
            .decrypt(&ctx.tenant_id, secret, &ctx.cancel)
            .await
    }

    pub async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Credential> {
        self.store.get_by_id(tenant_id, id).await
    }

    pub async fn get_by_name(&self, tenant_id: &str, name: &str) -> Result<Credential> {
        self.store.get_by_name(tenant_id, name).await
    }

    pub async fn list(
        &self,
        tenant_id: &str,
        filter: &CredentialFilter,
    ) -> Result<Vec<CredentialSummary>> {
        let credentials = self.store.list(tenant_id, filter).await?;
        Ok(credentials.iter().map(Credential::summary).collect())
    }

    // ------------------------------------------------------------------
    // Change
    // ------------------------------------------------------------------

    /// Apply a partial update.
    ///
    /// New `data` is validated against the credential's current type and
    /// stored as a new version. Name/status/metadata/expiry changes that
    /// come with it are written in the same transaction, so a failure
    /// leaves nothing behind.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id, credential_id = %id))]
    pub async fn update(
        &self,
        ctx: &AccessContext,
        id: Uuid,
        update: CredentialUpdate,
    ) -> Result<Credential> {
        let mut credential = self.store.get_by_id(&ctx.tenant_id, id).await?;
        if update.is_empty() {
            return Ok(credential);
        }
        if let Some(name) = &update.name {
            validate_name(name)?;
        }

        let touches_fields = update.name.is_some()
            || update.status.is_some()
            || update.metadata.is_some()
            || update.expires_at.is_some();
        if touches_fields {
            update.apply_to(&mut credential);
            credential.updated_at = Utc::now();
        }

        if let Some(data) = &update.data {
            let fields = touches_fields.then(|| FieldChanges::of(&credential));
            self.rotation
                .install(ctx, id, data, None, AccessType::Update, fields)
                .await?;
        } else {
            let result = self.store.update(&credential).await;
            let entry = match &result {
                Ok(()) => {
                    NewAccessLog::succeeded(id, &ctx.tenant_id, &ctx.actor, AccessType::Update)
                }
                Err(e) => {
                    NewAccessLog::failed(id, &ctx.tenant_id, &ctx.actor, AccessType::Update, e)
                }
            };
            audit::record_access(self.store.as_ref(), entry).await;
            result?;
        }

        info!("updated credential");
        self.store.get_by_id(&ctx.tenant_id, id).await
    }

    /// Rotate to a new value; see [`RotationManager::rotate`].
    pub async fn rotate(
        &self,
        ctx: &AccessContext,
        id: Uuid,
        new_data: &CredentialData,
        reason: Option<&str>,
    ) -> Result<RotationOutcome> {
        self.rotation.rotate(ctx, id, new_data, reason).await
    }

    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id, credential_id = %id))]
    pub async fn delete(&self, ctx: &AccessContext, id: Uuid) -> Result<()> {
        // Existence check first so unknown ids leave no audit rows.
        self.store.get_by_id(&ctx.tenant_id, id).await?;

        let result = self.store.delete(&ctx.tenant_id, id).await;
        let entry = match &result {
            Ok(()) => NewAccessLog::succeeded(id, &ctx.tenant_id, &ctx.actor, AccessType::Delete),
            Err(e) => NewAccessLog::failed(id, &ctx.tenant_id, &ctx.actor, AccessType::Delete, e),
        };
        audit::record_access(self.store.as_ref(), entry).await;

        if result.is_ok() {
            info!("deleted credential");
        }
        result
    }

    // ------------------------------------------------------------------
    // History and introspection
    // ------------------------------------------------------------------

    /// Version history, newest first.
    pub async fn versions(&self, tenant_id: &str, id: Uuid) -> Result<Vec<CredentialVersion>> {
        self.store.get_versions(tenant_id, id).await
    }

    pub async fn active_version(&self, tenant_id: &str, id: Uuid) -> Result<CredentialVersion> {
        self.store.get_active_version(tenant_id, id).await
    }

    pub async fn access_logs(
        &self,
        tenant_id: &str,
        id: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<AccessLogEntry>> {
        self.store.get_access_logs(tenant_id, id, limit).await
    }

    pub async fn rotation_history(
        &self,
        tenant_id: &str,
        id: Uuid,
    ) -> Result<Vec<RotationAuditEntry>> {
        self.store.get_rotation_audit(tenant_id, id).await
    }

    pub fn credential_type_schema(&self, credential_type: &str) -> CredentialTypeSchema {
        CredentialType::parse(credential_type).schema()
    }

    pub fn all_credential_type_schemas(&self) -> Vec<CredentialTypeSchema> {
        CredentialType::all_schemas()
    }
}
