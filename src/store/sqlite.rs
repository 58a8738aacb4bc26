//! SQLite reference implementation of [`CredentialStore`].
//!
//! All statements run on `tokio-rusqlite`'s single background thread, and
//! multi-statement writes use `BEGIN IMMEDIATE` so a rotation holds the
//! write lock from its first read to commit. A partial unique index makes
//! two active versions of one credential unrepresentable.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use tokio_rusqlite::Connection;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{CredentialStore, FieldChanges, RotationOutcome, RotationRequest};
use crate::audit::{AccessLogEntry, AccessType, NewAccessLog, RotationAuditEntry};
use crate::credential::{
    Credential, CredentialFilter, CredentialStatus, CredentialType, CredentialVersion, Metadata,
};
use crate::envelope::EncryptedSecret;
use crate::errors::{Result, VaultError};

const SCHEMA: &str = "
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;

CREATE TABLE IF NOT EXISTS credentials (
    id              TEXT PRIMARY KEY,
    tenant_id       TEXT NOT NULL,
    name            TEXT NOT NULL,
    credential_type TEXT NOT NULL,
    status          TEXT NOT NULL CHECK (status IN ('active', 'expired', 'revoked')),
    encrypted_dek   BLOB,
    ciphertext      BLOB,
    nonce           BLOB,
    auth_tag        BLOB,
    key_id          TEXT,
    metadata        TEXT NOT NULL DEFAULT '{}',
    expires_at      TEXT,
    last_used_at    TEXT,
    created_by      TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    UNIQUE (tenant_id, name),
    CHECK (
        (encrypted_dek IS NULL AND ciphertext IS NULL AND nonce IS NULL
            AND auth_tag IS NULL AND key_id IS NULL)
        OR
        (encrypted_dek IS NOT NULL AND ciphertext IS NOT NULL AND nonce IS NOT NULL
            AND auth_tag IS NOT NULL AND key_id IS NOT NULL)
    )
);

CREATE TABLE IF NOT EXISTS credential_versions (
    credential_id   TEXT NOT NULL REFERENCES credentials(id) ON DELETE CASCADE,
    tenant_id       TEXT NOT NULL,
    version         INTEGER NOT NULL CHECK (version >= 1),
    encrypted_dek   BLOB NOT NULL,
    ciphertext      BLOB NOT NULL,
    nonce           BLOB NOT NULL,
    auth_tag        BLOB NOT NULL,
    key_id          TEXT NOT NULL,
    is_active       INTEGER NOT NULL,
    created_by      TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    deactivated_at  TEXT,
    deactivated_by  TEXT,
    rotation_reason TEXT,
    PRIMARY KEY (credential_id, version)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_credential_versions_one_active
    ON credential_versions (credential_id) WHERE is_active = 1;

CREATE TABLE IF NOT EXISTS access_logs (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    credential_id TEXT NOT NULL,
    tenant_id     TEXT NOT NULL,
    accessed_by   TEXT NOT NULL,
    access_type   TEXT NOT NULL CHECK (access_type IN ('read', 'update', 'rotate', 'delete')),
    accessed_at   TEXT NOT NULL,
    success       INTEGER NOT NULL,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_access_logs_credential
    ON access_logs (tenant_id, credential_id);

CREATE TABLE IF NOT EXISTS rotation_audit (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    credential_id    TEXT NOT NULL,
    tenant_id        TEXT NOT NULL,
    previous_key_id  TEXT,
    new_key_id       TEXT NOT NULL,
    previous_version INTEGER,
    new_version      INTEGER NOT NULL,
    rotated_by       TEXT NOT NULL,
    reason           TEXT,
    rotated_at       TEXT NOT NULL
);
";

const CREDENTIAL_COLUMNS: &str = "id, tenant_id, name, credential_type, status, \
     encrypted_dek, ciphertext, nonce, auth_tag, key_id, metadata, expires_at, \
     last_used_at, created_by, created_at, updated_at";

const VERSION_COLUMNS: &str = "credential_id, tenant_id, version, encrypted_dek, \
     ciphertext, nonce, auth_tag, key_id, is_active, created_by, created_at, \
     deactivated_at, deactivated_by, rotation_reason";

const ACCESS_LOG_COLUMNS: &str = "id, credential_id, tenant_id, accessed_by, \
     access_type, accessed_at, success, error_message";

const ROTATION_AUDIT_COLUMNS: &str = "id, credential_id, tenant_id, previous_key_id, \
     new_key_id, previous_version, new_version, rotated_by, reason, rotated_at";

/// Credential store backed by a single SQLite database.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file at `path` and apply the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)
            .await
            .map_err(|e| VaultError::Storage(format!("open {}: {e}", path.display())))?;

        // SQLite creates the WAL sidecars with the database file's mode, so
        // restrict the file before switching journal modes.
        restrict_permissions(&path);

        let store = Self { conn };
        store.init("PRAGMA journal_mode = WAL;").await?;
        restrict_permissions(&path);
        info!(path = %path.display(), "opened credential store");
        Ok(store)
    }

    /// Throwaway database for tests and dry runs.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| VaultError::Storage(format!("open in-memory database: {e}")))?;
        let store = Self { conn };
        store.init("").await?;
        Ok(store)
    }

    async fn init(&self, extra_pragmas: &'static str) -> Result<()> {
        self.conn
            .call(move |conn| -> std::result::Result<(), VaultError> {
                conn.execute_batch(extra_pragmas)?;
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn create(&self, credential: &Credential) -> Result<()> {
        let c = credential.clone();
        self.conn
            .call(move |conn| -> std::result::Result<(), VaultError> {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                insert_credential(&tx, &c)?;
                if let Some(secret) = &c.secret {
                    insert_version(
                        &tx,
                        &CredentialVersion {
                            credential_id: c.id,
                            tenant_id: c.tenant_id.clone(),
                            version: 1,
                            secret: secret.clone(),
                            is_active: true,
                            created_by: c.created_by.clone(),
                            created_at: c.created_at,
                            deactivated_at: None,
                            deactivated_by: None,
                            rotation_reason: None,
                        },
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        debug!(credential_id = %credential.id, tenant_id = %credential.tenant_id, "stored credential");
        Ok(())
    }

    async fn get_by_id(&self, tenant_id: &str, id: Uuid) -> Result<Credential> {
        let tenant_id = tenant_id.to_string();
        self.conn
            .call(move |conn| -> std::result::Result<Credential, VaultError> {
                let sql =
                    format!("SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE tenant_id = ?1 AND id = ?2");
                conn.query_row(&sql, params![tenant_id, id.to_string()], credential_from_row)
                    .optional()?
                    .ok_or_else(|| VaultError::NotFound(format!("credential {id}")))
            })
            .await
            .map_err(map_tr_err)
    }

    async fn get_by_name(&self, tenant_id: &str, name: &str) -> Result<Credential> {
        let tenant_id = tenant_id.to_string();
        let name = name.to_string();
        self.conn
            .call(move |conn| -> std::result::Result<Credential, VaultError> {
                let sql = format!(
                    "SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE tenant_id = ?1 AND name = ?2"
                );
                conn.query_row(&sql, params![tenant_id, name], credential_from_row)
                    .optional()?
                    .ok_or_else(|| VaultError::NotFound(format!("credential '{name}'")))
            })
            .await
            .map_err(map_tr_err)
    }

    async fn update(&self, credential: &Credential) -> Result<()> {
        let fields = FieldChanges::of(credential);
        let tenant_id = credential.tenant_id.clone();
        let id = credential.id;
        let updated_at = credential.updated_at;
        self.conn
            .call(move |conn| -> std::result::Result<(), VaultError> {
                write_fields(conn, &tenant_id, id, &fields, &updated_at)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn delete(&self, tenant_id: &str, id: Uuid) -> Result<()> {
        let tenant_id = tenant_id.to_string();
        self.conn
            .call(move |conn| -> std::result::Result<(), VaultError> {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                tx.execute(
                    "DELETE FROM credential_versions WHERE tenant_id = ?1 AND credential_id = ?2",
                    params![tenant_id, id.to_string()],
                )?;
                let removed = tx.execute(
                    "DELETE FROM credentials WHERE tenant_id = ?1 AND id = ?2",
                    params![tenant_id, id.to_string()],
                )?;
                if removed == 0 {
                    return Err(VaultError::NotFound(format!("credential {id}")));
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn list(&self, tenant_id: &str, filter: &CredentialFilter) -> Result<Vec<Credential>> {
        let tenant_id = tenant_id.to_string();
        let filter = filter.clone();
        self.conn
            .call(move |conn| -> std::result::Result<Vec<Credential>, VaultError> {
                let mut sql = format!("SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE tenant_id = ?1");
                let mut values = vec![Value::Text(tenant_id)];

                if let Some(t) = &filter.credential_type {
                    values.push(Value::Text(t.as_str().to_string()));
                    sql.push_str(&format!(" AND credential_type = ?{}", values.len()));
                }
                if let Some(status) = filter.status {
                    values.push(Value::Text(status.as_str().to_string()));
                    sql.push_str(&format!(" AND status = ?{}", values.len()));
                }
                if let Some(prefix) = &filter.name_prefix {
                    values.push(Value::Text(format!("{}%", escape_like(prefix))));
                    sql.push_str(&format!(" AND name LIKE ?{} ESCAPE '\\'", values.len()));
                }
                sql.push_str(" ORDER BY name");
                if let Some(limit) = filter.limit {
                    values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
                    sql.push_str(&format!(" LIMIT ?{}", values.len()));
                }

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(values.iter()), credential_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn create_version(&self, version: &CredentialVersion) -> Result<()> {
        let v = version.clone();
        self.conn
            .call(move |conn| -> std::result::Result<(), VaultError> {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let exists = tx
                    .query_row(
                        "SELECT 1 FROM credentials WHERE tenant_id = ?1 AND id = ?2",
                        params![v.tenant_id, v.credential_id.to_string()],
                        |_| Ok(()),
                    )
                    .optional()?;
                if exists.is_none() {
                    return Err(VaultError::NotFound(format!("credential {}", v.credential_id)));
                }
                insert_version(&tx, &v)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn get_versions(
        &self,
        tenant_id: &str,
        credential_id: Uuid,
    ) -> Result<Vec<CredentialVersion>> {
        let tenant_id = tenant_id.to_string();
        self.conn
            .call(move |conn| -> std::result::Result<Vec<CredentialVersion>, VaultError> {
                let sql = format!(
                    "SELECT {VERSION_COLUMNS} FROM credential_versions
                     WHERE tenant_id = ?1 AND credential_id = ?2
                     ORDER BY version DESC"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![tenant_id, credential_id.to_string()], version_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn get_active_version(
        &self,
        tenant_id: &str,
        credential_id: Uuid,
    ) -> Result<CredentialVersion> {
        let tenant_id = tenant_id.to_string();
        self.conn
            .call(move |conn| -> std::result::Result<CredentialVersion, VaultError> {
                let sql = format!(
                    "SELECT {VERSION_COLUMNS} FROM credential_versions
                     WHERE tenant_id = ?1 AND credential_id = ?2 AND is_active = 1"
                );
                conn.query_row(&sql, params![tenant_id, credential_id.to_string()], version_from_row)
                    .optional()?
                    .ok_or_else(|| {
                        VaultError::NotFound(format!("active version of credential {credential_id}"))
                    })
            })
            .await
            .map_err(map_tr_err)
    }

    async fn log_access(&self, entry: NewAccessLog) -> Result<()> {
        self.conn
            .call(move |conn| -> std::result::Result<(), VaultError> {
                insert_access_log(conn, &entry, Utc::now())?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn get_access_logs(
        &self,
        tenant_id: &str,
        credential_id: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<AccessLogEntry>> {
        let tenant_id = tenant_id.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.conn
            .call(move |conn| -> std::result::Result<Vec<AccessLogEntry>, VaultError> {
                let mut values = vec![Value::Text(tenant_id)];
                let mut sql = format!("SELECT {ACCESS_LOG_COLUMNS} FROM access_logs WHERE tenant_id = ?1");
                if let Some(id) = credential_id {
                    values.push(Value::Text(id.to_string()));
                    sql.push_str(" AND credential_id = ?2");
                }
                values.push(Value::Integer(limit));
                sql.push_str(&format!(" ORDER BY id DESC LIMIT ?{}", values.len()));

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(values.iter()), access_log_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn get_rotation_audit(
        &self,
        tenant_id: &str,
        credential_id: Uuid,
    ) -> Result<Vec<RotationAuditEntry>> {
        let tenant_id = tenant_id.to_string();
        self.conn
            .call(move |conn| -> std::result::Result<Vec<RotationAuditEntry>, VaultError> {
                let sql = format!(
                    "SELECT {ROTATION_AUDIT_COLUMNS} FROM rotation_audit
                     WHERE tenant_id = ?1 AND credential_id = ?2
                     ORDER BY id DESC"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![tenant_id, credential_id.to_string()], rotation_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn rotate_credential(&self, request: RotationRequest) -> Result<RotationOutcome> {
        let outcome = self
            .conn
            .call(move |conn| -> std::result::Result<RotationOutcome, VaultError> {
                let req = request;
                let id = req.credential_id.to_string();
                let now = Utc::now();
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let current: Option<(String, Option<String>)> = tx
                    .query_row(
                        "SELECT credential_type, key_id FROM credentials
                         WHERE tenant_id = ?1 AND id = ?2",
                        params![req.tenant_id, id],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;
                let (stored_type, previous_key_id) = current
                    .ok_or_else(|| VaultError::NotFound(format!("credential {id}")))?;

                let stored_type = CredentialType::parse(&stored_type);
                if stored_type != req.expected_type {
                    return Err(VaultError::Conflict(format!(
                        "credential {id} changed type from '{}' to '{stored_type}'",
                        req.expected_type
                    )));
                }

                let previous_version: Option<i64> = tx.query_row(
                    "SELECT MAX(version) FROM credential_versions WHERE credential_id = ?1",
                    params![id],
                    |row| row.get(0),
                )?;
                let new_version = previous_version.unwrap_or(0) + 1;

                tx.execute(
                    "UPDATE credential_versions
                     SET is_active = 0, deactivated_at = ?1, deactivated_by = ?2
                     WHERE credential_id = ?3 AND is_active = 1",
                    params![ts(&now), req.actor, id],
                )?;

                insert_version(
                    &tx,
                    &CredentialVersion {
                        credential_id: req.credential_id,
                        tenant_id: req.tenant_id.clone(),
                        version: new_version,
                        secret: req.secret.clone(),
                        is_active: true,
                        created_by: req.actor.clone(),
                        created_at: now,
                        deactivated_at: None,
                        deactivated_by: None,
                        rotation_reason: req.reason.clone(),
                    },
                )?;

                let s = &req.secret;
                tx.execute(
                    "UPDATE credentials
                     SET encrypted_dek = ?1, ciphertext = ?2, nonce = ?3, auth_tag = ?4,
                         key_id = ?5, updated_at = ?6
                     WHERE tenant_id = ?7 AND id = ?8",
                    params![
                        s.encrypted_dek,
                        s.ciphertext,
                        s.nonce,
                        s.auth_tag,
                        s.key_id,
                        ts(&now),
                        req.tenant_id,
                        id,
                    ],
                )?;

                if let Some(fields) = &req.fields {
                    write_fields(&tx, &req.tenant_id, req.credential_id, fields, &now)?;
                }

                if req.access_type == AccessType::Rotate {
                    tx.execute(
                        "INSERT INTO rotation_audit
                         (credential_id, tenant_id, previous_key_id, new_key_id,
                          previous_version, new_version, rotated_by, reason, rotated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                        params![
                            id,
                            req.tenant_id,
                            previous_key_id,
                            s.key_id,
                            previous_version,
                            new_version,
                            req.actor,
                            req.reason,
                            ts(&now),
                        ],
                    )?;
                }

                insert_access_log(
                    &tx,
                    &NewAccessLog::succeeded(
                        req.credential_id,
                        &req.tenant_id,
                        &req.actor,
                        req.access_type,
                    ),
                    now,
                )?;

                tx.commit()?;

                Ok(RotationOutcome {
                    credential_id: req.credential_id,
                    previous_version,
                    new_version,
                    previous_key_id,
                    new_key_id: s.key_id.clone(),
                })
            })
            .await
            .map_err(map_tr_err)?;

        debug!(
            credential_id = %outcome.credential_id,
            version = outcome.new_version,
            "committed new credential version"
        );
        Ok(outcome)
    }

    async fn touch_last_used(&self, tenant_id: &str, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let tenant_id = tenant_id.to_string();
        self.conn
            .call(move |conn| -> std::result::Result<(), VaultError> {
                let changed = conn.execute(
                    "UPDATE credentials SET last_used_at = ?1 WHERE tenant_id = ?2 AND id = ?3",
                    params![ts(&at), tenant_id, id.to_string()],
                )?;
                if changed == 0 {
                    return Err(VaultError::NotFound(format!("credential {id}")));
                }
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}

// ── Statement helpers ────────────────────────────────────────────────

fn insert_credential(conn: &rusqlite::Connection, c: &Credential) -> Result<()> {
    let secret = c.secret.as_ref();
    let metadata = metadata_to_text(&c.metadata)?;
    conn.execute(
        &format!(
            "INSERT INTO credentials ({CREDENTIAL_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
        ),
        params![
            c.id.to_string(),
            c.tenant_id,
            c.name,
            c.credential_type.as_str(),
            c.status.as_str(),
            secret.map(|s| s.encrypted_dek.as_slice()),
            secret.map(|s| s.ciphertext.as_slice()),
            secret.map(|s| s.nonce.as_slice()),
            secret.map(|s| s.auth_tag.as_slice()),
            secret.map(|s| s.key_id.as_str()),
            metadata,
            c.expires_at.as_ref().map(ts),
            c.last_used_at.as_ref().map(ts),
            c.created_by,
            ts(&c.created_at),
            ts(&c.updated_at),
        ],
    )
    .map_err(|e| conflict_or_storage(e, || format!("credential '{}' already exists", c.name)))?;
    Ok(())
}

fn insert_version(conn: &rusqlite::Connection, v: &CredentialVersion) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO credential_versions ({VERSION_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        ),
        params![
            v.credential_id.to_string(),
            v.tenant_id,
            v.version,
            v.secret.encrypted_dek,
            v.secret.ciphertext,
            v.secret.nonce,
            v.secret.auth_tag,
            v.secret.key_id,
            v.is_active,
            v.created_by,
            ts(&v.created_at),
            v.deactivated_at.as_ref().map(ts),
            v.deactivated_by,
            v.rotation_reason,
        ],
    )
    .map_err(|e| {
        conflict_or_storage(e, || {
            format!(
                "version {} of credential {} conflicts with an existing version",
                v.version, v.credential_id
            )
        })
    })?;
    Ok(())
}

fn insert_access_log(
    conn: &rusqlite::Connection,
    entry: &NewAccessLog,
    at: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO access_logs
         (credential_id, tenant_id, accessed_by, access_type, accessed_at, success, error_message)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.credential_id.to_string(),
            entry.tenant_id,
            entry.accessed_by,
            entry.access_type.as_str(),
            ts(&at),
            entry.success,
            entry.error_message,
        ],
    )?;
    Ok(())
}

// ── Row mapping ──────────────────────────────────────────────────────

fn credential_from_row(row: &Row<'_>) -> rusqlite::Result<Credential> {
    let secret = secret_from_columns(
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    );
    let status: String = row.get(4)?;
    let metadata: String = row.get(10)?;

    Ok(Credential {
        id: uuid_col(row, 0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        credential_type: CredentialType::parse(&row.get::<_, String>(3)?),
        status: status
            .parse::<CredentialStatus>()
            .map_err(|e| conversion_error(4, e))?,
        secret,
        metadata: serde_json::from_str::<Metadata>(&metadata).map_err(|e| conversion_error(10, e))?,
        expires_at: opt_ts_col(row, 11)?,
        last_used_at: opt_ts_col(row, 12)?,
        created_by: row.get(13)?,
        created_at: ts_col(row, 14)?,
        updated_at: ts_col(row, 15)?,
    })
}

fn secret_from_columns(
    encrypted_dek: Option<Vec<u8>>,
    ciphertext: Option<Vec<u8>>,
    nonce: Option<Vec<u8>>,
    auth_tag: Option<Vec<u8>>,
    key_id: Option<String>,
) -> Option<EncryptedSecret> {
    match (encrypted_dek, ciphertext, nonce, auth_tag, key_id) {
        (Some(encrypted_dek), Some(ciphertext), Some(nonce), Some(auth_tag), Some(key_id)) => {
            Some(EncryptedSecret {
                encrypted_dek,
                ciphertext,
                nonce,
                auth_tag,
                key_id,
            })
        }
        _ => None,
    }
}

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<CredentialVersion> {
    Ok(CredentialVersion {
        credential_id: uuid_col(row, 0)?,
        tenant_id: row.get(1)?,
        version: row.get(2)?,
        secret: EncryptedSecret {
            encrypted_dek: row.get(3)?,
            ciphertext: row.get(4)?,
            nonce: row.get(5)?,
            auth_tag: row.get(6)?,
            key_id: row.get(7)?,
        },
        is_active: row.get(8)?,
        created_by: row.get(9)?,
        created_at: ts_col(row, 10)?,
        deactivated_at: opt_ts_col(row, 11)?,
        deactivated_by: row.get(12)?,
        rotation_reason: row.get(13)?,
    })
}

fn access_log_from_row(row: &Row<'_>) -> rusqlite::Result<AccessLogEntry> {
    let access_type: String = row.get(4)?;
    Ok(AccessLogEntry {
        id: row.get(0)?,
        credential_id: uuid_col(row, 1)?,
        tenant_id: row.get(2)?,
        accessed_by: row.get(3)?,
        access_type: access_type
            .parse::<AccessType>()
            .map_err(|e| conversion_error(4, e))?,
        accessed_at: ts_col(row, 5)?,
        success: row.get(6)?,
        error_message: row.get(7)?,
    })
}

fn rotation_from_row(row: &Row<'_>) -> rusqlite::Result<RotationAuditEntry> {
    Ok(RotationAuditEntry {
        id: row.get(0)?,
        credential_id: uuid_col(row, 1)?,
        tenant_id: row.get(2)?,
        previous_key_id: row.get(3)?,
        new_key_id: row.get(4)?,
        previous_version: row.get(5)?,
        new_version: row.get(6)?,
        rotated_by: row.get(7)?,
        reason: row.get(8)?,
        rotated_at: ts_col(row, 9)?,
    })
}

// ── Column conversions ───────────────────────────────────────────────

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn opt_ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

/// Owner-only access to the database and its `-wal`/`-shm` files, which
/// all hold wrapped keys and ciphertexts. Missing files are skipped.
fn restrict_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mut files = vec![path.to_path_buf()];
        for suffix in ["-wal", "-shm"] {
            let mut sidecar = path.as_os_str().to_os_string();
            sidecar.push(suffix);
            files.push(sidecar.into());
        }
        for file in files.iter().filter(|f| f.exists()) {
            if let Err(e) = std::fs::set_permissions(file, std::fs::Permissions::from_mode(0o600)) {
                warn!(path = %file.display(), error = %e, "could not restrict file permissions");
            }
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

fn write_fields(
    conn: &rusqlite::Connection,
    tenant_id: &str,
    id: Uuid,
    fields: &FieldChanges,
    updated_at: &DateTime<Utc>,
) -> std::result::Result<(), VaultError> {
    let metadata = metadata_to_text(&fields.metadata)?;
    let changed = conn
        .execute(
            "UPDATE credentials
             SET name = ?1, status = ?2, metadata = ?3, expires_at = ?4, updated_at = ?5
             WHERE tenant_id = ?6 AND id = ?7",
            params![
                fields.name,
                fields.status.as_str(),
                metadata,
                fields.expires_at.as_ref().map(ts),
                ts(updated_at),
                tenant_id,
                id.to_string(),
            ],
        )
        .map_err(|e| {
            conflict_or_storage(e, || format!("credential '{}' already exists", fields.name))
        })?;
    if changed == 0 {
        return Err(VaultError::NotFound(format!("credential {id}")));
    }
    Ok(())
}

fn metadata_to_text(metadata: &Metadata) -> Result<String> {
    serde_json::to_string(metadata).map_err(|e| VaultError::Serialization(e.to_string()))
}

/// Escape `%`, `_`, and `\` for a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

fn conflict_or_storage(e: rusqlite::Error, describe: impl FnOnce() -> String) -> VaultError {
    if is_unique_violation(&e) {
        VaultError::Conflict(describe())
    } else {
        VaultError::from(e)
    }
}

fn map_tr_err(e: tokio_rusqlite::Error<VaultError>) -> VaultError {
    match e {
        tokio_rusqlite::Error::Error(inner) => inner,
        other => VaultError::Storage(format!("database connection error: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(tag: u8) -> EncryptedSecret {
        EncryptedSecret {
            encrypted_dek: vec![tag; 60],
            ciphertext: vec![tag; 20],
            nonce: vec![tag; 12],
            auth_tag: vec![tag; 16],
            key_id: format!("key-{tag}"),
        }
    }

    fn credential(tenant: &str, name: &str, secret: Option<EncryptedSecret>) -> Credential {
        let now = Utc::now();
        Credential {
            id: Uuid::new_v4(),
            tenant_id: tenant.into(),
            name: name.into(),
            credential_type: CredentialType::ApiKey,
            status: CredentialStatus::Active,
            secret,
            metadata: serde_json::json!({"team": "payments"}).as_object().cloned().unwrap(),
            expires_at: None,
            last_used_at: None,
            created_by: "alice".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn create_and_fetch_by_id_and_name() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let c = credential("t1", "openai", Some(secret(1)));
        store.create(&c).await.unwrap();

        let by_id = store.get_by_id("t1", c.id).await.unwrap();
        assert_eq!(by_id.name, "openai");
        assert_eq!(by_id.secret, Some(secret(1)));
        assert_eq!(by_id.metadata["team"], "payments");

        let by_name = store.get_by_name("t1", "openai").await.unwrap();
        assert_eq!(by_name.id, c.id);
    }

    #[tokio::test]
    async fn create_with_value_records_version_one() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let with_value = credential("t1", "a", Some(secret(1)));
        let empty = credential("t1", "b", None);
        store.create(&with_value).await.unwrap();
        store.create(&empty).await.unwrap();

        let active = store.get_active_version("t1", with_value.id).await.unwrap();
        assert_eq!(active.version, 1);
        assert!(active.is_active);
        assert!(store.get_versions("t1", empty.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_name_in_tenant_is_a_conflict() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.create(&credential("t1", "dup", None)).await.unwrap();

        let err = store.create(&credential("t1", "dup", None)).await.unwrap_err();
        assert!(matches!(err, VaultError::Conflict(_)), "got {err:?}");

        // Same name in another tenant is fine.
        store.create(&credential("t2", "dup", None)).await.unwrap();
    }

    #[tokio::test]
    async fn other_tenants_rows_are_invisible() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let c = credential("t1", "private", Some(secret(1)));
        store.create(&c).await.unwrap();

        assert!(matches!(
            store.get_by_id("t2", c.id).await,
            Err(VaultError::NotFound(_))
        ));
        assert!(store.get_versions("t2", c.id).await.unwrap().is_empty());
        assert!(store
            .list("t2", &CredentialFilter::default())
            .await
            .unwrap()
            .is_empty());
        assert!(matches!(
            store.delete("t2", c.id).await,
            Err(VaultError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_applies_filters() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.create(&credential("t1", "prod_db", None)).await.unwrap();
        store.create(&credential("t1", "prod-api", None)).await.unwrap();
        let mut revoked = credential("t1", "staging", None);
        revoked.status = CredentialStatus::Revoked;
        store.create(&revoked).await.unwrap();

        let all = store.list("t1", &CredentialFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);

        let prefixed = store
            .list(
                "t1",
                &CredentialFilter {
                    name_prefix: Some("prod_".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(prefixed.len(), 1, "underscore must match literally");

        let revoked_only = store
            .list(
                "t1",
                &CredentialFilter {
                    status: Some(CredentialStatus::Revoked),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(revoked_only[0].name, "staging");

        let limited = store
            .list(
                "t1",
                &CredentialFilter {
                    limit: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn rotation_keeps_exactly_one_active_version() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let c = credential("t1", "rotating", Some(secret(1)));
        store.create(&c).await.unwrap();

        for tag in 2..=4u8 {
            let outcome = store
                .rotate_credential(RotationRequest {
                    tenant_id: "t1".into(),
                    credential_id: c.id,
                    expected_type: CredentialType::ApiKey,
                    secret: secret(tag),
                    actor: "bob".into(),
                    reason: Some("scheduled".into()),
                    access_type: AccessType::Rotate,
                    fields: None,
                })
                .await
                .unwrap();
            assert_eq!(outcome.new_version, i64::from(tag));
            assert_eq!(outcome.previous_key_id, Some(format!("key-{}", tag - 1)));
        }

        let versions = store.get_versions("t1", c.id).await.unwrap();
        assert_eq!(
            versions.iter().map(|v| v.version).collect::<Vec<_>>(),
            vec![4, 3, 2, 1]
        );
        assert_eq!(versions.iter().filter(|v| v.is_active).count(), 1);
        assert_eq!(versions[1].deactivated_by.as_deref(), Some("bob"));

        let live = store.get_by_id("t1", c.id).await.unwrap();
        assert_eq!(live.secret, Some(secret(4)));

        let audit = store.get_rotation_audit("t1", c.id).await.unwrap();
        assert_eq!(audit.len(), 3);
        assert_eq!(audit[0].new_version, 4);
        assert_eq!(audit[0].previous_version, Some(3));
    }

    #[tokio::test]
    async fn rotation_with_changed_type_rolls_back() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let c = credential("t1", "typed", Some(secret(1)));
        store.create(&c).await.unwrap();

        let err = store
            .rotate_credential(RotationRequest {
                tenant_id: "t1".into(),
                credential_id: c.id,
                expected_type: CredentialType::OAuth2,
                secret: secret(2),
                actor: "bob".into(),
                reason: None,
                access_type: AccessType::Rotate,
                fields: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Conflict(_)));

        assert_eq!(store.get_versions("t1", c.id).await.unwrap().len(), 1);
        assert_eq!(
            store.get_by_id("t1", c.id).await.unwrap().secret,
            Some(secret(1))
        );
        assert!(store.get_access_logs("t1", Some(c.id), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_active_version_is_rejected() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let c = credential("t1", "guarded", Some(secret(1)));
        store.create(&c).await.unwrap();

        let err = store
            .create_version(&CredentialVersion {
                credential_id: c.id,
                tenant_id: "t1".into(),
                version: 2,
                secret: secret(2),
                is_active: true,
                created_by: "mallory".into(),
                created_at: Utc::now(),
                deactivated_at: None,
                deactivated_by: None,
                rotation_reason: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Conflict(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn access_logs_are_newest_first() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let id = Uuid::new_v4();
        for access in [AccessType::Read, AccessType::Update, AccessType::Delete] {
            store
                .log_access(NewAccessLog::succeeded(id, "t1", "carol", access))
                .await
                .unwrap();
        }

        let logs = store.get_access_logs("t1", Some(id), 10).await.unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].access_type, AccessType::Delete);
        assert_eq!(logs[2].access_type, AccessType::Read);

        assert_eq!(store.get_access_logs("t1", None, 2).await.unwrap().len(), 2);
        assert!(store.get_access_logs("t2", None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_versions_but_keeps_audit() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let c = credential("t1", "doomed", Some(secret(1)));
        store.create(&c).await.unwrap();
        store
            .log_access(NewAccessLog::succeeded(c.id, "t1", "a", AccessType::Read))
            .await
            .unwrap();

        store.delete("t1", c.id).await.unwrap();

        assert!(store.get_by_id("t1", c.id).await.is_err());
        assert!(store.get_versions("t1", c.id).await.unwrap().is_empty());
        assert_eq!(store.get_access_logs("t1", Some(c.id), 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_and_touch_last_used() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let mut c = credential("t1", "before", None);
        store.create(&c).await.unwrap();
        store.create(&credential("t1", "taken", None)).await.unwrap();

        c.name = "after".into();
        c.status = CredentialStatus::Expired;
        store.update(&c).await.unwrap();
        let loaded = store.get_by_id("t1", c.id).await.unwrap();
        assert_eq!(loaded.name, "after");
        assert_eq!(loaded.status, CredentialStatus::Expired);

        c.name = "taken".into();
        assert!(matches!(store.update(&c).await, Err(VaultError::Conflict(_))));

        let at = Utc::now();
        store.touch_last_used("t1", c.id, at).await.unwrap();
        let touched = store.get_by_id("t1", c.id).await.unwrap();
        assert_eq!(ts(&touched.last_used_at.unwrap()), ts(&at));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn database_and_wal_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("vault.db");
        let store = SqliteStore::open(&path).await.unwrap();
        store.create(&credential("t1", "wal", Some(secret(1)))).await.unwrap();

        let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
        let wal = tmp.path().join("vault.db-wal");
        let shm = tmp.path().join("vault.db-shm");
        assert!(wal.exists());
        for file in [&path, &wal, &shm] {
            assert_eq!(mode(file), 0o600, "{}", file.display());
        }

        // A sidecar left world-readable by an earlier process is tightened.
        std::fs::set_permissions(&wal, std::fs::Permissions::from_mode(0o644)).unwrap();
        restrict_permissions(&path);
        assert_eq!(mode(&wal), 0o600);
    }

    #[test]
    fn like_patterns_are_escaped() {
        assert_eq!(escape_like("a_b%c\\"), "a\\_b\\%c\\\\");
    }
}
