//! CLI module: Clap argument parser, output helpers, and command implementations.

pub mod commands;
pub mod output;

use std::io::{self, Read};
use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::DropGuard;
use tracing::debug;

use crate::config::Settings;
use crate::envelope::CredentialData;
use crate::errors::{Result, VaultError};
use crate::store::SqliteStore;
use crate::vault::{AccessContext, CredentialService};

/// credvault CLI: multi-tenant credential vault.
#[derive(Parser)]
#[command(
    name = "credvault",
    about = "Multi-tenant credential vault with envelope encryption",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Tenant to act for (default: `default_tenant` from the config)
    #[arg(short, long, global = true, env = "CREDVAULT_TENANT")]
    pub tenant: Option<String>,

    /// Name recorded in audit rows (default: $USER)
    #[arg(long, global = true, env = "CREDVAULT_ACTOR")]
    pub actor: Option<String>,

    /// Directory holding `.credvault.toml` (default: current directory)
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,
}

/// Where a plaintext payload comes from.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct PayloadArgs {
    /// Credential data as a JSON object, or `-` to read it from stdin
    #[arg(long)]
    pub data: Option<String>,

    /// Single field as KEY=VALUE (repeatable, merged over --data)
    #[arg(short, long = "field", value_name = "KEY=VALUE")]
    pub fields: Vec<String>,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Generate a new base64 master key
    Keygen,

    /// Create a credential (optionally with its first value)
    Create {
        /// Credential name (unique per tenant)
        name: String,
        /// Credential type (see `credvault types`)
        #[arg(short = 'T', long = "type", default_value = "custom")]
        credential_type: String,
        #[command(flatten)]
        payload: PayloadArgs,
        /// Non-secret metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,
        /// Expire after a duration (e.g. 90d, 12h)
        #[arg(long)]
        expires_in: Option<String>,
    },

    /// Decrypt and print a credential's value
    Get {
        /// Credential name
        name: String,
        /// Print only this field
        #[arg(long)]
        field: Option<String>,
    },

    /// List credentials
    List {
        /// Only this credential type
        #[arg(short = 'T', long = "type")]
        credential_type: Option<String>,
        /// Only this status (active, expired, revoked)
        #[arg(long)]
        status: Option<String>,
        /// Only names starting with this prefix
        #[arg(long)]
        prefix: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Change a credential's name, status, metadata, expiry, or value
    Update {
        /// Credential name
        name: String,
        /// New name
        #[arg(long)]
        rename: Option<String>,
        /// New status (active, expired, revoked)
        #[arg(long)]
        status: Option<String>,
        /// Replace metadata with this JSON object
        #[arg(long)]
        metadata: Option<String>,
        /// Expire after a duration from now (e.g. 30d)
        #[arg(long, conflicts_with = "clear_expiry")]
        expires_in: Option<String>,
        /// Remove the expiry
        #[arg(long)]
        clear_expiry: bool,
        #[command(flatten)]
        payload: PayloadArgs,
    },

    /// Rotate a credential to a new value
    Rotate {
        /// Credential name
        name: String,
        #[command(flatten)]
        payload: PayloadArgs,
        /// Reason recorded in the rotation audit
        #[arg(long)]
        reason: Option<String>,
    },

    /// Show a credential's version and rotation history
    History {
        /// Credential name
        name: String,
    },

    /// Delete a credential and its versions
    Delete {
        /// Credential name
        name: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// View the access log
    Audit {
        /// Only entries for this credential
        #[arg(long)]
        name: Option<String>,
        /// Number of entries to show (default: 50)
        #[arg(long, default_value = "50")]
        last: usize,
    },

    /// Show required and optional fields of credential types
    Types {
        /// A single type to describe
        credential_type: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Mask credential values in text read from stdin
    Mask {
        /// Credentials whose values should be masked
        #[arg(required = true)]
        names: Vec<String>,
        /// Treat stdin as JSON and mask only string values
        #[arg(long)]
        json: bool,
    },
}

// ---------------------------------------------------------------------------
// Shared helpers used by multiple commands
// ---------------------------------------------------------------------------

/// An opened vault: service, caller context, and the cache sweeper guard.
pub struct Vault {
    pub service: CredentialService,
    pub ctx: AccessContext,
    pub settings: Settings,
    // Cancels the cache sweeper when the vault is dropped.
    _sweeper: Option<DropGuard>,
}

/// Directory holding `.credvault.toml`.
pub fn config_dir(cli: &Cli) -> Result<PathBuf> {
    match &cli.config_dir {
        Some(dir) => Ok(dir.clone()),
        None => Ok(std::env::current_dir()?),
    }
}

/// Load settings, read the master key, and open the store.
pub async fn open_vault(cli: &Cli) -> Result<Vault> {
    let dir = config_dir(cli)?;
    let settings = Settings::load(&dir)?;

    let tenant = cli
        .tenant
        .clone()
        .unwrap_or_else(|| settings.default_tenant.clone());
    validate_tenant_id(&tenant)?;

    let actor = cli
        .actor
        .clone()
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "cli".to_string());

    let master_key = settings.master_key()?;
    let encryption = settings.encryption(master_key)?;

    let db_path = settings.database_path(&dir);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = SqliteStore::open(&db_path).await?;

    let ctx = AccessContext::new(tenant, actor);
    let sweeper = encryption.cache.map(|cache| {
        let guard_token = ctx.cancel.child_token();
        cache.spawn_sweeper(settings.sweep_interval(), guard_token.clone());
        guard_token.drop_guard()
    });

    debug!(
        backend = encryption.service.backend(),
        db = %db_path.display(),
        tenant_id = %ctx.tenant_id,
        "vault opened"
    );

    Ok(Vault {
        service: CredentialService::new(std::sync::Arc::new(store), encryption.service),
        ctx,
        settings,
        _sweeper: sweeper,
    })
}

/// Build a payload from `--data` and `--field` arguments.
///
/// Returns `None` when neither was given.
pub fn read_payload(args: &PayloadArgs) -> Result<Option<CredentialData>> {
    if args.data.is_none() && args.fields.is_empty() {
        return Ok(None);
    }

    let mut data = match args.data.as_deref() {
        Some("-") => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            parse_object(&buf, "--data")?
        }
        Some(inline) => {
            output::warning("Data provided on command line; it may appear in shell history.");
            parse_object(inline, "--data")?
        }
        None => CredentialData::new(),
    };

    for field in &args.fields {
        let (key, value) = field.split_once('=').ok_or_else(|| {
            VaultError::CommandFailed(format!("--field expects KEY=VALUE, got '{}'", field_name(field)))
        })?;
        if key.trim().is_empty() {
            return Err(VaultError::CommandFailed("--field key cannot be empty".into()));
        }
        data.insert(key.trim().to_string(), serde_json::Value::String(value.to_string()));
    }

    Ok(Some(data))
}

/// Like [`read_payload`], but a payload is mandatory.
pub fn require_payload(args: &PayloadArgs) -> Result<CredentialData> {
    read_payload(args)?.ok_or_else(|| {
        VaultError::CommandFailed("provide the new value with --data or --field".into())
    })
}

// Never echo a field's value in an error message.
fn field_name(field: &str) -> &str {
    field.split('=').next().unwrap_or_default()
}

/// Parse a JSON object argument.
pub fn parse_object(raw: &str, flag: &str) -> Result<serde_json::Map<String, serde_json::Value>> {
    match serde_json::from_str::<serde_json::Value>(raw.trim()) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(VaultError::CommandFailed(format!("{flag} must be a JSON object"))),
        Err(e) => Err(VaultError::CommandFailed(format!(
            "{flag} is not valid JSON (line {}, column {})",
            e.line(),
            e.column()
        ))),
    }
}

/// Parse a human-friendly duration string like "7d", "24h", "30m".
pub fn parse_duration(input: &str) -> Result<chrono::Duration> {
    let input = input.trim();

    let (num_str, unit) = if let Some(s) = input.strip_suffix('d') {
        (s, 'd')
    } else if let Some(s) = input.strip_suffix('h') {
        (s, 'h')
    } else if let Some(s) = input.strip_suffix('m') {
        (s, 'm')
    } else {
        return Err(VaultError::CommandFailed(format!(
            "invalid duration '{input}': use a format like 7d, 24h, or 30m"
        )));
    };

    let num: i64 = num_str.parse().map_err(|_| {
        VaultError::CommandFailed(format!("invalid duration '{input}': number part is not valid"))
    })?;
    if num <= 0 {
        return Err(VaultError::CommandFailed(format!(
            "invalid duration '{input}': must be positive"
        )));
    }

    let duration = match unit {
        'd' => chrono::Duration::try_days(num),
        'h' => chrono::Duration::try_hours(num),
        _ => chrono::Duration::try_minutes(num),
    };
    duration.ok_or_else(|| {
        VaultError::CommandFailed(format!("invalid duration '{input}': too large"))
    })
}

/// Absolute expiry `input` from now, e.g. "90d".
pub fn expiry_from_now(input: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    let duration = parse_duration(input)?;
    chrono::Utc::now()
        .checked_add_signed(duration)
        .ok_or_else(|| {
            VaultError::CommandFailed(format!("invalid duration '{}': too large", input.trim()))
        })
}

/// Validate that a tenant id is safe to store and display.
///
/// Allowed: ASCII letters, digits, `-`, `_`, `.`. Max 128 characters.
pub fn validate_tenant_id(tenant: &str) -> Result<()> {
    if tenant.is_empty() {
        return Err(VaultError::Config("tenant id cannot be empty".into()));
    }
    if tenant.len() > 128 {
        return Err(VaultError::Config(
            "tenant id cannot exceed 128 characters".into(),
        ));
    }
    if !tenant
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(VaultError::Config(format!(
            "tenant id '{tenant}' is invalid: only letters, digits, '-', '_' and '.' are allowed"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_tenant_ids() {
        assert!(validate_tenant_id("default").is_ok());
        assert!(validate_tenant_id("acme-corp").is_ok());
        assert!(validate_tenant_id("tenant_42.eu").is_ok());
    }

    #[test]
    fn rejects_bad_tenant_ids() {
        assert!(validate_tenant_id("").is_err());
        assert!(validate_tenant_id("a b").is_err());
        assert!(validate_tenant_id("a/b").is_err());
        assert!(validate_tenant_id(&"a".repeat(129)).is_err());
    }

    #[test]
    fn fields_merge_over_data() {
        let args = PayloadArgs {
            data: None,
            fields: vec!["api_key=sk-1".into(), "note=a=b".into()],
        };
        let data = read_payload(&args).unwrap().unwrap();
        assert_eq!(data["api_key"], "sk-1");
        assert_eq!(data["note"], "a=b");
    }

    #[test]
    fn no_payload_args_means_no_payload() {
        assert!(read_payload(&PayloadArgs::default()).unwrap().is_none());
        assert!(require_payload(&PayloadArgs::default()).is_err());
    }

    #[test]
    fn malformed_field_error_hides_the_value() {
        let args = PayloadArgs {
            data: None,
            fields: vec!["sk-secret-without-equals".into()],
        };
        let err = read_payload(&args).unwrap_err().to_string();
        assert!(err.contains("KEY=VALUE"));
    }

    #[test]
    fn parse_object_requires_an_object() {
        assert!(parse_object(r#"{"a": 1}"#, "--data").is_ok());
        assert!(parse_object("[1, 2]", "--data").is_err());
        assert!(parse_object("{oops", "--data").is_err());
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("7d").unwrap(), chrono::Duration::days(7));
        assert_eq!(parse_duration("24h").unwrap(), chrono::Duration::hours(24));
        assert_eq!(parse_duration("30m").unwrap(), chrono::Duration::minutes(30));
    }

    #[test]
    fn parse_duration_invalid() {
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("7x").is_err());
        assert!(parse_duration("d").is_err());
        assert!(parse_duration("0d").is_err());
    }

    #[test]
    fn oversized_durations_are_errors() {
        assert!(matches!(
            parse_duration("999999999999999d"),
            Err(VaultError::CommandFailed(_))
        ));
        // Representable as a duration, but not as a date.
        assert!(parse_duration("99999999d").is_ok());
        assert!(matches!(
            expiry_from_now("99999999d"),
            Err(VaultError::CommandFailed(_))
        ));

        let in_a_week = expiry_from_now("7d").unwrap();
        assert!(in_a_week > chrono::Utc::now() + chrono::Duration::days(6));
    }
}
