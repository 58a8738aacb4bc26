use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::MasterKey;
use crate::envelope::{EncryptionService, KmsEnvelopeService, MasterKeyEnvelopeService};
use crate::errors::{Result, VaultError};
use crate::kms::{validate_key_id, DataKeyCache, LocalKeyProvider};

/// Which envelope backend wraps data keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// DEKs wrapped directly under the master key.
    MasterKey,
    /// DEKs issued by the in-process key provider, through the data-key cache.
    LocalKms,
}

/// Vault configuration, loaded from `.credvault.toml`.
///
/// Every field has a default, so the CLI works without any config file as
/// long as the master key environment variable is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// SQLite database file (relative paths resolve against the config dir).
    #[serde(default = "default_database_path")]
    pub database_path: String,

    #[serde(default = "default_backend")]
    pub backend: Backend,

    /// Key id recorded on every new ciphertext.
    #[serde(default = "default_key_id")]
    pub key_id: String,

    /// Environment variable holding the base64 32-byte master key.
    #[serde(default = "default_master_key_env")]
    pub master_key_env: String,

    /// Lifetime of a cached data key (local-kms backend only).
    #[serde(default = "default_cache_ttl_secs")]
    pub data_key_cache_ttl_secs: u64,

    /// Period of the background eviction sweep; must not exceed the TTL.
    #[serde(default = "default_sweep_interval_secs")]
    pub cache_sweep_interval_secs: u64,

    /// Tenant used when `--tenant` is not given.
    #[serde(default = "default_tenant")]
    pub default_tenant: String,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_database_path() -> String {
    ".credvault/credentials.db".to_string()
}

fn default_backend() -> Backend {
    Backend::MasterKey
}

fn default_key_id() -> String {
    "credvault-master-v1".to_string()
}

fn default_master_key_env() -> String {
    "CREDVAULT_MASTER_KEY".to_string()
}

/// Longest time an issued data key may be reused.
pub const MAX_CACHE_TTL_SECS: u64 = 24 * 60 * 60;

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_tenant() -> String {
    "default".to_string()
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            backend: default_backend(),
            key_id: default_key_id(),
            master_key_env: default_master_key_env(),
            data_key_cache_ttl_secs: default_cache_ttl_secs(),
            cache_sweep_interval_secs: default_sweep_interval_secs(),
            default_tenant: default_tenant(),
        }
    }
}

/// The encryption service a command should use, plus the cache to sweep.
pub struct EncryptionSetup {
    pub service: Arc<dyn EncryptionService>,
    pub cache: Option<Arc<DataKeyCache>>,
}

impl Settings {
    /// Name of the config file we look for in the config directory.
    pub const FILE_NAME: &'static str = ".credvault.toml";

    /// Load settings from `<config_dir>/.credvault.toml`.
    ///
    /// If the file does not exist, defaults are returned. A file that
    /// exists but does not parse or validate is an error.
    pub fn load(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            VaultError::Config(format!("Failed to parse {}: {e}", config_path.display()))
        })?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        validate_key_id(&self.key_id)
            .map_err(|e| VaultError::Config(format!("key_id: {e}")))?;

        if self.master_key_env.trim().is_empty() {
            return Err(VaultError::Config("master_key_env cannot be empty".into()));
        }
        if self.data_key_cache_ttl_secs == 0 || self.data_key_cache_ttl_secs > MAX_CACHE_TTL_SECS {
            return Err(VaultError::Config(format!(
                "data_key_cache_ttl_secs must be between 1 and {MAX_CACHE_TTL_SECS}"
            )));
        }
        if self.cache_sweep_interval_secs == 0
            || self.cache_sweep_interval_secs > self.data_key_cache_ttl_secs
        {
            return Err(VaultError::Config(format!(
                "cache_sweep_interval_secs must be between 1 and {} (the cache TTL)",
                self.data_key_cache_ttl_secs
            )));
        }
        Ok(())
    }

    /// Resolve the database path against the config directory.
    ///
    /// Example: `config_dir/.credvault/credentials.db`
    pub fn database_path(&self, config_dir: &Path) -> PathBuf {
        let path = Path::new(&self.database_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            config_dir.join(path)
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.data_key_cache_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval_secs)
    }

    /// Read the master key from the configured environment variable.
    pub fn master_key(&self) -> Result<MasterKey> {
        self.parse_master_key(std::env::var(&self.master_key_env).ok())
    }

    fn parse_master_key(&self, raw: Option<String>) -> Result<MasterKey> {
        match raw {
            Some(encoded) if !encoded.trim().is_empty() => MasterKey::from_base64(&encoded),
            _ => Err(VaultError::Config(format!(
                "{} is not set. Generate a key with `credvault keygen`",
                self.master_key_env
            ))),
        }
    }

    /// Build the configured envelope backend around `master_key`.
    pub fn encryption(&self, master_key: MasterKey) -> Result<EncryptionSetup> {
        match self.backend {
            Backend::MasterKey => Ok(EncryptionSetup {
                service: Arc::new(MasterKeyEnvelopeService::new(master_key, &self.key_id)),
                cache: None,
            }),
            Backend::LocalKms => {
                let cache = Arc::new(DataKeyCache::new(self.cache_ttl()));
                let provider = Arc::new(LocalKeyProvider::new(master_key));
                let service = KmsEnvelopeService::new(provider, &self.key_id)?
                    .with_cache(Arc::clone(&cache));
                Ok(EncryptionSetup {
                    service: Arc::new(service),
                    cache: Some(cache),
                })
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn default_settings_are_sensible() {
        let s = Settings::default();
        assert_eq!(s.backend, Backend::MasterKey);
        assert_eq!(s.master_key_env, "CREDVAULT_MASTER_KEY");
        assert_eq!(s.data_key_cache_ttl_secs, 300);
        assert_eq!(s.cache_sweep_interval_secs, 60);
        assert_eq!(s.default_tenant, "default");
        assert!(s.validate().is_ok());
    }

    #[test]
    fn load_returns_defaults_when_no_config_file() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.key_id, "credvault-master-v1");
    }

    #[test]
    fn load_parses_toml_file() {
        let tmp = TempDir::new().unwrap();
        let config = r#"
database_path = "/var/lib/credvault/vault.db"
backend = "local-kms"
key_id = "alias/credentials"
data_key_cache_ttl_secs = 120
cache_sweep_interval_secs = 30
default_tenant = "acme"
"#;
        fs::write(tmp.path().join(".credvault.toml"), config).unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.backend, Backend::LocalKms);
        assert_eq!(settings.key_id, "alias/credentials");
        assert_eq!(settings.cache_ttl(), Duration::from_secs(120));
        assert_eq!(settings.default_tenant, "acme");
        // Untouched fields keep their defaults.
        assert_eq!(settings.master_key_env, "CREDVAULT_MASTER_KEY");
        assert_eq!(
            settings.database_path(tmp.path()),
            PathBuf::from("/var/lib/credvault/vault.db")
        );
    }

    #[test]
    fn load_errors_on_invalid_toml() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".credvault.toml"), "not valid {{toml").unwrap();
        assert!(Settings::load(tmp.path()).is_err());
    }

    #[test]
    fn sweep_interval_may_not_exceed_ttl() {
        let s = Settings {
            data_key_cache_ttl_secs: 30,
            cache_sweep_interval_secs: 60,
            ..Settings::default()
        };
        assert!(matches!(s.validate(), Err(VaultError::Config(_))));
    }

    #[test]
    fn cache_ttl_is_bounded() {
        for ttl in [0, MAX_CACHE_TTL_SECS + 1, u64::MAX] {
            let s = Settings {
                data_key_cache_ttl_secs: ttl,
                ..Settings::default()
            };
            assert!(matches!(s.validate(), Err(VaultError::Config(_))), "ttl {ttl}");
        }

        let s = Settings {
            data_key_cache_ttl_secs: MAX_CACHE_TTL_SECS,
            ..Settings::default()
        };
        assert!(s.validate().is_ok());
    }

    #[test]
    fn oversized_ttl_in_config_file_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let config = "backend = \"local-kms\"\ndata_key_cache_ttl_secs = 9223372036854775807\n";
        fs::write(tmp.path().join(".credvault.toml"), config).unwrap();
        assert!(matches!(Settings::load(tmp.path()), Err(VaultError::Config(_))));
    }

    #[test]
    fn relative_database_path_resolves_against_config_dir() {
        let s = Settings::default();
        assert_eq!(
            s.database_path(Path::new("/srv/app")),
            PathBuf::from("/srv/app/.credvault/credentials.db")
        );
    }

    #[test]
    fn master_key_must_be_present_and_32_bytes() {
        let s = Settings::default();

        let missing = s.parse_master_key(None).unwrap_err().to_string();
        assert!(missing.contains("CREDVAULT_MASTER_KEY"));
        assert!(s.parse_master_key(Some("  ".into())).is_err());
        assert!(s.parse_master_key(Some("c2hvcnQ=".into())).is_err());

        let good = MasterKey::generate_base64().unwrap();
        assert!(s.parse_master_key(Some(good.to_string())).is_ok());
    }

    #[test]
    fn both_backends_build() {
        let master = Settings::default()
            .encryption(MasterKey::new([1u8; 32]))
            .unwrap();
        assert_eq!(master.service.backend(), "master-key");
        assert!(master.cache.is_none());

        let kms = Settings {
            backend: Backend::LocalKms,
            ..Settings::default()
        }
        .encryption(MasterKey::new([1u8; 32]))
        .unwrap();
        assert_eq!(kms.service.backend(), "kms");
        assert!(kms.cache.is_some());
    }
}
