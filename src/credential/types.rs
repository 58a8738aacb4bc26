//! Credential types and their payload validation rules.
//!
//! Every supported shape is a variant of [`CredentialType`]. Tags that do
//! not match a known variant become [`CredentialType::Custom`], which only
//! rejects an empty payload.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::CredentialData;
use crate::errors::{Result, VaultError};

static AWS_REGION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2}-[a-z]+-\d+$").expect("region pattern compiles"));

/// Tags of every built-in type, in the order schemas are listed.
const KNOWN_TAGS: &[&str] = &[
    "api_key",
    "oauth2",
    "basic_auth",
    "bearer_token",
    "aws",
    "gcp_service_account",
    "azure",
    "postgres",
    "mysql",
    "mongodb",
    "redis",
    "rabbitmq",
    "kafka",
    "smtp",
    "sendgrid",
    "twilio",
    "mailgun",
    "s3",
    "gcs",
    "azure_blob",
    "slack",
    "github",
    "stripe",
    "ssh_key",
];

/// The semantic type of a stored credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum CredentialType {
    ApiKey,
    OAuth2,
    BasicAuth,
    BearerToken,
    Aws,
    GcpServiceAccount,
    Azure,
    Postgres,
    Mysql,
    Mongodb,
    Redis,
    Rabbitmq,
    Kafka,
    Smtp,
    Sendgrid,
    Twilio,
    Mailgun,
    S3,
    Gcs,
    AzureBlob,
    Slack,
    Github,
    Stripe,
    SshKey,
    /// Any other tag. Accepts any non-empty payload.
    Custom(String),
}

/// Introspection view of one credential type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialTypeSchema {
    #[serde(rename = "type")]
    pub credential_type: String,
    pub required_fields: Vec<String>,
    pub optional_fields: Vec<String>,
}

impl CredentialType {
    /// Map a tag to its variant. Unknown tags fall back to `Custom`.
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "api_key" => Self::ApiKey,
            "oauth2" => Self::OAuth2,
            "basic_auth" => Self::BasicAuth,
            "bearer_token" => Self::BearerToken,
            "aws" => Self::Aws,
            "gcp_service_account" => Self::GcpServiceAccount,
            "azure" => Self::Azure,
            "postgres" => Self::Postgres,
            "mysql" => Self::Mysql,
            "mongodb" => Self::Mongodb,
            "redis" => Self::Redis,
            "rabbitmq" => Self::Rabbitmq,
            "kafka" => Self::Kafka,
            "smtp" => Self::Smtp,
            "sendgrid" => Self::Sendgrid,
            "twilio" => Self::Twilio,
            "mailgun" => Self::Mailgun,
            "s3" => Self::S3,
            "gcs" => Self::Gcs,
            "azure_blob" => Self::AzureBlob,
            "slack" => Self::Slack,
            "github" => Self::Github,
            "stripe" => Self::Stripe,
            "ssh_key" => Self::SshKey,
            _ => Self::Custom(tag.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::ApiKey => "api_key",
            Self::OAuth2 => "oauth2",
            Self::BasicAuth => "basic_auth",
            Self::BearerToken => "bearer_token",
            Self::Aws => "aws",
            Self::GcpServiceAccount => "gcp_service_account",
            Self::Azure => "azure",
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::Mongodb => "mongodb",
            Self::Redis => "redis",
            Self::Rabbitmq => "rabbitmq",
            Self::Kafka => "kafka",
            Self::Smtp => "smtp",
            Self::Sendgrid => "sendgrid",
            Self::Twilio => "twilio",
            Self::Mailgun => "mailgun",
            Self::S3 => "s3",
            Self::Gcs => "gcs",
            Self::AzureBlob => "azure_blob",
            Self::Slack => "slack",
            Self::Github => "github",
            Self::Stripe => "stripe",
            Self::SshKey => "ssh_key",
            Self::Custom(tag) => tag,
        }
    }

    /// Every built-in type, excluding `Custom`.
    pub fn known() -> Vec<CredentialType> {
        KNOWN_TAGS.iter().map(|t| Self::parse(t)).collect()
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }

    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::ApiKey => &["api_key"],
            Self::OAuth2 => &["client_id", "client_secret"],
            Self::BasicAuth => &["username", "password"],
            Self::BearerToken => &["token"],
            Self::Aws => &["access_key_id", "secret_access_key"],
            Self::GcpServiceAccount => &["project_id", "client_email", "private_key"],
            Self::Azure => &["tenant_id", "client_id", "client_secret"],
            Self::Postgres | Self::Mysql => &["host", "username", "password", "database"],
            Self::Mongodb => &["connection_string"],
            Self::Redis => &["host"],
            Self::Rabbitmq => &["host", "username", "password"],
            Self::Kafka => &["bootstrap_servers"],
            Self::Smtp => &["host", "username", "password"],
            Self::Sendgrid => &["api_key"],
            Self::Twilio => &["account_sid", "auth_token"],
            Self::Mailgun => &["api_key", "domain"],
            Self::S3 => &["access_key_id", "secret_access_key", "bucket"],
            Self::Gcs => &["project_id", "client_email", "private_key", "bucket"],
            Self::AzureBlob => &["account_name", "account_key"],
            Self::Slack => &["bot_token"],
            Self::Github => &["token"],
            Self::Stripe => &["secret_key"],
            Self::SshKey => &["host", "username", "private_key"],
            Self::Custom(_) => &[],
        }
    }

    pub fn optional_fields(&self) -> &'static [&'static str] {
        match self {
            Self::ApiKey => &["base_url", "header_name"],
            Self::OAuth2 => &[
                "access_token",
                "refresh_token",
                "token_url",
                "auth_url",
                "scopes",
                "expires_at",
            ],
            Self::BasicAuth => &["url"],
            Self::BearerToken => &["expires_at"],
            Self::Aws => &["region", "session_token"],
            Self::GcpServiceAccount => &["private_key_id", "client_id", "token_uri"],
            Self::Azure => &["subscription_id"],
            Self::Postgres | Self::Mysql => &["port", "ssl_mode"],
            Self::Mongodb => &["database"],
            Self::Redis => &["port", "username", "password", "db", "tls"],
            Self::Rabbitmq => &["port", "vhost"],
            Self::Kafka => &["username", "password", "sasl_mechanism", "security_protocol"],
            Self::Smtp => &["port", "from_address", "use_tls"],
            Self::Sendgrid => &["from_email"],
            Self::Twilio => &["from_number"],
            Self::Mailgun => &["region"],
            Self::S3 => &["region", "endpoint"],
            Self::Gcs => &["private_key_id"],
            Self::AzureBlob => &["container", "endpoint"],
            Self::Slack => &["signing_secret", "webhook_url"],
            Self::Github => &["owner", "base_url"],
            Self::Stripe => &["publishable_key", "webhook_secret"],
            Self::SshKey => &["port", "passphrase"],
            Self::Custom(_) => &[],
        }
    }

    /// Check a plaintext payload against this type's rules.
    ///
    /// Runs before anything is encrypted. Error messages name the offending
    /// field but never echo its value.
    pub fn validate(&self, data: &CredentialData) -> Result<()> {
        if data.is_empty() {
            return Err(VaultError::Validation(format!(
                "{}: credential data is empty",
                self.as_str()
            )));
        }

        for field in self.required_fields() {
            match data.get(*field) {
                None | Some(Value::Null) => {
                    return Err(VaultError::Validation(format!(
                        "{}: missing required field '{field}'",
                        self.as_str()
                    )));
                }
                Some(Value::String(s)) if s.trim().is_empty() => {
                    return Err(VaultError::Validation(format!(
                        "{}: required field '{field}' is blank",
                        self.as_str()
                    )));
                }
                Some(_) => {}
            }
        }

        if matches!(self, Self::Aws | Self::S3) {
            if let Some(region) = data.get("region") {
                let valid = region.as_str().is_some_and(|r| AWS_REGION.is_match(r));
                if !valid {
                    return Err(VaultError::Validation(format!(
                        "{}: field 'region' must look like 'us-east-1'",
                        self.as_str()
                    )));
                }
            }
        }

        if self.optional_fields().contains(&"port") {
            if let Some(port) = data.get("port") {
                check_port(self.as_str(), port)?;
            }
        }

        Ok(())
    }

    pub fn schema(&self) -> CredentialTypeSchema {
        CredentialTypeSchema {
            credential_type: self.as_str().to_string(),
            required_fields: self.required_fields().iter().map(|f| f.to_string()).collect(),
            optional_fields: self.optional_fields().iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Schemas for every built-in type followed by the `custom` fallback.
    pub fn all_schemas() -> Vec<CredentialTypeSchema> {
        let mut schemas: Vec<_> = Self::known().iter().map(Self::schema).collect();
        schemas.push(Self::Custom("custom".to_string()).schema());
        schemas
    }
}

/// Ports may be JSON integers or numeric strings, in 1..=65535.
fn check_port(type_tag: &str, port: &Value) -> Result<()> {
    let parsed = match port {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    match parsed {
        Some(p) if (1..=65_535).contains(&p) => Ok(()),
        _ => Err(VaultError::Validation(format!(
            "{type_tag}: field 'port' must be a number between 1 and 65535"
        ))),
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialType {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<String> for CredentialType {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<CredentialType> for String {
    fn from(t: CredentialType) -> Self {
        t.as_str().to_string()
    }
}
