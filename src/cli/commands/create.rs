//! `credvault create`: add a credential, optionally with its first value.

use crate::cli::{expiry_from_now, open_vault, output, parse_object, read_payload, Cli, PayloadArgs};
use crate::credential::{CredentialType, NewCredential};
use crate::errors::Result;

/// Execute the `create` command.
pub async fn execute(
    cli: &Cli,
    name: &str,
    credential_type: &str,
    payload: &PayloadArgs,
    metadata: Option<&str>,
    expires_in: Option<&str>,
) -> Result<()> {
    let mut request = NewCredential::new(name, CredentialType::parse(credential_type));
    if let Some(data) = read_payload(payload)? {
        request = request.with_data(data);
    }
    if let Some(raw) = metadata {
        request = request.with_metadata(parse_object(raw, "--metadata")?);
    }
    if let Some(ttl) = expires_in {
        request = request.expires_at(expiry_from_now(ttl)?);
    }

    let vault = open_vault(cli).await?;
    let credential = vault.service.create(&vault.ctx, request).await?;

    output::success(&format!(
        "Created {} credential '{}' for tenant '{}'",
        credential.credential_type, credential.name, credential.tenant_id
    ));
    if !credential.has_value() {
        output::tip(&format!(
            "Set its value with `credvault rotate {} --field key=value`.",
            credential.name
        ));
    }
    Ok(())
}
