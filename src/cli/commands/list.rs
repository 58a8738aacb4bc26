//! `credvault list`: display a tenant's credentials in a table.

use crate::cli::{open_vault, output, Cli};
use crate::credential::{CredentialFilter, CredentialType};
use crate::errors::Result;

/// Execute the `list` command.
pub async fn execute(
    cli: &Cli,
    credential_type: Option<&str>,
    status: Option<&str>,
    prefix: Option<&str>,
    json: bool,
) -> Result<()> {
    let filter = CredentialFilter {
        credential_type: credential_type.map(CredentialType::parse),
        status: status.map(str::parse).transpose()?,
        name_prefix: prefix.map(str::to_string),
        limit: None,
    };

    let vault = open_vault(cli).await?;
    let credentials = vault.service.list(&vault.ctx.tenant_id, &filter).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&credentials)?);
        return Ok(());
    }

    output::info(&format!(
        "tenant '{}': {} credential(s)",
        vault.ctx.tenant_id,
        credentials.len()
    ));
    output::print_credentials_table(&credentials);

    Ok(())
}
