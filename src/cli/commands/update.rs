//! `credvault update`: change a credential's fields or value.

use crate::cli::{expiry_from_now, open_vault, output, parse_object, read_payload, Cli, PayloadArgs};
use crate::credential::CredentialUpdate;
use crate::errors::Result;

/// Arguments of the `update` command, gathered from clap.
pub struct UpdateArgs<'a> {
    pub rename: Option<&'a str>,
    pub status: Option<&'a str>,
    pub metadata: Option<&'a str>,
    pub expires_in: Option<&'a str>,
    pub clear_expiry: bool,
    pub payload: &'a PayloadArgs,
}

/// Execute the `update` command.
pub async fn execute(cli: &Cli, name: &str, args: UpdateArgs<'_>) -> Result<()> {
    let expires_at = if args.clear_expiry {
        Some(None)
    } else {
        match args.expires_in {
            Some(ttl) => Some(Some(expiry_from_now(ttl)?)),
            None => None,
        }
    };

    let update = CredentialUpdate {
        name: args.rename.map(str::to_string),
        status: args.status.map(str::parse).transpose()?,
        metadata: args
            .metadata
            .map(|raw| parse_object(raw, "--metadata"))
            .transpose()?,
        expires_at,
        data: read_payload(args.payload)?,
    };

    if update.is_empty() {
        output::info("Nothing to update.");
        output::tip("Pass --rename, --status, --metadata, --expires-in, --clear-expiry, or a new value.");
        return Ok(());
    }

    let vault = open_vault(cli).await?;
    let current = vault.service.get_by_name(&vault.ctx.tenant_id, name).await?;
    let updated = vault.service.update(&vault.ctx, current.id, update).await?;

    output::success(&format!("Updated credential '{}'", updated.name));
    Ok(())
}
