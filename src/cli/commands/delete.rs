//! `credvault delete`: remove a credential and all its versions.

use dialoguer::Confirm;

use crate::cli::output;
use crate::cli::{open_vault, Cli};
use crate::errors::{Result, VaultError};

/// Execute the `delete` command.
pub async fn execute(cli: &Cli, name: &str, force: bool) -> Result<()> {
    let vault = open_vault(cli).await?;
    let credential = vault
        .service
        .get_by_name(&vault.ctx.tenant_id, name)
        .await?;

    // Unless --force is set, ask for confirmation before deleting.
    if !force {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete credential '{name}' and its version history?"
            ))
            .default(false)
            .interact()
            .map_err(|e| VaultError::CommandFailed(format!("confirm prompt: {e}")))?;

        if !confirmed {
            output::info("Cancelled.");
            return Ok(());
        }
    }

    vault.service.delete(&vault.ctx, credential.id).await?;
    output::success(&format!("Deleted credential '{name}'"));

    Ok(())
}
