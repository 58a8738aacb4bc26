//! `credvault history`: versions and rotation audit of one credential.

use console::style;

use crate::cli::{open_vault, output, Cli};
use crate::errors::Result;

/// Execute the `history` command.
pub async fn execute(cli: &Cli, name: &str) -> Result<()> {
    let vault = open_vault(cli).await?;
    let tenant = &vault.ctx.tenant_id;

    let credential = vault.service.get_by_name(tenant, name).await?;
    let versions = vault.service.versions(tenant, credential.id).await?;
    let rotations = vault.service.rotation_history(tenant, credential.id).await?;

    println!("{}", style(format!("Versions of '{name}':")).bold());
    output::print_versions_table(&versions);

    println!();
    println!("{}", style("Rotations:").bold());
    output::print_rotation_table(&rotations);

    Ok(())
}
