//! `credvault audit`: display the access log.
//!
//! Usage:
//!   credvault audit                  # last 50 entries for the tenant
//!   credvault audit --last 20        # last 20
//!   credvault audit --name stripe    # only one credential

use std::collections::HashMap;

use crate::cli::{open_vault, output, Cli};
use crate::credential::CredentialFilter;
use crate::errors::Result;

/// Execute the `audit` command.
pub async fn execute(cli: &Cli, name: Option<&str>, last: usize) -> Result<()> {
    let vault = open_vault(cli).await?;
    let tenant = &vault.ctx.tenant_id;

    let credential_id = match name {
        Some(name) => Some(vault.service.get_by_name(tenant, name).await?.id),
        None => None,
    };

    let entries = vault.service.access_logs(tenant, credential_id, last).await?;

    // Deleted credentials keep their log rows; show their id instead.
    let names: HashMap<_, _> = vault
        .service
        .list(tenant, &CredentialFilter::default())
        .await?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();

    output::print_access_table(&entries, |entry| {
        names
            .get(&entry.credential_id)
            .cloned()
            .unwrap_or_else(|| entry.credential_id.to_string())
    });

    Ok(())
}
