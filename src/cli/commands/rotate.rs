//! `credvault rotate`: install a new value as the next version.
//!
//! The new value is validated against the credential's type, encrypted
//! under the configured key, and becomes the active version. Earlier
//! versions stay readable in `credvault history`.

use crate::cli::{open_vault, output, require_payload, Cli, PayloadArgs};
use crate::errors::Result;

/// Execute the `rotate` command.
pub async fn execute(
    cli: &Cli,
    name: &str,
    payload: &PayloadArgs,
    reason: Option<&str>,
) -> Result<()> {
    let data = require_payload(payload)?;

    let vault = open_vault(cli).await?;
    let credential = vault.service.get_by_name(&vault.ctx.tenant_id, name).await?;
    let outcome = vault
        .service
        .rotate(&vault.ctx, credential.id, &data, reason)
        .await?;

    match outcome.previous_version {
        Some(prev) => output::success(&format!(
            "Rotated '{name}': version {prev} \u{2192} {}",
            outcome.new_version
        )),
        None => output::success(&format!(
            "Set first value of '{name}' (version {})",
            outcome.new_version
        )),
    }
    if outcome.previous_key_id.as_deref().is_some_and(|k| k != outcome.new_key_id) {
        output::info(&format!("Now encrypted under key '{}'", outcome.new_key_id));
    }
    Ok(())
}
