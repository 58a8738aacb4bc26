//! `credvault get`: decrypt and print a credential's value.

use crate::cli::{open_vault, Cli};
use crate::errors::{Result, VaultError};

/// Execute the `get` command.
pub async fn execute(cli: &Cli, name: &str, field: Option<&str>) -> Result<()> {
    let vault = open_vault(cli).await?;
    let data = vault.service.get_value_by_name(&vault.ctx, name).await?;

    match field {
        Some(field) => {
            let value = data
                .get(field)
                .ok_or_else(|| VaultError::NotFound(format!("field '{field}' of '{name}'")))?;
            // Strings print raw so the output can be piped.
            match value {
                serde_json::Value::String(s) => println!("{s}"),
                other => println!("{other}"),
            }
        }
        None => println!("{}", serde_json::to_string_pretty(&data)?),
    }

    Ok(())
}
