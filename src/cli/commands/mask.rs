//! `credvault mask`: redact credential values from text on stdin.
//!
//! Usage:
//!   some-tool 2>&1 | credvault mask stripe-live github-bot

use std::io::{self, Read};

use crate::cli::{open_vault, Cli};
use crate::errors::Result;
use crate::masking::SecretMasker;

/// Execute the `mask` command.
pub async fn execute(cli: &Cli, names: &[String], json: bool) -> Result<()> {
    let vault = open_vault(cli).await?;

    let mut masker = SecretMasker::new();
    for name in names {
        let data = vault.service.get_value_by_name(&vault.ctx, name).await?;
        masker.add_data(&data);
    }

    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;

    if json {
        let value: serde_json::Value = serde_json::from_str(&input)?;
        println!("{}", serde_json::to_string_pretty(&masker.mask_value(&value))?);
    } else {
        print!("{}", masker.mask_str(&input));
    }
    Ok(())
}
