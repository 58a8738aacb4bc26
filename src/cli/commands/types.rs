//! `credvault types`: required and optional fields per credential type.

use crate::cli::output;
use crate::credential::CredentialType;
use crate::errors::Result;

/// Execute the `types` command.
pub fn execute(credential_type: Option<&str>, json: bool) -> Result<()> {
    let schemas = match credential_type {
        Some(tag) => vec![CredentialType::parse(tag).schema()],
        None => CredentialType::all_schemas(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&schemas)?);
    } else {
        output::print_schemas_table(&schemas);
    }
    Ok(())
}
