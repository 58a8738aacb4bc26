//! `credvault keygen`: print a fresh base64 master key.

use crate::cli::output;
use crate::crypto::MasterKey;
use crate::errors::Result;

/// Execute the `keygen` command.
pub fn execute() -> Result<()> {
    let key = MasterKey::generate_base64()?;

    // The key goes to stdout alone so it can be captured by scripts.
    println!("{}", key.as_str());

    output::tip("Store it in a secret manager and export it as CREDVAULT_MASTER_KEY.");
    output::tip("Losing this key makes every stored credential unreadable.");
    Ok(())
}
