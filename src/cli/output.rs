//! Colored terminal output helpers.
//!
//! All user-facing output goes through these functions so we get
//! consistent styling across every command.

use chrono::{DateTime, Utc};
use comfy_table::{ContentArrangement, Table};
use console::style;

use crate::audit::{AccessLogEntry, AccessType, RotationAuditEntry};
use crate::credential::{CredentialStatus, CredentialSummary, CredentialTypeSchema, CredentialVersion};

/// Print a green success message: "check_mark {msg}"
pub fn success(msg: &str) {
    println!("{} {}", style("\u{2713}").green().bold(), msg);
}

/// Print a red error message: "x_mark {msg}"
pub fn error(msg: &str) {
    eprintln!("{} {}", style("\u{2717}").red().bold(), msg);
}

/// Print a yellow warning: "warning_sign {msg}"
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("\u{26a0}").yellow().bold(), msg);
}

/// Print a blue info message: "info_sign {msg}"
pub fn info(msg: &str) {
    println!("{} {}", style("\u{2139}").blue().bold(), msg);
}

/// Print a dim tip/hint: "arrow {msg}"
pub fn tip(msg: &str) {
    println!("{} {}", style("\u{2192}").dim(), style(msg).dim());
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header);
    table
}

fn time(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn opt_time(at: Option<&DateTime<Utc>>) -> String {
    at.map_or_else(|| "-".to_string(), time)
}

fn colorize_status(status: CredentialStatus) -> String {
    let s = status.as_str();
    match status {
        CredentialStatus::Active => style(s).green().to_string(),
        CredentialStatus::Expired => style(s).yellow().to_string(),
        CredentialStatus::Revoked => style(s).red().to_string(),
    }
}

fn colorize_access(access: AccessType) -> String {
    let s = access.as_str();
    match access {
        AccessType::Read => style(s).cyan().to_string(),
        AccessType::Update => style(s).blue().to_string(),
        AccessType::Rotate => style(s).yellow().to_string(),
        AccessType::Delete => style(s).red().to_string(),
    }
}

/// Print a table of credential summaries.
pub fn print_credentials_table(credentials: &[CredentialSummary]) {
    if credentials.is_empty() {
        info("No credentials for this tenant yet.");
        tip("Run `credvault create <NAME> --type <TYPE> --field key=value` to add one.");
        return;
    }

    let mut table = new_table(vec!["Name", "Type", "Status", "Key", "Expires", "Last used", "Updated"]);
    for c in credentials {
        table.add_row(vec![
            c.name.clone(),
            c.credential_type.to_string(),
            colorize_status(c.status),
            c.key_id.clone().unwrap_or_else(|| "(no value)".to_string()),
            opt_time(c.expires_at.as_ref()),
            opt_time(c.last_used_at.as_ref()),
            time(&c.updated_at),
        ]);
    }
    println!("{table}");
}

/// Print a credential's versions, newest first.
pub fn print_versions_table(versions: &[CredentialVersion]) {
    if versions.is_empty() {
        info("No versions recorded yet.");
        return;
    }

    let mut table = new_table(vec!["Version", "Active", "Key", "Created", "By", "Reason"]);
    for v in versions {
        let active = if v.is_active {
            style("yes").green().bold().to_string()
        } else {
            style("no").dim().to_string()
        };
        table.add_row(vec![
            v.version.to_string(),
            active,
            v.secret.key_id.clone(),
            time(&v.created_at),
            v.created_by.clone(),
            v.rotation_reason.clone().unwrap_or_else(|| "-".to_string()),
        ]);
    }
    println!("{table}");
}

/// Print rotation audit rows.
pub fn print_rotation_table(entries: &[RotationAuditEntry]) {
    if entries.is_empty() {
        info("Never rotated.");
        return;
    }

    let mut table = new_table(vec!["Time", "Version", "Key", "By", "Reason"]);
    for e in entries {
        let version = match e.previous_version {
            Some(prev) => format!("{prev} \u{2192} {}", e.new_version),
            None => e.new_version.to_string(),
        };
        let key = match &e.previous_key_id {
            Some(prev) if prev != &e.new_key_id => format!("{prev} \u{2192} {}", e.new_key_id),
            _ => e.new_key_id.clone(),
        };
        table.add_row(vec![
            time(&e.rotated_at),
            version,
            key,
            e.rotated_by.clone(),
            e.reason.clone().unwrap_or_else(|| "-".to_string()),
        ]);
    }
    println!("{table}");
}

/// Print access log entries; `name_of` supplies the credential column.
pub fn print_access_table(entries: &[AccessLogEntry], name_of: impl Fn(&AccessLogEntry) -> String) {
    if entries.is_empty() {
        info("No access log entries found.");
        return;
    }

    let mut table = new_table(vec!["Time", "Access", "Credential", "By", "Result"]);
    for e in entries {
        let result = if e.success {
            style("ok").green().to_string()
        } else {
            style(e.error_message.as_deref().unwrap_or("failed"))
                .red()
                .to_string()
        };
        table.add_row(vec![
            time(&e.accessed_at),
            colorize_access(e.access_type),
            name_of(e),
            e.accessed_by.clone(),
            result,
        ]);
    }

    println!(
        "{}",
        style(format!("{} access log entries:", entries.len())).bold()
    );
    println!("{table}");
}

/// Print credential type schemas.
pub fn print_schemas_table(schemas: &[CredentialTypeSchema]) {
    let mut table = new_table(vec!["Type", "Required", "Optional"]);
    for s in schemas {
        let join = |fields: &[String]| {
            if fields.is_empty() {
                "-".to_string()
            } else {
                fields.join(", ")
            }
        };
        table.add_row(vec![
            s.credential_type.clone(),
            join(&s.required_fields),
            join(&s.optional_fields),
        ]);
    }
    println!("{table}");
}
