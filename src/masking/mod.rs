//! Redaction of known secret values from text and JSON output.
//!
//! Execution output is masked with the exact plaintext values of the
//! credentials that produced it: [`extract_secrets`] collects them,
//! [`mask_string`] / [`mask_value`] replace every occurrence with
//! [`MASK_TOKEN`].

use std::collections::HashSet;
use std::fmt;

use serde_json::{Map, Value};
use zeroize::Zeroize;

use crate::envelope::CredentialData;

/// Replacement for every masked occurrence.
pub const MASK_TOKEN: &str = "[REDACTED]";

/// Replace every occurrence of every non-empty secret in `text`.
///
/// Occurrences are found independently per secret (overlapping ones
/// included) and overlapping ranges collapse into a single token, so the
/// result does not depend on the order of `secrets`.
pub fn mask_string<S: AsRef<str>>(text: &str, secrets: &[S]) -> String {
    let mut ranges: Vec<(usize, usize)> = Vec::new();

    for secret in secrets {
        let secret = secret.as_ref();
        if secret.is_empty() {
            continue;
        }
        let mut from = 0;
        while let Some(offset) = text[from..].find(secret) {
            let start = from + offset;
            ranges.push((start, start + secret.len()));
            // Advance one char so overlapping occurrences are found too.
            let step = text[start..].chars().next().map_or(1, char::len_utf8);
            from = start + step;
        }
    }

    if ranges.is_empty() {
        return text.to_string();
    }

    ranges.sort_unstable();
    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(ranges.len());
    for (start, end) in ranges {
        match merged.last_mut() {
            Some(last) if start < last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end) in merged {
        out.push_str(&text[cursor..start]);
        out.push_str(MASK_TOKEN);
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Masked copy of `value`: string leaves are masked, everything else
/// (keys, numbers, booleans, null) is copied unchanged.
pub fn mask_value<S: AsRef<str>>(value: &Value, secrets: &[S]) -> Value {
    match value {
        Value::String(s) => Value::String(mask_string(s, secrets)),
        Value::Array(items) => Value::Array(items.iter().map(|v| mask_value(v, secrets)).collect()),
        Value::Object(map) => Value::Object(mask_json(map, secrets)),
        other => other.clone(),
    }
}

/// Masked copy of a JSON object. The input is never modified.
pub fn mask_json<S: AsRef<str>>(document: &Map<String, Value>, secrets: &[S]) -> Map<String, Value> {
    document
        .iter()
        .map(|(k, v)| (k.clone(), mask_value(v, secrets)))
        .collect()
}

/// Every distinct non-empty string leaf in `value`, in first-seen order.
pub fn extract_secrets(value: &Value) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    collect_strings(value, &mut seen, &mut out);
    out
}

fn collect_strings(value: &Value, seen: &mut HashSet<String>, out: &mut Vec<String>) {
    match value {
        Value::String(s) if !s.is_empty() => {
            if seen.insert(s.clone()) {
                out.push(s.clone());
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, seen, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, seen, out)),
        _ => {}
    }
}

/// Short display form of a secret: first and last four characters.
///
/// Values shorter than 10 characters are fully hidden.
pub fn mask_preview(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() < 10 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// A reusable secret set, built once from decrypted credential payloads.
///
/// The collected values are wiped when the masker is dropped.
#[derive(Default)]
pub struct SecretMasker {
    secrets: Vec<String>,
}

impl SecretMasker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every string leaf of `data`.
    pub fn from_data(data: &CredentialData) -> Self {
        let mut masker = Self::new();
        masker.add_data(data);
        masker
    }

    pub fn add_data(&mut self, data: &CredentialData) {
        for secret in data.values().flat_map(extract_secrets) {
            self.add(secret);
        }
    }

    /// Add one value. Empty and duplicate values are ignored.
    pub fn add(&mut self, secret: impl Into<String>) {
        let secret = secret.into();
        if !secret.is_empty() && !self.secrets.contains(&secret) {
            self.secrets.push(secret);
        }
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    pub fn mask_str(&self, text: &str) -> String {
        mask_string(text, &self.secrets)
    }

    pub fn mask_value(&self, value: &Value) -> Value {
        mask_value(value, &self.secrets)
    }
}

impl fmt::Debug for SecretMasker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretMasker")
            .field("secrets", &self.secrets.len())
            .finish()
    }
}

impl Drop for SecretMasker {
    fn drop(&mut self) {
        for secret in &mut self.secrets {
            secret.zeroize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn masks_every_occurrence() {
        let out = mask_string("key=abc and again abc.", &["abc"]);
        assert_eq!(out, "key=[REDACTED] and again [REDACTED].");
    }

    #[test]
    fn empty_secrets_are_ignored() {
        assert_eq!(mask_string("hello", &["", ""]), "hello");
        let none: [&str; 0] = [];
        assert_eq!(mask_string("hello", &none), "hello");
    }

    #[test]
    fn result_does_not_depend_on_secret_order() {
        let text = "token=abcdef; short=abc; tail=cdefgh";
        let a = mask_string(text, &["abc", "abcdef", "cdefgh"]);
        let b = mask_string(text, &["cdefgh", "abcdef", "abc"]);
        let c = mask_string(text, &["abcdef", "abc", "cdefgh"]);
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert!(!a.contains("abc"));
        assert!(!a.contains("cdefgh"));
    }

    #[test]
    fn overlapping_secrets_leave_no_fragments() {
        // "abcd" and "cdef" overlap inside "abcdef".
        assert_eq!(mask_string("xabcdefx", &["abcd", "cdef"]), "x[REDACTED]x");
        assert_eq!(mask_string("xabcdefx", &["cdef", "abcd"]), "x[REDACTED]x");
    }

    #[test]
    fn overlapping_occurrences_of_one_secret_are_covered() {
        assert_eq!(mask_string("aaaa", &["aa"]), "[REDACTED]");
    }

    #[test]
    fn multibyte_text_is_sliced_on_char_boundaries() {
        let out = mask_string("héllo wörld héllo", &["héllo"]);
        assert_eq!(out, "[REDACTED] wörld [REDACTED]");
    }

    #[test]
    fn mask_json_masks_only_string_leaves_and_keeps_input() {
        let input = json!({
            "status": 200,
            "ok": true,
            "missing": null,
            "body": "Authorization: Bearer sk-live-123",
            "nested": {"items": ["sk-live-123", 7, "plain"]},
            "sk-live-123": "key names are untouched"
        });
        let before = input.clone();
        let doc = input.as_object().unwrap();

        let masked = Value::Object(mask_json(doc, &["sk-live-123"]));

        assert_eq!(input, before, "input must not be mutated");
        assert_eq!(masked["status"], 200);
        assert_eq!(masked["ok"], true);
        assert_eq!(masked["missing"], Value::Null);
        assert_eq!(masked["body"], "Authorization: Bearer [REDACTED]");
        assert_eq!(masked["nested"]["items"], json!(["[REDACTED]", 7, "plain"]));
        assert_eq!(masked["sk-live-123"], "key names are untouched");
    }

    #[test]
    fn mask_token_appears_only_where_secrets_were() {
        let input = json!({"a": "nothing here", "b": ["x", "secret-1"]});
        let masked = mask_value(&input, &["secret-1"]);
        let rendered = masked.to_string();
        assert_eq!(rendered.matches(MASK_TOKEN).count(), 1);
        assert_eq!(masked["a"], "nothing here");
    }

    #[test]
    fn extract_collects_distinct_non_empty_strings() {
        let data = json!({
            "client_id": "id-1",
            "client_secret": "s3cr3t",
            "port": 5432,
            "empty": "",
            "scopes": ["read", "id-1"],
            "nested": {"token": "t0k"}
        });
        let mut found = extract_secrets(&data);
        found.sort();
        assert_eq!(found, vec!["id-1", "read", "s3cr3t", "t0k"]);
    }

    #[test]
    fn masker_built_from_credential_data() {
        let data = json!({"api_key": "sk-abc123", "region": "us-east-1", "retries": 3})
            .as_object()
            .cloned()
            .unwrap();
        let masker = SecretMasker::from_data(&data);
        assert_eq!(masker.len(), 2);
        assert_eq!(
            masker.mask_str("calling with sk-abc123 in us-east-1"),
            "calling with [REDACTED] in [REDACTED]"
        );
        assert!(!format!("{masker:?}").contains("sk-abc123"));
    }

    #[test]
    fn preview_keeps_only_the_edges() {
        assert_eq!(mask_preview("sk-abcdefghijklmnop"), "sk-a...mnop");
        assert_eq!(mask_preview("short"), "****");
        assert_eq!(mask_preview("123456789"), "****");
        assert_eq!(mask_preview("1234567890"), "1234...7890");
    }
}
