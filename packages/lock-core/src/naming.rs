//! Naming helpers for records bootstrapped from a component/cluster
//! identifier pair, grounded on the Go source's `GetName`/`TruncateLabel`.

use regex::Regex;
use std::sync::OnceLock;

fn non_alnum() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("[^a-zA-Z0-9]").expect("static pattern is valid"))
}

/// Composes a record name from a fixed `prefix` and a caller-supplied `id`
/// (typically a cluster identifier), lower-cased and stripped of every
/// non-alphanumeric character.
#[must_use]
pub fn compose_name(prefix: &str, id: &str) -> String {
    let cleaned = non_alnum().replace_all(id, "");
    format!("{prefix}{}", cleaned.to_lowercase())
}

/// Truncates a label to the first 63 characters, the common orchestrator
/// label-value length limit.
#[must_use]
pub fn truncate_label(label: &str) -> String {
    label.chars().take(63).collect()
}
