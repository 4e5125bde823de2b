//! `@name` parameter markers in command text.

use regex_lite::{Captures, Regex};
use std::sync::LazyLock;

static PARAM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(\w+)").expect("parameter marker pattern is valid"));

/// Distinct parameter names in order of first appearance.
///
/// Markers inside string literals are not skipped.
pub fn param_names(sql: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PARAM_RE.captures_iter(sql) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Rewrite each `@name` to `{prefix}{k}` where `k` is the 1-based position
/// of `name` in `names`. Unknown names are left as-is.
pub fn rewrite_positional(sql: &str, names: &[String], prefix: &str) -> String {
    PARAM_RE
        .replace_all(sql, |caps: &Captures<'_>| {
            match names.iter().position(|n| n == &caps[1]) {
                Some(i) => format!("{prefix}{}", i + 1),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
