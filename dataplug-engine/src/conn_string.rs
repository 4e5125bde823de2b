//! Semicolon-separated `key=value` connection strings.

use crate::codec::parse_bool_text;

/// Remove every `name=value` segment from `conn` (key matched
/// case-insensitively) and return the value of the last one removed.
///
/// Other segments are kept verbatim, in order.
pub fn extract_param(conn: &mut String, name: &str) -> Option<String> {
    let mut found = None;
    let mut kept: Vec<&str> = Vec::new();
    for segment in conn.split(';') {
        match segment.split_once('=') {
            Some((key, value)) if key.trim().eq_ignore_ascii_case(name) => {
                found = Some(value.trim().to_string());
            }
            _ if segment.trim().is_empty() => {}
            _ => kept.push(segment),
        }
    }
    if found.is_some() {
        *conn = kept.join(";");
    }
    found
}

/// Interpret a connection-string flag value.
pub fn parse_bool_option(value: &str) -> Option<bool> {
    parse_bool_text(value)
}

/// Parsed view over a connection string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionString {
    pairs: Vec<(String, String)>,
}

impl ConnectionString {
    pub fn parse(conn: &str) -> Self {
        let pairs = conn
            .split(';')
            .filter_map(|segment| segment.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .filter(|(k, _)| !k.is_empty())
            .collect();
        Self { pairs }
    }

    /// Last value for any of `keys`, compared case-insensitively with
    /// spaces ignored (`Data Source` matches `DataSource`).
    pub fn get(&self, keys: &[&str]) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| keys.iter().any(|want| keys_match(k, want)))
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(k, _)| k.as_str())
    }
}

fn keys_match(a: &str, b: &str) -> bool {
    let strip = |s: &str| -> String {
        s.chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect()
    };
    strip(a) == strip(b)
}
