//! Pending-version resolution across both script naming conventions.
//!
//! - Consolidated: `<store>.migrations[.N]`, one resource holding every
//!   version split by `:VERSION` directives. `N` declares its highest
//!   version. When several exist the lexicographically last one wins.
//! - Scattered: `<store>.NNN_<anything>.sql`, one resource per version.
//!
//! Consolidated versions take precedence; scattered resources only add
//! versions above everything the consolidated resource covers.

use crate::error::MigrationResult;
use crate::parser::ScriptParser;
use crate::source::ScriptSource;
use regex_lite::Regex;
use std::collections::BTreeMap;
use tracing::{debug, error};

/// Version to ordered batches, ascending.
pub type PendingScripts = BTreeMap<i64, Vec<String>>;

/// Resolve every version of `store` above `after` from `source`.
pub fn resolve_pending(
    source: &dyn ScriptSource,
    store: &str,
    after: i64,
) -> MigrationResult<PendingScripts> {
    let mut names = source.list_resource_names()?;
    names.sort();

    let mut after = after;
    let mut pending = PendingScripts::new();

    let prefix = format!("{store}.migrations");
    if let Some(name) = names.iter().rev().find(|n| starts_with_ignore_case(n, &prefix)) {
        match declared_version(&name[prefix.len()..]) {
            Some(declared) if declared <= after => {
                debug!(store, resource = %name, declared, after, "Consolidated script already applied");
            }
            _ => {
                let text = source.open_resource(name)?;
                let (parsed, parse_err) = ScriptParser::parse(name, &text, after);
                if let Some(e) = parse_err {
                    error!(store, resource = %name, error = %e, "Stopped parsing migration script");
                }
                pending = parsed.versions;
                if let Some(highest) = parsed.highest {
                    after = after.max(highest);
                }
            }
        }
    }

    let scattered = scattered_pattern(store)?;
    for name in &names {
        let Some(version) = scattered
            .captures(name)
            .and_then(|caps| caps[1].parse::<i64>().ok())
        else {
            continue;
        };
        if version > after && !pending.contains_key(&version) {
            let text = source.open_resource(name)?;
            debug!(store, resource = %name, version, "Found scattered migration script");
            pending.insert(version, vec![text]);
        }
    }

    Ok(pending)
}

/// `.N` suffix of a consolidated resource name, if numeric.
fn declared_version(suffix: &str) -> Option<i64> {
    suffix.strip_prefix('.').and_then(|n| n.parse().ok())
}

fn scattered_pattern(store: &str) -> MigrationResult<Regex> {
    let pattern = format!(r"(?i)^{}\.(\d{{3}})_.*\.sql$", regex_lite::escape(store));
    Ok(Regex::new(&pattern)?)
}

fn starts_with_ignore_case(name: &str, prefix: &str) -> bool {
    name.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}
