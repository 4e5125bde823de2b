//! Line-oriented parser for consolidated migration scripts.
//!
//! Script text format:
//!
//! ```text
//! # full-line comment
//! :VERSION 1        # trailing comment
//! CREATE TABLE a (id INTEGER);
//! :GO
//! CREATE INDEX a_id ON a (id);
//! :VERSION 2
//! ALTER TABLE a ADD COLUMN name TEXT;
//! ```
//!
//! `:GO` closes the current batch. `:VERSION n` closes the current version
//! and opens version `n`. Only versions greater than `after` are kept.
//! Comments and directives may be indented.

use crate::error::MigrationError;
use std::collections::BTreeMap;

const VERSION_DIRECTIVE: &str = ":VERSION ";
const GO_DIRECTIVE: &str = ":GO";

/// Versions parsed from one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedScripts {
    /// Version to ordered batches, only versions greater than `after`.
    pub versions: BTreeMap<i64, Vec<String>>,
    /// Highest version marker seen, committed or not.
    pub highest: Option<i64>,
}

/// Explicit parser state: the current version, its pending batches, the
/// batch being accumulated and the committed result.
#[derive(Debug)]
pub struct ScriptParser {
    resource: String,
    after: i64,
    line_no: usize,
    version: Option<i64>,
    highest: Option<i64>,
    batch: String,
    batches: Vec<String>,
    result: BTreeMap<i64, Vec<String>>,
}

impl ScriptParser {
    pub fn new(resource: impl Into<String>, after: i64) -> Self {
        Self {
            resource: resource.into(),
            after,
            line_no: 0,
            version: None,
            highest: None,
            batch: String::new(),
            batches: Vec::new(),
            result: BTreeMap::new(),
        }
    }

    /// Parse a whole resource. A malformed version marker stops parsing;
    /// versions committed before it are still returned alongside the error.
    pub fn parse(
        resource: &str,
        text: &str,
        after: i64,
    ) -> (ParsedScripts, Option<MigrationError>) {
        let mut parser = Self::new(resource, after);
        for line in text.lines() {
            if let Err(e) = parser.feed_line(line) {
                return (parser.finish(), Some(e));
            }
        }
        (parser.finish(), None)
    }

    pub fn current_version(&self) -> Option<i64> {
        self.version
    }

    /// Feed one line of script text.
    pub fn feed_line(&mut self, line: &str) -> Result<(), MigrationError> {
        self.line_no += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(());
        }
        if trimmed.eq_ignore_ascii_case(GO_DIRECTIVE) {
            self.close_batch();
            return Ok(());
        }
        if let Some(rest) = strip_prefix_ignore_case(line.trim_start(), VERSION_DIRECTIVE) {
            self.flush_version();
            let number = rest.split('#').next().unwrap_or_default().trim();
            return match number.parse::<i64>() {
                Ok(v) => {
                    self.version = Some(v);
                    self.highest = Some(self.highest.map_or(v, |h| h.max(v)));
                    Ok(())
                }
                Err(_) => {
                    self.version = None;
                    Err(MigrationError::Parse {
                        resource: self.resource.clone(),
                        line: self.line_no,
                        text: line.to_string(),
                    })
                }
            };
        }
        self.batch.push_str(line);
        self.batch.push('\n');
        Ok(())
    }

    /// Close the batch being accumulated. Empty batches are dropped; so are
    /// batches of versions at or below `after`.
    pub fn close_batch(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.batch);
        if self.is_pending() {
            self.batches.push(batch);
        }
    }

    /// Close the current version, committing its batches when it is pending
    /// and non-empty. The batch list is cleared either way.
    pub fn flush_version(&mut self) {
        self.close_batch();
        let batches = std::mem::take(&mut self.batches);
        if let Some(version) = self.version.filter(|_| !batches.is_empty()) {
            if version > self.after {
                self.result.insert(version, batches);
            }
        }
    }

    /// Final flush.
    pub fn finish(mut self) -> ParsedScripts {
        self.flush_version();
        ParsedScripts {
            versions: self.result,
            highest: self.highest,
        }
    }

    fn is_pending(&self) -> bool {
        self.version.is_some_and(|v| v > self.after)
    }
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &line[prefix.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn go_splits_batches_within_a_version() {
        let mut p = ScriptParser::new("t", 0);
        for line in [":VERSION 1", "CREATE TABLE a (x INT);", ":go", "", "CREATE TABLE b (y INT);"] {
            p.feed_line(line).unwrap();
        }
        let parsed = p.finish();
        assert_eq!(
            parsed.versions[&1],
            vec!["CREATE TABLE a (x INT);\n", "CREATE TABLE b (y INT);\n"]
        );
    }

    #[test]
    fn go_on_empty_batch_is_a_no_op() {
        let mut p = ScriptParser::new("t", 0);
        p.feed_line(":VERSION 1").unwrap();
        p.feed_line(":GO").unwrap();
        p.feed_line(":GO").unwrap();
        p.feed_line("SELECT 1;").unwrap();
        assert_eq!(p.finish().versions[&1], vec!["SELECT 1;\n"]);
    }

    #[test]
    fn versions_at_or_below_after_are_discarded() {
        let text = ":VERSION 1\nA;\n:VERSION 2\nB;\n:VERSION 3 # newest\nC;\n";
        let (parsed, err) = ScriptParser::parse("t", text, 2);
        assert!(err.is_none());
        assert_eq!(parsed.versions.keys().copied().collect::<Vec<_>>(), vec![3]);
        assert_eq!(parsed.highest, Some(3));
    }

    #[test]
    fn sql_before_any_version_is_ignored() {
        let (parsed, _) = ScriptParser::parse("t", "DROP TABLE x;\n:VERSION 1\nA;\n", 0);
        assert_eq!(parsed.versions.len(), 1);
        assert_eq!(parsed.versions[&1], vec!["A;\n"]);
    }

    #[test]
    fn malformed_version_keeps_committed_versions() {
        let text = ":VERSION 1\nA;\n:VERSION two\nB;\n:VERSION 3\nC;\n";
        let (parsed, err) = ScriptParser::parse("store.migrations", text, 0);
        assert!(matches!(err, Some(MigrationError::Parse { line: 3, .. })));
        assert_eq!(parsed.versions.keys().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(parsed.highest, Some(1));
    }

    #[test]
    fn empty_versions_are_not_committed() {
        let (parsed, _) = ScriptParser::parse("t", ":VERSION 1\n# nothing\n:VERSION 2\nB;\n", 0);
        assert!(!parsed.versions.contains_key(&1));
        assert!(parsed.versions.contains_key(&2));
    }

    #[test]
    fn indented_comments_and_directives_are_recognised() {
        let text = "  :VERSION 1\nCREATE TABLE a (x INT);\n    # explain the index\n\t:go\nCREATE INDEX a_x ON a (x); # trailing\n";
        let (parsed, err) = ScriptParser::parse("t", text, 0);
        assert!(err.is_none());
        assert_eq!(
            parsed.versions[&1],
            vec!["CREATE TABLE a (x INT);\n", "CREATE INDEX a_x ON a (x); # trailing\n"]
        );
    }

    #[test]
    fn uncommitted_batches_do_not_leak_into_the_next_version() {
        let mut p = ScriptParser::new("t", 1);
        for line in [":VERSION 1", "OLD;", ":GO", ":VERSION 2", "NEW;"] {
            p.feed_line(line).unwrap();
        }
        assert_eq!(p.finish().versions[&2], vec!["NEW;\n"]);
    }
}
