//! Captured table schema metadata.

use serde::{Deserialize, Serialize};

/// Precision and scale are only honoured inside this range.
const MAX_PRECISION: u32 = 38;

/// Metadata for one column of a live table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    /// Engine type name as reported by the catalog, upper-cased.
    pub type_name: String,
    pub size: Option<u32>,
    pub precision: Option<u8>,
    pub scale: Option<u8>,
    pub nullable: bool,
}

impl ColumnSchema {
    /// Build a column from a declared SQL type such as `VARCHAR(36)` or
    /// `DECIMAL(10,2)`.
    pub fn from_declared(name: impl Into<String>, declared: &str, nullable: bool) -> Self {
        let (type_name, modifiers) = split_type_modifiers(declared);
        let is_decimal = matches!(type_name.as_str(), "DECIMAL" | "NUMERIC");
        let (size, precision, scale) = match (is_decimal, modifiers.as_slice()) {
            (true, [p]) => (None, clamp_precision(*p), Some(0)),
            (true, [p, s, ..]) => (None, clamp_precision(*p), clamp_precision(*s)),
            (false, [n, ..]) => (Some(*n), None, None),
            _ => (None, None, None),
        };
        Self {
            name: name.into(),
            type_name,
            size,
            precision,
            scale,
            nullable,
        }
    }

    /// Build a column from catalog values (e.g. `information_schema.columns`).
    pub fn from_catalog(
        name: impl Into<String>,
        type_name: &str,
        size: Option<i64>,
        precision: Option<i64>,
        scale: Option<i64>,
        nullable: bool,
    ) -> Self {
        let (base, _) = split_type_modifiers(type_name);
        Self {
            name: name.into(),
            type_name: base,
            size: size.and_then(|s| u32::try_from(s).ok()),
            precision: precision.and_then(|p| u32::try_from(p).ok()).and_then(clamp_precision),
            scale: scale.and_then(|s| u32::try_from(s).ok()).and_then(clamp_precision),
            nullable,
        }
    }
}

fn clamp_precision(value: u32) -> Option<u8> {
    if value <= MAX_PRECISION {
        u8::try_from(value).ok()
    } else {
        None
    }
}

/// Split `VARCHAR(36)` into `("VARCHAR", [36])`.
fn split_type_modifiers(declared: &str) -> (String, Vec<u32>) {
    let declared = declared.trim();
    match declared.split_once('(') {
        Some((base, rest)) => {
            let inner = rest.trim_end().trim_end_matches(')');
            let modifiers = inner
                .split(',')
                .filter_map(|m| m.trim().parse::<u32>().ok())
                .collect();
            (base.trim().to_uppercase(), modifiers)
        }
        None => (declared.to_uppercase(), Vec::new()),
    }
}

/// Column metadata for one table, in ordinal order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn new(table: impl Into<String>, columns: Vec<ColumnSchema>) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }

    /// Case-insensitive column lookup.
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
