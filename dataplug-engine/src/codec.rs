//! UUID and boolean conversions between plugin values and storage values.

use crate::error::{EngineError, EngineResult};
use crate::types::DbValue;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How an engine stores UUID values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UuidRepr {
    /// Native UUID column type.
    Guid,
    /// Raw 16 bytes.
    Binary,
    /// Hyphenated lowercase text.
    String,
}

pub fn uuid_to_storage(uuid: Uuid, repr: UuidRepr) -> DbValue {
    match repr {
        UuidRepr::Guid => DbValue::Uuid(uuid),
        UuidRepr::Binary => DbValue::Blob(uuid.as_bytes().to_vec()),
        UuidRepr::String => DbValue::Text(uuid.hyphenated().to_string()),
    }
}

/// Decode a stored UUID. Null decodes to the nil UUID.
pub fn storage_to_uuid(value: &DbValue) -> EngineResult<Uuid> {
    match value {
        DbValue::Null => Ok(Uuid::nil()),
        DbValue::Uuid(u) => Ok(*u),
        DbValue::Text(s) => Uuid::parse_str(s.trim())
            .map_err(|e| EngineError::format(format!("invalid UUID text {s:?}: {e}"))),
        DbValue::Blob(b) if b.len() == 16 => {
            Uuid::from_slice(b).map_err(|e| EngineError::format(e.to_string()))
        }
        DbValue::Blob(b) => Err(EngineError::format(format!(
            "can't convert a {}-byte blob to a UUID",
            b.len()
        ))),
        other => Err(EngineError::format(format!(
            "can't convert {} to a UUID",
            other.type_name()
        ))),
    }
}

pub fn storage_to_uuid_string(value: &DbValue) -> EngineResult<String> {
    storage_to_uuid(value).map(|u| u.hyphenated().to_string())
}

pub fn bool_to_storage(value: bool) -> DbValue {
    DbValue::Int(i64::from(value))
}

/// Decode a stored boolean.
///
/// Text is matched case-insensitively against `true`/`yes`/`1` and
/// `false`/`no`/`0`; numbers are true when non-zero; null is false.
pub fn storage_to_bool(value: &DbValue) -> EngineResult<bool> {
    match value {
        DbValue::Null => Ok(false),
        DbValue::Bool(b) => Ok(*b),
        DbValue::Int(i) => Ok(*i != 0),
        DbValue::Float(f) => Ok(*f != 0.0),
        DbValue::Text(s) => parse_bool_text(s)
            .ok_or_else(|| EngineError::format(format!("can't convert {s:?} to a boolean"))),
        other => Err(EngineError::format(format!(
            "can't convert {} to a boolean",
            other.type_name()
        ))),
    }
}

/// Parse `1`/`true`/`yes` and `0`/`false`/`no`, ignoring case and
/// surrounding whitespace.
pub fn parse_bool_text(text: &str) -> Option<bool> {
    let text = text.trim();
    if ["1", "true", "yes"].iter().any(|t| text.eq_ignore_ascii_case(t)) {
        Some(true)
    } else if ["0", "false", "no"].iter().any(|t| text.eq_ignore_ascii_case(t)) {
        Some(false)
    } else {
        None
    }
}
