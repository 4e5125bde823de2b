//! Engine adapter capability set.
//!
//! Each database engine supplies one [`EngineAdapter`]. Most capabilities
//! have defaults; an engine only overrides what differs.

use crate::codec::{self, UuidRepr};
use crate::dialect::{MigrationDialect, StandardDialect};
use crate::driver::NativeConnection;
use crate::error::{EngineError, EngineResult};
use crate::schema::ColumnSchema;
use crate::types::{DbValue, NativeParam, NativeType, ParamType};
use uuid::Uuid;

pub trait EngineAdapter: Send + Sync {
    /// Engine name used in logs.
    fn name(&self) -> &str;

    /// Open a native connection. `conn_str` has already had framework-level
    /// keys (such as `KeepAlive`) removed.
    fn open(&self, conn_str: &str) -> EngineResult<Box<dyn NativeConnection>>;

    /// Whether `error`, raised by `sql` on an already-open connection, is
    /// worth one reconnect-and-retry.
    fn needs_reconnect(&self, sql: &str, error: &EngineError) -> bool {
        let _ = (sql, error);
        true
    }

    /// Rewrite portable `@name` command text into the engine's native
    /// parameter syntax. `names` are the distinct parameter names in order.
    fn native_sql(&self, sql: &str, names: &[String]) -> String {
        let _ = names;
        sql.to_string()
    }

    /// Native type for a column of a live table.
    fn native_type_for_column(&self, column: &ColumnSchema) -> NativeType {
        native_type_for_type_name(&column.type_name, self.uuid_native_type())
    }

    /// Native type used for UUID parameters that have no schema column.
    fn uuid_native_type(&self) -> NativeType {
        NativeType::VarChar
    }

    fn native_type_for(&self, declared: ParamType) -> NativeType {
        default_native_type(declared, self.uuid_native_type())
    }

    /// Build the native parameter for `name`, preferring the live column
    /// metadata when the command is bound to a table that has the column.
    fn build_parameter(
        &self,
        name: &str,
        declared: ParamType,
        column: Option<&ColumnSchema>,
    ) -> NativeParam {
        match column {
            Some(col) => NativeParam {
                name: name.to_string(),
                native_type: self.native_type_for_column(col),
                size: col.size,
                precision: col.precision,
                scale: col.scale,
                from_schema: true,
            },
            None => NativeParam::declared(name, self.native_type_for(declared)),
        }
    }

    /// Convert a plugin value to what the native parameter expects.
    fn set_parameter_value(&self, param: &NativeParam, value: DbValue) -> EngineResult<DbValue> {
        bind_value(param.native_type, value)
    }

    fn uuid_repr(&self) -> UuidRepr {
        UuidRepr::String
    }

    fn uuid_to_storage(&self, uuid: Uuid) -> DbValue {
        codec::uuid_to_storage(uuid, self.uuid_repr())
    }

    fn uuid_str_to_storage(&self, text: &str) -> EngineResult<DbValue> {
        let uuid = Uuid::parse_str(text.trim())
            .map_err(|e| EngineError::format(format!("invalid UUID text {text:?}: {e}")))?;
        Ok(self.uuid_to_storage(uuid))
    }

    fn storage_to_uuid(&self, value: &DbValue) -> EngineResult<Uuid> {
        codec::storage_to_uuid(value)
    }

    fn storage_to_uuid_string(&self, value: &DbValue) -> EngineResult<String> {
        codec::storage_to_uuid_string(value)
    }

    fn bool_to_storage(&self, value: bool) -> DbValue {
        codec::bool_to_storage(value)
    }

    fn storage_to_bool(&self, value: &DbValue) -> EngineResult<bool> {
        codec::storage_to_bool(value)
    }

    /// Strategy used to read the applied version of a store.
    fn select_migration_dialect(&self) -> Box<dyn MigrationDialect> {
        Box::new(StandardDialect)
    }
}

/// Map a declared parameter type to a native type.
pub fn default_native_type(declared: ParamType, uuid_type: NativeType) -> NativeType {
    match declared {
        ParamType::String => NativeType::VarChar,
        ParamType::Float | ParamType::Double => NativeType::Float,
        ParamType::Int8 | ParamType::Int16 | ParamType::Int32 => NativeType::Int32,
        ParamType::UInt8 | ParamType::UInt16 | ParamType::UInt32 => NativeType::Int32,
        ParamType::Int64 | ParamType::UInt64 => NativeType::Int64,
        ParamType::Bool => NativeType::Bit,
        ParamType::Uuid => uuid_type,
        ParamType::Bytes => NativeType::Blob,
        ParamType::Other => NativeType::Opaque,
    }
}

/// Map a catalog type name (already stripped of modifiers) to a native type.
pub fn native_type_for_type_name(type_name: &str, uuid_type: NativeType) -> NativeType {
    let upper = type_name.to_uppercase();
    match upper.as_str() {
        "UUID" | "GUID" | "UNIQUEIDENTIFIER" => uuid_type,
        "BOOLEAN" | "BOOL" | "BIT" | "LOGICAL" => NativeType::Bit,
        "INTERVAL" => NativeType::Temporal,
        "BIGINT" | "INT8" | "LONG" | "UBIGINT" | "HUGEINT" | "UINTEGER" => NativeType::Int64,
        s if s.contains("INT") => NativeType::Int32,
        s if s.contains("CHAR") || s.contains("TEXT") || s.contains("CLOB") || s == "STRING" => {
            NativeType::VarChar
        }
        s if s.contains("DOUBLE") || s.contains("FLOAT") || s.contains("REAL") => NativeType::Float,
        "DECIMAL" | "NUMERIC" => NativeType::Decimal,
        "BINARY" | "VARBINARY" => NativeType::Binary,
        s if s.contains("BLOB") || s == "BYTEA" => NativeType::Blob,
        s if s.contains("DATE") || s.contains("TIME") => NativeType::Temporal,
        _ => NativeType::Opaque,
    }
}

/// Default value conversion for a native parameter type.
///
/// UUIDs become native UUIDs, 16 bytes or text depending on the target;
/// text bound to a UUID parameter is parsed; booleans bound to numeric
/// parameters become 1 or 0.
pub fn bind_value(target: NativeType, value: DbValue) -> EngineResult<DbValue> {
    match (target, value) {
        (NativeType::Guid, DbValue::Uuid(u)) => Ok(DbValue::Uuid(u)),
        (NativeType::Binary | NativeType::Blob, DbValue::Uuid(u)) => {
            Ok(DbValue::Blob(u.as_bytes().to_vec()))
        }
        (_, DbValue::Uuid(u)) => Ok(DbValue::Text(u.hyphenated().to_string())),
        (NativeType::Guid, DbValue::Text(s)) => Uuid::parse_str(s.trim())
            .map(DbValue::Uuid)
            .map_err(|e| EngineError::format(format!("invalid UUID text {s:?}: {e}"))),
        (t, DbValue::Bool(b)) if t.is_numeric() => Ok(DbValue::Int(i64::from(b))),
        (_, other) => Ok(other),
    }
}
