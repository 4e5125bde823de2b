//! Connection options recognised by the store layer itself.

use dataplug_engine::{extract_param, parse_bool_option};
use serde::{Deserialize, Serialize};
use tracing::warn;

const KEEP_ALIVE_KEY: &str = "KeepAlive";

/// Store-level options split off a plugin connection string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    /// Keep the connection and prepared statements open between calls.
    pub keep_alive: bool,
    /// Connection string handed to the engine, with store-level keys removed.
    pub connection_string: String,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            keep_alive: true,
            connection_string: String::new(),
        }
    }
}

impl ConnectionOptions {
    /// Strip `KeepAlive=<bool>` from `conn`. An unrecognised value is
    /// logged and the default kept.
    pub fn parse(conn: &str) -> Self {
        let mut connection_string = conn.to_string();
        let mut options = Self::default();
        if let Some(value) = extract_param(&mut connection_string, KEEP_ALIVE_KEY) {
            match parse_bool_option(&value) {
                Some(keep_alive) => options.keep_alive = keep_alive,
                None => warn!(value = %value, "Ignoring invalid KeepAlive value"),
            }
        }
        options.connection_string = connection_string;
        options
    }
}
