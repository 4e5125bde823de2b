//! Connection management and prepared commands for dataplug data plugins.
//!
//! A plugin owns one [`ConnectionManager`] built from an engine adapter and
//! its [`PluginSettings`], registers its [`PreparedCommand`]s up front, and
//! calls [`ConnectionManager::initialise`] once with its connection string.
//!
//! ```no_run
//! use std::sync::Arc;
//! use dataplug_engine::{DbValue, ParamType, SqliteAdapter};
//! use dataplug_migrate::EmbeddedScripts;
//! use dataplug_store::{CommandSpec, ConnectionManager, PluginSettings};
//!
//! let scripts = EmbeddedScripts::new().with(
//!     "Notes.migrations",
//!     ":VERSION 1\nCREATE TABLE notes (id VARCHAR(36), body TEXT);\n",
//! );
//! let manager = ConnectionManager::new(
//!     Arc::new(SqliteAdapter::new()),
//!     PluginSettings::new("Notes", Arc::new(scripts)).default_table("notes"),
//! );
//! let insert = manager
//!     .register(CommandSpec::new(
//!         "INSERT INTO notes (id, body) VALUES (@id, @body)",
//!         &[ParamType::Uuid, ParamType::String],
//!     ))
//!     .unwrap();
//! manager.initialise("Data Source=notes.db;KeepAlive=false").unwrap();
//! insert
//!     .execute_for_effect(&[DbValue::Uuid(uuid::Uuid::new_v4()), "hello".into()])
//!     .unwrap();
//! ```

mod command;
mod error;
mod manager;
mod options;
mod plugin;

pub use dataplug_engine::extract_param as extract_conn_param;

pub use command::{CommandSpec, CommandTemplate, PreparedCommand};
pub use error::{StoreError, StoreResult};
pub use manager::{ConnectionManager, PluginSettings};
pub use options::ConnectionOptions;
pub use plugin::DataPlugin;
