//! Schema migration for dataplug stores.
//!
//! Each logical store records its applied version in a shared `migrations`
//! table. On startup the store's scripts are discovered from a
//! [`ScriptSource`], everything above the applied version is executed in
//! ascending order, and the recorded version advances after each version
//! completes.

mod discovery;
mod error;
mod migration;
mod parser;
mod source;

pub use discovery::{PendingScripts, resolve_pending};
pub use error::{MigrationError, MigrationResult};
pub use migration::{Migration, MigrationReport};
pub use parser::{ParsedScripts, ScriptParser};
pub use source::{DirectoryScripts, EmbeddedScripts, ScriptSource};
