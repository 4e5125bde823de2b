//! Lifecycle surface every data plugin exposes to its host.

use crate::error::StoreResult;
use crate::manager::ConnectionManager;
use dataplug_migrate::MigrationReport;
use tracing::info;

/// A data plugin backed by one [`ConnectionManager`].
///
/// Implementors register their commands at construction time and usually
/// only provide [`DataPlugin::manager`].
pub trait DataPlugin {
    fn manager(&self) -> &ConnectionManager;

    fn name(&self) -> &str {
        self.manager().name()
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    /// Parse options, migrate the store and bind command tables.
    fn initialise(&self, connection_string: &str) -> StoreResult<MigrationReport> {
        self.manager().initialise(connection_string)
    }

    /// Push any buffered state to the database.
    fn flush(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Flush, then release the connection and every statement handle.
    fn dispose(&self) -> StoreResult<()> {
        let flushed = self.flush();
        self.manager().disconnect();
        info!(plugin = self.name(), "Data plugin disposed");
        flushed
    }
}
