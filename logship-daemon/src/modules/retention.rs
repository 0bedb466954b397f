//! Retention module initialization.

use logship_core::config::StorageConfig;
use logship_store::{RetentionTask, Store};

use super::ModuleHandle;

/// Module name used in logs and health reports.
pub const NAME: &str = "retention";

/// Initialize the periodic trim task from `[storage]`.
pub fn init(config: &StorageConfig, store: Store) -> ModuleHandle {
    tracing::info!(
        max_rows = config.max_rows,
        max_db_mb = config.max_db_mb,
        interval_secs = config.trim_interval_secs,
        "initializing retention"
    );
    let task = RetentionTask::from_config(store, config);
    ModuleHandle::new(NAME, true, Box::new(task))
}
