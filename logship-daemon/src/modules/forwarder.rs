//! Forwarder module initialization.
//!
//! The module is registered disabled when no destinations are configured,
//! so kept events simply accumulate as pending.

use anyhow::Result;

use logship_core::config::ForwardConfig;
use logship_forwarder::ForwarderTask;
use logship_store::Store;

use super::ModuleHandle;

/// Module name used in logs and health reports.
pub const NAME: &str = "forwarder";

/// Initialize the forwarder module from `[forward]`.
pub fn init(config: &ForwardConfig, store: Store) -> Result<ModuleHandle> {
    let enabled = !config.destinations.is_empty();
    if !enabled {
        tracing::info!("no forward destinations configured, forwarder disabled");
    }

    let task = ForwarderTask::from_config(store, config)
        .map_err(|e| anyhow::anyhow!("failed to build forwarder: {}", e))?;

    Ok(ModuleHandle::new(NAME, enabled, Box::new(task)))
}
