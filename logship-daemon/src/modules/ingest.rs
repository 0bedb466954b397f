//! Ingest pipeline module initialization.
//!
//! Converts the `[syslog]`, `[file_tail]` and `[pipeline]` sections into a
//! `PipelineConfig`, builds the `LogPipeline` around the shared ingestor,
//! and wraps it in a `ModuleHandle`.
//!
//! ```text
//! syslog-udp / syslog-tcp / file-tail --RawLog--> processor --> Ingestor --> Store
//! ```

use anyhow::Result;

use logship_core::LogshipConfig;
use logship_pipeline::{Ingestor, LogPipelineBuilder, PipelineConfig};

use super::ModuleHandle;

/// Module name used in logs and health reports.
pub const NAME: &str = "ingest";

/// Initialize the ingest pipeline module.
///
/// The module is always registered; with every collector disabled it only
/// runs the processing task and HTTP remains the sole input.
pub fn init(config: &LogshipConfig, ingestor: Ingestor) -> Result<ModuleHandle> {
    let pipeline_config = PipelineConfig::from_core(config)
        .map_err(|e| anyhow::anyhow!("invalid ingest pipeline configuration: {}", e))?;

    if pipeline_config.collector_count() == 0 {
        tracing::info!("no syslog or file collectors enabled, HTTP ingest only");
    }
    tracing::info!(
        collectors = pipeline_config.collector_count(),
        "initializing ingest pipeline"
    );

    let pipeline = LogPipelineBuilder::new()
        .config(pipeline_config)
        .ingestor(ingestor)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build ingest pipeline: {}", e))?;

    Ok(ModuleHandle::new(NAME, true, Box::new(pipeline)))
}
