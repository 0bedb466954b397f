//! Module registry and initialization.
//!
//! Each background component (ingest pipeline, retention, forwarder) is
//! wrapped as a [`ModuleHandle`] that provides uniform lifecycle
//! management via the [`DynPipeline`] trait.
//!
//! The [`ModuleRegistry`] tracks all registered modules and supports
//! ordered start/stop operations.

pub mod forwarder;
pub mod ingest;
pub mod retention;

use logship_core::pipeline::{DynPipeline, HealthStatus};

/// A handle to a registered module.
///
/// Wraps a `Box<dyn DynPipeline>` with metadata (name, enabled flag).
pub struct ModuleHandle {
    /// Module name for logging and health reporting.
    pub name: String,
    /// Whether this module is enabled in configuration.
    pub enabled: bool,
    /// The module's pipeline implementation (start/stop/health_check).
    pub pipeline: Box<dyn DynPipeline>,
}

impl ModuleHandle {
    /// Create a new module handle.
    pub fn new(name: impl Into<String>, enabled: bool, pipeline: Box<dyn DynPipeline>) -> Self {
        Self {
            name: name.into(),
            enabled,
            pipeline,
        }
    }

    /// Check the module's health status.
    ///
    /// Disabled modules always report `Healthy` (they are not expected to run).
    pub async fn health_check(&self) -> HealthStatus {
        if !self.enabled {
            return HealthStatus::Healthy;
        }
        self.pipeline.health_check().await
    }
}

/// Registry of all daemon modules.
///
/// Provides ordered start/stop and health check aggregation.
pub struct ModuleRegistry {
    /// Modules in registration order (producers before consumers).
    modules: Vec<ModuleHandle>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    /// Register a module.
    ///
    /// Modules should be registered in dependency order:
    /// producers first, consumers last.
    pub fn register(&mut self, handle: ModuleHandle) {
        self.modules.push(handle);
    }

    /// Start all enabled modules in registration order.
    ///
    /// If a module fails to start, the modules started before it are
    /// stopped again in reverse order and the original error is returned.
    pub async fn start_all(&mut self) -> anyhow::Result<()> {
        let mut started = 0;

        for index in 0..self.modules.len() {
            let handle = &mut self.modules[index];
            if !handle.enabled {
                tracing::debug!(module = %handle.name, "skipping disabled module");
                continue;
            }

            tracing::info!(module = %handle.name, "starting module");
            if let Err(e) = handle.pipeline.start().await {
                let err = anyhow::anyhow!("failed to start module '{}': {}", handle.name, e);
                self.rollback(index).await;
                return Err(err);
            }
            tracing::info!(module = %handle.name, "module started successfully");
            started += 1;
        }

        tracing::debug!(started, "all modules started");
        Ok(())
    }

    /// Stop the enabled modules registered before `failed`, newest first.
    async fn rollback(&mut self, failed: usize) {
        for handle in self.modules[..failed].iter_mut().rev() {
            if !handle.enabled {
                continue;
            }
            tracing::warn!(module = %handle.name, "rolling back module after startup failure");
            if let Err(e) = handle.pipeline.stop().await {
                tracing::error!(module = %handle.name, error = %e, "rollback stop failed");
            }
        }
    }

    /// Stop all enabled modules in reverse registration order.
    ///
    /// Logs errors but continues stopping remaining modules.
    pub async fn stop_all(&mut self) -> anyhow::Result<()> {
        let mut errors = Vec::new();

        for handle in self.modules.iter_mut().rev() {
            if !handle.enabled {
                continue;
            }

            tracing::info!(module = %handle.name, "stopping module");
            if let Err(e) = handle.pipeline.stop().await {
                tracing::error!(
                    module = %handle.name,
                    error = %e,
                    "failed to stop module"
                );
                errors.push(format!("{}: {}", handle.name, e));
            } else {
                tracing::info!(module = %handle.name, "module stopped successfully");
            }
        }

        if !errors.is_empty() {
            return Err(anyhow::anyhow!(
                "errors stopping modules: {}",
                errors.join("; ")
            ));
        }

        Ok(())
    }

    /// Get health status for all modules.
    pub async fn health_statuses(&self) -> Vec<(String, bool, HealthStatus)> {
        let mut statuses = Vec::new();
        for handle in &self.modules {
            let status = handle.health_check().await;
            statuses.push((handle.name.clone(), handle.enabled, status));
        }
        statuses
    }

    /// Number of registered modules.
    pub fn count(&self) -> usize {
        self.modules.len()
    }

    /// Number of enabled modules.
    pub fn enabled_count(&self) -> usize {
        self.modules.iter().filter(|m| m.enabled).count()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use logship_core::error::{LogshipError, PipelineError};
    use logship_core::pipeline::Pipeline;

    use super::*;

    /// Records start/stop calls into a shared journal.
    struct Recorder {
        name: &'static str,
        fail_start: bool,
        running: bool,
        journal: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn handle(name: &'static str, fail_start: bool, journal: &Arc<Mutex<Vec<String>>>) -> ModuleHandle {
            let module = Self {
                name,
                fail_start,
                running: false,
                journal: Arc::clone(journal),
            };
            ModuleHandle::new(name, true, Box::new(module))
        }
    }

    impl Pipeline for Recorder {
        async fn start(&mut self) -> Result<(), LogshipError> {
            if self.fail_start {
                return Err(PipelineError::InitFailed("bind failed".into()).into());
            }
            self.running = true;
            self.journal.lock().unwrap().push(format!("start {}", self.name));
            Ok(())
        }

        async fn stop(&mut self) -> Result<(), LogshipError> {
            if !self.running {
                return Err(PipelineError::NotRunning.into());
            }
            self.running = false;
            self.journal.lock().unwrap().push(format!("stop {}", self.name));
            Ok(())
        }

        async fn health_check(&self) -> HealthStatus {
            if self.running {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy("stopped".into())
            }
        }
    }

    #[tokio::test]
    async fn stop_all_runs_in_reverse_order() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ModuleRegistry::new();
        registry.register(Recorder::handle("ingest", false, &journal));
        registry.register(Recorder::handle("forwarder", false, &journal));

        registry.start_all().await.unwrap();
        registry.stop_all().await.unwrap();

        assert_eq!(
            *journal.lock().unwrap(),
            vec!["start ingest", "start forwarder", "stop forwarder", "stop ingest"]
        );
    }

    #[tokio::test]
    async fn failed_start_rolls_back_started_modules() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ModuleRegistry::new();
        registry.register(Recorder::handle("ingest", false, &journal));
        registry.register(Recorder::handle("retention", false, &journal));
        registry.register(Recorder::handle("forwarder", true, &journal));

        let err = registry.start_all().await.unwrap_err();
        assert!(err.to_string().contains("forwarder"));
        assert_eq!(
            *journal.lock().unwrap(),
            vec!["start ingest", "start retention", "stop retention", "stop ingest"]
        );
    }

    #[tokio::test]
    async fn disabled_modules_are_skipped_and_healthy() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ModuleRegistry::new();
        let mut handle = Recorder::handle("forwarder", true, &journal);
        handle.enabled = false;
        registry.register(handle);

        registry.start_all().await.unwrap();
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.enabled_count(), 0);

        let statuses = registry.health_statuses().await;
        assert_eq!(statuses.len(), 1);
        assert!(statuses[0].2.is_healthy());
        assert!(journal.lock().unwrap().is_empty());
    }
}
