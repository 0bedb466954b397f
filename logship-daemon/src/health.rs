//! Module health reporting for `GET /api/health`.
//!
//! The orchestrator polls every module while serving and publishes a
//! [`DaemonHealth`] snapshot on a `watch` channel. HTTP handlers read the
//! latest snapshot without touching the module registry.
//!
//! Overall status is the worst among enabled modules:
//! Unhealthy > Degraded > Healthy.

use std::mem;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use logship_core::pipeline::HealthStatus;

/// How often the orchestrator refreshes the published report.
pub const HEALTH_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Publishes health snapshots.
pub type HealthPublisher = watch::Sender<DaemonHealth>;

/// Reads the latest published snapshot.
pub type HealthReader = watch::Receiver<DaemonHealth>;

#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Worst status among enabled modules.
    pub status: HealthStatus,
    pub uptime_secs: u64,
    pub modules: Vec<ModuleHealth>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleHealth {
    /// Registry name ("ingest", "retention", "forwarder").
    pub name: String,
    pub enabled: bool,
    pub status: HealthStatus,
}

impl DaemonHealth {
    /// Build a report from per-module statuses.
    pub fn from_modules(modules: Vec<ModuleHealth>, uptime_secs: u64) -> Self {
        Self {
            status: aggregate_status(&modules),
            uptime_secs,
            modules,
        }
    }

    /// Placeholder published before the first poll.
    pub fn starting() -> Self {
        Self {
            status: HealthStatus::Unhealthy("starting".to_owned()),
            uptime_secs: 0,
            modules: Vec::new(),
        }
    }

    /// Whether the daemon should answer health checks with success.
    ///
    /// Degraded still serves traffic.
    pub fn is_serving(&self) -> bool {
        !self.status.is_unhealthy()
    }
}

/// Create a publisher/reader pair seeded with [`DaemonHealth::starting`].
pub fn channel() -> (HealthPublisher, HealthReader) {
    watch::channel(DaemonHealth::starting())
}

/// Publish `next`, logging when the overall status kind changes.
pub fn publish(publisher: &HealthPublisher, next: DaemonHealth) {
    let previous = publisher.send_replace(next);
    let current = publisher.borrow();
    if mem::discriminant(&previous.status) == mem::discriminant(&current.status) {
        return;
    }
    match &current.status {
        HealthStatus::Healthy => tracing::info!("daemon healthy"),
        HealthStatus::Degraded(reason) => tracing::warn!(reason = %reason, "daemon degraded"),
        HealthStatus::Unhealthy(reason) => tracing::error!(reason = %reason, "daemon unhealthy"),
    }
}

/// Aggregate module statuses into the worst one, joining the reasons.
///
/// Disabled modules are ignored.
pub fn aggregate_status(modules: &[ModuleHealth]) -> HealthStatus {
    let mut unhealthy = false;
    let mut reasons = Vec::new();

    for module in modules.iter().filter(|m| m.enabled) {
        match &module.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => reasons.push(format!("{}: {reason}", module.name)),
            HealthStatus::Unhealthy(reason) => {
                unhealthy = true;
                reasons.push(format!("{}: {reason}", module.name));
            }
        }
    }

    match (reasons.is_empty(), unhealthy) {
        (true, _) => HealthStatus::Healthy,
        (false, true) => HealthStatus::Unhealthy(reasons.join("; ")),
        (false, false) => HealthStatus::Degraded(reasons.join("; ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(name: &str, status: HealthStatus) -> ModuleHealth {
        ModuleHealth {
            name: name.to_owned(),
            enabled: true,
            status,
        }
    }

    #[test]
    fn publish_replaces_snapshot() {
        let (publisher, reader) = channel();
        assert!(!reader.borrow().is_serving());

        publish(&publisher, DaemonHealth::from_modules(vec![module("ingest", HealthStatus::Healthy)], 3));
        let current = reader.borrow();
        assert!(current.is_serving());
        assert_eq!(current.uptime_secs, 3);
        assert_eq!(current.modules.len(), 1);
    }

    #[test]
    fn degraded_is_still_serving() {
        let health = DaemonHealth::from_modules(
            vec![module("forwarder", HealthStatus::Degraded("lagging".to_owned()))],
            0,
        );
        assert!(health.is_serving());
        assert_eq!(health.status, HealthStatus::Degraded("forwarder: lagging".to_owned()));
    }
}
