//! Health aggregation tests.
//!
//! Tests the health status aggregation logic and module health reporting.

use logship_core::pipeline::HealthStatus;
use logship_daemon::health::{DaemonHealth, ModuleHealth, aggregate_status};

fn module(name: &str, enabled: bool, status: HealthStatus) -> ModuleHealth {
    ModuleHealth {
        name: name.to_string(),
        enabled,
        status,
    }
}

#[test]
fn test_aggregate_status_all_healthy() {
    // Given: All modules are healthy
    let modules = vec![
        module("ingest", true, HealthStatus::Healthy),
        module("retention", true, HealthStatus::Healthy),
        module("forwarder", true, HealthStatus::Healthy),
    ];

    // When: Aggregating status
    let status = aggregate_status(&modules);

    // Then: Overall status should be Healthy
    assert!(status.is_healthy(), "all healthy modules should result in healthy status");
}

#[test]
fn test_aggregate_status_one_degraded() {
    // Given: One collector has exited
    let modules = vec![
        module("ingest", true, HealthStatus::Degraded("1 collector(s) exited".to_string())),
        module("forwarder", true, HealthStatus::Healthy),
    ];

    // When: Aggregating status
    let status = aggregate_status(&modules);

    // Then: Overall status should be Degraded naming the module
    match status {
        HealthStatus::Degraded(reason) => {
            assert!(reason.contains("ingest"), "reason should name the module: {reason}");
            assert!(reason.contains("collector"), "reason should carry the detail: {reason}");
        }
        other => panic!("expected degraded, got {other:?}"),
    }
}

#[test]
fn test_aggregate_status_unhealthy_takes_precedence_over_degraded() {
    // Given: One degraded and one unhealthy module
    let modules = vec![
        module("ingest", true, HealthStatus::Degraded("collector exited".to_string())),
        module("retention", true, HealthStatus::Unhealthy("retention task exited".to_string())),
    ];

    // When: Aggregating status
    let status = aggregate_status(&modules);

    // Then: Unhealthy wins and both reasons are reported
    match status {
        HealthStatus::Unhealthy(reason) => {
            assert!(reason.contains("ingest: collector exited"));
            assert!(reason.contains("retention: retention task exited"));
        }
        other => panic!("expected unhealthy, got {other:?}"),
    }
}

#[test]
fn test_aggregate_status_disabled_modules_ignored() {
    // Given: A disabled forwarder that was never started
    let modules = vec![
        module("ingest", true, HealthStatus::Healthy),
        module("forwarder", false, HealthStatus::Unhealthy("not started".to_string())),
    ];

    // When: Aggregating status
    let status = aggregate_status(&modules);

    // Then: Disabled module does not affect overall status
    assert!(status.is_healthy());
}

#[test]
fn test_aggregate_status_empty_modules() {
    // Given: No modules
    // When: Aggregating status
    // Then: Status is Healthy
    assert!(aggregate_status(&[]).is_healthy());
}

#[test]
fn test_daemon_health_serializes_status_with_reason() {
    // Given: A degraded daemon report
    let modules = vec![module("ingest", true, HealthStatus::Degraded("tcp exited".to_string()))];
    let health = DaemonHealth {
        status: aggregate_status(&modules),
        uptime_secs: 42,
        modules,
    };

    // When: Serializing to JSON
    let json = serde_json::to_value(&health).expect("health should serialize");

    // Then: Status is tagged and modules are listed
    assert_eq!(json["status"]["status"], "degraded");
    assert_eq!(json["status"]["reason"], "ingest: tcp exited");
    assert_eq!(json["uptime_secs"], 42);
    assert_eq!(json["modules"][0]["name"], "ingest");
}
