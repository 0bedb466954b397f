//! Orchestrator integration tests.
//!
//! Tests the full flow: config -> store/rules -> module init -> serve -> shutdown.

use std::net::SocketAddr;
use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

use logship_core::LogshipConfig;
use logship_daemon::orchestrator::Orchestrator;
use logship_store::EventFilter;

/// Config rooted in `dir` with every listener on an ephemeral loopback port.
fn test_config(dir: &Path) -> LogshipConfig {
    let mut config = LogshipConfig::default();
    config.server.listen = "127.0.0.1:0".to_string();
    config.syslog.udp_bind = "127.0.0.1:0".to_string();
    config.syslog.tcp_bind = "127.0.0.1:0".to_string();
    config.storage.data_dir = dir.join("data").display().to_string();
    config.storage.trim_interval_secs = 1;
    config
}

async fn http(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream.write_all(request.as_bytes()).await.expect("write request");
    let mut response = String::new();
    stream.read_to_string(&mut response).await.expect("read response");
    response
}

fn post(path: &str, body: &str) -> String {
    format!(
        "POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

fn get(path: &str) -> String {
    format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
}

#[tokio::test]
async fn test_build_opens_store_and_registers_modules() {
    // Given: A config with no forward destinations
    let dir = tempfile::tempdir().expect("temp dir");
    let config = test_config(dir.path());

    // When: Building the orchestrator
    let orchestrator = Orchestrator::build_from_config(config)
        .await
        .expect("orchestrator should build");

    // Then: The database exists and the forwarder is registered disabled
    assert!(dir.path().join("data").join("logship.db").exists());
    let health = orchestrator.health().await;
    let names: Vec<&str> = health.modules.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["ingest", "retention", "forwarder"]);
    let forwarder = &health.modules[2];
    assert!(!forwarder.enabled);
    assert!(
        health.status.is_unhealthy(),
        "modules are not started yet: {:?}",
        health.status
    );
}

#[tokio::test]
async fn test_build_rejects_invalid_config() {
    // Given: An invalid log level
    let dir = tempfile::tempdir().expect("temp dir");
    let mut config = test_config(dir.path());
    config.general.log_level = "chatty".to_string();

    // When: Building
    let result = Orchestrator::build_from_config(config).await;

    // Then: Validation fails before anything is opened
    assert!(result.is_err());
    assert!(!dir.path().join("data").exists());
}

#[tokio::test]
async fn test_seed_rules_are_applied_once() {
    // Given: A seed directory with one YAML rule
    let dir = tempfile::tempdir().expect("temp dir");
    let seed_dir = dir.path().join("rules");
    std::fs::create_dir_all(&seed_dir).expect("rules dir");
    std::fs::write(
        seed_dir.join("healthchecks.yml"),
        "name: drop-healthchecks\npriority: 10\naction: drop\npredicate:\n  type: substring\n  expression: healthcheck\n",
    )
    .expect("write rule");
    let mut config = test_config(dir.path());
    config.rules.seed_dir = seed_dir.display().to_string();

    // When: Building twice against the same database
    let first = Orchestrator::build_from_config(config.clone()).await.expect("first build");
    drop(first);
    let second = Orchestrator::build_from_config(config).await.expect("second build");

    // Then: The rule exists exactly once
    let rules = second.store().list_rules().await.expect("list rules");
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].name, "drop-healthchecks");
}

#[tokio::test]
async fn test_bind_conflict_is_fatal() {
    // Given: A port that is already taken
    let dir = tempfile::tempdir().expect("temp dir");
    let holder = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("holder");
    let mut config = test_config(dir.path());
    config.server.listen = holder.local_addr().expect("addr").to_string();
    let orchestrator = Orchestrator::build_from_config(config).await.expect("build");

    // When: Binding the HTTP listener
    let result = orchestrator.bind().await;

    // Then: Bind fails with the address in the error
    let err = result.expect_err("bind should fail").to_string();
    assert!(err.contains("failed to bind HTTP listener"), "got: {err}");
}

#[tokio::test]
async fn test_serve_ingests_over_http_and_shuts_down_cleanly() {
    // Given: A built orchestrator with a PID file
    let dir = tempfile::tempdir().expect("temp dir");
    let pid_file = dir.path().join("run").join("logship.pid");
    let mut config = test_config(dir.path());
    config.general.pid_file = pid_file.display().to_string();
    let mut orchestrator = Orchestrator::build_from_config(config).await.expect("build");
    let store = orchestrator.store().clone();
    let listener = orchestrator.bind().await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    // When: Serving while a client talks to it
    let client = async {
        let health = http(addr, &get("/healthz")).await;
        let module_health = http(addr, &get("/api/health")).await;
        let pid_present = pid_file.exists();
        let created = http(
            addr,
            &post(
                "/api/rules",
                r#"{"name":"hc","action":"drop","pattern":"healthcheck"}"#,
            ),
        )
        .await;
        let ingest = http(
            addr,
            &post("/ingest", r#"[{"message":"healthcheck ok"},{"message":"user login"}]"#),
        )
        .await;
        let _ = shutdown_tx.send(());
        (health, module_health, pid_present, created, ingest)
    };
    let serve = orchestrator.serve(listener, async {
        let _ = shutdown_rx.await;
    });
    let (served, (health, module_health, pid_present, created, ingest)) = tokio::join!(serve, client);

    // Then: Every request succeeded and shutdown was clean
    served.expect("serve should shut down cleanly");
    assert!(health.starts_with("HTTP/1.1 200"), "got: {health}");
    assert!(health.ends_with("ok"), "got: {health}");
    assert!(module_health.starts_with("HTTP/1.1 200"), "got: {module_health}");
    assert!(module_health.contains(r#""status":{"status":"healthy"}"#), "got: {module_health}");
    assert!(module_health.contains(r#""name":"retention""#), "got: {module_health}");
    assert!(pid_present, "PID file should exist while serving");
    assert!(created.starts_with("HTTP/1.1 201"), "got: {created}");
    assert!(ingest.starts_with("HTTP/1.1 202"), "got: {ingest}");
    assert!(ingest.contains(r#""accepted":2"#), "got: {ingest}");
    assert!(!pid_file.exists(), "PID file should be removed on shutdown");

    let kept = store
        .query(EventFilter {
            dropped: Some(false),
            ..Default::default()
        })
        .await
        .expect("query");
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].message, "user login");
    assert_eq!(kept[0].source_addr, "127.0.0.1");

    let health = orchestrator.health().await;
    assert!(health.modules.iter().filter(|m| m.enabled).all(|m| m.status.is_unhealthy()));
}
