//! Module orchestration -- assembly and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `logship-daemon`.
//! It opens the store, loads the rule set, builds the ingestor shared by
//! every input, registers the background modules, serves the HTTP API and
//! manages startup/shutdown ordering.
//!
//! # Startup Order
//!
//! 1. HTTP listener bind (a bind failure is fatal before anything starts)
//! 2. Ingest pipeline (syslog UDP/TCP and file-tail collectors)
//! 3. Retention
//! 4. Forwarder
//! 5. HTTP server
//!
//! # Shutdown Order
//!
//! The HTTP server drains in-flight requests first (bounded by
//! `server.shutdown_grace_secs`), then modules stop in reverse
//! registration order so the forwarder stops before the collectors drain.

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use logship_core::LogshipConfig;
use logship_pipeline::{Ingestor, IpPolicy, RuleEngine};
use logship_store::Store;

use crate::api::{self, AppState};
use crate::health::{self, DaemonHealth, HEALTH_REFRESH_INTERVAL, ModuleHealth};
use crate::metrics_server;
use crate::modules::{self, ModuleRegistry};

/// The main daemon orchestrator.
///
/// Manages the complete lifecycle of the logship daemon:
/// store and rule loading, ordered startup, the HTTP server,
/// health monitoring and graceful shutdown.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: LogshipConfig,
    /// Event store shared by every module.
    store: Store,
    /// Classifies and stores events for HTTP and the collectors.
    ingestor: Ingestor,
    /// Registered background modules (ordered for start/stop).
    modules: ModuleRegistry,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration and build the orchestrator.
    ///
    /// Loads `logship.toml`, applies environment overrides and validates.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = LogshipConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    ///
    /// This performs the following steps:
    /// 1. Validate the configuration and install the metrics recorder
    /// 2. Open the SQLite store (creating its directory)
    /// 3. Load the rule set and apply seed rules
    /// 4. Build the IP policy and the ingestor
    /// 5. Register the ingest, retention and forwarder modules
    pub async fn build_from_config(config: LogshipConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        let db_path = config.storage.resolved_db_path();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                anyhow::anyhow!("failed to create data directory {}: {}", parent.display(), e)
            })?;
        }
        let store = Store::open(&db_path)
            .map_err(|e| anyhow::anyhow!("failed to open store {}: {}", db_path.display(), e))?;
        tracing::info!(path = %db_path.display(), "store opened");

        let rules = RuleEngine::load(store.clone(), config.rules.match_policy)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load rules: {}", e))?;
        if !config.rules.seed_dir.is_empty() {
            let added = rules
                .seed_from_dir(&config.rules.seed_dir)
                .await
                .map_err(|e| anyhow::anyhow!("failed to seed rules: {}", e))?;
            tracing::info!(dir = %config.rules.seed_dir, added, "seed rules applied");
        }
        tracing::info!(
            rules = rules.rules().len(),
            match_policy = ?config.rules.match_policy,
            "rule set loaded"
        );

        let policy = IpPolicy::from_config(&config.ip_policy)
            .map_err(|e| anyhow::anyhow!("invalid ip policy: {}", e))?;
        let ingestor = Ingestor::new(store.clone(), Arc::new(policy), Arc::new(rules));

        let mut registry = ModuleRegistry::new();
        registry.register(modules::ingest::init(&config, ingestor.clone())?);
        registry.register(modules::retention::init(&config.storage, store.clone()));
        registry.register(modules::forwarder::init(&config.forward, store.clone())?);

        tracing::info!(
            total_modules = registry.count(),
            enabled_modules = registry.enabled_count(),
            "orchestrator initialized"
        );

        if config.metrics.enabled {
            record_daemon_metrics(registry.enabled_count());
        }

        Ok(Self {
            config,
            store,
            ingestor,
            modules: registry,
            start_time: Instant::now(),
        })
    }

    /// Run until `SIGTERM` or `SIGINT` is received.
    pub async fn run(&mut self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, async {
            match wait_for_shutdown_signal().await {
                Ok(signal) => tracing::info!(signal = signal, "shutdown signal received"),
                Err(e) => tracing::error!(error = %e, "signal handling failed, shutting down"),
            }
        })
        .await
    }

    /// Bind the HTTP listener on `server.listen`.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = &self.config.server.listen;
        TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow::anyhow!("failed to bind HTTP listener {}: {}", addr, e))
    }

    /// Start all modules, serve HTTP on `listener` until `shutdown`
    /// resolves, then shut everything down.
    pub async fn serve<F>(&mut self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let pid_file = (!self.config.general.pid_file.is_empty())
            .then(|| self.config.general.pid_file.clone());
        if let Some(path) = &pid_file {
            write_pid_file(Path::new(path))?;
        }

        tracing::info!("starting all modules");
        if let Err(e) = self.modules.start_all().await {
            tracing::error!(error = %e, "module startup failed");
            if let Some(path) = &pid_file {
                remove_pid_file(Path::new(path));
            }
            return Err(e);
        }

        let cancel = CancellationToken::new();
        let uptime_task = self
            .config
            .metrics
            .enabled
            .then(|| spawn_uptime_updater(self.start_time, cancel.child_token()));

        let (health_tx, health_rx) = health::channel();
        health::publish(&health_tx, self.health().await);

        let local_addr = listener.local_addr()?;
        let state = AppState::new(self.ingestor.clone(), &self.config.server).with_health(health_rx);
        let app = api::router(state);
        let server_cancel = cancel.clone();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(async move { server_cancel.cancelled().await })
                .await
        });
        tracing::info!(addr = %local_addr, "HTTP server listening");

        tokio::pin!(shutdown);
        let mut health_tick = tokio::time::interval(HEALTH_REFRESH_INTERVAL);
        health_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let server_done = loop {
            tokio::select! {
                () = &mut shutdown => break false,
                result = &mut server => {
                    match result {
                        Ok(Ok(())) => tracing::error!("HTTP server exited unexpectedly"),
                        Ok(Err(e)) => tracing::error!(error = %e, "HTTP server failed"),
                        Err(e) => tracing::error!(error = %e, "HTTP server task panicked"),
                    }
                    break true;
                }
                _ = health_tick.tick() => health::publish(&health_tx, self.health().await),
            }
        };

        tracing::info!("shutting down");
        cancel.cancel();

        if !server_done {
            let grace = Duration::from_secs(self.config.server.shutdown_grace_secs);
            match tokio::time::timeout(grace, &mut server).await {
                Ok(Ok(Err(e))) => tracing::warn!(error = %e, "HTTP server error during shutdown"),
                Ok(_) => tracing::info!("HTTP server drained"),
                Err(_) => {
                    tracing::warn!(grace_secs = grace.as_secs(), "HTTP drain timed out, aborting");
                    server.abort();
                }
            }
        }

        if let Some(task) = uptime_task {
            let _ = task.await;
        }

        let stopped = self.shutdown().await;
        health::publish(&health_tx, self.health().await);

        if let Some(path) = &pid_file {
            remove_pid_file(Path::new(path));
        }

        stopped
    }

    /// Stop all modules in reverse registration order.
    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("stopping all modules");
        self.modules.stop_all().await
    }

    /// Get the current aggregated health status.
    pub async fn health(&self) -> DaemonHealth {
        let modules: Vec<ModuleHealth> = self
            .modules
            .health_statuses()
            .await
            .into_iter()
            .map(|(name, enabled, status)| ModuleHealth {
                name,
                enabled,
                status,
            })
            .collect();

        DaemonHealth::from_modules(modules, self.start_time.elapsed().as_secs())
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &LogshipConfig {
        &self.config
    }

    /// Event store opened at build time.
    pub fn store(&self) -> &Store {
        &self.store
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Write the current process PID to a file.
///
/// # Security
///
/// - Uses `create_new(true)` to atomically create file (prevents TOCTOU races)
/// - Verifies the created file is a regular file (prevents symlink attacks)
/// - Creates parent directory with restrictive permissions (0o700)
fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            let mut builder = fs::DirBuilder::new();
            builder.mode(0o700).recursive(true);
            builder.create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let pid = std::process::id();

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_string());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    let metadata = file.metadata()?;
    if !metadata.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file (possible symlink attack)",
            path.display()
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    writeln!(file, "{}", pid)?;

    tracing::info!(pid = pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file on daemon shutdown.
///
/// Logs a warning but does not fail if the file cannot be removed.
fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "failed to remove PID file"
        );
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}

/// Record daemon-level metrics once at startup.
fn record_daemon_metrics(module_count: usize) {
    use logship_core::metrics as m;

    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);

    tracing::debug!(
        module_count = module_count,
        version = env!("CARGO_PKG_VERSION"),
        "daemon metrics recorded"
    );
}

/// Spawn a background task that periodically updates the uptime metric.
///
/// Updates every 10 seconds to keep the metric fresh for Prometheus scrapes.
fn spawn_uptime_updater(start_time: Instant, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    use logship_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(10));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(start_time.elapsed().as_secs() as f64);
                }
                _ = cancel.cancelled() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
