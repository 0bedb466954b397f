//! CLI argument definitions for logship-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use logship_core::LogshipConfig;

/// logship log-shipping daemon.
///
/// Receives logs over syslog UDP/TCP, HTTP and file tailing, applies the
/// IP policy and keep/drop rules, stores every event in SQLite and forwards
/// kept events to the configured HTTP destinations.
#[derive(Parser, Debug)]
#[command(name = "logship-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to logship.toml configuration file.
    #[arg(short, long, default_value = "/etc/logship/logship.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override the HTTP listen address (e.g. 127.0.0.1:8080).
    #[arg(long)]
    pub listen: Option<String>,

    /// Override the SQLite database path.
    #[arg(long)]
    pub db_path: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,
}

impl DaemonCli {
    /// Apply CLI overrides on top of file and environment configuration.
    pub fn apply_overrides(&self, config: &mut LogshipConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level.clone_from(level);
        }
        if let Some(format) = &self.log_format {
            config.general.log_format.clone_from(format);
        }
        if let Some(listen) = &self.listen {
            config.server.listen.clone_from(listen);
        }
        if let Some(db_path) = &self.db_path {
            config.storage.db_path.clone_from(db_path);
        }
        if let Some(pid_file) = &self.pid_file {
            config.general.pid_file.clone_from(pid_file);
        }
    }
}
