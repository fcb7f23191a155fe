use clap::{ArgAction, Parser};
use std::path::PathBuf;

use crate::settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "keyscope")]
#[command(version)]
#[command(about = "Browse a Redis key-space without blocking the server")]
#[command(long_about = "keyscope walks the key-space with SCAN, printing progress as batches \
    arrive, then lists the keys that match the filter.\n\n\
    Examples:\n  \
    keyscope --pattern 'user:*'            # Scan keys matching a server-side pattern\n  \
    keyscope --filter session -m           # Show kind, TTL and size for keys containing 'session'\n  \
    keyscope --host cache.internal --db 2  # Scan database 2 on another host\n  \
    keyscope --plain -f order | wc -l      # Count matching keys")]
pub struct Cli {
    /// Settings file (default: <config dir>/keyscope/settings.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    /// Database index
    #[arg(long = "db")]
    pub database: Option<u16>,

    /// ACL username (Redis 6+)
    #[arg(long = "user", env = "KEYSCOPE_USER")]
    pub username: Option<String>,

    #[arg(long, env = "KEYSCOPE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Connect with TLS (rediss://)
    #[arg(long)]
    pub tls: bool,

    /// Server-side match pattern passed to SCAN
    #[arg(short = 'p', long)]
    pub pattern: Option<String>,

    /// Keys requested per SCAN call
    #[arg(short = 'c', long = "count", value_name = "N")]
    pub batch_size: Option<usize>,

    /// Stop after this many keys (0 = no limit)
    #[arg(long)]
    pub limit: Option<usize>,

    /// Pause between batches in milliseconds
    #[arg(long, value_name = "MS")]
    pub delay_ms: Option<u64>,

    /// Fetch kind, TTL and size for every key
    #[arg(short = 'm', long)]
    pub metadata: bool,

    /// Case-insensitive substring filter applied to fetched keys
    #[arg(short = 'f', long, default_value = "")]
    pub filter: String,

    /// Print bare keys, one per line, instead of a table
    #[arg(long)]
    pub plain: bool,

    /// Write JSON logs to the data directory
    #[arg(long)]
    pub json_logs: bool,

    /// Increase log verbosity (-v, -vv for more)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Overlay command-line flags on file settings
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(host) = &self.host {
            settings.connection.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.connection.port = port;
        }
        if let Some(database) = self.database {
            settings.connection.database = database;
        }
        if let Some(username) = &self.username {
            settings.connection.username = Some(username.clone());
        }
        if let Some(password) = &self.password {
            settings.connection.password = Some(password.clone());
        }
        if self.tls {
            settings.connection.tls = true;
        }
        if let Some(pattern) = &self.pattern {
            settings.scan.pattern = pattern.clone();
        }
        if let Some(batch_size) = self.batch_size {
            settings.scan.batch_size = batch_size;
        }
        if let Some(limit) = self.limit {
            settings.scan.limit = limit;
        }
        if let Some(delay_ms) = self.delay_ms {
            settings.scan.batch_delay_ms = delay_ms;
        }
        if self.metadata {
            settings.scan.with_metadata = true;
        }
        if self.json_logs {
            settings.logging.json_file = true;
        }
    }
}
