use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the homefeed binary.
#[derive(Debug, Parser)]
#[command(name = "homefeed", version, about = "Home feed fanout service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "HOMEFEED_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL. Without one, posts and friendships live in memory.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the number of entries kept per cached feed.
    #[arg(long = "feed-cache-capacity", value_name = "COUNT")]
    pub feed_cache_capacity: Option<u64>,

    /// Override the fanout failure policy (fail_fast|best_effort).
    #[arg(long = "feed-fanout-policy", value_name = "POLICY")]
    pub feed_fanout_policy: Option<String>,

    /// Override the per-call deadline for stores, caches and notifiers.
    #[arg(long = "feed-io-timeout-ms", value_name = "MILLIS")]
    pub feed_io_timeout_ms: Option<u64>,

    /// Override how many messages a live viewer may lag behind.
    #[arg(long = "notifier-channel-capacity", value_name = "COUNT")]
    pub notifier_channel_capacity: Option<u64>,

    /// Rebuild every cached feed before accepting traffic.
    #[arg(
        long = "warm-on-startup",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub warm_on_startup: Option<bool>,

    /// Rebuild every cached feed periodically; zero disables.
    #[arg(long = "warm-interval-seconds", value_name = "SECONDS")]
    pub warm_interval_seconds: Option<u64>,

    /// Override how many users are warmed concurrently.
    #[arg(long = "warm-concurrency", value_name = "COUNT")]
    pub warm_concurrency: Option<u64>,
}
