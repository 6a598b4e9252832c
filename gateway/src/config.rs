use clap::{Parser, ValueEnum};

/// SQL dialect selection (spec §6's "a JSON configuration file selecting
/// dialect"), overridable from the CLI/environment the way `vp-gateway`
/// overlays its Postgres URL.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgresql,
    Mysql,
    Mariadb,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "callfeed-gateway", about = "Live-feed dispatch and session engine")]
pub struct Config {
    #[arg(long, env = "CALLFEED_LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: String,

    #[arg(long, env = "CALLFEED_METRICS_LISTEN", default_value = "0.0.0.0:9000")]
    pub metrics_listen: String,

    #[arg(long, env = "CALLFEED_DIALECT", value_enum, default_value_t = Dialect::Sqlite)]
    pub dialect: Dialect,

    /// Connection string; for sqlite, a file path (or `:memory:`).
    #[arg(long, env = "CALLFEED_DATABASE_URL", default_value = "callfeed.sqlite3")]
    pub database_url: String,

    #[arg(long, env = "CALLFEED_MAX_CONNECTIONS", default_value_t = 25)]
    pub max_connections: u32,

    #[arg(long, env = "CALLFEED_BRANDING", default_value = "CallFeed")]
    pub branding: String,

    #[arg(long, env = "CALLFEED_VERSION", default_value = "1.0")]
    pub version: String,

    /// Bounded per-session outbound queue depth (spec §9).
    #[arg(long, env = "CALLFEED_SESSION_QUEUE_DEPTH", default_value_t = 64)]
    pub session_queue_depth: usize,

    /// How often an admitted session re-resolves its credential.
    #[arg(long, env = "CALLFEED_EXPIRY_CHECK_SECONDS", default_value_t = 5)]
    pub expiry_check_seconds: u64,

    /// Listener-count broadcast period (spec §4.C).
    #[arg(long, env = "CALLFEED_LSC_INTERVAL_SECONDS", default_value_t = 5)]
    pub lsc_interval_seconds: u64,

    #[arg(long, env = "CALLFEED_FORWARD_QUEUE_DEPTH", default_value_t = 256)]
    pub forward_queue_depth: usize,

    #[arg(long, env = "CALLFEED_FORWARD_WORKERS", default_value_t = 4)]
    pub forward_workers: usize,

    /// Bounded timeout for draining pending downstream forwards on shutdown
    /// (spec §5: "flushes pending downstream posts with a bounded timeout").
    #[arg(long, env = "CALLFEED_SHUTDOWN_FLUSH_SECONDS", default_value_t = 10)]
    pub shutdown_flush_seconds: u64,
}
