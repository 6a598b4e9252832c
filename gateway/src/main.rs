mod config;
mod dispatcher;
mod log_sink;
mod routes;
mod session;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use callfeed_control::{AccessController, AdmissionRegistry, ConfigHandle, ConfigSnapshot, IngestService, PlaybackService};
use callfeed_forward::{ForwardConfig, Forwarder};
use callfeed_metrics::{DispatchMetrics, ForwardMetrics, GatewayMetrics, IngestMetrics, MetricsConfig, MetricsServer};
use callfeed_store::{MySqlStore, PgStore, SqliteStore, Store, StoreOps};
use clap::Parser;
use dispatcher::Dispatcher;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::util::SubscriberExt;
use tracing_subscriber::EnvFilter;

use config::{Config, Dialect};
use log_sink::StoreLogLayer;
use session::{GatewayContext, SessionConfig};

#[derive(Clone)]
struct AppState {
    session_ctx: Arc<GatewayContext<Store>>,
    ingest: Arc<IngestService<Store>>,
    forwarder: Arc<Forwarder>,
}

#[tokio::main]
async fn main() {
    let (log_tx, log_rx) = tokio::sync::mpsc::unbounded_channel();

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer())
        .with(StoreLogLayer::new(log_tx));
    tracing::subscriber::set_global_default(subscriber).expect("set global tracing subscriber");

    if let Err(e) = run(log_rx).await {
        tracing::error!(error = %e, "fatal startup error");
        std::process::exit(1);
    }
}

async fn run(mut log_rx: tokio::sync::mpsc::UnboundedReceiver<log_sink::LogRecord>) -> Result<()> {
    let cfg = Config::parse();

    let ms = MetricsServer::install(MetricsConfig { listen: cfg.metrics_listen.clone(), namespace: "callfeed" })
        .context("install metrics recorder")?;
    tokio::spawn(async move {
        if let Err(e) = ms.serve().await {
            tracing::error!(error = %e, "metrics server stopped");
        }
    });

    let store = build_store(&cfg).await.context("connect to store")?;

    let log_store = store.clone();
    tokio::spawn(async move {
        while let Some(record) = log_rx.recv().await {
            if let Err(e) = log_store.append_log(record.level, &record.message).await {
                tracing::debug!(error = %e, "failed to persist log record to store");
            }
        }
    });

    let config_data = store.load_config().await.context("load initial configuration")?;
    let config_handle = ConfigHandle::new(ConfigSnapshot::new(config_data));
    let access = AccessController::new(config_handle);

    let admission = Arc::new(AdmissionRegistry::new());
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(DispatchMetrics::new("callfeed"))));
    let playback = PlaybackService::new(store.clone());
    let ingest_metrics = Arc::new(IngestMetrics::new("callfeed"));
    let ingest = Arc::new(IngestService::new(store.clone(), access.clone(), ingest_metrics));
    let forward_cfg = ForwardConfig { queue_depth: cfg.forward_queue_depth, workers: cfg.forward_workers, ..ForwardConfig::default() };
    let forwarder = Arc::new(Forwarder::spawn(forward_cfg, Arc::new(ForwardMetrics::new("callfeed"))));

    let session_ctx = Arc::new(GatewayContext {
        store: store.clone(),
        access: access.clone(),
        admission: admission.clone(),
        dispatcher: dispatcher.clone(),
        playback,
        metrics: Arc::new(GatewayMetrics::new("callfeed")),
        config: SessionConfig {
            queue_depth: cfg.session_queue_depth,
            expiry_check_interval: Duration::from_secs(cfg.expiry_check_seconds),
            branding: cfg.branding.clone(),
            version: cfg.version.clone(),
        },
    });

    spawn_lsc_ticker(admission.clone(), dispatcher.clone(), Duration::from_secs(cfg.lsc_interval_seconds));

    let state = AppState { session_ctx, ingest, forwarder: forwarder.clone() };

    let app = Router::new()
        .route("/ws", get(routes::ws_handler))
        .route("/api/call-upload", post(routes::upload_call))
        .route("/api/calls/{id}/audio", get(routes::download_audio))
        .route("/admin/reload", post(routes::admin_reload))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&cfg.listen).await.context("bind listen address")?;
    info!(addr = %cfg.listen, "gateway listening");

    tokio::select! {
        r = axum::serve(listener, app) => r.context("server error")?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received, closing transports and flushing forwards");
            dispatcher.shutdown_all();
            let drained = forwarder.flush(Duration::from_secs(cfg.shutdown_flush_seconds)).await;
            if !drained {
                tracing::warn!("shutdown proceeding with downstream forwards still pending");
            }
            store.close().await;
        }
    }

    Ok(())
}

async fn build_store(cfg: &Config) -> Result<Store> {
    match cfg.dialect {
        Dialect::Sqlite => {
            let pool = SqlitePoolOptions::new()
                .max_connections(cfg.max_connections)
                .max_lifetime(Duration::from_secs(60))
                .connect(&format!("sqlite://{}?mode=rwc", cfg.database_url))
                .await?;
            let store = SqliteStore::new(pool);
            store.migrate().await?;
            Ok(Store::Sqlite(store))
        }
        Dialect::Postgresql => {
            let pool = PgPoolOptions::new()
                .max_connections(cfg.max_connections)
                .max_lifetime(Duration::from_secs(60))
                .connect(&cfg.database_url)
                .await?;
            let store = PgStore::new(pool);
            store.migrate().await?;
            Ok(Store::Postgres(store))
        }
        Dialect::Mysql | Dialect::Mariadb => {
            let pool = MySqlPoolOptions::new()
                .max_connections(cfg.max_connections)
                .max_lifetime(Duration::from_secs(60))
                .connect(&cfg.database_url)
                .await?;
            let store = MySqlStore::new(pool);
            store.migrate().await?;
            Ok(Store::MySql(store))
        }
    }
}

/// Periodically broadcasts the current listener count to every registered
/// session (spec §4.C), mirroring the teacher's outbox ticker shape.
fn spawn_lsc_ticker(admission: Arc<AdmissionRegistry>, dispatcher: Arc<Dispatcher>, period: Duration) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        loop {
            tick.tick().await;
            let count = admission.count() as i64;
            dispatcher.broadcast_lsc(count);
        }
    });
}
