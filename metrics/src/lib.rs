pub mod config;
pub mod dispatch;
pub mod forward;
pub mod gateway;
pub mod http;
pub mod ingest;

pub use config::MetricsConfig;
pub use dispatch::DispatchMetrics;
pub use forward::ForwardMetrics;
pub use gateway::GatewayMetrics;
pub use http::MetricsServer;
pub use ingest::IngestMetrics;
