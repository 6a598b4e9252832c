//! Mirrors operationally significant events into the store's `Logs` table
//! (spec §6) without every call site needing to write to both the process
//! log and the database explicitly: a call site opts in with
//! `tracing::warn!(target: "callfeed::store_log", "...")` and this layer
//! forwards it to a background task that calls `StoreOps::append_log`.

use callfeed_store::LogLevel;
use tokio::sync::mpsc::UnboundedSender;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

const STORE_LOG_TARGET: &str = "callfeed::store_log";

pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }
}

pub struct StoreLogLayer {
    tx: UnboundedSender<LogRecord>,
}

impl StoreLogLayer {
    pub fn new(tx: UnboundedSender<LogRecord>) -> Self {
        Self { tx }
    }
}

impl<S: Subscriber> Layer<S> for StoreLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().target() != STORE_LOG_TARGET {
            return;
        }
        let level = match *event.metadata().level() {
            Level::ERROR => LogLevel::Error,
            Level::WARN => LogLevel::Warn,
            _ => LogLevel::Info,
        };
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let _ = self.tx.send(LogRecord { level, message: visitor.message });
    }
}
