//! Shared logging utilities for consistent tracing across driver and node jobs
//!
//! Events from per-node jobs carry a `node` field (see [node_info!] and
//! friends); driver events carry a `run` field. With `--trace-ep` set, both
//! kinds are batched and POSTed as JSON to a collector; untagged events from
//! dependencies stay local.

use crate::types::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber, error, info, warn};
use tracing_subscriber::layer::Context;

/// Node label given to run-level driver events on the trace endpoint
pub const DRIVER_NODE: &str = "driver";

/// Tracing endpoint configuration
#[derive(Debug, Clone)]
pub struct TracingEndpoint {
    pub url: String,
    pub batch_size: usize,
    pub flush_interval: Duration,
}

impl TracingEndpoint {
    pub fn new(url: String) -> Self {
        Self {
            url,
            batch_size: 5,
            flush_interval: Duration::from_millis(500),
        }
    }
}

/// One event as shipped to the trace endpoint
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TraceEvent {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
    pub node: String,
    pub fields: Map<String, Value>,
}

impl TraceEvent {
    /// Convert a tracing event, or `None` when it has neither a `node` nor a `run` field
    pub fn from_event(event: &Event<'_>) -> Option<Self> {
        let mut collected = FieldCollector::default();
        event.record(&mut collected);
        let FieldCollector { message, mut fields } = collected;

        let node = match fields.remove("node") {
            Some(Value::String(node)) => node,
            Some(other) => other.to_string(),
            None if fields.contains_key("run") => DRIVER_NODE.to_string(),
            None => return None,
        };

        let metadata = event.metadata();
        Some(Self {
            timestamp: Utc::now(),
            level: metadata.level().to_string(),
            target: metadata.target().to_string(),
            message,
            node,
            fields,
        })
    }
}

#[derive(Default)]
struct FieldCollector {
    message: String,
    fields: Map<String, Value>,
}

impl FieldCollector {
    fn insert(&mut self, field: &Field, value: Value) {
        match (field.name(), value) {
            ("message", Value::String(text)) => self.message.push_str(&text),
            (name, value) => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for FieldCollector {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert(field, Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }
}

/// Layer forwarding node and run events to a trace collector
pub struct HttpTracingLayer {
    sender: mpsc::UnboundedSender<TraceEvent>,
}

impl HttpTracingLayer {
    /// Spawn the shipping task for `endpoint`; must be called inside a tokio runtime
    pub fn new(endpoint: TracingEndpoint) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(ship_events(endpoint, receiver));
        Self::with_sender(sender)
    }

    /// Forward converted events to `sender` instead of an HTTP endpoint
    pub fn with_sender(sender: mpsc::UnboundedSender<TraceEvent>) -> Self {
        Self { sender }
    }
}

impl<S> tracing_subscriber::Layer<S> for HttpTracingLayer
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if let Some(trace_event) = TraceEvent::from_event(event) {
            let _ = self.sender.send(trace_event);
        }
    }
}

/// Batch events from `receiver` and POST them until every sender is gone
async fn ship_events(endpoint: TracingEndpoint, mut receiver: mpsc::UnboundedReceiver<TraceEvent>) {
    let client = reqwest::Client::new();
    let batch_size = endpoint.batch_size.max(1);
    let mut batch = Vec::with_capacity(batch_size);
    let mut flush = tokio::time::interval(endpoint.flush_interval);

    loop {
        tokio::select! {
            received = receiver.recv_many(&mut batch, batch_size) => {
                if received == 0 {
                    post_batch(&client, &endpoint.url, &mut batch).await;
                    return;
                }
                if batch.len() >= batch_size {
                    post_batch(&client, &endpoint.url, &mut batch).await;
                }
            }
            _ = flush.tick() => post_batch(&client, &endpoint.url, &mut batch).await,
        }
    }
}

async fn post_batch(client: &reqwest::Client, url: &str, batch: &mut Vec<TraceEvent>) {
    if batch.is_empty() {
        return;
    }
    let events = std::mem::take(batch);

    // Logging from here would feed back into the layer
    match client.post(url).json(&events).send().await {
        Ok(response) if !response.status().is_success() => {
            eprintln!("❌ Trace collector rejected {} event(s): HTTP {}", events.len(), response.status());
        }
        Ok(_) => {}
        Err(e) => eprintln!("❌ Failed to ship {} trace event(s): {e}", events.len()),
    }
}

/// Filter directives for the configurator crates at the given level
pub fn filter_directives(log_level: Option<&str>) -> String {
    let base_level = log_level.unwrap_or("info");
    format!("configurator={base_level},shared={base_level},reqwest=warn")
}

/// Initialize tracing subscriber with optional endpoint and log level
pub fn init_tracing_with_endpoint_and_level(endpoint: Option<TracingEndpoint>, log_level: Option<&str>) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let level_filter = filter_directives(log_level);
    let env_filter = EnvFilter::new(&level_filter);

    match endpoint {
        Some(endpoint) => {
            println!("📡 Tracing endpoint configured: {}", endpoint.url);

            let http_layer = HttpTracingLayer::new(endpoint);
            let fmt_layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact();

            tracing_subscriber::registry()
                .with(env_filter)
                .with(http_layer)
                .with(fmt_layer)
                .init();
        }
        None => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .init();
        }
    }
}

/// Get formatted timestamp for consistent logging
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%H:%M:%S%.3f").to_string()
}

/// Macro for node-aware info logging
#[macro_export]
macro_rules! node_info {
    ($node:expr, $($arg:tt)*) => {
        tracing::info!(
            node = %$node,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for node-aware warning logging
#[macro_export]
macro_rules! node_warn {
    ($node:expr, $($arg:tt)*) => {
        tracing::warn!(
            node = %$node,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for node-aware debug logging
#[macro_export]
macro_rules! node_debug {
    ($node:expr, $($arg:tt)*) => {
        tracing::debug!(
            node = %$node,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Contextual logging helper for startup messages
pub fn log_startup(run_id: &RunId, details: &str) {
    info!(
        run = %run_id,
        timestamp = format_timestamp(),
        "🚀 Starting {}",
        details
    );
}

/// Contextual logging helper for shutdown messages
pub fn log_shutdown(run_id: &RunId, reason: &str) {
    info!(
        run = %run_id,
        timestamp = format_timestamp(),
        "🛑 Shutting down: {}",
        reason
    );
}

/// Contextual logging helper for error conditions
pub fn log_error(run_id: &RunId, context: &str, error: &dyn std::fmt::Display) {
    error!(
        run = %run_id,
        timestamp = format_timestamp(),
        error = %error,
        "❌ {} failed: {}",
        context,
        error
    );
}

/// Contextual logging helper for partial failures
pub fn log_warning(run_id: &RunId, context: &str, details: &str) {
    warn!(
        run = %run_id,
        timestamp = format_timestamp(),
        "⚠️ {}: {}",
        context,
        details
    );
}

/// Contextual logging helper for success conditions
pub fn log_success(run_id: &RunId, message: &str) {
    info!(
        run = %run_id,
        timestamp = format_timestamp(),
        "✅ {}",
        message
    );
}

/// Contextual logging helper for progress updates
pub fn log_progress(run_id: &RunId, action: &str, details: &str) {
    info!(
        run = %run_id,
        timestamp = format_timestamp(),
        "📋 {}: {}",
        action,
        details
    );
}
