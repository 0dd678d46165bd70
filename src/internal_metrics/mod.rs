//! # Internal Metrics Module
//!
//! - **`MetricsBuilder`**: installs the Prometheus recorder and binds the
//!   metrics listener when metrics are enabled.
//! - **`Metrics`**: a cheap, cloneable handle with one method per metric the
//!   relay records.
//! - **`MetricsServer`**: (Defined in `server.rs`) an `axum` server exposing
//!   `/metrics`.
//!
//! Without an installed recorder every call is a no-op, so components can
//! always hold a `Metrics` handle.

pub mod server;

use crate::config::MetricsConfig;
use crate::internal_metrics::server::MetricsServer;
use metrics::Unit;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::error;

/// The public API for the metrics system.
#[derive(Clone, Debug, Default)]
pub struct Metrics;

impl Metrics {
    /// Creates a new `Metrics` handle and registers metric descriptions with
    /// the global recorder.
    pub fn new() -> Self {
        metrics::describe_counter!("webhooks_received_total", Unit::Count, "Total number of inbound webhooks, labeled by source.");
        metrics::describe_counter!("events_discarded_total", Unit::Count, "Events that matched no route or a route without channels.");
        metrics::describe_counter!("channel_deliveries_total", Unit::Count, "Channel delivery attempts, labeled by channel and outcome.");
        metrics::describe_histogram!("delivery_duration_seconds", Unit::Seconds, "Time spent delivering an event to one channel.");
        metrics::describe_gauge!("routes_loaded_count", Unit::Count, "The number of routes in the loaded routing configuration.");
        Self
    }

    pub fn increment_webhooks_received(&self, source: &str) {
        metrics::counter!("webhooks_received_total", "source" => source.to_string()).increment(1);
    }

    pub fn increment_discarded(&self, source: &str) {
        metrics::counter!("events_discarded_total", "source" => source.to_string()).increment(1);
    }

    /// Records the outcome and latency of one channel delivery.
    pub fn record_delivery(&self, channel: &str, delivered: bool, elapsed: Duration) {
        let outcome = if delivered { "success" } else { "failure" };
        metrics::counter!(
            "channel_deliveries_total",
            "channel" => channel.to_string(),
            "outcome" => outcome
        )
        .increment(1);
        metrics::histogram!("delivery_duration_seconds", "channel" => channel.to_string())
            .record(elapsed.as_secs_f64());
    }

    pub fn set_routes_loaded_count(&self, count: usize) {
        metrics::gauge!("routes_loaded_count").set(count as f64);
    }
}

/// Builder for the metrics system.
pub struct MetricsBuilder {
    config: MetricsConfig,
}

impl MetricsBuilder {
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Initializes the metrics system.
    ///
    /// Returns the `Metrics` handle plus the server and its bound address when
    /// metrics are enabled. Failures are logged and leave metrics disabled.
    pub async fn build(
        self,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Metrics, Option<(MetricsServer, SocketAddr)>) {
        if !self.config.enabled {
            return (Metrics::default(), None);
        }

        let recorder = match PrometheusBuilder::new().set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
        ) {
            Ok(builder) => builder.build_recorder(),
            Err(e) => {
                error!("Failed to configure Prometheus recorder: {}", e);
                return (Metrics::default(), None);
            }
        };
        let handle = recorder.handle();

        let listener = match TcpListener::bind(self.config.listen_address).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(
                    "Failed to bind metrics server to {}: {}",
                    self.config.listen_address, e
                );
                return (Metrics::default(), None);
            }
        };
        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                error!("Failed to get local address for metrics server: {}", e);
                return (Metrics::default(), None);
            }
        };

        if let Err(e) = metrics::set_global_recorder(recorder) {
            error!("Failed to install Prometheus recorder: {}", e);
            return (Metrics::default(), None);
        }

        let server = MetricsServer::new(listener, handle, shutdown_rx);
        (Metrics::new(), Some((server, addr)))
    }
}
