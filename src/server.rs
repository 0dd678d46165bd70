//! # HTTP Server
//!
//! The inbound side of the relay: webhook endpoints plus a few read-only
//! introspection endpoints. Handlers share an explicitly constructed
//! [`AppState`]; nothing here is global.

use crate::internal_metrics::Metrics;
use crate::router::{DispatchResults, Dispatcher};
use crate::routes::{ChannelConfig, RouteMatcher};
use crate::sources::{SourceError, SourceRegistry};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, trace, warn};

/// State shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    /// Absent when the routing configuration failed to load.
    pub dispatcher: Option<Arc<Dispatcher>>,
    pub sources: Arc<SourceRegistry>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(dispatcher: Option<Arc<Dispatcher>>, sources: Arc<SourceRegistry>) -> Self {
        Self {
            dispatcher,
            sources,
            metrics: Metrics::default(),
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }
}

/// Errors that end a webhook request before dispatch.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Router not configured. Check the routes configuration file.")]
    ServiceUnavailable,

    #[error(transparent)]
    Source(#[from] SourceError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Source(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Body returned for every webhook that reached the dispatcher.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub source: String,
    pub results: DispatchResults,
}

impl WebhookResponse {
    /// Maps dispatch results onto the response contract.
    pub fn from_results(source: String, results: DispatchResults) -> (StatusCode, Self) {
        let (code, status, message) = if results.is_empty() {
            (StatusCode::OK, "discarded", "No matching route found")
        } else if !results.values().any(|delivered| *delivered) {
            (
                StatusCode::BAD_GATEWAY,
                "error",
                "Failed to send to all matched channels",
            )
        } else {
            (StatusCode::OK, "ok", "Event routed successfully")
        };

        (
            code,
            Self {
                status,
                message,
                source,
                results,
            },
        )
    }
}

/// Builds the axum router for the relay.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sources", get(list_sources))
        .route("/routes", get(list_routes))
        .route("/webhook/grafana", post(grafana_webhook))
        .route("/webhook/{source}", post(generic_webhook))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn list_sources(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "sources": state.sources.names() }))
}

#[derive(Serialize)]
struct RouteView<'a> {
    name: &'a str,
    #[serde(rename = "match")]
    matcher: &'a RouteMatcher,
    channels: Vec<ChannelConfig>,
}

async fn list_routes(State(state): State<AppState>) -> Json<Value> {
    let Some(dispatcher) = &state.dispatcher else {
        return Json(json!({ "routes": [] }));
    };

    let routes: Vec<RouteView<'_>> = dispatcher
        .routes()
        .iter()
        .map(|route| RouteView {
            name: &route.name,
            matcher: &route.matcher,
            channels: route.channels.iter().map(ChannelConfig::redacted).collect(),
        })
        .collect();
    Json(json!({ "routes": routes }))
}

async fn grafana_webhook(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Response, ApiError> {
    process_webhook(&state, "grafana", &payload).await
}

async fn generic_webhook(
    State(state): State<AppState>,
    Path(source): Path<String>,
    Json(payload): Json<Value>,
) -> Result<Response, ApiError> {
    process_webhook(&state, &source, &payload).await
}

async fn process_webhook(
    state: &AppState,
    source_name: &str,
    payload: &Value,
) -> Result<Response, ApiError> {
    info!(source = source_name, "Received webhook");
    state.metrics.increment_webhooks_received(source_name);

    let Some(dispatcher) = &state.dispatcher else {
        warn!(source = source_name, "Rejecting webhook, router not configured");
        return Err(ApiError::ServiceUnavailable);
    };

    let source = state.sources.get(source_name)?;
    let event = source.parse(payload).inspect_err(|e| {
        error!(source = source_name, error = %e, "Failed to parse payload");
    })?;
    info!(
        source = source_name,
        kind = %event.kind,
        labels = event.labels.len(),
        "Parsed webhook"
    );

    let results = dispatcher.route(&event).await;
    let (code, body) = WebhookResponse::from_results(source_name.to_string(), results);
    if body.status == "discarded" {
        info!(source = source_name, "No matching route, event discarded");
    }
    Ok((code, Json(body)).into_response())
}

/// Serves the relay router on a bound listener.
pub struct HttpServer {
    listener: TcpListener,
    state: AppState,
    shutdown_rx: watch::Receiver<bool>,
}

impl HttpServer {
    pub fn new(listener: TcpListener, state: AppState, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            listener,
            state,
            shutdown_rx,
        }
    }

    /// Returns a future that serves requests until a shutdown signal is received.
    pub fn run(self) -> impl Future<Output = ()> {
        let app = router(self.state);
        let mut shutdown_rx = self.shutdown_rx;

        async move {
            let shutdown = async move {
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
                trace!("HTTP server received shutdown signal.");
            };
            if let Err(e) = axum::serve(self.listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("HTTP server error: {}", e);
            }
            trace!("HTTP server task finished.");
        }
    }
}
