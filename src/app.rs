//! The main application logic, decoupled from the entry point.

use crate::{
    channels::ChannelDefaults,
    config::Config,
    internal_metrics::MetricsBuilder,
    router::Dispatcher,
    routes::{ConfigError, RoutesConfig},
    server::{AppState, HttpServer},
    sources::SourceRegistry,
    task_manager::TaskManager,
};
use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, instrument};

/// A handle to the running application.
pub struct App {
    task_manager: TaskManager,
    local_addr: SocketAddr,
    metrics_addr: Option<SocketAddr>,
    routing_enabled: bool,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// Address the webhook server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_addr
    }

    /// Whether a dispatcher is available to route webhooks.
    pub fn routing_enabled(&self) -> bool {
        self.routing_enabled
    }

    /// Waits for the shutdown signal and then gracefully shuts down all tasks.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.task_manager.shutdown_rx();
        let _ = shutdown_rx.wait_for(|stop| *stop).await;
        info!("Shutdown signal received. Waiting for tasks to complete...");

        self.task_manager.shutdown().await;

        info!("Bullet stopped");
        Ok(())
    }
}

/// Builder for the main application.
///
/// Components can be overridden for tests.
pub struct AppBuilder {
    config: Config,
    dispatcher_override: Option<Dispatcher>,
    sources_override: Option<SourceRegistry>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            dispatcher_override: None,
            sources_override: None,
        }
    }

    /// Uses the given dispatcher instead of loading the routes file.
    pub fn dispatcher_override(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher_override = Some(dispatcher);
        self
    }

    /// Uses the given registry instead of the built-in sources.
    pub fn sources_override(mut self, sources: SourceRegistry) -> Self {
        self.sources_override = Some(sources);
        self
    }

    /// Builds all components, binds the listeners, and spawns the servers.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;
        let mut task_manager = TaskManager::new(shutdown_rx.clone());

        // Metrics
        let (metrics, metrics_server_info) = MetricsBuilder::new(config.metrics.clone())
            .build(shutdown_rx.clone())
            .await;
        let metrics_addr = if let Some((server, addr)) = metrics_server_info {
            task_manager.spawn("MetricsServer", server.run());
            info!("Metrics server listening on http://{}", addr);
            Some(addr)
        } else {
            None
        };

        // Routing
        let dispatcher = match self.dispatcher_override {
            Some(dispatcher) => Some(dispatcher),
            None => load_dispatcher(&config),
        }
        .map(|dispatcher| {
            metrics.set_routes_loaded_count(dispatcher.routes().len());
            Arc::new(dispatcher.with_metrics(metrics.clone()))
        });
        let routing_enabled = dispatcher.is_some();

        let sources = Arc::new(
            self.sources_override
                .unwrap_or_else(SourceRegistry::with_defaults),
        );
        info!(sources = ?sources.names(), "Registered sources");

        // HTTP server
        let bind_addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("failed to bind HTTP server to {bind_addr}"))?;
        let local_addr = listener.local_addr()?;

        let state = AppState::new(dispatcher, sources).with_metrics(metrics);
        task_manager.spawn("HttpServer", HttpServer::new(listener, state, shutdown_rx).run());
        info!("Bullet started, listening on http://{}", local_addr);

        Ok(App {
            task_manager,
            local_addr,
            metrics_addr,
            routing_enabled,
        })
    }
}

/// Sends the shutdown signal once `signal` resolves.
///
/// If the signal cannot be listened for, the error is logged and the sender is
/// held open so the app keeps serving.
pub async fn shutdown_on_signal<F>(signal: F, shutdown_tx: watch::Sender<bool>)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received. Shutting down gracefully...");
    let _ = shutdown_tx.send(true);
}

/// Loads the routes file and builds the dispatcher.
///
/// Failures are logged and yield `None`; the server still starts and
/// rejects webhooks until the configuration is fixed.
fn load_dispatcher(config: &Config) -> Option<Dispatcher> {
    let routes = match RoutesConfig::load(&config.routes_config) {
        Ok(routes) => routes,
        Err(ConfigError::NotFound(path)) => {
            error!(
                "Routes config not found at {}. Create it or pass --routes; webhooks will be rejected.",
                path.display()
            );
            return None;
        }
        Err(e) => {
            error!("Failed to load routes config: {}", e);
            return None;
        }
    };

    let defaults = ChannelDefaults::from_config(config);
    match Dispatcher::new(routes, &defaults) {
        Ok(dispatcher) => {
            info!(
                fan_out = %config.delivery.fan_out,
                "Loaded {} route(s) from {}",
                dispatcher.routes().len(),
                config.routes_config.display()
            );
            Some(dispatcher.with_fan_out(config.delivery.fan_out))
        }
        Err(e) => {
            error!("Failed to build channels: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config
    }

    #[test]
    fn test_missing_routes_file_disables_routing() {
        let mut config = test_config();
        config.routes_config = "/nonexistent/routes.yaml".into();
        assert!(load_dispatcher(&config).is_none());
    }

    #[test]
    fn test_invalid_routes_file_disables_routing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "routes:\n  - channels:\n      - type: pager").unwrap();
        let mut config = test_config();
        config.routes_config = file.path().to_path_buf();
        assert!(load_dispatcher(&config).is_none());
    }

    #[test]
    fn test_routes_file_applies_fan_out() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "routes:\n  - name: all\n    channels: []").unwrap();
        let mut config = test_config();
        config.routes_config = file.path().to_path_buf();
        config.delivery.fan_out = crate::config::FanOut::Concurrent;

        let dispatcher = load_dispatcher(&config).unwrap();
        assert_eq!(dispatcher.routes().len(), 1);
        assert_eq!(dispatcher.fan_out(), crate::config::FanOut::Concurrent);
    }

    #[tokio::test]
    async fn test_signal_triggers_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        shutdown_on_signal(async { Ok(()) }, tx).await;
        assert!(*rx.borrow_and_update());
    }

    #[tokio::test]
    async fn test_signal_listener_error_keeps_serving() {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(shutdown_on_signal(
            async { Err(std::io::Error::other("no signal handler")) },
            tx,
        ));

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!*rx.borrow());
        // Sender still alive, so the app is not told to stop.
        assert_eq!(rx.has_changed().ok(), Some(false));
        handle.abort();
    }

    #[tokio::test]
    async fn test_app_starts_and_stops() {
        let (tx, rx) = watch::channel(false);
        let mut config = test_config();
        config.routes_config = "/nonexistent/routes.yaml".into();

        let app = App::builder(config).build(rx).await.unwrap();
        assert!(!app.routing_enabled());
        assert_ne!(app.local_addr().port(), 0);
        assert!(app.metrics_addr().is_none());

        let handle = tokio::spawn(app.run());
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
