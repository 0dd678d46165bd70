//! Runs a full `App` on an ephemeral port.

use anyhow::Result;
use bullet::{
    app::App,
    config::Config,
    router::Dispatcher,
    sources::SourceRegistry,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::{sync::watch, task::JoinHandle, time::timeout};

pub struct TestApp {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<Result<()>>,
}

impl TestApp {
    /// Starts the app with the given dispatcher, or with none at all when
    /// `dispatcher` is `None`.
    pub async fn start(dispatcher: Option<Dispatcher>) -> TestApp {
        Self::start_with_sources(dispatcher, None).await
    }

    pub async fn start_with_sources(
        dispatcher: Option<Dispatcher>,
        sources: Option<SourceRegistry>,
    ) -> TestApp {
        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.routes_config = "/nonexistent/bullet-routes.yaml".into();

        let mut builder = App::builder(config);
        if let Some(dispatcher) = dispatcher {
            builder = builder.dispatcher_override(dispatcher);
        }
        if let Some(sources) = sources {
            builder = builder.sources_override(sources);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let app = builder.build(shutdown_rx).await.unwrap();
        let addr = app.local_addr();
        let handle = tokio::spawn(app.run());

        TestApp {
            addr,
            client: reqwest::Client::new(),
            shutdown_tx,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn shutdown(self) {
        self.shutdown_tx.send(true).unwrap();
        timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("app did not shut down in time")
            .unwrap()
            .unwrap();
    }
}
