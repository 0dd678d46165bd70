//! Tracks the long-running tasks of the relay and awaits them on shutdown.
use futures::future::join_all;
use std::future::Future;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Owns the `JoinHandle`s of every spawned server task.
#[derive(Debug)]
pub struct TaskManager {
    handles: Vec<(&'static str, JoinHandle<()>)>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TaskManager {
    pub fn new(shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            handles: Vec::new(),
            shutdown_rx,
        }
    }

    pub fn spawn<F>(&mut self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!(task_name = name, "Spawning task");
        self.handles.push((name, tokio::spawn(future)));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Waits for every task to finish. Tasks are expected to watch the
    /// shutdown receiver and return on their own.
    pub async fn shutdown(self) {
        info!("Waiting for {} task(s) to complete...", self.handles.len());

        let (names, handles): (Vec<_>, Vec<_>) = self.handles.into_iter().unzip();
        let results = join_all(handles).await;

        let mut panicked = 0;
        for (name, result) in names.into_iter().zip(results) {
            match result {
                Ok(()) => debug!(task_name = name, "Task shut down gracefully."),
                Err(e) => {
                    error!(task_name = name, error = %e, "Task panicked during shutdown.");
                    panicked += 1;
                }
            }
        }

        if panicked == 0 {
            info!("All tasks shut down gracefully.");
        } else {
            error!("{} task(s) panicked during shutdown", panicked);
        }
    }
}
