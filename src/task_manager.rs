//! Manages the lifecycle of background tasks spawned by the application.
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A centralized manager for background tasks.
///
/// This struct is responsible for:
/// - Spawning tasks and keeping track of their `JoinHandle`s.
/// - Handing out the shared shutdown token.
/// - Awaiting every task during graceful shutdown.
#[derive(Clone, Debug)]
pub struct TaskManager {
    handles: Arc<Mutex<Vec<(&'static str, JoinHandle<()>)>>>,
    shutdown: CancellationToken,
}

impl TaskManager {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            handles: Arc::new(Mutex::new(Vec::new())),
            shutdown,
        }
    }

    /// Spawns a new task and adds its handle to the manager.
    pub fn spawn<F>(&self, name: &'static str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        debug!(task_name = name, "Spawning task");
        let handle = tokio::spawn(future);
        match self.handles.lock() {
            Ok(mut handles) => handles.push((name, handle)),
            Err(poisoned) => poisoned.into_inner().push((name, handle)),
        }
    }

    /// Returns a clone of the shutdown token.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancels the shutdown token and waits for all managed tasks to complete.
    pub async fn shutdown(self) {
        self.shutdown.cancel();

        let handles = match self.handles.lock() {
            Ok(mut handles) => handles.drain(..).collect::<Vec<_>>(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect::<Vec<_>>(),
        };
        info!(
            "TaskManager shutting down. Waiting for {} tasks to complete...",
            handles.len()
        );

        let task_names: Vec<&'static str> = handles.iter().map(|(name, _)| *name).collect();
        let results = join_all(handles.into_iter().map(|(_, handle)| handle)).await;

        let mut panicked = 0;
        for (task_name, result) in task_names.into_iter().zip(results) {
            match result {
                Ok(()) => debug!(task_name, "Task shut down gracefully."),
                Err(e) => {
                    error!(task_name, error = %e, "Task panicked during shutdown.");
                    panicked += 1;
                }
            }
        }

        if panicked > 0 {
            error!("{} tasks panicked during shutdown", panicked);
        } else {
            info!("All tasks shut down gracefully.");
        }
    }
}
