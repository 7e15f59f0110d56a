use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Background tasks that stop on one broadcast signal
pub struct Shutdown {
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Get a shutdown receiver for tasks to listen on
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Spawn a named task that is awaited on shutdown
    pub fn spawn<F>(&self, name: &str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        self.tasks.lock().push((name.to_string(), handle));
    }

    pub fn task_count(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Signal every task and wait for each to finish
    pub async fn shutdown(&self) {
        if self.shutdown_tx.send(()).is_err() {
            // Nobody subscribed; tasks may already be gone
            info!("No running tasks to signal");
        }

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for (name, handle) in tasks {
            match timeout(Duration::from_secs(5), handle).await {
                Ok(Ok(())) => info!("Task '{}' stopped", name),
                Ok(Err(e)) => error!("Task '{}' panicked: {}", name, e),
                Err(_) => warn!("Task '{}' shutdown timed out", name),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_tasks_stop_on_signal() {
        let shutdown = Shutdown::new();
        let stopped = Arc::new(AtomicBool::new(false));

        let mut rx = shutdown.subscribe();
        let flag = stopped.clone();
        shutdown.spawn("ticker", async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(5));
            loop {
                tokio::select! {
                    _ = rx.recv() => break,
                    _ = ticker.tick() => {}
                }
            }
            flag.store(true, Ordering::SeqCst);
        });
        assert_eq!(shutdown.task_count(), 1);

        shutdown.shutdown().await;
        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(shutdown.task_count(), 0);

        // second call has nothing left to do
        shutdown.shutdown().await;
    }
}
