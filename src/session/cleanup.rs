//! Optional periodic sweep of expired sessions
//!
//! The store only evicts lazily, on read. Deployments that see many distinct
//! senders can start this task to bound memory; it calls
//! `SessionStore::evict_expired` on a fixed interval until told to stop.

use crate::session::store::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Sweeps a session store on a fixed interval
pub struct Cleanup {
    store: Arc<SessionStore>,
    interval: Duration,
}

impl Cleanup {
    pub fn new(store: Arc<SessionStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Runs a single sweep and returns how many sessions were evicted
    pub fn run(&self) -> usize {
        let evicted = self.store.evict_expired();
        if evicted > 0 {
            info!(
                sessions_evicted = evicted,
                sessions_remaining = self.store.len(),
                "Session sweep complete"
            );
        } else {
            debug!(sessions_remaining = self.store.len(), "Session sweep found nothing to evict");
        }
        evicted
    }

    /// Starts the background sweep task
    ///
    /// Returns a JoinHandle for graceful shutdown coordination and a shutdown sender
    pub fn start_cleanup_task(
        self,
    ) -> (tokio::task::JoinHandle<()>, tokio::sync::mpsc::Sender<()>) {
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            // First tick completes immediately; nothing can be expired yet.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.run();
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Session sweep task received shutdown signal, completing...");
                        break;
                    }
                }
            }
        });

        (handle, shutdown_tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::Session;

    #[tokio::test(start_paused = true)]
    async fn test_run_evicts_expired() {
        let store = Arc::new(SessionStore::new(Duration::from_secs(10)));
        store.set("a", Session::new("a"));
        store.set("b", Session::new("b"));

        let cleanup = Cleanup::new(Arc::clone(&store), Duration::from_secs(5));
        assert_eq!(cleanup.run(), 0);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cleanup.run(), 2);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_task_sweeps_and_stops() {
        let store = Arc::new(SessionStore::new(Duration::from_secs(10)));
        store.set("a", Session::new("a"));

        let (handle, shutdown) =
            Cleanup::new(Arc::clone(&store), Duration::from_secs(30)).start_cleanup_task();

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(store.len(), 0);

        shutdown.send(()).await.unwrap();
        handle.await.unwrap();
    }
}
