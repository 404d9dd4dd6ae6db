use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use carepath_core::config::SWEEPER_INTERVAL_MS;
use carepath_core::CorrelationId;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::registry::{CorrelationEntry, CorrelationRegistry};

/// Notified when the sweeper closes a correlation whose deadline passed
/// with no agent response (§4.7). The observer is responsible for
/// synthesizing the `AGENT_TIMEOUT` result and routing it exactly as if
/// the agent had responded — the registry itself does no session or push
/// I/O.
#[async_trait]
pub trait CorrelationObserver: Send + Sync {
    async fn on_timeout(&self, correlation_id: CorrelationId, entry: CorrelationEntry);
}

/// Spawn the background sweeper (§4.7): scans for overdue entries at most
/// every 250ms and hands each to `observer`. Runs until `shutdown` fires.
pub fn spawn_sweeper(
    registry: Arc<CorrelationRegistry>,
    observer: Arc<dyn CorrelationObserver>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(SWEEPER_INTERVAL_MS));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("correlation sweeper shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    let now = chrono::Utc::now();
                    for correlation_id in registry.timed_out_ids(now) {
                        if let Some(entry) = registry.timeout(correlation_id) {
                            debug!(correlation_id = %correlation_id, session_id = %entry.session_id, "correlation timed out");
                            observer.on_timeout(correlation_id, entry).await;
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use carepath_core::SessionId;
    use tokio::sync::Notify;

    use super::*;

    struct CountingObserver {
        count: AtomicUsize,
        notify: Notify,
    }

    #[async_trait]
    impl CorrelationObserver for CountingObserver {
        async fn on_timeout(&self, _correlation_id: CorrelationId, _entry: CorrelationEntry) {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.notify.notify_one();
        }
    }

    #[tokio::test]
    async fn sweeper_closes_overdue_entry() {
        let registry = Arc::new(CorrelationRegistry::new());
        let observer = Arc::new(CountingObserver {
            count: AtomicUsize::new(0),
            notify: Notify::new(),
        });
        let shutdown = CancellationToken::new();

        registry.register(
            CorrelationId::new(),
            CorrelationEntry {
                session_id: SessionId::new(),
                user_id: "u-1".to_string(),
                agent_response_topic: "appointment-agent-responses".to_string(),
                deadline: chrono::Utc::now() - chrono::Duration::seconds(1),
                cancel: CancellationToken::new(),
            },
        );

        let handle = spawn_sweeper(registry.clone(), observer.clone(), shutdown.clone());
        tokio::time::timeout(Duration::from_secs(1), observer.notify.notified())
            .await
            .expect("sweeper should close the overdue entry promptly");

        assert_eq!(observer.count.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());

        shutdown.cancel();
        let _ = handle.await;
    }
}
