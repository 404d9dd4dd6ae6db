use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use crate::registry::PromptRegistry;

/// Spawn a task that reloads `registry` on every SIGHUP (§4.3).
///
/// Runs until the process exits; there is no cancellation handle because
/// a prompt registry lives for the lifetime of the gateway binary.
pub fn spawn_sighup_reload(registry: Arc<PromptRegistry>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(err) => {
                error!(err = %err, "failed to install SIGHUP handler, prompt hot-reload disabled");
                return;
            }
        };

        loop {
            hangup.recv().await;
            info!("SIGHUP received, reloading prompt templates");
            registry.reload().await;
        }
    })
}
