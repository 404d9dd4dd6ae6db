use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use carepath_core::{CorrelationId, SessionId};
use carepath_router::DispatchDescriptor;
use dashmap::{DashMap, DashSet};
use tokio::sync::Mutex;

use crate::client::{MessageBusClient, TaskResponseHandler};
use crate::envelope::{TaskRequestEnvelope, TaskRequestPayload};
use crate::error::Result;

/// In-process `MessageBusClient` for tests: `dispatch` records the
/// envelope it would have sent instead of talking to a broker. Not wired
/// into the production binary.
#[derive(Default)]
pub struct InMemoryBusClient {
    dispatched: Mutex<Vec<TaskRequestEnvelope>>,
    handlers: DashMap<String, Arc<dyn TaskResponseHandler>>,
    seen_correlations: DashSet<CorrelationId>,
    duplicate_deliveries: AtomicU64,
}

impl InMemoryBusClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn dispatched(&self) -> Vec<TaskRequestEnvelope> {
        self.dispatched.lock().await.clone()
    }

    pub fn duplicate_deliveries(&self) -> u64 {
        self.duplicate_deliveries.load(Ordering::Relaxed)
    }

    /// Test helper simulating a worker response arriving on `response_topic`.
    pub async fn deliver(&self, response_topic: &str, envelope: crate::envelope::TaskResponseEnvelope) {
        if !self.seen_correlations.insert(envelope.correlation_id) {
            self.duplicate_deliveries.fetch_add(1, Ordering::Relaxed);
            return;
        }
        if let Some(handler) = self.handlers.get(response_topic) {
            handler.handle(envelope).await;
        }
    }
}

#[async_trait]
impl MessageBusClient for InMemoryBusClient {
    async fn dispatch(
        &self,
        _session_id: SessionId,
        correlation_id: CorrelationId,
        descriptor: &DispatchDescriptor,
        payload: TaskRequestPayload,
    ) -> Result<()> {
        let envelope = TaskRequestEnvelope::new(correlation_id, descriptor.task_type.clone(), payload);
        self.dispatched.lock().await.push(envelope);
        Ok(())
    }

    async fn subscribe(&self, response_topic: &str, handler: Arc<dyn TaskResponseHandler>) -> Result<()> {
        self.handlers.insert(response_topic.to_string(), handler);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
