use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use carepath_core::{CorrelationId, SessionId};
use carepath_router::DispatchDescriptor;
use dashmap::DashSet;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message as _;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::envelope::{TaskRequestEnvelope, TaskRequestPayload, TaskResponseEnvelope};
use crate::error::{BusError, Result};

/// Handles a single task-response delivery. Must be idempotent: a second
/// delivery for a completed correlation id is dropped by the client before
/// this is ever called (§4.6).
#[async_trait]
pub trait TaskResponseHandler: Send + Sync {
    async fn handle(&self, envelope: TaskResponseEnvelope);
}

/// Produces task requests and consumes task responses over a shared bus
/// (§4.6). Partitioned by session id so responses for one session stay
/// ordered; response topics are consumed under a single consumer group
/// named `orchestrator`.
#[async_trait]
pub trait MessageBusClient: Send + Sync {
    async fn dispatch(
        &self,
        session_id: SessionId,
        correlation_id: CorrelationId,
        descriptor: &DispatchDescriptor,
        payload: TaskRequestPayload,
    ) -> Result<()>;

    async fn subscribe(&self, response_topic: &str, handler: Arc<dyn TaskResponseHandler>) -> Result<()>;

    async fn shutdown(&self) -> Result<()>;

    /// Count of at-least-once deliveries dropped as duplicates, surfaced on
    /// `/metrics`. Implementations with no natural notion of this (e.g. the
    /// in-memory test double) return 0.
    fn duplicate_deliveries(&self) -> u64 {
        0
    }
}

pub struct KafkaBusClient {
    producer: FutureProducer,
    brokers: String,
    consumer_group: String,
    flush_deadline: Duration,
    seen_correlations: Arc<DashSet<CorrelationId>>,
    duplicate_deliveries: Arc<AtomicU64>,
    consumer_tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl KafkaBusClient {
    pub fn new(brokers: &[String], consumer_group: &str, flush_deadline: Duration) -> Result<Self> {
        let broker_list = brokers.join(",");
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &broker_list)
            .set("message.timeout.ms", flush_deadline.as_millis().to_string())
            .create()
            .map_err(|e| BusError::Broker(e.to_string()))?;

        Ok(Self {
            producer,
            brokers: broker_list,
            consumer_group: consumer_group.to_string(),
            flush_deadline,
            seen_correlations: Arc::new(DashSet::new()),
            duplicate_deliveries: Arc::new(AtomicU64::new(0)),
            consumer_tasks: std::sync::Mutex::new(Vec::new()),
        })
    }

    /// Count of responses dropped as duplicate at-least-once deliveries,
    /// surfaced on `/metrics`.
    pub fn duplicate_deliveries(&self) -> u64 {
        self.duplicate_deliveries.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MessageBusClient for KafkaBusClient {
    async fn dispatch(
        &self,
        session_id: SessionId,
        correlation_id: CorrelationId,
        descriptor: &DispatchDescriptor,
        payload: TaskRequestPayload,
    ) -> Result<()> {
        let envelope = TaskRequestEnvelope::new(correlation_id, descriptor.task_type.clone(), payload);
        let body = serde_json::to_string(&envelope).map_err(|e| BusError::Codec(e.to_string()))?;
        let key = session_id.to_string();

        let started = Instant::now();
        let record = FutureRecord::to(&descriptor.request_topic).payload(&body).key(&key);

        match self
            .producer
            .send(record, Timeout::After(self.flush_deadline))
            .await
        {
            Ok(_) => Ok(()),
            Err((err, _)) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                warn!(topic = %descriptor.request_topic, err = %err, elapsed_ms, "dispatch failed or timed out");
                Err(BusError::DispatchTimeout { elapsed_ms })
            }
        }
    }

    async fn subscribe(&self, response_topic: &str, handler: Arc<dyn TaskResponseHandler>) -> Result<()> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.consumer_group)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| BusError::Broker(e.to_string()))?;

        consumer
            .subscribe(&[response_topic])
            .map_err(|e| BusError::Broker(e.to_string()))?;

        let seen = self.seen_correlations.clone();
        let duplicates = self.duplicate_deliveries.clone();
        let topic = response_topic.to_string();

        let task = tokio::spawn(async move {
            loop {
                match consumer.recv().await {
                    Ok(message) => {
                        let Some(payload) = message.payload() else {
                            continue;
                        };
                        match serde_json::from_slice::<TaskResponseEnvelope>(payload) {
                            Ok(envelope) => {
                                if !seen.insert(envelope.correlation_id) {
                                    duplicates.fetch_add(1, Ordering::Relaxed);
                                    continue;
                                }
                                handler.handle(envelope).await;
                            }
                            Err(err) => {
                                error!(topic = %topic, err = %err, "malformed task response envelope");
                            }
                        }
                    }
                    Err(err) => {
                        error!(topic = %topic, err = %err, "consumer recv error");
                    }
                }
            }
        });

        self.consumer_tasks.lock().unwrap().push(task);
        info!(topic = response_topic, group = %self.consumer_group, "subscribed to response topic");
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        let tasks = std::mem::take(&mut *self.consumer_tasks.lock().unwrap());
        for task in tasks {
            task.abort();
        }
        self.producer
            .flush(self.flush_deadline)
            .map_err(|e| BusError::Broker(e.to_string()))?;
        Ok(())
    }

    fn duplicate_deliveries(&self) -> u64 {
        self.duplicate_deliveries.load(Ordering::Relaxed)
    }
}
