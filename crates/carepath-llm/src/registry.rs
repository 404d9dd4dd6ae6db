use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tracing::{info, warn};

use crate::circuit_breaker::{BreakerState, CircuitBreaker};
use crate::error::{ProviderError, Result};
use crate::provider::LlmProvider;
use crate::types::{GenerateRequest, GenerateResponse};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// One entry in the provider failover chain (§4.2).
///
/// Each slot carries its own token-bucket limiter and circuit breaker so a
/// degrading provider cannot starve the others in the chain.
pub struct ProviderSlot {
    provider: Arc<dyn LlmProvider>,
    limiter: DirectRateLimiter,
    breaker: CircuitBreaker,
}

impl ProviderSlot {
    pub fn new(provider: Arc<dyn LlmProvider>, rate_limit_rpm: u32, cooloff: Duration) -> Self {
        let rpm = NonZeroU32::new(rate_limit_rpm.max(1)).expect("rate_limit_rpm > 0");
        Self {
            provider,
            limiter: RateLimiter::direct(Quota::per_minute(rpm)),
            breaker: CircuitBreaker::new(cooloff),
        }
    }

    pub fn name(&self) -> &str {
        self.provider.name()
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }
}

/// Routes generation requests across an ordered list of provider slots,
/// failing over on any soft error (§4.2). `ProviderBadInput` is hard and
/// is returned immediately without trying further slots.
pub struct ProviderRegistry {
    slots: Vec<ProviderSlot>,
}

impl ProviderRegistry {
    pub fn new(slots: Vec<ProviderSlot>) -> Self {
        assert!(!slots.is_empty(), "ProviderRegistry requires at least one provider slot");
        Self { slots }
    }

    pub fn slot_names(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.name()).collect()
    }

    pub fn breaker_states(&self) -> Vec<(String, BreakerState)> {
        self.slots
            .iter()
            .map(|s| (s.name().to_string(), s.breaker_state()))
            .collect()
    }

    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let mut last_err: Option<ProviderError> = None;

        for slot in &self.slots {
            if !slot.breaker.allow() {
                info!(provider = slot.name(), "slot circuit open, skipping");
                continue;
            }

            if let Err(not_until) = slot.limiter.check() {
                let retry_after_ms = not_until
                    .wait_time_from(DefaultClock::default().now())
                    .as_millis() as u64;
                warn!(provider = slot.name(), retry_after_ms, "slot rate limit exhausted");
                last_err = Some(ProviderError::ProviderRateLimited {
                    provider: slot.name().to_string(),
                    retry_after_ms,
                });
                continue;
            }

            let started = Instant::now();
            match slot.provider.generate(request).await {
                Ok(resp) => {
                    slot.breaker.record_success();
                    return Ok(resp);
                }
                Err(err) => {
                    warn!(
                        provider = slot.name(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        err = %err,
                        "provider generate failed"
                    );
                    if err.is_hard() {
                        return Err(err);
                    }
                    if err.trips_breaker() {
                        slot.breaker.record_trip();
                    }
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ProviderError::ProviderUnavailable {
            provider: "registry".to_string(),
            message: "no provider slots configured".to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    struct AlwaysFail;

    #[async_trait]
    impl LlmProvider for AlwaysFail {
        fn name(&self) -> &str {
            "always-fail"
        }
        async fn generate(&self, _req: &GenerateRequest) -> Result<GenerateResponse> {
            Err(ProviderError::ProviderUnavailable {
                provider: "always-fail".to_string(),
                message: "intentional".to_string(),
            })
        }
        async fn health(&self) -> bool {
            false
        }
        fn supported_models(&self) -> &[String] {
            &[]
        }
    }

    struct AlwaysOk;

    #[async_trait]
    impl LlmProvider for AlwaysOk {
        fn name(&self) -> &str {
            "always-ok"
        }
        async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse> {
            Ok(GenerateResponse {
                text: format!("echo: {}", req.prompt),
                provider: "always-ok".to_string(),
                model: "mock-1".to_string(),
                latency_ms: 1,
                usage: crate::types::TokenUsage {
                    prompt_tokens: 1,
                    completion_tokens: 1,
                },
                finish_reason: "stop".to_string(),
            })
        }
        async fn health(&self) -> bool {
            true
        }
        fn supported_models(&self) -> &[String] {
            &[]
        }
    }

    struct BadInput;

    #[async_trait]
    impl LlmProvider for BadInput {
        fn name(&self) -> &str {
            "bad-input"
        }
        async fn generate(&self, _req: &GenerateRequest) -> Result<GenerateResponse> {
            Err(ProviderError::ProviderBadInput {
                provider: "bad-input".to_string(),
                message: "prompt too long".to_string(),
            })
        }
        async fn health(&self) -> bool {
            true
        }
        fn supported_models(&self) -> &[String] {
            &[]
        }
    }

    fn request() -> GenerateRequest {
        GenerateRequest {
            prompt: "hello".to_string(),
            system: None,
            params: Default::default(),
            deadline: None,
        }
    }

    #[tokio::test]
    async fn falls_back_to_second_slot_on_soft_error() {
        let registry = ProviderRegistry::new(vec![
            ProviderSlot::new(Arc::new(AlwaysFail), 60, Duration::from_secs(30)),
            ProviderSlot::new(Arc::new(AlwaysOk), 60, Duration::from_secs(30)),
        ]);
        let resp = registry.generate(&request()).await.unwrap();
        assert_eq!(resp.provider, "always-ok");
    }

    #[tokio::test]
    async fn hard_error_short_circuits_without_trying_next_slot() {
        let registry = ProviderRegistry::new(vec![
            ProviderSlot::new(Arc::new(BadInput), 60, Duration::from_secs(30)),
            ProviderSlot::new(Arc::new(AlwaysOk), 60, Duration::from_secs(30)),
        ]);
        let result = registry.generate(&request()).await;
        assert!(matches!(result, Err(ProviderError::ProviderBadInput { .. })));
    }

    #[tokio::test]
    async fn all_slots_failing_returns_last_error() {
        let registry = ProviderRegistry::new(vec![
            ProviderSlot::new(Arc::new(AlwaysFail), 60, Duration::from_secs(30)),
            ProviderSlot::new(Arc::new(AlwaysFail), 60, Duration::from_secs(30)),
        ]);
        let result = registry.generate(&request()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn failing_slot_opens_its_breaker() {
        let registry = ProviderRegistry::new(vec![
            ProviderSlot::new(Arc::new(AlwaysFail), 60, Duration::from_secs(30)),
            ProviderSlot::new(Arc::new(AlwaysOk), 60, Duration::from_secs(30)),
        ]);
        let _ = registry.generate(&request()).await;
        assert_eq!(registry.slots[0].breaker_state(), BreakerState::Open);
    }
}
