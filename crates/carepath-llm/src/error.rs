use thiserror::Error;

/// Failure taxonomy for a single provider call (§4.2).
///
/// `ProviderBadInput` is hard — never retried, never triggers failover.
/// Everything else is soft: the registry fails over to the next slot.
#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    #[error("provider {provider} timed out after {elapsed_ms}ms")]
    ProviderTimeout { provider: String, elapsed_ms: u64 },

    #[error("provider {provider} rate limited, retry after {retry_after_ms}ms")]
    ProviderRateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("provider {provider} rejected input: {message}")]
    ProviderBadInput { provider: String, message: String },

    #[error("provider {provider} unavailable: {message}")]
    ProviderUnavailable { provider: String, message: String },
}

impl ProviderError {
    pub fn provider(&self) -> &str {
        match self {
            ProviderError::ProviderTimeout { provider, .. } => provider,
            ProviderError::ProviderRateLimited { provider, .. } => provider,
            ProviderError::ProviderBadInput { provider, .. } => provider,
            ProviderError::ProviderUnavailable { provider, .. } => provider,
        }
    }

    /// Hard failures are never retried and never open the circuit breaker.
    pub fn is_hard(&self) -> bool {
        matches!(self, ProviderError::ProviderBadInput { .. })
    }

    /// Whether this outcome should open the slot's circuit breaker.
    pub fn trips_breaker(&self) -> bool {
        matches!(
            self,
            ProviderError::ProviderRateLimited { .. } | ProviderError::ProviderUnavailable { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
