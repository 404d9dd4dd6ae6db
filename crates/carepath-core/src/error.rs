use thiserror::Error;

/// Crate-wide error taxonomy (§7 of the spec).
///
/// Every surfaced failure carries a stable machine-readable `code()`; only
/// `Validation` and the handful of kinds marked as hard errors below should
/// ever reach an HTTP client directly. Everything else is handled inside the
/// Conversation Engine and turned into a coherent transcript entry instead.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Client-observable 4xx: malformed or out-of-range request fields.
    #[error("validation error: {0}")]
    Validation(String),

    /// No session found for an explicit read (`GET`/`DELETE /session/{id}`).
    /// `/chat` never produces this — it lazily creates instead.
    #[error("session not found: {session_id}")]
    SessionMissing { session_id: String },

    /// All configured LLM providers were exhausted.
    #[error("provider failure: {0}")]
    ProviderFailure(String),

    /// The message bus producer could not accept a task request in time.
    #[error("dispatch failure: {0}")]
    DispatchFailure(String),

    /// The correlation sweeper closed a task that never received a response.
    #[error("agent timeout for correlation {correlation_id}")]
    AgentTimeout { correlation_id: String },

    /// The session store is unreachable; the engine degrades to stateless mode.
    #[error("session store outage: {0}")]
    StoreOutage(String),

    /// A bus envelope failed to parse or was missing required fields.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Stable machine-readable code, surfaced to clients alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            OrchestratorError::Validation(_) => "VALIDATION_ERROR",
            OrchestratorError::SessionMissing { .. } => "SESSION_MISSING",
            OrchestratorError::ProviderFailure(_) => "PROVIDER_FAILURE",
            OrchestratorError::DispatchFailure(_) => "DISPATCH_FAILURE",
            OrchestratorError::AgentTimeout { .. } => "AGENT_TIMEOUT",
            OrchestratorError::StoreOutage(_) => "STORE_OUTAGE",
            OrchestratorError::ProtocolError(_) => "PROTOCOL_ERROR",
            OrchestratorError::Config(_) => "CONFIG_ERROR",
            OrchestratorError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
