use async_trait::async_trait;

use crate::error::Result;
use crate::types::{GenerateRequest, GenerateResponse};

/// Common interface implemented by every backing LLM (§4.2).
///
/// Switching providers is a configuration change, never a code change —
/// new backends implement this trait and are plugged into a
/// [`crate::registry::ProviderRegistry`] slot.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Stable name used in logs, `/health`, and `/metrics`.
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse>;

    /// Lightweight reachability probe, used by `/health` and the circuit
    /// breaker's half-open trial. Providers without a cheap probe can
    /// delegate to `generate` with a minimal prompt.
    async fn health(&self) -> bool;

    fn supported_models(&self) -> &[String];
}
