use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    /// The producer could not flush within its deadline (default 2s, §4.6).
    /// No correlation entry is created when this is returned.
    #[error("dispatch timed out after {elapsed_ms}ms")]
    DispatchTimeout { elapsed_ms: u64 },

    #[error("broker error: {0}")]
    Broker(String),

    #[error("envelope (de)serialization error: {0}")]
    Codec(String),
}

pub type Result<T> = std::result::Result<T, BusError>;
