use thiserror::Error;

/// Errors surfaced by a `SessionStore` implementation.
#[derive(Debug, Error)]
pub enum SessionStoreError {
    /// Another writer raced `append_message`; the caller should reload and
    /// retry the whole sequence (§4.1, §4.9).
    #[error("concurrent write conflict on session {session_id}")]
    Conflict { session_id: String },

    /// The backing store (Redis) could not be reached at all.
    #[error("session store unreachable: {0}")]
    Unavailable(String),

    /// A stored value failed to (de)serialize — a sign of a version skew
    /// between orchestrator instances.
    #[error("session (de)serialization error: {0}")]
    Codec(String),
}

pub type Result<T> = std::result::Result<T, SessionStoreError>;
