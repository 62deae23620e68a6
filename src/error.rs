//! Design-level error taxonomy shared by both services.
//!
//! The propagation policy (spec §7) keys off `PipelineError::kind`: transient
//! transport/storage failures are retried locally with capped backoff,
//! protocol/auth failures surface on the health endpoint and trigger a
//! reconnect, config failures abort the process at boot, and not-found
//! lookups are not errors to the caller.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Protocol,
    Auth,
    Storage,
    Config,
    NotFound,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Transport(_) => ErrorKind::Transport,
            PipelineError::Protocol(_) => ErrorKind::Protocol,
            PipelineError::Auth(_) => ErrorKind::Auth,
            PipelineError::Storage(_) => ErrorKind::Storage,
            PipelineError::Config(_) => ErrorKind::Config,
            PipelineError::NotFound(_) => ErrorKind::NotFound,
        }
    }

    /// Whether the propagation policy retries this locally with backoff
    /// rather than surfacing it immediately as degraded.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::Storage)
    }
}

impl From<rusqlite::Error> for PipelineError {
    fn from(e: rusqlite::Error) -> Self {
        PipelineError::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        PipelineError::Transport(e.to_string())
    }
}

impl From<redis::RedisError> for PipelineError {
    fn from(e: redis::RedisError) -> Self {
        PipelineError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::Protocol(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
