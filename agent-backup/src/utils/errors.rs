//! Error types for the backup engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{tool} failed ({status}): {stderr}")]
    ExternalTool {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("{tool} timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("Archive format error: {0}")]
    ArchiveFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl EngineError {
    pub fn tool_failure(tool: &str, status: impl Into<String>, stderr: impl Into<String>) -> Self {
        EngineError::ExternalTool {
            tool: tool.to_string(),
            status: status.into(),
            stderr: stderr.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
