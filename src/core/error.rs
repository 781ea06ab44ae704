use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgoraError {
    #[error("Actor not found: {0}")]
    ActorNotFound(crate::core::types::ActorId),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Malformed decision response: {0}")]
    MalformedResponse(String),

    #[error("Decision service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AgoraError>;
