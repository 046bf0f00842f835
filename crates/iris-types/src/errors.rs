use thiserror::Error;

pub type Result<T, E = IrisError> = std::result::Result<T, E>;

/// Unified error type covering common failure scenarios across subsystems.
#[derive(Debug, Error)]
pub enum IrisError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("camera error: {0}")]
    Camera(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("session error: {0}")]
    Session(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
