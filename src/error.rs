use thiserror::Error;

/// Client-wide error type
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Signaling error: {0}")]
    Signaling(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Negotiation error: {0}")]
    Negotiation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("WebRTC error: {0}")]
    WebRtc(#[from] webrtc::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
