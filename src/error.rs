//! Error handling for facewatch

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Source URL failed validation or the camera is unreachable.
    /// Fatal to a polling run: the run ends with zero attempts.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Connection-level failure (timeout, refused) against one backend.
    /// Isolated to that backend; drives its consecutive-error counter.
    #[error("Connection aborted for detector {detector}: {message}")]
    ConnectionAborted { detector: String, message: String },

    /// Backend reply missing its success flag or predictions payload.
    /// Treated as "no detections" at the adapter boundary.
    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    /// Match persistence failure. Logged, never rolls back classification.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Image decode/encode error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when this error counts against a backend's consecutive-error
    /// counter.
    pub fn is_connection_aborted(&self) -> bool {
        matches!(self, Error::ConnectionAborted { .. })
    }
}
