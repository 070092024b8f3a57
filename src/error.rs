//! Error types for KrishiOS onboarding.

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Invalid request: {0}")]
    Request(String),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors from the hosted backend (auth, tables, object storage).
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend understood the request and refused it. `message` is the
    /// server's own text and is safe to show to the visitor.
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("No active session")]
    NoSession,

    #[error("Storage operation on {path} failed: {reason}")]
    Storage { path: String, reason: String },
}

impl BackendError {
    /// Message that may be shown verbatim to the visitor, if any.
    pub fn user_message(&self) -> Option<&str> {
        match self {
            Self::Rejected { message, .. } if !message.trim().is_empty() => Some(message.as_str()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}

/// Reasons a local avatar file is refused before staging.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AvatarError {
    #[error("not an image: {mime}")]
    NotAnImage { mime: String },

    #[error("file is {size} bytes, limit is {max}")]
    TooLarge { size: u64, max: u64 },
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
