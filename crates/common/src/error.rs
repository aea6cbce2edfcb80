//! Error types shared across Screenreel crates.

use std::path::PathBuf;

/// Top-level error type for Screenreel operations.
///
/// Export failures are grouped by when they happen: `Initialization` and
/// `Capability` abort before any output exists, while `Decode`, `Encode`
/// and `Mux` are mid-stream failures. None of them are retried.
#[derive(Debug, thiserror::Error)]
pub enum ScreenreelError {
    #[error("Initialization error: {message}")]
    Initialization { message: String },

    #[error("Encoder capability error: {message}")]
    Capability { message: String },

    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("Encode error: {message}")]
    Encode { message: String },

    #[error("Mux error: {message}")]
    Mux { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Project error: {message}")]
    Project { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ScreenreelError.
pub type ScreenreelResult<T> = Result<T, ScreenreelError>;

impl ScreenreelError {
    pub fn initialization(msg: impl Into<String>) -> Self {
        Self::Initialization {
            message: msg.into(),
        }
    }

    pub fn capability(msg: impl Into<String>) -> Self {
        Self::Capability {
            message: msg.into(),
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode {
            message: msg.into(),
        }
    }

    pub fn mux(msg: impl Into<String>) -> Self {
        Self::Mux {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn project(msg: impl Into<String>) -> Self {
        Self::Project {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether this error happened before the pipeline produced anything.
    pub fn is_initialization(&self) -> bool {
        matches!(
            self,
            Self::Initialization { .. }
                | Self::Capability { .. }
                | Self::FileNotFound { .. }
                | Self::Unsupported { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_message_is_reported_verbatim() {
        let err = ScreenreelError::capability("Video encoding not supported on this system");
        assert_eq!(
            err.to_string(),
            "Encoder capability error: Video encoding not supported on this system"
        );
        assert!(err.is_initialization());
    }

    #[test]
    fn mid_stream_errors_are_not_initialization() {
        assert!(!ScreenreelError::decode("corrupt packet").is_initialization());
        assert!(!ScreenreelError::mux("write failed").is_initialization());
    }
}
