//! Error types for runbound

use thiserror::Error;

/// Core error type for runbound operations
#[derive(Debug, Error)]
pub enum RunboundError {
    #[error("invalid arguments.")]
    InvalidArguments,

    #[error("invalid time-out period.")]
    InvalidTimeout,

    #[error("Launch failed: {0}")]
    Launch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RunboundError {
    pub fn launch(msg: impl Into<String>) -> Self {
        Self::Launch(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Usage errors are detected before anything is launched
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::InvalidArguments | Self::InvalidTimeout)
    }

    /// Short category name used in the top-level diagnostic
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidArguments | Self::InvalidTimeout => "UsageError",
            Self::Launch(_) => "LaunchError",
            Self::Io(_) => "IoError",
            Self::Internal(_) => "InternalError",
        }
    }
}

pub type Result<T> = std::result::Result<T, RunboundError>;
