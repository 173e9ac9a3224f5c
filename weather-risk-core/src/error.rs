//! Failures a single risk query can end in.

use thiserror::Error;

use crate::key::KeyError;

/// How a failed query is shown: the display treats both kinds the same, but
/// logs and tests tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Service unreachable or answered with a non-success status.
    Transport,
    /// Response or request could not be put into the expected shape.
    Decode,
}

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("prediction service unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    #[error("prediction service returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed prediction payload: {0}")]
    Decode(String),

    #[error("invalid query: {0}")]
    InvalidKey(#[from] KeyError),

    /// The task running the request ended without producing a reply.
    #[error("prediction request crashed: {0}")]
    Crashed(String),
}

impl PredictionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Unreachable(_) | Self::Status { .. } | Self::Crashed(_) => FailureKind::Transport,
            Self::Decode(_) | Self::InvalidKey(_) => FailureKind::Decode,
        }
    }

    /// User-friendly error message for UI display.
    pub fn user_message(&self) -> String {
        match self {
            Self::Unreachable(_) => "Prediction service is unreachable.".to_string(),
            Self::Status { status, message } => {
                format!("Prediction service error ({status}): {message}")
            }
            Self::Decode(_) => "Prediction service sent an unreadable response.".to_string(),
            Self::InvalidKey(err) => format!("Invalid selection: {err}"),
            Self::Crashed(_) => "Prediction request failed unexpectedly.".to_string(),
        }
    }
}
