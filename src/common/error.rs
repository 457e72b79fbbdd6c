//! Error types for the waypoint core

use thiserror::Error;

/// Errors raised by the planning and perception components
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),

    #[error("missing configuration: {0}")]
    MissingConfig(String),

    #[error("base path is empty")]
    EmptyPath,

    #[error("invalid braking request: {0}")]
    InvalidBrakingRequest(String),

    #[error("classifier did not answer within {0} ms")]
    ClassifierTimeout(u64),

    #[error("classifier failure: {0}")]
    Classifier(String),

    #[error("lifecycle transition failed for {node}: {reason}")]
    Lifecycle { node: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub(crate) fn invalid(name: &str, reason: &str) -> Self {
        CoreError::InvalidParameter {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}
