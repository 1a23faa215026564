use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single remote store call. The only error the gateway produces.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct RemoteFailure {
    pub message: String,
}

impl RemoteFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for RemoteFailure {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for RemoteFailure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
