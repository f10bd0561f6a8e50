use shared::{
    domain::{DriverId, NodeId},
    error::{SnapshotError, ValidationError},
};
use thiserror::Error;

use crate::animation::RunId;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("malformed server payload: {0}")]
    Decode(String),
    #[error("server rejected request: {0}")]
    ServerRejection(String),
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("unknown driver {0}")]
    UnknownDriver(DriverId),
    #[error("unknown location {0}")]
    UnknownNode(NodeId),
    #[error("animation run {run_id} no longer owns driver {driver_id}")]
    Superseded { run_id: RunId, driver_id: DriverId },
}

impl ClientError {
    pub fn rejection(msg: Option<String>, fallback: &str) -> Self {
        ClientError::ServerRejection(msg.unwrap_or_else(|| fallback.to_string()))
    }

    /// Transport and decode failures leave the store untouched and are not retried.
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::Decode(_))
    }
}

impl From<SnapshotError> for ClientError {
    fn from(value: SnapshotError) -> Self {
        ClientError::Decode(value.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            ClientError::Decode(value.to_string())
        } else {
            ClientError::Transport(value.to_string())
        }
    }
}
