use thiserror::Error;

use crate::domain::{DriverId, NodeId, RideId};

/// A snapshot that names a location outside its own node set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("driver {driver_id} is located at unknown node {node_id}")]
    UnknownDriverLocation { driver_id: DriverId, node_id: NodeId },
    #[error("ride {ride_id} references unknown node {node_id}")]
    UnknownRideEndpoint { ride_id: RideId, node_id: NodeId },
    #[error("edge {from}-{to} references unknown node {node_id}")]
    UnknownEdgeEndpoint {
        from: NodeId,
        to: NodeId,
        node_id: NodeId,
    },
    #[error("pending request for passenger {passenger} references unknown node {node_id}")]
    UnknownRequestEndpoint { passenger: String, node_id: NodeId },
}

/// Input rejected locally, before any request is issued.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    EmptyId(&'static str),
    #[error("animation path must contain at least one node")]
    EmptyPath,
    #[error("rating must be between 1 and 5, got {0}")]
    InvalidRating(f64),
}
