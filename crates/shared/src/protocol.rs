use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    domain::{Coordinate, DriverId, DriverStatus, NodeId, PassengerId, RideId},
    error::SnapshotError,
};

/// Undirected weighted edge. Travels as `[a, b, weight]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(NodeId, NodeId, f64)", into = "(NodeId, NodeId, f64)")]
pub struct GraphEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub weight: f64,
}

impl From<(NodeId, NodeId, f64)> for GraphEdge {
    fn from((from, to, weight): (NodeId, NodeId, f64)) -> Self {
        Self { from, to, weight }
    }
}

impl From<GraphEdge> for (NodeId, NodeId, f64) {
    fn from(value: GraphEdge) -> Self {
        (value.from, value.to, value.weight)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    #[serde(rename = "loc", alias = "location")]
    pub location: NodeId,
    #[serde(default)]
    pub status: DriverStatus,
    #[serde(default)]
    pub earnings: f64,
    #[serde(default)]
    pub rating_sum: f64,
    #[serde(default)]
    pub rating_count: u32,
}

impl Driver {
    pub fn idle_at(location: NodeId) -> Self {
        Self {
            location,
            status: DriverStatus::Idle,
            earnings: 0.0,
            rating_sum: 0.0,
            rating_count: 0,
        }
    }

    pub fn average_rating(&self) -> Option<f64> {
        (self.rating_count > 0).then(|| self.rating_sum / f64::from(self.rating_count))
    }
}

/// Ride entry from the server history. `status` is displayed, never interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    pub ride_id: RideId,
    pub passenger_id: PassengerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<DriverId>,
    pub source: NodeId,
    pub destination: NodeId,
    pub fare: f64,
    pub status: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

/// Queued ride request. Travels as `[passenger, source, destination]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "(PassengerId, NodeId, NodeId)",
    into = "(PassengerId, NodeId, NodeId)"
)]
pub struct PendingRequest {
    pub passenger_id: PassengerId,
    pub source: NodeId,
    pub destination: NodeId,
}

impl From<(PassengerId, NodeId, NodeId)> for PendingRequest {
    fn from((passenger_id, source, destination): (PassengerId, NodeId, NodeId)) -> Self {
        Self {
            passenger_id,
            source,
            destination,
        }
    }
}

impl From<PendingRequest> for (PassengerId, NodeId, NodeId) {
    fn from(value: PendingRequest) -> Self {
        (value.passenger_id, value.source, value.destination)
    }
}

/// Authoritative state as served by `GET /api/state`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "city_coords", alias = "nodes")]
    pub nodes: BTreeMap<NodeId, Coordinate>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
    #[serde(default)]
    pub drivers: BTreeMap<DriverId, Driver>,
    #[serde(default)]
    pub pending_requests: Vec<PendingRequest>,
    #[serde(default)]
    pub ride_history: Vec<Ride>,
}

impl Snapshot {
    pub fn has_node(&self, node_id: &NodeId) -> bool {
        self.nodes.contains_key(node_id)
    }

    pub fn validate(&self) -> Result<(), SnapshotError> {
        for (driver_id, driver) in &self.drivers {
            if !self.has_node(&driver.location) {
                return Err(SnapshotError::UnknownDriverLocation {
                    driver_id: driver_id.clone(),
                    node_id: driver.location.clone(),
                });
            }
        }

        for ride in &self.ride_history {
            for node_id in [&ride.source, &ride.destination] {
                if !self.has_node(node_id) {
                    return Err(SnapshotError::UnknownRideEndpoint {
                        ride_id: ride.ride_id,
                        node_id: node_id.clone(),
                    });
                }
            }
        }

        for edge in &self.edges {
            for node_id in [&edge.from, &edge.to] {
                if !self.has_node(node_id) {
                    return Err(SnapshotError::UnknownEdgeEndpoint {
                        from: edge.from.clone(),
                        to: edge.to.clone(),
                        node_id: node_id.clone(),
                    });
                }
            }
        }

        for request in &self.pending_requests {
            for node_id in [&request.source, &request.destination] {
                if !self.has_node(node_id) {
                    return Err(SnapshotError::UnknownRequestEndpoint {
                        passenger: request.passenger_id.to_string(),
                        node_id: node_id.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddDriverRequest {
    pub driver_id: DriverId,
    pub location: NodeId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRideRequest {
    pub passenger_id: PassengerId,
    pub source: NodeId,
    pub destination: NodeId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateRideRequest {
    pub ride_id: RideId,
    pub rating: f64,
}

/// `{ok, msg?}` body returned by every mutation endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl AckResponse {
    pub fn accepted() -> Self {
        Self { ok: true, msg: None }
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            msg: Some(msg.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub ride_id: RideId,
    pub driver_id: DriverId,
    pub fare: f64,
    pub path: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_loc: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ride: Option<Assignment>,
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
