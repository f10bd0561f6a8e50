//! List displays and selector contents derived from the merged view.

use shared::{domain::NodeId, protocol::Ride};

use crate::store::MergedView;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Panels {
    /// Options for the driver location and ride source/destination selectors.
    pub location_options: Vec<NodeId>,
    pub driver_rows: Vec<String>,
    pub pending_rows: Vec<String>,
    /// Newest ride first.
    pub ride_rows: Vec<String>,
}

impl Panels {
    pub fn from_view(view: &MergedView) -> Self {
        let snapshot = &view.snapshot;

        let driver_rows = snapshot
            .drivers
            .iter()
            .map(|(driver_id, driver)| {
                let rating = driver
                    .average_rating()
                    .map(|avg| format!("{avg:.2}"))
                    .unwrap_or_else(|| "N/A".to_string());
                format!(
                    "{driver_id} @ {} — ₹{:.2} — Rating: {rating} — {}",
                    driver.location, driver.earnings, driver.status
                )
            })
            .collect();

        let pending_rows = snapshot
            .pending_requests
            .iter()
            .map(|request| {
                format!(
                    "{}: {}→{}",
                    request.passenger_id, request.source, request.destination
                )
            })
            .collect();

        let ride_rows = snapshot.ride_history.iter().rev().map(ride_row).collect();

        Self {
            location_options: snapshot.nodes.keys().cloned().collect(),
            driver_rows,
            pending_rows,
            ride_rows,
        }
    }
}

fn ride_row(ride: &Ride) -> String {
    format!(
        "Ride {} {}: {}→{} — ₹{:.2} — {}",
        ride.ride_id, ride.passenger_id, ride.source, ride.destination, ride.fare, ride.status
    )
}
