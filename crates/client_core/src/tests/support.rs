use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use shared::{
    domain::{Coordinate, DriverId, DriverStatus, NodeId, RideId},
    protocol::{
        AckResponse, AddDriverRequest, Assignment, AssignResponse, Driver, GraphEdge,
        PendingRequest, RateRideRequest, RequestRideRequest, Ride, Snapshot,
    },
};
use tokio::time::Instant;

use crate::{api::DispatchApi, error::ClientError};

pub(crate) fn node(id: &str) -> NodeId {
    NodeId::from(id)
}

pub(crate) fn driver(id: &str) -> DriverId {
    DriverId::from(id)
}

pub(crate) fn path(ids: &[&str]) -> Vec<NodeId> {
    ids.iter().map(|id| node(id)).collect()
}

/// Nodes `A:(0,0)` and `B:(10,0)` with driver `d1` idle at `A`.
pub(crate) fn two_node_snapshot() -> Snapshot {
    let mut snapshot = Snapshot::default();
    snapshot.nodes.insert(node("A"), Coordinate::new(0.0, 0.0));
    snapshot.nodes.insert(node("B"), Coordinate::new(10.0, 0.0));
    snapshot.edges.push(GraphEdge {
        from: node("A"),
        to: node("B"),
        weight: 4.0,
    });
    snapshot
        .drivers
        .insert(driver("d1"), Driver::idle_at(node("A")));
    snapshot
}

/// A line of nodes `A..E` with driver `d1` idle at `A`.
pub(crate) fn line_snapshot() -> Snapshot {
    let mut snapshot = Snapshot::default();
    for (index, id) in ["A", "B", "C", "D", "E"].iter().enumerate() {
        snapshot
            .nodes
            .insert(node(id), Coordinate::new(index as f64 * 100.0, 50.0));
    }
    for pair in ["A", "B", "C", "D", "E"].windows(2) {
        snapshot.edges.push(GraphEdge {
            from: node(pair[0]),
            to: node(pair[1]),
            weight: 2.0,
        });
    }
    snapshot
        .drivers
        .insert(driver("d1"), Driver::idle_at(node("A")));
    snapshot
}

struct FakeServer {
    snapshot: Snapshot,
    assignments: VecDeque<Assignment>,
    fetch_delays: VecDeque<Duration>,
    reject_with: Option<String>,
    next_ride_id: i64,
}

/// Per-node travel time of the server's own trip simulation, slower than
/// the client animation's 300 ms steps.
pub(crate) const SERVER_TRIP_STEP: Duration = Duration::from_millis(600);

/// In-memory stand-in for the dispatch server.
pub(crate) struct FakeApi {
    server: Arc<Mutex<FakeServer>>,
    fail_fetch: AtomicBool,
    pub fetch_calls: AtomicUsize,
    pub mutation_calls: AtomicUsize,
    pub fetch_times: Mutex<Vec<Instant>>,
}

impl FakeApi {
    pub(crate) fn new(snapshot: Snapshot) -> Self {
        Self {
            server: Arc::new(Mutex::new(FakeServer {
                snapshot,
                assignments: VecDeque::new(),
                fetch_delays: VecDeque::new(),
                reject_with: None,
                next_ride_id: 1,
            })),
            fail_fetch: AtomicBool::new(false),
            fetch_calls: AtomicUsize::new(0),
            mutation_calls: AtomicUsize::new(0),
            fetch_times: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn queue_assignment(&self, driver_id: &str, route: &[&str]) {
        let mut server = self.server.lock().expect("fake server");
        let ride_id = RideId(server.next_ride_id);
        server.next_ride_id += 1;
        server.assignments.push_back(Assignment {
            ride_id,
            driver_id: driver(driver_id),
            fare: 20.0 + 10.0 * route.len() as f64,
            path: path(route),
            driver_loc: route.first().map(|id| node(id)),
            distance: None,
        });
    }

    pub(crate) fn delay_next_fetch(&self, delay: Duration) {
        let mut server = self.server.lock().expect("fake server");
        server.fetch_delays.push_back(delay);
    }

    pub(crate) fn set_fetch_failing(&self, failing: bool) {
        self.fail_fetch.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn reject_mutations(&self, msg: &str) {
        let mut server = self.server.lock().expect("fake server");
        server.reject_with = Some(msg.to_string());
    }

    pub(crate) fn update_snapshot(&self, edit: impl FnOnce(&mut Snapshot)) {
        let mut server = self.server.lock().expect("fake server");
        edit(&mut server.snapshot);
    }

    pub(crate) fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn mutations(&self) -> usize {
        self.mutation_calls.load(Ordering::SeqCst)
    }

    fn ack(&self) -> AckResponse {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
        let server = self.server.lock().expect("fake server");
        match &server.reject_with {
            Some(msg) => AckResponse::rejected(msg.clone()),
            None => AckResponse::accepted(),
        }
    }
}

#[async_trait]
impl DispatchApi for FakeApi {
    async fn fetch_state(&self) -> Result<Snapshot, ClientError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetch_times
            .lock()
            .expect("fetch times")
            .push(Instant::now());
        let (snapshot, delay) = {
            let mut server = self.server.lock().expect("fake server");
            (server.snapshot.clone(), server.fetch_delays.pop_front())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("connection refused".into()));
        }
        Ok(snapshot)
    }

    async fn add_driver(&self, request: &AddDriverRequest) -> Result<AckResponse, ClientError> {
        let ack = self.ack();
        if ack.ok {
            self.update_snapshot(|snapshot| {
                snapshot.drivers.insert(
                    request.driver_id.clone(),
                    Driver::idle_at(request.location.clone()),
                );
            });
        }
        Ok(ack)
    }

    async fn request_ride(
        &self,
        request: &RequestRideRequest,
    ) -> Result<AckResponse, ClientError> {
        let ack = self.ack();
        if ack.ok {
            self.update_snapshot(|snapshot| {
                snapshot.pending_requests.push(PendingRequest {
                    passenger_id: request.passenger_id.clone(),
                    source: request.source.clone(),
                    destination: request.destination.clone(),
                });
            });
        }
        Ok(ack)
    }

    async fn assign_next(&self) -> Result<AssignResponse, ClientError> {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
        let mut server = self.server.lock().expect("fake server");
        let Some(ride) = server.assignments.pop_front() else {
            return Ok(AssignResponse {
                ok: false,
                msg: Some("No requests".into()),
                ride: None,
            });
        };

        let destination = ride.path.last().cloned().unwrap_or_else(|| node("A"));
        if let Some(driver) = server.snapshot.drivers.get_mut(&ride.driver_id) {
            driver.status = DriverStatus::OnTrip;
        }
        let source = ride.path.first().cloned().unwrap_or_else(|| node("A"));
        server.snapshot.ride_history.push(Ride {
            ride_id: ride.ride_id,
            passenger_id: "p1".into(),
            driver_id: Some(ride.driver_id.clone()),
            source,
            destination: destination.clone(),
            fare: ride.fare,
            status: "ongoing".into(),
            path: ride.path.clone(),
            distance: None,
        });
        drop(server);

        // The server finishes the trip on its own clock, one step per node.
        let finisher = Arc::clone(&self.server);
        let travel = SERVER_TRIP_STEP * ride.path.len() as u32;
        let (ride_id, driver_id, fare) = (ride.ride_id, ride.driver_id.clone(), ride.fare);
        tokio::spawn(async move {
            tokio::time::sleep(travel).await;
            let mut server = finisher.lock().expect("fake server");
            if let Some(driver) = server.snapshot.drivers.get_mut(&driver_id) {
                driver.location = destination;
                driver.status = DriverStatus::Idle;
                driver.earnings += fare;
            }
            if let Some(ride) = server
                .snapshot
                .ride_history
                .iter_mut()
                .find(|ride| ride.ride_id == ride_id)
            {
                ride.status = "completed".into();
            }
        });

        Ok(AssignResponse {
            ok: true,
            msg: None,
            ride: Some(ride),
        })
    }

    async fn rate_ride(&self, _request: &RateRideRequest) -> Result<AckResponse, ClientError> {
        Ok(self.ack())
    }
}
