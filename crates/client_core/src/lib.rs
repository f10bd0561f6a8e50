use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    domain::{DriverId, NodeId, PassengerId, RideId},
    error::ValidationError,
    protocol::{AddDriverRequest, Assignment, RateRideRequest, RequestRideRequest},
};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{info, warn};

pub mod animation;
pub mod api;
pub mod config;
pub mod error;
pub mod event_log;
pub mod fetcher;
pub mod panels;
pub mod poll;
pub mod render;
pub mod store;

use animation::{AnimationController, AnimationHooks, AnimationRun, RunId, RunStatus};
use api::{DispatchApi, HttpDispatchApi};
use config::ClientSettings;
use error::ClientError;
use event_log::{EventLog, LogEntry};
use fetcher::{FetchOutcome, Fetcher};
use panels::Panels;
use poll::{PollLoop, PollSummary, PollTarget};
use render::{render_scene, Scene};
use store::StateStore;

/// Output of one render pass: the drawn scene plus the list displays.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub scene: Scene,
    pub panels: Panels,
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    FrameReady(Arc<Frame>),
    Logged(LogEntry),
    AnimationStep {
        run_id: RunId,
        driver_id: DriverId,
        node_id: NodeId,
        step: usize,
    },
    AnimationFinished {
        run_id: RunId,
        driver_id: DriverId,
        status: RunStatus,
    },
    Error(String),
}

/// Background tasks started by an accepted assignment.
pub struct TripHandles {
    pub run_id: RunId,
    pub animation: JoinHandle<RunStatus>,
    pub poll: JoinHandle<PollSummary>,
}

impl TripHandles {
    pub async fn join(self) -> (Option<RunStatus>, Option<PollSummary>) {
        let status = self.animation.await.ok();
        let summary = self.poll.await.ok();
        (status, summary)
    }
}

pub struct DispatchClient {
    settings: ClientSettings,
    api: Arc<dyn DispatchApi>,
    store: Arc<StateStore>,
    fetcher: Fetcher,
    animations: AnimationController,
    log: EventLog,
    events: broadcast::Sender<ClientEvent>,
}

impl DispatchClient {
    pub fn connect(settings: ClientSettings) -> Result<Arc<Self>, ClientError> {
        let api = HttpDispatchApi::new(&settings.server_url, settings.request_timeout())?;
        Ok(Self::with_api(settings, Arc::new(api)))
    }

    pub fn with_api(settings: ClientSettings, api: Arc<dyn DispatchApi>) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        let store = Arc::new(StateStore::new());
        Arc::new(Self {
            fetcher: Fetcher::new(Arc::clone(&api), Arc::clone(&store)),
            animations: AnimationController::new(Arc::clone(&store), settings.step_delay()),
            log: EventLog::with_capacity(settings.event_log_capacity),
            settings,
            api,
            store,
            events,
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    pub fn animations(&self) -> &AnimationController {
        &self.animations
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Renders the merged view and rebuilds the list displays.
    pub async fn redraw(&self) -> Arc<Frame> {
        let view = self.store.current_view().await;
        let frame = Arc::new(Frame {
            scene: render_scene(&view),
            panels: Panels::from_view(&view),
        });
        let _ = self.events.send(ClientEvent::FrameReady(Arc::clone(&frame)));
        frame
    }

    pub async fn refresh(&self) -> Result<FetchOutcome, ClientError> {
        match self.fetcher.fetch().await {
            Ok(FetchOutcome::Applied) => {
                self.redraw().await;
                self.note("Refreshed state").await;
                Ok(FetchOutcome::Applied)
            }
            Ok(FetchOutcome::Stale) => Ok(FetchOutcome::Stale),
            Err(err) => {
                self.report(format!("Refresh failed: {err}")).await;
                Err(err)
            }
        }
    }

    pub async fn add_driver(&self, driver_id: &str, location: &str) -> Result<(), ClientError> {
        let request = AddDriverRequest {
            driver_id: DriverId::new(driver_id.trim()),
            location: NodeId::new(location.trim()),
        };
        self.reject_blank(&request.driver_id.0, "driver_id").await?;
        self.reject_blank(&request.location.0, "location").await?;

        let ack = self
            .surface(self.api.add_driver(&request).await, "Add driver failed")
            .await?;
        if !ack.ok {
            return Err(self.rejected(ack.msg, "Failed").await);
        }

        self.note(format!(
            "Driver {} added at {}",
            request.driver_id, request.location
        ))
        .await;
        let _ = self.refresh().await;
        Ok(())
    }

    pub async fn request_ride(
        &self,
        passenger_id: &str,
        source: &str,
        destination: &str,
    ) -> Result<(), ClientError> {
        let request = RequestRideRequest {
            passenger_id: PassengerId::new(passenger_id.trim()),
            source: NodeId::new(source.trim()),
            destination: NodeId::new(destination.trim()),
        };
        self.reject_blank(&request.passenger_id.0, "passenger_id")
            .await?;
        self.reject_blank(&request.source.0, "source").await?;
        self.reject_blank(&request.destination.0, "destination")
            .await?;

        let ack = self
            .surface(self.api.request_ride(&request).await, "Ride request failed")
            .await?;
        if !ack.ok {
            return Err(self.rejected(ack.msg, "Failed").await);
        }

        self.note(format!(
            "Request {}: {}→{}",
            request.passenger_id, request.source, request.destination
        ))
        .await;
        let _ = self.refresh().await;
        Ok(())
    }

    pub async fn rate_ride(&self, ride_id: RideId, rating: f64) -> Result<(), ClientError> {
        if !(1.0..=5.0).contains(&rating) {
            let err = ClientError::from(ValidationError::InvalidRating(rating));
            self.report(err.to_string()).await;
            return Err(err);
        }

        let request = RateRideRequest { ride_id, rating };
        let ack = self
            .surface(self.api.rate_ride(&request).await, "Rating failed")
            .await?;
        if !ack.ok {
            return Err(self.rejected(ack.msg, "Failed").await);
        }

        self.note(format!("Rated ride {ride_id}: {rating}")).await;
        let _ = self.refresh().await;
        Ok(())
    }

    /// Asks the server for the next assignment and, on success, starts the
    /// trip's animation run and its poll loop side by side.
    pub async fn assign_next(self: &Arc<Self>) -> Result<TripHandles, ClientError> {
        let response = self
            .surface(self.api.assign_next().await, "Assignment failed")
            .await?;
        if !response.ok {
            return Err(self.rejected(response.msg, "No assignment").await);
        }
        let Some(ride) = response.ride else {
            let err = ClientError::Decode("assignment accepted without a ride".into());
            self.report(err.to_string()).await;
            return Err(err);
        };

        self.note(format!(
            "Assigned Ride {} driver {} fare ₹{:.2}",
            ride.ride_id, ride.driver_id, ride.fare
        ))
        .await;
        self.start_trip(ride).await
    }

    pub async fn start_trip(self: &Arc<Self>, ride: Assignment) -> Result<TripHandles, ClientError> {
        let run = match self
            .animations
            .start(ride.driver_id.clone(), ride.path.clone())
            .await
        {
            Err(ClientError::UnknownDriver(driver_id)) => {
                // Assigned driver is newer than our base snapshot.
                info!(driver = %driver_id, "trip: driver not in view yet, refreshing first");
                let _ = self.refresh().await;
                self.animations.start(ride.driver_id, ride.path).await
            }
            other => other,
        };
        let run = match run {
            Ok(run) => run,
            Err(err) => {
                self.report(format!("Cannot animate trip: {err}")).await;
                return Err(err);
            }
        };

        let run_id = run.run_id();
        let mut poll = PollLoop::new(
            self.settings.poll_interval(),
            self.settings.poll_iterations(run.path().len()),
        );
        if self.settings.poll_follows_animation {
            poll = poll.until_finished(run.watch());
        }
        info!(run = %run_id, budget = poll.budget(), "trip: animation and polling started");

        let client = Arc::clone(self);
        let animation = tokio::spawn(async move { client.animations.drive(run, &*client).await });
        let client = Arc::clone(self);
        let poll = tokio::spawn(async move { poll.run(&*client).await });

        Ok(TripHandles {
            run_id,
            animation,
            poll,
        })
    }

    async fn note(&self, message: impl Into<String>) {
        let entry = self.log.info(message).await;
        let _ = self.events.send(ClientEvent::Logged(entry));
    }

    async fn report(&self, message: impl Into<String>) {
        let entry = self.log.error(message).await;
        let _ = self.events.send(ClientEvent::Error(entry.message.clone()));
        let _ = self.events.send(ClientEvent::Logged(entry));
    }

    async fn reject_blank(&self, value: &str, field: &'static str) -> Result<(), ClientError> {
        if !value.is_empty() {
            return Ok(());
        }
        let err = ClientError::from(ValidationError::EmptyId(field));
        self.report(err.to_string()).await;
        Err(err)
    }

    async fn rejected(&self, msg: Option<String>, fallback: &str) -> ClientError {
        let err = ClientError::rejection(msg, fallback);
        self.report(err.to_string()).await;
        err
    }

    async fn surface<T>(
        &self,
        result: Result<T, ClientError>,
        context: &str,
    ) -> Result<T, ClientError> {
        if let Err(err) = &result {
            warn!(error = %err, "{context}");
            self.report(format!("{context}: {err}")).await;
        }
        result
    }
}

#[async_trait]
impl AnimationHooks for DispatchClient {
    async fn step_applied(&self, run: &AnimationRun, node_id: &NodeId) {
        self.redraw().await;
        let _ = self.events.send(ClientEvent::AnimationStep {
            run_id: run.run_id(),
            driver_id: run.driver_id().clone(),
            node_id: node_id.clone(),
            step: run.current_step_index(),
        });
    }

    async fn run_finished(&self, run: &AnimationRun, failure: Option<&ClientError>) {
        let status = run.status();
        let _ = self.events.send(ClientEvent::AnimationFinished {
            run_id: run.run_id(),
            driver_id: run.driver_id().clone(),
            status,
        });

        match (status, failure) {
            (RunStatus::Done, _) => {
                self.note(format!(
                    "Driver {} finished path {}",
                    run.driver_id(),
                    run.path_label()
                ))
                .await;
                let _ = self.refresh().await;
            }
            (_, Some(err)) => {
                self.report(format!(
                    "Animation for driver {} stopped: {err}",
                    run.driver_id()
                ))
                .await;
                self.redraw().await;
            }
            _ => {
                self.note(format!(
                    "Animation for driver {} superseded after {} of {} steps",
                    run.driver_id(),
                    run.current_step_index(),
                    run.path().len()
                ))
                .await;
            }
        }
    }
}

#[async_trait]
impl PollTarget for DispatchClient {
    async fn poll_once(&self) {
        let _ = self.refresh().await;
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
