use std::sync::Arc;

use tracing::{debug, warn};

use crate::{api::DispatchApi, error::ClientError, store::StateStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied,
    /// A newer response was installed while this one was in flight.
    Stale,
}

/// One authoritative round-trip: request a snapshot, validate it, merge it.
/// Any failure leaves the store exactly as it was.
pub struct Fetcher {
    api: Arc<dyn DispatchApi>,
    store: Arc<StateStore>,
}

impl Fetcher {
    pub fn new(api: Arc<dyn DispatchApi>, store: Arc<StateStore>) -> Self {
        Self { api, store }
    }

    pub async fn fetch(&self) -> Result<FetchOutcome, ClientError> {
        let seq = self.store.next_fetch_seq().await;
        let snapshot = self.api.fetch_state().await.map_err(|err| {
            warn!(seq, error = %err, "fetch: state request failed");
            err
        })?;
        if let Err(err) = snapshot.validate() {
            warn!(seq, error = %err, "fetch: snapshot violates node invariants");
            return Err(err.into());
        }

        if self.store.replace_fetched(seq, snapshot).await {
            debug!(seq, "fetch: snapshot installed");
            Ok(FetchOutcome::Applied)
        } else {
            Ok(FetchOutcome::Stale)
        }
    }
}
