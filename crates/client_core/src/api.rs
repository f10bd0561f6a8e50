//! Request/response boundary to the dispatch server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::protocol::{
    AckResponse, AddDriverRequest, AssignResponse, RateRideRequest, RequestRideRequest, Snapshot,
};
use tracing::debug;
use url::Url;

use crate::error::ClientError;

#[async_trait]
pub trait DispatchApi: Send + Sync {
    async fn fetch_state(&self) -> Result<Snapshot, ClientError>;
    async fn add_driver(&self, request: &AddDriverRequest) -> Result<AckResponse, ClientError>;
    async fn request_ride(&self, request: &RequestRideRequest)
        -> Result<AckResponse, ClientError>;
    async fn assign_next(&self) -> Result<AssignResponse, ClientError>;
    async fn rate_ride(&self, request: &RateRideRequest) -> Result<AckResponse, ClientError>;
}

pub struct HttpDispatchApi {
    http: Client,
    base_url: Url,
}

impl HttpDispatchApi {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(server_url).map_err(|err| {
            ClientError::Transport(format!("invalid server url '{server_url}': {err}"))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ClientError::Transport(format!(
                "server url must start with http:// or https://, got '{server_url}'"
            )));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, name: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(&format!("api/{name}"))
            .map_err(|err| ClientError::Transport(format!("invalid endpoint '{name}': {err}")))
    }

    async fn post<B, T>(&self, name: &str, body: &B) -> Result<T, ClientError>
    where
        B: serde::Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(name)?;
        let res = self.http.post(url).json(body).send().await?;
        decode_body(name, res).await
    }
}

/// Mutation endpoints answer 400 with a JSON `{ok: false}` body on rejection,
/// so the body decides the outcome whenever it parses.
async fn decode_body<T: DeserializeOwned>(name: &str, res: Response) -> Result<T, ClientError> {
    let status = res.status();
    let bytes = res.bytes().await?;
    match serde_json::from_slice::<T>(&bytes) {
        Ok(body) => {
            debug!(endpoint = name, %status, "api: response decoded");
            Ok(body)
        }
        Err(_) if !status.is_success() => Err(ClientError::Transport(format!(
            "{name} failed with status {status}"
        ))),
        Err(err) => Err(ClientError::Decode(format!("{name}: {err}"))),
    }
}

#[async_trait]
impl DispatchApi for HttpDispatchApi {
    async fn fetch_state(&self) -> Result<Snapshot, ClientError> {
        let url = self.endpoint("state")?;
        let res = self.http.get(url).send().await?;
        if !res.status().is_success() {
            return Err(ClientError::Transport(format!(
                "state failed with status {}",
                res.status()
            )));
        }
        decode_body("state", res).await
    }

    async fn add_driver(&self, request: &AddDriverRequest) -> Result<AckResponse, ClientError> {
        self.post("add_driver", request).await
    }

    async fn request_ride(
        &self,
        request: &RequestRideRequest,
    ) -> Result<AckResponse, ClientError> {
        self.post("request_ride", request).await
    }

    async fn assign_next(&self) -> Result<AssignResponse, ClientError> {
        self.post::<serde_json::Value, _>("assign_next", &serde_json::json!({}))
            .await
    }

    async fn rate_ride(&self, request: &RateRideRequest) -> Result<AckResponse, ClientError> {
        self.post("rate_ride", request).await
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
