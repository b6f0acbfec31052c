use crate::types::{BridgeDto, ProcessorDto};
use crate::{error::BridgeError, Result};
use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Method, Request, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

pub const SHARD_API_BASE_PATH: &str = "/api/v1/shard/";
pub const SHARD_API_PROCESSORS_PATH: &str = "/api/v1/shard/processors";

/// Shard view of the manager API
#[async_trait]
pub trait ManagerClient: Send + Sync {
    /// Bridges in REQUESTED or DELETION_REQUESTED
    async fn fetch_bridges_to_deploy_or_delete(&self) -> Result<Vec<BridgeDto>>;

    /// Processors in REQUESTED or DELETION_REQUESTED
    async fn fetch_processors_to_deploy_or_delete(&self) -> Result<Vec<ProcessorDto>>;

    async fn update_bridge(&self, bridge: &BridgeDto) -> Result<()>;

    async fn update_processor(&self, processor: &ProcessorDto) -> Result<()>;
}

/// hyper client for the manager's shard API
pub struct HttpManagerClient {
    client: Client<HttpConnector>,
    base_url: String,
    timeout: Duration,
}

impl HttpManagerClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .build_http();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        let response = self.make_request::<()>(Method::GET, path, None).await?;
        let body_bytes = hyper::body::to_bytes(response.into_body()).await?;
        Ok(serde_json::from_slice(&body_bytes)?)
    }

    async fn put<T: Serialize>(&self, path: &str, body: &T) -> Result<()> {
        self.make_request(Method::PUT, path, Some(body)).await?;
        Ok(())
    }

    async fn make_request<T: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&T>,
    ) -> Result<Response<Body>> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to: {}", method, url);

        let request = Request::builder()
            .method(method)
            .uri(&url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json");

        let request_body = match body {
            Some(body) => Body::from(serde_json::to_string(body)?),
            None => Body::empty(),
        };
        let request = request.body(request_body)?;

        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| BridgeError::Timeout(format!("Manager request to {} timed out", url)))??;

        let status = response.status();
        debug!("Response status: {}", status);
        if !status.is_success() {
            let body_bytes = hyper::body::to_bytes(response.into_body()).await?;
            return Err(BridgeError::ManagerApi {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&body_bytes).to_string(),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ManagerClient for HttpManagerClient {
    async fn fetch_bridges_to_deploy_or_delete(&self) -> Result<Vec<BridgeDto>> {
        self.get(SHARD_API_BASE_PATH).await
    }

    async fn fetch_processors_to_deploy_or_delete(&self) -> Result<Vec<ProcessorDto>> {
        self.get(SHARD_API_PROCESSORS_PATH).await
    }

    async fn update_bridge(&self, bridge: &BridgeDto) -> Result<()> {
        self.put(SHARD_API_BASE_PATH, bridge).await
    }

    async fn update_processor(&self, processor: &ProcessorDto) -> Result<()> {
        self.put(SHARD_API_PROCESSORS_PATH, processor).await
    }
}
