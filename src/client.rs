//! HTTP client for the ECS admin API

use crate::common::{encode_key, Error, Result};
use crate::coordinator::http::{AddNodesRequest, AwaitRequest, AwaitResponse, RemoveNodesRequest};
use crate::coordinator::inventory::ServerEntry;
use crate::coordinator::metadata::{NodeRecord, RingSnapshot};
use crate::coordinator::node::EvictionPolicy;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    message: String,
}

#[derive(Debug, Clone)]
pub struct AdminClient {
    client: reqwest::Client,
    base_url: String,
}

impl AdminClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Http(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        match response.json::<ErrorBody>().await {
            Ok(body) => Err(Error::Http(format!(
                "{} {}: {}",
                status, body.error, body.message
            ))),
            Err(_) => Err(Error::Http(format!("{}: request failed", status))),
        }
    }

    async fn json<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))
    }

    async fn empty(request: reqwest::RequestBuilder) -> Result<()> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        Self::check(response).await.map(|_| ())
    }

    pub async fn add_nodes(
        &self,
        count: usize,
        cache_capacity: usize,
        eviction_policy: EvictionPolicy,
    ) -> Result<Vec<NodeRecord>> {
        let body = AddNodesRequest {
            count,
            cache_capacity,
            eviction_policy,
        };
        Self::json(self.client.post(self.url("/admin/nodes")).json(&body)).await
    }

    pub async fn remove_nodes(&self, names: Vec<String>) -> Result<()> {
        let body = RemoveNodesRequest { names };
        Self::empty(self.client.delete(self.url("/admin/nodes")).json(&body)).await
    }

    pub async fn list_nodes(&self) -> Result<Vec<NodeRecord>> {
        Self::json(self.client.get(self.url("/admin/nodes"))).await
    }

    pub async fn start(&self) -> Result<Vec<NodeRecord>> {
        Self::json(self.client.post(self.url("/admin/start"))).await
    }

    pub async fn stop(&self) -> Result<Vec<NodeRecord>> {
        Self::json(self.client.post(self.url("/admin/stop"))).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        Self::empty(self.client.post(self.url("/admin/shutdown"))).await
    }

    pub async fn await_nodes(&self, count: usize, timeout: Duration) -> Result<bool> {
        let body = AwaitRequest {
            count,
            timeout_ms: timeout.as_millis() as u64,
        };
        let response: AwaitResponse =
            Self::json(self.client.post(self.url("/admin/await")).json(&body)).await?;
        Ok(response.ready)
    }

    pub async fn available(&self) -> Result<Vec<ServerEntry>> {
        Self::json(self.client.get(self.url("/admin/available"))).await
    }

    pub async fn owner(&self, key: &str) -> Result<NodeRecord> {
        let path = format!("/admin/owner/{}", encode_key(key));
        Self::json(self.client.get(self.url(&path))).await
    }

    pub async fn ring(&self) -> Result<RingSnapshot> {
        Self::json(self.client.get(self.url("/admin/ring"))).await
    }
}
