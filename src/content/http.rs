/// HTTP gateway transport
///
/// Speaks the common gateway API: `POST <gateway>/api/v0/add` with a
/// JSON `{path, content}` body (content base64-encoded) answering with a
/// JSON object carrying `Hash` or `IpfsHash`, and `GET
/// <gateway>/ipfs/<address>` for the raw payload.
use crate::content::{Gateway, GatewayTransport};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use std::time::Duration;

/// Response shape returned by gateway add endpoints
#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: Option<String>,
    #[serde(rename = "IpfsHash")]
    ipfs_hash: Option<String>,
}

/// Production transport backed by reqwest
pub struct HttpGatewayTransport {
    upload_client: reqwest::Client,
    download_client: reqwest::Client,
}

impl HttpGatewayTransport {
    /// Build a transport with bounded per-request timeouts so one
    /// unresponsive gateway cannot stall a publish or fetch
    pub fn new(upload_timeout: u64, download_timeout: u64) -> SyncResult<Self> {
        let upload_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(upload_timeout))
            .build()
            .map_err(|e| SyncError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        let download_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(download_timeout))
            .build()
            .map_err(|e| SyncError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            upload_client,
            download_client,
        })
    }
}

#[async_trait]
impl GatewayTransport for HttpGatewayTransport {
    async fn add(&self, gateway: &Gateway, data: &[u8]) -> SyncResult<String> {
        let url = format!("{}/api/v0/add", gateway.url.trim_end_matches('/'));

        let response = self
            .upload_client
            .post(&url)
            .json(&serde_json::json!({
                "path": "identity-sync",
                "content": BASE64.encode(data),
            }))
            .send()
            .await
            .map_err(|e| SyncError::gateway(format!("{}: request failed: {}", gateway.name, e)))?;

        if !response.status().is_success() {
            return Err(SyncError::gateway(format!(
                "{}: add returned status {}",
                gateway.name,
                response.status()
            )));
        }

        let body: AddResponse = response
            .json()
            .await
            .map_err(|e| SyncError::gateway(format!("{}: invalid add response: {}", gateway.name, e)))?;

        body.hash
            .or(body.ipfs_hash)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                SyncError::gateway(format!("{}: add response carried no content address", gateway.name))
            })
    }

    async fn fetch(&self, gateway: &Gateway, address: &str) -> SyncResult<Vec<u8>> {
        let url = format!("{}/ipfs/{}", gateway.url.trim_end_matches('/'), address);

        let response = self
            .download_client
            .get(&url)
            .send()
            .await
            .map_err(|e| SyncError::gateway(format!("{}: request failed: {}", gateway.name, e)))?;

        if !response.status().is_success() {
            return Err(SyncError::gateway(format!(
                "{}: fetch returned status {}",
                gateway.name,
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SyncError::gateway(format!("{}: body read failed: {}", gateway.name, e)))?;

        Ok(bytes.to_vec())
    }
}
