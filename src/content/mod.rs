/// Content-addressed storage access
///
/// Uploads fan out to every configured gateway and race for the first
/// valid content address; downloads walk the gateway list sequentially
/// in priority order. The actual wire protocol lives behind
/// `GatewayTransport` so tests can substitute deterministic fakes.

pub mod http;
pub mod store;

pub use http::HttpGatewayTransport;
pub use store::{ContentStore, ContentStoreConfig};

use crate::error::SyncResult;
use async_trait::async_trait;

/// A configured storage gateway
#[derive(Debug, Clone)]
pub struct Gateway {
    pub name: String,
    pub url: String,
}

impl Gateway {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Transport for talking to a single gateway
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    /// Add a payload to the network through this gateway, returning the
    /// content address
    async fn add(&self, gateway: &Gateway, data: &[u8]) -> SyncResult<String>;

    /// Fetch a payload by content address through this gateway
    async fn fetch(&self, gateway: &Gateway, address: &str) -> SyncResult<Vec<u8>>;
}
