/// Fan-out upload and sequential download over storage gateways
use crate::content::{Gateway, GatewayTransport};
use crate::error::{SyncError, SyncResult};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Payloads shorter than this are treated as implausible gateway
/// responses (error pages, empty bodies) and skipped
const MIN_PLAUSIBLE_LEN: usize = 10;

/// Content store configuration
#[derive(Debug, Clone)]
pub struct ContentStoreConfig {
    /// Gateways raced on upload
    pub upload_gateways: Vec<Gateway>,
    /// Gateways tried in priority order on download
    pub download_gateways: Vec<Gateway>,
}

/// Redundant gateway access to the content-addressed network
///
/// Upload favors latency: redundancy is cheap at write time, so every
/// gateway receives the payload and the first valid content address
/// wins. Download favors a single authoritative source and only pays
/// for additional gateways after a failure.
pub struct ContentStore {
    config: ContentStoreConfig,
    transport: Arc<dyn GatewayTransport>,
}

impl ContentStore {
    pub fn new(config: ContentStoreConfig, transport: Arc<dyn GatewayTransport>) -> Self {
        Self { config, transport }
    }

    /// Upload a payload to every configured gateway concurrently and
    /// return the first content address that comes back.
    ///
    /// Losing requests are abandoned, not cancelled; their results go
    /// to a channel nobody reads anymore. Fails only when every gateway
    /// fails, with all failure reasons aggregated.
    pub async fn upload(&self, data: &[u8]) -> SyncResult<String> {
        let gateways = &self.config.upload_gateways;
        if gateways.is_empty() {
            return Err(SyncError::gateway("no upload gateways configured"));
        }

        let (tx, mut rx) = mpsc::channel(gateways.len());

        for gateway in gateways.iter().cloned() {
            let transport = Arc::clone(&self.transport);
            let tx = tx.clone();
            let payload = data.to_vec();

            tokio::spawn(async move {
                let result = transport.add(&gateway, &payload).await;
                // Fails once a winner was chosen and the receiver dropped
                let _ = tx.send((gateway.name, result)).await;
            });
        }
        drop(tx);

        let mut failures = Vec::new();
        while let Some((name, result)) = rx.recv().await {
            match result {
                Ok(address) if !address.is_empty() => {
                    debug!(gateway = %name, address = %address, "upload won the race");
                    return Ok(address);
                }
                Ok(_) => failures.push(format!("{}: empty content address", name)),
                Err(e) => failures.push(format!("{}: {}", name, e)),
            }
        }

        warn!(failures = failures.len(), "all upload gateways failed");
        Err(SyncError::Gateway { failures })
    }

    /// Download a payload by content address, trying gateways strictly
    /// sequentially in priority order.
    ///
    /// A gateway is skipped on any error or on an implausibly short
    /// response; the next gateway is only contacted after the previous
    /// one definitively failed.
    pub async fn download(&self, address: &str) -> SyncResult<Vec<u8>> {
        let gateways = &self.config.download_gateways;
        if gateways.is_empty() {
            return Err(SyncError::gateway("no download gateways configured"));
        }

        let mut failures = Vec::new();
        for gateway in gateways {
            match self.transport.fetch(gateway, address).await {
                Ok(data) if data.len() >= MIN_PLAUSIBLE_LEN => {
                    debug!(gateway = %gateway.name, bytes = data.len(), "download succeeded");
                    return Ok(data);
                }
                Ok(data) => {
                    failures.push(format!(
                        "{}: implausibly short response ({} bytes)",
                        gateway.name,
                        data.len()
                    ));
                }
                Err(e) => failures.push(format!("{}: {}", gateway.name, e)),
            }
        }

        warn!(address = %address, "all download gateways exhausted");
        Err(SyncError::Gateway { failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted per-gateway behavior with call counting
    struct FakeTransport {
        /// gateway name -> outcome; missing names error
        add_outcomes: HashMap<String, Result<String, String>>,
        fetch_outcomes: HashMap<String, Result<Vec<u8>, String>>,
        /// gateway name -> artificial latency before responding
        delays: HashMap<String, Duration>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        fn new() -> Self {
            Self {
                add_outcomes: HashMap::new(),
                fetch_outcomes: HashMap::new(),
                delays: HashMap::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, name: &str) {
            self.calls.lock().unwrap().push(name.to_string());
        }
    }

    #[async_trait]
    impl GatewayTransport for FakeTransport {
        async fn add(&self, gateway: &Gateway, _data: &[u8]) -> SyncResult<String> {
            self.record(&gateway.name);
            if let Some(delay) = self.delays.get(&gateway.name) {
                tokio::time::sleep(*delay).await;
            }
            match self.add_outcomes.get(&gateway.name) {
                Some(Ok(address)) => Ok(address.clone()),
                Some(Err(e)) => Err(SyncError::gateway(e.clone())),
                None => Err(SyncError::gateway("unscripted gateway")),
            }
        }

        async fn fetch(&self, gateway: &Gateway, _address: &str) -> SyncResult<Vec<u8>> {
            self.record(&gateway.name);
            match self.fetch_outcomes.get(&gateway.name) {
                Some(Ok(data)) => Ok(data.clone()),
                Some(Err(e)) => Err(SyncError::gateway(e.clone())),
                None => Err(SyncError::gateway("unscripted gateway")),
            }
        }
    }

    fn gateways(names: &[&str]) -> Vec<Gateway> {
        names
            .iter()
            .map(|n| Gateway::new(*n, format!("https://{}.example", n)))
            .collect()
    }

    fn store_with(transport: FakeTransport, up: &[&str], down: &[&str]) -> (ContentStore, Arc<FakeTransport>) {
        let transport = Arc::new(transport);
        let store = ContentStore::new(
            ContentStoreConfig {
                upload_gateways: gateways(up),
                download_gateways: gateways(down),
            },
            Arc::clone(&transport) as Arc<dyn GatewayTransport>,
        );
        (store, transport)
    }

    #[tokio::test]
    async fn test_upload_succeeds_when_two_of_three_fail() {
        let mut transport = FakeTransport::new();
        transport
            .add_outcomes
            .insert("g1".to_string(), Err("connection refused".to_string()));
        transport
            .add_outcomes
            .insert("g2".to_string(), Err("timeout".to_string()));
        transport
            .add_outcomes
            .insert("g3".to_string(), Ok("QmWinner".to_string()));

        let (store, _) = store_with(transport, &["g1", "g2", "g3"], &[]);

        let address = store.upload(b"payload bytes").await.unwrap();
        assert_eq!(address, "QmWinner");
    }

    #[tokio::test]
    async fn test_upload_aggregates_all_failures() {
        let mut transport = FakeTransport::new();
        transport
            .add_outcomes
            .insert("g1".to_string(), Err("refused".to_string()));
        transport
            .add_outcomes
            .insert("g2".to_string(), Err("500".to_string()));

        let (store, _) = store_with(transport, &["g1", "g2"], &[]);

        match store.upload(b"payload bytes").await {
            Err(SyncError::Gateway { failures }) => {
                assert_eq!(failures.len(), 2);
                assert!(failures.iter().any(|f| f.contains("refused")));
                assert!(failures.iter().any(|f| f.contains("500")));
            }
            other => panic!("expected aggregated gateway error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_upload_first_success_wins_without_waiting_for_losers() {
        let mut transport = FakeTransport::new();
        transport
            .add_outcomes
            .insert("fast".to_string(), Ok("QmFast".to_string()));
        transport
            .add_outcomes
            .insert("slow".to_string(), Ok("QmSlow".to_string()));
        transport
            .delays
            .insert("slow".to_string(), Duration::from_secs(5));

        let (store, _) = store_with(transport, &["slow", "fast"], &[]);

        let started = std::time::Instant::now();
        let address = store.upload(b"payload bytes").await.unwrap();
        assert_eq!(address, "QmFast");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_download_short_circuits_on_first_success() {
        let mut transport = FakeTransport::new();
        transport
            .fetch_outcomes
            .insert("g1".to_string(), Ok(b"plausible payload".to_vec()));
        transport
            .fetch_outcomes
            .insert("g2".to_string(), Ok(b"never fetched!!".to_vec()));

        let (store, transport) = store_with(transport, &[], &["g1", "g2", "g3"]);

        let data = store.download("QmAddr").await.unwrap();
        assert_eq!(data, b"plausible payload");
        assert_eq!(transport.calls(), vec!["g1"]);
    }

    #[tokio::test]
    async fn test_download_skips_failed_and_short_responses() {
        let mut transport = FakeTransport::new();
        transport
            .fetch_outcomes
            .insert("g1".to_string(), Err("404".to_string()));
        // Shorter than the plausibility floor
        transport
            .fetch_outcomes
            .insert("g2".to_string(), Ok(b"tiny".to_vec()));
        transport
            .fetch_outcomes
            .insert("g3".to_string(), Ok(b"the real payload".to_vec()));

        let (store, transport) = store_with(transport, &[], &["g1", "g2", "g3"]);

        let data = store.download("QmAddr").await.unwrap();
        assert_eq!(data, b"the real payload");
        assert_eq!(transport.calls(), vec!["g1", "g2", "g3"]);
    }

    #[tokio::test]
    async fn test_download_exhaustion_aggregates_failures() {
        let mut transport = FakeTransport::new();
        transport
            .fetch_outcomes
            .insert("g1".to_string(), Err("404".to_string()));
        transport
            .fetch_outcomes
            .insert("g2".to_string(), Ok(b"x".to_vec()));

        let (store, _) = store_with(transport, &[], &["g1", "g2"]);

        match store.download("QmAddr").await {
            Err(SyncError::Gateway { failures }) => {
                assert_eq!(failures.len(), 2);
                assert!(failures.iter().any(|f| f.contains("implausibly short")));
            }
            other => panic!("expected gateway error, got {:?}", other.map(|_| ())),
        }
    }
}
