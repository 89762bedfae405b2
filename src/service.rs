/// Facade composing the sync core
///
/// `IdentitySync` is the single entry point the embedding application
/// uses: it wires the security guard, cipher, content store, document
/// store, resolver, and sync engine from one configuration value.
use crate::config::SyncConfig;
use crate::content::{ContentStore, ContentStoreConfig, Gateway, HttpGatewayTransport};
use crate::crypto::CipherBox;
use crate::db::{self, DatabaseOptions};
use crate::documents::DocumentStore;
use crate::error::{SyncError, SyncResult};
use crate::resolver::{default_strategies, DidResolver, ResolutionResult};
use crate::security::{AuditLogEntry, SecurityGuard};
use crate::sync::{DeviceNotifier, IdentityRecord, LocalRecordStore, SyncEngine, SyncReceipt};
use rand::{rngs::OsRng, RngCore};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// KDF iterations for the internal document-store key. The key is
/// 32 random bytes, not a human password, so the slow-KDF requirement
/// that protects user passwords does not apply.
const INTERNAL_KDF_ITERATIONS: u32 = 10_000;

/// Name of the device key file inside the data directory
const DEVICE_KEY_FILE: &str = "device.key";

/// Top-level identity sync service
pub struct IdentitySync {
    guard: Arc<SecurityGuard>,
    cipher: Arc<CipherBox>,
    resolver: Arc<DidResolver>,
    engine: SyncEngine,
}

impl IdentitySync {
    /// Build the full service from configuration
    pub async fn new(config: SyncConfig) -> SyncResult<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.storage.data_directory).await?;

        let pool = db::create_pool(&config.storage.records_db, DatabaseOptions::default()).await?;
        db::ensure_schema(&pool).await?;
        db::test_connection(&pool).await?;

        let guard = Arc::new(SecurityGuard::new(config.rate_limit.clone()));

        // The user-password box starts unkeyed; publishing before
        // set_password reports NotInitialized
        let cipher = Arc::new(CipherBox::new(config.encryption.kdf_iterations));

        // Document store encryption uses process-local key material,
        // never the user's password
        let device_key = load_or_create_device_key(&config.storage.data_directory).await?;
        let documents = Arc::new(DocumentStore::new(
            pool.clone(),
            CipherBox::with_password(INTERNAL_KDF_ITERATIONS, &device_key),
        ));

        let transport = Arc::new(HttpGatewayTransport::new(
            config.gateways.upload_timeout,
            config.gateways.download_timeout,
        )?);
        let content = Arc::new(ContentStore::new(
            ContentStoreConfig {
                upload_gateways: to_gateways(&config.gateways.upload),
                download_gateways: to_gateways(&config.gateways.download),
            },
            transport,
        ));

        let strategies = default_strategies(
            Arc::clone(&documents),
            Arc::clone(&content),
            config.resolver.web_timeout,
        )?;
        let resolver = Arc::new(DidResolver::new(
            config.resolver.clone(),
            strategies,
            Arc::clone(&guard),
        ));

        let engine = SyncEngine::new(
            Arc::clone(&cipher),
            content,
            documents,
            LocalRecordStore::new(pool),
            Arc::clone(&resolver),
            Arc::clone(&guard),
            config.device.device_id.clone(),
        );

        info!(
            upload_gateways = config.gateways.upload.len(),
            download_gateways = config.gateways.download.len(),
            "identity sync service ready"
        );

        Ok(Self {
            guard,
            cipher,
            resolver,
            engine,
        })
    }

    /// Attach a device notifier for publish fan-out
    pub fn with_notifier(mut self, notifier: Arc<dyn DeviceNotifier>) -> Self {
        self.engine = self.engine.with_notifier(notifier);
        self
    }

    /// Establish the user's password for payload encryption
    pub fn set_password(&self, password: &str) {
        self.cipher.set_password(password);
    }

    /// Publish the identity record; always returns a receipt
    pub async fn publish(&self, identity: &IdentityRecord) -> SyncReceipt {
        self.engine.publish_identity(identity).await
    }

    /// Fetch an identity record by DID
    pub async fn fetch(&self, did: &str) -> SyncResult<Option<IdentityRecord>> {
        self.engine.fetch_identity(did).await
    }

    /// Resolve a DID to its document
    pub async fn resolve(&self, did: &str) -> SyncResult<ResolutionResult> {
        self.resolver.resolve(did).await
    }

    /// Snapshot of the audit log
    pub fn audit_log(&self) -> Vec<AuditLogEntry> {
        self.guard.audit_log()
    }
}

fn to_gateways(entries: &[crate::config::GatewayEntry]) -> Vec<Gateway> {
    entries
        .iter()
        .map(|e| Gateway::new(e.name.clone(), e.url.clone()))
        .collect()
}

/// Load the device key, creating it on first run
async fn load_or_create_device_key(data_directory: &Path) -> SyncResult<String> {
    let path = data_directory.join(DEVICE_KEY_FILE);

    match tokio::fs::read_to_string(&path).await {
        Ok(key) => {
            let key = key.trim().to_string();
            if key.len() != 64 || hex::decode(&key).is_err() {
                return Err(SyncError::Internal(format!(
                    "Corrupt device key file at {:?}",
                    path
                )));
            }
            Ok(key)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let mut material = [0u8; 32];
            OsRng.fill_bytes(&mut material);
            let key = hex::encode(material);
            tokio::fs::write(&path, &key).await?;
            info!(path = ?path, "created device key");
            Ok(key)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_device_key_is_stable_across_loads() {
        let dir = tempfile::tempdir().unwrap();

        let first = load_or_create_device_key(dir.path()).await.unwrap();
        let second = load_or_create_device_key(dir.path()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[tokio::test]
    async fn test_corrupt_device_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join(DEVICE_KEY_FILE), "not-hex")
            .await
            .unwrap();

        assert!(load_or_create_device_key(dir.path()).await.is_err());
    }
}
