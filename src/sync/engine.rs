/// Sync engine - publish and fetch of encrypted identity records
use crate::content::ContentStore;
use crate::crypto::{CipherBox, EncryptedBlob};
use crate::documents::{Did, DidDocument, DocumentStore, VerificationMethod};
use crate::error::{SyncError, SyncResult};
use crate::resolver::{DidResolver, KeySynthesisStrategy, ResolutionStrategy};
use crate::security::SecurityGuard;
use crate::sync::{IdentityRecord, LocalRecordStore, SyncReceipt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// URI scheme written into IdentitySync service endpoints
const CONTENT_SCHEME: &str = "ipfs://";

/// Best-effort notification of the owner's other devices
///
/// Implementations are invoked from a detached task; failures are
/// logged and never reach the publishing caller.
#[async_trait::async_trait]
pub trait DeviceNotifier: Send + Sync {
    async fn notify(&self, did: &str, content_address: &str) -> SyncResult<()>;
}

/// Orchestrates encryption, upload, document update, and local
/// persistence for identity records
pub struct SyncEngine {
    cipher: Arc<CipherBox>,
    content: Arc<ContentStore>,
    documents: Arc<DocumentStore>,
    records: LocalRecordStore,
    resolver: Arc<DidResolver>,
    guard: Arc<SecurityGuard>,
    device_id: String,
    notifier: Option<Arc<dyn DeviceNotifier>>,
}

impl SyncEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cipher: Arc<CipherBox>,
        content: Arc<ContentStore>,
        documents: Arc<DocumentStore>,
        records: LocalRecordStore,
        resolver: Arc<DidResolver>,
        guard: Arc<SecurityGuard>,
        device_id: String,
    ) -> Self {
        Self {
            cipher,
            content,
            documents,
            records,
            resolver,
            guard,
            device_id,
            notifier: None,
        }
    }

    /// Attach a device notifier for fire-and-forget fan-out
    pub fn with_notifier(mut self, notifier: Arc<dyn DeviceNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Encrypt and publish an identity record.
    ///
    /// Always returns a receipt; every failure path is converted into a
    /// failed receipt with a human-readable message and an audit entry.
    pub async fn publish_identity(&self, identity: &IdentityRecord) -> SyncReceipt {
        let started = Instant::now();

        match self.publish_inner(identity).await {
            Ok(content_address) => {
                info!(did = %identity.id, address = %content_address, "identity published");
                self.guard.log_event_as(
                    Some(&identity.id),
                    "publish_identity_succeeded",
                    serde_json::json!({
                        "did": identity.id,
                        "contentAddress": content_address,
                        "durationMs": started.elapsed().as_millis() as u64,
                    }),
                );
                SyncReceipt::succeeded(content_address)
            }
            Err(e) => {
                warn!(did = %identity.id, "publish failed: {}", e);
                self.guard.log_event_as(
                    Some(&identity.id),
                    "publish_identity_failed",
                    serde_json::json!({
                        "did": identity.id,
                        "error": e.to_string(),
                        "durationMs": started.elapsed().as_millis() as u64,
                    }),
                );
                SyncReceipt::failed(&e)
            }
        }
    }

    async fn publish_inner(&self, identity: &IdentityRecord) -> SyncResult<String> {
        if !self.cipher.is_keyed() {
            return Err(SyncError::NotInitialized(
                "Establish a password before publishing".to_string(),
            ));
        }

        if !identity.is_complete() {
            return Err(SyncError::Validation(
                "Identity record needs id and pnName".to_string(),
            ));
        }
        let did = Did::parse(&identity.id)?;

        if !self.guard.check_rate_limit(did.as_str()) {
            return Err(SyncError::RateLimitExceeded {
                retry_after: std::time::Duration::from_secs(60),
            });
        }

        // Encrypt under the user's password, then publish
        let plaintext = serde_json::to_vec(identity)?;
        let blob = self.cipher.encrypt(&plaintext)?;
        let payload = serde_json::to_vec(&blob)?;
        let content_address = self.content.upload(&payload).await?;

        // Point the DID document's service list at the new address
        let mut document = match self.documents.get(did.as_str()).await? {
            Some(document) => document,
            None => self.bootstrap_document(&did).await,
        };
        let endpoint = format!("{}{}", CONTENT_SCHEME, content_address);
        document.set_identity_sync_service(&endpoint, &self.device_id);
        self.documents.put(did.as_str(), &document).await?;

        // Offline-first: keep an encrypted local copy
        self.records.upsert(did.as_str(), &blob).await?;

        // Fire-and-forget device notification; failure is logged, never
        // propagated
        if let Some(notifier) = &self.notifier {
            let notifier = Arc::clone(notifier);
            let did = did.as_str().to_string();
            let address = content_address.clone();
            tokio::spawn(async move {
                if let Err(e) = notifier.notify(&did, &address).await {
                    warn!(did = %did, "device notification failed: {}", e);
                }
            });
        }

        Ok(content_address)
    }

    /// Fetch an identity record by DID.
    ///
    /// `Ok(None)` means no record exists anywhere; errors cover the
    /// failure taxonomy (rate limit, resolution, gateways, decryption).
    pub async fn fetch_identity(&self, did: &str) -> SyncResult<Option<IdentityRecord>> {
        let started = Instant::now();

        let outcome = self.fetch_inner(did).await;
        match &outcome {
            Ok(found) => {
                self.guard.log_event_as(
                    Some(did),
                    "fetch_identity_succeeded",
                    serde_json::json!({
                        "did": did,
                        "found": found.is_some(),
                        "durationMs": started.elapsed().as_millis() as u64,
                    }),
                );
            }
            Err(e) => {
                warn!(did = %did, "fetch failed: {}", e);
                self.guard.log_event_as(
                    Some(did),
                    "fetch_identity_failed",
                    serde_json::json!({
                        "did": did,
                        "error": e.to_string(),
                        "durationMs": started.elapsed().as_millis() as u64,
                    }),
                );
            }
        }
        outcome
    }

    async fn fetch_inner(&self, did: &str) -> SyncResult<Option<IdentityRecord>> {
        let did = Did::parse(did)?;

        if !self.guard.check_rate_limit(did.as_str()) {
            return Err(SyncError::RateLimitExceeded {
                retry_after: std::time::Duration::from_secs(60),
            });
        }

        // Local copy first; no network round trip when we already hold
        // the record
        if let Some(stored) = self.records.get(did.as_str()).await? {
            match self.decode_record(&stored.payload, &did) {
                Ok(identity) => {
                    debug!(did = %did, "identity served from local store");
                    return Ok(Some(identity));
                }
                Err(e @ SyncError::Encryption(_)) => return Err(e),
                Err(e) => {
                    // Corrupt local copy; drop it and fall through to
                    // the network
                    warn!(did = %did, "local record rejected: {}", e);
                    self.records.forget(did.as_str()).await?;
                }
            }
        }

        // Resolve the DID and follow its IdentitySync service entry
        let resolution = self.resolver.resolve(did.as_str()).await?;
        let Some(service) = resolution.document.identity_sync_service() else {
            return Ok(None);
        };
        let endpoint = service
            .service_endpoint
            .as_str()
            .ok_or_else(|| SyncError::Validation("IdentitySync endpoint is not a URI".to_string()))?;
        let content_address = endpoint.strip_prefix(CONTENT_SCHEME).unwrap_or(endpoint);

        let payload = self.content.download(content_address).await?;
        let blob: EncryptedBlob = serde_json::from_slice(&payload)?;
        let identity = self.decode_record(&blob, &did)?;

        // Cache-fill so the next fetch stays local
        self.records.upsert(did.as_str(), &blob).await?;

        Ok(Some(identity))
    }

    /// Decrypt and validate a stored or downloaded record
    fn decode_record(&self, blob: &EncryptedBlob, did: &Did) -> SyncResult<IdentityRecord> {
        let plaintext = self.cipher.decrypt(blob)?;
        let identity: IdentityRecord = serde_json::from_slice(&plaintext)?;

        if !identity.is_complete() {
            return Err(SyncError::Validation(
                "Decrypted record lacks required identity fields".to_string(),
            ));
        }
        if identity.id != did.as_str() {
            return Err(SyncError::Validation(format!(
                "Decrypted record belongs to {}, expected {}",
                identity.id, did
            )));
        }

        Ok(identity)
    }

    /// First publish for a DID with no stored document: synthesize one
    /// where the method allows it, otherwise start from a minimal
    /// self-controlled document
    async fn bootstrap_document(&self, did: &Did) -> DidDocument {
        if did.method() == "key" {
            if let Ok(document) = KeySynthesisStrategy::new().resolve(did).await {
                return document;
            }
        }

        let key_id = format!("{}#controller", did);
        DidDocument {
            id: did.as_str().to_string(),
            verification_method: vec![VerificationMethod {
                id: key_id.clone(),
                method_type: "Ed25519VerificationKey2020".to_string(),
                controller: did.as_str().to_string(),
                public_key_multibase: None,
            }],
            authentication: vec![key_id],
            assertion_method: vec![],
            service: vec![],
            created: Some(chrono::Utc::now()),
            updated: Some(chrono::Utc::now()),
        }
    }
}
