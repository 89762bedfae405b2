/// Resolution strategies
///
/// Each strategy knows how to produce a document for some family of
/// DIDs; the resolver tries them in a fixed, deterministic order and
/// takes the first structurally valid result.
use crate::content::ContentStore;
use crate::documents::{Did, DidDocument, DocumentStore, VerificationMethod};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Multicodec prefix for an Ed25519 public key
const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

/// A single way of resolving a DID to a document
#[async_trait]
pub trait ResolutionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce a document or fail; failures make the resolver move on
    /// to the next strategy
    async fn resolve(&self, did: &Did) -> SyncResult<DidDocument>;
}

/// Strategy 1: the local document store
pub struct LocalStoreStrategy {
    store: Arc<DocumentStore>,
}

impl LocalStoreStrategy {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ResolutionStrategy for LocalStoreStrategy {
    fn name(&self) -> &'static str {
        "local_store"
    }

    async fn resolve(&self, did: &Did) -> SyncResult<DidDocument> {
        self.store
            .get(did.as_str())
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("No local document for {}", did)))
    }
}

/// Strategy 2: the content-addressed network
///
/// Handles DIDs whose method-specific id is itself a content address
/// (`did:ipfs:<address>`); the document is fetched from the network.
pub struct ContentNetworkStrategy {
    content: Arc<ContentStore>,
}

impl ContentNetworkStrategy {
    pub fn new(content: Arc<ContentStore>) -> Self {
        Self { content }
    }
}

#[async_trait]
impl ResolutionStrategy for ContentNetworkStrategy {
    fn name(&self) -> &'static str {
        "content_network"
    }

    async fn resolve(&self, did: &Did) -> SyncResult<DidDocument> {
        if did.method() != "ipfs" {
            return Err(SyncError::NotResolvable(format!(
                "{} does not encode a content address",
                did
            )));
        }

        let data = self.content.download(did.method_specific_id()).await?;
        let document: DidDocument = serde_json::from_slice(&data)?;
        Ok(document)
    }
}

/// Strategy 3: method-specific synthesis
///
/// A `did:key` document is derived entirely from the key material
/// embedded in the identifier; no network call is made.
pub struct KeySynthesisStrategy;

impl KeySynthesisStrategy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ResolutionStrategy for KeySynthesisStrategy {
    fn name(&self) -> &'static str {
        "key_synthesis"
    }

    async fn resolve(&self, did: &Did) -> SyncResult<DidDocument> {
        if did.method() != "key" {
            return Err(SyncError::NotResolvable(format!(
                "{} carries no embedded key material",
                did
            )));
        }

        let multibase = did.method_specific_id();
        let encoded = multibase.strip_prefix('z').ok_or_else(|| {
            SyncError::Validation(format!("Unsupported multibase prefix in {}", did))
        })?;

        let decoded = bs58::decode(encoded)
            .into_vec()
            .map_err(|e| SyncError::Validation(format!("Invalid key encoding in {}: {}", did, e)))?;

        if decoded.len() != 34 || decoded[..2] != ED25519_MULTICODEC {
            return Err(SyncError::Validation(format!(
                "{} does not carry an Ed25519 public key",
                did
            )));
        }

        let key_id = format!("{}#{}", did, multibase);
        Ok(DidDocument {
            id: did.as_str().to_string(),
            verification_method: vec![VerificationMethod {
                id: key_id.clone(),
                method_type: "Ed25519VerificationKey2020".to_string(),
                controller: did.as_str().to_string(),
                public_key_multibase: Some(multibase.to_string()),
            }],
            authentication: vec![key_id.clone()],
            assertion_method: vec![key_id],
            service: vec![],
            created: None,
            updated: None,
        })
    }
}

/// Strategy 4: web-hosted documents
///
/// `did:web:<domain>` maps to a well-known HTTPS path;
/// `did:web:<domain>:<path...>` to `<path>/did.json` on that host.
pub struct WebDocumentStrategy {
    client: reqwest::Client,
}

impl WebDocumentStrategy {
    pub fn new(timeout_secs: u64) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SyncError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    fn document_url(did: &Did) -> SyncResult<String> {
        let parts: Vec<&str> = did.method_specific_id().split(':').collect();
        let domain = parts
            .first()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| SyncError::Validation(format!("Missing domain in {}", did)))?;

        if parts.len() == 1 {
            Ok(format!("https://{}/.well-known/did.json", domain))
        } else {
            Ok(format!("https://{}/{}/did.json", domain, parts[1..].join("/")))
        }
    }
}

#[async_trait]
impl ResolutionStrategy for WebDocumentStrategy {
    fn name(&self) -> &'static str {
        "web_document"
    }

    async fn resolve(&self, did: &Did) -> SyncResult<DidDocument> {
        if did.method() != "web" {
            return Err(SyncError::NotResolvable(format!(
                "{} does not name a web host",
                did
            )));
        }

        let url = Self::document_url(did)?;
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/did+json, application/json")
            .send()
            .await
            .map_err(|e| SyncError::NotResolvable(format!("Failed to fetch {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(SyncError::NotResolvable(format!(
                "{} returned status {}",
                url,
                response.status()
            )));
        }

        let document: DidDocument = response
            .json()
            .await
            .map_err(|e| SyncError::Validation(format!("Invalid document at {}: {}", url, e)))?;

        Ok(document)
    }
}

/// The production strategy order: local store, content network, key
/// synthesis, web-hosted document
pub fn default_strategies(
    store: Arc<DocumentStore>,
    content: Arc<ContentStore>,
    web_timeout: u64,
) -> SyncResult<Vec<Box<dyn ResolutionStrategy>>> {
    Ok(vec![
        Box::new(LocalStoreStrategy::new(store)),
        Box::new(ContentNetworkStrategy::new(content)),
        Box::new(KeySynthesisStrategy::new()),
        Box::new(WebDocumentStrategy::new(web_timeout)?),
    ])
}
