/// DID resolution
///
/// Resolves a DID to its document by trying an ordered set of
/// strategies, validating and caching the first structurally valid
/// result. Resolution is guarded by the shared `SecurityGuard`.

pub mod cache;
pub mod resolver;
pub mod strategies;

pub use cache::ResolutionCache;
pub use resolver::DidResolver;
pub use strategies::{
    default_strategies, ContentNetworkStrategy, KeySynthesisStrategy, LocalStoreStrategy,
    ResolutionStrategy, WebDocumentStrategy,
};

use crate::documents::DidDocument;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Metadata accompanying a resolved document
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionMetadata {
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deactivated: Option<bool>,
}

/// A successful resolution
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionResult {
    pub document: DidDocument,
    pub metadata: ResolutionMetadata,
}

impl ResolutionResult {
    pub fn from_document(document: DidDocument) -> Self {
        let metadata = ResolutionMetadata {
            created: document.created,
            updated: document.updated,
            deactivated: None,
        };
        Self { document, metadata }
    }
}
