/// In-memory TTL cache for resolution results
///
/// Lives for the process lifetime only. Stale entries are treated as
/// misses on the next access; there is no background sweep.
use crate::resolver::ResolutionResult;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

struct CachedResolution {
    result: ResolutionResult,
    cached_at: DateTime<Utc>,
}

/// Resolution cache with lazy expiry
pub struct ResolutionCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedResolution>>,
}

impl ResolutionCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs as i64),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Fresh entry for the DID, if one exists
    pub async fn get(&self, did: &str) -> Option<ResolutionResult> {
        let entries = self.entries.read().await;
        let cached = entries.get(did)?;

        if Utc::now() - cached.cached_at < self.ttl {
            Some(cached.result.clone())
        } else {
            None
        }
    }

    pub async fn insert(&self, did: &str, result: ResolutionResult) {
        let mut entries = self.entries.write().await;
        entries.insert(
            did.to_string(),
            CachedResolution {
                result,
                cached_at: Utc::now(),
            },
        );
    }

    /// Drop an entry, forcing re-resolution on next access
    pub async fn invalidate(&self, did: &str) {
        self.entries.write().await.remove(did);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::DidDocument;

    fn test_result(did: &str) -> ResolutionResult {
        ResolutionResult::from_document(DidDocument {
            id: did.to_string(),
            verification_method: vec![],
            authentication: vec![],
            assertion_method: vec![],
            service: vec![],
            created: None,
            updated: None,
        })
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let cache = ResolutionCache::new(300);
        cache.insert("did:key:abc", test_result("did:key:abc")).await;

        let hit = cache.get("did:key:abc").await.unwrap();
        assert_eq!(hit.document.id, "did:key:abc");
        assert!(cache.get("did:key:other").await.is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let cache = ResolutionCache::new(0);
        cache.insert("did:key:abc", test_result("did:key:abc")).await;

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(cache.get("did:key:abc").await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cache = ResolutionCache::new(300);
        cache.insert("did:key:abc", test_result("did:key:abc")).await;
        cache.invalidate("did:key:abc").await;

        assert!(cache.get("did:key:abc").await.is_none());
    }
}
