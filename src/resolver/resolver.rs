/// DID resolver - orchestrates cached, rate-limited strategy resolution
use crate::config::ResolverConfig;
use crate::documents::{validate_structure, Did};
use crate::error::{SyncError, SyncResult};
use crate::resolver::{ResolutionCache, ResolutionResult, ResolutionStrategy};
use crate::security::SecurityGuard;
use std::sync::Arc;
use tracing::{debug, info};

/// Main DID resolver
///
/// Per request: cache check, rate limit check, then the strategy loop
/// in fixed order. Strategies never run concurrently; the first
/// structurally valid document wins and is cached.
pub struct DidResolver {
    config: ResolverConfig,
    cache: ResolutionCache,
    strategies: Vec<Box<dyn ResolutionStrategy>>,
    guard: Arc<SecurityGuard>,
}

impl DidResolver {
    pub fn new(
        config: ResolverConfig,
        strategies: Vec<Box<dyn ResolutionStrategy>>,
        guard: Arc<SecurityGuard>,
    ) -> Self {
        let cache = ResolutionCache::new(config.cache_ttl);
        Self {
            config,
            cache,
            strategies,
            guard,
        }
    }

    /// Resolve a DID to its document
    pub async fn resolve(&self, did: &str) -> SyncResult<ResolutionResult> {
        let did = Did::parse(did)?;

        // Cache check - fresh entries short-circuit everything
        if let Some(cached) = self.cache.get(did.as_str()).await {
            debug!(did = %did, "resolution served from cache");
            return Ok(cached);
        }

        // Rate limit check
        if !self
            .guard
            .check_rate_limit_with(did.as_str(), self.config.rate_limit_per_window)
        {
            return Err(SyncError::RateLimitExceeded {
                retry_after: std::time::Duration::from_secs(60),
            });
        }

        // Strategy loop, fixed order
        for strategy in &self.strategies {
            let document = match strategy.resolve(&did).await {
                Ok(document) => document,
                Err(e) => {
                    debug!(did = %did, strategy = strategy.name(), "strategy failed: {}", e);
                    self.guard.log_event(
                        "resolution_strategy_failed",
                        serde_json::json!({
                            "did": did.as_str(),
                            "strategy": strategy.name(),
                            "error": e.to_string(),
                        }),
                    );
                    continue;
                }
            };

            if let Err(e) = validate_structure(did.as_str(), &document) {
                self.guard.log_event(
                    "resolution_validation_failed",
                    serde_json::json!({
                        "did": did.as_str(),
                        "strategy": strategy.name(),
                        "error": e.to_string(),
                    }),
                );
                continue;
            }

            info!(did = %did, strategy = strategy.name(), "DID resolved");
            self.guard.log_event(
                "did_resolved",
                serde_json::json!({ "did": did.as_str(), "strategy": strategy.name() }),
            );

            let result = ResolutionResult::from_document(document);
            self.cache.insert(did.as_str(), result.clone()).await;
            return Ok(result);
        }

        self.guard.log_event(
            "did_not_resolvable",
            serde_json::json!({ "did": did.as_str() }),
        );
        Err(SyncError::NotResolvable(did.as_str().to_string()))
    }

    /// Drop any cached result for a DID
    pub async fn invalidate(&self, did: &str) {
        self.cache.invalidate(did).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::documents::{DidDocument, VerificationMethod};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn valid_document(did: &str) -> DidDocument {
        DidDocument {
            id: did.to_string(),
            verification_method: vec![VerificationMethod {
                id: format!("{}#key-1", did),
                method_type: "Ed25519VerificationKey2020".to_string(),
                controller: did.to_string(),
                public_key_multibase: None,
            }],
            authentication: vec![format!("{}#key-1", did)],
            assertion_method: vec![],
            service: vec![],
            created: None,
            updated: None,
        }
    }

    /// Scripted strategy that counts invocations
    struct FakeStrategy {
        name: &'static str,
        outcome: Result<DidDocument, String>,
        calls: Arc<AtomicUsize>,
    }

    impl FakeStrategy {
        fn ok(name: &'static str, document: DidDocument) -> (Box<Self>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Box::new(Self {
                    name,
                    outcome: Ok(document),
                    calls: Arc::clone(&calls),
                }),
                calls,
            )
        }

        fn err(name: &'static str, message: &str) -> (Box<Self>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Box::new(Self {
                    name,
                    outcome: Err(message.to_string()),
                    calls: Arc::clone(&calls),
                }),
                calls,
            )
        }
    }

    #[async_trait]
    impl ResolutionStrategy for FakeStrategy {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn resolve(&self, _did: &Did) -> SyncResult<DidDocument> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.outcome {
                Ok(document) => Ok(document.clone()),
                Err(e) => Err(SyncError::Internal(e.clone())),
            }
        }
    }

    fn test_resolver(
        strategies: Vec<Box<dyn ResolutionStrategy>>,
        limit: u32,
    ) -> DidResolver {
        let guard = Arc::new(SecurityGuard::new(RateLimitConfig {
            window: 60,
            max_operations: limit,
        }));
        DidResolver::new(
            ResolverConfig {
                cache_ttl: 300,
                web_timeout: 8,
                rate_limit_per_window: limit,
            },
            strategies,
            guard,
        )
    }

    #[tokio::test]
    async fn test_repeated_resolution_served_from_cache() {
        let (strategy, calls) = FakeStrategy::ok("only", valid_document("did:key:abc"));
        let resolver = test_resolver(vec![strategy], 10);

        let first = resolver.resolve("did:key:abc").await.unwrap();
        let second = resolver.resolve("did:key:abc").await.unwrap();

        assert_eq!(first.document, second.document);
        // The strategy ran exactly once; the second call hit the cache
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fallback_to_second_strategy() {
        let (failing, failing_calls) = FakeStrategy::err("first", "backend down");
        let (working, _) = FakeStrategy::ok("second", valid_document("did:key:abc"));
        let resolver = test_resolver(vec![failing, working], 10);

        let result = resolver.resolve("did:key:abc").await.unwrap();

        assert_eq!(result.document.id, "did:key:abc");
        assert_eq!(failing_calls.load(Ordering::SeqCst), 1);

        // The first strategy's failure left an audit trail
        let log = resolver.guard.audit_log();
        assert!(log.iter().any(|e| {
            e.event == "resolution_strategy_failed" && e.details["strategy"] == "first"
        }));
    }

    #[tokio::test]
    async fn test_invalid_document_falls_through() {
        let mut broken = valid_document("did:key:abc");
        broken.authentication.clear();

        let (invalid, _) = FakeStrategy::ok("invalid", broken);
        let (valid, _) = FakeStrategy::ok("valid", valid_document("did:key:abc"));
        let resolver = test_resolver(vec![invalid, valid], 10);

        let result = resolver.resolve("did:key:abc").await.unwrap();
        assert!(!result.document.authentication.is_empty());

        let log = resolver.guard.audit_log();
        assert!(log
            .iter()
            .any(|e| e.event == "resolution_validation_failed"));
    }

    #[tokio::test]
    async fn test_exhaustion_is_not_resolvable() {
        let (s1, _) = FakeStrategy::err("first", "down");
        let (s2, _) = FakeStrategy::err("second", "also down");
        let resolver = test_resolver(vec![s1, s2], 10);

        assert!(matches!(
            resolver.resolve("did:key:abc").await,
            Err(SyncError::NotResolvable(_))
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_applies_per_did() {
        let (strategy, _) = FakeStrategy::err("none", "down");
        let resolver = test_resolver(vec![strategy], 2);

        // Misses are not cached, so each attempt counts against the limit
        let _ = resolver.resolve("did:key:abc").await;
        let _ = resolver.resolve("did:key:abc").await;

        assert!(matches!(
            resolver.resolve("did:key:abc").await,
            Err(SyncError::RateLimitExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_malformed_did_rejected_before_strategies() {
        let (strategy, calls) = FakeStrategy::ok("only", valid_document("did:key:abc"));
        let resolver = test_resolver(vec![strategy], 10);

        assert!(matches!(
            resolver.resolve("not-a-did").await,
            Err(SyncError::Validation(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
