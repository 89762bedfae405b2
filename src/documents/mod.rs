/// DID data model and structural validation
///
/// Documents follow the W3C DID Core shape. Constructors and the
/// structural validator enforce the invariants every resolved or stored
/// document must satisfy; anything failing them never reaches a caller.

pub mod store;

pub use store::DocumentStore;

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Soft ceiling on serialized document size; larger documents are
/// suspicious but not rejected
const DOCUMENT_SIZE_WARN_BYTES: usize = 10 * 1024;

/// URI schemes that smuggle executable content into downstream
/// consumers; rejected in service endpoints
const EXECUTABLE_SCHEMES: [&str; 3] = ["javascript:", "data:", "vbscript:"];

/// Service entry type written by the sync engine
pub const IDENTITY_SYNC_SERVICE_TYPE: &str = "IdentitySync";

/// A validated DID of the form `did:<method>:<method-specific-id>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Did(String);

impl Did {
    /// Parse and validate a DID string. Immutable once issued.
    pub fn parse(s: &str) -> SyncResult<Self> {
        let mut parts = s.splitn(3, ':');
        let scheme = parts.next().unwrap_or_default();
        let method = parts.next().unwrap_or_default();
        let method_specific_id = parts.next().unwrap_or_default();

        if scheme != "did" || method.is_empty() || method_specific_id.is_empty() {
            return Err(SyncError::Validation(format!("Malformed DID: {}", s)));
        }

        if !method.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
            return Err(SyncError::Validation(format!(
                "Invalid DID method name: {}",
                method
            )));
        }

        Ok(Did(s.to_string()))
    }

    pub fn method(&self) -> &str {
        self.0.split(':').nth(1).unwrap_or_default()
    }

    pub fn method_specific_id(&self) -> &str {
        self.0.splitn(3, ':').nth(2).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Did {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A verification method entry (key material holder)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub method_type: String,
    pub controller: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_multibase: Option<String>,
}

/// A service endpoint entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub service_type: String,
    /// Usually a URI string; some methods use richer objects
    pub service_endpoint: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// A DID Document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    pub id: String,
    #[serde(default)]
    pub verification_method: Vec<VerificationMethod>,
    #[serde(default)]
    pub authentication: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertion_method: Vec<String>,
    #[serde(default)]
    pub service: Vec<ServiceEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

impl DidDocument {
    /// Find the newest IdentitySync service entry, if any
    pub fn identity_sync_service(&self) -> Option<&ServiceEntry> {
        self.service
            .iter()
            .filter(|s| s.service_type == IDENTITY_SYNC_SERVICE_TYPE)
            .max_by_key(|s| s.timestamp)
    }

    /// Replace (or add) the IdentitySync service entry pointing at a
    /// content address
    pub fn set_identity_sync_service(&mut self, endpoint: &str, device_id: &str) {
        self.service
            .retain(|s| s.service_type != IDENTITY_SYNC_SERVICE_TYPE);
        self.service.push(ServiceEntry {
            id: format!("{}#identity-sync", self.id),
            service_type: IDENTITY_SYNC_SERVICE_TYPE.to_string(),
            service_endpoint: serde_json::Value::String(endpoint.to_string()),
            timestamp: Some(Utc::now()),
            device_id: Some(device_id.to_string()),
        });
        self.updated = Some(Utc::now());
    }
}

/// Structural validation of a resolved or stored document.
///
/// All rules must pass; the serialized-size ceiling only warns.
pub fn validate_structure(did: &str, document: &DidDocument) -> SyncResult<()> {
    let mut errors = Vec::new();

    if document.id.is_empty() {
        errors.push("document id is missing".to_string());
    } else if document.id != did {
        errors.push(format!(
            "document id {} does not match resolved DID {}",
            document.id, did
        ));
    }

    if document.verification_method.is_empty() {
        errors.push("verificationMethod is missing or empty".to_string());
    }
    for method in &document.verification_method {
        if method.id.is_empty() || method.method_type.is_empty() || method.controller.is_empty() {
            errors.push(format!(
                "verification method {} lacks id, type, or controller",
                method.id
            ));
        }
    }

    if document.authentication.is_empty() {
        errors.push("authentication is missing or empty".to_string());
    }
    for reference in document
        .authentication
        .iter()
        .chain(document.assertion_method.iter())
    {
        if !reference_resolves(document, reference) {
            errors.push(format!(
                "reference {} has no matching verification method",
                reference
            ));
        }
    }

    for entry in &document.service {
        if let serde_json::Value::String(endpoint) = &entry.service_endpoint {
            let lowered = endpoint.trim().to_ascii_lowercase();
            if EXECUTABLE_SCHEMES.iter().any(|s| lowered.starts_with(s)) {
                errors.push(format!(
                    "service {} carries an executable endpoint scheme",
                    entry.id
                ));
            }
        }
    }

    match serde_json::to_string(document) {
        Ok(serialized) if serialized.len() > DOCUMENT_SIZE_WARN_BYTES => {
            warn!(
                did,
                bytes = serialized.len(),
                "DID document exceeds the expected size"
            );
        }
        _ => {}
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(SyncError::Validation(errors.join("; ")))
    }
}

/// A reference resolves if it names a verification method, either in
/// full or as a bare fragment
fn reference_resolves(document: &DidDocument, reference: &str) -> bool {
    document.verification_method.iter().any(|m| {
        m.id == reference || (reference.starts_with('#') && m.id.ends_with(reference))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_document(did: &str) -> DidDocument {
        DidDocument {
            id: did.to_string(),
            verification_method: vec![VerificationMethod {
                id: format!("{}#key-1", did),
                method_type: "Ed25519VerificationKey2020".to_string(),
                controller: did.to_string(),
                public_key_multibase: Some("z6MkTestKey".to_string()),
            }],
            authentication: vec![format!("{}#key-1", did)],
            assertion_method: vec![],
            service: vec![],
            created: Some(Utc::now()),
            updated: Some(Utc::now()),
        }
    }

    #[test]
    fn test_did_parse_valid() {
        let did = Did::parse("did:key:z6MkABC").unwrap();
        assert_eq!(did.method(), "key");
        assert_eq!(did.method_specific_id(), "z6MkABC");
        assert_eq!(did.as_str(), "did:key:z6MkABC");
    }

    #[test]
    fn test_did_parse_preserves_colons_in_msid() {
        let did = Did::parse("did:web:example.com:user:alice").unwrap();
        assert_eq!(did.method(), "web");
        assert_eq!(did.method_specific_id(), "example.com:user:alice");
    }

    #[test]
    fn test_did_parse_rejects_malformed() {
        for bad in ["", "did:", "did:key", "key:abc", "did::abc", "did:KEY:abc"] {
            assert!(Did::parse(bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_valid_document_passes() {
        let doc = minimal_document("did:key:abc");
        assert!(validate_structure("did:key:abc", &doc).is_ok());
    }

    #[test]
    fn test_id_mismatch_rejected() {
        let doc = minimal_document("did:key:abc");
        assert!(validate_structure("did:key:other", &doc).is_err());
    }

    #[test]
    fn test_missing_verification_method_rejected() {
        let mut doc = minimal_document("did:key:abc");
        doc.verification_method.clear();
        assert!(validate_structure("did:key:abc", &doc).is_err());
    }

    #[test]
    fn test_missing_authentication_rejected() {
        let mut doc = minimal_document("did:key:abc");
        doc.authentication.clear();
        assert!(validate_structure("did:key:abc", &doc).is_err());
    }

    #[test]
    fn test_dangling_reference_rejected() {
        let mut doc = minimal_document("did:key:abc");
        doc.authentication = vec!["did:key:abc#missing".to_string()];
        assert!(validate_structure("did:key:abc", &doc).is_err());
    }

    #[test]
    fn test_fragment_reference_resolves() {
        let mut doc = minimal_document("did:key:abc");
        doc.authentication = vec!["#key-1".to_string()];
        assert!(validate_structure("did:key:abc", &doc).is_ok());
    }

    #[test]
    fn test_executable_endpoint_rejected() {
        let mut doc = minimal_document("did:key:abc");
        doc.service.push(ServiceEntry {
            id: "did:key:abc#evil".to_string(),
            service_type: "LinkedDomains".to_string(),
            service_endpoint: serde_json::Value::String(
                "JavaScript:alert(1)".to_string(),
            ),
            timestamp: None,
            device_id: None,
        });
        assert!(validate_structure("did:key:abc", &doc).is_err());
    }

    #[test]
    fn test_object_endpoint_allowed() {
        let mut doc = minimal_document("did:key:abc");
        doc.service.push(ServiceEntry {
            id: "did:key:abc#hub".to_string(),
            service_type: "Hub".to_string(),
            service_endpoint: serde_json::json!({ "uri": "https://hub.example" }),
            timestamp: None,
            device_id: None,
        });
        assert!(validate_structure("did:key:abc", &doc).is_ok());
    }

    #[test]
    fn test_identity_sync_service_roundtrip() {
        let mut doc = minimal_document("did:key:abc");
        assert!(doc.identity_sync_service().is_none());

        doc.set_identity_sync_service("ipfs://QmOne", "device-1");
        doc.set_identity_sync_service("ipfs://QmTwo", "device-1");

        // Replaced, not accumulated
        let entries: Vec<_> = doc
            .service
            .iter()
            .filter(|s| s.service_type == IDENTITY_SYNC_SERVICE_TYPE)
            .collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            doc.identity_sync_service().unwrap().service_endpoint,
            serde_json::Value::String("ipfs://QmTwo".to_string())
        );
    }
}
