/// Identity synchronization
///
/// Publishes an encrypted identity record to the content-addressed
/// network, keeps the owner's DID document pointing at the newest
/// content address, and maintains an offline-first local copy.

pub mod engine;
pub mod records;

pub use engine::{DeviceNotifier, SyncEngine};
pub use records::LocalRecordStore;

use crate::error::SyncError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The identity payload synchronized across devices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    /// The owner DID
    pub id: String,
    /// Public handle
    pub pn_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl IdentityRecord {
    pub fn new(id: impl Into<String>, pn_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pn_name: pn_name.into(),
            display_name: None,
            avatar_url: None,
            bio: None,
            links: Vec::new(),
            updated_at: None,
        }
    }

    /// Minimum fields a decrypted record must carry to be trusted
    pub fn is_complete(&self) -> bool {
        !self.id.is_empty() && !self.pn_name.is_empty()
    }
}

/// Outcome of a publish operation
///
/// Publishing never panics or returns a bare error; callers always get
/// a receipt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReceipt {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SyncReceipt {
    pub fn succeeded(content_address: String) -> Self {
        Self {
            success: true,
            content_address: Some(content_address),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(error: &SyncError) -> Self {
        Self {
            success: false,
            content_address: None,
            error: Some(error.user_message()),
            timestamp: Utc::now(),
        }
    }
}
