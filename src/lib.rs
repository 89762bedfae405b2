//! Identity Sync
//!
//! Resolves decentralized identifiers (DIDs) to their documents and
//! synchronizes an encrypted identity record across a redundant,
//! content-addressed storage network.
//!
//! The embedding application constructs one [`IdentitySync`] from a
//! [`SyncConfig`], establishes the user's password, and then publishes
//! and fetches identity records through it. Everything underneath -
//! multi-gateway redundancy, strategy-based resolution with caching,
//! rate limiting, audit logging, encrypted-at-rest persistence - is
//! composed behind that facade.

pub mod config;
pub mod content;
pub mod crypto;
pub mod db;
pub mod documents;
pub mod error;
pub mod resolver;
pub mod security;
pub mod service;
pub mod sync;

pub use config::SyncConfig;
pub use documents::{Did, DidDocument};
pub use error::{SyncError, SyncResult};
pub use resolver::{DidResolver, ResolutionResult};
pub use security::SecurityGuard;
pub use service::IdentitySync;
pub use sync::{IdentityRecord, SyncEngine, SyncReceipt};
