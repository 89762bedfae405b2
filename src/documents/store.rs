/// Encrypted-at-rest persistence of DID documents
///
/// Documents are encrypted with process-local key material (never the
/// user's password) before they touch the database, and keyed by DID.
use crate::crypto::{CipherBox, EncryptedBlob};
use crate::documents::DidDocument;
use crate::error::{SyncError, SyncResult};
use chrono::Utc;
use sqlx::{Row, SqlitePool};

/// DID document store
pub struct DocumentStore {
    db: SqlitePool,
    cipher: CipherBox,
}

impl DocumentStore {
    /// `cipher` must be keyed with the process-local device key
    pub fn new(db: SqlitePool, cipher: CipherBox) -> Self {
        Self { db, cipher }
    }

    /// Persist a document, replacing any prior version for the DID
    pub async fn put(&self, did: &str, document: &DidDocument) -> SyncResult<()> {
        let serialized = serde_json::to_vec(document)?;
        let blob = self.cipher.encrypt(&serialized)?;
        let encrypted_doc = serde_json::to_string(&blob)?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO did_documents (did, encrypted_doc, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(did) DO UPDATE SET
                encrypted_doc = excluded.encrypted_doc,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(did)
        .bind(&encrypted_doc)
        .bind(&now)
        .execute(&self.db)
        .await
        .map_err(SyncError::Database)?;

        Ok(())
    }

    /// Retrieve a document; absence is a normal outcome
    pub async fn get(&self, did: &str) -> SyncResult<Option<DidDocument>> {
        let row = sqlx::query("SELECT encrypted_doc FROM did_documents WHERE did = ?1")
            .bind(did)
            .fetch_optional(&self.db)
            .await
            .map_err(SyncError::Database)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let encrypted_doc: String = row.try_get("encrypted_doc")?;
        let blob: EncryptedBlob = serde_json::from_str(&encrypted_doc)?;
        let serialized = self.cipher.decrypt(&blob)?;
        let document: DidDocument = serde_json::from_slice(&serialized)?;

        Ok(Some(document))
    }

    /// Remove a stored document
    pub async fn delete(&self, did: &str) -> SyncResult<()> {
        sqlx::query("DELETE FROM did_documents WHERE did = ?1")
            .bind(did)
            .execute(&self.db)
            .await
            .map_err(SyncError::Database)?;

        Ok(())
    }

    /// All DIDs with a stored document
    pub async fn list_dids(&self) -> SyncResult<Vec<String>> {
        let rows = sqlx::query("SELECT did FROM did_documents ORDER BY did")
            .fetch_all(&self.db)
            .await
            .map_err(SyncError::Database)?;

        rows.iter()
            .map(|row| row.try_get("did").map_err(SyncError::Database))
            .collect()
    }
}
