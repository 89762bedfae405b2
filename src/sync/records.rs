/// Local persistence of encrypted identity payloads
///
/// One row per DID; the payload stays encrypted at rest and the version
/// counter increments on every overwrite.
use crate::crypto::EncryptedBlob;
use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

/// A stored identity record row
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub did: String,
    pub payload: EncryptedBlob,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

/// Local identity record store
pub struct LocalRecordStore {
    db: SqlitePool,
}

impl LocalRecordStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Insert or overwrite the record for a DID
    pub async fn upsert(&self, did: &str, payload: &EncryptedBlob) -> SyncResult<()> {
        let encrypted_payload = serde_json::to_string(payload)?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO identity_records (did, encrypted_payload, created_at, updated_at, version)
            VALUES (?1, ?2, ?3, ?3, 1)
            ON CONFLICT(did) DO UPDATE SET
                encrypted_payload = excluded.encrypted_payload,
                updated_at = excluded.updated_at,
                version = identity_records.version + 1
            "#,
        )
        .bind(did)
        .bind(&encrypted_payload)
        .bind(&now)
        .execute(&self.db)
        .await
        .map_err(SyncError::Database)?;

        Ok(())
    }

    /// Fetch the record for a DID; absence is a normal outcome
    pub async fn get(&self, did: &str) -> SyncResult<Option<StoredRecord>> {
        let row = sqlx::query(
            r#"
            SELECT did, encrypted_payload, created_at, updated_at, version
            FROM identity_records
            WHERE did = ?1
            "#,
        )
        .bind(did)
        .fetch_optional(&self.db)
        .await
        .map_err(SyncError::Database)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let encrypted_payload: String = row.try_get("encrypted_payload")?;
        Ok(Some(StoredRecord {
            did: row.try_get("did")?,
            payload: serde_json::from_str(&encrypted_payload)?,
            created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
            updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at")?)?,
            version: row.try_get("version")?,
        }))
    }

    /// Drop the record for a DID (used when a local copy fails
    /// post-decrypt validation)
    pub async fn forget(&self, did: &str) -> SyncResult<()> {
        sqlx::query("DELETE FROM identity_records WHERE did = ?1")
            .bind(did)
            .execute(&self.db)
            .await
            .map_err(SyncError::Database)?;

        Ok(())
    }
}

/// Parse RFC3339 timestamp
fn parse_timestamp(s: &str) -> SyncResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SyncError::Internal(format!("Invalid timestamp: {}", e)))
}
