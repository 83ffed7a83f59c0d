use chrono::Utc;
use serde_json::Value;
use sqlx::Row;

use super::{StateStore, StoreError};
use crate::DbPool;

/// `conversation_state` rows carry an absolute `expires_at` in unix seconds.
pub struct SqlStateStore {
    pool: DbPool,
}

impl SqlStateStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM conversation_state WHERE expires_at <= ?")
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl StateStore for SqlStateStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let row = sqlx::query("SELECT value FROM conversation_state WHERE key = ? AND expires_at > ?")
            .bind(key)
            .bind(Utc::now().timestamp())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.try_get("value").map_err(|e| StoreError::Decode(e.to_string()))?;
        serde_json::from_str(&raw).map(Some).map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn set(&self, key: &str, value: Value, ttl_secs: u64) -> Result<(), StoreError> {
        let now = Utc::now();
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        let expires_at = now.timestamp().saturating_add(ttl);

        let purged = sqlx::query("DELETE FROM conversation_state WHERE expires_at <= ?")
            .bind(now.timestamp())
            .execute(&self.pool)
            .await?
            .rows_affected();
        if purged > 0 {
            tracing::debug!(event_name = "state.expired_purged", purged, "purged expired state rows");
        }

        sqlx::query(
            "INSERT INTO conversation_state (key, value, expires_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 expires_at = excluded.expires_at,
                 updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value.to_string())
        .bind(expires_at)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM conversation_state WHERE key = ?").bind(key).execute(&self.pool).await?;
        Ok(())
    }
}
