//! `PostgreSQL` implementation of the key-value store: one `kv_items` table,
//! payload kept as JSONB.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use tracing::debug;

use crate::store::{Item, ItemKey, KeyValueStore, StoreError};

#[derive(Debug, Clone)]
pub struct PgKeyValueStore {
    pool: PgPool,
}

impl PgKeyValueStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects and makes sure the `kv_items` table exists.
    ///
    /// # Errors
    /// Returns an error if the database connection cannot be established.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    /// # Errors
    /// Returns an error if the DDL fails.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS kv_items (
                table_name    TEXT        NOT NULL,
                partition_key TEXT        NOT NULL,
                sort_key      TEXT        NOT NULL DEFAULT '',
                payload       JSONB       NOT NULL,
                updated_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (table_name, partition_key, sort_key)
            )
            ",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

const UPSERT: &str = r"
    INSERT INTO kv_items (table_name, partition_key, sort_key, payload)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (table_name, partition_key, sort_key) DO UPDATE
    SET payload = EXCLUDED.payload,
        updated_at = NOW()
";

#[async_trait]
impl KeyValueStore for PgKeyValueStore {
    async fn put_item(&self, table: &str, item: &Item) -> Result<(), StoreError> {
        if item.key.partition.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        sqlx::query(UPSERT)
            .bind(table)
            .bind(&item.key.partition)
            .bind(item.key.sort.as_deref().unwrap_or(""))
            .bind(Value::Object(item.attributes.clone()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn batch_put(&self, table: &str, items: &[Item]) -> Result<usize, StoreError> {
        if items.is_empty() {
            return Ok(0);
        }
        if items.iter().any(|i| i.key.partition.is_empty()) {
            return Err(StoreError::EmptyKey);
        }

        let mut tx = self.pool.begin().await?;
        for chunk in items.chunks(100) {
            for item in chunk {
                sqlx::query(UPSERT)
                    .bind(table)
                    .bind(&item.key.partition)
                    .bind(item.key.sort.as_deref().unwrap_or(""))
                    .bind(Value::Object(item.attributes.clone()))
                    .execute(&mut *tx)
                    .await?;
            }
            debug!(table, written = chunk.len(), "Wrote batch chunk");
        }
        tx.commit().await?;

        Ok(items.len())
    }

    async fn get_item(&self, table: &str, key: &ItemKey) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT payload FROM kv_items
            WHERE table_name = $1 AND partition_key = $2 AND sort_key = $3
            ",
        )
        .bind(table)
        .bind(&key.partition)
        .bind(key.sort.as_deref().unwrap_or(""))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        match row.try_get::<Value, _>("payload")? {
            Value::Object(attributes) => Ok(Some(Item {
                key: key.clone(),
                attributes,
            })),
            _ => Err(StoreError::Payload(key.to_string())),
        }
    }
}
