use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::{Database, Entry, NewEntry};
use crate::error::StoreError;
use crate::timestamp;

const ENTRY_COLUMNS: &str = "id, source_id, title, description, link, published_at, read_at";

/// Durable storage for ingested entries, unique per (source, link).
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Insert a new entry. Fails with [`StoreError::DuplicateEntry`] when the
    /// source already holds an entry with the same link.
    async fn create_entry(&self, entry: NewEntry) -> Result<Entry, StoreError>;

    async fn get_entry(&self, id: i64) -> Result<Option<Entry>, StoreError>;

    /// Set (or clear, with `None`) the read marker of an entry.
    async fn update_read_marker(
        &self,
        id: i64,
        read_at: Option<DateTime<Utc>>,
    ) -> Result<Entry, StoreError>;

    /// Entries of a source, oldest first, ties broken by insertion order.
    async fn list_entries(&self, source_id: i64) -> Result<Vec<Entry>, StoreError>;

    async fn count_entries(&self, source_id: i64) -> Result<i64, StoreError>;
}

#[async_trait]
impl EntryStore for Database {
    async fn create_entry(&self, entry: NewEntry) -> Result<Entry, StoreError> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, Entry>(&format!(
            r#"
            INSERT INTO entries (source_id, title, description, link, published_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {}
            "#,
            ENTRY_COLUMNS
        ))
        .bind(entry.source_id)
        .bind(&entry.title)
        .bind(&entry.description)
        .bind(&entry.link)
        .bind(&entry.published_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn get_entry(&self, id: i64) -> Result<Option<Entry>, StoreError> {
        let entry = sqlx::query_as::<_, Entry>(&format!(
            "SELECT {} FROM entries WHERE id = ?",
            ENTRY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn update_read_marker(
        &self,
        id: i64,
        read_at: Option<DateTime<Utc>>,
    ) -> Result<Entry, StoreError> {
        let read_at = read_at.map(timestamp::format_canonical);
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, Entry>(&format!(
            "UPDATE entries SET read_at = ? WHERE id = ? RETURNING {}",
            ENTRY_COLUMNS
        ))
        .bind(read_at)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn list_entries(&self, source_id: i64) -> Result<Vec<Entry>, StoreError> {
        let entries = sqlx::query_as::<_, Entry>(&format!(
            r#"
            SELECT {} FROM entries
            WHERE source_id = ?
            ORDER BY published_at ASC, id ASC
            "#,
            ENTRY_COLUMNS
        ))
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn count_entries(&self, source_id: i64) -> Result<i64, StoreError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entries WHERE source_id = ?")
            .bind(source_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}
