use async_trait::async_trait;

use crate::db::{Database, NewSource, Source, SourcePatch, SourceWithEntries};
use crate::entries::EntryStore;
use crate::error::StoreError;

const SOURCE_COLUMNS: &str = "id, owner_id, title, description, link";

/// Durable storage for subscribed sources.
///
/// The store works purely on identity; checking that a caller owns a source
/// is left to the layer above.
#[async_trait]
pub trait SourceStore: Send + Sync {
    async fn create_source(&self, source: NewSource) -> Result<Source, StoreError>;

    async fn get_source(&self, id: i64) -> Result<Option<Source>, StoreError>;

    async fn get_source_with_entries(
        &self,
        id: i64,
    ) -> Result<Option<SourceWithEntries>, StoreError>;

    /// Apply a partial update; fields left as `None` keep their stored value.
    async fn update_source(&self, id: i64, patch: SourcePatch) -> Result<Source, StoreError>;

    /// Delete a source. Its entries go with it.
    async fn delete_source(&self, id: i64) -> Result<(), StoreError>;

    async fn list_sources_by_owner(&self, owner_id: i64) -> Result<Vec<Source>, StoreError>;

    async fn list_sources(&self) -> Result<Vec<Source>, StoreError>;
}

#[async_trait]
impl SourceStore for Database {
    async fn create_source(&self, source: NewSource) -> Result<Source, StoreError> {
        source.validate()?;

        let mut tx = self.pool.begin().await?;
        let created = sqlx::query_as::<_, Source>(&format!(
            r#"
            INSERT INTO sources (owner_id, title, description, link)
            VALUES (?, ?, ?, ?)
            RETURNING {}
            "#,
            SOURCE_COLUMNS
        ))
        .bind(source.owner_id)
        .bind(&source.title)
        .bind(&source.description)
        .bind(&source.link)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(created)
    }

    async fn get_source(&self, id: i64) -> Result<Option<Source>, StoreError> {
        let source = sqlx::query_as::<_, Source>(&format!(
            "SELECT {} FROM sources WHERE id = ?",
            SOURCE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(source)
    }

    async fn get_source_with_entries(
        &self,
        id: i64,
    ) -> Result<Option<SourceWithEntries>, StoreError> {
        let Some(source) = self.get_source(id).await? else {
            return Ok(None);
        };
        let entries = self.list_entries(id).await?;
        Ok(Some(SourceWithEntries { source, entries }))
    }

    async fn update_source(&self, id: i64, patch: SourcePatch) -> Result<Source, StoreError> {
        patch.validate()?;

        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query_as::<_, Source>(&format!(
            r#"
            UPDATE sources
            SET title = COALESCE(?, title),
                description = COALESCE(?, description),
                link = COALESCE(?, link)
            WHERE id = ?
            RETURNING {}
            "#,
            SOURCE_COLUMNS
        ))
        .bind(patch.title)
        .bind(patch.description)
        .bind(patch.link)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;
        tx.commit().await?;

        Ok(updated)
    }

    async fn delete_source(&self, id: i64) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM sources WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_sources_by_owner(&self, owner_id: i64) -> Result<Vec<Source>, StoreError> {
        let sources = sqlx::query_as::<_, Source>(&format!(
            "SELECT {} FROM sources WHERE owner_id = ? ORDER BY id",
            SOURCE_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(sources)
    }

    async fn list_sources(&self) -> Result<Vec<Source>, StoreError> {
        let sources = sqlx::query_as::<_, Source>(&format!(
            "SELECT {} FROM sources ORDER BY id",
            SOURCE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(sources)
    }
}
