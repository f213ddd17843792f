use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    FromRow, SqlitePool,
};
use url::Url;

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Source {
    pub id: i64,
    pub owner_id: Option<i64>,
    pub title: String,
    pub description: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Entry {
    pub id: i64,
    pub source_id: i64,
    pub title: String,
    pub description: String,
    pub link: String,
    pub published_at: String,
    pub read_at: Option<String>,
}

/// A source together with its entries in published order.
#[derive(Debug, Clone, Serialize)]
pub struct SourceWithEntries {
    #[serde(flatten)]
    pub source: Source,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSource {
    #[serde(default)]
    pub owner_id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub link: String,
}

impl NewSource {
    pub fn validate(&self) -> Result<(), StoreError> {
        validate_title(&self.title)?;
        validate_link(&self.link)
    }
}

/// Partial update of a source. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourcePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
}

impl SourcePatch {
    pub fn validate(&self) -> Result<(), StoreError> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(link) = &self.link {
            validate_link(link)?;
        }
        Ok(())
    }
}

/// An entry ready to be inserted; `published_at` is already canonical.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub source_id: i64,
    pub title: String,
    pub description: String,
    pub link: String,
    pub published_at: String,
}

fn validate_title(title: &str) -> Result<(), StoreError> {
    if title.trim().is_empty() {
        return Err(StoreError::Invalid("title is required".to_string()));
    }
    Ok(())
}

fn validate_link(link: &str) -> Result<(), StoreError> {
    if link.trim().is_empty() {
        return Err(StoreError::Invalid("link is required".to_string()));
    }
    let url = Url::parse(link)
        .map_err(|e| StoreError::Invalid(format!("link is not a valid URL: {}", e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(StoreError::Invalid(format!(
            "link must use http or https, got {}",
            other
        ))),
    }
}

/// SQLite-backed storage shared by the source and entry stores.
#[derive(Debug, Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// A private in-memory database. The pool is pinned to a single
    /// connection that never expires, since each SQLite connection would
    /// otherwise open its own empty database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                id INTEGER PRIMARY KEY,
                owner_id INTEGER,
                title TEXT NOT NULL CHECK (title <> ''),
                description TEXT NOT NULL DEFAULT '',
                link TEXT NOT NULL CHECK (link <> '')
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sources_owner ON sources(owner_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                id INTEGER PRIMARY KEY,
                source_id INTEGER NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                link TEXT NOT NULL CHECK (link <> ''),
                published_at TEXT NOT NULL,
                read_at TEXT,
                UNIQUE(source_id, link)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_entries_source_published
            ON entries(source_id, published_at, id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
