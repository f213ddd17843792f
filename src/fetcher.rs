use std::time::Duration;

use chrono::{DateTime, Utc};
use feed_rs::parser;
use reqwest::Client;
use tracing::{debug, info};

use crate::config::FetchConfig;
use crate::error::FetchError;

/// One item as read from a remote feed, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    pub title: String,
    pub description: String,
    pub link: String,
    /// Published (else updated) date as decoded by feed-rs. `None` when the
    /// item carries no date or one feed-rs could not read.
    pub published: Option<DateTime<Utc>>,
}

/// The entries of one fetched document, in document order.
///
/// Consumed in a single pass; fetch again to read the document again.
#[derive(Debug)]
pub struct Document {
    entries: std::vec::IntoIter<RawEntry>,
}

impl Iterator for Document {
    type Item = RawEntry;

    fn next(&mut self) -> Option<RawEntry> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl ExactSizeIterator for Document {}

pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(config: &FetchConfig) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self { client })
    }

    /// Retrieve and parse the document at `link`. A single attempt is made.
    pub async fn fetch(&self, link: &str) -> Result<Document, FetchError> {
        info!("Fetching feed: {}", link);

        let response = self.client.get(link).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        let document = parse_document(&bytes)?;
        debug!("Parsed {} entries from {}", document.len(), link);
        Ok(document)
    }
}

/// Parse raw RSS, Atom or JSON Feed bytes into a [`Document`].
pub fn parse_document(bytes: &[u8]) -> Result<Document, FetchError> {
    let parsed = parser::parse(bytes)?;

    let entries: Vec<RawEntry> = parsed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry
                .links
                .first()
                .map(|l| l.href.trim().to_string())
                .unwrap_or_default();

            let title = entry
                .title
                .map(|t| t.content)
                .unwrap_or_else(|| "Untitled".to_string());

            let description = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .unwrap_or_default();

            let published = entry.published.or(entry.updated);

            RawEntry {
                title,
                description,
                link,
                published,
            }
        })
        .collect();

    Ok(Document {
        entries: entries.into_iter(),
    })
}
