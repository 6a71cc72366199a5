//! Login check, metadata merge, and chapter list pagination.

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use super::{BookMetadata, ChapterRecord, MetadataError};
use crate::convert::SiteConfig;
use crate::fetch::{ContentKind, FetchRequest, SessionClient};

/// Marker the profile page carries for lapsed subscriptions.
const EXPIRED_MARKER: &str = r#"user_type":"Expired""#;

/// Keys the secondary surface overrides when it carries a value.
const SECONDARY_KEYS: [&str; 6] = [
    "authors",
    "subjects",
    "topics",
    "rights",
    "publishers",
    "web_url",
];

/// Resolves metadata for one book through a session client.
#[derive(Debug)]
pub struct MetadataResolver<'a> {
    client: &'a SessionClient,
    site: &'a SiteConfig,
}

impl<'a> MetadataResolver<'a> {
    /// Creates a resolver.
    #[must_use]
    pub fn new(client: &'a SessionClient, site: &'a SiteConfig) -> Self {
        Self { client, site }
    }

    /// Loads the profile page and fails if the session is not usable.
    ///
    /// # Errors
    ///
    /// [`MetadataError::Authentication`] on a non-success status,
    /// [`MetadataError::SubscriptionExpired`] when the page reports an
    /// expired account, [`MetadataError::Fetch`] on network failure.
    #[instrument(skip(self))]
    pub async fn check_login(&self) -> Result<(), MetadataError> {
        let url = self.site.profile_url();
        let response = self
            .client
            .fetch(&FetchRequest::new(&url, ContentKind::Document))
            .await?;
        if !response.is_success() {
            return Err(MetadataError::Authentication {
                url,
                status: response.status,
            });
        }
        if response.text().contains(EXPIRED_MARKER) {
            return Err(MetadataError::SubscriptionExpired);
        }
        debug!("session verified");
        Ok(())
    }

    /// Fetches and merges the primary and secondary metadata documents.
    ///
    /// # Errors
    ///
    /// Fails if either request fails or the primary document is not an object.
    #[instrument(skip(self))]
    pub async fn fetch_book_info(&self, book_id: &str) -> Result<BookMetadata, MetadataError> {
        let primary_url = self.site.primary_metadata_url(book_id);
        let primary: Value = self.client.fetch_json(&primary_url).await?;
        let secondary: Value = self
            .client
            .fetch_json(&self.site.secondary_metadata_url(book_id))
            .await?;

        let Value::Object(primary) = primary else {
            return Err(MetadataError::malformed(primary_url, "expected a JSON object"));
        };
        let merged = merge_metadata(primary, &secondary);
        let metadata: BookMetadata = serde_json::from_value(Value::Object(merged))
            .map_err(|e| MetadataError::malformed(&primary_url, e))?;
        info!(title = %metadata.title, "book metadata resolved");
        Ok(metadata)
    }

    /// Follows the chapter list's `next` cursor and returns every record in order.
    ///
    /// # Errors
    ///
    /// [`MetadataError::MissingChapterList`] without a start URL,
    /// [`MetadataError::MissingResults`] when a page lacks `results`.
    #[instrument(skip(self))]
    pub async fn fetch_chapters(
        &self,
        list_url: Option<&str>,
    ) -> Result<Vec<ChapterRecord>, MetadataError> {
        let mut next = list_url
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .ok_or(MetadataError::MissingChapterList)?;

        let mut chapters = Vec::new();
        let mut visited = HashSet::new();
        loop {
            if !visited.insert(next.clone()) {
                warn!(url = %next, "chapter list cursor repeats, stopping");
                break;
            }
            let mut page: Value = self.client.fetch_json(&next).await?;
            let results = match page.get_mut("results").map(Value::take) {
                Some(results @ Value::Array(_)) => results,
                _ => return Err(MetadataError::MissingResults { url: next }),
            };
            let records: Vec<ChapterRecord> =
                serde_json::from_value(results).map_err(|e| MetadataError::malformed(&next, e))?;
            debug!(url = %next, count = records.len(), "chapter page loaded");
            chapters.extend(records);

            match page.get("next").and_then(Value::as_str) {
                Some(cursor) if !cursor.is_empty() => next = cursor.to_string(),
                _ => break,
            }
        }
        Ok(chapters)
    }
}

/// Overlays the secondary document's identifying fields onto the primary.
///
/// A secondary field wins only when it holds a truthy value. `url` falls
/// back to `web_url` when absent.
#[must_use]
pub fn merge_metadata(mut primary: Map<String, Value>, secondary: &Value) -> Map<String, Value> {
    for key in SECONDARY_KEYS {
        if let Some(value) = secondary.get(key).filter(|v| is_truthy(v)) {
            primary.insert(key.to_string(), value.clone());
        }
    }
    let has_url = primary.get("url").is_some_and(is_truthy);
    if !has_url && let Some(web_url) = primary.get("web_url").filter(|v| is_truthy(v)).cloned() {
        primary.insert("url".to_string(), web_url);
    }
    primary
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
