use crate::record::{non_empty, DetailRecord, SearchResultItem};
use chrono::{DateTime, Utc};

/// The persisted unit: a search result merged with its detail page
///
/// Summary fields that overlap a detail field (title, status) are only kept
/// when the detail page did not provide a value for them. A record built from
/// a failed detail fetch carries the summary fields, `fetch_error = true` and
/// `last_attempted_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegislationRecord {
    pub identity: String,
    pub summary_title: Option<String>,
    pub summary_description: Option<String>,
    pub summary_status: Option<String>,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub original_text_url: Option<String>,
    pub original_text: Option<String>,
    pub source_proposal: Option<String>,
    pub origin: Option<String>,
    pub status: Option<String>,
    pub subject_tags: Vec<String>,
    pub fetch_error: bool,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub last_attempted_at: Option<DateTime<Utc>>,
}

impl LegislationRecord {
    /// Merges a search result with its resolved detail record
    ///
    /// Detail values win over summary values for the same attribute, and the
    /// superseded summary value is dropped rather than kept alongside.
    pub fn merge(item: SearchResultItem, detail: DetailRecord, fetched_at: DateTime<Utc>) -> Self {
        let title = detail.title.and_then(non_empty);
        let status = detail.status.and_then(non_empty);

        let summary_title = if title.is_some() {
            None
        } else {
            non_empty(&item.summary_title)
        };
        let summary_status = if status.is_some() {
            None
        } else {
            non_empty(&item.summary_status)
        };

        Self {
            identity: item.identity,
            summary_title,
            summary_description: non_empty(&item.summary_description),
            summary_status,
            title,
            abstract_text: detail.abstract_text,
            original_text_url: detail.original_text_url,
            original_text: detail.original_text,
            source_proposal: detail.source_proposal,
            origin: detail.origin,
            status,
            subject_tags: detail.subject_tags,
            fetch_error: false,
            last_fetched_at: Some(fetched_at),
            last_attempted_at: None,
        }
    }

    /// Builds the minimal record stored when the detail page is unavailable
    pub fn minimal(item: SearchResultItem, attempted_at: DateTime<Utc>) -> Self {
        Self {
            identity: item.identity,
            summary_title: non_empty(&item.summary_title),
            summary_description: non_empty(&item.summary_description),
            summary_status: non_empty(&item.summary_status),
            title: None,
            abstract_text: None,
            original_text_url: None,
            original_text: None,
            source_proposal: None,
            origin: None,
            status: None,
            subject_tags: Vec::new(),
            fetch_error: true,
            last_fetched_at: None,
            last_attempted_at: Some(attempted_at),
        }
    }
}
