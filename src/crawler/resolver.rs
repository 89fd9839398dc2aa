//! Detail resolution for a single search-result item
//!
//! One resolution performs up to two dependent fetches: the item's detail
//! page and, when the detail page links to one, its original-text page.

use crate::crawler::fetcher::ResilientFetcher;
use crate::crawler::parser::PageExtractor;
use crate::record::{DetailFields, DetailRecord, LegislationRecord, SearchResultItem};
use crate::url::resolve_reference;
use chrono::Utc;
use std::sync::Arc;
use url::Url;

/// How far a resolution got
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Detail page fetched, and original text fetched when linked
    Complete,

    /// Detail page fetched but the linked original text could not be obtained
    MissingOriginalText,

    /// Detail page unavailable; the record is a minimal one
    DetailUnavailable,
}

/// A resolved record plus how it was obtained
#[derive(Debug, Clone)]
pub struct Resolution {
    pub record: LegislationRecord,
    pub outcome: ResolveOutcome,
}

impl Resolution {
    pub fn is_failure(&self) -> bool {
        self.outcome == ResolveOutcome::DetailUnavailable
    }
}

/// Resolves search-result items into full legislation records
///
/// Cheap to share: every pooled task holds an `Arc` to the same resolver.
pub struct DetailResolver {
    fetcher: Arc<ResilientFetcher>,
    extractor: Arc<dyn PageExtractor>,
}

impl DetailResolver {
    pub fn new(fetcher: Arc<ResilientFetcher>, extractor: Arc<dyn PageExtractor>) -> Self {
        Self { fetcher, extractor }
    }

    /// Resolves one item
    ///
    /// Never fails: an unavailable or empty detail page yields a minimal
    /// record flagged with `fetch_error`, and a failed original-text fetch only
    /// leaves the original text absent.
    pub async fn resolve(&self, item: SearchResultItem) -> Resolution {
        let fields = match self.fetch_detail(&item.identity).await {
            Ok(fields) => fields,
            Err(reason) => {
                tracing::warn!(
                    url = %item.identity,
                    "Detail page unavailable, storing minimal record: {}",
                    reason
                );
                return Resolution {
                    record: LegislationRecord::minimal(item, Utc::now()),
                    outcome: ResolveOutcome::DetailUnavailable,
                };
            }
        };

        let original_href = fields.original_text_href.clone();
        let mut detail = DetailRecord::from_fields(item.identity.as_str(), fields);

        let outcome = match original_href {
            Some(href) => self.resolve_original_text(&mut detail, &href).await,
            None => ResolveOutcome::Complete,
        };

        Resolution {
            record: LegislationRecord::merge(item, detail, Utc::now()),
            outcome,
        }
    }

    async fn fetch_detail(&self, identity: &str) -> Result<DetailFields, String> {
        let body = self.fetcher.fetch(identity).await.map_err(|e| e.to_string())?;
        self.extractor
            .extract_detail(&body)
            .map_err(|e| e.to_string())
    }

    async fn resolve_original_text(&self, detail: &mut DetailRecord, href: &str) -> ResolveOutcome {
        let url = match Url::parse(&detail.identity)
            .map_err(|e| e.to_string())
            .and_then(|base| resolve_reference(&base, href).map_err(|e| e.to_string()))
        {
            Ok(url) => url.to_string(),
            Err(e) => {
                tracing::warn!(
                    url = %detail.identity,
                    "Unusable original text link '{}': {}",
                    href,
                    e
                );
                return ResolveOutcome::MissingOriginalText;
            }
        };

        let fetched = self.fetcher.fetch(&url).await;
        detail.original_text_url = Some(url);

        match fetched {
            Ok(body) => {
                detail.original_text = self.extractor.extract_original_text(&body);
                if detail.original_text.is_some() {
                    ResolveOutcome::Complete
                } else {
                    tracing::warn!(url = %detail.identity, "Original text page has no text");
                    ResolveOutcome::MissingOriginalText
                }
            }
            Err(e) => {
                tracing::warn!(
                    url = %detail.identity,
                    "Failed to fetch original text: {}",
                    e
                );
                ResolveOutcome::MissingOriginalText
            }
        }
    }
}
