//! Record types flowing through a harvest run
//!
//! - `SearchResultItem`: one entry of a listing page, keyed by its identity
//! - `DetailFields` / `DetailRecord`: what a detail page (and its optional
//!   original-text page) yields for an item
//! - `LegislationRecord`: the persisted unit, the merge of the two

mod legislation;

pub use legislation::LegislationRecord;

/// One item extracted from a listing page
///
/// The identity is the canonical absolute URL of the item's detail page and
/// is the key for both dedup and persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResultItem {
    pub identity: String,
    pub summary_title: String,
    pub summary_description: String,
    pub summary_status: String,
}

/// Fields extracted from a detail page
///
/// Every field is optional; the extractor maps empty text to `None`.
/// `original_text_href` is the raw link as found on the page, resolved
/// against the item identity by the resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailFields {
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub original_text_href: Option<String>,
    pub source_proposal: Option<String>,
    pub origin: Option<String>,
    pub status: Option<String>,
    pub subject_tags: Vec<String>,
}

/// A resolved detail page for one identity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailRecord {
    pub identity: String,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub original_text_url: Option<String>,
    pub original_text: Option<String>,
    pub source_proposal: Option<String>,
    pub origin: Option<String>,
    pub status: Option<String>,
    pub subject_tags: Vec<String>,
}

impl DetailRecord {
    /// Builds a detail record from extracted fields
    ///
    /// The original-text URL and body are filled in separately because they
    /// come from a second, dependent fetch.
    pub fn from_fields(identity: impl Into<String>, fields: DetailFields) -> Self {
        Self {
            identity: identity.into(),
            title: fields.title,
            abstract_text: fields.abstract_text,
            original_text_url: None,
            original_text: None,
            source_proposal: fields.source_proposal,
            origin: fields.origin,
            status: fields.status,
            subject_tags: fields.subject_tags,
        }
    }
}

/// Returns `None` for empty or whitespace-only text, the trimmed text otherwise
pub fn non_empty(text: impl AsRef<str>) -> Option<String> {
    let trimmed = text.as_ref().trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
