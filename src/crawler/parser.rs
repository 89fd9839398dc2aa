//! HTML extraction for catalog pages
//!
//! This module turns raw page bodies into records:
//! - listing pages into search-result items plus the next-page marker
//! - detail pages into `DetailFields`
//! - original-text pages into the text of the norm
//!
//! The orchestrator only sees the `PageExtractor` trait; `CatalogExtractor`
//! holds all selector knowledge about the catalog's markup.

use crate::record::{non_empty, DetailFields, SearchResultItem};
use crate::url::resolve_reference;
use scraper::{ElementRef, Html, Selector};
use std::borrow::Cow;
use thiserror::Error;
use url::Url;

/// Errors raised while extracting a page
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("malformed page: {reason}")]
    Malformed { reason: String },

    #[error("invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },
}

/// Items and pagination marker extracted from one listing page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    pub items: Vec<SearchResultItem>,

    /// Raw "next page" reference, relative to the listing page it came from
    pub next_page_ref: Option<String>,
}

/// Turns page bodies into structured records
///
/// Listing extraction distinguishes a well-formed page that simply has no
/// items (`Ok` with an empty list) from a body that cannot be a listing page
/// at all (`Err(ExtractError::Malformed)`). A detail body with no content is
/// malformed too; otherwise detail and original-text fields that cannot be
/// found are simply absent.
pub trait PageExtractor: Send + Sync {
    fn extract_search_results(&self, body: &[u8]) -> Result<SearchPage, ExtractError>;

    fn extract_detail(&self, body: &[u8]) -> Result<DetailFields, ExtractError>;

    fn extract_original_text(&self, body: &[u8]) -> Option<String>;
}

const ITEM: &str = ".busca-resultados__item";
const ITEM_ANCHOR: &str = ".busca-resultados__cabecalho a";
const ITEM_DESCRIPTION: &str = ".busca-resultados__descricao";
const ITEM_STATUS: &str = ".busca-resultados__situacao";
const PAGINATION_LINK: &str = ".pagination-list__nav-link";
const DETAIL_TITLE: &str = ".dadosNorma h1";
const DETAIL_ABSTRACT: &str = ".dadosNorma .ementa";
const ORIGINAL_TEXT_LINK: &str = ".dadosNorma a[href*=\"publicacaooriginal\"]";
const SOURCE_PROPOSAL_LINK: &str = ".dadosNorma a[href*=\"Prop_Detalhe\"]";
const DETAIL_SESSION: &str = ".dadosNorma .sessao";
const SUBJECT_TAGS: &str = ".dadosNorma .grupoRetratil .corpo";
const ORIGINAL_TEXT: &str = ".textoNorma";

const NEXT_PAGE_LABEL: &str = "Próxima";
const STATUS_LABEL: &str = "Situação:";
const ORIGIN_LABEL: &str = "Origem:";
const ABSTRACT_LABEL: &str = "EMENTA:";

struct Selectors {
    item: Selector,
    item_anchor: Selector,
    item_description: Selector,
    item_status: Selector,
    pagination_link: Selector,
    detail_title: Selector,
    detail_abstract: Selector,
    original_text_link: Selector,
    source_proposal_link: Selector,
    detail_session: Selector,
    subject_tags: Selector,
    original_text: Selector,
}

impl Selectors {
    fn parse() -> Result<Self, ExtractError> {
        Ok(Self {
            item: selector(ITEM)?,
            item_anchor: selector(ITEM_ANCHOR)?,
            item_description: selector(ITEM_DESCRIPTION)?,
            item_status: selector(ITEM_STATUS)?,
            pagination_link: selector(PAGINATION_LINK)?,
            detail_title: selector(DETAIL_TITLE)?,
            detail_abstract: selector(DETAIL_ABSTRACT)?,
            original_text_link: selector(ORIGINAL_TEXT_LINK)?,
            source_proposal_link: selector(SOURCE_PROPOSAL_LINK)?,
            detail_session: selector(DETAIL_SESSION)?,
            subject_tags: selector(SUBJECT_TAGS)?,
            original_text: selector(ORIGINAL_TEXT)?,
        })
    }
}

fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Selector {
        selector: css.to_string(),
        message: e.to_string(),
    })
}

/// Extractor for the Câmara dos Deputados legislation catalog
pub struct CatalogExtractor {
    detail_base: Url,
    selectors: Selectors,
}

impl CatalogExtractor {
    /// Creates an extractor resolving item links against `detail_base`
    pub fn new(detail_base: Url) -> Result<Self, ExtractError> {
        Ok(Self {
            detail_base,
            selectors: Selectors::parse()?,
        })
    }

    fn parse_item(&self, element: ElementRef<'_>) -> Option<SearchResultItem> {
        let anchor = element.select(&self.selectors.item_anchor).next();
        let href = anchor
            .and_then(|a| a.value().attr("href"))
            .map(str::trim)
            .filter(|href| !href.is_empty());

        let Some(href) = href else {
            tracing::warn!("Skipping item with no URL in search results");
            return None;
        };

        let identity = match resolve_reference(&self.detail_base, href) {
            Ok(url) => url.to_string(),
            Err(e) => {
                tracing::warn!("Skipping item with unusable URL {}: {}", href, e);
                return None;
            }
        };

        let summary_title = anchor.map(element_text).unwrap_or_default();
        let summary_description =
            first_text(element, &self.selectors.item_description).unwrap_or_default();
        let summary_status = first_text(element, &self.selectors.item_status)
            .map(|text| strip_label(&text, STATUS_LABEL).to_string())
            .unwrap_or_default();

        Some(SearchResultItem {
            identity,
            summary_title,
            summary_description,
            summary_status,
        })
    }

    fn next_page_ref(&self, document: &Html) -> Option<String> {
        document
            .select(&self.selectors.pagination_link)
            .find(|link| element_text(*link).contains(NEXT_PAGE_LABEL))
            .and_then(|link| link.value().attr("href"))
            .map(str::trim)
            .filter(|href| !href.is_empty() && *href != "#")
            .map(str::to_string)
    }

    /// Finds the `.sessao` block whose own label starts with `label`
    fn labelled_session(&self, document: &Html, label: &str) -> Option<String> {
        let keyword = label.trim_end_matches(':');

        document
            .select(&self.selectors.detail_session)
            .find(|session| own_text(*session).trim().starts_with(keyword))
            .map(element_text)
            .and_then(|text| non_empty(strip_label(&text, label)))
    }
}

impl PageExtractor for CatalogExtractor {
    fn extract_search_results(&self, body: &[u8]) -> Result<SearchPage, ExtractError> {
        let html = non_blank(body)?;
        let document = Html::parse_document(&html);

        let items = document
            .select(&self.selectors.item)
            .filter_map(|element| self.parse_item(element))
            .collect();

        Ok(SearchPage {
            items,
            next_page_ref: self.next_page_ref(&document),
        })
    }

    fn extract_detail(&self, body: &[u8]) -> Result<DetailFields, ExtractError> {
        let html = non_blank(body)?;
        let document = Html::parse_document(&html);
        let root = document.root_element();

        let abstract_text = first_text(root, &self.selectors.detail_abstract)
            .and_then(|text| non_empty(strip_label(&text, ABSTRACT_LABEL)));

        let original_text_href = root
            .select(&self.selectors.original_text_link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .and_then(non_empty);

        let subject_tags = root
            .select(&self.selectors.subject_tags)
            .filter_map(|tag| non_empty(element_text(tag)))
            .collect();

        Ok(DetailFields {
            title: first_text(root, &self.selectors.detail_title),
            abstract_text,
            original_text_href,
            source_proposal: first_text(root, &self.selectors.source_proposal_link),
            origin: self.labelled_session(&document, ORIGIN_LABEL),
            status: self.labelled_session(&document, STATUS_LABEL),
            subject_tags,
        })
    }

    fn extract_original_text(&self, body: &[u8]) -> Option<String> {
        let html = String::from_utf8_lossy(body);
        let document = Html::parse_document(&html);

        document
            .select(&self.selectors.original_text)
            .next()
            .and_then(|element| non_empty(element.text().collect::<String>()))
    }
}

/// Decodes a body, rejecting one with nothing but whitespace in it
fn non_blank(body: &[u8]) -> Result<Cow<'_, str>, ExtractError> {
    let html = String::from_utf8_lossy(body);
    if html.trim().is_empty() {
        return Err(ExtractError::Malformed {
            reason: "empty body".to_string(),
        });
    }
    Ok(html)
}

/// Text of an element with whitespace runs collapsed to single spaces
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the element's direct text children only
fn own_text(element: ElementRef<'_>) -> String {
    element
        .children()
        .filter_map(|node| node.value().as_text())
        .map(|text| &**text)
        .collect()
}

/// Non-empty text of the first descendant matching `selector`
fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .and_then(|element| non_empty(element_text(element)))
}

/// Removes a leading label, compared case-insensitively, and trims the rest
fn strip_label<'a>(text: &'a str, label: &str) -> &'a str {
    let text = text.trim();
    let mut chars = text.char_indices();

    for expected in label.chars() {
        match chars.next() {
            Some((_, c)) if c.to_lowercase().eq(expected.to_lowercase()) => {}
            _ => return text,
        }
    }

    match chars.next() {
        Some((index, _)) => text[index..].trim(),
        None => "",
    }
}
