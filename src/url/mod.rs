//! URL handling module for Legis-Harvest
//!
//! Catalog pages hand out relative links: pagination markers relative to the
//! current listing page, item links relative to the detail host, and
//! original-text links relative to the item page. This module resolves them
//! and turns them into the canonical identities used for dedup and storage.

mod normalize;

pub use normalize::{canonical_identity, resolve_reference};
