use crate::UrlError;
use url::Url;

/// Tracking query parameters dropped from identities
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid"];

/// Canonicalises an absolute catalog URL into an item identity
///
/// # Canonicalisation Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Require an http or https scheme and a host
/// 3. Remove the fragment (everything after #)
/// 4. Remove tracking query parameters, keeping the order of the rest
/// 5. Remove the query string if nothing is left in it
///
/// Host and path are preserved as-is: the identity is also the URL the
/// detail page is fetched from, so it must stay dereferenceable.
///
/// # Examples
///
/// ```
/// use legis_harvest::url::canonical_identity;
///
/// let url = canonical_identity("https://www2.example.org/norma/123.html?utm_source=x#top").unwrap();
/// assert_eq!(url.as_str(), "https://www2.example.org/norma/123.html");
/// ```
pub fn canonical_identity(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;
    canonicalize(url)
}

/// Resolves a possibly-relative reference against `base` and canonicalises it
///
/// Absolute references are taken as they are; everything else is joined the
/// way a browser would follow the link from `base`.
pub fn resolve_reference(base: &Url, reference: &str) -> Result<Url, UrlError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(UrlError::Parse("empty reference".to_string()));
    }

    let joined = base
        .join(reference)
        .map_err(|e| UrlError::Parse(format!("{}: {}", reference, e)))?;
    canonicalize(joined)
}

fn canonicalize(mut url: Url) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    url.set_fragment(None);

    // Only rewrite the query when something is dropped, so the remaining
    // parameters keep their original encoding.
    if url.query_pairs().any(|(key, _)| is_tracking_param(&key)) {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !is_tracking_param(key))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    Ok(url)
}

/// Checks if a query parameter is a tracking parameter
fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}
