//! URL canonicalization — the stable key behind every deduplication decision.
//!
//! Contract: trim whitespace, lowercase scheme/host/path, strip the fragment,
//! drop tracking query parameters, strip the trailing slash (preserving the
//! root path), and merge arXiv version variants (`/abs/1234.5678v2` and
//! `/abs/1234.5678` are the same paper).

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static ARXIV_VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/(abs|pdf)/(\d+\.\d+)v\d+$").expect("valid regex"));

static ARXIV_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4}\.\d{4,5})(?:v\d+)?").expect("valid regex"));

fn is_tracking_param(name: &str) -> bool {
    name.starts_with("utm_") || name == "ref" || name == "ref_src"
}

/// Canonicalize a URL for dedup comparison. Empty input yields an empty
/// string; unparseable input is returned trimmed so it can still key a map.
pub fn canonicalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let mut url = match Url::parse(trimmed) {
        Ok(u) => u,
        Err(_) => return trimmed.to_string(),
    };

    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        let query = kept
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{k}={v}")
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
    }

    let mut path = url.path().to_lowercase();
    while path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    if path.is_empty() {
        path.push('/');
    }

    let is_arxiv = url
        .host_str()
        .is_some_and(|h| h == "arxiv.org" || h.ends_with(".arxiv.org"));
    if is_arxiv {
        if let Some(caps) = ARXIV_VERSION_RE.captures(&path) {
            path = format!("/{}/{}", &caps[1], &caps[2]);
        }
    }
    url.set_path(&path);

    url.to_string()
}

/// Extract the bare arXiv identifier (version suffix stripped) from any
/// abs/pdf URL form.
pub fn arxiv_id_from_url(url: &str) -> Option<String> {
    ARXIV_ID_RE.captures(url).map(|caps| caps[1].to_string())
}
