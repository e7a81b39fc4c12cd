//! Request identity used by both the response cache and the in-flight registry.

use reqwest::Method;
use std::fmt;
use url::Url;

/// Identity of a request: `(method, normalized URL, auth attached, override)`.
///
/// Two descriptors that produce equal keys are interchangeable: they may share
/// one network call and one cached response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
    pub authed: bool,
    pub dedupe_key: Option<String>,
}

impl RequestKey {
    pub fn new(method: &Method, url: &Url, authed: bool, dedupe_key: Option<&str>) -> Self {
        Self {
            method: method.as_str().to_ascii_uppercase(),
            url: normalize_url(url),
            authed,
            dedupe_key: dedupe_key.map(str::to_string),
        }
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)?;
        if self.authed {
            f.write_str(" [auth]")?;
        }
        if let Some(k) = &self.dedupe_key {
            write!(f, " #{}", k)?;
        }
        Ok(())
    }
}

/// Canonical string form of a URL for keying.
///
/// Scheme and host are already lowercased by `url`; the fragment is dropped
/// and query pairs are sorted so `?b=2&a=1` and `?a=1&b=2` collide.
pub fn normalize_url(url: &Url) -> String {
    let mut u = url.clone();
    u.set_fragment(None);
    let mut pairs: Vec<(String, String)> = u.query_pairs().into_owned().collect();
    if pairs.is_empty() {
        u.set_query(None);
    } else {
        pairs.sort();
        u.query_pairs_mut().clear().extend_pairs(pairs);
    }
    u.to_string()
}
