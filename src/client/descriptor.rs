//! Per-call request description.

use crate::transport::{Credentials, RequestBody};
use crate::{Error, ErrorContext, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Everything the client needs to know about one call. Built once, never mutated
/// by the client.
///
/// ```rust
/// use simrun_core::client::RequestDescriptor;
/// use std::time::Duration;
///
/// let d = RequestDescriptor::get("/api/candidate/simulations/42/current-task")
///     .with_cache_ttl(Duration::from_secs(5));
/// assert!(d.dedupe_enabled());
/// ```
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
    pub credentials: Credentials,
    /// Requested TTL; capped at [`crate::cache::MAX_CACHE_TTL`].
    pub cache_ttl: Option<Duration>,
    /// Extra identity folded into the dedupe/cache key. Also opts unsafe
    /// methods into deduplication.
    pub dedupe_key: Option<String>,
    pub skip_cache: bool,
    pub skip_dedupe: bool,
    pub skip_auth: bool,
    pub cancel: Option<CancellationToken>,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            credentials: Credentials::default(),
            cache_ttl: None,
            dedupe_key: None,
            skip_cache: false,
            skip_dedupe: false,
            skip_auth: false,
            cancel: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// String-typed variant of [`with_header`](Self::with_header).
    pub fn try_with_header(self, name: &str, value: &str) -> Result<Self> {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid header name: {}", e),
                ErrorContext::new()
                    .with_field_path(format!("headers.{}", name))
                    .with_source("request_descriptor"),
            )
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid header value: {}", e),
                ErrorContext::new()
                    .with_field_path(format!("headers.{}", name))
                    .with_source("request_descriptor"),
            )
        })?;
        Ok(self.with_header(header_name, header_value))
    }

    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn with_dedupe_key(mut self, key: impl Into<String>) -> Self {
        self.dedupe_key = Some(key.into());
        self
    }

    pub fn skip_cache(mut self) -> Self {
        self.skip_cache = true;
        self
    }

    pub fn skip_dedupe(mut self) -> Self {
        self.skip_dedupe = true;
        self
    }

    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn is_safe_method(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD || self.method == Method::OPTIONS
    }

    /// Safe methods coalesce by default. Mutations only coalesce when the
    /// caller names the identity explicitly with a dedupe key.
    pub fn dedupe_enabled(&self) -> bool {
        !self.skip_dedupe && (self.is_safe_method() || self.dedupe_key.is_some())
    }

    /// TTL to cache under, or `None` when this call must not touch the cache.
    pub(crate) fn effective_ttl(&self, default_get_ttl: Duration) -> Option<Duration> {
        if self.skip_cache {
            return None;
        }
        let ttl = match self.cache_ttl {
            Some(ttl) => ttl,
            None if self.method == Method::GET => default_get_ttl,
            None => Duration::ZERO,
        };
        (!ttl.is_zero()).then_some(ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupe_defaults() {
        assert!(RequestDescriptor::get("/a").dedupe_enabled());
        assert!(!RequestDescriptor::get("/a").skip_dedupe().dedupe_enabled());
        assert!(!RequestDescriptor::post("/a").dedupe_enabled());
        assert!(RequestDescriptor::post("/a")
            .with_dedupe_key("claim:abc")
            .dedupe_enabled());
    }

    #[test]
    fn test_effective_ttl() {
        let default = Duration::from_secs(2);
        assert_eq!(
            RequestDescriptor::get("/a").effective_ttl(default),
            Some(default)
        );
        assert_eq!(RequestDescriptor::get("/a").effective_ttl(Duration::ZERO), None);
        assert_eq!(RequestDescriptor::post("/a").effective_ttl(default), None);
        assert_eq!(
            RequestDescriptor::post("/a")
                .with_cache_ttl(Duration::from_secs(1))
                .effective_ttl(default),
            Some(Duration::from_secs(1))
        );
        assert_eq!(
            RequestDescriptor::get("/a")
                .with_cache_ttl(Duration::from_secs(1))
                .skip_cache()
                .effective_ttl(default),
            None
        );
    }

    #[test]
    fn test_try_with_header_rejects_invalid() {
        assert!(RequestDescriptor::get("/a")
            .try_with_header("x-trace", "abc")
            .is_ok());
        let err = RequestDescriptor::get("/a")
            .try_with_header("bad header", "abc")
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }
}
