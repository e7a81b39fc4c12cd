use super::auth::TokenSource;
use super::builder::ClientConfig;
use super::descriptor::RequestDescriptor;
use super::error_message::extract_message;
use super::inflight::{CallOutput, InflightRegistry};
use crate::cache::{RequestKey, ResponseCache};
use crate::telemetry::{RequestEvent, RequestObserver, RequestOutcome};
use crate::transport::{Transport, TransportRequest, TransportResponse};
use crate::{Error, ErrorContext, Result};
use futures::future::{BoxFuture, FutureExt};
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

/// Request client with response caching and in-flight coalescing.
///
/// One instance is meant to be shared (`Arc<RequestClient>`) by every consumer
/// in a process. Its cache and in-flight registry are private to the
/// instance, so tests can build isolated clients.
///
/// Resolution order for a call:
/// 1. live cache entry (no network),
/// 2. identical call already in flight (joined, no new network call),
/// 3. new transport call; success is cached for the effective TTL.
pub struct RequestClient {
    pub(crate) config: ClientConfig,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) tokens: Arc<dyn TokenSource>,
    pub(crate) cache: Arc<ResponseCache>,
    pub(crate) inflight: Arc<InflightRegistry>,
    pub(crate) observer: Arc<dyn RequestObserver>,
}

impl RequestClient {
    pub fn builder() -> super::builder::RequestClientBuilder {
        super::builder::RequestClientBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The response cache, for explicit invalidation after mutations.
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Drop cached responses whose URL starts with `path_prefix` resolved
    /// against the base URL. Returns the number of entries removed.
    pub fn invalidate_path(&self, path_prefix: &str) -> Result<usize> {
        let url = self.resolve_url(path_prefix)?;
        let removed = self.cache.invalidate_prefix(url.as_str());
        debug!(prefix = url.as_str(), removed, "cache invalidated");
        Ok(removed)
    }

    /// Number of distinct calls currently executing with deduplication enabled.
    pub fn inflight_len(&self) -> usize {
        self.inflight.len()
    }

    /// Execute a call and deserialize the JSON body into `T`.
    pub async fn execute<T: DeserializeOwned>(&self, descriptor: RequestDescriptor) -> Result<T> {
        let (status, value) = self.execute_call(descriptor).await?;
        serde_json::from_value(value).map_err(|e| Error::Decode {
            status,
            message: e.to_string(),
        })
    }

    /// Execute a call and return the decoded body as raw JSON.
    ///
    /// Empty bodies decode to `null`, non-JSON text to a JSON string.
    pub async fn execute_value(&self, descriptor: RequestDescriptor) -> Result<serde_json::Value> {
        self.execute_call(descriptor).await.map(|(_, value)| value)
    }

    /// Cache hits report status 200.
    async fn execute_call(&self, descriptor: RequestDescriptor) -> CallOutput {
        let start = Instant::now();

        if descriptor
            .cancel
            .as_ref()
            .map(|t| t.is_cancelled())
            .unwrap_or(false)
        {
            self.observe(&descriptor, RequestOutcome::Aborted, start);
            return Err(Error::Aborted);
        }

        let url = self.resolve_url(&descriptor.path)?;
        let token = if descriptor.skip_auth {
            None
        } else {
            self.tokens.token().await
        };
        let key = RequestKey::new(
            &descriptor.method,
            &url,
            token.is_some(),
            descriptor.dedupe_key.as_deref(),
        );
        let ttl = descriptor.effective_ttl(self.config.default_get_ttl);

        if ttl.is_some() {
            if let Some(value) = self.cache.get(&key) {
                debug!(key = %key, "cache hit");
                self.observe(&descriptor, RequestOutcome::Cache, start);
                return Ok((200, value));
            }
        }

        let request = self.prepare(&descriptor, url, token.as_deref())?;
        let cache_slot = ttl.map(|ttl| (key.clone(), ttl));

        let (call, joined): (BoxFuture<'static, CallOutput>, bool) = if descriptor.dedupe_enabled() {
            let (shared, joined) = self
                .inflight
                .join_or_start(key.clone(), || self.network_call(request, cache_slot));
            if joined {
                debug!(key = %key, "joined in-flight request");
            }
            (shared.boxed(), joined)
        } else {
            (self.network_call(request, cache_slot), false)
        };

        let output = match &descriptor.cancel {
            Some(token) => tokio::select! {
                out = call => Some(out),
                _ = token.cancelled() => None,
            },
            None => Some(call.await),
        };

        let Some(output) = output else {
            debug!(key = %key, "request aborted by caller");
            self.observe(&descriptor, RequestOutcome::Aborted, start);
            return Err(Error::Aborted);
        };

        let outcome = if joined {
            RequestOutcome::Dedupe
        } else {
            match &output {
                Ok((status, _)) => RequestOutcome::Status(*status),
                Err(Error::Network { .. }) => RequestOutcome::Network,
                Err(Error::Aborted) => RequestOutcome::Aborted,
                Err(e) => RequestOutcome::Status(e.status()),
            }
        };
        self.observe(&descriptor, outcome, start);

        // The starter's cache slot governs the shared call; a joiner that asked
        // for caching stores the result itself when the starter did not.
        if joined {
            if let (Ok((_, value)), Some(ttl)) = (&output, ttl) {
                if !self.cache.contains(&key) {
                    self.cache.insert(key.clone(), value.clone(), ttl);
                }
            }
        }

        if let Err(e) = &output {
            if !joined {
                info!(
                    method = descriptor.method.as_str(),
                    path = descriptor.path.as_str(),
                    http_status = e.status(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "request failed: {}",
                    e.message()
                );
            }
        }

        output
    }

    fn resolve_url(&self, path: &str) -> Result<Url> {
        self.config.base_url.join(path).map_err(|e| {
            Error::configuration_with_context(
                format!("cannot resolve request path: {}", e),
                ErrorContext::new()
                    .with_field_path("descriptor.path")
                    .with_details(path.to_string())
                    .with_source("request_client"),
            )
        })
    }

    fn prepare(
        &self,
        descriptor: &RequestDescriptor,
        url: Url,
        token: Option<&str>,
    ) -> Result<TransportRequest> {
        let mut headers = descriptor.headers.clone();

        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                Error::configuration_with_context(
                    "bearer token contains invalid header characters",
                    ErrorContext::new().with_source("request_client"),
                )
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        let raw_body = descriptor
            .body
            .as_ref()
            .map(|b| b.is_raw())
            .unwrap_or(false);
        if !raw_body && !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        if !headers.contains_key(ACCEPT) {
            headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        }
        // Our own correlation id; the backend may echo it in its logs.
        if let Ok(id) = HeaderValue::from_str(&Uuid::new_v4().to_string()) {
            headers.insert("x-request-id", id);
        }

        Ok(TransportRequest {
            method: descriptor.method.clone(),
            url,
            headers,
            body: descriptor.body.clone(),
            credentials: descriptor.credentials,
        })
    }

    /// The actual network call. Cache population happens here, once per call,
    /// not once per waiter.
    fn network_call(
        &self,
        request: TransportRequest,
        cache_slot: Option<(RequestKey, Duration)>,
    ) -> BoxFuture<'static, CallOutput> {
        let transport = self.transport.clone();
        let cache = self.cache.clone();
        async move {
            let response = transport.send(request).await.map_err(Error::from)?;
            let (status, value) = decode_response(response)?;
            if let Some((key, ttl)) = cache_slot {
                cache.insert(key, value.clone(), ttl);
            }
            Ok((status, value))
        }
        .boxed()
    }

    fn observe(&self, descriptor: &RequestDescriptor, outcome: RequestOutcome, start: Instant) {
        self.observer.observe(&RequestEvent {
            method: descriptor.method.as_str().to_string(),
            path: descriptor.path.clone(),
            outcome,
            elapsed: start.elapsed(),
        });
    }
}

fn decode_response(response: TransportResponse) -> CallOutput {
    let status = response.status;

    if !response.is_success() {
        let details = serde_json::from_slice::<serde_json::Value>(&response.body).ok();
        let message = extract_message(status, details.as_ref());
        return Err(Error::http(status, message, details));
    }

    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok((status, serde_json::Value::Null));
    }

    let declared_json = response
        .content_type()
        .map(|ct| ct.to_ascii_lowercase().contains("json"))
        .unwrap_or(false);

    match serde_json::from_slice::<serde_json::Value>(&response.body) {
        Ok(value) => Ok((status, value)),
        Err(e) if declared_json => Err(Error::Decode {
            status,
            message: e.to_string(),
        }),
        Err(_) => Ok((
            status,
            serde_json::Value::String(String::from_utf8_lossy(&response.body).into_owned()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use reqwest::header::HeaderMap;
    use serde_json::json;

    fn response(status: u16, content_type: Option<&str>, body: &str) -> TransportResponse {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_str(ct).unwrap());
        }
        TransportResponse {
            status,
            headers,
            body: Bytes::from(body.to_string()),
        }
    }

    #[test]
    fn test_decode_success_shapes() {
        assert_eq!(
            decode_response(response(200, Some("application/json"), r#"{"a":1}"#)).unwrap(),
            (200, json!({"a": 1}))
        );
        assert_eq!(
            decode_response(response(204, None, "")).unwrap(),
            (204, serde_json::Value::Null)
        );
        assert_eq!(
            decode_response(response(200, Some("text/plain"), "ok")).unwrap(),
            (200, json!("ok"))
        );
    }

    #[test]
    fn test_decode_malformed_json_is_typed() {
        let err = decode_response(response(200, Some("application/json"), "{nope")).unwrap_err();
        assert!(matches!(err, Error::Decode { status: 200, .. }));
    }

    #[test]
    fn test_decode_http_error_extracts_message() {
        let err = decode_response(response(
            409,
            Some("application/json"),
            r#"{"detail":"Invite already claimed"}"#,
        ))
        .unwrap_err();
        assert_eq!(err.status(), 409);
        assert_eq!(err.message(), "Invite already claimed");
        assert_eq!(err.details(), Some(&json!({"detail": "Invite already claimed"})));

        let err = decode_response(response(500, Some("text/html"), "<h1>oops</h1>")).unwrap_err();
        assert_eq!(err.message(), "Request failed with status 500");
        assert!(err.details().is_none());
    }
}
