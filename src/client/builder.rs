use super::auth::{EnvToken, TokenSource};
use super::core::RequestClient;
use super::inflight::InflightRegistry;
use crate::cache::ResponseCache;
use crate::telemetry::RequestObserver;
use crate::transport::{HttpTransport, Transport, TransportConfig};
use crate::{Error, ErrorContext, Result};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Resolved client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relative request paths are joined onto this URL.
    pub base_url: Url,
    /// TTL applied to GET calls that do not set one. Zero keeps caching opt-in.
    pub default_get_ttl: Duration,
    pub cache_capacity: usize,
}

/// Builder for creating clients with custom configuration.
///
/// Keep this surface area small and predictable (developer-friendly).
/// Settings not given explicitly fall back to env:
/// - `SIMRUN_API_BASE_URL`
/// - `SIMRUN_DEFAULT_GET_TTL_MS` (default 0)
/// - transport knobs, see [`TransportConfig::from_env`]
pub struct RequestClientBuilder {
    base_url: Option<String>,
    default_get_ttl: Option<Duration>,
    cache_capacity: usize,
    transport: Option<Arc<dyn Transport>>,
    transport_config: Option<TransportConfig>,
    tokens: Arc<dyn TokenSource>,
    observer: Arc<dyn RequestObserver>,
}

impl RequestClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            default_get_ttl: None,
            cache_capacity: 256,
            transport: None,
            transport_config: None,
            tokens: Arc::new(EnvToken::default()),
            observer: crate::telemetry::noop_observer(),
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn default_get_ttl(mut self, ttl: Duration) -> Self {
        self.default_get_ttl = Some(ttl);
        self
    }

    pub fn cache_capacity(mut self, n: usize) -> Self {
        self.cache_capacity = n.max(1);
        self
    }

    /// Inject a transport. Tests use this to script responses.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Configure the default reqwest transport (ignored when a transport is injected).
    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = Some(config);
        self
    }

    /// Inject a bearer token source. Default reads `SIMRUN_API_TOKEN`.
    pub fn token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = tokens;
        self
    }

    /// Inject a request observer. Default is a no-op observer.
    pub fn observer(mut self, observer: Arc<dyn RequestObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn build(self) -> Result<RequestClient> {
        let raw_base = self
            .base_url
            .or_else(|| std::env::var("SIMRUN_API_BASE_URL").ok())
            .ok_or_else(|| {
                Error::configuration_with_context(
                    "base URL is required",
                    ErrorContext::new()
                        .with_field_path("client.base_url")
                        .with_details("set it on the builder or via SIMRUN_API_BASE_URL")
                        .with_source("client_builder"),
                )
            })?;
        let base_url = Url::parse(&raw_base).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid base URL: {}", e),
                ErrorContext::new()
                    .with_field_path("client.base_url")
                    .with_details(raw_base.clone())
                    .with_source("client_builder"),
            )
        })?;

        let default_get_ttl = self.default_get_ttl.unwrap_or_else(|| {
            std::env::var("SIMRUN_DEFAULT_GET_TTL_MS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(Duration::ZERO)
        });

        let transport = match self.transport {
            Some(t) => t,
            None => {
                let cfg = self
                    .transport_config
                    .unwrap_or_else(TransportConfig::from_env)
                    .with_origin(base_url.clone());
                Arc::new(HttpTransport::new(&cfg).map_err(Error::from)?) as Arc<dyn Transport>
            }
        };

        Ok(RequestClient {
            config: ClientConfig {
                base_url,
                default_get_ttl,
                cache_capacity: self.cache_capacity,
            },
            transport,
            tokens: self.tokens,
            cache: Arc::new(ResponseCache::new(self.cache_capacity)),
            inflight: Arc::new(InflightRegistry::new()),
            observer: self.observer,
        })
    }
}

impl Default for RequestClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
