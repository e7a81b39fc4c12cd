use super::{
    Credentials, RequestBody, Transport, TransportError, TransportRequest, TransportResponse,
};
use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE, COOKIE};
use reqwest::Proxy;
use std::env;
use std::time::Duration;
use url::Url;

/// Knobs for the reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub proxy_url: Option<String>,
    /// Raw `Cookie` header value forwarded according to [`Credentials`].
    pub session_cookie: Option<String>,
    /// Origin that `Credentials::SameOrigin` compares against.
    pub origin: Option<Url>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 32,
            proxy_url: None,
            session_cookie: None,
            origin: None,
        }
    }
}

impl TransportConfig {
    /// Minimal production-friendly defaults (env-overridable).
    pub fn from_env() -> Self {
        let timeout_secs = env::var("SIMRUN_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(30);
        let pool_max_idle_per_host = env::var("SIMRUN_HTTP_POOL_MAX_IDLE_PER_HOST")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(32);
        Self {
            timeout: Duration::from_secs(timeout_secs),
            pool_max_idle_per_host,
            proxy_url: env::var("SIMRUN_PROXY_URL").ok(),
            session_cookie: env::var("SIMRUN_SESSION_COOKIE").ok(),
            origin: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_session_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.session_cookie = Some(cookie.into());
        self
    }

    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = Some(origin);
        self
    }
}

pub struct HttpTransport {
    client: reqwest::Client,
    session_cookie: Option<String>,
    origin: Option<Url>,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        if let Some(proxy_url) = &config.proxy_url {
            if let Ok(proxy) = Proxy::all(proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder.build()?;

        Ok(Self {
            client,
            session_cookie: config.session_cookie.clone(),
            origin: config.origin.clone(),
        })
    }

    fn cookie_for(&self, request: &TransportRequest) -> Option<&str> {
        let cookie = self.session_cookie.as_deref()?;
        match request.credentials {
            Credentials::Omit => None,
            Credentials::Include => Some(cookie),
            Credentials::SameOrigin => {
                let origin = self.origin.as_ref()?;
                (origin.origin() == request.url.origin()).then_some(cookie)
            }
        }
    }

    fn build_form(parts: Vec<super::FormPart>) -> Result<reqwest::multipart::Form, TransportError> {
        let mut form = reqwest::multipart::Form::new();
        for part in parts {
            let mut p = reqwest::multipart::Part::bytes(part.data.to_vec());
            if let Some(filename) = part.filename {
                p = p.file_name(filename);
            }
            if let Some(ct) = part.content_type {
                p = p.mime_str(&ct)?;
            }
            form = form.part(part.name, p);
        }
        Ok(form)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let mut req = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());

        if let Some(cookie) = self.cookie_for(&request) {
            if let Ok(value) = HeaderValue::from_str(cookie) {
                req = req.header(COOKIE, value);
            }
        }

        req = match request.body {
            None => req,
            Some(RequestBody::Json(value)) => {
                let bytes = serde_json::to_vec(&value)
                    .map_err(|e| TransportError::Other(e.to_string()))?;
                req.body(bytes)
            }
            Some(RequestBody::Text(text)) => req.body(text),
            Some(RequestBody::Binary { data, content_type }) => {
                let req = match content_type {
                    Some(ct) if !request.headers.contains_key(CONTENT_TYPE) => {
                        req.header(CONTENT_TYPE, ct)
                    }
                    _ => req,
                };
                req.body(data)
            }
            Some(RequestBody::Multipart(parts)) => req.multipart(Self::build_form(parts)?),
        };

        let response = req.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;
    use reqwest::Method;

    fn request(url: &str, credentials: Credentials) -> TransportRequest {
        TransportRequest {
            method: Method::GET,
            url: Url::parse(url).unwrap(),
            headers: HeaderMap::new(),
            body: None,
            credentials,
        }
    }

    fn transport() -> HttpTransport {
        let config = TransportConfig::default()
            .with_session_cookie("appSession=abc")
            .with_origin(Url::parse("https://app.example.com").unwrap());
        HttpTransport::new(&config).unwrap()
    }

    #[test]
    fn test_cookie_follows_credentials_mode() {
        let t = transport();
        let same = request("https://app.example.com/api/tasks", Credentials::SameOrigin);
        let cross = request("https://ci.example.net/runs", Credentials::SameOrigin);
        let include = request("https://ci.example.net/runs", Credentials::Include);
        let omit = request("https://app.example.com/api/tasks", Credentials::Omit);

        assert_eq!(t.cookie_for(&same), Some("appSession=abc"));
        assert_eq!(t.cookie_for(&cross), None);
        assert_eq!(t.cookie_for(&include), Some("appSession=abc"));
        assert_eq!(t.cookie_for(&omit), None);
    }

    #[test]
    fn test_default_config() {
        let cfg = TransportConfig::default();
        assert_eq!(cfg.timeout, Duration::from_secs(30));
        assert_eq!(cfg.pool_max_idle_per_host, 32);
        assert!(cfg.session_cookie.is_none());
    }
}
