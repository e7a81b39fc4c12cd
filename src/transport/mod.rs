//! 传输层：抽象出发送单个 HTTP 请求的最小接口。
//!
//! # Transport Module
//!
//! The request client never talks to `reqwest` directly. It hands a fully
//! prepared [`TransportRequest`] to a [`Transport`] and gets back status,
//! headers and raw body bytes. [`HttpTransport`] is the production
//! implementation; tests plug in scripted transports.
//!
//! Cancellation is expressed by dropping the future returned from
//! [`Transport::send`]; implementations must abort the underlying I/O when
//! that happens (reqwest does).

mod http;

pub use http::{HttpTransport, TransportConfig};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::Method;
use url::Url;

/// Which cookies travel with a request, mirroring the browser `credentials` modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Credentials {
    Omit,
    #[default]
    SameOrigin,
    Include,
}

/// One named part of a multipart upload.
#[derive(Debug, Clone)]
pub struct FormPart {
    pub name: String,
    pub data: Bytes,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

impl FormPart {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            filename: None,
            content_type: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(serde_json::Value),
    Text(String),
    Binary {
        data: Bytes,
        content_type: Option<String>,
    },
    Multipart(Vec<FormPart>),
}

impl RequestBody {
    /// Binary and multipart payloads carry their own content type.
    pub fn is_raw(&self) -> bool {
        matches!(self, RequestBody::Binary { .. } | RequestBody::Multipart(_))
    }
}

/// A request with URL resolved and headers already injected.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
    pub credentials: Credentials,
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Other(String),
}
