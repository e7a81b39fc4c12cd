use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "config.base_url", "poller.storage_key")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "client_builder", "memory_store")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the orchestration core.
///
/// Every failure a caller can observe maps onto the `{status, message, details}`
/// shape through [`Error::status`], [`Error::message`] and [`Error::details`].
/// The type is `Clone` so a single deduplicated call can hand the same failure
/// to every waiter.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// No response was received (DNS, connect, TLS, reset, transport timeout).
    #[error("Network error: {message}")]
    Network { message: String },

    /// The server answered with a non-2xx status.
    #[error("{message}")]
    Http {
        status: u16,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// A 2xx response whose body could not be decoded.
    #[error("Malformed response body (HTTP {status}): {message}")]
    Decode { status: u16, message: String },

    /// The caller cancelled the request.
    #[error("Request aborted")]
    Aborted,

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Storage error: {message}{}", format_context(.context))]
    Storage {
        message: String,
        context: ErrorContext,
    },

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn network(msg: impl Into<String>) -> Self {
        Error::Network {
            message: msg.into(),
        }
    }

    pub fn http(status: u16, msg: impl Into<String>, details: Option<serde_json::Value>) -> Self {
        Error::Http {
            status,
            message: msg.into(),
            details,
        }
    }

    /// Create a new runtime error with structured context
    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Create a new storage error with structured context
    pub fn storage_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Storage {
            message: msg.into(),
            context,
        }
    }

    /// HTTP status carried by this error; `0` when no response was received.
    pub fn status(&self) -> u16 {
        match self {
            Error::Http { status, .. } | Error::Decode { status, .. } => *status,
            _ => 0,
        }
    }

    /// Short human-readable message, without the variant prefix used by `Display`.
    pub fn message(&self) -> String {
        match self {
            Error::Network { message }
            | Error::Http { message, .. }
            | Error::Decode { message, .. }
            | Error::Configuration { message, .. }
            | Error::Storage { message, .. }
            | Error::Runtime { message, .. } => message.clone(),
            Error::Aborted => "Request aborted".to_string(),
        }
    }

    /// Parsed error body of an HTTP failure, if it was JSON.
    pub fn details(&self) -> Option<&serde_json::Value> {
        match self {
            Error::Http { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted)
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network { .. })
    }

    /// 401/403 responses. Consumers typically restart the sign-in flow on these.
    pub fn is_auth_error(&self) -> bool {
        matches!(self.status(), 401 | 403)
    }

    /// Whether an identical retry has a reasonable chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network { .. } => true,
            Error::Http { status, .. } => matches!(*status, 408 | 429) || *status >= 500,
            _ => false,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Storage { context, .. }
            | Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }
}

impl From<crate::transport::TransportError> for Error {
    fn from(err: crate::transport::TransportError) -> Self {
        match err {
            crate::transport::TransportError::Http(e) if e.is_timeout() => {
                Error::network(format!("request timed out: {}", e))
            }
            other => Error::network(other.to_string()),
        }
    }
}
