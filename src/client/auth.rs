//! Bearer token sources.

use async_trait::async_trait;

/// Supplies the bearer token attached to outgoing requests.
///
/// Returning `None` sends the request unauthenticated; the request key then
/// records that no token was attached.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Option<String>;
}

pub struct NoToken;

#[async_trait]
impl TokenSource for NoToken {
    async fn token(&self) -> Option<String> {
        None
    }
}

pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.clone())
        }
    }
}

/// Reads the token from an environment variable on every call
/// (`SIMRUN_API_TOKEN` by default).
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvToken {
    fn default() -> Self {
        Self::new("SIMRUN_API_TOKEN")
    }
}

#[async_trait]
impl TokenSource for EnvToken {
    async fn token(&self) -> Option<String> {
        std::env::var(&self.var)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token() {
        assert_eq!(StaticToken::new("abc").token().await.as_deref(), Some("abc"));
        assert_eq!(StaticToken::new("").token().await, None);
        assert_eq!(NoToken.token().await, None);
    }

    #[tokio::test]
    async fn test_env_token_trims_and_ignores_blank() {
        std::env::set_var("SIMRUN_TEST_TOKEN_AUTH_RS", "  tok-1 ");
        let src = EnvToken::new("SIMRUN_TEST_TOKEN_AUTH_RS");
        assert_eq!(src.token().await.as_deref(), Some("tok-1"));
        std::env::set_var("SIMRUN_TEST_TOKEN_AUTH_RS", "   ");
        assert_eq!(src.token().await, None);
    }
}
