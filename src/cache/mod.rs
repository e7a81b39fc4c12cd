//! 响应缓存模块：短 TTL 的内存缓存，减少重复请求。
//!
//! # Response Caching Module
//!
//! Short-lived response caching keyed by request identity.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`RequestKey`] | `(method, normalized URL, auth attached, override)` identity |
//! | [`ResponseCache`] | In-memory TTL store with lazy expiry and statistics |
//! | [`MAX_CACHE_TTL`] | Hard cap (15 s) applied to every TTL |
//!
//! The cache only ever holds successful responses. Failed or aborted calls
//! never write to it.

mod key;
mod store;

pub use key::{normalize_url, RequestKey};
pub use store::{CacheStats, ResponseCache, MAX_CACHE_TTL};
