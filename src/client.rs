//! Request client: cache, in-flight coalescing and typed errors over a pluggable transport.
//!
//! Developer-friendly goal: keep the public surface small and predictable.
//! Implementation details are split into submodules under `src/client/`.

mod auth;
pub mod builder;
pub mod core;
pub mod descriptor;
mod error_message;
mod inflight;

pub use auth::{EnvToken, NoToken, StaticToken, TokenSource};
pub use builder::{ClientConfig, RequestClientBuilder};
pub use core::RequestClient;
pub use descriptor::RequestDescriptor;
