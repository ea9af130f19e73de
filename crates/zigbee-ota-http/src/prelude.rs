//! Convenience re-exports for common HTTP client types

pub use crate::cache::ExpiringCache;
pub use crate::client::{CachedResponse, CachingClient, CachingClientConfig};
pub use crate::error::HttpError;
pub use reqwest::header::HeaderMap;
