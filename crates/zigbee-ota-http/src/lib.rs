//! Caching HTTP client for OTA index and image downloads
//!
//! Vendor index servers are polled by many devices at once and firmware
//! images are large. This crate keeps the number of round-trips down:
//! - Identical concurrent requests collapse into one network call
//! - Successful responses are cached for a caller-chosen duration
//! - Requests run detached from the caller, so a cancelled caller does not
//!   abort a download other callers are waiting on
//!
//! # Architecture
//!
//! - [`cache`]: Generic key/value cache with per-entry expiry
//! - [`client`]: The coalescing, caching client
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use zigbee_ota_http::prelude::*;
//!
//! # async fn example() -> Result<(), HttpError> {
//! let client = CachingClient::with_defaults()?;
//! let index: serde_json::Value = client
//!     .get_url("https://fw.example.com/index.json", Duration::from_secs(300))
//!     .await?
//!     .error_for_status()?
//!     .json()?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod cache;
pub mod client;
pub mod error;
pub mod prelude;

pub use cache::ExpiringCache;
pub use client::{
    CachedResponse, CachingClient, CachingClientConfig, DEFAULT_USER_AGENT, RequestKey,
};
pub use error::{HttpError, Result};
pub use reqwest::header::HeaderMap;
