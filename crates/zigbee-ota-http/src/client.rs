//! Request-coalescing, caching HTTP client
//!
//! Every GET is identified by its method, its fully resolved URL and its
//! resolved header set. A live cached response is returned directly; an
//! identical request that is already running is joined instead of being
//! issued again. New requests run as spawned tasks, so a caller that gives up
//! does not cancel the download for everyone else.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::cache::ExpiringCache;
use crate::error::{HttpError, Result};

/// Default user agent sent with every request
pub const DEFAULT_USER_AGENT: &str = concat!("zigbee-ota/", env!("CARGO_PKG_VERSION"));

/// Configuration for [`CachingClient`]
#[derive(Debug, Clone)]
pub struct CachingClientConfig {
    /// Per-request timeout
    pub timeout: Duration,
    /// User agent header
    pub user_agent: String,
    /// Headers added to every request
    pub default_headers: Vec<(String, String)>,
}

impl Default for CachingClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            default_headers: Vec::new(),
        }
    }
}

impl CachingClientConfig {
    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Add a header sent with every request
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }
}

/// A fully read response, cheap to clone
#[derive(Debug, Clone)]
pub struct CachedResponse {
    /// Final request URL
    pub url: String,
    /// Response status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Bytes,
}

impl CachedResponse {
    /// Turn a non-success status into an error
    pub fn error_for_status(self) -> Result<Self> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(HttpError::Status {
                url: self.url,
                status: self.status.as_u16(),
            })
        }
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| HttpError::Decode {
            url: self.url.clone(),
            reason: e.to_string(),
        })
    }

    /// Body as text, replacing invalid UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Canonical identity of a request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    /// HTTP method
    pub method: &'static str,
    /// URL with query parameters folded in
    pub url: String,
    /// Lower-cased header names with values, sorted
    pub headers: Vec<(String, String)>,
}

impl RequestKey {
    fn new(method: &'static str, url: &Url, headers: &HeaderMap) -> Self {
        let mut headers: Vec<(String, String)> = headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_ascii_lowercase(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        headers.sort();
        Self {
            method,
            url: url.to_string(),
            headers,
        }
    }
}

type SharedResponse = Shared<BoxFuture<'static, Result<CachedResponse>>>;

struct Inner {
    client: Client,
    default_headers: HeaderMap,
    cache: Mutex<ExpiringCache<RequestKey, CachedResponse>>,
    in_flight: Mutex<HashMap<RequestKey, SharedResponse>>,
}

/// HTTP client that collapses identical concurrent requests and caches
/// successful responses
///
/// Cloning is cheap; clones share the cache and the in-flight table.
#[derive(Clone)]
pub struct CachingClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CachingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingClient")
            .field("cached", &self.inner.cache.lock().len())
            .field("in_flight", &self.inner.in_flight.lock().len())
            .finish()
    }
}

fn parse_headers(pairs: &[(String, String)]) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| HttpError::InvalidHeader(format!("{name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| HttpError::InvalidHeader(format!("{name}: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

impl CachingClient {
    /// Create a client with the given configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a configured header is invalid or the underlying
    /// HTTP client fails to initialize.
    pub fn new(config: CachingClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| HttpError::Client(e.to_string()))?;

        let mut default_headers = parse_headers(&config.default_headers)?;
        let user_agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|e| HttpError::InvalidHeader(format!("user-agent: {e}")))?;
        default_headers.insert(USER_AGENT, user_agent);

        Ok(Self::with_client(client, default_headers))
    }

    /// Create a client with default configuration
    pub fn with_defaults() -> Result<Self> {
        Self::new(CachingClientConfig::default())
    }

    /// Wrap an existing `reqwest` client
    pub fn with_client(client: Client, default_headers: HeaderMap) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                default_headers,
                cache: Mutex::new(ExpiringCache::new()),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// GET `url` with no extra parameters or headers
    pub async fn get_url(&self, url: &str, cache_for: Duration) -> Result<CachedResponse> {
        self.get(url, &[], &HeaderMap::new(), cache_for).await
    }

    /// GET a URL, sharing in-flight requests and caching 2xx responses
    ///
    /// `params` are appended to the URL's query string and `headers` are
    /// merged over the client's default headers. Successful responses are
    /// cached for `cache_for`; zero disables caching for this call. Non-2xx
    /// responses are returned but never cached, and transport errors are
    /// delivered to every waiting caller without being cached.
    pub async fn get(
        &self,
        url: &str,
        params: &[(&str, &str)],
        headers: &HeaderMap,
        cache_for: Duration,
    ) -> Result<CachedResponse> {
        let mut resolved = Url::parse(url).map_err(|e| HttpError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !params.is_empty() {
            resolved.query_pairs_mut().extend_pairs(params);
        }

        let mut merged = self.inner.default_headers.clone();
        for (name, value) in headers {
            merged.insert(name.clone(), value.clone());
        }

        let key = RequestKey::new("GET", &resolved, &merged);

        if let Some(response) = self.inner.cache.lock().get(&key) {
            trace!("Cache hit for {}", key.url);
            return Ok(response.clone());
        }

        let shared = {
            let mut in_flight = self.inner.in_flight.lock();
            // The task may have finished between the cache check and this lock
            if let Some(response) = self.inner.cache.lock().get(&key) {
                return Ok(response.clone());
            }
            match in_flight.get(&key) {
                Some(shared) => {
                    debug!("Joining in-flight request for {}", key.url);
                    shared.clone()
                }
                None => {
                    let task = tokio::spawn(execute(
                        Arc::clone(&self.inner),
                        key.clone(),
                        resolved,
                        merged,
                        cache_for,
                    ));
                    let shared = async move {
                        task.await
                            .unwrap_or_else(|e| Err(HttpError::Task(e.to_string())))
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(key, shared.clone());
                    shared
                }
            }
        };

        shared.await
    }

    /// Purge expired responses, returning how many were removed
    pub fn sweep(&self) -> usize {
        self.inner.cache.lock().sweep()
    }

    /// Drop every cached response
    pub fn clear(&self) {
        self.inner.cache.lock().clear();
    }

    /// Number of cached responses, including expired ones not yet purged
    pub fn cached_len(&self) -> usize {
        self.inner.cache.lock().len()
    }
}

async fn execute(
    inner: Arc<Inner>,
    key: RequestKey,
    url: Url,
    headers: HeaderMap,
    cache_for: Duration,
) -> Result<CachedResponse> {
    let result = send(&inner.client, url, headers).await;

    if let Ok(response) = &result
        && response.status.is_success()
    {
        inner
            .cache
            .lock()
            .set(key.clone(), response.clone(), cache_for);
    }
    inner.in_flight.lock().remove(&key);

    result
}

async fn send(client: &Client, url: Url, headers: HeaderMap) -> Result<CachedResponse> {
    let url_text = url.to_string();
    debug!("GET {}", url_text);

    let transport = |e: reqwest::Error| HttpError::Transport {
        url: url_text.clone(),
        reason: e.to_string(),
    };

    let response = client
        .get(url)
        .headers(headers)
        .send()
        .await
        .map_err(transport)?;
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await.map_err(transport)?;

    debug!("GET {} -> {} ({} bytes)", url_text, status, body.len());

    Ok(CachedResponse {
        url: url_text,
        status,
        headers,
        body,
    })
}
