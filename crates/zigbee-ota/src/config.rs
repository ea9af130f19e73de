//! OTA server configuration

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use zigbee_ota_http::{CachingClient, CachingClientConfig, DEFAULT_USER_AGENT};

use crate::error::{OtaError, Result};
use crate::providers::{
    IkeaProvider, InovelliProvider, LedvanceProvider, LocalFilesProvider, OtaProvider,
    RemoteIndexProvider, SalusProvider, SonoffProvider, ThirdRealityProvider, Z2mIndexSource,
    Z2mProvider,
};

/// One configured image source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// IKEA feed
    Ikea {
        /// Index URL override
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    /// LEDVANCE update service
    Ledvance {
        /// Index URL override
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    /// Salus firmware service
    Salus {
        /// Index URL override
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    /// SONOFF release feed
    Sonoff {
        /// Index URL override
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    /// Inovelli firmware feed
    Inovelli {
        /// Index URL override
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    /// Third Reality firmware feed
    ThirdReality {
        /// Index URL override
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    /// Canonical index at a URL
    Remote {
        /// Index URL
        url: String,
        /// Restrict to these manufacturer codes
        #[serde(default, skip_serializing_if = "Option::is_none")]
        manufacturer_ids: Option<Vec<u16>>,
    },
    /// zigbee2mqtt-style index, from exactly one of `url` or `path`
    Z2m {
        /// Index URL
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        /// Index file
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
    },
    /// Directory of OTA files
    LocalFiles {
        /// Directory to scan
        path: PathBuf,
    },
}

impl ProviderConfig {
    fn z2m_source(url: Option<&String>, path: Option<&PathBuf>) -> Result<Z2mIndexSource> {
        match (url, path) {
            (Some(url), None) => Ok(Z2mIndexSource::Url(url.clone())),
            (None, Some(path)) => Ok(Z2mIndexSource::File(path.clone())),
            _ => Err(OtaError::Config(
                "z2m provider needs exactly one of `url` or `path`".to_string(),
            )),
        }
    }

    /// Instantiate the provider
    ///
    /// # Errors
    ///
    /// Returns [`OtaError::Config`] if the entry is inconsistent.
    pub fn build(&self, client: &CachingClient, staleness: Duration) -> Result<Arc<dyn OtaProvider>> {
        let client = client.clone();
        let provider: Arc<dyn OtaProvider> = match self {
            ProviderConfig::Ikea { url } => Arc::new(
                match url {
                    Some(url) => IkeaProvider::with_url(client, url),
                    None => IkeaProvider::new(client),
                }
                .with_staleness(staleness),
            ),
            ProviderConfig::Ledvance { url } => Arc::new(
                match url {
                    Some(url) => LedvanceProvider::with_url(client, url),
                    None => LedvanceProvider::new(client),
                }
                .with_staleness(staleness),
            ),
            ProviderConfig::Salus { url } => Arc::new(
                match url {
                    Some(url) => SalusProvider::with_url(client, url),
                    None => SalusProvider::new(client),
                }
                .with_staleness(staleness),
            ),
            ProviderConfig::Sonoff { url } => Arc::new(
                match url {
                    Some(url) => SonoffProvider::with_url(client, url),
                    None => SonoffProvider::new(client),
                }
                .with_staleness(staleness),
            ),
            ProviderConfig::Inovelli { url } => Arc::new(
                match url {
                    Some(url) => InovelliProvider::with_url(client, url),
                    None => InovelliProvider::new(client),
                }
                .with_staleness(staleness),
            ),
            ProviderConfig::ThirdReality { url } => Arc::new(
                match url {
                    Some(url) => ThirdRealityProvider::with_url(client, url),
                    None => ThirdRealityProvider::new(client),
                }
                .with_staleness(staleness),
            ),
            ProviderConfig::Remote {
                url,
                manufacturer_ids,
            } => {
                let provider = RemoteIndexProvider::new(client, url).with_staleness(staleness);
                Arc::new(match manufacturer_ids {
                    Some(ids) => provider.with_manufacturer_ids(ids.clone()),
                    None => provider,
                })
            }
            ProviderConfig::Z2m { url, path } => {
                let source = Self::z2m_source(url.as_ref(), path.as_ref())?;
                Arc::new(Z2mProvider::new(client, source).with_staleness(staleness))
            }
            ProviderConfig::LocalFiles { path } => {
                Arc::new(LocalFilesProvider::new(path.clone()).with_staleness(staleness))
            }
        };
        Ok(provider)
    }
}

/// Configuration for [`crate::OtaManager`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtaConfig {
    /// Enabled image sources
    pub providers: Vec<ProviderConfig>,
    /// Seconds before a provider index is fetched again
    pub index_staleness_secs: u64,
    /// Seconds a served image stays cached
    pub image_cache_ttl_secs: u64,
    /// HTTP request timeout in seconds
    pub http_timeout_secs: u64,
    /// User agent for HTTP requests
    pub user_agent: String,
}

impl Default for OtaConfig {
    fn default() -> Self {
        Self {
            providers: vec![
                ProviderConfig::Ikea { url: None },
                ProviderConfig::Ledvance { url: None },
                ProviderConfig::Salus { url: None },
                ProviderConfig::Sonoff { url: None },
                ProviderConfig::Inovelli { url: None },
                ProviderConfig::ThirdReality { url: None },
            ],
            index_staleness_secs: 24 * 60 * 60,
            image_cache_ttl_secs: 18 * 60 * 60,
            http_timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl OtaConfig {
    /// Configuration with no providers
    pub fn empty() -> Self {
        Self {
            providers: Vec::new(),
            ..Default::default()
        }
    }

    /// Read a JSON configuration file
    ///
    /// Missing fields take their default values.
    pub async fn load(path: &Path) -> Result<Self> {
        let data = tokio::fs::read(path).await?;
        let config: Self = serde_json::from_slice(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for inconsistencies
    pub fn validate(&self) -> Result<()> {
        if self.http_timeout_secs == 0 {
            return Err(OtaError::Config("http_timeout_secs must be positive".to_string()));
        }
        for provider in &self.providers {
            if let ProviderConfig::Z2m { url, path } = provider {
                ProviderConfig::z2m_source(url.as_ref(), path.as_ref())?;
            }
        }
        Ok(())
    }

    /// Add a provider
    pub fn with_provider(mut self, provider: ProviderConfig) -> Self {
        self.providers.push(provider);
        self
    }

    /// Replace the provider list
    pub fn with_providers(mut self, providers: Vec<ProviderConfig>) -> Self {
        self.providers = providers;
        self
    }

    /// Set the index staleness window
    pub fn with_index_staleness(mut self, staleness: Duration) -> Self {
        self.index_staleness_secs = staleness.as_secs();
        self
    }

    /// Set how long served images stay cached
    pub fn with_image_cache_ttl(mut self, ttl: Duration) -> Self {
        self.image_cache_ttl_secs = ttl.as_secs();
        self
    }

    /// Set the HTTP timeout
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout_secs = timeout.as_secs();
        self
    }

    /// Set the user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Index staleness window
    pub fn index_staleness(&self) -> Duration {
        Duration::from_secs(self.index_staleness_secs)
    }

    /// Served image lifetime
    pub fn image_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.image_cache_ttl_secs)
    }

    /// HTTP client settings
    pub fn client_config(&self) -> CachingClientConfig {
        CachingClientConfig::default()
            .with_timeout(Duration::from_secs(self.http_timeout_secs))
            .with_user_agent(self.user_agent.clone())
    }
}

/// Instantiate every configured provider, sharing `client`
///
/// # Errors
///
/// Returns [`OtaError::Config`] if any provider entry is inconsistent.
pub fn build_providers(
    config: &OtaConfig,
    client: &CachingClient,
) -> Result<Vec<Arc<dyn OtaProvider>>> {
    config
        .providers
        .iter()
        .map(|provider| provider.build(client, config.index_staleness()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_match_documented_values() {
        let config = OtaConfig::default();
        assert_eq!(config.index_staleness(), Duration::from_secs(86_400));
        assert_eq!(config.image_cache_ttl(), Duration::from_secs(64_800));
        assert_eq!(config.providers.len(), 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn providers_are_tagged_by_type() -> Result<()> {
        let config: OtaConfig = serde_json::from_value(json!({
            "providers": [
                {"type": "ikea"},
                {"type": "third_reality", "url": "https://mirror.test/tr.json"},
                {"type": "remote", "url": "https://ota.test/index.json", "manufacturer_ids": [4476]},
                {"type": "z2m", "path": "/srv/ota/index.json"},
                {"type": "local_files", "path": "/srv/ota/images"}
            ],
            "index_staleness_secs": 60
        }))?;

        assert_eq!(config.providers.len(), 5);
        assert_eq!(
            config.providers[1],
            ProviderConfig::ThirdReality {
                url: Some("https://mirror.test/tr.json".to_string())
            }
        );
        assert_eq!(config.index_staleness(), Duration::from_secs(60));
        assert_eq!(config.http_timeout_secs, 30);

        let client = CachingClient::with_defaults()?;
        let providers = build_providers(&config, &client)?;
        let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["IKEA", "Third Reality", "remote index", "Z2M", "local files"]);
        assert_eq!(
            providers[0].index_state().staleness(),
            Duration::from_secs(60)
        );
        Ok(())
    }

    #[test]
    fn z2m_needs_exactly_one_source() {
        let config = OtaConfig::empty().with_provider(ProviderConfig::Z2m {
            url: None,
            path: None,
        });
        assert!(matches!(config.validate(), Err(OtaError::Config(_))));
    }

    #[test]
    fn unknown_provider_type_is_rejected() {
        let result: std::result::Result<OtaConfig, _> =
            serde_json::from_value(json!({"providers": [{"type": "bogus"}]}));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn load_reads_json_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("ota.json");
        let config = OtaConfig::empty()
            .with_provider(ProviderConfig::LocalFiles {
                path: dir.path().to_path_buf(),
            })
            .with_image_cache_ttl(Duration::from_secs(600));
        tokio::fs::write(&path, serde_json::to_vec(&config)?).await?;

        assert_eq!(OtaConfig::load(&path).await?, config);
        Ok(())
    }
}
