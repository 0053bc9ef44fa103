//! Header configuration loaded from JSON.
//!
//! Every field is optional, so an empty object (`{}`) is a valid
//! configuration that emits no cache headers at all.
//!
//! ```json
//! {
//!   "cache_control": { "private": true, "max_age": 30, "s_maxage": 60 },
//!   "cache_channels": { "varnish": true, "channels": ["Cat_Articles"] }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{CacheChannels, CacheControl, ChannelError};
use crate::middleware::Pipeline;

/// Errors produced while loading a [`HeaderConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid header configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Channels(#[from] ChannelError),
}

/// Settings for the `Cache-Control` layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheControlConfig {
    pub no_store: bool,
    pub private: bool,
    pub max_age: Option<i64>,
    pub s_maxage: Option<i64>,
    pub stale_while_revalidate: Option<i64>,
}

impl CacheControlConfig {
    /// Builds a [`CacheControl`] layer from these settings.
    pub fn build(&self) -> CacheControl {
        let mut control = CacheControl::new()
            .no_store(self.no_store)
            .private(self.private);
        if let Some(seconds) = self.max_age {
            control.set_max_age(seconds);
        }
        if let Some(seconds) = self.s_maxage {
            control.set_s_maxage(seconds);
        }
        if let Some(seconds) = self.stale_while_revalidate {
            control.set_stale_while_revalidate(seconds);
        }
        control
    }
}

/// Settings for the cache channel layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfig {
    pub varnish: bool,
    pub cloudflare: bool,
    pub channels: Vec<String>,
}

impl ChannelConfig {
    /// Builds a [`CacheChannels`] layer, sanitizing the configured names.
    ///
    /// # Errors
    ///
    /// Fails only if the channel sanitizer cannot be built.
    pub fn build(&self) -> Result<CacheChannels, ChannelError> {
        let mut channels = CacheChannels::new()?
            .varnish(self.varnish)
            .cloudflare(self.cloudflare);
        channels.set(&self.channels);
        Ok(channels)
    }
}

/// Configuration for both cache header layers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeaderConfig {
    pub cache_control: CacheControlConfig,
    pub cache_channels: ChannelConfig,
}

impl HeaderConfig {
    /// Parses a configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] on malformed JSON or unknown fields.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Json`] if it does not parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let config = Self::from_json(&json)?;
        tracing::debug!(path = %path.display(), "loaded header configuration");
        Ok(config)
    }

    /// Builds a pipeline with the `Cache-Control` layer outermost and the
    /// channel layer inside it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Channels`] if the channel layer cannot be built.
    pub fn pipeline(&self) -> Result<Pipeline, ConfigError> {
        Ok(Pipeline::new()
            .layer(Arc::new(self.cache_control.build()))
            .layer(Arc::new(self.cache_channels.build()?)))
    }
}
