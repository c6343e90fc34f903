// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Periscope configuration subsystem
//!
//! Configuration is assembled from an ordered list of [`ConfigProvider`]s.
//! Lookup walks the list from the most recently registered provider
//! backwards, so later registrations override earlier ones.  The default
//! loader stacks a file under environment variables:
//!
//! 1. `FileConfigProvider`: `periscope.{toml,json,yaml}`
//! 2. `EnvConfigProvider`: `PERISCOPE_SERVER_PORT=8080`
//!
//! Custom [`ConfigProvider`] implementations slot into the same list.
//!
//! First-class keys:
//!
//! | key | type | default | meaning |
//! |-----|------|---------|---------|
//! | `server.host`                 | string | `"127.0.0.1"` | Address to bind                    |
//! | `server.port`                 | int    | `8080`        | Proxy listener port                |
//! | `server.health_port`          | int    | `8081`        | Health/readiness listener port     |
//! | `proxy.timeout_secs`          | int    | `30`          | Outbound request timeout           |
//! | `proxy.strip_header_prefixes` | array  | `["cf-"]`     | Header prefixes dropped on forward |
//! | `proxy.logging`               | object | none          | Structured logging settings        |
//!
//! Structured sections (`server`, `proxy`, `proxy.logging`) are read as
//! whole objects, so an environment override supplies a JSON value:
//! `PERISCOPE_PROXY='{"timeout_secs": 60}'`.
//!
//! The README's configuration section walks through full examples.

mod env;
pub mod error;
mod file;


pub use env::EnvConfigProvider;
pub use error::ConfigError;
pub use file::FileConfigProvider;

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

/// A single source of configuration values.
///
/// Object-safe on purpose: providers are stored behind `dyn` in [`Config`].
/// Typed access lives in [`ConfigProviderExt`].
pub trait ConfigProvider: Debug + Send + Sync {
    /// Whether this provider can answer for `key`.
    fn has(&self, key: &str) -> bool;

    /// Short name used in diagnostics.
    fn provider_name(&self) -> &str;

    /// Fetch the raw JSON value for `key`, if this provider has one.
    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError>;
}

/// Typed access on top of any [`ConfigProvider`].
pub trait ConfigProviderExt: ConfigProvider {
    /// Fetch `key` and deserialize it into `T`.
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.get_raw(key)?.map(|v| deserialize(key, v)).transpose()
    }
}

impl<T: ConfigProvider> ConfigProviderExt for T {}

/// Deserialize a raw value, naming the key in the error.
fn deserialize<T: DeserializeOwned>(key: &str, value: Value) -> Result<T, ConfigError> {
    serde_json::from_value(value)
        .map_err(|e| ConfigError::ParseError(format!("failed to deserialize '{key}': {e}")))
}

/// Assembles a [`Config`] from an ordered list of providers.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    providers: Vec<Arc<dyn ConfigProvider>>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider. Providers registered later win on key conflicts.
    pub fn with_provider<P: ConfigProvider + 'static>(mut self, provider: P) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    pub fn build(self) -> Config {
        Config {
            providers: self.providers,
        }
    }
}

/// The layered configuration handed around the rest of the crate.
///
/// Lookups consult providers newest-first, so the registration order in
/// [`ConfigBuilder`] doubles as the precedence order.
#[derive(Debug, Clone)]
pub struct Config {
    providers: Vec<Arc<dyn ConfigProvider>>,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        let winner = self.providers.iter().rev().find(|p| p.has(key));

        match winner {
            Some(provider) => provider.get_raw(key),
            None => Ok(None),
        }
    }

    /// Fetch `key` from the highest-precedence provider that has it.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.get_raw(key)?.map(|v| deserialize(key, v)).transpose()
    }

    /// Like [`Config::get`], with a fallback for absent keys.
    ///
    /// Deserialization failures still surface as errors; only a genuinely
    /// missing key falls back.
    pub fn get_or_default<T: DeserializeOwned>(
        &self,
        key: &str,
        default: T,
    ) -> Result<T, ConfigError> {
        Ok(self.get(key)?.unwrap_or(default))
    }
}
