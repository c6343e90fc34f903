// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! High-level entry point: configure, build, run.
//!
//! [`PeriscopeLoader`] assembles the configuration, initializes logging,
//! builds the rewriting [`ProxyCore`] and returns a [`Periscope`] handle
//! whose [`start`](Periscope::start) runs the server until shutdown.


use std::env;
use std::sync::Arc;

use log::LevelFilter;
use thiserror::Error;

use crate::config::{Config, ConfigError, ConfigProvider, EnvConfigProvider, FileConfigProvider};
use crate::core::ProxyCore;
use crate::logging::config::LoggingConfig;
use crate::logging::init_with_config;
use crate::{ProxyError, ProxyServer, ServerConfig, init_logging, log_error, log_info};

/// Failures while assembling a [`Periscope`] instance.
#[derive(Error, Debug)]
pub enum LoaderError {
    /// A configuration source could not be loaded or read.
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    /// The proxy pipeline or server refused its configuration.
    #[error("proxy error: {0}")]
    ProxyError(#[from] ProxyError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Builder for a configured [`Periscope`].
///
/// Configuration sources stack: the file registers first, environment
/// variables second, so `PERISCOPE_*` values win over file values.
#[derive(Debug, Default)]
pub struct PeriscopeLoader {
    config_builder: Option<Config>,
    config_file_path: Option<String>,
    use_env_vars: bool,
    env_prefix: Option<String>,
}

impl PeriscopeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a fully assembled [`Config`] as-is, skipping file/env loading.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config_builder = Some(config);
        self
    }

    /// Load configuration from a JSON, TOML, or YAML file.
    pub fn with_config_file(mut self, file_path: &str) -> Self {
        self.config_file_path = Some(file_path.to_string());
        self
    }

    /// Layer `PERISCOPE_*` environment variables on top of the file.
    pub fn with_env_vars(mut self) -> Self {
        self.use_env_vars = true;
        self
    }

    /// Like [`with_env_vars`](Self::with_env_vars) with a different prefix.
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self.use_env_vars = true;
        self
    }

    /// Use a single custom provider as the whole configuration.
    ///
    /// This replaces anything registered before it, including the file and
    /// environment sources; combine custom providers with
    /// [`with_config`](Self::with_config) when layering is needed.
    pub fn with_provider<P: ConfigProvider + 'static>(self, provider: P) -> Self {
        Self {
            config_builder: Some(Config::builder().with_provider(provider).build()),
            ..self
        }
    }

    /// Assemble configuration, bring up logging, and construct the proxy.
    pub async fn build(self) -> Result<Periscope, LoaderError> {
        let config = match self.config_builder {
            Some(config) => config,
            None => {
                let mut builder = Config::builder();

                // File first so that environment variables can override it
                if let Some(file_path) = self.config_file_path {
                    builder = builder.with_provider(FileConfigProvider::new(&file_path)?);
                }

                if self.use_env_vars {
                    let env_provider = match self.env_prefix {
                        Some(prefix) => EnvConfigProvider::new(&prefix),
                        None => EnvConfigProvider::default(),
                    };
                    builder = builder.with_provider(env_provider);
                }

                builder.build()
            }
        };

        let config = Arc::new(config);

        // Logging comes up before anything that might want to log. A broken
        // logging section is reported but does not abort the build.
        let level = env_log_level();
        match config.get::<LoggingConfig>("proxy.logging") {
            Ok(Some(logging_config)) => init_with_config(Some(level), Some(logging_config)),
            Ok(None) => {
                log_info(
                    "Startup",
                    "Logging configuration not found. Initializing with default settings.",
                );
                init_logging(Some(level));
            }
            Err(e) => {
                log_error(
                    "Startup",
                    format!("Failed to read logging configuration: {}", e),
                );
            }
        }

        crate::info_fmt!("Startup", "Periscope {} starting up", env!("CARGO_PKG_VERSION"));

        let proxy_core = ProxyCore::new(config.clone())?;
        let server_config: ServerConfig =
            config.get_or_default("server", ServerConfig::default())?;
        let server = ProxyServer::new(server_config, Arc::new(proxy_core));

        Ok(Periscope { config, server })
    }
}

/// Log level requested through `RUST_LOG_LEVEL`, defaulting to info.
fn env_log_level() -> LevelFilter {
    match env::var("RUST_LOG_LEVEL").ok().as_deref() {
        Some("trace") => LevelFilter::Trace,
        Some("debug") => LevelFilter::Debug,
        Some("warn") => LevelFilter::Warn,
        Some("error") => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

/// A built proxy, ready to serve.
#[derive(Debug, Clone)]
pub struct Periscope {
    config: Arc<Config>,
    server: ProxyServer,
}

impl Periscope {
    /// Entry point: `Periscope::loader()...build()`.
    pub fn loader() -> PeriscopeLoader {
        PeriscopeLoader::new()
    }

    /// The layered configuration the proxy was built from.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the server until shutdown.
    pub async fn start(&self) -> Result<(), LoaderError> {
        self.server.start().await.map_err(LoaderError::ProxyError)
    }
}
