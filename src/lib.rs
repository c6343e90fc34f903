// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Periscope - a stateless rewriting forward proxy
//!
//! Periscope forwards any request it receives to the target URL embedded in
//! its own request path, then rewrites the response so links keep resolving
//! through the proxy. `GET /https%3A%2F%2Fexample.com%2Fpage` fetches
//! `https://example.com/page`; redirects come back as `/{encoded-target}`
//! paths and root-relative links in HTML bodies are rebased onto the proxy
//! host.
//!
//! # Request pipeline
//!
//! - **Resolve**: strip one leading `/`, percent-decode, infer the scheme
//!   when the caller left it off, re-append the query string.
//! - **Filter**: drop infrastructure headers (configurable prefixes) plus
//!   `Host` and hop-by-hop headers before the outbound call.
//! - **Dispatch**: send via a shared client with redirect-following disabled
//!   so 3xx responses surface to the rewriters.
//! - **Rewrite**: `Location` headers on 3xx responses become proxy paths;
//!   `text/html` bodies get their root-relative `href`/`src`/`action`
//!   attributes rebased. Everything else streams through untouched.
//! - **Finalize**: every proxied response carries `Cache-Control: no-store`
//!   and permissive CORS headers.
//!
//! # Configuration
//!
//! Settings come from an ordered chain of [`ConfigProvider`]s. The stock
//! chain reads a `periscope.{toml,json,yaml}` file and overlays `PERISCOPE_*`
//! environment variables, with later providers winning; anything else slots
//! in by implementing the trait. Values deserialize into typed structs via
//! serde, so a whole section can be pulled out in one call.
//!
//! # Getting started
//!
//! ```rust,no_run
//! use periscope::Periscope;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let proxy = Periscope::loader()
//!         .with_env_vars()
//!         .build()
//!         .await?;
//!
//!     proxy.start().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod loader;
pub mod logging;
pub mod server;

pub use config::{Config, ConfigError, ConfigProvider, ConfigProviderExt};
pub use self::core::{ProxyConfig, ProxyCore, ProxyError, ProxyRequest, ProxyResponse, TargetUrl};
pub use loader::{LoaderError, Periscope, PeriscopeLoader};
pub use logging::{LoggingConfig, init as init_logging, log_error, log_info};
pub use server::{ProxyServer, ServerConfig};
