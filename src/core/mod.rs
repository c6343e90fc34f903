// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The request pipeline: resolve, filter, dispatch, rewrite.
//!
//! This module owns the types that travel through the proxy and the
//! [`ProxyCore`] dispatcher that drives them. Socket handling stays in
//! `server`; target resolution, header filtering and response rewriting
//! each live in their own submodule here.


mod headers;
mod resolver;
mod rewrite;

pub use headers::HeaderFilter;
pub use resolver::{TargetUrl, proxy_path};
pub use rewrite::HtmlRewriter;

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CACHE_CONTROL, CONTENT_LENGTH, HeaderValue, LOCATION,
};
use reqwest::redirect;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{Config, ConfigError};

/// What can go wrong while a request moves through the pipeline.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// The request path did not decode to a usable target URL
    #[error("invalid proxy target: {0}")]
    InvalidTarget(String),

    /// The outbound call failed (DNS, connect, timeout, protocol)
    #[error("HTTP client error: {0}")]
    ClientError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// A configuration value the pipeline needs was unusable
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("{0}")]
    Other(String),
}

impl From<ConfigError> for ProxyError {
    fn from(err: ConfigError) -> Self {
        ProxyError::ConfigError(err.to_string())
    }
}

/// One inbound request, as the pipeline sees it.
///
/// `scheme` and `host` describe how the caller addressed the proxy itself;
/// both feed the rewriters so generated links route back through us.
#[derive(Debug)]
pub struct ProxyRequest {
    pub method: reqwest::Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: reqwest::header::HeaderMap,
    pub body: reqwest::Body,
    pub scheme: String,
    pub host: String,
    pub client_ip: Option<String>,
}

/// What goes back to the server layer after rewriting.
#[derive(Debug)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: reqwest::header::HeaderMap,
    pub body: reqwest::Body,
}

/// Tunables for the forwarding pipeline, read from the `proxy` config key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Outbound request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Header-name prefixes stripped before forwarding
    #[serde(default = "default_strip_header_prefixes")]
    pub strip_header_prefixes: Vec<String>,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_strip_header_prefixes() -> Vec<String> {
    vec!["cf-".to_string()]
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            strip_header_prefixes: default_strip_header_prefixes(),
        }
    }
}

/// Core proxy implementation: one stateless rewriting pipeline per request.
#[derive(Debug)]
pub struct ProxyCore {
    pub config: Arc<Config>,
    /// Shared outbound client; reqwest pools connections internally.
    pub client: reqwest::Client,
    header_filter: HeaderFilter,
    html_rewriter: HtmlRewriter,
}

impl ProxyCore {
    /// Read the `proxy` section and assemble the pipeline pieces.
    pub fn new(config: Arc<Config>) -> Result<Self, ProxyError> {
        let proxy_config: ProxyConfig = config.get_or_default("proxy", ProxyConfig::default())?;

        // Redirects must surface to the rewriters, never be followed here.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(proxy_config.timeout_secs))
            .redirect(redirect::Policy::none())
            .build()
            .map_err(ProxyError::ClientError)?;

        let header_filter = HeaderFilter::new(proxy_config.strip_header_prefixes);
        let html_rewriter = HtmlRewriter::new()?;

        Ok(Self {
            config,
            client,
            header_filter,
            html_rewriter,
        })
    }

    /// Run one request through the full pipeline.
    ///
    /// Strict sequence, nothing retried: resolve the target, build and send
    /// the outbound request, branch into the redirect or HTML rewriter on
    /// the way back, stamp the cache/CORS policy headers.  Failures
    /// propagate to the server's single error boundary.
    pub async fn process_request(
        &self,
        request: ProxyRequest,
    ) -> Result<ProxyResponse, ProxyError> {
        let started = Instant::now();

        /* ---------- resolve target ---------- */
        let target = TargetUrl::resolve(&request.path, request.query.as_deref(), &request.scheme)?;

        /* ---------- outbound request ---------- */
        let outbound_headers = self.header_filter.filter(&request.headers);

        let builder = self
            .client
            .request(request.method.clone(), target.url().clone())
            .headers(outbound_headers)
            .body(request.body);

        /* ---------- dispatch ---------- */
        let sent_at = Instant::now();
        let resp = builder.send().await.map_err(ProxyError::ClientError)?;
        let upstream_time = sent_at.elapsed();

        let status = resp.status().as_u16();
        let mut headers = resp.headers().clone();

        /* ---------- redirect / html rewrite / passthrough ---------- */
        let body = if rewrite::is_redirect(status) {
            if let Some(path) = rewrite::redirect_location(&headers, &target) {
                if let Ok(value) = HeaderValue::from_str(&path) {
                    headers.insert(LOCATION, value);
                }
            }
            reqwest::Body::wrap_stream(resp.bytes_stream())
        } else if rewrite::is_html(&headers) {
            let bytes = resp.bytes().await.map_err(ProxyError::ClientError)?;
            match self.html_rewriter.rewrite(
                &bytes,
                &request.scheme,
                &request.host,
                &target.origin(),
            ) {
                Some(text) => {
                    // Byte length changed; the server recomputes it from the
                    // buffered body.
                    headers.remove(CONTENT_LENGTH);
                    reqwest::Body::from(text)
                }
                None => reqwest::Body::from(bytes),
            }
        } else {
            reqwest::Body::wrap_stream(resp.bytes_stream())
        };

        /* ---------- policy headers ---------- */
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, PUT, DELETE"),
        );
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));

        /* ---------- timings ---------- */
        let total_time = started.elapsed();
        log::debug!(
            "{} {} -> {} in {:?} ({:?} upstream, {:?} here)",
            request.method,
            target,
            status,
            total_time,
            upstream_time,
            total_time.saturating_sub(upstream_time)
        );

        Ok(ProxyResponse {
            status,
            headers,
            body,
        })
    }
}
