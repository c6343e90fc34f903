// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Common test utilities and helpers for Periscope integration tests.

use periscope::Periscope;
use periscope::config::{ConfigError, ConfigProvider};
use periscope::core::proxy_path;
use periscope::loader::LoaderError;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;

/// In-memory configuration for one test; nothing is pre-populated.
#[derive(Debug, Clone)]
pub struct TestConfigProvider {
    values: HashMap<String, Value>,
    name: String,
}

#[allow(dead_code)]
impl TestConfigProvider {
    pub fn new(name: &str) -> Self {
        Self {
            values: HashMap::new(),
            name: name.to_string(),
        }
    }

    /// Set one value under a dotted key.
    pub fn with_value<T: Into<Value>>(mut self, key: &str, value: T) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    /// Exact keys win; otherwise dotted children are gathered into a table
    /// so whole-section reads like `server` see `server.port` style entries.
    fn lookup(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.values.get(key) {
            return Some(value.clone());
        }

        let prefix = format!("{key}.");
        let children: serde_json::Map<String, Value> = self
            .values
            .iter()
            .filter_map(|(k, v)| {
                let child = k.strip_prefix(&prefix)?;
                (!child.contains('.')).then(|| (child.to_string(), v.clone()))
            })
            .collect();

        (!children.is_empty()).then_some(Value::Object(children))
    }
}

impl ConfigProvider for TestConfigProvider {
    fn has(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    fn provider_name(&self) -> &str {
        &self.name
    }

    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        Ok(self.lookup(key))
    }
}

/// Reserve an OS-assigned port.
///
/// The listener is dropped before returning, so the port stays free for
/// the proxy (or stays dead for unreachable-upstream tests).
#[allow(dead_code)]
pub async fn ephemeral_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to reserve a port");
    let port = listener.local_addr().expect("Listener has no address").port();
    drop(listener);
    port
}

/// A proxy instance running on a background task.
#[allow(dead_code)]
pub struct RunningProxy {
    pub port: u16,
    pub health_port: u16,
    handle: JoinHandle<Result<(), LoaderError>>,
}

#[allow(dead_code)]
impl RunningProxy {
    /// Absolute proxy URL for a target, percent-encoded the way the
    /// landing page encodes it.
    pub fn url(&self, target: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, proxy_path(target))
    }

    /// Absolute URL for a raw path on the proxy listener.
    pub fn raw_url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    /// Stop the background server task.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

/// Build a proxy from the provider and run it on OS-assigned ports.
///
/// Blocks until the listener answers the landing page, so tests can fire
/// requests immediately.
#[allow(dead_code)]
pub async fn start_proxy(provider: TestConfigProvider) -> RunningProxy {
    let port = ephemeral_port().await;
    let health_port = ephemeral_port().await;

    let provider = provider
        .with_value("server.port", port)
        .with_value("server.health_port", health_port);

    let periscope = Periscope::loader()
        .with_provider(provider)
        .build()
        .await
        .expect("Failed to build Periscope instance");

    let handle = tokio::spawn(async move { periscope.start().await });

    wait_until_ready(port).await;

    RunningProxy {
        port,
        health_port,
        handle,
    }
}

/// Poll the landing page until the listener accepts requests.
#[allow(dead_code)]
pub async fn wait_until_ready(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{port}/");

    for _ in 0..50 {
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status() == 200 {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    panic!("Proxy on port {port} never became ready");
}

/// Client that surfaces 3xx responses instead of following them.
#[allow(dead_code)]
pub fn no_redirect_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to build client")
}

/// Write a config file into a fresh temp directory.
///
/// The directory guard is returned alongside the path; the file lives
/// only as long as the guard does.
#[allow(dead_code)]
pub fn write_config_file(content: &str, extension: &str) -> (tempfile::TempDir, String) {
    let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join(format!("periscope.{extension}"));
    std::fs::write(&path, content).expect("Failed to write config file");

    let path = path.to_string_lossy().to_string();
    (dir, path)
}
