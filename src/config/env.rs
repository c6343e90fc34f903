// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Environment variable configuration provider.
//!
//! Variables carrying the configured prefix are mapped to dot-separated
//! config keys: `PERISCOPE_SERVER_PORT` becomes `server.port`. Values are
//! parsed as JSON when possible, so `PERISCOPE_PROXY='{"timeout_secs": 60}'`
//! overrides a whole section; anything unparseable stays a plain string.

use serde_json::{Value, json};
use std::collections::HashMap;
use std::env;

use super::ConfigError;
use super::ConfigProvider;

/// Configuration provider over the process environment.
///
/// The environment is snapshotted once at construction; variables set later
/// are not visible to an existing provider.
#[derive(Debug)]
pub struct EnvConfigProvider {
    cache: HashMap<String, String>,
}

impl EnvConfigProvider {
    /// Snapshot all variables carrying `prefix`.
    pub fn new(prefix: &str) -> Self {
        let cache = env::vars()
            .filter_map(|(var, value)| Some((config_key(&var, prefix)?, value)))
            .collect();

        Self { cache }
    }
}

impl Default for EnvConfigProvider {
    fn default() -> Self {
        Self::new("PERISCOPE_")
    }
}

/// Map a variable name to its config key, or `None` if the prefix is absent.
fn config_key(var: &str, prefix: &str) -> Option<String> {
    let rest = var.strip_prefix(prefix)?;
    Some(rest.to_lowercase().replace('_', "."))
}

/// Interpret a raw variable value as the most specific JSON type it fits.
fn coerce_value(raw: &str) -> Value {
    if let Ok(value) = serde_json::from_str(raw) {
        return value;
    }

    if raw.eq_ignore_ascii_case("true") {
        return json!(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return json!(false);
    }

    if let Ok(int) = raw.parse::<i64>() {
        return json!(int);
    }
    if let Ok(float) = raw.parse::<f64>() {
        return json!(float);
    }

    json!(raw)
}

impl ConfigProvider for EnvConfigProvider {
    fn has(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }

    fn provider_name(&self) -> &str {
        "env"
    }

    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        Ok(self.cache.get(key).map(|raw| coerce_value(raw)))
    }
}
