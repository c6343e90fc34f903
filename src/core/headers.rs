// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Outbound header filtering.
//!
//! Exclusion-based rather than allow-listed: everything the caller sent is
//! forwarded to the origin except names matching a reserved infrastructure
//! prefix, the `Host` header, and hop-by-hop headers. The outbound client
//! computes its own `Host` and connection headers.

use reqwest::header::HeaderMap;

/// Connection-scoped headers that must not be forwarded.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Derives the outbound header set from inbound headers.
#[derive(Debug, Clone)]
pub struct HeaderFilter {
    strip_prefixes: Vec<String>,
}

impl Default for HeaderFilter {
    fn default() -> Self {
        Self::new(vec!["cf-".to_string()])
    }
}

impl HeaderFilter {
    /// Create a filter that drops headers starting with any of `strip_prefixes`.
    ///
    /// Prefixes match case-insensitively.
    pub fn new(strip_prefixes: Vec<String>) -> Self {
        Self {
            strip_prefixes: strip_prefixes
                .into_iter()
                .map(|p| p.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Produce the outbound header map.
    ///
    /// Surviving names and values pass through byte-for-byte, repeated
    /// values included.
    pub fn filter(&self, headers: &HeaderMap) -> HeaderMap {
        let mut outbound = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            if self.forwards(name.as_str()) {
                outbound.append(name.clone(), value.clone());
            }
        }
        outbound
    }

    /// Whether a header name survives filtering.
    ///
    /// Header names arrive lowercased from the HTTP layer, which is what
    /// makes the prefix match case-insensitive.
    fn forwards(&self, name: &str) -> bool {
        if name == "host" || HOP_BY_HOP.contains(&name) {
            return false;
        }
        !self.strip_prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}
