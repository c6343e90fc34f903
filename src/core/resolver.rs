// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Target URL resolution.
//!
//! Every inbound path is a percent-encoded target: `/{encoded-url}`.
//! Resolution strips exactly one leading `/`, decodes the remainder, falls
//! back to the inbound request's scheme when the caller left the protocol
//! off, and re-appends the inbound query string.

use url::Url;

use super::ProxyError;

/// The fully-qualified URL a proxied request is destined for.
///
/// Holds the exact string resolution produced alongside its parsed form:
/// the raw string is what properties and logs report, the parsed [`Url`]
/// drives dispatch, origin extraction and relative-reference resolution.
#[derive(Debug, Clone)]
pub struct TargetUrl {
    raw: String,
    url: Url,
}

impl TargetUrl {
    /// Resolve a target from an inbound path, query string and scheme.
    ///
    /// `scheme` is the inbound request's own scheme (without `://`) and is
    /// substituted when the decoded target carries none.
    pub fn resolve(path: &str, query: Option<&str>, scheme: &str) -> Result<Self, ProxyError> {
        let encoded = path.strip_prefix('/').unwrap_or(path);
        if encoded.is_empty() {
            return Err(ProxyError::InvalidTarget("empty target path".to_string()));
        }

        let decoded = urlencoding::decode(encoded).map_err(|e| {
            ProxyError::InvalidTarget(format!("target does not decode to UTF-8: {e}"))
        })?;

        let mut raw = ensure_scheme(&decoded, scheme);
        if let Some(q) = query {
            raw.push('?');
            raw.push_str(q);
        }

        let url =
            Url::parse(&raw).map_err(|e| ProxyError::InvalidTarget(format!("'{raw}': {e}")))?;

        Ok(Self { raw, url })
    }

    /// The resolved target exactly as resolution produced it.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The parsed form of the target.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// ASCII serialization of the target's origin, e.g. `https://example.com`.
    pub fn origin(&self) -> String {
        self.url.origin().ascii_serialization()
    }
}

impl std::fmt::Display for TargetUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Encode an absolute URL as a proxy-relative path.
///
/// Inverse of [`TargetUrl::resolve`]: requesting the returned path through
/// the proxy resolves back to `target`.
pub fn proxy_path(target: &str) -> String {
    format!("/{}", urlencoding::encode(target))
}

fn ensure_scheme(target: &str, scheme: &str) -> String {
    if target.starts_with("http://") || target.starts_with("https://") {
        target.to_string()
    } else {
        format!("{scheme}://{target}")
    }
}
