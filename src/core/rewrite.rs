// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Response rewriting.
//!
//! Two transforms keep proxied browsing inside the proxy:
//!
//! - 3xx `Location` headers are re-encoded as `/{encoded-absolute-url}` so
//!   the follow-up request resolves through the proxy again.
//! - Root-relative `href`/`src`/`action` attributes in HTML bodies are
//!   rebased onto the proxy host with the target origin kept as a literal
//!   path segment: `/foo` served by `https://example.com` becomes
//!   `https://proxy.example/https://example.com/foo`.
//!
//! Both transforms recover locally: a missing or unparseable `Location`, or
//! a body that is not UTF-8, leaves the response untouched instead of
//! failing the request.

use regex::Regex;
use reqwest::header::{HeaderMap, LOCATION};
use url::Url;

use super::resolver::{TargetUrl, proxy_path};
use super::ProxyError;
use crate::debug_fmt;

/// Whether a status code belongs to the rewritten redirect set.
pub fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Compute the proxy-relative replacement for a redirect's `Location`.
///
/// Relative locations are resolved against the target's origin first.
/// Returns `None` when the header is absent or does not parse; the caller
/// passes the response through unchanged in that case.
pub fn redirect_location(headers: &HeaderMap, target: &TargetUrl) -> Option<String> {
    let location = headers.get(LOCATION)?;
    let location = match location.to_str() {
        Ok(value) => value,
        Err(_) => {
            debug_fmt!("RedirectRewriter", "Location header is not valid UTF-8; passing through");
            return None;
        }
    };

    let absolute = match Url::parse(location) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = Url::parse(&target.origin()).ok()?;
            match base.join(location) {
                Ok(url) => url,
                Err(e) => {
                    debug_fmt!(
                        "RedirectRewriter",
                        "unresolvable relative Location '{}': {}; passing through",
                        location,
                        e
                    );
                    return None;
                }
            }
        }
        Err(e) => {
            debug_fmt!(
                "RedirectRewriter",
                "unparseable Location '{}': {}; passing through",
                location,
                e
            );
            return None;
        }
    };

    Some(proxy_path(absolute.as_str()))
}

/// Whether a response body should go through the HTML rewriter.
pub fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/html"))
}

/// Rewrites root-relative attribute references in HTML bodies.
#[derive(Debug)]
pub struct HtmlRewriter {
    attribute: Regex,
}

impl HtmlRewriter {
    /// Compile the attribute scanner.
    pub fn new() -> Result<Self, ProxyError> {
        // Group 2 also captures a second slash so protocol-relative values
        // can be recognized and left alone.
        let attribute = Regex::new(r#"((?:href|src|action)=["'])(/{1,2})"#)
            .map_err(|e| ProxyError::Other(format!("invalid attribute pattern: {e}")))?;

        Ok(Self { attribute })
    }

    /// Rewrite a buffered HTML body.
    ///
    /// `scheme` and `host` are the inbound request's own; `origin` is the
    /// target's serialized origin. Returns `None` when the body is not
    /// UTF-8, in which case the original bytes pass through unrewritten.
    pub fn rewrite(&self, body: &[u8], scheme: &str, host: &str, origin: &str) -> Option<String> {
        let text = match std::str::from_utf8(body) {
            Ok(text) => text,
            Err(e) => {
                debug_fmt!("HtmlRewriter", "body is not UTF-8 ({}); passing through", e);
                return None;
            }
        };

        let base = format!("{scheme}://{host}/{origin}/");
        let rewritten = self.attribute.replace_all(text, |caps: &regex::Captures| {
            if &caps[2] == "//" {
                caps[0].to_string()
            } else {
                format!("{}{}", &caps[1], base)
            }
        });

        Some(rewritten.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn target(path: &str) -> TargetUrl {
        TargetUrl::resolve(path, None, "https").unwrap()
    }

    fn location_headers(value: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(LOCATION, HeaderValue::from_bytes(value).unwrap());
        headers
    }

    #[test]
    fn test_redirect_statuses() {
        for status in [301, 302, 303, 307, 308] {
            assert!(is_redirect(status), "{status} should be rewritten");
        }
        for status in [200, 204, 300, 304, 400, 500] {
            assert!(!is_redirect(status), "{status} should pass through");
        }
    }

    #[test]
    fn test_absolute_location_is_encoded() {
        let headers = location_headers(b"https://example.com/new");
        let rewritten = redirect_location(&headers, &target("/https://example.com/old")).unwrap();
        assert_eq!(rewritten, "/https%3A%2F%2Fexample.com%2Fnew");
    }

    #[test]
    fn test_rewritten_location_resolves_back() {
        let headers = location_headers(b"https://example.com/new");
        let rewritten = redirect_location(&headers, &target("/https://example.com/old")).unwrap();

        let resolved = TargetUrl::resolve(&rewritten, None, "https").unwrap();
        assert_eq!(resolved.as_str(), "https://example.com/new");
    }

    #[test]
    fn test_relative_location_resolves_against_target_origin() {
        let headers = location_headers(b"/login");
        let rewritten =
            redirect_location(&headers, &target("/https://example.com/account/settings")).unwrap();
        assert_eq!(rewritten, "/https%3A%2F%2Fexample.com%2Flogin");

        let headers = location_headers(b"login");
        let rewritten =
            redirect_location(&headers, &target("/https://example.com/account/settings")).unwrap();
        assert_eq!(rewritten, "/https%3A%2F%2Fexample.com%2Flogin");
    }

    #[test]
    fn test_missing_location_passes_through() {
        let headers = HeaderMap::new();
        assert!(redirect_location(&headers, &target("/example.com")).is_none());
    }

    #[test]
    fn test_unparseable_location_passes_through() {
        let headers = location_headers(b"http://[not-a-host");
        assert!(redirect_location(&headers, &target("/example.com")).is_none());
    }

    #[test]
    fn test_non_utf8_location_passes_through() {
        let headers = location_headers(&[0xfe, 0xff, 0x2f]);
        assert!(redirect_location(&headers, &target("/example.com")).is_none());
    }

    #[test]
    fn test_is_html_matches_content_type() {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        assert!(is_html(&headers));

        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        assert!(!is_html(&headers));

        assert!(!is_html(&HeaderMap::new()));
    }

    #[test]
    fn test_root_relative_href_is_rebased() {
        let rewriter = HtmlRewriter::new().unwrap();
        let body = br#"<a href="/foo">link</a>"#;

        let rewritten = rewriter
            .rewrite(body, "https", "proxy.example", "https://example.com")
            .unwrap();

        assert_eq!(
            rewritten,
            r#"<a href="https://proxy.example/https://example.com/foo">link</a>"#
        );
    }

    #[test]
    fn test_src_action_and_single_quotes() {
        let rewriter = HtmlRewriter::new().unwrap();
        let body = br#"<img src='/logo.png'><form action="/submit">"#;

        let rewritten = rewriter
            .rewrite(body, "https", "proxy.example", "https://example.com")
            .unwrap();

        assert_eq!(
            rewritten,
            concat!(
                r#"<img src='https://proxy.example/https://example.com/logo.png'>"#,
                r#"<form action="https://proxy.example/https://example.com/submit">"#
            )
        );
    }

    #[test]
    fn test_protocol_relative_urls_are_untouched() {
        let rewriter = HtmlRewriter::new().unwrap();
        let body = br#"<script src="//cdn.example.com/app.js"></script>"#;

        let rewritten = rewriter
            .rewrite(body, "https", "proxy.example", "https://example.com")
            .unwrap();

        assert_eq!(rewritten, std::str::from_utf8(body).unwrap());
    }

    #[test]
    fn test_absolute_urls_are_untouched() {
        let rewriter = HtmlRewriter::new().unwrap();
        let body = br#"<a href="https://other.example/page">x</a>"#;

        let rewritten = rewriter
            .rewrite(body, "https", "proxy.example", "https://example.com")
            .unwrap();

        assert_eq!(rewritten, std::str::from_utf8(body).unwrap());
    }

    #[test]
    fn test_attribute_match_is_case_sensitive() {
        let rewriter = HtmlRewriter::new().unwrap();
        let body = br#"<a HREF="/foo">x</a>"#;

        let rewritten = rewriter
            .rewrite(body, "https", "proxy.example", "https://example.com")
            .unwrap();

        assert_eq!(rewritten, std::str::from_utf8(body).unwrap());
    }

    #[test]
    fn test_mixed_document() {
        let rewriter = HtmlRewriter::new().unwrap();
        let body = concat!(
            r#"<link href="/style.css">"#,
            r#"<script src="//cdn.example.com/lib.js"></script>"#,
            r#"<a href="https://example.org/abs">abs</a>"#,
            r#"<form action='/post'>"#
        );

        let rewritten = rewriter
            .rewrite(body.as_bytes(), "http", "localhost:8080", "http://origin.test")
            .unwrap();

        assert_eq!(
            rewritten,
            concat!(
                r#"<link href="http://localhost:8080/http://origin.test/style.css">"#,
                r#"<script src="//cdn.example.com/lib.js"></script>"#,
                r#"<a href="https://example.org/abs">abs</a>"#,
                r#"<form action='http://localhost:8080/http://origin.test/post'>"#
            )
        );
    }

    #[test]
    fn test_non_utf8_body_passes_through() {
        let rewriter = HtmlRewriter::new().unwrap();
        let body = [0x3c, 0x61, 0xff, 0xfe, 0x3e];

        assert!(rewriter
            .rewrite(&body, "https", "proxy.example", "https://example.com")
            .is_none());
    }
}
