// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-request access logging with trace correlation.
//!
//! [`AccessLog::begin`] records an arriving request and assigns it a trace
//! ID (either propagated from a caller-supplied header or freshly
//! generated); [`AccessLog::complete`] stamps that ID onto the outgoing
//! response and logs the outcome with timing.

use std::sync::Arc;

use hyper::header::{HeaderName, HeaderValue};
use hyper::{Request, Response};

use crate::logging::config::LoggingConfig;
use crate::logging::structured::{RequestInfo, generate_trace_id};

/// Emits one log line when a request arrives and one when its response
/// leaves, correlated by a per-request trace ID.
#[derive(Debug, Clone)]
pub struct AccessLog {
    config: Arc<LoggingConfig>,
}

impl AccessLog {
    /// Create a new access log from the logging configuration.
    pub fn new(config: LoggingConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Record an incoming request and capture its trace context.
    pub fn begin<B>(&self, req: &Request<B>, client_ip: &str) -> RequestInfo {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        let user_agent = req
            .headers()
            .get(hyper::header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        // Reuse the caller's trace ID when propagation is enabled
        let trace_id = if self.config.propagate_trace_id {
            req.headers()
                .get(&self.config.trace_id_header)
                .and_then(|h| h.to_str().ok())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .unwrap_or_else(generate_trace_id)
        } else {
            generate_trace_id()
        };

        let request_info = RequestInfo {
            trace_id,
            method,
            path,
            remote_addr: client_ip.to_string(),
            user_agent,
            start_time_ms: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis(),
        };

        if self.config.structured {
            let logger = slog_scope::logger();
            slog::info!(logger, "Request received";
                "trace_id" => &request_info.trace_id,
                "method" => &request_info.method,
                "path" => &request_info.path,
                "remote_addr" => &request_info.remote_addr,
                "user_agent" => &request_info.user_agent
            );
        } else {
            log::info!(
                "Request received: {} {} from {} (trace_id: {})",
                request_info.method,
                request_info.path,
                request_info.remote_addr,
                request_info.trace_id
            );
        }

        request_info
    }

    /// Stamp the trace ID onto the outgoing response and log its completion.
    pub fn complete<B>(&self, response: &mut Response<B>, request_info: &RequestInfo) {
        if self.config.include_trace_id {
            let name = HeaderName::from_bytes(self.config.trace_id_header.as_bytes())
                .unwrap_or_else(|_| HeaderName::from_static("x-trace-id"));
            let value = HeaderValue::from_str(&request_info.trace_id)
                .unwrap_or_else(|_| HeaderValue::from_static("invalid-trace-id"));

            response.headers_mut().insert(name, value);
        }

        let status = response.status().as_u16();
        let elapsed_ms = request_info.elapsed_ms();

        if self.config.structured {
            let logger = slog_scope::logger();
            slog::info!(logger, "Response completed";
                "trace_id" => &request_info.trace_id,
                "method" => &request_info.method,
                "path" => &request_info.path,
                "status" => status,
                "elapsed_ms" => elapsed_ms
            );
        } else {
            log::info!(
                "Response completed: {} {} -> {} in {}ms (trace_id: {})",
                request_info.method,
                request_info.path,
                status,
                elapsed_ms,
                request_info.trace_id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::test_logger;
    use hyper::Method;

    fn plain_config() -> LoggingConfig {
        LoggingConfig {
            propagate_trace_id: false,
            ..LoggingConfig::default()
        }
    }

    fn propagating_config() -> LoggingConfig {
        LoggingConfig {
            propagate_trace_id: true,
            trace_id_header: "x-trace-id".to_string(),
            ..LoggingConfig::default()
        }
    }

    fn test_request(headers: &[(&str, &str)]) -> Request<()> {
        let mut builder = Request::builder()
            .method(Method::GET)
            .uri("/https%3A%2F%2Fexample.com%2Fpage");

        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        builder.body(()).unwrap()
    }

    #[test]
    fn test_begin_captures_request_details() {
        let access = AccessLog::new(plain_config());
        let req = test_request(&[("user-agent", "test-agent/1.0")]);

        let info = access.begin(&req, "192.168.1.100");

        assert_eq!(info.method, "GET");
        assert_eq!(info.path, "/https%3A%2F%2Fexample.com%2Fpage");
        assert_eq!(info.remote_addr, "192.168.1.100");
        assert_eq!(info.user_agent, "test-agent/1.0");
        assert!(!info.trace_id.is_empty());
    }

    #[test]
    fn test_begin_without_user_agent() {
        let access = AccessLog::new(plain_config());
        let req = test_request(&[]);

        let info = access.begin(&req, "10.0.0.1");

        assert_eq!(info.user_agent, "unknown");
    }

    #[test]
    fn test_begin_propagates_existing_trace_id() {
        let access = AccessLog::new(propagating_config());
        let req = test_request(&[("x-trace-id", "existing-trace-123")]);

        let info = access.begin(&req, "10.0.0.1");

        assert_eq!(info.trace_id, "existing-trace-123");
    }

    #[test]
    fn test_begin_ignores_trace_id_without_propagation() {
        let access = AccessLog::new(plain_config());
        let req = test_request(&[("x-trace-id", "existing-trace-123")]);

        let info = access.begin(&req, "10.0.0.1");

        assert_ne!(info.trace_id, "existing-trace-123");
        assert!(!info.trace_id.is_empty());
    }

    #[test]
    fn test_begin_replaces_empty_trace_id() {
        let access = AccessLog::new(propagating_config());
        let req = test_request(&[("x-trace-id", "")]);

        let info = access.begin(&req, "10.0.0.1");

        assert!(!info.trace_id.is_empty());
    }

    #[test]
    fn test_complete_stamps_trace_header() {
        let access = AccessLog::new(propagating_config());
        let req = test_request(&[("x-trace-id", "trace-456")]);
        let info = access.begin(&req, "10.0.0.1");

        let mut response = Response::builder().status(200).body(()).unwrap();
        access.complete(&mut response, &info);

        assert_eq!(
            response.headers().get("x-trace-id").unwrap(),
            "trace-456"
        );
    }

    #[test]
    fn test_complete_skips_trace_header_when_disabled() {
        let access = AccessLog::new(LoggingConfig {
            include_trace_id: false,
            ..plain_config()
        });
        let req = test_request(&[]);
        let info = access.begin(&req, "10.0.0.1");

        let mut response = Response::builder().status(200).body(()).unwrap();
        access.complete(&mut response, &info);

        assert!(!response.headers().contains_key("x-trace-id"));
    }

    #[test]
    fn test_complete_falls_back_on_invalid_header_name() {
        let access = AccessLog::new(LoggingConfig {
            trace_id_header: "invalid header name".to_string(),
            ..plain_config()
        });
        let req = test_request(&[]);
        let info = access.begin(&req, "10.0.0.1");

        let mut response = Response::builder().status(200).body(()).unwrap();
        access.complete(&mut response, &info);

        assert!(response.headers().contains_key("x-trace-id"));
    }

    #[test]
    fn test_complete_falls_back_on_invalid_header_value() {
        let access = AccessLog::new(propagating_config());
        let info = RequestInfo {
            trace_id: "\u{0}\u{1}".to_string(),
            method: "GET".to_string(),
            path: "/".to_string(),
            remote_addr: "10.0.0.1".to_string(),
            user_agent: "test".to_string(),
            start_time_ms: 0,
        };

        let mut response = Response::builder().status(200).body(()).unwrap();
        access.complete(&mut response, &info);

        assert_eq!(
            response.headers().get("x-trace-id").unwrap(),
            "invalid-trace-id"
        );
    }

    #[test]
    fn test_structured_paths_do_not_panic() {
        test_logger::init_test_logger();

        let access = AccessLog::new(LoggingConfig {
            structured: true,
            ..propagating_config()
        });
        let req = test_request(&[("user-agent", "curl/8.0")]);

        let info = access.begin(&req, "10.0.0.1");
        let mut response = Response::builder().status(404).body(()).unwrap();
        access.complete(&mut response, &info);
    }
}
