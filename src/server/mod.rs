// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The listening side of Periscope.
//!
//! Built on **hyper-util**'s `auto::Builder`, so HTTP/1.1 and HTTP/2
//! clients share one port with no configuration. This layer owns the
//! socket, serves the landing page at `/`, and lifts Hyper's body types
//! into the [`ProxyRequest`] / [`ProxyResponse`] pair the core works with.
//!
//! ## Streaming
//! Request bodies stream to the upstream as they arrive, and upstream
//! bodies stream back out, with one exception: HTML documents are buffered
//! by the core so links can be rewritten before a single byte reaches the
//! client.
//!
//! ## Error boundary
//! Every failure that escapes the pipeline is normalized here into one
//! response shape: HTTP 500 with a JSON body `{"error": "<message>"}`.
//! A connection task never returns an error to hyper.

mod health;
mod landing;

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::TryStreamExt;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use log::{debug, error, info, warn};
use reqwest::Body;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::signal;
use tokio::sync::{RwLock, oneshot};
use tokio::task::{Id, JoinSet};

use crate::core::{ProxyCore, ProxyError, ProxyRequest, ProxyResponse};
use crate::logging::LoggingConfig;
use crate::logging::access::AccessLog;
use health::HealthServer;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Connection tasks register a drain sender here so shutdown can reach them.
type DrainMap = Arc<RwLock<HashMap<Id, oneshot::Sender<()>>>>;

/// Listener settings for the proxy socket and its health sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface the listener binds.
    #[serde(default = "localhost")]
    pub host: String,

    /// Port the proxy itself answers on.
    #[serde(default = "proxy_port")]
    pub port: u16,

    /// Separate port for the liveness and readiness probes.
    #[serde(default = "probe_port")]
    pub health_port: u16,
}

fn localhost() -> String {
    "127.0.0.1".to_string()
}

fn proxy_port() -> u16 {
    8080
}

fn probe_port() -> u16 {
    8081
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: localhost(),
            port: proxy_port(),
            health_port: probe_port(),
        }
    }
}

/// HTTP front of the proxy: owns the listener and the per-connection tasks.
#[derive(Debug, Clone)]
pub struct ProxyServer {
    config: ServerConfig,
    core: Arc<ProxyCore>,
    /// Shared by every connection so request lines land in one place.
    access_log: Arc<AccessLog>,
    /// Live connection tasks, by task id.
    drain_map: DrainMap,
}

impl ProxyServer {
    /// Build a server around a core, picking up `proxy.logging` for the
    /// access log.
    pub fn new(config: ServerConfig, core: Arc<ProxyCore>) -> Self {
        let logging = core
            .config
            .get::<LoggingConfig>("proxy.logging")
            .ok()
            .flatten()
            .unwrap_or_default();

        Self {
            config,
            core,
            access_log: Arc::new(AccessLog::new(logging)),
            drain_map: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Bind the listener and serve until Ctrl-C or SIGTERM arrives, then
    /// drain open connections before returning.
    pub async fn start(&self) -> Result<(), ProxyError> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| ProxyError::Other(format!("Invalid listen address: {}", e)))?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ProxyError::Other(format!("Could not bind {}: {}", addr, e)))?;

        info!("Periscope listening on http://{}", addr);

        // Last-resort Host value when neither headers nor the URI carry one
        let local_authority = addr.to_string();

        let health_server = HealthServer::new(self.config.health_port);
        health_server.set_ready();

        #[cfg(unix)]
        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| ProxyError::Other(format!("Failed to install SIGTERM handler: {}", e)))?;

        // One future for both signals, resolving to whichever fired first.
        let shutdown = async move {
            #[cfg(unix)]
            {
                tokio::select! {
                    _ = signal::ctrl_c() => "Ctrl-C",
                    _ = sigterm.recv() => "SIGTERM",
                }
            }
            #[cfg(not(unix))]
            {
                let _ = signal::ctrl_c().await;
                "Ctrl-C"
            }
        };
        tokio::pin!(shutdown);

        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                reason = &mut shutdown => {
                    info!("Received {}; draining open connections", reason);
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            error!("Accept error: {}", e);
                            continue;
                        }
                    };

                    let (drain_tx, drain_rx) = oneshot::channel();
                    let handle = connections.spawn(serve_connection(
                        stream,
                        drain_rx,
                        self.core.clone(),
                        self.access_log.clone(),
                        remote_addr.ip().to_string(),
                        local_authority.clone(),
                        self.drain_map.clone(),
                    ));
                    self.drain_map.write().await.insert(handle.id(), drain_tx);
                }
            }
        }

        // Readiness goes away first so orchestrators stop routing here
        health_server.set_not_ready();

        let drains: Vec<_> = {
            let mut map = self.drain_map.write().await;
            map.drain().map(|(_, tx)| tx).collect()
        };
        info!("Signaling {} connection(s) to finish", drains.len());
        for tx in drains {
            let _ = tx.send(());
        }

        drain_connections(connections).await;
        drop(health_server);

        info!("Shutdown complete");
        Ok(())
    }
}

/// Serve one accepted connection until it closes or shutdown drains it.
async fn serve_connection(
    stream: TcpStream,
    drain: oneshot::Receiver<()>,
    core: Arc<ProxyCore>,
    access_log: Arc<AccessLog>,
    client_ip: String,
    local_authority: String,
    drain_map: DrainMap,
) {
    let task_id = tokio::task::id();

    let service = service_fn(move |req: Request<Incoming>| {
        debug!("Request arrived over {:?}", req.version());
        handle_request(
            req,
            core.clone(),
            access_log.clone(),
            client_ip.clone(),
            local_authority.clone(),
        )
    });

    let builder = AutoBuilder::new(TokioExecutor::new());
    let connection = builder.serve_connection(TokioIo::new(stream), service);
    let mut connection = std::pin::pin!(connection);

    tokio::select! {
        served = connection.as_mut() => log_connection_end(served),
        _ = drain => {
            // Finish in-flight requests, take nothing new on this socket.
            connection.as_mut().graceful_shutdown();
            log_connection_end(connection.await);
        }
    }

    drain_map.write().await.remove(&task_id);
}

/// Peers hanging up mid-exchange surface as errors here; only real faults
/// are worth a log line.
fn log_connection_end(served: Result<(), Box<dyn std::error::Error + Send + Sync>>) {
    if let Err(e) = served {
        let text = e.to_string();
        if !text.contains("connection closed") && !text.contains("connection reset") {
            error!("Connection error: {}", e);
        }
    }
}

/// Wait for connection tasks to finish, aborting whatever outlives the
/// grace period.
async fn drain_connections(mut connections: JoinSet<()>) {
    let grace = tokio::time::Duration::from_secs(30);
    let started = tokio::time::Instant::now();
    let total = connections.len();

    let all_done = tokio::time::timeout(grace, async {
        let mut closed = 0usize;
        while let Some(joined) = connections.join_next().await {
            closed += 1;
            match joined {
                Ok(()) => debug!("Connection {}/{} drained", closed, total),
                Err(e) if e.is_cancelled() => debug!("Connection {}/{} cancelled", closed, total),
                Err(e) => error!("Connection task failed: {}", e),
            }
        }
    })
    .await;

    match all_done {
        Ok(()) => info!(
            "All {} connection(s) drained in {:.1}s",
            total,
            started.elapsed().as_secs_f32()
        ),
        Err(_) => {
            warn!(
                "{} connection(s) still open after {}s; aborting them",
                connections.len(),
                grace.as_secs()
            );
            connections.shutdown().await;
        }
    }
}

/// Scheme the client used to reach the proxy.
///
/// Absolute-form request URIs carry it directly; behind a TLS-terminating
/// front we trust `x-forwarded-proto`; otherwise assume plain http.
fn request_scheme<B>(req: &Request<B>) -> String {
    if let Some(scheme) = req.uri().scheme_str() {
        return scheme.to_string();
    }

    if let Some(proto) = req
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
    {
        // Proxies append values comma-separated; the first hop wins.
        if let Some(first) = proto.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_ascii_lowercase();
            }
        }
    }

    "http".to_string()
}

/// Host the client addressed the proxy as.
///
/// `x-forwarded-host` wins, then the Host header, then the request
/// authority (HTTP/2 carries it there), then the bound address.
fn request_host<B>(req: &Request<B>, local_authority: &str) -> String {
    if let Some(host) = req
        .headers()
        .get("x-forwarded-host")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = host.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(host) = req.headers().get(hyper::header::HOST).and_then(|v| v.to_str().ok()) {
        return host.to_string();
    }

    if let Some(authority) = req.uri().authority() {
        return authority.to_string();
    }

    local_authority.to_string()
}

/// Lift a hyper request into the core's request type, streaming the body.
fn build_proxy_request(
    req: Request<Incoming>,
    client_ip: String,
    local_authority: String,
) -> ProxyRequest {
    let scheme = request_scheme(&req);
    let host = request_host(&req, &local_authority);

    let method = req.method().clone();
    let uri = req.uri().clone();
    let headers = req.headers().clone();

    let body = Body::wrap_stream(req.into_body().into_data_stream());

    ProxyRequest {
        method,
        path: uri.path().to_owned(),
        query: uri.query().map(str::to_owned),
        headers,
        body,
        scheme,
        host,
        client_ip: Some(client_ip),
    }
}

/// Turn the core's response into the hyper response handed to the client.
fn client_response_from(resp: ProxyResponse) -> Result<Response<Body>, ProxyError> {
    let status = StatusCode::from_u16(resp.status)
        .map_err(|e| ProxyError::Other(format!("Unusable upstream status {}: {}", resp.status, e)))?;

    let stream = resp.body.into_data_stream().map_err(|e| {
        error!("Upstream body stream failed: {}", e);
        std::io::Error::other(e)
    });

    let mut response = Response::new(Body::wrap_stream(stream));
    *response.status_mut() = status;
    *response.headers_mut() = resp.headers;
    Ok(response)
}

/// Build the single client-facing error shape: 500 plus a JSON body.
fn error_response(message: &str) -> Response<Body> {
    let body = serde_json::json!({ "error": message }).to_string();

    Response::builder()
        .status(500)
        .header(CONTENT_TYPE, "application/json; charset=utf-8")
        .body(Body::from(body))
        .unwrap()
}

/// Entry point for every request on a connection: wrap the routing in
/// access logging.
async fn handle_request(
    req: Request<Incoming>,
    core: Arc<ProxyCore>,
    access_log: Arc<AccessLog>,
    client_ip: String,
    local_authority: String,
) -> Result<Response<Body>, Infallible> {
    let request_info = access_log.begin(&req, &client_ip);

    let mut response = route_request(req, core, client_ip, local_authority).await;

    access_log.complete(&mut response, &request_info);
    Ok(response)
}

/// Route one request to the landing page or through the core.
async fn route_request(
    req: Request<Incoming>,
    core: Arc<ProxyCore>,
    client_ip: String,
    local_authority: String,
) -> Response<Body> {
    if req.uri().path() == "/" {
        return landing::response();
    }

    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let proxy_req = build_proxy_request(req, client_ip, local_authority);

    let outcome = core
        .process_request(proxy_req)
        .await
        .and_then(client_response_from);

    match outcome {
        Ok(response) => {
            debug!("{} {} -> {}", method, path, response.status());
            response
        }
        Err(e) => {
            match &e {
                ProxyError::InvalidTarget(msg) => {
                    warn!("Invalid target for {} {}: {}", method, path, msg)
                }
                ProxyError::ClientError(err) => {
                    error!("Upstream failure for {} {}: {}", method, path, err)
                }
                _ => error!("Error handling {} {}: {}", method, path, e),
            }
            error_response(&e.to_string())
        }
    }
}
