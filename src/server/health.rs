//! Liveness and readiness endpoints on a side port.
//!
//! Runs detached from the proxy listener so orchestrators can probe the
//! process even while the main socket is draining.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming as IncomingBody;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use log::error;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Debug)]
pub struct HealthServer {
    is_ready: Arc<AtomicBool>,
    _handle: JoinHandle<()>,
}

impl HealthServer {
    /// Spawn the probe listener on `0.0.0.0:port`.
    ///
    /// Readiness starts out false; the proxy flips it once its own listener
    /// is bound. A bind failure here is logged and leaves the process
    /// without probes rather than tearing it down.
    pub fn new(port: u16) -> Self {
        let is_ready = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(run_probe_listener(port, is_ready.clone()));

        Self {
            is_ready,
            _handle: handle,
        }
    }

    pub fn set_ready(&self) {
        self.is_ready.store(true, Ordering::Relaxed);
    }

    /// Fail readiness probes while the main listener drains.
    pub fn set_not_ready(&self) {
        self.is_ready.store(false, Ordering::Relaxed);
    }
}

async fn run_probe_listener(port: u16, ready: Arc<AtomicBool>) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Health server failed to bind port {port}: {e}");
            return;
        }
    };

    loop {
        let stream = match listener.accept().await {
            Ok((stream, _)) => stream,
            Err(e) => {
                error!("Health server accept failed: {e}");
                continue;
            }
        };

        let ready = ready.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req: Request<IncomingBody>| {
                let ready = ready.clone();
                async move { Ok::<_, Infallible>(probe_response(&req, &ready)) }
            });

            let served = AutoBuilder::new(TokioExecutor::new())
                .serve_connection(TokioIo::new(stream), service)
                .await;
            if let Err(err) = served {
                error!("Health server connection error: {err}");
            }
        });
    }
}

fn probe_response(req: &Request<IncomingBody>, ready: &AtomicBool) -> Response<Full<Bytes>> {
    match req.uri().path() {
        "/health" => text(StatusCode::OK, "OK"),
        "/ready" if ready.load(Ordering::Relaxed) => text(StatusCode::OK, "READY"),
        "/ready" => text(StatusCode::SERVICE_UNAVAILABLE, "NOT READY"),
        _ => text(StatusCode::NOT_FOUND, "Not Found"),
    }
}

fn text(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from_static(body.as_bytes())))
        .unwrap()
}
