//! HTTP listener and per-request dispatch
//!
//! One task per accepted connection; within a request the order is fixed:
//! wake signal (fire-and-forget), then probe, then either forward or serve
//! the interstitial. No state survives a request.

use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::{json_error_response, ResponseBody};
use crate::interstitial;
use crate::probe::{self, ProbeOutcome};
use crate::upstream::UpstreamClient;
use crate::wake::Waker;

/// Read-only state shared by all requests.
pub struct GatewayState {
    pub config: Config,
    pub upstream: UpstreamClient,
    pub waker: Waker,
}

impl GatewayState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let upstream = UpstreamClient::new(&config)?;
        let waker = Waker::new(
            config.target.mac,
            config.wake.broadcast.clone(),
            config.wake.port,
        );
        Ok(Self {
            config,
            upstream,
            waker,
        })
    }
}

/// The gateway's HTTP server
pub struct GatewayServer {
    bind_addr: SocketAddr,
    state: Arc<GatewayState>,
    shutdown_rx: watch::Receiver<bool>,
}

impl GatewayServer {
    pub fn new(
        bind_addr: SocketAddr,
        state: Arc<GatewayState>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            bind_addr,
            state,
            shutdown_rx,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        self.serve(listener).await
    }

    /// Accept connections from an already-bound listener until shutdown is
    /// signaled. Split out so tests can bind an ephemeral port themselves.
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        info!(addr = %listener.local_addr()?, "Gateway listening (HTTP/1.1 and HTTP/2)");

        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let state = Arc::clone(&self.state);
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, addr, state).await {
                                    debug!(addr = %addr, error = %e, "Connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Gateway shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<GatewayState>,
) -> anyhow::Result<()> {
    let io = TokioIo::new(stream);

    let service = service_fn(move |req: Request<Incoming>| {
        let state = Arc::clone(&state);
        async move { handle_request(req, state, addr).await }
    });

    // auto::Builder serves both HTTP/1.1 and HTTP/2 (h2c) on the same port
    AutoBuilder::new(TokioExecutor::new())
        .http1()
        .preserve_header_case(true)
        .http2()
        .max_concurrent_streams(250)
        .serve_connection(io, service)
        .await
        .map_err(|e| anyhow::anyhow!("Connection error: {}", e))?;

    Ok(())
}

/// Short random token grouping all log lines of one request.
fn correlation_id() -> String {
    format!("{:08x}", rand::random::<u32>())
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<GatewayState>,
    client_addr: SocketAddr,
) -> Result<Response<ResponseBody>, hyper::Error> {
    let request_id = correlation_id();
    let original_url = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    info!(
        request_id,
        method = %req.method(),
        url = %original_url,
        client = %client_addr,
        "Request start"
    );

    // Wake on every request, not just when the backend looks asleep: the
    // device may have gone back to sleep since the previous probe, and the
    // broadcast is idempotent. Never awaited by the response path.
    state.waker.spawn_wake(request_id.clone());

    let outcome = probe::probe(
        &state.config.target_authority(),
        state.config.probe_timeout(),
    )
    .await;

    match outcome {
        ProbeOutcome::Reachable => {
            debug!(request_id, "Backend reachable, forwarding");
            match state.upstream.forward(req, client_addr, &request_id).await {
                Ok(response) => {
                    info!(request_id, status = %response.status(), "Request proxied");
                    Ok(response)
                }
                Err(e) => {
                    error!(request_id, error = %e, "Forwarding failed");
                    Ok(json_error_response(e.code(), e.to_string()))
                }
            }
        }
        ProbeOutcome::Unreachable(cause) => {
            info!(
                request_id,
                cause = %cause,
                refresh_delay_secs = state.config.gateway.refresh_delay_secs,
                "Backend not reachable, serving interstitial"
            );
            Ok(interstitial::interstitial_response(
                &original_url,
                &state.config.target.host,
                state.config.gateway.refresh_delay_secs,
            ))
        }
    }
}
