//! # HTTP Accept Loop
//!
//! Accepts connections and serves the HTTP surface (spec.md §4.4), with
//! graceful shutdown: stop accepting, drain in-flight requests up to a grace
//! period, then return. Grounded directly on
//! `jizhuozhi-hermes/gateway/src/server/mod.rs::run_proxy_server` — same
//! `TcpListener` + `tokio::select!` + `hyper_util::server::conn::auto`
//! shape, with the admin/client/internal path groups served from the single
//! listener `hkv-node` binds (spec.md §6's surface has no separate admin
//! bind address, unlike the teacher's split proxy/admin ports).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{error, info};

use crate::http;
use crate::state::NodeState;

/// Grace period for draining in-flight requests on shutdown (spec.md §4.4
/// "e.g., 30 s").
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the HTTP listener until `shutdown` is notified, then drains
/// in-flight connections before returning.
pub async fn run(listen: &str, state: Arc<NodeState>, shutdown: Arc<Notify>) -> std::io::Result<()> {
    let addr: SocketAddr = listen
        .parse()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("invalid listen address: {err}")))?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "hkv-node: listening");

    let active_conns = Arc::new(AtomicI64::new(0));

    loop {
        let accepted = tokio::select! {
            result = listener.accept() => result,
            _ = shutdown.notified() => {
                info!("hkv-node: stop accepting new connections, draining");
                break;
            }
        };

        let (stream, peer_addr) = match accepted {
            Ok(v) => v,
            Err(err) => {
                error!(error = %err, "hkv-node: accept failed");
                continue;
            }
        };

        active_conns.fetch_add(1, Ordering::Relaxed);
        let state = Arc::clone(&state);
        let active_conns = Arc::clone(&active_conns);

        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let svc = service_fn(move |req: Request<Incoming>| {
                let state = Arc::clone(&state);
                async move { http::route(req, state).await }
            });

            if let Err(err) = auto::Builder::new(TokioExecutor::new())
                .http1()
                .keep_alive(true)
                .http2()
                .serve_connection_with_upgrades(io, svc)
                .await
            {
                if !err.to_string().contains("connection closed") {
                    error!(peer = %peer_addr, error = %err, "hkv-node: connection error");
                }
            }

            active_conns.fetch_sub(1, Ordering::Relaxed);
        });
    }

    let active = active_conns.load(Ordering::Relaxed);
    if active > 0 {
        info!(active, "hkv-node: waiting for connections to drain");
        let drain = async {
            loop {
                if active_conns.load(Ordering::Relaxed) <= 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        };
        match tokio::time::timeout(DRAIN_TIMEOUT, drain).await {
            Ok(()) => info!("hkv-node: all connections drained"),
            Err(_) => {
                let remaining = active_conns.load(Ordering::Relaxed);
                info!(remaining, seconds = DRAIN_TIMEOUT.as_secs(), "hkv-node: drain timed out");
            }
        }
    }

    Ok(())
}

/// Installs a `tokio::signal` handler for SIGINT/SIGTERM and notifies
/// `shutdown` on either (spec.md §4.4/§6).
pub async fn wait_for_shutdown_signal(shutdown: Arc<Notify>) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => error!(error = %err, "hkv-node: failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("hkv-node: received SIGINT"),
        _ = terminate => info!("hkv-node: received SIGTERM"),
    }

    shutdown.notify_waiters();
}
