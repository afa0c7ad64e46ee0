//! s3gate - transparent access-control gateway for S3-compatible stores.
//!
//! Clients keep speaking the S3 protocol (SigV4, path-style URLs) and only
//! change their endpoint. The gateway authenticates each request against its
//! credential database, enforces scope and policy checks, forwards permitted
//! requests to the backing store with its own credentials, and audits every
//! decision.
//!
//! # Usage
//!
//! ```text
//! s3gate-server --config configs/gateway.yaml
//! ```
//!
//! The config path can also be set via `S3GATE_CONFIG`. `RUST_LOG` overrides
//! the configured log level. SIGHUP reloads credentials and policies without
//! a restart; any failure during startup exits non-zero.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use s3gate_audit::AuditLogger;
use s3gate_auth::CredentialStore;
use s3gate_config::GatewayConfig;
use s3gate_http::error::s3_error_response;
use s3gate_policy::PolicyEngine;
use s3gate_proxy::{Gateway, HttpForwarder};

const DEFAULT_CONFIG_PATH: &str = "configs/gateway.yaml";

/// Resolve the config path from `--config`, then `S3GATE_CONFIG`, then the
/// default.
fn config_path() -> String {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(value) = args.next() {
                return value;
            }
        } else if let Some(value) = arg.strip_prefix("--config=") {
            return value.to_owned();
        }
    }
    std::env::var("S3GATE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_owned())
}

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise the configured log level.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// Build the gateway pipeline from configuration. Every failure here is
/// fatal.
fn build_gateway(cfg: &GatewayConfig) -> Result<Gateway> {
    let credentials = Arc::new(
        CredentialStore::new(&cfg.credentials_file)
            .with_context(|| format!("failed to initialize credential store from {}", cfg.credentials_file))?,
    );
    info!(path = %cfg.credentials_file, "credential store ready");

    let policies = Arc::new(
        PolicyEngine::new(&cfg.policies_file)
            .with_context(|| format!("failed to initialize policy engine from {}", cfg.policies_file))?,
    );
    info!(path = %cfg.policies_file, "policy engine ready");

    let forwarder = Arc::new(
        HttpForwarder::new(&cfg.backend).context("failed to initialize backend forwarder")?,
    );
    info!(endpoint = %cfg.backend.endpoint, region = %cfg.backend.region, "backend forwarder ready");

    let audit = Arc::new(AuditLogger::new(&cfg.audit).context("failed to initialize audit logger")?);
    if cfg.audit.enabled {
        info!(output = ?cfg.audit.output, "audit logging enabled");
    }

    // Reload on SIGHUP: both stores swap snapshots; a failed reload keeps
    // the previous one.
    spawn_reload_handler(Arc::clone(&credentials), Arc::clone(&policies));

    Ok(Gateway::new(
        credentials,
        policies,
        forwarder,
        audit,
        cfg.server.max_body_bytes,
    ))
}

fn spawn_reload_handler(credentials: Arc<CredentialStore>, policies: Arc<PolicyEngine>) {
    tokio::spawn(async move {
        let Ok(mut hangup) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
        else {
            warn!("failed to install SIGHUP handler, hot reload disabled");
            return;
        };

        while hangup.recv().await.is_some() {
            info!("SIGHUP received, reloading credentials and policies");
            if let Err(e) = credentials.reload() {
                error!(error = %e, "credential reload failed, keeping previous snapshot");
            }
            if let Err(e) = policies.reload() {
                error!(error = %e, "policy reload failed, keeping previous snapshot");
            }
        }
    });
}

/// Run the accept loop until a shutdown signal arrives, then drain.
async fn serve(listener: TcpListener, gateway: Gateway, cfg: &GatewayConfig) -> Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let mut http = HttpConnBuilder::new(TokioExecutor::new());
    http.http1()
        .timer(TokioTimer::new())
        .header_read_timeout(Duration::from_secs(cfg.server.read_timeout));

    let request_timeout = Duration::from_secs(cfg.server.write_timeout);
    let shutdown_timeout = Duration::from_secs(cfg.server.shutdown_timeout);

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining connections");
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let gateway = gateway.clone();
                let service = service_fn(move |req| {
                    let gateway = gateway.clone();
                    async move {
                        Ok::<_, Infallible>(handle_with_timeout(gateway, req, peer_addr, request_timeout).await)
                    }
                });

                let conn = http.serve_connection(TokioIo::new(stream), service);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        warn!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => break,
        }
    }

    // Give in-flight requests a bounded window to finish.
    if tokio::time::timeout(shutdown_timeout, graceful.shutdown())
        .await
        .is_err()
    {
        warn!("shutdown drain timed out, closing remaining connections");
    }
    info!("server stopped");

    Ok(())
}

/// Run the pipeline under the configured request deadline. A request that
/// exceeds it is answered with an internal error; the in-flight backend
/// call is dropped with the future.
async fn handle_with_timeout(
    gateway: Gateway,
    req: hyper::Request<hyper::body::Incoming>,
    peer_addr: SocketAddr,
    deadline: Duration,
) -> hyper::Response<s3gate_http::GatewayBody> {
    match tokio::time::timeout(deadline, gateway.handle(req, peer_addr)).await {
        Ok(response) => response,
        Err(_) => {
            let request_id = uuid::Uuid::new_v4().to_string();
            error!(request_id = %request_id, "request exceeded deadline");
            s3_error_response(
                hyper::StatusCode::INTERNAL_SERVER_ERROR,
                "InternalError",
                "We encountered an internal error. Please try again.",
                None,
                &request_id,
            )
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = config_path();
    let cfg = s3gate_config::load_gateway_config(&config_path)
        .with_context(|| format!("failed to load configuration from {config_path}"))?;

    init_tracing(&cfg.log_level)?;

    info!(
        config = %config_path,
        port = cfg.server.port,
        backend = %cfg.backend.endpoint,
        "starting s3gate",
    );

    let gateway = build_gateway(&cfg)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.server.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    info!(%addr, "listening for connections");

    serve(listener, gateway, &cfg).await
}
