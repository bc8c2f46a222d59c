//! HTTP build server
//!
//! Routes form a fixed dispatch table:
//!
//! | Route                | Method | Handler                                  |
//! |----------------------|--------|------------------------------------------|
//! | `/begin`             | POST   | register a manifest, report missing files |
//! | `/upload/{hash}`     | POST   | store one file in the content cache       |
//! | `/build/{id}`        | GET    | build and return the artifact             |
//! | `/version`           | GET    | toolchain version (`?format=json`)        |
//!
//! Wrong methods get 405 and unknown paths 404 from the router itself.

pub mod handlers;

pub use handlers::{ApiError, AppState};

use crate::build::{scratch, CompilerBackend, GoToolchain, Orchestrator};
use crate::cache::ContentCache;
use crate::config::schema::{ListenConfig, ServerConfig};
use crate::error::{OffbuildError, OffbuildResult};
use crate::model::routes;
use crate::session::SessionRegistry;
use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Upper bound on a manifest body; uploads are streamed and not limited
const MANIFEST_LIMIT: usize = 64 * 1024 * 1024;

/// How long in-flight requests may run after a shutdown signal (TLS listener)
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// A configured build server, ready to serve
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a server building with the Go toolchain from `config`
    pub async fn new(config: &ServerConfig) -> OffbuildResult<Self> {
        let backend = Arc::new(GoToolchain::new(config.toolchain.root.clone()));
        Self::with_backend(config, backend).await
    }

    /// Create a server with an explicit compiler backend.
    ///
    /// Creates the cache and scratch directories and clears scratch trees
    /// left behind by a previous run.
    pub async fn with_backend(
        config: &ServerConfig,
        backend: Arc<dyn CompilerBackend>,
    ) -> OffbuildResult<Self> {
        let cache = ContentCache::open(config.cache_dir()).await?;

        let scratch_dir = config.scratch_dir();
        let stale = scratch::clear_stale(&scratch_dir).await?;
        if stale > 0 {
            warn!("Removed {} stale scratch tree(s) from a previous run", stale);
        }
        tokio::fs::create_dir_all(&scratch_dir).await.map_err(|e| {
            OffbuildError::io(format!("creating {}", scratch_dir.display()), e)
        })?;

        info!(
            backend = backend.backend_name(),
            "Data directory {}",
            config.general.data_dir.display()
        );

        let sessions = SessionRegistry::new(Duration::from_secs(config.session.timeout_secs));
        let orchestrator = Orchestrator::new(cache.clone(), backend, scratch_dir);

        Ok(Self {
            state: AppState {
                cache,
                sessions,
                orchestrator,
            },
        })
    }

    /// The route table, bound to this server's state
    pub fn router(&self) -> Router {
        Router::new()
            .route(routes::BEGIN, post(handlers::begin))
            .route(&format!("{}/{{hash}}", routes::UPLOAD), post(handlers::upload))
            .route(&format!("{}/{{id}}", routes::BUILD), get(handlers::build))
            .route(routes::VERSION, get(handlers::version))
            .layer(DefaultBodyLimit::max(MANIFEST_LIMIT))
            .layer(middleware::from_fn(access_log))
            .with_state(self.state.clone())
    }

    /// Serve on the configured address, with TLS when a certificate is set
    pub async fn serve(self, listen: &ListenConfig) -> OffbuildResult<()> {
        match (&listen.tls_cert, &listen.tls_key) {
            (Some(cert), Some(key)) => {
                // Several rustls providers may be compiled in; pin ring.
                let _ = rustls::crypto::ring::default_provider().install_default();

                let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert, key)
                    .await
                    .map_err(|e| OffbuildError::io("loading TLS certificate and key", e))?;
                let addr = resolve(&listen.addr).await?;

                let handle = axum_server::Handle::new();
                let shutdown = handle.clone();
                tokio::spawn(async move {
                    shutdown_signal().await;
                    shutdown.graceful_shutdown(Some(SHUTDOWN_GRACE));
                });

                info!("Listening on https://{}", addr);
                axum_server::bind_rustls(addr, tls)
                    .handle(handle)
                    .serve(self.router().into_make_service())
                    .await
                    .map_err(|e| OffbuildError::io("serving HTTPS", e))
            }
            _ => {
                let listener = TcpListener::bind(&listen.addr).await.map_err(|e| {
                    OffbuildError::io(format!("binding {}", listen.addr), e)
                })?;
                self.serve_on(listener).await
            }
        }
    }

    /// Serve plain HTTP on an already-bound listener until shutdown
    pub async fn serve_on(self, listener: TcpListener) -> OffbuildResult<()> {
        if let Ok(addr) = listener.local_addr() {
            info!("Listening on http://{}", addr);
        }

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| OffbuildError::io("serving HTTP", e))
    }
}

async fn resolve(addr: &str) -> OffbuildResult<SocketAddr> {
    tokio::net::lookup_host(addr)
        .await
        .map_err(|e| OffbuildError::io(format!("resolving {addr}"), e))?
        .next()
        .ok_or_else(|| OffbuildError::Config(format!("{addr} did not resolve to an address")))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

/// One log line per request
async fn access_log(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    info!(
        %method,
        %path,
        status = response.status().as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        "request"
    );
    response
}
