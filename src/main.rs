//! Pickup Point Service
//!
//! Hosts the box, pickup point and order services over PostgreSQL (or an
//! in-memory store), with the sharded cache and its sweeper running in the
//! background.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Pickup Point Service                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │   Services   │───▶│ ShardedCache │    │  Datastore   │       │
//! │  │ (use cases)  │───────────────────────▶│ (Postgres /  │       │
//! │  │              │    │  + sweeper   │    │   memory)    │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! │   /healthz /readyz (health addr)     /metrics (metrics addr)    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, ValueEnum};
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pickup_point_service::adapters::{
    InMemoryDatastore, LoggingAuditPublisher, PgConfig, PgDatastore,
};
use pickup_point_service::cache::{CacheConfig, ShardedCache};
use pickup_point_service::domain::{Datastore, OpContext, Repositories};
use pickup_point_service::metrics::{ServiceMetrics, CONTENT_TYPE as METRICS_CONTENT_TYPE};
use pickup_point_service::usecase::{ServiceSettings, Services, WeightCheckPolicy};

// =============================================================================
// CLI Arguments
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreBackend {
    Postgres,
    Memory,
}

/// Pickup Point Service - boxes, pickup points and orders
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Datastore backend
    #[arg(long, env = "STORE_BACKEND", value_enum, default_value = "postgres")]
    store: StoreBackend,

    /// PostgreSQL host
    #[arg(long, env = "DATABASE_HOST", default_value = "localhost")]
    database_host: String,

    /// PostgreSQL port
    #[arg(long, env = "DATABASE_PORT", default_value = "5432")]
    database_port: u16,

    /// PostgreSQL database name
    #[arg(long, env = "DATABASE_NAME", default_value = "pvz")]
    database_name: String,

    /// PostgreSQL user
    #[arg(long, env = "DATABASE_USER", default_value = "postgres")]
    database_user: String,

    /// PostgreSQL password
    #[arg(long, env = "DATABASE_PASSWORD", default_value = "", hide_env_values = true)]
    database_password: String,

    /// Maximum pooled connections
    #[arg(long, env = "DATABASE_POOL_SIZE", default_value = "16")]
    database_pool_size: usize,

    /// Seconds between cache sweep passes
    #[arg(long, env = "CACHE_SWEEP_INTERVAL_SECONDS", default_value = "600")]
    cache_sweep_interval_seconds: u64,

    /// Hours an expired cache entry may linger before the sweep removes it
    #[arg(long, env = "CACHE_STALE_THRESHOLD_HOURS", default_value = "1.0")]
    cache_stale_threshold_hours: f64,

    /// TTL of cached boxes in seconds
    #[arg(long, env = "BOX_CACHE_TTL_SECONDS", default_value = "3600")]
    box_cache_ttl_seconds: u64,

    /// TTL of cached pickup points in seconds
    #[arg(long, env = "PICKUP_POINT_CACHE_TTL_SECONDS", default_value = "86400")]
    pickup_point_cache_ttl_seconds: u64,

    /// Weight check policy for new orders (strict, cached-fast-path)
    #[arg(long, env = "WEIGHT_CHECK_POLICY", default_value = "strict")]
    weight_check_policy: WeightCheckPolicy,

    /// Upper bound on each operation in seconds
    #[arg(long, env = "TRANSACTION_TIMEOUT_SECONDS")]
    transaction_timeout_seconds: Option<u64>,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn pg_config(&self) -> PgConfig {
        PgConfig {
            host: self.database_host.clone(),
            port: self.database_port,
            dbname: self.database_name.clone(),
            user: self.database_user.clone(),
            password: self.database_password.clone(),
            max_size: self.database_pool_size,
            ..Default::default()
        }
    }

    fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            sweep_interval: Duration::from_secs(self.cache_sweep_interval_seconds),
            stale_threshold_hours: self.cache_stale_threshold_hours,
        }
    }

    fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            box_ttl: Duration::from_secs(self.box_cache_ttl_seconds),
            pickup_point_ttl: Duration::from_secs(self.pickup_point_cache_ttl_seconds),
            weight_check_policy: self.weight_check_policy,
            transaction_timeout: self.transaction_timeout_seconds.map(Duration::from_secs),
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting Pickup Point Service");
    info!("  Store backend: {:?}", args.store);
    info!("  Weight check policy: {}", args.weight_check_policy);
    info!(
        "  Cache sweep: every {}s, stale after {}h",
        args.cache_sweep_interval_seconds, args.cache_stale_threshold_hours
    );

    match args.store {
        StoreBackend::Postgres => {
            let pool = args
                .pg_config()
                .create_pool()
                .context("Failed to create database pool")?;
            let store = PgDatastore::new(pool);
            store.ping().await.context("Database is not reachable")?;

            info!(
                "Connected to PostgreSQL at {}:{}/{}",
                args.database_host, args.database_port, args.database_name
            );
            serve(&args, Arc::new(store)).await
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory store; all data is lost on exit");
            serve(&args, Arc::new(InMemoryDatastore::new())).await
        }
    }
}

async fn serve<D: Datastore>(args: &Args, store: Arc<D>) -> anyhow::Result<()> {
    let cache_config = args.cache_config();
    cache_config.validate()?;

    let shutdown = CancellationToken::new();
    let ready = Arc::new(AtomicBool::new(false));

    // Cache and its sweeper
    let cache = Arc::new(ShardedCache::new(cache_config));
    let sweeper = cache.spawn_sweeper(shutdown.child_token());

    let metrics = ServiceMetrics::new()?;
    // Request routing attaches to these from the transport layer
    let _services = Services::new(
        Arc::clone(&store),
        cache.clone(),
        Arc::new(LoggingAuditPublisher::new(Level::INFO)),
        metrics.clone(),
        args.service_settings(),
    );

    // Probe the store before reporting ready
    let ctx = OpContext::with_token(shutdown.child_token()).with_timeout(Duration::from_secs(10));
    let boxes = ctx
        .run("startup probe", store.boxes().count())
        .await
        .context("Startup store probe failed")?;
    info!(boxes, "Services initialized");
    ready.store(true, Ordering::Release);

    // Start health server
    let health_addr = args.health_addr.clone();
    let health_ready = Arc::clone(&ready);
    let health_shutdown = shutdown.child_token();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr, health_ready, health_shutdown).await {
            error!("Health server error: {:#}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    let metrics_shutdown = shutdown.child_token();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, metrics, metrics_shutdown).await {
            error!("Metrics server error: {:#}", e);
        }
    });

    shutdown_signal().await;

    info!("Shutting down");
    ready.store(false, Ordering::Release);
    shutdown.cancel();

    if let Err(e) = sweeper.await {
        warn!("Cache sweeper did not stop cleanly: {}", e);
    }

    let stats = cache.stats();
    info!(
        entries = stats.total_entries(),
        hits = stats.hits,
        misses = stats.misses,
        swept = stats.swept,
        "Final cache statistics"
    );
    if let Err(e) = cache.close() {
        warn!("Failed to close cache: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "tokio_postgres=info", "deadpool_postgres=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// HTTP Servers
// =============================================================================

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

fn health_response(path: &str, ready: bool) -> Response<Full<Bytes>> {
    match path {
        "/healthz" | "/livez" => text_response(StatusCode::OK, "ok"),
        "/readyz" if ready => text_response(StatusCode::OK, "ok"),
        "/readyz" => text_response(StatusCode::SERVICE_UNAVAILABLE, "not ready"),
        _ => text_response(StatusCode::NOT_FOUND, "not found"),
    }
}

fn metrics_response(path: &str, metrics: &ServiceMetrics) -> Response<Full<Bytes>> {
    if path != "/metrics" {
        return text_response(StatusCode::NOT_FOUND, "not found");
    }

    match metrics.encode() {
        Ok(buffer) => {
            let mut response = text_response(StatusCode::OK, buffer);
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(METRICS_CONTENT_TYPE));
            response
        }
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics")
        }
    }
}

async fn bind(addr: &str, name: &str) -> anyhow::Result<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("Invalid {} server address: {}", name, addr))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {} server on {}", name, addr))?;

    info!("{} server listening on {}", name, addr);
    Ok(listener)
}

// =============================================================================
// Health Server
// =============================================================================

async fn run_health_server(
    addr: &str,
    ready: Arc<AtomicBool>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = bind(addr, "Health").await?;

    loop {
        let (stream, _) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted.context("Health server accept error")?,
        };

        let io = TokioIo::new(stream);
        let ready = Arc::clone(&ready);

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let response = health_response(req.uri().path(), ready.load(Ordering::Acquire));
                async move { Ok::<_, Infallible>(response) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Health server connection error: {}", e);
            }
        });
    }

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(
    addr: &str,
    metrics: ServiceMetrics,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = bind(addr, "Metrics").await?;

    loop {
        let (stream, _) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted.context("Metrics server accept error")?,
        };

        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let response = metrics_response(req.uri().path(), &metrics);
                async move { Ok::<_, Infallible>(response) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Metrics server connection error: {}", e);
            }
        });
    }

    Ok(())
}
