//! etfwatch - Korean equity/ETF watchlist backend.
//!
//! Wires the application context (store, cache, upstream client,
//! collector, scheduler) and serves the REST API.

use anyhow::{Context, Result};
use clap::Parser;
use etfwatch_backend::{
    api::{build_router, AppContext},
    cache::Cache,
    collector::Collector,
    config::Config,
    scheduler::Scheduler,
    store::Store,
    upstream::{HostRateLimiter, NaverClient, UpstreamApi, UpstreamHttp},
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "etfwatch", about = "Korean equity/ETF market-data backend")]
struct Args {
    /// Listen port (overrides PORT from the environment).
    #[arg(long)]
    port: Option<u16>,
    /// SQLite database path (overrides DATABASE_PATH).
    #[arg(long)]
    db_path: Option<String>,
    /// Disable the KST collection scheduler.
    #[arg(long)]
    no_scheduler: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = Config::from_env().context("failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(db_path) = args.db_path {
        config.database_path = db_path;
    }
    if args.no_scheduler {
        config.scheduler_enabled = false;
    }

    info!(
        db = %config.database_path,
        port = config.port,
        production = config.production,
        "etfwatch starting"
    );

    let store = Arc::new(
        Store::open(&config.database_path, config.pool_size)
            .context("failed to open database")?,
    );
    let cache = Arc::new(Cache::new(config.cache_max_size));

    let limiter = Arc::new(HostRateLimiter::new(
        config.upstream_rate_per_sec * 2,
        config.upstream_rate_per_sec,
    ));
    let http = UpstreamHttp::new(limiter, Duration::from_secs(config.upstream_timeout_secs))
        .context("failed to build upstream http client")?;
    let upstream: Arc<dyn UpstreamApi> = Arc::new(NaverClient::new(http));

    let collector = Arc::new(Collector::new(
        Arc::clone(&store),
        Arc::clone(&upstream),
        Arc::clone(&cache),
    ));
    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&collector),
        config.default_collect_days,
        config.scheduler_interval_minutes,
    ));

    if config.scheduler_enabled {
        tokio::spawn(Arc::clone(&scheduler).run());
    } else {
        info!("scheduler disabled");
    }

    let port = config.port;
    let state = Arc::new(AppContext {
        config,
        store,
        cache,
        collector,
        upstream,
        scheduler,
    });
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .await
        .context("server terminated")?;
    Ok(())
}
