use anyhow::Result;
use clap::Parser;
use postfeed_core::config::{CachePolicy, FeedConfig};
use server::{build_app, open_feed};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Store directory written by the indexer
    #[arg(long, default_value = "./store")]
    store: String,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Maximum number of cached search terms
    #[arg(long, default_value_t = 50_000)]
    cache_capacity: usize,
    /// Seconds before a cached term is refreshed in the background
    #[arg(long, default_value_t = 60)]
    cache_refresh_secs: u64,
    /// Seconds before a cached term is dropped outright
    #[arg(long, default_value_t = 86_400)]
    cache_expire_secs: u64,
    /// Seconds between sweeps for expired cache entries
    #[arg(long, default_value_t = 300)]
    maintenance_secs: u64,
    #[arg(long, default_value_t = 10_000)]
    request_timeout_ms: u64,
    /// Cap on the `limit` query parameter; unbounded when unset
    #[arg(long)]
    max_limit: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let policy = CachePolicy {
        capacity: args.cache_capacity,
        refresh_after_write: Duration::from_secs(args.cache_refresh_secs),
        expire_after_write: Duration::from_secs(args.cache_expire_secs),
    };
    let config = FeedConfig {
        max_limit: args.max_limit,
        request_timeout: Duration::from_millis(args.request_timeout_ms),
        ..FeedConfig::default()
    };
    let feed = open_feed(&args.store, policy, config)?;

    let cache = feed.cache().clone();
    let sweep_every = Duration::from_secs(args.maintenance_secs.max(1));
    let maintenance = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_every);
        loop {
            ticker.tick().await;
            let purged = cache.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "expired search terms purged");
            }
        }
    });

    let app = build_app(feed.clone());
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, store = %args.store, "server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    maintenance.abort();
    let stats = feed.cache().stats();
    tracing::info!(?stats, "shutting down");
    feed.cache().clear();
    Ok(())
}
