//! Stock screener HTTP server
//!
//! Serves `GET /stocks?region=<name>`, scraping the screener through Chrome on
//! demand and caching the result for the configured TTL.

use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use stock_screener::{
    BrowserSession, ConnectionOptions, LaunchOptions, MemoryStore, PageDriver, Pipeline, RecordStore, ScreenerConfig,
    server::{AppState, DriverFactory, router},
};

#[derive(Parser)]
#[command(name = "screener-server")]
#[command(version)]
#[command(about = "Serve a cached stock-screener listing over HTTP", long_about = None)]
struct Cli {
    /// Address to listen on
    #[arg(long, short = 'b', env = "SCREENER_BIND", default_value = "127.0.0.1:5000")]
    bind: SocketAddr,

    /// JSON configuration file
    #[arg(long, short = 'c', env = "SCREENER_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Redis URL for the dataset cache (default: in-process cache)
    #[arg(long, env = "REDIS_URL", value_name = "URL")]
    redis_url: Option<String>,

    /// Launch browser in headed mode (default: headless)
    #[arg(long, short = 'H')]
    headed: bool,

    /// Path to custom browser executable
    #[arg(long, value_name = "PATH")]
    chrome_path: Option<PathBuf>,

    /// WebSocket endpoint of an already running browser
    #[arg(long, value_name = "URL")]
    ws_endpoint: Option<String>,

    /// Disable the Chrome sandbox (needed when running as root in a container)
    #[arg(long)]
    no_sandbox: bool,

    /// Override the cache key the dataset is stored under
    #[arg(long, env = "SCREENER_DATASET")]
    dataset_name: Option<String>,

    /// Override the dataset freshness window in seconds
    #[arg(long)]
    ttl_secs: Option<u64>,
}

fn load_config(cli: &Cli) -> anyhow::Result<ScreenerConfig> {
    let mut config = match &cli.config {
        Some(path) => ScreenerConfig::from_file(path)?,
        None => ScreenerConfig::default(),
    };

    if let Some(name) = &cli.dataset_name {
        config.cache.dataset_name = name.clone();
    }
    if let Some(ttl) = cli.ttl_secs {
        config.cache.ttl_secs = ttl;
    }

    config.validate()?;
    Ok(config)
}

fn open_store(cli: &Cli) -> anyhow::Result<Arc<dyn RecordStore>> {
    match &cli.redis_url {
        #[cfg(feature = "redis-backend")]
        Some(url) => Ok(Arc::new(stock_screener::RedisStore::connect(url)?)),
        #[cfg(not(feature = "redis-backend"))]
        Some(_) => anyhow::bail!("--redis-url requires the `redis-backend` feature"),
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

fn driver_factory(cli: &Cli) -> DriverFactory {
    let mut launch = LaunchOptions::new().headless(!cli.headed).sandbox(!cli.no_sandbox);
    if let Some(path) = &cli.chrome_path {
        launch = launch.chrome_path(path);
    }
    let ws_endpoint = cli.ws_endpoint.clone();

    Arc::new(move || -> stock_screener::Result<Box<dyn PageDriver>> {
        let session = match &ws_endpoint {
            Some(ws) => BrowserSession::connect(ConnectionOptions::new(ws.clone()))?,
            None => BrowserSession::launch(launch.clone())?,
        };
        Ok(Box::new(session))
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    log::info!("Screener server v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Screener URL: {}", config.screener_url);
    log::info!(
        "Dataset '{}' with a {}s TTL, page size {}",
        config.cache.dataset_name,
        config.cache.ttl_secs,
        config.pagination.page_size
    );
    match &cli.ws_endpoint {
        Some(ws) => log::info!("Browser: connecting to {}", ws),
        None => log::info!("Browser mode: {}", if cli.headed { "headed" } else { "headless" }),
    }

    let store = open_store(&cli)?;
    let pipeline = Arc::new(Pipeline::new(config, store)?);
    let app = router(AppState::new(pipeline, driver_factory(&cli)));

    let listener = tokio::net::TcpListener::bind(cli.bind).await?;
    log::info!("Listening on http://{}", cli.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("Shutting down");
        })
        .await?;

    Ok(())
}
