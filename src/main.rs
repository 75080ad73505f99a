use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use favicon_service::{
    cache::create_store,
    config::Config,
    models::Icon,
    services::{FaviconResolver, IconCache},
    utils::HttpFetcher,
    web::WebServer,
};

#[derive(Parser)]
#[command(name = "favicon-service")]
#[command(version)]
#[command(about = "Resolves, caches and serves website favicons")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = if cli.log_level == "trace" {
        format!("favicon_service={},tower_http=trace", cli.log_level)
    } else {
        format!("favicon_service={}", cli.log_level)
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting favicon service v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }

    let default_icon = Icon::load_default(&config.icon.default_path, &config.icon.default_type)
        .await
        .with_context(|| {
            format!(
                "Failed to load default icon from {}",
                config.icon.default_path.display()
            )
        })?;
    info!(
        "Loaded default icon {} ({} bytes)",
        config.icon.default_path.display(),
        default_icon.len()
    );

    let store = create_store(&config.cache);
    let icon_cache = Arc::new(IconCache::new(store, default_icon, config.cache.ttl));
    if let Err(e) = icon_cache.initialize_counters().await {
        warn!("Failed to initialise request counters: {}", e);
    }

    let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
    let resolver = Arc::new(FaviconResolver::new(fetcher, icon_cache, &config));

    let web_server = WebServer::new(config, resolver)?;
    info!(
        "Starting web server on {}:{}",
        web_server.host(),
        web_server.port()
    );

    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
    let server = tokio::spawn(web_server.serve_with_signal(ready_tx));
    if let Ok(Ok(())) = ready_rx.await {
        info!("Web server ready");
    }

    server.await??;
    info!("Web server stopped");
    Ok(())
}
