//! KML map service.
//!
//! HTTP server answering WMS GetMap requests as KML, KMZ and PNG, plus the
//! KML network-link reflector.

use anyhow::{Context, Result};
use clap::Parser;
use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use kml_api::router;
use kml_api::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "kml-api")]
#[command(about = "KML/KMZ map service")]
struct Args {
    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    listen: String,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Directory holding kml.yaml, layers/ and styles/
    #[arg(long, env = "KML_CONFIG_DIR", default_value = "config")]
    config_dir: PathBuf,

    /// Public URL of this service, used in generated links
    #[arg(long, env = "KML_BASE_URL", default_value = "http://localhost:8080")]
    base_url: String,

    /// Number of tokio worker threads (default: number of CPU cores)
    #[arg(long)]
    worker_threads: Option<usize>,
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();

    if let Some(threads) = args.worker_threads {
        runtime_builder.worker_threads(threads);
    } else if let Ok(threads_str) = env::var("TOKIO_WORKER_THREADS") {
        if let Ok(threads) = threads_str.parse::<usize>() {
            runtime_builder.worker_threads(threads);
        }
    }

    let runtime = runtime_builder.build()?;
    runtime.block_on(async_main(args))?;
    Ok(())
}

async fn async_main(args: Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let prometheus_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    info!("Prometheus metrics exporter initialized");
    info!(
        config_dir = %args.config_dir.display(),
        base_url = %args.base_url,
        "Starting KML server"
    );

    let state = Arc::new(
        tokio::task::spawn_blocking({
            let config_dir = args.config_dir.clone();
            let base_url = args.base_url.clone();
            move || AppState::new(config_dir, base_url)
        })
        .await??,
    );

    let app = router(state, Some(prometheus_handle));

    let addr: SocketAddr = args.listen.parse()?;
    info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
