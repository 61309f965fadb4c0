//! Gateway server binary

use clap::Parser;
use gateway::{GatewayBuilder, GatewayConfig};
use storage::StorageConfig;

/// OCI registry pull gateway
#[derive(Debug, Parser)]
#[command(name = "gateway-server")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "REGISTRY_LISTEN", default_value = "0.0.0.0:5000")]
    listen: std::net::SocketAddr,

    /// Filesystem root for blob storage; omitted serves from an empty
    /// in-memory store
    #[arg(long, env = "REGISTRY_STORAGE_PATH")]
    storage_path: Option<camino::Utf8PathBuf>,

    /// Bucket holding blob objects
    #[arg(long, env = "REGISTRY_BUCKET", default_value = "registry")]
    bucket: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = GatewayConfig::from_env()?;

    let storage = match &args.storage_path {
        Some(path) => StorageConfig::Local { path: path.clone() },
        None => StorageConfig::Memory {
            bucket: args.bucket.clone(),
        },
    }
    .build()
    .await?;

    tracing::info!(
        service = config.service(),
        realm = config.realm(),
        origin = config.api_origin(),
        "starting gateway"
    );

    let app = GatewayBuilder::new()
        .storage(storage)
        .bucket(args.bucket)
        .config(config)
        .build();

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    tracing::info!("gateway listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install shutdown handler: {error}");
    }
}
