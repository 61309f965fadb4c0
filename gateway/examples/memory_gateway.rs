//! Basic pull gateway example
//!
//! Run with: cargo run -p gateway --example memory_gateway

use gateway::GatewayBuilder;
use storage::MemoryStorage;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Create an in-memory storage backend
    let storage = MemoryStorage::with_buckets(&["registry"]);

    // Build the gateway with default (localhost) token settings
    let app = GatewayBuilder::new()
        .storage(storage.into())
        .bucket("registry")
        .build();

    // Bind to address
    let addr = "127.0.0.1:5000";
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Pull gateway listening on http://{}", addr);
    tracing::info!("Try: curl http://{}/v2/", addr);

    // Serve the gateway
    axum::serve(listener, app).await?;

    Ok(())
}
