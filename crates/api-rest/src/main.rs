//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the chat REST and server-sent events API on its own.
//!
//! ## Intended use
//! Useful for development when you want the REST server with its OpenAPI/Swagger UI. The
//! workspace's `chat-run` binary starts the same server.

use api_rest::{serve, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("chat_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    tracing::info!("-- Chat data directory: {}", config.core.chat_data_dir().display());

    serve(config).await
}
