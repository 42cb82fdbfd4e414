use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::ServerConfig;

/// Main entry point for the clinic chat service
///
/// Starts the REST server, which also serves the live event stream on `/events`.
///
/// # Environment Variables
/// - `CHAT_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `CHAT_DATA_DIR`: Directory for chat storage (default: "chat_data", must exist)
/// - `API_KEY`: API key expected from the gateway (required)
/// - `CHAT_EVENT_CAPACITY`: Event Bus buffer per live session (default: 256)
/// - `CHAT_SSE_KEEPALIVE_SECS`: keep-alive interval of the event stream (default: 15)
/// - `CHAT_USER_DIRECTORY`, `CHAT_APPOINTMENTS_FILE`: collaborator exports
/// - `CHAT_PRE_THERAPY_LEAD_HOURS`, `CHAT_POST_THERAPY_TRAIL_HOURS`: notification windows
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chat_run=info".parse()?)
                .add_directive("api_rest=info".parse()?)
                .add_directive("chat_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    api_rest::serve(config).await
}
