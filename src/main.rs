use tracing::info;

use chinwag::chat::envelope::PROTOCOL_VERSION;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("chinwag {PROTOCOL_VERSION} — one room, no frills");

    // Bind address: CHINWAG_BIND overrides the local default.
    let addr =
        std::env::var("CHINWAG_BIND").unwrap_or_else(|_| "127.0.0.1:6969".into());

    chinwag::chat::server::run(&addr).await
}
