//! umrahfare command-line entry point.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use umrahfare::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    let default_filter = if cli::is_verbose() {
        "umrahfare=info"
    } else {
        "umrahfare=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    cli::run().await
}
