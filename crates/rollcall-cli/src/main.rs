//! rollcall - signin-sheet credential extraction.
//!
//! Finds signin pages in meal-event PDFs, reads attendee names and
//! credentials from them and classifies each credential against reference
//! data.

mod cli;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    let default_filter = if cli::is_verbose() {
        "rollcall=info,rollcall_analysis=info"
    } else {
        "rollcall=warn,rollcall_analysis=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    cli::run().await
}
