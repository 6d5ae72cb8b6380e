//! xml2pg - streaming XML group-event ingestion into PostgreSQL.
//!
//! Reads a large `<group_event>`/`<event>` XML document in constant
//! memory and bulk-loads it into PostgreSQL staging tables via the
//! `COPY` wire protocol, then promotes staged rows into final tables
//! with referential integrity restored.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use xml2pg::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xml2pg=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    cli::run().await
}
