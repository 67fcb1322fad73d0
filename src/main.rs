//! PDF Assembler - Entry point
//!
//! MCP server over stdio. Logs go to stderr since stdout carries the protocol.

use pdf_assembler::{run_server_with_config, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_assembler=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting PDF Assembler");

    run_server_with_config(ServerConfig::from_env()).await
}
