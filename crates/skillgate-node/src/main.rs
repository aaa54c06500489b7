#![forbid(unsafe_code)]

//! SkillGate gateway node binary.

use clap::Parser;
use skillgate_node::config::Settings;
use skillgate_node::http_server;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::parse();
    if let Err(e) = http_server::serve(settings).await {
        error!(error = %e, "fatal");
        std::process::exit(1);
    }
}
