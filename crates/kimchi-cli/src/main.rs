use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// A configurable HTTP reverse-proxy and static-file gateway.
#[derive(Parser, Debug)]
#[command(name = "kimchi", version)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, env = "KIMCHI_CONFIG", default_value = "/etc/kimchi/config")]
    config: PathBuf,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let registry = kimchi::load_config(&cli.config)?;
    registry.start().await?;

    tracing::info!("kimchi is running");
    tokio::signal::ctrl_c().await?;
    Ok(())
}
