use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use tracing::info;

use shunt::config::Config;
use shunt::proxy::ProxyServer;

#[derive(Parser)]
#[command(name = "shunt")]
#[command(about = "A health-aware HTTP failover proxy")]
struct Args {
    #[arg(short, long, default_value = "config/shunt.toml")]
    config: String,

    /// Override the configured bind address
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("shunt={}", level))
        .init();

    info!("Starting shunt failover proxy");

    let config = Config::from_file_with_env(&args.config).await?;

    let bind = match args.bind {
        Some(addr) => addr,
        None => config.server.bind.parse()?,
    };

    ProxyServer::new(&config, bind).run().await
}
