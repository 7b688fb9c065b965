use clap::Parser;
use gridledger::api::server::run_server;
use gridledger::config::NodeConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gridledger=info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = NodeConfig::parse();
    run_server(config).await
}
