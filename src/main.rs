use build_monitor::config::Config;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config = Config::parse();

    if let Err(e) = build_monitor::run(config).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
