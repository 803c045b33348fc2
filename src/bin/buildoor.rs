//! Grounded on `mev-boost-rs`'s bin entrypoint: `clap`-derived args, `tracing_subscriber`
//! registry with an `EnvFilter` defaulting from `RUST_LOG`, then hand off to the service.

use buildoor::{BuilderService, Config};
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_CONFIG_PATH: &str = "buildoor.toml";

#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
struct Args {
    /// path to the TOML config file.
    #[clap(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into())))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = match Config::from_toml_file(&args.config) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(err = %err, "could not load config");
            std::process::exit(1);
        }
    };

    let service = match BuilderService::new(config).await {
        Ok(service) => service,
        Err(err) => {
            tracing::error!(err = %err, "could not start service");
            std::process::exit(1);
        }
    };

    let stats = service.stats();
    tokio::spawn(buildoor::stats::run_reporter(stats, std::time::Duration::from_secs(60)));

    if let Err(err) = service.run().await {
        tracing::error!(err = %err, "service exited with error");
        std::process::exit(1);
    }
}
