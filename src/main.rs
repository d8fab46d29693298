use std::path::PathBuf;

use clap::Parser;

use switchyard::config::load_or_default;
use switchyard::lifecycle::{self, signals, Shutdown};
use switchyard::observability::logging;

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(about = "Transparent Minecraft proxy", long_about = None)]
struct Cli {
    /// Configuration file (TOML). Missing file means defaults.
    #[arg(short, long, default_value = "switchyard.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match load_or_default(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {e}", cli.config.display());
            std::process::exit(1);
        }
    };
    logging::init_logging(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "switchyard starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        servers = config.servers.len(),
        "Configuration loaded"
    );

    let watch = cli.config.exists().then_some(cli.config.as_path());
    let running = lifecycle::start(config, watch).await?;

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    signals::spawn_signal_handler(shutdown);

    running.run(rx).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
