use clap::Parser;

use parcelflow_server::ServerBuilder;
use parcelflow_server::config::loader::{DEFAULT_CONFIG_PATH, load_config};

/// Parcelflow workflow-distribution broker
#[derive(Debug, Parser)]
#[command(name = "parcelflow-server", version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, env = "PARCELFLOW_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: String,
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist - it's optional
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    // Initialize tracing early with the default level
    parcelflow_server::observability::init_tracing();

    let args = Args::parse();

    let cfg = match load_config(Some(args.config.as_str())) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(path = %args.config, "Configuration loaded");
    parcelflow_server::observability::apply_logging_level(&cfg.logging.level);

    let server = ServerBuilder::new().with_config(cfg).build();
    if let Err(err) = server.run().await {
        eprintln!("Server error: {err}");
        std::process::exit(1);
    }
}
