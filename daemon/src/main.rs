mod config;
mod health;
mod metrics;
mod scheduler;
mod supervisor;
mod telemetry;

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use telemetry::{init_telemetry, log_config_validation, log_startup_info};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "aofd")]
#[command(about = "Agentic Operations Fabric daemon")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Start the daemon
    #[arg(long)]
    start: bool,

    /// Data directory holding tasks/, events/, views/ and daemon.pid
    #[arg(long, env = "AOF_DATA_DIR")]
    data_dir: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "CONFIG_FILE")]
    config: Option<String>,

    /// Listen address override for the health endpoint
    #[arg(long, env = "LISTEN_ADDR")]
    listen_addr: Option<String>,

    /// Health endpoint port
    #[arg(long)]
    port: Option<u16>,

    /// Scheduler poll interval in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Observe only: skip state-mutating scheduler actions
    #[arg(long)]
    dry_run: bool,

    /// Log level override
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(config_file) => {
            info!("Loading configuration from file: {}", config_file);
            Config::from_file(config_file)?
        }
        None => {
            info!("Loading configuration from environment");
            Config::from_env()?
        }
    };

    if let Some(ref data_dir) = cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(ref listen_addr) = cli.listen_addr {
        config.server.listen_addr = listen_addr.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(poll_interval_ms) = cli.poll_interval_ms {
        config.scheduler.poll_interval_ms = poll_interval_ms;
    }
    if cli.dry_run {
        config.scheduler.dry_run = true;
    }
    if let Some(ref log_level) = cli.log_level {
        config.logging.level = log_level.clone();
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    if !cli.start {
        println!("AOF daemon");
        println!();
        println!("Usage:");
        println!("  aofd --start --data-dir=/path/to/data");
        println!();
        println!("This will:");
        println!("  - Acquire the PID lock at <data-dir>/daemon.pid");
        println!("  - Rebuild the kanban/mailbox/delegation views");
        println!("  - Run the scheduler poll loop");
        println!("  - Serve GET /health on the configured address");
        println!();
        println!("For more options, use: aofd --help");
        return Ok(());
    }

    let config = load_config(&cli).context("Failed to load configuration")?;

    init_telemetry(&config.logging).context("Failed to initialize telemetry")?;
    log_config_validation(&config);

    if let Err(e) = config.validate() {
        error!(error = %e, "Configuration validation failed");
        std::process::exit(1);
    }

    log_startup_info(&config);

    match supervisor::run(config).await {
        Ok(()) => {
            info!("daemon exited cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "daemon failed");
            eprintln!("❌ {e}");
            std::process::exit(1);
        }
    }
}
