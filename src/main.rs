//! Contract Mock Server - CLI Entry Point

use anyhow::Result;
use clap::Parser;
use contract_mock_server::{HttpProvider, MockServer, MockServiceConfig, Verifier};
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "contract-mock-server",
    about = "Consumer-driven contract testing - mock provider and provider verification",
    version
)]
struct Args {
    /// Path to the contract configuration file
    #[arg(short, long, default_value = "contract.yaml")]
    config: PathBuf,

    /// Override the listener port from the configuration
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print the example configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Verify the interactions against a live provider at this base URL
    #[arg(long, value_name = "BASE_URL")]
    verify: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        let default_config = include_str!("../demos/default-config.yaml");
        println!("{}", default_config);
        return Ok(());
    }

    // Load configuration
    let mut config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        MockServiceConfig::from_file(&args.config)?
    } else if args.validate || args.verify.is_some() {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration (no interactions)");
        MockServiceConfig::default()
    };

    if let Some(port) = args.port {
        config.settings.port = port;
    }

    if args.validate {
        println!(
            "Configuration is valid ({} interactions between {} and {})",
            config.interactions.len(),
            config.consumer,
            config.provider
        );
        return Ok(());
    }

    if let Some(base_url) = args.verify {
        info!(
            provider = %config.provider,
            base_url = %base_url,
            interactions = config.interactions.len(),
            "Verifying provider"
        );
        let verifier = Verifier::new(HttpProvider::new(base_url));
        let report = verifier.verify_all(&config.interactions).await;
        println!("{}", report);
        if !report.is_verified() {
            anyhow::bail!("{} failed verification", config.provider);
        }
        return Ok(());
    }

    let server = MockServer::start(&config.settings)?;
    for interaction in config.interactions {
        server.register(interaction)?;
    }
    info!(
        consumer = %config.consumer,
        provider = %config.provider,
        url = %server.base_url(),
        "Mock provider ready, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;

    let report = server.invocation_report();
    if report.is_satisfied() {
        info!("{}", report);
    } else {
        warn!("Contract not fully exercised:\n{}", report);
    }
    server.shutdown();

    Ok(())
}
