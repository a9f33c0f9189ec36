use anyhow::Context;
use clap::Parser;
use page_snapshot::{metrics, setup_logging, Cli, CliRunner, Config};
use std::net::SocketAddr;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Cli::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    info!("Starting page-snapshot v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = load_config(&args).await?;

    if let Some(port) = args.metrics_port {
        metrics::install_prometheus_exporter(SocketAddr::from(([127, 0, 0, 1], port)))?;
    }

    let cli_runner = CliRunner::new(config);

    // Start the application based on command; Ctrl-C stops it
    let result = tokio::select! {
        result = cli_runner.run(args.command) => {
            info!("Application completed");
            result
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Received shutdown signal"),
                Err(e) => error!("Cannot listen for shutdown signal: {}", e),
            }
            Ok(())
        }
    };

    // Graceful shutdown
    info!("Shutting down...");
    cli_runner.shutdown().await;

    if let Err(e) = result {
        error!("Application error: {:#}", e);
        std::process::exit(1);
    }

    info!("page-snapshot stopped");
    Ok(())
}

async fn load_config(args: &Cli) -> anyhow::Result<Config> {
    let mut config = if let Some(config_path) = &args.config {
        // Load from file
        let config_content = tokio::fs::read_to_string(config_path)
            .await
            .with_context(|| format!("reading {}", config_path.display()))?;
        serde_json::from_str(&config_content)?
    } else {
        // Use default configuration
        Config::default()
    };

    // Override with CLI arguments
    if let Some(output_dir) = &args.output_dir {
        config.output_dir = output_dir.clone();
    }

    if let Some(settings) = &args.settings {
        config.settings_path = settings.clone();
    }

    if let Some(chrome_path) = &args.chrome_path {
        config.chrome_path = Some(chrome_path.clone());
    }

    if args.headful {
        config.headless = false;
    }

    // Validate configuration
    config.validate()?;

    info!("Configuration loaded successfully");
    info!("Output directory: {}", config.output_dir.display());
    info!("Settle delay: {:?}", config.capture.settle_delay);
    info!("Capture spacing: {:?}", config.capture.min_capture_interval);

    Ok(config)
}
