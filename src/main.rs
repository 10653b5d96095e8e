use clap::Parser;
use optrack::cli::{Cli, Commands};
use optrack::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
        eprintln!("Using default configuration");
        Config::default()
    });

    // Initialize logging
    optrack::telemetry::init_logging(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!("Starting ingestion");
            args.execute(config).await?;
        }
        Commands::Symbols(args) => {
            args.execute(config).await?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("  Feed: {}", config.transport.url);
            println!("  Catalog: {} {:?}", config.catalog.base_url, config.catalog.assets);
            println!("  Refresh: daily at {} UTC", config.catalog.refresh_at);
            println!(
                "  Subscription: chunks of {} every {}ms",
                config.subscription.chunk_size, config.subscription.chunk_delay_ms
            );
            println!(
                "  Writer: batches of {} every {}ms, queue {}",
                config.writer.batch_size,
                config.writer.flush_interval_ms,
                config.writer.queue_capacity
            );
            println!(
                "  Store: {} (TTL {}s)",
                config.store.url, config.store.entry_ttl_secs
            );
        }
    }

    Ok(())
}
