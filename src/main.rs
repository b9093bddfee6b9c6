use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use weir::app::{AppContext, HarvestOptions};
use weir::cli::{commands, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("weir=info")))
        .init();

    let cli = Cli::parse();
    let ctx = AppContext::new(cli.config.as_deref())?;

    match cli.command {
        Commands::Harvest { dry_run, full } => {
            commands::harvest(&ctx, HarvestOptions { dry_run, full }).await?;
        }
        Commands::Stream { name } => {
            commands::stream(&ctx, &name).await?;
        }
        Commands::State => {
            commands::show_state(&ctx)?;
        }
    }

    Ok(())
}
