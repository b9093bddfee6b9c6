pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "weir")]
#[command(about = "Harvests social feeds and the pages they link to into WARC files", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/weir/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch every configured seed and what it links to
    Harvest {
        /// Fetch without writing captures or state
        #[arg(long)]
        dry_run: bool,

        /// Ignore stored watermarks and fetch everything again
        #[arg(long)]
        full: bool,
    },
    /// Capture a configured stream until it ends or Ctrl-C
    Stream {
        /// Name of a [streams.<name>] section
        name: String,
    },
    /// Print stored harvest watermarks
    State,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_harvest_flags() {
        let cli = Cli::parse_from(["weir", "harvest", "--dry-run", "--full"]);
        match cli.command {
            Commands::Harvest { dry_run, full } => {
                assert!(dry_run);
                assert!(full);
            }
            _ => panic!("expected harvest"),
        }
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::parse_from(["weir", "stream", "garden", "--config", "/tmp/w.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/w.toml")));
        assert!(matches!(cli.command, Commands::Stream { ref name } if name == "garden"));
    }

    #[test]
    fn test_stream_requires_name() {
        assert!(Cli::try_parse_from(["weir", "stream"]).is_err());
    }
}
