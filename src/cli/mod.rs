// src/cli/mod.rs — CLI definition (clap derive)

pub mod simulate;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pagepulse", about = "Page-view telemetry tracker", version)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay a scripted browsing timeline and print the emitted events
    Simulate {
        /// Scenario file (TOML)
        scenario: PathBuf,
        /// Also deliver the events to the configured collector
        #[arg(long)]
        send: bool,
    },
    /// Print the effective configuration
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_simulate() {
        let cli = Cli::try_parse_from(["pagepulse", "simulate", "visit.toml", "--send"]).unwrap();
        match cli.command {
            Commands::Simulate { scenario, send } => {
                assert_eq!(scenario, PathBuf::from("visit.toml"));
                assert!(send);
            }
            _ => panic!("expected simulate"),
        }
        assert_eq!(cli.log_level, "warn");
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["pagepulse", "config", "--config", "/tmp/p.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/p.toml")));
        assert!(matches!(cli.command, Commands::Config));
    }
}
