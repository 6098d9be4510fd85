//! Command-line interface definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::types::SinkKind;

/// rsync-backup-plan - compile backup module declarations into a first-boot plan
#[derive(Parser)]
#[command(name = "rsync-backup-plan")]
#[command(about = "Compiles rsync backup modules into an ordered bootstrap plan")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile a configuration into user data or an init document
    Compile {
        /// Path to the JSON configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Path to the rsyncd.conf template shipped in the asset archive
        #[arg(short, long)]
        template: PathBuf,

        /// Delivery format (user-data or cfn-init); overrides the config file
        #[arg(short, long)]
        sink: Option<SinkKind>,

        /// Write the rendered plan here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file without rendering anything
    Validate {
        /// Path to the JSON configuration file
        config: PathBuf,
    },
    /// Print the device allocation, forced commands and step list
    Explain {
        /// Path to the JSON configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Path to the rsyncd.conf template
        #[arg(short, long)]
        template: PathBuf,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_compile_args() {
        let cli = Cli::try_parse_from([
            "rsync-backup-plan",
            "compile",
            "--config",
            "backup.json",
            "--template",
            "rsyncd.conf",
            "--sink",
            "cfn-init",
        ])
        .expect("valid args");

        match cli.command {
            Commands::Compile {
                config,
                template,
                sink,
                output,
            } => {
                assert_eq!(config, PathBuf::from("backup.json"));
                assert_eq!(template, PathBuf::from("rsyncd.conf"));
                assert_eq!(sink, Some(SinkKind::CfnInit));
                assert!(output.is_none());
            }
            _ => panic!("expected compile"),
        }
    }

    #[test]
    fn test_unknown_sink_rejected() {
        let result = Cli::try_parse_from([
            "rsync-backup-plan",
            "compile",
            "-c",
            "a.json",
            "-t",
            "b.conf",
            "-s",
            "ansible",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["rsync-backup-plan"]).is_err());
    }

    #[test]
    fn test_validate_positional_config() {
        let cli = Cli::try_parse_from(["rsync-backup-plan", "validate", "backup.json"])
            .expect("valid args");
        assert!(matches!(cli.command, Commands::Validate { .. }));
    }
}
