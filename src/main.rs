//! rsync-backup-plan - main entry point
//!
//! Loads a backup appliance declaration, compiles it, and writes the rendered
//! first-boot plan.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use rsync_backup_plan::cli::{Cli, Commands};
use rsync_backup_plan::{check_config, compile_plan, render_plan, BackupConfig, BootstrapPlan};

/// Initialize logging to stderr; `RUST_LOG` overrides the default `info` level
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse_args();
    debug!("CLI arguments parsed");

    match cli.command {
        Commands::Compile {
            config,
            template,
            sink,
            output,
        } => {
            let backup = BackupConfig::load_from_file(&config)?;
            let plan = load_and_compile(&backup, &template)?;
            let kind = sink.unwrap_or(backup.sink);
            let rendered = render_plan(&plan, kind)
                .with_context(|| format!("Failed to render plan as {}", kind))?;

            match output {
                Some(path) => {
                    fs::write(&path, rendered)
                        .with_context(|| format!("Failed to write plan to {:?}", path))?;
                    info!("Wrote {} plan to {:?}", kind, path);
                }
                None => print!("{}", rendered),
            }
        }
        Commands::Validate { config } => {
            info!("Validating configuration file: {:?}", config);
            let backup = BackupConfig::load_from_file(&config)?;
            match check_config(&backup) {
                Ok((_, assignments)) => {
                    println!(
                        "✓ Configuration is valid: {} module(s) on /dev/sd{}..",
                        assignments.len(),
                        assignments
                            .first()
                            .map(|a| a.letter.as_char())
                            .unwrap_or(backup.device_base)
                    );
                }
                Err(e) => {
                    error!("Configuration validation failed: {}", e);
                    match e.module_index().and_then(|i| backup.modules.as_deref()?.get(i)) {
                        Some(module) => eprintln!(
                            "✗ Configuration validation failed at module '{}': {}",
                            module.name, e
                        ),
                        None => eprintln!("✗ Configuration validation failed: {}", e),
                    }
                    std::process::exit(1);
                }
            }
        }
        Commands::Explain { config, template } => {
            let backup = BackupConfig::load_from_file(&config)?;
            let plan = load_and_compile(&backup, &template)?;
            println!("{}", plan.summary());
        }
    }

    Ok(())
}

fn load_and_compile(config: &BackupConfig, template: &Path) -> Result<BootstrapPlan> {
    let template = fs::read_to_string(template)
        .with_context(|| format!("Failed to read rsyncd template from {:?}", template))?;
    let plan = compile_plan(config, &template).context("Failed to compile bootstrap plan")?;
    Ok(plan)
}
