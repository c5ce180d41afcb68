use anyhow::{Context, Result};
use clap::Parser;
use erpsync_config::{env_lookup, ProjectConfig};
use tracing::{debug, info};

mod cli;
mod commands;
mod env;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let dotenv = env::load_dotenv_from_ancestors()?;

    let config = match cli.command {
        Commands::Init => None,
        _ => Some(load_config(&cli)?),
    };
    let verbose = config.as_ref().map_or(cli.verbose, |c| c.sync.verbose);
    init_tracing(verbose)?;

    if let Some(path) = dotenv {
        debug!(path = %path.display(), "Loaded .env");
    }

    match (cli.command, config) {
        (Commands::Init, _) => commands::cmd_init(),
        (Commands::Setup, Some(config)) => commands::cmd_setup(config).await,
        (Commands::Run(_), Some(config)) => commands::cmd_run(config).await,
        (Commands::Status, Some(config)) => commands::cmd_status(config).await,
        (_, None) => anyhow::bail!("configuration was not loaded"),
    }
}

/// Config file, then environment, then command-line flags.
fn load_config(cli: &Cli) -> Result<ProjectConfig> {
    let mut config = ProjectConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    config
        .apply_env(&env_lookup)
        .context("Invalid environment override")?;
    config.apply_overrides(&cli.overrides());
    Ok(config)
}

fn init_tracing(verbose: bool) -> Result<()> {
    let default_level = if verbose { "erpsync=debug" } else { "erpsync=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                default_level
                    .parse()
                    .context("Invalid log directive")?,
            ),
        )
        .init();
    info!(version = env!("CARGO_PKG_VERSION"), "erpsync starting");
    Ok(())
}
