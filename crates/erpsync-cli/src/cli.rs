use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use erpsync_config::{Overrides, DEFAULT_CONFIG_PATH};

#[derive(Parser)]
#[command(name = "erpsync")]
#[command(about = "Incrementally replicate ERP tables from MySQL into Postgres")]
#[command(version)]
pub struct Cli {
    /// Path to erpsync.toml config file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log every committed batch
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create erpsync.toml and .env.example in the current directory
    Init,

    /// Create replica tables, indexes and the cursor table
    Setup,

    /// Provision the schema, then sync every selected entity
    Run(RunArgs),

    /// Show the stored watermark of each entity
    Status,
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Comma-separated entities to sync (item, invoice, invoice_item)
    #[arg(long)]
    pub only: Option<String>,

    /// Rows per fetch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Deadline for each fetch, in milliseconds
    #[arg(long)]
    pub query_timeout_ms: Option<u64>,

    /// Keep fetching until an empty batch instead of stopping on a short one
    #[arg(long)]
    pub always_probe: bool,
}

impl Cli {
    /// Settings from the command line that override config and environment.
    pub fn overrides(&self) -> Overrides {
        let mut overrides = Overrides {
            verbose: self.verbose,
            ..Default::default()
        };
        if let Commands::Run(ref args) = self.command {
            overrides.only = args.only.clone();
            overrides.batch_size = args.batch_size;
            overrides.query_timeout_ms = args.query_timeout_ms;
            overrides.always_probe = args.always_probe;
        }
        overrides
    }
}
