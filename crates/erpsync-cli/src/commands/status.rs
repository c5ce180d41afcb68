use anyhow::{Context, Result};
use colored::Colorize;
use erpsync_config::{env_lookup, ProjectConfig};
use erpsync_pg::PgReplica;

pub async fn cmd_status(config: ProjectConfig) -> Result<()> {
    let plan = config.to_sync_plan()?;
    let replica = PgReplica::connect(&config.replica_url(&env_lookup)?)
        .await
        .context("Failed to connect to Postgres")?;

    println!("\nSync Status:");
    println!("{:<14} {:<20} {:<28} {}", "Entity", "Table", "Modified", "Name");
    println!("{:-<80}", "");

    for entity in &plan.entities {
        let watermark = replica
            .read_cursor(entity)
            .await
            .with_context(|| format!("Failed to read cursor for {}", entity.id))?;

        if watermark.is_sentinel() {
            println!(
                "{:<14} {:<20} {}",
                entity.id,
                entity.target_table,
                "never synced".yellow()
            );
        } else {
            println!(
                "{:<14} {:<20} {:<28} {}",
                entity.id,
                entity.target_table,
                watermark.time_string(),
                watermark.key()
            );
        }
    }

    println!();
    Ok(())
}
