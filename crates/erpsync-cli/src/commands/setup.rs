use anyhow::{Context, Result};
use colored::Colorize;
use erpsync_config::{describe_endpoint, env_lookup, ProjectConfig};
use erpsync_core::SchemaProvisioner;
use erpsync_pg::PgReplica;

pub async fn cmd_setup(config: ProjectConfig) -> Result<()> {
    let plan = config.to_sync_plan()?;
    let replica_url = config.replica_url(&env_lookup)?;

    println!(
        "Setting up replica tables on {}...\n",
        describe_endpoint(&replica_url)
    );
    for entity in &plan.entities {
        println!(
            "  - {:<20} from {}",
            entity.target_table, entity.source_table
        );
    }
    println!("  - {:<20} sync cursors", "sync_state_kv");
    println!();

    let replica = PgReplica::connect(&replica_url)
        .await
        .context("Failed to connect to Postgres")?;
    replica
        .ensure_schema(&plan.entities)
        .await
        .context("Failed to provision replica schema")?;

    println!("{}", "Replica tables ready.".green());
    println!("\nNext step: erpsync run\n");
    Ok(())
}
