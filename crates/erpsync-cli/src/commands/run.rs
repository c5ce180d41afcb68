use anyhow::{Context, Result};
use colored::Colorize;
use erpsync_config::{describe_endpoint, env_lookup, ProjectConfig};
use erpsync_core::{RunReport, SyncOrchestrator};
use erpsync_mysql::MySqlFetcher;
use erpsync_pg::PgReplica;
use tracing::{info, warn};

pub async fn cmd_run(config: ProjectConfig) -> Result<()> {
    let resolved = config.resolve(&env_lookup)?;

    info!(
        source = %describe_endpoint(&resolved.source_url),
        replica = %describe_endpoint(&resolved.replica_url),
        batch_size = resolved.plan.options.batch_size,
        query_timeout_ms = resolved.plan.options.query_timeout.as_millis() as u64,
        "Starting sync"
    );

    let fetcher = MySqlFetcher::new(&resolved.source_url).context("Invalid source url")?;
    let replica = PgReplica::connect(&resolved.replica_url)
        .await
        .context("Failed to connect to Postgres")?;

    let orchestrator = SyncOrchestrator::new(resolved.plan, fetcher.clone(), replica);
    let result = orchestrator.run().await;
    drop(orchestrator);

    if let Err(e) = fetcher.disconnect().await {
        warn!(error = %e, "Failed to close source connections");
    }

    let report = result.context("Sync failed")?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    println!("\n{:<14} {:>10} {:>8} {:>8}  {}", "Entity", "Rows", "Batches", "Fetches", "Watermark");
    println!("{:-<80}", "");
    for entity in &report.entities {
        println!(
            "{:<14} {:>10} {:>8} {:>8}  {}",
            entity.entity, entity.rows, entity.batches, entity.fetches, entity.finished_at
        );
    }
    println!(
        "\n{} {} rows in {:.1}s\n",
        "Sync complete:".green().bold(),
        report.total_rows(),
        report.elapsed.as_secs_f64()
    );
}
