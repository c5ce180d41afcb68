//! Sequencing of the per-entity loops for one run.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::backend::{ChangeFetcher, Replica};
use crate::entity::EntityDescriptor;
use crate::error::{Error, Result};
use crate::sync::{EntityReport, EntitySync, SyncOptions};

/// Which entities a run processes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EntitySelection {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl EntitySelection {
    /// Parse a comma-separated allow-list. Blank entries are ignored, and a
    /// list with no entries selects everything.
    pub fn parse(list: &str) -> Self {
        Self::from_ids(list.split(','))
    }

    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids: BTreeSet<String> = ids
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if ids.is_empty() {
            EntitySelection::All
        } else {
            EntitySelection::Only(ids)
        }
    }

    pub fn includes(&self, entity_id: &str) -> bool {
        match self {
            EntitySelection::All => true,
            EntitySelection::Only(ids) => ids.contains(entity_id),
        }
    }

    /// Selected ids that match none of the given entities.
    pub fn unknown_ids<'a>(&'a self, entities: &[EntityDescriptor]) -> Vec<&'a str> {
        match self {
            EntitySelection::All => vec![],
            EntitySelection::Only(ids) => ids
                .iter()
                .filter(|id| !entities.iter().any(|e| &e.id == *id))
                .map(String::as_str)
                .collect(),
        }
    }
}

/// Everything a run needs to know, fixed at start-up.
#[derive(Debug, Clone)]
pub struct SyncPlan {
    /// Descriptors in processing order.
    pub entities: Vec<EntityDescriptor>,
    pub selection: EntitySelection,
    pub options: SyncOptions,
}

impl SyncPlan {
    pub fn new(entities: Vec<EntityDescriptor>) -> Self {
        Self {
            entities,
            selection: EntitySelection::All,
            options: SyncOptions::default(),
        }
    }

    pub fn with_selection(mut self, selection: EntitySelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Entities this plan will run, in order.
    pub fn selected(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entities
            .iter()
            .filter(|e| self.selection.includes(&e.id))
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub entities: Vec<EntityReport>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn total_rows(&self) -> u64 {
        self.entities.iter().map(|e| e.rows).sum()
    }
}

/// Runs a plan against one source and one replica.
pub struct SyncOrchestrator<F, R> {
    plan: SyncPlan,
    fetcher: F,
    replica: R,
}

impl<F, R> SyncOrchestrator<F, R>
where
    F: ChangeFetcher,
    R: Replica,
{
    pub fn new(plan: SyncPlan, fetcher: F, replica: R) -> Self {
        Self {
            plan,
            fetcher,
            replica,
        }
    }

    pub fn plan(&self) -> &SyncPlan {
        &self.plan
    }

    pub fn replica(&self) -> &R {
        &self.replica
    }

    /// Provision the schema, then drive each selected entity to exhaustion.
    ///
    /// Stops at the first failing entity; later entities are not attempted.
    pub async fn run(&self) -> Result<RunReport> {
        let started = Instant::now();

        let unknown = self.plan.selection.unknown_ids(&self.plan.entities);
        if !unknown.is_empty() {
            return Err(Error::InvalidValue {
                column: "only".into(),
                message: format!("unknown entities: {}", unknown.join(", ")),
            });
        }

        info!(entities = self.plan.entities.len(), "Ensuring replica schema");
        self.replica.ensure_schema(&self.plan.entities).await?;

        let mut reports = Vec::new();
        for entity in self.plan.selected() {
            info!(entity = %entity.id, source = %entity.source_table, target = %entity.target_table, "Syncing entity");

            let sync = EntitySync::new(
                entity,
                &self.fetcher,
                &self.replica,
                &self.replica,
                &self.plan.options,
            );
            match sync.run().await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!(entity = %entity.id, error = %e, "Entity sync failed");
                    return Err(Error::EntityFailed {
                        entity: entity.id.clone(),
                        source: Box::new(e),
                    });
                }
            }
        }

        let report = RunReport {
            entities: reports,
            elapsed: started.elapsed(),
        };
        info!(
            entities = report.entities.len(),
            rows = report.total_rows(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Sync run complete"
        );
        Ok(report)
    }
}
