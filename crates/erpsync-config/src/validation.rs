use erpsync_core::{EntityDescriptor, BUILTIN_ENTITY_IDS};

use crate::error::{ConfigError, ConfigResult};
use crate::project::{ProjectConfig, TablesSection};

/// Validate sync settings and the allow-list.
pub fn validate(config: &ProjectConfig) -> ConfigResult<()> {
    validate_batch_size(config)?;
    validate_timeout(config)?;
    validate_only(config)?;
    Ok(())
}

fn validate_batch_size(config: &ProjectConfig) -> ConfigResult<()> {
    if config.sync.batch_size == 0 {
        return Err(ConfigError::InvalidValue {
            field: "sync.batch_size".into(),
            message: "must be at least 1".into(),
        });
    }
    Ok(())
}

fn validate_timeout(config: &ProjectConfig) -> ConfigResult<()> {
    if config.sync.query_timeout_ms == 0 {
        return Err(ConfigError::InvalidValue {
            field: "sync.query_timeout_ms".into(),
            message: "must be at least 1".into(),
        });
    }
    Ok(())
}

fn validate_only(config: &ProjectConfig) -> ConfigResult<()> {
    let unknown: Vec<&str> = config
        .sync
        .only
        .iter()
        .map(String::as_str)
        .filter(|id| !BUILTIN_ENTITY_IDS.contains(id))
        .collect();
    if !unknown.is_empty() {
        return Err(ConfigError::UnknownEntities(format!(
            "{} (expected one of {})",
            unknown.join(", "),
            BUILTIN_ENTITY_IDS.join(", ")
        )));
    }
    Ok(())
}

/// Build the built-in descriptors with the configured source tables.
pub fn build_entities(tables: &TablesSection) -> ConfigResult<Vec<EntityDescriptor>> {
    tables
        .entries()
        .into_iter()
        .map(|(id, table)| {
            EntityDescriptor::builtin_with_source(id, table).map_err(|source| {
                ConfigError::InvalidTable {
                    entity: id.to_string(),
                    source,
                }
            })
        })
        .collect()
}
