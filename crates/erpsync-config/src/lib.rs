mod endpoint;
mod env;
mod error;
mod project;
mod validation;

pub use endpoint::describe_endpoint;
pub use env::{env_lookup, parse_bool, resolve_env_with, Lookup};
pub use error::{ConfigError, ConfigResult};
pub use project::{
    Overrides, ProjectConfig, ReplicaSection, ResolvedConfig, SourceSection, SyncSection,
    TablesSection, DEFAULT_CONFIG_PATH,
};
pub use validation::{build_entities, validate};
