mod connect;
mod error;
pub mod replica;
pub mod sql;

pub use connect::{connect_postgres, requires_tls};
pub use error::{PgError, PgResult};
pub use replica::PgReplica;
