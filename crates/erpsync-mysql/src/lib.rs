mod decode;
mod error;
pub mod fetcher;
pub mod query;

pub use decode::{decode_row, decode_value};
pub use error::{SourceError, SourceResult};
pub use fetcher::MySqlFetcher;
pub use query::{change_query, quote_ident};
