mod ingest_error;

pub use ingest_error::{IngestError, SourceError};
pub type Result<T> = std::result::Result<T, IngestError>;
