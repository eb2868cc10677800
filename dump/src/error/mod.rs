mod dump_error;

pub use dump_error::DumpError;
pub type Result<T> = std::result::Result<T, DumpError>;
