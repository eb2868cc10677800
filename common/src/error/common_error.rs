use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Invalid log filter '{filter}': {reason}")]
    LogFilter { filter: String, reason: String },

    #[error("Unknown counter mapping: {0}")]
    UnknownCounterMapping(String),
}
