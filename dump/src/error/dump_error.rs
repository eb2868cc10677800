use thiserror::Error;

#[derive(Error, Debug)]
pub enum DumpError {
    #[error("Dump is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Line {line}: expected {expected} tab-separated fields, found {found}: {content:?}")]
    FieldCount {
        line: usize,
        expected: usize,
        found: usize,
        content: String,
    },

    #[error("Line {line}: invalid {field} ({value}): {reason}: {content:?}")]
    InvalidField {
        line: usize,
        field: &'static str,
        value: String,
        reason: String,
        content: String,
    },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Device dump is empty")]
    MissingDeviceHeader,
}

impl DumpError {
    /// 1-based number of the offending line, if the error is tied to one.
    pub fn line(&self) -> Option<usize> {
        match self {
            DumpError::FieldCount { line, .. } | DumpError::InvalidField { line, .. } => {
                Some(*line)
            }
            _ => None,
        }
    }
}
