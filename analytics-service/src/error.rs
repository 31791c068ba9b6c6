/// Recoverable failures of the aggregation functions.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalyticsError {
    #[error("no data: {0}")]
    EmptyInput(String),
    #[error("invalid range: {0}")]
    InvalidRange(String),
}

impl AnalyticsError {
    pub fn empty(what: impl Into<String>) -> Self {
        Self::EmptyInput(what.into())
    }

    pub fn range(what: impl Into<String>) -> Self {
        Self::InvalidRange(what.into())
    }
}
