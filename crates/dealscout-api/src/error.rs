use thiserror::Error;

/// Everything the ingestion client can report back
///
/// `DailyLimitReached` is deliberately its own variant rather than a
/// formatted string: callers pause ingestion and emit a dedicated signal
/// when they match it, which string comparison can't do reliably.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Authentication failed (status {status}): {code}: {description}")]
    Auth {
        status: u16,
        code: String,
        description: String,
    },

    #[error("Daily call limit reached ({count}/{limit})")]
    DailyLimitReached { count: u64, limit: u64 },

    #[error("Upstream API error (status {status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("Parsing response failed: {0}")]
    Parse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Quota resource not found: {0}")]
    QuotaResourceNotFound(String),

    #[error("Quota resource has no rate entries: {0}")]
    QuotaNoRates(String),
}

impl ApiError {
    /// True when the governor refused admission because the rolling 24h
    /// quota is spent. Callers branch on this to pause polling instead of
    /// treating it as a transient fault.
    pub fn is_daily_limit(&self) -> bool {
        matches!(self, ApiError::DailyLimitReached { .. })
    }
}
