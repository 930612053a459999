use thiserror::Error;

/// Errors from the market data layer.
///
/// Rate limiting is a distinct variant so callers can back off and retry
/// instead of skipping the symbol outright.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("rate limited by upstream (status {status})")]
    RateLimited { status: u16 },

    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected response shape: {0}")]
    InvalidResponse(String),
}

impl FetchError {
    /// True when the error is transient throttling worth an exponential backoff.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. })
    }
}
