//! Error types for reading sources and threshold setup

use thiserror::Error;

/// Errors from reading sources (remote feeds, probe banks).
///
/// A `ProviderError` during a poll cycle is never fatal: the scheduler
/// degrades it to a single retrieval condition for the whole group.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Data format error: {message}")]
    FormatError { message: String },

    #[error("Authentication error: {message}")]
    AuthError { message: String },

    #[error("Remote API error: {message}")]
    ApiError { message: String },

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Service unavailable")]
    ServiceUnavailable,
}

impl ProviderError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError { message: message.into() }
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self::FormatError { message: message.into() }
    }

    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NetworkError { .. } | Self::RateLimitExceeded | Self::ServiceUnavailable
        )
    }
}

/// Rejected threshold configuration.
#[derive(Error, Debug, PartialEq)]
pub enum ThresholdError {
    #[error("min temperature {min} is above max temperature {max}")]
    Inverted { min: f64, max: f64 },

    #[error("temperature bound {0} is not a finite number")]
    NotFinite(f64),

    #[error("staleness threshold must be greater than zero")]
    ZeroStaleness,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_and_availability_errors_are_transient() {
        assert!(ProviderError::network("reset").is_transient());
        assert!(ProviderError::ServiceUnavailable.is_transient());
        assert!(ProviderError::RateLimitExceeded.is_transient());
    }

    #[test]
    fn auth_and_format_errors_are_not_transient() {
        assert!(!ProviderError::AuthError { message: "bad key".into() }.is_transient());
        assert!(!ProviderError::format("not json").is_transient());
    }

    #[test]
    fn inverted_threshold_message_names_both_bounds() {
        let err = ThresholdError::Inverted { min: 90.0, max: 60.0 };
        assert_eq!(err.to_string(), "min temperature 90 is above max temperature 60");
    }
}
