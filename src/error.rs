use thiserror::Error;

/// Main error type for the trading core
#[derive(Error, Debug)]
pub enum CrossmakerError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Readiness errors
    #[error("Gateway not ready: {0}")]
    NotReady(String),

    // Market data errors
    #[error("Data feed unavailable: {0}")]
    DataFeedUnavailable(String),

    #[error("Invalid market data: {0}")]
    InvalidMarketData(String),

    // Order execution errors
    #[error("Gateway rejected {action} on {market}: {reason}")]
    GatewayRejection {
        action: String,
        market: String,
        reason: String,
    },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for CrossmakerError
pub type Result<T> = std::result::Result<T, CrossmakerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_rejection_names_the_failed_call() {
        let err = CrossmakerError::GatewayRejection {
            action: "place".to_string(),
            market: "ETH-USDT".to_string(),
            reason: "rate limited".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Gateway rejected place on ETH-USDT: rate limited"
        );
    }
}
