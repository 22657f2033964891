use std::time::Duration;
use thiserror::Error;

/// Errors produced while scraping, caching or serving the screener dataset
#[derive(Error, Debug)]
pub enum ScreenerError {
    /// A UI step's target element was missing or never became interactable
    #[error("Element not found during {step}: {reason}")]
    ElementNotFound { step: String, reason: String },

    /// The total-count element was missing or its text was not numeric
    #[error("Failed to parse total result count: {0}")]
    CountParse(String),

    /// The backing key-value store could not be reached
    #[error("Record store unavailable: {0}")]
    StoreUnavailable(String),

    /// Another run kept the dataset fresh for longer than the wait bound
    #[error("Dataset '{dataset}' stayed unavailable for {waited:?}")]
    RunBlockedTimeout { dataset: String, waited: Duration },

    /// The run's lease lapsed and another run may now own the dataset
    #[error("Run lease on dataset '{0}' was lost")]
    LeaseLost(String),

    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Failed to connect to browser: {0}")]
    ConnectionFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Tab operation failed: {0}")]
    TabOperationFailed(String),

    #[error("JavaScript evaluation failed: {0}")]
    EvaluationFailed(String),

    /// The results table could not be read into rows
    #[error("Failed to parse results table: {0}")]
    TableParseFailed(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ScreenerError {
    /// Stable label for logs and HTTP error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            ScreenerError::ElementNotFound { .. } => "element_not_found",
            ScreenerError::CountParse(_) => "count_parse_error",
            ScreenerError::StoreUnavailable(_) => "store_unavailable",
            ScreenerError::RunBlockedTimeout { .. } => "run_blocked_timeout",
            ScreenerError::LeaseLost(_) => "lease_lost",
            ScreenerError::LaunchFailed(_) => "launch_failed",
            ScreenerError::ConnectionFailed(_) => "connection_failed",
            ScreenerError::NavigationFailed(_) => "navigation_failed",
            ScreenerError::TabOperationFailed(_) => "tab_operation_failed",
            ScreenerError::EvaluationFailed(_) => "evaluation_failed",
            ScreenerError::TableParseFailed(_) => "table_parse_failed",
            ScreenerError::Config(_) => "config_error",
        }
    }

    /// HTTP status the front end reports for this error.
    ///
    /// Store and gate failures are "try again later" (503); anything that went
    /// wrong on the remote page is an upstream failure (502).
    pub fn status_code(&self) -> u16 {
        match self {
            ScreenerError::StoreUnavailable(_)
            | ScreenerError::RunBlockedTimeout { .. }
            | ScreenerError::LeaseLost(_) => 503,
            ScreenerError::ElementNotFound { .. }
            | ScreenerError::CountParse(_)
            | ScreenerError::NavigationFailed(_)
            | ScreenerError::EvaluationFailed(_)
            | ScreenerError::TableParseFailed(_) => 502,
            ScreenerError::LaunchFailed(_)
            | ScreenerError::ConnectionFailed(_)
            | ScreenerError::TabOperationFailed(_)
            | ScreenerError::Config(_) => 500,
        }
    }
}

impl From<serde_json::Error> for ScreenerError {
    fn from(e: serde_json::Error) -> Self {
        ScreenerError::Config(e.to_string())
    }
}

#[cfg(feature = "redis-backend")]
impl From<redis::RedisError> for ScreenerError {
    fn from(e: redis::RedisError) -> Self {
        ScreenerError::StoreUnavailable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScreenerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_not_found_names_step() {
        let err = ScreenerError::ElementNotFound {
            step: "open region menu".to_string(),
            reason: "timed out".to_string(),
        };
        assert_eq!(err.to_string(), "Element not found during open region menu: timed out");
        assert_eq!(err.kind(), "element_not_found");
        assert_eq!(err.status_code(), 502);
    }

    #[test]
    fn test_gate_errors_are_unavailable() {
        let blocked = ScreenerError::RunBlockedTimeout {
            dataset: "stocks".to_string(),
            waited: Duration::from_secs(5),
        };
        assert_eq!(blocked.status_code(), 503);
        assert_eq!(ScreenerError::StoreUnavailable("down".into()).status_code(), 503);
        assert_eq!(ScreenerError::LeaseLost("stocks".into()).status_code(), 503);
        assert_eq!(ScreenerError::Config("bad".into()).status_code(), 500);
    }
}
