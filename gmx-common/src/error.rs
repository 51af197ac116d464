//! Common error types for gravimix

use thiserror::Error;

/// Common result type for gravimix operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the planning and verification crates
#[derive(Error, Debug)]
pub enum Error {
    /// Mass fractions are inconsistent (e.g. negative implied solvent fraction)
    #[error("Invalid composition: {0}")]
    InvalidComposition(String),

    /// Unknown species or sample ID
    #[error("Not found: {0}")]
    NotFound(String),

    /// A derived quantity was requested before its prerequisite was computed
    #[error("Not ready: {0}")]
    NotReady(String),

    /// Negative planned fraction
    #[error("Invalid fraction: {0}")]
    InvalidFraction(String),

    /// A segmentation scan exhausted the trace without satisfying its predicate
    #[error("No {what} found after index {from}")]
    EventNotFound { what: String, from: usize },

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON document error (wraps serde_json::Error)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Segmentation failures are local to one step; everything else is fatal
    /// to the entity being built.
    pub fn is_step_local(&self) -> bool {
        matches!(self, Error::EventNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_not_found_message() {
        let err = Error::EventNotFound {
            what: "rise".to_string(),
            from: 42,
        };
        assert_eq!(err.to_string(), "No rise found after index 42");
        assert!(err.is_step_local());
    }

    #[test]
    fn test_lookup_errors_are_not_step_local() {
        assert!(!Error::NotFound("Texapon".to_string()).is_step_local());
        assert!(!Error::NotReady("density".to_string()).is_step_local());
    }
}
