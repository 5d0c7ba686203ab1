//! Engine error types
//!
//! Only collaborator failures surface as errors. Stale samples, duplicate
//! transitions, late replies and transport failures are absorbed by the
//! component that sees them and never reach this type.

use thiserror::Error;

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Unified error type for the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// The persistence collaborator failed
    #[error("Store error: {0}")]
    Store(String),

    /// The reference-data collaborator failed
    #[error("Reference data error: {0}")]
    ReferenceData(String),

    /// No network is known under this id
    #[error("Unknown network: {0}")]
    UnknownNetwork(String),

    /// No downtime is known under this id
    #[error("Unknown downtime: {0}")]
    UnknownDowntime(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(_) | Self::ReferenceData(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(EngineError::Store("timeout".into()).is_transient());
        assert!(EngineError::ReferenceData("503".into()).is_transient());
        assert!(!EngineError::UnknownNetwork("n1".into()).is_transient());
        assert!(!EngineError::Config("zero interval".into()).is_transient());
    }

    #[test]
    fn test_display() {
        let err = EngineError::UnknownDowntime("dt-9".into());
        assert_eq!(err.to_string(), "Unknown downtime: dt-9");
    }
}
