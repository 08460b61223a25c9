//! Result and error types for offprobe.

use thiserror::Error;

/// Result type for offprobe operations
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Errors that can occur in offprobe
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The runtime has not finished bootstrapping
    #[error("Runtime not ready: backing store construction deferred")]
    BootstrapNotReady,

    /// Another caller is already constructing the backing store
    #[error("Backing store migration already in progress")]
    MigrationInProgress,

    /// The backing store could not be constructed
    #[error("Failed to construct backing store: {message}")]
    StoreConstruction {
        /// Error message
        message: String,
    },

    /// A backing store call panicked
    #[error("Backing store failed: {message}")]
    StoreFailure {
        /// Panic message
        message: String,
    },

    /// More distinct units were seen before bootstrap than the cache holds
    #[error(
        "Bootstrap cache capacity of {capacity} exhausted by unit {name} (id {id}); coverage data would be lost"
    )]
    CapacityExceeded {
        /// Cache capacity
        capacity: usize,
        /// Id of the unit that did not fit
        id: i64,
        /// Name of the unit that did not fit
        name: String,
    },

    /// A unit was requested with a shape that differs from its first registration
    #[error("Incompatible probes for {name} (id {id}): expected {expected} probes, got {actual}")]
    IncompatibleProbes {
        /// Unit id
        id: i64,
        /// Unit name as requested
        name: String,
        /// Probe count of the registered record
        expected: usize,
        /// Probe count of the request
        actual: usize,
    },

    /// Configuration key is not a known agent option
    #[error("Unknown agent option: {key}")]
    UnknownOption {
        /// Offending key
        key: String,
    },

    /// Configuration value could not be interpreted
    #[error("Invalid value {value:?} for agent option {key}: {reason}")]
    InvalidOption {
        /// Option key
        key: String,
        /// Raw value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProbeError {
    /// Create a store construction error
    #[must_use]
    pub fn store_construction(message: impl Into<String>) -> Self {
        Self::StoreConstruction {
            message: message.into(),
        }
    }

    /// Create a store failure error
    #[must_use]
    pub fn store_failure(message: impl Into<String>) -> Self {
        Self::StoreFailure {
            message: message.into(),
        }
    }

    /// Create an invalid option error
    #[must_use]
    pub fn invalid_option(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidOption {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error only means "try again later" during bootstrap
    #[must_use]
    pub const fn is_deferral(&self) -> bool {
        matches!(self, Self::BootstrapNotReady | Self::MigrationInProgress)
    }
}
