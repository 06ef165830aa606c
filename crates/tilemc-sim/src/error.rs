//! Error types for the tile memory controller model

use thiserror::Error;

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, TilemcError>;

/// Errors that can occur while driving the controller model
#[derive(Debug, Error)]
pub enum TilemcError {
    /// Job descriptor failed activation-time validation
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// What the validator rejected
        reason: String,
    },

    /// Access to a register offset outside the map
    #[error("Unmapped register offset {offset:#x}")]
    UnmappedRegister {
        /// Byte offset that was accessed
        offset: usize,
    },

    /// The external watchdog expired before the job completed
    #[error("Job did not complete within {cycles} cycles")]
    Watchdog {
        /// Cycle budget that was exhausted
        cycles: u64,
    },
}

impl TilemcError {
    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}
