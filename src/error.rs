//! Error handling for the bootstrap compiler.
//!
//! Every failure is a compile-time, non-retryable rejection of the declared
//! input. Variants name the offending module (index and name) or setting and
//! the rule it broke, so callers can report the problem without a partial plan.

use thiserror::Error;

/// Main error type for plan compilation
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// Module size is zero, negative or not a whole number of gigabytes
    #[error("module #{index} '{name}': size must be a positive integer (got {size})")]
    InvalidModuleSize {
        index: usize,
        name: String,
        size: String,
    },

    /// Snapshot retention count is negative or non-integral
    #[error("maxSnapshots must be a positive integer (got {value})")]
    InvalidMaxSnapshots { value: String },

    /// Two modules share a name
    #[error("module #{index} '{name}': name is already used by module #{first}")]
    DuplicateModuleName {
        index: usize,
        first: usize,
        name: String,
    },

    /// Not enough device letters left after the base letter
    #[error(
        "cannot allocate {requested} devices starting at /dev/sd{base}: only {available} letters remain"
    )]
    DeviceSpaceExhausted {
        base: char,
        requested: usize,
        available: usize,
    },

    /// Module name contains characters outside [A-Za-z0-9_-] or starts with '-' or '_'
    #[error(
        "module #{index} '{name}': name must start with a letter or digit and may only contain letters, digits, '-' and '_'"
    )]
    InvalidIdentifier { index: usize, name: String },

    /// SSH key is not a single `<algorithm> <base64> [comment]` line
    #[error("module #{index} '{name}': invalid SSH public key: {reason}")]
    InvalidSshKey {
        index: usize,
        name: String,
        reason: String,
    },

    /// A global setting or per-module override holds an unsafe value
    #[error("invalid value for {setting}: '{value}' ({reason})")]
    InvalidSetting {
        setting: String,
        value: String,
        reason: String,
    },

    /// JSON serialization errors (declarative sink)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for compiler operations
pub type Result<T> = std::result::Result<T, BootstrapError>;

impl BootstrapError {
    /// Create an invalid setting error
    pub fn setting(
        setting: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidSetting {
            setting: setting.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Index of the module this error refers to, if any
    pub fn module_index(&self) -> Option<usize> {
        match self {
            Self::InvalidModuleSize { index, .. }
            | Self::DuplicateModuleName { index, .. }
            | Self::InvalidIdentifier { index, .. }
            | Self::InvalidSshKey { index, .. } => Some(*index),
            _ => None,
        }
    }
}
