//! Error types for the module registry.
//!
//! Every rejected mutation surfaces as a specific variant. Variants are grouped
//! into an [`ErrorKind`] so callers (the CLI, the RPC service) can tell
//! "not allowed" apart from "nobody is allowed right now" and from
//! "try again later".

use crate::types::{Address, ModuleKey};
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`RegistryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller-correctable input problem. Never retried automatically.
    Validation,
    /// The caller does not hold a role that permits the action.
    Authorization,
    /// The registry is not in a state where the action is legal.
    State,
    /// A scheduled upgrade exists but its delay has not elapsed.
    Timelock,
    /// The registry is paused.
    Availability,
    /// Storage or configuration failure.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Authorization => "authorization",
            ErrorKind::State => "state",
            ErrorKind::Timelock => "timelock",
            ErrorKind::Availability => "availability",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Main error type for the module registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    // Validation errors
    #[error("Zero address is not a valid binding or role holder")]
    ZeroAddress,

    #[error("Mismatched lengths: {keys} keys but {addresses} addresses")]
    MismatchedLengths { keys: usize, addresses: usize },

    #[error("Batch of {len} entries exceeds the maximum of {max}")]
    BatchTooLarge { len: usize, max: usize },

    #[error("History index {index} out of bounds for {key} ({len} records retained)")]
    IndexOutOfBounds {
        key: ModuleKey,
        index: u64,
        len: u64,
    },

    #[error("Delay of {requested}s exceeds the ceiling of {max}s")]
    DelayTooLong { requested: u64, max: u64 },

    #[error("Invalid {field}: {message}")]
    InvalidInput { field: String, message: String },

    // Authorization errors
    #[error("{caller} is not authorized to {action}")]
    Unauthorized { action: String, caller: Address },

    #[error("{caller} is not the pending admin (expected {expected})")]
    NotPendingAdmin { caller: Address, expected: Address },

    // State errors
    #[error("Module not registered: {key}")]
    NotRegistered { key: ModuleKey },

    #[error("No pending upgrade for {key}")]
    NoPendingUpgrade { key: ModuleKey },

    #[error("Upgrade already pending for {key}: {proposed} eligible at {eligible_at}")]
    UpgradeAlreadyPending {
        key: ModuleKey,
        proposed: Address,
        eligible_at: u64,
    },

    #[error("Registry is already paused")]
    AlreadyPaused,

    #[error("Registry is not paused")]
    NotPaused,

    // Timelock errors
    #[error("Upgrade for {key} not executable until {eligible_at} (now {now})")]
    TooEarly {
        key: ModuleKey,
        eligible_at: u64,
        now: u64,
    },

    // Availability errors
    #[error("Registry is paused")]
    Paused,

    // Internal errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        RegistryError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for RegistryError {
    fn from(err: rusqlite::Error) -> Self {
        RegistryError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl RegistryError {
    /// Build an `InvalidInput` error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        RegistryError::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::ZeroAddress
            | RegistryError::MismatchedLengths { .. }
            | RegistryError::BatchTooLarge { .. }
            | RegistryError::IndexOutOfBounds { .. }
            | RegistryError::DelayTooLong { .. }
            | RegistryError::InvalidInput { .. } => ErrorKind::Validation,

            RegistryError::Unauthorized { .. } | RegistryError::NotPendingAdmin { .. } => {
                ErrorKind::Authorization
            }

            RegistryError::NotRegistered { .. }
            | RegistryError::NoPendingUpgrade { .. }
            | RegistryError::UpgradeAlreadyPending { .. }
            | RegistryError::AlreadyPaused
            | RegistryError::NotPaused => ErrorKind::State,

            RegistryError::TooEarly { .. } => ErrorKind::Timelock,

            RegistryError::Paused => ErrorKind::Availability,

            RegistryError::Database { .. }
            | RegistryError::Io { .. }
            | RegistryError::Json { .. }
            | RegistryError::Config { .. } => ErrorKind::Internal,
        }
    }

    /// Process exit code for the administrative CLI.
    ///
    /// - 1: validation error
    /// - 2: authorization error
    /// - 3: state error (nothing pending, already pending, ...)
    /// - 4: timelock not yet elapsed
    /// - 5: registry paused
    /// - 6: internal error
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Validation => 1,
            ErrorKind::Authorization => 2,
            ErrorKind::State => 3,
            ErrorKind::Timelock => 4,
            ErrorKind::Availability => 5,
            ErrorKind::Internal => 6,
        }
    }

    /// Convert to a JSON-RPC error code.
    ///
    /// Application-defined codes (-32000 to -32099):
    /// - -32010: Validation error
    /// - -32011: Authorization error
    /// - -32012: State error
    /// - -32013: Timelock not elapsed
    /// - -32014: Registry paused
    ///
    /// Internal failures map to -32603.
    pub fn to_rpc_error_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Validation => -32010,
            ErrorKind::Authorization => -32011,
            ErrorKind::State => -32012,
            ErrorKind::Timelock => -32013,
            ErrorKind::Availability => -32014,
            ErrorKind::Internal => -32603,
        }
    }
}
