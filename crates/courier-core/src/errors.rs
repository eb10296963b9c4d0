//! Unified error system for Courier
//!
//! One error type is shared by every crate in the workspace. Variants follow
//! the failure taxonomy the lifecycle manager reacts to: transport failures
//! are retried or skipped, authentication failures are never retried,
//! missing keys and state conflicts drop the job quietly, and configuration
//! errors stop the process at startup.

use serde::{Deserialize, Serialize};

/// Unified error type for all Courier operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CourierError {
    /// RPC or HTTP failure talking to a remote collaborator
    #[error("Transport error: {message}")]
    Transport {
        /// Error message describing the transport failure
        message: String,
    },

    /// AEAD tag did not verify: wrong key or tampered data
    #[error("Authentication failure: {message}")]
    AuthenticationFailure {
        /// Error message describing what failed to authenticate
        message: String,
    },

    /// Counterparty has no published verification key
    #[error("Missing verification key for {address}")]
    MissingKey {
        /// Address whose key could not be found
        address: String,
    },

    /// Job is no longer open or assignable to this actor
    #[error("State conflict on job {job_id}: {message}")]
    StateConflict {
        /// Job that changed under us
        job_id: u64,
        /// Error message describing the conflict
        message: String,
    },

    /// Missing or invalid settings
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message describing the configuration problem
        message: String,
    },

    /// Published verification key does not match the local signer
    #[error("Identity mismatch for {address}: published {published}, local {local}")]
    IdentityMismatch {
        /// Local actor address
        address: String,
        /// Hex of the key registered in the directory
        published: String,
        /// Hex of the key derived from the local signer
        local: String,
    },

    /// Every configured gateway failed to return the content
    #[error("All {attempts} gateways failed; last error: {last_error}")]
    AllGatewaysFailed {
        /// Number of gateways tried
        attempts: usize,
        /// Error reported by the final attempt
        last_error: String,
    },

    /// Content store rejected or could not address the content
    #[error("Storage error: {message}")]
    Storage {
        /// Error message describing the storage failure
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message describing the serialization failure
        message: String,
    },

    /// Invalid input
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

/// Fieldless classification of a [`CourierError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// See [`CourierError::Transport`]
    Transport,
    /// See [`CourierError::AuthenticationFailure`]
    AuthenticationFailure,
    /// See [`CourierError::MissingKey`]
    MissingKey,
    /// See [`CourierError::StateConflict`]
    StateConflict,
    /// See [`CourierError::Configuration`]
    Configuration,
    /// See [`CourierError::IdentityMismatch`]
    IdentityMismatch,
    /// See [`CourierError::AllGatewaysFailed`]
    AllGatewaysFailed,
    /// See [`CourierError::Storage`]
    Storage,
    /// See [`CourierError::Serialization`]
    Serialization,
    /// See [`CourierError::Invalid`]
    Invalid,
    /// See [`CourierError::Internal`]
    Internal,
}

/// How loudly an error should be reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    /// Expected outcome, not operator-visible
    Low,
    /// Per-job failure worth a warning
    Medium,
    /// Security-relevant or persistent failure
    High,
    /// Process cannot continue
    Critical,
}

impl CourierError {
    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create an authentication failure
    pub fn authentication_failure(message: impl Into<String>) -> Self {
        Self::AuthenticationFailure {
            message: message.into(),
        }
    }

    /// Create a missing key error
    pub fn missing_key(address: impl Into<String>) -> Self {
        Self::MissingKey {
            address: address.into(),
        }
    }

    /// Create a state conflict error
    pub fn state_conflict(job_id: u64, message: impl Into<String>) -> Self {
        Self::StateConflict {
            job_id,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CourierError::Transport { .. } => ErrorKind::Transport,
            CourierError::AuthenticationFailure { .. } => ErrorKind::AuthenticationFailure,
            CourierError::MissingKey { .. } => ErrorKind::MissingKey,
            CourierError::StateConflict { .. } => ErrorKind::StateConflict,
            CourierError::Configuration { .. } => ErrorKind::Configuration,
            CourierError::IdentityMismatch { .. } => ErrorKind::IdentityMismatch,
            CourierError::AllGatewaysFailed { .. } => ErrorKind::AllGatewaysFailed,
            CourierError::Storage { .. } => ErrorKind::Storage,
            CourierError::Serialization { .. } => ErrorKind::Serialization,
            CourierError::Invalid { .. } => ErrorKind::Invalid,
            CourierError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Get error severity for this error
    pub fn severity(&self) -> ErrorSeverity {
        match self.kind() {
            ErrorKind::StateConflict | ErrorKind::MissingKey => ErrorSeverity::Low,
            ErrorKind::Transport
            | ErrorKind::AllGatewaysFailed
            | ErrorKind::Storage
            | ErrorKind::Serialization
            | ErrorKind::Invalid => ErrorSeverity::Medium,
            ErrorKind::AuthenticationFailure | ErrorKind::Internal => ErrorSeverity::High,
            ErrorKind::Configuration | ErrorKind::IdentityMismatch => ErrorSeverity::Critical,
        }
    }

    /// Whether a later attempt with the same inputs may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Transport | ErrorKind::AllGatewaysFailed
        )
    }
}

/// Standard Result type for Courier operations
pub type Result<T> = std::result::Result<T, CourierError>;

impl From<serde_json::Error> for CourierError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<std::io::Error> for CourierError {
    fn from(err: std::io::Error) -> Self {
        Self::internal(err.to_string())
    }
}
