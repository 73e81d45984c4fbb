//! # Error Types for the aw Wallet
//!
//! One crate-wide error, [`WalletError`], plus focused enums for the two
//! orchestrators whose outcomes need finer classification: settlement must
//! tell "no funds moved" apart from "funds moved, view stale", and payments
//! must tell local validation apart from remote rejection.

use std::time::Duration;
use thiserror::Error;

/// Main error type for all wallet operations
#[derive(Debug, Error)]
pub enum WalletError {
    /// Key generation or parsing failures. Fatal, never retried.
    #[error("Identity error: {message}")]
    Identity { message: String },

    /// A session could not be established with the coordination server
    #[error("Session could not be opened: {message}")]
    Session { message: String },

    /// Incoming-funds notification or balance fetch failed
    #[error("Balance reconciliation failed: {message}")]
    Reconciliation { message: String },

    /// Boarding settlement failures
    #[error(transparent)]
    Settlement(#[from] SettlementError),

    /// Payment failures
    #[error(transparent)]
    Payment(#[from] PaymentError),

    /// A network-bound step exceeded the operation timeout. For a submitted
    /// settlement or payment the outcome is unknown.
    #[error("{operation} timed out after {limit:?}")]
    TimedOut { operation: String, limit: Duration },

    /// Another mutating operation is already in flight
    #[error("Wallet is busy: {operation} already in progress")]
    Busy { operation: String },

    /// No wallet record is persisted
    #[error("No wallet found, create one first")]
    NoWallet,

    /// A wallet record already exists
    #[error("A wallet already exists, clear it before creating a new one")]
    WalletExists,

    /// Key-value store failures
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Invalid configuration values
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// File I/O operations
    #[error("File operation failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON processing error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

/// Result type alias for wallet operations
pub type WalletResult<T> = Result<T, WalletError>;

impl WalletError {
    /// Create an identity error with a message
    pub fn identity(message: impl Into<String>) -> Self {
        Self::Identity {
            message: message.into(),
        }
    }

    /// Create a session error with a message
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    /// Create a reconciliation error with a message
    pub fn reconciliation(message: impl Into<String>) -> Self {
        Self::Reconciliation {
            message: message.into(),
        }
    }

    /// Create a storage error with a message
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a configuration error with a message
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a timeout error for the named operation
    pub fn timed_out(operation: impl Into<String>, limit: Duration) -> Self {
        Self::TimedOut {
            operation: operation.into(),
            limit,
        }
    }

    /// Check if re-triggering the same action may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            WalletError::Session { .. }
            | WalletError::Reconciliation { .. }
            | WalletError::TimedOut { .. }
            | WalletError::Busy { .. } => true,
            WalletError::Payment(err) => matches!(err, PaymentError::Network { .. }),
            WalletError::Settlement(err) => matches!(err, SettlementError::Rejected { .. }),
            _ => false,
        }
    }

    /// Check if the error leaves a possibly stale cached balance behind
    pub fn leaves_stale_view(&self) -> bool {
        matches!(
            self,
            WalletError::Reconciliation { .. }
                | WalletError::TimedOut { .. }
                | WalletError::Settlement(SettlementError::AppliedViewStale { .. })
        )
    }
}

/// Boarding settlement failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    /// Precondition failed: there is nothing to settle
    #[error("No boarding funds to settle")]
    NoBoardingFunds,

    /// The commitment was refused; no state changed
    #[error("Settlement rejected, no funds moved: {message}")]
    Rejected { message: String },

    /// The commitment was accepted but the balance could not be refreshed
    #[error("Settlement {commitment_txid} accepted but balance refresh failed: {message}")]
    AppliedViewStale {
        commitment_txid: String,
        message: String,
    },
}

impl SettlementError {
    /// Whether funds changed state despite the error
    pub fn funds_moved(&self) -> bool {
        matches!(self, SettlementError::AppliedViewStale { .. })
    }
}

/// Payment failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    /// Amount is not a positive integer of sats
    #[error("Invalid amount '{input}': expected a positive whole number of sats")]
    InvalidAmount { input: String },

    /// Destination is empty
    #[error("Destination address is required")]
    EmptyDestination,

    /// Local check against the last reconciled snapshot failed
    #[error("Insufficient funds: required {required} sats, available {available} sats")]
    InsufficientFunds { required: u64, available: u64 },

    /// The coordination server refused the payment for lack of funds
    #[error("Insufficient funds reported by server: {message}")]
    RemoteInsufficientFunds { message: String },

    /// Any other remote refusal, surfaced verbatim
    #[error("{message}")]
    Rejected { message: String },

    /// The payment could not reach the server
    #[error("Payment could not be submitted: {message}")]
    Network { message: String },
}

impl PaymentError {
    /// Failed before any network activity
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PaymentError::InvalidAmount { .. }
                | PaymentError::EmptyDestination
                | PaymentError::InsufficientFunds { .. }
        )
    }

    /// Insufficient funds, whether detected locally or remotely
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(
            self,
            PaymentError::InsufficientFunds { .. } | PaymentError::RemoteInsufficientFunds { .. }
        )
    }
}
