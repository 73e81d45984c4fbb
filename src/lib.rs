//! # aw: Offchain Ark Wallet Client
//!
//! Manages a locally persisted wallet identity and keeps its cached balance
//! consistent with the coordination server. Key derivation, addresses,
//! balance computation, boarding settlement and payments happen inside the
//! wallet SDK, reached only through [`session::Session`].

pub mod config;
pub mod error;
pub mod identity;
pub mod payment;
pub mod reconcile;
pub mod record;
pub mod services;
pub mod session;
pub mod settlement;
pub mod storage;
pub mod utils;
pub mod wallet;

// Re-export commonly used types
pub use config::WalletConfig;
pub use error::{PaymentError, SettlementError, WalletError, WalletResult};
pub use identity::SecretKey;
pub use payment::PaymentRequest;
pub use record::{BalanceSnapshot, BoardingBalance, WalletRecord};
pub use services::{HttpSessionFactory, SimulatedCoordinator};
pub use wallet::{Wallet, WalletView};
