//! # Services Module
//!
//! Session collaborators for the aw wallet.
//!
//! ## Components
//!
//! - **Bridge Client**: HTTP client for the local SDK bridge
//! - **Simulated Coordinator**: in-memory coordination server for demos and tests

pub mod bridge_client;
pub mod simulated;

pub use bridge_client::HttpSessionFactory;
pub use simulated::SimulatedCoordinator;
