//! # Session Factory
//!
//! The wallet SDK is reached only through [`Session`]. Sessions are not kept
//! alive between user actions: every orchestrator opens one from the
//! persisted secret through a [`SessionFactory`], wrapped in a
//! [`SessionGuard`] that releases it on every exit path.
//!
//! Every network-bound step goes through [`timed`], which turns a stalled
//! call into [`WalletError::TimedOut`].

use crate::error::{WalletError, WalletResult};
use crate::identity::SecretKey;
use crate::record::BalanceSnapshot;
use async_trait::async_trait;
use std::{fmt, future::Future, sync::Arc, time::Duration};
use thiserror::Error;

/// Failures reported by the session collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The server could not be reached or did not answer
    #[error("server unreachable: {message}")]
    Unreachable { message: String },

    /// The server refused the request
    #[error("{message}")]
    Rejected { message: String },

    /// The server refused the request for lack of funds
    #[error("{message}")]
    InsufficientFunds { message: String },
}

impl RemoteError {
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable {
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Identifier of an accepted settlement commitment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommitmentId(pub String);

impl fmt::Display for CommitmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A live wallet session against the coordination server
#[async_trait]
pub trait Session: Send + Sync {
    /// Offchain receiving address
    async fn address(&self) -> RemoteResult<String>;

    /// On-chain boarding address, if the server supports boarding
    async fn boarding_address(&self) -> RemoteResult<Option<String>>;

    /// Ask the server to pick up deposits addressed to this identity.
    /// Idempotent; a no-op when nothing new arrived.
    async fn notify_incoming_funds(&self) -> RemoteResult<()>;

    /// Current balance as seen by the server
    async fn get_balance(&self) -> RemoteResult<BalanceSnapshot>;

    /// Move confirmed boarding funds into the offchain pool
    async fn settle(&self) -> RemoteResult<CommitmentId>;

    /// Send `amount` sats to `destination`. The txid may be unknown.
    async fn send_bitcoin(&self, destination: &str, amount: u64) -> RemoteResult<Option<String>>;

    /// Release server-side resources held by the session
    async fn close(&self);
}

/// Opens sessions from a secret key
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open_session(
        &self,
        secret_key: &SecretKey,
        server_url: &str,
    ) -> RemoteResult<Arc<dyn Session>>;
}

/// Run a network-bound step under a timeout
pub async fn timed<T, F>(operation: &str, limit: Duration, fut: F) -> WalletResult<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, fut).await.map_err(|_| {
        log::warn!("{} timed out after {:?}", operation, limit);
        WalletError::timed_out(operation, limit)
    })
}

/// Scoped ownership of an open session.
///
/// Call [`SessionGuard::release`] once the work is done. If the guard is
/// dropped first (an early return, a timeout cancelling the enclosing
/// future) the close is spawned onto the current runtime instead.
pub struct SessionGuard {
    session: Arc<dyn Session>,
    released: bool,
}

impl SessionGuard {
    /// Open a session, mapping collaborator failures to `SessionError`
    pub async fn open(
        factory: &dyn SessionFactory,
        secret_key: &SecretKey,
        server_url: &str,
        limit: Duration,
    ) -> WalletResult<Self> {
        log::debug!("Opening session against {}", server_url);
        let session = timed(
            "open session",
            limit,
            factory.open_session(secret_key, server_url),
        )
        .await?
        .map_err(|e| WalletError::session(e.to_string()))?;

        Ok(Self {
            session,
            released: false,
        })
    }

    /// Borrow the live session
    pub fn session(&self) -> &dyn Session {
        self.session.as_ref()
    }

    /// Close the session now
    pub async fn release(mut self) {
        self.session.close().await;
        self.released = true;
        log::debug!("Session released");
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let session = Arc::clone(&self.session);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    session.close().await;
                });
            }
            Err(_) => log::warn!("Session dropped outside a runtime, not closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::simulated::{FaultPoint, SimulatedCoordinator};

    #[tokio::test]
    async fn test_guard_releases_on_explicit_release() {
        let coordinator = SimulatedCoordinator::new();
        let key = SecretKey::generate().unwrap();

        let guard = SessionGuard::open(&coordinator, &key, "https://ark.test", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(coordinator.open_sessions(), 1);
        guard.session().notify_incoming_funds().await.unwrap();
        guard.release().await;
        assert_eq!(coordinator.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_guard_releases_on_drop() {
        let coordinator = SimulatedCoordinator::new();
        let key = SecretKey::generate().unwrap();

        {
            let _guard =
                SessionGuard::open(&coordinator, &key, "https://ark.test", Duration::from_secs(5))
                    .await
                    .unwrap();
            assert_eq!(coordinator.open_sessions(), 1);
        }
        // The close runs on a spawned task
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(coordinator.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_open_failure_is_session_error() {
        let coordinator = SimulatedCoordinator::new();
        coordinator.fail_next(FaultPoint::Open);
        let key = SecretKey::generate().unwrap();

        let result =
            SessionGuard::open(&coordinator, &key, "https://ark.test", Duration::from_secs(5)).await;
        assert!(matches!(result, Err(WalletError::Session { .. })));
    }

    #[tokio::test]
    async fn test_timed_maps_stall_to_timeout() {
        let result = timed("balance fetch", Duration::from_millis(20), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
        })
        .await;
        match result {
            Err(WalletError::TimedOut { operation, limit }) => {
                assert_eq!(operation, "balance fetch");
                assert_eq!(limit, Duration::from_millis(20));
            }
            other => panic!("expected a timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_release_closes_only_its_own_session() {
        let coordinator = SimulatedCoordinator::new();
        let key = SecretKey::generate().unwrap();

        let first = SessionGuard::open(&coordinator, &key, "https://ark.test", Duration::from_secs(5))
            .await
            .unwrap();
        let second = SessionGuard::open(&coordinator, &key, "https://ark.test", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(coordinator.open_sessions(), 2);

        first.release().await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(coordinator.open_sessions(), 1);
        second.release().await;
        assert_eq!(coordinator.open_sessions(), 0);
    }
}
