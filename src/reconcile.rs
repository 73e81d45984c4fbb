//! # Balance Reconciler
//!
//! A balance is only current after the server has been told to look for
//! incoming funds, so reconciliation is always notify-then-fetch. A failed
//! notify does not abort: the fetch still runs and the result comes back
//! marked [`Freshness::Stale`] so the caller can say so instead of passing
//! the figures off as fresh.

use crate::error::{WalletError, WalletResult};
use crate::record::BalanceSnapshot;
use crate::session::{timed, Session};
use std::time::Duration;

/// Whether a snapshot reflects every deposit the server knows about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale { reason: String },
}

impl Freshness {
    pub fn is_stale(&self) -> bool {
        matches!(self, Freshness::Stale { .. })
    }
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub snapshot: BalanceSnapshot,
    pub freshness: Freshness,
}

/// Notify incoming funds, then fetch and validate the balance
pub async fn reconcile(session: &dyn Session, limit: Duration) -> WalletResult<Reconciliation> {
    let freshness = match timed("notify incoming funds", limit, session.notify_incoming_funds()).await
    {
        Ok(Ok(())) => Freshness::Fresh,
        Ok(Err(e)) => {
            log::warn!("Incoming funds notification failed, balance may be stale: {}", e);
            Freshness::Stale {
                reason: format!("incoming funds check failed: {}", e),
            }
        }
        Err(e) => {
            log::warn!("Incoming funds notification did not finish: {}", e);
            Freshness::Stale {
                reason: e.to_string(),
            }
        }
    };

    let snapshot = timed("balance fetch", limit, session.get_balance())
        .await?
        .map_err(|e| WalletError::reconciliation(format!("balance fetch failed: {}", e)))?;
    snapshot.validate()?;

    log::debug!(
        "Reconciled balance: total {} available {} boarding {} ({})",
        snapshot.total,
        snapshot.available,
        snapshot.boarding.total,
        if freshness.is_stale() { "stale" } else { "fresh" }
    );

    Ok(Reconciliation {
        snapshot,
        freshness,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SecretKey;
    use crate::services::simulated::{FaultPoint, SimulatedCoordinator};
    use crate::session::SessionFactory;

    const LIMIT: Duration = Duration::from_secs(5);

    async fn open(coordinator: &SimulatedCoordinator) -> std::sync::Arc<dyn Session> {
        let key = SecretKey::generate().unwrap();
        coordinator
            .open_session(&key, "https://ark.test")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_wallet_reconciles_to_zero() {
        let coordinator = SimulatedCoordinator::new();
        let session = open(&coordinator).await;

        let result = reconcile(session.as_ref(), LIMIT).await.unwrap();
        assert_eq!(result.snapshot, BalanceSnapshot::empty());
        assert_eq!(result.freshness, Freshness::Fresh);
    }

    #[tokio::test]
    async fn test_deposit_only_visible_after_notify() {
        let coordinator = SimulatedCoordinator::new();
        let session = open(&coordinator).await;
        let boarding = session.boarding_address().await.unwrap().unwrap();
        coordinator.fund_boarding(&boarding, 50_000, true).unwrap();

        // A bare fetch does not see the deposit yet
        assert_eq!(session.get_balance().await.unwrap().boarding.total, 0);

        let result = reconcile(session.as_ref(), LIMIT).await.unwrap();
        assert_eq!(result.snapshot.boarding.confirmed, 50_000);
        assert_eq!(result.snapshot.boarding.total, 50_000);
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let coordinator = SimulatedCoordinator::new();
        let session = open(&coordinator).await;
        let address = session.address().await.unwrap();
        coordinator.receive_offchain(&address, 7_500).unwrap();

        let first = reconcile(session.as_ref(), LIMIT).await.unwrap();
        let second = reconcile(session.as_ref(), LIMIT).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.snapshot.preconfirmed, 7_500);
        assert!(first.snapshot.validate().is_ok());
    }

    #[tokio::test]
    async fn test_notify_failure_marks_stale() {
        let coordinator = SimulatedCoordinator::new();
        let session = open(&coordinator).await;
        coordinator.fail_next(FaultPoint::Notify);

        let result = reconcile(session.as_ref(), LIMIT).await.unwrap();
        assert!(result.freshness.is_stale());
        assert_eq!(result.snapshot, BalanceSnapshot::empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reconciliation_error() {
        let coordinator = SimulatedCoordinator::new();
        let session = open(&coordinator).await;
        coordinator.fail_next(FaultPoint::Balance);

        let result = reconcile(session.as_ref(), LIMIT).await;
        assert!(matches!(result, Err(WalletError::Reconciliation { .. })));
    }

    #[tokio::test]
    async fn test_stalled_fetch_times_out() {
        let coordinator = SimulatedCoordinator::new();
        let session = open(&coordinator).await;
        coordinator.stall(FaultPoint::Balance);

        let result = reconcile(session.as_ref(), Duration::from_millis(50)).await;
        assert!(matches!(result, Err(WalletError::TimedOut { .. })));
    }
}
