//! # Settlement Orchestrator
//!
//! Converts boarding funds into offchain settled funds with a single
//! commitment, then reconciles so the returned record shows the new split.

use crate::config::WalletConfig;
use crate::error::{SettlementError, WalletError, WalletResult};
use crate::identity::SecretKey;
use crate::reconcile::{reconcile, Freshness};
use crate::record::WalletRecord;
use crate::session::{timed, CommitmentId, Session, SessionFactory, SessionGuard};
use std::time::Duration;

/// Successful settlement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementOutcome {
    pub commitment: CommitmentId,
    /// Input record with the post-settlement balance
    pub record: WalletRecord,
    pub freshness: Freshness,
}

/// Settle the wallet's boarding funds.
///
/// Fails with [`SettlementError::NoBoardingFunds`] without opening a session
/// when the cached boarding total is zero. A refused commitment is
/// [`SettlementError::Rejected`]; an accepted one whose follow-up
/// reconciliation fails is [`SettlementError::AppliedViewStale`].
pub async fn settle_boarding(
    record: &WalletRecord,
    factory: &dyn SessionFactory,
    config: &WalletConfig,
) -> WalletResult<SettlementOutcome> {
    if record.balance.boarding.total == 0 {
        return Err(SettlementError::NoBoardingFunds.into());
    }
    if record.balance.boarding.confirmed == 0 {
        log::warn!(
            "Boarding funds are unconfirmed ({} sats), the server may refuse to settle",
            record.balance.boarding.unconfirmed
        );
    }

    let secret = SecretKey::from_hex(&record.private_key)?;
    let guard = SessionGuard::open(
        factory,
        &secret,
        record.server_url_or(&config.server_url),
        config.operation_timeout,
    )
    .await?;

    let result = settle_in_session(record, guard.session(), config.operation_timeout).await;
    guard.release().await;
    result
}

async fn settle_in_session(
    record: &WalletRecord,
    session: &dyn Session,
    limit: Duration,
) -> WalletResult<SettlementOutcome> {
    let commitment = timed("settle boarding funds", limit, session.settle())
        .await?
        .map_err(|e| {
            log::warn!("Settlement rejected: {}", e);
            WalletError::from(SettlementError::Rejected {
                message: e.to_string(),
            })
        })?;
    log::info!("Settlement accepted in commitment {}", commitment);

    match reconcile(session, limit).await {
        Ok(reconciliation) => Ok(SettlementOutcome {
            commitment,
            record: record.with_balance(
                reconciliation.snapshot,
                reconciliation.freshness.is_stale(),
            ),
            freshness: reconciliation.freshness,
        }),
        Err(e) => {
            log::warn!(
                "Commitment {} accepted but balance refresh failed: {}",
                commitment,
                e
            );
            Err(SettlementError::AppliedViewStale {
                commitment_txid: commitment.0,
                message: e.to_string(),
            }
            .into())
        }
    }
}
