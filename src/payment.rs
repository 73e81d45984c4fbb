//! # Payment Orchestrator
//!
//! Validation is entirely local and runs before any session is opened. The
//! funds check uses the last reconciled snapshot, which can lag the server;
//! a remote insufficient-funds refusal is the authoritative answer.

use crate::config::WalletConfig;
use crate::error::{PaymentError, WalletError, WalletResult};
use crate::identity::SecretKey;
use crate::reconcile::{reconcile, Freshness};
use crate::record::{BalanceSnapshot, WalletRecord};
use crate::session::{timed, RemoteError, Session, SessionFactory, SessionGuard};
use std::time::Duration;

/// A validated payment, consumed by [`pay`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    destination: String,
    amount: u64,
}

impl PaymentRequest {
    /// Parse user input: a non-empty destination and a positive whole
    /// number of sats
    pub fn parse(destination: &str, amount: &str) -> Result<Self, PaymentError> {
        let amount = parse_amount(amount)?;
        Self::new(destination, amount)
    }

    /// Build a request from an already numeric amount
    pub fn new(destination: &str, amount: u64) -> Result<Self, PaymentError> {
        let destination = destination.trim();
        if destination.is_empty() {
            return Err(PaymentError::EmptyDestination);
        }
        if amount == 0 {
            return Err(PaymentError::InvalidAmount {
                input: "0".to_string(),
            });
        }
        Ok(Self {
            destination: destination.to_string(),
            amount,
        })
    }

    /// Compare against `available` of the given snapshot
    pub fn check_funds(&self, balance: &BalanceSnapshot) -> Result<(), PaymentError> {
        if self.amount > balance.available {
            return Err(PaymentError::InsufficientFunds {
                required: self.amount,
                available: balance.available,
            });
        }
        Ok(())
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }
}

fn parse_amount(input: &str) -> Result<u64, PaymentError> {
    let trimmed = input.trim();
    let invalid = || PaymentError::InvalidAmount {
        input: input.to_string(),
    };

    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    match trimmed.parse::<u64>() {
        Ok(0) | Err(_) => Err(invalid()),
        Ok(amount) => Ok(amount),
    }
}

/// Completed payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    /// Unknown for some payment types; that is not a failure
    pub txid: Option<String>,
    pub destination: String,
    pub amount: u64,
    /// Input record with the post-payment balance, or flagged stale when
    /// the follow-up reconciliation failed
    pub record: WalletRecord,
    pub freshness: Freshness,
}

/// Submit a payment from the wallet described by `record`
pub async fn pay(
    record: &WalletRecord,
    request: PaymentRequest,
    factory: &dyn SessionFactory,
    config: &WalletConfig,
) -> WalletResult<PaymentReceipt> {
    request.check_funds(&record.balance)?;

    let secret = SecretKey::from_hex(&record.private_key)?;
    let guard = SessionGuard::open(
        factory,
        &secret,
        record.server_url_or(&config.server_url),
        config.operation_timeout,
    )
    .await?;

    let result = pay_in_session(record, request, guard.session(), config.operation_timeout).await;
    guard.release().await;
    result
}

async fn pay_in_session(
    record: &WalletRecord,
    request: PaymentRequest,
    session: &dyn Session,
    limit: Duration,
) -> WalletResult<PaymentReceipt> {
    log::info!(
        "Sending {} sats to {}",
        request.amount,
        request.destination
    );

    let txid = timed(
        "send payment",
        limit,
        session.send_bitcoin(&request.destination, request.amount),
    )
    .await?
    .map_err(|e| WalletError::from(classify_remote(e)))?;

    match &txid {
        Some(txid) => log::info!("Payment accepted: {}", txid),
        None => log::info!("Payment accepted, txid not yet known"),
    }

    let (record, freshness) = match reconcile(session, limit).await {
        Ok(reconciliation) => (
            record.with_balance(reconciliation.snapshot, reconciliation.freshness.is_stale()),
            reconciliation.freshness,
        ),
        Err(e) => {
            log::warn!("Payment sent but balance refresh failed: {}", e);
            (
                record.marked_stale(),
                Freshness::Stale {
                    reason: e.to_string(),
                },
            )
        }
    };

    Ok(PaymentReceipt {
        txid,
        destination: request.destination,
        amount: request.amount,
        record,
        freshness,
    })
}

fn classify_remote(err: RemoteError) -> PaymentError {
    match err {
        RemoteError::InsufficientFunds { message } => {
            PaymentError::RemoteInsufficientFunds { message }
        }
        RemoteError::Rejected { message } => PaymentError::Rejected { message },
        RemoteError::Unreachable { message } => PaymentError::Network { message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::simulated::{FaultPoint, SimulatedCoordinator};

    fn test_config() -> WalletConfig {
        WalletConfig {
            server_url: "https://ark.test".to_string(),
            operation_timeout: Duration::from_secs(5),
            ..WalletConfig::default()
        }
    }

    async fn record_with_offchain(coordinator: &SimulatedCoordinator, amount: u64) -> WalletRecord {
        let key = SecretKey::generate().unwrap();
        let session = coordinator.open_session(&key, "https://ark.test").await.unwrap();
        let address = session.address().await.unwrap();
        if amount > 0 {
            coordinator.receive_offchain(&address, amount).unwrap();
        }
        let reconciliation = reconcile(session.as_ref(), Duration::from_secs(5))
            .await
            .unwrap();
        session.close().await;

        WalletRecord {
            private_key: key.expose_hex().to_string(),
            address,
            boarding_address: None,
            balance: reconciliation.snapshot,
            server_url: None,
            created_at: 0,
            balance_updated_at: 0,
            balance_stale: false,
        }
    }

    #[test]
    fn test_amount_parsing() {
        assert_eq!(PaymentRequest::parse("tark1q", "10000").unwrap().amount(), 10_000);
        assert_eq!(PaymentRequest::parse(" tark1q ", " 42 ").unwrap().destination(), "tark1q");

        for bad in ["", "0", "-5", "+5", "1.5", "1e3", "abc", "99999999999999999999999"] {
            assert!(
                matches!(
                    PaymentRequest::parse("tark1q", bad),
                    Err(PaymentError::InvalidAmount { .. })
                ),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_destination_required() {
        assert_eq!(
            PaymentRequest::parse("   ", "100"),
            Err(PaymentError::EmptyDestination)
        );
    }

    #[test]
    fn test_check_funds_against_available() {
        let balance = BalanceSnapshot {
            available: 5_000,
            total: 5_000,
            ..BalanceSnapshot::default()
        };
        let too_much = PaymentRequest::parse("addr", "10000").unwrap();
        assert_eq!(
            too_much.check_funds(&balance),
            Err(PaymentError::InsufficientFunds {
                required: 10_000,
                available: 5_000
            })
        );
        let exact = PaymentRequest::parse("addr", "5000").unwrap();
        assert!(exact.check_funds(&balance).is_ok());
    }

    #[tokio::test]
    async fn test_insufficient_funds_fails_without_network() {
        let coordinator = SimulatedCoordinator::new();
        let record = record_with_offchain(&coordinator, 5_000).await;
        let opened_before = coordinator.sessions_opened();

        let request = PaymentRequest::parse("addr", "10000").unwrap();
        let err = pay(&record, request, &coordinator, &test_config())
            .await
            .unwrap_err();
        match err {
            WalletError::Payment(inner) => {
                assert!(inner.is_validation());
                assert!(inner.is_insufficient_funds());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(coordinator.sessions_opened(), opened_before);
    }

    #[tokio::test]
    async fn test_payment_between_wallets() {
        let coordinator = SimulatedCoordinator::new();
        let sender = record_with_offchain(&coordinator, 30_000).await;
        let receiver = record_with_offchain(&coordinator, 0).await;

        let request = PaymentRequest::parse(&receiver.address, "12000").unwrap();
        let receipt = pay(&sender, request, &coordinator, &test_config())
            .await
            .unwrap();
        assert!(receipt.txid.is_some());
        assert_eq!(receipt.amount, 12_000);
        assert_eq!(receipt.record.balance.available, 18_000);
        assert_eq!(receipt.freshness, Freshness::Fresh);
        assert_eq!(coordinator.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_onchain_destination_has_no_txid() {
        let coordinator = SimulatedCoordinator::new();
        let sender = record_with_offchain(&coordinator, 30_000).await;

        let request = PaymentRequest::parse("tb1qexternaldestination", "1000").unwrap();
        let receipt = pay(&sender, request, &coordinator, &test_config())
            .await
            .unwrap();
        assert!(receipt.txid.is_none());
        assert_eq!(receipt.record.balance.available, 29_000);
    }

    #[tokio::test]
    async fn test_remote_insufficient_funds_is_authoritative() {
        let coordinator = SimulatedCoordinator::new();
        let mut record = record_with_offchain(&coordinator, 1_000).await;
        // Cached view says more than the server has
        record.balance.available = 50_000;
        record.balance.total = 50_000;

        let request = PaymentRequest::parse("tb1qdest", "20000").unwrap();
        let err = pay(&record, request, &coordinator, &test_config())
            .await
            .unwrap_err();
        match err {
            WalletError::Payment(inner) => {
                assert!(matches!(inner, PaymentError::RemoteInsufficientFunds { .. }));
                assert!(!inner.is_validation());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        let coordinator = SimulatedCoordinator::new();
        let record = record_with_offchain(&coordinator, 10_000).await;
        coordinator.fail_next(FaultPoint::Send);

        let request = PaymentRequest::parse("tb1qdest", "1000").unwrap();
        let err = pay(&record, request, &coordinator, &test_config())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WalletError::Payment(PaymentError::Network { .. })
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_failed_refresh_after_payment_still_succeeds() {
        let coordinator = SimulatedCoordinator::new();
        let record = record_with_offchain(&coordinator, 10_000).await;
        coordinator.fail_next(FaultPoint::Balance);

        let request = PaymentRequest::parse("tb1qdest", "1000").unwrap();
        let receipt = pay(&record, request, &coordinator, &test_config())
            .await
            .unwrap();
        assert!(receipt.freshness.is_stale());
        assert!(receipt.record.balance_stale);
        assert_eq!(receipt.record.balance, record.balance);
    }
}
