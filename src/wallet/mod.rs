//! # Wallet
//!
//! Ties the persisted record, the session factory and the orchestrators
//! together. Each operation loads the record, works on it by reference,
//! and persists the new record it gets back in a single write.
//!
//! Only one operation runs at a time: starting a second one while the first
//! is in flight fails with [`WalletError::Busy`] instead of racing it to the
//! store.

use crate::config::WalletConfig;
use crate::error::{WalletError, WalletResult};
use crate::identity::SecretKey;
use crate::payment::{self, PaymentReceipt, PaymentRequest};
use crate::reconcile::{reconcile, Freshness};
use crate::record::{BalanceSnapshot, WalletRecord};
use crate::session::{timed, SessionFactory, SessionGuard};
use crate::settlement::{self, SettlementOutcome};
use crate::storage::WalletRepository;
use std::sync::{Arc, Mutex};


/// A record together with how far its balance can be trusted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletView {
    pub record: WalletRecord,
    pub freshness: Freshness,
}

/// Wallet session and balance lifecycle manager
pub struct Wallet {
    repository: WalletRepository,
    factory: Arc<dyn SessionFactory>,
    config: WalletConfig,
    in_flight: Mutex<Option<&'static str>>,
}

/// Clears the in-flight marker when the operation ends, however it ends
struct InFlight<'a> {
    slot: &'a Mutex<Option<&'static str>>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        match self.slot.lock() {
            Ok(mut slot) => *slot = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

impl Wallet {
    pub fn new(
        repository: WalletRepository,
        factory: Arc<dyn SessionFactory>,
        config: WalletConfig,
    ) -> Self {
        Self {
            repository,
            factory,
            config,
            in_flight: Mutex::new(None),
        }
    }

    fn begin(&self, operation: &'static str) -> WalletResult<InFlight<'_>> {
        let mut slot = self
            .in_flight
            .lock()
            .map_err(|_| WalletError::storage("in-flight marker poisoned"))?;
        if let Some(current) = *slot {
            return Err(WalletError::Busy {
                operation: current.to_string(),
            });
        }
        *slot = Some(operation);
        Ok(InFlight {
            slot: &self.in_flight,
        })
    }

    /// The persisted record, if any
    pub fn load(&self) -> WalletResult<Option<WalletRecord>> {
        self.repository.load()
    }

    /// The persisted record, or [`WalletError::NoWallet`]
    pub fn current(&self) -> WalletResult<WalletRecord> {
        self.repository.load()?.ok_or(WalletError::NoWallet)
    }

    /// Generate an identity, derive its addresses and fetch the first balance
    pub async fn create(&self) -> WalletResult<WalletView> {
        let _in_flight = self.begin("create wallet")?;
        if self.repository.load()?.is_some() {
            return Err(WalletError::WalletExists);
        }

        let secret = SecretKey::generate()?;
        let identity = secret.public_identity()?;
        log::info!("Creating wallet {}", identity.fingerprint());

        let guard = SessionGuard::open(
            self.factory.as_ref(),
            &secret,
            &self.config.server_url,
            self.config.operation_timeout,
        )
        .await?;
        let result = self.initialise(&secret, &guard).await;
        guard.release().await;

        let view = result?;
        self.repository.save(&view.record)?;
        log::info!("Wallet {} created at {}", identity.fingerprint(), view.record.address);
        Ok(view)
    }

    async fn initialise(&self, secret: &SecretKey, guard: &SessionGuard) -> WalletResult<WalletView> {
        let limit = self.config.operation_timeout;
        let session = guard.session();

        let address = timed("fetch address", limit, session.address())
            .await?
            .map_err(|e| WalletError::session(format!("address derivation failed: {}", e)))?;
        let boarding_address = timed("fetch boarding address", limit, session.boarding_address())
            .await?
            .map_err(|e| WalletError::session(format!("boarding address derivation failed: {}", e)))?;

        let now = chrono::Utc::now().timestamp();
        let record = WalletRecord {
            private_key: secret.expose_hex().to_string(),
            address,
            boarding_address,
            balance: BalanceSnapshot::empty(),
            server_url: Some(self.config.server_url.clone()),
            created_at: now,
            balance_updated_at: 0,
            balance_stale: true,
        };

        match reconcile(session, limit).await {
            Ok(reconciliation) => Ok(WalletView {
                record: record.with_balance(
                    reconciliation.snapshot,
                    reconciliation.freshness.is_stale(),
                ),
                freshness: reconciliation.freshness,
            }),
            Err(e) => {
                log::warn!("Initial balance fetch failed, saving wallet without one: {}", e);
                Ok(WalletView {
                    record,
                    freshness: Freshness::Stale {
                        reason: e.to_string(),
                    },
                })
            }
        }
    }

    /// Reconcile the balance and persist it
    ///
    /// When reconciliation fails the record is persisted flagged stale and
    /// the error is returned.
    pub async fn refresh(&self) -> WalletResult<WalletView> {
        let _in_flight = self.begin("refresh balance")?;
        let record = self.current()?;
        let secret = SecretKey::from_hex(&record.private_key)?;

        let guard = SessionGuard::open(
            self.factory.as_ref(),
            &secret,
            record.server_url_or(&self.config.server_url),
            self.config.operation_timeout,
        )
        .await?;
        let result = reconcile(guard.session(), self.config.operation_timeout).await;
        guard.release().await;

        match result {
            Ok(reconciliation) => {
                let updated = record.with_balance(
                    reconciliation.snapshot,
                    reconciliation.freshness.is_stale(),
                );
                self.repository.save(&updated)?;
                Ok(WalletView {
                    record: updated,
                    freshness: reconciliation.freshness,
                })
            }
            Err(e) => {
                self.repository.save(&record.marked_stale())?;
                Err(e)
            }
        }
    }

    /// Settle boarding funds and persist the resulting balance
    ///
    /// When the commitment may have been applied without a refreshed view
    /// (accepted but not reconciled, or a timed out submission) the record
    /// is persisted flagged stale.
    pub async fn settle(&self) -> WalletResult<SettlementOutcome> {
        let _in_flight = self.begin("settle boarding funds")?;
        let record = self.current()?;

        match settlement::settle_boarding(&record, self.factory.as_ref(), &self.config).await {
            Ok(outcome) => {
                self.repository.save(&outcome.record)?;
                Ok(outcome)
            }
            Err(e) if e.leaves_stale_view() => {
                log::warn!("Settlement outcome unknown, marking balance stale: {}", e);
                self.repository.save(&record.marked_stale())?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Send a validated payment and persist the resulting balance
    ///
    /// A timed out submission may still have been applied, so the record is
    /// persisted flagged stale before the error is returned.
    pub async fn send(&self, request: PaymentRequest) -> WalletResult<PaymentReceipt> {
        let _in_flight = self.begin("send payment")?;
        let record = self.current()?;

        match payment::pay(&record, request, self.factory.as_ref(), &self.config).await {
            Ok(receipt) => {
                self.repository.save(&receipt.record)?;
                Ok(receipt)
            }
            Err(e) if e.leaves_stale_view() => {
                log::warn!("Payment outcome unknown, marking balance stale: {}", e);
                self.repository.save(&record.marked_stale())?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Delete the wallet. Irreversible: there is no backup.
    pub fn clear(&self) -> WalletResult<()> {
        let _in_flight = self.begin("clear wallet")?;
        self.repository.clear()
    }
}
