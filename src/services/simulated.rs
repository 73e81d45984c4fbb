//! # Simulated Coordinator
//!
//! An in-memory stand-in for the coordination server, used by `aw demo`
//! and the test suite. It keeps one account per identity and models the
//! parts of the balance lifecycle the client relies on:
//!
//! - deposits stay invisible until `notify_incoming_funds` picks them up
//! - settlement moves confirmed boarding funds (and preconfirmed funds) into
//!   `settled`, charging `settlement_fee` on the boarding part (default 0)
//! - payments to a known offchain address land as a pending preconfirmed
//!   deposit for the recipient and return a txid; anything else is treated
//!   as an on-chain exit whose txid is not known yet
//!
//! Faults can be injected per call site, either failing the next call once
//! or stalling every call until cleared.

use crate::identity::SecretKey;
use crate::record::{BalanceSnapshot, BoardingBalance};
use crate::session::{CommitmentId, RemoteError, RemoteResult, Session, SessionFactory};
use async_trait::async_trait;
use bitcoin::{
    bech32::{self, Bech32m, Hrp},
    secp256k1::Secp256k1,
    Address, Network,
};
use sha2::{Digest, Sha256};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

/// Human-readable part of simulated offchain addresses
const OFFCHAIN_HRP: &str = "tark";

/// Call sites faults can be injected at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Open,
    Notify,
    Balance,
    Settle,
    Send,
}

#[derive(Debug, Clone, Copy)]
enum Deposit {
    Boarding { amount: u64, confirmed: bool },
    Offchain { amount: u64 },
}

#[derive(Debug, Default)]
struct Account {
    address: String,
    boarding_address: String,
    boarding_confirmed: u64,
    boarding_unconfirmed: u64,
    settled: u64,
    preconfirmed: u64,
    recoverable: u64,
    pending: Vec<Deposit>,
}

impl Account {
    fn snapshot(&self) -> BalanceSnapshot {
        let boarding = BoardingBalance::new(self.boarding_confirmed, self.boarding_unconfirmed);
        let available = self.settled + self.preconfirmed;
        BalanceSnapshot {
            boarding,
            settled: self.settled,
            preconfirmed: self.preconfirmed,
            available,
            recoverable: self.recoverable,
            total: boarding.total + available + self.recoverable,
        }
    }
}

#[derive(Debug, Default)]
struct CoordinatorState {
    accounts: HashMap<String, Account>,
    by_address: HashMap<String, String>,
    by_boarding_address: HashMap<String, String>,
    fail_once: HashSet<FaultPoint>,
    stalled: HashSet<FaultPoint>,
    settlement_fee: u64,
    sessions_opened: usize,
    open_sessions: usize,
    sequence: u64,
}

enum FaultAction {
    Proceed,
    Fail,
    Stall,
}

impl CoordinatorState {
    fn fault(&mut self, point: FaultPoint) -> FaultAction {
        if self.stalled.contains(&point) {
            FaultAction::Stall
        } else if self.fail_once.remove(&point) {
            FaultAction::Fail
        } else {
            FaultAction::Proceed
        }
    }

    fn next_id(&mut self, tag: &str, owner: &str) -> String {
        self.sequence += 1;
        let mut hasher = Sha256::new();
        hasher.update(tag.as_bytes());
        hasher.update(owner.as_bytes());
        hasher.update(self.sequence.to_be_bytes());
        hex::encode(hasher.finalize())
    }

    fn account_by_address(&mut self, address: &str) -> RemoteResult<&mut Account> {
        let owner = self
            .by_address
            .get(address)
            .or_else(|| self.by_boarding_address.get(address))
            .cloned()
            .ok_or_else(|| RemoteError::rejected(format!("unknown address {}", address)))?;
        self.account(&owner)
    }

    fn account(&mut self, owner: &str) -> RemoteResult<&mut Account> {
        self.accounts
            .get_mut(owner)
            .ok_or_else(|| RemoteError::rejected("unknown identity"))
    }
}

/// In-memory coordination server
#[derive(Debug, Clone, Default)]
pub struct SimulatedCoordinator {
    state: Arc<Mutex<CoordinatorState>>,
}

impl SimulatedCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Charge `fee` sats on every boarding settlement
    pub fn with_settlement_fee(self, fee: u64) -> Self {
        self.lock().settlement_fee = fee;
        self
    }

    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        // A panic while holding the lock only happens inside a failing test
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fail the next call at `point` once
    pub fn fail_next(&self, point: FaultPoint) {
        self.lock().fail_once.insert(point);
    }

    /// Make every call at `point` hang until [`SimulatedCoordinator::resume`]
    pub fn stall(&self, point: FaultPoint) {
        self.lock().stalled.insert(point);
    }

    pub fn resume(&self, point: FaultPoint) {
        self.lock().stalled.remove(&point);
    }

    /// Sessions opened since creation
    pub fn sessions_opened(&self) -> usize {
        self.lock().sessions_opened
    }

    /// Sessions opened and not yet closed
    pub fn open_sessions(&self) -> usize {
        self.lock().open_sessions
    }

    /// Send on-chain funds to a boarding address
    pub fn fund_boarding(
        &self,
        boarding_address: &str,
        amount: u64,
        confirmed: bool,
    ) -> RemoteResult<()> {
        let mut state = self.lock();
        let owner = state
            .by_boarding_address
            .get(boarding_address)
            .cloned()
            .ok_or_else(|| RemoteError::rejected("unknown boarding address"))?;
        state
            .account(&owner)?
            .pending
            .push(Deposit::Boarding { amount, confirmed });
        Ok(())
    }

    /// Confirm every unconfirmed boarding deposit for the address
    pub fn confirm_boarding(&self, boarding_address: &str) -> RemoteResult<()> {
        let mut state = self.lock();
        let account = state.account_by_address(boarding_address)?;
        account.boarding_confirmed += account.boarding_unconfirmed;
        account.boarding_unconfirmed = 0;
        for deposit in account.pending.iter_mut() {
            if let Deposit::Boarding { confirmed, .. } = deposit {
                *confirmed = true;
            }
        }
        Ok(())
    }

    /// Deliver an offchain payment from outside the simulation
    pub fn receive_offchain(&self, address: &str, amount: u64) -> RemoteResult<()> {
        let mut state = self.lock();
        state
            .account_by_address(address)?
            .pending
            .push(Deposit::Offchain { amount });
        Ok(())
    }

    /// Move settled funds into the recoverable bucket, as after an
    /// uncooperative exit
    pub fn expire_to_recoverable(&self, address: &str, amount: u64) -> RemoteResult<()> {
        let mut state = self.lock();
        let account = state.account_by_address(address)?;
        let moved = amount.min(account.settled);
        account.settled -= moved;
        account.recoverable += moved;
        Ok(())
    }
}

fn offchain_address(x_only: &[u8; 32]) -> RemoteResult<String> {
    let hrp = Hrp::parse(OFFCHAIN_HRP).map_err(|e| RemoteError::rejected(e.to_string()))?;
    bech32::encode::<Bech32m>(hrp, x_only).map_err(|e| RemoteError::rejected(e.to_string()))
}

#[async_trait]
impl SessionFactory for SimulatedCoordinator {
    async fn open_session(
        &self,
        secret_key: &SecretKey,
        server_url: &str,
    ) -> RemoteResult<Arc<dyn Session>> {
        let action = self.lock().fault(FaultPoint::Open);
        match action {
            FaultAction::Stall => std::future::pending::<()>().await,
            FaultAction::Fail => {
                return Err(RemoteError::unreachable(format!(
                    "could not connect to {}",
                    server_url
                )))
            }
            FaultAction::Proceed => {}
        }

        let identity = secret_key
            .public_identity()
            .map_err(|e| RemoteError::rejected(e.to_string()))?;
        let owner = identity.x_only_hex();

        let mut state = self.lock();
        if !state.accounts.contains_key(&owner) {
            let secp = Secp256k1::verification_only();
            let address = offchain_address(&identity.x_only_key().serialize())?;
            let boarding_address =
                Address::p2tr(&secp, identity.x_only_key(), None, Network::Signet).to_string();

            state.by_address.insert(address.clone(), owner.clone());
            state
                .by_boarding_address
                .insert(boarding_address.clone(), owner.clone());
            state.accounts.insert(
                owner.clone(),
                Account {
                    address,
                    boarding_address,
                    ..Account::default()
                },
            );
            log::debug!("Simulated coordinator registered {}", identity.fingerprint());
        }
        state.sessions_opened += 1;
        state.open_sessions += 1;

        Ok(Arc::new(SimulatedSession {
            state: Arc::clone(&self.state),
            owner,
            closed: AtomicBool::new(false),
        }))
    }
}

/// Session handed out by [`SimulatedCoordinator`]
#[derive(Debug)]
pub struct SimulatedSession {
    state: Arc<Mutex<CoordinatorState>>,
    owner: String,
    closed: AtomicBool,
}

impl SimulatedSession {
    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_open(&self) -> RemoteResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RemoteError::rejected("session closed"));
        }
        Ok(())
    }

    /// Apply fault injection for `point`; stalls never return
    async fn gate(&self, point: FaultPoint) -> RemoteResult<()> {
        self.ensure_open()?;
        let action = self.lock().fault(point);
        match action {
            FaultAction::Proceed => Ok(()),
            FaultAction::Fail => Err(match point {
                FaultPoint::Settle => RemoteError::rejected("round failed, commitment not created"),
                _ => RemoteError::unreachable("connection reset by peer"),
            }),
            FaultAction::Stall => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Session for SimulatedSession {
    async fn address(&self) -> RemoteResult<String> {
        self.ensure_open()?;
        let mut state = self.lock();
        Ok(state.account(&self.owner)?.address.clone())
    }

    async fn boarding_address(&self) -> RemoteResult<Option<String>> {
        self.ensure_open()?;
        let mut state = self.lock();
        Ok(Some(state.account(&self.owner)?.boarding_address.clone()))
    }

    async fn notify_incoming_funds(&self) -> RemoteResult<()> {
        self.gate(FaultPoint::Notify).await?;
        let mut state = self.lock();
        let account = state.account(&self.owner)?;
        for deposit in account.pending.drain(..) {
            match deposit {
                Deposit::Boarding {
                    amount,
                    confirmed: true,
                } => account.boarding_confirmed += amount,
                Deposit::Boarding {
                    amount,
                    confirmed: false,
                } => account.boarding_unconfirmed += amount,
                Deposit::Offchain { amount } => account.preconfirmed += amount,
            }
        }
        Ok(())
    }

    async fn get_balance(&self) -> RemoteResult<BalanceSnapshot> {
        self.gate(FaultPoint::Balance).await?;
        let mut state = self.lock();
        Ok(state.account(&self.owner)?.snapshot())
    }

    async fn settle(&self) -> RemoteResult<CommitmentId> {
        self.gate(FaultPoint::Settle).await?;
        let mut state = self.lock();
        let fee = state.settlement_fee;
        let account = state.account(&self.owner)?;

        if account.boarding_confirmed == 0 && account.preconfirmed == 0 {
            return Err(RemoteError::rejected("no confirmed funds to settle"));
        }
        if account.boarding_confirmed > 0 && account.boarding_confirmed <= fee {
            return Err(RemoteError::rejected(format!(
                "boarding amount {} does not cover the settlement fee {}",
                account.boarding_confirmed, fee
            )));
        }

        let boarded = account.boarding_confirmed.saturating_sub(fee);
        account.settled += boarded + account.preconfirmed;
        account.boarding_confirmed = 0;
        account.preconfirmed = 0;

        let owner = self.owner.clone();
        Ok(CommitmentId(state.next_id("commitment", &owner)))
    }

    async fn send_bitcoin(&self, destination: &str, amount: u64) -> RemoteResult<Option<String>> {
        self.gate(FaultPoint::Send).await?;
        if destination.trim().is_empty() {
            return Err(RemoteError::rejected("missing destination"));
        }
        if amount == 0 {
            return Err(RemoteError::rejected("amount must be positive"));
        }

        let mut state = self.lock();
        let account = state.account(&self.owner)?;
        let spendable = account.settled + account.preconfirmed;
        if amount > spendable {
            return Err(RemoteError::InsufficientFunds {
                message: format!(
                    "insufficient funds: {} sats requested, {} sats spendable",
                    amount, spendable
                ),
            });
        }

        let from_preconfirmed = amount.min(account.preconfirmed);
        account.preconfirmed -= from_preconfirmed;
        account.settled -= amount - from_preconfirmed;

        let recipient = state.by_address.get(destination).cloned();
        match recipient {
            Some(recipient) => {
                state
                    .account(&recipient)?
                    .pending
                    .push(Deposit::Offchain { amount });
                let owner = self.owner.clone();
                Ok(Some(state.next_id("ark-tx", &owner)))
            }
            // Collaborative exit: txid known only once the next round lands
            None => Ok(None),
        }
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let mut state = self.lock();
            state.open_sessions = state.open_sessions.saturating_sub(1);
        }
    }
}
