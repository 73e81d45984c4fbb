//! # Wallet Record
//!
//! The single persisted entity. Field names serialize in camelCase so that
//! records written by earlier browser builds (`privateKey`, `address`,
//! `balance.total`, `balance.available`) keep loading; anything those builds
//! did not write defaults to zero / absent.

use crate::error::{WalletError, WalletResult};
use serde::{Deserialize, Serialize};

/// On-chain funds awaiting settlement into the offchain pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardingBalance {
    pub confirmed: u64,
    pub unconfirmed: u64,
    pub total: u64,
}

impl BoardingBalance {
    /// Build a boarding balance with a consistent total
    pub fn new(confirmed: u64, unconfirmed: u64) -> Self {
        Self {
            confirmed,
            unconfirmed,
            total: confirmed.saturating_add(unconfirmed),
        }
    }
}

/// Balance figures in sats, as last reported by the coordination server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceSnapshot {
    pub boarding: BoardingBalance,
    /// Offchain funds covered by a settlement commitment
    pub settled: u64,
    /// Offchain funds received but not yet covered by a commitment
    pub preconfirmed: u64,
    /// Spendable right now
    pub available: u64,
    /// Funds that need a recovery action before they can be spent
    pub recoverable: u64,
    pub total: u64,
}

impl BalanceSnapshot {
    /// Snapshot of an empty wallet
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check the snapshot invariants
    ///
    /// `boarding.total = boarding.confirmed + boarding.unconfirmed` and
    /// `available <= total`.
    pub fn validate(&self) -> WalletResult<()> {
        let boarding_sum = self
            .boarding
            .confirmed
            .checked_add(self.boarding.unconfirmed)
            .ok_or_else(|| WalletError::reconciliation("boarding balance overflows"))?;

        if self.boarding.total != boarding_sum {
            return Err(WalletError::reconciliation(format!(
                "boarding total {} does not equal confirmed {} + unconfirmed {}",
                self.boarding.total, self.boarding.confirmed, self.boarding.unconfirmed
            )));
        }

        if self.available > self.total {
            return Err(WalletError::reconciliation(format!(
                "available {} exceeds total {}",
                self.available, self.total
            )));
        }

        Ok(())
    }
}

/// The durable wallet representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRecord {
    /// Hex-encoded secret; see [`crate::identity::SecretKey`]
    pub private_key: String,
    /// Offchain receiving address
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boarding_address: Option<String>,
    #[serde(default)]
    pub balance: BalanceSnapshot,
    /// Coordination server the wallet was created against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    /// Unix seconds
    #[serde(default)]
    pub created_at: i64,
    /// Unix seconds of the last successful balance fetch
    #[serde(default)]
    pub balance_updated_at: i64,
    /// The cached balance is known to predate a state change
    #[serde(default)]
    pub balance_stale: bool,
}

impl WalletRecord {
    /// Copy of this record carrying a new balance snapshot
    pub fn with_balance(&self, balance: BalanceSnapshot, stale: bool) -> Self {
        Self {
            balance,
            balance_updated_at: chrono::Utc::now().timestamp(),
            balance_stale: stale,
            ..self.clone()
        }
    }

    /// Copy of this record flagged stale, balance figures untouched
    pub fn marked_stale(&self) -> Self {
        Self {
            balance_stale: true,
            ..self.clone()
        }
    }

    /// Server to open sessions against, falling back to the configured one
    pub fn server_url_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.server_url.as_deref().unwrap_or(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> WalletRecord {
        WalletRecord {
            private_key: "11".repeat(32),
            address: "tark1qexample".to_string(),
            boarding_address: Some("tb1pexample".to_string()),
            balance: BalanceSnapshot {
                boarding: BoardingBalance::new(50_000, 1_000),
                settled: 20_000,
                preconfirmed: 5_000,
                available: 25_000,
                recoverable: 0,
                total: 76_000,
            },
            server_url: Some("https://mutinynet.arkade.sh".to_string()),
            created_at: 1_700_000_000,
            balance_updated_at: 1_700_000_100,
            balance_stale: false,
        }
    }

    #[test]
    fn test_record_json_round_trip() {
        let record = sample_record();
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"privateKey\""));
        assert!(json.contains("\"boardingAddress\""));
        let parsed: WalletRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_legacy_record_loads() {
        let legacy = r#"{"privateKey":"ab","address":"tark1q","balance":{"total":1200,"available":1000}}"#;
        let record: WalletRecord = serde_json::from_str(legacy).unwrap();
        assert_eq!(record.balance.total, 1_200);
        assert_eq!(record.balance.available, 1_000);
        assert_eq!(record.balance.boarding, BoardingBalance::default());
        assert!(record.boarding_address.is_none());
        assert!(record.server_url.is_none());
        assert!(record.balance.validate().is_ok());
    }

    #[test]
    fn test_snapshot_invariants() {
        assert!(sample_record().balance.validate().is_ok());
        assert!(BalanceSnapshot::empty().validate().is_ok());

        let mut torn_boarding = sample_record().balance;
        torn_boarding.boarding.total = 1;
        assert!(matches!(
            torn_boarding.validate(),
            Err(WalletError::Reconciliation { .. })
        ));

        let mut overspent = sample_record().balance;
        overspent.available = overspent.total + 1;
        assert!(overspent.validate().is_err());
    }

    #[test]
    fn test_with_balance_replaces_snapshot_only() {
        let record = sample_record().marked_stale();
        assert!(record.balance_stale);

        let updated = record.with_balance(BalanceSnapshot::empty(), false);
        assert_eq!(updated.private_key, record.private_key);
        assert_eq!(updated.address, record.address);
        assert_eq!(updated.balance, BalanceSnapshot::empty());
        assert!(!updated.balance_stale);
        assert!(updated.balance_updated_at >= record.balance_updated_at);
    }
}
