//! # Utility Functions
//!
//! Display helpers shared by the CLI.

/// Address formatting utilities
pub mod address {
    use crate::config::display::{ADDRESS_DISPLAY_PREFIX, ADDRESS_DISPLAY_SUFFIX};

    /// Format an address for display with ellipsis in the middle
    ///
    /// # Returns
    /// Formatted address string like "tark1qxyz...ke3fsabc"
    pub fn format_short(address: &str) -> String {
        format_with_length(address, ADDRESS_DISPLAY_PREFIX, ADDRESS_DISPLAY_SUFFIX)
    }

    /// Format an address with custom prefix and suffix lengths
    pub fn format_with_length(address: &str, prefix_len: usize, suffix_len: usize) -> String {
        if !address.is_ascii() || address.len() <= prefix_len + suffix_len + 3 {
            address.to_string()
        } else {
            format!(
                "{}...{}",
                &address[..prefix_len],
                &address[address.len() - suffix_len..]
            )
        }
    }

    /// Offchain Ark addresses use a `tark`/`ark` human-readable part
    pub fn is_offchain_address(address: &str) -> bool {
        address.starts_with("tark1") || address.starts_with("ark1")
    }
}

/// Transaction ID formatting utilities
pub mod txid {
    use crate::config::display::{TXID_DISPLAY_PREFIX, TXID_DISPLAY_SUFFIX};

    /// Format a transaction ID for display
    pub fn format_short(txid: &str) -> String {
        if !txid.is_ascii() || txid.len() <= TXID_DISPLAY_PREFIX + TXID_DISPLAY_SUFFIX + 3 {
            txid.to_string()
        } else {
            format!(
                "{}...{}",
                &txid[..TXID_DISPLAY_PREFIX],
                &txid[txid.len() - TXID_DISPLAY_SUFFIX..]
            )
        }
    }
}

/// Amount formatting utilities
pub mod amount {
    /// Convert satoshis to BTC with 8 decimal places
    pub fn sats_to_btc(sats: u64) -> f64 {
        sats as f64 / 100_000_000.0
    }

    /// Format amount with thousands separators, e.g. "50,000 sats"
    pub fn format_sats(sats: u64) -> String {
        let digits = sats.to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(c);
        }
        format!("{} sats", grouped)
    }

    /// Format amount with both sats and BTC
    pub fn format_dual(sats: u64) -> String {
        format!("{} ({:.8} BTC)", format_sats(sats), sats_to_btc(sats))
    }
}

/// Time utilities
pub mod time {
    use chrono::{DateTime, Utc};

    /// Format unix seconds for display; zero means never
    pub fn format_unix(seconds: i64) -> String {
        if seconds == 0 {
            return "never".to_string();
        }
        match DateTime::<Utc>::from_timestamp(seconds, 0) {
            Some(datetime) => datetime.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            None => format!("invalid timestamp {}", seconds),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_formatting() {
        let addr = "tark1qpt0jv7ghd3l8f2lxsm5yzmcxuxgqlq5kd0wu7tmhkcvnwsy9c0lzq8u7vqm";
        let formatted = address::format_short(addr);
        assert!(formatted.contains("..."));
        assert!(formatted.starts_with("tark1qpt0j"));
        assert_eq!(formatted.len(), 10 + 3 + 8);
        assert_eq!(address::format_short("tark1short"), "tark1short");
    }

    #[test]
    fn test_offchain_address_detection() {
        assert!(address::is_offchain_address("tark1qpt0jv7ghd3l8f2l"));
        assert!(!address::is_offchain_address("tb1p9calmmwcsv8r6fgnxl6wtmhajrpgnvafjdl6wmtmxpyk63s5fj4slke3fs"));
    }

    #[test]
    fn test_txid_formatting() {
        let txid = "1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef";
        let formatted = txid::format_short(txid);
        assert!(formatted.contains("..."));
        assert_eq!(formatted.len(), 8 + 3 + 8);
    }

    #[test]
    fn test_amount_formatting() {
        assert_eq!(amount::format_sats(0), "0 sats");
        assert_eq!(amount::format_sats(999), "999 sats");
        assert_eq!(amount::format_sats(50_000), "50,000 sats");
        assert_eq!(amount::format_sats(100_000_000), "100,000,000 sats");
        assert_eq!(amount::format_dual(50_000), "50,000 sats (0.00050000 BTC)");
    }

    #[test]
    fn test_time_formatting() {
        assert_eq!(time::format_unix(0), "never");
        assert_eq!(time::format_unix(1_700_000_000), "2023-11-14 22:13:20 UTC");
    }
}
