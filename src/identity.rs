//! # Identity Store
//!
//! Generates and parses the wallet secret. The secret is a 256-bit secp256k1
//! scalar drawn from the operating system CSPRNG and carried around as
//! lowercase hex. Everything downstream treats it as opaque; only the x-only
//! public key and a short fingerprint are ever logged.

use crate::error::{WalletError, WalletResult};
use bitcoin::secp256k1::{Keypair, Secp256k1, SecretKey as Secp256k1SecretKey, XOnlyPublicKey};
use rand::{rngs::OsRng, TryRngCore};
use sha2::{Digest, Sha256};
use std::fmt;

/// Secret length in bytes
pub const SECRET_KEY_LEN: usize = 32;

/// Draws are rejected when they fall outside the curve order; the odds of
/// needing a second draw are about 2^-128.
const MAX_GENERATION_ATTEMPTS: usize = 8;

/// Wallet secret key, hex encoded.
///
/// `Debug` is redacted. Use [`SecretKey::expose_hex`] when the raw value is
/// genuinely needed (persisting, or an explicit reveal request).
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey {
    hex: String,
}

impl SecretKey {
    /// Generate a fresh secret from the OS random source
    pub fn generate() -> WalletResult<Self> {
        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let mut bytes = [0u8; SECRET_KEY_LEN];
            OsRng
                .try_fill_bytes(&mut bytes)
                .map_err(|e| WalletError::identity(format!("random source failed: {}", e)))?;

            if Secp256k1SecretKey::from_slice(&bytes).is_ok() {
                return Ok(Self {
                    hex: hex::encode(bytes),
                });
            }
        }

        Err(WalletError::identity(
            "random source repeatedly produced invalid keys",
        ))
    }

    /// Parse and validate a hex-encoded secret
    pub fn from_hex(input: &str) -> WalletResult<Self> {
        let trimmed = input.trim();
        let bytes = hex::decode(trimmed)
            .map_err(|e| WalletError::identity(format!("secret key is not valid hex: {}", e)))?;

        if bytes.len() != SECRET_KEY_LEN {
            return Err(WalletError::identity(format!(
                "secret key must be {} bytes, got {}",
                SECRET_KEY_LEN,
                bytes.len()
            )));
        }

        Secp256k1SecretKey::from_slice(&bytes)
            .map_err(|e| WalletError::identity(format!("secret key out of range: {}", e)))?;

        Ok(Self {
            hex: trimmed.to_ascii_lowercase(),
        })
    }

    /// Raw hex of the secret
    pub fn expose_hex(&self) -> &str {
        &self.hex
    }

    /// Derive the public identity for this secret
    pub fn public_identity(&self) -> WalletResult<PublicIdentity> {
        let bytes = hex::decode(&self.hex)
            .map_err(|e| WalletError::identity(format!("corrupted secret key: {}", e)))?;
        let secret = Secp256k1SecretKey::from_slice(&bytes)
            .map_err(|e| WalletError::identity(format!("corrupted secret key: {}", e)))?;

        let secp = Secp256k1::new();
        let keypair = Keypair::from_secret_key(&secp, &secret);
        let (x_only, _parity) = keypair.x_only_public_key();

        Ok(PublicIdentity { x_only })
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Public side of a wallet identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicIdentity {
    x_only: XOnlyPublicKey,
}

impl PublicIdentity {
    pub fn x_only_key(&self) -> XOnlyPublicKey {
        self.x_only
    }

    /// X-only public key, hex encoded (32 bytes)
    pub fn x_only_hex(&self) -> String {
        hex::encode(self.x_only.serialize())
    }

    /// Short SHA-256 fingerprint for log lines
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.x_only.serialize());
        hex::encode(&digest[..4])
    }
}

impl fmt::Display for PublicIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.x_only_hex())
    }
}
