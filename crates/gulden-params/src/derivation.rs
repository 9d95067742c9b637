//! HD derivation layout
//!
//! Every seed variant fixes three things: the HMAC key used to turn the
//! BIP-39 seed into a master key, the purpose/cointype levels below the
//! master, and whether those levels (and the account level) are hardened.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Child indices at or above this value are hardened
pub const BIP32_HARDENED_KEY_LIMIT: u32 = 0x8000_0000;

/// BIP-44 purpose level
pub const BIP44_PURPOSE: u32 = 44;

/// BIP-44 coin type
pub const BIP44_COIN_TYPE: u32 = 87;

/// Purpose/cointype level used by the BIP-32 variants.
///
/// Those variants derive accounts straight from the master key; the two
/// levels are still generated so the stored encrypted blocks are never blank.
pub const BIP32_PLACEHOLDER_LEVEL: u32 = 100;

/// First account index handed out for desktop accounts
pub const HD_DESKTOP_START_INDEX: u32 = 0;

/// Highest account index a desktop account may use
pub const HD_DESKTOP_MAX_INDEX: u32 = 99_999;

/// First account index handed out for mobile accounts
pub const HD_MOBILE_START_INDEX: u32 = 100_000;

/// Receive chain index below an account key
pub const KEYCHAIN_EXTERNAL: u32 = 0;

/// Change chain index below an account key
pub const KEYCHAIN_CHANGE: u32 = 1;

const HASHKEY_GULDEN: &[u8] = b"Gulden bip32";
const HASHKEY_LEGACY: &[u8] = b"Bitcoin seed";

/// Seed derivation variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeedType {
    /// m/n' with the Gulden master key domain
    BIP32,
    /// m/n' with the Bitcoin master key domain
    BIP32Legacy,
    /// m/44'/87'/n'
    BIP44,
    /// m/44/87/n, derivable from public keys alone
    BIP44NoHardening,
    /// m/44'/87'/n' with the Bitcoin master key domain, for external wallets
    BIP44External,
}

impl SeedType {
    /// Stable numeric tag used in persisted records
    pub const fn to_u8(self) -> u8 {
        match self {
            SeedType::BIP32 => 0,
            SeedType::BIP32Legacy => 1,
            SeedType::BIP44 => 2,
            SeedType::BIP44NoHardening => 3,
            SeedType::BIP44External => 4,
        }
    }

    /// HMAC-SHA512 key for master key generation
    pub const fn master_hmac_key(self) -> &'static [u8] {
        match self {
            SeedType::BIP32Legacy | SeedType::BIP44External => HASHKEY_LEGACY,
            SeedType::BIP32 | SeedType::BIP44 | SeedType::BIP44NoHardening => HASHKEY_GULDEN,
        }
    }

    /// Whether purpose, cointype and account levels are hardened
    pub const fn is_hardened(self) -> bool {
        !matches!(self, SeedType::BIP44NoHardening)
    }

    /// Whether accounts hang below the cointype key (BIP-44) or the master key (BIP-32)
    pub const fn accounts_below_cointype(self) -> bool {
        !matches!(self, SeedType::BIP32 | SeedType::BIP32Legacy)
    }

    /// Whether a seed of this type can be imported from a public key
    pub const fn supports_read_only(self) -> bool {
        matches!(self, SeedType::BIP44NoHardening)
    }

    /// Child number of the purpose level
    pub const fn purpose_child(self) -> u32 {
        let index = if self.accounts_below_cointype() {
            BIP44_PURPOSE
        } else {
            BIP32_PLACEHOLDER_LEVEL
        };
        self.apply_hardening(index)
    }

    /// Child number of the cointype level
    pub const fn cointype_child(self) -> u32 {
        let index = if self.accounts_below_cointype() {
            BIP44_COIN_TYPE
        } else {
            BIP32_PLACEHOLDER_LEVEL
        };
        self.apply_hardening(index)
    }

    /// Child number of account `index`
    pub const fn account_child(self, index: u32) -> u32 {
        self.apply_hardening(index)
    }

    const fn apply_hardening(self, index: u32) -> u32 {
        if self.is_hardened() {
            index | BIP32_HARDENED_KEY_LIMIT
        } else {
            index
        }
    }
}

impl TryFrom<u8> for SeedType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(SeedType::BIP32),
            1 => Ok(SeedType::BIP32Legacy),
            2 => Ok(SeedType::BIP44),
            3 => Ok(SeedType::BIP44NoHardening),
            4 => Ok(SeedType::BIP44External),
            other => Err(Error::UnknownSeedType(other)),
        }
    }
}

impl fmt::Display for SeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeedType::BIP32 => write!(f, "BIP32"),
            SeedType::BIP32Legacy => write!(f, "BIP32Legacy"),
            SeedType::BIP44 => write!(f, "BIP44"),
            SeedType::BIP44NoHardening => write!(f, "BIP44NoHardening"),
            SeedType::BIP44External => write!(f, "BIP44External"),
        }
    }
}
