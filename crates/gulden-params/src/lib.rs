//! Gulden network parameters and derivation constants
//!
//! This crate provides network-specific constants (coin type, extended key
//! version bytes) and the fixed HD derivation layout for every supported
//! seed variant.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod derivation;
pub mod network;

pub use derivation::{
    SeedType, BIP32_HARDENED_KEY_LIMIT, BIP32_PLACEHOLDER_LEVEL, BIP44_COIN_TYPE, BIP44_PURPOSE,
    HD_DESKTOP_MAX_INDEX, HD_DESKTOP_START_INDEX, HD_MOBILE_START_INDEX, KEYCHAIN_CHANGE,
    KEYCHAIN_EXTERNAL,
};
pub use network::{Network, NetworkType};

/// Error types for parameter operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid network specified
    #[error("Invalid network: {0}")]
    InvalidNetwork(String),

    /// Seed type value outside the known set
    #[error("Unknown seed type: {0}")]
    UnknownSeedType(u8),
}

/// Result type for parameter operations
pub type Result<T> = std::result::Result<T, Error>;
