//! Gulden wallet key custody
//!
//! This crate implements hierarchical deterministic seeds and accounts,
//! legacy random-key accounts, and passphrase-based encryption of all
//! private key material under a single wallet master key.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod account;
pub mod config;
pub mod crypter;
pub mod error;
pub mod hd_account;
pub mod hd_seed;
pub mod keys;
pub mod keystore;
pub mod master_key;
pub mod persistence;
pub mod session;
pub mod wallet;

pub use account::{Account, AccountSubType, AccountType, KeyChain};
pub use config::WalletConfig;
pub use error::{Error, ErrorCategory, Result};
pub use hd_account::{HdAccount, DEFAULT_KEY_COLLISION_RETRY_LIMIT};
pub use hd_seed::HdSeed;
pub use keys::{ExtendedPrivKey, ExtendedPubKey, KeyId};
pub use keystore::{BasicKeyStore, HdIndexedKeyStore, KeyStore};
pub use master_key::{MasterKey, MasterKeyRecord};
pub use persistence::{KeyIndex, KeyMetadata, MemoryDatabase, WalletDatabase};
pub use session::WalletSession;
pub use wallet::{Wallet, WalletAccount};

pub use gulden_params::{Network, NetworkType, SeedType};
