//! Persistence boundary
//!
//! The core never owns durable storage. It hands already-encoded or
//! encrypted records to a [`WalletDatabase`] and treats any write failure as
//! fatal to the operation that triggered it. [`MemoryDatabase`] is an
//! in-memory implementation with write-failure injection.

use crate::account::{AccountSubType, AccountType, KeyChain};
use crate::keys::KeyId;
use crate::master_key::MasterKeyRecord;
use crate::{Error, Result};
use parking_lot::Mutex;
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

/// Metadata persisted next to every key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMetadata {
    /// Unix timestamp of key creation
    pub create_time: i64,
    /// Derivation path for HD keys (`m/44'/87'/0'/0/5`)
    pub hd_key_path: Option<String>,
    /// Owning HD account
    pub hd_account_id: Option<Uuid>,
}

impl KeyMetadata {
    /// Metadata for a random (non-HD) key
    pub fn new(create_time: i64) -> Self {
        Self {
            create_time,
            hd_key_path: None,
            hd_account_id: None,
        }
    }

    /// Metadata for an HD-derived key
    pub fn hd(create_time: i64, path: String, account_id: Uuid) -> Self {
        Self {
            create_time,
            hd_key_path: Some(path),
            hd_account_id: Some(account_id),
        }
    }
}

/// Secret material of a seed as persisted
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeedSecretsRecord {
    /// Read-only seed
    None,
    /// Unencrypted wallet: the mnemonic regenerates every key
    Plain {
        /// Mnemonic phrase
        mnemonic: String,
    },
    /// Ciphertexts under the wallet master key
    Encrypted {
        /// Mnemonic, IV = seed id
        mnemonic: Vec<u8>,
        /// Master extended key, IV = its public key hash
        master: Vec<u8>,
        /// Purpose extended key
        purpose: Vec<u8>,
        /// Cointype extended key
        cointype: Vec<u8>,
    },
}

impl fmt::Debug for SeedSecretsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeedSecretsRecord::None => f.write_str("None"),
            SeedSecretsRecord::Plain { .. } => f.write_str("Plain(<redacted>)"),
            SeedSecretsRecord::Encrypted { .. } => f.write_str("Encrypted"),
        }
    }
}

/// Persisted form of an HD seed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedRecord {
    /// Seed identifier
    pub id: Uuid,
    /// Derivation variant tag, see [`gulden_params::SeedType::to_u8`]
    pub seed_type: u8,
    /// Public-only import
    pub read_only: bool,
    /// Master public key (74-byte encoding)
    pub master_public: Vec<u8>,
    /// Purpose public key (74-byte encoding)
    pub purpose_public: Vec<u8>,
    /// Cointype public key (74-byte encoding)
    pub cointype_public: Vec<u8>,
    /// Next desktop account index
    pub desktop_account_counter: u32,
    /// Next mobile account index
    pub mobile_account_counter: u32,
    /// Secret material
    pub secrets: SeedSecretsRecord,
}

/// Secret material of an HD account as persisted
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HdAccountSecretsRecord {
    /// Watch-only account
    None,
    /// Unencrypted account key (74-byte encoding); chain keys are re-derived
    Plain {
        /// Account extended private key
        account: Vec<u8>,
    },
    /// Ciphertexts under the wallet master key
    Encrypted {
        /// Account key, IV = account id
        account: Vec<u8>,
        /// External chain key, IV = its public key hash
        external: Vec<u8>,
        /// Internal chain key, IV = its public key hash
        internal: Vec<u8>,
    },
}

impl fmt::Debug for HdAccountSecretsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HdAccountSecretsRecord::None => f.write_str("None"),
            HdAccountSecretsRecord::Plain { .. } => f.write_str("Plain(<redacted>)"),
            HdAccountSecretsRecord::Encrypted { .. } => f.write_str("Encrypted"),
        }
    }
}

/// HD-specific part of an account record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HdAccountRecord {
    /// Owning seed
    pub seed_id: Uuid,
    /// Derivation path of the account key
    pub account_path: Vec<u32>,
    /// Next external chain index
    pub next_external_index: u32,
    /// Next change chain index
    pub next_change_index: u32,
    /// Account public key (74-byte encoding)
    pub account_public: Vec<u8>,
    /// Secret material
    pub secrets: HdAccountSecretsRecord,
}

/// Persisted form of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    /// Account identifier
    pub id: Uuid,
    /// Parent account, if any
    pub parent_id: Option<Uuid>,
    /// User label
    pub label: String,
    /// Account type
    pub account_type: AccountType,
    /// Account subtype
    pub subtype: AccountSubType,
    /// Earliest possible creation time (unix seconds)
    pub earliest_possible_creation_time: i64,
    /// Watch-only account
    pub read_only: bool,
    /// Present for HD accounts
    pub hd: Option<HdAccountRecord>,
}

/// Persistence collaborator
pub trait WalletDatabase: Send + Sync {
    /// Store a seed
    fn write_seed(&self, record: &SeedRecord) -> Result<()>;

    /// Store an account
    fn write_account(&self, id: &Uuid, record: &AccountRecord) -> Result<()>;

    /// Store an account label
    fn write_label(&self, id: &Uuid, label: &str) -> Result<()>;

    /// Remove an account label
    fn erase_label(&self, id: &Uuid) -> Result<()>;

    /// Store a key sealed under the master key
    fn write_encrypted_key(
        &self,
        public_key: &PublicKey,
        ciphertext: &[u8],
        metadata: &KeyMetadata,
        owner: &Uuid,
        chain: KeyChain,
    ) -> Result<()>;

    /// Remove the unencrypted record of a key.
    ///
    /// An encrypted record written by [`WalletDatabase::write_encrypted_key`]
    /// is a separate record and survives.
    fn erase_key(&self, public_key: &PublicKey) -> Result<()>;

    /// Store a watch-only public key
    fn write_watch_only(&self, public_key: &PublicKey, owner: &Uuid, chain: KeyChain) -> Result<()>;

    /// Remove a watch-only public key
    fn erase_watch_only(&self, public_key: &PublicKey) -> Result<()>;

    /// Store an unencrypted key
    fn write_key(
        &self,
        public_key: &PublicKey,
        secret: &[u8],
        metadata: &KeyMetadata,
        owner: &Uuid,
        chain: KeyChain,
    ) -> Result<()>;

    /// Store the derivation index of an HD key
    fn write_hd_key(
        &self,
        public_key: &PublicKey,
        index: u32,
        metadata: &KeyMetadata,
        owner: &Uuid,
        chain: KeyChain,
    ) -> Result<()>;

    /// Store a master key record
    fn write_master_key(&self, id: u32, record: &MasterKeyRecord) -> Result<()>;
}

/// Wallet-wide key lookup used to skip colliding child keys
pub trait KeyIndex {
    /// Whether any account in the wallet already owns `id`
    fn has_public_key(&self, id: &KeyId) -> bool;
}

/// Key index of an empty wallet
#[derive(Debug, Clone, Copy, Default)]
pub struct NoKeyIndex;

impl KeyIndex for NoKeyIndex {
    fn has_public_key(&self, _id: &KeyId) -> bool {
        false
    }
}

impl KeyIndex for BTreeSet<KeyId> {
    fn has_public_key(&self, id: &KeyId) -> bool {
        self.contains(id)
    }
}

/// A key as stored by [`MemoryDatabase`]
#[derive(Clone, PartialEq, Eq)]
pub enum StoredKey {
    /// Unencrypted secret
    Plain {
        /// Secret bytes
        secret: Vec<u8>,
        /// Metadata
        metadata: KeyMetadata,
        /// Owning account
        owner: Uuid,
        /// Chain
        chain: KeyChain,
    },
    /// Sealed secret
    Encrypted {
        /// Ciphertext
        ciphertext: Vec<u8>,
        /// Metadata
        metadata: KeyMetadata,
        /// Owning account
        owner: Uuid,
        /// Chain
        chain: KeyChain,
    },
    /// HD derivation index
    Hd {
        /// Child index
        index: u32,
        /// Metadata
        metadata: KeyMetadata,
        /// Owning account
        owner: Uuid,
        /// Chain
        chain: KeyChain,
    },
}

impl StoredKey {
    /// Owning account
    pub fn owner(&self) -> &Uuid {
        match self {
            StoredKey::Plain { owner, .. }
            | StoredKey::Encrypted { owner, .. }
            | StoredKey::Hd { owner, .. } => owner,
        }
    }

    /// Whether the secret is sealed
    pub fn is_encrypted(&self) -> bool {
        matches!(self, StoredKey::Encrypted { .. })
    }
}

impl fmt::Debug for StoredKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoredKey::Plain { owner, chain, .. } => {
                write!(f, "Plain {{ owner: {owner}, chain: {chain:?} }}")
            }
            StoredKey::Encrypted { owner, chain, .. } => {
                write!(f, "Encrypted {{ owner: {owner}, chain: {chain:?} }}")
            }
            StoredKey::Hd { index, owner, chain, .. } => {
                write!(f, "Hd {{ index: {index}, owner: {owner}, chain: {chain:?} }}")
            }
        }
    }
}

#[derive(Default)]
struct MemoryState {
    seeds: BTreeMap<Uuid, SeedRecord>,
    accounts: BTreeMap<Uuid, AccountRecord>,
    labels: BTreeMap<Uuid, String>,
    keys: BTreeMap<KeyId, StoredKey>,
    watch_only: BTreeMap<KeyId, (Uuid, KeyChain)>,
    master_keys: BTreeMap<u32, MasterKeyRecord>,
    writes: usize,
    fail_writes: bool,
    fail_after: Option<usize>,
    fail_kind: Option<&'static str>,
}

impl MemoryState {
    fn begin_write(&mut self, what: &str) -> Result<()> {
        let fail = self.fail_writes
            || self.fail_kind == Some(what)
            || self.fail_after.is_some_and(|n| self.writes >= n);
        if fail {
            tracing::warn!("Injected write failure: {}", what);
            return Err(Error::Persistence(format!("Write rejected: {what}")));
        }
        self.writes += 1;
        Ok(())
    }
}

/// In-memory [`WalletDatabase`]
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<MemoryState>,
}

impl MemoryDatabase {
    /// Create an empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every write while `fail` is set
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Accept `count` more writes, then reject until reset with `None`
    pub fn fail_after(&self, count: Option<usize>) {
        let mut state = self.state.lock();
        state.fail_after = count.map(|n| state.writes + n);
    }

    /// Reject writes of one record kind (`"seed"`, `"account"`, `"key"`, ...)
    pub fn fail_writes_of(&self, kind: Option<&'static str>) {
        self.state.lock().fail_kind = kind;
    }

    /// Number of accepted writes
    pub fn write_count(&self) -> usize {
        self.state.lock().writes
    }

    /// Stored seed
    pub fn seed(&self, id: &Uuid) -> Option<SeedRecord> {
        self.state.lock().seeds.get(id).cloned()
    }

    /// Stored account
    pub fn account(&self, id: &Uuid) -> Option<AccountRecord> {
        self.state.lock().accounts.get(id).cloned()
    }

    /// Stored label
    pub fn label(&self, id: &Uuid) -> Option<String> {
        self.state.lock().labels.get(id).cloned()
    }

    /// Stored key
    pub fn key(&self, id: &KeyId) -> Option<StoredKey> {
        self.state.lock().keys.get(id).cloned()
    }

    /// Stored keys owned by `owner`
    pub fn keys_for(&self, owner: &Uuid) -> Vec<(KeyId, StoredKey)> {
        self.state
            .lock()
            .keys
            .iter()
            .filter(|(_, key)| key.owner() == owner)
            .map(|(id, key)| (*id, key.clone()))
            .collect()
    }

    /// Owner and chain of a stored watch-only key
    pub fn watch_only(&self, id: &KeyId) -> Option<(Uuid, KeyChain)> {
        self.state.lock().watch_only.get(id).copied()
    }

    /// Number of stored keys
    pub fn key_count(&self) -> usize {
        self.state.lock().keys.len()
    }

    /// Stored master key record
    pub fn master_key(&self, id: u32) -> Option<MasterKeyRecord> {
        self.state.lock().master_keys.get(&id).cloned()
    }
}

impl WalletDatabase for MemoryDatabase {
    fn write_seed(&self, record: &SeedRecord) -> Result<()> {
        let mut state = self.state.lock();
        state.begin_write("seed")?;
        state.seeds.insert(record.id, record.clone());
        Ok(())
    }

    fn write_account(&self, id: &Uuid, record: &AccountRecord) -> Result<()> {
        let mut state = self.state.lock();
        state.begin_write("account")?;
        state.accounts.insert(*id, record.clone());
        Ok(())
    }

    fn write_label(&self, id: &Uuid, label: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.begin_write("label")?;
        state.labels.insert(*id, label.to_string());
        Ok(())
    }

    fn erase_label(&self, id: &Uuid) -> Result<()> {
        let mut state = self.state.lock();
        state.begin_write("erase label")?;
        state.labels.remove(id);
        Ok(())
    }

    fn write_encrypted_key(
        &self,
        public_key: &PublicKey,
        ciphertext: &[u8],
        metadata: &KeyMetadata,
        owner: &Uuid,
        chain: KeyChain,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.begin_write("encrypted key")?;
        state.keys.insert(
            KeyId::from_public_key(public_key),
            StoredKey::Encrypted {
                ciphertext: ciphertext.to_vec(),
                metadata: metadata.clone(),
                owner: *owner,
                chain,
            },
        );
        Ok(())
    }

    fn erase_key(&self, public_key: &PublicKey) -> Result<()> {
        let mut state = self.state.lock();
        state.begin_write("erase key")?;
        let id = KeyId::from_public_key(public_key);
        if !state.keys.get(&id).is_some_and(StoredKey::is_encrypted) {
            state.keys.remove(&id);
        }
        Ok(())
    }

    fn write_watch_only(&self, public_key: &PublicKey, owner: &Uuid, chain: KeyChain) -> Result<()> {
        let mut state = self.state.lock();
        state.begin_write("watch-only key")?;
        state
            .watch_only
            .insert(KeyId::from_public_key(public_key), (*owner, chain));
        Ok(())
    }

    fn erase_watch_only(&self, public_key: &PublicKey) -> Result<()> {
        let mut state = self.state.lock();
        state.begin_write("erase watch-only key")?;
        state.watch_only.remove(&KeyId::from_public_key(public_key));
        Ok(())
    }

    fn write_key(
        &self,
        public_key: &PublicKey,
        secret: &[u8],
        metadata: &KeyMetadata,
        owner: &Uuid,
        chain: KeyChain,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.begin_write("key")?;
        state.keys.insert(
            KeyId::from_public_key(public_key),
            StoredKey::Plain {
                secret: secret.to_vec(),
                metadata: metadata.clone(),
                owner: *owner,
                chain,
            },
        );
        Ok(())
    }

    fn write_hd_key(
        &self,
        public_key: &PublicKey,
        index: u32,
        metadata: &KeyMetadata,
        owner: &Uuid,
        chain: KeyChain,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.begin_write("hd key")?;
        state.keys.insert(
            KeyId::from_public_key(public_key),
            StoredKey::Hd {
                index,
                metadata: metadata.clone(),
                owner: *owner,
                chain,
            },
        );
        Ok(())
    }

    fn write_master_key(&self, id: u32, record: &MasterKeyRecord) -> Result<()> {
        let mut state = self.state.lock();
        state.begin_write("master key")?;
        state.master_keys.insert(id, record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_secret_key;

    fn public_key() -> PublicKey {
        PublicKey::from_secret_key(crate::keys::secp(), &generate_secret_key())
    }

    #[test]
    fn test_memory_database_writes() {
        let db = MemoryDatabase::new();
        let owner = Uuid::new_v4();
        let pk = public_key();

        db.write_label(&owner, "savings").unwrap();
        assert_eq!(db.label(&owner).as_deref(), Some("savings"));
        db.erase_label(&owner).unwrap();
        assert!(db.label(&owner).is_none());

        db.write_hd_key(&pk, 3, &KeyMetadata::new(0), &owner, KeyChain::External)
            .unwrap();
        assert!(matches!(
            db.key(&KeyId::from_public_key(&pk)),
            Some(StoredKey::Hd { index: 3, .. })
        ));
        assert_eq!(db.keys_for(&owner).len(), 1);

        db.erase_key(&pk).unwrap();
        assert_eq!(db.key_count(), 0);
        assert_eq!(db.write_count(), 4);
    }

    #[test]
    fn test_watch_only_records() {
        let db = MemoryDatabase::new();
        let owner = Uuid::new_v4();
        let pk = public_key();
        let id = KeyId::from_public_key(&pk);

        db.write_watch_only(&pk, &owner, KeyChain::Internal).unwrap();
        assert_eq!(db.watch_only(&id), Some((owner, KeyChain::Internal)));
        assert_eq!(db.key_count(), 0);
        db.erase_watch_only(&pk).unwrap();
        assert_eq!(db.watch_only(&id), None);
    }

    #[test]
    fn test_erase_key_keeps_encrypted_record() {
        let db = MemoryDatabase::new();
        let owner = Uuid::new_v4();
        let pk = PublicKey::from_secret_key(crate::keys::secp(), &crate::keys::generate_secret_key());
        let id = KeyId::from_public_key(&pk);

        db.write_key(&pk, &[1u8; 32], &KeyMetadata::new(0), &owner, KeyChain::External)
            .unwrap();
        db.write_encrypted_key(&pk, &[2u8; 48], &KeyMetadata::new(0), &owner, KeyChain::External)
            .unwrap();
        db.erase_key(&pk).unwrap();
        assert!(db.key(&id).map(|k| k.is_encrypted()).unwrap_or(false));
    }

    #[test]
    fn test_fail_writes() {
        let db = MemoryDatabase::new();
        db.set_fail_writes(true);
        assert!(matches!(
            db.write_label(&Uuid::new_v4(), "x"),
            Err(Error::Persistence(_))
        ));
        db.set_fail_writes(false);
        assert!(db.write_label(&Uuid::new_v4(), "x").is_ok());
    }

    #[test]
    fn test_fail_after() {
        let db = MemoryDatabase::new();
        db.write_label(&Uuid::new_v4(), "a").unwrap();
        db.fail_after(Some(1));
        assert!(db.write_label(&Uuid::new_v4(), "b").is_ok());
        assert!(db.write_label(&Uuid::new_v4(), "c").is_err());
        db.fail_after(None);
        assert!(db.write_label(&Uuid::new_v4(), "d").is_ok());
    }

    #[test]
    fn test_fail_writes_of_one_kind() {
        let db = MemoryDatabase::new();
        let owner = Uuid::new_v4();
        db.fail_writes_of(Some("label"));
        assert!(matches!(db.write_label(&owner, "x"), Err(Error::Persistence(_))));
        assert!(db.erase_label(&owner).is_ok());
        db.fail_writes_of(None);
        assert!(db.write_label(&owner, "x").is_ok());
    }

    #[test]
    fn test_key_index_impls() {
        let id = KeyId::from_public_key(&public_key());
        assert!(!NoKeyIndex.has_public_key(&id));
        let set: BTreeSet<KeyId> = [id].into_iter().collect();
        assert!(set.has_public_key(&id));
    }

    #[test]
    fn test_secret_records_are_redacted() {
        let record = SeedSecretsRecord::Plain {
            mnemonic: "abandon ability".to_string(),
        };
        assert!(!format!("{record:?}").contains("abandon"));
    }
}
