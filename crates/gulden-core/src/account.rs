//! Accounts
//!
//! An [`Account`] owns an external (receive) and an internal (change) key
//! store, plus identity, label, creation watermark and parent link. Legacy
//! accounts fill basic stores with random keys; HD accounts wrap an
//! `Account` with HD-indexed stores (see [`crate::hd_account`]).

use crate::keys::{generate_secret_key, KeyId};
use crate::keystore::KeyStore;
use crate::master_key::MasterKey;
use crate::persistence::{AccountRecord, HdAccountRecord, KeyMetadata, WalletDatabase};
use crate::{Error, Result};
use gulden_params::{KEYCHAIN_CHANGE, KEYCHAIN_EXTERNAL};
use parking_lot::RwLock;
use secp256k1::{PublicKey, SecretKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Account type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    /// Regular spending account
    Normal,
    /// Pre-generated account not yet shown to the user
    Shadow,
    /// Imported from a private key
    ImportedPrivate,
    /// Imported from a public key (watch-only)
    ImportedPublic,
}

/// Account subtype; selects the seed counter an HD account is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountSubType {
    /// Desktop account range
    Desktop,
    /// Mobile account range
    Mobile,
}

/// Key chain within an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyChain {
    /// Receive addresses
    External,
    /// Change addresses
    Internal,
}

impl KeyChain {
    /// Child index of the chain key below the account key
    pub const fn child_index(self) -> u32 {
        match self {
            KeyChain::External => KEYCHAIN_EXTERNAL,
            KeyChain::Internal => KEYCHAIN_CHANGE,
        }
    }
}

struct AccountMeta {
    label: String,
    parent_id: Option<Uuid>,
    earliest_possible_creation_time: i64,
}

pub(crate) struct Chains {
    pub(crate) external: KeyStore,
    pub(crate) internal: KeyStore,
    pub(crate) metadata: BTreeMap<KeyId, KeyMetadata>,
}

impl Chains {
    pub(crate) fn get(&self, chain: KeyChain) -> &KeyStore {
        match chain {
            KeyChain::External => &self.external,
            KeyChain::Internal => &self.internal,
        }
    }

    pub(crate) fn get_mut(&mut self, chain: KeyChain) -> &mut KeyStore {
        match chain {
            KeyChain::External => &mut self.external,
            KeyChain::Internal => &mut self.internal,
        }
    }

    pub(crate) fn chain_of(&self, id: &KeyId) -> Option<KeyChain> {
        if self.external.have_key(id) {
            Some(KeyChain::External)
        } else if self.internal.have_key(id) {
            Some(KeyChain::Internal)
        } else {
            None
        }
    }
}

/// Account with two key chains
pub struct Account {
    id: Uuid,
    account_type: AccountType,
    subtype: AccountSubType,
    read_only: bool,
    meta: RwLock<AccountMeta>,
    pub(crate) chains: RwLock<Chains>,
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

impl Account {
    /// Create a legacy (random-key) account with a fresh identifier
    pub fn new(account_type: AccountType, subtype: AccountSubType) -> Self {
        Self::with_stores(Uuid::new_v4(), account_type, subtype, KeyStore::basic(), KeyStore::basic())
    }

    pub(crate) fn new_hd(id: Uuid, account_type: AccountType, subtype: AccountSubType, read_only: bool) -> Self {
        let mut account =
            Self::with_stores(id, account_type, subtype, KeyStore::hd_indexed(), KeyStore::hd_indexed());
        account.read_only = read_only;
        account
    }

    fn with_stores(
        id: Uuid,
        account_type: AccountType,
        subtype: AccountSubType,
        external: KeyStore,
        internal: KeyStore,
    ) -> Self {
        Self {
            id,
            account_type,
            subtype,
            read_only: account_type == AccountType::ImportedPublic,
            meta: RwLock::new(AccountMeta {
                label: String::new(),
                parent_id: None,
                earliest_possible_creation_time: now(),
            }),
            chains: RwLock::new(Chains {
                external,
                internal,
                metadata: BTreeMap::new(),
            }),
        }
    }

    /// Rebuild a legacy account from its record; keys are loaded separately
    pub fn from_record(record: &AccountRecord) -> Self {
        let account = Self::with_stores(
            record.id,
            record.account_type,
            record.subtype,
            KeyStore::basic(),
            KeyStore::basic(),
        );
        account.restore_meta(record);
        account
    }

    pub(crate) fn restore_meta(&self, record: &AccountRecord) {
        let mut meta = self.meta.write();
        meta.label = record.label.clone();
        meta.parent_id = record.parent_id;
        meta.earliest_possible_creation_time = record.earliest_possible_creation_time;
    }

    /// Account identifier
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Account type
    pub fn account_type(&self) -> AccountType {
        self.account_type
    }

    /// Account subtype
    pub fn subtype(&self) -> AccountSubType {
        self.subtype
    }

    /// Watch-only account
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// User label
    pub fn label(&self) -> String {
        self.meta.read().label.clone()
    }

    /// Parent account; `None` for a root-level account
    pub fn parent_id(&self) -> Option<Uuid> {
        self.meta.read().parent_id
    }

    /// Earliest time any key of this account can have been created
    pub fn earliest_possible_creation_time(&self) -> i64 {
        self.meta.read().earliest_possible_creation_time
    }

    /// Replace the label: the old one is erased before the new one is written
    pub fn set_label(&self, label: &str, db: &dyn WalletDatabase) -> Result<()> {
        db.erase_label(&self.id)?;
        db.write_label(&self.id, label)?;
        self.meta.write().label = label.to_string();
        Ok(())
    }

    /// Lower the creation watermark to `time` and persist the account
    pub fn possibly_update_earliest_time(&self, time: i64, db: &dyn WalletDatabase) -> Result<()> {
        self.update_earliest_time_with(time, db, None)
    }

    pub(crate) fn update_earliest_time_with(
        &self,
        time: i64,
        db: &dyn WalletDatabase,
        hd: Option<HdAccountRecord>,
    ) -> Result<()> {
        let mut meta = self.meta.write();
        if time >= meta.earliest_possible_creation_time {
            return Ok(());
        }
        let mut record = self.record_with_meta(&meta, hd);
        record.earliest_possible_creation_time = time;
        db.write_account(&self.id, &record)?;
        meta.earliest_possible_creation_time = time;
        Ok(())
    }

    /// Make `child` a child of this account.
    ///
    /// `parent_of` resolves the parent of any other account in the same
    /// forest. The link is refused when `child` is this account or one of its
    /// ancestors.
    pub fn add_child(&self, child: &Account, parent_of: impl Fn(&Uuid) -> Option<Uuid>) -> Result<()> {
        let mut seen = BTreeSet::new();
        let mut cursor = Some(self.id);
        while let Some(id) = cursor {
            if id == child.id || !seen.insert(id) {
                return Err(Error::Other(format!(
                    "Account {} cannot be a child of {}",
                    child.id, self.id
                )));
            }
            cursor = if id == self.id { self.parent_id() } else { parent_of(&id) };
        }
        child.meta.write().parent_id = Some(self.id);
        tracing::debug!("Account {} parented to {}", child.id, self.id);
        Ok(())
    }

    pub(crate) fn set_parent_id(&self, parent_id: Option<Uuid>) {
        self.meta.write().parent_id = parent_id;
    }

    /// Whether either chain holds `id`
    pub fn have_key(&self, id: &KeyId) -> bool {
        let chains = self.chains.read();
        chains.external.have_key(id) || chains.internal.have_key(id)
    }

    /// Whether either chain tracks `id` watch-only
    pub fn have_watch_only(&self, id: &KeyId) -> bool {
        let chains = self.chains.read();
        chains.external.have_watch_only(id) || chains.internal.have_watch_only(id)
    }

    /// Whether any watch-only key is tracked
    pub fn have_any_watch_only(&self) -> bool {
        let chains = self.chains.read();
        chains.external.have_any_watch_only() || chains.internal.have_any_watch_only()
    }

    /// Public key for `id` from either chain
    pub fn get_pub_key(&self, id: &KeyId) -> Option<PublicKey> {
        let chains = self.chains.read();
        chains
            .external
            .get_pub_key(id)
            .or_else(|| chains.internal.get_pub_key(id))
    }

    /// Identifiers of every key in both chains
    pub fn get_keys(&self) -> Vec<KeyId> {
        let chains = self.chains.read();
        let mut keys = chains.external.key_ids();
        keys.extend(chains.internal.key_ids());
        keys
    }

    /// Chain holding `id`
    pub fn chain_of(&self, id: &KeyId) -> Option<KeyChain> {
        self.chains.read().chain_of(id)
    }

    /// Number of keys on `chain`
    pub fn key_count(&self, chain: KeyChain) -> usize {
        self.chains.read().get(chain).len()
    }

    /// Metadata recorded for `id`
    pub fn key_metadata(&self, id: &KeyId) -> Option<KeyMetadata> {
        self.chains.read().metadata.get(id).cloned()
    }

    /// Track a watch-only public key on `chain` and persist it
    pub fn add_watch_only(
        &self,
        chain: KeyChain,
        public_key: PublicKey,
        db: &dyn WalletDatabase,
    ) -> Result<KeyId> {
        let mut chains = self.chains.write();
        let store = chains.get_mut(chain).as_basic_mut();
        db.write_watch_only(&public_key, &self.id, chain)?;
        Ok(store.add_watch_only(public_key))
    }

    /// Rehydrate a watch-only public key from storage
    pub fn load_watch_only(&self, chain: KeyChain, public_key: PublicKey) -> KeyId {
        self.chains.write().get_mut(chain).as_basic_mut().add_watch_only(public_key)
    }

    /// Stop tracking a watch-only key on whichever chain holds it.
    ///
    /// Returns `Ok(false)` when `id` is not tracked. The stored record is
    /// erased before the in-memory entry, so a failed erase changes nothing.
    pub fn remove_watch_only(&self, id: &KeyId, db: &dyn WalletDatabase) -> Result<bool> {
        let mut chains = self.chains.write();
        let chain = if chains.external.have_watch_only(id) {
            KeyChain::External
        } else if chains.internal.have_watch_only(id) {
            KeyChain::Internal
        } else {
            return Ok(false);
        };
        let store = chains.get_mut(chain);
        if let Some(public_key) = store.get_pub_key(id) {
            db.erase_watch_only(&public_key)?;
        }
        tracing::debug!("Removed watch-only key {} from account {}", id, self.id);
        Ok(store.remove_watch_only(id))
    }

    /// Rehydrate an unencrypted key from storage
    pub fn load_key(&self, chain: KeyChain, secret: &SecretKey, metadata: KeyMetadata) -> Result<KeyId> {
        let mut chains = self.chains.write();
        let id = chains.get_mut(chain).as_basic_mut().add_key(secret, None)?;
        chains.metadata.insert(id, metadata);
        Ok(id)
    }

    /// Rehydrate a sealed key from storage
    pub fn load_crypted_key(
        &self,
        chain: KeyChain,
        public_key: PublicKey,
        ciphertext: Vec<u8>,
        metadata: KeyMetadata,
    ) -> KeyId {
        let mut chains = self.chains.write();
        let id = chains
            .get_mut(chain)
            .as_basic_mut()
            .add_crypted_key(public_key, ciphertext);
        chains.metadata.insert(id, metadata);
        id
    }

    /// Generate and persist a random key on `chain`.
    ///
    /// An encrypted account needs `master_key` to seal the new secret. The
    /// key is removed again if the database rejects it.
    ///
    /// # Panics
    ///
    /// Panics on read-only accounts and on HD accounts.
    pub fn generate_new_key(
        &self,
        chain: KeyChain,
        master_key: Option<&MasterKey>,
        db: &dyn WalletDatabase,
    ) -> Result<PublicKey> {
        assert!(!self.read_only, "private key generation on a read-only account");

        let secret = generate_secret_key();
        let metadata = KeyMetadata::new(now());
        let mut chains = self.chains.write();
        let store = chains.get_mut(chain).as_basic_mut();
        let id = store.add_key(&secret, master_key)?;
        let public_key = PublicKey::from_secret_key(crate::keys::secp(), &secret);

        let written = match store.crypted_key(&id) {
            Some(ciphertext) => {
                db.write_encrypted_key(&public_key, ciphertext, &metadata, &self.id, chain)
            }
            None => db.write_key(&public_key, &secret.secret_bytes(), &metadata, &self.id, chain),
        };
        if let Err(e) = written {
            store.remove_key(&id);
            tracing::warn!("Discarding unpersisted key {} on account {}: {}", id, self.id, e);
            return Err(e);
        }

        chains.metadata.insert(id, metadata);
        tracing::debug!("Generated key {} on {:?} chain of account {}", id, chain, self.id);
        Ok(public_key)
    }

    /// Secret for `id`
    pub fn get_secret(&self, id: &KeyId) -> Result<SecretKey> {
        if self.read_only {
            return Err(Error::ReadOnly(format!("Account {}", self.id)));
        }
        let chains = self.chains.read();
        match chains.chain_of(id) {
            Some(chain) => chains.get(chain).as_basic().get_secret(id),
            None => Err(Error::NotFound(format!("Key {id}"))),
        }
    }

    /// Whether the key stores are sealed
    pub fn is_encrypted(&self) -> bool {
        let chains = self.chains.read();
        chains.external.is_encrypted() || chains.internal.is_encrypted()
    }

    /// Whether private keys are unavailable
    pub fn is_locked(&self) -> bool {
        let chains = self.chains.read();
        chains.external.is_locked() || chains.internal.is_locked()
    }

    /// Drop plaintext secrets from both chains
    pub fn lock(&self) {
        let mut chains = self.chains.write();
        chains.external.lock();
        chains.internal.lock();
    }

    /// Decrypt both chains; neither is unlocked unless both decrypt
    pub fn unlock(&self, master_key: &MasterKey) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        let mut guard = self.chains.write();
        let chains = &mut *guard;
        if let (KeyStore::Basic(external), KeyStore::Basic(internal)) =
            (&mut chains.external, &mut chains.internal)
        {
            let external_keys = external.decrypt_all(master_key)?;
            let internal_keys = internal.decrypt_all(master_key)?;
            external.apply_unlock(external_keys);
            internal.apply_unlock(internal_keys);
        }
        Ok(())
    }

    /// Seal every key and rewrite it in the database.
    ///
    /// Each key is written in encrypted form before its plaintext record is
    /// erased; the account only switches to encrypted after every write
    /// succeeded.
    pub fn encrypt(&self, master_key: &MasterKey, db: &dyn WalletDatabase) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        let created = self.earliest_possible_creation_time();
        let mut guard = self.chains.write();
        let chains = &mut *guard;
        let (external, internal) = match (&mut chains.external, &mut chains.internal) {
            (KeyStore::Basic(external), KeyStore::Basic(internal)) => (external, internal),
            _ => return Ok(()),
        };
        let sealed_external = external.prepare_encryption(master_key)?;
        let sealed_internal = internal.prepare_encryption(master_key)?;

        for (chain, keys) in [
            (KeyChain::External, &sealed_external),
            (KeyChain::Internal, &sealed_internal),
        ] {
            for key in keys {
                let id = KeyId::from_public_key(&key.public_key);
                let metadata = chains
                    .metadata
                    .get(&id)
                    .cloned()
                    .unwrap_or_else(|| KeyMetadata::new(created));
                db.write_encrypted_key(&key.public_key, &key.ciphertext, &metadata, &self.id, chain)?;
                db.erase_key(&key.public_key)?;
            }
        }

        let count = sealed_external.len() + sealed_internal.len();
        external.apply_encryption(sealed_external);
        internal.apply_encryption(sealed_internal);
        tracing::info!("Encrypted {} keys of account {}", count, self.id);
        Ok(())
    }

    /// Persistence form (without HD part)
    pub fn to_record(&self) -> AccountRecord {
        self.record_with_meta(&self.meta.read(), None)
    }

    pub(crate) fn record_with_hd(&self, hd: HdAccountRecord) -> AccountRecord {
        self.record_with_meta(&self.meta.read(), Some(hd))
    }

    fn record_with_meta(&self, meta: &AccountMeta, hd: Option<HdAccountRecord>) -> AccountRecord {
        AccountRecord {
            id: self.id,
            parent_id: meta.parent_id,
            label: meta.label.clone(),
            account_type: self.account_type,
            subtype: self.subtype,
            earliest_possible_creation_time: meta.earliest_possible_creation_time,
            read_only: self.read_only,
            hd,
        }
    }
}
