//! HD accounts
//!
//! An [`HdAccount`] holds an account-level extended key and the two chain
//! keys below it (`a/0` receive, `a/1` change). Keys are issued by walking a
//! per-chain counter; the key stores only remember the index of each issued
//! key and private keys are re-derived on demand.

use crate::account::{Account, AccountSubType, AccountType, KeyChain};
use crate::keys::{format_path, is_hardened, public_key_iv, ExtendedPrivKey, ExtendedPubKey, KeyId};
use crate::master_key::MasterKey;
use crate::persistence::{
    AccountRecord, HdAccountRecord, HdAccountSecretsRecord, KeyIndex, KeyMetadata, WalletDatabase,
};
use crate::{Error, Result};
use gulden_params::Network;
use parking_lot::{Mutex, RwLock};
use secp256k1::{PublicKey, SecretKey};
use uuid::Uuid;

/// Default number of colliding child keys skipped before giving up
pub const DEFAULT_KEY_COLLISION_RETRY_LIMIT: u32 = 100;

#[derive(Clone)]
struct SealedAccountKeys {
    account: Vec<u8>,
    external: Vec<u8>,
    internal: Vec<u8>,
}

#[derive(Default)]
struct AccountSecrets {
    account: Option<ExtendedPrivKey>,
    external: Option<ExtendedPrivKey>,
    internal: Option<ExtendedPrivKey>,
    sealed: Option<SealedAccountKeys>,
}

impl AccountSecrets {
    fn chain(&self, chain: KeyChain) -> Option<&ExtendedPrivKey> {
        match chain {
            KeyChain::External => self.external.as_ref(),
            KeyChain::Internal => self.internal.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ChainCounters {
    next_external: u32,
    next_change: u32,
}

impl ChainCounters {
    fn get(&self, chain: KeyChain) -> u32 {
        match chain {
            KeyChain::External => self.next_external,
            KeyChain::Internal => self.next_change,
        }
    }

    fn set(&mut self, chain: KeyChain, value: u32) {
        match chain {
            KeyChain::External => self.next_external = value,
            KeyChain::Internal => self.next_change = value,
        }
    }
}

/// Account derived from an HD seed
pub struct HdAccount {
    account: Account,
    seed_id: Uuid,
    account_path: Vec<u32>,
    account_public: ExtendedPubKey,
    external_public: ExtendedPubKey,
    internal_public: ExtendedPubKey,
    secrets: RwLock<AccountSecrets>,
    counters: Mutex<ChainCounters>,
    collision_retry_limit: u32,
}

impl HdAccount {
    /// Account from an extended private key
    pub fn from_private(key: ExtendedPrivKey, seed_id: Uuid, subtype: AccountSubType) -> Result<Self> {
        let external = key.derive(KeyChain::External.child_index())?;
        let internal = key.derive(KeyChain::Internal.child_index())?;
        let account_public = key.neuter();
        let mut account = Self::build(
            Account::new_hd(Uuid::new_v4(), AccountType::Normal, subtype, false),
            seed_id,
            account_public,
            external.neuter(),
            internal.neuter(),
        );
        account.secrets = RwLock::new(AccountSecrets {
            account: Some(key),
            external: Some(external),
            internal: Some(internal),
            sealed: None,
        });
        Ok(account)
    }

    /// Watch-only account from an extended public key
    pub fn from_public(key: ExtendedPubKey, seed_id: Uuid, subtype: AccountSubType) -> Result<Self> {
        let external = key.derive(KeyChain::External.child_index())?;
        let internal = key.derive(KeyChain::Internal.child_index())?;
        Ok(Self::build(
            Account::new_hd(Uuid::new_v4(), AccountType::ImportedPublic, subtype, true),
            seed_id,
            key,
            external,
            internal,
        ))
    }

    fn build(
        account: Account,
        seed_id: Uuid,
        account_public: ExtendedPubKey,
        external_public: ExtendedPubKey,
        internal_public: ExtendedPubKey,
    ) -> Self {
        Self {
            account,
            seed_id,
            account_path: vec![account_public.child_number()],
            account_public,
            external_public,
            internal_public,
            secrets: RwLock::new(AccountSecrets::default()),
            counters: Mutex::new(ChainCounters {
                next_external: 0,
                next_change: 0,
            }),
            collision_retry_limit: DEFAULT_KEY_COLLISION_RETRY_LIMIT,
        }
    }

    /// Set the number of colliding child keys skipped before giving up
    pub fn with_collision_retry_limit(mut self, limit: u32) -> Self {
        self.collision_retry_limit = limit;
        self
    }

    pub(crate) fn with_account_path(mut self, path: Vec<u32>) -> Self {
        self.account_path = path;
        self
    }

    /// Rebuild an HD account from its record.
    ///
    /// An encrypted account comes back locked. Issued keys are registered
    /// separately with [`HdAccount::load_hd_key`].
    pub fn from_record(record: &AccountRecord) -> Result<Self> {
        let hd = record
            .hd
            .as_ref()
            .ok_or_else(|| Error::InvalidKey(format!("Account {} is not an HD account", record.id)))?;
        let account_public = ExtendedPubKey::decode(&hd.account_public)?;
        let external_public = account_public.derive(KeyChain::External.child_index())?;
        let internal_public = account_public.derive(KeyChain::Internal.child_index())?;

        let secrets = match &hd.secrets {
            HdAccountSecretsRecord::None => AccountSecrets::default(),
            HdAccountSecretsRecord::Plain { account } => {
                let key = ExtendedPrivKey::decode(account)?;
                if key.neuter() != account_public {
                    return Err(Error::InvalidKey(format!(
                        "Account {} private key does not match its public key",
                        record.id
                    )));
                }
                AccountSecrets {
                    external: Some(key.derive(KeyChain::External.child_index())?),
                    internal: Some(key.derive(KeyChain::Internal.child_index())?),
                    account: Some(key),
                    sealed: None,
                }
            }
            HdAccountSecretsRecord::Encrypted {
                account,
                external,
                internal,
            } => AccountSecrets {
                sealed: Some(SealedAccountKeys {
                    account: account.clone(),
                    external: external.clone(),
                    internal: internal.clone(),
                }),
                ..AccountSecrets::default()
            },
        };

        let base = Account::new_hd(record.id, record.account_type, record.subtype, record.read_only);
        base.restore_meta(record);

        let mut account = Self::build(base, hd.seed_id, account_public, external_public, internal_public);
        account.account_path = hd.account_path.clone();
        account.secrets = RwLock::new(secrets);
        account.counters = Mutex::new(ChainCounters {
            next_external: hd.next_external_index,
            next_change: hd.next_change_index,
        });
        Ok(account)
    }

    /// Shared account state (label, parent, key queries)
    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Account identifier
    pub fn id(&self) -> Uuid {
        self.account.id()
    }

    /// Subtype the account was issued for
    pub fn subtype(&self) -> AccountSubType {
        self.account.subtype()
    }

    /// Owning seed
    pub fn seed_id(&self) -> Uuid {
        self.seed_id
    }

    /// Child number the account was derived with
    pub fn account_index(&self) -> u32 {
        self.account_public.child_number()
    }

    /// Derivation path of the account key
    pub fn account_path(&self) -> &[u32] {
        &self.account_path
    }

    /// Watch-only account
    pub fn is_read_only(&self) -> bool {
        self.account.is_read_only()
    }

    /// Account extended public key
    pub fn account_public_key(&self) -> &ExtendedPubKey {
        &self.account_public
    }

    /// Base58check xpub of the account key
    pub fn account_public_key_encoded(&self, network: &Network) -> String {
        self.account_public.to_base58(network)
    }

    /// Chain extended public key
    pub fn chain_public_key(&self, chain: KeyChain) -> &ExtendedPubKey {
        match chain {
            KeyChain::External => &self.external_public,
            KeyChain::Internal => &self.internal_public,
        }
    }

    /// Next index `chain` will issue
    pub fn next_index(&self, chain: KeyChain) -> u32 {
        self.counters.lock().get(chain)
    }

    /// Whether the account keys are sealed under a master key
    pub fn is_encrypted(&self) -> bool {
        self.secrets.read().sealed.is_some()
    }

    /// True while the account private key is unavailable; never for watch-only accounts
    pub fn is_locked(&self) -> bool {
        !self.is_read_only() && self.secrets.read().account.is_none()
    }

    fn key_path(&self, chain: KeyChain, index: u32) -> String {
        let mut path = self.account_path.clone();
        path.push(chain.child_index());
        path.push(index);
        format_path(&path)
    }

    /// Issue the next key on `chain`.
    ///
    /// Indices whose key is already known to `keys` (or to this account) are
    /// skipped, at most `collision_retry_limit` times. The key and the
    /// advanced counter are persisted before the call returns; if either
    /// write fails the counter and key store are left as they were.
    pub fn derive_next_key(
        &self,
        chain: KeyChain,
        keys: &dyn KeyIndex,
        db: &dyn WalletDatabase,
    ) -> Result<PublicKey> {
        let mut counters = self.counters.lock();
        if self.is_locked() {
            return Err(Error::Locked(format!("Account {}", self.id())));
        }

        let chain_public = self.chain_public_key(chain);
        let mut index = counters.get(chain);
        let mut skipped = 0u32;
        let public_key = loop {
            if is_hardened(index) {
                return Err(Error::DerivationRange(format!(
                    "Chain {:?} of account {} exhausted at index {}",
                    chain,
                    self.id(),
                    index
                )));
            }
            let child = chain_public.derive(index)?;
            let id = child.key_id();
            if !keys.has_public_key(&id) && !self.account.have_key(&id) {
                break *child.public_key();
            }
            tracing::warn!(
                "Skipping colliding key {} at index {} on account {}",
                id,
                index,
                self.id()
            );
            skipped += 1;
            if skipped > self.collision_retry_limit {
                return Err(Error::KeyCollision(format!(
                    "No unused key on account {} after {} attempts",
                    self.id(),
                    skipped
                )));
            }
            index += 1;
        };

        let id = KeyId::from_public_key(&public_key);
        let metadata = KeyMetadata::hd(
            chrono::Utc::now().timestamp(),
            self.key_path(chain, index),
            self.id(),
        );
        {
            let mut chains = self.account.chains.write();
            chains.get_mut(chain).as_hd_mut().add_hd_index(public_key, index);
            chains.metadata.insert(id, metadata.clone());
        }

        let mut next = *counters;
        next.set(chain, index + 1);
        let persisted = db
            .write_hd_key(&public_key, index, &metadata, &self.id(), chain)
            .and_then(|()| {
                db.write_account(&self.id(), &self.account.record_with_hd(self.hd_record_with(&next)))
            });
        if let Err(e) = persisted {
            let mut chains = self.account.chains.write();
            chains.get_mut(chain).as_hd_mut().remove(&id);
            chains.metadata.remove(&id);
            tracing::warn!(
                "Key {} on account {} not persisted, counter stays at {}: {}",
                id,
                self.id(),
                counters.get(chain),
                e
            );
            return Err(e);
        }

        *counters = next;
        tracing::debug!("Issued key {} at {}", id, self.key_path(chain, index));
        Ok(public_key)
    }

    /// Register a persisted key index on load
    pub fn load_hd_key(&self, chain: KeyChain, index: u32, metadata: KeyMetadata) -> Result<KeyId> {
        let public_key = *self.chain_public_key(chain).derive(index)?.public_key();
        let mut counters = self.counters.lock();
        let mut chains = self.account.chains.write();
        let id = chains.get_mut(chain).as_hd_mut().add_hd_index(public_key, index);
        chains.metadata.insert(id, metadata);
        if counters.get(chain) <= index {
            counters.set(chain, index + 1);
        }
        Ok(id)
    }

    fn locate(&self, id: &KeyId) -> Option<(KeyChain, u32)> {
        let chains = self.account.chains.read();
        let chain = chains.chain_of(id)?;
        chains.get(chain).as_hd().get_index(id).map(|index| (chain, index))
    }

    /// Public key of an issued key, re-derived from the chain public key
    pub fn get_pub_key(&self, id: &KeyId) -> Result<PublicKey> {
        let (chain, index) = self
            .locate(id)
            .ok_or_else(|| Error::NotFound(format!("Key {id}")))?;
        Ok(*self.chain_public_key(chain).derive(index)?.public_key())
    }

    /// Private key of an issued key, re-derived from the chain private key
    pub fn resolve_private_key(&self, id: &KeyId) -> Result<SecretKey> {
        if self.is_read_only() {
            return Err(Error::ReadOnly(format!("Account {}", self.id())));
        }
        let (chain, index) = self
            .locate(id)
            .ok_or_else(|| Error::NotFound(format!("Key {id}")))?;
        let secrets = self.secrets.read();
        let chain_key = secrets
            .chain(chain)
            .ok_or_else(|| Error::Locked(format!("Account {}", self.id())))?;
        let child = chain_key.derive(index)?;
        if KeyId::from_public_key(&child.public_key()) != *id {
            return Err(Error::InvalidKey(format!(
                "Key {} does not match index {} of account {}",
                id,
                index,
                self.id()
            )));
        }
        child.secret_key()
    }

    /// Wipe the decrypted key triple; no-op unless encrypted
    pub fn lock(&self) {
        if self.is_read_only() {
            return;
        }
        let mut secrets = self.secrets.write();
        if secrets.sealed.is_none() {
            return;
        }
        secrets.account = None;
        secrets.external = None;
        secrets.internal = None;
        tracing::debug!("Locked account {}", self.id());
    }

    /// Decrypt the key triple; nothing changes unless all three decrypt
    pub fn unlock(&self, master_key: &MasterKey) -> Result<()> {
        if self.is_read_only() {
            return Ok(());
        }
        let mut secrets = self.secrets.write();
        let Some(sealed) = secrets.sealed.clone() else {
            return Ok(());
        };

        let account = ExtendedPrivKey::decrypt(
            &sealed.account,
            master_key,
            self.id().as_bytes(),
            &self.account_public,
        )?;
        let external = ExtendedPrivKey::decrypt(
            &sealed.external,
            master_key,
            &public_key_iv(self.external_public.public_key()),
            &self.external_public,
        )?;
        let internal = ExtendedPrivKey::decrypt(
            &sealed.internal,
            master_key,
            &public_key_iv(self.internal_public.public_key()),
            &self.internal_public,
        )?;

        secrets.account = Some(account);
        secrets.external = Some(external);
        secrets.internal = Some(internal);
        tracing::debug!("Unlocked account {}", self.id());
        Ok(())
    }

    /// Seal the key triple under `master_key`; the account stays unlocked
    pub fn encrypt(&self, master_key: &MasterKey) -> Result<()> {
        if self.is_read_only() {
            return Ok(());
        }
        let mut secrets = self.secrets.write();
        if secrets.sealed.is_some() {
            return Err(Error::AlreadyEncrypted(format!("Account {}", self.id())));
        }
        let (Some(account), Some(external), Some(internal)) =
            (&secrets.account, &secrets.external, &secrets.internal)
        else {
            return Err(Error::Locked(format!("Account {}", self.id())));
        };

        let sealed = SealedAccountKeys {
            account: account.encrypt(master_key, self.id().as_bytes())?,
            external: external.encrypt(master_key, &public_key_iv(self.external_public.public_key()))?,
            internal: internal.encrypt(master_key, &public_key_iv(self.internal_public.public_key()))?,
        };
        secrets.sealed = Some(sealed);
        tracing::info!("Encrypted account {}", self.id());
        Ok(())
    }

    /// Lower the creation watermark to `time` and persist the account
    pub fn possibly_update_earliest_time(&self, time: i64, db: &dyn WalletDatabase) -> Result<()> {
        let counters = self.counters.lock();
        self.account
            .update_earliest_time_with(time, db, Some(self.hd_record_with(&counters)))
    }

    /// Persistence form
    pub fn to_record(&self) -> AccountRecord {
        let counters = self.counters.lock();
        self.account.record_with_hd(self.hd_record_with(&counters))
    }

    fn hd_record_with(&self, counters: &ChainCounters) -> HdAccountRecord {
        let secrets = self.secrets.read();
        let secrets_record = match (&secrets.sealed, &secrets.account) {
            _ if self.is_read_only() => HdAccountSecretsRecord::None,
            (Some(sealed), _) => HdAccountSecretsRecord::Encrypted {
                account: sealed.account.clone(),
                external: sealed.external.clone(),
                internal: sealed.internal.clone(),
            },
            (None, Some(account)) => HdAccountSecretsRecord::Plain {
                account: account.encode().to_vec(),
            },
            (None, None) => HdAccountSecretsRecord::None,
        };
        HdAccountRecord {
            seed_id: self.seed_id,
            account_path: self.account_path.clone(),
            next_external_index: counters.next_external,
            next_change_index: counters.next_change,
            account_public: self.account_public.encode().to_vec(),
            secrets: secrets_record,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{MemoryDatabase, NoKeyIndex, StoredKey};
    use gulden_params::BIP32_HARDENED_KEY_LIMIT;
    use std::collections::BTreeSet;

    fn account_key() -> ExtendedPrivKey {
        ExtendedPrivKey::master(b"Gulden bip32", &[7u8; 64])
            .unwrap()
            .derive(BIP32_HARDENED_KEY_LIMIT)
            .unwrap()
    }

    fn hd_account() -> HdAccount {
        HdAccount::from_private(account_key(), Uuid::new_v4(), AccountSubType::Desktop).unwrap()
    }

    #[test]
    fn test_derive_next_key_walks_chain() {
        let db = MemoryDatabase::new();
        let account = hd_account();
        let key = account_key();

        for i in 0..3 {
            let pk = account.derive_next_key(KeyChain::External, &NoKeyIndex, &db).unwrap();
            assert_eq!(pk, key.derive(0).unwrap().derive(i).unwrap().public_key());
        }
        let change = account.derive_next_key(KeyChain::Internal, &NoKeyIndex, &db).unwrap();
        assert_eq!(change, key.derive(1).unwrap().derive(0).unwrap().public_key());

        assert_eq!(account.next_index(KeyChain::External), 3);
        assert_eq!(account.next_index(KeyChain::Internal), 1);
        assert_eq!(account.account().get_keys().len(), 4);
        assert_eq!(
            db.account(&account.id()).and_then(|r| r.hd).map(|hd| hd.next_external_index),
            Some(3)
        );
    }

    #[test]
    fn test_collision_is_skipped() {
        let db = MemoryDatabase::new();
        let account = hd_account();
        let taken = account.chain_public_key(KeyChain::External).derive(0).unwrap().key_id();
        let index: BTreeSet<KeyId> = [taken].into_iter().collect();

        let pk = account.derive_next_key(KeyChain::External, &index, &db).unwrap();
        assert_eq!(pk, *account.chain_public_key(KeyChain::External).derive(1).unwrap().public_key());
        assert_eq!(account.next_index(KeyChain::External), 2);
    }

    #[test]
    fn test_collision_retry_limit() {
        let db = MemoryDatabase::new();
        let account = hd_account().with_collision_retry_limit(2);
        let chain = account.chain_public_key(KeyChain::External).clone();
        let index: BTreeSet<KeyId> = (0..5).map(|i| chain.derive(i).unwrap().key_id()).collect();

        assert!(matches!(
            account.derive_next_key(KeyChain::External, &index, &db),
            Err(Error::KeyCollision(_))
        ));
        assert_eq!(account.next_index(KeyChain::External), 0);
    }

    #[test]
    fn test_persistence_failure_rolls_back() {
        let db = MemoryDatabase::new();
        let account = hd_account();
        // the key write succeeds, the account write fails
        db.fail_after(Some(1));
        assert!(matches!(
            account.derive_next_key(KeyChain::External, &NoKeyIndex, &db),
            Err(Error::Persistence(_))
        ));
        assert_eq!(account.next_index(KeyChain::External), 0);
        assert!(account.account().get_keys().is_empty());

        db.fail_after(None);
        let pk = account.derive_next_key(KeyChain::External, &NoKeyIndex, &db).unwrap();
        assert_eq!(pk, *account.chain_public_key(KeyChain::External).derive(0).unwrap().public_key());
    }

    #[test]
    fn test_resolve_private_key() {
        let db = MemoryDatabase::new();
        let account = hd_account();
        let pk = account.derive_next_key(KeyChain::Internal, &NoKeyIndex, &db).unwrap();
        let id = KeyId::from_public_key(&pk);

        let secret = account.resolve_private_key(&id).unwrap();
        assert_eq!(PublicKey::from_secret_key(crate::keys::secp(), &secret), pk);
        assert_eq!(account.get_pub_key(&id).unwrap(), pk);
        assert!(matches!(
            account.resolve_private_key(&KeyId::from_bytes([0u8; 20])),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_metadata_records_path() {
        let db = MemoryDatabase::new();
        let account = hd_account();
        let pk = account.derive_next_key(KeyChain::Internal, &NoKeyIndex, &db).unwrap();
        let id = KeyId::from_public_key(&pk);
        let path = account.account().key_metadata(&id).and_then(|m| m.hd_key_path);
        assert_eq!(path.as_deref(), Some("m/0'/1/0"));
        assert!(matches!(db.key(&id), Some(StoredKey::Hd { index: 0, .. })));
    }

    #[test]
    fn test_encrypt_lock_unlock() {
        let db = MemoryDatabase::new();
        let account = hd_account();
        let mk = MasterKey::generate();
        let pk = account.derive_next_key(KeyChain::External, &NoKeyIndex, &db).unwrap();
        let id = KeyId::from_public_key(&pk);

        account.encrypt(&mk).unwrap();
        assert!(account.is_encrypted());
        assert!(!account.is_locked());
        assert!(matches!(account.encrypt(&mk), Err(Error::AlreadyEncrypted(_))));

        account.lock();
        assert!(account.is_locked());
        assert!(matches!(account.resolve_private_key(&id), Err(Error::Locked(_))));
        assert!(matches!(
            account.derive_next_key(KeyChain::External, &NoKeyIndex, &db),
            Err(Error::Locked(_))
        ));
        // public lookups never need the private keys
        assert_eq!(account.get_pub_key(&id).unwrap(), pk);

        assert!(account.unlock(&MasterKey::generate()).is_err());
        assert!(account.is_locked());

        account.unlock(&mk).unwrap();
        assert!(!account.is_locked());
        assert!(account.resolve_private_key(&id).is_ok());
    }

    #[test]
    fn test_lock_unencrypted_is_noop() {
        let account = hd_account();
        account.lock();
        assert!(!account.is_locked());
    }

    #[test]
    fn test_read_only_account() {
        let db = MemoryDatabase::new();
        let key = account_key();
        let account =
            HdAccount::from_public(key.neuter(), Uuid::new_v4(), AccountSubType::Desktop).unwrap();
        assert!(account.is_read_only());
        assert!(!account.is_locked());
        assert!(account.encrypt(&MasterKey::generate()).is_ok());
        assert!(!account.is_encrypted());
        assert!(account.unlock(&MasterKey::generate()).is_ok());

        let pk = account.derive_next_key(KeyChain::External, &NoKeyIndex, &db).unwrap();
        assert_eq!(pk, key.derive(0).unwrap().derive(0).unwrap().public_key());
        assert!(matches!(
            account.resolve_private_key(&KeyId::from_public_key(&pk)),
            Err(Error::ReadOnly(_))
        ));
    }

    #[test]
    fn test_record_roundtrip_encrypted() {
        let db = MemoryDatabase::new();
        let account = hd_account();
        let mk = MasterKey::generate();
        let pk = account.derive_next_key(KeyChain::External, &NoKeyIndex, &db).unwrap();
        account.encrypt(&mk).unwrap();

        let restored = HdAccount::from_record(&account.to_record()).unwrap();
        assert_eq!(restored.id(), account.id());
        assert!(restored.is_encrypted());
        assert!(restored.is_locked());
        assert_eq!(restored.next_index(KeyChain::External), 1);

        let id = restored
            .load_hd_key(KeyChain::External, 0, KeyMetadata::new(0))
            .unwrap();
        assert_eq!(id, KeyId::from_public_key(&pk));
        restored.unlock(&mk).unwrap();
        assert!(restored.resolve_private_key(&id).is_ok());
    }

    #[test]
    fn test_record_roundtrip_plain() {
        let account = hd_account();
        let restored = HdAccount::from_record(&account.to_record()).unwrap();
        assert!(!restored.is_encrypted());
        assert!(!restored.is_locked());
        assert_eq!(restored.account_public_key(), account.account_public_key());
    }

    #[test]
    fn test_load_hd_key_advances_counter() {
        let account = hd_account();
        account.load_hd_key(KeyChain::Internal, 4, KeyMetadata::new(0)).unwrap();
        assert_eq!(account.next_index(KeyChain::Internal), 5);
        account.load_hd_key(KeyChain::Internal, 2, KeyMetadata::new(0)).unwrap();
        assert_eq!(account.next_index(KeyChain::Internal), 5);
    }

    #[test]
    fn test_possibly_update_earliest_time_keeps_hd_part() {
        let db = MemoryDatabase::new();
        let account = hd_account();
        account.possibly_update_earliest_time(10, &db).unwrap();
        let record = db.account(&account.id()).unwrap();
        assert_eq!(record.earliest_possible_creation_time, 10);
        assert!(record.hd.is_some());
    }
}
