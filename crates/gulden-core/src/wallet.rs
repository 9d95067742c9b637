//! Wallet aggregate
//!
//! [`Wallet`] ties seeds, accounts, master key records and the session
//! together. It is the wallet-wide key index used for collision checks and
//! the single entry point for wallet-level encrypt, unlock and lock.

use crate::account::{Account, AccountSubType, AccountType, KeyChain};
use crate::config::WalletConfig;
use crate::hd_account::HdAccount;
use crate::hd_seed::HdSeed;
use crate::keys::KeyId;
use crate::master_key::{MasterKey, MasterKeyRecord};
use crate::persistence::{AccountRecord, KeyIndex, WalletDatabase};
use crate::session::WalletSession;
use crate::{Error, Result};
use gulden_params::{Network, SeedType};
use parking_lot::RwLock;
use secp256k1::{PublicKey, SecretKey};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Identifier of the first master key record
const FIRST_MASTER_KEY_ID: u32 = 1;

/// Account held by a wallet
#[derive(Clone)]
pub enum WalletAccount {
    /// Random-key account
    Legacy(Arc<Account>),
    /// Seed-derived account
    Hd(Arc<HdAccount>),
}

impl WalletAccount {
    /// Account identifier
    pub fn id(&self) -> Uuid {
        self.account().id()
    }

    /// Shared account state
    pub fn account(&self) -> &Account {
        match self {
            WalletAccount::Legacy(account) => account,
            WalletAccount::Hd(account) => account.account(),
        }
    }

    /// HD account, if this is one
    pub fn as_hd(&self) -> Option<&Arc<HdAccount>> {
        match self {
            WalletAccount::Hd(account) => Some(account),
            WalletAccount::Legacy(_) => None,
        }
    }

    /// Whether the account owns `id`
    pub fn have_key(&self, id: &KeyId) -> bool {
        self.account().have_key(id)
    }

    /// Whether private keys are unavailable
    pub fn is_locked(&self) -> bool {
        match self {
            WalletAccount::Legacy(account) => account.is_locked(),
            WalletAccount::Hd(account) => account.is_locked(),
        }
    }

    /// Whether private keys are sealed
    pub fn is_encrypted(&self) -> bool {
        match self {
            WalletAccount::Legacy(account) => account.is_encrypted(),
            WalletAccount::Hd(account) => account.is_encrypted(),
        }
    }

    /// Watch-only account
    pub fn is_read_only(&self) -> bool {
        self.account().is_read_only()
    }

    fn lock(&self) {
        match self {
            WalletAccount::Legacy(account) => account.lock(),
            WalletAccount::Hd(account) => account.lock(),
        }
    }

    fn unlock(&self, master_key: &MasterKey) -> Result<()> {
        match self {
            WalletAccount::Legacy(account) => account.unlock(master_key),
            WalletAccount::Hd(account) => account.unlock(master_key),
        }
    }

    fn encrypt(&self, master_key: &MasterKey, db: &dyn WalletDatabase) -> Result<()> {
        match self {
            WalletAccount::Legacy(account) => account.encrypt(master_key, db),
            WalletAccount::Hd(account) => account.encrypt(master_key),
        }
    }

    /// Persistence form
    pub fn to_record(&self) -> AccountRecord {
        match self {
            WalletAccount::Legacy(account) => account.to_record(),
            WalletAccount::Hd(account) => account.to_record(),
        }
    }
}

/// Wallet
pub struct Wallet {
    config: WalletConfig,
    network: Network,
    session: WalletSession,
    master_keys: RwLock<BTreeMap<u32, MasterKeyRecord>>,
    seeds: RwLock<BTreeMap<Uuid, Arc<HdSeed>>>,
    accounts: RwLock<BTreeMap<Uuid, WalletAccount>>,
    encryption_pending: AtomicBool,
}

impl Wallet {
    /// Empty, unencrypted wallet
    pub fn new(config: WalletConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            network: config.network(),
            config,
            session: WalletSession::new(),
            master_keys: RwLock::new(BTreeMap::new()),
            seeds: RwLock::new(BTreeMap::new()),
            accounts: RwLock::new(BTreeMap::new()),
            encryption_pending: AtomicBool::new(false),
        })
    }

    /// Configuration
    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    /// Network parameters
    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Session holding the master key
    pub fn session(&self) -> &WalletSession {
        &self.session
    }

    /// Whether a master key exists
    pub fn is_encrypted(&self) -> bool {
        !self.master_keys.read().is_empty()
    }

    /// Encrypted and without a decrypted master key
    pub fn is_locked(&self) -> bool {
        self.is_encrypted() && !self.session.is_unlocked()
    }

    /// Register a persisted master key record
    pub fn load_master_key(&self, id: u32, record: MasterKeyRecord) {
        self.master_keys.write().insert(id, record);
    }

    /// Master key records
    pub fn master_keys(&self) -> BTreeMap<u32, MasterKeyRecord> {
        self.master_keys.read().clone()
    }

    /// Register a rehydrated seed
    pub fn insert_seed(&self, seed: HdSeed) -> Arc<HdSeed> {
        let seed = Arc::new(seed.with_desktop_max_index(self.config.desktop_max_index));
        self.seeds.write().insert(seed.id(), Arc::clone(&seed));
        seed
    }

    /// Register a rehydrated account
    pub fn insert_account(&self, account: WalletAccount) {
        self.accounts.write().insert(account.id(), account);
    }

    /// Seed by identifier
    pub fn seed(&self, id: &Uuid) -> Result<Arc<HdSeed>> {
        self.seeds
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Seed {id}")))
    }

    /// All seeds
    pub fn seeds(&self) -> Vec<Arc<HdSeed>> {
        self.seeds.read().values().cloned().collect()
    }

    /// Account by identifier
    pub fn account(&self, id: &Uuid) -> Result<WalletAccount> {
        self.accounts
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Account {id}")))
    }

    /// All accounts
    pub fn accounts(&self) -> Vec<WalletAccount> {
        self.accounts.read().values().cloned().collect()
    }

    /// Create and persist a seed from a mnemonic.
    ///
    /// In an encrypted wallet the seed is sealed before it is written, which
    /// needs the wallet to be unlocked.
    pub fn create_seed(&self, mnemonic: &str, seed_type: SeedType, db: &dyn WalletDatabase) -> Result<Arc<HdSeed>> {
        let seed = HdSeed::new(mnemonic, seed_type)?;
        if self.is_encrypted() {
            self.session.require_master_key(|key| seed.encrypt(key))?;
        }
        db.write_seed(&seed.to_record())?;
        Ok(self.insert_seed(seed))
    }

    /// Import and persist a watch-only seed from a base58check xpub
    pub fn create_read_only_seed(&self, xpub: &str, db: &dyn WalletDatabase) -> Result<Arc<HdSeed>> {
        let (seed, network) = HdSeed::from_xpub(xpub, SeedType::BIP44NoHardening)?;
        if !self.network.accepts_ext_public_key_prefix(network.ext_public_key_prefix) {
            return Err(Error::InvalidKey(format!(
                "Extended key is for {}, wallet is on {}",
                network.name, self.network.name
            )));
        }
        db.write_seed(&seed.to_record())?;
        Ok(self.insert_seed(seed))
    }

    /// Issue the next account of `subtype` from a seed
    pub fn generate_hd_account(
        &self,
        seed_id: &Uuid,
        subtype: AccountSubType,
        db: &dyn WalletDatabase,
    ) -> Result<Arc<HdAccount>> {
        let seed = self.seed(seed_id)?;
        let account = self
            .session
            .with_master_key(|key| seed.generate_account(subtype, key, db))?
            .with_collision_retry_limit(self.config.key_collision_retry_limit);
        let account = Arc::new(account);
        self.insert_account(WalletAccount::Hd(Arc::clone(&account)));
        Ok(account)
    }

    /// Create and persist a random-key account
    pub fn create_legacy_account(
        &self,
        account_type: AccountType,
        subtype: AccountSubType,
        db: &dyn WalletDatabase,
    ) -> Result<Arc<Account>> {
        let account = Account::new(account_type, subtype);
        if self.is_encrypted() {
            self.session.require_master_key(|key| account.encrypt(key, db))?;
        }
        db.write_account(&account.id(), &account.to_record())?;
        let account = Arc::new(account);
        self.insert_account(WalletAccount::Legacy(Arc::clone(&account)));
        tracing::info!("Created {:?} account {}", account_type, account.id());
        Ok(account)
    }

    /// Place account `child_id` under `parent_id` and persist the link
    pub fn add_child_account(&self, parent_id: &Uuid, child_id: &Uuid, db: &dyn WalletDatabase) -> Result<()> {
        let parent = self.account(parent_id)?;
        let child = self.account(child_id)?;
        let previous = child.account().parent_id();
        parent.account().add_child(child.account(), |id| {
            let account = self.accounts.read().get(id).cloned();
            account.and_then(|a| a.account().parent_id())
        })?;
        if let Err(e) = db.write_account(child_id, &child.to_record()) {
            child.account().set_parent_id(previous);
            return Err(e);
        }
        Ok(())
    }

    /// Issue a new key on `chain` of an account
    pub fn generate_new_key(
        &self,
        account_id: &Uuid,
        chain: KeyChain,
        db: &dyn WalletDatabase,
    ) -> Result<PublicKey> {
        match self.account(account_id)? {
            WalletAccount::Hd(account) => account.derive_next_key(chain, self, db),
            WalletAccount::Legacy(account) => {
                if account.is_read_only() {
                    return Err(Error::ReadOnly(format!("Account {account_id}")));
                }
                self.session
                    .with_master_key(|key| account.generate_new_key(chain, key, db))
            }
        }
    }

    /// Private key for `id`, from whichever account owns it
    pub fn get_key(&self, id: &KeyId) -> Result<SecretKey> {
        let owner = self
            .accounts()
            .into_iter()
            .find(|account| account.have_key(id))
            .ok_or_else(|| Error::NotFound(format!("Key {id}")))?;
        match owner {
            WalletAccount::Hd(account) => account.resolve_private_key(id),
            WalletAccount::Legacy(account) => account.get_secret(id),
        }
    }

    /// Whether any account owns `id`
    pub fn has_public_key(&self, id: &KeyId) -> bool {
        self.accounts.read().values().any(|account| account.have_key(id))
    }

    /// Encrypt the whole wallet under `passphrase`.
    ///
    /// A fresh master key is generated and persisted first, then every seed
    /// and account is sealed and rewritten. If the cascade is interrupted by
    /// a failed write, calling again with the same passphrase finishes it
    /// with the existing master key. The wallet is left unlocked.
    pub fn encrypt_wallet(&self, passphrase: &str, db: &dyn WalletDatabase) -> Result<()> {
        let records = self.master_keys();
        if records.is_empty() {
            let (record, key) = MasterKeyRecord::generate(passphrase, self.config.derive_iterations)?;
            db.write_master_key(FIRST_MASTER_KEY_ID, &record)?;
            self.master_keys.write().insert(FIRST_MASTER_KEY_ID, record);
            self.session.set_master_key(key);
            self.encryption_pending.store(true, Ordering::SeqCst);
            tracing::info!("Generated wallet master key");
        } else {
            if !self.encryption_pending.load(Ordering::SeqCst) && !self.needs_encryption() {
                return Err(Error::AlreadyEncrypted("Wallet".to_string()));
            }
            self.session.unlock(passphrase, &records)?;
            tracing::info!("Resuming interrupted wallet encryption");
        }

        self.session.require_master_key(|key| {
            for seed in self.seeds() {
                if !seed.is_read_only() && !seed.is_encrypted() {
                    seed.encrypt(key)?;
                }
                db.write_seed(&seed.to_record())?;
            }
            for account in self.accounts() {
                if !account.is_read_only() && !account.is_encrypted() {
                    account.encrypt(key, db)?;
                }
                db.write_account(&account.id(), &account.to_record())?;
            }
            Ok(())
        })?;
        self.encryption_pending.store(false, Ordering::SeqCst);
        tracing::info!("Wallet encrypted");
        Ok(())
    }

    fn needs_encryption(&self) -> bool {
        self.seeds()
            .iter()
            .any(|seed| !seed.is_read_only() && !seed.is_encrypted())
            || self
                .accounts()
                .iter()
                .any(|account| !account.is_read_only() && !account.is_encrypted())
    }

    /// Unlock the wallet.
    ///
    /// The master key is decrypted once and used to unlock every seed and
    /// account. If any of them fails, everything is locked again.
    pub fn unlock(&self, passphrase: &str) -> Result<()> {
        let records = self.master_keys();
        self.session.unlock(passphrase, &records)?;

        let unlocked = self.session.require_master_key(|key| {
            for seed in self.seeds() {
                seed.unlock(key)?;
            }
            for account in self.accounts() {
                account.unlock(key)?;
            }
            Ok(())
        });
        if let Err(e) = unlocked {
            tracing::warn!("Wallet unlock failed, relocking: {}", e);
            self.lock();
            return Err(e);
        }
        tracing::info!("Wallet unlocked");
        Ok(())
    }

    /// Lock every seed and account and drop the master key
    pub fn lock(&self) {
        for seed in self.seeds() {
            seed.lock();
        }
        for account in self.accounts() {
            account.lock();
        }
        self.session.lock();
    }

    /// Re-wrap the master key under a new passphrase
    pub fn change_passphrase(&self, old: &str, new: &str, db: &dyn WalletDatabase) -> Result<()> {
        let mut records = self.master_keys.write();
        if records.is_empty() {
            return Err(Error::Encryption("Wallet is not encrypted".to_string()));
        }
        let mut last_error = None;
        for (id, record) in records.iter_mut() {
            let mut rewrapped = record.clone();
            match rewrapped.rewrap(old, new, self.config.derive_iterations) {
                Ok(()) => {
                    db.write_master_key(*id, &rewrapped)?;
                    *record = rewrapped;
                    tracing::info!("Passphrase changed for master key {}", id);
                    return Ok(());
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| Error::WrongKey("Passphrase rejected".to_string())))
    }
}

impl KeyIndex for Wallet {
    fn has_public_key(&self, id: &KeyId) -> bool {
        Wallet::has_public_key(self, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::TEST_MNEMONIC;
    use crate::persistence::MemoryDatabase;
    use gulden_params::NetworkType;

    fn wallet() -> Wallet {
        Wallet::new(WalletConfig::for_testing()).unwrap()
    }

    #[test]
    fn test_unencrypted_wallet_flow() {
        let db = MemoryDatabase::new();
        let wallet = wallet();
        let seed = wallet.create_seed(TEST_MNEMONIC, SeedType::BIP44, &db).unwrap();
        let account = wallet
            .generate_hd_account(&seed.id(), AccountSubType::Desktop, &db)
            .unwrap();
        let pk = wallet
            .generate_new_key(&account.id(), KeyChain::External, &db)
            .unwrap();

        let id = KeyId::from_public_key(&pk);
        assert!(wallet.has_public_key(&id));
        assert!(wallet.get_key(&id).is_ok());
        assert!(!wallet.is_encrypted());
        assert!(!wallet.is_locked());
    }

    #[test]
    fn test_encrypt_unlock_lock() {
        let db = MemoryDatabase::new();
        let wallet = wallet();
        let seed = wallet.create_seed(TEST_MNEMONIC, SeedType::BIP44, &db).unwrap();
        let legacy = wallet
            .create_legacy_account(AccountType::Normal, AccountSubType::Desktop, &db)
            .unwrap();
        let pk = wallet.generate_new_key(&legacy.id(), KeyChain::External, &db).unwrap();

        wallet.encrypt_wallet("p1", &db).unwrap();
        assert!(wallet.is_encrypted());
        assert!(!wallet.is_locked());
        assert!(db.master_key(FIRST_MASTER_KEY_ID).is_some());
        assert!(matches!(wallet.encrypt_wallet("p1", &db), Err(Error::AlreadyEncrypted(_))));

        wallet.lock();
        assert!(wallet.is_locked());
        assert!(seed.is_locked());
        assert!(matches!(wallet.get_key(&KeyId::from_public_key(&pk)), Err(Error::Locked(_))));

        assert!(wallet.unlock("p2").is_err());
        assert!(seed.is_locked());

        wallet.unlock("p1").unwrap();
        assert!(!seed.is_locked());
        assert!(wallet.get_key(&KeyId::from_public_key(&pk)).is_ok());
    }

    #[test]
    fn test_new_entities_in_encrypted_wallet() {
        let db = MemoryDatabase::new();
        let wallet = wallet();
        wallet.encrypt_wallet("p1", &db).unwrap();

        let seed = wallet.create_seed(TEST_MNEMONIC, SeedType::BIP44, &db).unwrap();
        assert!(seed.is_encrypted());
        let account = wallet
            .generate_hd_account(&seed.id(), AccountSubType::Mobile, &db)
            .unwrap();
        assert!(account.is_encrypted());
        let legacy = wallet
            .create_legacy_account(AccountType::Normal, AccountSubType::Desktop, &db)
            .unwrap();
        assert!(legacy.is_encrypted());

        wallet.lock();
        assert!(matches!(
            wallet.create_seed(TEST_MNEMONIC, SeedType::BIP44, &db),
            Err(Error::Locked(_))
        ));
        assert!(matches!(
            wallet.generate_hd_account(&seed.id(), AccountSubType::Mobile, &db),
            Err(Error::Locked(_))
        ));
    }

    #[test]
    fn test_change_passphrase() {
        let db = MemoryDatabase::new();
        let wallet = wallet();
        wallet.create_seed(TEST_MNEMONIC, SeedType::BIP44, &db).unwrap();
        wallet.encrypt_wallet("old", &db).unwrap();
        wallet.lock();

        assert!(wallet.change_passphrase("wrong", "new", &db).is_err());
        wallet.change_passphrase("old", "new", &db).unwrap();
        assert!(wallet.unlock("old").is_err());
        wallet.unlock("new").unwrap();
        assert_eq!(
            db.master_key(FIRST_MASTER_KEY_ID),
            wallet.master_keys().get(&FIRST_MASTER_KEY_ID).cloned()
        );
    }

    #[test]
    fn test_resume_interrupted_encryption() {
        let db = MemoryDatabase::new();
        let wallet = wallet();
        let seed = wallet.create_seed(TEST_MNEMONIC, SeedType::BIP44, &db).unwrap();
        wallet
            .generate_hd_account(&seed.id(), AccountSubType::Desktop, &db)
            .unwrap();

        // master key and seed are written, the account write fails
        db.fail_after(Some(2));
        assert!(wallet.encrypt_wallet("p1", &db).is_err());
        db.fail_after(None);

        wallet.encrypt_wallet("p1", &db).unwrap();
        assert!(wallet.accounts().iter().all(|a| a.is_encrypted()));
        assert!(matches!(wallet.encrypt_wallet("p1", &db), Err(Error::AlreadyEncrypted(_))));
    }

    #[test]
    fn test_read_only_seed_network_check() {
        let db = MemoryDatabase::new();
        let full = HdSeed::new(TEST_MNEMONIC, SeedType::BIP44NoHardening).unwrap();
        let wallet = wallet();

        let testnet_xpub = full.master_public_key_encoded(&Network::testnet());
        assert!(matches!(
            wallet.create_read_only_seed(&testnet_xpub, &db),
            Err(Error::InvalidKey(_))
        ));

        let xpub = full.master_public_key_encoded(&Network::mainnet());
        let seed = wallet.create_read_only_seed(&xpub, &db).unwrap();
        assert!(seed.is_read_only());
    }

    #[test]
    fn test_regtest_wallet_imports_own_xpub() {
        let db = MemoryDatabase::new();
        let config = WalletConfig {
            network: NetworkType::Regtest,
            ..WalletConfig::for_testing()
        };
        let wallet = Wallet::new(config).unwrap();
        let full = HdSeed::new(TEST_MNEMONIC, SeedType::BIP44NoHardening).unwrap();

        let xpub = full.master_public_key_encoded(wallet.network());
        let seed = wallet.create_read_only_seed(&xpub, &db).unwrap();
        assert_eq!(seed.master_public_key(), full.master_public_key());

        let mainnet_xpub = full.master_public_key_encoded(&Network::mainnet());
        assert!(matches!(
            wallet.create_read_only_seed(&mainnet_xpub, &db),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_add_child_account() {
        let db = MemoryDatabase::new();
        let wallet = wallet();
        let a = wallet
            .create_legacy_account(AccountType::Normal, AccountSubType::Desktop, &db)
            .unwrap();
        let b = wallet
            .create_legacy_account(AccountType::Normal, AccountSubType::Desktop, &db)
            .unwrap();
        let c = wallet
            .create_legacy_account(AccountType::Shadow, AccountSubType::Desktop, &db)
            .unwrap();

        wallet.add_child_account(&a.id(), &b.id(), &db).unwrap();
        wallet.add_child_account(&b.id(), &c.id(), &db).unwrap();
        assert_eq!(c.parent_id(), Some(b.id()));
        assert_eq!(db.account(&c.id()).and_then(|r| r.parent_id), Some(b.id()));

        assert!(wallet.add_child_account(&c.id(), &a.id(), &db).is_err());
        assert_eq!(a.parent_id(), None);

        db.set_fail_writes(true);
        assert!(matches!(
            wallet.add_child_account(&a.id(), &c.id(), &db),
            Err(Error::Persistence(_))
        ));
        assert_eq!(c.parent_id(), Some(b.id()));
    }

    #[test]
    fn test_unknown_ids() {
        let db = MemoryDatabase::new();
        let wallet = wallet();
        assert!(matches!(
            wallet.generate_hd_account(&Uuid::new_v4(), AccountSubType::Desktop, &db),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            wallet.generate_new_key(&Uuid::new_v4(), KeyChain::External, &db),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            wallet.get_key(&KeyId::from_bytes([1u8; 20])),
            Err(Error::NotFound(_))
        ));
    }
}
