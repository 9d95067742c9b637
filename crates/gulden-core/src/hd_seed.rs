//! HD seeds
//!
//! An [`HdSeed`] is the root of the derivation tree. It holds the mnemonic,
//! the master/purpose/cointype key chain selected by its [`SeedType`], and
//! two account counters (desktop and mobile) from which [`HdAccount`]s are
//! issued.

use crate::account::AccountSubType;
use crate::hd_account::HdAccount;
use crate::keys::{
    format_path, is_hardened, public_key_iv, seed_from_mnemonic, validate_mnemonic, ExtendedPrivKey,
    ExtendedPubKey,
};
use crate::master_key::MasterKey;
use crate::persistence::{SeedRecord, SeedSecretsRecord, WalletDatabase};
use crate::{Error, Result};
use gulden_params::{Network, SeedType, HD_DESKTOP_MAX_INDEX, HD_DESKTOP_START_INDEX, HD_MOBILE_START_INDEX};
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;
use zeroize::Zeroizing;

#[derive(Clone)]
struct SealedSeed {
    mnemonic: Vec<u8>,
    master: Vec<u8>,
    purpose: Vec<u8>,
    cointype: Vec<u8>,
}

#[derive(Default)]
struct SeedSecrets {
    mnemonic: Option<Zeroizing<String>>,
    master: Option<ExtendedPrivKey>,
    purpose: Option<ExtendedPrivKey>,
    cointype: Option<ExtendedPrivKey>,
    sealed: Option<SealedSeed>,
}

#[derive(Debug, Clone, Copy)]
struct AccountCounters {
    desktop: u32,
    mobile: u32,
}

impl AccountCounters {
    fn get(&self, subtype: AccountSubType) -> u32 {
        match subtype {
            AccountSubType::Desktop => self.desktop,
            AccountSubType::Mobile => self.mobile,
        }
    }

    fn set(&mut self, subtype: AccountSubType, value: u32) {
        match subtype {
            AccountSubType::Desktop => self.desktop = value,
            AccountSubType::Mobile => self.mobile = value,
        }
    }
}

impl Default for AccountCounters {
    fn default() -> Self {
        Self {
            desktop: HD_DESKTOP_START_INDEX,
            mobile: HD_MOBILE_START_INDEX,
        }
    }
}

/// Root of an HD key tree
pub struct HdSeed {
    id: Uuid,
    seed_type: SeedType,
    read_only: bool,
    master_public: ExtendedPubKey,
    purpose_public: ExtendedPubKey,
    cointype_public: ExtendedPubKey,
    secrets: RwLock<SeedSecrets>,
    counters: Mutex<AccountCounters>,
    desktop_max_index: u32,
}

impl HdSeed {
    /// Seed from a mnemonic with a fresh identifier
    pub fn new(mnemonic: &str, seed_type: SeedType) -> Result<Self> {
        Self::with_id(Uuid::new_v4(), mnemonic, seed_type)
    }

    /// Seed from a mnemonic with a given identifier
    pub fn with_id(id: Uuid, mnemonic: &str, seed_type: SeedType) -> Result<Self> {
        validate_mnemonic(mnemonic)?;
        let seed = seed_from_mnemonic(mnemonic)?;
        let master = ExtendedPrivKey::master(seed_type.master_hmac_key(), &seed[..])?;
        let purpose = master.derive(seed_type.purpose_child())?;
        let cointype = purpose.derive(seed_type.cointype_child())?;

        tracing::info!("Created {} seed {}", seed_type, id);
        Ok(Self {
            id,
            seed_type,
            read_only: false,
            master_public: master.neuter(),
            purpose_public: purpose.neuter(),
            cointype_public: cointype.neuter(),
            secrets: RwLock::new(SeedSecrets {
                mnemonic: Some(Zeroizing::new(mnemonic.to_string())),
                master: Some(master),
                purpose: Some(purpose),
                cointype: Some(cointype),
                sealed: None,
            }),
            counters: Mutex::new(AccountCounters::default()),
            desktop_max_index: HD_DESKTOP_MAX_INDEX,
        })
    }

    /// Watch-only seed from the master extended public key.
    ///
    /// Only [`SeedType::BIP44NoHardening`] can be derived without private
    /// keys; other variants are rejected with [`Error::InvalidSeed`].
    pub fn new_read_only(master_public: ExtendedPubKey, seed_type: SeedType) -> Result<Self> {
        if !seed_type.supports_read_only() {
            return Err(Error::InvalidSeed(format!(
                "{seed_type} seeds cannot be imported from a public key"
            )));
        }
        let purpose_public = master_public.derive(seed_type.purpose_child())?;
        let cointype_public = purpose_public.derive(seed_type.cointype_child())?;
        let id = Uuid::new_v4();

        tracing::info!("Imported read-only {} seed {}", seed_type, id);
        Ok(Self {
            id,
            seed_type,
            read_only: true,
            master_public,
            purpose_public,
            cointype_public,
            secrets: RwLock::new(SeedSecrets::default()),
            counters: Mutex::new(AccountCounters::default()),
            desktop_max_index: HD_DESKTOP_MAX_INDEX,
        })
    }

    /// Watch-only seed from a base58check xpub
    pub fn from_xpub(encoded: &str, seed_type: SeedType) -> Result<(Self, Network)> {
        let (master_public, network) = ExtendedPubKey::from_base58(encoded)?;
        Ok((Self::new_read_only(master_public, seed_type)?, network))
    }

    /// Cap desktop account indices at `max_index`
    pub fn with_desktop_max_index(mut self, max_index: u32) -> Self {
        self.desktop_max_index = max_index.min(HD_DESKTOP_MAX_INDEX);
        self
    }

    /// Rebuild a seed from its record; an encrypted seed comes back locked
    pub fn from_record(record: &SeedRecord) -> Result<Self> {
        let seed_type = SeedType::try_from(record.seed_type)?;
        let master_public = ExtendedPubKey::decode(&record.master_public)?;
        let mut seed = match &record.secrets {
            SeedSecretsRecord::Plain { mnemonic } => {
                let seed = Self::with_id(record.id, mnemonic, seed_type)?;
                if seed.master_public != master_public {
                    return Err(Error::InvalidSeed(format!(
                        "Seed {} mnemonic does not match its master public key",
                        record.id
                    )));
                }
                seed
            }
            SeedSecretsRecord::None => {
                let mut seed = Self::new_read_only(master_public, seed_type)?;
                seed.id = record.id;
                seed
            }
            SeedSecretsRecord::Encrypted {
                mnemonic,
                master,
                purpose,
                cointype,
            } => Self {
                id: record.id,
                seed_type,
                read_only: false,
                master_public,
                purpose_public: ExtendedPubKey::decode(&record.purpose_public)?,
                cointype_public: ExtendedPubKey::decode(&record.cointype_public)?,
                secrets: RwLock::new(SeedSecrets {
                    sealed: Some(SealedSeed {
                        mnemonic: mnemonic.clone(),
                        master: master.clone(),
                        purpose: purpose.clone(),
                        cointype: cointype.clone(),
                    }),
                    ..SeedSecrets::default()
                }),
                counters: Mutex::new(AccountCounters::default()),
                desktop_max_index: HD_DESKTOP_MAX_INDEX,
            },
        };
        seed.counters = Mutex::new(AccountCounters {
            desktop: record.desktop_account_counter,
            mobile: record.mobile_account_counter,
        });
        Ok(seed)
    }

    /// Seed identifier
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Derivation variant
    pub fn seed_type(&self) -> SeedType {
        self.seed_type
    }

    /// Public-only import
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether the secrets are sealed under a master key
    pub fn is_encrypted(&self) -> bool {
        self.secrets.read().sealed.is_some()
    }

    /// True while the mnemonic is unavailable; never for read-only seeds
    pub fn is_locked(&self) -> bool {
        !self.read_only && self.secrets.read().mnemonic.is_none()
    }

    /// Mnemonic phrase
    pub fn mnemonic(&self) -> Result<Zeroizing<String>> {
        if self.read_only {
            return Err(Error::ReadOnly(format!("Seed {}", self.id)));
        }
        self.secrets
            .read()
            .mnemonic
            .clone()
            .ok_or_else(|| Error::Locked(format!("Seed {}", self.id)))
    }

    /// Master extended public key
    pub fn master_public_key(&self) -> &ExtendedPubKey {
        &self.master_public
    }

    /// Purpose extended public key
    pub fn purpose_public_key(&self) -> &ExtendedPubKey {
        &self.purpose_public
    }

    /// Cointype extended public key
    pub fn cointype_public_key(&self) -> &ExtendedPubKey {
        &self.cointype_public
    }

    /// Base58check xpub of the master key
    pub fn master_public_key_encoded(&self, network: &Network) -> String {
        self.master_public.to_base58(network)
    }

    /// Index the next account of `subtype` will get
    pub fn next_account_index(&self, subtype: AccountSubType) -> u32 {
        self.counters.lock().get(subtype)
    }

    fn account_path(&self, index: u32) -> Vec<u32> {
        let mut path = Vec::with_capacity(3);
        if self.seed_type.accounts_below_cointype() {
            path.push(self.seed_type.purpose_child());
            path.push(self.seed_type.cointype_child());
        }
        path.push(self.seed_type.account_child(index));
        path
    }

    /// Issue the next account of `subtype`.
    ///
    /// An encrypted seed needs `master_key` to seal the new account's keys.
    /// The advanced seed counter is persisted first, then the account. A
    /// failed account write restores the stored counter. Only when that
    /// restore fails too is the index skipped, so a stored account can never
    /// share its index with a later one.
    pub fn generate_account(
        &self,
        subtype: AccountSubType,
        master_key: Option<&MasterKey>,
        db: &dyn WalletDatabase,
    ) -> Result<HdAccount> {
        let mut counters = self.counters.lock();
        if self.is_locked() {
            return Err(Error::Locked(format!("Seed {}", self.id)));
        }

        let index = counters.get(subtype);
        if subtype == AccountSubType::Desktop && index > self.desktop_max_index {
            return Err(Error::DerivationRange(format!(
                "Desktop account index {} exceeds {}",
                index, self.desktop_max_index
            )));
        }
        if is_hardened(index) {
            return Err(Error::DerivationRange(format!(
                "Account index {index} out of range"
            )));
        }

        let child = self.seed_type.account_child(index);
        let account = if self.read_only {
            HdAccount::from_public(self.cointype_public.derive(child)?, self.id, subtype)?
        } else {
            let secrets = self.secrets.read();
            let parent = if self.seed_type.accounts_below_cointype() {
                secrets.cointype.as_ref()
            } else {
                secrets.master.as_ref()
            };
            let parent = parent.ok_or_else(|| Error::Locked(format!("Seed {}", self.id)))?;
            HdAccount::from_private(parent.derive(child)?, self.id, subtype)?
        };
        let account = account.with_account_path(self.account_path(index));

        if self.is_encrypted() {
            let master_key = master_key.ok_or_else(|| {
                Error::Locked(format!("Seed {} is encrypted and no master key is available", self.id))
            })?;
            self.check_master_key(master_key)?;
            account.encrypt(master_key)?;
        }

        let mut next = *counters;
        next.set(subtype, index + 1);
        db.write_seed(&self.record_with(&next))?;
        if let Err(e) = db.write_account(&account.id(), &account.to_record()) {
            if let Err(restore) = db.write_seed(&self.record_with(&counters)) {
                *counters = next;
                tracing::warn!(
                    "Account at index {} of seed {} not persisted and counter not restored, index skipped: {}",
                    index,
                    self.id,
                    restore
                );
            }
            return Err(e);
        }
        *counters = next;

        tracing::info!(
            "Seed {} issued {:?} account {} at {}",
            self.id,
            subtype,
            account.id(),
            format_path(account.account_path())
        );
        Ok(account)
    }

    fn check_master_key(&self, master_key: &MasterKey) -> Result<()> {
        let secrets = self.secrets.read();
        if let Some(sealed) = &secrets.sealed {
            self.open_key(&sealed.master, master_key, &self.master_public)?;
        }
        Ok(())
    }

    /// Wipe the mnemonic and private keys; no-op unless encrypted
    pub fn lock(&self) {
        if self.read_only {
            return;
        }
        let mut secrets = self.secrets.write();
        if secrets.sealed.is_none() {
            return;
        }
        secrets.mnemonic = None;
        secrets.master = None;
        secrets.purpose = None;
        secrets.cointype = None;
        tracing::debug!("Locked seed {}", self.id);
    }

    /// Decrypt the mnemonic and the three private keys.
    ///
    /// Nothing changes unless all four decrypt and each key reproduces its
    /// public key.
    pub fn unlock(&self, master_key: &MasterKey) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        let mut secrets = self.secrets.write();
        let Some(sealed) = secrets.sealed.clone() else {
            return Ok(());
        };

        let plaintext = master_key.decrypt_secret(&sealed.mnemonic, self.id.as_bytes())?;
        let mnemonic = std::str::from_utf8(&plaintext)
            .map(|s| Zeroizing::new(s.to_string()))
            .map_err(|_| Error::WrongKey("Decrypted mnemonic is not text".to_string()))?;
        let master = self.open_key(&sealed.master, master_key, &self.master_public)?;
        let purpose = self.open_key(&sealed.purpose, master_key, &self.purpose_public)?;
        let cointype = self.open_key(&sealed.cointype, master_key, &self.cointype_public)?;

        secrets.mnemonic = Some(mnemonic);
        secrets.master = Some(master);
        secrets.purpose = Some(purpose);
        secrets.cointype = Some(cointype);
        tracing::debug!("Unlocked seed {}", self.id);
        Ok(())
    }

    fn open_key(
        &self,
        ciphertext: &[u8],
        master_key: &MasterKey,
        expected: &ExtendedPubKey,
    ) -> Result<ExtendedPrivKey> {
        ExtendedPrivKey::decrypt(ciphertext, master_key, &public_key_iv(expected.public_key()), expected)
    }

    /// Seal the mnemonic and the three private keys; the seed stays unlocked
    pub fn encrypt(&self, master_key: &MasterKey) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        let mut secrets = self.secrets.write();
        if secrets.sealed.is_some() {
            return Err(Error::AlreadyEncrypted(format!("Seed {}", self.id)));
        }
        let (Some(mnemonic), Some(master), Some(purpose), Some(cointype)) = (
            &secrets.mnemonic,
            &secrets.master,
            &secrets.purpose,
            &secrets.cointype,
        ) else {
            return Err(Error::Locked(format!("Seed {}", self.id)));
        };

        let sealed = SealedSeed {
            mnemonic: master_key.encrypt_secret(mnemonic.as_bytes(), self.id.as_bytes())?,
            master: master.encrypt(master_key, &public_key_iv(self.master_public.public_key()))?,
            purpose: purpose.encrypt(master_key, &public_key_iv(self.purpose_public.public_key()))?,
            cointype: cointype.encrypt(master_key, &public_key_iv(self.cointype_public.public_key()))?,
        };
        secrets.sealed = Some(sealed);
        tracing::info!("Encrypted seed {}", self.id);
        Ok(())
    }

    /// Persistence form
    pub fn to_record(&self) -> SeedRecord {
        let counters = self.counters.lock();
        self.record_with(&counters)
    }

    fn record_with(&self, counters: &AccountCounters) -> SeedRecord {
        let secrets = self.secrets.read();
        let secrets_record = match (&secrets.sealed, &secrets.mnemonic) {
            _ if self.read_only => SeedSecretsRecord::None,
            (Some(sealed), _) => SeedSecretsRecord::Encrypted {
                mnemonic: sealed.mnemonic.clone(),
                master: sealed.master.clone(),
                purpose: sealed.purpose.clone(),
                cointype: sealed.cointype.clone(),
            },
            (None, Some(mnemonic)) => SeedSecretsRecord::Plain {
                mnemonic: mnemonic.to_string(),
            },
            (None, None) => SeedSecretsRecord::None,
        };
        SeedRecord {
            id: self.id,
            seed_type: self.seed_type.to_u8(),
            read_only: self.read_only,
            master_public: self.master_public.encode().to_vec(),
            purpose_public: self.purpose_public.encode().to_vec(),
            cointype_public: self.cointype_public.encode().to_vec(),
            desktop_account_counter: counters.desktop,
            mobile_account_counter: counters.mobile,
            secrets: secrets_record,
        }
    }
}
