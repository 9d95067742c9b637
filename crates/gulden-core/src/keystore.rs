//! Key stores
//!
//! A chain's keys live either in a [`BasicKeyStore`] (explicit key pairs,
//! optionally encrypted under the wallet master key) or in an
//! [`HdIndexedKeyStore`] (derivation index per public key, private keys are
//! re-derived by the owning HD account). [`KeyStore`] gives both one call
//! surface.

use crate::keys::{public_key_iv, KeyId};
use crate::master_key::MasterKey;
use crate::{Error, Result};
use secp256k1::{PublicKey, SecretKey};
use std::collections::BTreeMap;
use zeroize::Zeroizing;

/// Explicit key pair entry
struct BasicEntry {
    public_key: PublicKey,
    /// Plaintext secret; `None` while the store is locked
    secret: Option<Zeroizing<[u8; 32]>>,
    /// Secret sealed under the master key; `None` while unencrypted
    crypted: Option<Vec<u8>>,
}

/// Encrypted form of one key, produced before the store switches state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptedKey {
    /// Public key
    pub public_key: PublicKey,
    /// Secret encrypted under the master key with the public key IV
    pub ciphertext: Vec<u8>,
}

/// Store of explicit key pairs and watch-only public keys
#[derive(Default)]
pub struct BasicKeyStore {
    keys: BTreeMap<KeyId, BasicEntry>,
    watch_only: BTreeMap<KeyId, PublicKey>,
    encrypted: bool,
    unlocked: bool,
}

fn seal(master_key: &MasterKey, secret: &[u8; 32], public_key: &PublicKey) -> Result<Vec<u8>> {
    master_key.encrypt_secret(secret, &public_key_iv(public_key))
}

fn open(master_key: &MasterKey, ciphertext: &[u8], public_key: &PublicKey) -> Result<Zeroizing<[u8; 32]>> {
    let plaintext = master_key.decrypt_secret(ciphertext, &public_key_iv(public_key))?;
    let secret = SecretKey::from_slice(&plaintext)
        .map_err(|_| Error::WrongKey("Decrypted secret is not a valid key".to_string()))?;
    if PublicKey::from_secret_key(crate::keys::secp(), &secret) != *public_key {
        return Err(Error::WrongKey(
            "Decrypted secret does not match its public key".to_string(),
        ));
    }
    Ok(Zeroizing::new(secret.secret_bytes()))
}

impl BasicKeyStore {
    /// Create an empty, unencrypted store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key pair.
    ///
    /// An encrypted store seals the secret immediately and needs the master
    /// key for that; without it the store reports [`Error::Locked`].
    pub fn add_key(&mut self, secret: &SecretKey, master_key: Option<&MasterKey>) -> Result<KeyId> {
        let public_key = PublicKey::from_secret_key(crate::keys::secp(), secret);
        let id = KeyId::from_public_key(&public_key);
        let bytes = Zeroizing::new(secret.secret_bytes());

        let crypted = if self.encrypted {
            let master_key = master_key
                .ok_or_else(|| Error::Locked("Store is encrypted and no master key is available".to_string()))?;
            Some(seal(master_key, &bytes, &public_key)?)
        } else {
            None
        };

        // while locked the new key is only known in sealed form
        let secret = if self.encrypted && !self.unlocked { None } else { Some(bytes) };
        self.keys.insert(id, BasicEntry { public_key, secret, crypted });
        Ok(id)
    }

    /// Add a sealed key loaded from storage; marks the store encrypted
    pub fn add_crypted_key(&mut self, public_key: PublicKey, ciphertext: Vec<u8>) -> KeyId {
        if !self.encrypted {
            self.encrypted = true;
            self.unlocked = false;
        }
        let id = KeyId::from_public_key(&public_key);
        self.keys.insert(
            id,
            BasicEntry {
                public_key,
                secret: None,
                crypted: Some(ciphertext),
            },
        );
        id
    }

    /// Sealed form of a key, if the store is encrypted
    pub fn crypted_key(&self, id: &KeyId) -> Option<&[u8]> {
        self.keys.get(id).and_then(|e| e.crypted.as_deref())
    }

    /// Track a public key without its secret
    pub fn add_watch_only(&mut self, public_key: PublicKey) -> KeyId {
        let id = KeyId::from_public_key(&public_key);
        self.watch_only.insert(id, public_key);
        id
    }

    /// Stop tracking a watch-only key
    pub fn remove_watch_only(&mut self, id: &KeyId) -> bool {
        self.watch_only.remove(id).is_some()
    }

    /// Remove a key pair (used to undo an unpersisted insert)
    pub fn remove_key(&mut self, id: &KeyId) -> bool {
        self.keys.remove(id).is_some()
    }

    /// Secret for `id`
    pub fn get_secret(&self, id: &KeyId) -> Result<SecretKey> {
        let entry = self
            .keys
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("Key {id}")))?;
        let secret = entry
            .secret
            .as_ref()
            .ok_or_else(|| Error::Locked(format!("Key {id} is encrypted")))?;
        SecretKey::from_slice(&secret[..]).map_err(|e| Error::InvalidKey(e.to_string()))
    }

    /// Whether the store holds a key pair for `id`
    pub fn have_key(&self, id: &KeyId) -> bool {
        self.keys.contains_key(id)
    }

    /// Whether `id` is tracked watch-only
    pub fn have_watch_only(&self, id: &KeyId) -> bool {
        self.watch_only.contains_key(id)
    }

    /// Whether any watch-only key is tracked
    pub fn have_any_watch_only(&self) -> bool {
        !self.watch_only.is_empty()
    }

    /// Public key for `id` (key pair or watch-only)
    pub fn get_pub_key(&self, id: &KeyId) -> Option<PublicKey> {
        self.keys
            .get(id)
            .map(|e| e.public_key)
            .or_else(|| self.watch_only.get(id).copied())
    }

    /// Identifiers of stored key pairs
    pub fn key_ids(&self) -> Vec<KeyId> {
        self.keys.keys().copied().collect()
    }

    /// Public keys of stored key pairs
    pub fn public_keys(&self) -> Vec<PublicKey> {
        self.keys.values().map(|e| e.public_key).collect()
    }

    /// Whether secrets are sealed under a master key
    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Encrypted and without plaintext secrets
    pub fn is_locked(&self) -> bool {
        self.encrypted && !self.unlocked
    }

    /// Drop plaintext secrets; no-op for an unencrypted store
    pub fn lock(&mut self) {
        if !self.encrypted {
            return;
        }
        for entry in self.keys.values_mut() {
            entry.secret = None;
        }
        self.unlocked = false;
    }

    /// Decrypt every secret and check it against its public key.
    ///
    /// Nothing is committed unless every key decrypts.
    pub fn unlock(&mut self, master_key: &MasterKey) -> Result<()> {
        let opened = self.decrypt_all(master_key)?;
        self.apply_unlock(opened);
        Ok(())
    }

    /// Decrypt every secret without changing the store
    pub(crate) fn decrypt_all(&self, master_key: &MasterKey) -> Result<Vec<(KeyId, Zeroizing<[u8; 32]>)>> {
        if !self.encrypted {
            return Ok(Vec::new());
        }
        self.keys
            .iter()
            .map(|(id, entry)| {
                let ciphertext = entry
                    .crypted
                    .as_ref()
                    .ok_or_else(|| Error::Encryption(format!("Key {id} has no ciphertext")))?;
                Ok((*id, open(master_key, ciphertext, &entry.public_key)?))
            })
            .collect()
    }

    /// Install secrets from [`BasicKeyStore::decrypt_all`]
    pub(crate) fn apply_unlock(&mut self, opened: Vec<(KeyId, Zeroizing<[u8; 32]>)>) {
        if !self.encrypted {
            return;
        }
        for (id, secret) in opened {
            if let Some(entry) = self.keys.get_mut(&id) {
                entry.secret = Some(secret);
            }
        }
        self.unlocked = true;
    }

    /// Seal every secret without changing the store.
    ///
    /// Returns the sealed forms to persist; pass them to
    /// [`BasicKeyStore::apply_encryption`] once they are durable.
    pub fn prepare_encryption(&self, master_key: &MasterKey) -> Result<Vec<CryptedKey>> {
        if self.encrypted {
            return Err(Error::AlreadyEncrypted("Key store".to_string()));
        }
        self.keys
            .iter()
            .map(|(id, entry)| {
                let secret = entry
                    .secret
                    .as_ref()
                    .ok_or_else(|| Error::Locked(format!("Key {id} has no secret")))?;
                Ok(CryptedKey {
                    public_key: entry.public_key,
                    ciphertext: seal(master_key, secret, &entry.public_key)?,
                })
            })
            .collect()
    }

    /// Switch to encrypted form using sealed keys from
    /// [`BasicKeyStore::prepare_encryption`]. The store stays unlocked.
    pub fn apply_encryption(&mut self, crypted: Vec<CryptedKey>) {
        for key in crypted {
            if let Some(entry) = self.keys.get_mut(&KeyId::from_public_key(&key.public_key)) {
                entry.crypted = Some(key.ciphertext);
            }
        }
        self.encrypted = true;
        self.unlocked = true;
    }

    /// Seal every secret in one step
    pub fn encrypt(&mut self, master_key: &MasterKey) -> Result<()> {
        let crypted = self.prepare_encryption(master_key)?;
        self.apply_encryption(crypted);
        Ok(())
    }
}

/// Derivation index and public key of an HD-derived key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HdKeyEntry {
    /// Child index below the chain key
    pub index: u32,
    /// Derived public key
    pub public_key: PublicKey,
}

/// Store mapping public key identifiers to derivation indices
#[derive(Debug, Default)]
pub struct HdIndexedKeyStore {
    entries: BTreeMap<KeyId, HdKeyEntry>,
}

impl HdIndexedKeyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a derived key
    pub fn add_hd_index(&mut self, public_key: PublicKey, index: u32) -> KeyId {
        let id = KeyId::from_public_key(&public_key);
        self.entries.insert(id, HdKeyEntry { index, public_key });
        id
    }

    /// Remove a derived key (used to undo an unpersisted insert)
    pub fn remove(&mut self, id: &KeyId) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Derivation index for `id`
    pub fn get_index(&self, id: &KeyId) -> Option<u32> {
        self.entries.get(id).map(|e| e.index)
    }

    /// Whether `id` is registered
    pub fn have_key(&self, id: &KeyId) -> bool {
        self.entries.contains_key(id)
    }

    /// Public key for `id`
    pub fn get_pub_key(&self, id: &KeyId) -> Option<PublicKey> {
        self.entries.get(id).map(|e| e.public_key)
    }

    /// Registered identifiers
    pub fn key_ids(&self) -> Vec<KeyId> {
        self.entries.keys().copied().collect()
    }

    /// Registered entries ordered by identifier
    pub fn entries(&self) -> impl Iterator<Item = &HdKeyEntry> {
        self.entries.values()
    }
}

/// Key store of one account chain
pub enum KeyStore {
    /// Explicit key pairs
    Basic(BasicKeyStore),
    /// HD derivation indices
    HdIndexed(HdIndexedKeyStore),
}

impl KeyStore {
    /// Empty basic store
    pub fn basic() -> Self {
        KeyStore::Basic(BasicKeyStore::new())
    }

    /// Empty HD-indexed store
    pub fn hd_indexed() -> Self {
        KeyStore::HdIndexed(HdIndexedKeyStore::new())
    }

    /// Whether the store knows a key pair (or derived key) for `id`
    pub fn have_key(&self, id: &KeyId) -> bool {
        match self {
            KeyStore::Basic(store) => store.have_key(id),
            KeyStore::HdIndexed(store) => store.have_key(id),
        }
    }

    /// Whether `id` is tracked watch-only
    pub fn have_watch_only(&self, id: &KeyId) -> bool {
        match self {
            KeyStore::Basic(store) => store.have_watch_only(id),
            KeyStore::HdIndexed(_) => false,
        }
    }

    /// Stop tracking a watch-only key; HD-indexed stores track none
    pub fn remove_watch_only(&mut self, id: &KeyId) -> bool {
        match self {
            KeyStore::Basic(store) => store.remove_watch_only(id),
            KeyStore::HdIndexed(_) => false,
        }
    }

    /// Whether any watch-only key is tracked
    pub fn have_any_watch_only(&self) -> bool {
        match self {
            KeyStore::Basic(store) => store.have_any_watch_only(),
            KeyStore::HdIndexed(_) => false,
        }
    }

    /// Public key for `id`
    pub fn get_pub_key(&self, id: &KeyId) -> Option<PublicKey> {
        match self {
            KeyStore::Basic(store) => store.get_pub_key(id),
            KeyStore::HdIndexed(store) => store.get_pub_key(id),
        }
    }

    /// Identifiers of all keys in the store
    pub fn key_ids(&self) -> Vec<KeyId> {
        match self {
            KeyStore::Basic(store) => store.key_ids(),
            KeyStore::HdIndexed(store) => store.key_ids(),
        }
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        match self {
            KeyStore::Basic(store) => store.keys.len(),
            KeyStore::HdIndexed(store) => store.entries.len(),
        }
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether secrets are sealed; HD stores hold no secrets
    pub fn is_encrypted(&self) -> bool {
        match self {
            KeyStore::Basic(store) => store.is_encrypted(),
            KeyStore::HdIndexed(_) => false,
        }
    }

    /// Whether private keys are unavailable
    pub fn is_locked(&self) -> bool {
        match self {
            KeyStore::Basic(store) => store.is_locked(),
            KeyStore::HdIndexed(_) => false,
        }
    }

    /// Drop plaintext secrets
    pub fn lock(&mut self) {
        if let KeyStore::Basic(store) = self {
            store.lock();
        }
    }

    /// Decrypt secrets
    pub fn unlock(&mut self, master_key: &MasterKey) -> Result<()> {
        match self {
            KeyStore::Basic(store) => store.unlock(master_key),
            KeyStore::HdIndexed(_) => Ok(()),
        }
    }

    /// Basic store, panicking for an HD-indexed one
    pub fn as_basic(&self) -> &BasicKeyStore {
        match self {
            KeyStore::Basic(store) => store,
            KeyStore::HdIndexed(_) => panic!("explicit key pair access on an HD-indexed key store"),
        }
    }

    /// Mutable basic store, panicking for an HD-indexed one
    pub fn as_basic_mut(&mut self) -> &mut BasicKeyStore {
        match self {
            KeyStore::Basic(store) => store,
            KeyStore::HdIndexed(_) => panic!("explicit key pair access on an HD-indexed key store"),
        }
    }

    /// HD-indexed store, panicking for a basic one
    pub fn as_hd(&self) -> &HdIndexedKeyStore {
        match self {
            KeyStore::HdIndexed(store) => store,
            KeyStore::Basic(_) => panic!("derivation index access on a basic key store"),
        }
    }

    /// Mutable HD-indexed store, panicking for a basic one
    pub fn as_hd_mut(&mut self) -> &mut HdIndexedKeyStore {
        match self {
            KeyStore::HdIndexed(store) => store,
            KeyStore::Basic(_) => panic!("derivation index access on a basic key store"),
        }
    }
}
