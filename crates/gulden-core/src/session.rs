//! Wallet session
//!
//! Owns the decrypted wallet master key while the wallet is unlocked. Seeds
//! and accounts never keep their own copy; callers borrow the key through
//! [`WalletSession::with_master_key`] for the duration of one operation.

use crate::master_key::{MasterKey, MasterKeyRecord};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Holder of the decrypted wallet master key
#[derive(Default)]
pub struct WalletSession {
    master_key: RwLock<Option<MasterKey>>,
}

impl WalletSession {
    /// Locked session
    pub fn new() -> Self {
        Self::default()
    }

    /// Unlocked session around an existing key
    pub fn from_master_key(key: MasterKey) -> Self {
        Self {
            master_key: RwLock::new(Some(key)),
        }
    }

    /// Decrypt the master key with `passphrase`.
    ///
    /// Every record is tried in turn. Unlocking an unlocked session still
    /// checks the passphrase and leaves the held key in place.
    pub fn unlock(&self, passphrase: &str, records: &BTreeMap<u32, MasterKeyRecord>) -> Result<()> {
        if records.is_empty() {
            return Err(Error::Encryption("Wallet has no master key".to_string()));
        }

        let mut last_error = None;
        for (id, record) in records {
            match record.unwrap_key(passphrase) {
                Ok(key) => {
                    let mut held = self.master_key.write();
                    match held.as_ref() {
                        Some(current) if current.as_bytes() == key.as_bytes() => {
                            tracing::debug!("Session already unlocked with master key {}", id);
                        }
                        Some(_) => {
                            return Err(Error::WrongKey(
                                "Passphrase opens a different master key than the one in use"
                                    .to_string(),
                            ));
                        }
                        None => {
                            *held = Some(key);
                            tracing::info!("Session unlocked with master key {}", id);
                        }
                    }
                    return Ok(());
                }
                Err(e) => last_error = Some(e),
            }
        }

        tracing::warn!("Session unlock failed: wrong passphrase");
        Err(last_error.unwrap_or_else(|| Error::WrongKey("Passphrase rejected".to_string())))
    }

    /// Install an already decrypted master key
    pub fn set_master_key(&self, key: MasterKey) {
        *self.master_key.write() = Some(key);
    }

    /// Drop (and zeroize) the master key
    pub fn lock(&self) {
        if self.master_key.write().take().is_some() {
            tracing::info!("Session locked");
        }
    }

    /// Whether a master key is held
    pub fn is_unlocked(&self) -> bool {
        self.master_key.read().is_some()
    }

    /// Run `f` with a borrow of the master key, `None` while locked
    pub fn with_master_key<R>(&self, f: impl FnOnce(Option<&MasterKey>) -> R) -> R {
        let held = self.master_key.read();
        f(held.as_ref())
    }

    /// Run `f` with the master key, failing with [`Error::Locked`] while locked
    pub fn require_master_key<R>(&self, f: impl FnOnce(&MasterKey) -> Result<R>) -> Result<R> {
        let held = self.master_key.read();
        let key = held
            .as_ref()
            .ok_or_else(|| Error::Locked("Wallet is locked".to_string()))?;
        f(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(passphrase: &str) -> (BTreeMap<u32, MasterKeyRecord>, MasterKey) {
        let (record, key) = MasterKeyRecord::generate(passphrase, 1).unwrap();
        let mut map = BTreeMap::new();
        map.insert(1, record);
        (map, key)
    }

    #[test]
    fn test_unlock_and_lock() {
        let (records, key) = records("p1");
        let session = WalletSession::new();
        assert!(!session.is_unlocked());

        session.unlock("p1", &records).unwrap();
        assert!(session.is_unlocked());
        session.with_master_key(|held| {
            assert_eq!(held.map(|k| *k.as_bytes()), Some(*key.as_bytes()));
        });

        session.lock();
        assert!(!session.is_unlocked());
        assert!(matches!(
            session.require_master_key(|_| Ok(())),
            Err(Error::Locked(_))
        ));
    }

    #[test]
    fn test_unlock_wrong_passphrase() {
        let (records, _) = records("p1");
        let session = WalletSession::new();
        assert!(session.unlock("p2", &records).is_err());
        assert!(!session.is_unlocked());
    }

    #[test]
    fn test_unlock_is_idempotent() {
        let (records, _) = records("p1");
        let session = WalletSession::new();
        session.unlock("p1", &records).unwrap();
        session.unlock("p1", &records).unwrap();
        assert!(session.is_unlocked());
        assert!(session.unlock("p2", &records).is_err());
        assert!(session.is_unlocked());
    }

    #[test]
    fn test_from_master_key_is_unlocked() {
        let key = MasterKey::generate();
        let expected = *key.as_bytes();
        let session = WalletSession::from_master_key(key);
        assert!(session.is_unlocked());
        let held = session.require_master_key(|k| Ok(*k.as_bytes())).unwrap();
        assert_eq!(held, expected);
        assert!(session.with_master_key(|k| k.is_some()));
    }

    #[test]
    fn test_unlock_without_records() {
        let session = WalletSession::new();
        assert!(session.unlock("p1", &BTreeMap::new()).is_err());
    }
}
