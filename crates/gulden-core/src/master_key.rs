//! Wallet master key
//!
//! One random 32-byte key encrypts every private secret in the wallet. It is
//! stored wrapped under a passphrase-derived key in a [`MasterKeyRecord`].

use crate::crypter::{
    self, SymmetricCrypter, DEFAULT_DERIVE_ITERATIONS, WALLET_CRYPTO_IV_SIZE,
    WALLET_CRYPTO_KEY_SIZE, WALLET_CRYPTO_SALT_SIZE,
};
use crate::{Error, Result};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

/// Passphrase key derivation method stored in a master key record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDerivationMethod {
    /// Iterated SHA-512 (`EVP_BytesToKey`) feeding AES-256-CBC
    Sha512Aes,
}

impl KeyDerivationMethod {
    /// Numeric tag as persisted
    pub const fn to_u32(self) -> u32 {
        match self {
            KeyDerivationMethod::Sha512Aes => 0,
        }
    }
}

impl TryFrom<u32> for KeyDerivationMethod {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(KeyDerivationMethod::Sha512Aes),
            other => Err(Error::UnsupportedDerivationMethod(other)),
        }
    }
}

/// Decrypted wallet master key.
///
/// Not `Clone`: the session holds the only copy and lends it by reference.
///
/// ```compile_fail
/// let key = gulden_core::MasterKey::generate();
/// let copy = key.clone();
/// ```
pub struct MasterKey {
    key: Zeroizing<[u8; WALLET_CRYPTO_KEY_SIZE]>,
}

impl MasterKey {
    /// Generate new random master key
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; WALLET_CRYPTO_KEY_SIZE]);
        OsRng.fill_bytes(&mut key[..]);
        Self { key }
    }

    /// Create from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != WALLET_CRYPTO_KEY_SIZE {
            return Err(Error::Encryption("Invalid master key length".to_string()));
        }
        let mut key = Zeroizing::new([0u8; WALLET_CRYPTO_KEY_SIZE]);
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    /// Get key bytes
    pub fn as_bytes(&self) -> &[u8; WALLET_CRYPTO_KEY_SIZE] {
        &self.key
    }

    /// Encrypt a secret with the given IV
    pub fn encrypt_secret(&self, plaintext: &[u8], iv: &[u8; WALLET_CRYPTO_IV_SIZE]) -> Result<Vec<u8>> {
        crypter::encrypt_secret(&self.key, plaintext, iv)
    }

    /// Decrypt a secret with the given IV
    pub fn decrypt_secret(
        &self,
        ciphertext: &[u8],
        iv: &[u8; WALLET_CRYPTO_IV_SIZE],
    ) -> Result<Zeroizing<Vec<u8>>> {
        crypter::decrypt_secret(&self.key, ciphertext, iv)
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

/// Passphrase-wrapped master key and its derivation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterKeyRecord {
    /// Master key encrypted under the passphrase key
    pub encrypted_key: Vec<u8>,
    /// Passphrase salt
    pub salt: Vec<u8>,
    /// Derivation method tag (0 = SHA-512/AES)
    pub derivation_method: u32,
    /// Passphrase hashing rounds
    pub derive_iterations: u32,
    /// Extra parameters for alternative derivation methods
    pub other_derivation_parameters: Vec<u8>,
}

impl MasterKeyRecord {
    /// Generate a fresh master key and wrap it under `passphrase`
    pub fn generate(passphrase: &str, rounds: u32) -> Result<(Self, MasterKey)> {
        let key = MasterKey::generate();
        let record = Self::wrap(&key, passphrase, rounds)?;
        Ok((record, key))
    }

    /// Wrap an existing master key under `passphrase` with a new random salt
    pub fn wrap(key: &MasterKey, passphrase: &str, rounds: u32) -> Result<Self> {
        let mut salt = vec![0u8; WALLET_CRYPTO_SALT_SIZE];
        OsRng.fill_bytes(&mut salt);

        let method = KeyDerivationMethod::Sha512Aes;
        let mut crypter = SymmetricCrypter::new();
        crypter.set_key_from_passphrase(passphrase.as_bytes(), &salt, rounds, method)?;
        let encrypted_key = crypter.encrypt(key.as_bytes())?;

        Ok(Self {
            encrypted_key,
            salt,
            derivation_method: method.to_u32(),
            derive_iterations: rounds,
            other_derivation_parameters: Vec::new(),
        })
    }

    /// Stored derivation method
    pub fn method(&self) -> Result<KeyDerivationMethod> {
        KeyDerivationMethod::try_from(self.derivation_method)
    }

    /// Recover the master key; a wrong passphrase yields [`Error::WrongKey`]
    pub fn unwrap_key(&self, passphrase: &str) -> Result<MasterKey> {
        let mut crypter = SymmetricCrypter::new();
        crypter.set_key_from_passphrase(
            passphrase.as_bytes(),
            &self.salt,
            self.derive_iterations,
            self.method()?,
        )?;
        let plaintext = crypter.decrypt(&self.encrypted_key)?;
        if plaintext.len() != WALLET_CRYPTO_KEY_SIZE {
            return Err(Error::WrongKey("Decrypted master key has wrong length".to_string()));
        }
        MasterKey::from_bytes(&plaintext)
    }

    /// Re-wrap the same master key under a new passphrase.
    ///
    /// The record is left untouched if `old_passphrase` is wrong.
    pub fn rewrap(&mut self, old_passphrase: &str, new_passphrase: &str, rounds: u32) -> Result<()> {
        let key = self.unwrap_key(old_passphrase)?;
        *self = Self::wrap(&key, new_passphrase, rounds)?;
        Ok(())
    }
}

impl Default for MasterKeyRecord {
    fn default() -> Self {
        Self {
            encrypted_key: Vec::new(),
            salt: Vec::new(),
            derivation_method: KeyDerivationMethod::Sha512Aes.to_u32(),
            derive_iterations: DEFAULT_DERIVE_ITERATIONS,
            other_derivation_parameters: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROUNDS: u32 = 10;

    #[test]
    fn test_generate_unwrap() {
        let (record, key) = MasterKeyRecord::generate("correct horse", ROUNDS).unwrap();
        assert_eq!(record.salt.len(), WALLET_CRYPTO_SALT_SIZE);
        assert_eq!(record.derive_iterations, ROUNDS);
        assert_eq!(record.encrypted_key.len(), 48);

        let unwrapped = record.unwrap_key("correct horse").unwrap();
        assert_eq!(unwrapped.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_wrong_passphrase() {
        let (record, key) = MasterKeyRecord::generate("p1", ROUNDS).unwrap();
        match record.unwrap_key("p2") {
            Err(Error::WrongKey(_)) => {}
            Ok(k) => assert_ne!(k.as_bytes(), key.as_bytes()),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn test_unknown_derivation_method() {
        let (mut record, _) = MasterKeyRecord::generate("p1", ROUNDS).unwrap();
        record.derivation_method = 1;
        assert!(matches!(
            record.unwrap_key("p1"),
            Err(Error::UnsupportedDerivationMethod(1))
        ));
    }

    #[test]
    fn test_rewrap() {
        let (mut record, key) = MasterKeyRecord::generate("old", ROUNDS).unwrap();
        record.rewrap("old", "new", ROUNDS + 1).unwrap();
        assert_eq!(record.derive_iterations, ROUNDS + 1);
        assert_eq!(record.unwrap_key("new").unwrap().as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_rewrap_wrong_passphrase_keeps_record() {
        let (mut record, _) = MasterKeyRecord::generate("old", ROUNDS).unwrap();
        let before = record.clone();
        if record.rewrap("wrong", "new", ROUNDS).is_err() {
            assert_eq!(record, before);
        }
    }

    #[test]
    fn test_default_record() {
        let record = MasterKeyRecord::default();
        assert_eq!(record.derive_iterations, 25_000);
        assert_eq!(record.method().unwrap(), KeyDerivationMethod::Sha512Aes);
    }

    #[test]
    fn test_master_key_secret_roundtrip() {
        let key = MasterKey::generate();
        let iv = [5u8; 16];
        let ciphertext = key.encrypt_secret(b"secret", &iv).unwrap();
        assert_eq!(&key.decrypt_secret(&ciphertext, &iv).unwrap()[..], b"secret");
        assert!(MasterKey::from_bytes(&[0u8; 31]).is_err());
        assert_eq!(format!("{key:?}"), "MasterKey(<redacted>)");
    }
}
