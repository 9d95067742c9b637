//! AES-256-CBC crypter
//!
//! Passphrase keys are derived with the SHA-512 flavour of `EVP_BytesToKey`:
//! the digest of `passphrase || salt` is re-hashed `rounds - 1` times and
//! split into a 32-byte key and a 16-byte IV. Secrets are encrypted with
//! AES-256-CBC and PKCS#7 padding.

use crate::master_key::KeyDerivationMethod;
use crate::{Error, Result};
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sha2::{Digest, Sha512};
use zeroize::{Zeroize, Zeroizing};

/// Symmetric key size in bytes
pub const WALLET_CRYPTO_KEY_SIZE: usize = 32;

/// Passphrase salt size in bytes
pub const WALLET_CRYPTO_SALT_SIZE: usize = 8;

/// Initialization vector size in bytes
pub const WALLET_CRYPTO_IV_SIZE: usize = 16;

/// Default number of passphrase hashing rounds
pub const DEFAULT_DERIVE_ITERATIONS: u32 = 25_000;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Derive a key/IV pair from a passphrase.
///
/// Fails for an empty round count or a salt that is not
/// [`WALLET_CRYPTO_SALT_SIZE`] bytes long.
pub fn derive_key(
    passphrase: &[u8],
    salt: &[u8],
    rounds: u32,
) -> Result<(Zeroizing<[u8; WALLET_CRYPTO_KEY_SIZE]>, Zeroizing<[u8; WALLET_CRYPTO_IV_SIZE]>)> {
    if rounds < 1 {
        return Err(Error::Encryption("Derivation rounds must be at least 1".to_string()));
    }
    if salt.len() != WALLET_CRYPTO_SALT_SIZE {
        return Err(Error::Encryption(format!(
            "Salt must be {} bytes, got {}",
            WALLET_CRYPTO_SALT_SIZE,
            salt.len()
        )));
    }

    let mut hasher = Sha512::new();
    hasher.update(passphrase);
    hasher.update(salt);
    let mut digest = Zeroizing::new([0u8; 64]);
    digest.copy_from_slice(&hasher.finalize());
    for _ in 1..rounds {
        let next = Sha512::digest(&digest[..]);
        digest.copy_from_slice(&next);
    }

    let mut key = Zeroizing::new([0u8; WALLET_CRYPTO_KEY_SIZE]);
    let mut iv = Zeroizing::new([0u8; WALLET_CRYPTO_IV_SIZE]);
    key.copy_from_slice(&digest[..WALLET_CRYPTO_KEY_SIZE]);
    iv.copy_from_slice(&digest[WALLET_CRYPTO_KEY_SIZE..WALLET_CRYPTO_KEY_SIZE + WALLET_CRYPTO_IV_SIZE]);
    Ok((key, iv))
}

/// Encryption/decryption context holding one key and IV.
///
/// Key material is wiped by [`SymmetricCrypter::clean_key`], on every re-key
/// and when the crypter is dropped.
pub struct SymmetricCrypter {
    key: [u8; WALLET_CRYPTO_KEY_SIZE],
    iv: [u8; WALLET_CRYPTO_IV_SIZE],
    key_set: bool,
}

impl SymmetricCrypter {
    /// Create a crypter with no key set
    pub fn new() -> Self {
        Self {
            key: [0u8; WALLET_CRYPTO_KEY_SIZE],
            iv: [0u8; WALLET_CRYPTO_IV_SIZE],
            key_set: false,
        }
    }

    /// Create a crypter keyed directly with `key` and `iv`
    pub fn with_key(key: &[u8], iv: &[u8]) -> Result<Self> {
        let mut crypter = Self::new();
        crypter.set_key(key, iv)?;
        Ok(crypter)
    }

    /// Key the crypter from a passphrase
    pub fn set_key_from_passphrase(
        &mut self,
        passphrase: &[u8],
        salt: &[u8],
        rounds: u32,
        method: KeyDerivationMethod,
    ) -> Result<()> {
        self.clean_key();
        let (key, iv) = match method {
            KeyDerivationMethod::Sha512Aes => derive_key(passphrase, salt, rounds)?,
        };
        self.key.copy_from_slice(&key[..]);
        self.iv.copy_from_slice(&iv[..]);
        self.key_set = true;
        Ok(())
    }

    /// Key the crypter with raw key and IV bytes
    pub fn set_key(&mut self, key: &[u8], iv: &[u8]) -> Result<()> {
        if key.len() != WALLET_CRYPTO_KEY_SIZE || iv.len() != WALLET_CRYPTO_IV_SIZE {
            return Err(Error::Encryption(format!(
                "Invalid key/IV length: {}/{}",
                key.len(),
                iv.len()
            )));
        }
        self.clean_key();
        self.key.copy_from_slice(key);
        self.iv.copy_from_slice(iv);
        self.key_set = true;
        Ok(())
    }

    /// Whether a key is loaded
    pub fn is_key_set(&self) -> bool {
        self.key_set
    }

    /// Encrypt `plaintext` with PKCS#7 padding
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        if !self.key_set {
            return Err(Error::Encryption("Crypter has no key".to_string()));
        }
        let cipher = Aes256CbcEnc::new_from_slices(&self.key, &self.iv)
            .map_err(|e| Error::Encryption(e.to_string()))?;
        Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
    }

    /// Decrypt `ciphertext`.
    ///
    /// Bad padding or a ciphertext that is not a whole number of blocks is
    /// reported as [`Error::WrongKey`].
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if !self.key_set {
            return Err(Error::Encryption("Crypter has no key".to_string()));
        }
        if ciphertext.is_empty() {
            return Err(Error::WrongKey("Empty ciphertext".to_string()));
        }
        let cipher = Aes256CbcDec::new_from_slices(&self.key, &self.iv)
            .map_err(|e| Error::Encryption(e.to_string()))?;
        cipher
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| Error::WrongKey("Decryption failed: bad padding".to_string()))
    }

    /// Wipe key and IV
    pub fn clean_key(&mut self) {
        self.key.zeroize();
        self.iv.zeroize();
        self.key_set = false;
    }
}

impl Default for SymmetricCrypter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SymmetricCrypter {
    fn drop(&mut self) {
        self.clean_key();
    }
}

/// Encrypt a secret under a raw 32-byte key with an explicit IV
pub fn encrypt_secret(
    key: &[u8; WALLET_CRYPTO_KEY_SIZE],
    plaintext: &[u8],
    iv: &[u8; WALLET_CRYPTO_IV_SIZE],
) -> Result<Vec<u8>> {
    SymmetricCrypter::with_key(key, iv)?.encrypt(plaintext)
}

/// Decrypt a secret under a raw 32-byte key with an explicit IV
pub fn decrypt_secret(
    key: &[u8; WALLET_CRYPTO_KEY_SIZE],
    ciphertext: &[u8],
    iv: &[u8; WALLET_CRYPTO_IV_SIZE],
) -> Result<Zeroizing<Vec<u8>>> {
    SymmetricCrypter::with_key(key, iv)?.decrypt(ciphertext)
}
