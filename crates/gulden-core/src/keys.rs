//! Key derivation and management
//!
//! Implements BIP-32 extended keys over secp256k1 with a configurable master
//! key domain, BIP-39 mnemonic handling, and the fixed 74-byte extended key
//! layout used when persisting derived keys.

use crate::master_key::MasterKey;
use crate::{Error, Result};
use bip39::{Language, Mnemonic};
use gulden_params::{Network, BIP32_HARDENED_KEY_LIMIT};
use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use rand::{rngs::OsRng, RngCore};
use ripemd::Ripemd160;
use secp256k1::{All, PublicKey, Scalar, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use zeroize::Zeroizing;

type HmacSha512 = Hmac<Sha512>;

/// Size of an encoded extended key (without network version bytes)
pub const BIP32_EXTKEY_SIZE: usize = 74;

static SECP: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Shared secp256k1 context
pub fn secp() -> &'static Secp256k1<All> {
    &SECP
}

/// RIPEMD160(SHA256(data))
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let mut out = [0u8; 20];
    out.copy_from_slice(&Ripemd160::digest(sha));
    out
}

/// SHA256(SHA256(data))
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(Sha256::digest(data)));
    out
}

/// IV for a secret keyed by a public key: the leading bytes of its double hash
pub fn public_key_iv(public_key: &PublicKey) -> [u8; 16] {
    let hash = sha256d(&public_key.serialize());
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&hash[..16]);
    iv
}

/// Whether a child number is hardened
pub const fn is_hardened(child: u32) -> bool {
    child >= BIP32_HARDENED_KEY_LIMIT
}

/// Render a derivation path as `m/44'/87'/0'/0/5`
pub fn format_path(path: &[u32]) -> String {
    let mut out = String::from("m");
    for child in path {
        if is_hardened(*child) {
            out.push_str(&format!("/{}'", child & !BIP32_HARDENED_KEY_LIMIT));
        } else {
            out.push_str(&format!("/{child}"));
        }
    }
    out
}

/// Public key identifier (HASH160 of the compressed public key)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyId([u8; 20]);

impl KeyId {
    /// Identifier of `public_key`
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        Self(hash160(&public_key.serialize()))
    }

    /// Create from raw bytes
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", hex::encode(self.0))
    }
}

fn ckd_hmac(chain_code: &[u8; 32], data: &[u8]) -> Result<Zeroizing<[u8; 64]>> {
    let mut mac = HmacSha512::new_from_slice(chain_code)
        .map_err(|e| Error::KeyDerivation(e.to_string()))?;
    mac.update(data);
    let mut out = Zeroizing::new([0u8; 64]);
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

fn split_hmac(out: &[u8; 64]) -> (Zeroizing<[u8; 32]>, Zeroizing<[u8; 32]>) {
    let mut left = Zeroizing::new([0u8; 32]);
    let mut right = Zeroizing::new([0u8; 32]);
    left.copy_from_slice(&out[..32]);
    right.copy_from_slice(&out[32..]);
    (left, right)
}

fn fingerprint_of(public_key: &PublicKey) -> [u8; 4] {
    let id = hash160(&public_key.serialize());
    [id[0], id[1], id[2], id[3]]
}

fn read_header(bytes: &[u8]) -> Result<(u8, [u8; 4], u32, [u8; 32])> {
    if bytes.len() != BIP32_EXTKEY_SIZE {
        return Err(Error::InvalidKey(format!(
            "Extended key must be {} bytes, got {}",
            BIP32_EXTKEY_SIZE,
            bytes.len()
        )));
    }
    let depth = bytes[0];
    let parent_fingerprint = [bytes[1], bytes[2], bytes[3], bytes[4]];
    let child_number = u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);
    let mut chain_code = [0u8; 32];
    chain_code.copy_from_slice(&bytes[9..41]);
    Ok((depth, parent_fingerprint, child_number, chain_code))
}

fn write_header(out: &mut [u8; BIP32_EXTKEY_SIZE], depth: u8, fingerprint: &[u8; 4], child: u32, chain_code: &[u8; 32]) {
    out[0] = depth;
    out[1..5].copy_from_slice(fingerprint);
    out[5..9].copy_from_slice(&child.to_be_bytes());
    out[9..41].copy_from_slice(chain_code);
}

/// Extended private key (secret + chain code + position in the tree)
#[derive(Clone)]
pub struct ExtendedPrivKey {
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: u32,
    chain_code: Zeroizing<[u8; 32]>,
    secret: Zeroizing<[u8; 32]>,
    public_key: PublicKey,
}

impl ExtendedPrivKey {
    fn from_parts(
        depth: u8,
        parent_fingerprint: [u8; 4],
        child_number: u32,
        chain_code: Zeroizing<[u8; 32]>,
        secret: Zeroizing<[u8; 32]>,
    ) -> Result<Self> {
        let key = SecretKey::from_slice(&secret[..]).map_err(|e| Error::InvalidKey(e.to_string()))?;
        Ok(Self {
            depth,
            parent_fingerprint,
            child_number,
            chain_code,
            secret,
            public_key: PublicKey::from_secret_key(secp(), &key),
        })
    }

    /// Master key from seed bytes, with `hmac_key` as the domain separator
    pub fn master(hmac_key: &[u8], seed: &[u8]) -> Result<Self> {
        let mut mac = HmacSha512::new_from_slice(hmac_key)
            .map_err(|e| Error::KeyDerivation(e.to_string()))?;
        mac.update(seed);
        let mut out = Zeroizing::new([0u8; 64]);
        out.copy_from_slice(&mac.finalize().into_bytes());
        let (secret, chain_code) = split_hmac(&out);
        Self::from_parts(0, [0u8; 4], 0, chain_code, secret)
            .map_err(|e| Error::KeyDerivation(format!("Invalid master key: {e}")))
    }

    /// Derive the child at `child` (hardened if the top bit is set)
    pub fn derive(&self, child: u32) -> Result<Self> {
        let depth = self
            .depth
            .checked_add(1)
            .ok_or_else(|| Error::DerivationRange("Maximum key depth reached".to_string()))?;
        let parent_public = self.public_key();

        let mut data = Zeroizing::new(Vec::with_capacity(37));
        if is_hardened(child) {
            data.push(0x00);
            data.extend_from_slice(&self.secret[..]);
        } else {
            data.extend_from_slice(&parent_public.serialize());
        }
        data.extend_from_slice(&child.to_be_bytes());

        let out = ckd_hmac(&self.chain_code, &data)?;
        let (il, chain_code) = split_hmac(&out);
        let tweak = Scalar::from_be_bytes(*il)
            .map_err(|_| Error::KeyDerivation(format!("Invalid child {child}: tweak out of range")))?;
        let child_key = self
            .secret_key()?
            .add_tweak(&tweak)
            .map_err(|e| Error::KeyDerivation(format!("Invalid child {child}: {e}")))?;

        Self::from_parts(
            depth,
            fingerprint_of(&parent_public),
            child,
            chain_code,
            Zeroizing::new(child_key.secret_bytes()),
        )
    }

    /// Derive along a path of child numbers
    pub fn derive_path(&self, path: &[u32]) -> Result<Self> {
        let mut key = self.clone();
        for child in path {
            key = key.derive(*child)?;
        }
        Ok(key)
    }

    /// Public counterpart
    pub fn neuter(&self) -> ExtendedPubKey {
        ExtendedPubKey {
            depth: self.depth,
            parent_fingerprint: self.parent_fingerprint,
            child_number: self.child_number,
            chain_code: *self.chain_code,
            public_key: self.public_key(),
        }
    }

    /// secp256k1 secret key
    pub fn secret_key(&self) -> Result<SecretKey> {
        SecretKey::from_slice(&self.secret[..]).map_err(|e| Error::InvalidKey(e.to_string()))
    }

    /// Raw secret bytes
    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret
    }

    /// Compressed public key
    pub const fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// Depth below the master key
    pub const fn depth(&self) -> u8 {
        self.depth
    }

    /// Child number this key was derived with
    pub const fn child_number(&self) -> u32 {
        self.child_number
    }

    /// Fingerprint of the parent key
    pub const fn parent_fingerprint(&self) -> [u8; 4] {
        self.parent_fingerprint
    }

    /// Chain code
    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }

    /// Serialize to the fixed 74-byte layout
    pub fn encode(&self) -> Zeroizing<[u8; BIP32_EXTKEY_SIZE]> {
        let mut out = Zeroizing::new([0u8; BIP32_EXTKEY_SIZE]);
        write_header(&mut out, self.depth, &self.parent_fingerprint, self.child_number, &self.chain_code);
        out[41] = 0x00;
        out[42..].copy_from_slice(&self.secret[..]);
        out
    }

    /// Deserialize from the fixed 74-byte layout
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (depth, parent_fingerprint, child_number, chain_code) = read_header(bytes)?;
        if bytes[41] != 0x00 {
            return Err(Error::InvalidKey("Extended private key marker missing".to_string()));
        }
        let mut secret = Zeroizing::new([0u8; 32]);
        secret.copy_from_slice(&bytes[42..]);
        Self::from_parts(depth, parent_fingerprint, child_number, Zeroizing::new(chain_code), secret)
    }

    /// Base58check encoding with the network's secret key version
    pub fn to_base58(&self, network: &Network) -> Zeroizing<String> {
        let mut payload = Zeroizing::new(Vec::with_capacity(4 + BIP32_EXTKEY_SIZE));
        payload.extend_from_slice(&network.ext_secret_key_prefix);
        payload.extend_from_slice(&self.encode()[..]);
        Zeroizing::new(bs58::encode(&payload[..]).with_check().into_string())
    }

    /// Encrypt the 74-byte encoding under the wallet master key
    pub fn encrypt(&self, master_key: &MasterKey, iv: &[u8; 16]) -> Result<Vec<u8>> {
        master_key.encrypt_secret(&self.encode()[..], iv)
    }

    /// Decrypt a key sealed by [`ExtendedPrivKey::encrypt`].
    ///
    /// The result must reproduce `expected`, otherwise the master key is
    /// treated as wrong.
    pub fn decrypt(
        ciphertext: &[u8],
        master_key: &MasterKey,
        iv: &[u8; 16],
        expected: &ExtendedPubKey,
    ) -> Result<Self> {
        let plaintext = master_key.decrypt_secret(ciphertext, iv)?;
        let key = Self::decode(&plaintext)
            .map_err(|_| Error::WrongKey("Decrypted extended key is malformed".to_string()))?;
        if key.neuter() != *expected {
            return Err(Error::WrongKey(
                "Decrypted extended key does not match its public key".to_string(),
            ));
        }
        Ok(key)
    }
}

impl fmt::Debug for ExtendedPrivKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedPrivKey")
            .field("depth", &self.depth)
            .field("child_number", &self.child_number)
            .finish_non_exhaustive()
    }
}

/// Extended public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedPubKey {
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: u32,
    chain_code: [u8; 32],
    public_key: PublicKey,
}

impl ExtendedPubKey {
    /// Derive the non-hardened child at `child`.
    ///
    /// # Panics
    ///
    /// Hardened derivation needs the parent private key; requesting it from a
    /// public key is a caller bug.
    pub fn derive(&self, child: u32) -> Result<Self> {
        assert!(
            !is_hardened(child),
            "hardened derivation ({child}) requested from a public key"
        );
        let depth = self
            .depth
            .checked_add(1)
            .ok_or_else(|| Error::DerivationRange("Maximum key depth reached".to_string()))?;

        let mut data = Vec::with_capacity(37);
        data.extend_from_slice(&self.public_key.serialize());
        data.extend_from_slice(&child.to_be_bytes());

        let out = ckd_hmac(&self.chain_code, &data)?;
        let (il, chain_code) = split_hmac(&out);
        let tweak = Scalar::from_be_bytes(*il)
            .map_err(|_| Error::KeyDerivation(format!("Invalid child {child}: tweak out of range")))?;
        let public_key = self
            .public_key
            .add_exp_tweak(secp(), &tweak)
            .map_err(|e| Error::KeyDerivation(format!("Invalid child {child}: {e}")))?;

        Ok(Self {
            depth,
            parent_fingerprint: self.fingerprint(),
            child_number: child,
            chain_code: *chain_code,
            public_key,
        })
    }

    /// Derive along a path of non-hardened child numbers
    pub fn derive_path(&self, path: &[u32]) -> Result<Self> {
        let mut key = self.clone();
        for child in path {
            key = key.derive(*child)?;
        }
        Ok(key)
    }

    /// Compressed public key
    pub const fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Identifier of the public key
    pub fn key_id(&self) -> KeyId {
        KeyId::from_public_key(&self.public_key)
    }

    /// Fingerprint of this key (as seen by its children)
    pub fn fingerprint(&self) -> [u8; 4] {
        fingerprint_of(&self.public_key)
    }

    /// Depth below the master key
    pub const fn depth(&self) -> u8 {
        self.depth
    }

    /// Child number this key was derived with
    pub const fn child_number(&self) -> u32 {
        self.child_number
    }

    /// Fingerprint of the parent key
    pub const fn parent_fingerprint(&self) -> [u8; 4] {
        self.parent_fingerprint
    }

    /// Chain code
    pub const fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }

    /// Serialize to the fixed 74-byte layout
    pub fn encode(&self) -> [u8; BIP32_EXTKEY_SIZE] {
        let mut out = [0u8; BIP32_EXTKEY_SIZE];
        write_header(&mut out, self.depth, &self.parent_fingerprint, self.child_number, &self.chain_code);
        out[41..].copy_from_slice(&self.public_key.serialize());
        out
    }

    /// Deserialize from the fixed 74-byte layout
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (depth, parent_fingerprint, child_number, chain_code) = read_header(bytes)?;
        let public_key =
            PublicKey::from_slice(&bytes[41..]).map_err(|e| Error::InvalidKey(e.to_string()))?;
        Ok(Self {
            depth,
            parent_fingerprint,
            child_number,
            chain_code,
            public_key,
        })
    }

    /// Base58check encoding with the network's public key version
    pub fn to_base58(&self, network: &Network) -> String {
        let mut payload = Vec::with_capacity(4 + BIP32_EXTKEY_SIZE);
        payload.extend_from_slice(&network.ext_public_key_prefix);
        payload.extend_from_slice(&self.encode());
        bs58::encode(payload).with_check().into_string()
    }

    /// Parse a base58check extended public key, returning it with its network
    pub fn from_base58(encoded: &str) -> Result<(Self, Network)> {
        let payload = bs58::decode(encoded.trim())
            .with_check(None)
            .into_vec()
            .map_err(|e| Error::InvalidKey(format!("Invalid base58check: {e}")))?;
        if payload.len() != 4 + BIP32_EXTKEY_SIZE {
            return Err(Error::InvalidKey(format!(
                "Extended public key payload must be {} bytes, got {}",
                4 + BIP32_EXTKEY_SIZE,
                payload.len()
            )));
        }
        let prefix = [payload[0], payload[1], payload[2], payload[3]];
        let network = Network::from_ext_public_key_prefix(prefix)
            .ok_or_else(|| Error::InvalidKey(format!("Unknown version bytes {}", hex::encode(prefix))))?;
        Ok((Self::decode(&payload[4..])?, network))
    }
}

/// Generate a fresh random secp256k1 secret key
pub fn generate_secret_key() -> SecretKey {
    let mut bytes = Zeroizing::new([0u8; 32]);
    loop {
        OsRng.fill_bytes(&mut bytes[..]);
        if let Ok(key) = SecretKey::from_slice(&bytes[..]) {
            return key;
        }
    }
}

/// Generate new random English mnemonic
///
/// # Arguments
/// * `word_count` - Number of words in mnemonic (12, 18, or 24). Defaults to 24.
pub fn generate_mnemonic(word_count: Option<u32>) -> Result<Zeroizing<String>> {
    let entropy_size = match word_count.unwrap_or(24) {
        12 => 16,
        18 => 24,
        24 => 32,
        other => {
            return Err(Error::InvalidMnemonic(format!(
                "Unsupported word count {other}"
            )))
        }
    };

    let mut entropy = Zeroizing::new(vec![0u8; entropy_size]);
    OsRng.fill_bytes(&mut entropy);
    let mnemonic = Mnemonic::from_entropy(&entropy)
        .map_err(|e| Error::InvalidMnemonic(e.to_string()))?;
    Ok(Zeroizing::new(mnemonic.to_string()))
}

/// Check that a phrase is a valid English BIP-39 mnemonic
pub fn validate_mnemonic(mnemonic: &str) -> Result<()> {
    Mnemonic::parse_in_normalized(Language::English, mnemonic)
        .map(|_| ())
        .map_err(|e| Error::InvalidMnemonic(e.to_string()))
}

/// 64-byte BIP-39 seed of a mnemonic (empty passphrase)
pub fn seed_from_mnemonic(mnemonic: &str) -> Result<Zeroizing<[u8; 64]>> {
    let mnemonic = Mnemonic::parse_in_normalized(Language::English, mnemonic)
        .map_err(|e| Error::InvalidMnemonic(e.to_string()))?;
    Ok(Zeroizing::new(mnemonic.to_seed("")))
}

#[cfg(any(test, feature = "test-helpers"))]
/// Fixed 24-word mnemonic for tests
pub const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon \
     abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon \
     abandon abandon abandon abandon art";

#[cfg(test)]
mod tests {
    use super::*;

    // BIP-32 test vector 1
    const TV1_SEED: &str = "000102030405060708090a0b0c0d0e0f";

    fn tv1_master() -> ExtendedPrivKey {
        ExtendedPrivKey::master(b"Bitcoin seed", &hex::decode(TV1_SEED).unwrap()).unwrap()
    }

    #[test]
    fn test_bip32_vector1_master() {
        let master = tv1_master();
        assert_eq!(
            hex::encode(master.secret_bytes()),
            "e8f32e723decf4051aefac8e2c93c9c5b214313817cdb01a1494b917c8436b35"
        );
        assert_eq!(
            hex::encode(master.chain_code()),
            "873dff81c02f525623fd1fe5167eac3a55a049de3d314bb42ee227ffed37d508"
        );
        assert_eq!(
            hex::encode(master.public_key().serialize()),
            "0339a36013301597daef41fbe593a02cc513d0b55527ec2df1050e2e8ff49c85c2"
        );
        assert_eq!(
            master.neuter().to_base58(&Network::mainnet()),
            "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8"
        );
    }

    #[test]
    fn test_bip32_vector1_hardened_child() {
        let child = tv1_master().derive(BIP32_HARDENED_KEY_LIMIT).unwrap();
        assert_eq!(child.depth(), 1);
        assert_eq!(child.parent_fingerprint(), [0x34, 0x42, 0x19, 0x3e]);
        assert_eq!(
            hex::encode(child.secret_bytes()),
            "edb2e14f9ee77d26dd93b4ecede8d16ed408ce149b6cd80b0715a2d911a0afea"
        );
        assert_eq!(
            hex::encode(child.chain_code()),
            "47fdacbd0f1097043b78c63c20c34ef4ed9a111d980047ad16282c7ae6236141"
        );
        assert_eq!(
            hex::encode(child.public_key().serialize()),
            "035a784662a4a20a65bf6aab9ae98a6c068a81c52e4b032c0fb5400c706cfccc56"
        );
    }

    #[test]
    fn test_public_derivation_matches_private() {
        let account = tv1_master().derive(BIP32_HARDENED_KEY_LIMIT).unwrap();
        for child in [0u32, 1, 7, 1000] {
            let from_private = account.derive(child).unwrap().neuter();
            let from_public = account.neuter().derive(child).unwrap();
            assert_eq!(from_private, from_public);
        }
    }

    #[test]
    #[should_panic(expected = "hardened derivation")]
    fn test_hardened_from_public_panics() {
        let _ = tv1_master().neuter().derive(BIP32_HARDENED_KEY_LIMIT);
    }

    #[test]
    fn test_domain_separation() {
        let seed = hex::decode(TV1_SEED).unwrap();
        let legacy = ExtendedPrivKey::master(b"Bitcoin seed", &seed).unwrap();
        let gulden = ExtendedPrivKey::master(b"Gulden bip32", &seed).unwrap();
        assert_ne!(legacy.secret_bytes(), gulden.secret_bytes());
    }

    #[test]
    fn test_encode_decode_private() {
        let key = tv1_master().derive_path(&[BIP32_HARDENED_KEY_LIMIT, 1]).unwrap();
        let encoded = key.encode();
        assert_eq!(encoded.len(), BIP32_EXTKEY_SIZE);
        let decoded = ExtendedPrivKey::decode(&encoded[..]).unwrap();
        assert_eq!(decoded.encode()[..], encoded[..]);
        assert_eq!(decoded.neuter(), key.neuter());
    }

    #[test]
    fn test_encode_decode_public() {
        let key = tv1_master().neuter().derive_path(&[3, 9]).unwrap();
        let decoded = ExtendedPubKey::decode(&key.encode()).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn test_decode_rejects_bad_lengths_and_markers() {
        assert!(ExtendedPubKey::decode(&[0u8; 73]).is_err());
        let mut encoded = *tv1_master().encode();
        encoded[41] = 0x02;
        assert!(ExtendedPrivKey::decode(&encoded).is_err());
    }

    #[test]
    fn test_base58_roundtrip() {
        let xpub = tv1_master().neuter();
        let encoded = xpub.to_base58(&Network::mainnet());
        let (decoded, network) = ExtendedPubKey::from_base58(&encoded).unwrap();
        assert_eq!(decoded, xpub);
        assert_eq!(network.network_type, gulden_params::NetworkType::Mainnet);
        assert!(ExtendedPubKey::from_base58("not-a-key").is_err());
    }

    #[test]
    fn test_format_path() {
        let path = [44 | BIP32_HARDENED_KEY_LIMIT, 87 | BIP32_HARDENED_KEY_LIMIT, BIP32_HARDENED_KEY_LIMIT, 0, 5];
        assert_eq!(format_path(&path), "m/44'/87'/0'/0/5");
        assert_eq!(format_path(&[]), "m");
    }

    #[test]
    fn test_generate_mnemonic() {
        let mnemonic = generate_mnemonic(None).unwrap();
        assert_eq!(mnemonic.split_whitespace().count(), 24);
        assert!(validate_mnemonic(&mnemonic).is_ok());
        assert_eq!(generate_mnemonic(Some(12)).unwrap().split_whitespace().count(), 12);
        assert!(generate_mnemonic(Some(13)).is_err());
    }

    #[test]
    fn test_seed_from_mnemonic() {
        let a = seed_from_mnemonic(TEST_MNEMONIC).unwrap();
        let b = seed_from_mnemonic(TEST_MNEMONIC).unwrap();
        assert_eq!(a[..], b[..]);
        assert!(seed_from_mnemonic("not a mnemonic").is_err());
    }

    #[test]
    fn test_encrypt_decrypt_checks_public_key() {
        let master = tv1_master();
        let child = master.derive(1).unwrap();
        let mk = MasterKey::generate();
        let iv = public_key_iv(&child.public_key());
        let ciphertext = child.encrypt(&mk, &iv).unwrap();

        let decrypted = ExtendedPrivKey::decrypt(&ciphertext, &mk, &iv, &child.neuter()).unwrap();
        assert_eq!(decrypted.secret_bytes(), child.secret_bytes());

        assert!(matches!(
            ExtendedPrivKey::decrypt(&ciphertext, &mk, &iv, &master.neuter()),
            Err(Error::WrongKey(_))
        ));
        assert!(ExtendedPrivKey::decrypt(&ciphertext, &MasterKey::generate(), &iv, &child.neuter()).is_err());
    }

    #[test]
    fn test_key_id_and_iv() {
        let pk = tv1_master().public_key();
        let id = KeyId::from_public_key(&pk);
        assert_eq!(id.as_bytes(), &hash160(&pk.serialize()));
        assert_eq!(id.to_string().len(), 40);
        assert_eq!(public_key_iv(&pk)[..], sha256d(&pk.serialize())[..16]);
    }
}
