//! Gulden network definitions

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// Network type enumeration
///
/// Deserializes through [`FromStr`], so configs may use any accepted alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// Mainnet
    Mainnet,
    /// Testnet
    Testnet,
    /// Regtest (local development)
    Regtest,
}

impl FromStr for NetworkType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Ok(NetworkType::Mainnet),
            "testnet" | "test" => Ok(NetworkType::Testnet),
            "regtest" => Ok(NetworkType::Regtest),
            other => Err(Error::InvalidNetwork(other.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for NetworkType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Network configuration
#[derive(Debug, Clone)]
pub struct Network {
    /// Network type
    pub network_type: NetworkType,
    /// Human-readable name
    pub name: &'static str,
    /// Coin type (BIP-44). The derivation tree uses 87 on every network.
    pub coin_type: u32,
    /// Base58 version bytes for an extended public key
    pub ext_public_key_prefix: [u8; 4],
    /// Base58 version bytes for an extended secret key
    pub ext_secret_key_prefix: [u8; 4],
}

impl Network {
    /// Get mainnet parameters
    pub const fn mainnet() -> Self {
        Self {
            network_type: NetworkType::Mainnet,
            name: "mainnet",
            coin_type: crate::BIP44_COIN_TYPE,
            ext_public_key_prefix: [0x04, 0x88, 0xB2, 0x1E],
            ext_secret_key_prefix: [0x04, 0x88, 0xAD, 0xE4],
        }
    }

    /// Get testnet parameters
    pub const fn testnet() -> Self {
        Self {
            network_type: NetworkType::Testnet,
            name: "testnet",
            coin_type: crate::BIP44_COIN_TYPE,
            ext_public_key_prefix: [0x04, 0x35, 0x87, 0xCF],
            ext_secret_key_prefix: [0x04, 0x35, 0x83, 0x94],
        }
    }

    /// Get regtest parameters
    pub const fn regtest() -> Self {
        Self {
            network_type: NetworkType::Regtest,
            name: "regtest",
            coin_type: crate::BIP44_COIN_TYPE,
            ext_public_key_prefix: [0x04, 0x35, 0x87, 0xCF],
            ext_secret_key_prefix: [0x04, 0x35, 0x83, 0x94],
        }
    }

    /// Get network by type
    pub const fn from_type(network_type: NetworkType) -> Self {
        match network_type {
            NetworkType::Mainnet => Self::mainnet(),
            NetworkType::Testnet => Self::testnet(),
            NetworkType::Regtest => Self::regtest(),
        }
    }

    /// Whether extended public keys encoded with `prefix` belong here.
    ///
    /// Testnet and regtest share version bytes, so each accepts the other's.
    pub fn accepts_ext_public_key_prefix(&self, prefix: [u8; 4]) -> bool {
        self.ext_public_key_prefix == prefix
    }

    /// Find the network whose extended public key prefix matches `prefix`.
    ///
    /// Testnet and regtest share version bytes; testnet wins. Callers that
    /// know their network should ask [`Network::accepts_ext_public_key_prefix`].
    pub fn from_ext_public_key_prefix(prefix: [u8; 4]) -> Option<Self> {
        [Self::mainnet(), Self::testnet()]
            .into_iter()
            .find(|n| n.ext_public_key_prefix == prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mainnet_params() {
        let net = Network::mainnet();
        assert_eq!(net.network_type, NetworkType::Mainnet);
        assert_eq!(net.coin_type, 87);
        assert_eq!(net.ext_public_key_prefix, [0x04, 0x88, 0xB2, 0x1E]);
    }

    #[test]
    fn test_network_from_type() {
        let net = Network::from_type(NetworkType::Testnet);
        assert_eq!(net.network_type, NetworkType::Testnet);
        assert_eq!(net.name, "testnet");
    }

    #[test]
    fn test_network_type_parse() {
        assert_eq!("Mainnet".parse::<NetworkType>().unwrap(), NetworkType::Mainnet);
        assert_eq!("regtest".parse::<NetworkType>().unwrap(), NetworkType::Regtest);
        assert!("signet".parse::<NetworkType>().is_err());
    }

    #[test]
    fn test_prefix_lookup() {
        let net = Network::from_ext_public_key_prefix([0x04, 0x88, 0xB2, 0x1E]).unwrap();
        assert_eq!(net.network_type, NetworkType::Mainnet);
        assert!(Network::from_ext_public_key_prefix([0, 0, 0, 0]).is_none());
    }

    #[test]
    fn test_network_type_serde() {
        let json = serde_json::to_string(&NetworkType::Testnet).unwrap();
        assert_eq!(json, "\"testnet\"");
        let parsed: NetworkType = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, NetworkType::Testnet);
        let alias: NetworkType = serde_json::from_str("\"Main\"").unwrap();
        assert_eq!(alias, NetworkType::Mainnet);
        assert!(serde_json::from_str::<NetworkType>("\"signet\"").is_err());
    }

    #[test]
    fn test_shared_prefix_accepted_by_regtest() {
        let regtest = Network::regtest();
        assert!(regtest.accepts_ext_public_key_prefix(regtest.ext_public_key_prefix));
        assert!(regtest.accepts_ext_public_key_prefix(Network::testnet().ext_public_key_prefix));
        assert!(!regtest.accepts_ext_public_key_prefix(Network::mainnet().ext_public_key_prefix));

        let found = Network::from_ext_public_key_prefix(regtest.ext_public_key_prefix).unwrap();
        assert_eq!(found.network_type, NetworkType::Testnet);
    }
}
