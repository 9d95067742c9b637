//! Wallet configuration

use crate::crypter::DEFAULT_DERIVE_ITERATIONS;
use crate::hd_account::DEFAULT_KEY_COLLISION_RETRY_LIMIT;
use crate::{Error, Result};
use gulden_params::{Network, NetworkType, HD_DESKTOP_MAX_INDEX, HD_MOBILE_START_INDEX};
use serde::{Deserialize, Serialize};

/// Wallet configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Network the wallet encodes extended keys for
    pub network: NetworkType,
    /// Passphrase hashing rounds for new master key records
    pub derive_iterations: u32,
    /// Colliding child keys skipped before key generation gives up
    pub key_collision_retry_limit: u32,
    /// Highest desktop account index
    pub desktop_max_index: u32,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            network: NetworkType::Mainnet,
            derive_iterations: DEFAULT_DERIVE_ITERATIONS,
            key_collision_retry_limit: DEFAULT_KEY_COLLISION_RETRY_LIMIT,
            desktop_max_index: HD_DESKTOP_MAX_INDEX,
        }
    }
}

impl WalletConfig {
    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject settings no wallet can run with
    pub fn validate(&self) -> Result<()> {
        if self.derive_iterations < 1 {
            return Err(Error::Other("derive_iterations must be at least 1".to_string()));
        }
        if self.desktop_max_index >= HD_MOBILE_START_INDEX {
            return Err(Error::Other(format!(
                "desktop_max_index must be below the mobile range start {HD_MOBILE_START_INDEX}"
            )));
        }
        Ok(())
    }

    /// Network parameters
    pub fn network(&self) -> Network {
        Network::from_type(self.network)
    }

    /// Fast configuration for tests: a single passphrase hashing round
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn for_testing() -> Self {
        Self {
            derive_iterations: 1,
            ..Self::default()
        }
    }
}
