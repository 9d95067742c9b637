//! Error types for Gulden Core
//!
//! Error taxonomy for key custody: locked entities, wrong keys, derivation
//! range violations and persistence failures, plus the supporting key and
//! encoding errors.

use std::fmt;

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Gulden Core errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Private-key operation attempted without decrypted key material
    #[error("Locked: {0}")]
    Locked(String),

    /// Decryption failed: incorrect master key, passphrase, or corrupted ciphertext
    #[error("Wrong key: {0}")]
    WrongKey(String),

    /// Requested child index outside the variant's allowed range
    #[error("Derivation range exceeded: {0}")]
    DerivationRange(String),

    /// Private-key material requested from a watch-only entity
    #[error("Read-only: {0}")]
    ReadOnly(String),

    /// Database collaborator rejected a write
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Key derivation error
    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    /// Invalid key
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Invalid mnemonic
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// Invalid seed
    #[error("Invalid seed: {0}")]
    InvalidSeed(String),

    /// Symmetric encryption error
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Entity is already encrypted
    #[error("Already encrypted: {0}")]
    AlreadyEncrypted(String),

    /// No unused child key found within the retry bound
    #[error("Key collision: {0}")]
    KeyCollision(String),

    /// Master key record uses a derivation method this build does not know
    #[error("Unsupported key derivation method: {0}")]
    UnsupportedDerivationMethod(u32),

    /// Account or seed not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Check if error is a user-facing error (vs internal error)
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::Locked(_)
                | Error::WrongKey(_)
                | Error::InvalidMnemonic(_)
                | Error::AlreadyEncrypted(_)
                | Error::ReadOnly(_)
        )
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Error::Locked(_) => {
                "The wallet is locked. Please unlock it and try again.".to_string()
            }
            Error::WrongKey(_) => {
                "The passphrase is incorrect. Please check and try again.".to_string()
            }
            Error::InvalidMnemonic(_) => {
                "The recovery phrase is invalid. Please check and try again.".to_string()
            }
            Error::AlreadyEncrypted(_) => "The wallet is already encrypted.".to_string(),
            Error::ReadOnly(_) => "This account is watch-only and cannot spend.".to_string(),
            _ => self.to_string(),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Locked(_)
            | Error::WrongKey(_)
            | Error::AlreadyEncrypted(_)
            | Error::ReadOnly(_) => ErrorCategory::Access,
            Error::Encryption(_) | Error::UnsupportedDerivationMethod(_) => ErrorCategory::Crypto,
            Error::DerivationRange(_)
            | Error::KeyDerivation(_)
            | Error::InvalidKey(_)
            | Error::KeyCollision(_) => ErrorCategory::Keys,
            Error::InvalidMnemonic(_) | Error::InvalidSeed(_) | Error::NotFound(_) => {
                ErrorCategory::Wallet
            }
            Error::Persistence(_) => ErrorCategory::Storage,
            Error::Serialization(_) | Error::Other(_) => ErrorCategory::Internal,
        }
    }
}

impl From<gulden_params::Error> for Error {
    fn from(e: gulden_params::Error) -> Self {
        match e {
            gulden_params::Error::UnknownSeedType(_) => Error::InvalidSeed(e.to_string()),
            gulden_params::Error::InvalidNetwork(_) => Error::Other(e.to_string()),
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Lock state and passphrase errors
    Access,
    /// Symmetric crypto errors
    Crypto,
    /// Key-related errors
    Keys,
    /// Wallet structure errors
    Wallet,
    /// Storage-related errors
    Storage,
    /// Internal/system errors
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Access => write!(f, "Access"),
            ErrorCategory::Crypto => write!(f, "Crypto"),
            ErrorCategory::Keys => write!(f, "Keys"),
            ErrorCategory::Wallet => write!(f, "Wallet"),
            ErrorCategory::Storage => write!(f, "Storage"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_error_detection() {
        assert!(Error::Locked("test".to_string()).is_user_error());
        assert!(Error::WrongKey("test".to_string()).is_user_error());
        assert!(!Error::Persistence("test".to_string()).is_user_error());
        assert!(!Error::KeyDerivation("test".to_string()).is_user_error());
    }

    #[test]
    fn test_user_messages() {
        let msg = Error::WrongKey("details".to_string()).user_message();
        assert!(msg.contains("passphrase is incorrect"));

        let msg = Error::Locked("details".to_string()).user_message();
        assert!(msg.contains("locked"));
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(Error::Locked("t".to_string()).category(), ErrorCategory::Access);
        assert_eq!(
            Error::DerivationRange("t".to_string()).category(),
            ErrorCategory::Keys
        );
        assert_eq!(
            Error::Persistence("t".to_string()).category(),
            ErrorCategory::Storage
        );
        assert_eq!(
            Error::UnsupportedDerivationMethod(7).category(),
            ErrorCategory::Crypto
        );
    }

    #[test]
    fn test_params_error_conversion() {
        let e: Error = gulden_params::Error::UnknownSeedType(9).into();
        assert!(matches!(e, Error::InvalidSeed(_)));
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::Access.to_string(), "Access");
        assert_eq!(ErrorCategory::Storage.to_string(), "Storage");
    }
}
