//! Wallet address as supplied by the wallet provider.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TypesError;

/// An external wallet address.
///
/// The value is opaque to this crate: it is whatever identifier the wallet
/// provider returned (e.g. `0xabc…`). Only emptiness is rejected. Comparison
/// is case-insensitive because providers disagree on checksum casing; the
/// original casing is kept for display and for requests.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Create a wallet address from a raw provider string.
    pub fn new(raw: impl Into<String>) -> Result<Self, TypesError> {
        let s = raw.into().trim().to_string();
        if s.is_empty() {
            return Err(TypesError::EmptyAddress);
        }
        Ok(Self(s))
    }

    /// Return the raw address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether two addresses refer to the same wallet.
    pub fn same_wallet(&self, other: &WalletAddress) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl PartialEq for WalletAddress {
    fn eq(&self, other: &Self) -> bool {
        self.same_wallet(other)
    }
}

impl Eq for WalletAddress {}

impl std::hash::Hash for WalletAddress {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for b in self.0.bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = TypesError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl TryFrom<&str> for WalletAddress {
    type Error = TypesError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<WalletAddress> for String {
    fn from(addr: WalletAddress) -> Self {
        addr.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_address_rejected() {
        assert_eq!(WalletAddress::new("  "), Err(TypesError::EmptyAddress));
    }

    #[test]
    fn comparison_ignores_checksum_casing() {
        let a = WalletAddress::new("0xAbC").unwrap();
        let b = WalletAddress::new("0xabc").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "0xAbC");
    }

    #[test]
    fn different_wallets_differ() {
        let a = WalletAddress::new("0xABC").unwrap();
        let b = WalletAddress::new("0xDEF").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn serde_rejects_empty() {
        assert!(serde_json::from_str::<WalletAddress>("\"\"").is_err());
        let addr: WalletAddress = serde_json::from_str("\"0xabc\"").unwrap();
        assert_eq!(addr.as_str(), "0xabc");
    }
}
