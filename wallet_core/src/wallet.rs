//! Wallet provider capability and connection flow.

use async_trait::async_trait;
use idgate_types::WalletAddress;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::WalletError;

/// Chain id of the Sepolia test network, as reported by `eth_chainId`.
pub const SEPOLIA_CHAIN_ID: &str = "0xaa36a7";

/// An external wallet provider.
#[async_trait]
pub trait WalletCapability: Send + Sync {
    /// Ask the user to expose accounts (`eth_requestAccounts`). The first
    /// entry is the active account.
    async fn request_accounts(&self) -> Result<Vec<String>, WalletError>;

    /// Hex chain id of the provider's active network (`eth_chainId`).
    async fn chain_id(&self) -> Result<String, WalletError>;
}

/// A connected wallet account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConnection {
    pub address: WalletAddress,
    pub chain_id: String,
    /// The provider is on a different network than expected. Advisory only.
    pub network_mismatch: bool,
}

/// Request accounts, take the first, and compare the active network with
/// `expected_chain_id`.
///
/// A failed chain-id lookup is treated like a mismatch: the account is
/// still returned.
pub async fn connect_wallet(
    wallet: &dyn WalletCapability,
    expected_chain_id: &str,
) -> Result<WalletConnection, WalletError> {
    let accounts = wallet.request_accounts().await?;
    let first = accounts.into_iter().next().ok_or(WalletError::NoAccounts)?;
    let address =
        WalletAddress::new(first.as_str()).map_err(|e| WalletError::InvalidAddress(e.to_string()))?;

    let chain_id = match wallet.chain_id().await {
        Ok(id) => id,
        Err(e) => {
            warn!(wallet = %address.as_str(), error = %e, "could not read wallet network");
            String::new()
        }
    };
    let network_mismatch = !chain_id.eq_ignore_ascii_case(expected_chain_id);
    if network_mismatch {
        warn!(
            wallet = %address.as_str(),
            chain_id = %chain_id,
            expected = %expected_chain_id,
            "wallet is on an unexpected network (want {})",
            chain_name(expected_chain_id)
        );
    } else {
        info!(wallet = %address.as_str(), network = chain_name(&chain_id), "wallet connected");
    }

    Ok(WalletConnection {
        address,
        chain_id,
        network_mismatch,
    })
}

/// Display name for well-known chain ids.
pub fn chain_name(chain_id: &str) -> &'static str {
    match chain_id.to_ascii_lowercase().as_str() {
        "0x1" => "Ethereum Mainnet",
        SEPOLIA_CHAIN_ID => "Sepolia",
        "0x89" => "Polygon",
        _ => "unknown network",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        accounts: Result<Vec<String>, WalletError>,
        chain: Result<String, WalletError>,
    }

    #[async_trait]
    impl WalletCapability for Fixed {
        async fn request_accounts(&self) -> Result<Vec<String>, WalletError> {
            self.accounts.clone()
        }
        async fn chain_id(&self) -> Result<String, WalletError> {
            self.chain.clone()
        }
    }

    #[tokio::test]
    async fn connects_first_account_on_expected_network() {
        let w = Fixed {
            accounts: Ok(vec!["0xAbC".into(), "0xdef".into()]),
            chain: Ok("0xAA36A7".into()),
        };
        let c = connect_wallet(&w, SEPOLIA_CHAIN_ID).await.unwrap();
        assert_eq!(c.address.as_str(), "0xAbC");
        assert!(!c.network_mismatch);
    }

    #[tokio::test]
    async fn wrong_network_is_only_flagged() {
        let w = Fixed {
            accounts: Ok(vec!["0xabc".into()]),
            chain: Ok("0x1".into()),
        };
        let c = connect_wallet(&w, SEPOLIA_CHAIN_ID).await.unwrap();
        assert!(c.network_mismatch);
        assert_eq!(c.chain_id, "0x1");
    }

    #[tokio::test]
    async fn unreadable_network_counts_as_mismatch() {
        let w = Fixed {
            accounts: Ok(vec!["0xabc".into()]),
            chain: Err(WalletError::Provider("method not supported".into())),
        };
        assert!(connect_wallet(&w, SEPOLIA_CHAIN_ID).await.unwrap().network_mismatch);
    }

    #[tokio::test]
    async fn empty_account_list_fails() {
        let w = Fixed {
            accounts: Ok(vec![]),
            chain: Ok(SEPOLIA_CHAIN_ID.into()),
        };
        assert_eq!(
            connect_wallet(&w, SEPOLIA_CHAIN_ID).await.unwrap_err(),
            WalletError::NoAccounts
        );
    }

    #[tokio::test]
    async fn provider_rejection_propagates() {
        let w = Fixed {
            accounts: Err(WalletError::Rejected("User rejected the request.".into())),
            chain: Ok(SEPOLIA_CHAIN_ID.into()),
        };
        assert!(matches!(
            connect_wallet(&w, SEPOLIA_CHAIN_ID).await,
            Err(WalletError::Rejected(_))
        ));
    }

    #[test]
    fn chain_names() {
        assert_eq!(chain_name("0xAA36A7"), "Sepolia");
        assert_eq!(chain_name("0x5"), "unknown network");
    }
}
