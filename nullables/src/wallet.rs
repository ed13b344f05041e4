//! Nullable wallet provider.

use async_trait::async_trait;
use idgate_wallet_core::{WalletCapability, WalletError, SEPOLIA_CHAIN_ID};

/// A wallet provider with fixed answers.
#[derive(Clone, Debug)]
pub struct NullWallet {
    accounts: Result<Vec<String>, WalletError>,
    chain_id: String,
}

impl NullWallet {
    /// One account on Sepolia.
    pub fn with_account(address: impl Into<String>) -> Self {
        Self {
            accounts: Ok(vec![address.into()]),
            chain_id: SEPOLIA_CHAIN_ID.to_string(),
        }
    }

    /// A provider that fails `eth_requestAccounts`.
    pub fn failing(error: WalletError) -> Self {
        Self {
            accounts: Err(error),
            chain_id: SEPOLIA_CHAIN_ID.to_string(),
        }
    }

    pub fn on_chain(mut self, chain_id: impl Into<String>) -> Self {
        self.chain_id = chain_id.into();
        self
    }
}

#[async_trait]
impl WalletCapability for NullWallet {
    async fn request_accounts(&self) -> Result<Vec<String>, WalletError> {
        self.accounts.clone()
    }

    async fn chain_id(&self) -> Result<String, WalletError> {
        Ok(self.chain_id.clone())
    }
}
