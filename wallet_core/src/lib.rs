//! Wallet core library for idgate.
//!
//! The wallet provider (browser extension, hardware signer, test fake) is an
//! injected [`WalletCapability`]; this crate only asks it for accounts and
//! the active network, and turns the answer into a [`WalletConnection`].

pub mod error;
pub mod wallet;

pub use error::WalletError;
pub use wallet::{
    chain_name, connect_wallet, WalletCapability, WalletConnection, SEPOLIA_CHAIN_ID,
};
