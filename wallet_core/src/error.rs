use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WalletError {
    #[error("no wallet provider available")]
    ProviderMissing,

    #[error("wallet returned no accounts")]
    NoAccounts,

    #[error("wallet request rejected: {0}")]
    Rejected(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("wallet provider error: {0}")]
    Provider(String),
}
