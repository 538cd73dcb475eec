//! Interface to the wallet funding the contracts. Coin selection, change addresses and fee rate
//! oracles are provided by the wallet, the swap engines only consume them.

use std::error;

use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by funding wallets.
#[derive(Error, Debug)]
pub enum Error {
    /// The wallet cannot cover the requested amount.
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        /// Requested amount, in the ledger smallest unit.
        requested: u64,
        /// Available amount, in the ledger smallest unit.
        available: u64,
    },
    /// Any wallet error not part of this list.
    #[error("Wallet error: {0}")]
    Other(Box<dyn error::Error + Send + Sync>),
}

impl Error {
    /// Creates a new wallet error of type other with an arbitrary payload.
    pub fn new<E>(error: E) -> Self
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        Self::Other(error.into())
    }

    /// Consumes the `Error`, returning its inner error (if any).
    pub fn into_inner(self) -> Option<Box<dyn error::Error + Send + Sync>> {
        match self {
            Self::Other(error) => Some(error),
            _ => None,
        }
    }
}

impl From<Error> for crate::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::InsufficientFunds {
                requested,
                available,
            } => crate::Error::InsufficientFunds(format!(
                "requested {}, available {}",
                requested, available
            )),
            Error::Other(e) => crate::Error::Collaborator(e.to_string()),
        }
    }
}

/// A wallet able to fund contracts on a ledger.
#[async_trait]
pub trait FundingWallet: Send + Sync {
    /// The spendable output type, must carry everything needed to sign its spending input.
    type Input: Send;
    /// The address type of the ledger.
    type Address: Send;
    /// The amount type of the ledger.
    type Amount: Send;
    /// The fee rate unit of the ledger.
    type FeeRate: Send;

    /// Select inputs covering at least `amount`, fee included by the caller.
    async fn select_funding_inputs(&self, amount: Self::Amount) -> Result<Vec<Self::Input>, Error>;

    /// Return a fresh address to receive the change of a funding transaction.
    async fn change_address(&self) -> Result<Self::Address, Error>;

    /// Return the current fee rate of the ledger.
    async fn fee_rate(&self) -> Result<Self::FeeRate, Error>;
}
