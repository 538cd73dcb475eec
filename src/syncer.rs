//! Interfaces to the blockchains used by the swap engines: broadcasting signed transactions and
//! reading the ledger clock used by lock times. Syncers are owned by the engines and injected at
//! construction, no global client is used.

use std::error;

use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by syncers. [`Self::Other`] can carry out errors from external sources.
#[derive(Error, Debug)]
pub enum Error {
    /// The ledger rejected the transaction (double spend, insufficient fee, malformed, etc.).
    #[error("Transaction rejected: {0}")]
    Rejected(String),
    /// Any syncer error not part of this list.
    #[error("Syncer error: {0}")]
    Other(Box<dyn error::Error + Send + Sync>),
}

impl Error {
    /// Creates a new syncer error of type other with an arbitrary payload.
    pub fn new<E>(error: E) -> Self
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        Self::Other(error.into())
    }

    /// Consumes the `Error`, returning its inner error (if any).
    ///
    /// If this [`enum@Error`] was constructed via [`new`] then this function will return [`Some`],
    /// otherwise it will return [`None`].
    ///
    /// [`new`]: Error::new
    ///
    pub fn into_inner(self) -> Option<Box<dyn error::Error + Send + Sync>> {
        match self {
            Self::Other(error) => Some(error),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Other(Box::new(err))
    }
}

impl From<Error> for crate::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Rejected(reason) => crate::Error::BroadcastRejected(reason),
            Error::Other(e) => crate::Error::Collaborator(e.to_string()),
        }
    }
}

/// Submit signed transactions to a ledger.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// The signed transaction type of the ledger.
    type Transaction: Send + Sync;
    /// The transaction identifier returned by the ledger.
    type TxId: Send;

    /// Publish a fully signed transaction, resolves once the ledger accepted or rejected it.
    async fn publish(&self, tx: &Self::Transaction) -> Result<Self::TxId, Error>;
}

/// Read the current time of a ledger, as used to evaluate absolute lock times.
#[async_trait]
pub trait ChainClock: Send + Sync {
    /// Height of the current chain tip.
    async fn current_height(&self) -> Result<u32, Error>;

    /// Median time past of the current chain tip, the time lock times are compared to.
    async fn median_time_past(&self) -> Result<u32, Error>;
}

/// Syncer over a `bitcoind` node with the JSON-RPC interface. The RPC client is blocking, calls
/// are executed on the blocking thread pool of the runtime.
#[cfg(feature = "rpc")]
#[cfg_attr(docsrs, doc(cfg(feature = "rpc")))]
pub mod bitcoind {
    use std::sync::Arc;

    use async_trait::async_trait;
    use bitcoincore_rpc::{Client, RpcApi};

    use super::{Broadcaster, ChainClock, Error};

    /// A broadcaster and chain clock backed by a `bitcoind` RPC client handle.
    #[derive(Clone)]
    pub struct BitcoindSyncer {
        client: Arc<Client>,
    }

    impl std::fmt::Debug for BitcoindSyncer {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("BitcoindSyncer").finish()
        }
    }

    impl BitcoindSyncer {
        /// Create a syncer owning the client handle.
        pub fn new(client: Client) -> Self {
            Self {
                client: Arc::new(client),
            }
        }

        async fn call<T, F>(&self, f: F) -> Result<T, Error>
        where
            T: Send + 'static,
            F: FnOnce(&Client) -> Result<T, bitcoincore_rpc::Error> + Send + 'static,
        {
            let client = Arc::clone(&self.client);
            tokio::task::spawn_blocking(move || f(&client))
                .await
                .map_err(Error::new)?
                .map_err(Error::new)
        }
    }

    #[async_trait]
    impl Broadcaster for BitcoindSyncer {
        type Transaction = bitcoin::Transaction;
        type TxId = bitcoin::Txid;

        async fn publish(&self, tx: &bitcoin::Transaction) -> Result<bitcoin::Txid, Error> {
            let tx = tx.clone();
            let client = Arc::clone(&self.client);
            tokio::task::spawn_blocking(move || client.send_raw_transaction(&tx))
                .await
                .map_err(Error::new)?
                .map_err(|e| match e {
                    // the node refused the transaction, other errors are transport errors
                    bitcoincore_rpc::Error::JsonRpc(bitcoincore_rpc::jsonrpc::Error::Rpc(
                        rpc_error,
                    )) => Error::Rejected(rpc_error.message),
                    e => Error::new(e),
                })
        }
    }

    #[async_trait]
    impl ChainClock for BitcoindSyncer {
        async fn current_height(&self) -> Result<u32, Error> {
            let height = self.call(|client| client.get_block_count()).await?;
            u32::try_from(height).map_err(Error::new)
        }

        async fn median_time_past(&self) -> Result<u32, Error> {
            let info = self
                .call(|client| client.get_blockchain_info())
                .await?;
            u32::try_from(info.median_time).map_err(Error::new)
        }
    }
}
