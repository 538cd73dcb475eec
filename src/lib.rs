//! Atomic swap core library
//!
//! Cross-chain atomic swaps between two parties using hashed-time-locked contracts (HTLC). A
//! swap binds two contracts, one on each blockchain, to the same secret hash: revealing the
//! secret to claim funds on one chain makes it public and lets the counter-party claim on the
//! other chain, while an absolute timelock lets each funder get its money back if the swap
//! stalls.
//!
//! The crate is organised as follow:
//!
//! - [`secret`]: generation, hashing and verification of the swap secret,
//! - [`bitcoin`]: the script-based ledger family, contract script construction and validation,
//!   fee estimation, and funding/redeem/refund transactions,
//! - [`transaction`]: traits describing the transactions of the protocol,
//! - [`swap`]: the protocol state machine and the two ledger engines (script and account based),
//! - [`syncer`], [`wallet`], [`store`]: interfaces to the external collaborators (broadcast,
//!   chain clock, coin selection, persistence).

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]

#[macro_use]
extern crate amplify;
#[macro_use]
extern crate serde;

use thiserror::Error;

#[macro_use]
pub mod consensus;

pub mod bitcoin;
pub mod blockchain;
pub mod config;
pub mod crypto;
pub mod role;
pub mod script;
pub mod secret;
pub mod store;
pub mod swap;
pub mod syncer;
pub mod transaction;
pub mod wallet;

/// A list of possible errors when performing an atomic swap.
///
/// Errors are grouped following their impact on the swap attempt:
///
/// - contract validation errors ([`Error::Script`], [`Error::UnsafeContract`]) are fatal and
///   must never be retried, they indicate a malicious or incompatible counter-party,
/// - [`Error::InsufficientFunds`] and [`Error::BroadcastRejected`] are transient and can be
///   retried with fresh inputs,
/// - [`Error::LockTimeNotReached`] is an expected precondition failure, retry later,
/// - [`Error::SecretMismatch`] is fatal, the secret must never authorize a redeem.
#[derive(Error, Debug)]
pub enum Error {
    /// The contract script is invalid or not an atomic swap contract.
    #[error("Contract error: {0}")]
    Script(#[from] script::Error),
    /// The wallet cannot provide enough funds.
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    /// The ledger refused the transaction.
    #[error("Broadcast rejected: {0}")]
    BroadcastRejected(String),
    /// The refund path is not available yet.
    #[error("Lock time {lock_time} not reached, current ledger time is {current}")]
    LockTimeNotReached {
        /// The contract lock time.
        lock_time: u64,
        /// The current ledger height or time, in the same unit as the lock time.
        current: u64,
    },
    /// The secret does not hash to the expected secret hash.
    #[error("The secret does not match the secret hash")]
    SecretMismatch,
    /// The requested operation is not allowed in the current swap phase.
    #[error("Operation {operation} not allowed in phase {phase}")]
    InvalidPhase {
        /// The operation attempted.
        operation: &'static str,
        /// The phase the swap is in.
        phase: swap::SwapPhase,
    },
    /// The operation is not allowed for the role of this participant.
    #[error("Operation {operation} not allowed for role {role}")]
    InvalidRole {
        /// The operation attempted.
        operation: &'static str,
        /// The role of the participant.
        role: role::SwapRole,
    },
    /// The participant timelock must expire before the initiator timelock.
    #[error("Participant lock time {participant} must be lower than initiator lock time {initiator}")]
    UnsafeLockTime {
        /// The lock time asked for the participant contract.
        participant: u64,
        /// The lock time of the initiator contract.
        initiator: u64,
    },
    /// The counter-party contract is well formed but cannot be redeemed by the local party.
    #[error("Unsafe counter-party contract: {0}")]
    UnsafeContract(&'static str),
    /// A collaborator failed.
    #[error("Collaborator error: {0}")]
    Collaborator(String),
    /// The secret or secret hash is malformed.
    #[error("Secret error: {0}")]
    Secret(#[from] secret::Error),
    /// A cryptographic error.
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] crypto::Error),
    /// A transaction error.
    #[error("Transaction error: {0}")]
    Transaction(#[from] transaction::Error),
    /// A fee strategy error.
    #[error("Fee strategy error: {0}")]
    Fee(#[from] blockchain::FeeStrategyError),
    /// A consensus encoding error.
    #[error("Consensus error: {0}")]
    Consensus(#[from] consensus::Error),
    /// A persistence error.
    #[error("Store error: {0}")]
    Store(#[from] store::Error),
}

impl Error {
    /// Returns `true` when the failure is transient and the same operation can safely be
    /// attempted again later without changing the contract.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientFunds(_)
                | Self::BroadcastRejected(_)
                | Self::LockTimeNotReached { .. }
                | Self::Collaborator(_)
        )
    }
}

/// Result of a swap operation.
pub type Res<T> = Result<T, Error>;
