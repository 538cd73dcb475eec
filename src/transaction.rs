//! Transactions of the swap protocol on a script-based blockchain. A contract is funded by the
//! `funding` transaction, which creates the contract output, then consumed exactly once either by
//! the `redeem` transaction revealing the secret or by the `refund` transaction after the lock
//! time.
//!
//! ```text
//!              ┌─────────────┐
//!              │  funding    │
//!              └──────┬──────┘
//!                     │ contract output
//!          ┌──────────┴──────────┐
//!   ┌──────┴──────┐       ┌──────┴──────┐
//!   │   redeem    │       │   refund    │
//!   │ (secret)    │       │ (lock time) │
//!   └─────────────┘       └─────────────┘
//! ```

use std::error;
use std::fmt::Debug;
use std::io;

use thiserror::Error;

use crate::blockchain::{Address, Asset, Htlc, Onchain};
use crate::consensus::{self, Decodable, Encodable};
use crate::crypto::{Keys, Signatures};
use crate::script::ScriptPath;
use crate::secret::{Secret, SecretHash};

/// A list specifying general categories of transaction error.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing UTXO.
    #[error("Missing UTXO")]
    MissingUTXO,
    /// Missing signature data.
    #[error("Missing signature")]
    MissingSignature,
    /// Missing the secret needed to redeem.
    #[error("Missing secret")]
    MissingSecret,
    /// The secret does not hash to the contract secret hash.
    #[error("The secret does not match the contract secret hash")]
    InvalidSecret,
    /// Missing the contract script for an input.
    #[error("Missing contract script")]
    MissingContract,
    /// Missing public key in the partial transaction.
    #[error("Public key not found in the partial transaction")]
    MissingPublicKey,
    /// The public key does not match the key required by the output.
    #[error("The public key does not match the key locking the output")]
    InvalidPublicKey,
    /// The targeted amount is invalid.
    #[error("The targeted amount is invalid")]
    InvalidTargetAmount,
    /// Not enough assets to create the transaction.
    #[error("Not enough assets to create the transaction")]
    NotEnoughAssets,
    /// Wrong transaction template.
    #[error("Wrong transaction template: {0}")]
    WrongTemplate(&'static str),
    /// The transaction chain validation failed
    #[error("The transaction chain validation failed")]
    InvalidTransactionChain,
    /// Any transaction error not part of this list.
    #[error("Transaction error: {0}")]
    Other(Box<dyn error::Error + Send + Sync>),
}

impl Error {
    /// Creates a new transaction error of type other with an arbitrary payload.
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

/// Base trait for swap transactions built by the library.
pub trait Transaction<T, O>: Debug
where
    T: Asset + Onchain,
    Self: Sized,
{
    /// Returns a reference to the inner partial transaction data.
    fn as_partial(&self) -> &T::PartialTransaction;

    /// Returns a mutable reference to the inner partial transaction data.
    fn as_partial_mut(&mut self) -> &mut T::PartialTransaction;

    /// Extract the transaction in the defined partial format.
    fn to_partial(self) -> T::PartialTransaction;

    /// Returns the metadata that identifies the output this transaction is build on top.
    fn based_on(&self) -> O;

    /// Returns the output amount of the transaction.
    fn output_amount(&self) -> T::AssetUnit;
}

/// Defines the transaction labels for logging and persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[display(Debug)]
pub enum TxLabel {
    /// Represents the transaction funding the contract output.
    Funding,
    /// Represents the happy path, revealing the secret to claim the contract output.
    Redeem,
    /// Represents the failure path, returning the funds to their owner after the lock time.
    Refund,
}

impl Encodable for TxLabel {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        match self {
            TxLabel::Funding => 0x01u16.consensus_encode(writer),
            TxLabel::Redeem => 0x02u16.consensus_encode(writer),
            TxLabel::Refund => 0x03u16.consensus_encode(writer),
        }
    }
}

impl Decodable for TxLabel {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        match Decodable::consensus_decode(d)? {
            0x01u16 => Ok(TxLabel::Funding),
            0x02u16 => Ok(TxLabel::Redeem),
            0x03u16 => Ok(TxLabel::Refund),
            _ => Err(consensus::Error::UnknownType),
        }
    }
}

impl_strict_encoding!(TxLabel);

/// Transaction that requires the participant to sign and add its witness before finalizing the
/// transaction.
pub trait Witnessable<T>
where
    T: Signatures,
    Self: Sized,
{
    /// Generate the witness message, given the script path, to be signed to create a valid
    /// transaction.
    fn generate_witness_message(&self, path: ScriptPath) -> Result<T::Message, Error>;

    /// Add a signature to the transaction and store it internally for later usage.
    fn add_witness(&mut self, pubkey: T::PublicKey, sig: T::Signature) -> Result<(), Error>;
}

/// Define a transaction that must have a finalization step.
pub trait Finalizable {
    /// Finalize the internal transaction and make it ready for extraction.
    fn finalize(&mut self) -> Result<(), Error>;
}

/// Define a transaction broadcastable by the system.
pub trait Broadcastable<T>: Finalizable
where
    T: Onchain,
    Self: Sized,
{
    /// Extract the finalized transaction and return a fully signed transaction type as defined in
    /// the blockchain. Used before broadcasting the transaction on-chain.
    fn extract(&self) -> T::Transaction;

    /// Finalize the internal transaction and extract it, ready to be broadcasted.
    fn finalize_and_extract(&mut self) -> Result<T::Transaction, Error> {
        self.finalize()?;
        Ok(self.extract())
    }
}

/// Implemented by transactions that can be link to form chains of logic. A linkable transaction
/// can provide the data needed for other transaction to safely build on top of it.
///
/// `O`, the returned type of the consumable output, used to reference the funds and chain other
/// transactions on it. This must contain all necessary data to latter create a valid unlocking
/// script for the output.
pub trait Linkable<O>
where
    Self: Sized,
{
    /// Return the consumable output of this transaction.
    fn get_consumable_output(&self) -> Result<O, Error>;
}

/// Implemented by transactions based on another transaction. This trait is auto implemented for
/// all type `U` that implements `Transaction<T, O>` when `O` is `Eq`.
pub trait Chainable<T, O>: Transaction<T, O>
where
    T: Asset + Onchain,
    O: Eq,
    Self: Sized,
{
    /// Verifies that the transaction build on top of the previous transaction.
    fn is_build_on_top_of(&self, prev: &impl Linkable<O>) -> Result<(), Error> {
        match self.based_on() == prev.get_consumable_output()? {
            true => Ok(()),
            false => Err(Error::InvalidTransactionChain),
        }
    }
}

impl<U, T, O> Chainable<T, O> for U
where
    T: Asset + Onchain,
    O: Eq,
    U: Transaction<T, O> + Sized,
{
}

/// Represent the funding transaction, spending wallet inputs owned by the participant to create
/// the contract output. Its consumable output is the contract output.
pub trait Fundable<T, O>: Transaction<T, O> + Broadcastable<T> + Linkable<O>
where
    T: Asset + Onchain + Address + Htlc + Signatures,
    Self: Sized,
{
    /// Creates a new funding transaction spending the `inputs` to lock `target_amount` in the
    /// contract, and returning the change to `change_target`. The fee is set later with the fee
    /// strategy.
    fn initialize(
        inputs: Vec<O>,
        contract: &T::Contract,
        target_amount: T::AssetUnit,
        change_target: T::Address,
    ) -> Result<Self, Error>;

    /// Verifies that the transaction locks the target amount in the given contract.
    fn verify_template(
        &self,
        contract: &T::Contract,
        target_amount: T::AssetUnit,
    ) -> Result<(), Error>;

    /// Generate the message to sign for each input.
    fn generate_input_messages(&self) -> Result<Vec<T::Message>, Error>;

    /// Add the signature for the input at `index`.
    fn add_input_witness(
        &mut self,
        index: usize,
        pubkey: T::PublicKey,
        sig: T::Signature,
    ) -> Result<(), Error>;

    /// Return the transaction label.
    fn get_id(&self) -> TxLabel {
        TxLabel::Funding
    }
}

/// Represent the redeem transaction, consuming the contract output through the secret path and
/// sending the funds to the recipient. Broadcasting it reveals the secret on-chain.
pub trait Redeemable<T, O>:
    Transaction<T, O> + Broadcastable<T> + Witnessable<T> + Chainable<T, O>
where
    T: Asset + Onchain + Address + Htlc + Signatures,
    O: Eq,
    Self: Sized,
{
    /// Creates a new redeem transaction consuming the contract output `prev` and sending the
    /// funds to `destination_target`.
    fn initialize(
        prev: &impl Linkable<O>,
        contract: &T::Contract,
        destination_target: T::Address,
    ) -> Result<Self, Error>;

    /// Add the secret revealed in the unlocking script.
    fn add_secret(&mut self, secret: Secret) -> Result<(), Error>;

    /// Verifies that the transaction is compliant with the protocol requirements and pays the
    /// destination address.
    fn verify_template(&self, destination_target: T::Address) -> Result<(), Error>;

    /// Extract the secret revealed in a redeem transaction observed on-chain, if any secret
    /// hashing to `secret_hash` is present.
    fn extract_secret(tx: &T::Transaction, secret_hash: &SecretHash) -> Option<Secret>;

    /// Return the transaction label.
    fn get_id(&self) -> TxLabel {
        TxLabel::Redeem
    }
}

/// Represent the refund transaction, consuming the contract output through the timelocked path
/// and returning the funds to the original owner. Valid only after the contract lock time.
pub trait Refundable<T, O>:
    Transaction<T, O> + Broadcastable<T> + Witnessable<T> + Chainable<T, O>
where
    T: Asset + Onchain + Address + Htlc + Signatures + Keys,
    O: Eq,
    Self: Sized,
{
    /// Creates a new refund transaction consuming the contract output `prev` and sending the
    /// funds back to `refund_target`.
    fn initialize(
        prev: &impl Linkable<O>,
        contract: &T::Contract,
        refund_target: T::Address,
    ) -> Result<Self, Error>;

    /// Verifies that the transaction is compliant with the protocol requirements, enables the
    /// lock time, and pays the refund address.
    fn verify_template(&self, refund_target: T::Address) -> Result<(), Error>;

    /// Return the transaction label.
    fn get_id(&self) -> TxLabel {
        TxLabel::Refund
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{deserialize, serialize};

    #[test]
    fn encode_labels() {
        assert_eq!(serialize(&TxLabel::Refund), vec![0x03, 0x00]);
        assert_eq!(
            deserialize::<TxLabel>(&[0x02, 0x00]).unwrap(),
            TxLabel::Redeem
        );
        assert!(deserialize::<TxLabel>(&[0x04, 0x00]).is_err());
        assert_eq!(TxLabel::Funding.to_string(), "Funding");
    }

    #[test]
    fn wrap_inner_error() {
        let err = Error::new("boom");
        assert_eq!(err.to_string(), "Transaction error: boom");
        assert!(err.into_inner().is_some());
        assert!(Error::MissingUTXO.into_inner().is_none());
    }
}
