//! Cryptographic primitives used to authorize spending of contract outputs: signature generation
//! and verification over transaction messages.
//!
//! Secret generation and hashing live in [`crate::secret`], they are shared by all the ledgers
//! taking part in a swap.

use std::error;

use thiserror::Error;

/// List of cryptographic errors that can be encountered when signing or verifying.
#[derive(Error, Debug)]
pub enum Error {
    /// The key does not exists or is missing.
    #[error("The key does not exists or is missing")]
    MissingKey,
    /// The public key is not valid.
    #[error("The public key is not valid")]
    InvalidPublicKey,
    /// The signature does not pass the validation tests.
    #[error("The signature does not pass the validation")]
    InvalidSignature,
    /// Any cryptographic error not part of this list.
    #[error("Cryptographic error: {0}")]
    Other(Box<dyn error::Error + Send + Sync>),
}

impl Error {
    /// Creates a new cryptographic error of type [`Self::Other`] with an arbitrary payload.
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

/// Defines the public key type used to identify a participant on the blockchain.
pub trait Keys {
    /// Public key type.
    type PublicKey: Clone + PartialEq + std::fmt::Debug;
}

/// Defines the message and signature types used to authorize a spending.
pub trait Signatures: Keys {
    /// Type of message that can be signed, e.g. a signature hash.
    type Message: Clone + std::fmt::Debug;

    /// Signature type for the message.
    type Signature: Clone + std::fmt::Debug;
}

/// Signature generator and verifier. Produce and verify signatures with the key owned by the
/// participant.
pub trait Sign<PublicKey, Message, Signature> {
    /// Return the public key of the signing key.
    fn get_pubkey(&self) -> PublicKey;

    /// Sign the message with the private key.
    fn sign(&self, msg: Message) -> Result<Signature, Error>;

    /// Verify a signature for a given message with the provided public key.
    fn verify_signature(&self, key: &PublicKey, msg: Message, sig: &Signature)
        -> Result<(), Error>;
}
