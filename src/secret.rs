//! Generation, hashing and verification of the swap secret.
//!
//! The secret is a 32 bytes random value known only by the initiator until it redeems, the secret
//! hash is `RIPEMD160(secret)` and is embedded in the contracts of both ledgers.
//!
//! ```rust
//! use atomicswap_core::secret::{self, Secret};
//!
//! let (secret, secret_hash) = secret::generate_secret();
//! assert!(secret::verify(&secret, &secret_hash));
//! assert!(!secret::verify(&Secret::generate(), &secret_hash));
//! ```

use std::convert::TryFrom;
use std::fmt;
use std::io;
use std::str::FromStr;

use bitcoin::hashes::{ripemd160, Hash};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::ser::{Serialize, Serializer};
use serde::{de, Deserialize, Deserializer};
use thiserror::Error;

use crate::consensus::{self, CanonicalBytes, Decodable, Encodable};

/// Errors when parsing a secret or a secret hash.
#[derive(Error, Debug, PartialEq)]
pub enum Error {
    /// The value does not have the expected length.
    #[error("Invalid field length: expected {expected} bytes, found {found}")]
    InvalidFieldLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        found: usize,
    },
    /// The value is not valid hex.
    #[error("Hex decoding error: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// The swap secret, 32 random bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Secret([u8; Secret::LENGTH]);

/// The hash of the swap secret, `RIPEMD160(secret)`, checked by `OP_RIPEMD160` in contracts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SecretHash([u8; SecretHash::LENGTH]);

impl Secret {
    /// Length in bytes of a secret.
    pub const LENGTH: usize = 32;

    /// Generate a new secret from the operating system random source.
    pub fn generate() -> Self {
        let mut bytes = [0u8; Self::LENGTH];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Compute the secret hash committed in the contracts.
    pub fn hash(&self) -> SecretHash {
        SecretHash(ripemd160::Hash::hash(&self.0).into_inner())
    }

    /// Return the raw secret bytes.
    pub fn as_bytes(&self) -> &[u8; Self::LENGTH] {
        &self.0
    }
}

impl SecretHash {
    /// Length in bytes of a secret hash.
    pub const LENGTH: usize = 20;

    /// Return the raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; Self::LENGTH] {
        &self.0
    }
}

/// Produce a fresh secret and its hash.
pub fn generate_secret() -> (Secret, SecretHash) {
    let secret = Secret::generate();
    let hash = secret.hash();
    (secret, hash)
}

/// Hash a secret.
pub fn hash(secret: &Secret) -> SecretHash {
    secret.hash()
}

/// Verify that a revealed secret matches the expected hash. A secret must never be trusted before
/// passing this check.
pub fn verify(secret: &Secret, expected: &SecretHash) -> bool {
    secret.hash() == *expected
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

macro_rules! impl_fixed_bytes {
    ($name: ident, $expecting: expr) => {
        impl From<[u8; $name::LENGTH]> for $name {
            fn from(bytes: [u8; $name::LENGTH]) -> Self {
                $name(bytes)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = Error;

            fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
                if bytes.len() != $name::LENGTH {
                    return Err(Error::InvalidFieldLength {
                        expected: $name::LENGTH,
                        found: bytes.len(),
                    });
                }
                let mut data = [0u8; $name::LENGTH];
                data.copy_from_slice(bytes);
                Ok($name(data))
            }
        }

        impl fmt::LowerHex for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(&self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::LowerHex::fmt(self, f)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = hex::decode(s)?;
                Self::try_from(bytes.as_slice())
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&format!("{:x}", self))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<$name, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                $name::from_str(&s).map_err(|_| {
                    de::Error::invalid_value(de::Unexpected::Str(&s), &$expecting)
                })
            }
        }

        impl CanonicalBytes for $name {
            fn as_canonical_bytes(&self) -> Vec<u8> {
                self.0.to_vec()
            }

            fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, consensus::Error>
            where
                Self: Sized,
            {
                Self::try_from(bytes).map_err(consensus::Error::new)
            }
        }

        impl Encodable for $name {
            fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
                self.0.consensus_encode(writer)
            }
        }

        impl Decodable for $name {
            fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
                Ok($name(Decodable::consensus_decode(d)?))
            }
        }

        impl_strict_encoding!($name);
    };
}

impl_fixed_bytes!(Secret, "a hex encoded 32 bytes secret");
impl_fixed_bytes!(SecretHash, "a hex encoded 20 bytes hash");
