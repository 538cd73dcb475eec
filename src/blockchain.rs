//! Defines the interface a blockchain must implement to take part in a swap: the network it runs
//! on, the transaction types it uses onchain, and how fees are set and validated on its
//! transactions.

use std::error;
use std::fmt::{self, Debug};
use std::io;
use std::str::FromStr;

use thiserror::Error;

use crate::consensus::{self, deserialize, serialize, CanonicalBytes, Decodable, Encodable};

/// Defines the types a blockchain needs to interact onchain, i.e. the transaction types.
pub trait Onchain {
    /// Defines the transaction format used while building and signing, before finalization.
    type PartialTransaction;

    /// Defines the finalized transaction format for the blockchain.
    type Transaction;
}

/// Defines the native amount unit of the blockchain asset.
pub trait Asset {
    /// Type for the swapped asset amount.
    type AssetUnit: Copy + Debug + PartialOrd + CanonicalBytes;
}

/// Defines the address format used to receive funds on the blockchain.
pub trait Address {
    /// Defines the address format.
    type Address: Clone + Debug + CanonicalBytes;
}

/// Defines the type of timelock used in contracts.
pub trait Timelock {
    /// Defines the timelock format.
    type Timelock: Copy + Debug + PartialOrd;
}

/// Defines the contract binding the secret hash, the two participants and the timelock on the
/// blockchain.
pub trait Htlc: Timelock {
    /// Defines the contract data.
    type Contract: Clone + Debug;
}

/// A fee strategy to be applied on a transaction. A fee strategy can be fixed or, with the
/// `fee_range` feature, a range of acceptable rates.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeStrategy<T> {
    /// A fixed strategy with the exact rate to set.
    Fixed(T),
    /// A range with a minimum and maximum (inclusive) possible rates.
    #[cfg(feature = "fee_range")]
    Range {
        /// Minimum rate, inclusive.
        min_inc: T,
        /// Maximum rate, inclusive.
        max_inc: T,
    },
}

impl<T> FeeStrategy<T>
where
    T: Copy + PartialOrd,
{
    /// Return the rate to use given the priority.
    #[allow(unused_variables)]
    pub fn rate(&self, priority: FeePriority) -> T {
        match self {
            Self::Fixed(rate) => *rate,
            #[cfg(feature = "fee_range")]
            Self::Range { min_inc, max_inc } => match priority {
                FeePriority::Low => *min_inc,
                FeePriority::High => *max_inc,
            },
        }
    }

    /// Check if a given rate is acceptable under the strategy.
    pub fn check(&self, rate: &T) -> bool {
        match self {
            Self::Fixed(fee_rate) => fee_rate == rate,
            #[cfg(feature = "fee_range")]
            Self::Range { min_inc, max_inc } => rate >= min_inc && rate <= max_inc,
        }
    }
}

impl<T> fmt::Display for FeeStrategy<T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(rate) => write!(f, "Fixed: {}", rate),
            #[cfg(feature = "fee_range")]
            Self::Range { min_inc, max_inc } => write!(f, "Range: {} - {}", min_inc, max_inc),
        }
    }
}

impl<T> FromStr for FeeStrategy<T>
where
    T: FromStr,
{
    type Err = consensus::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // range parsing not implemented
        let s = s.trim_start_matches("Fixed:").trim();
        match s.parse::<T>() {
            Ok(x) => Ok(Self::Fixed(x)),
            Err(_) => Err(consensus::Error::ParseFailed("Failed parsing FeeStrategy")),
        }
    }
}

impl<T> Encodable for FeeStrategy<T>
where
    T: CanonicalBytes,
{
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        match self {
            Self::Fixed(rate) => {
                let len = 0x01u8.consensus_encode(writer)?;
                Ok(len + consensus::wrap_in_vec(rate, writer)?)
            }
            #[cfg(feature = "fee_range")]
            Self::Range { min_inc, max_inc } => {
                let mut len = 0x02u8.consensus_encode(writer)?;
                len += consensus::wrap_in_vec(min_inc, writer)?;
                Ok(len + consensus::wrap_in_vec(max_inc, writer)?)
            }
        }
    }
}

impl<T> Decodable for FeeStrategy<T>
where
    T: CanonicalBytes,
{
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        match Decodable::consensus_decode(d)? {
            0x01u8 => Ok(Self::Fixed(consensus::unwrap_from_vec(d)?)),
            #[cfg(feature = "fee_range")]
            0x02u8 => {
                let min_inc = consensus::unwrap_from_vec(d)?;
                let max_inc = consensus::unwrap_from_vec(d)?;
                Ok(Self::Range { min_inc, max_inc })
            }
            _ => Err(consensus::Error::UnknownType),
        }
    }
}

/// Define the type of errors a fee strategy can encounter during calculation, application, and
/// validation of fees on a partial transaction.
#[derive(Error, Debug)]
pub enum FeeStrategyError {
    /// Missing metadata on inputs to retrieve the amount available.
    #[error("Missing metadata on inputs to retrieve the amount available")]
    MissingInputsMetadata,
    /// Fee amount is too high.
    #[error("Fee amount is too high")]
    AmountOfFeeTooHigh,
    /// Not enough assets to cover the fees.
    #[error("Not enough assets to cover the fees")]
    NotEnoughAssets,
    /// Any fee strategy error not part of this list.
    #[error("Fee strategy error: {0}")]
    Other(Box<dyn error::Error + Send + Sync>),
}

impl FeeStrategyError {
    /// Creates a new fee strategy error of type other with an arbitrary payload.
    pub fn new<E>(error: E) -> Self
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        Self::Other(error.into())
    }

    /// Consumes the `FeeStrategyError`, returning its inner error (if any).
    pub fn into_inner(self) -> Option<Box<dyn error::Error + Send + Sync>> {
        match self {
            Self::Other(error) => Some(error),
            _ => None,
        }
    }
}

/// Defines how to set the fees when a strategy allows multiple possibilities.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Display, Serialize, Deserialize)]
#[display(Debug)]
pub enum FeePriority {
    /// Set the fees at the minimum allowed by the strategy.
    Low,
    /// Set the fees at the maximum allowed by the strategy.
    High,
}

impl FromStr for FeePriority {
    type Err = consensus::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" | "low" => Ok(FeePriority::Low),
            "High" | "high" => Ok(FeePriority::High),
            _ => Err(consensus::Error::UnknownType),
        }
    }
}

impl Encodable for FeePriority {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        match self {
            FeePriority::Low => 0x01u8.consensus_encode(writer),
            FeePriority::High => 0x02u8.consensus_encode(writer),
        }
    }
}

impl Decodable for FeePriority {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        match Decodable::consensus_decode(d)? {
            0x01u8 => Ok(FeePriority::Low),
            0x02u8 => Ok(FeePriority::High),
            _ => Err(consensus::Error::UnknownType),
        }
    }
}

/// Enable fee management on a transaction: given a strategy and a priority compute the fee,
/// apply it on the transaction, and validate it later.
pub trait Fee {
    /// Type for describing the fee rate of a blockchain.
    type FeeUnit;

    /// Type for the amount of fee paid.
    type Amount;

    /// Calculates and sets the fee on the given transaction and return the amount of fee set in
    /// the blockchain native amount format.
    fn set_fee(
        &mut self,
        strategy: &FeeStrategy<Self::FeeUnit>,
        priority: FeePriority,
    ) -> Result<Self::Amount, FeeStrategyError>;

    /// Validates that the fee for the given transaction is set accordingly to the strategy.
    fn validate_fee(&self, strategy: &FeeStrategy<Self::FeeUnit>)
        -> Result<bool, FeeStrategyError>;
}

/// Defines a blockchain network, identifies in which context the system interacts with the
/// blockchain.
#[derive(
    Copy, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Debug, Display, Serialize, Deserialize,
)]
#[display(Debug)]
pub enum Network {
    /// Represents a real asset on his valuable network.
    Mainnet,
    /// Represents non-valuable assets on test networks.
    Testnet,
    /// Local and private testnets.
    Local,
}

impl FromStr for Network {
    type Err = consensus::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Mainnet" | "mainnet" => Ok(Network::Mainnet),
            "Testnet" | "testnet" => Ok(Network::Testnet),
            "Local" | "local" => Ok(Network::Local),
            _ => Err(consensus::Error::UnknownType),
        }
    }
}

impl Encodable for Network {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        match self {
            Network::Mainnet => 0x01u8.consensus_encode(writer),
            Network::Testnet => 0x02u8.consensus_encode(writer),
            Network::Local => 0x03u8.consensus_encode(writer),
        }
    }
}

impl Decodable for Network {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        match Decodable::consensus_decode(d)? {
            0x01u8 => Ok(Network::Mainnet),
            0x02u8 => Ok(Network::Testnet),
            0x03u8 => Ok(Network::Local),
            _ => Err(consensus::Error::UnknownType),
        }
    }
}

impl CanonicalBytes for Network {
    fn as_canonical_bytes(&self) -> Vec<u8> {
        serialize(self)
    }

    fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, consensus::Error>
    where
        Self: Sized,
    {
        deserialize(bytes)
    }
}

impl_strict_encoding!(Network);
impl_strict_encoding!(FeePriority);
