//! Absolute timelock unit and encoding used in contract scripts with `OP_CHECKLOCKTIMEVERIFY` and
//! in the `nLockTime` field of refund transactions.

use crate::consensus::{self, CanonicalBytes};
use crate::script;

use std::convert::TryFrom;
use std::fmt::Debug;
use std::str::FromStr;

/// Values below this threshold are block heights, values above are UNIX timestamps.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Width of the lock time push in contract scripts, the native `nLockTime` field width.
pub const LOCKTIME_PUSH_WIDTH: usize = 4;

/// Smallest lock time whose fixed width push is a minimal script number.
const MINIMAL_PUSH_THRESHOLD: u32 = 0x80_0000;

/// An `OP_CLTV` value (32-bits integer) to use in contracts and refund transactions. The value is
/// strictly positive and fits in a positive 4 bytes script number.
#[derive(
    PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Debug, Copy, Display, Serialize, Deserialize,
)]
#[display(display_cltv)]
#[serde(try_from = "u32", into = "u32")]
pub struct CltvLockTime(u32);

fn display_cltv(lock_time: &CltvLockTime) -> String {
    match lock_time.is_height() {
        true => format!("block {}", lock_time.0),
        false => format!("timestamp {}", lock_time.0),
    }
}

/// The unit of a lock time, block height or timestamp.
#[derive(PartialEq, Eq, Clone, Debug, Copy)]
pub enum LockTimeUnit {
    /// The lock time is a block height.
    Height,
    /// The lock time is a UNIX timestamp compared against the median time past.
    Timestamp,
}

impl CltvLockTime {
    /// Largest value encodable as a positive 4 bytes script number.
    pub const MAX: u32 = 0x7fff_ffff;

    /// Create a new lock time, fails if the value is zero or does not fit in a positive 4 bytes
    /// script number.
    pub fn new(lock_time: u32) -> Result<Self, script::Error> {
        match lock_time {
            0 => Err(script::Error::InvalidLockTime(0)),
            x if x > Self::MAX => Err(script::Error::InvalidLockTime(x as i64)),
            x => Ok(Self(x)),
        }
    }

    /// Return the raw value.
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Return `true` if the lock time is a block height.
    pub fn is_height(&self) -> bool {
        self.0 < LOCKTIME_THRESHOLD
    }

    /// Return the unit of the lock time.
    pub fn unit(&self) -> LockTimeUnit {
        match self.is_height() {
            true => LockTimeUnit::Height,
            false => LockTimeUnit::Timestamp,
        }
    }

    /// Return the fixed width little-endian encoding pushed in contract scripts.
    ///
    /// Below 2^23 the push carries a trailing zero byte and is not a minimally encoded script
    /// number, e.g. height 500000 is pushed as `20a10700`. Consensus accepts it, but nodes
    /// enforcing the `MINIMALDATA` standardness rule refuse to relay a refund executing
    /// `OP_CHECKLOCKTIMEVERIFY` on it. See [`CltvLockTime::is_minimal_push`].
    pub fn to_push_bytes(&self) -> [u8; LOCKTIME_PUSH_WIDTH] {
        self.0.to_le_bytes()
    }

    /// Return `true` if [`CltvLockTime::to_push_bytes`] is also the minimal script number
    /// encoding, always the case for timestamps.
    pub fn is_minimal_push(&self) -> bool {
        self.0 >= MINIMAL_PUSH_THRESHOLD
    }

    /// Decode a lock time pushed in a script as a little-endian script number of 1 to 5 bytes.
    /// Negative, zero or out of range values are invalid.
    pub fn from_push_bytes(bytes: &[u8]) -> Result<Self, script::Error> {
        let value = read_scriptnum(bytes)?;
        if value <= 0 || value > Self::MAX as i64 {
            return Err(script::Error::InvalidLockTime(value));
        }
        Ok(Self(value as u32))
    }

    /// Return `true` if the lock time is expired given the current block height and median time
    /// past of the ledger.
    pub fn is_expired(&self, height: u32, median_time_past: u32) -> bool {
        match self.unit() {
            LockTimeUnit::Height => height >= self.0,
            LockTimeUnit::Timestamp => median_time_past >= self.0,
        }
    }
}

/// Decode a script number, little-endian with the sign bit on the most significant byte.
fn read_scriptnum(bytes: &[u8]) -> Result<i64, script::Error> {
    if bytes.is_empty() || bytes.len() > 5 {
        return Err(script::Error::InvalidLockTime(0));
    }
    let mut value: i64 = 0;
    for (i, byte) in bytes.iter().enumerate() {
        value |= (*byte as i64) << (8 * i);
    }
    let sign_bit = 0x80i64 << (8 * (bytes.len() - 1));
    if value & sign_bit != 0 {
        Ok(-(value & !sign_bit))
    } else {
        Ok(value)
    }
}

impl TryFrom<u32> for CltvLockTime {
    type Error = script::Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CltvLockTime> for u32 {
    fn from(lock_time: CltvLockTime) -> Self {
        lock_time.0
    }
}

impl FromStr for CltvLockTime {
    type Err = consensus::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let x = s
            .parse::<u32>()
            .map_err(|_| consensus::Error::ParseFailed("Failed parsing CLTV timelock"))?;
        Self::new(x).map_err(consensus::Error::new)
    }
}

impl CanonicalBytes for CltvLockTime {
    fn as_canonical_bytes(&self) -> Vec<u8> {
        bitcoin::consensus::encode::serialize(&self.0)
    }

    fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, consensus::Error>
    where
        Self: Sized,
    {
        let value: u32 =
            bitcoin::consensus::encode::deserialize(bytes).map_err(consensus::Error::new)?;
        Self::new(value).map_err(consensus::Error::new)
    }
}
