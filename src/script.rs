//! Errors and data structures shared by the contract script codec and validator. A contract has
//! two spending paths: the redeem path, unlocked with the secret and the recipient key, and the
//! refund path, unlocked after the lock time with the refund key.

use thiserror::Error;

/// Contract parsing and validation errors. Any of these errors is fatal for the swap attempt: the
/// contract comes from a malicious or incompatible counter-party and funds must never be
/// committed against it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A pushed field does not have the length expected by the contract template.
    #[error("Invalid field length at position {position}: expected {expected} bytes, found {found}")]
    InvalidFieldLength {
        /// Position of the field in the contract template, zero-based.
        position: usize,
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        found: usize,
    },
    /// The lock time value is out of range.
    #[error("Invalid lock time {0}")]
    InvalidLockTime(i64),
    /// The script does not follow the atomic swap contract template.
    #[error("Not an atomic swap script, position {position}: {reason}")]
    NotAnAtomicSwapScript {
        /// Position of the first token not matching the template, zero-based.
        position: usize,
        /// What the template expected at that position.
        reason: &'static str,
    },
}

/// Define the path selected when spending a contract output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[display(Debug)]
pub enum ScriptPath {
    /// The path revealing the secret, selects the `IF` branch.
    Redeem,
    /// The timelocked path, selects the `ELSE` branch.
    Refund,
}

impl ScriptPath {
    /// Return the value pushed on the stack to select the branch of the contract.
    pub fn selector(&self) -> i64 {
        match self {
            Self::Redeem => 1,
            Self::Refund => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_errors() {
        let err = Error::InvalidFieldLength {
            position: 2,
            expected: 20,
            found: 19,
        };
        assert_eq!(
            err.to_string(),
            "Invalid field length at position 2: expected 20 bytes, found 19"
        );
        assert_eq!(Error::InvalidLockTime(0).to_string(), "Invalid lock time 0");
        assert_eq!(ScriptPath::Refund.to_string(), "Refund");
        assert_eq!(ScriptPath::Redeem.selector(), 1);
    }
}
