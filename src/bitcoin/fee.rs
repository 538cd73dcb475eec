// Copyright 2021-2022 Farcaster Devs
//
// This library is free software; you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public
// License as published by the Free Software Foundation; either
// version 3 of the License, or (at your option) any later version.
//
// This library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this library; if not, write to the Free Software
// Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301, USA

//! Transaction fee unit type and implementation. Defines the [`SatPerKvB`] unit used in methods
//! that set the fee and check the fee on transactions given a [`FeeStrategy`] and a
//! [`FeePriority`].
//!
//! ```rust
//! use atomicswap_core::bitcoin::fee::SatPerKvB;
//!
//!# fn main() -> Result<(), atomicswap_core::consensus::Error> {
//! // Parse a Bitcoin amount suffixed with '/kvB'
//! let rate = "100 satoshi/kvB".parse::<SatPerKvB>()?;
//! // ...also work with any other valid Bitcoin denomination
//! let rate = "0.000001 BTC/kvB".parse::<SatPerKvB>()?;
//!
//! // Always displayed as 'statoshi/kvB'
//! assert_eq!("100 satoshi/kvB", format!("{}", rate));
//!# Ok(())
//!# }
//! ```

use bitcoin::consensus::encode::VarInt;
use bitcoin::util::amount::Denomination;
use bitcoin::Amount;

use crate::bitcoin::transaction::funding::{Funding, CONTRACT_OUTPUT_INDEX};
use crate::bitcoin::transaction::{self, Redeem, Refund, SubTransaction, Tx};
use crate::bitcoin::DUST_LIMIT;
use crate::blockchain::{Fee, FeePriority, FeeStrategy, FeeStrategyError};
use crate::consensus::{self, CanonicalBytes};

use std::str::FromStr;

use serde::ser::{Serialize, Serializer};
use serde::{de, Deserialize, Deserializer};

/// The unit used to mesure a quantity, or weight, for a Bitcoin transaction. This represent a
/// 1'000 of virtual Bytes.
pub const WEIGHT_UNIT: &str = "kvB";

/// Serialized size of a pay-to-pubkey-hash output: value, script length and script.
pub const P2PKH_OUTPUT_SIZE: usize = 8 + 1 + 25;
/// Serialized size of a pay-to-script-hash output: value, script length and script.
pub const P2SH_OUTPUT_SIZE: usize = 8 + 1 + 23;
/// Upper bound of a pay-to-pubkey-hash unlocking script: a signature and a compressed key push.
pub const P2PKH_SCRIPT_SIG_SIZE: usize =
    1 + transaction::MAX_SIG_LENGTH + 1 + transaction::PUBKEY_LENGTH;

/// An amount of Bitcoin (internally in satoshis) representing the number of satoshis per virtual
/// byte a transaction must use for its fee. A [`FeeStrategy`] can use one of more of this type
/// depending of its complexity (fixed, range, etc).
#[derive(Debug, Clone, Copy, PartialOrd, PartialEq, Hash, Eq, Display)]
#[display(display_sats_per_vbyte)]
pub struct SatPerKvB(Amount);

fn display_sats_per_vbyte(rate: &SatPerKvB) -> String {
    format!(
        "{}/{}",
        rate.as_native_unit()
            .to_string_with_denomination(Denomination::Satoshi),
        WEIGHT_UNIT
    )
}

impl SatPerKvB {
    /// Create a fee quantity per virtual byte of given satoshis.
    pub fn from_sat(satoshis: u64) -> Self {
        SatPerKvB(Amount::from_sat(satoshis))
    }

    /// Return the number of satoshis per virtual byte to use for calculating the fee.
    pub fn as_sat(&self) -> u64 {
        self.0.as_sat()
    }

    /// Create a fee quantity per virtual byte of given `bitcoin` crate amount.
    pub fn from_native_unit(amount: Amount) -> Self {
        SatPerKvB(amount)
    }

    /// Return the number of bitcoins per virtual byte to use for calculating the fee as the native
    /// `bitcoin` crate amount.
    pub fn as_native_unit(&self) -> Amount {
        self.0
    }
}

impl Serialize for SatPerKvB {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(format!("{}", self).as_ref())
    }
}

impl<'de> Deserialize<'de> for SatPerKvB {
    fn deserialize<D>(deserializer: D) -> Result<SatPerKvB, D::Error>
    where
        D: Deserializer<'de>,
    {
        SatPerKvB::from_str(&String::deserialize(deserializer)?).map_err(de::Error::custom)
    }
}

impl CanonicalBytes for SatPerKvB {
    fn as_canonical_bytes(&self) -> Vec<u8> {
        bitcoin::consensus::encode::serialize(&self.0.as_sat())
    }

    fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, consensus::Error>
    where
        Self: Sized,
    {
        Ok(SatPerKvB(Amount::from_sat(
            bitcoin::consensus::encode::deserialize(bytes).map_err(consensus::Error::new)?,
        )))
    }
}

impl FromStr for SatPerKvB {
    type Err = consensus::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s.split('/').collect::<Vec<&str>>();
        if parts.len() != 2 {
            return Err(consensus::Error::ParseFailed(
                "sat/kvB format is not respected",
            ));
        }
        let amount = parts[0].parse::<Amount>().map_err(consensus::Error::new)?;
        match parts[1] {
            WEIGHT_UNIT => Ok(Self(amount)),
            _ => Err(consensus::Error::ParseFailed("Weight unit parse failed")),
        }
    }
}

/// Compute the fee for a transaction of `size` bytes, rounded up to the next satoshi.
pub fn fee_for_size(rate: SatPerKvB, size: usize) -> Amount {
    let fee = (rate.as_sat() as u128 * size as u128 + 999) / 1000;
    Amount::from_sat(u64::try_from(fee).unwrap_or(u64::MAX))
}

/// Upper bound serialized size of a funding transaction spending `n_inputs` pay-to-pubkey-hash
/// outputs, with or without a change output.
pub fn funding_size(n_inputs: usize, with_change: bool) -> usize {
    let input_size = 32 + 4 + 1 + P2PKH_SCRIPT_SIG_SIZE + 4;
    let n_outputs = if with_change { 2 } else { 1 };
    let outputs_size = P2SH_OUTPUT_SIZE + if with_change { P2PKH_OUTPUT_SIZE } else { 0 };
    4 + VarInt(n_inputs as u64).len()
        + n_inputs * input_size
        + VarInt(n_outputs).len()
        + outputs_size
        + 4
}

/// Computes transaction fees from the estimated size of the transactions and a fee rate chosen
/// once from the strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeEstimator {
    rate: SatPerKvB,
}

impl FeeEstimator {
    /// Create an estimator using the rate given by the strategy for the priority.
    pub fn new(strategy: &FeeStrategy<SatPerKvB>, priority: FeePriority) -> Self {
        Self {
            rate: strategy.rate(priority),
        }
    }

    /// Create an estimator with a fixed rate.
    pub fn from_rate(rate: SatPerKvB) -> Self {
        Self { rate }
    }

    /// The fee rate used by the estimator.
    pub fn rate(&self) -> SatPerKvB {
        self.rate
    }

    /// Fee for a transaction of `size` bytes.
    pub fn fee_for_size(&self, size: usize) -> Amount {
        fee_for_size(self.rate, size)
    }

    /// Fee for a funding transaction, used to select the inputs before building it.
    pub fn funding_fee(&self, n_inputs: usize, with_change: bool) -> Amount {
        self.fee_for_size(funding_size(n_inputs, with_change))
    }

    /// Fee for the given transaction based on its upper bound size.
    pub fn estimate<T>(&self, tx: &Tx<T>) -> Result<Amount, FeeStrategyError>
    where
        T: SubTransaction,
    {
        let size = tx.estimated_size().map_err(FeeStrategyError::new)?;
        Ok(self.fee_for_size(size))
    }
}

/// Lower and upper bounds of the fee accepted by the strategy for a transaction of `size` bytes.
fn fee_bounds(strategy: &FeeStrategy<SatPerKvB>, size: usize) -> (Amount, Amount) {
    match strategy {
        FeeStrategy::Fixed(rate) => {
            let fee = fee_for_size(*rate, size);
            (fee, fee)
        }
        #[cfg(feature = "fee_range")]
        FeeStrategy::Range { min_inc, max_inc } => {
            (fee_for_size(*min_inc, size), fee_for_size(*max_inc, size))
        }
    }
}

fn effective_fee<T>(tx: &Tx<T>) -> Result<Amount, FeeStrategyError>
where
    T: SubTransaction,
{
    tx.partial
        .input_value()
        .checked_sub(tx.partial.output_value())
        .ok_or(FeeStrategyError::AmountOfFeeTooHigh)
}

/// Apply the fee on the single output of a transaction spending a contract.
fn set_spending_fee<T>(
    tx: &mut Tx<T>,
    strategy: &FeeStrategy<SatPerKvB>,
    priority: FeePriority,
) -> Result<Amount, FeeStrategyError>
where
    T: SubTransaction,
{
    if tx.partial.unsigned_tx.output.len() != 1 {
        return Err(FeeStrategyError::new(
            transaction::Error::MultiUTXOUnsuported,
        ));
    }

    let fee = FeeEstimator::new(strategy, priority).estimate(tx)?;
    let output = tx
        .partial
        .input_value()
        .checked_sub(fee)
        .ok_or(FeeStrategyError::NotEnoughAssets)?;
    if output.as_sat() < DUST_LIMIT {
        return Err(FeeStrategyError::NotEnoughAssets);
    }

    tx.partial.unsigned_tx.output[0].value = output.as_sat();
    Ok(fee)
}

fn validate_spending_fee<T>(
    tx: &Tx<T>,
    strategy: &FeeStrategy<SatPerKvB>,
) -> Result<bool, FeeStrategyError>
where
    T: SubTransaction,
{
    if tx.partial.unsigned_tx.output.len() != 1 {
        return Err(FeeStrategyError::new(
            transaction::Error::MultiUTXOUnsuported,
        ));
    }
    let effective = effective_fee(tx)?;
    let size = tx.estimated_size().map_err(FeeStrategyError::new)?;
    let (min, max) = fee_bounds(strategy, size);
    Ok(effective >= min && effective <= max)
}

impl Fee for Tx<Redeem> {
    type FeeUnit = SatPerKvB;

    type Amount = Amount;

    /// Calculates and sets the fees on the given transaction and return the fees set
    fn set_fee(
        &mut self,
        strategy: &FeeStrategy<SatPerKvB>,
        priority: FeePriority,
    ) -> Result<Amount, FeeStrategyError> {
        set_spending_fee(self, strategy, priority)
    }

    /// Validates that the fees for the given transaction are set accordingly to the strategy
    fn validate_fee(&self, strategy: &FeeStrategy<SatPerKvB>) -> Result<bool, FeeStrategyError> {
        validate_spending_fee(self, strategy)
    }
}

impl Fee for Tx<Refund> {
    type FeeUnit = SatPerKvB;

    type Amount = Amount;

    fn set_fee(
        &mut self,
        strategy: &FeeStrategy<SatPerKvB>,
        priority: FeePriority,
    ) -> Result<Amount, FeeStrategyError> {
        set_spending_fee(self, strategy, priority)
    }

    fn validate_fee(&self, strategy: &FeeStrategy<SatPerKvB>) -> Result<bool, FeeStrategyError> {
        validate_spending_fee(self, strategy)
    }
}

impl Fee for Tx<Funding> {
    type FeeUnit = SatPerKvB;

    type Amount = Amount;

    /// Sets the change output to the remaining value after the fee. If the change would be below
    /// the dust limit the change output is removed and its value goes to the fee. Return the
    /// fee paid by the transaction.
    fn set_fee(
        &mut self,
        strategy: &FeeStrategy<SatPerKvB>,
        priority: FeePriority,
    ) -> Result<Amount, FeeStrategyError> {
        let estimator = FeeEstimator::new(strategy, priority);
        let input = self.partial.input_value();
        let target = self
            .partial
            .unsigned_tx
            .output
            .get(CONTRACT_OUTPUT_INDEX)
            .map(|txout| Amount::from_sat(txout.value))
            .ok_or_else(|| FeeStrategyError::new(transaction::Error::MultiUTXOUnsuported))?;

        if self.partial.unsigned_tx.output.len() == 2 {
            let fee = estimator.estimate(self)?;
            let change = input.checked_sub(target).and_then(|v| v.checked_sub(fee));
            if let Some(change) = change.filter(|change| change.as_sat() >= DUST_LIMIT) {
                self.partial.unsigned_tx.output[1].value = change.as_sat();
                return Ok(fee);
            }
        }

        let mut without_change = self.clone();
        without_change.partial.unsigned_tx.output.truncate(1);
        let fee = estimator.estimate(&without_change)?;
        let available = input
            .checked_sub(target)
            .ok_or(FeeStrategyError::NotEnoughAssets)?;
        if available < fee {
            return Err(FeeStrategyError::NotEnoughAssets);
        }

        *self = without_change;
        Ok(available)
    }

    /// Validates the fee, when the change was absorbed the fee can exceed the expected fee by at
    /// most the dust limit and the cost of the change output.
    fn validate_fee(&self, strategy: &FeeStrategy<SatPerKvB>) -> Result<bool, FeeStrategyError> {
        let effective = effective_fee(self)?;
        let size = self.estimated_size().map_err(FeeStrategyError::new)?;
        let (min, max) = fee_bounds(strategy, size);
        match self.partial.unsigned_tx.output.len() {
            2 => Ok(effective >= min && effective <= max),
            1 => {
                let (_, change_cost) = fee_bounds(strategy, P2PKH_OUTPUT_SIZE);
                let slack = Amount::from_sat(DUST_LIMIT) + change_cost;
                Ok(effective >= min && effective <= max + slack)
            }
            _ => Err(FeeStrategyError::new(
                transaction::Error::MultiUTXOUnsuported,
            )),
        }
    }
}
