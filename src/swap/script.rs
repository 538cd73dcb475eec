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

//! Swap engine for script-based ledgers. Contracts are legacy pay-to-script-hash outputs locked
//! with the atomic swap contract script, funded from pay-to-pubkey-hash wallet outputs owned by
//! the engine key.

use std::convert::TryFrom;

use async_trait::async_trait;
use bitcoin::{Address, Amount, PubkeyHash, Transaction};

use crate::bitcoin::address::pubkey_hash_from_address;
use crate::bitcoin::fee::{FeeEstimator, SatPerKvB};
use crate::bitcoin::htlc::AtomicSwapContract;
use crate::bitcoin::timelock::CltvLockTime;
use crate::bitcoin::transaction::{self, Funding, MetadataOutput, Redeem, Refund, Tx};
use crate::bitcoin::{audit_contract, validator, Bitcoin, KeyManager};
use crate::blockchain::{Fee, FeePriority, FeeStrategy, FeeStrategyError};
use crate::config::SwapConfig;
use crate::consensus;
use crate::crypto::Sign;
use crate::script::{self, ScriptPath};
use crate::secret::{self, Secret, SecretHash};
use crate::swap::{Counterparty, FundedContract, SwapEngine};
use crate::syncer::{Broadcaster, ChainClock};
use crate::transaction::{
    Broadcastable, Error as FError, Fundable, Linkable, Redeemable, Refundable, Witnessable,
};
use crate::wallet::FundingWallet;
use crate::{Error, Res};

/// Number of input selections attempted when the selected inputs do not cover the fee of the
/// funding transaction.
const MAX_SELECTION_ROUNDS: usize = 2;

fn cltv_lock_time(lock_time: u64) -> Result<CltvLockTime, script::Error> {
    let value = u32::try_from(lock_time).map_err(|_| {
        script::Error::InvalidLockTime(i64::try_from(lock_time).unwrap_or(i64::MAX))
    })?;
    CltvLockTime::new(value)
}

/// Swap engine for Bitcoin-like ledgers. Owns the participant key, the ledger configuration and
/// the handles to the syncer and the funding wallet.
#[derive(Debug)]
pub struct ScriptEngine<S, W> {
    keys: KeyManager,
    config: SwapConfig,
    syncer: S,
    wallet: W,
}

impl<S, W> ScriptEngine<S, W>
where
    S: Broadcaster<Transaction = Transaction, TxId = bitcoin::Txid> + ChainClock,
    W: FundingWallet<
        Input = MetadataOutput,
        Address = Address,
        Amount = Amount,
        FeeRate = SatPerKvB,
    >,
{
    /// Create an engine signing with `keys`.
    pub fn new(keys: KeyManager, config: SwapConfig, syncer: S, wallet: W) -> Self {
        Self {
            keys,
            config,
            syncer,
            wallet,
        }
    }

    /// The address of the engine key, where redeemed and refunded funds can be sent.
    pub fn address(&self) -> Address {
        self.keys.address(self.config.network)
    }

    /// The configuration of the engine.
    pub fn config(&self) -> &SwapConfig {
        &self.config
    }

    fn build_contract(
        &self,
        secret_hash: SecretHash,
        recipient: PubkeyHash,
        lock_time: u64,
    ) -> Res<AtomicSwapContract> {
        let lock_time = cltv_lock_time(lock_time)?;
        if !lock_time.is_minimal_push() {
            log::warn!(
                "Lock time {} is not pushed minimally, the refund is non-standard",
                lock_time
            );
        }
        Ok(AtomicSwapContract::new(
            secret_hash,
            recipient,
            self.keys.pubkey_hash(),
            lock_time,
        ))
    }

    async fn fee_estimator(&self) -> Res<FeeEstimator> {
        let proposed = self.wallet.fee_rate().await?;
        Ok(self.config.fee_estimator(proposed))
    }

    /// Select inputs, build the funding transaction with its fee and change. The selection is
    /// retried once when the wallet returned more inputs than the fee was estimated for.
    async fn build_funding(
        &self,
        contract: &AtomicSwapContract,
        amount: Amount,
        estimator: &FeeEstimator,
    ) -> Res<(Tx<Funding>, Amount)> {
        let strategy = FeeStrategy::Fixed(estimator.rate());
        let change = self.wallet.change_address().await?;
        let mut n_inputs = 1;

        for _ in 0..MAX_SELECTION_ROUNDS {
            let target = amount
                .checked_add(estimator.funding_fee(n_inputs, true))
                .ok_or_else(|| Error::InsufficientFunds(format!("amount {} overflows", amount)))?;
            let inputs = self.wallet.select_funding_inputs(target).await?;
            let selected = inputs.len();
            log::debug!("Selected {} inputs to cover {}", selected, target);

            let mut funding = match <Tx<Funding> as Fundable<Bitcoin, MetadataOutput>>::initialize(
                inputs,
                contract,
                amount,
                change.clone(),
            ) {
                Ok(funding) => funding,
                Err(FError::NotEnoughAssets) => {
                    return Err(Error::InsufficientFunds(format!(
                        "selected inputs do not cover {}",
                        amount
                    )))
                }
                Err(e) => return Err(e.into()),
            };

            match funding.set_fee(&strategy, FeePriority::Low) {
                Ok(fee) => {
                    log::debug!("Funding fee set to {} at {}", fee, estimator.rate());
                    return Ok((funding, fee));
                }
                Err(FeeStrategyError::NotEnoughAssets) if selected > n_inputs => {
                    n_inputs = selected;
                }
                Err(FeeStrategyError::NotEnoughAssets) => break,
                Err(e) => return Err(e.into()),
            }
        }

        Err(Error::InsufficientFunds(format!(
            "selected inputs do not cover {} and the funding fee",
            amount
        )))
    }

    /// Build and sign the funding transaction of `contract` and the refund of its output to the
    /// engine address, then publish the funding. The refund is signed before anything is
    /// published.
    async fn fund(
        &self,
        contract: AtomicSwapContract,
        amount: Amount,
    ) -> Res<FundedContract<Self>> {
        let estimator = self.fee_estimator().await?;
        let (mut funding, fee) = self.build_funding(&contract, amount, &estimator).await?;
        funding.verify_template(&contract, amount)?;

        let pubkey = self.keys.get_pubkey();
        for (index, msg) in funding.generate_input_messages()?.into_iter().enumerate() {
            let sig = self.keys.sign(msg)?;
            funding.add_input_witness(index, pubkey, sig)?;
        }
        let tx = funding.finalize_and_extract()?;
        let output = funding.get_consumable_output()?;
        let refund = self.sign_refund(&contract, &output, &self.address(), &estimator)?;

        let txid = self.syncer.publish(&tx).await?;
        log::info!(
            "Contract {} funded with {} in {}, fee {}",
            contract,
            amount,
            txid,
            fee
        );
        Ok(FundedContract {
            contract,
            funding: output,
            fee,
            refund: Some(refund),
        })
    }

    /// Build and sign the refund of `funding` to `destination`. The transaction is only accepted
    /// by the ledger once the contract lock time passed.
    fn sign_refund(
        &self,
        contract: &AtomicSwapContract,
        funding: &MetadataOutput,
        destination: &Address,
        estimator: &FeeEstimator,
    ) -> Res<(Transaction, Amount)> {
        let mut refund = <Tx<Refund> as Refundable<Bitcoin, MetadataOutput>>::initialize(
            funding,
            contract,
            destination.clone(),
        )?;
        let fee = refund.set_fee(&FeeStrategy::Fixed(estimator.rate()), FeePriority::Low)?;
        refund.verify_template(destination.clone())?;

        let msg = refund.generate_witness_message(ScriptPath::Refund)?;
        let sig = self.keys.sign(msg)?;
        refund.add_witness(self.keys.get_pubkey(), sig)?;
        Ok((refund.finalize_and_extract()?, fee))
    }

    fn check_funding(
        &self,
        contract: &AtomicSwapContract,
        funding: &MetadataOutput,
    ) -> Res<()> {
        (funding.tx_out.script_pubkey == contract.script_pubkey())
            .then(|| 0)
            .ok_or(FError::WrongTemplate("Output is not locked by the contract"))?;
        Ok(())
    }
}

#[async_trait]
impl<S, W> SwapEngine for ScriptEngine<S, W>
where
    S: Broadcaster<Transaction = Transaction, TxId = bitcoin::Txid> + ChainClock,
    W: FundingWallet<
        Input = MetadataOutput,
        Address = Address,
        Amount = Amount,
        FeeRate = SatPerKvB,
    >,
{
    type Contract = AtomicSwapContract;
    type FundingRef = MetadataOutput;
    type Address = Address;
    type Amount = Amount;
    type Transaction = Transaction;

    async fn initiate(
        &self,
        counterparty: &Address,
        secret_hash: SecretHash,
        amount: Amount,
        lock_time: u64,
    ) -> Res<FundedContract<Self>> {
        let recipient = pubkey_hash_from_address(counterparty)?;
        let contract = self.build_contract(secret_hash, recipient, lock_time)?;
        log::debug!("Initiating contract {}", contract);
        self.fund(contract, amount).await
    }

    async fn participate(
        &self,
        counterparty: &Counterparty<Address>,
        secret_hash: SecretHash,
        amount: Amount,
        lock_time: u64,
    ) -> Res<FundedContract<Self>> {
        let recipient = match counterparty {
            Counterparty::Address(address) => pubkey_hash_from_address(address)?,
            Counterparty::Contract { contract, .. } => {
                let theirs = validator::extract_contract(contract)?;
                (theirs.secret_hash == secret_hash)
                    .then(|| 0)
                    .ok_or(Error::SecretMismatch)?;
                let ours = cltv_lock_time(lock_time)?;
                // heights of different chains are not comparable
                if !ours.is_height()
                    && !theirs.lock_time.is_height()
                    && ours.as_u32() >= theirs.lock_time.as_u32()
                {
                    return Err(Error::UnsafeLockTime {
                        participant: lock_time,
                        initiator: theirs.lock_time.as_u32() as u64,
                    });
                }
                // the initiator refund key receives our contract
                theirs.refund
            }
        };
        let contract = self.build_contract(secret_hash, recipient, lock_time)?;
        log::debug!("Participating with contract {}", contract);
        self.fund(contract, amount).await
    }

    async fn audit_counterparty(
        &self,
        contract: &[u8],
        funding: &[u8],
        secret_hash: &SecretHash,
    ) -> Res<(AtomicSwapContract, MetadataOutput)> {
        let funding_tx: Transaction =
            bitcoin::consensus::deserialize(funding).map_err(consensus::Error::new)?;
        let audited = audit_contract(contract, &funding_tx, self.config.network)?;
        (audited.contract.secret_hash == *secret_hash)
            .then(|| 0)
            .ok_or(Error::SecretMismatch)?;
        (audited.contract.recipient == self.keys.pubkey_hash())
            .then(|| 0)
            .ok_or(Error::UnsafeContract("the redeem path does not pay the local key"))?;
        (audited.value.as_sat() > 0)
            .then(|| 0)
            .ok_or(Error::UnsafeContract("the contract output is empty"))?;
        log::info!("Audited counter-party contract {}", audited);
        Ok((audited.contract, audited.output))
    }

    async fn redeem(
        &self,
        contract: &AtomicSwapContract,
        funding: &MetadataOutput,
        secret: &Secret,
        destination: &Address,
    ) -> Res<Transaction> {
        secret::verify(secret, &contract.secret_hash)
            .then(|| 0)
            .ok_or(Error::SecretMismatch)?;
        self.check_funding(contract, funding)?;

        let estimator = self.fee_estimator().await?;
        let mut redeem = <Tx<Redeem> as Redeemable<Bitcoin, MetadataOutput>>::initialize(
            funding,
            contract,
            destination.clone(),
        )?;
        let fee = redeem.set_fee(&FeeStrategy::Fixed(estimator.rate()), FeePriority::Low)?;
        redeem.verify_template(destination.clone())?;

        let msg = redeem.generate_witness_message(ScriptPath::Redeem)?;
        let sig = self.keys.sign(msg)?;
        redeem.add_witness(self.keys.get_pubkey(), sig)?;
        redeem.add_secret(*secret)?;
        let tx = redeem.finalize_and_extract()?;

        let txid = self.syncer.publish(&tx).await?;
        log::info!(
            "Redeemed {} to {} in {}, fee {}",
            funding.out_point,
            destination,
            txid,
            fee
        );
        Ok(tx)
    }

    async fn refund(
        &self,
        contract: &AtomicSwapContract,
        funding: &MetadataOutput,
        destination: &Address,
    ) -> Res<Transaction> {
        self.check_funding(contract, funding)?;
        let lock_time = contract.lock_time;
        let height = self.syncer.current_height().await?;
        let median_time_past = self.syncer.median_time_past().await?;
        if !lock_time.is_expired(height, median_time_past) {
            let current = match lock_time.is_height() {
                true => height,
                false => median_time_past,
            };
            return Err(Error::LockTimeNotReached {
                lock_time: lock_time.as_u32() as u64,
                current: current as u64,
            });
        }

        let estimator = self.fee_estimator().await?;
        let (tx, fee) = self.sign_refund(contract, funding, destination, &estimator)?;
        let txid = self.syncer.publish(&tx).await?;
        log::info!(
            "Refunded {} to {} in {}, fee {}",
            funding.out_point,
            destination,
            txid,
            fee
        );
        Ok(tx)
    }

    fn extract_secret(&self, tx: &Transaction, secret_hash: &SecretHash) -> Res<Secret> {
        transaction::extract_secret(tx, secret_hash).ok_or(Error::SecretMismatch)
    }
}
