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

//! Swap engine for account-based ledgers. The contract is a deployed atomic swap smart contract
//! keyed by secret hash, the engine only invokes it through an injected [`ContractCalls`] client.
//! Initiate and participate lock the amount in the contract, redeem reveals the secret as a call
//! argument and refund is accepted by the contract after the refund time.

use std::fmt;
use std::io;

use async_trait::async_trait;

use crate::consensus::{self, deserialize, serialize, CanonicalBytes, Decodable, Encodable};
use crate::script;
use crate::secret::{self, Secret, SecretHash};
use crate::swap::{Counterparty, FundedContract, SwapEngine};
use crate::syncer;
use crate::transaction::Error as FError;
use crate::{Error, Res};

/// The swap recorded by the smart contract for a secret hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[display("{secret_hash}: {initiator} -> {participant}, amount: {amount}, refund time: {refund_time}")]
pub struct AccountContract {
    /// The secret hash keying the swap in the contract.
    pub secret_hash: SecretHash,
    /// Account funding the swap, allowed to refund.
    pub initiator: String,
    /// Account allowed to redeem with the secret.
    pub participant: String,
    /// Locked amount, in the ledger smallest unit.
    pub amount: u128,
    /// UNIX time after which the initiator can refund.
    pub refund_time: u64,
}

impl Encodable for AccountContract {
    fn consensus_encode<W: io::Write>(&self, s: &mut W) -> Result<usize, io::Error> {
        let mut len = self.secret_hash.consensus_encode(s)?;
        len += self.initiator.consensus_encode(s)?;
        len += self.participant.consensus_encode(s)?;
        len += self.amount.consensus_encode(s)?;
        Ok(len + self.refund_time.consensus_encode(s)?)
    }
}

impl Decodable for AccountContract {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        Ok(Self {
            secret_hash: Decodable::consensus_decode(d)?,
            initiator: Decodable::consensus_decode(d)?,
            participant: Decodable::consensus_decode(d)?,
            amount: Decodable::consensus_decode(d)?,
            refund_time: Decodable::consensus_decode(d)?,
        })
    }
}

impl_strict_encoding!(AccountContract);

impl CanonicalBytes for AccountContract {
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

/// Receipt of the call locking funds in the contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[display(inner)]
pub struct CallReceipt(pub String);

impl CanonicalBytes for CallReceipt {
    fn as_canonical_bytes(&self) -> Vec<u8> {
        self.0.as_canonical_bytes()
    }

    fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, consensus::Error>
    where
        Self: Sized,
    {
        Ok(Self(String::from_canonical_bytes(bytes)?))
    }
}

/// A call spending a swap recorded in the contract, as submitted or observed on the ledger.
#[derive(Clone, PartialEq, Eq)]
pub enum ContractCall {
    /// Redeem call, carries the secret in its arguments.
    Redeem {
        /// Hash of the call transaction.
        tx_hash: String,
        /// Secret hash of the redeemed swap.
        secret_hash: SecretHash,
        /// The revealed secret.
        secret: Secret,
    },
    /// Refund call.
    Refund {
        /// Hash of the call transaction.
        tx_hash: String,
        /// Secret hash of the refunded swap.
        secret_hash: SecretHash,
    },
}

impl fmt::Debug for ContractCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redeem {
                tx_hash,
                secret_hash,
                ..
            } => f
                .debug_struct("Redeem")
                .field("tx_hash", tx_hash)
                .field("secret_hash", secret_hash)
                .finish(),
            Self::Refund {
                tx_hash,
                secret_hash,
            } => f
                .debug_struct("Refund")
                .field("tx_hash", tx_hash)
                .field("secret_hash", secret_hash)
                .finish(),
        }
    }
}

/// Client invoking the atomic swap smart contract. Calls resolve once the ledger accepted or
/// rejected them, a rejected call returns [`syncer::Error::Rejected`].
#[async_trait]
pub trait ContractCalls: Send + Sync {
    /// The account signing the calls.
    fn account(&self) -> String;

    /// Lock `amount` for `participant` under `secret_hash`, refundable after `refund_time`.
    async fn initiate(
        &self,
        refund_time: u64,
        secret_hash: &SecretHash,
        participant: &str,
        amount: u128,
    ) -> Result<String, syncer::Error>;

    /// Claim the swap recorded under the hash of `secret`.
    async fn redeem(&self, secret: &Secret, secret_hash: &SecretHash)
        -> Result<String, syncer::Error>;

    /// Take back the swap recorded under `secret_hash`.
    async fn refund(&self, secret_hash: &SecretHash) -> Result<String, syncer::Error>;

    /// Return the swap recorded under `secret_hash`, if any.
    async fn swap_details(
        &self,
        secret_hash: &SecretHash,
    ) -> Result<Option<AccountContract>, syncer::Error>;

    /// Timestamp of the latest block, the clock refund times are compared to.
    async fn now(&self) -> Result<u64, syncer::Error>;
}

/// Swap engine over an account-based ledger.
#[derive(Debug)]
pub struct AccountEngine<C> {
    calls: C,
}

impl<C> AccountEngine<C>
where
    C: ContractCalls,
{
    /// Create an engine invoking the contract through `calls`.
    pub fn new(calls: C) -> Self {
        Self { calls }
    }

    /// The account of the engine.
    pub fn account(&self) -> String {
        self.calls.account()
    }

    /// Return the swap recorded on the ledger under `secret_hash`. Used to audit the contract of
    /// the counter-party before redeeming or participating against it.
    pub async fn audit(&self, secret_hash: &SecretHash) -> Res<AccountContract> {
        let contract = self
            .calls
            .swap_details(secret_hash)
            .await?
            .ok_or(FError::MissingContract)?;
        log::debug!("Audited contract {}", contract);
        Ok(contract)
    }

    async fn lock(
        &self,
        participant: &str,
        secret_hash: SecretHash,
        amount: u128,
        refund_time: u64,
    ) -> Res<FundedContract<Self>> {
        if refund_time == 0 {
            return Err(script::Error::InvalidLockTime(0).into());
        }
        let contract = AccountContract {
            secret_hash,
            initiator: self.calls.account(),
            participant: participant.to_string(),
            amount,
            refund_time,
        };
        let tx_hash = self
            .calls
            .initiate(refund_time, &secret_hash, participant, amount)
            .await?;
        log::info!("Contract {} funded in {}", contract, tx_hash);
        Ok(FundedContract {
            contract,
            funding: CallReceipt(tx_hash),
            // gas is paid by the calling account
            fee: 0,
            refund: None,
        })
    }
}

#[async_trait]
impl<C> SwapEngine for AccountEngine<C>
where
    C: ContractCalls,
{
    type Contract = AccountContract;
    type FundingRef = CallReceipt;
    type Address = String;
    type Amount = u128;
    type Transaction = ContractCall;

    async fn initiate(
        &self,
        counterparty: &String,
        secret_hash: SecretHash,
        amount: u128,
        lock_time: u64,
    ) -> Res<FundedContract<Self>> {
        self.lock(counterparty, secret_hash, amount, lock_time)
            .await
    }

    async fn participate(
        &self,
        counterparty: &Counterparty<String>,
        secret_hash: SecretHash,
        amount: u128,
        lock_time: u64,
    ) -> Res<FundedContract<Self>> {
        let participant = match counterparty {
            Counterparty::Address(account) => account.clone(),
            Counterparty::Contract { contract, .. } => {
                let theirs = AccountContract::from_canonical_bytes(contract)?;
                (theirs.secret_hash == secret_hash)
                    .then(|| 0)
                    .ok_or(Error::SecretMismatch)?;
                if lock_time >= theirs.refund_time {
                    return Err(Error::UnsafeLockTime {
                        participant: lock_time,
                        initiator: theirs.refund_time,
                    });
                }
                theirs.initiator
            }
        };
        self.lock(&participant, secret_hash, amount, lock_time)
            .await
    }

    async fn audit_counterparty(
        &self,
        contract: &[u8],
        funding: &[u8],
        secret_hash: &SecretHash,
    ) -> Res<(AccountContract, CallReceipt)> {
        let theirs = AccountContract::from_canonical_bytes(contract)?;
        let receipt = CallReceipt::from_canonical_bytes(funding)?;
        (theirs.secret_hash == *secret_hash)
            .then(|| 0)
            .ok_or(Error::SecretMismatch)?;
        let recorded = self.audit(secret_hash).await?;
        (recorded == theirs)
            .then(|| 0)
            .ok_or(Error::UnsafeContract("the contract differs from the recorded swap"))?;
        (recorded.participant == self.calls.account())
            .then(|| 0)
            .ok_or(Error::UnsafeContract("the redeem path does not pay the local account"))?;
        (recorded.amount > 0)
            .then(|| 0)
            .ok_or(Error::UnsafeContract("the contract locks no funds"))?;
        Ok((recorded, receipt))
    }

    async fn redeem(
        &self,
        contract: &AccountContract,
        _funding: &CallReceipt,
        secret: &Secret,
        destination: &String,
    ) -> Res<ContractCall> {
        secret::verify(secret, &contract.secret_hash)
            .then(|| 0)
            .ok_or(Error::SecretMismatch)?;
        (destination == &contract.participant)
            .then(|| 0)
            .ok_or(FError::WrongTemplate(
                "Redeemed funds are paid to the contract participant",
            ))?;

        let tx_hash = self.calls.redeem(secret, &contract.secret_hash).await?;
        log::info!("Redeemed {} in {}", contract.secret_hash, tx_hash);
        Ok(ContractCall::Redeem {
            tx_hash,
            secret_hash: contract.secret_hash,
            secret: *secret,
        })
    }

    async fn refund(
        &self,
        contract: &AccountContract,
        _funding: &CallReceipt,
        destination: &String,
    ) -> Res<ContractCall> {
        (destination == &contract.initiator)
            .then(|| 0)
            .ok_or(FError::WrongTemplate(
                "Refunded funds are paid to the contract initiator",
            ))?;
        let now = self.calls.now().await?;
        if now < contract.refund_time {
            return Err(Error::LockTimeNotReached {
                lock_time: contract.refund_time,
                current: now,
            });
        }

        let tx_hash = self.calls.refund(&contract.secret_hash).await?;
        log::info!("Refunded {} in {}", contract.secret_hash, tx_hash);
        Ok(ContractCall::Refund {
            tx_hash,
            secret_hash: contract.secret_hash,
        })
    }

    fn extract_secret(&self, tx: &ContractCall, secret_hash: &SecretHash) -> Res<Secret> {
        match tx {
            ContractCall::Redeem { secret, .. } if secret::verify(secret, secret_hash) => {
                Ok(*secret)
            }
            _ => Err(Error::SecretMismatch),
        }
    }
}
