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

//! Defines the protocol of a swap between two ledgers and the state kept for each attempt.
//!
//! A swap is driven by a [`SwapCoordinator`] owning one [`SwapState`] and two [`SwapEngine`]s:
//! the engine of the ledger the local party funds, and the engine of the ledger it redeems on.
//! Engines come in two families sharing only the [`SwapEngine`] capability set:
//!
//! - [`script::ScriptEngine`] for script-based ledgers, contracts are pay-to-script-hash outputs,
//! - [`account::AccountEngine`] for account-based ledgers, contracts are smart contract calls.
//!
//! The phases of an attempt are:
//!
//! ```text
//! Created ──► Funded ──► Redeemed ──► Closed
//!    │           └─────► Refunded ──► Closed
//!    └─► Abandoned
//! ```

use std::fmt::Debug;
use std::io;
use std::str::FromStr;

use async_trait::async_trait;
use uuid::Uuid;

use crate::consensus::{self, CanonicalBytes, Decodable, Encodable};
use crate::role::SwapRole;
use crate::secret::{Secret, SecretHash};
use crate::Res;

pub mod account;
pub mod coordinator;
pub mod script;

pub use coordinator::SwapCoordinator;

/// The identifier of a swap attempt, a random [`Uuid`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize,
)]
#[serde(transparent)]
#[display(inner)]
pub struct SwapId(pub Uuid);

impl SwapId {
    /// Generate a new random swap identifier.
    pub fn random() -> Self {
        SwapId(Uuid::new_v4())
    }
}

impl From<Uuid> for SwapId {
    fn from(u: Uuid) -> Self {
        SwapId(u)
    }
}

impl FromStr for SwapId {
    type Err = consensus::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(SwapId(Uuid::parse_str(s).map_err(consensus::Error::new)?))
    }
}

impl Encodable for SwapId {
    fn consensus_encode<W: io::Write>(&self, s: &mut W) -> Result<usize, io::Error> {
        self.0.as_bytes().consensus_encode(s)
    }
}

impl Decodable for SwapId {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        let bytes: [u8; 16] = Decodable::consensus_decode(d)?;
        Ok(SwapId(Uuid::from_bytes(bytes)))
    }
}

impl_strict_encoding!(SwapId);

/// Phase of a swap attempt.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize,
)]
#[display(Debug)]
pub enum SwapPhase {
    /// The attempt exists, no funds are committed.
    Created,
    /// The local contract is funded and the funding transaction accepted by the ledger.
    Funded,
    /// The counter-party contract was redeemed with the secret.
    Redeemed,
    /// The local contract was refunded after its lock time.
    Refunded,
    /// The attempt is complete, nothing is left to do.
    Closed,
    /// The attempt was cancelled before any funds were committed.
    Abandoned,
}

impl SwapPhase {
    /// Return `true` if the phase graph allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: SwapPhase) -> bool {
        use SwapPhase::*;
        matches!(
            (self, next),
            (Created, Funded)
                | (Created, Abandoned)
                | (Funded, Redeemed)
                | (Funded, Refunded)
                | (Redeemed, Closed)
                | (Refunded, Closed)
        )
    }

    /// Return `true` if no transition leaves the phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Abandoned)
    }
}

impl Encodable for SwapPhase {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        match self {
            SwapPhase::Created => 0x01u8.consensus_encode(writer),
            SwapPhase::Funded => 0x02u8.consensus_encode(writer),
            SwapPhase::Redeemed => 0x03u8.consensus_encode(writer),
            SwapPhase::Refunded => 0x04u8.consensus_encode(writer),
            SwapPhase::Closed => 0x05u8.consensus_encode(writer),
            SwapPhase::Abandoned => 0x06u8.consensus_encode(writer),
        }
    }
}

impl Decodable for SwapPhase {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        match Decodable::consensus_decode(d)? {
            0x01u8 => Ok(SwapPhase::Created),
            0x02u8 => Ok(SwapPhase::Funded),
            0x03u8 => Ok(SwapPhase::Redeemed),
            0x04u8 => Ok(SwapPhase::Refunded),
            0x05u8 => Ok(SwapPhase::Closed),
            0x06u8 => Ok(SwapPhase::Abandoned),
            _ => Err(consensus::Error::UnknownType),
        }
    }
}

impl_strict_encoding!(SwapPhase);

/// The record of a swap attempt, persisted after every transition so that redeem, refund and
/// secret extraction remain possible after a restart. Contract and funding reference are kept in
/// their canonical bytes, independently of the ledger family.
#[derive(Clone, PartialEq, Eq)]
pub struct SwapState {
    /// Identifier of the attempt.
    pub id: SwapId,
    /// Role of the local party.
    pub role: SwapRole,
    /// The secret, known from the start by the initiator, learned by the participant.
    pub secret: Option<Secret>,
    /// The secret hash binding both contracts.
    pub secret_hash: SecretHash,
    /// Lock time of the local contract, zero until funded.
    pub lock_time: u64,
    /// Canonical bytes of the local contract, once funded.
    pub contract: Option<Vec<u8>>,
    /// Canonical bytes of the local funding reference, once funded.
    pub funding: Option<Vec<u8>>,
    /// Current phase.
    pub phase: SwapPhase,
}

impl Debug for SwapState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapState")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("secret", &self.secret)
            .field("secret_hash", &self.secret_hash)
            .field("lock_time", &self.lock_time)
            .field("contract", &self.contract.as_ref().map(hex::encode))
            .field("funding", &self.funding.as_ref().map(hex::encode))
            .field("phase", &self.phase)
            .finish()
    }
}

impl SwapState {
    /// Create the state of a new attempt in [`SwapPhase::Created`].
    pub fn new(
        id: SwapId,
        role: SwapRole,
        secret: Option<Secret>,
        secret_hash: SecretHash,
    ) -> Self {
        Self {
            id,
            role,
            secret,
            secret_hash,
            lock_time: 0,
            contract: None,
            funding: None,
            phase: SwapPhase::Created,
        }
    }

    /// Decode the local contract, fails if the attempt is not funded.
    pub fn contract<C>(&self) -> Result<C, consensus::Error>
    where
        C: CanonicalBytes,
    {
        let bytes = self
            .contract
            .as_ref()
            .ok_or(consensus::Error::ParseFailed("no contract recorded"))?;
        C::from_canonical_bytes(bytes)
    }

    /// Decode the local funding reference, fails if the attempt is not funded.
    pub fn funding<O>(&self) -> Result<O, consensus::Error>
    where
        O: CanonicalBytes,
    {
        let bytes = self
            .funding
            .as_ref()
            .ok_or(consensus::Error::ParseFailed("no funding recorded"))?;
        O::from_canonical_bytes(bytes)
    }
}

impl Encodable for SwapState {
    fn consensus_encode<W: io::Write>(&self, s: &mut W) -> Result<usize, io::Error> {
        let mut len = self.id.consensus_encode(s)?;
        len += self.role.consensus_encode(s)?;
        len += self.secret.consensus_encode(s)?;
        len += self.secret_hash.consensus_encode(s)?;
        len += self.lock_time.consensus_encode(s)?;
        len += self.contract.consensus_encode(s)?;
        len += self.funding.consensus_encode(s)?;
        Ok(len + self.phase.consensus_encode(s)?)
    }
}

impl Decodable for SwapState {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        Ok(Self {
            id: Decodable::consensus_decode(d)?,
            role: Decodable::consensus_decode(d)?,
            secret: Decodable::consensus_decode(d)?,
            secret_hash: Decodable::consensus_decode(d)?,
            lock_time: Decodable::consensus_decode(d)?,
            contract: Decodable::consensus_decode(d)?,
            funding: Decodable::consensus_decode(d)?,
            phase: Decodable::consensus_decode(d)?,
        })
    }
}

impl_strict_encoding!(SwapState);

/// The counter-party of a participate: its address on the ledger the local party funds, or the
/// contract it funded on the ledger the local party redeems on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Counterparty<A> {
    /// The counter-party address, recipient of the local contract. Nothing is audited, the caller
    /// vouches for the counter-party contract.
    Address(A),
    /// The counter-party contract, audited before any funds are committed. The recipient of the
    /// local contract is taken from it.
    Contract {
        /// Canonical bytes of the counter-party contract.
        contract: Vec<u8>,
        /// Evidence of its funding: the serialized funding transaction on script-based ledgers,
        /// the canonical bytes of the call receipt on account-based ledgers.
        funding: Vec<u8>,
    },
}

/// A contract funded by the local party.
pub struct FundedContract<E>
where
    E: SwapEngine + ?Sized,
{
    /// The funded contract.
    pub contract: E::Contract,
    /// The reference to the locked funds.
    pub funding: E::FundingRef,
    /// Fee paid by the funding on top of the locked amount, zero when the ledger charges it out
    /// of band.
    pub fee: E::Amount,
    /// The refund transaction signed at funding time and its fee, valid once the lock time
    /// passed. Only built by ledgers spending contracts with their own transaction.
    pub refund: Option<(E::Transaction, E::Amount)>,
}

impl<E> Debug for FundedContract<E>
where
    E: SwapEngine + ?Sized,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FundedContract")
            .field("contract", &self.contract)
            .field("funding", &self.funding)
            .field("fee", &self.fee)
            .field("refund", &self.refund)
            .finish()
    }
}

impl<E> Clone for FundedContract<E>
where
    E: SwapEngine + ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            contract: self.contract.clone(),
            funding: self.funding.clone(),
            fee: self.fee,
            refund: self.refund.clone(),
        }
    }
}

/// The operations of the protocol on one ledger. Script-based and account-based ledgers
/// implement the same capability set with the same semantics, the coordinator uses them
/// interchangeably.
#[async_trait]
pub trait SwapEngine: Send + Sync {
    /// The contract locking funds on the ledger.
    type Contract: Clone + Debug + Send + Sync + CanonicalBytes;
    /// The reference to the funds locked by a contract, needed to spend them.
    type FundingRef: Clone + Debug + Send + Sync + CanonicalBytes;
    /// The address type of the ledger.
    type Address: Clone + Debug + Send + Sync;
    /// The amount type of the ledger.
    type Amount: Copy + Debug + Send + Sync;
    /// The transaction spending a contract, as published or observed on the ledger.
    type Transaction: Clone + Debug + Send + Sync;

    /// Create a contract paying `counterparty` against the secret hash, refundable by the local
    /// party after `lock_time`, and fund it with `amount`.
    async fn initiate(
        &self,
        counterparty: &Self::Address,
        secret_hash: SecretHash,
        amount: Self::Amount,
        lock_time: u64,
    ) -> Res<FundedContract<Self>>;

    /// Create and fund the symmetric contract bound to the initiator's secret hash. When the
    /// counter-party is given as a contract its secret hash must match and its lock time must
    /// expire after `lock_time`. The contract lives on the other ledger, it must have been
    /// audited there with [`SwapEngine::audit_counterparty`] first, as
    /// [`SwapCoordinator::participate`] does.
    async fn participate(
        &self,
        counterparty: &Counterparty<Self::Address>,
        secret_hash: SecretHash,
        amount: Self::Amount,
        lock_time: u64,
    ) -> Res<FundedContract<Self>>;

    /// Audit a contract funded by the counter-party on this ledger before committing funds
    /// against it: it must be bound to `secret_hash`, pay the local party on redeem and be
    /// funded. Returns the contract and its funding reference, needed to redeem it. Fails with
    /// [`crate::Error::UnsafeContract`] or a contract validation error otherwise.
    async fn audit_counterparty(
        &self,
        contract: &[u8],
        funding: &[u8],
        secret_hash: &SecretHash,
    ) -> Res<(Self::Contract, Self::FundingRef)>;

    /// Claim the funds of a contract with the secret, sending them to `destination`.
    async fn redeem(
        &self,
        contract: &Self::Contract,
        funding: &Self::FundingRef,
        secret: &Secret,
        destination: &Self::Address,
    ) -> Res<Self::Transaction>;

    /// Take back the funds of a contract after its lock time, sending them to `destination`.
    /// Fails with [`crate::Error::LockTimeNotReached`] before.
    async fn refund(
        &self,
        contract: &Self::Contract,
        funding: &Self::FundingRef,
        destination: &Self::Address,
    ) -> Res<Self::Transaction>;

    /// Extract and verify the secret revealed by an observed redeem transaction.
    fn extract_secret(&self, tx: &Self::Transaction, secret_hash: &SecretHash) -> Res<Secret>;
}
