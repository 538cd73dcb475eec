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

//! The protocol state machine of one swap attempt. The coordinator drives the two engines, checks
//! every operation against the phase graph and the role of the local party, and persists the
//! state after every transition.

use crate::consensus::CanonicalBytes;
use crate::role::SwapRole;
use crate::script;
use crate::secret::{self, Secret, SecretHash};
use crate::store::SwapStore;
use crate::swap::{Counterparty, FundedContract, SwapEngine, SwapId, SwapPhase, SwapState};
use crate::{Error, Res};

/// Coordinates one swap attempt. `F` is the engine of the ledger the local party funds, `R` the
/// engine of the ledger it redeems on, and `S` the store recording the state.
///
/// Operations take `&mut self`, the state of an attempt is never mutated from two call sites. An
/// operation submitting a transaction only moves the state once the ledger accepted it.
#[derive(Debug)]
pub struct SwapCoordinator<F, R, S> {
    state: SwapState,
    fund: F,
    redeem: R,
    store: S,
}

impl<F, R, S> SwapCoordinator<F, R, S>
where
    F: SwapEngine,
    R: SwapEngine,
    S: SwapStore,
{
    /// Create a new attempt as initiator. A secret is generated if none is given.
    pub fn initiator(fund: F, redeem: R, store: S, secret: Option<Secret>) -> Self {
        let secret = secret.unwrap_or_else(Secret::generate);
        let state = SwapState::new(
            SwapId::random(),
            SwapRole::Initiator,
            Some(secret),
            secret.hash(),
        );
        log::info!("{} | new swap as {}", state.id, state.role);
        Self::from_state(state, fund, redeem, store)
    }

    /// Create a new attempt as participant, with the secret hash of the initiator contract.
    pub fn participant(fund: F, redeem: R, store: S, secret_hash: SecretHash) -> Self {
        let state = SwapState::new(SwapId::random(), SwapRole::Participant, None, secret_hash);
        log::info!("{} | new swap as {}", state.id, state.role);
        Self::from_state(state, fund, redeem, store)
    }

    /// Reload an attempt recorded in the store, after a restart.
    pub fn restore(id: &SwapId, fund: F, redeem: R, store: S) -> Res<Self> {
        let state = store.load(id)?;
        log::info!("{} | restored in phase {}", state.id, state.phase);
        Ok(Self::from_state(state, fund, redeem, store))
    }

    fn from_state(state: SwapState, fund: F, redeem: R, store: S) -> Self {
        Self {
            state,
            fund,
            redeem,
            store,
        }
    }

    /// The identifier of the attempt.
    pub fn id(&self) -> SwapId {
        self.state.id
    }

    /// The current phase.
    pub fn phase(&self) -> SwapPhase {
        self.state.phase
    }

    /// The role of the local party.
    pub fn role(&self) -> SwapRole {
        self.state.role
    }

    /// The secret hash binding both contracts.
    pub fn secret_hash(&self) -> SecretHash {
        self.state.secret_hash
    }

    /// The secret, if known.
    pub fn secret(&self) -> Option<Secret> {
        self.state.secret
    }

    /// The recorded state.
    pub fn state(&self) -> &SwapState {
        &self.state
    }

    /// The local contract, once funded.
    pub fn contract(&self) -> Res<F::Contract> {
        Ok(self.state.contract()?)
    }

    /// The local funding reference, once funded.
    pub fn funding(&self) -> Res<F::FundingRef> {
        Ok(self.state.funding()?)
    }

    /// Create and fund the initiator contract paying `counterparty`.
    pub async fn initiate(
        &mut self,
        counterparty: &F::Address,
        amount: F::Amount,
        lock_time: u64,
    ) -> Res<FundedContract<F>> {
        self.check_role("initiate", SwapRole::Initiator)?;
        self.check_transition("initiate", SwapPhase::Funded)?;
        check_lock_time(lock_time)?;

        let funded = self
            .fund
            .initiate(counterparty, self.state.secret_hash, amount, lock_time)
            .await?;
        self.record_funding(&funded, lock_time)?;
        Ok(funded)
    }

    /// Create and fund the participant contract, symmetric to the initiator contract. A
    /// counter-party contract is audited on the ledger the local party redeems on first, nothing
    /// is funded unless it pays the local party and holds funds.
    pub async fn participate(
        &mut self,
        counterparty: &Counterparty<F::Address>,
        amount: F::Amount,
        lock_time: u64,
    ) -> Res<FundedContract<F>> {
        self.check_role("participate", SwapRole::Participant)?;
        self.check_transition("participate", SwapPhase::Funded)?;
        check_lock_time(lock_time)?;

        if let Counterparty::Contract { contract, funding } = counterparty {
            let (theirs, _) = self
                .redeem
                .audit_counterparty(contract, funding, &self.state.secret_hash)
                .await?;
            log::info!("{} | counter-party contract {:?} audited", self.state.id, theirs);
        }
        let funded = self
            .fund
            .participate(counterparty, self.state.secret_hash, amount, lock_time)
            .await?;
        self.record_funding(&funded, lock_time)?;
        Ok(funded)
    }

    /// Redeem the counter-party contract with the secret, then close the attempt.
    pub async fn redeem(
        &mut self,
        contract: &R::Contract,
        funding: &R::FundingRef,
        secret: &Secret,
        destination: &R::Address,
    ) -> Res<R::Transaction> {
        self.check_transition("redeem", SwapPhase::Redeemed)?;
        secret::verify(secret, &self.state.secret_hash)
            .then(|| 0)
            .ok_or(Error::SecretMismatch)?;

        let tx = self
            .redeem
            .redeem(contract, funding, secret, destination)
            .await?;
        self.state.secret = Some(*secret);
        self.transition("redeem", SwapPhase::Redeemed)?;
        self.store.save(&self.state)?;
        self.close()?;
        Ok(tx)
    }

    /// Refund the local contract after its lock time, then close the attempt.
    pub async fn refund(&mut self, destination: &F::Address) -> Res<F::Transaction> {
        self.check_transition("refund", SwapPhase::Refunded)?;
        let contract = self.contract()?;
        let funding = self.funding()?;

        let tx = self.fund.refund(&contract, &funding, destination).await?;
        self.transition("refund", SwapPhase::Refunded)?;
        self.store.save(&self.state)?;
        self.close()?;
        Ok(tx)
    }

    /// Extract the secret from the transaction redeeming the local contract, observed on the
    /// ledger, and record it.
    pub fn extract_secret(&mut self, tx: &F::Transaction) -> Res<Secret> {
        let secret = self.fund.extract_secret(tx, &self.state.secret_hash)?;
        self.state.secret = Some(secret);
        if !self.state.phase.is_terminal() {
            self.store.save(&self.state)?;
        }
        log::info!("{} | secret extracted", self.state.id);
        Ok(secret)
    }

    /// Cancel the attempt, only possible before any funds are committed.
    pub fn abandon(&mut self) -> Res<()> {
        self.transition("abandon", SwapPhase::Abandoned)?;
        self.store.remove(&self.state.id)?;
        Ok(())
    }

    fn record_funding(&mut self, funded: &FundedContract<F>, lock_time: u64) -> Res<()> {
        let FundedContract {
            contract, funding, ..
        } = funded;
        self.state.contract = Some(contract.as_canonical_bytes());
        self.state.funding = Some(funding.as_canonical_bytes());
        self.state.lock_time = lock_time;
        self.transition("fund", SwapPhase::Funded)?;
        if let Err(e) = self.store.save(&self.state) {
            // the funding is already accepted by the ledger
            log::error!(
                "{} | funded but state not recorded, contract {:?}, funding {:?}",
                self.state.id,
                contract,
                funding
            );
            return Err(e.into());
        }
        Ok(())
    }

    fn close(&mut self) -> Res<()> {
        self.transition("close", SwapPhase::Closed)?;
        self.store.remove(&self.state.id)?;
        Ok(())
    }

    fn check_role(&self, operation: &'static str, role: SwapRole) -> Res<()> {
        (self.state.role == role)
            .then(|| 0)
            .ok_or(Error::InvalidRole {
                operation,
                role: self.state.role,
            })?;
        Ok(())
    }

    fn check_transition(&self, operation: &'static str, next: SwapPhase) -> Res<()> {
        self.state
            .phase
            .can_transition_to(next)
            .then(|| 0)
            .ok_or(Error::InvalidPhase {
                operation,
                phase: self.state.phase,
            })?;
        Ok(())
    }

    fn transition(&mut self, operation: &'static str, next: SwapPhase) -> Res<()> {
        self.check_transition(operation, next)?;
        log::info!("{} | {} -> {}", self.state.id, self.state.phase, next);
        self.state.phase = next;
        Ok(())
    }
}

fn check_lock_time(lock_time: u64) -> Result<(), script::Error> {
    match lock_time {
        0 => Err(script::Error::InvalidLockTime(0)),
        _ => Ok(()),
    }
}
