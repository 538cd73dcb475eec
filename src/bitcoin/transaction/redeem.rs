//! Redeem transaction, spending the contract output through the redeem path. The satisfying
//! script reveals the secret.

use bitcoin::blockdata::script::Script;
use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::{Address, PublicKey, Sighash};

use crate::script::ScriptPath;
use crate::secret::{Secret, SecretHash};
use crate::transaction::{Error as FError, Linkable, Redeemable, Witnessable};

use crate::bitcoin::htlc::{redeem_script_sig, AtomicSwapContract};
use crate::bitcoin::transaction::{
    self, MetadataOutput, PartialInput, PartialTx, SubTransaction, Tx,
};
use crate::bitcoin::Bitcoin;

/// Sequence of the redeem input, final as the redeem path is not time locked.
pub const REDEEM_SEQUENCE: u32 = u32::MAX;

/// Marker of the redeem transaction.
#[derive(Debug, Clone)]
pub struct Redeem;

impl SubTransaction for Redeem {
    fn simulated_script_sig(input: &PartialInput) -> Result<Script, FError> {
        transaction::simulated_contract_script_sig(input, ScriptPath::Redeem)
    }

    fn finalize(partial: &mut PartialTx) -> Result<(), FError> {
        let input = partial.inputs.get_mut(0).ok_or(FError::MissingUTXO)?;
        let contract = input
            .prevout
            .contract
            .as_ref()
            .ok_or(FError::MissingContract)?;
        let (pubkey, sig) = input
            .partial_sig
            .as_ref()
            .ok_or(FError::MissingSignature)?;
        let secret = input.secret.as_ref().ok_or(FError::MissingSecret)?;
        let script_sig = redeem_script_sig(sig, pubkey, secret, contract);
        input.final_script_sig = Some(script_sig);
        Ok(())
    }
}

impl Witnessable<Bitcoin> for Tx<Redeem> {
    fn generate_witness_message(&self, path: ScriptPath) -> Result<Sighash, FError> {
        transaction::contract_witness_message(&self.partial, ScriptPath::Redeem, path)
    }

    fn add_witness(&mut self, pubkey: PublicKey, sig: Signature) -> Result<(), FError> {
        transaction::add_contract_witness(&mut self.partial, ScriptPath::Redeem, pubkey, sig)
    }
}

impl Redeemable<Bitcoin, MetadataOutput> for Tx<Redeem> {
    fn initialize(
        prev: &impl Linkable<MetadataOutput>,
        contract: &AtomicSwapContract,
        destination_target: Address,
    ) -> Result<Self, FError> {
        let partial =
            transaction::spend_contract(prev, contract, &destination_target, 0, REDEEM_SEQUENCE)?;
        Ok(Tx::from_partial(partial))
    }

    fn add_secret(&mut self, secret: Secret) -> Result<(), FError> {
        let input = self.partial.inputs.get_mut(0).ok_or(FError::MissingUTXO)?;
        let contract = input.prevout.parse_contract()?;
        crate::secret::verify(&secret, &contract.secret_hash)
            .then(|| 0)
            .ok_or(FError::InvalidSecret)?;
        input.secret = Some(secret);
        Ok(())
    }

    fn verify_template(&self, destination_target: Address) -> Result<(), FError> {
        transaction::verify_spending_template(&self.partial, &destination_target)?;
        let tx = &self.partial.unsigned_tx;
        (tx.lock_time == 0)
            .then(|| 0)
            .ok_or(FError::WrongTemplate("LockTime is not set to 0"))?;
        (tx.input[0].sequence == REDEEM_SEQUENCE)
            .then(|| 0)
            .ok_or(FError::WrongTemplate("Sequence is not final"))?;
        Ok(())
    }

    fn extract_secret(tx: &bitcoin::Transaction, secret_hash: &SecretHash) -> Option<Secret> {
        transaction::extract_secret(tx, secret_hash)
    }
}
