//! Refund transaction, spending the contract output through the refund path once the contract
//! lock time passed.

use bitcoin::blockdata::script::Script;
use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::{Address, PublicKey, Sighash};

use crate::script::ScriptPath;
use crate::transaction::{Error as FError, Linkable, Refundable, Witnessable};

use crate::bitcoin::htlc::{refund_script_sig, AtomicSwapContract};
use crate::bitcoin::transaction::{
    self, MetadataOutput, PartialInput, PartialTx, SubTransaction, Tx,
};
use crate::bitcoin::Bitcoin;

/// Sequence of the refund input, must not be final for `OP_CHECKLOCKTIMEVERIFY` to pass.
pub const REFUND_SEQUENCE: u32 = 0;

/// Marker of the refund transaction.
#[derive(Debug, Clone)]
pub struct Refund;

impl SubTransaction for Refund {
    fn simulated_script_sig(input: &PartialInput) -> Result<Script, FError> {
        transaction::simulated_contract_script_sig(input, ScriptPath::Refund)
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
        let script_sig = refund_script_sig(sig, pubkey, contract);
        input.final_script_sig = Some(script_sig);
        Ok(())
    }
}

impl Witnessable<Bitcoin> for Tx<Refund> {
    fn generate_witness_message(&self, path: ScriptPath) -> Result<Sighash, FError> {
        transaction::contract_witness_message(&self.partial, ScriptPath::Refund, path)
    }

    fn add_witness(&mut self, pubkey: PublicKey, sig: Signature) -> Result<(), FError> {
        transaction::add_contract_witness(&mut self.partial, ScriptPath::Refund, pubkey, sig)
    }
}

impl Refundable<Bitcoin, MetadataOutput> for Tx<Refund> {
    fn initialize(
        prev: &impl Linkable<MetadataOutput>,
        contract: &AtomicSwapContract,
        refund_target: Address,
    ) -> Result<Self, FError> {
        let partial = transaction::spend_contract(
            prev,
            contract,
            &refund_target,
            contract.lock_time.as_u32(),
            REFUND_SEQUENCE,
        )?;
        Ok(Tx::from_partial(partial))
    }

    fn verify_template(&self, refund_target: Address) -> Result<(), FError> {
        transaction::verify_spending_template(&self.partial, &refund_target)?;
        let contract = self.partial.inputs[0].prevout.parse_contract()?;
        let tx = &self.partial.unsigned_tx;
        (tx.lock_time == contract.lock_time.as_u32())
            .then(|| 0)
            .ok_or(FError::WrongTemplate("LockTime does not match the contract"))?;
        (tx.input[0].sequence < u32::MAX)
            .then(|| 0)
            .ok_or(FError::WrongTemplate("Sequence is final, lock time disabled"))?;
        Ok(())
    }
}
