//! Funding transaction, spending pay-to-pubkey-hash wallet outputs to lock the swap amount in the
//! contract output. The change, if any, is the second output.

use bitcoin::blockdata::script::{Builder, Script};
use bitcoin::blockdata::transaction::{EcdsaSighashType, OutPoint, TxIn, TxOut};
use bitcoin::blockdata::witness::Witness;
use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::{Address, Amount, EcdsaSig, PublicKey, Sighash};

use crate::transaction::{Broadcastable, Error as FError, Fundable, Linkable};

use crate::bitcoin::htlc::AtomicSwapContract;
use crate::bitcoin::transaction::{
    MetadataOutput, PartialInput, PartialTx, SubTransaction, Tx, MAX_SIG_LENGTH, PUBKEY_LENGTH,
};
use crate::bitcoin::Bitcoin;

/// Index of the contract output in the funding transaction.
pub const CONTRACT_OUTPUT_INDEX: usize = 0;
/// Index of the change output in the funding transaction, when present.
pub const CHANGE_OUTPUT_INDEX: usize = 1;

/// Marker of the funding transaction.
#[derive(Debug, Clone)]
pub struct Funding;

impl SubTransaction for Funding {
    fn simulated_script_sig(_input: &PartialInput) -> Result<Script, FError> {
        Ok(Builder::new()
            .push_slice(&[0u8; MAX_SIG_LENGTH])
            .push_slice(&[0u8; PUBKEY_LENGTH])
            .into_script())
    }

    fn finalize(partial: &mut PartialTx) -> Result<(), FError> {
        for input in partial.inputs.iter_mut() {
            let (pubkey, sig) = input.partial_sig.as_ref().ok_or(FError::MissingSignature)?;
            input.final_script_sig = Some(
                Builder::new()
                    .push_slice(&sig.to_vec())
                    .push_key(pubkey)
                    .into_script(),
            );
        }
        Ok(())
    }
}

impl Tx<Funding> {
    /// Return the change output, if any.
    pub fn change_output(&self) -> Option<&TxOut> {
        self.partial.unsigned_tx.output.get(CHANGE_OUTPUT_INDEX)
    }

    pub(crate) fn is_finalized(&self) -> bool {
        self.partial
            .inputs
            .iter()
            .all(|input| input.final_script_sig.is_some())
    }
}

impl Linkable<MetadataOutput> for Tx<Funding> {
    /// The identifier of a legacy transaction commits to the unlocking scripts, the contract
    /// output is only known once every input is finalized.
    fn get_consumable_output(&self) -> Result<MetadataOutput, FError> {
        self.is_finalized()
            .then(|| 0)
            .ok_or(FError::MissingSignature)?;
        let txid = self.extract().txid();
        let tx_out = self
            .partial
            .unsigned_tx
            .output
            .get(CONTRACT_OUTPUT_INDEX)
            .ok_or(FError::MissingUTXO)?;
        Ok(MetadataOutput {
            out_point: OutPoint::new(txid, CONTRACT_OUTPUT_INDEX as u32),
            tx_out: tx_out.clone(),
            contract: Some(
                self.partial
                    .locked_contract
                    .clone()
                    .ok_or(FError::MissingContract)?,
            ),
        })
    }
}

impl Fundable<Bitcoin, MetadataOutput> for Tx<Funding> {
    fn initialize(
        inputs: Vec<MetadataOutput>,
        contract: &AtomicSwapContract,
        target_amount: Amount,
        change_target: Address,
    ) -> Result<Self, FError> {
        (!inputs.is_empty())
            .then(|| 0)
            .ok_or(FError::MissingUTXO)?;
        inputs
            .iter()
            .all(|input| input.tx_out.script_pubkey.is_p2pkh())
            .then(|| 0)
            .ok_or(FError::WrongTemplate("Funding inputs must be pay-to-pubkey-hash"))?;

        let input_value: u64 = inputs.iter().map(|input| input.tx_out.value).sum();
        let change = input_value
            .checked_sub(target_amount.as_sat())
            .ok_or(FError::NotEnoughAssets)?;

        let unsigned_tx = bitcoin::Transaction {
            version: 2,
            lock_time: 0,
            input: inputs
                .iter()
                .map(|input| TxIn {
                    previous_output: input.out_point,
                    script_sig: Script::default(),
                    sequence: u32::MAX,
                    witness: Witness::new(),
                })
                .collect(),
            output: vec![
                TxOut {
                    value: target_amount.as_sat(),
                    script_pubkey: contract.script_pubkey(),
                },
                TxOut {
                    value: change,
                    script_pubkey: change_target.script_pubkey(),
                },
            ],
        };

        let mut partial = PartialTx::new(unsigned_tx, inputs)?;
        partial.locked_contract = Some(contract.script());
        Ok(Tx::from_partial(partial))
    }

    fn verify_template(
        &self,
        contract: &AtomicSwapContract,
        target_amount: Amount,
    ) -> Result<(), FError> {
        let tx = &self.partial.unsigned_tx;
        (tx.version == 2)
            .then(|| 0)
            .ok_or(FError::WrongTemplate("Tx version is not 2"))?;
        (tx.lock_time == 0)
            .then(|| 0)
            .ok_or(FError::WrongTemplate("LockTime is not set to 0"))?;
        (!tx.input.is_empty())
            .then(|| 0)
            .ok_or(FError::WrongTemplate("Transaction has no input"))?;
        (tx.output.len() == 1 || tx.output.len() == 2)
            .then(|| 0)
            .ok_or(FError::WrongTemplate("Number of outputs is not 1 or 2"))?;

        let txout = &tx.output[CONTRACT_OUTPUT_INDEX];
        (txout.script_pubkey == contract.script_pubkey())
            .then(|| 0)
            .ok_or(FError::WrongTemplate("Contract output does not match"))?;
        (txout.value == target_amount.as_sat())
            .then(|| 0)
            .ok_or(FError::InvalidTargetAmount)?;
        (self.partial.locked_contract.as_ref() == Some(&contract.script()))
            .then(|| 0)
            .ok_or(FError::MissingContract)?;

        Ok(())
    }

    fn generate_input_messages(&self) -> Result<Vec<Sighash>, FError> {
        (0..self.partial.inputs.len())
            .map(|index| self.partial.signature_hash(index))
            .collect()
    }

    fn add_input_witness(
        &mut self,
        index: usize,
        pubkey: PublicKey,
        sig: Signature,
    ) -> Result<(), FError> {
        let input = self
            .partial
            .inputs
            .get_mut(index)
            .ok_or(FError::MissingUTXO)?;
        (Script::new_p2pkh(&pubkey.pubkey_hash()) == input.prevout.tx_out.script_pubkey)
            .then(|| 0)
            .ok_or(FError::InvalidPublicKey)?;
        input.partial_sig = Some((
            pubkey,
            EcdsaSig {
                sig,
                hash_ty: EcdsaSighashType::All,
            },
        ));
        Ok(())
    }
}
