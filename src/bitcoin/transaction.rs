//! Bitcoin transactions of the swap: the [`Funding`] transaction locking funds in a contract, the
//! [`Redeem`] transaction revealing the secret and the [`Refund`] transaction after the lock
//! time. All three share the [`Tx`] wrapper around a [`PartialTx`].

use std::fmt::Debug;
use std::io;
use std::marker::PhantomData;

use bitcoin::blockdata::script::{Instruction, Script};
use bitcoin::blockdata::transaction::{EcdsaSighashType, OutPoint, TxIn, TxOut};
use bitcoin::blockdata::witness::Witness;
use bitcoin::consensus::encode::{self as btc_encode, Decodable as BtcDecodable};
use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::{Amount, EcdsaSig, PublicKey};

use thiserror::Error;

use crate::bitcoin::htlc::{satisfying_script, AtomicSwapContract};
use crate::bitcoin::Bitcoin;
use crate::consensus::{self, CanonicalBytes};
use crate::script::ScriptPath;
use crate::secret::{Secret, SecretHash};
use crate::transaction::{Broadcastable, Error as FError, Finalizable, Linkable, Transaction};

pub mod funding;
pub mod redeem;
pub mod refund;

pub use funding::Funding;
pub use redeem::Redeem;
pub use refund::Refund;

/// Bitcoin specific transaction errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Multi-output transaction is not supported
    #[error("Multi-output transaction is not supported")]
    MultiUTXOUnsuported,
    /// Bitcoin address error
    #[error("Bitcoin address error: `{0}`")]
    Address(#[from] bitcoin::util::address::Error),
    /// Secp256k1 error
    #[error("Secp256k1 error: `{0}`")]
    Secp256k1(#[from] bitcoin::secp256k1::Error),
    /// Bitcoin script error
    #[error("Bitcoin script error: `{0}`")]
    BitcoinScript(#[from] bitcoin::blockdata::script::Error),
}

impl From<Error> for FError {
    fn from(e: Error) -> FError {
        FError::new(e)
    }
}

/// An output of a transaction with the data needed to spend it: the outpoint, the output itself,
/// and for contract outputs the contract script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataOutput {
    /// The outpoint referencing the output.
    pub out_point: OutPoint,
    /// The output, value and locking script.
    pub tx_out: TxOut,
    /// The contract script for pay-to-script-hash contract outputs, `None` for wallet outputs.
    pub contract: Option<Script>,
}

impl MetadataOutput {
    /// Create the metadata of a wallet pay-to-pubkey-hash output.
    pub fn new(out_point: OutPoint, tx_out: TxOut) -> Self {
        Self {
            out_point,
            tx_out,
            contract: None,
        }
    }

    /// Locate the output paying to the contract in a funding transaction seen on-chain.
    pub fn from_funding(
        tx: &bitcoin::Transaction,
        contract: &AtomicSwapContract,
    ) -> Result<Self, FError> {
        let script_pubkey = contract.script_pubkey();
        tx.output
            .iter()
            .enumerate()
            .find(|(_, tx_out)| tx_out.script_pubkey == script_pubkey)
            .map(|(ix, tx_out)| MetadataOutput {
                out_point: OutPoint::new(tx.txid(), ix as u32),
                tx_out: tx_out.clone(),
                contract: Some(contract.script()),
            })
            .ok_or(FError::MissingUTXO)
    }

    /// Return the value of the output.
    pub fn value(&self) -> Amount {
        Amount::from_sat(self.tx_out.value)
    }

    /// Parse the contract attached to the output, fails if the output is not a contract output.
    pub fn parse_contract(&self) -> Result<AtomicSwapContract, FError> {
        let script = self.contract.as_ref().ok_or(FError::MissingContract)?;
        let contract = AtomicSwapContract::from_script(script).map_err(FError::new)?;
        (contract.script_pubkey() == self.tx_out.script_pubkey)
            .then(|| 0)
            .ok_or(FError::WrongTemplate("Contract does not match the output script"))?;
        Ok(contract)
    }
}

impl Linkable<MetadataOutput> for MetadataOutput {
    fn get_consumable_output(&self) -> Result<MetadataOutput, FError> {
        Ok(self.clone())
    }
}

impl CanonicalBytes for MetadataOutput {
    fn as_canonical_bytes(&self) -> Vec<u8> {
        let mut bytes = btc_encode::serialize(&self.out_point);
        bytes.extend(btc_encode::serialize(&self.tx_out));
        bytes.extend(btc_encode::serialize(
            &self.contract.clone().unwrap_or_default(),
        ));
        bytes
    }

    fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, consensus::Error>
    where
        Self: Sized,
    {
        let mut cursor = io::Cursor::new(bytes);
        let out_point = OutPoint::consensus_decode(&mut cursor).map_err(consensus::Error::new)?;
        let tx_out = TxOut::consensus_decode(&mut cursor).map_err(consensus::Error::new)?;
        let contract = Script::consensus_decode(&mut cursor).map_err(consensus::Error::new)?;
        if cursor.position() as usize != bytes.len() {
            return Err(consensus::Error::ParseFailed(
                "data not consumed entirely when decoding output metadata",
            ));
        }
        Ok(Self {
            out_point,
            tx_out,
            contract: (!contract.is_empty()).then(|| contract),
        })
    }
}

/// Input of a partial transaction with the data needed to produce its unlocking script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialInput {
    /// The output spent by the input.
    pub prevout: MetadataOutput,
    /// The signature and the public key used to sign.
    pub partial_sig: Option<(PublicKey, EcdsaSig)>,
    /// The secret revealed on the redeem path.
    pub secret: Option<Secret>,
    /// The unlocking script, set at finalization.
    pub final_script_sig: Option<Script>,
}

impl PartialInput {
    /// Create a new input spending `prevout`.
    pub fn new(prevout: MetadataOutput) -> Self {
        Self {
            prevout,
            partial_sig: None,
            secret: None,
            final_script_sig: None,
        }
    }

    /// Return the script code signed for this input, the contract for contract outputs or the
    /// previous output script for wallet outputs.
    pub fn script_code(&self) -> &Script {
        self.prevout
            .contract
            .as_ref()
            .unwrap_or(&self.prevout.tx_out.script_pubkey)
    }
}

/// An unsigned Bitcoin transaction with the metadata of every input, the partial format used to
/// build, sign and finalize swap transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialTx {
    /// The transaction without unlocking scripts.
    pub unsigned_tx: bitcoin::Transaction,
    /// The metadata of each input, in the same order as the transaction inputs.
    pub inputs: Vec<PartialInput>,
    /// The contract locked by the first output, set on funding transactions.
    pub locked_contract: Option<Script>,
}

impl PartialTx {
    /// Create a new partial transaction, fails if the metadata does not match the inputs.
    pub fn new(
        unsigned_tx: bitcoin::Transaction,
        prevouts: Vec<MetadataOutput>,
    ) -> Result<Self, FError> {
        (unsigned_tx.input.len() == prevouts.len())
            .then(|| 0)
            .ok_or(FError::MissingUTXO)?;
        unsigned_tx
            .input
            .iter()
            .zip(prevouts.iter())
            .all(|(txin, prevout)| txin.previous_output == prevout.out_point)
            .then(|| 0)
            .ok_or(FError::InvalidTransactionChain)?;
        Ok(Self {
            unsigned_tx,
            inputs: prevouts.into_iter().map(PartialInput::new).collect(),
            locked_contract: None,
        })
    }

    /// Sum of the values of the spent outputs.
    pub fn input_value(&self) -> Amount {
        Amount::from_sat(self.inputs.iter().map(|i| i.prevout.tx_out.value).sum())
    }

    /// Sum of the values of the outputs.
    pub fn output_value(&self) -> Amount {
        Amount::from_sat(self.unsigned_tx.output.iter().map(|o| o.value).sum())
    }

    /// Compute the legacy `SIGHASH_ALL` signature hash of the input at `index`.
    pub fn signature_hash(&self, index: usize) -> Result<bitcoin::Sighash, FError> {
        let input = self.inputs.get(index).ok_or(FError::MissingUTXO)?;
        Ok(crate::bitcoin::signature_hash(
            &self.unsigned_tx,
            index,
            input.script_code(),
            EcdsaSighashType::All,
        ))
    }

    /// Return the transaction with the given unlocking scripts, or with the final unlocking
    /// scripts when `script_sigs` is `None`.
    fn with_script_sigs(&self, script_sigs: Option<Vec<Script>>) -> bitcoin::Transaction {
        let mut tx = self.unsigned_tx.clone();
        let script_sigs = script_sigs.unwrap_or_else(|| {
            self.inputs
                .iter()
                .map(|i| i.final_script_sig.clone().unwrap_or_default())
                .collect()
        });
        for (txin, script_sig) in tx.input.iter_mut().zip(script_sigs) {
            txin.script_sig = script_sig;
        }
        tx
    }
}

/// Behavior specific to each kind of swap transaction.
pub trait SubTransaction: Debug {
    /// Upper bound unlocking script for the input, used to estimate the transaction size before
    /// signing.
    fn simulated_script_sig(input: &PartialInput) -> Result<Script, FError>;

    /// Create the unlocking scripts from the signatures and data added to the partial
    /// transaction.
    fn finalize(partial: &mut PartialTx) -> Result<(), FError>;
}

/// A swap transaction of kind `T`, the generic wrapper for [`Funding`], [`Redeem`] and
/// [`Refund`].
#[derive(Debug, Clone)]
pub struct Tx<T: SubTransaction> {
    pub(crate) partial: PartialTx,
    pub(crate) _t: PhantomData<T>,
}

impl<T> Tx<T>
where
    T: SubTransaction,
{
    pub(crate) fn from_partial(partial: PartialTx) -> Self {
        Self {
            partial,
            _t: PhantomData,
        }
    }

    /// Return the transaction with upper bound unlocking scripts, its serialized size is the
    /// upper bound of the final transaction size.
    pub fn simulated_transaction(&self) -> Result<bitcoin::Transaction, FError> {
        let script_sigs = self
            .partial
            .inputs
            .iter()
            .map(T::simulated_script_sig)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.partial.with_script_sigs(Some(script_sigs)))
    }

    /// Upper bound of the serialized size of the final transaction, in bytes.
    pub fn estimated_size(&self) -> Result<usize, FError> {
        Ok(btc_encode::serialize(&self.simulated_transaction()?).len())
    }
}

impl<T> Transaction<Bitcoin, MetadataOutput> for Tx<T>
where
    T: SubTransaction,
{
    fn as_partial(&self) -> &PartialTx {
        &self.partial
    }

    fn as_partial_mut(&mut self) -> &mut PartialTx {
        &mut self.partial
    }

    fn to_partial(self) -> PartialTx {
        self.partial
    }

    fn based_on(&self) -> MetadataOutput {
        // a partial transaction always has at least one input
        self.partial.inputs[0].prevout.clone()
    }

    fn output_amount(&self) -> Amount {
        Amount::from_sat(self.partial.unsigned_tx.output[0].value)
    }
}

impl<T> Finalizable for Tx<T>
where
    T: SubTransaction,
{
    fn finalize(&mut self) -> Result<(), FError> {
        T::finalize(&mut self.partial)
    }
}

impl<T> Broadcastable<Bitcoin> for Tx<T>
where
    T: SubTransaction,
{
    fn extract(&self) -> bitcoin::Transaction {
        self.partial.with_script_sigs(None)
    }
}

/// Upper bound length of a DER encoded signature with its sighash type byte.
pub const MAX_SIG_LENGTH: usize = 73;
/// Length of a compressed public key.
pub const PUBKEY_LENGTH: usize = 33;

/// Create the partial transaction spending the contract output of `prev` to `destination`.
pub(crate) fn spend_contract(
    prev: &impl Linkable<MetadataOutput>,
    contract: &AtomicSwapContract,
    destination: &bitcoin::Address,
    lock_time: u32,
    sequence: u32,
) -> Result<PartialTx, FError> {
    let mut prevout = prev.get_consumable_output()?;
    (prevout.tx_out.script_pubkey == contract.script_pubkey())
        .then(|| 0)
        .ok_or(FError::WrongTemplate("Output is not locked by the contract"))?;
    prevout.contract = Some(contract.script());

    let unsigned_tx = bitcoin::Transaction {
        version: 2,
        lock_time,
        input: vec![TxIn {
            previous_output: prevout.out_point,
            script_sig: Script::default(),
            sequence,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: prevout.tx_out.value,
            script_pubkey: destination.script_pubkey(),
        }],
    };

    PartialTx::new(unsigned_tx, vec![prevout])
}

/// Verify the shape shared by the transactions spending a contract: one input, one output
/// paying `destination`.
pub(crate) fn verify_spending_template(
    partial: &PartialTx,
    destination: &bitcoin::Address,
) -> Result<(), FError> {
    let tx = &partial.unsigned_tx;
    (tx.version == 2)
        .then(|| 0)
        .ok_or(FError::WrongTemplate("Tx version is not 2"))?;
    (tx.input.len() == 1)
        .then(|| 0)
        .ok_or(FError::WrongTemplate("Number of inputs is not 1"))?;
    (tx.output.len() == 1)
        .then(|| 0)
        .ok_or(FError::WrongTemplate("Number of outputs is not 1"))?;
    (tx.output[0].script_pubkey == destination.script_pubkey())
        .then(|| 0)
        .ok_or(FError::WrongTemplate("Script pubkey does not match"))?;
    Ok(())
}

/// Generate the message to sign for the contract input through `path`, fails if the transaction
/// does not spend that path.
pub(crate) fn contract_witness_message(
    partial: &PartialTx,
    expected: ScriptPath,
    path: ScriptPath,
) -> Result<bitcoin::Sighash, FError> {
    (path == expected)
        .then(|| 0)
        .ok_or(FError::WrongTemplate("Transaction does not spend this script path"))?;
    partial.signature_hash(0)
}

/// Store the signature of the contract input after checking the key is allowed to spend the
/// `path`.
pub(crate) fn add_contract_witness(
    partial: &mut PartialTx,
    path: ScriptPath,
    pubkey: PublicKey,
    sig: Signature,
) -> Result<(), FError> {
    let input = partial.inputs.get_mut(0).ok_or(FError::MissingUTXO)?;
    let contract = input.prevout.parse_contract()?;
    (pubkey.pubkey_hash() == *contract.pubkey_hash(path))
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

/// Build the upper bound unlocking script of a contract input for the `path`.
pub(crate) fn simulated_contract_script_sig(
    input: &PartialInput,
    path: ScriptPath,
) -> Result<Script, FError> {
    let contract = input.prevout.contract.as_ref().ok_or(FError::MissingContract)?;
    let secret = match path {
        ScriptPath::Redeem => &[0u8; Secret::LENGTH][..],
        ScriptPath::Refund => &[],
    };
    Ok(satisfying_script(
        path,
        &[0u8; MAX_SIG_LENGTH],
        &[0u8; PUBKEY_LENGTH],
        secret,
        contract,
    ))
}

/// Scan every unlocking script of the transaction for a 32 bytes push hashing to `secret_hash`.
pub fn extract_secret(tx: &bitcoin::Transaction, secret_hash: &SecretHash) -> Option<Secret> {
    tx.input
        .iter()
        .flat_map(|txin| txin.script_sig.instructions())
        .filter_map(|instruction| match instruction {
            Ok(Instruction::PushBytes(bytes)) if bytes.len() == Secret::LENGTH => {
                Secret::try_from(bytes).ok()
            }
            _ => None,
        })
        .find(|secret| crate::secret::verify(secret, secret_hash))
}
