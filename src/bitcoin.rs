//! Implementation for Bitcoin-like blockchains as the script-based ledger family of a swap.
//! Contracts are legacy pay-to-script-hash outputs locked with the atomic swap contract script,
//! spent with ECDSA signatures over legacy signature hashes.

use std::fmt::Debug;

use bitcoin::blockdata::script::Script;
use bitcoin::blockdata::transaction::{EcdsaSighashType, OutPoint};
use bitcoin::secp256k1::{ecdsa::Signature, All, Message, Secp256k1, SecretKey, Signing};
use bitcoin::{Address as BtcAddress, Amount, PublicKey, Sighash};

use crate::blockchain::{Address, Asset, Htlc, Network, Onchain, Timelock};
use crate::crypto::{self, Keys, Sign, Signatures};
use crate::transaction::Error as FError;

pub mod address;
pub(crate) mod amount;
pub mod fee;
pub mod htlc;
pub mod timelock;
pub mod transaction;
pub mod validator;

use htlc::AtomicSwapContract;
use timelock::CltvLockTime;
use transaction::{MetadataOutput, PartialTx};

/// Outputs below this value are not relayed by Bitcoin nodes.
pub const DUST_LIMIT: u64 = 546;

/// The Bitcoin blockchain using legacy pay-to-script-hash contracts and ECDSA signatures.
#[derive(Clone, Debug, Copy, Eq, PartialEq, Default)]
pub struct Bitcoin;

impl Onchain for Bitcoin {
    type PartialTransaction = PartialTx;
    type Transaction = bitcoin::Transaction;
}

impl Asset for Bitcoin {
    type AssetUnit = Amount;
}

impl Address for Bitcoin {
    type Address = BtcAddress;
}

impl Timelock for Bitcoin {
    type Timelock = CltvLockTime;
}

impl Htlc for Bitcoin {
    type Contract = AtomicSwapContract;
}

impl Keys for Bitcoin {
    type PublicKey = PublicKey;
}

impl Signatures for Bitcoin {
    type Message = Sighash;
    type Signature = Signature;
}

impl From<Network> for bitcoin::Network {
    fn from(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::Bitcoin,
            Network::Testnet => Self::Testnet,
            Network::Local => Self::Regtest,
        }
    }
}

impl From<bitcoin::Network> for Network {
    fn from(network: bitcoin::Network) -> Self {
        match network {
            bitcoin::Network::Bitcoin => Self::Mainnet,
            bitcoin::Network::Testnet => Self::Testnet,
            bitcoin::Network::Signet => Self::Testnet,
            bitcoin::Network::Regtest => Self::Local,
        }
    }
}

/// Computes the legacy signature hash of the input at `index` with the given script code, the
/// previous output script for pay-to-pubkey-hash inputs or the contract for pay-to-script-hash
/// inputs.
pub fn signature_hash(
    tx: &bitcoin::Transaction,
    index: usize,
    script_code: &Script,
    sighash_type: EcdsaSighashType,
) -> Sighash {
    tx.signature_hash(index, script_code, sighash_type.to_u32())
}

/// Computes a low-S normalized ECDSA signature for the given hash. Assumes that the hash is
/// correctly computed.
pub fn sign_hash<C>(
    context: &Secp256k1<C>,
    sighash: &Sighash,
    secret_key: &SecretKey,
) -> Result<Signature, bitcoin::secp256k1::Error>
where
    C: Signing,
{
    let msg = Message::from_slice(&sighash[..])?;
    let mut sig = context.sign_ecdsa(&msg, secret_key);
    sig.normalize_s();
    Ok(sig)
}

/// Owns the participant secret key and signs spending transactions. The key is injected by the
/// caller, no key derivation or storage happens here.
#[derive(Clone)]
pub struct KeyManager {
    context: Secp256k1<All>,
    secret_key: SecretKey,
}

impl Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("pubkey", &self.get_pubkey())
            .finish()
    }
}

impl KeyManager {
    /// Create a new key manager from a secret key.
    pub fn new(secret_key: SecretKey) -> Self {
        Self {
            context: Secp256k1::new(),
            secret_key,
        }
    }

    /// Create a new key manager with a fresh random key.
    pub fn new_random() -> Self {
        let context = Secp256k1::new();
        let (secret_key, _) = context.generate_keypair(&mut bitcoin::secp256k1::rand::thread_rng());
        Self {
            context,
            secret_key,
        }
    }

    /// Return the compressed public key hash, used as recipient or refund hash in contracts.
    pub fn pubkey_hash(&self) -> bitcoin::PubkeyHash {
        self.get_pubkey().pubkey_hash()
    }

    /// Return the pay-to-pubkey-hash address of the key on the given network.
    pub fn address(&self, network: Network) -> BtcAddress {
        BtcAddress::p2pkh(&self.get_pubkey(), network.into())
    }
}

impl Sign<PublicKey, Sighash, Signature> for KeyManager {
    fn get_pubkey(&self) -> PublicKey {
        PublicKey::new(bitcoin::secp256k1::PublicKey::from_secret_key(
            &self.context,
            &self.secret_key,
        ))
    }

    fn sign(&self, msg: Sighash) -> Result<Signature, crypto::Error> {
        sign_hash(&self.context, &msg, &self.secret_key).map_err(crypto::Error::new)
    }

    fn verify_signature(
        &self,
        key: &PublicKey,
        msg: Sighash,
        sig: &Signature,
    ) -> Result<(), crypto::Error> {
        let msg = Message::from_slice(&msg[..]).map_err(crypto::Error::new)?;
        self.context
            .verify_ecdsa(&msg, sig, &key.inner)
            .map_err(|_| crypto::Error::InvalidSignature)
    }
}

/// A contract audited against the counter-party funding transaction.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[display("{contract}, output: {funding} of {value}, address: {address}")]
pub struct AuditedContract {
    /// The validated contract fields.
    pub contract: AtomicSwapContract,
    /// The contract output in the funding transaction.
    pub funding: OutPoint,
    /// Value locked in the contract.
    pub value: Amount,
    /// The pay-to-script-hash address of the contract.
    pub address: BtcAddress,
    /// The consumable contract output.
    pub output: MetadataOutput,
}

/// Validate a contract received from a counter-party and locate the output paying to it in the
/// counter-party funding transaction. Must succeed before committing funds against the contract.
pub fn audit_contract(
    contract_bytes: &[u8],
    funding_tx: &bitcoin::Transaction,
    network: Network,
) -> Result<AuditedContract, crate::Error> {
    let contract = validator::extract_contract(contract_bytes)?;
    let address = contract.address(network).map_err(FError::new)?;
    let output = MetadataOutput::from_funding(funding_tx, &contract)?;
    Ok(AuditedContract {
        contract,
        funding: output.out_point,
        value: Amount::from_sat(output.tx_out.value),
        address,
        output,
    })
}
