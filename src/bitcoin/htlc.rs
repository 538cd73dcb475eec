//! Atomic swap contract script for Bitcoin-like ledgers, spent through pay-to-script-hash. The
//! contract has two spending paths:
//!
//! ```text
//! OP_IF
//!     OP_RIPEMD160 <secret hash> OP_EQUALVERIFY
//!     OP_DUP OP_HASH160 <recipient pubkey hash>
//! OP_ELSE
//!     <lock time> OP_CHECKLOCKTIMEVERIFY OP_DROP
//!     OP_DUP OP_HASH160 <refund pubkey hash>
//! OP_ENDIF
//! OP_EQUALVERIFY OP_CHECKSIG
//! ```
//!
//! The contract is rebuilt from its fields with [`AtomicSwapContract::script`] and parsed back
//! with [`AtomicSwapContract::from_script`], see the [`validator`](crate::bitcoin::validator)
//! module.

use std::convert::TryFrom;
use std::fmt;

use bitcoin::blockdata::opcodes;
use bitcoin::blockdata::script::{Builder, Script};
use bitcoin::hashes::Hash;
use bitcoin::{Address, EcdsaSig, PubkeyHash, PublicKey};

use crate::bitcoin::timelock::CltvLockTime;
use crate::bitcoin::validator;
use crate::blockchain::Network;
use crate::consensus::{self, CanonicalBytes};
use crate::script::{self, ScriptPath};
use crate::secret::{Secret, SecretHash};

/// Length of the pushed hashes in the contract, secret hash and public key hashes.
pub const HASH_LENGTH: usize = 20;

/// Template positions of the pushed fields, zero-based.
pub(crate) const SECRET_HASH_POSITION: usize = 2;
pub(crate) const RECIPIENT_POSITION: usize = 6;
pub(crate) const LOCK_TIME_POSITION: usize = 8;
pub(crate) const REFUND_POSITION: usize = 13;

/// The four fields of an atomic swap contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AtomicSwapContract {
    /// Hash the secret revealed in the redeem path must match.
    pub secret_hash: SecretHash,
    /// Public key hash allowed to redeem with the secret.
    pub recipient: PubkeyHash,
    /// Public key hash allowed to refund after the lock time.
    pub refund: PubkeyHash,
    /// Absolute lock time of the refund path.
    pub lock_time: CltvLockTime,
}

impl AtomicSwapContract {
    /// Create a new contract from its fields.
    pub fn new(
        secret_hash: SecretHash,
        recipient: PubkeyHash,
        refund: PubkeyHash,
        lock_time: CltvLockTime,
    ) -> Self {
        Self {
            secret_hash,
            recipient,
            refund,
            lock_time,
        }
    }

    /// Build the contract script.
    pub fn script(&self) -> Script {
        Builder::new()
            .push_opcode(opcodes::all::OP_IF)
            .push_opcode(opcodes::all::OP_RIPEMD160)
            .push_slice(self.secret_hash.as_bytes())
            .push_opcode(opcodes::all::OP_EQUALVERIFY)
            .push_opcode(opcodes::all::OP_DUP)
            .push_opcode(opcodes::all::OP_HASH160)
            .push_slice(&self.recipient[..])
            .push_opcode(opcodes::all::OP_ELSE)
            .push_slice(&self.lock_time.to_push_bytes())
            .push_opcode(opcodes::all::OP_CLTV)
            .push_opcode(opcodes::all::OP_DROP)
            .push_opcode(opcodes::all::OP_DUP)
            .push_opcode(opcodes::all::OP_HASH160)
            .push_slice(&self.refund[..])
            .push_opcode(opcodes::all::OP_ENDIF)
            .push_opcode(opcodes::all::OP_EQUALVERIFY)
            .push_opcode(opcodes::all::OP_CHECKSIG)
            .into_script()
    }

    /// Parse and validate a contract script received from a counter-party.
    pub fn from_script(script: &Script) -> Result<Self, script::Error> {
        validator::extract_contract(script.as_bytes())
    }

    /// Return the pay-to-script-hash output script locking funds in the contract.
    pub fn script_pubkey(&self) -> Script {
        self.script().to_p2sh()
    }

    /// Return the pay-to-script-hash address of the contract on the given network.
    pub fn address(&self, network: Network) -> Result<Address, bitcoin::util::address::Error> {
        Address::p2sh(&self.script(), network.into())
    }

    /// Return the public key hash allowed to spend through the given path.
    pub fn pubkey_hash(&self, path: ScriptPath) -> &PubkeyHash {
        match path {
            ScriptPath::Redeem => &self.recipient,
            ScriptPath::Refund => &self.refund,
        }
    }
}

impl fmt::Display for AtomicSwapContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "secret hash: {}, recipient: {}, refund: {}, lock time: {}",
            self.secret_hash, self.recipient, self.refund, self.lock_time
        )
    }
}

impl TryFrom<&Script> for AtomicSwapContract {
    type Error = script::Error;

    fn try_from(script: &Script) -> Result<Self, Self::Error> {
        Self::from_script(script)
    }
}

impl CanonicalBytes for AtomicSwapContract {
    fn as_canonical_bytes(&self) -> Vec<u8> {
        self.script().into_bytes()
    }

    fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, consensus::Error>
    where
        Self: Sized,
    {
        validator::extract_contract(bytes).map_err(consensus::Error::new)
    }
}

fn hash_field(bytes: &[u8], position: usize) -> Result<[u8; HASH_LENGTH], script::Error> {
    <[u8; HASH_LENGTH]>::try_from(bytes).map_err(|_| script::Error::InvalidFieldLength {
        position,
        expected: HASH_LENGTH,
        found: bytes.len(),
    })
}

/// Build a contract script from raw fields. Hash fields must be exactly 20 bytes long and the lock
/// time must be a valid [`CltvLockTime`].
pub fn build_contract_script(
    refund_pubkey_hash: &[u8],
    recipient_pubkey_hash: &[u8],
    lock_time: u32,
    secret_hash: &[u8],
) -> Result<AtomicSwapContract, script::Error> {
    let secret_hash = SecretHash::from(hash_field(secret_hash, SECRET_HASH_POSITION)?);
    let recipient = PubkeyHash::from_inner(hash_field(recipient_pubkey_hash, RECIPIENT_POSITION)?);
    let refund = PubkeyHash::from_inner(hash_field(refund_pubkey_hash, REFUND_POSITION)?);
    let lock_time = CltvLockTime::new(lock_time)?;
    Ok(AtomicSwapContract::new(
        secret_hash,
        recipient,
        refund,
        lock_time,
    ))
}

/// Build the unlocking script selecting a path of the contract. The secret is only pushed on the
/// redeem path.
pub fn satisfying_script(
    path: ScriptPath,
    sig: &[u8],
    pubkey: &[u8],
    secret: &[u8],
    contract: &Script,
) -> Script {
    let builder = Builder::new().push_slice(sig).push_slice(pubkey);
    let builder = match path {
        ScriptPath::Redeem => builder.push_slice(secret),
        ScriptPath::Refund => builder,
    };
    builder
        .push_int(path.selector())
        .push_slice(contract.as_bytes())
        .into_script()
}

/// Build the unlocking script for the redeem path: signature, public key, the revealed secret,
/// `OP_1`, and the contract.
pub fn redeem_script_sig(
    sig: &EcdsaSig,
    pubkey: &PublicKey,
    secret: &Secret,
    contract: &Script,
) -> Script {
    satisfying_script(
        ScriptPath::Redeem,
        &sig.to_vec(),
        &pubkey.to_bytes(),
        secret.as_bytes(),
        contract,
    )
}

/// Build the unlocking script for the refund path: signature, public key, `OP_0`, and the
/// contract.
pub fn refund_script_sig(sig: &EcdsaSig, pubkey: &PublicKey, contract: &Script) -> Script {
    satisfying_script(
        ScriptPath::Refund,
        &sig.to_vec(),
        &pubkey.to_bytes(),
        &[],
        contract,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::blockdata::script::Instruction;

    fn fields() -> ([u8; 20], [u8; 20], [u8; 20]) {
        ([0x11; 20], [0x22; 20], [0x33; 20])
    }

    #[test]
    fn build_and_extract_contract() {
        let (h, p, r) = fields();
        let contract = build_contract_script(&r, &p, 500_000, &h).unwrap();
        let script = contract.script();
        let extracted = AtomicSwapContract::from_script(&script).unwrap();
        assert_eq!(extracted.secret_hash.as_bytes(), &h);
        assert_eq!(extracted.recipient[..], p);
        assert_eq!(extracted.refund[..], r);
        assert_eq!(extracted.lock_time.as_u32(), 500_000);
        assert_eq!(extracted, contract);
    }

    #[test]
    fn contract_script_layout() {
        let (h, p, r) = fields();
        let contract = build_contract_script(&r, &p, 500_000, &h).unwrap();
        // 17 opcodes and pushes
        assert_eq!(contract.script().instructions().count(), 17);
        // 13 single byte opcodes, 3 hash pushes, 1 lock time push
        assert_eq!(contract.script().len(), 13 + 3 * 21 + 5);
        assert!(contract.script_pubkey().is_p2sh());
    }

    #[test]
    fn reject_wrong_field_length() {
        let (h, p, r) = fields();
        assert_eq!(
            build_contract_script(&r, &p, 500_000, &h[..19]).unwrap_err(),
            script::Error::InvalidFieldLength {
                position: SECRET_HASH_POSITION,
                expected: 20,
                found: 19
            }
        );
        assert_eq!(
            build_contract_script(&r, &[0x22; 21], 500_000, &h).unwrap_err(),
            script::Error::InvalidFieldLength {
                position: RECIPIENT_POSITION,
                expected: 20,
                found: 21
            }
        );
        assert!(matches!(
            build_contract_script(&r[..1], &p, 500_000, &h),
            Err(script::Error::InvalidFieldLength {
                position: REFUND_POSITION,
                ..
            })
        ));
    }

    #[test]
    fn reject_invalid_lock_time() {
        let (h, p, r) = fields();
        assert_eq!(
            build_contract_script(&r, &p, 0, &h).unwrap_err(),
            script::Error::InvalidLockTime(0)
        );
        assert!(build_contract_script(&r, &p, u32::MAX, &h).is_err());
    }

    #[test]
    fn satisfying_scripts_shape() {
        let (h, p, r) = fields();
        let contract = build_contract_script(&r, &p, 500_000, &h).unwrap().script();
        let secret = [0x44; 32];

        let redeem = satisfying_script(
            ScriptPath::Redeem,
            &[0x01; 72],
            &[0x02; 33],
            &secret,
            &contract,
        );
        let pushes: Vec<_> = redeem.instructions().map(|i| i.unwrap()).collect();
        assert_eq!(pushes.len(), 5);
        assert_eq!(pushes[2], Instruction::PushBytes(&secret));
        assert_eq!(pushes[3], Instruction::Op(opcodes::all::OP_PUSHNUM_1));
        assert_eq!(pushes[4], Instruction::PushBytes(contract.as_bytes()));

        let refund = satisfying_script(
            ScriptPath::Refund,
            &[0x01; 72],
            &[0x02; 33],
            &[],
            &contract,
        );
        let pushes: Vec<_> = refund.instructions().map(|i| i.unwrap()).collect();
        assert_eq!(pushes.len(), 4);
        // OP_0 is an empty push
        assert_eq!(pushes[2], Instruction::PushBytes(&[]));
        assert_eq!(pushes[3], Instruction::PushBytes(contract.as_bytes()));
    }

    #[test]
    fn contract_address_per_network() {
        let (h, p, r) = fields();
        let contract = build_contract_script(&r, &p, 500_000, &h).unwrap();
        let mainnet = contract.address(Network::Mainnet).unwrap();
        let local = contract.address(Network::Local).unwrap();
        assert!(mainnet.to_string().starts_with('3'));
        assert!(local.to_string().starts_with('2'));
        assert_eq!(mainnet.script_pubkey(), contract.script_pubkey());
    }
}
