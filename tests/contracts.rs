use atomicswap_core::bitcoin::htlc::*;
use atomicswap_core::bitcoin::transaction::{extract_secret, MetadataOutput, Redeem, Tx};
use atomicswap_core::bitcoin::validator::extract_contract;
use atomicswap_core::bitcoin::{audit_contract, Bitcoin, KeyManager};
use atomicswap_core::blockchain::Network;
use atomicswap_core::crypto::Sign;
use atomicswap_core::script::{self, ScriptPath};
use atomicswap_core::secret::{self, Secret};
use atomicswap_core::transaction::{Broadcastable, Redeemable, Witnessable};

use bitcoin::blockdata::opcodes;
use bitcoin::blockdata::script::{Builder, Script};
use bitcoin::blockdata::transaction::{OutPoint, TxIn, TxOut};

const H: [u8; 20] = [0x11; 20];
const P: [u8; 20] = [0x22; 20];
const R: [u8; 20] = [0x33; 20];

#[test]
fn example_scenario() {
    let contract = build_contract_script(&R, &P, 500_000, &H).unwrap();
    let extracted = extract_contract(contract.script().as_bytes()).unwrap();

    assert_eq!(extracted.secret_hash.as_bytes(), &H);
    assert_eq!(&extracted.recipient[..], &P);
    assert_eq!(&extracted.refund[..], &R);
    assert_eq!(extracted.lock_time.as_u32(), 500_000);
    assert!(extracted.lock_time.is_height());
}

#[test]
fn reject_modified_scripts() {
    // OP_IF replaced by OP_NOTIF
    let mut bytes = build_contract_script(&R, &P, 500_000, &H)
        .unwrap()
        .script()
        .to_bytes();
    bytes[0] = opcodes::all::OP_NOTIF.into_u8();
    assert!(matches!(
        extract_contract(&bytes),
        Err(script::Error::NotAnAtomicSwapScript { position: 0, .. })
    ));

    // 19 bytes recipient public key hash
    let script = Builder::new()
        .push_opcode(opcodes::all::OP_IF)
        .push_opcode(opcodes::all::OP_RIPEMD160)
        .push_slice(&H)
        .push_opcode(opcodes::all::OP_EQUALVERIFY)
        .push_opcode(opcodes::all::OP_DUP)
        .push_opcode(opcodes::all::OP_HASH160)
        .push_slice(&P[..19])
        .push_opcode(opcodes::all::OP_ELSE)
        .push_slice(&500_000u32.to_le_bytes())
        .push_opcode(opcodes::all::OP_CLTV)
        .push_opcode(opcodes::all::OP_DROP)
        .push_opcode(opcodes::all::OP_DUP)
        .push_opcode(opcodes::all::OP_HASH160)
        .push_slice(&R)
        .push_opcode(opcodes::all::OP_ENDIF)
        .push_opcode(opcodes::all::OP_EQUALVERIFY)
        .push_opcode(opcodes::all::OP_CHECKSIG)
        .into_script();
    assert_eq!(
        extract_contract(script.as_bytes()),
        Err(script::Error::InvalidFieldLength {
            position: 6,
            expected: 20,
            found: 19
        })
    );

    // trailing opcode
    let mut bytes = build_contract_script(&R, &P, 500_000, &H)
        .unwrap()
        .script()
        .to_bytes();
    bytes.push(opcodes::all::OP_DROP.into_u8());
    assert!(matches!(
        extract_contract(&bytes),
        Err(script::Error::NotAnAtomicSwapScript { position: 17, .. })
    ));

    // truncated script
    assert!(extract_contract(&bytes[..40]).is_err());
    assert!(extract_contract(&[]).is_err());
}

#[test]
fn reject_invalid_fields() {
    assert_eq!(
        build_contract_script(&R, &P, 0, &H),
        Err(script::Error::InvalidLockTime(0))
    );
    assert!(matches!(
        build_contract_script(&R, &P, 500_000, &H[..10]),
        Err(script::Error::InvalidFieldLength { found: 10, .. })
    ));
    assert!(matches!(
        build_contract_script(&R[..19], &P, 500_000, &H),
        Err(script::Error::InvalidFieldLength { .. })
    ));
}

#[test]
fn secrets() {
    let (secret, secret_hash) = secret::generate_secret();
    assert!(secret::verify(&secret, &secret_hash));
    assert_eq!(secret::hash(&secret), secret_hash);
    assert!(!secret::verify(&Secret::generate(), &secret_hash));
}

#[test]
fn redeem_reveals_secret_on_chain() {
    let recipient = KeyManager::new_random();
    let (secret, secret_hash) = secret::generate_secret();
    let contract = build_contract_script(
        &R,
        &recipient.pubkey_hash()[..],
        500_000,
        secret_hash.as_bytes(),
    )
    .unwrap();

    let funding = bitcoin::Transaction {
        version: 2,
        lock_time: 0,
        input: vec![TxIn::default()],
        output: vec![TxOut {
            value: 100_000,
            script_pubkey: contract.script_pubkey(),
        }],
    };
    let audit = audit_contract(contract.script().as_bytes(), &funding, Network::Local).unwrap();
    assert_eq!(audit.funding, OutPoint::new(funding.txid(), 0));

    let destination = recipient.address(Network::Local);
    let mut redeem = <Tx<Redeem> as Redeemable<Bitcoin, MetadataOutput>>::initialize(
        &audit.output,
        &contract,
        destination,
    )
    .unwrap();
    let msg = redeem.generate_witness_message(ScriptPath::Redeem).unwrap();
    let sig = recipient.sign(msg).unwrap();
    redeem.add_witness(recipient.get_pubkey(), sig).unwrap();
    redeem.add_secret(secret).unwrap();
    let tx = redeem.finalize_and_extract().unwrap();

    // the unlocking script ends with the selector and the contract
    let script_sig: &Script = &tx.input[0].script_sig;
    assert!(script_sig
        .as_bytes()
        .ends_with(contract.script().as_bytes()));
    assert_eq!(extract_secret(&tx, &secret_hash), Some(secret));
    assert_eq!(
        extract_secret(&tx, &secret::hash(&Secret::generate())),
        None
    );
    assert_eq!(
        extract_secret(&funding, &secret_hash),
        None,
        "funding transaction reveals nothing"
    );
}
