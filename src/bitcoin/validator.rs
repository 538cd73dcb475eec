//! Structural validation of contract scripts received from a counter-party. The script is first
//! tokenized into opcodes and data pushes, then the token stream is matched position by position
//! against the atomic swap contract template. Any mismatch reports the failing position.
//!
//! A contract must pass [`extract_contract`] before any funds are committed against it.

use std::convert::TryFrom;

use bitcoin::blockdata::opcodes::{self, All};
use bitcoin::blockdata::script::{Instruction, Script};
use bitcoin::hashes::Hash;
use bitcoin::PubkeyHash;

use crate::bitcoin::htlc::{
    AtomicSwapContract, HASH_LENGTH, LOCK_TIME_POSITION, RECIPIENT_POSITION, REFUND_POSITION,
    SECRET_HASH_POSITION,
};
use crate::bitcoin::timelock::CltvLockTime;
use crate::script::Error;
use crate::secret::SecretHash;

/// A script token, an opcode or a data push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// A non-push opcode.
    Op(All),
    /// A data push, `OP_0` is an empty push.
    Push(&'a [u8]),
}

/// Expected token at a given position of the template.
#[derive(Debug, Clone, Copy)]
enum Expected {
    Op(All, &'static str),
    Hash(&'static str),
    LockTime,
}

const TEMPLATE: [Expected; 17] = [
    Expected::Op(opcodes::all::OP_IF, "Expected OP_IF"),
    Expected::Op(opcodes::all::OP_RIPEMD160, "Expected OP_RIPEMD160"),
    Expected::Hash("Expected secret hash push"),
    Expected::Op(opcodes::all::OP_EQUALVERIFY, "Expected OP_EQUALVERIFY"),
    Expected::Op(opcodes::all::OP_DUP, "Expected OP_DUP"),
    Expected::Op(opcodes::all::OP_HASH160, "Expected OP_HASH160"),
    Expected::Hash("Expected recipient public key hash push"),
    Expected::Op(opcodes::all::OP_ELSE, "Expected OP_ELSE"),
    Expected::LockTime,
    Expected::Op(opcodes::all::OP_CLTV, "Expected OP_CHECKLOCKTIMEVERIFY"),
    Expected::Op(opcodes::all::OP_DROP, "Expected OP_DROP"),
    Expected::Op(opcodes::all::OP_DUP, "Expected OP_DUP"),
    Expected::Op(opcodes::all::OP_HASH160, "Expected OP_HASH160"),
    Expected::Hash("Expected refund public key hash push"),
    Expected::Op(opcodes::all::OP_ENDIF, "Expected OP_ENDIF"),
    Expected::Op(opcodes::all::OP_EQUALVERIFY, "Expected OP_EQUALVERIFY"),
    Expected::Op(opcodes::all::OP_CHECKSIG, "Expected OP_CHECKSIG"),
];

/// Tokenize a script, fails if a push runs past the end of the script.
pub fn tokenize(script: &Script) -> Result<Vec<Token<'_>>, Error> {
    script
        .instructions()
        .enumerate()
        .map(|(position, instruction)| match instruction {
            Ok(Instruction::Op(op)) => Ok(Token::Op(op)),
            Ok(Instruction::PushBytes(bytes)) => Ok(Token::Push(bytes)),
            Err(_) => Err(Error::NotAnAtomicSwapScript {
                position,
                reason: "Malformed data push",
            }),
        })
        .collect()
}

fn match_token(position: usize, expected: &Expected, token: &Token) -> Result<(), Error> {
    match (expected, token) {
        (Expected::Op(op, _), Token::Op(found)) if op == found => Ok(()),
        (Expected::Op(_, reason), _) => Err(Error::NotAnAtomicSwapScript {
            position,
            reason: *reason,
        }),
        (Expected::Hash(_), Token::Push(bytes)) if bytes.len() == HASH_LENGTH => Ok(()),
        (Expected::Hash(_), Token::Push(bytes)) => Err(Error::InvalidFieldLength {
            position,
            expected: HASH_LENGTH,
            found: bytes.len(),
        }),
        (Expected::Hash(reason), Token::Op(_)) => Err(Error::NotAnAtomicSwapScript {
            position,
            reason: *reason,
        }),
        (Expected::LockTime, Token::Push(bytes)) => {
            CltvLockTime::from_push_bytes(bytes).map(|_| ())
        }
        (Expected::LockTime, Token::Op(_)) => Err(Error::NotAnAtomicSwapScript {
            position,
            reason: "Expected lock time push",
        }),
    }
}

fn push_at<'a>(tokens: &[Token<'a>], position: usize) -> Result<&'a [u8], Error> {
    match tokens.get(position) {
        Some(Token::Push(bytes)) => Ok(*bytes),
        _ => Err(Error::NotAnAtomicSwapScript {
            position,
            reason: "Expected data push",
        }),
    }
}

fn hash_at(tokens: &[Token], position: usize) -> Result<[u8; HASH_LENGTH], Error> {
    let bytes = push_at(tokens, position)?;
    <[u8; HASH_LENGTH]>::try_from(bytes).map_err(|_| Error::InvalidFieldLength {
        position,
        expected: HASH_LENGTH,
        found: bytes.len(),
    })
}

/// Validate that a token stream follows the contract template exactly.
pub fn match_template(tokens: &[Token]) -> Result<(), Error> {
    for (position, expected) in TEMPLATE.iter().enumerate() {
        let token = tokens.get(position).ok_or(Error::NotAnAtomicSwapScript {
            position,
            reason: "Script ends before the end of the contract template",
        })?;
        match_token(position, expected, token)?;
    }
    match tokens.len() > TEMPLATE.len() {
        true => Err(Error::NotAnAtomicSwapScript {
            position: TEMPLATE.len(),
            reason: "Unexpected data after OP_CHECKSIG",
        }),
        false => Ok(()),
    }
}

/// Parse and validate a contract script, return the contract fields read from the pushed data at
/// their fixed template positions.
pub fn extract_contract(script_bytes: &[u8]) -> Result<AtomicSwapContract, Error> {
    let script = Script::from(script_bytes.to_vec());
    let tokens = tokenize(&script)?;
    match_template(&tokens)?;

    let secret_hash = SecretHash::from(hash_at(&tokens, SECRET_HASH_POSITION)?);
    let recipient = PubkeyHash::from_inner(hash_at(&tokens, RECIPIENT_POSITION)?);
    let refund = PubkeyHash::from_inner(hash_at(&tokens, REFUND_POSITION)?);
    let lock_time = CltvLockTime::from_push_bytes(push_at(&tokens, LOCK_TIME_POSITION)?)?;

    Ok(AtomicSwapContract::new(
        secret_hash,
        recipient,
        refund,
        lock_time,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcoin::htlc::build_contract_script;
    use bitcoin::blockdata::script::Builder;

    fn contract() -> AtomicSwapContract {
        build_contract_script(&[0x33; 20], &[0x22; 20], 500_000, &[0x11; 20]).unwrap()
    }

    /// Rebuild the contract script with the token at `position` replaced.
    fn replace_token(position: usize, f: impl Fn(Builder) -> Builder) -> Script {
        let script = contract().script();
        let tokens = tokenize(&script).unwrap();
        let mut builder = Builder::new();
        for (i, token) in tokens.iter().enumerate() {
            builder = match (i == position, token) {
                (true, _) => f(builder),
                (false, Token::Op(op)) => builder.push_opcode(*op),
                (false, Token::Push(bytes)) => builder.push_slice(bytes),
            };
        }
        builder.into_script()
    }

    #[test]
    fn tokenize_contract() {
        let script = contract().script();
        let tokens = tokenize(&script).unwrap();
        assert_eq!(tokens.len(), 17);
        assert_eq!(tokens[0], Token::Op(opcodes::all::OP_IF));
        assert_eq!(tokens[2], Token::Push(&[0x11; 20]));
        assert_eq!(tokens[8], Token::Push(&[0x20, 0xa1, 0x07, 0x00]));
    }

    #[test]
    fn extract_example_contract() {
        let extracted = extract_contract(contract().script().as_bytes()).unwrap();
        assert_eq!(extracted.secret_hash.as_bytes(), &[0x11; 20]);
        assert_eq!(extracted.recipient[..], [0x22; 20]);
        assert_eq!(extracted.refund[..], [0x33; 20]);
        assert_eq!(extracted.lock_time.as_u32(), 500_000);
    }

    #[test]
    fn reject_each_wrong_opcode() {
        for (position, expected) in TEMPLATE.iter().enumerate() {
            if let Expected::Op(op, _) = expected {
                assert_ne!(*op, opcodes::all::OP_NOP);
                let script = replace_token(position, |b| b.push_opcode(opcodes::all::OP_NOP));
                assert!(matches!(
                    extract_contract(script.as_bytes()),
                    Err(Error::NotAnAtomicSwapScript { position: p, .. }) if p == position
                ));
            }
        }
    }

    #[test]
    fn reject_wrong_hash_length() {
        for position in [SECRET_HASH_POSITION, RECIPIENT_POSITION, REFUND_POSITION] {
            let script = replace_token(position, |b| b.push_slice(&[0x42; 19]));
            assert_eq!(
                extract_contract(script.as_bytes()).unwrap_err(),
                Error::InvalidFieldLength {
                    position,
                    expected: 20,
                    found: 19
                }
            );
            let script = replace_token(position, |b| b.push_slice(&[0x42; 32]));
            assert_eq!(
                extract_contract(script.as_bytes()).unwrap_err(),
                Error::InvalidFieldLength {
                    position,
                    expected: 20,
                    found: 32
                }
            );
        }
    }

    #[test]
    fn reject_opcode_in_place_of_push() {
        let script = replace_token(SECRET_HASH_POSITION, |b| {
            b.push_opcode(opcodes::all::OP_SHA256)
        });
        assert!(matches!(
            extract_contract(script.as_bytes()),
            Err(Error::NotAnAtomicSwapScript { position: 2, .. })
        ));
        let script = replace_token(LOCK_TIME_POSITION, |b| b.push_int(5));
        assert!(matches!(
            extract_contract(script.as_bytes()),
            Err(Error::NotAnAtomicSwapScript { position: 8, .. })
        ));
    }

    #[test]
    fn lock_time_encodings() {
        // minimal encoding produced by other implementations
        let script = replace_token(LOCK_TIME_POSITION, |b| b.push_slice(&[0x20, 0xa1, 0x07]));
        assert_eq!(
            extract_contract(script.as_bytes()).unwrap().lock_time.as_u32(),
            500_000
        );
        // zero lock time
        let script = replace_token(LOCK_TIME_POSITION, |b| b.push_slice(&[0x00; 4]));
        assert_eq!(
            extract_contract(script.as_bytes()).unwrap_err(),
            Error::InvalidLockTime(0)
        );
        // negative lock time
        let script = replace_token(LOCK_TIME_POSITION, |b| b.push_slice(&[0x01, 0x00, 0x00, 0x80]));
        assert_eq!(
            extract_contract(script.as_bytes()).unwrap_err(),
            Error::InvalidLockTime(-1)
        );
        // too wide
        let script = replace_token(LOCK_TIME_POSITION, |b| b.push_slice(&[0x01; 6]));
        assert!(matches!(
            extract_contract(script.as_bytes()),
            Err(Error::InvalidLockTime(_))
        ));
    }

    #[test]
    fn reject_truncated_and_trailing_scripts() {
        let bytes = contract().script().into_bytes();
        // drop OP_CHECKSIG
        assert!(matches!(
            extract_contract(&bytes[..bytes.len() - 1]),
            Err(Error::NotAnAtomicSwapScript { position: 16, .. })
        ));
        // cut in the middle of the refund hash push
        assert!(matches!(
            extract_contract(&bytes[..bytes.len() - 10]),
            Err(Error::NotAnAtomicSwapScript { position: 13, .. })
        ));
        let mut trailing = bytes.clone();
        trailing.push(opcodes::all::OP_NOP.into_u8());
        assert!(matches!(
            extract_contract(&trailing),
            Err(Error::NotAnAtomicSwapScript { position: 17, .. })
        ));
        assert!(matches!(
            extract_contract(&[]),
            Err(Error::NotAnAtomicSwapScript { position: 0, .. })
        ));
    }

    #[test]
    fn reject_other_standard_scripts() {
        let p2pkh = Script::new_p2pkh(&PubkeyHash::from_inner([0x22; 20]));
        assert!(matches!(
            extract_contract(p2pkh.as_bytes()),
            Err(Error::NotAnAtomicSwapScript { position: 0, .. })
        ));
    }
}
