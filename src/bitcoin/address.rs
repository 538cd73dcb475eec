//! Canonical encoding of Bitcoin addresses and extraction of the public key hash used in
//! contracts.

use bitcoin::util::address::Payload;
use bitcoin::{Address, PubkeyHash};

use crate::consensus::{self, CanonicalBytes};
use crate::transaction::Error as FError;

use std::str::{self, FromStr};

impl CanonicalBytes for Address {
    fn as_canonical_bytes(&self) -> Vec<u8> {
        self.to_string().into()
    }

    fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, consensus::Error>
    where
        Self: Sized,
    {
        Address::from_str(str::from_utf8(bytes).map_err(consensus::Error::new)?)
            .map_err(consensus::Error::new)
    }
}

/// Return the public key hash of a pay-to-pubkey-hash address, contracts only lock funds to
/// public key hashes so any other address kind is rejected.
pub fn pubkey_hash_from_address(address: &Address) -> Result<PubkeyHash, FError> {
    match address.payload {
        Payload::PubkeyHash(pubkey_hash) => Ok(pubkey_hash),
        _ => Err(FError::WrongTemplate(
            "Address is not a pay-to-pubkey-hash address",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcoin::KeyManager;
    use crate::blockchain::Network;

    #[test]
    fn canonical_address() {
        let address = KeyManager::new_random().address(Network::Testnet);
        let bytes = address.as_canonical_bytes();
        assert_eq!(Address::from_canonical_bytes(&bytes).unwrap(), address);
        assert!(Address::from_canonical_bytes(b"not an address").is_err());
    }

    #[test]
    fn only_pubkey_hash_addresses() {
        let key = KeyManager::new_random();
        let address = key.address(Network::Local);
        assert_eq!(pubkey_hash_from_address(&address).unwrap(), key.pubkey_hash());

        let p2sh = Address::p2sh(&address.script_pubkey(), bitcoin::Network::Regtest).unwrap();
        assert!(pubkey_hash_from_address(&p2sh).is_err());
    }
}
