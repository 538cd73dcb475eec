#![cfg(feature = "rpc")]

use async_trait::async_trait;
use atomicswap_core::bitcoin::fee::SatPerKvB;
use atomicswap_core::bitcoin::transaction::MetadataOutput;
use atomicswap_core::bitcoin::KeyManager;
use atomicswap_core::blockchain::Network;
use atomicswap_core::config::SwapConfig;
use atomicswap_core::consensus::CanonicalBytes;
use atomicswap_core::store::MemoryStore;
use atomicswap_core::swap::script::ScriptEngine;
use atomicswap_core::swap::{Counterparty, SwapCoordinator, SwapPhase};
use atomicswap_core::syncer::bitcoind::BitcoindSyncer;
use atomicswap_core::wallet::{self, FundingWallet};
use atomicswap_core::Error;

use bitcoin::blockdata::transaction::OutPoint;
use bitcoin::consensus::serialize;
use bitcoin::{Address, Amount};
use bitcoincore_rpc::RpcApi;
use std::sync::Arc;

#[macro_use]
mod rpc;

/// A wallet spending one mined coinbase output.
#[derive(Debug)]
struct CoinbaseWallet {
    utxo: MetadataOutput,
    change: Address,
}

#[async_trait]
impl FundingWallet for CoinbaseWallet {
    type Input = MetadataOutput;
    type Address = Address;
    type Amount = Amount;
    type FeeRate = SatPerKvB;

    async fn select_funding_inputs(
        &self,
        amount: Amount,
    ) -> Result<Vec<MetadataOutput>, wallet::Error> {
        if self.utxo.value() < amount {
            return Err(wallet::Error::InsufficientFunds {
                requested: amount.as_sat(),
                available: self.utxo.value().as_sat(),
            });
        }
        Ok(vec![self.utxo.clone()])
    }

    async fn change_address(&self) -> Result<Address, wallet::Error> {
        Ok(self.change.clone())
    }

    async fn fee_rate(&self) -> Result<SatPerKvB, wallet::Error> {
        Ok(SatPerKvB::from_sat(2_000))
    }
}

type Engine = ScriptEngine<BitcoindSyncer, CoinbaseWallet>;

/// Mine a coinbase to a fresh key, the output is spendable once `mine!(100)` ran.
fn funded_keys() -> (KeyManager, MetadataOutput) {
    let (address, keys) = new_address!();
    let coinbase = fund_address!(address);
    let utxo = MetadataOutput::new(
        OutPoint::new(coinbase.txid(), 0),
        coinbase.output[0].clone(),
    );
    (keys, utxo)
}

fn engine(keys: &KeyManager, utxo: MetadataOutput) -> Engine {
    ScriptEngine::new(
        keys.clone(),
        SwapConfig::new(Network::Local, SatPerKvB::from_sat(2_000)),
        BitcoindSyncer::new(rpc::client()),
        CoinbaseWallet {
            utxo,
            change: keys.address(Network::Local),
        },
    )
}

#[tokio::test]
#[ignore]
async fn swap_on_regtest() {
    let (alice, alice_utxo) = funded_keys();
    let (bob, bob_utxo) = funded_keys();
    mine!(100);

    let store = Arc::new(MemoryStore::new());
    let mut alice_swap = SwapCoordinator::initiator(
        engine(&alice, alice_utxo.clone()),
        engine(&alice, alice_utxo),
        Arc::clone(&store),
        None,
    );
    let mut bob_swap = SwapCoordinator::participant(
        engine(&bob, bob_utxo.clone()),
        engine(&bob, bob_utxo),
        Arc::clone(&store),
        alice_swap.secret_hash(),
    );

    let height = height!();
    let funded_a = alice_swap
        .initiate(
            &bob.address(Network::Local),
            Amount::from_btc(1.0).unwrap(),
            height + 20,
        )
        .await
        .unwrap();
    let (contract_a, funding_a) = (funded_a.contract, funded_a.funding);
    // looked up while in the mempool, the node keeps no transaction index
    let funding_tx = rpc::CLIENT
        .get_raw_transaction(&funding_a.out_point.txid, None)
        .unwrap();
    mine!(1);

    // bob audits the contract against alice's funding transaction
    let funded_b = bob_swap
        .participate(
            &Counterparty::Contract {
                contract: contract_a.as_canonical_bytes(),
                funding: serialize(&funding_tx),
            },
            Amount::from_btc(2.0).unwrap(),
            height + 10,
        )
        .await
        .unwrap();
    mine!(1);
    let (contract_b, funding_b) = (funded_b.contract, funded_b.funding);

    let secret = alice_swap.secret().unwrap();
    let redeem_b = alice_swap
        .redeem(&contract_b, &funding_b, &secret, &alice.address(Network::Local))
        .await
        .unwrap();
    mine!(1);

    assert_eq!(bob_swap.extract_secret(&redeem_b).unwrap(), secret);
    let redeem_a = bob_swap
        .redeem(&contract_a, &funding_a, &secret, &bob.address(Network::Local))
        .await
        .unwrap();
    mine!(1);

    for tx in [redeem_a, redeem_b] {
        let out = rpc::CLIENT.get_tx_out(&tx.txid(), 0, Some(false)).unwrap();
        assert!(out.is_some(), "redeem {} is confirmed", tx.txid());
    }
    assert_eq!(alice_swap.phase(), SwapPhase::Closed);
    assert_eq!(bob_swap.phase(), SwapPhase::Closed);
}

/// The lock time is a block height below 2^23, pushed on 4 bytes in the contract. This push is not
/// a minimally encoded script number, so the node must accept non-standard transactions
/// (`-acceptnonstdtxn=1`) to relay the refund.
#[tokio::test]
#[ignore]
async fn height_locked_refund_on_regtest() {
    let (alice, alice_utxo) = funded_keys();
    let (_, bob) = new_address!();
    mine!(100);

    let mut alice_swap = SwapCoordinator::initiator(
        engine(&alice, alice_utxo.clone()),
        engine(&alice, alice_utxo),
        Arc::new(MemoryStore::new()),
        None,
    );
    let lock_time = height!() + 5;
    let funded = alice_swap
        .initiate(
            &bob.address(Network::Local),
            Amount::from_btc(1.0).unwrap(),
            lock_time,
        )
        .await
        .unwrap();
    mine!(1);
    assert!(funded.contract.lock_time.is_height());
    assert!(lock_time < 1 << 23);
    let (signed_refund, _) = funded.refund.unwrap();

    let err = alice_swap
        .refund(&alice.address(Network::Local))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::LockTimeNotReached { .. }));

    mine!(5);
    let refund = alice_swap
        .refund(&alice.address(Network::Local))
        .await
        .unwrap();
    assert_eq!(refund.lock_time as u64, lock_time);
    assert_eq!(refund.txid(), signed_refund.txid());
    mine!(1);

    let out = rpc::CLIENT
        .get_tx_out(&refund.txid(), 0, Some(false))
        .unwrap();
    assert!(out.is_some());
    assert_eq!(alice_swap.phase(), SwapPhase::Closed);
}
