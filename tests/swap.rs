use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use atomicswap_core::bitcoin::fee::{fee_for_size, SatPerKvB};
use atomicswap_core::bitcoin::transaction::MetadataOutput;
use atomicswap_core::bitcoin::KeyManager;
use atomicswap_core::blockchain::Network;
use atomicswap_core::config::SwapConfig;
use atomicswap_core::consensus::CanonicalBytes;
use atomicswap_core::store::{Error as StoreError, FileStore, SwapStore};
use atomicswap_core::swap::script::ScriptEngine;
use atomicswap_core::swap::{Counterparty, SwapCoordinator, SwapPhase};
use atomicswap_core::syncer::{self, Broadcaster, ChainClock};
use atomicswap_core::wallet::{self, FundingWallet};
use atomicswap_core::Error;

use bitcoin::blockdata::transaction::{OutPoint, TxOut};
use bitcoin::consensus::serialize;
use bitcoin::hashes::Hash;
use bitcoin::{Address, Amount, Script, Transaction, Txid};

const RATE: u64 = 2_000;

/// A script-based chain: accepted transactions and the clock.
#[derive(Debug, Default)]
struct Chain {
    txs: Mutex<Vec<Transaction>>,
    height: Mutex<u32>,
}

#[derive(Debug, Clone)]
struct Node(Arc<Chain>);

#[async_trait]
impl Broadcaster for Node {
    type Transaction = Transaction;
    type TxId = Txid;

    async fn publish(&self, tx: &Transaction) -> Result<Txid, syncer::Error> {
        let mut txs = self.0.txs.lock().unwrap();
        let spent = txs
            .iter()
            .flat_map(|seen| seen.input.iter())
            .any(|seen| tx.input.iter().any(|txin| txin.previous_output == seen.previous_output));
        if spent {
            return Err(syncer::Error::Rejected("txn-mempool-conflict".into()));
        }
        txs.push(tx.clone());
        Ok(tx.txid())
    }
}

#[async_trait]
impl ChainClock for Node {
    async fn current_height(&self) -> Result<u32, syncer::Error> {
        Ok(*self.0.height.lock().unwrap())
    }

    async fn median_time_past(&self) -> Result<u32, syncer::Error> {
        Ok(1_600_000_000)
    }
}

#[derive(Debug)]
struct Wallet {
    utxos: Vec<MetadataOutput>,
    change: Address,
}

impl Wallet {
    fn new(keys: &KeyManager, values: &[u64]) -> Self {
        let utxos = values
            .iter()
            .enumerate()
            .map(|(vout, value)| {
                MetadataOutput::new(
                    OutPoint::new(Txid::hash(&keys.pubkey_hash()[..]), vout as u32),
                    TxOut {
                        value: *value,
                        script_pubkey: Script::new_p2pkh(&keys.pubkey_hash()),
                    },
                )
            })
            .collect();
        Self {
            utxos,
            change: keys.address(Network::Local),
        }
    }
}

#[async_trait]
impl FundingWallet for Wallet {
    type Input = MetadataOutput;
    type Address = Address;
    type Amount = Amount;
    type FeeRate = SatPerKvB;

    async fn select_funding_inputs(
        &self,
        amount: Amount,
    ) -> Result<Vec<MetadataOutput>, wallet::Error> {
        let mut total = 0;
        let selected: Vec<_> = self
            .utxos
            .iter()
            .take_while(|utxo| {
                let take = total < amount.as_sat();
                total += utxo.tx_out.value;
                take
            })
            .cloned()
            .collect();
        let available: u64 = selected.iter().map(|utxo| utxo.tx_out.value).sum();
        if available < amount.as_sat() {
            return Err(wallet::Error::InsufficientFunds {
                requested: amount.as_sat(),
                available,
            });
        }
        Ok(selected)
    }

    async fn change_address(&self) -> Result<Address, wallet::Error> {
        Ok(self.change.clone())
    }

    async fn fee_rate(&self) -> Result<SatPerKvB, wallet::Error> {
        Ok(SatPerKvB::from_sat(RATE))
    }
}

type Engine = ScriptEngine<Node, Wallet>;

fn engine(keys: &KeyManager, chain: &Arc<Chain>, values: &[u64]) -> Engine {
    ScriptEngine::new(
        keys.clone(),
        SwapConfig::new(Network::Local, SatPerKvB::from_sat(RATE)),
        Node(Arc::clone(chain)),
        Wallet::new(keys, values),
    )
}

fn input_value(tx: &Transaction, chain: &Chain) -> u64 {
    let txs = chain.txs.lock().unwrap();
    tx.input
        .iter()
        .map(|txin| {
            txs.iter()
                .find(|prev| prev.txid() == txin.previous_output.txid)
                .map(|prev| prev.output[txin.previous_output.vout as usize].value)
                .unwrap()
        })
        .sum()
}

#[tokio::test]
async fn script_to_script_swap() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path()).unwrap());
    let btc = Arc::new(Chain::default());
    let ltc = Arc::new(Chain::default());
    let alice = KeyManager::new_random();
    let bob = KeyManager::new_random();

    // alice funds on btc and redeems on ltc, bob the opposite
    let mut alice_swap = SwapCoordinator::initiator(
        engine(&alice, &btc, &[80_000, 80_000]),
        engine(&alice, &ltc, &[]),
        Arc::clone(&store),
        None,
    );
    let mut bob_swap = SwapCoordinator::participant(
        engine(&bob, &ltc, &[500_000]),
        engine(&bob, &btc, &[]),
        Arc::clone(&store),
        alice_swap.secret_hash(),
    );

    let funded_a = alice_swap
        .initiate(
            &bob.address(Network::Local),
            Amount::from_sat(150_000),
            1_700_172_800,
        )
        .await
        .unwrap();
    assert_eq!(store.load(&alice_swap.id()).unwrap().phase, SwapPhase::Funded);

    // bob audits alice's contract against her funding transaction seen on btc
    let funding_tx = serialize(&btc.txs.lock().unwrap()[0]);
    let funded_b = bob_swap
        .participate(
            &Counterparty::Contract {
                contract: funded_a.contract.as_canonical_bytes(),
                funding: funding_tx,
            },
            Amount::from_sat(400_000),
            1_700_000_000,
        )
        .await
        .unwrap();
    let (contract_a, funding_a) = (funded_a.contract, funded_a.funding);
    let (contract_b, funding_b) = (funded_b.contract, funded_b.funding);
    assert_eq!(contract_b.recipient, alice.pubkey_hash());
    assert_eq!(store.list().unwrap().len(), 2);

    // alice redeems on ltc, revealing the secret
    let secret = alice_swap.secret().unwrap();
    let redeem_b = alice_swap
        .redeem(&contract_b, &funding_b, &secret, &alice.address(Network::Local))
        .await
        .unwrap();
    assert_eq!(alice_swap.phase(), SwapPhase::Closed);

    // the fee is estimated on an upper bound of the signed size
    let fee = Amount::from_sat(input_value(&redeem_b, &ltc) - redeem_b.output[0].value);
    let rate = SatPerKvB::from_sat(RATE);
    assert!(fee >= fee_for_size(rate, redeem_b.size()));
    assert!(fee <= fee_for_size(rate, redeem_b.size() + 4));

    // bob learns the secret and redeems on btc
    assert_eq!(bob_swap.extract_secret(&redeem_b).unwrap(), secret);
    bob_swap
        .redeem(&contract_a, &funding_a, &secret, &bob.address(Network::Local))
        .await
        .unwrap();
    assert_eq!(bob_swap.phase(), SwapPhase::Closed);
    assert!(store.list().unwrap().is_empty());
    assert_eq!(btc.txs.lock().unwrap().len(), 2);
    assert_eq!(ltc.txs.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn participant_refunds_after_lock_time() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path()).unwrap());
    let btc = Arc::new(Chain::default());
    let ltc = Arc::new(Chain::default());
    let bob = KeyManager::new_random();
    let alice = KeyManager::new_random();
    let (_, secret_hash) = atomicswap_core::secret::generate_secret();

    let mut bob_swap = SwapCoordinator::participant(
        engine(&bob, &ltc, &[500_000]),
        engine(&bob, &btc, &[]),
        Arc::clone(&store),
        secret_hash,
    );
    let funded = bob_swap
        .participate(
            &Counterparty::Address(alice.address(Network::Local)),
            Amount::from_sat(400_000),
            2_000,
        )
        .await
        .unwrap();
    let (signed_refund, _) = funded.refund.unwrap();

    *ltc.height.lock().unwrap() = 1_999;
    let err = bob_swap
        .refund(&bob.address(Network::Local))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::LockTimeNotReached {
            lock_time: 2_000,
            current: 1_999
        }
    ));
    assert_eq!(bob_swap.phase(), SwapPhase::Funded);

    // restart, the state is reloaded from the store
    let id = bob_swap.id();
    drop(bob_swap);
    let mut bob_swap = SwapCoordinator::restore(
        &id,
        engine(&bob, &ltc, &[]),
        engine(&bob, &btc, &[]),
        Arc::clone(&store),
    )
    .unwrap();

    *ltc.height.lock().unwrap() = 2_000;
    let refund = bob_swap.refund(&bob.address(Network::Local)).await.unwrap();
    assert_eq!(refund.lock_time, 2_000);
    assert_eq!(bob_swap.phase(), SwapPhase::Closed);

    assert!(refund.input[0]
        .script_sig
        .as_bytes()
        .ends_with(funded.contract.script().as_bytes()));
    assert!(matches!(store.load(&id), Err(StoreError::NotFound(_))));

    // the refund held since funding is the same transaction
    assert_eq!(signed_refund.txid(), refund.txid());
}

#[tokio::test]
async fn foreign_contract_commits_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path()).unwrap());
    let btc = Arc::new(Chain::default());
    let ltc = Arc::new(Chain::default());
    let alice = KeyManager::new_random();
    let bob = KeyManager::new_random();
    let mallory = KeyManager::new_random();

    let mut alice_swap = SwapCoordinator::initiator(
        engine(&alice, &btc, &[200_000]),
        engine(&alice, &ltc, &[]),
        Arc::clone(&store),
        None,
    );
    let mut bob_swap = SwapCoordinator::participant(
        engine(&bob, &ltc, &[500_000]),
        engine(&bob, &btc, &[]),
        Arc::clone(&store),
        alice_swap.secret_hash(),
    );

    // a well formed, funded contract whose redeem path pays another key
    let funded = alice_swap
        .initiate(
            &mallory.address(Network::Local),
            Amount::from_sat(150_000),
            1_700_172_800,
        )
        .await
        .unwrap();
    let funding_tx = serialize(&btc.txs.lock().unwrap()[0]);

    let err = bob_swap
        .participate(
            &Counterparty::Contract {
                contract: funded.contract.as_canonical_bytes(),
                funding: funding_tx,
            },
            Amount::from_sat(400_000),
            1_700_000_000,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsafeContract(_)));
    assert!(!err.is_retryable());
    assert_eq!(bob_swap.phase(), SwapPhase::Created);
    assert!(ltc.txs.lock().unwrap().is_empty());
    assert_eq!(store.list().unwrap(), vec![alice_swap.id()]);
}

#[tokio::test]
async fn insufficient_funds_commits_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path()).unwrap());
    let btc = Arc::new(Chain::default());
    let alice = KeyManager::new_random();
    let bob = KeyManager::new_random();

    let mut alice_swap = SwapCoordinator::initiator(
        engine(&alice, &btc, &[10_000]),
        engine(&alice, &btc, &[]),
        Arc::clone(&store),
        None,
    );
    let err = alice_swap
        .initiate(
            &bob.address(Network::Local),
            Amount::from_sat(150_000),
            1_700_172_800,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientFunds(_)));
    assert!(err.is_retryable());
    assert_eq!(alice_swap.phase(), SwapPhase::Created);
    assert!(btc.txs.lock().unwrap().is_empty());
    assert!(store.list().unwrap().is_empty());
    alice_swap.abandon().unwrap();
}
