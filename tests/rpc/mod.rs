use bitcoincore_rpc::{Auth, Client};
use std::env;
use std::path::PathBuf;

/// Create a client to the regtest node, configured from the environment.
pub fn client() -> Client {
    let ctx = env::var("CI").unwrap_or("false".into());
    let host = env::var("RPC_HOST").unwrap_or("127.0.0.1".into());
    let port = env::var("RPC_PORT").unwrap_or("18443".into());
    let auth = if ctx == "false" {
        let u = env::var("RPC_USER").unwrap();
        let p = env::var("RPC_PASS").unwrap();
        Auth::UserPass(u, p)
    } else {
        let cookie = env::var("RPC_COOKIE").unwrap_or("/data/regtest/.cookie".into());
        Auth::CookieFile(PathBuf::from(cookie))
    };
    Client::new(format!("http://{}:{}", host, port).as_str(), auth).unwrap()
}

lazy_static::lazy_static! {
    pub static ref CLIENT: Client = client();
}

macro_rules! gen_to_add {
    ($num:expr => $add:expr) => (
        rpc::CLIENT.generate_to_address($num, &$add).unwrap()
    );
    ($add:expr) => (
        gen_to_add!(1 => $add)
    );
}

macro_rules! get_block {
    ($block:expr) => {
        rpc::CLIENT.get_block(&$block).unwrap()
    };
}

macro_rules! fund_address {
    ($add:expr) => {{
        let blocks = gen_to_add!($add);
        let block = get_block!(blocks[0]);
        block.coinbase().unwrap().clone()
    }};
}

macro_rules! new_address {
    () => {{
        use atomicswap_core::bitcoin::KeyManager;
        use atomicswap_core::blockchain::Network;

        // Random key pair and its pay-to-pubkey-hash address
        let keys = KeyManager::new_random();
        (keys.address(Network::Local), keys)
    }};
}

macro_rules! mine {
    () => {{
        mine!(1)
    }};

    ($num:literal) => {{
        gen_to_add!($num => new_address!().0)
    }};
}

macro_rules! height {
    () => {
        rpc::CLIENT.get_block_count().unwrap() as u64
    };
}
