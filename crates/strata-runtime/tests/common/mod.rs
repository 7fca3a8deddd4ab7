//! Shared harness for runtime integration tests

#![allow(dead_code)]

use std::sync::Arc;

use k256::ecdsa::SigningKey;
use strata_crypto::public_key_to_address;
use strata_primitives::Address;
use strata_runtime::{
    BlockOracle, ChainView, GenesisBalance, GenesisConfig, GenesisToken, Nexus, NexusConfig,
    NexusView,
};
use strata_storage::{KeyValueStore, MemoryStore};
use strata_types::{Block, Transaction};
use strata_vm::ScriptBuilder;
use tracing_subscriber::EnvFilter;

/// Fuel credited to the genesis owner
pub const GENESIS_FUEL: u64 = 1_000_000;

/// Staking tokens credited to the genesis owner
pub const GENESIS_STAKE: u64 = 200_000;

/// Install a test-friendly subscriber once; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Key pair used to sign test transactions
#[derive(Clone)]
pub struct TestAccount {
    key: SigningKey,
    address: Address,
}

impl TestAccount {
    /// Fresh random account
    pub fn random() -> Self {
        let key = SigningKey::random(&mut rand::thread_rng());
        let address = public_key_to_address(key.verifying_key());
        Self { key, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn key(&self) -> &SigningKey {
        &self.key
    }
}

/// A nexus with a committed genesis block and a funded owner
pub struct TestNet {
    pub nexus: Nexus,
    pub owner: TestAccount,
}

impl TestNet {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<dyn KeyValueStore>) -> Self {
        init_tracing();
        let owner = TestAccount::random();
        let nexus = Nexus::new(NexusConfig::default(), store).unwrap();
        nexus
            .create_genesis_block(&genesis(&owner.address()), owner.key())
            .unwrap();
        Self { nexus, owner }
    }

    /// Transaction for the root chain signed by every account in `signers`
    pub fn tx(&self, script: Vec<u8>, signers: &[&TestAccount]) -> Transaction {
        let mut tx = Transaction::new(
            self.nexus.name(),
            self.nexus.root_chain().name(),
            script,
            u32::MAX,
            Vec::new(),
        );
        for account in signers {
            tx.sign(account.key()).unwrap();
        }
        tx
    }

    /// Assemble and commit the next root-chain block
    pub fn produce(&self, transactions: &[Transaction]) -> Block {
        let chain = self.nexus.root_chain();
        let last = chain.last_block().unwrap().unwrap();
        let mut block = Block::new(
            last.height() + 1,
            chain.address(),
            last.timestamp() + 10,
            last.hash(),
            self.nexus.protocol_version().unwrap(),
            self.owner.address(),
            Vec::new(),
        );
        let oracle = BlockOracle::empty();
        chain
            .set_block(&self.nexus, &mut block, transactions, &oracle)
            .unwrap();
        block
    }

    /// Fuel held by `address` on the root chain
    pub fn fuel(&self, address: &Address) -> u128 {
        self.nexus
            .root_chain()
            .get_token_balance(&self.nexus.config().fuel_token, address)
            .unwrap()
    }
}

fn genesis(owner: &Address) -> GenesisConfig {
    GenesisConfig {
        owner: owner.to_hex(),
        timestamp: 1_000,
        tokens: vec![
            GenesisToken {
                symbol: "FUEL".into(),
                name: "Fuel".into(),
                decimals: 0,
                max_supply: 0,
                flags: vec!["Fungible".into(), "Transferable".into(), "Burnable".into()],
            },
            GenesisToken {
                symbol: "STAKE".into(),
                name: "Stake".into(),
                decimals: 0,
                max_supply: 0,
                flags: vec!["Fungible".into(), "Transferable".into(), "Stakable".into()],
            },
        ],
        balances: vec![
            GenesisBalance {
                address: owner.to_hex(),
                symbol: "FUEL".into(),
                amount: GENESIS_FUEL,
            },
            GenesisBalance {
                address: owner.to_hex(),
                symbol: "STAKE".into(),
                amount: GENESIS_STAKE,
            },
        ],
        validators: vec![owner.to_hex()],
        organizations: Vec::new(),
    }
}

/// Finish a script built by `build`
pub fn script(build: impl FnOnce(&mut ScriptBuilder)) -> Vec<u8> {
    let mut builder = ScriptBuilder::new();
    build(&mut builder);
    builder.end_script().unwrap()
}
