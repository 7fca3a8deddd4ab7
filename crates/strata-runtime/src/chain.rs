//! Per-chain state authority.
//!
//! A [`Chain`] owns the balances, NFTs, contracts, tasks and block history
//! of one chain. Blocks are assembled by [`Chain::process_block`], which runs
//! every transaction in order on its own changeset and settles gas, and are
//! committed by [`Chain::add_block`] in a single atomic batch.

use std::sync::Arc;

use parking_lot::Mutex;
use strata_crypto::address_from_name;
use strata_metrics::{names, timed, Metrics};
use strata_primitives::{Address, BlockHeight, Hash, Serializable, Timestamp};
use strata_storage::{
    field_key, KeyValueStore, PrefixedStore, StorageChangeSet, StorageContext, StorageMap,
    StorageReader, WriteBatch,
};
use strata_types::{
    Block, ChainTask, Event, EventKind, ExecutionState, GasEventData, TokenContent, Transaction,
};
use strata_vm::{ScriptBuilder, VmObject};
use tracing::{debug, info, warn};

use crate::config::LATEST_PROTOCOL_VERSION;
use crate::contract::{self, ContractRecord};
use crate::error::{RuntimeError, RuntimeResult};
use crate::native::NativeContractKind;
use crate::oracle::{BlockOracle, OracleReader};
use crate::runtime::{ExecutionOutcome, RuntimeVm, ENTRY_CONTEXT};
use crate::view::{ChainView, NexusView};
use crate::{ledger, registry, task};

const CHAIN: &str = "chain";

fn blocks() -> StorageMap {
    StorageMap::field(CHAIN, "blocks")
}

fn block_heights() -> StorageMap {
    StorageMap::field(CHAIN, "block_heights")
}

fn tx_records() -> StorageMap {
    StorageMap::field(CHAIN, "txs")
}

fn transaction_blocks() -> StorageMap {
    StorageMap::field(CHAIN, "tx_blocks")
}

fn decode_u64(bytes: &[u8], what: &str) -> RuntimeResult<u64> {
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| RuntimeError::Invalid(format!("stored {what}")))?;
    Ok(u64::from_le_bytes(array))
}

/// Take the next unique id of the chain whose state `storage` holds.
/// Ids start at 1 and are never handed out twice.
pub(crate) fn next_uid<S: StorageContext + ?Sized>(storage: &mut S) -> RuntimeResult<u64> {
    let key = field_key(CHAIN, "uid");
    let last = match storage.get(&key)? {
        Some(bytes) => decode_u64(&bytes, "uid")?,
        None => 0,
    };
    let next = last
        .checked_add(1)
        .ok_or_else(|| RuntimeError::Invalid("uid overflow".into()))?;
    storage.put(&key, next.to_le_bytes().to_vec())?;
    Ok(next)
}

/// One chain of a nexus
pub struct Chain {
    name: String,
    address: Address,
    parent: Option<String>,
    store: PrefixedStore,
    commit: Mutex<()>,
    metrics: Arc<Metrics>,
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .finish()
    }
}

impl Chain {
    /// Open chain `name` over the shared store. Its keys live under
    /// `chain/<name>/`.
    pub fn new(
        name: impl Into<String>,
        parent: Option<String>,
        store: Arc<dyn KeyValueStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let name = name.into();
        let prefix = format!("chain/{name}/").into_bytes();
        Self {
            address: address_from_name(&name),
            store: PrefixedStore::new(store, prefix),
            commit: Mutex::new(()),
            name,
            parent,
            metrics,
        }
    }

    /// Parent chain name, `None` for the root
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Committed state of this chain
    pub fn storage(&self) -> &PrefixedStore {
        &self.store
    }

    /// Height of the last committed block, zero when empty
    pub fn height(&self) -> RuntimeResult<BlockHeight> {
        match self.store.get(&field_key(CHAIN, "height"))? {
            Some(bytes) => decode_u64(&bytes, "height"),
            None => Ok(0),
        }
    }

    /// Block at `height`
    pub fn get_block(&self, height: BlockHeight) -> RuntimeResult<Option<Block>> {
        Ok(blocks().get_value(&self.store, &height.to_be_bytes())?)
    }

    /// Block with hash `hash`
    pub fn get_block_by_hash(&self, hash: &Hash) -> RuntimeResult<Option<Block>> {
        match block_heights().get(&self.store, hash.as_bytes())? {
            Some(bytes) => self.get_block(decode_u64(&bytes, "block height")?),
            None => Ok(None),
        }
    }

    /// Last committed block
    pub fn last_block(&self) -> RuntimeResult<Option<Block>> {
        match self.height()? {
            0 => Ok(None),
            height => self.get_block(height),
        }
    }

    /// Hash of the last committed block, zero when empty
    pub fn last_block_hash(&self) -> RuntimeResult<Hash> {
        Ok(self.last_block()?.map(|b| b.hash()).unwrap_or(Hash::ZERO))
    }

    /// Committed transaction by hash
    pub fn get_transaction(&self, hash: &Hash) -> RuntimeResult<Option<Transaction>> {
        Ok(tx_records().get_value(&self.store, hash.as_bytes())?)
    }

    /// Height of the block that included transaction `hash`
    pub fn transaction_height(&self, hash: &Hash) -> RuntimeResult<Option<BlockHeight>> {
        match transaction_blocks().get(&self.store, hash.as_bytes())? {
            Some(bytes) => Ok(Some(decode_u64(&bytes, "block height")?)),
            None => Ok(None),
        }
    }

    /// Balance of `address` in `symbol`
    pub fn get_token_balance(&self, symbol: &str, address: &Address) -> RuntimeResult<u128> {
        ledger::balance(&self.store, symbol, address)
    }

    /// Supply of `symbol` on this chain
    pub fn get_token_supply(&self, symbol: &str) -> RuntimeResult<u128> {
        ledger::supply(&self.store, symbol)
    }

    /// NFT ids of `symbol` held by `owner`
    pub fn get_owned_tokens(&self, symbol: &str, owner: &Address) -> RuntimeResult<Vec<u128>> {
        ledger::owned_tokens(&self.store, symbol, owner)
    }

    /// Content of NFT `id`
    pub fn get_nft(&self, symbol: &str, id: u128) -> RuntimeResult<TokenContent> {
        ledger::content(&self.store, symbol, id)
    }

    /// Task by id
    pub fn get_task(&self, id: u64) -> RuntimeResult<Option<ChainTask>> {
        task::get_task(&self.store, id)
    }

    /// Deployed contract by name
    pub fn get_contract(&self, name: &str) -> RuntimeResult<Option<ContractRecord>> {
        contract::get_contract(&self.store, name)
    }

    /// Names of deployed contracts
    pub fn contract_names(&self) -> RuntimeResult<Vec<String>> {
        contract::contract_names(&self.store)
    }

    /// Take and persist the next unique id
    pub fn generate_uid(&self) -> RuntimeResult<u64> {
        let _guard = self.commit.lock();
        let mut changes = StorageChangeSet::new(&self.store);
        let uid = next_uid(&mut changes)?;
        self.store.write_batch(changes.into_batch())?;
        Ok(uid)
    }

    fn check_linkage(&self, block: &Block) -> RuntimeResult<()> {
        if block.chain_address() != self.address {
            return Err(RuntimeError::WrongChain);
        }
        let expected = self.height()? + 1;
        if block.height() != expected {
            return Err(RuntimeError::InvalidHeight {
                expected,
                got: block.height(),
            });
        }
        let head = self.last_block_hash()?;
        if block.previous_hash() != head {
            return Err(RuntimeError::InvalidPreviousHash {
                expected: head,
                got: block.previous_hash(),
            });
        }
        Ok(())
    }

    fn check_transaction(
        &self,
        nexus: &dyn NexusView,
        tx: &Transaction,
        time: Timestamp,
        seen: &[Hash],
    ) -> RuntimeResult<()> {
        let reject = |reason: &str| RuntimeError::InvalidTransaction {
            hash: tx.hash(),
            reason: reason.to_string(),
        };
        if tx.nexus_name() != nexus.name() {
            return Err(reject("wrong nexus"));
        }
        if tx.chain_name() != self.name {
            return Err(reject("wrong chain"));
        }
        if tx.has_expired(time) {
            return Err(reject("expired"));
        }
        if seen.contains(&tx.hash()) || self.transaction_height(&tx.hash())?.is_some() {
            return Err(reject("duplicate"));
        }
        Ok(())
    }

    /// Execute `transactions` in order into `block` and return the writes
    /// to commit with it.
    ///
    /// A faulted transaction is still recorded, with an `ExecutionFailure`
    /// event carrying the reason, and its gas is still charged. On protocol
    /// 2 and later the due chain tasks run after the transactions. Oracle
    /// answers used while executing are recorded into the block.
    pub fn process_block(
        &self,
        nexus: &dyn NexusView,
        block: &mut Block,
        transactions: &[Transaction],
        oracle: &dyn OracleReader,
    ) -> RuntimeResult<WriteBatch> {
        timed!(self.metrics, names::BLOCK_PROCESS_US, {
            self.execute_block(nexus, block, transactions, oracle)
        })
    }

    fn execute_block(
        &self,
        nexus: &dyn NexusView,
        block: &mut Block,
        transactions: &[Transaction],
        oracle: &dyn OracleReader,
    ) -> RuntimeResult<WriteBatch> {
        self.check_linkage(block)?;
        let protocol = block.protocol();
        let current = registry::protocol_version(nexus.root_storage())?;
        if current == 0 {
            return Err(RuntimeError::Genesis("nexus has no genesis block".into()));
        }
        if protocol != current || protocol > LATEST_PROTOCOL_VERSION {
            return Err(RuntimeError::Invalid(format!(
                "block protocol {protocol}, expected {current}"
            )));
        }

        let mut seen = Vec::with_capacity(transactions.len());
        for tx in transactions {
            self.check_transaction(nexus, tx, block.timestamp(), &seen)?;
            seen.push(tx.hash());
        }

        info!(
            chain = %self.name,
            height = block.height(),
            txs = transactions.len(),
            "processing block"
        );

        let mut changes = StorageChangeSet::new(&self.store);
        for tx in transactions {
            let outcome = RuntimeVm::new(self, nexus, &changes, oracle)
                .at_block(block.height(), block.timestamp(), protocol)
                .with_transaction(tx)
                .run(tx.script());
            self.record_transaction(nexus, &mut changes, block, tx.hash(), outcome)?;
        }

        if protocol >= 2 {
            self.run_tasks(nexus, &mut changes, block, oracle)?;
        }

        for entry in oracle.entries() {
            block.add_oracle_entry(entry)?;
        }
        self.metrics.increment(names::BLOCK_PROCESSED);
        info!(
            chain = %self.name,
            height = block.height(),
            successful = block.is_successful(),
            writes = changes.len(),
            "block processed"
        );
        Ok(changes.into_batch())
    }

    fn record_transaction(
        &self,
        nexus: &dyn NexusView,
        changes: &mut StorageChangeSet<'_>,
        block: &mut Block,
        hash: Hash,
        mut outcome: ExecutionOutcome,
    ) -> RuntimeResult<()> {
        block.add_transaction(hash)?;
        debug!(
            tx = %hash,
            state = ?outcome.state,
            gas_used = outcome.gas_used,
            "transaction executed"
        );
        self.metrics.observe(names::TX_GAS_USED, outcome.gas_used);

        match outcome.state {
            ExecutionState::Fault => {
                self.metrics.increment(names::TX_FAULT);
                let reason = outcome.fault.clone().unwrap_or_default();
                let event = Event::new(
                    EventKind::ExecutionFailure,
                    self.address,
                    ENTRY_CONTEXT,
                    reason.into_bytes(),
                );
                block.notify(hash, event)?;
            }
            state => {
                let counter = if state == ExecutionState::Break {
                    names::TX_BREAK
                } else {
                    names::TX_HALT
                };
                self.metrics.increment(counter);
            }
        }
        block.set_state(hash, outcome.state)?;

        // the fee is charged against balances after the run's own writes
        changes.apply(std::mem::take(&mut outcome.batch));
        let gas_event = self.settle_gas(nexus, changes, &outcome)?;
        let ExecutionOutcome { result, events, .. } = outcome;
        for event in events {
            block.notify(hash, event)?;
        }
        if let Some(event) = gas_event {
            block.notify(hash, event)?;
        }
        if let Some(value) = result {
            block.set_result(hash, value.to_bytes())?;
        }
        Ok(())
    }

    /// Move the fee of `outcome` from its payer to the gas contract. A
    /// payer who cannot cover the fee pays what it holds.
    fn settle_gas(
        &self,
        nexus: &dyn NexusView,
        changes: &mut StorageChangeSet<'_>,
        outcome: &ExecutionOutcome,
    ) -> RuntimeResult<Option<Event>> {
        let Some(payer) = outcome.gas_payer else {
            return Ok(None);
        };
        let fee = outcome.fee();
        if fee == 0 {
            return Ok(None);
        }
        let fuel = &nexus.config().fuel_token;
        let available = ledger::balance(changes, fuel, &payer)?;
        let paid = fee.min(available);
        if paid < fee {
            warn!(%payer, fee, available, "gas payer cannot cover the fee");
        }
        let gas_address = NativeContractKind::Gas.address();
        if paid > 0 {
            ledger::transfer(changes, fuel, &payer, &gas_address, paid)?;
        }
        let data = GasEventData {
            address: gas_address,
            price: i128::try_from(outcome.gas_price)
                .map_err(|_| RuntimeError::Invalid(format!("gas price {}", outcome.gas_price)))?,
            amount: i128::from(outcome.gas_used),
        };
        Ok(Some(Event::new(
            EventKind::GasPayment,
            payer,
            NativeContractKind::Gas.name(),
            data.to_bytes(),
        )))
    }

    fn run_tasks(
        &self,
        nexus: &dyn NexusView,
        changes: &mut StorageChangeSet<'_>,
        block: &mut Block,
        oracle: &dyn OracleReader,
    ) -> RuntimeResult<()> {
        let (height, time) = (block.height(), block.timestamp());
        for mut chain_task in task::active_tasks(changes)? {
            let last = task::last_run(changes, chain_task.id)?;
            if !task::is_due(&chain_task, &last, height, time) {
                continue;
            }

            let script = ScriptBuilder::new()
                .emit_call_contract(&chain_task.context_name, &chain_task.method, &[])
                .end_script()?;
            let mut outcome = RuntimeVm::new(self, nexus, &*changes, oracle)
                .at_block(height, time, block.protocol())
                .with_task(chain_task.clone())
                .run(&script);
            self.metrics.increment(names::TASK_EXECUTED);
            debug!(
                task = chain_task.id,
                state = ?outcome.state,
                gas_used = outcome.gas_used,
                "task executed"
            );

            let batch = std::mem::take(&mut outcome.batch);
            if outcome.state == ExecutionState::Fault {
                self.metrics.increment(names::TASK_FAULT);
                warn!(
                    task = chain_task.id,
                    reason = outcome.fault.as_deref().unwrap_or_default(),
                    "task faulted"
                );
            } else {
                let stop = outcome.result == Some(VmObject::Bool(false));
                changes.apply(batch);
                for event in std::mem::take(&mut outcome.events) {
                    block.notify_block(event)?;
                }
                if stop {
                    task::deactivate(changes, &mut chain_task)?;
                    block.notify_block(Event::new(
                        EventKind::TaskStop,
                        chain_task.owner,
                        CHAIN,
                        chain_task.id.to_le_bytes().to_vec(),
                    ))?;
                }
            }
            if let Some(event) = self.settle_gas(nexus, changes, &outcome)? {
                block.notify_block(event)?;
            }
            task::record_run(changes, chain_task.id, height, time)?;
        }
        Ok(())
    }

    /// Append `block` and its transactions, committing `batch` with them
    pub fn add_block(
        &self,
        block: &Block,
        transactions: &[Transaction],
        batch: WriteBatch,
    ) -> RuntimeResult<Hash> {
        let _guard = self.commit.lock();
        self.check_linkage(block)?;
        let hashes: Vec<Hash> = transactions.iter().map(Transaction::hash).collect();
        if hashes.as_slice() != block.transaction_hashes() {
            return Err(RuntimeError::Invalid(
                "transactions do not match the block".into(),
            ));
        }

        let height = block.height();
        let hash = block.hash();
        let mut changes = StorageChangeSet::new(&self.store);
        changes.apply(batch);
        blocks().set_value(&mut changes, &height.to_be_bytes(), block)?;
        block_heights().set(&mut changes, hash.as_bytes(), height.to_le_bytes().to_vec())?;
        for tx in transactions {
            tx_records().set_value(&mut changes, tx.hash().as_bytes(), tx)?;
            transaction_blocks().set(&mut changes, tx.hash().as_bytes(), height.to_le_bytes().to_vec())?;
        }
        changes.put(&field_key(CHAIN, "height"), height.to_le_bytes().to_vec())?;
        self.store.write_batch(changes.into_batch())?;

        self.metrics.gauge(names::CHAIN_HEIGHT, height as i64);
        info!(chain = %self.name, height, hash = %hash, txs = transactions.len(), "block added");
        Ok(hash)
    }

    /// Process an assembled, unsigned block and append it
    pub fn set_block(
        &self,
        nexus: &dyn NexusView,
        block: &mut Block,
        transactions: &[Transaction],
        oracle: &dyn OracleReader,
    ) -> RuntimeResult<Hash> {
        let batch = self.process_block(nexus, block, transactions, oracle)?;
        self.add_block(block, transactions, batch)
    }

    /// Run `script` against committed state without keeping any write.
    /// Faults become [`RuntimeError::QueryFaulted`].
    pub fn invoke_script(&self, nexus: &dyn NexusView, script: &[u8]) -> RuntimeResult<Option<VmObject>> {
        let time = self.last_block()?.map(|b| b.timestamp()).unwrap_or_default();
        self.invoke_at(nexus, script, time)
    }

    /// Call `method` of `contract` as of `time` without keeping any write
    pub fn invoke_contract_at(
        &self,
        nexus: &dyn NexusView,
        contract: &str,
        method: &str,
        args: &[VmObject],
        time: Timestamp,
    ) -> RuntimeResult<Option<VmObject>> {
        let script = ScriptBuilder::new()
            .emit_call_contract(contract, method, args)
            .end_script()?;
        self.invoke_at(nexus, &script, time)
    }

    fn invoke_at(
        &self,
        nexus: &dyn NexusView,
        script: &[u8],
        time: Timestamp,
    ) -> RuntimeResult<Option<VmObject>> {
        self.metrics.increment(names::QUERY_INVOKED);
        let oracle = BlockOracle::empty();
        let protocol = registry::protocol_version(nexus.root_storage())?;
        let outcome = RuntimeVm::new(self, nexus, &self.store, &oracle)
            .at_block(self.height()?, time, protocol)
            .with_gas_limit(nexus.config().query_gas_limit)
            .run(script);
        match outcome.state {
            ExecutionState::Fault => Err(RuntimeError::QueryFaulted(
                outcome.fault.unwrap_or_default(),
            )),
            _ => Ok(outcome.result),
        }
    }
}

impl ChainView for Chain {
    fn name(&self) -> &str {
        &self.name
    }

    fn address(&self) -> Address {
        self.address
    }

    fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}
