//! Transaction execution host.
//!
//! [`RuntimeVm`] binds the interpreter to one chain: interop calls, context
//! resolution and native dispatch all read and write through a changeset
//! scoped to a single transaction or task run. The caller decides whether
//! the resulting batch is kept.

mod interop;
mod tokens;

use std::sync::Arc;

use strata_primitives::{Address, BlockHeight, Timestamp};
use strata_storage::{StorageChangeSet, StorageMap, StorageReader, WriteBatch};
use strata_types::{ChainTask, Event, EventKind, ExecutionState, TokenInfo, Transaction};
use strata_vm::{
    run_context, ExecutionContext, Machine, MachineState, ScriptContext, VmError, VmObject,
    VmResult,
};
use tracing::{debug, trace};

use crate::config::NexusConfig;
use crate::contract;
use crate::error::RuntimeError;
use crate::native::{self, NativeContext, NativeContractKind};
use crate::oracle::OracleReader;
use crate::registry;
use crate::view::{ChainView, NexusView};

/// Name of the context a transaction script runs in
pub const ENTRY_CONTEXT: &str = "entry";

/// Nesting limit of token triggers
pub const MAX_TRIGGER_DEPTH: usize = 5;

/// Everything an execution produced
#[derive(Debug)]
pub struct ExecutionOutcome {
    /// Final state, never `Running`
    pub state: ExecutionState,
    /// Value left on top of the stack by a successful run
    pub result: Option<VmObject>,
    /// Events of a successful run
    pub events: Vec<Event>,
    /// Gas charged, whatever the outcome
    pub gas_used: u64,
    /// Address the gas is billed to
    pub gas_payer: Option<Address>,
    /// Price per gas unit
    pub gas_price: u128,
    /// Fault reason
    pub fault: Option<String>,
    /// Storage writes of a successful run; empty otherwise
    pub batch: WriteBatch,
}

impl ExecutionOutcome {
    /// Fee owed for the run
    pub fn fee(&self) -> u128 {
        u128::from(self.gas_used).saturating_mul(self.gas_price)
    }
}

/// Per-execution VM host
pub struct RuntimeVm<'a> {
    state: MachineState,
    chain: &'a dyn ChainView,
    nexus: &'a dyn NexusView,
    changes: StorageChangeSet<'a>,
    oracle: &'a dyn OracleReader,
    transaction: Option<&'a Transaction>,
    signers: Vec<Address>,
    time: Timestamp,
    height: BlockHeight,
    protocol: u32,
    events: Vec<Event>,
    gas_payer: Option<Address>,
    gas_target: Address,
    gas_price: u128,
    gas_allowed: bool,
    trigger_depth: usize,
    task: Option<ChainTask>,
}

fn activity() -> StorageMap {
    StorageMap::field(NativeContractKind::Account.name(), "activity")
}

impl<'a> RuntimeVm<'a> {
    /// Host over `storage` with the nexus default gas limit
    pub fn new(
        chain: &'a dyn ChainView,
        nexus: &'a dyn NexusView,
        storage: &'a dyn StorageReader,
        oracle: &'a dyn OracleReader,
    ) -> Self {
        let config = nexus.config();
        Self {
            state: MachineState::new(config.default_gas_limit),
            chain,
            nexus,
            changes: StorageChangeSet::new(storage),
            oracle,
            transaction: None,
            signers: Vec::new(),
            time: 0,
            height: 0,
            protocol: config.protocol_version,
            events: Vec::new(),
            gas_payer: None,
            gas_target: Address::NULL,
            gas_price: u128::from(config.min_gas_price),
            gas_allowed: false,
            trigger_depth: 0,
            task: None,
        }
    }

    /// Run as part of the block at `height`
    pub fn at_block(mut self, height: BlockHeight, time: Timestamp, protocol: u32) -> Self {
        self.height = height;
        self.time = time;
        self.protocol = protocol;
        self
    }

    /// Replace the gas limit
    pub fn with_gas_limit(mut self, limit: u64) -> Self {
        self.state.gas_mut().set_limit(limit);
        self
    }

    /// Run on behalf of `tx`. Until `AllowGas` is called the first signer
    /// pays at the minimum price.
    pub fn with_transaction(mut self, tx: &'a Transaction) -> Self {
        self.signers = tx.signers();
        self.gas_payer = self.signers.first().copied();
        self.transaction = Some(tx);
        self
    }

    /// Run one step of `task`; its owner pays at the minimum price and its
    /// own gas limit applies.
    pub fn with_task(mut self, task: ChainTask) -> Self {
        self.state.gas_mut().set_limit(task.gas_limit);
        self.gas_payer = Some(task.owner);
        self.gas_allowed = true;
        self.task = Some(task);
        self
    }

    /// Execute `script` in the entry context
    pub fn run(mut self, script: &[u8]) -> ExecutionOutcome {
        let result = self
            .record_activity()
            .and_then(|_| {
                let entry: Arc<dyn ExecutionContext> =
                    Arc::new(ScriptContext::new(ENTRY_CONTEXT, script.to_vec()));
                run_context(&mut self, entry)
            });

        let gas_used = self.state.gas().used();
        let (state, fault) = match result {
            Ok(state) => (state, None),
            Err(err) => (ExecutionState::Fault, Some(err.to_string())),
        };
        if let Some(reason) = &fault {
            debug!(chain = self.chain.name(), gas_used, reason = %reason, "execution faulted");
        }

        let gas_payer = self.gas_payer;
        let gas_price = self.gas_price;
        let (result, events, batch) = if state.is_success() {
            let value = self.state.stack_mut().pop().ok();
            (value, std::mem::take(&mut self.events), self.changes.into_batch())
        } else {
            (None, Vec::new(), WriteBatch::new())
        };

        ExecutionOutcome {
            state,
            result,
            events,
            gas_used,
            gas_payer,
            gas_price,
            fault,
            batch,
        }
    }

    fn record_activity(&mut self) -> VmResult<()> {
        let time = self.time;
        for signer in self.signers.clone() {
            activity().set(&mut self.changes, signer.as_bytes(), time.to_le_bytes().to_vec())?;
        }
        Ok(())
    }

    /// Last time `address` signed a successful transaction on this chain
    pub fn last_activity(&self, address: &Address) -> VmResult<Timestamp> {
        match activity().get(&self.changes, address.as_bytes())? {
            Some(bytes) => {
                let array: [u8; 4] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| VmError::Codec("activity entry".into()))?;
                Ok(Timestamp::from_le_bytes(array))
            }
            None => Ok(0),
        }
    }

    /// Nexus parameters
    pub fn config(&self) -> &NexusConfig {
        self.nexus.config()
    }

    /// Block time
    pub fn time(&self) -> Timestamp {
        self.time
    }

    /// Block height
    pub fn height(&self) -> BlockHeight {
        self.height
    }

    /// Protocol version rules are applied for
    pub fn protocol(&self) -> u32 {
        self.protocol
    }

    /// Chain name
    pub fn chain_name(&self) -> &str {
        self.chain.name()
    }

    /// Chain address
    pub fn chain_address(&self) -> Address {
        self.chain.address()
    }

    /// Transaction being executed, if any
    pub fn transaction(&self) -> Option<&'a Transaction> {
        self.transaction
    }

    /// Task being executed, if any
    pub fn task(&self) -> Option<&ChainTask> {
        self.task.as_ref()
    }

    /// Oracle of the current block
    pub fn oracle(&self) -> &dyn OracleReader {
        self.oracle
    }

    /// Gas charged so far
    pub fn gas_used(&self) -> u64 {
        self.state.gas().used()
    }

    /// Address the gas is billed to
    pub fn gas_payer(&self) -> Option<Address> {
        self.gas_payer
    }

    /// Address named as gas target by `AllowGas`
    pub fn gas_target(&self) -> Address {
        self.gas_target
    }

    pub(crate) fn gas_payer_set(&self) -> bool {
        self.gas_allowed
    }

    pub(crate) fn allow_gas(&mut self, payer: Address, target: Address, price: u128, limit: u64) {
        self.state.gas_mut().set_limit(limit);
        self.gas_payer = Some(payer);
        self.gas_target = target;
        self.gas_price = price;
        self.gas_allowed = true;
    }

    /// Chain state as seen by this execution
    pub fn storage(&self) -> &StorageChangeSet<'a> {
        &self.changes
    }

    /// Mutable chain state
    pub fn storage_mut(&mut self) -> &mut StorageChangeSet<'a> {
        &mut self.changes
    }

    /// Nexus registry. On the root chain this includes the writes of the
    /// running execution; elsewhere it is the committed root state.
    pub fn registry(&self) -> &dyn StorageReader {
        if self.chain.is_root() {
            &self.changes
        } else {
            self.nexus.root_storage()
        }
    }

    /// Writable nexus registry, only available on the root chain
    pub fn registry_mut(&mut self) -> VmResult<&mut StorageChangeSet<'a>> {
        if !self.chain.is_root() {
            return Err(VmError::Runtime(
                "registry writes are only allowed on the root chain".into(),
            ));
        }
        Ok(&mut self.changes)
    }

    /// Name of the running context
    pub fn current_context_name(&self) -> String {
        self.state
            .current_context()
            .map(|ctx| ctx.name().to_string())
            .unwrap_or_default()
    }

    /// Record an event
    pub fn notify(&mut self, kind: EventKind, address: Address, contract: &str, data: Vec<u8>) {
        trace!(?kind, %address, contract, "event");
        self.events.push(Event::new(kind, address, contract, data));
    }

    /// Whether `address` authorized the running code.
    ///
    /// Holds for the running context and its caller, the owner of a running
    /// task, any transaction signer, and an organization whose members
    /// signed by strict majority.
    pub fn is_witness(&self, address: &Address) -> VmResult<bool> {
        let contexts = [self.state.current_context(), self.state.previous_context()];
        if contexts.into_iter().flatten().any(|ctx| ctx.address() == *address) {
            return Ok(true);
        }
        if self.task.as_ref().is_some_and(|task| task.owner == *address) {
            return Ok(true);
        }
        if self.signers.contains(address) {
            return Ok(true);
        }
        let registry = self.registry();
        match registry::organization_by_address(registry, address)? {
            Some(org) => Ok(registry::is_organization_witness(registry, &org.id, &self.signers)?),
            None => Ok(false),
        }
    }

    /// Fault unless `address` is a witness
    pub fn expect_witness(&self, address: &Address) -> VmResult<()> {
        if self.is_witness(address)? {
            Ok(())
        } else {
            Err(RuntimeError::WitnessFailed(address.to_string()).into())
        }
    }

    /// Whether a token trigger is running
    pub fn is_trigger(&self) -> bool {
        self.trigger_depth > 0
    }

    /// Invoke `trigger` of `token` if its ABI declares it. A trigger that
    /// faults or returns `false` aborts the operation that fired it.
    pub(crate) fn invoke_trigger(
        &mut self,
        token: &TokenInfo,
        trigger: &str,
        args: &[VmObject],
    ) -> VmResult<()> {
        if !token.has_script() || !token.abi.has_method(trigger) {
            return Ok(());
        }
        if self.trigger_depth >= MAX_TRIGGER_DEPTH {
            return Err(VmError::Runtime(format!(
                "trigger depth exceeded (max {MAX_TRIGGER_DEPTH})"
            )));
        }

        let base = self.state.stack().len();
        for arg in args.iter().rev() {
            self.state.push(arg.clone())?;
        }
        self.state.push(VmObject::String(trigger.to_string()))?;

        let context: Arc<dyn ExecutionContext> = Arc::new(ScriptContext::with_abi(
            token.symbol.as_str(),
            token.script.clone(),
            token.abi.clone(),
        ));
        trace!(symbol = %token.symbol, trigger, depth = self.trigger_depth, "token trigger");
        self.trigger_depth += 1;
        let result = run_context(self, context);
        self.trigger_depth -= 1;
        result?;

        let returned = if self.state.stack().len() > base {
            Some(self.state.pop()?)
        } else {
            None
        };
        while self.state.stack().len() > base {
            self.state.pop()?;
        }
        if returned == Some(VmObject::Bool(false)) {
            return Err(VmError::Runtime(format!(
                "{} trigger {trigger} rejected the operation",
                token.symbol
            )));
        }
        Ok(())
    }
}

/// Ledger quantity as a VM number. Amounts beyond the signed range fault.
pub(crate) fn to_number(value: u128) -> VmResult<i128> {
    i128::try_from(value).map_err(|_| VmError::Arithmetic(format!("{value} exceeds the number range")))
}

impl Machine for RuntimeVm<'_> {
    fn state(&self) -> &MachineState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut MachineState {
        &mut self.state
    }

    fn execute_interop(&mut self, name: &str) -> VmResult<ExecutionState> {
        interop::execute(self, name)
    }

    /// Natives first, then deployed contracts, then token scripts
    fn load_context(&mut self, name: &str) -> VmResult<Arc<dyn ExecutionContext>> {
        if let Some(kind) = NativeContractKind::from_name(name) {
            return Ok(NativeContext::shared(kind));
        }
        if let Some(record) = contract::get_contract(&self.changes, name)? {
            if record.killed {
                return Err(VmError::ContractNotAvailable(name.to_string()));
            }
            return Ok(Arc::new(ScriptContext::with_abi(name, record.script, record.abi)));
        }
        if let Some(token) = registry::get_token(self.registry(), name)? {
            if token.has_script() {
                return Ok(Arc::new(ScriptContext::with_abi(name, token.script, token.abi)));
            }
        }
        Err(VmError::ContextNotFound(name.to_string()))
    }

    fn switch_context(&mut self, context: Arc<dyn ExecutionContext>) -> VmResult<ExecutionState> {
        run_context(self, context)
    }

    fn execute_native(&mut self, contract: &str) -> VmResult<ExecutionState> {
        native::dispatch(self, contract)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory chain and nexus views

    use strata_crypto::address_from_name;
    use strata_storage::{MemoryStore, StorageReader};

    use super::*;

    pub struct FakeChain {
        pub name: String,
        pub root: bool,
    }

    impl FakeChain {
        pub fn root() -> Self {
            Self {
                name: "main".into(),
                root: true,
            }
        }

        pub fn side(name: &str) -> Self {
            Self {
                name: name.into(),
                root: false,
            }
        }
    }

    impl ChainView for FakeChain {
        fn name(&self) -> &str {
            &self.name
        }

        fn address(&self) -> Address {
            address_from_name(&self.name)
        }

        fn is_root(&self) -> bool {
            self.root
        }
    }

    #[derive(Default)]
    pub struct FakeNexus {
        pub config: NexusConfig,
        pub root: MemoryStore,
    }

    impl NexusView for FakeNexus {
        fn name(&self) -> &str {
            &self.config.name
        }

        fn config(&self) -> &NexusConfig {
            &self.config
        }

        fn root_storage(&self) -> &dyn StorageReader {
            &self.root
        }
    }
}
