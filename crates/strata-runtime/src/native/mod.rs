//! Built-in contracts.
//!
//! Every native contract has a well-known kind and a name-derived address.
//! Callable ones register an explicit method table: name, parameter types,
//! return type and a plain function handler. Handlers hold no state of
//! their own; everything they touch is read from and written back to chain
//! storage through the [`RuntimeVm`] of the current call.

pub(crate) mod account;
mod gas;
mod governance;
mod stake;
mod validator;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use strata_crypto::address_from_name;
use strata_primitives::{Address, Timestamp};
use strata_types::{ContractAbi, ContractMethod, ContractParameter, ExecutionState, VmType};
use strata_vm::{ExecutionContext, Machine, VmError, VmObject, VmResult};
use tracing::trace;

use crate::runtime::RuntimeVm;

pub use stake::stake_of;

/// Well-known built-in contracts
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NativeContractKind {
    /// Gas allowance and settlement
    Gas,
    /// Block bookkeeping
    Block,
    /// Staking
    Stake,
    /// Cross-platform swaps
    Swap,
    /// Account names
    Account,
    /// Consensus voting
    Consensus,
    /// Protocol governance
    Governance,
    /// Storage quotas
    Storage,
    /// Validator set
    Validator,
    /// Interop bridge
    Interop,
    /// Order book exchange
    Exchange,
    /// Private transfers
    Privacy,
    /// Off-chain relay channels
    Relay,
    /// Leaderboards
    Ranking,
    /// NFT market
    Market,
    /// Friend lists
    Friends,
    /// Mailboxes
    Mail,
    /// Token sales
    Sale,
    /// Yield farming
    Farm,
}

impl NativeContractKind {
    /// Every kind, in registration order
    pub const ALL: [Self; 19] = [
        Self::Gas,
        Self::Block,
        Self::Stake,
        Self::Swap,
        Self::Account,
        Self::Consensus,
        Self::Governance,
        Self::Storage,
        Self::Validator,
        Self::Interop,
        Self::Exchange,
        Self::Privacy,
        Self::Relay,
        Self::Ranking,
        Self::Market,
        Self::Friends,
        Self::Mail,
        Self::Sale,
        Self::Farm,
    ];

    /// Contract name
    pub fn name(self) -> &'static str {
        match self {
            Self::Gas => "gas",
            Self::Block => "block",
            Self::Stake => "stake",
            Self::Swap => "swap",
            Self::Account => "account",
            Self::Consensus => "consensus",
            Self::Governance => "governance",
            Self::Storage => "storage",
            Self::Validator => "validator",
            Self::Interop => "interop",
            Self::Exchange => "exchange",
            Self::Privacy => "privacy",
            Self::Relay => "relay",
            Self::Ranking => "ranking",
            Self::Market => "market",
            Self::Friends => "friends",
            Self::Mail => "mail",
            Self::Sale => "sale",
            Self::Farm => "farm",
        }
    }

    /// Kind named `name`
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Contract address
    pub fn address(self) -> Address {
        contract_address(self.name())
    }
}

/// Address of the contract named `name`.
///
/// Pure and deterministic; results are memoized in a process-wide map that
/// only ever grows.
pub fn contract_address(name: &str) -> Address {
    static CACHE: OnceLock<DashMap<String, Address>> = OnceLock::new();
    let cache = CACHE.get_or_init(DashMap::new);
    if let Some(address) = cache.get(name) {
        return *address;
    }
    *cache
        .entry(name.to_string())
        .or_insert_with(|| address_from_name(name))
}

/// Arguments of a native call, already cast to the declared parameter types
#[derive(Debug)]
pub struct NativeArgs(Vec<VmObject>);

impl NativeArgs {
    fn get(&self, index: usize) -> VmResult<&VmObject> {
        self.0
            .get(index)
            .ok_or_else(|| VmError::Runtime(format!("missing argument {index}")))
    }

    /// Address argument
    pub fn address(&self, index: usize) -> VmResult<Address> {
        self.get(index)?.as_address()
    }

    /// Number argument
    pub fn number(&self, index: usize) -> VmResult<i128> {
        self.get(index)?.as_number()
    }

    /// Non-negative amount argument
    pub fn amount(&self, index: usize) -> VmResult<u128> {
        let n = self.number(index)?;
        u128::try_from(n).map_err(|_| VmError::Runtime(format!("negative amount {n}")))
    }

    /// String argument
    pub fn string(&self, index: usize) -> VmResult<String> {
        self.get(index)?.as_string()
    }

    /// Timestamp argument
    pub fn timestamp(&self, index: usize) -> VmResult<Timestamp> {
        self.get(index)?.as_timestamp()
    }
}

/// Handler of a native method
pub type NativeHandler = fn(&mut RuntimeVm<'_>, &NativeArgs) -> VmResult<VmObject>;

/// One registered native method
pub struct NativeMethod {
    name: &'static str,
    parameters: Vec<ContractParameter>,
    returns: VmType,
    handler: NativeHandler,
}

impl NativeMethod {
    /// Method name
    pub fn name(&self) -> &str {
        self.name
    }

    /// Declared parameters
    pub fn parameters(&self) -> &[ContractParameter] {
        &self.parameters
    }

    /// Declared return type, `None` for no result
    pub fn returns(&self) -> VmType {
        self.returns
    }
}

/// Registration table of a native contract
pub struct MethodTable {
    methods: Vec<NativeMethod>,
}

impl MethodTable {
    fn new() -> Self {
        Self { methods: Vec::new() }
    }

    fn method(
        mut self,
        name: &'static str,
        parameters: &[(&str, VmType)],
        returns: VmType,
        handler: NativeHandler,
    ) -> Self {
        self.methods.push(NativeMethod {
            name,
            parameters: parameters
                .iter()
                .map(|(name, vm_type)| ContractParameter::new(*name, *vm_type))
                .collect(),
            returns,
            handler,
        });
        self
    }

    /// Method by name, ignoring case
    pub fn find(&self, name: &str) -> Option<&NativeMethod> {
        self.methods.iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }

    /// Registered methods in registration order
    pub fn methods(&self) -> &[NativeMethod] {
        &self.methods
    }

    /// ABI describing the table. Native methods have no script offset.
    pub fn abi(&self) -> ContractAbi {
        ContractAbi::new(
            self.methods
                .iter()
                .map(|m| ContractMethod::new(m.name, m.returns, -1, m.parameters.clone()))
                .collect(),
        )
    }
}

/// Method table of `kind`, or `None` if the contract is not callable here
pub fn method_table(kind: NativeContractKind) -> Option<&'static MethodTable> {
    static TABLES: OnceLock<HashMap<NativeContractKind, MethodTable>> = OnceLock::new();
    TABLES
        .get_or_init(|| {
            HashMap::from([
                (NativeContractKind::Gas, gas::methods()),
                (NativeContractKind::Stake, stake::methods()),
                (NativeContractKind::Validator, validator::methods()),
                (NativeContractKind::Governance, governance::methods()),
                (NativeContractKind::Account, account::methods()),
            ])
        })
        .get(&kind)
}

/// Execution context of a native contract
pub struct NativeContext {
    kind: NativeContractKind,
}

impl NativeContext {
    /// Context for `kind`
    pub fn new(kind: NativeContractKind) -> Self {
        Self { kind }
    }

    /// Shared handle for `kind`
    pub fn shared(kind: NativeContractKind) -> Arc<dyn ExecutionContext> {
        Arc::new(Self::new(kind))
    }

    /// Contract kind
    pub fn kind(&self) -> NativeContractKind {
        self.kind
    }
}

impl ExecutionContext for NativeContext {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn address(&self) -> Address {
        self.kind.address()
    }

    fn execute(&self, machine: &mut dyn Machine) -> VmResult<ExecutionState> {
        machine.execute_native(self.kind.name())
    }
}

/// Accept `value` for a parameter of type `expected`. Only encodings of the
/// same value convert: raw bytes into addresses, hashes or structs, and
/// numbers into enums or timestamps.
fn marshal(value: VmObject, expected: VmType) -> Option<VmObject> {
    if expected == VmType::None || value.vm_type() == expected {
        return Some(value);
    }
    match (&value, expected) {
        (VmObject::Bytes(_), VmType::Object | VmType::Struct)
        | (VmObject::Number(_), VmType::Enum | VmType::Timestamp)
        | (VmObject::Timestamp(_), VmType::Number) => value.cast(expected).ok(),
        _ => None,
    }
}

/// Pop a method call off the stack, marshal its arguments and run the handler
pub(crate) fn dispatch(vm: &mut RuntimeVm<'_>, contract: &str) -> VmResult<ExecutionState> {
    let kind = NativeContractKind::from_name(contract)
        .ok_or_else(|| VmError::ContextNotFound(contract.to_string()))?;
    let table = method_table(kind).ok_or_else(|| VmError::ContractNotAvailable(contract.to_string()))?;

    let method_name = vm.state_mut().pop()?.as_string()?;
    let method = table
        .find(&method_name)
        .ok_or_else(|| VmError::Runtime(format!("method {method_name} not found in {contract}")))?;

    let invalid = || VmError::Runtime(format!("invalid arguments for {contract}.{}", method.name));
    let pushed = vm
        .state()
        .stack()
        .len()
        .saturating_sub(vm.state().caller_stack_base());
    if pushed != method.parameters.len() {
        return Err(invalid());
    }

    let mut args = Vec::with_capacity(method.parameters.len());
    for param in &method.parameters {
        let value = vm.state_mut().pop()?;
        args.push(marshal(value, param.vm_type).ok_or_else(invalid)?);
    }

    trace!(contract, method = method.name, "native call");
    let result = (method.handler)(vm, &NativeArgs(args))?;
    if method.returns != VmType::None {
        vm.state_mut().push(result)?;
    }
    Ok(ExecutionState::Halt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::BlockOracle;
    use crate::runtime::testing::{FakeChain, FakeNexus};
    use crate::runtime::ExecutionOutcome;
    use strata_storage::MemoryStore;
    use strata_vm::ScriptBuilder;

    fn call(build: impl FnOnce(&mut ScriptBuilder)) -> ExecutionOutcome {
        let mut sb = ScriptBuilder::new();
        build(&mut sb);
        let code = sb.end_script().unwrap();
        let (chain, nexus, store, oracle) =
            (FakeChain::root(), FakeNexus::default(), MemoryStore::new(), BlockOracle::empty());
        RuntimeVm::new(&chain, &nexus, &store, &oracle).run(&code)
    }

    #[test]
    fn test_kind_names_roundtrip() {
        for kind in NativeContractKind::ALL {
            assert_eq!(NativeContractKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(NativeContractKind::from_name("Gas"), None);
        assert_eq!(NativeContractKind::from_name("nope"), None);
    }

    #[test]
    fn test_address_matches_name_derivation() {
        for kind in NativeContractKind::ALL {
            assert_eq!(kind.address(), address_from_name(kind.name()));
            assert_eq!(contract_address(kind.name()), kind.address());
        }
    }

    #[test]
    fn test_tables_only_for_implemented_kinds() {
        assert!(method_table(NativeContractKind::Gas).is_some());
        assert!(method_table(NativeContractKind::Account).is_some());
        assert!(method_table(NativeContractKind::Exchange).is_none());
        assert!(method_table(NativeContractKind::Mail).is_none());
    }

    #[test]
    fn test_method_lookup_ignores_case() {
        let table = method_table(NativeContractKind::Gas).unwrap();
        assert!(table.find("allowgas").is_some());
        assert!(table.find("ALLOWGAS").is_some());
        assert!(table.find("StealGas").is_none());

        let abi = table.abi();
        let method = abi.find_method("AllowGas").unwrap();
        assert_eq!(method.parameters.len(), 4);
        assert_eq!(method.offset, -1);
    }

    #[test]
    fn test_call_with_declared_arguments() {
        let outcome = call(|b| {
            b.emit_call_contract("gas", "GetMinimumGasPrice", &[]);
        });
        assert_eq!(outcome.state, ExecutionState::Halt);
        assert_eq!(outcome.result, Some(VmObject::Number(1)));
    }

    #[test]
    fn test_extra_arguments_fault() {
        let outcome = call(|b| {
            b.emit_call_contract("gas", "GetMinimumGasPrice", &[VmObject::Number(9)]);
        });
        assert_eq!(outcome.state, ExecutionState::Fault);
        assert_eq!(
            outcome.fault.as_deref(),
            Some("invalid arguments for gas.GetMinimumGasPrice")
        );

        // a value the caller left behind counts against the call too
        let outcome = call(|b| {
            b.emit_load_number(1, 9)
                .emit_push(1)
                .emit_call_contract("gas", "GetMinimumGasPrice", &[]);
        });
        assert_eq!(outcome.state, ExecutionState::Fault);
    }

    #[test]
    fn test_missing_arguments_fault() {
        let from = address_from_name("someone");
        let outcome = call(|b| {
            b.emit_call_contract("gas", "AllowGas", &[VmObject::from(from), VmObject::from(from)]);
        });
        assert_eq!(outcome.state, ExecutionState::Fault);
        assert_eq!(outcome.fault.as_deref(), Some("invalid arguments for gas.AllowGas"));
    }

    #[test]
    fn test_mistyped_arguments_fault() {
        let from = address_from_name("someone");
        let outcome = call(|b| {
            b.emit_call_contract(
                "governance",
                "UpgradeProtocol",
                &[VmObject::from(from), VmObject::from("4")],
            );
        });
        assert_eq!(outcome.state, ExecutionState::Fault);
        assert_eq!(
            outcome.fault.as_deref(),
            Some("invalid arguments for governance.UpgradeProtocol")
        );
    }

    #[test]
    fn test_marshal_accepts_encodings_of_the_same_value() {
        let address = address_from_name("someone");
        assert_eq!(
            marshal(VmObject::Bytes(address.as_bytes().to_vec()), VmType::Object),
            Some(VmObject::Address(address))
        );
        assert_eq!(marshal(VmObject::Number(2), VmType::Enum), Some(VmObject::Enum(2)));
        assert_eq!(marshal(VmObject::from("7"), VmType::Number), None);
        assert_eq!(marshal(VmObject::Number(7), VmType::String), None);
        assert_eq!(marshal(VmObject::Bool(true), VmType::None), Some(VmObject::Bool(true)));
    }
}
