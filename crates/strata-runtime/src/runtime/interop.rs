//! Interop call table.
//!
//! Arguments are popped in declaration order (the first argument is on top
//! of the stack) and at most one result is pushed back. Gas for the call has
//! already been charged by the interpreter, so an unknown method in a known
//! namespace still costs its band.

use std::collections::BTreeMap;

use strata_primitives::{Address, Serializable};
use strata_storage::{field_key, StorageContext, StorageList, StorageMap, StorageReader, StorageSet};
use strata_types::{
    ChainTask, ContractAbi, EventKind, ExecutionState, OrganizationInfo, TaskFrequencyMode,
    TokenContent, TokenFlags, TokenInfo, TokenSeries, TokenSeriesMode, VmType,
};
use strata_vm::{number_from_bytes, Machine, VmError, VmObject, VmResult};
use tracing::{debug, info, trace};

use super::{to_number, RuntimeVm, ENTRY_CONTEXT};
use crate::chain::next_uid;
use crate::contract::{self, ContractRecord};
use crate::error::RuntimeError;
use crate::native::account::{self, ANONYMOUS};
use crate::oracle::price_url;
use crate::{leaderboard, ledger, registry, task};

type InteropResult = VmResult<ExecutionState>;

pub(super) fn execute(vm: &mut RuntimeVm<'_>, name: &str) -> InteropResult {
    trace!(name, "interop");
    let Some((namespace, method)) = name.split_once('.') else {
        return constructor(vm, name);
    };
    match namespace {
        "Runtime" => runtime(vm, method),
        "Data" => data(vm, method),
        "Map" => map(vm, method),
        "List" => list(vm, method),
        "Set" => set(vm, method),
        "Account" => account(vm, method),
        "Leaderboard" => leaderboard(vm, method),
        "Organization" => organization(vm, method),
        "Oracle" => oracle(vm, method),
        "Nexus" => nexus(vm, method),
        _ => Err(VmError::InvalidInteropNamespace(namespace.to_string())),
    }
    .map_err(|err| match err {
        VmError::UnknownInterop(_) => VmError::UnknownInterop(name.to_string()),
        other => other,
    })
}

// Stack helpers

fn pop(vm: &mut RuntimeVm<'_>) -> VmResult<VmObject> {
    vm.state_mut().pop()
}

fn pop_address(vm: &mut RuntimeVm<'_>) -> VmResult<Address> {
    pop(vm)?.as_address()
}

fn pop_string(vm: &mut RuntimeVm<'_>) -> VmResult<String> {
    pop(vm)?.as_string()
}

fn pop_number(vm: &mut RuntimeVm<'_>) -> VmResult<i128> {
    pop(vm)?.as_number()
}

fn pop_bytes(vm: &mut RuntimeVm<'_>) -> VmResult<Vec<u8>> {
    pop(vm)?.as_bytes()
}

fn pop_bool(vm: &mut RuntimeVm<'_>) -> VmResult<bool> {
    pop(vm)?.as_bool()
}

fn pop_amount(vm: &mut RuntimeVm<'_>) -> VmResult<u128> {
    let value = pop_number(vm)?;
    u128::try_from(value).map_err(|_| VmError::Runtime(format!("negative amount {value}")))
}

fn pop_u32(vm: &mut RuntimeVm<'_>, what: &str) -> VmResult<u32> {
    let value = pop_number(vm)?;
    u32::try_from(value).map_err(|_| VmError::Runtime(format!("invalid {what} {value}")))
}

fn pop_u64(vm: &mut RuntimeVm<'_>, what: &str) -> VmResult<u64> {
    let value = pop_number(vm)?;
    u64::try_from(value).map_err(|_| VmError::Runtime(format!("invalid {what} {value}")))
}

fn pop_type(vm: &mut RuntimeVm<'_>) -> VmResult<VmType> {
    let tag = pop_u32(vm, "type")?;
    u8::try_from(tag)
        .ok()
        .and_then(VmType::from_u8)
        .ok_or_else(|| VmError::Runtime(format!("invalid type {tag}")))
}

fn push(vm: &mut RuntimeVm<'_>, value: impl Into<VmObject>) -> InteropResult {
    vm.state_mut().push(value.into())?;
    Ok(ExecutionState::Running)
}

fn done() -> InteropResult {
    Ok(ExecutionState::Running)
}

fn unknown(method: &str) -> InteropResult {
    Err(VmError::UnknownInterop(method.to_string()))
}

fn not_implemented(name: &str) -> InteropResult {
    Err(VmError::NotImplemented(name.to_string()))
}

fn number(value: u128) -> VmResult<VmObject> {
    Ok(VmObject::Number(to_number(value)?))
}

fn list_object(items: impl IntoIterator<Item = VmObject>) -> VmObject {
    VmObject::Struct(
        items
            .into_iter()
            .enumerate()
            .map(|(i, item)| (VmObject::Number(i as i128), item))
            .collect(),
    )
}

fn current_address(vm: &RuntimeVm<'_>) -> Address {
    vm.state()
        .current_context()
        .map(|ctx| ctx.address())
        .unwrap_or(Address::NULL)
}

fn context_event(vm: &mut RuntimeVm<'_>, kind: EventKind, address: Address, data: Vec<u8>) {
    let contract = vm.current_context_name();
    vm.notify(kind, address, &contract, data);
}

// Constructors

fn constructor(vm: &mut RuntimeVm<'_>, name: &str) -> InteropResult {
    let value = pop(vm)?;
    match name {
        "Address" => push(vm, VmObject::Address(value.as_address()?)),
        "Hash" => push(vm, VmObject::Hash(value.as_hash()?)),
        "Timestamp" => push(vm, VmObject::Timestamp(value.as_timestamp()?)),
        _ => unknown(name),
    }
}

// Runtime

fn runtime(vm: &mut RuntimeVm<'_>, method: &str) -> InteropResult {
    match method {
        "Time" => push(vm, VmObject::Timestamp(vm.time())),
        "Height" => push(vm, VmObject::Number(i128::from(vm.height()))),
        "TransactionHash" => {
            let hash = vm.transaction().map(|tx| tx.hash()).unwrap_or_default();
            push(vm, VmObject::Hash(hash))
        }
        "Context" => push(vm, VmObject::String(vm.current_context_name())),
        "PreviousContext" => {
            let name = vm
                .state()
                .previous_context()
                .map(|ctx| ctx.name().to_string())
                .unwrap_or_default();
            push(vm, VmObject::String(name))
        }
        "GasTarget" => push(vm, VmObject::Address(vm.gas_target())),
        "Version" => push(vm, VmObject::Number(i128::from(vm.protocol()))),
        "IsWitness" => {
            let address = pop_address(vm)?;
            let witness = vm.is_witness(&address)?;
            push(vm, witness)
        }
        "IsTrigger" => push(vm, vm.is_trigger()),
        "IsMinter" => {
            let address = pop_address(vm)?;
            let symbol = pop_string(vm)?;
            let token = vm.token_info(&symbol)?;
            let minter = vm.is_minter(&token, &address)?;
            push(vm, minter)
        }
        "Log" => {
            let message = pop_string(vm)?;
            debug!(context = %vm.current_context_name(), message = %message, "script log");
            let address = current_address(vm);
            context_event(vm, EventKind::Log, address, message.into_bytes());
            done()
        }
        "Notify" => {
            let tag = pop_u32(vm, "event kind")?;
            let address = pop_address(vm)?;
            let data = pop(vm)?;
            let kind = u8::try_from(tag)
                .ok()
                .and_then(EventKind::from_u8)
                .filter(|kind| matches!(kind, EventKind::Custom | EventKind::Log))
                .ok_or_else(|| VmError::Runtime(format!("scripts cannot emit event kind {tag}")))?;
            context_event(vm, kind, address, data.to_bytes());
            done()
        }
        "Break" => Ok(ExecutionState::Break),
        "Expect" => {
            let condition = pop_bool(vm)?;
            let message = pop_string(vm)?;
            vm.expect(condition, &message)?;
            done()
        }
        "GenerateUID" => {
            let uid = next_uid(vm.storage_mut())?;
            push(vm, VmObject::Number(i128::from(uid)))
        }
        "DeployContract" => deploy_contract(vm),
        "UpgradeContract" => upgrade_contract(vm),
        "KillContract" => kill_contract(vm),
        "GetBalance" => {
            let address = pop_address(vm)?;
            let symbol = pop_string(vm)?;
            let token = vm.token_info(&symbol)?;
            let balance = if token.is_fungible() {
                ledger::balance(vm.storage(), &symbol, &address)?
            } else {
                u128::from(ledger::owned_count(vm.storage(), &symbol, &address)?)
            };
            push(vm, number(balance)?)
        }
        "TransferTokens" => {
            let from = pop_address(vm)?;
            let to = pop_address(vm)?;
            let symbol = pop_string(vm)?;
            let amount = pop_amount(vm)?;
            vm.transfer_tokens(&symbol, &from, &to, amount)?;
            done()
        }
        "MintTokens" => {
            let from = pop_address(vm)?;
            let to = pop_address(vm)?;
            let symbol = pop_string(vm)?;
            let amount = pop_amount(vm)?;
            vm.mint_tokens(&symbol, &from, &to, amount)?;
            done()
        }
        "BurnTokens" => {
            let from = pop_address(vm)?;
            let symbol = pop_string(vm)?;
            let amount = pop_amount(vm)?;
            vm.burn_tokens(&symbol, &from, amount)?;
            done()
        }
        "SwapTokens" => not_implemented("Runtime.SwapTokens"),
        "TransferToken" => {
            let from = pop_address(vm)?;
            let to = pop_address(vm)?;
            let symbol = pop_string(vm)?;
            let id = pop_amount(vm)?;
            vm.transfer_token(&symbol, &from, &to, id)?;
            done()
        }
        "MintToken" => {
            let from = pop_address(vm)?;
            let to = pop_address(vm)?;
            let symbol = pop_string(vm)?;
            let rom = pop_bytes(vm)?;
            let ram = pop_bytes(vm)?;
            let series = pop_u32(vm, "series")?;
            let id = vm.mint_token(&symbol, &from, &to, rom, ram, series)?;
            push(vm, number(id)?)
        }
        "BurnToken" => {
            let from = pop_address(vm)?;
            let symbol = pop_string(vm)?;
            let id = pop_amount(vm)?;
            vm.burn_token(&symbol, &from, id)?;
            done()
        }
        "InfuseToken" => {
            let from = pop_address(vm)?;
            let symbol = pop_string(vm)?;
            let id = pop_amount(vm)?;
            let infused = pop_string(vm)?;
            let value = pop_amount(vm)?;
            vm.infuse_token(&symbol, id, &from, &infused, value)?;
            done()
        }
        "ReadToken" => {
            let symbol = pop_string(vm)?;
            let id = pop_amount(vm)?;
            let content = vm.read_token(&symbol, id)?;
            push(vm, token_object(content)?)
        }
        "ReadTokenROM" => {
            let symbol = pop_string(vm)?;
            let id = pop_amount(vm)?;
            let content = vm.read_token(&symbol, id)?;
            push(vm, VmObject::Bytes(content.rom))
        }
        "ReadTokenRAM" => {
            let symbol = pop_string(vm)?;
            let id = pop_amount(vm)?;
            let content = vm.read_token(&symbol, id)?;
            push(vm, VmObject::Bytes(content.ram))
        }
        "WriteToken" => {
            let from = pop_address(vm)?;
            let symbol = pop_string(vm)?;
            let id = pop_amount(vm)?;
            let ram = pop_bytes(vm)?;
            vm.write_token(&symbol, &from, id, ram)?;
            done()
        }
        "TokenExists" => {
            let symbol = pop_string(vm)?;
            let exists = registry::token_exists(vm.registry(), &symbol)?;
            push(vm, exists)
        }
        "GetTokenDecimals" => {
            let symbol = pop_string(vm)?;
            let token = vm.token_info(&symbol)?;
            push(vm, VmObject::Number(i128::from(token.decimals)))
        }
        "GetTokenFlags" => {
            let symbol = pop_string(vm)?;
            let token = vm.token_info(&symbol)?;
            push(vm, VmObject::Enum(token.flags.bits()))
        }
        "GetTokenSupply" => {
            let symbol = pop_string(vm)?;
            vm.token_info(&symbol)?;
            let supply = ledger::supply(vm.storage(), &symbol)?;
            push(vm, number(supply)?)
        }
        "StartTask" => start_task(vm),
        "StopTask" => {
            let from = pop_address(vm)?;
            let id = pop_u64(vm, "task id")?;
            vm.expect_witness(&from)?;
            task::stop_task(vm.storage_mut(), id, &from)?;
            info!(task = id, "task stopped");
            context_event(vm, EventKind::TaskStop, from, id.to_le_bytes().to_vec());
            done()
        }
        _ => unknown(method),
    }
}

fn token_object(content: TokenContent) -> VmResult<VmObject> {
    let fields: BTreeMap<VmObject, VmObject> = [
        ("id", number(content.token_id)?),
        ("series", VmObject::Number(i128::from(content.series_id))),
        ("mint", VmObject::Number(i128::from(content.mint_id))),
        ("owner", VmObject::Address(content.owner)),
        ("creator", VmObject::Address(content.creator)),
        ("chain", VmObject::String(content.current_chain)),
        ("ROM", VmObject::Bytes(content.rom)),
        ("RAM", VmObject::Bytes(content.ram)),
        ("created", VmObject::Timestamp(content.timestamp)),
    ]
    .into_iter()
    .map(|(key, value)| (VmObject::from(key), value))
    .collect();
    Ok(VmObject::Struct(fields))
}

fn deploy_contract(vm: &mut RuntimeVm<'_>) -> InteropResult {
    let from = pop_address(vm)?;
    let name = pop_string(vm)?;
    let script = pop_bytes(vm)?;
    let abi = ContractAbi::from_bytes(&pop_bytes(vm)?)?;
    vm.expect_witness(&from)?;

    let record = ContractRecord {
        name: name.clone(),
        owner: from,
        script,
        abi,
        killed: false,
    };
    contract::deploy_contract(vm.storage_mut(), &record)?;
    info!(contract = %name, owner = %from, chain = vm.chain_name(), "contract deployed");
    vm.notify(EventKind::ContractDeploy, record.address(), &name, name.as_bytes().to_vec());
    done()
}

fn upgrade_contract(vm: &mut RuntimeVm<'_>) -> InteropResult {
    let from = pop_address(vm)?;
    let name = pop_string(vm)?;
    let script = pop_bytes(vm)?;
    let abi = ContractAbi::from_bytes(&pop_bytes(vm)?)?;
    vm.expect_witness(&from)?;

    let record = contract::upgrade_contract(vm.storage_mut(), &name, &from, script, abi)?;
    info!(contract = %name, chain = vm.chain_name(), "contract upgraded");
    vm.notify(EventKind::ContractUpgrade, record.address(), &name, name.as_bytes().to_vec());
    done()
}

fn kill_contract(vm: &mut RuntimeVm<'_>) -> InteropResult {
    let from = pop_address(vm)?;
    let name = pop_string(vm)?;
    vm.expect_witness(&from)?;

    contract::kill_contract(vm.storage_mut(), &name, &from)?;
    info!(contract = %name, chain = vm.chain_name(), "contract killed");
    let address = crate::native::contract_address(&name);
    vm.notify(EventKind::ContractKill, address, &name, name.as_bytes().to_vec());
    done()
}

fn start_task(vm: &mut RuntimeVm<'_>) -> InteropResult {
    let from = pop_address(vm)?;
    let context_name = pop_string(vm)?;
    let method = pop_string(vm)?;
    let frequency = pop_u32(vm, "frequency")?;
    let delay = pop_u32(vm, "delay")?;
    let mode_tag = pop_u32(vm, "frequency mode")?;
    let gas_limit = pop_u64(vm, "gas limit")?;
    vm.expect_witness(&from)?;

    let mode = u8::try_from(mode_tag)
        .ok()
        .and_then(TaskFrequencyMode::from_u8)
        .ok_or_else(|| VmError::Runtime(format!("invalid frequency mode {mode_tag}")))?;
    // the target must resolve now, not on the first run
    vm.load_context(&context_name)?;

    let id = next_uid(vm.storage_mut())?;
    let new_task = ChainTask {
        id,
        owner: from,
        context_name,
        method,
        frequency,
        delay,
        mode,
        gas_limit,
        height: vm.height(),
        active: true,
    };
    let time = vm.time();
    task::create_task(vm.storage_mut(), &new_task, time)?;
    info!(task = id, contract = %new_task.context_name, method = %new_task.method, ?mode, "task started");
    context_event(vm, EventKind::TaskStart, from, id.to_le_bytes().to_vec());
    push(vm, VmObject::Number(i128::from(id)))
}

// Contract storage

fn writable_context(vm: &RuntimeVm<'_>) -> VmResult<String> {
    let name = vm.current_context_name();
    if name.is_empty() || name == ENTRY_CONTEXT {
        return Err(VmError::Runtime("storage writes need a contract context".into()));
    }
    Ok(name)
}

fn default_of(vm_type: VmType) -> VmObject {
    match vm_type {
        VmType::Number => VmObject::Number(0),
        VmType::String => VmObject::String(String::new()),
        VmType::Bytes => VmObject::Bytes(Vec::new()),
        VmType::Bool => VmObject::Bool(false),
        VmType::Timestamp => VmObject::Timestamp(0),
        VmType::Struct => VmObject::Struct(BTreeMap::new()),
        _ => VmObject::None,
    }
}

fn decode_stored(bytes: Option<Vec<u8>>, vm_type: VmType) -> VmResult<VmObject> {
    match bytes {
        Some(bytes) => VmObject::from_bytes(&bytes)?.cast(vm_type),
        None => Ok(default_of(vm_type)),
    }
}

fn data(vm: &mut RuntimeVm<'_>, method: &str) -> InteropResult {
    match method {
        "Get" => {
            let contract = pop_string(vm)?;
            let field = pop_string(vm)?;
            let vm_type = pop_type(vm)?;
            let stored = vm.storage().get(&field_key(&contract, &field))?;
            let value = decode_stored(stored, vm_type)?;
            push(vm, value)
        }
        "Set" => {
            let field = pop_string(vm)?;
            let value = pop(vm)?;
            let contract = writable_context(vm)?;
            vm.storage_mut().put(&field_key(&contract, &field), value.to_bytes())?;
            done()
        }
        "Delete" => {
            let field = pop_string(vm)?;
            let contract = writable_context(vm)?;
            vm.storage_mut().delete(&field_key(&contract, &field))?;
            done()
        }
        _ => unknown(method),
    }
}

fn map(vm: &mut RuntimeVm<'_>, method: &str) -> InteropResult {
    match method {
        "Get" => {
            let contract = pop_string(vm)?;
            let field = pop_string(vm)?;
            let key = pop(vm)?;
            let vm_type = pop_type(vm)?;
            let stored = StorageMap::field(&contract, &field).get(vm.storage(), &key.to_bytes())?;
            let value = decode_stored(stored, vm_type)?;
            push(vm, value)
        }
        "Set" => {
            let field = pop_string(vm)?;
            let key = pop(vm)?;
            let value = pop(vm)?;
            let contract = writable_context(vm)?;
            StorageMap::field(&contract, &field).set(vm.storage_mut(), &key.to_bytes(), value.to_bytes())?;
            done()
        }
        "Remove" => {
            let field = pop_string(vm)?;
            let key = pop(vm)?;
            let contract = writable_context(vm)?;
            StorageMap::field(&contract, &field).remove(vm.storage_mut(), &key.to_bytes())?;
            done()
        }
        "Has" => {
            let contract = pop_string(vm)?;
            let field = pop_string(vm)?;
            let key = pop(vm)?;
            let has = StorageMap::field(&contract, &field).contains(vm.storage(), &key.to_bytes())?;
            push(vm, has)
        }
        "Count" => {
            let contract = pop_string(vm)?;
            let field = pop_string(vm)?;
            let count = StorageMap::field(&contract, &field).count(vm.storage())?;
            push(vm, count)
        }
        "Clear" => {
            let field = pop_string(vm)?;
            let contract = writable_context(vm)?;
            StorageMap::field(&contract, &field).clear(vm.storage_mut())?;
            done()
        }
        "Keys" => {
            let contract = pop_string(vm)?;
            let field = pop_string(vm)?;
            let keys = StorageMap::field(&contract, &field)
                .keys(vm.storage())?
                .iter()
                .map(|key| VmObject::from_bytes(key))
                .collect::<Result<Vec<_>, _>>()?;
            push(vm, list_object(keys))
        }
        _ => unknown(method),
    }
}

fn list(vm: &mut RuntimeVm<'_>, method: &str) -> InteropResult {
    match method {
        "Get" => {
            let contract = pop_string(vm)?;
            let field = pop_string(vm)?;
            let index = pop_u64(vm, "index")?;
            let vm_type = pop_type(vm)?;
            let stored = StorageList::field(&contract, &field).get(vm.storage(), index)?;
            let value = decode_stored(Some(stored), vm_type)?;
            push(vm, value)
        }
        "Add" => {
            let field = pop_string(vm)?;
            let value = pop(vm)?;
            let contract = writable_context(vm)?;
            StorageList::field(&contract, &field).push(vm.storage_mut(), value.to_bytes())?;
            done()
        }
        "Replace" => {
            let field = pop_string(vm)?;
            let index = pop_u64(vm, "index")?;
            let value = pop(vm)?;
            let contract = writable_context(vm)?;
            StorageList::field(&contract, &field).replace(vm.storage_mut(), index, value.to_bytes())?;
            done()
        }
        "RemoveAt" => {
            let field = pop_string(vm)?;
            let index = pop_u64(vm, "index")?;
            let contract = writable_context(vm)?;
            StorageList::field(&contract, &field).remove_at(vm.storage_mut(), index)?;
            done()
        }
        "Count" => {
            let contract = pop_string(vm)?;
            let field = pop_string(vm)?;
            let count = StorageList::field(&contract, &field).len(vm.storage())?;
            push(vm, count)
        }
        "Clear" => {
            let field = pop_string(vm)?;
            let contract = writable_context(vm)?;
            StorageList::field(&contract, &field).clear(vm.storage_mut())?;
            done()
        }
        _ => unknown(method),
    }
}

fn set(vm: &mut RuntimeVm<'_>, method: &str) -> InteropResult {
    match method {
        "Add" => {
            let field = pop_string(vm)?;
            let value = pop(vm)?;
            let contract = writable_context(vm)?;
            StorageSet::field(&contract, &field).add(vm.storage_mut(), &value.to_bytes())?;
            done()
        }
        "Remove" => {
            let field = pop_string(vm)?;
            let value = pop(vm)?;
            let contract = writable_context(vm)?;
            StorageSet::field(&contract, &field).remove(vm.storage_mut(), &value.to_bytes())?;
            done()
        }
        "Has" => {
            let contract = pop_string(vm)?;
            let field = pop_string(vm)?;
            let value = pop(vm)?;
            let has = StorageSet::field(&contract, &field).contains(vm.storage(), &value.to_bytes())?;
            push(vm, has)
        }
        "Count" => {
            let contract = pop_string(vm)?;
            let field = pop_string(vm)?;
            let count = StorageSet::field(&contract, &field).count(vm.storage())?;
            push(vm, count)
        }
        _ => unknown(method),
    }
}

// Account

fn account(vm: &mut RuntimeVm<'_>, method: &str) -> InteropResult {
    match method {
        "Name" => {
            let address = pop_address(vm)?;
            let name = account::name_of(vm.storage(), &address)?.unwrap_or_else(|| ANONYMOUS.to_string());
            push(vm, name)
        }
        "LastActivity" => {
            let address = pop_address(vm)?;
            let time = vm.last_activity(&address)?;
            push(vm, VmObject::Timestamp(time))
        }
        "Transactions" => not_implemented("Account.Transactions"),
        _ => unknown(method),
    }
}

// Leaderboard

fn expect_board_owner(vm: &RuntimeVm<'_>, from: &Address, name: &str) -> VmResult<()> {
    vm.expect_witness(from)?;
    let board = leaderboard::get(vm.storage(), name)?;
    if board.owner != *from {
        return Err(RuntimeError::NotAuthorized(format!("{from} does not own leaderboard {name}")).into());
    }
    Ok(())
}

fn leaderboard(vm: &mut RuntimeVm<'_>, method: &str) -> InteropResult {
    match method {
        "Create" => {
            let from = pop_address(vm)?;
            let name = pop_string(vm)?;
            let capacity = pop_u32(vm, "capacity")?;
            vm.expect_witness(&from)?;
            leaderboard::create(vm.storage_mut(), &name, from, capacity)?;
            context_event(vm, EventKind::LeaderboardCreate, from, name.into_bytes());
            done()
        }
        "Insert" => {
            let from = pop_address(vm)?;
            let target = pop_address(vm)?;
            let name = pop_string(vm)?;
            let score = pop_number(vm)?;
            expect_board_owner(vm, &from, &name)?;
            if leaderboard::insert(vm.storage_mut(), &name, target, score)? {
                context_event(vm, EventKind::LeaderboardInsert, target, name.into_bytes());
            }
            done()
        }
        "GetAddress" => {
            let name = pop_string(vm)?;
            let index = pop_u64(vm, "index")?;
            let address = leaderboard::address_at(vm.storage(), &name, index)?;
            push(vm, address)
        }
        "GetScore" => {
            let name = pop_string(vm)?;
            let target = pop_address(vm)?;
            let score = leaderboard::score_of(vm.storage(), &name, &target)?;
            push(vm, score)
        }
        "GetSize" => {
            let name = pop_string(vm)?;
            let size = leaderboard::size(vm.storage(), &name)?;
            push(vm, size)
        }
        "Reset" => {
            let from = pop_address(vm)?;
            let name = pop_string(vm)?;
            expect_board_owner(vm, &from, &name)?;
            leaderboard::reset(vm.storage_mut(), &name)?;
            context_event(vm, EventKind::LeaderboardReset, from, name.into_bytes());
            done()
        }
        _ => unknown(method),
    }
}

// Organization

/// Membership changes of an empty organization are made by its creator;
/// afterwards the members themselves must agree by majority
fn expect_organization_authority(vm: &RuntimeVm<'_>, from: &Address, org: &OrganizationInfo) -> VmResult<()> {
    vm.expect_witness(from)?;
    let registry = vm.registry();
    if registry::organization_members(registry, &org.id)?.is_empty() {
        if registry::organization_creator(registry, &org.id)? != *from {
            return Err(RuntimeError::NotAuthorized(format!("{from} did not create {}", org.id)).into());
        }
        return Ok(());
    }
    vm.expect_witness(&org.address)
}

fn organization(vm: &mut RuntimeVm<'_>, method: &str) -> InteropResult {
    match method {
        "AddMember" => {
            let from = pop_address(vm)?;
            let id = pop_string(vm)?;
            let target = pop_address(vm)?;
            let org = registry::organization(vm.registry(), &id)?;
            expect_organization_authority(vm, &from, &org)?;
            if !registry::add_member(vm.registry_mut()?, &id, &target)? {
                return Err(VmError::Runtime(format!("{target} is already a member of {id}")));
            }
            info!(organization = %id, member = %target, "member added");
            context_event(vm, EventKind::OrganizationAdd, target, id.into_bytes());
            done()
        }
        "RemoveMember" => {
            let from = pop_address(vm)?;
            let id = pop_string(vm)?;
            let target = pop_address(vm)?;
            let org = registry::organization(vm.registry(), &id)?;
            expect_organization_authority(vm, &from, &org)?;
            if !registry::remove_member(vm.registry_mut()?, &id, &target)? {
                return Err(VmError::Runtime(format!("{target} is not a member of {id}")));
            }
            info!(organization = %id, member = %target, "member removed");
            context_event(vm, EventKind::OrganizationRemove, target, id.into_bytes());
            done()
        }
        "IsMember" => {
            let id = pop_string(vm)?;
            let address = pop_address(vm)?;
            let member = registry::is_member(vm.registry(), &id, &address)?;
            push(vm, member)
        }
        "GetMembers" => {
            let id = pop_string(vm)?;
            let members = registry::organization_members(vm.registry(), &id)?;
            push(vm, list_object(members.into_iter().map(VmObject::Address)))
        }
        "IsWitness" => {
            let id = pop_string(vm)?;
            registry::organization(vm.registry(), &id)?;
            let witness = registry::is_organization_witness(vm.registry(), &id, &vm.signers)?;
            push(vm, witness)
        }
        _ => unknown(method),
    }
}

// Oracle

fn oracle(vm: &mut RuntimeVm<'_>, method: &str) -> InteropResult {
    match method {
        "Read" => {
            let url = pop_string(vm)?;
            let content = vm.oracle().read(vm.time(), &url)?;
            push(vm, VmObject::Bytes(content))
        }
        "ReadTransaction" => {
            let platform = pop_string(vm)?;
            let chain = pop_string(vm)?;
            let hash = pop(vm)?.as_hash()?;
            let content = vm.oracle().read_transaction(&platform, &chain, &hash)?;
            push(vm, VmObject::Bytes(content))
        }
        "Price" => {
            let symbol = pop_string(vm)?;
            let content = vm.oracle().read(vm.time(), &price_url(&symbol))?;
            push(vm, VmObject::Number(number_from_bytes(&content)?))
        }
        "Quote" => not_implemented("Oracle.Quote"),
        _ => unknown(method),
    }
}

// Nexus

fn expect_nexus_owner(vm: &RuntimeVm<'_>, from: &Address) -> VmResult<()> {
    vm.expect_witness(from)?;
    if registry::owner(vm.registry())? != Some(*from) {
        return Err(RuntimeError::NotAuthorized(format!("{from} is not the nexus owner")).into());
    }
    Ok(())
}

fn nexus(vm: &mut RuntimeVm<'_>, method: &str) -> InteropResult {
    match method {
        "CreateToken" => {
            let from = pop_address(vm)?;
            let symbol = pop_string(vm)?;
            let name = pop_string(vm)?;
            let max_supply = pop_amount(vm)?;
            let decimals = pop_u32(vm, "decimals")?;
            let bits = pop_u32(vm, "token flags")?;
            let script = pop_bytes(vm)?;
            let abi_bytes = pop_bytes(vm)?;
            vm.expect_witness(&from)?;

            let flags = TokenFlags::from_bits(bits)
                .ok_or_else(|| VmError::Runtime(format!("invalid token flags {bits:#x}")))?;
            let abi = if abi_bytes.is_empty() {
                ContractAbi::default()
            } else {
                ContractAbi::from_bytes(&abi_bytes)?
            };
            let token = TokenInfo {
                symbol: symbol.clone(),
                name,
                owner: from,
                max_supply,
                decimals,
                flags,
                script,
                abi,
            };
            registry::create_token(vm.registry_mut()?, &token)?;
            info!(symbol = %symbol, owner = %from, "token created");
            context_event(vm, EventKind::TokenCreate, from, symbol.into_bytes());
            done()
        }
        "CreateTokenSeries" => {
            let from = pop_address(vm)?;
            let symbol = pop_string(vm)?;
            let series_id = pop_u32(vm, "series")?;
            let max_supply = pop_u32(vm, "series supply")?;
            let mode_tag = pop_u32(vm, "series mode")?;
            let script = pop_bytes(vm)?;
            let abi_bytes = pop_bytes(vm)?;
            vm.expect_witness(&from)?;

            let token = vm.token_info(&symbol)?;
            if token.owner != from {
                return Err(RuntimeError::NotAuthorized(format!("{from} does not own {symbol}")).into());
            }
            let mode = match mode_tag {
                0 => TokenSeriesMode::Unique,
                1 => TokenSeriesMode::Duplicated,
                other => return Err(VmError::Runtime(format!("invalid series mode {other}"))),
            };
            let mut series = TokenSeries::new(series_id, max_supply, mode);
            series.script = script;
            if !abi_bytes.is_empty() {
                series.abi = ContractAbi::from_bytes(&abi_bytes)?;
            }
            registry::create_series(vm.registry_mut()?, &symbol, &series)?;
            info!(symbol = %symbol, series = series_id, "token series created");
            context_event(vm, EventKind::TokenSeriesCreate, from, series_id.to_le_bytes().to_vec());
            done()
        }
        "CreateChain" => {
            let from = pop_address(vm)?;
            let name = pop_string(vm)?;
            let parent = pop_string(vm)?;
            expect_nexus_owner(vm, &from)?;
            registry::create_chain(vm.registry_mut()?, &name, Some(&parent))?;
            info!(chain = %name, parent = %parent, "chain created");
            context_event(vm, EventKind::ChainCreate, from, name.into_bytes());
            done()
        }
        "CreatePlatform" => {
            let from = pop_address(vm)?;
            let name = pop_string(vm)?;
            let symbol = pop_string(vm)?;
            expect_nexus_owner(vm, &from)?;
            registry::create_platform(vm.registry_mut()?, &name, &symbol)?;
            info!(platform = %name, "platform created");
            context_event(vm, EventKind::PlatformCreate, from, name.into_bytes());
            done()
        }
        "RegisterPlatformAddress" => {
            let from = pop_address(vm)?;
            let platform = pop_string(vm)?;
            let external = pop_string(vm)?;
            let local = pop_address(vm)?;
            expect_nexus_owner(vm, &from)?;
            registry::register_platform_address(vm.registry_mut()?, &platform, &external, local)?;
            debug!(platform = %platform, external = %external, "platform address registered");
            done()
        }
        "CreateOrganization" => {
            let from = pop_address(vm)?;
            let id = pop_string(vm)?;
            let name = pop_string(vm)?;
            let script = pop_bytes(vm)?;
            vm.expect_witness(&from)?;
            let org = OrganizationInfo::new(id.clone(), name, script);
            registry::create_organization(vm.registry_mut()?, &org, &from)?;
            info!(organization = %id, creator = %from, "organization created");
            context_event(vm, EventKind::OrganizationCreate, org.address, id.into_bytes());
            done()
        }
        _ => unknown(method),
    }
}

#[cfg(test)]
mod tests {
    use strata_crypto::address_from_name;
    use strata_storage::MemoryStore;
    use strata_vm::ScriptBuilder;

    use super::super::testing::{FakeChain, FakeNexus};
    use super::*;
    use crate::oracle::{BlockOracle, OracleReader, StaticOracle};
    use std::sync::Arc;

    fn run(code: Vec<u8>) -> super::super::ExecutionOutcome {
        let (chain, nexus, store, oracle) =
            (FakeChain::root(), FakeNexus::default(), MemoryStore::new(), BlockOracle::empty());
        RuntimeVm::new(&chain, &nexus, &store, &oracle)
            .at_block(5, 1_000, 3)
            .run(&code)
    }

    #[test]
    fn test_runtime_queries() {
        let mut sb = ScriptBuilder::new();
        sb.emit_call_interop("Runtime.Height", &[]);
        let outcome = run(sb.end_script().unwrap());
        assert_eq!(outcome.result, Some(VmObject::Number(5)));

        let mut sb = ScriptBuilder::new();
        sb.emit_call_interop("Runtime.Context", &[]);
        let outcome = run(sb.end_script().unwrap());
        assert_eq!(outcome.result, Some(VmObject::from(ENTRY_CONTEXT)));
    }

    #[test]
    fn test_unfinished_surfaces_fault() {
        for name in ["Runtime.SwapTokens", "Account.Transactions", "Oracle.Quote"] {
            let mut sb = ScriptBuilder::new();
            sb.emit_call_interop(name, &[]);
            let outcome = run(sb.end_script().unwrap());
            assert_eq!(outcome.state, ExecutionState::Fault);
            assert_eq!(outcome.fault, Some(format!("not implemented: {name}")));
        }
    }

    #[test]
    fn test_unknown_method_in_known_namespace() {
        let mut sb = ScriptBuilder::new();
        sb.emit_call_interop("Runtime.Teleport", &[]);
        let outcome = run(sb.end_script().unwrap());
        assert_eq!(outcome.state, ExecutionState::Fault);
        assert!(outcome.fault.unwrap().contains("Runtime.Teleport"));
    }

    #[test]
    fn test_expect_message_is_verbatim() {
        let mut sb = ScriptBuilder::new();
        sb.emit_call_interop(
            "Runtime.Expect",
            &[VmObject::Bool(false), VmObject::from("caller must be owner")],
        );
        let outcome = run(sb.end_script().unwrap());
        assert_eq!(outcome.fault.as_deref(), Some("caller must be owner"));
    }

    #[test]
    fn test_entry_context_cannot_write_storage() {
        let mut sb = ScriptBuilder::new();
        sb.emit_call_interop("Data.Set", &[VmObject::from("counter"), VmObject::Number(1)]);
        let outcome = run(sb.end_script().unwrap());
        assert_eq!(outcome.state, ExecutionState::Fault);
    }

    #[test]
    fn test_missing_data_reads_typed_default() {
        let mut sb = ScriptBuilder::new();
        sb.emit_call_interop(
            "Data.Get",
            &[
                VmObject::from("dex"),
                VmObject::from("counter"),
                VmObject::Number(VmType::Number as i128),
            ],
        );
        let outcome = run(sb.end_script().unwrap());
        assert_eq!(outcome.result, Some(VmObject::Number(0)));
    }

    #[test]
    fn test_generate_uid_increases() {
        let mut sb = ScriptBuilder::new();
        sb.emit_call_interop("Runtime.GenerateUID", &[])
            .emit_pop(1)
            .emit_call_interop("Runtime.GenerateUID", &[]);
        let outcome = run(sb.end_script().unwrap());
        assert_eq!(outcome.result, Some(VmObject::Number(2)));
    }

    #[test]
    fn test_oracle_price() {
        let backend = Arc::new(StaticOracle::new().with(price_url("FUEL"), strata_vm::number_to_bytes(42)));
        let oracle = BlockOracle::new(backend, 4);
        let (chain, nexus, store) = (FakeChain::root(), FakeNexus::default(), MemoryStore::new());
        let mut sb = ScriptBuilder::new();
        sb.emit_call_interop("Oracle.Price", &[VmObject::from("FUEL")]);
        let outcome = RuntimeVm::new(&chain, &nexus, &store, &oracle).run(&sb.end_script().unwrap());
        assert_eq!(outcome.result, Some(VmObject::Number(42)));
        assert_eq!(oracle.entries().len(), 1);
    }

    #[test]
    fn test_log_event() {
        let mut sb = ScriptBuilder::new();
        sb.emit_call_interop("Runtime.Log", &[VmObject::from("hello")]);
        let outcome = run(sb.end_script().unwrap());
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].kind, EventKind::Log);
        assert_eq!(outcome.events[0].data, b"hello".to_vec());
    }

    #[test]
    fn test_create_token_needs_witness() {
        let owner = address_from_name("owner");
        let mut sb = ScriptBuilder::new();
        sb.emit_call_interop(
            "Nexus.CreateToken",
            &[
                VmObject::Address(owner),
                VmObject::from("GOLD"),
                VmObject::from("Gold"),
                VmObject::Number(0),
                VmObject::Number(0),
                VmObject::Number(i128::from(TokenFlags::FUNGIBLE.bits())),
                VmObject::Bytes(Vec::new()),
                VmObject::Bytes(Vec::new()),
            ],
        );
        let outcome = run(sb.end_script().unwrap());
        assert_eq!(outcome.state, ExecutionState::Fault);
        assert!(outcome.fault.unwrap().starts_with("witness failed"));
    }
}
