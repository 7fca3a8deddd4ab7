//! Staking of the nexus staking token

use strata_primitives::{Address, Serializable};
use strata_storage::{StorageMap, StorageReader};
use strata_types::{EventKind, TokenEventData, ValidatorType, VmType};
use strata_vm::{VmError, VmObject, VmResult};

use super::{MethodTable, NativeArgs, NativeContractKind};
use crate::error::{RuntimeError, RuntimeResult};
use crate::registry;
use crate::runtime::{to_number, RuntimeVm};

fn stakes() -> StorageMap {
    StorageMap::field(NativeContractKind::Stake.name(), "stakes")
}

/// Amount staked by `address` on the chain behind `storage`
pub fn stake_of<S: StorageReader + ?Sized>(storage: &S, address: &Address) -> RuntimeResult<u128> {
    match stakes().get(storage, address.as_bytes())? {
        Some(bytes) => {
            let array: [u8; 16] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| RuntimeError::Invalid("stake entry".into()))?;
            Ok(u128::from_le_bytes(array))
        }
        None => Ok(0),
    }
}

fn set_stake(vm: &mut RuntimeVm<'_>, address: &Address, amount: u128) -> VmResult<()> {
    let map = stakes();
    if amount == 0 {
        map.remove(vm.storage_mut(), address.as_bytes())?;
    } else {
        map.set(vm.storage_mut(), address.as_bytes(), amount.to_le_bytes().to_vec())?;
    }
    Ok(())
}

pub(super) fn methods() -> MethodTable {
    MethodTable::new()
        .method(
            "Stake",
            &[("from", VmType::Object), ("amount", VmType::Number)],
            VmType::None,
            stake,
        )
        .method(
            "Unstake",
            &[("from", VmType::Object), ("amount", VmType::Number)],
            VmType::None,
            unstake,
        )
        .method("GetStake", &[("address", VmType::Object)], VmType::Number, get_stake)
}

fn stake(vm: &mut RuntimeVm<'_>, args: &NativeArgs) -> VmResult<VmObject> {
    let from = args.address(0)?;
    let amount = args.amount(1)?;
    vm.expect_witness(&from)?;
    if amount == 0 {
        return Err(RuntimeError::ZeroAmount.into());
    }

    let symbol = vm.config().staking_token.clone();
    let contract = NativeContractKind::Stake.address();
    vm.transfer_tokens(&symbol, &from, &contract, amount)?;

    let current = stake_of(vm.storage(), &from)?;
    set_stake(vm, &from, current + amount)?;
    let data = TokenEventData::new(symbol, to_number(amount)?, vm.chain_name());
    vm.notify(EventKind::TokenStake, from, NativeContractKind::Stake.name(), data.to_bytes());
    Ok(VmObject::None)
}

fn unstake(vm: &mut RuntimeVm<'_>, args: &NativeArgs) -> VmResult<VmObject> {
    let from = args.address(0)?;
    let amount = args.amount(1)?;
    vm.expect_witness(&from)?;

    let current = stake_of(vm.storage(), &from)?;
    if amount == 0 || amount > current {
        return Err(VmError::Runtime(format!("cannot unstake {amount} of {current}")));
    }
    let remaining = current - amount;
    let is_validator = registry::validator_type(vm.registry(), &from)? != ValidatorType::Invalid;
    if is_validator && remaining < u128::from(vm.config().min_validator_stake) {
        return Err(VmError::Runtime("validator stake below minimum".into()));
    }

    let symbol = vm.config().staking_token.clone();
    let contract = NativeContractKind::Stake.address();
    vm.transfer_tokens(&symbol, &contract, &from, amount)?;
    set_stake(vm, &from, remaining)?;
    let data = TokenEventData::new(symbol, to_number(amount)?, vm.chain_name());
    vm.notify(EventKind::TokenClaim, from, NativeContractKind::Stake.name(), data.to_bytes());
    Ok(VmObject::None)
}

fn get_stake(vm: &mut RuntimeVm<'_>, args: &NativeArgs) -> VmResult<VmObject> {
    let address = args.address(0)?;
    let amount = stake_of(vm.storage(), &address)?;
    Ok(VmObject::Number(to_number(amount)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_crypto::address_from_name;
    use strata_storage::{MemoryStore, StorageChangeSet};

    #[test]
    fn test_stake_of_defaults_to_zero() {
        let store = MemoryStore::new();
        let mut changes = StorageChangeSet::new(&store);
        let a = address_from_name("a");
        assert_eq!(stake_of(&changes, &a).unwrap(), 0);
        stakes()
            .set(&mut changes, a.as_bytes(), 42u128.to_le_bytes().to_vec())
            .unwrap();
        assert_eq!(stake_of(&changes, &a).unwrap(), 42);
    }
}
