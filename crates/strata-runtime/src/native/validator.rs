//! Validator set membership

use std::collections::BTreeMap;

use strata_types::{EventKind, ValidatorEntry, ValidatorType, VmType};
use strata_vm::{VmError, VmObject, VmResult};
use tracing::info;

use super::{stake_of, MethodTable, NativeArgs, NativeContractKind};
use crate::registry;
use crate::runtime::RuntimeVm;

pub(super) fn methods() -> MethodTable {
    MethodTable::new()
        .method("SetValidator", &[("target", VmType::Object)], VmType::None, set_validator)
        .method(
            "RemoveValidator",
            &[("target", VmType::Object)],
            VmType::None,
            remove_validator,
        )
        .method("GetValidators", &[], VmType::Struct, get_validators)
        .method(
            "GetValidatorType",
            &[("address", VmType::Object)],
            VmType::Enum,
            get_validator_type,
        )
}

fn set_validator(vm: &mut RuntimeVm<'_>, args: &NativeArgs) -> VmResult<VmObject> {
    let target = args.address(0)?;
    vm.expect_witness(&target)?;

    let min_stake = u128::from(vm.config().min_validator_stake);
    let stake = stake_of(vm.storage(), &target)?;
    if stake < min_stake {
        return Err(VmError::Runtime(format!(
            "validator stake {stake} below minimum {min_stake}"
        )));
    }

    let mut entries = registry::validator_entries(vm.registry())?;
    if entries.iter().any(|e| e.address == target) {
        return Err(VmError::Runtime(format!("{target} is already a validator")));
    }
    let max = vm.config().max_validators;
    if entries.len() >= max {
        return Err(VmError::Runtime(format!("validator set is full ({max})")));
    }
    entries.push(ValidatorEntry {
        address: target,
        election: vm.time(),
        kind: ValidatorType::Invalid,
    });

    let primary = vm.config().primary_validators;
    registry::set_validators(vm.registry_mut()?, &entries, primary)?;
    info!(validator = %target, slot = entries.len() - 1, "validator elected");
    vm.notify(
        EventKind::ValidatorElect,
        target,
        NativeContractKind::Validator.name(),
        Vec::new(),
    );
    Ok(VmObject::None)
}

fn remove_validator(vm: &mut RuntimeVm<'_>, args: &NativeArgs) -> VmResult<VmObject> {
    let target = args.address(0)?;
    vm.expect_witness(&target)?;

    let mut entries = registry::validator_entries(vm.registry())?;
    let before = entries.len();
    entries.retain(|e| e.address != target);
    if entries.len() == before {
        return Err(VmError::Runtime(format!("{target} is not a validator")));
    }

    let primary = vm.config().primary_validators;
    registry::set_validators(vm.registry_mut()?, &entries, primary)?;
    info!(validator = %target, "validator removed");
    vm.notify(
        EventKind::ValidatorRemove,
        target,
        NativeContractKind::Validator.name(),
        Vec::new(),
    );
    Ok(VmObject::None)
}

fn get_validators(vm: &mut RuntimeVm<'_>, _args: &NativeArgs) -> VmResult<VmObject> {
    let fields: BTreeMap<VmObject, VmObject> = registry::validator_entries(vm.registry())?
        .into_iter()
        .enumerate()
        .map(|(slot, entry)| (VmObject::Number(slot as i128), VmObject::Address(entry.address)))
        .collect();
    Ok(VmObject::Struct(fields))
}

fn get_validator_type(vm: &mut RuntimeVm<'_>, args: &NativeArgs) -> VmResult<VmObject> {
    let address = args.address(0)?;
    let kind = registry::validator_type(vm.registry(), &address)?;
    Ok(VmObject::Enum(kind as u32))
}
