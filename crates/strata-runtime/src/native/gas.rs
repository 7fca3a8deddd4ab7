//! Gas allowance

use strata_primitives::Serializable;
use strata_types::{EventKind, GasEventData, VmType};
use strata_vm::{VmError, VmObject, VmResult};

use super::{MethodTable, NativeArgs, NativeContractKind};
use crate::error::RuntimeError;
use crate::ledger;
use crate::runtime::{to_number, RuntimeVm};

pub(super) fn methods() -> MethodTable {
    MethodTable::new()
        .method(
            "AllowGas",
            &[
                ("from", VmType::Object),
                ("target", VmType::Object),
                ("price", VmType::Number),
                ("limit", VmType::Number),
            ],
            VmType::None,
            allow_gas,
        )
        .method("SpendGas", &[("from", VmType::Object)], VmType::None, spend_gas)
        .method("GetMinimumGasPrice", &[], VmType::Number, minimum_gas_price)
}

/// Reserve `limit` gas at `price` from `from`. The VM limit is replaced,
/// so a script that already burned more than `limit` faults here.
fn allow_gas(vm: &mut RuntimeVm<'_>, args: &NativeArgs) -> VmResult<VmObject> {
    let from = args.address(0)?;
    let target = args.address(1)?;
    let price = args.amount(2)?;
    let limit = args.amount(3)?;

    vm.expect_witness(&from)?;
    if vm.gas_payer_set() {
        return Err(VmError::Runtime("gas already allowed".into()));
    }
    let min_price = u128::from(vm.config().min_gas_price);
    if price < min_price {
        return Err(VmError::Runtime(format!("gas price {price} below minimum {min_price}")));
    }
    let limit = u64::try_from(limit)
        .ok()
        .filter(|l| *l > 0)
        .ok_or_else(|| VmError::Runtime(format!("invalid gas limit {limit}")))?;
    let used = vm.gas_used();
    if limit < used {
        return Err(VmError::GasLimitExceeded { limit, used });
    }

    let fuel = vm.config().fuel_token.clone();
    let required = price
        .checked_mul(u128::from(limit))
        .ok_or_else(|| VmError::Arithmetic("gas allowance overflow".into()))?;
    let available = ledger::balance(vm.storage(), &fuel, &from).map_err(VmError::from)?;
    if available < required {
        return Err(RuntimeError::InsufficientBalance {
            symbol: fuel,
            address: from.to_string(),
            required,
            available,
        }
        .into());
    }

    vm.allow_gas(from, target, price, limit);
    let data = GasEventData {
        address: target,
        price: to_number(price)?,
        amount: i128::from(limit),
    };
    vm.notify(EventKind::GasEscrow, from, NativeContractKind::Gas.name(), data.to_bytes());
    Ok(VmObject::None)
}

fn spend_gas(vm: &mut RuntimeVm<'_>, args: &NativeArgs) -> VmResult<VmObject> {
    let from = args.address(0)?;
    match vm.gas_payer() {
        Some(payer) if payer == from => Ok(VmObject::None),
        _ => Err(VmError::Runtime(format!("{from} is not the gas payer"))),
    }
}

fn minimum_gas_price(vm: &mut RuntimeVm<'_>, _args: &NativeArgs) -> VmResult<VmObject> {
    Ok(VmObject::Number(i128::from(vm.config().min_gas_price)))
}
