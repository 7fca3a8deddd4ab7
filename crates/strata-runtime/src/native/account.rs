//! Account names.
//!
//! A name binds to one address for good: neither side can be registered a
//! second time.

use strata_primitives::Address;
use strata_storage::{StorageMap, StorageReader};
use strata_types::{EventKind, VmType};
use strata_vm::{VmError, VmObject, VmResult};

use super::{MethodTable, NativeArgs, NativeContractKind};
use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::RuntimeVm;

/// Name reported for addresses without one
pub const ANONYMOUS: &str = "anonymous";

fn names() -> StorageMap {
    StorageMap::field(NativeContractKind::Account.name(), "names")
}

fn addresses() -> StorageMap {
    StorageMap::field(NativeContractKind::Account.name(), "addresses")
}

/// Registered name of `address`, if any
pub fn name_of<S: StorageReader + ?Sized>(storage: &S, address: &Address) -> RuntimeResult<Option<String>> {
    Ok(names()
        .get(storage, address.as_bytes())?
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
}

/// Address registered under `name`, if any
pub fn address_of<S: StorageReader + ?Sized>(storage: &S, name: &str) -> RuntimeResult<Option<Address>> {
    addresses()
        .get(storage, name.as_bytes())?
        .map(|bytes| Address::from_slice(&bytes).map_err(|e| RuntimeError::Invalid(e.to_string())))
        .transpose()
}

fn validate_account_name(name: &str) -> bool {
    (3..=15).contains(&name.len())
        && name.starts_with(|c: char| c.is_ascii_lowercase())
        && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        && name != ANONYMOUS
}

pub(super) fn methods() -> MethodTable {
    MethodTable::new()
        .method(
            "RegisterName",
            &[("target", VmType::Object), ("name", VmType::String)],
            VmType::None,
            register_name,
        )
        .method("LookUpName", &[("name", VmType::String)], VmType::Object, look_up_name)
        .method(
            "LookUpAddress",
            &[("address", VmType::Object)],
            VmType::String,
            look_up_address,
        )
}

fn register_name(vm: &mut RuntimeVm<'_>, args: &NativeArgs) -> VmResult<VmObject> {
    let target = args.address(0)?;
    let name = args.string(1)?;
    vm.expect_witness(&target)?;

    if !validate_account_name(&name) {
        return Err(VmError::Runtime(format!("invalid account name {name}")));
    }
    if name_of(vm.storage(), &target)?.is_some() {
        return Err(VmError::Runtime(format!("{target} already has a name")));
    }
    if address_of(vm.storage(), &name)?.is_some() {
        return Err(RuntimeError::Duplicate { kind: "account name", name }.into());
    }

    names().set(vm.storage_mut(), target.as_bytes(), name.as_bytes().to_vec())?;
    addresses().set(vm.storage_mut(), name.as_bytes(), target.as_bytes().to_vec())?;
    vm.notify(
        EventKind::AddressRegister,
        target,
        NativeContractKind::Account.name(),
        name.into_bytes(),
    );
    Ok(VmObject::None)
}

fn look_up_name(vm: &mut RuntimeVm<'_>, args: &NativeArgs) -> VmResult<VmObject> {
    let name = args.string(0)?;
    let address = address_of(vm.storage(), &name)?.unwrap_or(Address::NULL);
    Ok(VmObject::Address(address))
}

fn look_up_address(vm: &mut RuntimeVm<'_>, args: &NativeArgs) -> VmResult<VmObject> {
    let address = args.address(0)?;
    let name = name_of(vm.storage(), &address)?.unwrap_or_else(|| ANONYMOUS.to_string());
    Ok(VmObject::String(name))
}
