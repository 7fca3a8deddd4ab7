//! Protocol version governance

use strata_types::{EventKind, ValidatorType, VmType};
use strata_vm::{VmError, VmObject, VmResult};
use tracing::info;

use super::{MethodTable, NativeArgs, NativeContractKind};
use crate::config::LATEST_PROTOCOL_VERSION;
use crate::registry;
use crate::runtime::RuntimeVm;

pub(super) fn methods() -> MethodTable {
    MethodTable::new()
        .method(
            "UpgradeProtocol",
            &[("from", VmType::Object), ("version", VmType::Number)],
            VmType::None,
            upgrade_protocol,
        )
        .method("GetProtocolVersion", &[], VmType::Number, protocol_version)
}

/// Only a primary validator can move the protocol forward, one way only
fn upgrade_protocol(vm: &mut RuntimeVm<'_>, args: &NativeArgs) -> VmResult<VmObject> {
    let from = args.address(0)?;
    let version = u32::try_from(args.number(1)?)
        .map_err(|_| VmError::Runtime("invalid protocol version".into()))?;

    vm.expect_witness(&from)?;
    if registry::validator_type(vm.registry(), &from)? != ValidatorType::Primary {
        return Err(VmError::Runtime(format!("{from} is not a primary validator")));
    }
    let current = registry::protocol_version(vm.registry())?;
    if version <= current || version > LATEST_PROTOCOL_VERSION {
        return Err(VmError::Runtime(format!(
            "cannot upgrade protocol from {current} to {version}"
        )));
    }

    registry::set_protocol_version(vm.registry_mut()?, version)?;
    info!(from = current, to = version, "protocol upgraded");
    vm.notify(
        EventKind::ProtocolUpgrade,
        from,
        NativeContractKind::Governance.name(),
        version.to_le_bytes().to_vec(),
    );
    Ok(VmObject::None)
}

fn protocol_version(vm: &mut RuntimeVm<'_>, _args: &NativeArgs) -> VmResult<VmObject> {
    let version = registry::protocol_version(vm.registry())?;
    Ok(VmObject::Number(i128::from(version)))
}
