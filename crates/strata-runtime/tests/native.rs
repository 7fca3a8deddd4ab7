//! Native contracts reached through contract calls

mod common;

use common::{script, TestAccount, TestNet};
use strata_runtime::NexusView;
use strata_types::{Block, EventKind, ExecutionState, GasEventData, Transaction, ValidatorType};
use strata_vm::VmObject;

fn reason(block: &Block, tx: &Transaction) -> String {
    block
        .events_for(&tx.hash())
        .iter()
        .find(|e| e.kind == EventKind::ExecutionFailure)
        .map(|e| String::from_utf8_lossy(&e.data).into_owned())
        .unwrap_or_default()
}

#[test]
fn test_allow_gas_sets_price() {
    let net = TestNet::new();
    let owner = net.owner.address();
    let tx = net.tx(
        script(|b| {
            b.emit_call_contract(
                "gas",
                "AllowGas",
                &[
                    VmObject::from(owner),
                    VmObject::from(owner),
                    VmObject::from(2u64),
                    VmObject::from(20_000u64),
                ],
            )
            .emit_call_interop("Runtime.Time", &[]);
        }),
        &[&net.owner],
    );
    let block = net.produce(&[tx.clone()]);
    assert_eq!(block.state_for(&tx.hash()), Some(ExecutionState::Halt));

    let events = block.events_for(&tx.hash());
    assert!(events.iter().any(|e| e.kind == EventKind::GasEscrow));
    let payment: GasEventData = events
        .iter()
        .find(|e| e.kind == EventKind::GasPayment)
        .unwrap()
        .decode_data()
        .unwrap();
    assert_eq!(payment.price, 2);
    assert!(payment.amount > 0);
}

#[test]
fn test_allow_gas_needs_funds() {
    let net = TestNet::new();
    let broke = TestAccount::random();
    let tx = net.tx(
        script(|b| {
            b.emit_call_contract(
                "gas",
                "AllowGas",
                &[
                    VmObject::from(broke.address()),
                    VmObject::from(broke.address()),
                    VmObject::from(1u64),
                    VmObject::from(1_000u64),
                ],
            );
        }),
        &[&broke],
    );
    let block = net.produce(&[tx.clone()]);
    assert_eq!(block.state_for(&tx.hash()), Some(ExecutionState::Fault));
    assert!(reason(&block, &tx).contains("insufficient balance"));
}

#[test]
fn test_governance_protocol_version() {
    let net = TestNet::new();
    let chain = net.nexus.root_chain();
    let time = chain.last_block().unwrap().unwrap().timestamp();
    let version = chain
        .invoke_contract_at(&net.nexus, "governance", "GetProtocolVersion", &[], time)
        .unwrap();
    assert_eq!(version, Some(VmObject::Number(3)));

    let owner = net.owner.address();
    let same = net.tx(
        script(|b| {
            b.emit_call_contract(
                "governance",
                "UpgradeProtocol",
                &[VmObject::from(owner), VmObject::from(3u64)],
            );
        }),
        &[&net.owner],
    );
    let stranger = TestAccount::random();
    let outsider = net.tx(
        script(|b| {
            b.emit_call_contract(
                "governance",
                "UpgradeProtocol",
                &[VmObject::from(stranger.address()), VmObject::from(4u64)],
            );
        }),
        &[&stranger],
    );
    let block = net.produce(&[same.clone(), outsider.clone()]);
    assert!(reason(&block, &same).contains("cannot upgrade protocol from 3 to 3"));
    assert!(reason(&block, &outsider).contains("is not a primary validator"));
    assert_eq!(net.nexus.protocol_version().unwrap(), 3);
}

#[test]
fn test_stake_then_join_validators() {
    let net = TestNet::new();
    let owner = net.owner.address();
    let candidate = TestAccount::random();
    let staking = net.nexus.config().staking_token.clone();

    let fund = net.tx(
        script(|b| {
            b.emit_call_interop(
                "Runtime.TransferTokens",
                &[
                    VmObject::from(owner),
                    VmObject::from(candidate.address()),
                    VmObject::from(staking.as_str()),
                    VmObject::from(60_000u64),
                ],
            );
        }),
        &[&net.owner],
    );
    let join = net.tx(
        script(|b| {
            b.emit_call_contract(
                "stake",
                "Stake",
                &[VmObject::from(candidate.address()), VmObject::from(50_000u64)],
            )
            .emit_call_contract("validator", "SetValidator", &[VmObject::from(candidate.address())]);
        }),
        &[&candidate],
    );
    let block = net.produce(&[fund.clone(), join.clone()]);
    assert_eq!(block.state_for(&fund.hash()), Some(ExecutionState::Halt));
    assert_eq!(block.state_for(&join.hash()), Some(ExecutionState::Halt), "{}", reason(&block, &join));

    let chain = net.nexus.root_chain();
    assert_eq!(chain.get_token_balance(&staking, &candidate.address()).unwrap(), 10_000);
    let stake = chain
        .invoke_contract_at(
            &net.nexus,
            "stake",
            "GetStake",
            &[VmObject::from(candidate.address())],
            block.timestamp(),
        )
        .unwrap();
    assert_eq!(stake, Some(VmObject::Number(50_000)));

    assert_eq!(net.nexus.validators().unwrap().len(), 2);
    assert_eq!(
        net.nexus.validator_type(&candidate.address()).unwrap(),
        ValidatorType::Primary
    );
    assert!(net.nexus.is_primary_validator(&owner).unwrap());
}

#[test]
fn test_unimplemented_native_contract_faults() {
    let net = TestNet::new();
    let tx = net.tx(
        script(|b| {
            b.emit_call_contract("exchange", "Swap", &[]);
        }),
        &[&net.owner],
    );
    let block = net.produce(&[tx.clone()]);
    assert_eq!(block.state_for(&tx.hash()), Some(ExecutionState::Fault));
    assert!(reason(&block, &tx).contains("contract not available: exchange"));
}
