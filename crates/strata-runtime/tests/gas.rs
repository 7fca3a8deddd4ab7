//! Gas metering, settlement and the no-refund policy

mod common;

use common::{script, TestNet};
use strata_primitives::Serializable;
use strata_runtime::{BlockOracle, NativeContractKind, RuntimeVm};
use strata_storage::MemoryStore;
use strata_types::{EventKind, ExecutionState, GasEventData};
use strata_vm::{interop_gas, static_gas, Opcode, VmObject};

fn call_cost(interop: &str) -> u64 {
    static_gas(Opcode::LOAD) + static_gas(Opcode::EXTCALL) + interop_gas(interop).unwrap()
}

#[test]
fn test_interop_charges_namespace_band() {
    let net = TestNet::new();
    let chain = net.nexus.root_chain();
    let store = MemoryStore::new();
    let oracle = BlockOracle::empty();

    let code = script(|b| {
        b.emit_call_interop("Runtime.Time", &[]);
    });
    let outcome = RuntimeVm::new(chain.as_ref(), &net.nexus, &store, &oracle).run(&code);
    assert_eq!(outcome.state, ExecutionState::Halt);
    assert_eq!(outcome.gas_used, call_cost("Runtime.Time"));
    assert_eq!(outcome.gas_used, 5 + 10 + 50);

    // the band is charged before the call runs, even when it then faults
    let code = script(|b| {
        b.emit_call_interop("Nexus.CreateToken", &[]);
    });
    let outcome = RuntimeVm::new(chain.as_ref(), &net.nexus, &store, &oracle).run(&code);
    assert_eq!(outcome.state, ExecutionState::Fault);
    assert_eq!(outcome.gas_used, 5 + 10 + 1000);
}

#[test]
fn test_unknown_namespace_faults() {
    let net = TestNet::new();
    let chain = net.nexus.root_chain();
    let store = MemoryStore::new();
    let oracle = BlockOracle::empty();

    let code = script(|b| {
        b.emit_call_interop("Bogus.Call", &[]);
    });
    let outcome = RuntimeVm::new(chain.as_ref(), &net.nexus, &store, &oracle).run(&code);
    assert_eq!(outcome.state, ExecutionState::Fault);
    assert!(outcome.fault.unwrap().contains("invalid extcall namespace"));
}

#[test]
fn test_gas_limit_boundary() {
    let net = TestNet::new();
    let chain = net.nexus.root_chain();
    let store = MemoryStore::new();
    let oracle = BlockOracle::empty();
    let code = script(|b| {
        b.emit_call_interop("Runtime.Time", &[]);
    });
    let exact = call_cost("Runtime.Time");

    let outcome = RuntimeVm::new(chain.as_ref(), &net.nexus, &store, &oracle)
        .with_gas_limit(exact)
        .run(&code);
    assert_eq!(outcome.state, ExecutionState::Halt);

    let outcome = RuntimeVm::new(chain.as_ref(), &net.nexus, &store, &oracle)
        .with_gas_limit(exact - 1)
        .run(&code);
    assert_eq!(outcome.state, ExecutionState::Fault);
    assert_eq!(
        outcome.fault.as_deref(),
        Some(format!("VM gas limit exceeded ({})/({})", exact - 1, exact).as_str())
    );
    assert_eq!(outcome.gas_used, exact);
}

#[test]
fn test_successful_transaction_pays_gas() {
    let net = TestNet::new();
    let owner = net.owner.address();
    let before = net.fuel(&owner);

    let tx = net.tx(
        script(|b| {
            b.emit_call_interop("Runtime.Time", &[]);
        }),
        &[&net.owner],
    );
    let block = net.produce(&[tx.clone()]);

    assert_eq!(block.state_for(&tx.hash()), Some(ExecutionState::Halt));
    let payment = block
        .events_for(&tx.hash())
        .iter()
        .find(|e| e.kind == EventKind::GasPayment)
        .unwrap();
    let data: GasEventData = payment.decode_data().unwrap();
    assert_eq!(data.amount as u64, call_cost("Runtime.Time"));

    let fee = data.amount as u128 * data.price as u128;
    assert_eq!(net.fuel(&owner), before - fee);
    assert_eq!(net.fuel(&NativeContractKind::Gas.address()), fee);
    assert!(block.is_successful());
}

#[test]
fn test_fee_lands_when_the_payer_moves_fuel() {
    let net = TestNet::new();
    let owner = net.owner.address();
    let receiver = common::TestAccount::random().address();
    let before = net.fuel(&owner);

    let tx = net.tx(
        script(|b| {
            b.emit_call_interop(
                "Runtime.TransferTokens",
                &[
                    VmObject::from(owner),
                    VmObject::from(receiver),
                    VmObject::from("FUEL"),
                    VmObject::from(700u64),
                ],
            );
        }),
        &[&net.owner],
    );
    let block = net.produce(&[tx.clone()]);
    assert_eq!(block.state_for(&tx.hash()), Some(ExecutionState::Halt));

    let data: GasEventData = block
        .events_for(&tx.hash())
        .iter()
        .find(|e| e.kind == EventKind::GasPayment)
        .unwrap()
        .decode_data()
        .unwrap();
    let fee = data.amount as u128 * data.price as u128;
    assert!(fee > 0);

    assert_eq!(net.fuel(&receiver), 700);
    assert_eq!(net.fuel(&owner), before - 700 - fee);
    assert_eq!(net.fuel(&NativeContractKind::Gas.address()), fee);
    // no fuel appears from nowhere
    assert_eq!(
        net.fuel(&owner) + net.fuel(&receiver) + fee,
        u128::from(common::GENESIS_FUEL)
    );
}

#[test]
fn test_faulted_transaction_gas_is_not_refunded() {
    let net = TestNet::new();
    let owner = net.owner.address();
    let receiver = common::TestAccount::random().address();
    let before = net.fuel(&owner);

    let tx = net.tx(
        script(|b| {
            b.emit_call_interop(
                "Runtime.TransferTokens",
                &[
                    VmObject::from(owner),
                    VmObject::from(receiver),
                    VmObject::from("FUEL"),
                    VmObject::from(500u64),
                ],
            )
            .emit_load_string(2, "stop here")
            .emit_register(Opcode::THROW, 2);
        }),
        &[&net.owner],
    );
    let block = net.produce(&[tx.clone()]);

    assert_eq!(block.state_for(&tx.hash()), Some(ExecutionState::Fault));
    assert!(!block.is_successful());
    let events = block.events_for(&tx.hash());
    let failure = events
        .iter()
        .find(|e| e.kind == EventKind::ExecutionFailure)
        .unwrap();
    assert_eq!(failure.data, b"stop here".to_vec());
    assert!(!events.iter().any(|e| e.kind == EventKind::TokenSend));

    // the transfer is rolled back, the gas is not
    assert_eq!(net.fuel(&receiver), 0);
    let charged = net.fuel(&NativeContractKind::Gas.address());
    assert!(charged > 0);
    assert_eq!(net.fuel(&owner), before - charged);
}

#[test]
fn test_fault_does_not_abort_the_block() {
    let net = TestNet::new();
    let failing = net.tx(
        script(|b| {
            b.emit_load_string(2, "boom").emit_register(Opcode::THROW, 2);
        }),
        &[&net.owner],
    );
    let passing = net.tx(
        script(|b| {
            b.emit_call_interop("Runtime.Height", &[]);
        }),
        &[&net.owner],
    );
    let block = net.produce(&[failing.clone(), passing.clone()]);

    assert_eq!(block.transaction_hashes(), &[failing.hash(), passing.hash()]);
    assert_eq!(block.state_for(&failing.hash()), Some(ExecutionState::Fault));
    assert_eq!(block.state_for(&passing.hash()), Some(ExecutionState::Halt));
    assert_eq!(
        block.result_for(&passing.hash()),
        Some(VmObject::Number(2).to_bytes().as_slice())
    );
    assert_eq!(net.nexus.root_chain().height().unwrap(), 2);
    assert_eq!(
        net.nexus.metrics().get_counter(strata_metrics::names::TX_FAULT),
        Some(1)
    );

    let snapshot = strata_metrics::MetricsSnapshot::from_metrics(net.nexus.metrics());
    assert_eq!(snapshot.counters.get(strata_metrics::names::TX_HALT), Some(&1));
    assert_eq!(snapshot.histograms[strata_metrics::names::TX_GAS_USED].count, 2);
}
