//! Token flags and the NFT lifecycle driven through transactions

mod common;

use common::{script, TestAccount, TestNet};
use strata_primitives::Serializable;
use strata_types::{EventKind, ExecutionState, TokenFlags, Transaction};
use strata_vm::VmObject;

fn create_token(net: &TestNet, symbol: &str, flags: TokenFlags) -> Transaction {
    let owner = net.owner.address();
    net.tx(
        script(|b| {
            b.emit_call_interop(
                "Nexus.CreateToken",
                &[
                    VmObject::from(owner),
                    VmObject::from(symbol),
                    VmObject::from(format!("{symbol} token")),
                    VmObject::from(0u64),
                    VmObject::from(0u64),
                    VmObject::from(u64::from(flags.bits())),
                    VmObject::from(Vec::new()),
                    VmObject::from(Vec::new()),
                ],
            );
        }),
        &[&net.owner],
    )
}

fn failure_reason(block: &strata_types::Block, tx: &Transaction) -> String {
    let event = block
        .events_for(&tx.hash())
        .iter()
        .find(|e| e.kind == EventKind::ExecutionFailure)
        .unwrap();
    String::from_utf8(event.data.clone()).unwrap()
}

#[test]
fn test_non_transferable_token_cannot_move() {
    let net = TestNet::new();
    let owner = net.owner.address();
    let other = TestAccount::random().address();

    let create = create_token(&net, "SOUL", TokenFlags::FUNGIBLE | TokenFlags::MINTABLE);
    let mint = net.tx(
        script(|b| {
            b.emit_call_interop(
                "Runtime.MintTokens",
                &[
                    VmObject::from(owner),
                    VmObject::from(owner),
                    VmObject::from("SOUL"),
                    VmObject::from(100u64),
                ],
            );
        }),
        &[&net.owner],
    );
    let block = net.produce(&[create.clone(), mint.clone()]);
    assert_eq!(block.state_for(&create.hash()), Some(ExecutionState::Halt));
    assert_eq!(block.state_for(&mint.hash()), Some(ExecutionState::Halt));

    let chain = net.nexus.root_chain();
    assert_eq!(chain.get_token_balance("SOUL", &owner).unwrap(), 100);
    assert_eq!(chain.get_token_supply("SOUL").unwrap(), 100);

    let transfer = net.tx(
        script(|b| {
            b.emit_call_interop(
                "Runtime.TransferTokens",
                &[
                    VmObject::from(owner),
                    VmObject::from(other),
                    VmObject::from("SOUL"),
                    VmObject::from(10u64),
                ],
            );
        }),
        &[&net.owner],
    );
    let block = net.produce(&[transfer.clone()]);
    assert_eq!(block.state_for(&transfer.hash()), Some(ExecutionState::Fault));
    assert!(failure_reason(&block, &transfer).contains("token must be transferable"));
    assert_eq!(chain.get_token_balance("SOUL", &owner).unwrap(), 100);
    assert_eq!(chain.get_token_balance("SOUL", &other).unwrap(), 0);
}

#[test]
fn test_transfer_without_witness_faults() {
    let net = TestNet::new();
    let owner = net.owner.address();
    let thief = TestAccount::random();

    let tx = net.tx(
        script(|b| {
            b.emit_call_interop(
                "Runtime.TransferTokens",
                &[
                    VmObject::from(owner),
                    VmObject::from(thief.address()),
                    VmObject::from("FUEL"),
                    VmObject::from(1u64),
                ],
            );
        }),
        &[&thief],
    );
    let block = net.produce(&[tx.clone()]);
    assert_eq!(block.state_for(&tx.hash()), Some(ExecutionState::Fault));
    assert!(failure_reason(&block, &tx).contains("witness"));
    assert_eq!(net.fuel(&thief.address()), 0);
}

#[test]
fn test_nft_mint_and_transfer() {
    let net = TestNet::new();
    let alice = net.owner.address();
    let bob = TestAccount::random().address();
    let flags = TokenFlags::TRANSFERABLE | TokenFlags::MINTABLE | TokenFlags::BURNABLE;
    assert_eq!(flags.bits(), 769);

    let create = create_token(&net, "CROWN", flags);
    let mint = net.tx(
        script(|b| {
            b.emit_call_interop(
                "Runtime.MintToken",
                &[
                    VmObject::from(alice),
                    VmObject::from(alice),
                    VmObject::from("CROWN"),
                    VmObject::from(vec![1u8, 3, 3, 7]),
                    VmObject::from(vec![1u8, 4, 4, 6]),
                    VmObject::from(0u64),
                ],
            );
        }),
        &[&net.owner],
    );
    let block = net.produce(&[create.clone(), mint.clone()]);
    assert_eq!(block.state_for(&mint.hash()), Some(ExecutionState::Halt));

    let chain = net.nexus.root_chain();
    let owned = chain.get_owned_tokens("CROWN", &alice).unwrap();
    assert_eq!(owned.len(), 1);
    let id = owned[0];
    assert_eq!(
        block.result_for(&mint.hash()),
        Some(VmObject::Number(id as i128).to_bytes().as_slice())
    );

    let content = chain.get_nft("CROWN", id).unwrap();
    assert_eq!(content.rom, vec![1, 3, 3, 7]);
    assert_eq!(content.ram, vec![1, 4, 4, 6]);
    assert_eq!(content.owner, alice);
    assert_eq!(content.creator, alice);

    let transfer = net.tx(
        script(|b| {
            b.emit_call_interop(
                "Runtime.TransferToken",
                &[
                    VmObject::from(alice),
                    VmObject::from(bob),
                    VmObject::from("CROWN"),
                    VmObject::Number(id as i128),
                ],
            );
        }),
        &[&net.owner],
    );
    let block = net.produce(&[transfer.clone()]);
    assert_eq!(block.state_for(&transfer.hash()), Some(ExecutionState::Halt));

    assert!(chain.get_owned_tokens("CROWN", &alice).unwrap().is_empty());
    assert_eq!(chain.get_owned_tokens("CROWN", &bob).unwrap(), vec![id]);
    let content = chain.get_nft("CROWN", id).unwrap();
    assert_eq!(content.owner, bob);
    assert_eq!(content.rom, vec![1, 3, 3, 7]);
    assert_eq!(content.ram, vec![1, 4, 4, 6]);
}

#[test]
fn test_fungible_transfer_of_nft_faults() {
    let net = TestNet::new();
    let owner = net.owner.address();
    let create = create_token(&net, "CROWN", TokenFlags::TRANSFERABLE | TokenFlags::MINTABLE);
    net.produce(&[create]);

    let tx = net.tx(
        script(|b| {
            b.emit_call_interop(
                "Runtime.TransferTokens",
                &[
                    VmObject::from(owner),
                    VmObject::from(TestAccount::random().address()),
                    VmObject::from("CROWN"),
                    VmObject::from(1u64),
                ],
            );
        }),
        &[&net.owner],
    );
    let block = net.produce(&[tx.clone()]);
    assert_eq!(block.state_for(&tx.hash()), Some(ExecutionState::Fault));
    assert!(failure_reason(&block, &tx).contains("token must be fungible"));
}

#[test]
fn test_nft_write_infuse_and_burn() {
    let net = TestNet::new();
    let owner = net.owner.address();
    let flags = TokenFlags::TRANSFERABLE | TokenFlags::MINTABLE | TokenFlags::BURNABLE;
    let create = create_token(&net, "CROWN", flags);
    let mint = net.tx(
        script(|b| {
            b.emit_call_interop(
                "Runtime.MintToken",
                &[
                    VmObject::from(owner),
                    VmObject::from(owner),
                    VmObject::from("CROWN"),
                    VmObject::from(vec![9u8]),
                    VmObject::from(vec![0u8]),
                    VmObject::from(0u64),
                ],
            );
        }),
        &[&net.owner],
    );
    net.produce(&[create, mint]);
    let chain = net.nexus.root_chain();
    let id = chain.get_owned_tokens("CROWN", &owner).unwrap()[0];
    let holder = strata_runtime::ledger::infusion_address("CROWN", id);

    let write_and_infuse = net.tx(
        script(|b| {
            b.emit_call_interop(
                "Runtime.WriteToken",
                &[
                    VmObject::from(owner),
                    VmObject::from("CROWN"),
                    VmObject::Number(id as i128),
                    VmObject::from(vec![7u8, 7]),
                ],
            )
            .emit_call_interop(
                "Runtime.InfuseToken",
                &[
                    VmObject::from(owner),
                    VmObject::from("CROWN"),
                    VmObject::Number(id as i128),
                    VmObject::from("FUEL"),
                    VmObject::from(1_000u64),
                ],
            );
        }),
        &[&net.owner],
    );
    let block = net.produce(&[write_and_infuse.clone()]);
    assert_eq!(block.state_for(&write_and_infuse.hash()), Some(ExecutionState::Halt));

    let content = chain.get_nft("CROWN", id).unwrap();
    assert_eq!(content.rom, vec![9]);
    assert_eq!(content.ram, vec![7, 7]);
    assert_eq!(content.infusion.len(), 1);
    assert_eq!(content.infusion[0].value, 1_000);
    assert_eq!(net.fuel(&holder), 1_000);

    let before = net.fuel(&owner);
    let burn = net.tx(
        script(|b| {
            b.emit_call_interop(
                "Runtime.BurnToken",
                &[VmObject::from(owner), VmObject::from("CROWN"), VmObject::Number(id as i128)],
            );
        }),
        &[&net.owner],
    );
    let block = net.produce(&[burn.clone()]);
    assert_eq!(block.state_for(&burn.hash()), Some(ExecutionState::Halt));

    // infused fuel returns to the burner, less the gas of the burn
    assert_eq!(net.fuel(&holder), 0);
    let gas: strata_types::GasEventData = block
        .events_for(&burn.hash())
        .iter()
        .find(|e| e.kind == EventKind::GasPayment)
        .unwrap()
        .decode_data()
        .unwrap();
    let fee = gas.amount as u128 * gas.price as u128;
    assert_eq!(net.fuel(&owner), before + 1_000 - fee);
    assert!(chain.get_owned_tokens("CROWN", &owner).unwrap().is_empty());
    assert!(chain.get_nft("CROWN", id).is_err());
    assert_eq!(chain.get_token_supply("CROWN").unwrap(), 0);
}
