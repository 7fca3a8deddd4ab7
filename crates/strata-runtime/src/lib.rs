//! # strata-runtime
//!
//! Execution and state authority for Strata.
//!
//! This crate provides:
//! - `RuntimeVm`, the per-transaction VM host with gas accounting and the
//!   interop table
//! - Native contracts dispatched through explicit method tables
//! - `Chain`, which assembles and commits blocks and runs chain tasks
//! - `Nexus`, the cross-chain registry of tokens, organizations, platforms
//!   and validators, and genesis
//! - The oracle collaborator and per-block recording oracle
//! - Nexus and genesis configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

mod chain;
mod config;
mod contract;
mod error;
mod native;
mod nexus;
mod oracle;
mod runtime;
mod view;

pub mod leaderboard;
pub mod ledger;
pub mod registry;
pub mod task;

pub use chain::Chain;
pub use config::{
    parse_address, GenesisBalance, GenesisConfig, GenesisOrganization, GenesisToken, NexusConfig,
    LATEST_PROTOCOL_VERSION,
};
pub use contract::{
    contract_names, deploy_contract, get_contract, kill_contract, upgrade_contract, ContractRecord,
};
pub use error::{RuntimeError, RuntimeResult};
pub use native::{
    contract_address, method_table, stake_of, MethodTable, NativeArgs, NativeContext,
    NativeContractKind, NativeHandler, NativeMethod,
};
pub use nexus::Nexus;
pub use oracle::{
    price_url, transaction_url, BlockOracle, OracleBackend, OracleReader, StaticOracle,
};
pub use registry::ChainRecord;
pub use runtime::{ExecutionOutcome, RuntimeVm, ENTRY_CONTEXT, MAX_TRIGGER_DEPTH};
pub use task::TaskRun;
pub use view::{ChainView, NexusView};
