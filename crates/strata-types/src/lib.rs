//! # strata-types
//!
//! Ledger record types for Strata.
//!
//! This crate provides:
//! - Transaction and Block records with hash caching and signatures
//! - Events emitted during execution
//! - Token, series and NFT content records
//! - Organizations, chain tasks, platforms and validator entries
//! - Contract ABI descriptors

#![warn(missing_docs)]
#![warn(clippy::all)]

mod abi;
mod block;
mod error;
mod event;
mod organization;
mod platform;
mod task;
mod token;
mod transaction;

pub use abi::{ContractAbi, ContractMethod, ContractParameter, VmType};
pub use block::{Block, ExecutionState, OracleEntry};
pub use error::{TypesError, TypesResult};
pub use event::{Event, EventKind, GasEventData, TokenEventData};
pub use organization::OrganizationInfo;
pub use platform::{PlatformInfo, PlatformSwapAddress, ValidatorEntry, ValidatorType};
pub use task::{ChainTask, TaskFrequencyMode};
pub use token::{
    TokenContent, TokenFlags, TokenInfo, TokenInfusion, TokenSeries, TokenSeriesMode,
};
pub use transaction::Transaction;
