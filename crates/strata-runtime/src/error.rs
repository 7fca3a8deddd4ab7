//! Runtime error types

use strata_primitives::{BlockHeight, CodecError, Hash};
use strata_storage::StorageError;
use strata_types::TypesError;
use strata_vm::VmError;
use thiserror::Error;

/// State violations raised by chains and the nexus.
///
/// Raised inside a transaction these fault only that transaction; the
/// display string becomes the failure reason.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Fungible operation on an NFT
    #[error("token must be fungible")]
    TokenMustBeFungible,

    /// Transfer of a token without the transferable flag
    #[error("token must be transferable")]
    TokenMustBeTransferable,

    /// NFT operation on a fungible token
    #[error("token can't be fungible")]
    TokenMustNotBeFungible,

    /// Mint of a token without the mintable flag
    #[error("token must be mintable")]
    TokenNotMintable,

    /// Burn of a token without the burnable flag
    #[error("token must be burnable")]
    TokenNotBurnable,

    /// Zero or negative amount
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// Balance too low
    #[error("insufficient balance of {symbol} for {address}: required {required}, available {available}")]
    InsufficientBalance {
        /// Token symbol
        symbol: String,
        /// Address debited
        address: String,
        /// Amount requested
        required: u128,
        /// Amount held
        available: u128,
    },

    /// Mint would pass the maximum supply
    #[error("{0} supply exceeded")]
    SupplyExceeded(String),

    /// Unknown token
    #[error("unknown token: {0}")]
    UnknownToken(String),

    /// Unknown NFT id
    #[error("unknown {symbol} token id {id}")]
    UnknownTokenId {
        /// Token symbol
        symbol: String,
        /// NFT id
        id: u128,
    },

    /// Unknown token series
    #[error("unknown series {series} of {symbol}")]
    UnknownSeries {
        /// Token symbol
        symbol: String,
        /// Series id
        series: u32,
    },

    /// Unknown chain
    #[error("unknown chain: {0}")]
    UnknownChain(String),

    /// Unknown organization
    #[error("unknown organization: {0}")]
    UnknownOrganization(String),

    /// Unknown contract
    #[error("unknown contract: {0}")]
    UnknownContract(String),

    /// Unknown chain task
    #[error("unknown task: {0}")]
    UnknownTask(u64),

    /// Unknown platform
    #[error("unknown platform: {0}")]
    UnknownPlatform(String),

    /// Name or key already registered
    #[error("{kind} already exists: {name}")]
    Duplicate {
        /// Kind of entity
        kind: &'static str,
        /// Name or key
        name: String,
    },

    /// Malformed name or argument
    #[error("invalid {0}")]
    Invalid(String),

    /// Address failed a witness check
    #[error("witness failed for {0}")]
    WitnessFailed(String),

    /// Caller may not perform the operation
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Block height does not follow the chain
    #[error("invalid block height: expected {expected}, got {got}")]
    InvalidHeight {
        /// Next height of the chain
        expected: BlockHeight,
        /// Height of the block
        got: BlockHeight,
    },

    /// Block does not link to the chain head
    #[error("invalid previous hash: expected {expected}, got {got}")]
    InvalidPreviousHash {
        /// Hash of the chain head
        expected: Hash,
        /// Previous hash carried by the block
        got: Hash,
    },

    /// Block was built for another chain
    #[error("block belongs to another chain")]
    WrongChain,

    /// Transaction rejected before execution
    #[error("invalid transaction {hash}: {reason}")]
    InvalidTransaction {
        /// Transaction hash
        hash: Hash,
        /// Rejection reason
        reason: String,
    },

    /// Read-only invocation did not complete
    #[error("query faulted: {0}")]
    QueryFaulted(String),

    /// Oracle backend failure
    #[error("oracle error: {0}")]
    Oracle(String),

    /// Per-block oracle cap reached
    #[error("oracle entry limit exceeded")]
    OracleLimit,

    /// Invalid configuration
    #[error("config error: {0}")]
    Config(String),

    /// Genesis could not be created
    #[error("genesis error: {0}")]
    Genesis(String),

    /// Storage failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Malformed stored value
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Execution failure
    #[error(transparent)]
    Vm(#[from] VmError),

    /// Record assembly failure
    #[error("record error: {0}")]
    Types(#[from] TypesError),
}

impl From<RuntimeError> for VmError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Vm(inner) => inner,
            RuntimeError::Storage(inner) => VmError::Storage(inner.to_string()),
            RuntimeError::Codec(inner) => VmError::Codec(inner.to_string()),
            other => VmError::Runtime(other.to_string()),
        }
    }
}

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_messages() {
        assert_eq!(RuntimeError::TokenMustBeFungible.to_string(), "token must be fungible");
        assert_eq!(
            RuntimeError::TokenMustBeTransferable.to_string(),
            "token must be transferable"
        );
        assert_eq!(RuntimeError::ZeroAmount.to_string(), "amount must be greater than zero");
    }

    #[test]
    fn test_vm_conversion_keeps_message() {
        let err: VmError = RuntimeError::TokenMustBeTransferable.into();
        assert_eq!(err, VmError::Runtime("token must be transferable".into()));

        let inner = VmError::GasLimitExceeded { limit: 10, used: 11 };
        let err: VmError = RuntimeError::Vm(inner.clone()).into();
        assert_eq!(err, inner);
    }
}
