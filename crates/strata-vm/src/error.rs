//! VM error types

use strata_primitives::CodecError;
use strata_storage::StorageError;
use strata_types::VmType;
use thiserror::Error;

/// Execution errors. Any of these faults the running transaction, and the
/// display string is recorded verbatim as the failure reason.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VmError {
    /// Gas total passed the limit
    #[error("VM gas limit exceeded ({limit})/({used})")]
    GasLimitExceeded {
        /// Gas limit
        limit: u64,
        /// Total after the failing charge
        used: u64,
    },

    /// Invalid opcode
    #[error("invalid opcode: {0}")]
    InvalidOpcode(u8),

    /// Interop name with an unknown namespace
    #[error("invalid extcall namespace: {0}")]
    InvalidInteropNamespace(String),

    /// Interop name not registered
    #[error("unknown interop: {0}")]
    UnknownInterop(String),

    /// Failed assertion or script exception, message kept verbatim
    #[error("{0}")]
    Assertion(String),

    /// Stack underflow
    #[error("stack underflow")]
    StackUnderflow,

    /// Stack overflow
    #[error("stack overflow (max {0})")]
    StackOverflow(usize),

    /// Register index out of range
    #[error("invalid register: {0}")]
    InvalidRegister(u8),

    /// Jump outside the script
    #[error("invalid jump destination: {0}")]
    InvalidJump(usize),

    /// Value could not be converted
    #[error("cannot cast {from:?} to {to:?}")]
    CastFailed {
        /// Source type
        from: VmType,
        /// Target type
        to: VmType,
    },

    /// Overflow, division by zero or an out-of-range operand
    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    /// Call frame limit reached
    #[error("call depth exceeded (max {0})")]
    FrameOverflow(usize),

    /// Context nesting limit reached
    #[error("context depth exceeded (max {0})")]
    ContextDepthExceeded(usize),

    /// No frame or context is active
    #[error("no active frame")]
    NoActiveFrame,

    /// Context name did not resolve
    #[error("context not found: {0}")]
    ContextNotFound(String),

    /// Contract exists but cannot run
    #[error("contract not available: {0}")]
    ContractNotAvailable(String),

    /// Surface deliberately left unimplemented
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Storage failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Malformed script or value encoding
    #[error("decoding error: {0}")]
    Codec(String),

    /// State violation raised by the chain or nexus, message kept verbatim
    #[error("{0}")]
    Runtime(String),
}

impl From<StorageError> for VmError {
    fn from(err: StorageError) -> Self {
        VmError::Storage(err.to_string())
    }
}

impl From<CodecError> for VmError {
    fn from(err: CodecError) -> Self {
        VmError::Codec(err.to_string())
    }
}

/// Result type for VM operations
pub type VmResult<T> = Result<T, VmError>;
