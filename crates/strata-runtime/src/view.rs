//! The slices of a chain and of the nexus that a running VM needs

use strata_primitives::Address;
use strata_storage::StorageReader;

use crate::config::NexusConfig;

/// Chain an execution runs on
pub trait ChainView: Send + Sync {
    /// Chain name
    fn name(&self) -> &str;

    /// Chain address
    fn address(&self) -> Address;

    /// Whether this is the root chain, which owns the nexus registry
    fn is_root(&self) -> bool;
}

/// Nexus an execution runs under
pub trait NexusView: Send + Sync {
    /// Nexus name
    fn name(&self) -> &str;

    /// Nexus parameters
    fn config(&self) -> &NexusConfig;

    /// Committed registry state, read by executions on non-root chains
    fn root_storage(&self) -> &dyn StorageReader;
}
