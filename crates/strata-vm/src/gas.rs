//! Gas costs and metering

use crate::error::{VmError, VmResult};
use crate::opcode::Opcode;

/// Gas costs for VM operations
pub mod cost {
    /// Zero gas
    pub const ZERO: u64 = 0;
    /// Default opcode cost
    pub const BASE: u64 = 1;
    /// Register loads, struct access and local calls
    pub const LOW: u64 = 5;
    /// Interop calls and context loads
    pub const EXTERNAL: u64 = 10;
    /// Context switch
    pub const SWITCH: u64 = 100;

    /// Bare or constructor-style interop call
    pub const INTEROP_BASE: u64 = 10;
    /// Runtime, Data, Map, List and Set interop calls
    pub const INTEROP_RUNTIME: u64 = 50;
    /// Account and Leaderboard interop calls
    pub const INTEROP_ACCOUNT: u64 = 100;
    /// Organization and Oracle interop calls
    pub const INTEROP_ORGANIZATION: u64 = 200;
    /// Nexus interop calls
    pub const INTEROP_NEXUS: u64 = 1000;
}

/// Get static gas cost for an opcode
pub fn static_gas(opcode: Opcode) -> u64 {
    match opcode {
        Opcode::NOP | Opcode::RET => cost::ZERO,
        Opcode::GET | Opcode::PUT | Opcode::CALL | Opcode::LOAD => cost::LOW,
        Opcode::EXTCALL | Opcode::CTX => cost::EXTERNAL,
        Opcode::SWITCH => cost::SWITCH,
        _ => cost::BASE,
    }
}

/// Cost of an interop call, selected by the namespace before the first `.`
pub fn interop_gas(name: &str) -> VmResult<u64> {
    let Some((namespace, _)) = name.split_once('.') else {
        return Ok(cost::INTEROP_BASE);
    };
    match namespace {
        "Runtime" | "Data" | "Map" | "List" | "Set" => Ok(cost::INTEROP_RUNTIME),
        "Account" | "Leaderboard" => Ok(cost::INTEROP_ACCOUNT),
        "Organization" | "Oracle" => Ok(cost::INTEROP_ORGANIZATION),
        "Nexus" => Ok(cost::INTEROP_NEXUS),
        other => Err(VmError::InvalidInteropNamespace(other.to_string())),
    }
}

/// Running gas total against a hard limit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasMeter {
    limit: u64,
    used: u64,
}

impl GasMeter {
    /// Create a meter with `limit`
    pub fn new(limit: u64) -> Self {
        Self { limit, used: 0 }
    }

    /// Current limit
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Gas used so far, including the charge that exceeded the limit
    pub fn used(&self) -> u64 {
        self.used
    }

    /// Gas left before the limit
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used)
    }

    /// Replace the limit; gas already used is kept
    pub fn set_limit(&mut self, limit: u64) {
        self.limit = limit;
    }

    /// Charge `amount`; fails once the total exceeds the limit
    pub fn consume(&mut self, amount: u64) -> VmResult<()> {
        self.used = self.used.saturating_add(amount);
        if self.used > self.limit {
            return Err(VmError::GasLimitExceeded {
                limit: self.limit,
                used: self.used,
            });
        }
        Ok(())
    }
}
