//! Nexus and genesis configuration

use std::path::Path;

use serde::{Deserialize, Serialize};
use strata_primitives::{Address, Timestamp};
use strata_types::TokenFlags;

use crate::error::{RuntimeError, RuntimeResult};

/// Latest protocol version this runtime understands
pub const LATEST_PROTOCOL_VERSION: u32 = 3;

/// Nexus-wide parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NexusConfig {
    /// Nexus name, checked against every transaction
    #[serde(default = "default_nexus_name")]
    pub name: String,
    /// Name of the root chain, which holds the registry
    #[serde(default = "default_root_chain")]
    pub root_chain: String,
    /// Token gas is paid in
    #[serde(default = "default_fuel_token")]
    pub fuel_token: String,
    /// Token validators stake
    #[serde(default = "default_staking_token")]
    pub staking_token: String,
    /// Gas limit of a transaction until it calls `AllowGas`
    #[serde(default = "default_gas_limit")]
    pub default_gas_limit: u64,
    /// Gas limit of read-only invocations
    #[serde(default = "default_query_gas_limit")]
    pub query_gas_limit: u64,
    /// Lowest accepted gas price, also charged for chain tasks
    #[serde(default = "default_min_gas_price")]
    pub min_gas_price: u64,
    /// Cap on oracle entries per block
    #[serde(default = "default_max_oracle_entries")]
    pub max_oracle_entries: usize,
    /// Cap on the validator set
    #[serde(default = "default_max_validators")]
    pub max_validators: usize,
    /// Leading validator slots that vote in consensus
    #[serde(default = "default_primary_validators")]
    pub primary_validators: usize,
    /// Stake required to hold a validator slot
    #[serde(default = "default_min_validator_stake")]
    pub min_validator_stake: u64,
    /// Protocol version at genesis
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u32,
}

fn default_nexus_name() -> String {
    "simnet".to_string()
}

fn default_root_chain() -> String {
    "main".to_string()
}

fn default_fuel_token() -> String {
    "FUEL".to_string()
}

fn default_staking_token() -> String {
    "STAKE".to_string()
}

fn default_gas_limit() -> u64 {
    10_000
}

fn default_query_gas_limit() -> u64 {
    100_000
}

fn default_min_gas_price() -> u64 {
    1
}

fn default_max_oracle_entries() -> usize {
    64
}

fn default_max_validators() -> usize {
    64
}

fn default_primary_validators() -> usize {
    4
}

fn default_min_validator_stake() -> u64 {
    50_000
}

fn default_protocol_version() -> u32 {
    LATEST_PROTOCOL_VERSION
}

impl Default for NexusConfig {
    fn default() -> Self {
        Self {
            name: default_nexus_name(),
            root_chain: default_root_chain(),
            fuel_token: default_fuel_token(),
            staking_token: default_staking_token(),
            default_gas_limit: default_gas_limit(),
            query_gas_limit: default_query_gas_limit(),
            min_gas_price: default_min_gas_price(),
            max_oracle_entries: default_max_oracle_entries(),
            max_validators: default_max_validators(),
            primary_validators: default_primary_validators(),
            min_validator_stake: default_min_validator_stake(),
            protocol_version: default_protocol_version(),
        }
    }
}

impl NexusConfig {
    /// Parse from TOML
    pub fn from_toml_str(s: &str) -> RuntimeResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| RuntimeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from JSON
    pub fn from_json_str(s: &str) -> RuntimeResult<Self> {
        let config: Self =
            serde_json::from_str(s).map_err(|e| RuntimeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.toml` or `.json` file
    pub fn load(path: impl AsRef<Path>) -> RuntimeResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| RuntimeError::Config(format!("{}: {e}", path.display())))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_toml_str(&content),
        }
    }

    /// Reject inconsistent parameters
    pub fn validate(&self) -> RuntimeResult<()> {
        if self.name.is_empty() || self.root_chain.is_empty() {
            return Err(RuntimeError::Config("nexus and root chain names are required".into()));
        }
        if self.primary_validators == 0 || self.primary_validators > self.max_validators {
            return Err(RuntimeError::Config(format!(
                "primary validator count {} outside 1..={}",
                self.primary_validators, self.max_validators
            )));
        }
        if self.protocol_version == 0 || self.protocol_version > LATEST_PROTOCOL_VERSION {
            return Err(RuntimeError::Config(format!(
                "unsupported protocol version {}",
                self.protocol_version
            )));
        }
        Ok(())
    }
}

/// Token created at genesis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisToken {
    /// Symbol
    pub symbol: String,
    /// Display name
    pub name: String,
    /// Decimal places
    #[serde(default)]
    pub decimals: u32,
    /// Supply cap, zero for none
    #[serde(default)]
    pub max_supply: u64,
    /// Flag names such as `Fungible` or `Transferable`
    #[serde(default)]
    pub flags: Vec<String>,
}

impl GenesisToken {
    /// Parsed flag set
    pub fn parse_flags(&self) -> RuntimeResult<TokenFlags> {
        self.flags.iter().try_fold(TokenFlags::empty(), |acc, name| {
            TokenFlags::parse_name(name)
                .map(|flag| acc | flag)
                .ok_or_else(|| RuntimeError::Config(format!("unknown token flag {name}")))
        })
    }
}

/// Balance credited at genesis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisBalance {
    /// Hex address
    pub address: String,
    /// Token symbol
    pub symbol: String,
    /// Amount in base units
    pub amount: u64,
}

/// Organization created at genesis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisOrganization {
    /// Organization id
    pub id: String,
    /// Display name
    pub name: String,
    /// Hex member addresses
    #[serde(default)]
    pub members: Vec<String>,
}

/// Initial state of the root chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// Hex address owning the genesis tokens
    pub owner: String,
    /// Genesis timestamp
    #[serde(default)]
    pub timestamp: Timestamp,
    /// Tokens to create
    #[serde(default)]
    pub tokens: Vec<GenesisToken>,
    /// Balances to credit
    #[serde(default)]
    pub balances: Vec<GenesisBalance>,
    /// Hex addresses of the initial validators, primaries first
    #[serde(default)]
    pub validators: Vec<String>,
    /// Organizations to create
    #[serde(default)]
    pub organizations: Vec<GenesisOrganization>,
}

impl GenesisConfig {
    /// Parse from TOML
    pub fn from_toml_str(s: &str) -> RuntimeResult<Self> {
        toml::from_str(s).map_err(|e| RuntimeError::Config(e.to_string()))
    }

    /// Parse from JSON
    pub fn from_json_str(s: &str) -> RuntimeResult<Self> {
        serde_json::from_str(s).map_err(|e| RuntimeError::Config(e.to_string()))
    }

    /// Owner address
    pub fn owner_address(&self) -> RuntimeResult<Address> {
        parse_address(&self.owner)
    }
}

/// Parse a hex address, with or without `0x`
pub fn parse_address(s: &str) -> RuntimeResult<Address> {
    let s = s.trim();
    let s = s.strip_prefix("0x").unwrap_or(s);
    Address::from_hex(s).map_err(|e| RuntimeError::Config(format!("invalid address {s}: {e}")))
}
