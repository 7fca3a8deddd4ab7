//! Cross-chain registry and chain tree

use std::sync::Arc;

use dashmap::DashMap;
use strata_crypto::{public_key_to_address, PrivateKey};
use strata_metrics::Metrics;
use strata_primitives::{Address, Hash, Serializable};
use strata_storage::{KeyValueStore, StorageChangeSet, StorageReader};
use strata_types::{
    Block, Event, EventKind, OrganizationInfo, PlatformInfo, TokenEventData, TokenInfo,
    Transaction, ValidatorEntry, ValidatorType,
};
use tracing::{debug, info};

use crate::chain::Chain;
use crate::config::{parse_address, GenesisConfig, NexusConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::native::NativeContractKind;
use crate::view::{ChainView, NexusView};
use crate::{ledger, registry};

/// A nexus: the root chain, the chains registered under it and the
/// registry they share
pub struct Nexus {
    config: NexusConfig,
    store: Arc<dyn KeyValueStore>,
    root: Arc<Chain>,
    chains: DashMap<String, Arc<Chain>>,
    metrics: Arc<Metrics>,
}

impl Nexus {
    /// Open a nexus over `store`
    pub fn new(config: NexusConfig, store: Arc<dyn KeyValueStore>) -> RuntimeResult<Self> {
        Self::with_metrics(config, store, Metrics::shared())
    }

    /// Open a nexus recording into `metrics`
    pub fn with_metrics(
        config: NexusConfig,
        store: Arc<dyn KeyValueStore>,
        metrics: Arc<Metrics>,
    ) -> RuntimeResult<Self> {
        config.validate()?;
        let root = Arc::new(Chain::new(
            config.root_chain.clone(),
            None,
            store.clone(),
            metrics.clone(),
        ));
        Ok(Self {
            config,
            store,
            root,
            chains: DashMap::new(),
            metrics,
        })
    }

    /// Shared metrics
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Root chain
    pub fn root_chain(&self) -> &Arc<Chain> {
        &self.root
    }

    /// Chain `name`. Chains registered in the registry are opened on first
    /// use and kept for the life of the nexus.
    pub fn get_chain(&self, name: &str) -> RuntimeResult<Arc<Chain>> {
        if name == self.root.name() {
            return Ok(self.root.clone());
        }
        if let Some(chain) = self.chains.get(name) {
            return Ok(chain.clone());
        }
        let record = registry::get_chain(self.root.storage(), name)?
            .ok_or_else(|| RuntimeError::UnknownChain(name.to_string()))?;
        let chain = self
            .chains
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(chain = name, parent = ?record.parent, "opening chain");
                Arc::new(Chain::new(
                    record.name.clone(),
                    record.parent.clone(),
                    self.store.clone(),
                    self.metrics.clone(),
                ))
            })
            .clone();
        Ok(chain)
    }

    /// Names of every registered chain
    pub fn chain_names(&self) -> RuntimeResult<Vec<String>> {
        Ok(registry::chain_records(self.root.storage())?
            .into_iter()
            .map(|record| record.name)
            .collect())
    }

    /// Whether the genesis block has been committed
    pub fn has_genesis(&self) -> RuntimeResult<bool> {
        Ok(registry::genesis_hash(self.root.storage())?.is_some())
    }

    /// Hash of the genesis block
    pub fn genesis_hash(&self) -> RuntimeResult<Option<Hash>> {
        registry::genesis_hash(self.root.storage())
    }

    /// Current protocol version
    pub fn protocol_version(&self) -> RuntimeResult<u32> {
        registry::protocol_version(self.root.storage())
    }

    /// Registered token
    pub fn get_token(&self, symbol: &str) -> RuntimeResult<TokenInfo> {
        registry::token(self.root.storage(), symbol)
    }

    /// Whether `symbol` is registered
    pub fn token_exists(&self, symbol: &str) -> RuntimeResult<bool> {
        registry::token_exists(self.root.storage(), symbol)
    }

    /// Registered organization
    pub fn get_organization(&self, id: &str) -> RuntimeResult<OrganizationInfo> {
        registry::organization(self.root.storage(), id)
    }

    /// Members of organization `id`
    pub fn organization_members(&self, id: &str) -> RuntimeResult<Vec<Address>> {
        registry::organization_members(self.root.storage(), id)
    }

    /// Whether a strict majority of the members of `id` signed `tx`
    pub fn is_witness(&self, id: &str, tx: &Transaction) -> RuntimeResult<bool> {
        registry::is_organization_witness(self.root.storage(), id, &tx.signers())
    }

    /// Registered platform
    pub fn get_platform(&self, name: &str) -> RuntimeResult<PlatformInfo> {
        registry::get_platform(self.root.storage(), name)?
            .ok_or_else(|| RuntimeError::UnknownPlatform(name.to_string()))
    }

    /// Validator set in slot order
    pub fn validators(&self) -> RuntimeResult<Vec<ValidatorEntry>> {
        registry::validator_entries(self.root.storage())
    }

    /// Tier of `address`
    pub fn validator_type(&self, address: &Address) -> RuntimeResult<ValidatorType> {
        registry::validator_type(self.root.storage(), address)
    }

    /// Whether `address` holds a primary slot
    pub fn is_primary_validator(&self, address: &Address) -> RuntimeResult<bool> {
        Ok(self.validator_type(address)? == ValidatorType::Primary)
    }

    /// Whether `address` holds a secondary slot
    pub fn is_secondary_validator(&self, address: &Address) -> RuntimeResult<bool> {
        Ok(self.validator_type(address)? == ValidatorType::Secondary)
    }

    /// Build, sign and commit the root chain's first block from `genesis`
    pub fn create_genesis_block(&self, genesis: &GenesisConfig, key: &PrivateKey) -> RuntimeResult<Block> {
        if self.has_genesis()? {
            return Err(RuntimeError::Genesis("genesis block already exists".into()));
        }
        info!(nexus = %self.config.name, "creating genesis block");

        let owner = genesis.owner_address()?;
        let chain_name = self.root.name().to_string();
        let mut changes = StorageChangeSet::new(self.root.storage());
        let mut events = Vec::new();

        registry::set_owner(&mut changes, &owner)?;
        registry::set_protocol_version(&mut changes, self.config.protocol_version)?;
        registry::create_chain(&mut changes, &chain_name, None)?;
        events.push(Event::new(
            EventKind::ChainCreate,
            owner,
            "nexus",
            chain_name.clone().into_bytes(),
        ));

        for token in &genesis.tokens {
            let info = TokenInfo {
                symbol: token.symbol.clone(),
                name: token.name.clone(),
                owner,
                max_supply: u128::from(token.max_supply),
                decimals: token.decimals,
                flags: token.parse_flags()?,
                script: Vec::new(),
                abi: Default::default(),
            };
            registry::create_token(&mut changes, &info)?;
            debug!(symbol = %info.symbol, "genesis token");
            events.push(Event::new(
                EventKind::TokenCreate,
                owner,
                "nexus",
                info.symbol.clone().into_bytes(),
            ));
        }

        for balance in &genesis.balances {
            let address = parse_address(&balance.address)?;
            let info = registry::token(&changes, &balance.symbol)?;
            if !info.is_fungible() {
                return Err(RuntimeError::Genesis(format!(
                    "{} is not fungible",
                    balance.symbol
                )));
            }
            let amount = u128::from(balance.amount);
            ledger::add_supply(&mut changes, &info, amount)?;
            ledger::credit(&mut changes, &balance.symbol, &address, amount)?;
            let data = TokenEventData::new(balance.symbol.as_str(), i128::from(balance.amount), chain_name.as_str());
            events.push(Event::new(
                EventKind::TokenMint,
                address,
                balance.symbol.as_str(),
                data.to_bytes(),
            ));
        }

        for org in &genesis.organizations {
            let info = OrganizationInfo::new(org.id.as_str(), org.name.as_str(), Vec::new());
            registry::create_organization(&mut changes, &info, &owner)?;
            events.push(Event::new(
                EventKind::OrganizationCreate,
                owner,
                "nexus",
                info.id.clone().into_bytes(),
            ));
            for member in &org.members {
                let member = parse_address(member)?;
                registry::add_member(&mut changes, &org.id, &member)?;
                events.push(Event::new(
                    EventKind::OrganizationAdd,
                    info.address,
                    "nexus",
                    member.as_bytes().to_vec(),
                ));
            }
        }

        if genesis.validators.len() > self.config.max_validators {
            return Err(RuntimeError::Genesis(format!(
                "{} validators, at most {} allowed",
                genesis.validators.len(),
                self.config.max_validators
            )));
        }
        let mut validators = Vec::with_capacity(genesis.validators.len());
        for validator in &genesis.validators {
            let address = parse_address(validator)?;
            validators.push(ValidatorEntry {
                address,
                election: genesis.timestamp,
                kind: ValidatorType::Primary,
            });
            events.push(Event::new(
                EventKind::ValidatorElect,
                address,
                NativeContractKind::Validator.name(),
                Vec::new(),
            ));
        }
        registry::set_validators(&mut changes, &validators, self.config.primary_validators)?;

        let mut block = Block::new(
            1,
            self.root.address(),
            genesis.timestamp,
            Hash::ZERO,
            self.config.protocol_version,
            public_key_to_address(key.verifying_key()),
            Vec::new(),
        );
        for event in events {
            block.notify_block(event)?;
        }
        registry::set_genesis_hash(&mut changes, &block.hash())?;
        block.sign(key)?;

        let batch = changes.into_batch();
        let hash = self.root.add_block(&block, &[], batch)?;
        info!(
            nexus = %self.config.name,
            hash = %hash,
            tokens = genesis.tokens.len(),
            validators = validators.len(),
            "genesis block committed"
        );
        Ok(block)
    }
}

impl NexusView for Nexus {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn config(&self) -> &NexusConfig {
        &self.config
    }

    fn root_storage(&self) -> &dyn StorageReader {
        self.root.storage()
    }
}
