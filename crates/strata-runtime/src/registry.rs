//! Nexus registry layout.
//!
//! Everything that must agree across chains lives in the root chain's
//! storage under `.nexus.*`: tokens and their series, organizations and
//! their members, external platforms, the chain tree, the protocol version
//! and the validator set. The functions here are the only code that knows
//! the layout; they read through any [`StorageReader`] and write through a
//! [`StorageContext`], so the same code serves genesis, block processing
//! and queries.

use strata_primitives::{Address, BinaryReader, BinaryWriter, Hash, Serializable};
use strata_storage::{field_key, StorageContext, StorageList, StorageMap, StorageReader, StorageSet};
use strata_types::{
    OrganizationInfo, PlatformInfo, PlatformSwapAddress, TokenFlags, TokenInfo, TokenSeries,
    ValidatorEntry, ValidatorType,
};

use crate::error::{RuntimeError, RuntimeResult};

const NEXUS: &str = "nexus";

fn tokens() -> StorageMap {
    StorageMap::field(NEXUS, "tokens")
}

fn series(symbol: &str) -> StorageMap {
    StorageMap::field(NEXUS, &format!("series.{symbol}"))
}

fn organizations() -> StorageMap {
    StorageMap::field(NEXUS, "orgs")
}

fn organization_addresses() -> StorageMap {
    StorageMap::field(NEXUS, "org_addresses")
}

fn organization_creators() -> StorageMap {
    StorageMap::field(NEXUS, "org_creators")
}

fn members(id: &str) -> StorageSet {
    StorageSet::field(NEXUS, &format!("members.{id}"))
}

fn platforms() -> StorageMap {
    StorageMap::field(NEXUS, "platforms")
}

fn chains() -> StorageMap {
    StorageMap::field(NEXUS, "chains")
}

fn validators() -> StorageList {
    StorageList::field("validator", "validators")
}

/// Check a token symbol: 1 to 8 uppercase letters or digits, starting with a letter
pub fn validate_symbol(symbol: &str) -> RuntimeResult<()> {
    let valid = (1..=8).contains(&symbol.len())
        && symbol.starts_with(|c: char| c.is_ascii_uppercase())
        && symbol.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(RuntimeError::Invalid(format!("token symbol {symbol:?}")))
    }
}

/// Check a chain, contract or organization name: 3 to 64 lowercase
/// letters, digits or underscores, starting with a letter
pub fn validate_name(name: &str) -> RuntimeResult<()> {
    let valid = (3..=64).contains(&name.len())
        && name.starts_with(|c: char| c.is_ascii_lowercase())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(RuntimeError::Invalid(format!("name {name:?}")))
    }
}

// Tokens

/// Token by symbol, if registered
pub fn get_token<S: StorageReader + ?Sized>(storage: &S, symbol: &str) -> RuntimeResult<Option<TokenInfo>> {
    Ok(tokens().get_value(storage, symbol.as_bytes())?)
}

/// Token by symbol
pub fn token<S: StorageReader + ?Sized>(storage: &S, symbol: &str) -> RuntimeResult<TokenInfo> {
    get_token(storage, symbol)?.ok_or_else(|| RuntimeError::UnknownToken(symbol.to_string()))
}

/// Whether `symbol` is registered
pub fn token_exists<S: StorageReader + ?Sized>(storage: &S, symbol: &str) -> RuntimeResult<bool> {
    Ok(tokens().contains(storage, symbol.as_bytes())?)
}

/// Registered symbols, ordered
pub fn token_symbols<S: StorageReader + ?Sized>(storage: &S) -> RuntimeResult<Vec<String>> {
    Ok(tokens()
        .keys(storage)?
        .into_iter()
        .map(|k| String::from_utf8_lossy(&k).into_owned())
        .collect())
}

/// Register a token after checking its flag combination
pub fn create_token<S: StorageContext + ?Sized>(storage: &mut S, info: &TokenInfo) -> RuntimeResult<()> {
    validate_symbol(&info.symbol)?;
    if info.name.is_empty() {
        return Err(RuntimeError::Invalid("token name".into()));
    }
    if token_exists(storage, &info.symbol)? {
        return Err(RuntimeError::Duplicate {
            kind: "token",
            name: info.symbol.clone(),
        });
    }
    if info.is_finite() != (info.max_supply > 0) {
        return Err(RuntimeError::Invalid(format!(
            "max supply {} for {} token",
            info.max_supply,
            if info.is_finite() { "finite" } else { "infinite" }
        )));
    }
    if info.has(TokenFlags::DIVISIBLE) != (info.decimals > 0) {
        return Err(RuntimeError::Invalid(format!("decimals {} for {}", info.decimals, info.symbol)));
    }
    if !info.is_fungible() && info.has(TokenFlags::DIVISIBLE) {
        return Err(RuntimeError::Invalid("divisible non-fungible token".into()));
    }
    if !info.abi.is_empty() && !info.has_script() {
        return Err(RuntimeError::Invalid("token ABI without script".into()));
    }
    tokens().set_value(storage, info.symbol.as_bytes(), info)?;
    Ok(())
}

/// Series `series_id` of `symbol`, if created
pub fn get_series<S: StorageReader + ?Sized>(
    storage: &S,
    symbol: &str,
    series_id: u32,
) -> RuntimeResult<Option<TokenSeries>> {
    Ok(series(symbol).get_value(storage, &series_id.to_be_bytes())?)
}

/// Store a series, replacing any previous state
pub fn set_series<S: StorageContext + ?Sized>(
    storage: &mut S,
    symbol: &str,
    value: &TokenSeries,
) -> RuntimeResult<()> {
    series(symbol).set_value(storage, &value.series_id.to_be_bytes(), value)?;
    Ok(())
}

/// Create a new series; ids are unique per token
pub fn create_series<S: StorageContext + ?Sized>(
    storage: &mut S,
    symbol: &str,
    value: &TokenSeries,
) -> RuntimeResult<()> {
    let info = token(storage, symbol)?;
    if info.is_fungible() {
        return Err(RuntimeError::TokenMustNotBeFungible);
    }
    if get_series(storage, symbol, value.series_id)?.is_some() {
        return Err(RuntimeError::Duplicate {
            kind: "series",
            name: format!("{symbol}/{}", value.series_id),
        });
    }
    set_series(storage, symbol, value)
}

// Organizations

/// Organization by id, if registered
pub fn get_organization<S: StorageReader + ?Sized>(
    storage: &S,
    id: &str,
) -> RuntimeResult<Option<OrganizationInfo>> {
    Ok(organizations().get_value(storage, id.as_bytes())?)
}

/// Organization by id
pub fn organization<S: StorageReader + ?Sized>(storage: &S, id: &str) -> RuntimeResult<OrganizationInfo> {
    get_organization(storage, id)?.ok_or_else(|| RuntimeError::UnknownOrganization(id.to_string()))
}

/// Organization acting as `address`, if any
pub fn organization_by_address<S: StorageReader + ?Sized>(
    storage: &S,
    address: &Address,
) -> RuntimeResult<Option<OrganizationInfo>> {
    match organization_addresses().get(storage, address.as_bytes())? {
        Some(id) => get_organization(storage, &String::from_utf8_lossy(&id)),
        None => Ok(None),
    }
}

/// Register an organization created by `creator`
pub fn create_organization<S: StorageContext + ?Sized>(
    storage: &mut S,
    info: &OrganizationInfo,
    creator: &Address,
) -> RuntimeResult<()> {
    validate_name(&info.id)?;
    if organizations().contains(storage, info.id.as_bytes())? {
        return Err(RuntimeError::Duplicate {
            kind: "organization",
            name: info.id.clone(),
        });
    }
    organizations().set_value(storage, info.id.as_bytes(), info)?;
    organization_addresses().set(storage, info.address.as_bytes(), info.id.as_bytes().to_vec())?;
    organization_creators().set(storage, info.id.as_bytes(), creator.as_bytes().to_vec())?;
    Ok(())
}

/// Address that created organization `id`
pub fn organization_creator<S: StorageReader + ?Sized>(storage: &S, id: &str) -> RuntimeResult<Address> {
    let bytes = organization_creators()
        .get(storage, id.as_bytes())?
        .ok_or_else(|| RuntimeError::UnknownOrganization(id.to_string()))?;
    Ok(Address::from_slice(&bytes).map_err(|e| RuntimeError::Invalid(e.to_string()))?)
}

/// Members of `id`, ordered by address
pub fn organization_members<S: StorageReader + ?Sized>(storage: &S, id: &str) -> RuntimeResult<Vec<Address>> {
    members(id)
        .items(storage)?
        .iter()
        .map(|bytes| Address::from_slice(bytes).map_err(|e| RuntimeError::Invalid(e.to_string())))
        .collect()
}

/// Whether `address` belongs to `id`
pub fn is_member<S: StorageReader + ?Sized>(storage: &S, id: &str, address: &Address) -> RuntimeResult<bool> {
    Ok(members(id).contains(storage, address.as_bytes())?)
}

/// Add a member; returns false if already present
pub fn add_member<S: StorageContext + ?Sized>(storage: &mut S, id: &str, address: &Address) -> RuntimeResult<bool> {
    organization(storage, id)?;
    Ok(members(id).add(storage, address.as_bytes())?)
}

/// Remove a member; returns false if absent
pub fn remove_member<S: StorageContext + ?Sized>(
    storage: &mut S,
    id: &str,
    address: &Address,
) -> RuntimeResult<bool> {
    organization(storage, id)?;
    Ok(members(id).remove(storage, address.as_bytes())?)
}

/// Whether `signers` form a strict majority of the members of `id`.
/// An organization without members has no witnesses.
pub fn is_organization_witness<S: StorageReader + ?Sized>(
    storage: &S,
    id: &str,
    signers: &[Address],
) -> RuntimeResult<bool> {
    let members = organization_members(storage, id)?;
    Ok(majority_signed(&members, signers))
}

/// Strict-majority rule over distinct member signatures
pub fn majority_signed(members: &[Address], signers: &[Address]) -> bool {
    if members.is_empty() {
        return false;
    }
    let signed = members.iter().filter(|m| signers.contains(m)).count();
    signed * 2 > members.len()
}

// Platforms

/// Platform by name, if registered
pub fn get_platform<S: StorageReader + ?Sized>(storage: &S, name: &str) -> RuntimeResult<Option<PlatformInfo>> {
    Ok(platforms().get_value(storage, name.as_bytes())?)
}

/// Registered platform names, ordered
pub fn platform_names<S: StorageReader + ?Sized>(storage: &S) -> RuntimeResult<Vec<String>> {
    Ok(platforms()
        .keys(storage)?
        .into_iter()
        .map(|k| String::from_utf8_lossy(&k).into_owned())
        .collect())
}

/// Register a platform; fails if the name is taken
pub fn create_platform<S: StorageContext + ?Sized>(
    storage: &mut S,
    name: &str,
    symbol: &str,
) -> RuntimeResult<PlatformInfo> {
    validate_name(name)?;
    validate_symbol(symbol)?;
    if platforms().contains(storage, name.as_bytes())? {
        return Err(RuntimeError::Duplicate {
            kind: "platform",
            name: name.to_string(),
        });
    }
    let info = PlatformInfo {
        name: name.to_string(),
        symbol: symbol.to_string(),
        addresses: Vec::new(),
    };
    platforms().set_value(storage, name.as_bytes(), &info)?;
    Ok(info)
}

/// Bind an external address of `platform` to a local interop address;
/// fails if the external address is already bound
pub fn register_platform_address<S: StorageContext + ?Sized>(
    storage: &mut S,
    platform: &str,
    external: &str,
    local: Address,
) -> RuntimeResult<()> {
    let mut info = get_platform(storage, platform)?
        .ok_or_else(|| RuntimeError::UnknownPlatform(platform.to_string()))?;
    if external.is_empty() {
        return Err(RuntimeError::Invalid("external address".into()));
    }
    if info.local_address(external).is_some() {
        return Err(RuntimeError::Duplicate {
            kind: "platform address",
            name: format!("{platform}/{external}"),
        });
    }
    info.addresses.push(PlatformSwapAddress {
        external: external.to_string(),
        local,
    });
    platforms().set_value(storage, platform.as_bytes(), &info)?;
    Ok(())
}

// Chains

/// Record of a chain in the tree
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainRecord {
    /// Chain name
    pub name: String,
    /// Parent chain, `None` for the root
    pub parent: Option<String>,
}

impl Serializable for ChainRecord {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_string(&self.name);
        writer.write_string(self.parent.as_deref().unwrap_or_default());
    }

    fn unserialize(reader: &mut BinaryReader<'_>) -> strata_primitives::CodecResult<Self> {
        let name = reader.read_string()?;
        let parent = reader.read_string()?;
        Ok(Self {
            name,
            parent: (!parent.is_empty()).then_some(parent),
        })
    }
}

/// Chain record by name
pub fn get_chain<S: StorageReader + ?Sized>(storage: &S, name: &str) -> RuntimeResult<Option<ChainRecord>> {
    Ok(chains().get_value(storage, name.as_bytes())?)
}

/// Registered chains, ordered by name
pub fn chain_records<S: StorageReader + ?Sized>(storage: &S) -> RuntimeResult<Vec<ChainRecord>> {
    chains()
        .entries(storage)?
        .iter()
        .map(|(_, v)| Ok(ChainRecord::from_bytes(v)?))
        .collect()
}

/// Register a chain under `parent`; the root is registered without one
pub fn create_chain<S: StorageContext + ?Sized>(
    storage: &mut S,
    name: &str,
    parent: Option<&str>,
) -> RuntimeResult<ChainRecord> {
    validate_name(name)?;
    if chains().contains(storage, name.as_bytes())? {
        return Err(RuntimeError::Duplicate {
            kind: "chain",
            name: name.to_string(),
        });
    }
    if let Some(parent) = parent {
        if get_chain(storage, parent)?.is_none() {
            return Err(RuntimeError::UnknownChain(parent.to_string()));
        }
    }
    let record = ChainRecord {
        name: name.to_string(),
        parent: parent.map(str::to_string),
    };
    chains().set_value(storage, name.as_bytes(), &record)?;
    Ok(record)
}

// Protocol, owner and genesis

/// Current protocol version, zero before genesis
pub fn protocol_version<S: StorageReader + ?Sized>(storage: &S) -> RuntimeResult<u32> {
    match storage.get(&field_key(NEXUS, "protocol"))? {
        Some(bytes) => Ok(BinaryReader::new(&bytes).read_u32()?),
        None => Ok(0),
    }
}

/// Set the protocol version
pub fn set_protocol_version<S: StorageContext + ?Sized>(storage: &mut S, version: u32) -> RuntimeResult<()> {
    storage.put(&field_key(NEXUS, "protocol"), version.to_le_bytes().to_vec())?;
    Ok(())
}

/// Address allowed to administer platforms and chains
pub fn owner<S: StorageReader + ?Sized>(storage: &S) -> RuntimeResult<Option<Address>> {
    match storage.get(&field_key(NEXUS, "owner"))? {
        Some(bytes) => Ok(Some(
            Address::from_slice(&bytes).map_err(|e| RuntimeError::Invalid(e.to_string()))?,
        )),
        None => Ok(None),
    }
}

/// Record the nexus owner
pub fn set_owner<S: StorageContext + ?Sized>(storage: &mut S, owner: &Address) -> RuntimeResult<()> {
    storage.put(&field_key(NEXUS, "owner"), owner.as_bytes().to_vec())?;
    Ok(())
}

/// Hash of the genesis block, if created
pub fn genesis_hash<S: StorageReader + ?Sized>(storage: &S) -> RuntimeResult<Option<Hash>> {
    match storage.get(&field_key(NEXUS, "genesis"))? {
        Some(bytes) => Ok(Some(
            Hash::from_slice(&bytes).map_err(|e| RuntimeError::Invalid(e.to_string()))?,
        )),
        None => Ok(None),
    }
}

/// Record the genesis block hash
pub fn set_genesis_hash<S: StorageContext + ?Sized>(storage: &mut S, hash: &Hash) -> RuntimeResult<()> {
    storage.put(&field_key(NEXUS, "genesis"), hash.as_bytes().to_vec())?;
    Ok(())
}

// Validators

/// Validator set in slot order; the first `primary_count` slots are primary
pub fn validator_entries<S: StorageReader + ?Sized>(storage: &S) -> RuntimeResult<Vec<ValidatorEntry>> {
    let list = validators();
    (0..list.len(storage)?)
        .map(|i| Ok(list.get_value(storage, i)?))
        .collect()
}

/// Tier of `address`, `Invalid` when it holds no slot
pub fn validator_type<S: StorageReader + ?Sized>(storage: &S, address: &Address) -> RuntimeResult<ValidatorType> {
    Ok(validator_entries(storage)?
        .into_iter()
        .find(|entry| entry.address == *address)
        .map(|entry| entry.kind)
        .unwrap_or(ValidatorType::Invalid))
}

/// Rewrite the validator set, assigning tiers by slot
pub fn set_validators<S: StorageContext + ?Sized>(
    storage: &mut S,
    entries: &[ValidatorEntry],
    primary_count: usize,
) -> RuntimeResult<()> {
    let list = validators();
    list.clear(storage)?;
    for (slot, entry) in entries.iter().enumerate() {
        let kind = if slot < primary_count {
            ValidatorType::Primary
        } else {
            ValidatorType::Secondary
        };
        let entry = ValidatorEntry {
            kind,
            ..entry.clone()
        };
        list.push(storage, entry.to_bytes())?;
    }
    Ok(())
}
