//! Deployed contract registry of a chain

use strata_primitives::{Address, BinaryReader, BinaryWriter, CodecResult, Serializable};
use strata_storage::{StorageContext, StorageMap, StorageReader};
use strata_types::ContractAbi;

use crate::error::{RuntimeError, RuntimeResult};
use crate::native::{contract_address, NativeContractKind};
use crate::registry::validate_name;

/// Names whose storage namespace belongs to the runtime itself
const RESERVED_NAMES: [&str; 4] = ["chain", "nexus", "ledger", "entry"];

fn contracts() -> StorageMap {
    StorageMap::field("chain", "contracts")
}

/// A deployed bytecode contract
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractRecord {
    /// Contract name, also the context name
    pub name: String,
    /// Address allowed to upgrade or kill it
    pub owner: Address,
    /// Bytecode
    pub script: Vec<u8>,
    /// Method table
    pub abi: ContractAbi,
    /// Killed contracts keep their name and address but never run again
    pub killed: bool,
}

impl ContractRecord {
    /// Address the contract acts as
    pub fn address(&self) -> Address {
        contract_address(&self.name)
    }
}

impl Serializable for ContractRecord {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_string(&self.name);
        writer.write_address(&self.owner);
        writer.write_bytes(&self.script);
        writer.write(&self.abi);
        writer.write_bool(self.killed);
    }

    fn unserialize(reader: &mut BinaryReader<'_>) -> CodecResult<Self> {
        Ok(Self {
            name: reader.read_string()?,
            owner: reader.read_address()?,
            script: reader.read_bytes()?,
            abi: reader.read()?,
            killed: reader.read_bool()?,
        })
    }
}

/// Contract by name, killed ones included
pub fn get_contract<S: StorageReader + ?Sized>(storage: &S, name: &str) -> RuntimeResult<Option<ContractRecord>> {
    Ok(contracts().get_value(storage, name.as_bytes())?)
}

/// Names of every deployed contract
pub fn contract_names<S: StorageReader + ?Sized>(storage: &S) -> RuntimeResult<Vec<String>> {
    Ok(contracts()
        .keys(storage)?
        .into_iter()
        .map(|k| String::from_utf8_lossy(&k).into_owned())
        .collect())
}

/// Deploy a new contract. Fails if the name belongs to a native contract
/// or was ever deployed before.
pub fn deploy_contract<S: StorageContext + ?Sized>(storage: &mut S, record: &ContractRecord) -> RuntimeResult<()> {
    validate_name(&record.name)?;
    if NativeContractKind::from_name(&record.name).is_some()
        || RESERVED_NAMES.contains(&record.name.as_str())
        || get_contract(storage, &record.name)?.is_some()
    {
        return Err(RuntimeError::Duplicate {
            kind: "contract",
            name: record.name.clone(),
        });
    }
    if record.script.is_empty() {
        return Err(RuntimeError::Invalid(format!("empty script for {}", record.name)));
    }
    contracts().set_value(storage, record.name.as_bytes(), record)?;
    Ok(())
}

fn owned_live_contract<S: StorageReader + ?Sized>(
    storage: &S,
    name: &str,
    caller: &Address,
) -> RuntimeResult<ContractRecord> {
    let record = get_contract(storage, name)?.ok_or_else(|| RuntimeError::UnknownContract(name.to_string()))?;
    if record.killed {
        return Err(RuntimeError::UnknownContract(name.to_string()));
    }
    if record.owner != *caller {
        return Err(RuntimeError::NotAuthorized(format!("{caller} does not own {name}")));
    }
    Ok(record)
}

/// Swap the script and ABI of a live contract; name, address and storage stay
pub fn upgrade_contract<S: StorageContext + ?Sized>(
    storage: &mut S,
    name: &str,
    caller: &Address,
    script: Vec<u8>,
    abi: ContractAbi,
) -> RuntimeResult<ContractRecord> {
    let mut record = owned_live_contract(storage, name, caller)?;
    if script.is_empty() {
        return Err(RuntimeError::Invalid(format!("empty script for {name}")));
    }
    record.script = script;
    record.abi = abi;
    contracts().set_value(storage, name.as_bytes(), &record)?;
    Ok(record)
}

/// Permanently disable a contract
pub fn kill_contract<S: StorageContext + ?Sized>(storage: &mut S, name: &str, caller: &Address) -> RuntimeResult<()> {
    let mut record = owned_live_contract(storage, name, caller)?;
    record.killed = true;
    record.script.clear();
    contracts().set_value(storage, name.as_bytes(), &record)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_crypto::address_from_name;
    use strata_storage::{MemoryStore, StorageChangeSet};

    fn record(name: &str, owner: Address) -> ContractRecord {
        ContractRecord {
            name: name.into(),
            owner,
            script: vec![0],
            abi: ContractAbi::default(),
            killed: false,
        }
    }

    #[test]
    fn test_deploy_rejects_taken_names() {
        let store = MemoryStore::new();
        let mut changes = StorageChangeSet::new(&store);
        let owner = address_from_name("owner");
        deploy_contract(&mut changes, &record("dex", owner)).unwrap();
        assert!(deploy_contract(&mut changes, &record("dex", owner)).is_err());
        assert!(deploy_contract(&mut changes, &record("gas", owner)).is_err());
        assert!(deploy_contract(&mut changes, &record("ledger", owner)).is_err());
        assert_eq!(contract_names(&changes).unwrap(), vec!["dex"]);
    }

    #[test]
    fn test_upgrade_keeps_address() {
        let store = MemoryStore::new();
        let mut changes = StorageChangeSet::new(&store);
        let owner = address_from_name("owner");
        deploy_contract(&mut changes, &record("dex", owner)).unwrap();
        let before = get_contract(&changes, "dex").unwrap().unwrap().address();

        let stranger = address_from_name("stranger");
        assert!(upgrade_contract(&mut changes, "dex", &stranger, vec![1], ContractAbi::default()).is_err());

        let upgraded = upgrade_contract(&mut changes, "dex", &owner, vec![1, 2], ContractAbi::default()).unwrap();
        assert_eq!(upgraded.address(), before);
        assert_eq!(upgraded.script, vec![1, 2]);
    }

    #[test]
    fn test_killed_contract_stays_dead() {
        let store = MemoryStore::new();
        let mut changes = StorageChangeSet::new(&store);
        let owner = address_from_name("owner");
        deploy_contract(&mut changes, &record("dex", owner)).unwrap();
        kill_contract(&mut changes, "dex", &owner).unwrap();

        assert!(get_contract(&changes, "dex").unwrap().unwrap().killed);
        assert!(deploy_contract(&mut changes, &record("dex", owner)).is_err());
        assert!(upgrade_contract(&mut changes, "dex", &owner, vec![1], ContractAbi::default()).is_err());
    }
}
