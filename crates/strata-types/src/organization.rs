//! Organization records

use strata_crypto::address_from_name;
use strata_primitives::{Address, BinaryReader, BinaryWriter, CodecResult, Serializable};

/// Registered organization. Members live in chain storage, not here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrganizationInfo {
    /// Unique id
    pub id: String,
    /// Display name
    pub name: String,
    /// Address derived from the id
    pub address: Address,
    /// Organization script
    pub script: Vec<u8>,
}

impl OrganizationInfo {
    /// Create an organization record; the address derives from `id`
    pub fn new(id: impl Into<String>, name: impl Into<String>, script: Vec<u8>) -> Self {
        let id = id.into();
        Self {
            address: address_from_name(&id),
            id,
            name: name.into(),
            script,
        }
    }
}

impl Serializable for OrganizationInfo {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_string(&self.id);
        writer.write_string(&self.name);
        writer.write_address(&self.address);
        writer.write_bytes(&self.script);
    }

    fn unserialize(reader: &mut BinaryReader<'_>) -> CodecResult<Self> {
        Ok(Self {
            id: reader.read_string()?,
            name: reader.read_string()?,
            address: reader.read_address()?,
            script: reader.read_bytes()?,
        })
    }
}
