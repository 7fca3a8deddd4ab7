//! External platforms and validator entries

use strata_primitives::{
    Address, BinaryReader, BinaryWriter, CodecError, CodecResult, Serializable, Timestamp,
};

/// Local address bound to an address on an external platform
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlatformSwapAddress {
    /// Address on the external platform
    pub external: String,
    /// Interop address standing in for it locally
    pub local: Address,
}

impl Serializable for PlatformSwapAddress {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_string(&self.external);
        writer.write_address(&self.local);
    }

    fn unserialize(reader: &mut BinaryReader<'_>) -> CodecResult<Self> {
        Ok(Self {
            external: reader.read_string()?,
            local: reader.read_address()?,
        })
    }
}

/// Registered external platform
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlatformInfo {
    /// Platform name
    pub name: String,
    /// Native fuel symbol on the platform
    pub symbol: String,
    /// Registered interop addresses
    pub addresses: Vec<PlatformSwapAddress>,
}

impl PlatformInfo {
    /// Find the local address bound to an external one
    pub fn local_address(&self, external: &str) -> Option<Address> {
        self.addresses
            .iter()
            .find(|a| a.external == external)
            .map(|a| a.local)
    }
}

impl Serializable for PlatformInfo {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_string(&self.name);
        writer.write_string(&self.symbol);
        writer.write_list(&self.addresses);
    }

    fn unserialize(reader: &mut BinaryReader<'_>) -> CodecResult<Self> {
        Ok(Self {
            name: reader.read_string()?,
            symbol: reader.read_string()?,
            addresses: reader.read_list()?,
        })
    }
}

/// Tier of a validator
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ValidatorType {
    /// Not a validator
    #[default]
    Invalid = 0,
    /// Votes in consensus
    Primary = 1,
    /// Candidate
    Secondary = 2,
}

/// One slot of the validator set
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatorEntry {
    /// Validator address
    pub address: Address,
    /// Election time
    pub election: Timestamp,
    /// Tier
    pub kind: ValidatorType,
}

impl Serializable for ValidatorEntry {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_address(&self.address);
        writer.write_u32(self.election);
        writer.write_u8(self.kind as u8);
    }

    fn unserialize(reader: &mut BinaryReader<'_>) -> CodecResult<Self> {
        let address = reader.read_address()?;
        let election = reader.read_u32()?;
        let kind = match reader.read_u8()? {
            0 => ValidatorType::Invalid,
            1 => ValidatorType::Primary,
            2 => ValidatorType::Secondary,
            other => return Err(CodecError::InvalidData(format!("validator type {other}"))),
        };
        Ok(Self {
            address,
            election,
            kind,
        })
    }
}
