//! Contract ABI descriptors

use strata_primitives::{BinaryReader, BinaryWriter, CodecError, CodecResult, Serializable};

/// Type tag of a VM value, also used to describe ABI parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum VmType {
    /// No value
    #[default]
    None = 0,
    /// Ordered key/value structure
    Struct = 1,
    /// Raw bytes
    Bytes = 2,
    /// Arbitrary signed integer
    Number = 3,
    /// UTF-8 string
    String = 4,
    /// Unix timestamp
    Timestamp = 5,
    /// Boolean
    Bool = 6,
    /// Enumeration value
    Enum = 7,
    /// Opaque object (address, hash, context)
    Object = 8,
}

impl VmType {
    /// Decode a type tag
    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::None,
            1 => Self::Struct,
            2 => Self::Bytes,
            3 => Self::Number,
            4 => Self::String,
            5 => Self::Timestamp,
            6 => Self::Bool,
            7 => Self::Enum,
            8 => Self::Object,
            _ => return None,
        })
    }
}

impl Serializable for VmType {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u8(*self as u8);
    }

    fn unserialize(reader: &mut BinaryReader<'_>) -> CodecResult<Self> {
        let tag = reader.read_u8()?;
        Self::from_u8(tag).ok_or_else(|| CodecError::InvalidData(format!("vm type {tag}")))
    }
}

/// Named, typed method parameter
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractParameter {
    /// Parameter name
    pub name: String,
    /// Expected value type
    pub vm_type: VmType,
}

impl ContractParameter {
    /// Create a parameter descriptor
    pub fn new(name: impl Into<String>, vm_type: VmType) -> Self {
        Self {
            name: name.into(),
            vm_type,
        }
    }
}

impl Serializable for ContractParameter {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_string(&self.name);
        writer.write(&self.vm_type);
    }

    fn unserialize(reader: &mut BinaryReader<'_>) -> CodecResult<Self> {
        Ok(Self {
            name: reader.read_string()?,
            vm_type: reader.read()?,
        })
    }
}

/// A callable method of a contract
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractMethod {
    /// Method name
    pub name: String,
    /// Return type
    pub return_type: VmType,
    /// Entry offset inside the contract script, -1 for native handlers
    pub offset: i32,
    /// Parameters in call order
    pub parameters: Vec<ContractParameter>,
}

impl ContractMethod {
    /// Create a method descriptor
    pub fn new(
        name: impl Into<String>,
        return_type: VmType,
        offset: i32,
        parameters: Vec<ContractParameter>,
    ) -> Self {
        Self {
            name: name.into(),
            return_type,
            offset,
            parameters,
        }
    }

    /// Check that argument types match the parameter list
    pub fn accepts(&self, args: &[VmType]) -> bool {
        self.parameters.len() == args.len()
            && self
                .parameters
                .iter()
                .zip(args)
                .all(|(param, arg)| param.vm_type == VmType::None || param.vm_type == *arg)
    }
}

impl Serializable for ContractMethod {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_string(&self.name);
        writer.write(&self.return_type);
        writer.write_u32(self.offset as u32);
        writer.write_list(&self.parameters);
    }

    fn unserialize(reader: &mut BinaryReader<'_>) -> CodecResult<Self> {
        Ok(Self {
            name: reader.read_string()?,
            return_type: reader.read()?,
            offset: reader.read_u32()? as i32,
            parameters: reader.read_list()?,
        })
    }
}

/// Method table of a contract
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ContractAbi {
    /// Methods in declaration order
    pub methods: Vec<ContractMethod>,
}

impl ContractAbi {
    /// Create an ABI from a method list
    pub fn new(methods: Vec<ContractMethod>) -> Self {
        Self { methods }
    }

    /// Find a method by name, ignoring case
    pub fn find_method(&self, name: &str) -> Option<&ContractMethod> {
        self.methods
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name))
    }

    /// Check whether a method is declared
    pub fn has_method(&self, name: &str) -> bool {
        self.find_method(name).is_some()
    }

    /// Check whether the ABI declares no methods
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl Serializable for ContractAbi {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_list(&self.methods);
    }

    fn unserialize(reader: &mut BinaryReader<'_>) -> CodecResult<Self> {
        Ok(Self {
            methods: reader.read_list()?,
        })
    }
}
