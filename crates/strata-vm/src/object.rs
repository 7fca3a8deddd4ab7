//! VM value model

use std::collections::BTreeMap;
use std::fmt;

use strata_primitives::{
    Address, BinaryReader, BinaryWriter, CodecError, CodecResult, Hash, Serializable, Timestamp,
};
use strata_types::VmType;

use crate::error::{VmError, VmResult};

/// Nesting limit when decoding structs
const MAX_NESTING: usize = 32;

/// A value held in a register or on the stack
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VmObject {
    /// No value
    #[default]
    None,
    /// Ordered key/value structure
    Struct(BTreeMap<VmObject, VmObject>),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Signed integer
    Number(i128),
    /// UTF-8 string
    String(String),
    /// Unix timestamp
    Timestamp(Timestamp),
    /// Boolean
    Bool(bool),
    /// Enumeration value
    Enum(u32),
    /// Ledger address
    Address(Address),
    /// Digest
    Hash(Hash),
    /// Reference to an execution context by name
    Context(String),
}

/// Minimal little-endian two's complement encoding of a number
pub fn number_to_bytes(value: i128) -> Vec<u8> {
    let bytes = value.to_le_bytes();
    let mut len = bytes.len();
    while len > 1 {
        let top = bytes[len - 1];
        let next_sign = bytes[len - 2] & 0x80;
        if (top == 0x00 && next_sign == 0) || (top == 0xFF && next_sign != 0) {
            len -= 1;
        } else {
            break;
        }
    }
    bytes[..len].to_vec()
}

/// Decode a number written by [`number_to_bytes`]; empty input is zero
pub fn number_from_bytes(bytes: &[u8]) -> VmResult<i128> {
    if bytes.is_empty() {
        return Ok(0);
    }
    if bytes.len() > 16 {
        return Err(VmError::Arithmetic(format!(
            "number of {} bytes does not fit",
            bytes.len()
        )));
    }
    let fill = if bytes[bytes.len() - 1] & 0x80 != 0 { 0xFF } else { 0x00 };
    let mut buf = [fill; 16];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(i128::from_le_bytes(buf))
}

impl VmObject {
    /// Type tag of this value
    pub fn vm_type(&self) -> VmType {
        match self {
            VmObject::None => VmType::None,
            VmObject::Struct(_) => VmType::Struct,
            VmObject::Bytes(_) => VmType::Bytes,
            VmObject::Number(_) => VmType::Number,
            VmObject::String(_) => VmType::String,
            VmObject::Timestamp(_) => VmType::Timestamp,
            VmObject::Bool(_) => VmType::Bool,
            VmObject::Enum(_) => VmType::Enum,
            VmObject::Address(_) | VmObject::Hash(_) | VmObject::Context(_) => VmType::Object,
        }
    }

    /// Whether this is the empty value
    pub fn is_none(&self) -> bool {
        matches!(self, VmObject::None)
    }

    fn cast_error(&self, to: VmType) -> VmError {
        VmError::CastFailed {
            from: self.vm_type(),
            to,
        }
    }

    /// Numeric view
    pub fn as_number(&self) -> VmResult<i128> {
        match self {
            VmObject::Number(n) => Ok(*n),
            VmObject::Timestamp(t) => Ok(*t as i128),
            VmObject::Enum(e) => Ok(*e as i128),
            VmObject::Bool(b) => Ok(*b as i128),
            VmObject::String(s) => s.parse().map_err(|_| self.cast_error(VmType::Number)),
            VmObject::Bytes(b) => number_from_bytes(b),
            _ => Err(self.cast_error(VmType::Number)),
        }
    }

    /// Boolean view
    pub fn as_bool(&self) -> VmResult<bool> {
        match self {
            VmObject::Bool(b) => Ok(*b),
            VmObject::None => Ok(false),
            VmObject::Number(n) => Ok(*n != 0),
            VmObject::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
            VmObject::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
            VmObject::Bytes(b) if b.len() == 1 => Ok(b[0] != 0),
            _ => Err(self.cast_error(VmType::Bool)),
        }
    }

    /// String view
    pub fn as_string(&self) -> VmResult<String> {
        match self {
            VmObject::String(s) => Ok(s.clone()),
            VmObject::None => Ok(String::new()),
            VmObject::Number(n) => Ok(n.to_string()),
            VmObject::Timestamp(t) => Ok(t.to_string()),
            VmObject::Enum(e) => Ok(e.to_string()),
            VmObject::Bool(b) => Ok(b.to_string()),
            VmObject::Bytes(b) => {
                String::from_utf8(b.clone()).map_err(|_| self.cast_error(VmType::String))
            }
            VmObject::Address(a) => Ok(a.to_hex()),
            VmObject::Hash(h) => Ok(h.to_hex()),
            VmObject::Context(name) => Ok(name.clone()),
            VmObject::Struct(_) => Err(self.cast_error(VmType::String)),
        }
    }

    /// Byte view
    pub fn as_bytes(&self) -> VmResult<Vec<u8>> {
        Ok(self.raw_bytes())
    }

    fn raw_bytes(&self) -> Vec<u8> {
        match self {
            VmObject::None => Vec::new(),
            VmObject::Bytes(b) => b.clone(),
            VmObject::Number(n) => number_to_bytes(*n),
            VmObject::String(s) => s.as_bytes().to_vec(),
            VmObject::Timestamp(t) => t.to_le_bytes().to_vec(),
            VmObject::Enum(e) => e.to_le_bytes().to_vec(),
            VmObject::Bool(b) => vec![*b as u8],
            VmObject::Address(a) => a.as_bytes().to_vec(),
            VmObject::Hash(h) => h.as_bytes().to_vec(),
            VmObject::Context(name) => name.as_bytes().to_vec(),
            VmObject::Struct(_) => self.to_bytes(),
        }
    }

    /// Address view
    pub fn as_address(&self) -> VmResult<Address> {
        match self {
            VmObject::Address(a) => Ok(*a),
            VmObject::Bytes(b) => {
                Address::from_slice(b).map_err(|_| self.cast_error(VmType::Object))
            }
            VmObject::String(s) => Address::from_hex(s).map_err(|_| self.cast_error(VmType::Object)),
            _ => Err(self.cast_error(VmType::Object)),
        }
    }

    /// Hash view
    pub fn as_hash(&self) -> VmResult<Hash> {
        match self {
            VmObject::Hash(h) => Ok(*h),
            VmObject::Bytes(b) => Hash::from_slice(b).map_err(|_| self.cast_error(VmType::Object)),
            VmObject::String(s) => Hash::from_hex(s).map_err(|_| self.cast_error(VmType::Object)),
            _ => Err(self.cast_error(VmType::Object)),
        }
    }

    /// Timestamp view
    pub fn as_timestamp(&self) -> VmResult<Timestamp> {
        match self {
            VmObject::Timestamp(t) => Ok(*t),
            _ => {
                let n = self.as_number()?;
                Timestamp::try_from(n).map_err(|_| self.cast_error(VmType::Timestamp))
            }
        }
    }

    /// Struct view
    pub fn as_struct(&self) -> VmResult<&BTreeMap<VmObject, VmObject>> {
        match self {
            VmObject::Struct(fields) => Ok(fields),
            _ => Err(self.cast_error(VmType::Struct)),
        }
    }

    /// Field of a struct; missing fields read as `None`
    pub fn get_field(&self, key: &VmObject) -> VmResult<VmObject> {
        Ok(self.as_struct()?.get(key).cloned().unwrap_or_default())
    }

    /// Convert to another type
    pub fn cast(&self, target: VmType) -> VmResult<VmObject> {
        Ok(match target {
            VmType::None => VmObject::None,
            VmType::Bytes => VmObject::Bytes(self.as_bytes()?),
            VmType::Number => VmObject::Number(self.as_number()?),
            VmType::String => VmObject::String(self.as_string()?),
            VmType::Timestamp => VmObject::Timestamp(self.as_timestamp()?),
            VmType::Bool => VmObject::Bool(self.as_bool()?),
            VmType::Enum => {
                let n = self.as_number()?;
                VmObject::Enum(u32::try_from(n).map_err(|_| self.cast_error(target))?)
            }
            VmType::Struct => match self {
                VmObject::Struct(_) => self.clone(),
                VmObject::Bytes(b) => {
                    VmObject::from_bytes(b).map_err(|_| self.cast_error(target))?
                }
                _ => return Err(self.cast_error(target)),
            },
            VmType::Object => match self {
                VmObject::Address(_) | VmObject::Hash(_) | VmObject::Context(_) => self.clone(),
                VmObject::Bytes(b) if b.len() == Address::LEN => VmObject::Address(self.as_address()?),
                VmObject::Bytes(b) if b.len() == Hash::LEN => VmObject::Hash(self.as_hash()?),
                _ => return Err(self.cast_error(target)),
            },
        })
    }

    /// Decode the raw operand of a `LOAD` instruction
    pub fn from_load(vm_type: VmType, bytes: &[u8]) -> VmResult<VmObject> {
        let raw = VmObject::Bytes(bytes.to_vec());
        match vm_type {
            VmType::Timestamp => {
                let array: [u8; 4] = bytes
                    .try_into()
                    .map_err(|_| raw.cast_error(VmType::Timestamp))?;
                Ok(VmObject::Timestamp(u32::from_le_bytes(array)))
            }
            VmType::Enum => {
                let array: [u8; 4] = bytes.try_into().map_err(|_| raw.cast_error(VmType::Enum))?;
                Ok(VmObject::Enum(u32::from_le_bytes(array)))
            }
            VmType::String => Ok(VmObject::String(raw.as_string()?)),
            _ => raw.cast(vm_type),
        }
    }

    /// Type tag and raw operand for a `LOAD` instruction
    pub fn to_load(&self) -> (VmType, Vec<u8>) {
        let vm_type = match self {
            VmObject::Context(_) => VmType::String,
            _ => self.vm_type(),
        };
        (vm_type, self.raw_bytes())
    }

    fn tag(&self) -> u8 {
        match self {
            VmObject::None => 0,
            VmObject::Struct(_) => 1,
            VmObject::Bytes(_) => 2,
            VmObject::Number(_) => 3,
            VmObject::String(_) => 4,
            VmObject::Timestamp(_) => 5,
            VmObject::Bool(_) => 6,
            VmObject::Enum(_) => 7,
            VmObject::Address(_) => 8,
            VmObject::Hash(_) => 9,
            VmObject::Context(_) => 10,
        }
    }

    fn unserialize_nested(reader: &mut BinaryReader<'_>, depth: usize) -> CodecResult<Self> {
        if depth > MAX_NESTING {
            return Err(CodecError::InvalidData("struct nesting too deep".into()));
        }
        Ok(match reader.read_u8()? {
            0 => VmObject::None,
            1 => {
                let count = reader.read_len()?;
                let mut fields = BTreeMap::new();
                for _ in 0..count {
                    let key = Self::unserialize_nested(reader, depth + 1)?;
                    let value = Self::unserialize_nested(reader, depth + 1)?;
                    fields.insert(key, value);
                }
                VmObject::Struct(fields)
            }
            2 => VmObject::Bytes(reader.read_bytes()?),
            3 => VmObject::Number(reader.read_bigint()?),
            4 => VmObject::String(reader.read_string()?),
            5 => VmObject::Timestamp(reader.read_u32()?),
            6 => VmObject::Bool(reader.read_bool()?),
            7 => VmObject::Enum(reader.read_u32()?),
            8 => VmObject::Address(reader.read_address()?),
            9 => VmObject::Hash(reader.read_hash()?),
            10 => VmObject::Context(reader.read_string()?),
            other => return Err(CodecError::InvalidData(format!("object tag {other}"))),
        })
    }
}

impl Serializable for VmObject {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u8(self.tag());
        match self {
            VmObject::None => {}
            VmObject::Struct(fields) => {
                writer.write_varint(fields.len() as u64);
                for (key, value) in fields {
                    key.serialize(writer);
                    value.serialize(writer);
                }
            }
            VmObject::Bytes(b) => writer.write_bytes(b),
            VmObject::Number(n) => writer.write_bigint(*n),
            VmObject::String(s) => writer.write_string(s),
            VmObject::Timestamp(t) => writer.write_u32(*t),
            VmObject::Bool(b) => writer.write_bool(*b),
            VmObject::Enum(e) => writer.write_u32(*e),
            VmObject::Address(a) => writer.write_address(a),
            VmObject::Hash(h) => writer.write_hash(h),
            VmObject::Context(name) => writer.write_string(name),
        }
    }

    fn unserialize(reader: &mut BinaryReader<'_>) -> CodecResult<Self> {
        Self::unserialize_nested(reader, 0)
    }
}

impl fmt::Display for VmObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmObject::None => write!(f, "None"),
            VmObject::Struct(fields) => write!(f, "Struct({} fields)", fields.len()),
            VmObject::Bytes(b) => write!(f, "0x{}", hex_string(b)),
            VmObject::String(s) => write!(f, "{s:?}"),
            VmObject::Context(name) => write!(f, "Context({name})"),
            other => match other.as_string() {
                Ok(s) => write!(f, "{s}"),
                Err(_) => write!(f, "{other:?}"),
            },
        }
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl From<i128> for VmObject {
    fn from(value: i128) -> Self {
        VmObject::Number(value)
    }
}

impl From<u64> for VmObject {
    fn from(value: u64) -> Self {
        VmObject::Number(value as i128)
    }
}

impl From<bool> for VmObject {
    fn from(value: bool) -> Self {
        VmObject::Bool(value)
    }
}

impl From<&str> for VmObject {
    fn from(value: &str) -> Self {
        VmObject::String(value.to_string())
    }
}

impl From<String> for VmObject {
    fn from(value: String) -> Self {
        VmObject::String(value)
    }
}

impl From<Vec<u8>> for VmObject {
    fn from(value: Vec<u8>) -> Self {
        VmObject::Bytes(value)
    }
}

impl From<Address> for VmObject {
    fn from(value: Address) -> Self {
        VmObject::Address(value)
    }
}

impl From<Hash> for VmObject {
    fn from(value: Hash) -> Self {
        VmObject::Hash(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use strata_primitives::AddressKind;

    #[test]
    fn test_number_bytes() {
        assert_eq!(number_to_bytes(0), vec![0]);
        assert_eq!(number_to_bytes(127), vec![0x7f]);
        assert_eq!(number_to_bytes(128), vec![0x80, 0x00]);
        assert_eq!(number_to_bytes(-1), vec![0xff]);
        assert_eq!(number_from_bytes(&[]).unwrap(), 0);
        assert_eq!(number_from_bytes(&[0x80, 0x00]).unwrap(), 128);
        assert!(number_from_bytes(&[0u8; 17]).is_err());
    }

    #[test]
    fn test_casts() {
        assert_eq!(VmObject::from("42").cast(VmType::Number).unwrap(), VmObject::Number(42));
        assert_eq!(VmObject::Number(7).cast(VmType::String).unwrap(), VmObject::from("7"));
        assert_eq!(VmObject::Number(0).cast(VmType::Bool).unwrap(), VmObject::Bool(false));
        assert_eq!(VmObject::Number(9).cast(VmType::Timestamp).unwrap(), VmObject::Timestamp(9));
        assert!(VmObject::Number(-1).cast(VmType::Timestamp).is_err());
        assert!(VmObject::from("abc").cast(VmType::Number).is_err());

        let addr = Address::from_parts(AddressKind::User, [4; 32]);
        let bytes = VmObject::Address(addr).cast(VmType::Bytes).unwrap();
        assert_eq!(bytes.cast(VmType::Object).unwrap(), VmObject::Address(addr));
    }

    #[test]
    fn test_cast_failure_reports_types() {
        let err = VmObject::Bool(true).as_address().unwrap_err();
        assert_eq!(
            err,
            VmError::CastFailed {
                from: VmType::Bool,
                to: VmType::Object
            }
        );
    }

    #[test]
    fn test_load_operands() {
        for value in [
            VmObject::Number(-300),
            VmObject::from("hello"),
            VmObject::Bool(true),
            VmObject::Timestamp(1_700_000_000),
            VmObject::Enum(3),
            VmObject::Bytes(vec![1, 2, 3]),
            VmObject::Hash(Hash::from_bytes([2; 32])),
            VmObject::Address(Address::from_parts(AddressKind::System, [3; 32])),
        ] {
            let (vm_type, raw) = value.to_load();
            assert_eq!(VmObject::from_load(vm_type, &raw).unwrap(), value);
        }
    }

    #[test]
    fn test_struct_fields() {
        let mut fields = BTreeMap::new();
        fields.insert(VmObject::from("name"), VmObject::from("crown"));
        let obj = VmObject::Struct(fields);
        assert_eq!(obj.get_field(&VmObject::from("name")).unwrap(), VmObject::from("crown"));
        assert_eq!(obj.get_field(&VmObject::from("missing")).unwrap(), VmObject::None);
        assert!(VmObject::Number(1).get_field(&VmObject::None).is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let mut obj = VmObject::None;
        for _ in 0..40 {
            let mut fields = BTreeMap::new();
            fields.insert(VmObject::Number(0), obj);
            obj = VmObject::Struct(fields);
        }
        assert!(VmObject::from_bytes(&obj.to_bytes()).is_err());
    }

    fn leaf() -> impl Strategy<Value = VmObject> {
        prop_oneof![
            Just(VmObject::None),
            any::<i128>().prop_map(VmObject::Number),
            ".{0,12}".prop_map(VmObject::String),
            proptest::collection::vec(any::<u8>(), 0..24).prop_map(VmObject::Bytes),
            any::<bool>().prop_map(VmObject::Bool),
            any::<u32>().prop_map(VmObject::Timestamp),
        ]
    }

    proptest! {
        #[test]
        fn prop_object_codec_roundtrip(
            value in leaf().prop_recursive(3, 16, 4, |inner| {
                proptest::collection::btree_map(inner.clone(), inner, 0..4).prop_map(VmObject::Struct)
            })
        ) {
            prop_assert_eq!(VmObject::from_bytes(&value.to_bytes()).unwrap(), value);
        }
    }
}
