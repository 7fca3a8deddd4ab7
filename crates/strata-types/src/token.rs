//! Tokens, token series and NFT content

use bitflags::bitflags;
use strata_primitives::{
    Address, BinaryReader, BinaryWriter, CodecError, CodecResult, Serializable, Timestamp,
};

use crate::ContractAbi;

bitflags! {
    /// Token capabilities, fixed at creation
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct TokenFlags: u32 {
        /// Can move between addresses
        const TRANSFERABLE = 1 << 0;
        /// Units are interchangeable balances
        const FUNGIBLE = 1 << 1;
        /// Supply is capped by `max_supply`
        const FINITE = 1 << 2;
        /// Has fractional units
        const DIVISIBLE = 1 << 3;
        /// Can be staked
        const STAKABLE = 1 << 5;
        /// Can be swapped across platforms
        const SWAPPABLE = 1 << 7;
        /// Can be burned
        const BURNABLE = 1 << 8;
        /// Can be minted after creation
        const MINTABLE = 1 << 9;
    }
}

impl TokenFlags {
    /// Parse a single flag name, ignoring case
    pub fn parse_name(name: &str) -> Option<Self> {
        Self::all()
            .iter_names()
            .find(|(flag, _)| flag.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }
}

/// Registered token
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenInfo {
    /// Unique symbol
    pub symbol: String,
    /// Display name
    pub name: String,
    /// Creator and default minter
    pub owner: Address,
    /// Supply cap, zero when not finite
    pub max_supply: u128,
    /// Decimal places, zero when not divisible
    pub decimals: u32,
    /// Capabilities
    pub flags: TokenFlags,
    /// Trigger script
    pub script: Vec<u8>,
    /// Trigger ABI
    pub abi: ContractAbi,
}

impl TokenInfo {
    /// Whether all of `flags` are set
    pub fn has(&self, flags: TokenFlags) -> bool {
        self.flags.contains(flags)
    }

    /// Whether this token is fungible
    pub fn is_fungible(&self) -> bool {
        self.has(TokenFlags::FUNGIBLE)
    }

    /// Whether this token can be transferred
    pub fn is_transferable(&self) -> bool {
        self.has(TokenFlags::TRANSFERABLE)
    }

    /// Whether supply is capped
    pub fn is_finite(&self) -> bool {
        self.has(TokenFlags::FINITE)
    }

    /// Whether the token carries a trigger script
    pub fn has_script(&self) -> bool {
        !self.script.is_empty()
    }
}

impl Serializable for TokenInfo {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_string(&self.symbol);
        writer.write_string(&self.name);
        writer.write_address(&self.owner);
        writer.write_bigint(self.max_supply as i128);
        writer.write_u32(self.decimals);
        writer.write_u32(self.flags.bits());
        writer.write_bytes(&self.script);
        writer.write(&self.abi);
    }

    fn unserialize(reader: &mut BinaryReader<'_>) -> CodecResult<Self> {
        let symbol = reader.read_string()?;
        let name = reader.read_string()?;
        let owner = reader.read_address()?;
        let max_supply = reader.read_bigint()?;
        if max_supply < 0 {
            return Err(CodecError::InvalidData("negative max supply".into()));
        }
        let decimals = reader.read_u32()?;
        let bits = reader.read_u32()?;
        let flags = TokenFlags::from_bits(bits)
            .ok_or_else(|| CodecError::InvalidData(format!("token flags {bits:#x}")))?;
        Ok(Self {
            symbol,
            name,
            owner,
            max_supply: max_supply as u128,
            decimals,
            flags,
            script: reader.read_bytes()?,
            abi: reader.read()?,
        })
    }
}

/// How a series assigns ROM to minted items
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TokenSeriesMode {
    /// Every mint has its own ROM
    #[default]
    Unique = 0,
    /// Mints share the series ROM
    Duplicated = 1,
}

/// A numbered group of NFTs under one token
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenSeries {
    /// Series id, unique per token
    pub series_id: u32,
    /// Items minted so far
    pub mint_count: u32,
    /// Cap on items, zero for unlimited
    pub max_supply: u32,
    /// ROM assignment mode
    pub mode: TokenSeriesMode,
    /// Per-series script
    pub script: Vec<u8>,
    /// Per-series ABI
    pub abi: ContractAbi,
    /// ROM shared by duplicated series
    pub rom: Vec<u8>,
}

impl TokenSeries {
    /// Create an empty series
    pub fn new(series_id: u32, max_supply: u32, mode: TokenSeriesMode) -> Self {
        Self {
            series_id,
            mint_count: 0,
            max_supply,
            mode,
            script: Vec::new(),
            abi: ContractAbi::default(),
            rom: Vec::new(),
        }
    }

    /// Whether another item can be minted
    pub fn can_mint(&self) -> bool {
        self.max_supply == 0 || self.mint_count < self.max_supply
    }
}

impl Serializable for TokenSeries {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u32(self.series_id);
        writer.write_u32(self.mint_count);
        writer.write_u32(self.max_supply);
        writer.write_u8(self.mode as u8);
        writer.write_bytes(&self.script);
        writer.write(&self.abi);
        writer.write_bytes(&self.rom);
    }

    fn unserialize(reader: &mut BinaryReader<'_>) -> CodecResult<Self> {
        let series_id = reader.read_u32()?;
        let mint_count = reader.read_u32()?;
        let max_supply = reader.read_u32()?;
        let mode = match reader.read_u8()? {
            0 => TokenSeriesMode::Unique,
            1 => TokenSeriesMode::Duplicated,
            other => return Err(CodecError::InvalidData(format!("series mode {other}"))),
        };
        Ok(Self {
            series_id,
            mint_count,
            max_supply,
            mode,
            script: reader.read_bytes()?,
            abi: reader.read()?,
            rom: reader.read_bytes()?,
        })
    }
}

/// An asset infused into an NFT
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenInfusion {
    /// Symbol of the infused token
    pub symbol: String,
    /// Amount for fungible tokens, token id for NFTs
    pub value: u128,
}

impl Serializable for TokenInfusion {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_string(&self.symbol);
        writer.write_bigint(self.value as i128);
    }

    fn unserialize(reader: &mut BinaryReader<'_>) -> CodecResult<Self> {
        let symbol = reader.read_string()?;
        let value = reader.read_bigint()?;
        if value < 0 {
            return Err(CodecError::InvalidData("negative infusion".into()));
        }
        Ok(Self {
            symbol,
            value: value as u128,
        })
    }
}

/// Content of a single NFT
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenContent {
    /// Token id
    pub token_id: u128,
    /// Series the item belongs to
    pub series_id: u32,
    /// Sequence number within the series
    pub mint_id: u32,
    /// Current owner
    pub owner: Address,
    /// Address that minted it
    pub creator: Address,
    /// Chain currently holding the item
    pub current_chain: String,
    /// Immutable data
    pub rom: Vec<u8>,
    /// Mutable data
    pub ram: Vec<u8>,
    /// Infused assets, only grows until burn
    pub infusion: Vec<TokenInfusion>,
    /// Mint time
    pub timestamp: Timestamp,
}

impl Serializable for TokenContent {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_bigint(self.token_id as i128);
        writer.write_u32(self.series_id);
        writer.write_u32(self.mint_id);
        writer.write_address(&self.owner);
        writer.write_address(&self.creator);
        writer.write_string(&self.current_chain);
        writer.write_bytes(&self.rom);
        writer.write_bytes(&self.ram);
        writer.write_list(&self.infusion);
        writer.write_u32(self.timestamp);
    }

    fn unserialize(reader: &mut BinaryReader<'_>) -> CodecResult<Self> {
        let token_id = reader.read_bigint()?;
        if token_id < 0 {
            return Err(CodecError::InvalidData("negative token id".into()));
        }
        Ok(Self {
            token_id: token_id as u128,
            series_id: reader.read_u32()?,
            mint_id: reader.read_u32()?,
            owner: reader.read_address()?,
            creator: reader.read_address()?,
            current_chain: reader.read_string()?,
            rom: reader.read_bytes()?,
            ram: reader.read_bytes()?,
            infusion: reader.read_list()?,
            timestamp: reader.read_u32()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContractMethod, VmType};
    use strata_primitives::AddressKind;

    #[test]
    fn test_flag_names() {
        assert_eq!(TokenFlags::parse_name("fungible"), Some(TokenFlags::FUNGIBLE));
        assert_eq!(TokenFlags::parse_name("Transferable"), Some(TokenFlags::TRANSFERABLE));
        assert_eq!(TokenFlags::parse_name("MINTABLE"), Some(TokenFlags::MINTABLE));
        assert_eq!(TokenFlags::parse_name("flying"), None);
        // the exact-case lookup generated by bitflags stays available
        assert_eq!(TokenFlags::from_name("FUNGIBLE"), Some(TokenFlags::FUNGIBLE));
        assert_eq!(TokenFlags::from_name("fungible"), None);
    }

    #[test]
    fn test_token_info_roundtrip() {
        let info = TokenInfo {
            symbol: "CROWN".into(),
            name: "Crown".into(),
            owner: Address::from_parts(AddressKind::User, [8; 32]),
            max_supply: 0,
            decimals: 0,
            flags: TokenFlags::TRANSFERABLE | TokenFlags::BURNABLE,
            script: vec![0x0b],
            abi: ContractAbi::new(vec![ContractMethod::new("OnMint", VmType::Bool, 0, vec![])]),
        };
        let decoded = TokenInfo::from_bytes(&info.to_bytes()).unwrap();
        assert_eq!(decoded, info);
        assert!(decoded.is_transferable());
        assert!(!decoded.is_fungible());
        assert!(decoded.has_script());
    }

    #[test]
    fn test_content_roundtrip_keeps_rom_and_ram() {
        let content = TokenContent {
            token_id: (1u128 << 100) + 7,
            series_id: 0,
            mint_id: 1,
            owner: Address::from_parts(AddressKind::User, [1; 32]),
            creator: Address::from_parts(AddressKind::User, [2; 32]),
            current_chain: "main".into(),
            rom: vec![1, 3, 3, 7],
            ram: vec![1, 4, 4, 6],
            infusion: vec![TokenInfusion {
                symbol: "SOUL".into(),
                value: 500,
            }],
            timestamp: 1_700_000_000,
        };
        let decoded = TokenContent::from_bytes(&content.to_bytes()).unwrap();
        assert_eq!(decoded, content);
        assert_eq!(decoded.rom, vec![1, 3, 3, 7]);
        assert_eq!(decoded.ram, vec![1, 4, 4, 6]);
    }

    #[test]
    fn test_series_supply() {
        let mut series = TokenSeries::new(1, 2, TokenSeriesMode::Duplicated);
        assert!(series.can_mint());
        series.mint_count = 2;
        assert!(!series.can_mint());
        assert!(TokenSeries::new(0, 0, TokenSeriesMode::Unique).can_mint());

        let decoded = TokenSeries::from_bytes(&series.to_bytes()).unwrap();
        assert_eq!(decoded, series);
    }
}
