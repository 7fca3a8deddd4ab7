//! Events emitted by contracts during execution

use strata_primitives::{
    Address, BinaryReader, BinaryWriter, CodecError, CodecResult, Serializable,
};

/// Event kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventKind {
    /// Unclassified
    Unknown = 0,
    /// A chain was created
    ChainCreate = 1,
    /// A token was created
    TokenCreate = 2,
    /// Tokens left an address
    TokenSend = 3,
    /// Tokens arrived at an address
    TokenReceive = 4,
    /// Tokens were minted
    TokenMint = 5,
    /// Tokens were burned
    TokenBurn = 6,
    /// Tokens were staked
    TokenStake = 7,
    /// Staked tokens were released
    TokenClaim = 8,
    /// A name was registered for an address
    AddressRegister = 9,
    /// An organization was created
    OrganizationCreate = 10,
    /// A member joined an organization
    OrganizationAdd = 11,
    /// A member left an organization
    OrganizationRemove = 12,
    /// Gas allowance was reserved
    GasEscrow = 13,
    /// Gas was paid
    GasPayment = 14,
    /// A validator was elected
    ValidatorElect = 15,
    /// A validator was removed
    ValidatorRemove = 16,
    /// A platform was registered
    PlatformCreate = 17,
    /// A contract was deployed
    ContractDeploy = 18,
    /// A contract was upgraded
    ContractUpgrade = 19,
    /// A contract was killed
    ContractKill = 20,
    /// Free-form log line
    Log = 21,
    /// A chain task was started
    TaskStart = 22,
    /// A chain task was stopped
    TaskStop = 23,
    /// Assets were infused into an NFT
    Infusion = 24,
    /// A token series was created
    TokenSeriesCreate = 25,
    /// The protocol version changed
    ProtocolUpgrade = 26,
    /// A leaderboard was created
    LeaderboardCreate = 27,
    /// A leaderboard score was inserted
    LeaderboardInsert = 28,
    /// A leaderboard was reset
    LeaderboardReset = 29,
    /// A transaction faulted
    ExecutionFailure = 30,
    /// Contract-defined event
    Custom = 64,
}

impl EventKind {
    /// Decode an event kind tag
    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Unknown,
            1 => Self::ChainCreate,
            2 => Self::TokenCreate,
            3 => Self::TokenSend,
            4 => Self::TokenReceive,
            5 => Self::TokenMint,
            6 => Self::TokenBurn,
            7 => Self::TokenStake,
            8 => Self::TokenClaim,
            9 => Self::AddressRegister,
            10 => Self::OrganizationCreate,
            11 => Self::OrganizationAdd,
            12 => Self::OrganizationRemove,
            13 => Self::GasEscrow,
            14 => Self::GasPayment,
            15 => Self::ValidatorElect,
            16 => Self::ValidatorRemove,
            17 => Self::PlatformCreate,
            18 => Self::ContractDeploy,
            19 => Self::ContractUpgrade,
            20 => Self::ContractKill,
            21 => Self::Log,
            22 => Self::TaskStart,
            23 => Self::TaskStop,
            24 => Self::Infusion,
            25 => Self::TokenSeriesCreate,
            26 => Self::ProtocolUpgrade,
            27 => Self::LeaderboardCreate,
            28 => Self::LeaderboardInsert,
            29 => Self::LeaderboardReset,
            30 => Self::ExecutionFailure,
            64 => Self::Custom,
            _ => return None,
        })
    }
}

/// An event: append-only, ordered, part of consensus
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    /// Event kind
    pub kind: EventKind,
    /// Address the event concerns
    pub address: Address,
    /// Name of the emitting contract
    pub contract: String,
    /// Opaque payload
    pub data: Vec<u8>,
}

impl Event {
    /// Create a new event
    pub fn new(
        kind: EventKind,
        address: Address,
        contract: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            kind,
            address,
            contract: contract.into(),
            data,
        }
    }

    /// Decode the payload as a structured value
    pub fn decode_data<T: Serializable>(&self) -> CodecResult<T> {
        T::from_bytes(&self.data)
    }
}

impl Serializable for Event {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u8(self.kind as u8);
        writer.write_address(&self.address);
        writer.write_string(&self.contract);
        writer.write_bytes(&self.data);
    }

    fn unserialize(reader: &mut BinaryReader<'_>) -> CodecResult<Self> {
        let tag = reader.read_u8()?;
        let kind = EventKind::from_u8(tag)
            .ok_or_else(|| CodecError::InvalidData(format!("event kind {tag}")))?;
        Ok(Self {
            kind,
            address: reader.read_address()?,
            contract: reader.read_string()?,
            data: reader.read_bytes()?,
        })
    }
}

/// Payload of token movement events
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenEventData {
    /// Token symbol
    pub symbol: String,
    /// Amount for fungible tokens, token id for NFTs
    pub value: i128,
    /// Chain the movement happened on
    pub chain_name: String,
}

impl TokenEventData {
    /// Create token event data
    pub fn new(symbol: impl Into<String>, value: i128, chain_name: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            value,
            chain_name: chain_name.into(),
        }
    }
}

impl Serializable for TokenEventData {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_string(&self.symbol);
        writer.write_bigint(self.value);
        writer.write_string(&self.chain_name);
    }

    fn unserialize(reader: &mut BinaryReader<'_>) -> CodecResult<Self> {
        Ok(Self {
            symbol: reader.read_string()?,
            value: reader.read_bigint()?,
            chain_name: reader.read_string()?,
        })
    }
}

/// Payload of gas escrow and payment events
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GasEventData {
    /// Contract or address the gas is bound to
    pub address: Address,
    /// Price per gas unit
    pub price: i128,
    /// Gas units
    pub amount: i128,
}

impl Serializable for GasEventData {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_address(&self.address);
        writer.write_bigint(self.price);
        writer.write_bigint(self.amount);
    }

    fn unserialize(reader: &mut BinaryReader<'_>) -> CodecResult<Self> {
        Ok(Self {
            address: reader.read_address()?,
            price: reader.read_bigint()?,
            amount: reader.read_bigint()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_primitives::AddressKind;

    #[test]
    fn test_event_roundtrip_with_token_data() {
        let data = TokenEventData::new("SOUL", 1_000_000, "main");
        let event = Event::new(
            EventKind::TokenSend,
            Address::from_parts(AddressKind::User, [3; 32]),
            "token",
            data.to_bytes(),
        );

        let decoded = Event::from_bytes(&event.to_bytes()).unwrap();
        assert_eq!(decoded, event);
        assert_eq!(decoded.decode_data::<TokenEventData>().unwrap(), data);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let mut bytes = Event::new(EventKind::Log, Address::NULL, "x", vec![]).to_bytes();
        bytes[0] = 200;
        assert!(Event::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_negative_amount_survives_encoding() {
        let data = GasEventData {
            address: Address::NULL,
            price: 100_000,
            amount: -5,
        };
        assert_eq!(GasEventData::from_bytes(&data.to_bytes()).unwrap(), data);
    }
}
