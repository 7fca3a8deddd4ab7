//! Blocks and per-transaction execution records

use std::collections::BTreeMap;
use std::sync::OnceLock;

use strata_crypto::{public_key_to_address, recover_public_key, sha256, sign, PrivateKey, Signature};
use strata_primitives::{
    Address, BinaryReader, BinaryWriter, BlockHeight, CodecError, CodecResult, Hash, Serializable,
    Timestamp,
};

use crate::{Event, TypesError, TypesResult};

/// Final state of an execution
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ExecutionState {
    /// Still executing; never reported as a final state
    #[default]
    Running = 0,
    /// Stopped early without error
    Break = 1,
    /// Stopped on error
    Fault = 2,
    /// Completed normally
    Halt = 3,
}

impl ExecutionState {
    /// Decode a state tag
    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Running,
            1 => Self::Break,
            2 => Self::Fault,
            3 => Self::Halt,
            _ => return None,
        })
    }

    /// Halt and Break both count as success
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Halt | Self::Break)
    }
}

impl Serializable for ExecutionState {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u8(*self as u8);
    }

    fn unserialize(reader: &mut BinaryReader<'_>) -> CodecResult<Self> {
        let tag = reader.read_u8()?;
        Self::from_u8(tag).ok_or_else(|| CodecError::InvalidData(format!("execution state {tag}")))
    }
}

/// External data fetched by the oracle while assembling a block
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OracleEntry {
    /// Requested URL
    pub url: String,
    /// Response content
    pub content: Vec<u8>,
}

impl OracleEntry {
    /// Create an oracle entry
    pub fn new(url: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            content,
        }
    }
}

impl Serializable for OracleEntry {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_string(&self.url);
        writer.write_bytes(&self.content);
    }

    fn unserialize(reader: &mut BinaryReader<'_>) -> CodecResult<Self> {
        Ok(Self {
            url: reader.read_string()?,
            content: reader.read_bytes()?,
        })
    }
}

/// A block of one chain.
///
/// Mutable while it is being assembled; once signed, every mutator fails with
/// [`TypesError::Sealed`]. The hash is cached and dropped on every mutation.
#[derive(Clone, Debug)]
pub struct Block {
    height: BlockHeight,
    chain_address: Address,
    timestamp: Timestamp,
    previous_hash: Hash,
    protocol: u32,
    validator: Address,
    payload: Vec<u8>,
    transaction_hashes: Vec<Hash>,
    events: BTreeMap<Hash, Vec<Event>>,
    results: BTreeMap<Hash, Vec<u8>>,
    states: BTreeMap<Hash, ExecutionState>,
    oracle_entries: Vec<OracleEntry>,
    block_events: Vec<Event>,
    signature: Option<Signature>,
    hash_cache: OnceLock<Hash>,
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.height == other.height
            && self.chain_address == other.chain_address
            && self.timestamp == other.timestamp
            && self.previous_hash == other.previous_hash
            && self.protocol == other.protocol
            && self.validator == other.validator
            && self.payload == other.payload
            && self.transaction_hashes == other.transaction_hashes
            && self.events == other.events
            && self.results == other.results
            && self.states == other.states
            && self.oracle_entries == other.oracle_entries
            && self.block_events == other.block_events
            && self.signature == other.signature
    }
}

impl Eq for Block {}

impl Block {
    /// Start assembling a block
    pub fn new(
        height: BlockHeight,
        chain_address: Address,
        timestamp: Timestamp,
        previous_hash: Hash,
        protocol: u32,
        validator: Address,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            height,
            chain_address,
            timestamp,
            previous_hash,
            protocol,
            validator,
            payload,
            transaction_hashes: Vec::new(),
            events: BTreeMap::new(),
            results: BTreeMap::new(),
            states: BTreeMap::new(),
            oracle_entries: Vec::new(),
            block_events: Vec::new(),
            signature: None,
            hash_cache: OnceLock::new(),
        }
    }

    /// Block height
    pub fn height(&self) -> BlockHeight {
        self.height
    }

    /// Address of the owning chain
    pub fn chain_address(&self) -> Address {
        self.chain_address
    }

    /// Block timestamp
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Hash of the previous block, zero for the first block
    pub fn previous_hash(&self) -> Hash {
        self.previous_hash
    }

    /// Protocol version the block was produced under
    pub fn protocol(&self) -> u32 {
        self.protocol
    }

    /// Producing validator
    pub fn validator(&self) -> Address {
        self.validator
    }

    /// Opaque payload
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Transaction hashes in execution order
    pub fn transaction_hashes(&self) -> &[Hash] {
        &self.transaction_hashes
    }

    /// Events emitted by a transaction
    pub fn events_for(&self, tx_hash: &Hash) -> &[Event] {
        self.events.get(tx_hash).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Serialized result of a transaction
    pub fn result_for(&self, tx_hash: &Hash) -> Option<&[u8]> {
        self.results.get(tx_hash).map(Vec::as_slice)
    }

    /// Final state of a transaction
    pub fn state_for(&self, tx_hash: &Hash) -> Option<ExecutionState> {
        self.states.get(tx_hash).copied()
    }

    /// Oracle entries consumed while assembling the block
    pub fn oracle_entries(&self) -> &[OracleEntry] {
        &self.oracle_entries
    }

    /// Events not tied to a transaction
    pub fn block_events(&self) -> &[Event] {
        &self.block_events
    }

    /// Validator signature, if sealed
    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    /// Whether the block is sealed
    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// True iff every recorded transaction halted or broke
    pub fn is_successful(&self) -> bool {
        self.transaction_hashes
            .iter()
            .all(|h| self.states.get(h).is_some_and(ExecutionState::is_success))
    }

    /// Block hash over the unsigned serialization
    pub fn hash(&self) -> Hash {
        *self.hash_cache.get_or_init(|| sha256(&self.unsigned_bytes()))
    }

    fn ensure_open(&mut self) -> TypesResult<()> {
        if self.signature.is_some() {
            return Err(TypesError::Sealed);
        }
        self.hash_cache = OnceLock::new();
        Ok(())
    }

    /// Append a transaction hash
    pub fn add_transaction(&mut self, tx_hash: Hash) -> TypesResult<()> {
        self.ensure_open()?;
        self.transaction_hashes.push(tx_hash);
        Ok(())
    }

    /// Append an event to a transaction
    pub fn notify(&mut self, tx_hash: Hash, event: Event) -> TypesResult<()> {
        self.ensure_open()?;
        self.events.entry(tx_hash).or_default().push(event);
        Ok(())
    }

    /// Append a block-level event
    pub fn notify_block(&mut self, event: Event) -> TypesResult<()> {
        self.ensure_open()?;
        self.block_events.push(event);
        Ok(())
    }

    /// Record a transaction's serialized result; an empty result clears it
    pub fn set_result(&mut self, tx_hash: Hash, result: Vec<u8>) -> TypesResult<()> {
        self.ensure_open()?;
        if result.is_empty() {
            self.results.remove(&tx_hash);
        } else {
            self.results.insert(tx_hash, result);
        }
        Ok(())
    }

    /// Record a transaction's final state
    pub fn set_state(&mut self, tx_hash: Hash, state: ExecutionState) -> TypesResult<()> {
        self.ensure_open()?;
        self.states.insert(tx_hash, state);
        Ok(())
    }

    /// Record an oracle entry
    pub fn add_oracle_entry(&mut self, entry: OracleEntry) -> TypesResult<()> {
        self.ensure_open()?;
        self.oracle_entries.push(entry);
        Ok(())
    }

    /// Replace the payload
    pub fn set_payload(&mut self, payload: Vec<u8>) -> TypesResult<()> {
        self.ensure_open()?;
        self.payload = payload;
        Ok(())
    }

    /// Seal the block with the validator's key
    pub fn sign(&mut self, key: &PrivateKey) -> TypesResult<()> {
        let signature = sign(&self.hash(), key)?;
        self.ensure_open()?;
        self.signature = Some(signature);
        Ok(())
    }

    /// Check that the signature was produced by the block's validator
    pub fn verify_signature(&self) -> bool {
        self.signature
            .as_ref()
            .and_then(|sig| recover_public_key(&self.hash(), sig).ok())
            .is_some_and(|key| public_key_to_address(&key) == self.validator)
    }

    /// Serialization covered by the hash
    pub fn unsigned_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::new();
        self.serialize_unsigned(&mut writer);
        writer.into_bytes()
    }

    fn serialize_unsigned(&self, writer: &mut BinaryWriter) {
        writer.write_u64(self.height);
        writer.write_address(&self.chain_address);
        writer.write_u32(self.timestamp);
        writer.write_hash(&self.previous_hash);
        writer.write_u32(self.protocol);
        writer.write_address(&self.validator);
        writer.write_bytes(&self.payload);

        writer.write_varint(self.transaction_hashes.len() as u64);
        for tx_hash in &self.transaction_hashes {
            writer.write_hash(tx_hash);
            writer.write_list(self.events_for(tx_hash));
            writer.write_bytes(self.result_for(tx_hash).unwrap_or(&[]));
            writer.write(&self.state_for(tx_hash).unwrap_or_default());
        }

        writer.write_list(&self.oracle_entries);
        writer.write_list(&self.block_events);
    }
}

impl Serializable for Block {
    fn serialize(&self, writer: &mut BinaryWriter) {
        self.serialize_unsigned(writer);
        match &self.signature {
            Some(signature) => {
                writer.write_bool(true);
                writer.write(signature);
            }
            None => writer.write_bool(false),
        }
    }

    fn unserialize(reader: &mut BinaryReader<'_>) -> CodecResult<Self> {
        let mut block = Block::new(
            reader.read_u64()?,
            reader.read_address()?,
            reader.read_u32()?,
            reader.read_hash()?,
            reader.read_u32()?,
            reader.read_address()?,
            reader.read_bytes()?,
        );

        let count = reader.read_len()?;
        for _ in 0..count {
            let tx_hash = reader.read_hash()?;
            let events: Vec<Event> = reader.read_list()?;
            let result = reader.read_bytes()?;
            let state: ExecutionState = reader.read()?;

            block.transaction_hashes.push(tx_hash);
            if !events.is_empty() {
                block.events.insert(tx_hash, events);
            }
            if !result.is_empty() {
                block.results.insert(tx_hash, result);
            }
            if state != ExecutionState::Running {
                block.states.insert(tx_hash, state);
            }
        }

        block.oracle_entries = reader.read_list()?;
        block.block_events = reader.read_list()?;
        if reader.read_bool()? {
            block.signature = Some(reader.read()?);
        }
        Ok(block)
    }
}
