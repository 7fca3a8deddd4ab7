//! Transactions: a script to run on a named chain, plus signatures

use bytes::Bytes;
use strata_crypto::{public_key_to_address, recover_public_key, sha256, sign, PrivateKey, Signature};
use strata_primitives::{
    Address, BinaryReader, BinaryWriter, CodecResult, Hash, Serializable, Timestamp,
};

use crate::TypesResult;

/// Size of the proof-of-work nonce appended to the payload
const NONCE_LEN: usize = 4;

/// A signed transaction.
///
/// All fields except the signature list are fixed at construction; the hash is
/// computed once from the unsigned serialization and recomputed only when the
/// payload changes during mining.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    nexus_name: String,
    chain_name: String,
    script: Bytes,
    expiration: Timestamp,
    payload: Bytes,
    signatures: Vec<Signature>,
    hash: Hash,
}

impl Transaction {
    /// Create an unsigned transaction
    pub fn new(
        nexus_name: impl Into<String>,
        chain_name: impl Into<String>,
        script: impl Into<Bytes>,
        expiration: Timestamp,
        payload: impl Into<Bytes>,
    ) -> Self {
        let mut tx = Self {
            nexus_name: nexus_name.into(),
            chain_name: chain_name.into(),
            script: script.into(),
            expiration,
            payload: payload.into(),
            signatures: Vec::new(),
            hash: Hash::ZERO,
        };
        tx.hash = tx.compute_hash();
        tx
    }

    /// Name of the nexus this transaction targets
    pub fn nexus_name(&self) -> &str {
        &self.nexus_name
    }

    /// Name of the chain this transaction targets
    pub fn chain_name(&self) -> &str {
        &self.chain_name
    }

    /// Script bytecode
    pub fn script(&self) -> &Bytes {
        &self.script
    }

    /// Expiration timestamp
    pub fn expiration(&self) -> Timestamp {
        self.expiration
    }

    /// Opaque payload
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Accumulated signatures
    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// Transaction hash
    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// Whether the transaction is expired at `now`
    pub fn has_expired(&self, now: Timestamp) -> bool {
        self.expiration < now
    }

    /// Serialization covered by the hash and by signatures
    pub fn unsigned_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::new();
        self.serialize_unsigned(&mut writer);
        writer.into_bytes()
    }

    fn serialize_unsigned(&self, writer: &mut BinaryWriter) {
        writer.write_string(&self.nexus_name);
        writer.write_string(&self.chain_name);
        writer.write_bytes(&self.script);
        writer.write_u32(self.expiration);
        writer.write_bytes(&self.payload);
    }

    fn compute_hash(&self) -> Hash {
        sha256(&self.unsigned_bytes())
    }

    /// Sign the transaction hash and append the signature
    pub fn sign(&mut self, key: &PrivateKey) -> TypesResult<()> {
        let signature = sign(&self.hash, key)?;
        self.signatures.push(signature);
        Ok(())
    }

    /// Append an externally produced signature
    pub fn add_signature(&mut self, signature: Signature) {
        self.signatures.push(signature);
    }

    /// Addresses recovered from the signature list, in signing order.
    /// Signatures that fail to recover are skipped.
    pub fn signers(&self) -> Vec<Address> {
        self.signatures
            .iter()
            .filter_map(|sig| recover_public_key(&self.hash, sig).ok())
            .map(|key| public_key_to_address(&key))
            .collect()
    }

    /// Whether `address` produced one of the signatures
    pub fn is_signed_by(&self, address: &Address) -> bool {
        self.signers().iter().any(|signer| signer == address)
    }

    /// Search for a nonce giving the hash at least `difficulty` leading zero
    /// bits. The nonce is appended to the payload; existing signatures become
    /// invalid and are cleared. Returns the nonce found.
    pub fn mine(&mut self, difficulty: u32) -> Option<u32> {
        let base = self.payload.clone();
        let mut payload = Vec::with_capacity(base.len() + NONCE_LEN);

        for nonce in 0..=u32::MAX {
            payload.clear();
            payload.extend_from_slice(&base);
            payload.extend_from_slice(&nonce.to_le_bytes());
            self.payload = Bytes::copy_from_slice(&payload);
            self.hash = self.compute_hash();
            if self.hash.leading_zero_bits() >= difficulty {
                self.signatures.clear();
                return Some(nonce);
            }
        }

        self.payload = base;
        self.hash = self.compute_hash();
        None
    }
}

impl Serializable for Transaction {
    fn serialize(&self, writer: &mut BinaryWriter) {
        self.serialize_unsigned(writer);
        writer.write_list(&self.signatures);
    }

    fn unserialize(reader: &mut BinaryReader<'_>) -> CodecResult<Self> {
        let mut tx = Self {
            nexus_name: reader.read_string()?,
            chain_name: reader.read_string()?,
            script: Bytes::from(reader.read_bytes()?),
            expiration: reader.read_u32()?,
            payload: Bytes::from(reader.read_bytes()?),
            signatures: reader.read_list()?,
            hash: Hash::ZERO,
        };
        tx.hash = tx.compute_hash();
        Ok(tx)
    }
}
