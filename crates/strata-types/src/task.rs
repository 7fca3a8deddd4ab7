//! Recurring contract invocations scheduled on a chain

use strata_primitives::{
    Address, BinaryReader, BinaryWriter, BlockHeight, CodecError, CodecResult, Serializable,
};

/// How task frequency is measured
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TaskFrequencyMode {
    /// Run on every block
    #[default]
    Always = 0,
    /// Run when `frequency` seconds have elapsed
    Time = 1,
    /// Run when `frequency` blocks have elapsed
    Blocks = 2,
}

impl TaskFrequencyMode {
    /// Decode a mode tag
    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Always,
            1 => Self::Time,
            2 => Self::Blocks,
            _ => return None,
        })
    }
}

/// A scheduled contract method invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainTask {
    /// Task id, taken from the chain UID counter
    pub id: u64,
    /// Owner, who pays the task's gas
    pub owner: Address,
    /// Contract to invoke
    pub context_name: String,
    /// Method to invoke
    pub method: String,
    /// Interval between runs, in seconds or blocks depending on `mode`
    pub frequency: u32,
    /// Initial delay, same unit as `frequency`
    pub delay: u32,
    /// Frequency mode
    pub mode: TaskFrequencyMode,
    /// Gas limit of each run
    pub gas_limit: u64,
    /// Height the task was created at
    pub height: BlockHeight,
    /// Whether the task still runs
    pub active: bool,
}

impl Serializable for ChainTask {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u64(self.id);
        writer.write_address(&self.owner);
        writer.write_string(&self.context_name);
        writer.write_string(&self.method);
        writer.write_u32(self.frequency);
        writer.write_u32(self.delay);
        writer.write_u8(self.mode as u8);
        writer.write_u64(self.gas_limit);
        writer.write_u64(self.height);
        writer.write_bool(self.active);
    }

    fn unserialize(reader: &mut BinaryReader<'_>) -> CodecResult<Self> {
        let id = reader.read_u64()?;
        let owner = reader.read_address()?;
        let context_name = reader.read_string()?;
        let method = reader.read_string()?;
        let frequency = reader.read_u32()?;
        let delay = reader.read_u32()?;
        let tag = reader.read_u8()?;
        let mode = TaskFrequencyMode::from_u8(tag)
            .ok_or_else(|| CodecError::InvalidData(format!("task mode {tag}")))?;
        Ok(Self {
            id,
            owner,
            context_name,
            method,
            frequency,
            delay,
            mode,
            gas_limit: reader.read_u64()?,
            height: reader.read_u64()?,
            active: reader.read_bool()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_primitives::AddressKind;

    #[test]
    fn test_task_roundtrip() {
        let task = ChainTask {
            id: 42,
            owner: Address::from_parts(AddressKind::User, [5; 32]),
            context_name: "stake".into(),
            method: "Claim".into(),
            frequency: 10,
            delay: 2,
            mode: TaskFrequencyMode::Blocks,
            gas_limit: 5_000,
            height: 17,
            active: true,
        };
        assert_eq!(ChainTask::from_bytes(&task.to_bytes()).unwrap(), task);
    }

    #[test]
    fn test_invalid_mode_rejected() {
        assert_eq!(TaskFrequencyMode::from_u8(3), None);
    }
}
