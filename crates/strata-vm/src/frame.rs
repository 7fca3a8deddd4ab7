//! Call frames

use crate::error::{VmError, VmResult};
use crate::object::VmObject;

/// Registers per frame
pub const REGISTER_COUNT: usize = 32;

/// One activation: a register file plus where to resume on `RET`
#[derive(Clone, Debug)]
pub struct ExecutionFrame {
    registers: Vec<VmObject>,
    return_offset: usize,
    context: String,
}

impl ExecutionFrame {
    /// Create a frame for `context` that resumes at `return_offset`
    pub fn new(context: impl Into<String>, return_offset: usize) -> Self {
        Self {
            registers: vec![VmObject::None; REGISTER_COUNT],
            return_offset,
            context: context.into(),
        }
    }

    /// Offset to resume at once this frame returns
    pub fn return_offset(&self) -> usize {
        self.return_offset
    }

    /// Name of the context that owns the frame
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Read a register
    pub fn register(&self, index: u8) -> VmResult<&VmObject> {
        self.registers
            .get(index as usize)
            .ok_or(VmError::InvalidRegister(index))
    }

    /// Mutable access to a register
    pub fn register_mut(&mut self, index: u8) -> VmResult<&mut VmObject> {
        self.registers
            .get_mut(index as usize)
            .ok_or(VmError::InvalidRegister(index))
    }

    /// Overwrite a register
    pub fn set(&mut self, index: u8, value: VmObject) -> VmResult<()> {
        *self.register_mut(index)? = value;
        Ok(())
    }

    /// Move a register's value out, leaving `None`
    pub fn take(&mut self, index: u8) -> VmResult<VmObject> {
        Ok(std::mem::take(self.register_mut(index)?))
    }
}
