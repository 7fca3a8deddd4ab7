//! Bytecode assembly

use std::collections::HashMap;

use strata_primitives::{Address, BinaryWriter, Timestamp};
use strata_types::VmType;

use crate::error::{VmError, VmResult};
use crate::object::VmObject;
use crate::opcode::Opcode;

/// Register used for loading call arguments and method names
pub const SCRATCH_REGISTER: u8 = 0;

/// Register the context handle is kept in by [`ScriptBuilder::emit_call_contract`]
const CONTEXT_REGISTER: u8 = 1;

/// Assembles scripts instruction by instruction.
///
/// Jumps and local calls target named labels; offsets are patched in
/// [`end_script`](Self::end_script), which fails if a label was never
/// placed or lies beyond the u16 offset range.
#[derive(Default)]
pub struct ScriptBuilder {
    writer: BinaryWriter,
    labels: HashMap<String, usize>,
    patches: Vec<(usize, String)>,
}

impl ScriptBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Current offset
    pub fn offset(&self) -> usize {
        self.writer.len()
    }

    /// Emit a bare opcode
    pub fn emit(&mut self, opcode: Opcode) -> &mut Self {
        self.writer.write_u8(opcode as u8);
        self
    }

    /// Emit a raw operand byte
    pub fn emit_u8(&mut self, value: u8) -> &mut Self {
        self.writer.write_u8(value);
        self
    }

    /// `LOAD` a raw typed operand
    pub fn emit_load_raw(&mut self, reg: u8, vm_type: VmType, bytes: &[u8]) -> &mut Self {
        self.emit(Opcode::LOAD).emit_u8(reg).emit_u8(vm_type as u8);
        self.writer.write_bytes(bytes);
        self
    }

    /// `LOAD` a value
    pub fn emit_load(&mut self, reg: u8, value: &VmObject) -> &mut Self {
        let (vm_type, bytes) = value.to_load();
        self.emit_load_raw(reg, vm_type, &bytes)
    }

    /// `LOAD` a string
    pub fn emit_load_string(&mut self, reg: u8, value: &str) -> &mut Self {
        self.emit_load_raw(reg, VmType::String, value.as_bytes())
    }

    /// `LOAD` a number
    pub fn emit_load_number(&mut self, reg: u8, value: i128) -> &mut Self {
        self.emit_load(reg, &VmObject::Number(value))
    }

    /// `LOAD` a bool
    pub fn emit_load_bool(&mut self, reg: u8, value: bool) -> &mut Self {
        self.emit_load(reg, &VmObject::Bool(value))
    }

    /// `LOAD` raw bytes
    pub fn emit_load_bytes(&mut self, reg: u8, value: &[u8]) -> &mut Self {
        self.emit_load_raw(reg, VmType::Bytes, value)
    }

    /// `LOAD` an address
    pub fn emit_load_address(&mut self, reg: u8, value: &Address) -> &mut Self {
        self.emit_load(reg, &VmObject::Address(*value))
    }

    /// `LOAD` a timestamp
    pub fn emit_load_timestamp(&mut self, reg: u8, value: Timestamp) -> &mut Self {
        self.emit_load(reg, &VmObject::Timestamp(value))
    }

    /// `LOAD` an enum value
    pub fn emit_load_enum(&mut self, reg: u8, value: u32) -> &mut Self {
        self.emit_load(reg, &VmObject::Enum(value))
    }

    /// Single-register instruction such as `INC`, `CLEAR` or `THROW`
    pub fn emit_register(&mut self, opcode: Opcode, reg: u8) -> &mut Self {
        self.emit(opcode).emit_u8(reg)
    }

    /// `PUSH` a register
    pub fn emit_push(&mut self, reg: u8) -> &mut Self {
        self.emit_register(Opcode::PUSH, reg)
    }

    /// `POP` into a register
    pub fn emit_pop(&mut self, reg: u8) -> &mut Self {
        self.emit_register(Opcode::POP, reg)
    }

    /// `MOVE` between registers
    pub fn emit_move(&mut self, src: u8, dst: u8) -> &mut Self {
        self.emit(Opcode::MOVE).emit_u8(src).emit_u8(dst)
    }

    /// `COPY` between registers
    pub fn emit_copy(&mut self, src: u8, dst: u8) -> &mut Self {
        self.emit(Opcode::COPY).emit_u8(src).emit_u8(dst)
    }

    /// Two-register instruction: `SIZE`, `COUNT`, `NOT`, `SIGN`, `NEGATE`,
    /// `ABS`, `PACK` or `UNPACK`
    pub fn emit_unary(&mut self, opcode: Opcode, src: u8, dst: u8) -> &mut Self {
        self.emit(opcode).emit_u8(src).emit_u8(dst)
    }

    /// Three-register instruction: arithmetic, logic, comparison or `CAT`
    pub fn emit_binary(&mut self, opcode: Opcode, a: u8, b: u8, dst: u8) -> &mut Self {
        self.emit(opcode).emit_u8(a).emit_u8(b).emit_u8(dst)
    }

    /// `CAST` to another type
    pub fn emit_cast(&mut self, src: u8, dst: u8, vm_type: VmType) -> &mut Self {
        self.emit(Opcode::CAST)
            .emit_u8(src)
            .emit_u8(dst)
            .emit_u8(vm_type as u8)
    }

    /// Byte `RANGE`
    pub fn emit_range(&mut self, src: u8, dst: u8, index: usize, len: usize) -> &mut Self {
        self.emit(Opcode::RANGE).emit_u8(src).emit_u8(dst);
        self.writer.write_varint(index as u64);
        self.writer.write_varint(len as u64);
        self
    }

    /// Character `SUBSTR`
    pub fn emit_substr(&mut self, src: u8, dst: u8, index: usize, len: usize) -> &mut Self {
        self.emit(Opcode::SUBSTR).emit_u8(src).emit_u8(dst);
        self.writer.write_varint(index as u64);
        self.writer.write_varint(len as u64);
        self
    }

    /// `LEFT` or `RIGHT`
    pub fn emit_edge(&mut self, opcode: Opcode, src: u8, dst: u8, len: usize) -> &mut Self {
        self.emit(opcode).emit_u8(src).emit_u8(dst);
        self.writer.write_varint(len as u64);
        self
    }

    /// `PUT` `src` into struct `dst` under `key`
    pub fn emit_put(&mut self, src: u8, dst: u8, key: u8) -> &mut Self {
        self.emit(Opcode::PUT).emit_u8(src).emit_u8(dst).emit_u8(key)
    }

    /// `GET` field `key` of struct `src` into `dst`
    pub fn emit_get(&mut self, src: u8, dst: u8, key: u8) -> &mut Self {
        self.emit(Opcode::GET).emit_u8(src).emit_u8(dst).emit_u8(key)
    }

    /// `CTX` resolve the context named in `src`
    pub fn emit_context(&mut self, src: u8, dst: u8) -> &mut Self {
        self.emit(Opcode::CTX).emit_u8(src).emit_u8(dst)
    }

    /// `SWITCH` into the context in `reg`
    pub fn emit_switch(&mut self, reg: u8) -> &mut Self {
        self.emit_register(Opcode::SWITCH, reg)
    }

    /// `EXTCALL` a named interop
    pub fn emit_extcall(&mut self, method: &str) -> &mut Self {
        self.emit_load_string(SCRATCH_REGISTER, method)
            .emit_register(Opcode::EXTCALL, SCRATCH_REGISTER)
    }

    fn emit_args(&mut self, args: &[VmObject]) -> &mut Self {
        for arg in args.iter().rev() {
            self.emit_load(SCRATCH_REGISTER, arg).emit_push(SCRATCH_REGISTER);
        }
        self
    }

    /// Call an interop with `args`; the first argument ends up on top
    pub fn emit_call_interop(&mut self, method: &str, args: &[VmObject]) -> &mut Self {
        self.emit_args(args).emit_extcall(method)
    }

    /// Call `method` of `contract` with `args`
    pub fn emit_call_contract(
        &mut self,
        contract: &str,
        method: &str,
        args: &[VmObject],
    ) -> &mut Self {
        self.emit_args(args)
            .emit_load_string(SCRATCH_REGISTER, method)
            .emit_push(SCRATCH_REGISTER)
            .emit_load_string(SCRATCH_REGISTER, contract)
            .emit_context(SCRATCH_REGISTER, CONTEXT_REGISTER)
            .emit_switch(CONTEXT_REGISTER)
    }

    /// Place a label at the current offset
    pub fn emit_label(&mut self, label: &str) -> &mut Self {
        self.labels.insert(label.to_string(), self.offset());
        self
    }

    fn emit_target(&mut self, label: &str) -> &mut Self {
        self.patches.push((self.offset(), label.to_string()));
        self.writer.write_u16(0);
        self
    }

    /// Unconditional `JMP` to `label`
    pub fn emit_jump(&mut self, label: &str) -> &mut Self {
        self.emit(Opcode::JMP).emit_target(label)
    }

    /// `JMPIF` or `JMPNOT` on `reg`
    pub fn emit_conditional_jump(&mut self, opcode: Opcode, reg: u8, label: &str) -> &mut Self {
        self.emit(opcode).emit_u8(reg).emit_target(label)
    }

    /// Local `CALL` into `label` with a fresh frame
    pub fn emit_call(&mut self, label: &str, registers: u8) -> &mut Self {
        self.emit(Opcode::CALL).emit_u8(registers).emit_target(label)
    }

    /// `RET`
    pub fn emit_ret(&mut self) -> &mut Self {
        self.emit(Opcode::RET)
    }

    /// Append a final `RET` and resolve labels
    pub fn end_script(&mut self) -> VmResult<Vec<u8>> {
        self.emit_ret();
        let mut script = std::mem::take(&mut self.writer).into_bytes();
        for (position, label) in self.patches.drain(..) {
            let target = self
                .labels
                .get(&label)
                .ok_or_else(|| VmError::Codec(format!("undefined label {label}")))?;
            let target = u16::try_from(*target)
                .map_err(|_| VmError::Codec(format!("label {label} beyond offset range")))?;
            script[position..position + 2].copy_from_slice(&target.to_le_bytes());
        }
        self.labels.clear();
        Ok(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_layout() {
        let mut sb = ScriptBuilder::new();
        sb.emit_load_string(2, "ab");
        let script = sb.end_script().unwrap();
        assert_eq!(
            script,
            vec![
                Opcode::LOAD as u8,
                2,
                VmType::String as u8,
                2,
                b'a',
                b'b',
                Opcode::RET as u8
            ]
        );
    }

    #[test]
    fn test_label_patching() {
        let mut sb = ScriptBuilder::new();
        sb.emit_jump("end").emit(Opcode::NOP).emit_label("end");
        let script = sb.end_script().unwrap();
        // JMP lo hi NOP RET
        assert_eq!(script, vec![Opcode::JMP as u8, 4, 0, Opcode::NOP as u8, Opcode::RET as u8]);
    }

    #[test]
    fn test_undefined_label() {
        let mut sb = ScriptBuilder::new();
        sb.emit_jump("nowhere");
        assert!(sb.end_script().is_err());
    }

    #[test]
    fn test_call_interop_pushes_first_arg_last() {
        let mut sb = ScriptBuilder::new();
        sb.emit_call_interop("Runtime.Log", &[VmObject::from("a"), VmObject::from("b")]);
        let script = sb.end_script().unwrap();
        let b_pos = script.windows(1).position(|w| w == b"b").unwrap();
        let a_pos = script.windows(1).position(|w| w == b"a").unwrap();
        assert!(b_pos < a_pos);
    }
}
