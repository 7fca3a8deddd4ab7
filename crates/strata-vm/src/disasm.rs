//! Script disassembly

use std::fmt;

use strata_primitives::BinaryReader;
use strata_types::VmType;

use crate::error::{VmError, VmResult};
use crate::object::VmObject;
use crate::opcode::Opcode;

/// One decoded instruction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    /// Offset of the opcode byte
    pub offset: usize,
    /// Opcode
    pub opcode: Opcode,
    /// Operands rendered as text
    pub operands: Vec<String>,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}: {}", self.offset, self.opcode.name())?;
        if !self.operands.is_empty() {
            write!(f, " {}", self.operands.join(", "))?;
        }
        Ok(())
    }
}

/// Decodes scripts into instruction listings
pub struct Disassembler<'a> {
    script: &'a [u8],
}

impl<'a> Disassembler<'a> {
    /// Create a disassembler over `script`
    pub fn new(script: &'a [u8]) -> Self {
        Self { script }
    }

    /// Decode every instruction
    pub fn instructions(&self) -> VmResult<Vec<Instruction>> {
        let mut out = Vec::new();
        let mut offset = 0;
        while offset < self.script.len() {
            let byte = self.script[offset];
            let opcode = Opcode::from_byte(byte).ok_or(VmError::InvalidOpcode(byte))?;
            let mut reader = BinaryReader::new(&self.script[offset + 1..]);
            let operands = decode_operands(opcode, &mut reader)?;
            out.push(Instruction {
                offset,
                opcode,
                operands,
            });
            offset += 1 + reader.position();
        }
        Ok(out)
    }

    /// Names of every interop the script calls through a constant register
    pub fn interop_calls(&self) -> VmResult<Vec<String>> {
        let instructions = self.instructions()?;
        let mut calls = Vec::new();
        for pair in instructions.windows(2) {
            if pair[0].opcode == Opcode::LOAD && pair[1].opcode == Opcode::EXTCALL {
                if let Some(name) = pair[0].operands.get(2) {
                    calls.push(name.trim_matches('"').to_string());
                }
            }
        }
        Ok(calls)
    }
}

fn reg(reader: &mut BinaryReader<'_>) -> VmResult<String> {
    Ok(format!("r{}", reader.read_u8()?))
}

fn regs(reader: &mut BinaryReader<'_>, count: usize) -> VmResult<Vec<String>> {
    (0..count).map(|_| reg(reader)).collect()
}

fn decode_operands(opcode: Opcode, reader: &mut BinaryReader<'_>) -> VmResult<Vec<String>> {
    if opcode.is_binary() {
        return regs(reader, 3);
    }
    Ok(match opcode {
        Opcode::NOP | Opcode::RET => Vec::new(),
        Opcode::MOVE | Opcode::COPY | Opcode::SWAP => regs(reader, 2)?,
        Opcode::PUSH
        | Opcode::POP
        | Opcode::CLEAR
        | Opcode::INC
        | Opcode::DEC
        | Opcode::THROW
        | Opcode::EXTCALL
        | Opcode::SWITCH
        | Opcode::DEBUG => regs(reader, 1)?,
        Opcode::CALL => {
            let count = reader.read_u8()?;
            vec![count.to_string(), format!("@{}", reader.read_u16()?)]
        }
        Opcode::JMP => vec![format!("@{}", reader.read_u16()?)],
        Opcode::JMPIF | Opcode::JMPNOT => {
            let r = reg(reader)?;
            vec![r, format!("@{}", reader.read_u16()?)]
        }
        Opcode::LOAD => {
            let dst = reg(reader)?;
            let tag = reader.read_u8()?;
            let vm_type = VmType::from_u8(tag)
                .ok_or_else(|| VmError::Codec(format!("invalid load type {tag}")))?;
            let bytes = reader.read_bytes()?;
            let value = VmObject::from_load(vm_type, &bytes)
                .map(|v| v.to_string())
                .unwrap_or_else(|_| format!("<{} bytes>", bytes.len()));
            vec![dst, format!("{vm_type:?}"), value]
        }
        Opcode::CAST => {
            let mut ops = regs(reader, 2)?;
            let tag = reader.read_u8()?;
            ops.push(
                VmType::from_u8(tag)
                    .map(|t| format!("{t:?}"))
                    .unwrap_or_else(|| tag.to_string()),
            );
            ops
        }
        Opcode::CAT | Opcode::PUT | Opcode::GET => regs(reader, 3)?,
        Opcode::RANGE | Opcode::SUBSTR => {
            let mut ops = regs(reader, 2)?;
            ops.push(reader.read_varint()?.to_string());
            ops.push(reader.read_varint()?.to_string());
            ops
        }
        Opcode::LEFT | Opcode::RIGHT => {
            let mut ops = regs(reader, 2)?;
            ops.push(reader.read_varint()?.to_string());
            ops
        }
        _ => regs(reader, 2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ScriptBuilder;

    #[test]
    fn test_listing() {
        let mut sb = ScriptBuilder::new();
        sb.emit_load_number(1, 7)
            .emit_binary(Opcode::ADD, 1, 1, 2)
            .emit_call_interop("Runtime.Log", &[VmObject::from("hi")]);
        let script = sb.end_script().unwrap();

        let listing = Disassembler::new(&script).instructions().unwrap();
        assert_eq!(listing[0].to_string(), "0000: LOAD r1, Number, 7");
        assert_eq!(listing[1].opcode, Opcode::ADD);
        assert_eq!(listing[1].operands, vec!["r1", "r1", "r2"]);
        assert_eq!(listing.last().unwrap().opcode, Opcode::RET);
    }

    #[test]
    fn test_interop_calls() {
        let mut sb = ScriptBuilder::new();
        sb.emit_extcall("Runtime.Time")
            .emit_call_interop("Nexus.CreateToken", &[VmObject::Number(1)]);
        let script = sb.end_script().unwrap();
        assert_eq!(
            Disassembler::new(&script).interop_calls().unwrap(),
            vec!["Runtime.Time", "Nexus.CreateToken"]
        );
    }

    #[test]
    fn test_truncated_script() {
        let script = [Opcode::LOAD as u8, 0];
        assert!(Disassembler::new(&script).instructions().is_err());
    }
}
