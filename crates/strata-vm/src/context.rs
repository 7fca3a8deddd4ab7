//! Execution contexts and the bytecode interpreter

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use strata_crypto::address_from_name;
use strata_primitives::{Address, BinaryReader, Serializable};
use strata_types::{ContractAbi, ExecutionState, VmType};
use tracing::debug;

use crate::error::{VmError, VmResult};
use crate::frame::{ExecutionFrame, REGISTER_COUNT};
use crate::gas::interop_gas;
use crate::machine::Machine;
use crate::object::VmObject;
use crate::opcode::Opcode;

/// Anything the VM can switch into: native contracts and deployed scripts
/// share this one capability.
pub trait ExecutionContext: Send + Sync {
    /// Context name, used for `CTX` lookups and event attribution
    fn name(&self) -> &str;

    /// Address the context acts as
    fn address(&self) -> Address;

    /// Run against `machine` until a terminal state
    fn execute(&self, machine: &mut dyn Machine) -> VmResult<ExecutionState>;
}

/// Interpreter for a bytecode script.
///
/// Without an ABI execution starts at offset 0. With one, the method name
/// is popped from the stack, the arguments below it are checked against the
/// method's parameters and execution starts at the method's offset.
pub struct ScriptContext {
    name: String,
    address: Address,
    script: Arc<[u8]>,
    abi: Option<ContractAbi>,
}

enum Step {
    Next,
    Jump(usize),
    Stop(ExecutionState),
}

impl ScriptContext {
    /// Context for a plain script
    pub fn new(name: impl Into<String>, script: impl Into<Arc<[u8]>>) -> Self {
        let name = name.into();
        Self {
            address: address_from_name(&name),
            name,
            script: script.into(),
            abi: None,
        }
    }

    /// Context for a contract script with a method table
    pub fn with_abi(name: impl Into<String>, script: impl Into<Arc<[u8]>>, abi: ContractAbi) -> Self {
        let mut context = Self::new(name, script);
        context.abi = Some(abi);
        context
    }

    /// Override the address the context acts as
    pub fn at_address(mut self, address: Address) -> Self {
        self.address = address;
        self
    }

    /// Script bytes
    pub fn script(&self) -> &[u8] {
        &self.script
    }

    /// Method table, if any
    pub fn abi(&self) -> Option<&ContractAbi> {
        self.abi.as_ref()
    }

    fn entry_offset(&self, machine: &mut dyn Machine) -> VmResult<usize> {
        let Some(abi) = &self.abi else {
            return Ok(0);
        };
        let method_name = machine.state_mut().pop()?.as_string()?;
        let method = abi.find_method(&method_name).ok_or_else(|| {
            VmError::Runtime(format!("method {method_name} not found in {}", self.name))
        })?;

        let stack = machine.state().stack();
        let arg_types = (0..method.parameters.len())
            .map(|depth| stack.peek_at(depth).map(VmObject::vm_type))
            .collect::<VmResult<Vec<VmType>>>()?;
        if !method.accepts(&arg_types) {
            return Err(VmError::Runtime(format!(
                "invalid arguments for {}.{}",
                self.name, method.name
            )));
        }
        usize::try_from(method.offset).map_err(|_| {
            VmError::Runtime(format!("{}.{} has no script entry", self.name, method.name))
        })
    }

    fn step(
        &self,
        machine: &mut dyn Machine,
        opcode: Opcode,
        reader: &mut BinaryReader<'_>,
        entry_depth: usize,
        operands_start: usize,
    ) -> VmResult<Step> {
        if opcode.is_binary() {
            let (a, b, dst) = (reader.read_u8()?, reader.read_u8()?, reader.read_u8()?);
            let state = machine.state_mut();
            let value = binary_op(opcode, state.register(a)?, state.register(b)?)?;
            state.set_register(dst, value)?;
            return Ok(Step::Next);
        }

        match opcode {
            Opcode::NOP => {}

            Opcode::MOVE => {
                let (src, dst) = (reader.read_u8()?, reader.read_u8()?);
                let frame = machine.state_mut().current_frame_mut()?;
                let value = frame.take(src)?;
                frame.set(dst, value)?;
            }

            Opcode::COPY => {
                let (src, dst) = (reader.read_u8()?, reader.read_u8()?);
                let state = machine.state_mut();
                let value = state.register(src)?.clone();
                state.set_register(dst, value)?;
            }

            Opcode::PUSH => {
                let reg = reader.read_u8()?;
                let state = machine.state_mut();
                let value = state.register(reg)?.clone();
                state.push(value)?;
            }

            Opcode::POP => {
                let reg = reader.read_u8()?;
                let state = machine.state_mut();
                let value = state.pop()?;
                state.set_register(reg, value)?;
            }

            Opcode::SWAP => {
                let (a, b) = (reader.read_u8()?, reader.read_u8()?);
                let frame = machine.state_mut().current_frame_mut()?;
                let first = frame.take(a)?;
                let second = frame.take(b)?;
                frame.set(a, second)?;
                frame.set(b, first)?;
            }

            Opcode::CALL => {
                let count = reader.read_u8()?;
                let target = reader.read_u16()? as usize;
                if count as usize > REGISTER_COUNT {
                    return Err(VmError::InvalidRegister(count));
                }
                let return_offset = operands_start + reader.position();
                let frame = ExecutionFrame::new(self.name.as_str(), return_offset);
                machine.state_mut().push_frame(frame)?;
                return Ok(Step::Jump(target));
            }

            Opcode::EXTCALL => {
                let reg = reader.read_u8()?;
                let method = machine.state().register(reg)?.as_string()?;
                machine.consume_gas(interop_gas(&method)?)?;
                let state = machine.execute_interop(&method)?;
                if state == ExecutionState::Break {
                    return Ok(Step::Stop(state));
                }
            }

            Opcode::JMP => {
                let target = reader.read_u16()? as usize;
                return Ok(Step::Jump(target));
            }

            Opcode::JMPIF | Opcode::JMPNOT => {
                let reg = reader.read_u8()?;
                let target = reader.read_u16()? as usize;
                let condition = machine.state().register(reg)?.as_bool()?;
                if condition == (opcode == Opcode::JMPIF) {
                    return Ok(Step::Jump(target));
                }
            }

            Opcode::RET => {
                let state = machine.state_mut();
                if state.frame_depth() > entry_depth {
                    let frame = state.pop_frame()?;
                    return Ok(Step::Jump(frame.return_offset()));
                }
                return Ok(Step::Stop(ExecutionState::Halt));
            }

            Opcode::THROW => {
                let reg = reader.read_u8()?;
                let message = machine.state().register(reg)?.as_string()?;
                return Err(VmError::Assertion(message));
            }

            Opcode::LOAD => {
                let dst = reader.read_u8()?;
                let tag = reader.read_u8()?;
                let vm_type = VmType::from_u8(tag)
                    .ok_or_else(|| VmError::Codec(format!("invalid load type {tag}")))?;
                let bytes = reader.read_bytes()?;
                let value = VmObject::from_load(vm_type, &bytes)?;
                machine.state_mut().set_register(dst, value)?;
            }

            Opcode::CAST => {
                let (src, dst, tag) = (reader.read_u8()?, reader.read_u8()?, reader.read_u8()?);
                let vm_type = VmType::from_u8(tag)
                    .ok_or_else(|| VmError::Codec(format!("invalid cast type {tag}")))?;
                let state = machine.state_mut();
                let value = state.register(src)?.cast(vm_type)?;
                state.set_register(dst, value)?;
            }

            Opcode::CAT => {
                let (a, b, dst) = (reader.read_u8()?, reader.read_u8()?, reader.read_u8()?);
                let state = machine.state_mut();
                let value = concat(state.register(a)?, state.register(b)?)?;
                state.set_register(dst, value)?;
            }

            Opcode::RANGE | Opcode::SUBSTR => {
                let (src, dst) = (reader.read_u8()?, reader.read_u8()?);
                let index = read_offset(reader)?;
                let len = read_offset(reader)?;
                let state = machine.state_mut();
                let source = state.register(src)?;
                let value = if opcode == Opcode::SUBSTR {
                    VmObject::String(char_slice(&source.as_string()?, index, len)?)
                } else {
                    VmObject::Bytes(byte_slice(&source.as_bytes()?, index, len)?.to_vec())
                };
                state.set_register(dst, value)?;
            }

            Opcode::LEFT | Opcode::RIGHT => {
                let (src, dst) = (reader.read_u8()?, reader.read_u8()?);
                let len = read_offset(reader)?;
                let state = machine.state_mut();
                let value = edge(state.register(src)?, len, opcode == Opcode::LEFT)?;
                state.set_register(dst, value)?;
            }

            Opcode::SIZE
            | Opcode::COUNT
            | Opcode::NOT
            | Opcode::SIGN
            | Opcode::NEGATE
            | Opcode::ABS
            | Opcode::PACK
            | Opcode::UNPACK => {
                let (src, dst) = (reader.read_u8()?, reader.read_u8()?);
                let state = machine.state_mut();
                let value = unary_op(opcode, state.register(src)?)?;
                state.set_register(dst, value)?;
            }

            Opcode::INC | Opcode::DEC => {
                let reg = reader.read_u8()?;
                let state = machine.state_mut();
                let n = state.register(reg)?.as_number()?;
                let delta = if opcode == Opcode::INC { 1 } else { -1 };
                let value = n.checked_add(delta).ok_or_else(|| overflow(opcode))?;
                state.set_register(reg, VmObject::Number(value))?;
            }

            Opcode::CTX => {
                let (src, dst) = (reader.read_u8()?, reader.read_u8()?);
                let name = machine.state().register(src)?.as_string()?;
                let context = machine.load_context(&name)?;
                machine
                    .state_mut()
                    .set_register(dst, VmObject::Context(context.name().to_string()))?;
            }

            Opcode::SWITCH => {
                let reg = reader.read_u8()?;
                let name = machine.state().register(reg)?.as_string()?;
                let context = machine.load_context(&name)?;
                let state = machine.switch_context(context)?;
                if state == ExecutionState::Break {
                    return Ok(Step::Stop(state));
                }
            }

            Opcode::PUT => {
                let (src, dst, key) = (reader.read_u8()?, reader.read_u8()?, reader.read_u8()?);
                let state = machine.state_mut();
                let value = state.register(src)?.clone();
                let key = state.register(key)?.clone();
                let target = state.current_frame_mut()?.register_mut(dst)?;
                if target.is_none() {
                    *target = VmObject::Struct(BTreeMap::new());
                }
                match target {
                    VmObject::Struct(fields) => {
                        fields.insert(key, value);
                    }
                    other => {
                        return Err(VmError::CastFailed {
                            from: other.vm_type(),
                            to: VmType::Struct,
                        })
                    }
                }
            }

            Opcode::GET => {
                let (src, dst, key) = (reader.read_u8()?, reader.read_u8()?, reader.read_u8()?);
                let state = machine.state_mut();
                let value = state.register(src)?.get_field(state.register(key)?)?;
                state.set_register(dst, value)?;
            }

            Opcode::CLEAR => {
                let reg = reader.read_u8()?;
                machine.state_mut().set_register(reg, VmObject::None)?;
            }

            Opcode::DEBUG => {
                let reg = reader.read_u8()?;
                let value = machine.state().register(reg)?;
                debug!(context = %self.name, value = %value, "script debug");
            }

            // binary opcodes are handled above
            _ => return Err(VmError::InvalidOpcode(opcode as u8)),
        }
        Ok(Step::Next)
    }
}

impl ExecutionContext for ScriptContext {
    fn name(&self) -> &str {
        &self.name
    }

    fn address(&self) -> Address {
        self.address
    }

    fn execute(&self, machine: &mut dyn Machine) -> VmResult<ExecutionState> {
        let entry_depth = machine.state().frame_depth();
        let script = &self.script[..];
        let mut ip = self.entry_offset(machine)?;

        loop {
            let Some(&byte) = script.get(ip) else {
                return Ok(ExecutionState::Halt);
            };
            let opcode = Opcode::from_byte(byte).ok_or(VmError::InvalidOpcode(byte))?;
            machine.validate_opcode(opcode)?;

            let operands_start = ip + 1;
            let mut reader = BinaryReader::new(&script[operands_start..]);
            match self.step(machine, opcode, &mut reader, entry_depth, operands_start)? {
                Step::Next => ip = operands_start + reader.position(),
                Step::Jump(target) => {
                    if target > script.len() {
                        return Err(VmError::InvalidJump(target));
                    }
                    ip = target;
                }
                Step::Stop(state) => return Ok(state),
            }
        }
    }
}

fn overflow(opcode: Opcode) -> VmError {
    VmError::Arithmetic(format!("{} overflow", opcode.name()))
}

fn shift_amount(opcode: Opcode, n: i128) -> VmResult<u32> {
    u32::try_from(n)
        .ok()
        .filter(|s| *s < 128)
        .ok_or_else(|| VmError::Arithmetic(format!("{} by {n}", opcode.name())))
}

fn binary_op(opcode: Opcode, a: &VmObject, b: &VmObject) -> VmResult<VmObject> {
    if opcode == Opcode::EQUAL {
        return Ok(VmObject::Bool(a == b));
    }
    if matches!(opcode, Opcode::AND | Opcode::OR | Opcode::XOR) {
        if let (VmObject::Bool(x), VmObject::Bool(y)) = (a, b) {
            return Ok(VmObject::Bool(match opcode {
                Opcode::AND => *x && *y,
                Opcode::OR => *x || *y,
                _ => *x ^ *y,
            }));
        }
    }
    if opcode == Opcode::ADD && matches!(a, VmObject::String(_)) {
        return Ok(VmObject::String(a.as_string()? + &b.as_string()?));
    }

    let (x, y) = (a.as_number()?, b.as_number()?);
    let value = match opcode {
        Opcode::AND => x & y,
        Opcode::OR => x | y,
        Opcode::XOR => x ^ y,
        Opcode::LT | Opcode::GT | Opcode::LTE | Opcode::GTE => {
            let ord = x.cmp(&y);
            return Ok(VmObject::Bool(match opcode {
                Opcode::LT => ord == Ordering::Less,
                Opcode::GT => ord == Ordering::Greater,
                Opcode::LTE => ord != Ordering::Greater,
                _ => ord != Ordering::Less,
            }));
        }
        Opcode::ADD => x.checked_add(y).ok_or_else(|| overflow(opcode))?,
        Opcode::SUB => x.checked_sub(y).ok_or_else(|| overflow(opcode))?,
        Opcode::MUL => x.checked_mul(y).ok_or_else(|| overflow(opcode))?,
        Opcode::DIV | Opcode::MOD => {
            if y == 0 {
                return Err(VmError::Arithmetic("division by zero".into()));
            }
            let result = if opcode == Opcode::DIV {
                x.checked_div(y)
            } else {
                x.checked_rem(y)
            };
            result.ok_or_else(|| overflow(opcode))?
        }
        Opcode::SHL => x
            .checked_shl(shift_amount(opcode, y)?)
            .ok_or_else(|| overflow(opcode))?,
        Opcode::SHR => x
            .checked_shr(shift_amount(opcode, y)?)
            .ok_or_else(|| overflow(opcode))?,
        Opcode::MIN => x.min(y),
        Opcode::MAX => x.max(y),
        Opcode::POW => {
            let exp = u32::try_from(y)
                .map_err(|_| VmError::Arithmetic(format!("negative exponent {y}")))?;
            x.checked_pow(exp).ok_or_else(|| overflow(opcode))?
        }
        other => return Err(VmError::InvalidOpcode(other as u8)),
    };
    Ok(VmObject::Number(value))
}

fn unary_op(opcode: Opcode, value: &VmObject) -> VmResult<VmObject> {
    Ok(match opcode {
        Opcode::SIZE => {
            let size = match value {
                VmObject::String(s) => s.chars().count(),
                other => other.as_bytes()?.len(),
            };
            VmObject::Number(size as i128)
        }
        Opcode::COUNT => VmObject::Number(match value {
            VmObject::Struct(fields) => fields.len() as i128,
            VmObject::None => 0,
            _ => 1,
        }),
        Opcode::NOT => VmObject::Bool(!value.as_bool()?),
        Opcode::SIGN => VmObject::Number(value.as_number()?.signum()),
        Opcode::NEGATE => VmObject::Number(
            value
                .as_number()?
                .checked_neg()
                .ok_or_else(|| overflow(opcode))?,
        ),
        Opcode::ABS => VmObject::Number(
            value
                .as_number()?
                .checked_abs()
                .ok_or_else(|| overflow(opcode))?,
        ),
        Opcode::PACK => VmObject::Bytes(value.to_bytes()),
        Opcode::UNPACK => VmObject::from_bytes(&value.as_bytes()?)?,
        other => return Err(VmError::InvalidOpcode(other as u8)),
    })
}

fn concat(a: &VmObject, b: &VmObject) -> VmResult<VmObject> {
    match (a, b) {
        (VmObject::String(_), _) | (_, VmObject::String(_)) => {
            Ok(VmObject::String(a.as_string()? + &b.as_string()?))
        }
        _ => {
            let mut bytes = a.as_bytes()?;
            bytes.extend(b.as_bytes()?);
            Ok(VmObject::Bytes(bytes))
        }
    }
}

/// Slice operands index the source value, so they are only bounded by it
fn read_offset(reader: &mut BinaryReader<'_>) -> VmResult<usize> {
    let value = reader.read_varint()?;
    usize::try_from(value).map_err(|_| VmError::Arithmetic(format!("slice operand {value} too large")))
}

fn out_of_range(index: usize, len: usize, size: usize) -> VmError {
    VmError::Arithmetic(format!("range {index}+{len} out of bounds for {size}"))
}

fn byte_slice(bytes: &[u8], index: usize, len: usize) -> VmResult<&[u8]> {
    let end = index
        .checked_add(len)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| out_of_range(index, len, bytes.len()))?;
    Ok(&bytes[index..end])
}

fn char_slice(s: &str, index: usize, len: usize) -> VmResult<String> {
    let count = s.chars().count();
    if index.checked_add(len).map_or(true, |end| end > count) {
        return Err(out_of_range(index, len, count));
    }
    Ok(s.chars().skip(index).take(len).collect())
}

fn edge(value: &VmObject, len: usize, left: bool) -> VmResult<VmObject> {
    if let VmObject::String(s) = value {
        let count = s.chars().count();
        let index = if left { 0 } else { count.saturating_sub(len) };
        return Ok(VmObject::String(char_slice(s, index, len)?));
    }
    let bytes = value.as_bytes()?;
    let index = if left { 0 } else { bytes.len().saturating_sub(len) };
    Ok(VmObject::Bytes(byte_slice(&bytes, index, len)?.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ScriptBuilder;
    use crate::gas::static_gas;
    use crate::machine::{run_context, MachineState};
    use std::collections::HashMap;
    use strata_types::{ContractMethod, ContractParameter};

    struct TestMachine {
        state: MachineState,
        contexts: HashMap<String, Arc<dyn ExecutionContext>>,
        logs: Vec<String>,
    }

    impl TestMachine {
        fn new(gas_limit: u64) -> Self {
            Self {
                state: MachineState::new(gas_limit),
                contexts: HashMap::new(),
                logs: Vec::new(),
            }
        }

        fn register(&mut self, context: impl ExecutionContext + 'static) {
            self.contexts
                .insert(context.name().to_string(), Arc::new(context));
        }

        fn run(&mut self, script: Vec<u8>) -> VmResult<ExecutionState> {
            run_context(self, Arc::new(ScriptContext::new("entry", script)))
        }
    }

    impl Machine for TestMachine {
        fn state(&self) -> &MachineState {
            &self.state
        }

        fn state_mut(&mut self) -> &mut MachineState {
            &mut self.state
        }

        fn execute_interop(&mut self, name: &str) -> VmResult<ExecutionState> {
            match name {
                "Runtime.Log" => {
                    let msg = self.state.pop()?.as_string()?;
                    self.logs.push(msg);
                }
                "Runtime.Break" => return Ok(ExecutionState::Break),
                "Sum" => {
                    let a = self.state.pop()?.as_number()?;
                    let b = self.state.pop()?.as_number()?;
                    self.state.push(VmObject::Number(a + b))?;
                }
                other => return Err(VmError::UnknownInterop(other.to_string())),
            }
            Ok(ExecutionState::Running)
        }

        fn load_context(&mut self, name: &str) -> VmResult<Arc<dyn ExecutionContext>> {
            self.contexts
                .get(name)
                .cloned()
                .ok_or_else(|| VmError::ContextNotFound(name.to_string()))
        }

        fn switch_context(
            &mut self,
            context: Arc<dyn ExecutionContext>,
        ) -> VmResult<ExecutionState> {
            run_context(self, context)
        }
    }

    #[test]
    fn test_arithmetic_and_return_value() {
        let mut sb = ScriptBuilder::new();
        sb.emit_load_number(0, 20)
            .emit_load_number(1, 22)
            .emit_binary(Opcode::ADD, 0, 1, 2)
            .emit_push(2);
        let script = sb.end_script().unwrap();

        let mut vm = TestMachine::new(1_000);
        assert_eq!(vm.run(script).unwrap(), ExecutionState::Halt);
        assert_eq!(vm.state.pop().unwrap(), VmObject::Number(42));
        assert_eq!(vm.state.frame_depth(), 0);
        assert_eq!(vm.state.context_depth(), 0);
    }

    #[test]
    fn test_interop_charges_namespace_cost() {
        let mut sb = ScriptBuilder::new();
        sb.emit_call_interop("Runtime.Log", &[VmObject::from("hello")]);
        let script = sb.end_script().unwrap();

        let mut vm = TestMachine::new(1_000);
        vm.run(script).unwrap();
        assert_eq!(vm.logs, vec!["hello".to_string()]);
        // LOAD + PUSH + LOAD + EXTCALL(10 + 50) + RET
        assert_eq!(vm.state.gas().used(), 5 + 1 + 5 + 10 + 50);
    }

    #[test]
    fn test_invalid_namespace_faults() {
        let mut sb = ScriptBuilder::new();
        sb.emit_extcall("Bogus.Call");
        let mut vm = TestMachine::new(1_000);
        let err = vm.run(sb.end_script().unwrap()).unwrap_err();
        assert!(err.to_string().contains("invalid extcall namespace"));
    }

    #[test]
    fn test_break_stops_early() {
        let mut sb = ScriptBuilder::new();
        sb.emit_extcall("Runtime.Break")
            .emit_call_interop("Runtime.Log", &[VmObject::from("unreachable")]);
        let mut vm = TestMachine::new(1_000);
        assert_eq!(vm.run(sb.end_script().unwrap()).unwrap(), ExecutionState::Break);
        assert!(vm.logs.is_empty());
    }

    #[test]
    fn test_throw_message_is_verbatim() {
        let mut sb = ScriptBuilder::new();
        sb.emit_load_string(0, "witness failed").emit(Opcode::THROW).emit_u8(0);
        let mut vm = TestMachine::new(1_000);
        assert_eq!(
            vm.run(sb.end_script().unwrap()).unwrap_err(),
            VmError::Assertion("witness failed".into())
        );
        assert_eq!(vm.state.context_depth(), 0);
    }

    #[test]
    fn test_invalid_opcode_faults() {
        let mut vm = TestMachine::new(1_000);
        assert_eq!(vm.run(vec![0xEE]).unwrap_err(), VmError::InvalidOpcode(0xEE));
    }

    #[test]
    fn test_gas_fault_at_exact_operation() {
        // 4 × (LOAD 5 + PUSH 1) = 24; with a limit of 20 the fourth LOAD
        // brings the total from 18 to 23
        let mut sb = ScriptBuilder::new();
        for i in 0..4 {
            sb.emit_load_number(0, i).emit_push(0);
        }
        let mut vm = TestMachine::new(20);
        let err = vm.run(sb.end_script().unwrap()).unwrap_err();
        assert_eq!(err.to_string(), "VM gas limit exceeded (20)/(23)");
        assert_eq!(vm.state.stack().len(), 3);
    }

    #[test]
    fn test_every_opcode_charges_table_cost() {
        for opcode in Opcode::ALL {
            let mut vm = TestMachine::new(u64::MAX);
            vm.validate_opcode(opcode).unwrap();
            assert_eq!(vm.state.gas().used(), static_gas(opcode), "{}", opcode.name());
        }
    }

    #[test]
    fn test_local_call_and_jumps() {
        // r0 = 3; loop { r1 += r0; r0 -= 1 } while r0 != 0; call double(r1)
        let mut sb = ScriptBuilder::new();
        sb.emit_load_number(0, 3).emit_load_number(1, 0).emit_load_number(3, 0);
        sb.emit_label("loop");
        sb.emit_binary(Opcode::ADD, 1, 0, 1).emit_register(Opcode::DEC, 0);
        sb.emit_binary(Opcode::EQUAL, 0, 3, 2);
        sb.emit_conditional_jump(Opcode::JMPNOT, 2, "loop");
        sb.emit_push(1).emit_call("double", 2).emit_jump("end");
        sb.emit_label("double");
        sb.emit_pop(0).emit_copy(0, 1).emit_binary(Opcode::ADD, 0, 1, 0).emit_push(0).emit_ret();
        sb.emit_label("end");
        let script = sb.end_script().unwrap();

        let mut vm = TestMachine::new(10_000);
        assert_eq!(vm.run(script).unwrap(), ExecutionState::Halt);
        assert_eq!(vm.state.pop().unwrap(), VmObject::Number(12));
    }

    #[test]
    fn test_struct_put_get_pack() {
        let mut sb = ScriptBuilder::new();
        sb.emit_load_string(0, "hp")
            .emit_load_number(1, 99)
            .emit_put(1, 2, 0)
            .emit_unary(Opcode::PACK, 2, 3)
            .emit_unary(Opcode::UNPACK, 3, 4)
            .emit_get(4, 5, 0)
            .emit_push(5)
            .emit_unary(Opcode::COUNT, 4, 6)
            .emit_push(6);
        let mut vm = TestMachine::new(10_000);
        vm.run(sb.end_script().unwrap()).unwrap();
        assert_eq!(vm.state.pop().unwrap(), VmObject::Number(1));
        assert_eq!(vm.state.pop().unwrap(), VmObject::Number(99));
    }

    #[test]
    fn test_string_ops() {
        let mut sb = ScriptBuilder::new();
        sb.emit_load_string(0, "strata")
            .emit_load_string(1, "-chain")
            .emit_binary(Opcode::CAT, 0, 1, 2)
            .emit_push(2)
            .emit_substr(2, 3, 2, 4)
            .emit_push(3)
            .emit_edge(Opcode::RIGHT, 2, 4, 5)
            .emit_push(4)
            .emit_unary(Opcode::SIZE, 2, 5)
            .emit_push(5);
        let mut vm = TestMachine::new(10_000);
        vm.run(sb.end_script().unwrap()).unwrap();
        assert_eq!(vm.state.pop().unwrap(), VmObject::Number(12));
        assert_eq!(vm.state.pop().unwrap(), VmObject::from("chain"));
        assert_eq!(vm.state.pop().unwrap(), VmObject::from("rata"));
        assert_eq!(vm.state.pop().unwrap(), VmObject::from("strata-chain"));
    }

    #[test]
    fn test_slices_at_script_end() {
        let mut sb = ScriptBuilder::new();
        sb.emit_load_string(0, "strata-chain")
            .emit_edge(Opcode::RIGHT, 0, 1, 5);
        let mut vm = TestMachine::new(10_000);
        assert_eq!(vm.run(sb.end_script().unwrap()).unwrap(), ExecutionState::Halt);

        let mut sb = ScriptBuilder::new();
        sb.emit_load_string(0, "strata-chain")
            .emit_substr(0, 1, 7, 5)
            .emit_push(1);
        let mut vm = TestMachine::new(10_000);
        assert_eq!(vm.run(sb.end_script().unwrap()).unwrap(), ExecutionState::Halt);
        assert_eq!(vm.state.pop().unwrap(), VmObject::from("chain"));

        let mut sb = ScriptBuilder::new();
        sb.emit_load_bytes(0, &(0u8..12).collect::<Vec<_>>())
            .emit_range(0, 1, 8, 4)
            .emit_push(1);
        let mut vm = TestMachine::new(10_000);
        vm.run(sb.end_script().unwrap()).unwrap();
        assert_eq!(vm.state.pop().unwrap(), VmObject::Bytes(vec![8, 9, 10, 11]));

        let mut sb = ScriptBuilder::new();
        sb.emit_load_string(0, "strata-chain")
            .emit_edge(Opcode::LEFT, 0, 1, 6)
            .emit_push(1);
        let mut vm = TestMachine::new(10_000);
        vm.run(sb.end_script().unwrap()).unwrap();
        assert_eq!(vm.state.pop().unwrap(), VmObject::from("strata"));
    }

    #[test]
    fn test_slice_past_value_end_faults() {
        let mut sb = ScriptBuilder::new();
        sb.emit_load_string(0, "strata-chain")
            .emit_edge(Opcode::RIGHT, 0, 1, 13);
        let mut vm = TestMachine::new(10_000);
        assert!(matches!(
            vm.run(sb.end_script().unwrap()),
            Err(VmError::Arithmetic(_))
        ));
    }

    #[test]
    fn test_arithmetic_faults() {
        let mut sb = ScriptBuilder::new();
        sb.emit_load_number(0, 1)
            .emit_load_number(1, 0)
            .emit_binary(Opcode::DIV, 0, 1, 2);
        let mut vm = TestMachine::new(1_000);
        assert!(matches!(
            vm.run(sb.end_script().unwrap()).unwrap_err(),
            VmError::Arithmetic(_)
        ));

        let mut sb = ScriptBuilder::new();
        sb.emit_load_number(0, i128::MAX).emit_register(Opcode::INC, 0);
        let mut vm = TestMachine::new(1_000);
        assert!(vm.run(sb.end_script().unwrap()).is_err());
    }

    #[test]
    fn test_contract_switch_with_abi() {
        let mut contract = ScriptBuilder::new();
        contract.emit_extcall("Sum").emit_ret();
        let abi = ContractAbi::new(vec![ContractMethod::new(
            "add",
            VmType::Number,
            0,
            vec![
                ContractParameter::new("a", VmType::Number),
                ContractParameter::new("b", VmType::Number),
            ],
        )]);

        let mut vm = TestMachine::new(10_000);
        vm.register(ScriptContext::with_abi("math", contract.end_script().unwrap(), abi));

        let mut sb = ScriptBuilder::new();
        sb.emit_call_contract("math", "Add", &[VmObject::Number(2), VmObject::Number(5)]);
        assert_eq!(vm.run(sb.end_script().unwrap()).unwrap(), ExecutionState::Halt);
        assert_eq!(vm.state.pop().unwrap(), VmObject::Number(7));
        assert_eq!(vm.state.context_depth(), 0);

        let mut sb = ScriptBuilder::new();
        sb.emit_call_contract("math", "add", &[VmObject::from("x"), VmObject::Number(5)]);
        let err = vm.run(sb.end_script().unwrap()).unwrap_err();
        assert_eq!(err.to_string(), "invalid arguments for math.add");
    }

    #[test]
    fn test_unknown_context() {
        let mut sb = ScriptBuilder::new();
        sb.emit_call_contract("ghost", "run", &[]);
        let mut vm = TestMachine::new(10_000);
        assert_eq!(
            vm.run(sb.end_script().unwrap()).unwrap_err(),
            VmError::ContextNotFound("ghost".into())
        );
    }

    #[test]
    fn test_recursive_switch_hits_depth_limit() {
        let mut sb = ScriptBuilder::new();
        sb.emit_load_string(0, "self").emit_context(0, 1).emit_switch(1);
        let mut vm = TestMachine::new(u64::MAX);
        vm.register(ScriptContext::new("self", sb.end_script().unwrap()));

        let mut entry = ScriptBuilder::new();
        entry.emit_load_string(0, "self").emit_switch(0);
        assert!(matches!(
            vm.run(entry.end_script().unwrap()).unwrap_err(),
            VmError::ContextDepthExceeded(_)
        ));
        assert_eq!(vm.state.context_depth(), 0);
        assert_eq!(vm.state.frame_depth(), 0);
    }
}
