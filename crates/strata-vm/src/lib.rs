//! # strata-vm
//!
//! Register-based bytecode virtual machine for Strata.
//!
//! This crate provides:
//! - Opcode set and the fixed gas table
//! - The `VmObject` value model
//! - Call frames, value stack and the context stack
//! - The `Machine` host trait and the `ExecutionContext` capability
//! - The bytecode interpreter (`ScriptContext`)
//! - Script assembly and disassembly

#![warn(missing_docs)]
#![warn(clippy::all)]

mod builder;
mod context;
mod disasm;
mod error;
mod frame;
pub mod gas;
mod machine;
mod object;
mod opcode;
mod stack;

pub use builder::{ScriptBuilder, SCRATCH_REGISTER};
pub use context::{ExecutionContext, ScriptContext};
pub use disasm::{Disassembler, Instruction};
pub use error::{VmError, VmResult};
pub use frame::{ExecutionFrame, REGISTER_COUNT};
pub use gas::{interop_gas, static_gas, GasMeter};
pub use machine::{run_context, Machine, MachineState, MAX_CONTEXT_DEPTH, MAX_FRAMES};
pub use object::{number_from_bytes, number_to_bytes, VmObject};
pub use opcode::Opcode;
pub use stack::{Stack, MAX_STACK_SIZE};
