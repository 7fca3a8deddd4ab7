//! Machine state and the host interface the interpreter runs against

use std::sync::Arc;

use strata_types::ExecutionState;

use crate::context::ExecutionContext;
use crate::error::{VmError, VmResult};
use crate::frame::ExecutionFrame;
use crate::gas::{static_gas, GasMeter};
use crate::object::VmObject;
use crate::opcode::Opcode;
use crate::stack::Stack;

/// Maximum call frames across all contexts
pub const MAX_FRAMES: usize = 1024;

/// Maximum nesting of context switches
pub const MAX_CONTEXT_DEPTH: usize = 16;

/// Stack, frames, active contexts and gas of one execution
pub struct MachineState {
    stack: Stack,
    frames: Vec<ExecutionFrame>,
    contexts: Vec<Arc<dyn ExecutionContext>>,
    // stack depth when each active context was entered
    stack_bases: Vec<usize>,
    gas: GasMeter,
}

impl MachineState {
    /// Create an idle state with `gas_limit`
    pub fn new(gas_limit: u64) -> Self {
        Self {
            stack: Stack::new(),
            frames: Vec::new(),
            contexts: Vec::new(),
            stack_bases: Vec::new(),
            gas: GasMeter::new(gas_limit),
        }
    }

    /// Value stack
    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// Mutable value stack
    pub fn stack_mut(&mut self) -> &mut Stack {
        &mut self.stack
    }

    /// Push onto the value stack
    pub fn push(&mut self, value: VmObject) -> VmResult<()> {
        self.stack.push(value)
    }

    /// Pop from the value stack
    pub fn pop(&mut self) -> VmResult<VmObject> {
        self.stack.pop()
    }

    /// Gas meter
    pub fn gas(&self) -> &GasMeter {
        &self.gas
    }

    /// Mutable gas meter
    pub fn gas_mut(&mut self) -> &mut GasMeter {
        &mut self.gas
    }

    /// Push a call frame
    pub fn push_frame(&mut self, frame: ExecutionFrame) -> VmResult<()> {
        if self.frames.len() >= MAX_FRAMES {
            return Err(VmError::FrameOverflow(MAX_FRAMES));
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Pop the innermost call frame
    pub fn pop_frame(&mut self) -> VmResult<ExecutionFrame> {
        self.frames.pop().ok_or(VmError::NoActiveFrame)
    }

    /// Innermost call frame
    pub fn current_frame(&self) -> VmResult<&ExecutionFrame> {
        self.frames.last().ok_or(VmError::NoActiveFrame)
    }

    /// Mutable innermost call frame
    pub fn current_frame_mut(&mut self) -> VmResult<&mut ExecutionFrame> {
        self.frames.last_mut().ok_or(VmError::NoActiveFrame)
    }

    /// Number of live frames
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Drop frames above `depth`
    pub fn truncate_frames(&mut self, depth: usize) {
        self.frames.truncate(depth);
    }

    /// Read a register of the current frame
    pub fn register(&self, index: u8) -> VmResult<&VmObject> {
        self.current_frame()?.register(index)
    }

    /// Write a register of the current frame
    pub fn set_register(&mut self, index: u8, value: VmObject) -> VmResult<()> {
        self.current_frame_mut()?.set(index, value)
    }

    /// Enter a context
    pub fn enter_context(&mut self, context: Arc<dyn ExecutionContext>) -> VmResult<()> {
        if self.contexts.len() >= MAX_CONTEXT_DEPTH {
            return Err(VmError::ContextDepthExceeded(MAX_CONTEXT_DEPTH));
        }
        self.contexts.push(context);
        self.stack_bases.push(self.stack.len());
        Ok(())
    }

    /// Leave the innermost context
    pub fn exit_context(&mut self) -> Option<Arc<dyn ExecutionContext>> {
        self.stack_bases.pop();
        self.contexts.pop()
    }

    /// Stack depth when the caller of the current context was entered.
    /// Everything above it was pushed by the caller for this call.
    pub fn caller_stack_base(&self) -> usize {
        let len = self.stack_bases.len();
        if len < 2 {
            return 0;
        }
        self.stack_bases[len - 2]
    }

    /// Number of nested contexts
    pub fn context_depth(&self) -> usize {
        self.contexts.len()
    }

    /// Context currently executing
    pub fn current_context(&self) -> Option<&Arc<dyn ExecutionContext>> {
        self.contexts.last()
    }

    /// Context the execution started in
    pub fn entry_context(&self) -> Option<&Arc<dyn ExecutionContext>> {
        self.contexts.first()
    }

    /// Context that switched into the current one
    pub fn previous_context(&self) -> Option<&Arc<dyn ExecutionContext>> {
        let len = self.contexts.len();
        if len < 2 {
            return None;
        }
        self.contexts.get(len - 2)
    }
}

/// Host side of an execution.
///
/// The interpreter only touches machine state through this trait, so the
/// runtime can bind interop calls and context resolution to chain state
/// while tests plug in a bare implementation.
pub trait Machine {
    /// Execution state
    fn state(&self) -> &MachineState;

    /// Mutable execution state
    fn state_mut(&mut self) -> &mut MachineState;

    /// Run a named interop call. Arguments are popped from the stack and
    /// results pushed back. Gas for the call has already been charged.
    fn execute_interop(&mut self, name: &str) -> VmResult<ExecutionState>;

    /// Resolve a context by name
    fn load_context(&mut self, name: &str) -> VmResult<Arc<dyn ExecutionContext>>;

    /// Run `context` nested inside the current one
    fn switch_context(&mut self, context: Arc<dyn ExecutionContext>) -> VmResult<ExecutionState>;

    /// Dispatch a call into the built-in contract `contract`. The method
    /// name is on top of the stack with the arguments below it. Hosts
    /// without native contracts fault.
    fn execute_native(&mut self, contract: &str) -> VmResult<ExecutionState> {
        Err(VmError::ContractNotAvailable(contract.to_string()))
    }

    /// Charge the static cost of `opcode`
    fn validate_opcode(&mut self, opcode: Opcode) -> VmResult<()> {
        self.consume_gas(static_gas(opcode))
    }

    /// Charge `amount` gas
    fn consume_gas(&mut self, amount: u64) -> VmResult<()> {
        self.state_mut().gas_mut().consume(amount)
    }

    /// Fault with `message` unless `condition` holds
    fn expect(&self, condition: bool, message: &str) -> VmResult<()> {
        if condition {
            Ok(())
        } else {
            Err(VmError::Assertion(message.to_string()))
        }
    }
}

/// Enter `context` with a fresh frame, run it, then unwind whatever it
/// left behind. Frames and the context stack are restored on both success
/// and fault.
pub fn run_context(
    machine: &mut dyn Machine,
    context: Arc<dyn ExecutionContext>,
) -> VmResult<ExecutionState> {
    let base_depth = machine.state().frame_depth();
    machine.state_mut().enter_context(context.clone())?;
    if let Err(err) = machine
        .state_mut()
        .push_frame(ExecutionFrame::new(context.name(), 0))
    {
        machine.state_mut().exit_context();
        return Err(err);
    }

    let result = context.execute(machine);

    machine.state_mut().truncate_frames(base_depth);
    machine.state_mut().exit_context();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ScriptContext;

    #[test]
    fn test_frame_limit() {
        let mut state = MachineState::new(0);
        for _ in 0..MAX_FRAMES {
            state.push_frame(ExecutionFrame::new("x", 0)).unwrap();
        }
        assert_eq!(
            state.push_frame(ExecutionFrame::new("x", 0)).unwrap_err(),
            VmError::FrameOverflow(MAX_FRAMES)
        );
        state.truncate_frames(1);
        assert_eq!(state.frame_depth(), 1);
    }

    #[test]
    fn test_context_stack() {
        let mut state = MachineState::new(0);
        assert!(state.current_context().is_none());

        for name in ["entry", "token", "trigger"] {
            state
                .enter_context(Arc::new(ScriptContext::new(name, Vec::new())))
                .unwrap();
        }
        assert_eq!(state.entry_context().unwrap().name(), "entry");
        assert_eq!(state.previous_context().unwrap().name(), "token");
        assert_eq!(state.current_context().unwrap().name(), "trigger");

        state.exit_context();
        assert_eq!(state.current_context().unwrap().name(), "token");
    }

    #[test]
    fn test_caller_stack_base() {
        let mut state = MachineState::new(0);
        assert_eq!(state.caller_stack_base(), 0);
        state.push(VmObject::Number(1)).unwrap();
        state
            .enter_context(Arc::new(ScriptContext::new("entry", Vec::new())))
            .unwrap();
        state.push(VmObject::Number(2)).unwrap();
        state.push(VmObject::Number(3)).unwrap();
        state
            .enter_context(Arc::new(ScriptContext::new("callee", Vec::new())))
            .unwrap();
        assert_eq!(state.caller_stack_base(), 1);

        state.exit_context();
        assert_eq!(state.caller_stack_base(), 0);
    }

    #[test]
    fn test_context_depth_limit() {
        let mut state = MachineState::new(0);
        let ctx: Arc<dyn ExecutionContext> = Arc::new(ScriptContext::new("loop", Vec::new()));
        for _ in 0..MAX_CONTEXT_DEPTH {
            state.enter_context(ctx.clone()).unwrap();
        }
        assert_eq!(
            state.enter_context(ctx).unwrap_err(),
            VmError::ContextDepthExceeded(MAX_CONTEXT_DEPTH)
        );
    }

    #[test]
    fn test_register_requires_frame() {
        let mut state = MachineState::new(0);
        assert_eq!(state.register(0).unwrap_err(), VmError::NoActiveFrame);
        state.push_frame(ExecutionFrame::new("entry", 0)).unwrap();
        state.set_register(1, VmObject::Bool(true)).unwrap();
        assert_eq!(state.register(1).unwrap(), &VmObject::Bool(true));
    }
}
