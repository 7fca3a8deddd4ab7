//! VM value stack

use crate::error::{VmError, VmResult};
use crate::object::VmObject;

/// Maximum number of values on the stack
pub const MAX_STACK_SIZE: usize = 1024;

/// Value stack shared by every frame of one execution
#[derive(Clone, Debug, Default)]
pub struct Stack {
    data: Vec<VmObject>,
}

impl Stack {
    /// Create a new empty stack
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Push a value onto the stack
    pub fn push(&mut self, value: VmObject) -> VmResult<()> {
        if self.data.len() >= MAX_STACK_SIZE {
            return Err(VmError::StackOverflow(MAX_STACK_SIZE));
        }
        self.data.push(value);
        Ok(())
    }

    /// Pop a value from the stack
    pub fn pop(&mut self) -> VmResult<VmObject> {
        self.data.pop().ok_or(VmError::StackUnderflow)
    }

    /// Peek at the top of the stack
    pub fn peek(&self) -> VmResult<&VmObject> {
        self.data.last().ok_or(VmError::StackUnderflow)
    }

    /// Peek at a specific depth (0 = top)
    pub fn peek_at(&self, depth: usize) -> VmResult<&VmObject> {
        if depth >= self.data.len() {
            return Err(VmError::StackUnderflow);
        }
        Ok(&self.data[self.data.len() - 1 - depth])
    }

    /// Get stack size
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if stack is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Remove every value
    pub fn clear(&mut self) {
        self.data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop() {
        let mut stack = Stack::new();
        stack.push(VmObject::Number(1)).unwrap();
        stack.push(VmObject::from("two")).unwrap();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.peek_at(1).unwrap(), &VmObject::Number(1));
        assert_eq!(stack.pop().unwrap(), VmObject::from("two"));
        assert_eq!(stack.pop().unwrap(), VmObject::Number(1));
        assert_eq!(stack.pop(), Err(VmError::StackUnderflow));
    }

    #[test]
    fn test_overflow() {
        let mut stack = Stack::new();
        for i in 0..MAX_STACK_SIZE {
            stack.push(VmObject::Number(i as i128)).unwrap();
        }
        assert_eq!(
            stack.push(VmObject::None),
            Err(VmError::StackOverflow(MAX_STACK_SIZE))
        );
    }
}
