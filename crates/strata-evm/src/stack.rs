//! EVM value stack and its pool

use crate::error::InternalError;
use strata_primitives::U256;

/// Maximum number of stack items
pub const STACK_LIMIT: usize = 1024;

/// EVM stack (max 1024 items, 256-bit each).
///
/// Arity is validated by the dispatch table before an instruction runs, so
/// a failing stack operation here is an [`InternalError`].
#[derive(Clone, Debug)]
pub struct Stack {
    data: Vec<U256>,
}

impl Stack {
    /// Create a new empty stack
    pub fn new() -> Self {
        Self {
            data: Vec::with_capacity(STACK_LIMIT),
        }
    }

    /// Push a value onto the stack
    #[inline]
    pub fn push(&mut self, value: U256) -> Result<(), InternalError> {
        if self.data.len() >= STACK_LIMIT {
            return Err(InternalError::StackOverflow);
        }
        self.data.push(value);
        Ok(())
    }

    /// Pop a value from the stack
    #[inline]
    pub fn pop(&mut self) -> Result<U256, InternalError> {
        self.data.pop().ok_or(InternalError::StackUnderflow)
    }

    /// Peek at a specific depth (0 = top)
    #[inline]
    pub fn peek(&self, n: usize) -> Result<&U256, InternalError> {
        let len = self.data.len();
        if n >= len {
            return Err(InternalError::StackUnderflow);
        }
        Ok(&self.data[len - 1 - n])
    }

    /// Mutable reference to the top item
    #[inline]
    pub fn top_mut(&mut self) -> Result<&mut U256, InternalError> {
        self.data.last_mut().ok_or(InternalError::StackUnderflow)
    }

    /// Swap top with the item `n` below it (1 = second item)
    pub fn swap(&mut self, n: usize) -> Result<(), InternalError> {
        let len = self.data.len();
        if n == 0 || n >= len {
            return Err(InternalError::StackUnderflow);
        }
        self.data.swap(len - 1, len - 1 - n);
        Ok(())
    }

    /// Push a copy of the `n`-th item (1 = top)
    pub fn dup(&mut self, n: usize) -> Result<(), InternalError> {
        let value = *self.peek(n.wrapping_sub(1))?;
        self.push(value)
    }

    /// Get current stack size
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if stack is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Items bottom to top
    pub fn data(&self) -> &[U256] {
        &self.data
    }

    /// Clear the stack
    pub fn clear(&mut self) {
        self.data.clear();
    }
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}

/// Free list of pre-allocated stacks
#[derive(Debug)]
pub struct StackPool {
    free: Vec<Stack>,
    capacity: usize,
}

impl StackPool {
    /// Pool retaining at most `capacity` idle stacks
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Take an empty stack, allocating if the pool is drained
    pub fn acquire(&mut self) -> Stack {
        self.free.pop().unwrap_or_default()
    }

    /// Return a stack; it is cleared before reuse
    pub fn release(&mut self, mut stack: Stack) {
        if self.free.len() < self.capacity {
            stack.clear();
            self.free.push(stack);
        }
    }

    /// Number of idle stacks
    pub fn idle(&self) -> usize {
        self.free.len()
    }
}
