//! Bounded LIFO stacks for operand passing
//!
//! The VM keeps two of these beside the call stack: the argument stack of
//! [`Value`](super::value::Value)s passed between instructions and across
//! calls, and the memory-register stack of addresses remembered while a
//! composite value is being built. The stack itself only reports overflow and
//! underflow; [`Memory`](super::Memory) maps them to the right error.

/// Stack enforced and size limited vector
#[derive(Debug, Clone)]
pub struct OperandStack<T> {
    values: Vec<T>,
    capacity: usize,
}

impl<T> OperandStack<T> {
    pub fn new(capacity: usize) -> Self {
        OperandStack {
            values: Vec::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current depth, the stack's top pointer
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Push a value, handing it back when the stack is full
    pub fn push(&mut self, value: T) -> Result<(), T> {
        if self.values.len() >= self.capacity {
            return Err(value);
        }
        self.values.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<T> {
        self.values.pop()
    }

    pub fn top(&self) -> Option<&T> {
        self.values.last()
    }

    pub fn clear(&mut self) {
        self.values.clear()
    }

    /// Bottom to top
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.values.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifo_and_bounds() {
        let mut stack = OperandStack::new(2);
        assert!(stack.push(1).is_ok());
        assert!(stack.push(2).is_ok());
        assert_eq!(stack.push(3), Err(3));
        assert_eq!(stack.top(), Some(&2));
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), None);
    }
}
