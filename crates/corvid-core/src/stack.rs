//! Stack and call frame management
//!
//! One operand stack is shared by every active call. A call frame marks where
//! its slots begin: slot 0 is the receiver, then the arguments, then the
//! remaining locals. Temporaries are pushed above the frame's slots.
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │   temporaries                       │  ← top
//! ├─────────────────────────────────────┤
//! │ Frame N: locals, args, receiver     │  ← base_pointer
//! ├─────────────────────────────────────┤
//! │ Frame N-1                           │
//! │   ...                               │
//! └─────────────────────────────────────┘
//! ```

use crate::bytecode::Function;
use crate::{value::Value, VmError, VmResult};
use std::rc::Rc;

/// Call frame for a closure invocation
#[derive(Debug, Clone)]
pub struct CallFrame {
    /// Function being executed
    pub function: Rc<Function>,

    /// Stack index of slot 0 (the receiver)
    pub base_pointer: usize,
}

impl CallFrame {
    /// Number of slots owned by this frame
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.function.slot_count
    }
}

/// Operand and call frame stack for the VM
#[derive(Debug)]
pub struct Stack {
    /// Stack slots (frames + temporaries)
    slots: Vec<Value>,

    /// Call frames
    frames: Vec<CallFrame>,

    /// Maximum number of active frames
    max_frames: usize,
}

impl Stack {
    /// Create a stack with an initial slot capacity and a frame limit
    pub fn with_capacity(capacity: usize, max_frames: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            frames: Vec::with_capacity(max_frames.min(256)),
            max_frames,
        }
    }

    // ========================================================================
    // Operand Stack Operations
    // ========================================================================

    /// Push a value onto the stack
    #[inline]
    pub fn push(&mut self, value: Value) {
        self.slots.push(value);
    }

    /// Pop a value from the stack
    ///
    /// # Errors
    ///
    /// Returns `VmError::StackUnderflow` if the stack is empty.
    #[inline]
    pub fn pop(&mut self) -> VmResult<Value> {
        self.slots.pop().ok_or(VmError::StackUnderflow)
    }

    /// Peek at the top value without popping
    ///
    /// # Errors
    ///
    /// Returns `VmError::StackUnderflow` if the stack is empty.
    #[inline]
    pub fn peek(&self) -> VmResult<Value> {
        self.peek_n(0)
    }

    /// Peek at value N slots from top (0 = top)
    ///
    /// # Errors
    ///
    /// Returns `VmError::StackUnderflow` if not enough values on stack.
    #[inline]
    pub fn peek_n(&self, n: usize) -> VmResult<Value> {
        let depth = self.slots.len();
        if depth <= n {
            return Err(VmError::StackUnderflow);
        }
        Ok(self.slots[depth - 1 - n])
    }

    /// Peek at value at absolute stack position
    ///
    /// # Errors
    ///
    /// Returns `VmError::StackUnderflow` if position is out of bounds.
    #[inline]
    pub fn peek_at(&self, pos: usize) -> VmResult<Value> {
        self.slots.get(pos).copied().ok_or(VmError::StackUnderflow)
    }

    /// Set value at absolute stack position
    ///
    /// # Errors
    ///
    /// Returns `VmError::StackUnderflow` if position is out of bounds.
    #[inline]
    pub fn set_at(&mut self, pos: usize, value: Value) -> VmResult<()> {
        let slot = self.slots.get_mut(pos).ok_or(VmError::StackUnderflow)?;
        *slot = value;
        Ok(())
    }

    /// Values from `base` to the top
    ///
    /// # Errors
    ///
    /// Returns `VmError::StackUnderflow` if `base` is past the top.
    pub fn slice_from(&self, base: usize) -> VmResult<&[Value]> {
        self.slots.get(base..).ok_or(VmError::StackUnderflow)
    }

    /// Drop everything above `depth`
    #[inline]
    pub fn truncate(&mut self, depth: usize) {
        self.slots.truncate(depth);
    }

    /// Get current stack depth
    #[inline]
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// Check if stack is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    // ========================================================================
    // Call Frame Management
    // ========================================================================

    /// Push a frame whose receiver and arguments already sit at `base`.
    ///
    /// Missing locals are filled with null.
    ///
    /// # Errors
    ///
    /// Returns `VmError::StackOverflow` if the frame limit is reached, or
    /// `VmError::StackUnderflow` if `base` is past the top.
    pub fn push_frame(&mut self, function: Rc<Function>, base: usize) -> VmResult<()> {
        if self.frames.len() >= self.max_frames {
            return Err(VmError::StackOverflow);
        }
        if base > self.slots.len() {
            return Err(VmError::StackUnderflow);
        }

        let end = base + function.slot_count;
        if self.slots.len() < end {
            self.slots.resize(end, Value::null());
        }
        self.frames.push(CallFrame {
            function,
            base_pointer: base,
        });
        Ok(())
    }

    /// Pop the current frame, discarding its slots and temporaries
    ///
    /// # Errors
    ///
    /// Returns `VmError::RuntimeError` if no frames to pop.
    pub fn pop_frame(&mut self) -> VmResult<CallFrame> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| VmError::RuntimeError("No call frame to pop".to_string()))?;
        self.slots.truncate(frame.base_pointer);
        Ok(frame)
    }

    /// Drop frames above `frame_count` and slots above `depth`.
    ///
    /// Used to restore the stack after an error unwinds out of a call.
    pub fn unwind_to(&mut self, frame_count: usize, depth: usize) {
        self.frames.truncate(frame_count);
        self.slots.truncate(depth);
    }

    /// Get the current call frame
    #[inline]
    pub fn current_frame(&self) -> Option<&CallFrame> {
        self.frames.last()
    }

    /// Get the number of active frames
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    // ========================================================================
    // Local Variable Access
    // ========================================================================

    fn local_index(&self, index: usize) -> VmResult<usize> {
        let frame = self
            .current_frame()
            .ok_or_else(|| VmError::RuntimeError("No active call frame".to_string()))?;

        if index >= frame.slot_count() {
            return Err(VmError::RuntimeError(format!(
                "Local index {} out of bounds (max {})",
                index,
                frame.slot_count()
            )));
        }
        Ok(frame.base_pointer + index)
    }

    /// Load a frame slot by index
    ///
    /// # Errors
    ///
    /// Returns error if no active frame or index out of bounds.
    #[inline]
    pub fn load_local(&self, index: usize) -> VmResult<Value> {
        let slot = self.local_index(index)?;
        self.peek_at(slot)
    }

    /// Store a value to a frame slot
    ///
    /// # Errors
    ///
    /// Returns error if no active frame or index out of bounds.
    #[inline]
    pub fn store_local(&mut self, index: usize, value: Value) -> VmResult<()> {
        let slot = self.local_index(index)?;
        self.set_at(slot, value)
    }

    // ========================================================================
    // GC Root Integration
    // ========================================================================

    /// Iterate over all values on the stack (for GC)
    pub fn iter_values(&self) -> impl Iterator<Item = Value> + '_ {
        self.slots.iter().copied()
    }

    /// Functions of all active frames (for GC)
    pub fn frame_functions(&self) -> impl Iterator<Item = &Rc<Function>> + '_ {
        self.frames.iter().map(|f| &f.function)
    }
}
