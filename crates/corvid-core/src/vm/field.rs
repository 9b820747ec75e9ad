//! Field access by compile-time index
//!
//! Two shapes exist. The implicit form reads `this` straight out of slot 0
//! of the current frame. The explicit form takes any receiver value and
//! type-checks it first. Both index the instance's field vector directly;
//! an out-of-range index means the compiler and runtime disagree about the
//! class layout and is treated as an assertion failure.

use super::Vm;
use crate::value::{ObjRef, Value};
use crate::{VmError, VmResult};

impl Vm {
    /// Load field `index` of `receiver`
    ///
    /// # Errors
    ///
    /// Returns `VmError::FieldTypeError` if `receiver` is not an instance.
    ///
    /// # Panics
    ///
    /// Panics if `index` is outside the instance's field vector.
    pub fn load_field(&self, receiver: Value, index: usize) -> VmResult<Value> {
        let obj = self.expect_instance(receiver)?;
        self.field_slot(obj, index)
    }

    /// Store `value` into field `index` of `receiver`
    ///
    /// # Errors
    ///
    /// Returns `VmError::FieldTypeError` if `receiver` is not an instance.
    ///
    /// # Panics
    ///
    /// Panics if `index` is outside the instance's field vector.
    pub fn store_field(&mut self, receiver: Value, index: usize, value: Value) -> VmResult<()> {
        let obj = self.expect_instance(receiver)?;
        *self.field_slot_mut(obj, index)? = value;
        Ok(())
    }

    /// Load field `index` of the current frame's receiver.
    ///
    /// # Panics
    ///
    /// Panics if the receiver is not an instance or `index` is out of range.
    pub(super) fn load_this_field(&self, index: usize) -> VmResult<Value> {
        let obj = self.this_instance()?;
        self.field_slot(obj, index)
    }

    /// Store into field `index` of the current frame's receiver.
    ///
    /// # Panics
    ///
    /// Panics if the receiver is not an instance or `index` is out of range.
    pub(super) fn store_this_field(&mut self, index: usize, value: Value) -> VmResult<()> {
        let obj = self.this_instance()?;
        *self.field_slot_mut(obj, index)? = value;
        Ok(())
    }

    fn expect_instance(&self, receiver: Value) -> VmResult<ObjRef> {
        receiver
            .as_object()
            .filter(|&obj| self.heap().instance(obj).is_some())
            .ok_or_else(|| {
                let kind = receiver
                    .as_object()
                    .and_then(|obj| self.heap().get(obj))
                    .map_or(receiver.type_name(), |object| object.kind());
                VmError::FieldTypeError(kind.to_string())
            })
    }

    fn this_instance(&self) -> VmResult<ObjRef> {
        let base = self
            .stack
            .current_frame()
            .map(|frame| frame.base_pointer)
            .ok_or_else(|| VmError::RuntimeError("No active call frame".to_string()))?;
        let this = self.stack.peek_at(base)?;

        let obj = this
            .as_object()
            .filter(|&obj| self.heap().instance(obj).is_some());
        assert!(
            obj.is_some(),
            "field access on `this` requires an instance receiver, got {:?}",
            this
        );
        obj.ok_or_else(|| VmError::FieldTypeError(this.type_name().to_string()))
    }

    fn field_slot(&self, obj: ObjRef, index: usize) -> VmResult<Value> {
        let instance = self
            .heap()
            .instance(obj)
            .ok_or_else(|| VmError::FieldTypeError(obj.to_string()))?;
        let count = instance.field_count();
        assert!(
            index < count,
            "field index {} out of bounds for instance with {} fields",
            index,
            count
        );
        Ok(instance.fields()[index])
    }

    fn field_slot_mut(&mut self, obj: ObjRef, index: usize) -> VmResult<&mut Value> {
        let instance = self
            .heap_mut()
            .instance_mut(obj)
            .ok_or_else(|| VmError::FieldTypeError(obj.to_string()))?;
        let count = instance.field_count();
        assert!(
            index < count,
            "field index {} out of bounds for instance with {} fields",
            index,
            count
        );
        instance
            .field_mut(index)
            .ok_or_else(|| VmError::RuntimeError(format!("field {} vanished", index)))
    }
}
