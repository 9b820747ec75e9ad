//! Corvid VM Core
//!
//! This crate provides the object model and method dispatch of the Corvid VM:
//! - Symbol interning shared by the compiler and the runtime
//! - Classes as objects, with metaclasses built by two-phase construction
//! - Copy-down inheritance into symbol-indexed method tables
//! - Dynamic and super dispatch, field access, instantiation
//! - Foreign (host) methods and opaque classes
//! - An arena heap with mark-sweep collection
//!
//! # Example
//!
//! ```ignore
//! use corvid_core::{FieldLayout, Signature, Vm};
//!
//! let mut vm = Vm::new()?;
//! let object = vm.core().object;
//! let point = vm.create_class(object, FieldLayout::Fields(2), "Point")?;
//! let instance = vm.new_instance(point)?;
//! let to_s = vm.intern_signature(&Signature::getter("toString"))?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bytecode;
pub mod foreign;
pub mod gc;
pub mod method;
pub mod module;
pub mod object;
pub mod signature;
pub mod stack;
pub mod symbol;
pub mod value;
pub mod vm;

pub use bytecode::{Constant, Function, FunctionBuilder, Opcode};
pub use foreign::{ForeignId, ForeignRegistry};
pub use gc::{GarbageCollector, GcStats, HeapStats};
pub use method::{Method, MethodTable, PrimitiveFn};
pub use module::{Module, ModuleId};
pub use object::{ClassObject, FieldLayout, HeapObject, Instance, OpaqueInstance, MAX_FIELDS};
pub use signature::{Signature, SignatureKind};
pub use stack::{CallFrame, Stack};
pub use symbol::{SharedSymbolTable, Symbol, SymbolTable};
pub use value::{ObjRef, Value};
pub use vm::{CoreClasses, Vm, VmOptions};

/// VM errors
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    /// Symbol table could not grow
    #[error("Symbol table overflow")]
    SymbolOverflow,

    /// Opaque class bound to a superclass with fields
    #[error("Class '{class}' cannot inherit from '{superclass}': {reason}")]
    InvalidInheritance {
        /// Subclass name
        class: String,
        /// Superclass name
        superclass: String,
        /// What made the pair incompatible
        reason: &'static str,
    },

    /// Dispatch on a symbol the receiver's class does not implement
    #[error("{class} does not implement '{signature}'.")]
    MethodNotFound {
        /// Receiver class name
        class: String,
        /// Signature of the missing method
        signature: String,
    },

    /// Explicit field access on a non-instance
    #[error("Only instances have fields, got {0}.")]
    FieldTypeError(String),

    /// Superclass rejected at class definition
    #[error("{0}")]
    InvalidSuperclass(String),

    /// Class exceeds the field limit
    #[error("Class '{class}' may not have more than {max} fields, including inherited ones (got {count}).", max = crate::object::MAX_FIELDS)]
    TooManyFields {
        /// Class name
        class: String,
        /// Requested total field count
        count: usize,
    },

    /// Stack overflow
    #[error("Stack overflow")]
    StackOverflow,

    /// Stack underflow
    #[error("Stack underflow")]
    StackUnderflow,

    /// Invalid opcode
    #[error("Invalid opcode: {0}")]
    InvalidOpcode(u8),

    /// Truncated instruction
    #[error("Unexpected end of bytecode")]
    UnexpectedEndOfCode,

    /// Operand does not fit its encoding
    #[error("Operand overflow: {0}")]
    OperandOverflow(&'static str),

    /// Constant index out of range or of the wrong kind
    #[error("Invalid constant: {0}")]
    InvalidConstant(u16),

    /// Module variable redefined or undefined
    #[error("Module variable error: {0}")]
    ModuleVariable(String),

    /// No host callback registered for a foreign method or class
    #[error("Could not find foreign {0}")]
    ForeignNotFound(String),

    /// Host callback reported a failure
    #[error("Foreign call failed: {0}")]
    Foreign(String),

    /// Type error
    #[error("Type error: {0}")]
    TypeError(String),

    /// Runtime error
    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

impl VmError {
    /// Check whether a running script may catch this error.
    ///
    /// Construction failures and resource exhaustion are not recoverable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            VmError::MethodNotFound { .. }
                | VmError::FieldTypeError(_)
                | VmError::Foreign(_)
                | VmError::TypeError(_)
                | VmError::RuntimeError(_)
        )
    }
}

/// VM result
pub type VmResult<T> = Result<T, VmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = VmError::MethodNotFound {
            class: "Point".to_string(),
            signature: "foo()".to_string(),
        };
        assert_eq!(err.to_string(), "Point does not implement 'foo()'.");

        let err = VmError::TooManyFields {
            class: "Big".to_string(),
            count: 300,
        };
        assert!(err.to_string().contains("255"));
    }

    #[test]
    fn test_recoverability() {
        assert!(VmError::FieldTypeError("num".into()).is_recoverable());
        assert!(VmError::MethodNotFound {
            class: "A".into(),
            signature: "b".into()
        }
        .is_recoverable());
        assert!(!VmError::SymbolOverflow.is_recoverable());
        assert!(!VmError::InvalidInheritance {
            class: "A".into(),
            superclass: "B".into(),
            reason: "x"
        }
        .is_recoverable());
    }
}
