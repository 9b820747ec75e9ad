//! Core class bootstrap and primitives
//!
//! `Object`, `Class` and `Object metaclass` refer to each other, so they
//! are allocated as bare shells first and wired together afterwards:
//!
//! ```text
//! class            superclass   class-of
//! Object           -            Object metaclass
//! Class            Object       Class
//! Object metaclass Class        Class
//! ```
//!
//! Object's primitives are bound before `Class` copies them down; `Bool`,
//! `Null` and `Num` are finished through the regular class path afterwards.

use super::{Vm, VmOptions, ALLOCATE_SIGNATURE};
use crate::foreign::ForeignRegistry;
use crate::gc::GarbageCollector;
use crate::object::{ClassObject, FieldLayout, HeapObject};
use crate::stack::Stack;
use crate::symbol::SymbolTable;
use crate::value::{ObjRef, Value};
use crate::{VmError, VmResult};
use tracing::debug;

/// Built-in classes every VM starts with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreClasses {
    /// Root of the class hierarchy
    pub object: ObjRef,
    /// Class of all metaclasses, and its own class
    pub class: ObjRef,
    /// Class of `Object`
    pub object_metaclass: ObjRef,
    /// Class of `true` and `false`
    pub bool_class: ObjRef,
    /// Class of `null`
    pub null_class: ObjRef,
    /// Class of numbers
    pub num_class: ObjRef,
}

impl CoreClasses {
    /// All core classes
    pub fn iter(&self) -> impl Iterator<Item = ObjRef> {
        [
            self.object,
            self.class,
            self.object_metaclass,
            self.bool_class,
            self.null_class,
            self.num_class,
        ]
        .into_iter()
    }
}

fn shell(gc: &mut GarbageCollector, name: &str) -> ObjRef {
    gc.insert(HeapObject::Class(ClassObject::shell(name, FieldLayout::Fields(0))))
}

/// Build a VM with its core classes wired and primitives bound
pub(super) fn bootstrap(options: VmOptions) -> VmResult<Vm> {
    // Phase one: shells, inserted directly so nothing can be collected yet
    let mut gc = GarbageCollector::new(options.gc_threshold, options.gc_growth_percent);
    let core = CoreClasses {
        object: shell(&mut gc, "Object"),
        class: shell(&mut gc, "Class"),
        object_metaclass: shell(&mut gc, "Object metaclass"),
        bool_class: shell(&mut gc, "Bool"),
        null_class: shell(&mut gc, "Null"),
        num_class: shell(&mut gc, "Num"),
    };

    let mut method_symbols = SymbolTable::new();
    let allocate_symbol = method_symbols.intern(ALLOCATE_SIGNATURE)?;

    let mut vm = Vm {
        gc,
        stack: Stack::with_capacity(options.stack_capacity, options.max_call_depth),
        method_symbols,
        modules: Vec::new(),
        foreign: ForeignRegistry::new(),
        core,
        allocate_symbol,
        options,
    };

    // Phase two: wiring
    bind_object_primitives(&mut vm, core.object)?;

    vm.bind_superclass(core.class, core.object)?;
    vm.bind_primitive(core.class, "supertype", class_supertype)?;

    vm.bind_superclass(core.object_metaclass, core.class)?;

    vm.class_mut(core.object)?.metaclass = Some(core.object_metaclass);
    vm.class_mut(core.object_metaclass)?.metaclass = Some(core.class);
    vm.class_mut(core.class)?.metaclass = Some(core.class);

    vm.finish_class(core.bool_class, core.object)?;
    vm.bind_primitive(core.bool_class, "!", bool_not)?;

    vm.finish_class(core.null_class, core.object)?;
    vm.bind_primitive(core.null_class, "!", null_not)?;

    vm.finish_class(core.num_class, core.object)?;
    vm.bind_primitive(core.num_class, "+(_)", num_plus)?;
    vm.bind_primitive(core.num_class, "-(_)", num_minus)?;
    vm.bind_primitive(core.num_class, "*(_)", num_multiply)?;
    vm.bind_primitive(core.num_class, "<(_)", num_lt)?;
    vm.bind_primitive(core.num_class, "-", num_negate)?;

    debug!(
        live_objects = vm.heap().live_count(),
        method_symbols = vm.method_symbols().len(),
        "core classes bootstrapped"
    );
    Ok(vm)
}

fn bind_object_primitives(vm: &mut Vm, object: ObjRef) -> VmResult<()> {
    vm.bind_primitive(object, "==(_)", object_eq)?;
    vm.bind_primitive(object, "!=(_)", object_neq)?;
    vm.bind_primitive(object, "!", object_not)?;
    vm.bind_primitive(object, "is(_)", object_is)?;
    vm.bind_primitive(object, "type", object_type)?;
    Ok(())
}

// ===== Primitives =====
//
// `args[0]` is always the receiver; the dispatcher guarantees the argument
// count matches the signature.

fn object_eq(_vm: &mut Vm, args: &[Value]) -> VmResult<Value> {
    Ok(Value::bool(args[0] == args[1]))
}

fn object_neq(_vm: &mut Vm, args: &[Value]) -> VmResult<Value> {
    Ok(Value::bool(args[0] != args[1]))
}

fn object_not(_vm: &mut Vm, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::bool(false))
}

fn object_is(vm: &mut Vm, args: &[Value]) -> VmResult<Value> {
    let target = args[1]
        .as_object()
        .filter(|&obj| vm.heap().class(obj).is_some())
        .ok_or_else(|| VmError::TypeError("Right operand must be a class.".to_string()))?;
    let class = vm.class_of(args[0])?;
    Ok(Value::bool(vm.is_subclass(class, target)))
}

fn object_type(vm: &mut Vm, args: &[Value]) -> VmResult<Value> {
    vm.class_of(args[0]).map(Value::object)
}

fn class_supertype(vm: &mut Vm, args: &[Value]) -> VmResult<Value> {
    let class = receiver_class(vm, args[0])?;
    Ok(vm
        .class(class)?
        .superclass
        .map(Value::object)
        .unwrap_or_default())
}

fn receiver_class(vm: &Vm, receiver: Value) -> VmResult<ObjRef> {
    receiver
        .as_object()
        .filter(|&obj| vm.heap().class(obj).is_some())
        .ok_or_else(|| VmError::TypeError("receiver must be a class".to_string()))
}

fn bool_not(_vm: &mut Vm, args: &[Value]) -> VmResult<Value> {
    Ok(Value::bool(!args[0].as_bool().unwrap_or(false)))
}

fn null_not(_vm: &mut Vm, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::bool(true))
}

fn num_operands(args: &[Value]) -> VmResult<(i32, i32)> {
    let lhs = args[0]
        .as_i32()
        .ok_or_else(|| VmError::TypeError("Receiver must be a number.".to_string()))?;
    let rhs = args[1]
        .as_i32()
        .ok_or_else(|| VmError::TypeError("Right operand must be a number.".to_string()))?;
    Ok((lhs, rhs))
}

fn overflow() -> VmError {
    VmError::RuntimeError("Integer overflow".to_string())
}

fn num_plus(_vm: &mut Vm, args: &[Value]) -> VmResult<Value> {
    let (a, b) = num_operands(args)?;
    a.checked_add(b).map(Value::i32).ok_or_else(overflow)
}

fn num_minus(_vm: &mut Vm, args: &[Value]) -> VmResult<Value> {
    let (a, b) = num_operands(args)?;
    a.checked_sub(b).map(Value::i32).ok_or_else(overflow)
}

fn num_multiply(_vm: &mut Vm, args: &[Value]) -> VmResult<Value> {
    let (a, b) = num_operands(args)?;
    a.checked_mul(b).map(Value::i32).ok_or_else(overflow)
}

fn num_lt(_vm: &mut Vm, args: &[Value]) -> VmResult<Value> {
    let (a, b) = num_operands(args)?;
    Ok(Value::bool(a < b))
}

fn num_negate(_vm: &mut Vm, args: &[Value]) -> VmResult<Value> {
    let a = args[0]
        .as_i32()
        .ok_or_else(|| VmError::TypeError("Receiver must be a number.".to_string()))?;
    a.checked_neg().map(Value::i32).ok_or_else(overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_hierarchy() {
        let vm = Vm::new().unwrap();
        let core = vm.core();

        let object = vm.class(core.object).unwrap();
        assert_eq!(object.superclass, None);
        assert_eq!(object.metaclass, Some(core.object_metaclass));

        let class = vm.class(core.class).unwrap();
        assert_eq!(class.superclass, Some(core.object));
        assert_eq!(class.metaclass, Some(core.class));

        let meta = vm.class(core.object_metaclass).unwrap();
        assert_eq!(&*meta.name, "Object metaclass");
        assert_eq!(meta.superclass, Some(core.class));
        assert_eq!(meta.metaclass, Some(core.class));
    }

    #[test]
    fn test_value_classes() {
        let vm = Vm::new().unwrap();
        let core = vm.core();
        assert_eq!(vm.class_of(Value::null()).unwrap(), core.null_class);
        assert_eq!(vm.class_of(Value::bool(true)).unwrap(), core.bool_class);
        assert_eq!(vm.class_of(Value::i32(4)).unwrap(), core.num_class);
        assert_eq!(vm.class_of(Value::object(core.object)).unwrap(), core.object_metaclass);
        assert_eq!(vm.class_of(Value::object(core.class)).unwrap(), core.class);

        for class in [core.bool_class, core.null_class, core.num_class] {
            let c = vm.class(class).unwrap();
            assert_eq!(c.superclass, Some(core.object));
            let meta = vm.class(c.metaclass.unwrap()).unwrap();
            assert_eq!(meta.superclass, Some(core.class));
        }
    }

    #[test]
    fn test_object_primitives_are_inherited() {
        let mut vm = Vm::new().unwrap();
        let eq = vm.find_method("==(_)").unwrap();
        let is = vm.find_method("is(_)").unwrap();
        let core = vm.core();

        let r = vm.call_method(Value::i32(3), eq, &[Value::i32(3)]).unwrap();
        assert_eq!(r, Value::bool(true));

        let object = Value::object(core.object);
        let num = Value::object(core.num_class);
        assert_eq!(vm.call_method(Value::i32(1), is, &[num]).unwrap(), Value::bool(true));
        assert_eq!(vm.call_method(Value::i32(1), is, &[object]).unwrap(), Value::bool(true));
        assert_eq!(
            vm.call_method(Value::bool(true), is, &[num]).unwrap(),
            Value::bool(false)
        );
        assert!(vm.call_method(Value::i32(1), is, &[Value::i32(2)]).is_err());
    }

    #[test]
    fn test_supertype_and_type() {
        let mut vm = Vm::new().unwrap();
        let core = vm.core();
        let supertype = vm.find_method("supertype").unwrap();
        let type_sym = vm.find_method("type").unwrap();

        let num = Value::object(core.num_class);
        assert_eq!(
            vm.call_method(num, supertype, &[]).unwrap(),
            Value::object(core.object)
        );
        assert!(vm
            .call_method(Value::object(core.object), supertype, &[])
            .unwrap()
            .is_null());
        assert_eq!(vm.call_method(Value::i32(5), type_sym, &[]).unwrap(), num);
    }

    #[test]
    fn test_num_primitives() {
        let mut vm = Vm::new().unwrap();
        let minus = vm.find_method("-(_)").unwrap();
        let negate = vm.find_method("-").unwrap();
        let lt = vm.find_method("<(_)").unwrap();
        let not = vm.find_method("!").unwrap();

        assert_eq!(vm.call_method(Value::i32(5), minus, &[Value::i32(7)]).unwrap(), Value::i32(-2));
        assert_eq!(vm.call_method(Value::i32(5), negate, &[]).unwrap(), Value::i32(-5));
        assert_eq!(vm.call_method(Value::i32(1), lt, &[Value::i32(2)]).unwrap(), Value::bool(true));
        assert!(matches!(
            vm.call_method(Value::i32(1), minus, &[Value::null()]),
            Err(VmError::TypeError(_))
        ));
        let plus = vm.find_method("+(_)").unwrap();
        assert!(vm
            .call_method(Value::i32(i32::MAX), plus, &[Value::i32(1)])
            .is_err());

        assert_eq!(vm.call_method(Value::bool(true), not, &[]).unwrap(), Value::bool(false));
        assert_eq!(vm.call_method(Value::null(), not, &[]).unwrap(), Value::bool(true));
        assert_eq!(vm.call_method(Value::i32(0), not, &[]).unwrap(), Value::bool(false));
    }
}
