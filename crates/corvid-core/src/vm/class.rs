//! Class construction, inheritance binding and instantiation

use super::Vm;
use crate::bytecode::Function;
use crate::method::{Method, PrimitiveFn};
use crate::module::ModuleId;
use crate::object::{ClassObject, FieldLayout, HeapObject, Instance, OpaqueInstance, MAX_FIELDS};
use crate::symbol::Symbol;
use crate::value::{ObjRef, Value};
use crate::{VmError, VmResult};
use std::rc::Rc;
use tracing::{debug, trace};

impl Vm {
    // ===== Class Access =====

    /// Borrow a class object
    ///
    /// # Errors
    ///
    /// Returns `VmError::RuntimeError` if `class` is not a live class.
    pub fn class(&self, class: ObjRef) -> VmResult<&ClassObject> {
        self.heap()
            .class(class)
            .ok_or_else(|| VmError::RuntimeError(format!("{} is not a class", class)))
    }

    pub(super) fn class_mut(&mut self, class: ObjRef) -> VmResult<&mut ClassObject> {
        self.heap_mut()
            .class_mut(class)
            .ok_or_else(|| VmError::RuntimeError(format!("{} is not a class", class)))
    }

    /// Name of a class
    pub fn class_name(&self, class: ObjRef) -> Option<&str> {
        self.heap().class(class).map(|c| &*c.name)
    }

    /// The class of any value.
    ///
    /// Null, bools and numbers map to their core classes; the class of a
    /// class object is its metaclass.
    pub fn class_of(&self, value: Value) -> VmResult<ObjRef> {
        if value.is_null() {
            return Ok(self.core.null_class);
        }
        if value.is_bool() {
            return Ok(self.core.bool_class);
        }
        if value.is_i32() {
            return Ok(self.core.num_class);
        }

        value
            .as_object()
            .and_then(|obj| self.heap().get(obj))
            .and_then(HeapObject::class_of)
            .ok_or_else(|| VmError::RuntimeError(format!("{:?} has no class", value)))
    }

    /// Check whether `class` is `ancestor` or inherits from it
    pub fn is_subclass(&self, class: ObjRef, ancestor: ObjRef) -> bool {
        let mut current = Some(class);
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            current = self.heap().class(c).and_then(|c| c.superclass);
        }
        false
    }

    // ===== Construction =====

    /// Allocate a bare class shell with no superclass and no metaclass
    fn new_single_class(&mut self, layout: FieldLayout, name: &str) -> ObjRef {
        self.allocate(HeapObject::Class(ClassObject::shell(name, layout)))
    }

    /// Create a class and its metaclass and bind the class to `superclass`.
    ///
    /// `layout` holds the class's own field count; binding adds the
    /// superclass's. Every intermediate object stays rooted until the class
    /// is complete, and the roots are released on failure too.
    pub fn create_class(
        &mut self,
        superclass: ObjRef,
        layout: FieldLayout,
        name: &str,
    ) -> VmResult<ObjRef> {
        self.with_temp_roots(|vm| {
            vm.push_root(superclass);
            let class = vm.new_single_class(layout, name);
            vm.push_root(class);
            vm.finish_class(class, superclass)?;
            Ok(class)
        })
    }

    /// Give a class shell its metaclass and bind it to `superclass`.
    ///
    /// Metaclasses are instances of `Class` and inherit from `Class`
    /// directly; they do not mirror the subject hierarchy.
    pub(super) fn finish_class(&mut self, class: ObjRef, superclass: ObjRef) -> VmResult<()> {
        let root_metaclass = self.core.class;
        let name = Rc::clone(&self.class(class)?.name);
        let metaclass_name = format!("{} metaclass", name);

        self.with_temp_roots(|vm| {
            let metaclass = vm.new_single_class(FieldLayout::Fields(0), &metaclass_name);
            vm.push_root(metaclass);

            vm.class_mut(metaclass)?.metaclass = Some(root_metaclass);
            vm.bind_superclass(metaclass, root_metaclass)?;

            vm.class_mut(class)?.metaclass = Some(metaclass);
            vm.bind_superclass(class, superclass)?;

            debug!(
                class = %name,
                class_ref = %class,
                metaclass_ref = %metaclass,
                "created class"
            );
            Ok(())
        })
    }

    /// Bind `subclass` to `superclass`: add the inherited field count and
    /// copy the superclass's method table down into the subclass.
    ///
    /// The copy is a snapshot. Methods added to `superclass` later are not
    /// seen by `subclass`; methods the subclass defines later overwrite the
    /// copied slots.
    ///
    /// # Errors
    ///
    /// - `VmError::InvalidInheritance` if an opaque class would inherit
    ///   fields, or a class with fields would inherit from an opaque class
    /// - `VmError::TooManyFields` if the total exceeds [`MAX_FIELDS`]
    pub fn bind_superclass(&mut self, subclass: ObjRef, superclass: ObjRef) -> VmResult<()> {
        let (super_name, super_layout, inherited) = {
            let sup = self.class(superclass)?;
            (Rc::clone(&sup.name), sup.layout, sup.methods.clone())
        };
        let sub = self.class(subclass)?;

        let layout = match (sub.layout, super_layout) {
            (FieldLayout::Opaque, FieldLayout::Fields(0))
            | (FieldLayout::Opaque, FieldLayout::Opaque) => FieldLayout::Opaque,
            (FieldLayout::Opaque, FieldLayout::Fields(_)) => {
                return Err(VmError::InvalidInheritance {
                    class: sub.name.to_string(),
                    superclass: super_name.to_string(),
                    reason: "an opaque class cannot inherit fields",
                })
            }
            (FieldLayout::Fields(_), FieldLayout::Opaque) => {
                return Err(VmError::InvalidInheritance {
                    class: sub.name.to_string(),
                    superclass: super_name.to_string(),
                    reason: "a class with fields cannot inherit from an opaque class",
                })
            }
            (FieldLayout::Fields(own), FieldLayout::Fields(base)) => {
                let count = own + base;
                if count > MAX_FIELDS {
                    return Err(VmError::TooManyFields {
                        class: sub.name.to_string(),
                        count,
                    });
                }
                FieldLayout::Fields(count)
            }
        };

        let sub = self.class_mut(subclass)?;
        sub.layout = layout;
        sub.superclass = Some(superclass);
        sub.methods.copy_from(&inherited);

        debug!(
            class = %sub.name,
            superclass = %super_name,
            fields = ?layout.count(),
            inherited_methods = inherited.bound_count(),
            "bound superclass"
        );
        Ok(())
    }

    /// Check that `superclass` may be subclassed by a class named `name`.
    ///
    /// # Errors
    ///
    /// Returns `VmError::InvalidSuperclass` if the value is not a class, is
    /// one of the sealed core classes, or is opaque.
    pub fn validate_superclass(&self, name: &str, superclass: Value) -> VmResult<ObjRef> {
        let class = superclass
            .as_object()
            .filter(|&obj| self.heap().class(obj).is_some())
            .ok_or_else(|| {
                VmError::InvalidSuperclass(format!(
                    "Class '{}' cannot inherit from a non-class object.",
                    name
                ))
            })?;

        let core = self.core;
        let sealed = [core.class, core.bool_class, core.null_class, core.num_class];
        let super_class = self.class(class)?;
        if sealed.contains(&class) {
            return Err(VmError::InvalidSuperclass(format!(
                "Class '{}' cannot inherit from built-in class '{}'.",
                name, super_class.name
            )));
        }
        if super_class.is_opaque() {
            return Err(VmError::InvalidSuperclass(format!(
                "Class '{}' cannot inherit from foreign class '{}'.",
                name, super_class.name
            )));
        }
        Ok(class)
    }

    /// Validate `superclass` and create a class under it
    pub fn define_class(&mut self, superclass: Value, layout: FieldLayout, name: &str) -> VmResult<ObjRef> {
        let superclass = self.validate_superclass(name, superclass)?;
        self.create_class(superclass, layout, name)
    }

    // ===== Method Binding =====

    fn method_target(&self, class: ObjRef, is_static: bool) -> VmResult<ObjRef> {
        if !is_static {
            return Ok(class);
        }
        self.class(class)?.metaclass.ok_or_else(|| {
            VmError::RuntimeError(format!(
                "class '{}' has no metaclass",
                self.class_name(class).unwrap_or("<unknown>")
            ))
        })
    }

    /// Bind `method` at `symbol` on `class`, or on its metaclass for static
    /// methods
    pub fn bind_method(&mut self, class: ObjRef, symbol: Symbol, method: Method, is_static: bool) -> VmResult<()> {
        let target = self.method_target(class, is_static)?;
        let target = self.class_mut(target)?;
        trace!(
            class = %target.name,
            symbol = symbol.raw(),
            kind = method.kind(),
            is_static,
            "bound method"
        );
        target.methods.set(symbol, method);
        Ok(())
    }

    /// Bind a compiled method body.
    ///
    /// The body's field operands are rebased past the inherited fields and
    /// its super calls are pointed at the superclass of the class it lands
    /// on. `body` itself is left unchanged.
    pub fn bind_closure(&mut self, class: ObjRef, symbol: Symbol, body: &Function, is_static: bool) -> VmResult<()> {
        let target = self.method_target(class, is_static)?;
        let superclass = self.class(target)?.superclass;

        let inherited = match superclass {
            Some(sup) => self.class(sup)?.num_fields().unwrap_or(0),
            None => 0,
        };
        let super_value = superclass.map(Value::object).unwrap_or_default();

        let rebased = body.rebased(inherited, super_value)?;
        self.bind_method(target, symbol, Method::Closure(Rc::new(rebased)), false)
    }

    /// Bind a native primitive under a signature string, returning its symbol
    pub fn bind_primitive(&mut self, class: ObjRef, signature: &str, primitive: PrimitiveFn) -> VmResult<Symbol> {
        let symbol = self.intern_method(signature)?;
        self.bind_method(class, symbol, Method::Primitive(primitive), false)?;
        Ok(symbol)
    }

    /// Resolve and bind a foreign method registered for this class
    ///
    /// # Errors
    ///
    /// Returns `VmError::ForeignNotFound` if the host registered nothing for
    /// `(module, class, signature, is_static)`.
    pub fn bind_foreign_method(
        &mut self,
        module: ModuleId,
        class: ObjRef,
        symbol: Symbol,
        is_static: bool,
    ) -> VmResult<()> {
        let module_name = self.module(module)?.name().to_string();
        let class_name = self.class(class)?.name.to_string();
        let signature = self
            .method_symbols()
            .name(symbol)
            .ok_or_else(|| VmError::RuntimeError(format!("unknown method symbol {}", symbol)))?
            .to_string();

        let id = self
            .foreign_mut()
            .resolve_method(&module_name, &class_name, &signature, is_static)?;
        self.bind_method(class, symbol, Method::Foreign(id), is_static)
    }

    // ===== Instantiation =====

    /// Create an instance with every field null
    ///
    /// # Errors
    ///
    /// Returns `VmError::RuntimeError` for opaque classes, which are
    /// instantiated by their allocator.
    pub fn new_instance(&mut self, class: ObjRef) -> VmResult<ObjRef> {
        let class_obj = self.class(class)?;
        let count = class_obj.num_fields().ok_or_else(|| {
            VmError::RuntimeError(format!(
                "Class '{}' is opaque and can only be created by its allocator.",
                class_obj.name
            ))
        })?;

        self.with_temp_roots(|vm| {
            vm.push_root(class);
            Ok(vm.allocate(HeapObject::Instance(Instance::new(class, count))))
        })
    }

    /// Wrap a host payload in an instance of an opaque class
    pub fn new_opaque_instance(&mut self, class: ObjRef, data: Vec<u8>) -> VmResult<ObjRef> {
        let class_obj = self.class(class)?;
        if !class_obj.is_opaque() {
            return Err(VmError::RuntimeError(format!(
                "Class '{}' is not opaque.",
                class_obj.name
            )));
        }

        self.with_temp_roots(|vm| {
            vm.push_root(class);
            let instance = OpaqueInstance::new(class, data.into_boxed_slice());
            Ok(vm.allocate(HeapObject::Opaque(instance)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(_vm: &mut Vm, _args: &[Value]) -> VmResult<Value> {
        Ok(Value::i32(1))
    }

    fn other(_vm: &mut Vm, _args: &[Value]) -> VmResult<Value> {
        Ok(Value::i32(2))
    }

    #[test]
    fn test_create_class_wires_metaclass() {
        let mut vm = Vm::new().unwrap();
        let object = vm.core().object;
        let point = vm.create_class(object, FieldLayout::Fields(2), "Point").unwrap();

        let class = vm.class(point).unwrap();
        assert_eq!(&*class.name, "Point");
        assert_eq!(class.superclass, Some(object));
        assert_eq!(class.num_fields(), Some(2));

        let meta = class.metaclass.unwrap();
        let meta_class = vm.class(meta).unwrap();
        assert_eq!(&*meta_class.name, "Point metaclass");
        assert_eq!(meta_class.superclass, Some(vm.core().class));
        assert_eq!(meta_class.metaclass, Some(vm.core().class));
        assert_eq!(vm.class_of(Value::object(point)).unwrap(), meta);
    }

    #[test]
    fn test_field_counts_accumulate() {
        let mut vm = Vm::new().unwrap();
        let object = vm.core().object;
        let a = vm.create_class(object, FieldLayout::Fields(1), "A").unwrap();
        let b = vm.create_class(a, FieldLayout::Fields(2), "B").unwrap();
        let c = vm.create_class(b, FieldLayout::Fields(0), "C").unwrap();

        assert_eq!(vm.class(b).unwrap().num_fields(), Some(3));
        assert_eq!(vm.class(c).unwrap().num_fields(), Some(3));
        assert!(vm.is_subclass(c, a));
        assert!(!vm.is_subclass(a, c));
    }

    #[test]
    fn test_copy_down_is_snapshot() {
        let mut vm = Vm::new().unwrap();
        let object = vm.core().object;
        let base = vm.create_class(object, FieldLayout::Fields(0), "Base").unwrap();
        let early = vm.bind_primitive(base, "early", answer).unwrap();
        let derived = vm.create_class(base, FieldLayout::Fields(0), "Derived").unwrap();
        let late = vm.bind_primitive(base, "late", answer).unwrap();

        let derived_class = vm.class(derived).unwrap();
        assert_eq!(derived_class.methods.get(early), Method::Primitive(answer));
        assert!(derived_class.methods.get(late).is_absent());
    }

    #[test]
    fn test_override_leaves_superclass_alone() {
        let mut vm = Vm::new().unwrap();
        let object = vm.core().object;
        let base = vm.create_class(object, FieldLayout::Fields(0), "Base").unwrap();
        let foo = vm.bind_primitive(base, "foo", answer).unwrap();
        let derived = vm.create_class(base, FieldLayout::Fields(0), "Derived").unwrap();
        vm.bind_primitive(derived, "foo", other).unwrap();

        assert_eq!(vm.lookup_method(base, foo).unwrap(), Method::Primitive(answer));
        assert_eq!(vm.lookup_method(derived, foo).unwrap(), Method::Primitive(other));
    }

    #[test]
    fn test_static_methods_live_on_metaclass() {
        let mut vm = Vm::new().unwrap();
        let object = vm.core().object;
        let class = vm.create_class(object, FieldLayout::Fields(0), "Factory").unwrap();
        let make = vm.intern_method("make").unwrap();
        vm.bind_method(class, make, Method::Primitive(answer), true).unwrap();

        assert!(vm.class(class).unwrap().methods.get(make).is_absent());
        let meta = vm.class_of(Value::object(class)).unwrap();
        assert_eq!(vm.lookup_method(meta, make).unwrap(), Method::Primitive(answer));
    }

    #[test]
    fn test_opaque_class_rejects_inherited_fields() {
        let mut vm = Vm::new().unwrap();
        let object = vm.core().object;
        let three = vm.create_class(object, FieldLayout::Fields(3), "Three").unwrap();
        let err = vm.create_class(three, FieldLayout::Opaque, "Handle").unwrap_err();
        assert!(matches!(err, VmError::InvalidInheritance { .. }));

        let ok = vm.create_class(object, FieldLayout::Opaque, "File").unwrap();
        assert!(vm.class(ok).unwrap().is_opaque());
    }

    #[test]
    fn test_too_many_fields() {
        let mut vm = Vm::new().unwrap();
        let object = vm.core().object;
        let wide = vm.create_class(object, FieldLayout::Fields(200), "Wide").unwrap();
        let err = vm.create_class(wide, FieldLayout::Fields(56), "Wider").unwrap_err();
        assert!(matches!(err, VmError::TooManyFields { count: 256, .. }));

        let max = vm.create_class(wide, FieldLayout::Fields(55), "Widest").unwrap();
        assert_eq!(vm.class(max).unwrap().num_fields(), Some(MAX_FIELDS));
    }

    #[test]
    fn test_validate_superclass() {
        let mut vm = Vm::new().unwrap();
        let core = vm.core();

        for sealed in [core.class, core.bool_class, core.null_class, core.num_class] {
            let err = vm.validate_superclass("Sub", Value::object(sealed)).unwrap_err();
            assert!(matches!(err, VmError::InvalidSuperclass(_)));
        }
        assert!(vm.validate_superclass("Sub", Value::i32(3)).is_err());
        assert_eq!(
            vm.validate_superclass("Sub", Value::object(core.object)).unwrap(),
            core.object
        );

        let opaque = vm.create_class(core.object, FieldLayout::Opaque, "File").unwrap();
        assert!(vm.validate_superclass("Sub", Value::object(opaque)).is_err());
    }

    #[test]
    fn test_new_instance() {
        let mut vm = Vm::new().unwrap();
        let object = vm.core().object;
        let class = vm.create_class(object, FieldLayout::Fields(3), "Triple").unwrap();
        let instance = vm.new_instance(class).unwrap();

        let inst = vm.heap().instance(instance).unwrap();
        assert_eq!(inst.class, class);
        assert_eq!(inst.field_count(), 3);
        assert!(inst.fields().iter().all(Value::is_null));

        let opaque = vm.create_class(object, FieldLayout::Opaque, "File").unwrap();
        assert!(vm.new_instance(opaque).is_err());
        let handle = vm.new_opaque_instance(opaque, vec![1, 2]).unwrap();
        assert_eq!(&*vm.heap().opaque(handle).unwrap().data, &[1, 2]);
        assert!(vm.new_opaque_instance(class, vec![]).is_err());
    }
}
