//! Object model: class objects, instances and opaque instances
//!
//! Classes are themselves heap objects. A class's own class is its
//! metaclass, which is why [`ClassObject::metaclass`] is a heap handle and
//! not a separate kind of entity.

use crate::method::MethodTable;
use crate::value::{ObjRef, Value};
use std::rc::Rc;

/// Maximum fields a class may have, including inherited ones.
///
/// Field operands in bytecode are a single byte.
pub const MAX_FIELDS: usize = 255;

/// How instances of a class are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLayout {
    /// Inspectable field vector with this many slots
    Fields(usize),
    /// Natively represented instances with no visible fields
    Opaque,
}

impl FieldLayout {
    /// Field count, or None for opaque layouts
    #[inline]
    pub fn count(self) -> Option<usize> {
        match self {
            FieldLayout::Fields(n) => Some(n),
            FieldLayout::Opaque => None,
        }
    }

    /// Check for the opaque layout
    #[inline]
    pub fn is_opaque(self) -> bool {
        matches!(self, FieldLayout::Opaque)
    }
}

/// Class object (heap-allocated)
#[derive(Debug, Clone)]
pub struct ClassObject {
    /// Class name
    pub name: Rc<str>,
    /// Superclass (None only for the root class)
    pub superclass: Option<ObjRef>,
    /// Instance layout. Before binding this holds the class's own fields;
    /// binding adds the superclass's count.
    pub layout: FieldLayout,
    /// Method table indexed by method symbol
    pub methods: MethodTable,
    /// Class of this class. None only while the class is a bare shell.
    pub metaclass: Option<ObjRef>,
}

impl ClassObject {
    /// Create an unwired class shell: no superclass, no metaclass, no methods
    pub fn shell(name: impl Into<Rc<str>>, layout: FieldLayout) -> Self {
        Self {
            name: name.into(),
            superclass: None,
            layout,
            methods: MethodTable::new(),
            metaclass: None,
        }
    }

    /// Field count (None for opaque classes)
    #[inline]
    pub fn num_fields(&self) -> Option<usize> {
        self.layout.count()
    }

    /// Check whether instances are opaque
    #[inline]
    pub fn is_opaque(&self) -> bool {
        self.layout.is_opaque()
    }
}

/// Instance with a fixed-length field vector
#[derive(Debug, Clone)]
pub struct Instance {
    /// Owning class
    pub class: ObjRef,
    /// Field values; the length never changes after creation
    fields: Box<[Value]>,
}

impl Instance {
    /// Create an instance with `field_count` null fields
    pub fn new(class: ObjRef, field_count: usize) -> Self {
        Self {
            class,
            fields: vec![Value::null(); field_count].into_boxed_slice(),
        }
    }

    /// Get a field value by index
    #[inline]
    pub fn field(&self, index: usize) -> Option<Value> {
        self.fields.get(index).copied()
    }

    /// Get a mutable field slot by index
    #[inline]
    pub fn field_mut(&mut self, index: usize) -> Option<&mut Value> {
        self.fields.get_mut(index)
    }

    /// All fields in order
    pub fn fields(&self) -> &[Value] {
        &self.fields
    }

    /// Get number of fields
    #[inline]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

/// Instance of an opaque class, backed by host bytes
#[derive(Debug, Clone)]
pub struct OpaqueInstance {
    /// Owning class
    pub class: ObjRef,
    /// Host payload, sized by the class's allocator
    pub data: Box<[u8]>,
}

impl OpaqueInstance {
    /// Wrap a host payload
    pub fn new(class: ObjRef, data: Box<[u8]>) -> Self {
        Self { class, data }
    }
}

/// Anything that lives in the heap arena
#[derive(Debug, Clone)]
pub enum HeapObject {
    /// Class or metaclass
    Class(ClassObject),
    /// Field-vector instance
    Instance(Instance),
    /// Opaque instance
    Opaque(OpaqueInstance),
}

impl HeapObject {
    /// Kind name for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            HeapObject::Class(_) => "class",
            HeapObject::Instance(_) => "instance",
            HeapObject::Opaque(_) => "opaque instance",
        }
    }

    /// Borrow as a class object
    pub fn as_class(&self) -> Option<&ClassObject> {
        match self {
            HeapObject::Class(c) => Some(c),
            _ => None,
        }
    }

    /// Mutably borrow as a class object
    pub fn as_class_mut(&mut self) -> Option<&mut ClassObject> {
        match self {
            HeapObject::Class(c) => Some(c),
            _ => None,
        }
    }

    /// Borrow as an instance
    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            HeapObject::Instance(i) => Some(i),
            _ => None,
        }
    }

    /// Mutably borrow as an instance
    pub fn as_instance_mut(&mut self) -> Option<&mut Instance> {
        match self {
            HeapObject::Instance(i) => Some(i),
            _ => None,
        }
    }

    /// Borrow as an opaque instance
    pub fn as_opaque(&self) -> Option<&OpaqueInstance> {
        match self {
            HeapObject::Opaque(o) => Some(o),
            _ => None,
        }
    }

    /// Mutably borrow as an opaque instance
    pub fn as_opaque_mut(&mut self) -> Option<&mut OpaqueInstance> {
        match self {
            HeapObject::Opaque(o) => Some(o),
            _ => None,
        }
    }

    /// The class this object is an instance of.
    ///
    /// For class objects this is the metaclass, which is unset on shells.
    pub fn class_of(&self) -> Option<ObjRef> {
        match self {
            HeapObject::Class(c) => c.metaclass,
            HeapObject::Instance(i) => Some(i.class),
            HeapObject::Opaque(o) => Some(o.class),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_fields_start_null() {
        let inst = Instance::new(ObjRef::from_index(0), 3);
        assert_eq!(inst.field_count(), 3);
        assert!(inst.fields().iter().all(|v| v.is_null()));
    }

    #[test]
    fn test_instance_field_access() {
        let mut inst = Instance::new(ObjRef::from_index(0), 2);
        *inst.field_mut(1).unwrap() = Value::i32(42);
        assert_eq!(inst.field(1), Some(Value::i32(42)));
        assert_eq!(inst.field(2), None);
        assert!(inst.field_mut(2).is_none());
    }

    #[test]
    fn test_layout() {
        assert_eq!(FieldLayout::Fields(2).count(), Some(2));
        assert_eq!(FieldLayout::Opaque.count(), None);
        assert!(FieldLayout::Opaque.is_opaque());
    }

    #[test]
    fn test_class_shell() {
        let class = ClassObject::shell("Point", FieldLayout::Fields(2));
        assert_eq!(&*class.name, "Point");
        assert_eq!(class.num_fields(), Some(2));
        assert!(class.superclass.is_none());
        assert!(class.metaclass.is_none());
        assert!(class.methods.is_empty());
    }

    #[test]
    fn test_class_of() {
        let class = ObjRef::from_index(4);
        let meta = ObjRef::from_index(5);

        let mut shell = ClassObject::shell("C", FieldLayout::Fields(0));
        assert_eq!(HeapObject::Class(shell.clone()).class_of(), None);
        shell.metaclass = Some(meta);
        assert_eq!(HeapObject::Class(shell).class_of(), Some(meta));

        let inst = HeapObject::Instance(Instance::new(class, 0));
        assert_eq!(inst.class_of(), Some(class));
        let opaque = HeapObject::Opaque(OpaqueInstance::new(class, Box::new([0u8; 4])));
        assert_eq!(opaque.class_of(), Some(class));
    }
}
