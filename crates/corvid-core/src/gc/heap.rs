//! Heap arena for VM objects
//!
//! Objects live in a slot vector and are addressed by [`ObjRef`] index.
//! Freed slots go on a free list and are reused by later allocations.

use crate::object::{ClassObject, HeapObject, Instance, OpaqueInstance};
use crate::value::{ObjRef, Value};

#[derive(Debug)]
struct Slot {
    object: Option<HeapObject>,
    marked: bool,
}

/// Arena of heap objects
#[derive(Debug, Default)]
pub struct Heap {
    /// Object slots, indexed by `ObjRef`
    slots: Vec<Slot>,

    /// Indices of empty slots
    free: Vec<u32>,

    /// Number of occupied slots
    live: usize,
}

impl Heap {
    /// Create an empty heap
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object and return its handle
    pub fn insert(&mut self, object: HeapObject) -> ObjRef {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            slot.marked = false;
            return ObjRef::from_index(index);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            object: Some(object),
            marked: false,
        });
        ObjRef::from_index(index)
    }

    /// Borrow an object
    #[inline]
    pub fn get(&self, obj: ObjRef) -> Option<&HeapObject> {
        self.slots.get(obj.index()).and_then(|s| s.object.as_ref())
    }

    /// Mutably borrow an object
    #[inline]
    pub fn get_mut(&mut self, obj: ObjRef) -> Option<&mut HeapObject> {
        self.slots
            .get_mut(obj.index())
            .and_then(|s| s.object.as_mut())
    }

    /// Borrow a class object
    #[inline]
    pub fn class(&self, obj: ObjRef) -> Option<&ClassObject> {
        self.get(obj).and_then(HeapObject::as_class)
    }

    /// Mutably borrow a class object
    #[inline]
    pub fn class_mut(&mut self, obj: ObjRef) -> Option<&mut ClassObject> {
        self.get_mut(obj).and_then(HeapObject::as_class_mut)
    }

    /// Borrow an instance
    #[inline]
    pub fn instance(&self, obj: ObjRef) -> Option<&Instance> {
        self.get(obj).and_then(HeapObject::as_instance)
    }

    /// Mutably borrow an instance
    #[inline]
    pub fn instance_mut(&mut self, obj: ObjRef) -> Option<&mut Instance> {
        self.get_mut(obj).and_then(HeapObject::as_instance_mut)
    }

    /// Borrow an opaque instance
    #[inline]
    pub fn opaque(&self, obj: ObjRef) -> Option<&OpaqueInstance> {
        self.get(obj).and_then(HeapObject::as_opaque)
    }

    /// Mutably borrow an opaque instance
    #[inline]
    pub fn opaque_mut(&mut self, obj: ObjRef) -> Option<&mut OpaqueInstance> {
        self.get_mut(obj).and_then(HeapObject::as_opaque_mut)
    }

    /// Borrow the object behind an object value
    #[inline]
    pub fn get_value(&self, value: Value) -> Option<&HeapObject> {
        value.as_object().and_then(|obj| self.get(obj))
    }

    /// Check whether a handle refers to a live object
    pub fn contains(&self, obj: ObjRef) -> bool {
        self.get(obj).is_some()
    }

    /// Number of live objects
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Number of slots, live or free
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Set the mark bit. Returns false if already marked or not live.
    pub(super) fn mark(&mut self, obj: ObjRef) -> bool {
        match self.slots.get_mut(obj.index()) {
            Some(slot) if slot.object.is_some() && !slot.marked => {
                slot.marked = true;
                true
            }
            _ => false,
        }
    }

    /// Free every unmarked object and clear the marks of survivors.
    ///
    /// Returns the number of freed objects.
    pub(super) fn sweep(&mut self) -> usize {
        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.object.is_none() {
                continue;
            }
            if slot.marked {
                slot.marked = false;
            } else {
                slot.object = None;
                self.free.push(index as u32);
                freed += 1;
            }
        }
        self.live -= freed;
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::FieldLayout;

    fn class(name: &str) -> HeapObject {
        HeapObject::Class(ClassObject::shell(name, FieldLayout::Fields(0)))
    }

    #[test]
    fn test_insert_and_get() {
        let mut heap = Heap::new();
        let a = heap.insert(class("A"));
        let b = heap.insert(HeapObject::Instance(Instance::new(a, 1)));

        assert_eq!(heap.live_count(), 2);
        assert_eq!(&*heap.class(a).unwrap().name, "A");
        assert_eq!(heap.instance(b).unwrap().class, a);
        assert!(heap.instance(a).is_none());
        assert!(heap.class(b).is_none());
    }

    #[test]
    fn test_sweep_frees_unmarked() {
        let mut heap = Heap::new();
        let a = heap.insert(class("A"));
        let b = heap.insert(class("B"));

        assert!(heap.mark(a));
        assert!(!heap.mark(a));
        assert_eq!(heap.sweep(), 1);

        assert!(heap.contains(a));
        assert!(!heap.contains(b));
        assert_eq!(heap.live_count(), 1);
    }

    #[test]
    fn test_freed_slots_are_reused() {
        let mut heap = Heap::new();
        let _a = heap.insert(class("A"));
        let b = heap.insert(class("B"));
        heap.mark(_a);
        heap.sweep();

        let c = heap.insert(class("C"));
        assert_eq!(c, b);
        assert_eq!(heap.capacity(), 2);
        assert_eq!(&*heap.class(c).unwrap().name, "C");
    }
}
