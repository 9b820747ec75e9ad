//! GC root tracking
//!
//! Roots are starting points for GC traversal:
//! - Stack values and module variables, gathered fresh before each collection
//! - Temporary roots, pushed by multi-step operations (class construction)
//!   that hold objects the rest of the graph does not reference yet

use crate::value::{ObjRef, Value};

/// Root set for garbage collection
#[derive(Debug, Default)]
pub struct RootSet {
    /// Values gathered from the VM before a collection
    stack_roots: Vec<Value>,

    /// Scoped roots, released in LIFO order
    temp_roots: Vec<ObjRef>,
}

impl RootSet {
    /// Create a new root set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stack root; non-object values are ignored
    pub fn add_stack_root(&mut self, value: Value) {
        if value.is_object() {
            self.stack_roots.push(value);
        }
    }

    /// Clear all stack roots
    pub fn clear_stack_roots(&mut self) {
        self.stack_roots.clear();
    }

    /// Push a temporary root
    pub fn push_temp(&mut self, obj: ObjRef) {
        self.temp_roots.push(obj);
    }

    /// Current temporary root depth
    pub fn temp_depth(&self) -> usize {
        self.temp_roots.len()
    }

    /// Release temporary roots back to `depth`
    pub fn truncate_temp(&mut self, depth: usize) {
        self.temp_roots.truncate(depth);
    }

    /// Iterate over all roots
    pub fn iter(&self) -> impl Iterator<Item = ObjRef> + '_ {
        self.stack_roots
            .iter()
            .filter_map(Value::as_object)
            .chain(self.temp_roots.iter().copied())
    }

    /// Get total number of roots
    pub fn len(&self) -> usize {
        self.stack_roots.len() + self.temp_roots.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_objects_ignored() {
        let mut roots = RootSet::new();
        roots.add_stack_root(Value::i32(42));
        roots.add_stack_root(Value::bool(true));
        roots.add_stack_root(Value::null());
        assert!(roots.is_empty());
    }

    #[test]
    fn test_temp_roots_truncate() {
        let mut roots = RootSet::new();
        roots.push_temp(ObjRef::from_index(1));
        let depth = roots.temp_depth();
        roots.push_temp(ObjRef::from_index(2));
        roots.push_temp(ObjRef::from_index(3));
        assert_eq!(roots.len(), 3);

        roots.truncate_temp(depth);
        let left: Vec<_> = roots.iter().collect();
        assert_eq!(left, vec![ObjRef::from_index(1)]);
    }

    #[test]
    fn test_clear_stack_keeps_temp() {
        let mut roots = RootSet::new();
        roots.add_stack_root(Value::object(ObjRef::from_index(5)));
        roots.push_temp(ObjRef::from_index(6));
        roots.clear_stack_roots();
        assert_eq!(roots.iter().collect::<Vec<_>>(), vec![ObjRef::from_index(6)]);
    }
}
