//! Foreign-function registry
//!
//! Hosts register callbacks by `(module, class, signature, static?)` before
//! any code runs. Binding a foreign method resolves its key once and stores
//! the resulting [`ForeignId`] in the method table; after that, dispatch is
//! an indexed call into a Vec with no hashing.

use crate::value::Value;
use crate::vm::Vm;
use crate::{VmError, VmResult};
use rustc_hash::FxHashMap;
use std::fmt;
use std::rc::Rc;

/// Host callback bound as a method. `args[0]` is the receiver.
pub type ForeignFn = Rc<dyn Fn(&mut Vm, &[Value]) -> Result<Value, String>>;

/// Host allocator for an opaque class, returning the instance payload.
///
/// `args[0]` is the class being instantiated.
pub type AllocateFn = Rc<dyn Fn(&mut Vm, &[Value]) -> Result<Vec<u8>, String>>;

/// Index of a resolved foreign entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForeignId(u32);

impl ForeignId {
    /// Get the raw index
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MethodKey {
    module: String,
    class: String,
    signature: String,
    is_static: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClassKey {
    module: String,
    class: String,
}

#[derive(Clone)]
enum Resolved {
    Method(ForeignFn),
    Allocate(AllocateFn),
}

/// Registry of host callbacks and the resolved dispatch table
#[derive(Default)]
pub struct ForeignRegistry {
    methods: FxHashMap<MethodKey, ForeignFn>,
    allocators: FxHashMap<ClassKey, AllocateFn>,
    resolved: Vec<Resolved>,
    method_ids: FxHashMap<MethodKey, ForeignId>,
    allocator_ids: FxHashMap<ClassKey, ForeignId>,
}

impl fmt::Debug for ForeignRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignRegistry")
            .field("methods", &self.methods.len())
            .field("allocators", &self.allocators.len())
            .field("resolved", &self.resolved.len())
            .finish()
    }
}

impl ForeignRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method callback.
    ///
    /// `signature` is the canonical signature string, e.g. `"add(_,_)"`.
    /// Re-registering a key replaces the callback for later resolutions.
    pub fn register_method<F>(
        &mut self,
        module: &str,
        class: &str,
        signature: &str,
        is_static: bool,
        callback: F,
    ) where
        F: Fn(&mut Vm, &[Value]) -> Result<Value, String> + 'static,
    {
        let key = MethodKey {
            module: module.to_string(),
            class: class.to_string(),
            signature: signature.to_string(),
            is_static,
        };
        self.method_ids.remove(&key);
        self.methods.insert(key, Rc::new(callback));
    }

    /// Register the allocator for an opaque class
    pub fn register_class<F>(&mut self, module: &str, class: &str, allocate: F)
    where
        F: Fn(&mut Vm, &[Value]) -> Result<Vec<u8>, String> + 'static,
    {
        let key = ClassKey {
            module: module.to_string(),
            class: class.to_string(),
        };
        self.allocator_ids.remove(&key);
        self.allocators.insert(key, Rc::new(allocate));
    }

    /// Check if a method callback is registered
    pub fn contains_method(&self, module: &str, class: &str, signature: &str, is_static: bool) -> bool {
        self.methods.contains_key(&MethodKey {
            module: module.to_string(),
            class: class.to_string(),
            signature: signature.to_string(),
            is_static,
        })
    }

    /// Resolve a method key to a dispatch id
    ///
    /// # Errors
    ///
    /// Returns `VmError::ForeignNotFound` if nothing is registered for the key.
    pub fn resolve_method(
        &mut self,
        module: &str,
        class: &str,
        signature: &str,
        is_static: bool,
    ) -> VmResult<ForeignId> {
        let key = MethodKey {
            module: module.to_string(),
            class: class.to_string(),
            signature: signature.to_string(),
            is_static,
        };
        if let Some(&id) = self.method_ids.get(&key) {
            return Ok(id);
        }

        let callback = self.methods.get(&key).cloned().ok_or_else(|| {
            let prefix = if is_static { "static " } else { "" };
            VmError::ForeignNotFound(format!("{}{}.{} in module {}", prefix, class, signature, module))
        })?;
        let id = self.push(Resolved::Method(callback));
        self.method_ids.insert(key, id);
        Ok(id)
    }

    /// Resolve the allocator of an opaque class
    ///
    /// # Errors
    ///
    /// Returns `VmError::ForeignNotFound` if no allocator is registered.
    pub fn resolve_allocator(&mut self, module: &str, class: &str) -> VmResult<ForeignId> {
        let key = ClassKey {
            module: module.to_string(),
            class: class.to_string(),
        };
        if let Some(&id) = self.allocator_ids.get(&key) {
            return Ok(id);
        }

        let allocate = self.allocators.get(&key).cloned().ok_or_else(|| {
            VmError::ForeignNotFound(format!("allocator for {} in module {}", class, module))
        })?;
        let id = self.push(Resolved::Allocate(allocate));
        self.allocator_ids.insert(key, id);
        Ok(id)
    }

    fn push(&mut self, entry: Resolved) -> ForeignId {
        let id = ForeignId(self.resolved.len() as u32);
        self.resolved.push(entry);
        id
    }

    /// Get a resolved method callback
    pub fn method(&self, id: ForeignId) -> Option<ForeignFn> {
        match self.resolved.get(id.index()) {
            Some(Resolved::Method(f)) => Some(Rc::clone(f)),
            _ => None,
        }
    }

    /// Get a resolved allocator
    pub fn allocator(&self, id: ForeignId) -> Option<AllocateFn> {
        match self.resolved.get(id.index()) {
            Some(Resolved::Allocate(f)) => Some(Rc::clone(f)),
            _ => None,
        }
    }

    /// Number of resolved entries
    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    /// Check if nothing has been resolved
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_registered_method() {
        let mut registry = ForeignRegistry::new();
        registry.register_method("main", "Vec", "len", false, |_vm, _args| Ok(Value::i32(3)));

        assert!(registry.contains_method("main", "Vec", "len", false));
        assert!(!registry.contains_method("main", "Vec", "len", true));

        let id = registry.resolve_method("main", "Vec", "len", false).unwrap();
        assert!(registry.method(id).is_some());
        assert!(registry.allocator(id).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolution_is_cached() {
        let mut registry = ForeignRegistry::new();
        registry.register_method("main", "Vec", "len", false, |_vm, _args| Ok(Value::null()));

        let a = registry.resolve_method("main", "Vec", "len", false).unwrap();
        let b = registry.resolve_method("main", "Vec", "len", false).unwrap();
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_method_fails() {
        let mut registry = ForeignRegistry::new();
        let err = registry
            .resolve_method("main", "Vec", "push(_)", true)
            .unwrap_err();
        match err {
            VmError::ForeignNotFound(what) => {
                assert!(what.contains("static Vec.push(_)"));
                assert!(what.contains("main"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_allocator_resolution() {
        let mut registry = ForeignRegistry::new();
        assert!(registry.resolve_allocator("main", "File").is_err());

        registry.register_class("main", "File", |_vm, _args| Ok(vec![0; 16]));
        let id = registry.resolve_allocator("main", "File").unwrap();
        assert!(registry.allocator(id).is_some());
        assert!(registry.method(id).is_none());
    }
}
