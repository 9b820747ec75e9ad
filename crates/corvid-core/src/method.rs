//! Method descriptors and per-class method tables
//!
//! Every class owns a [`MethodTable`] indexed by method [`Symbol`]. Since all
//! classes share one global symbol space, slot `s` means the same signature in
//! every table, and dispatch is a single bounds-checked index.

use crate::bytecode::Function;
use crate::foreign::ForeignId;
use crate::symbol::Symbol;
use crate::value::Value;
use crate::vm::Vm;
use crate::VmResult;
use std::fmt;
use std::rc::Rc;

/// Native implementation of a core method.
///
/// `args[0]` is the receiver.
pub type PrimitiveFn = fn(&mut Vm, &[Value]) -> VmResult<Value>;

/// A method table entry
#[derive(Clone, Default)]
pub enum Method {
    /// No method bound for this symbol
    #[default]
    Absent,
    /// Built-in native implementation
    Primitive(PrimitiveFn),
    /// Host-provided callback, resolved through the foreign registry
    Foreign(ForeignId),
    /// Compiled function body
    Closure(Rc<Function>),
}

impl Method {
    /// Check whether this slot is empty
    #[inline]
    pub fn is_absent(&self) -> bool {
        matches!(self, Method::Absent)
    }

    /// Short kind name for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Method::Absent => "absent",
            Method::Primitive(_) => "primitive",
            Method::Foreign(_) => "foreign",
            Method::Closure(_) => "closure",
        }
    }
}

impl PartialEq for Method {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Method::Absent, Method::Absent) => true,
            (Method::Primitive(a), Method::Primitive(b)) => *a as usize == *b as usize,
            (Method::Foreign(a), Method::Foreign(b)) => a == b,
            (Method::Closure(a), Method::Closure(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Absent => write!(f, "Absent"),
            Method::Primitive(p) => write!(f, "Primitive({:#x})", *p as usize),
            Method::Foreign(id) => write!(f, "Foreign({:?})", id),
            Method::Closure(func) => write!(f, "Closure({})", func.name),
        }
    }
}

/// Symbol-indexed method table
///
/// The table is only as long as the largest symbol bound on its class; any
/// symbol past the end reads as [`Method::Absent`].
#[derive(Debug, Clone, Default)]
pub struct MethodTable {
    methods: Vec<Method>,
}

impl MethodTable {
    /// Create a new empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `method` at `symbol`, growing the table with absent slots as needed
    pub fn set(&mut self, symbol: Symbol, method: Method) {
        let index = symbol.index();
        if index >= self.methods.len() {
            self.methods.resize(index + 1, Method::Absent);
        }
        self.methods[index] = method;
    }

    /// Look up the method bound at `symbol`.
    ///
    /// Total over all symbols: anything out of range is `Absent`.
    pub fn get(&self, symbol: Symbol) -> Method {
        self.methods
            .get(symbol.index())
            .cloned()
            .unwrap_or(Method::Absent)
    }

    /// Copy every slot of `source` into this table by value.
    ///
    /// Slots beyond `source.len()` are left as they are. This is a snapshot:
    /// later changes to `source` are not reflected here.
    pub fn copy_from(&mut self, source: &MethodTable) {
        if self.methods.len() < source.methods.len() {
            self.methods.resize(source.methods.len(), Method::Absent);
        }
        for (slot, method) in self.methods.iter_mut().zip(source.methods.iter()) {
            *slot = method.clone();
        }
    }

    /// Table length (one past the largest bound symbol)
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Check if the table has no slots
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Number of non-absent entries
    pub fn bound_count(&self) -> usize {
        self.methods.iter().filter(|m| !m.is_absent()).count()
    }

    /// Iterate over `(symbol, method)` for every bound slot
    pub fn iter(&self) -> impl Iterator<Item = (Symbol, &Method)> + '_ {
        self.methods
            .iter()
            .enumerate()
            .filter(|(_, m)| !m.is_absent())
            .map(|(i, m)| (Symbol::from_raw(i as u32), m))
    }
}
