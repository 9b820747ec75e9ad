//! Symbol tables
//!
//! A symbol table interns names (method signatures, module variable names)
//! into small dense integer ids. Ids are handed out in insertion order
//! starting at zero and are never removed or reused, which is what lets every
//! class's method table be indexed by the same symbol space.

use crate::{VmError, VmResult};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// An interned name (32-bit index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    /// Create a symbol from a raw index
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Symbol(raw)
    }

    /// Get the raw id
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Get the id as a table index
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Append-only name interner.
///
/// Lookups are keyed by exact byte content. There is no removal operation.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    /// Map from name to symbol
    map: FxHashMap<Box<str>, Symbol>,

    /// Names indexed by symbol
    names: Vec<Box<str>>,
}

impl SymbolTable {
    /// Create a new empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a name, returning its symbol.
    ///
    /// Returns the existing symbol when the name is already present,
    /// otherwise appends it with the next id.
    ///
    /// # Errors
    ///
    /// Returns `VmError::SymbolOverflow` if the table cannot grow.
    pub fn intern(&mut self, name: &str) -> VmResult<Symbol> {
        if let Some(&sym) = self.map.get(name) {
            return Ok(sym);
        }
        self.add(name)
    }

    /// Append a name the caller has already checked is absent.
    fn add(&mut self, name: &str) -> VmResult<Symbol> {
        let raw = u32::try_from(self.names.len()).map_err(|_| VmError::SymbolOverflow)?;
        if raw == u32::MAX {
            return Err(VmError::SymbolOverflow);
        }
        self.names
            .try_reserve(1)
            .map_err(|_| VmError::SymbolOverflow)?;
        self.map.try_reserve(1).map_err(|_| VmError::SymbolOverflow)?;

        let sym = Symbol(raw);
        let owned: Box<str> = name.into();
        self.names.push(owned.clone());
        self.map.insert(owned, sym);
        Ok(sym)
    }

    /// Look up a name without inserting it.
    pub fn find(&self, name: &str) -> Option<Symbol> {
        self.map.get(name).copied()
    }

    /// Resolve a symbol back to its name.
    pub fn name(&self, sym: Symbol) -> Option<&str> {
        self.names.get(sym.index()).map(|s| &**s)
    }

    /// Get the number of interned names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterate over `(symbol, name)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Symbol, &str)> + '_ {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (Symbol(i as u32), &**name))
    }
}

/// A symbol table that can be shared across host threads.
///
/// The core itself runs single-threaded; a host that compiles on several
/// threads must serialize interning, which this wrapper does with a
/// read-mostly lock.
#[derive(Debug, Clone, Default)]
pub struct SharedSymbolTable(Arc<RwLock<SymbolTable>>);

impl SharedSymbolTable {
    /// Create a new empty shared table
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing table
    pub fn from_table(table: SymbolTable) -> Self {
        Self(Arc::new(RwLock::new(table)))
    }

    /// Intern a name under the write lock.
    ///
    /// The fast path only takes the read lock.
    pub fn intern(&self, name: &str) -> VmResult<Symbol> {
        if let Some(sym) = self.0.read().find(name) {
            return Ok(sym);
        }
        self.0.write().intern(name)
    }

    /// Look up a name without inserting it
    pub fn find(&self, name: &str) -> Option<Symbol> {
        self.0.read().find(name)
    }

    /// Resolve a symbol to an owned name
    pub fn name(&self, sym: Symbol) -> Option<String> {
        self.0.read().name(sym).map(str::to_owned)
    }

    /// Number of interned names
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    /// Take a copy of the current table contents
    pub fn snapshot(&self) -> SymbolTable {
        self.0.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_deduplicates() {
        let mut table = SymbolTable::new();

        let sym1 = table.intern("foo()").unwrap();
        let sym2 = table.intern("bar(_)").unwrap();
        let sym3 = table.intern("foo()").unwrap();

        assert_eq!(sym1, sym3);
        assert_ne!(sym1, sym2);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_ids_are_dense_and_ordered() {
        let mut table = SymbolTable::new();
        let ids: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|n| table.intern(n).unwrap().raw())
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_find_does_not_insert() {
        let mut table = SymbolTable::new();
        assert_eq!(table.find("missing"), None);
        assert!(table.is_empty());

        let sym = table.intern("present").unwrap();
        assert_eq!(table.find("present"), Some(sym));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_byte_exact_matching() {
        let mut table = SymbolTable::new();
        let lower = table.intern("name").unwrap();
        let upper = table.intern("Name").unwrap();
        let padded = table.intern("name ").unwrap();
        assert_ne!(lower, upper);
        assert_ne!(lower, padded);
    }

    #[test]
    fn test_name_and_iter() {
        let mut table = SymbolTable::new();
        let sym = table.intern("toString").unwrap();
        assert_eq!(table.name(sym), Some("toString"));
        assert_eq!(table.name(Symbol::from_raw(99)), None);

        let collected: Vec<_> = table.iter().collect();
        assert_eq!(collected, vec![(sym, "toString")]);
    }

    #[test]
    fn test_shared_table_interns_once() {
        let shared = SharedSymbolTable::new();
        let other = shared.clone();

        let a = shared.intern("call(_)").unwrap();
        let b = other.intern("call(_)").unwrap();
        assert_eq!(a, b);
        assert_eq!(shared.len(), 1);
        assert_eq!(other.name(a).as_deref(), Some("call(_)"));
    }

    #[test]
    fn test_shared_table_across_threads() {
        let shared = SharedSymbolTable::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let table = shared.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .map(|i| table.intern(&format!("m{}()", i)).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for r in &results[1..] {
            assert_eq!(r, &results[0]);
        }
        assert_eq!(shared.len(), 50);
    }
}
