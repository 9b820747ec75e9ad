//! Modules and their top-level variables
//!
//! Every module interns its variable names into its own [`SymbolTable`];
//! the resulting symbol is the variable's index in the value vector and is
//! what `LOAD_MODULE_VAR` / `STORE_MODULE_VAR` encode.

use crate::symbol::{Symbol, SymbolTable};
use crate::value::Value;
use crate::{VmError, VmResult};

/// Handle to a module registered with the VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(u32);

impl ModuleId {
    /// Create a handle from an index
    #[inline]
    pub const fn from_index(index: u32) -> Self {
        Self(index)
    }

    /// Get the index
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A module: a name plus its top-level variables
#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    variable_names: SymbolTable,
    variables: Vec<Value>,
}

impl Module {
    /// Create an empty module
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variable_names: SymbolTable::new(),
            variables: Vec::new(),
        }
    }

    /// Module name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Define a new top-level variable
    ///
    /// # Errors
    ///
    /// Returns `VmError::ModuleVariable` if the name is already defined.
    pub fn define_variable(&mut self, name: &str, value: Value) -> VmResult<Symbol> {
        if self.variable_names.find(name).is_some() {
            return Err(VmError::ModuleVariable(format!(
                "'{}' is already defined in module {}",
                name, self.name
            )));
        }

        let symbol = self.variable_names.intern(name)?;
        debug_assert_eq!(symbol.index(), self.variables.len());
        self.variables.push(value);
        Ok(symbol)
    }

    /// Look up a variable without defining it
    pub fn find_variable(&self, name: &str) -> Option<Symbol> {
        self.variable_names.find(name)
    }

    /// Read a variable
    pub fn variable(&self, symbol: Symbol) -> Option<Value> {
        self.variables.get(symbol.index()).copied()
    }

    /// Overwrite an existing variable
    ///
    /// # Errors
    ///
    /// Returns `VmError::ModuleVariable` if the index was never defined.
    pub fn set_variable(&mut self, symbol: Symbol, value: Value) -> VmResult<()> {
        match self.variables.get_mut(symbol.index()) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(VmError::ModuleVariable(format!(
                "variable index {} is not defined in module {}",
                symbol, self.name
            ))),
        }
    }

    /// Variable name for diagnostics
    pub fn variable_name(&self, symbol: Symbol) -> Option<&str> {
        self.variable_names.name(symbol)
    }

    /// All variable values in definition order
    pub fn variables(&self) -> &[Value] {
        &self.variables
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_find() {
        let mut module = Module::new("main");
        let a = module.define_variable("a", Value::i32(1)).unwrap();
        let b = module.define_variable("b", Value::i32(2)).unwrap();

        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(module.find_variable("b"), Some(b));
        assert_eq!(module.find_variable("c"), None);
        assert_eq!(module.variable(a), Some(Value::i32(1)));
        assert_eq!(module.variable_name(b), Some("b"));
    }

    #[test]
    fn test_redefinition_fails() {
        let mut module = Module::new("main");
        module.define_variable("a", Value::null()).unwrap();
        let err = module.define_variable("a", Value::i32(3)).unwrap_err();
        assert!(matches!(err, VmError::ModuleVariable(_)));
        assert_eq!(module.variables().len(), 1);
    }

    #[test]
    fn test_set_variable() {
        let mut module = Module::new("main");
        let a = module.define_variable("a", Value::null()).unwrap();
        module.set_variable(a, Value::bool(true)).unwrap();
        assert_eq!(module.variable(a), Some(Value::bool(true)));

        assert!(module.set_variable(Symbol::from_raw(9), Value::null()).is_err());
    }
}
