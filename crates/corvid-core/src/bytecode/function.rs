//! Compiled function bodies and their constant pools

use super::opcode::Opcode;
use crate::module::ModuleId;
use crate::symbol::Symbol;
use crate::value::Value;
use crate::{VmError, VmResult};
use std::rc::Rc;

/// Constant pool entry
#[derive(Debug, Clone)]
pub enum Constant {
    /// Plain value
    Value(Value),
    /// Nested function (method bodies bound by `METHOD_*`)
    Function(Rc<Function>),
    /// Name (class names for `CLASS` / `FOREIGN_CLASS`)
    Str(Rc<str>),
    /// Marks a `METHOD_*` binding as foreign
    ForeignMethod,
}

/// A compiled function body
///
/// Slot 0 of every frame holds the receiver, followed by `arity` arguments
/// and then the remaining locals up to `slot_count`.
#[derive(Debug, Clone)]
pub struct Function {
    /// Name for diagnostics
    pub name: String,
    /// Module whose variables `LOAD_MODULE_VAR` / `STORE_MODULE_VAR` address
    pub module: ModuleId,
    /// Parameter count, not counting the receiver
    pub arity: u8,
    /// Frame slots including receiver and parameters
    pub slot_count: usize,
    /// Bytecode
    pub code: Vec<u8>,
    /// Constant pool
    pub constants: Vec<Constant>,
}

impl Function {
    /// Get a constant by index
    pub fn constant(&self, index: usize) -> Option<&Constant> {
        self.constants.get(index)
    }

    /// Rebase compile-time addresses for binding into a class.
    ///
    /// Field operands are compiled relative to the class's own fields; this
    /// shifts them by `inherited_fields`. Every `SUPER` class constant is
    /// replaced with `superclass`. Nested function constants are method bodies
    /// for a class defined by this code and are rebased when `METHOD_*`
    /// binds them to that class, so they are left as compiled.
    /// Returns a patched copy; `self` is left untouched.
    pub fn rebased(&self, inherited_fields: usize, superclass: Value) -> VmResult<Function> {
        let mut patched = self.clone();

        let mut ip = 0;
        while ip < patched.code.len() {
            let byte = patched.code[ip];
            let op = Opcode::from_u8(byte).ok_or(VmError::InvalidOpcode(byte))?;
            let end = ip + 1 + op.operand_size();
            if end > patched.code.len() {
                return Err(VmError::UnexpectedEndOfCode);
            }

            if op.is_field_access() {
                let field = patched.code[ip + 1] as usize + inherited_fields;
                patched.code[ip + 1] =
                    u8::try_from(field).map_err(|_| VmError::OperandOverflow("field index"))?;
            } else if op == Opcode::Super {
                let index = u16::from_le_bytes([patched.code[ip + 4], patched.code[ip + 5]]);
                let slot = patched
                    .constants
                    .get_mut(index as usize)
                    .ok_or(VmError::InvalidConstant(index))?;
                *slot = Constant::Value(superclass);
            }

            ip = end;
        }

        Ok(patched)
    }

    /// Iterate over values reachable from the constant pool, nested
    /// functions included
    pub fn for_each_value(&self, f: &mut impl FnMut(Value)) {
        for constant in &self.constants {
            match constant {
                Constant::Value(v) => f(*v),
                Constant::Function(inner) => inner.for_each_value(f),
                Constant::Str(_) | Constant::ForeignMethod => {}
            }
        }
    }
}

/// Assembler for [`Function`] bodies
///
/// Emit helpers chain; operand overflows are reported once by
/// [`FunctionBuilder::build`].
#[derive(Debug)]
pub struct FunctionBuilder {
    function: Function,
    error: Option<VmError>,
}

impl FunctionBuilder {
    /// Start a function with `arity` parameters in `module`
    pub fn new(name: impl Into<String>, module: ModuleId, arity: u8) -> Self {
        Self {
            function: Function {
                name: name.into(),
                module,
                arity,
                slot_count: arity as usize + 1,
                code: Vec::new(),
                constants: Vec::new(),
            },
            error: None,
        }
    }

    /// Reserve `count` extra local slots beyond receiver and parameters
    pub fn locals(&mut self, count: usize) -> &mut Self {
        self.function.slot_count = self.function.arity as usize + 1 + count;
        self
    }

    fn fail(&mut self, error: VmError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn emit_op(&mut self, op: Opcode) -> &mut Self {
        self.function.code.push(op.to_u8());
        self
    }

    fn emit_u8(&mut self, byte: u8) -> &mut Self {
        self.function.code.push(byte);
        self
    }

    fn emit_u16(&mut self, value: u16) -> &mut Self {
        self.function.code.extend_from_slice(&value.to_le_bytes());
        self
    }

    fn emit_symbol(&mut self, symbol: Symbol) -> &mut Self {
        match u16::try_from(symbol.raw()) {
            Ok(raw) => self.emit_u16(raw),
            Err(_) => {
                self.fail(VmError::OperandOverflow("symbol"));
                self.emit_u16(0)
            }
        }
    }

    /// Add a constant to the pool, returning its index
    pub fn add_constant(&mut self, constant: Constant) -> u16 {
        let index = self.function.constants.len();
        self.function.constants.push(constant);
        match u16::try_from(index) {
            Ok(index) => index,
            Err(_) => {
                self.fail(VmError::OperandOverflow("constant index"));
                0
            }
        }
    }

    /// `CONSTANT` with a plain value
    pub fn constant(&mut self, value: Value) -> &mut Self {
        let index = self.add_constant(Constant::Value(value));
        self.emit_op(Opcode::Constant).emit_u16(index)
    }

    /// `NULL`
    pub fn null(&mut self) -> &mut Self {
        self.emit_op(Opcode::Null)
    }

    /// `TRUE` / `FALSE`
    pub fn boolean(&mut self, value: bool) -> &mut Self {
        self.emit_op(if value { Opcode::True } else { Opcode::False })
    }

    /// `POP`
    pub fn pop(&mut self) -> &mut Self {
        self.emit_op(Opcode::Pop)
    }

    /// `DUP`
    pub fn dup(&mut self) -> &mut Self {
        self.emit_op(Opcode::Dup)
    }

    /// `LOAD_LOCAL slot`
    pub fn load_local(&mut self, slot: u8) -> &mut Self {
        self.emit_op(Opcode::LoadLocal).emit_u8(slot)
    }

    /// `STORE_LOCAL slot`
    pub fn store_local(&mut self, slot: u8) -> &mut Self {
        self.emit_op(Opcode::StoreLocal).emit_u8(slot)
    }

    /// `LOAD_MODULE_VAR index`
    pub fn load_module_var(&mut self, variable: Symbol) -> &mut Self {
        self.emit_op(Opcode::LoadModuleVar).emit_symbol(variable)
    }

    /// `STORE_MODULE_VAR index`
    pub fn store_module_var(&mut self, variable: Symbol) -> &mut Self {
        self.emit_op(Opcode::StoreModuleVar).emit_symbol(variable)
    }

    /// `LOAD_FIELD_THIS field`
    pub fn load_field_this(&mut self, field: u8) -> &mut Self {
        self.emit_op(Opcode::LoadFieldThis).emit_u8(field)
    }

    /// `STORE_FIELD_THIS field`
    pub fn store_field_this(&mut self, field: u8) -> &mut Self {
        self.emit_op(Opcode::StoreFieldThis).emit_u8(field)
    }

    /// `LOAD_FIELD field`
    pub fn load_field(&mut self, field: u8) -> &mut Self {
        self.emit_op(Opcode::LoadField).emit_u8(field)
    }

    /// `STORE_FIELD field`
    pub fn store_field(&mut self, field: u8) -> &mut Self {
        self.emit_op(Opcode::StoreField).emit_u8(field)
    }

    /// `CALL argc symbol`
    pub fn call(&mut self, argc: u8, symbol: Symbol) -> &mut Self {
        self.emit_op(Opcode::Call).emit_u8(argc).emit_symbol(symbol)
    }

    /// `SUPER argc symbol constant`
    ///
    /// The class constant is a null placeholder until the function is bound
    /// to a class.
    pub fn super_call(&mut self, argc: u8, symbol: Symbol) -> &mut Self {
        let index = self.add_constant(Constant::Value(Value::null()));
        self.emit_op(Opcode::Super)
            .emit_u8(argc)
            .emit_symbol(symbol)
            .emit_u16(index)
    }

    /// `RETURN`
    pub fn ret(&mut self) -> &mut Self {
        self.emit_op(Opcode::Return)
    }

    /// `CONSTRUCT`
    pub fn construct(&mut self) -> &mut Self {
        self.emit_op(Opcode::Construct)
    }

    /// `FOREIGN_CONSTRUCT`
    pub fn foreign_construct(&mut self) -> &mut Self {
        self.emit_op(Opcode::ForeignConstruct)
    }

    /// `CLASS name fields`
    pub fn class(&mut self, name: &str, own_fields: u8) -> &mut Self {
        let index = self.add_constant(Constant::Str(name.into()));
        self.emit_op(Opcode::Class).emit_u16(index).emit_u8(own_fields)
    }

    /// `FOREIGN_CLASS name`
    pub fn foreign_class(&mut self, name: &str) -> &mut Self {
        let index = self.add_constant(Constant::Str(name.into()));
        self.emit_op(Opcode::ForeignClass).emit_u16(index)
    }

    /// `METHOD_INSTANCE` / `METHOD_STATIC` binding a compiled body
    pub fn method(&mut self, symbol: Symbol, body: Rc<Function>, is_static: bool) -> &mut Self {
        let index = self.add_constant(Constant::Function(body));
        self.emit_method(symbol, index, is_static)
    }

    /// `METHOD_INSTANCE` / `METHOD_STATIC` binding a foreign method
    pub fn foreign_method(&mut self, symbol: Symbol, is_static: bool) -> &mut Self {
        let index = self.add_constant(Constant::ForeignMethod);
        self.emit_method(symbol, index, is_static)
    }

    fn emit_method(&mut self, symbol: Symbol, index: u16, is_static: bool) -> &mut Self {
        let op = if is_static {
            Opcode::MethodStatic
        } else {
            Opcode::MethodInstance
        };
        self.emit_op(op).emit_symbol(symbol).emit_u16(index)
    }

    /// Finish the function
    pub fn build(&mut self) -> VmResult<Function> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        Ok(self.function.clone())
    }
}
