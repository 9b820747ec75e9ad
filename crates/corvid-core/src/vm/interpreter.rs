//! Virtual machine interpreter

use super::{CoreClasses, VmOptions};
use crate::bytecode::{Constant, Function, Opcode};
use crate::foreign::ForeignRegistry;
use crate::gc::{GarbageCollector, GcStats, Heap, HeapStats};
use crate::method::Method;
use crate::module::{Module, ModuleId};
use crate::object::{FieldLayout, HeapObject};
use crate::signature::Signature;
use crate::stack::Stack;
use crate::symbol::{Symbol, SymbolTable};
use crate::value::{ObjRef, Value};
use crate::{VmError, VmResult};
use std::rc::Rc;
use tracing::trace;

/// Corvid virtual machine
///
/// Owns the heap, the method symbol table shared by every class, the loaded
/// modules and the foreign registry. Objects not reachable from the stack, a
/// module variable, a core class or a pushed root may be reclaimed at the
/// next allocation.
pub struct Vm {
    /// Garbage collector (owns the heap)
    pub(super) gc: GarbageCollector,
    /// Operand stack
    pub(super) stack: Stack,
    /// Method signatures, shared by every class's method table
    pub(super) method_symbols: SymbolTable,
    /// Loaded modules, indexed by `ModuleId`
    pub(super) modules: Vec<Module>,
    /// Host callbacks
    pub(super) foreign: ForeignRegistry,
    /// Built-in classes
    pub(super) core: CoreClasses,
    /// Symbol of the reserved allocator slot
    pub(super) allocate_symbol: Symbol,
    /// Configuration
    pub(super) options: VmOptions,
}

impl Vm {
    /// Create a new VM with default options
    pub fn new() -> VmResult<Self> {
        Self::with_options(VmOptions::default())
    }

    /// Create a new VM and bootstrap the core classes
    pub fn with_options(options: VmOptions) -> VmResult<Self> {
        super::bootstrap::bootstrap(options)
    }

    /// Get the options this VM was created with
    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    /// Get the built-in classes
    pub fn core(&self) -> CoreClasses {
        self.core
    }

    // ===== Method Symbols =====

    /// Get the method symbol table
    pub fn method_symbols(&self) -> &SymbolTable {
        &self.method_symbols
    }

    /// Intern a method signature string
    pub fn intern_method(&mut self, signature: &str) -> VmResult<Symbol> {
        self.method_symbols.intern(signature)
    }

    /// Intern a structured signature by its canonical string
    pub fn intern_signature(&mut self, signature: &Signature<'_>) -> VmResult<Symbol> {
        self.method_symbols.intern(&signature.to_string())
    }

    /// Find a method symbol without interning
    pub fn find_method(&self, signature: &str) -> Option<Symbol> {
        self.method_symbols.find(signature)
    }

    /// Symbol of the reserved allocator slot
    pub fn allocate_symbol(&self) -> Symbol {
        self.allocate_symbol
    }

    // ===== Foreign Registry =====

    /// Get the foreign registry
    pub fn foreign(&self) -> &ForeignRegistry {
        &self.foreign
    }

    /// Get the foreign registry for registration
    pub fn foreign_mut(&mut self) -> &mut ForeignRegistry {
        &mut self.foreign
    }

    // ===== Modules =====

    /// Register a module, or return the existing one with this name
    pub fn add_module(&mut self, name: &str) -> ModuleId {
        if let Some(id) = self.find_module(name) {
            return id;
        }
        let id = ModuleId::from_index(self.modules.len() as u32);
        self.modules.push(Module::new(name));
        id
    }

    /// Find a module by name
    pub fn find_module(&self, name: &str) -> Option<ModuleId> {
        self.modules
            .iter()
            .position(|m| m.name() == name)
            .map(|i| ModuleId::from_index(i as u32))
    }

    /// Get a module
    pub fn module(&self, id: ModuleId) -> VmResult<&Module> {
        self.modules
            .get(id.index())
            .ok_or_else(|| VmError::ModuleVariable(format!("unknown module {}", id.index())))
    }

    fn module_mut(&mut self, id: ModuleId) -> VmResult<&mut Module> {
        self.modules
            .get_mut(id.index())
            .ok_or_else(|| VmError::ModuleVariable(format!("unknown module {}", id.index())))
    }

    /// Define a top-level variable in a module
    pub fn define_variable(&mut self, module: ModuleId, name: &str, value: Value) -> VmResult<Symbol> {
        self.module_mut(module)?.define_variable(name, value)
    }

    /// Find a top-level variable in a module
    pub fn find_variable(&self, module: ModuleId, name: &str) -> Option<Symbol> {
        self.module(module).ok()?.find_variable(name)
    }

    /// Read a top-level variable
    pub fn variable(&self, module: ModuleId, variable: Symbol) -> Option<Value> {
        self.module(module).ok()?.variable(variable)
    }

    /// Overwrite a top-level variable
    pub fn set_variable(&mut self, module: ModuleId, variable: Symbol, value: Value) -> VmResult<()> {
        self.module_mut(module)?.set_variable(variable, value)
    }

    // ===== Memory =====

    /// Get the heap
    pub fn heap(&self) -> &Heap {
        self.gc.heap()
    }

    pub(super) fn heap_mut(&mut self) -> &mut Heap {
        self.gc.heap_mut()
    }

    /// Get GC statistics
    pub fn gc_stats(&self) -> &GcStats {
        self.gc.stats()
    }

    /// Get heap statistics
    pub fn heap_stats(&self) -> HeapStats {
        self.gc.heap_stats()
    }

    /// Get the operand stack
    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// Keep `obj` alive until the matching [`Vm::pop_root`]
    pub fn push_root(&mut self, obj: ObjRef) {
        self.gc.roots_mut().push_temp(obj);
    }

    /// Release the most recently pushed root
    pub fn pop_root(&mut self) {
        let roots = self.gc.roots_mut();
        let depth = roots.temp_depth();
        roots.truncate_temp(depth.saturating_sub(1));
    }

    /// Run `f` and release every root it pushed, whether it succeeds or not
    pub(crate) fn with_temp_roots<T>(
        &mut self,
        f: impl FnOnce(&mut Vm) -> VmResult<T>,
    ) -> VmResult<T> {
        let depth = self.gc.roots_mut().temp_depth();
        let result = f(self);
        self.gc.roots_mut().truncate_temp(depth);
        result
    }

    /// Store a new object, collecting first if the threshold is reached
    pub(crate) fn allocate(&mut self, object: HeapObject) -> ObjRef {
        if self.gc.should_collect() {
            self.collect_garbage();
        }
        self.gc.insert(object)
    }

    /// Gather roots and run a collection. Returns the number of freed objects.
    pub fn collect_garbage(&mut self) -> usize {
        let Vm {
            gc,
            stack,
            modules,
            core,
            ..
        } = self;

        let roots = gc.roots_mut();
        for value in stack.iter_values() {
            roots.add_stack_root(value);
        }
        for function in stack.frame_functions() {
            function.for_each_value(&mut |value| roots.add_stack_root(value));
        }
        for module in modules.iter() {
            for &value in module.variables() {
                roots.add_stack_root(value);
            }
        }
        for class in core.iter() {
            roots.add_stack_root(Value::object(class));
        }

        gc.collect()
    }

    // ===== Dispatch =====

    /// Look up the method bound to `symbol` in `class`
    ///
    /// # Errors
    ///
    /// Returns `VmError::MethodNotFound` if the slot is absent.
    pub fn lookup_method(&self, class: ObjRef, symbol: Symbol) -> VmResult<Method> {
        match self.class(class)?.methods.get(symbol) {
            Method::Absent => Err(self.method_not_found(class, symbol)),
            method => Ok(method),
        }
    }

    fn method_not_found(&self, class: ObjRef, symbol: Symbol) -> VmError {
        VmError::MethodNotFound {
            class: self.class_name(class).unwrap_or("<unknown>").to_string(),
            signature: self
                .method_symbols
                .name(symbol)
                .unwrap_or("<unknown>")
                .to_string(),
        }
    }

    /// Call `symbol` on `receiver`, dispatching on the receiver's class
    pub fn call_method(&mut self, receiver: Value, symbol: Symbol, args: &[Value]) -> VmResult<Value> {
        let class = self.class_of(receiver)?;
        self.call_with_class(class, symbol, receiver, args)
    }

    /// Call `symbol` on `receiver`, looking it up in `class` instead of the
    /// receiver's own class
    pub fn call_super(
        &mut self,
        class: ObjRef,
        symbol: Symbol,
        receiver: Value,
        args: &[Value],
    ) -> VmResult<Value> {
        self.call_with_class(class, symbol, receiver, args)
    }

    fn call_with_class(
        &mut self,
        class: ObjRef,
        symbol: Symbol,
        receiver: Value,
        args: &[Value],
    ) -> VmResult<Value> {
        let frames = self.stack.frame_count();
        let base = self.stack.depth();
        self.stack.push(receiver);
        for &arg in args {
            self.stack.push(arg);
        }

        let result = self.invoke(class, symbol, base);
        self.stack.unwind_to(frames, base);
        result
    }

    /// Invoke the method for `symbol` in `class` with the receiver and
    /// arguments at `stack[base..]`. The arguments are popped.
    fn invoke(&mut self, class: ObjRef, symbol: Symbol, base: usize) -> VmResult<Value> {
        let method = self.class(class)?.methods.get(symbol);
        trace!(symbol = symbol.raw(), kind = method.kind(), "invoke");

        let result = match method {
            Method::Absent => return Err(self.method_not_found(class, symbol)),
            Method::Primitive(primitive) => {
                let args = self.stack.slice_from(base)?.to_vec();
                primitive(self, &args)?
            }
            Method::Foreign(id) => {
                let callback = self.foreign.method(id).ok_or_else(|| {
                    VmError::RuntimeError(format!("foreign entry {} is not a method", id.index()))
                })?;
                let args = self.stack.slice_from(base)?.to_vec();
                callback(self, &args).map_err(VmError::Foreign)?
            }
            Method::Closure(function) => self.run_frame(function, base)?,
        };

        self.stack.truncate(base);
        Ok(result)
    }

    // ===== Execution =====

    /// Run a top-level function with a null receiver
    pub fn interpret(&mut self, function: Rc<Function>) -> VmResult<Value> {
        let frames = self.stack.frame_count();
        let base = self.stack.depth();
        self.stack.push(Value::null());

        let result = self.run_frame(function, base);
        self.stack.unwind_to(frames, base);
        result
    }

    /// Execute `function` in a new frame rooted at `base`
    fn run_frame(&mut self, function: Rc<Function>, base: usize) -> VmResult<Value> {
        self.stack.push_frame(Rc::clone(&function), base)?;
        let code = &function.code;
        let mut ip = 0;

        loop {
            let byte = *code.get(ip).ok_or(VmError::UnexpectedEndOfCode)?;
            let opcode = Opcode::from_u8(byte).ok_or(VmError::InvalidOpcode(byte))?;
            ip += 1;

            match opcode {
                // Constants & stack
                Opcode::Constant => {
                    let index = self.read_u16(code, &mut ip)?;
                    self.op_constant(&function, index)?;
                }
                Opcode::Null => self.stack.push(Value::null()),
                Opcode::False => self.stack.push(Value::bool(false)),
                Opcode::True => self.stack.push(Value::bool(true)),
                Opcode::Pop => {
                    self.stack.pop()?;
                }
                Opcode::Dup => {
                    let value = self.stack.peek()?;
                    self.stack.push(value);
                }

                // Variables
                Opcode::LoadLocal => {
                    let slot = self.read_u8(code, &mut ip)?;
                    let value = self.stack.load_local(slot as usize)?;
                    self.stack.push(value);
                }
                Opcode::StoreLocal => {
                    let slot = self.read_u8(code, &mut ip)?;
                    let value = self.stack.peek()?;
                    self.stack.store_local(slot as usize, value)?;
                }
                Opcode::LoadModuleVar => {
                    let index = self.read_u16(code, &mut ip)?;
                    self.op_load_module_var(function.module, index)?;
                }
                Opcode::StoreModuleVar => {
                    let index = self.read_u16(code, &mut ip)?;
                    let value = self.stack.peek()?;
                    self.set_variable(function.module, Symbol::from_raw(index as u32), value)?;
                }

                // Fields
                Opcode::LoadFieldThis => {
                    let field = self.read_u8(code, &mut ip)?;
                    let value = self.load_this_field(field as usize)?;
                    self.stack.push(value);
                }
                Opcode::StoreFieldThis => {
                    let field = self.read_u8(code, &mut ip)?;
                    let value = self.stack.peek()?;
                    self.store_this_field(field as usize, value)?;
                }
                Opcode::LoadField => {
                    let field = self.read_u8(code, &mut ip)?;
                    let receiver = self.stack.pop()?;
                    let value = self.load_field(receiver, field as usize)?;
                    self.stack.push(value);
                }
                Opcode::StoreField => {
                    let field = self.read_u8(code, &mut ip)?;
                    let receiver = self.stack.pop()?;
                    let value = self.stack.peek()?;
                    self.store_field(receiver, field as usize, value)?;
                }

                // Calls
                Opcode::Call => {
                    let argc = self.read_u8(code, &mut ip)?;
                    let symbol = self.read_u16(code, &mut ip)?;
                    self.op_call(argc as usize, Symbol::from_raw(symbol as u32))?;
                }
                Opcode::Super => {
                    let argc = self.read_u8(code, &mut ip)?;
                    let symbol = self.read_u16(code, &mut ip)?;
                    let index = self.read_u16(code, &mut ip)?;
                    self.op_super(&function, argc as usize, Symbol::from_raw(symbol as u32), index)?;
                }
                Opcode::Return => {
                    let result = self.stack.pop()?;
                    self.stack.pop_frame()?;
                    return Ok(result);
                }

                // Instantiation
                Opcode::Construct => self.op_construct()?,
                Opcode::ForeignConstruct => self.op_foreign_construct()?,

                // Class definition
                Opcode::Class => {
                    let name = self.read_u16(code, &mut ip)?;
                    let fields = self.read_u8(code, &mut ip)?;
                    self.op_class(&function, name, FieldLayout::Fields(fields as usize))?;
                }
                Opcode::ForeignClass => {
                    let name = self.read_u16(code, &mut ip)?;
                    self.op_class(&function, name, FieldLayout::Opaque)?;
                }
                Opcode::MethodInstance | Opcode::MethodStatic => {
                    let symbol = self.read_u16(code, &mut ip)?;
                    let index = self.read_u16(code, &mut ip)?;
                    let is_static = opcode == Opcode::MethodStatic;
                    self.op_method(&function, Symbol::from_raw(symbol as u32), index, is_static)?;
                }
            }
        }
    }

    // ===== Helper Methods for Reading Operands =====

    #[inline]
    fn read_u8(&self, code: &[u8], ip: &mut usize) -> VmResult<u8> {
        let value = *code.get(*ip).ok_or(VmError::UnexpectedEndOfCode)?;
        *ip += 1;
        Ok(value)
    }

    #[inline]
    fn read_u16(&self, code: &[u8], ip: &mut usize) -> VmResult<u16> {
        if *ip + 1 >= code.len() {
            return Err(VmError::UnexpectedEndOfCode);
        }
        let value = u16::from_le_bytes([code[*ip], code[*ip + 1]]);
        *ip += 2;
        Ok(value)
    }

    // ===== Opcode Implementations =====

    /// CONSTANT - Push a value from the constant pool
    fn op_constant(&mut self, function: &Function, index: u16) -> VmResult<()> {
        match function.constant(index as usize) {
            Some(Constant::Value(value)) => {
                self.stack.push(*value);
                Ok(())
            }
            _ => Err(VmError::InvalidConstant(index)),
        }
    }

    /// LOAD_MODULE_VAR - Push a module variable
    fn op_load_module_var(&mut self, module: ModuleId, index: u16) -> VmResult<()> {
        let module = self.module(module)?;
        let value = module
            .variable(Symbol::from_raw(index as u32))
            .ok_or_else(|| {
                VmError::ModuleVariable(format!(
                    "variable index {} is not defined in module {}",
                    index,
                    module.name()
                ))
            })?;
        self.stack.push(value);
        Ok(())
    }

    /// CALL - Dispatch on the class of the receiver under the arguments
    fn op_call(&mut self, argc: usize, symbol: Symbol) -> VmResult<()> {
        let base = self
            .stack
            .depth()
            .checked_sub(argc + 1)
            .ok_or(VmError::StackUnderflow)?;
        let receiver = self.stack.peek_at(base)?;
        let class = self.class_of(receiver)?;
        let result = self.invoke(class, symbol, base)?;
        self.stack.push(result);
        Ok(())
    }

    /// SUPER - Dispatch on the class stored in the constant pool
    fn op_super(&mut self, function: &Function, argc: usize, symbol: Symbol, index: u16) -> VmResult<()> {
        let class = match function.constant(index as usize) {
            Some(Constant::Value(value)) => value.as_object().ok_or_else(|| {
                VmError::RuntimeError(format!(
                    "super call in '{}', which is not bound to a subclass",
                    function.name
                ))
            })?,
            _ => return Err(VmError::InvalidConstant(index)),
        };

        let base = self
            .stack
            .depth()
            .checked_sub(argc + 1)
            .ok_or(VmError::StackUnderflow)?;
        let result = self.invoke(class, symbol, base)?;
        self.stack.push(result);
        Ok(())
    }

    fn frame_base(&self) -> VmResult<usize> {
        self.stack
            .current_frame()
            .map(|frame| frame.base_pointer)
            .ok_or_else(|| VmError::RuntimeError("No active call frame".to_string()))
    }

    fn frame_class(&self, base: usize) -> VmResult<ObjRef> {
        let value = self.stack.peek_at(base)?;
        let class = value.as_object().ok_or_else(|| {
            VmError::RuntimeError(format!("constructor receiver must be a class, got {}", value.type_name()))
        })?;
        self.class(class)?;
        Ok(class)
    }

    /// CONSTRUCT - Replace the class in slot 0 with a new instance
    fn op_construct(&mut self) -> VmResult<()> {
        let base = self.frame_base()?;
        let class = self.frame_class(base)?;
        let instance = self.new_instance(class)?;
        self.stack.set_at(base, Value::object(instance))
    }

    /// FOREIGN_CONSTRUCT - Replace the class in slot 0 with an opaque instance
    /// built by the class's allocator
    fn op_foreign_construct(&mut self) -> VmResult<()> {
        let base = self.frame_base()?;
        let class = self.frame_class(base)?;

        let allocate = match self.class(class)?.methods.get(self.allocate_symbol) {
            Method::Foreign(id) => self.foreign.allocator(id),
            _ => None,
        };
        let allocate = allocate.ok_or_else(|| {
            VmError::ForeignNotFound(format!(
                "allocator for {}",
                self.class_name(class).unwrap_or("<unknown>")
            ))
        })?;

        let arity = self
            .stack
            .current_frame()
            .map_or(0, |frame| frame.function.arity as usize);
        let args: Vec<Value> = self
            .stack
            .slice_from(base)?
            .iter()
            .take(arity + 1)
            .copied()
            .collect();

        let data = allocate(self, &args).map_err(VmError::Foreign)?;
        let instance = self.new_opaque_instance(class, data)?;
        self.stack.set_at(base, Value::object(instance))
    }

    /// CLASS / FOREIGN_CLASS - Replace the superclass on top with a new class
    fn op_class(&mut self, function: &Function, name: u16, layout: FieldLayout) -> VmResult<()> {
        let name = match function.constant(name as usize) {
            Some(Constant::Str(s)) => Rc::clone(s),
            _ => return Err(VmError::InvalidConstant(name)),
        };

        let allocator = if layout.is_opaque() {
            let module = self.module(function.module)?.name().to_string();
            Some(self.foreign.resolve_allocator(&module, &name)?)
        } else {
            None
        };

        // The superclass stays on the stack while the class is built
        let superclass = self.stack.peek()?;
        let class = self.define_class(superclass, layout, &name)?;
        if let Some(id) = allocator {
            let allocate_symbol = self.allocate_symbol;
            self.class_mut(class)?
                .methods
                .set(allocate_symbol, Method::Foreign(id));
        }

        self.stack.pop()?;
        self.stack.push(Value::object(class));
        Ok(())
    }

    /// METHOD_INSTANCE / METHOD_STATIC - Bind a method on the class on top
    fn op_method(&mut self, function: &Function, symbol: Symbol, index: u16, is_static: bool) -> VmResult<()> {
        let value = self.stack.peek()?;
        let class = value.as_object().ok_or_else(|| {
            VmError::RuntimeError(format!("methods can only be bound to classes, got {}", value.type_name()))
        })?;

        match function.constant(index as usize) {
            Some(Constant::Function(body)) => self.bind_closure(class, symbol, body, is_static),
            Some(Constant::ForeignMethod) => {
                self.bind_foreign_method(function.module, class, symbol, is_static)
            }
            _ => Err(VmError::InvalidConstant(index)),
        }
    }
}
