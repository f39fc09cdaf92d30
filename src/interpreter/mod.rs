//! The virtual machine
//!
//! A [`Vm`] owns one linked object file together with all execution state:
//! program counter, operand stack, call frames, scope stack, heap and the
//! realm of built-in prototypes. Execution is driven either to completion
//! with [`Vm::exec`] or one instruction at a time with [`Vm::step`], and the
//! whole state can be captured with [`Vm::dump`] and restored with
//! [`Vm::load`] between any two instructions.

pub mod builtins;
mod bytecode_vm;
pub mod environment;
pub mod generator;
mod inspect;
mod property;
mod snapshot;
pub mod stack;

pub use environment::{Binding, BlockKind, Environment, EnvironmentStack, Hoist, ScopeKind};
pub use generator::{Delegate, GeneratorContext, GeneratorState};
pub use snapshot::VmSnapshot;
pub use stack::StackFrame;

use serde::{Deserialize, Serialize};

use crate::compiler::{Constant, Instruction, ObjectFile};
use crate::error::JsError;
use crate::gc::{GcStats, Heap, Traceable};
use crate::platform::{ConsoleLevel, ConsoleProvider, StdConsoleProvider};
use crate::value::{
    FunctionKind, HeapRef, JsFunction, JsString, NativeId, ObjectKind,
    PropertyDescriptor, PropertyKey, Value,
};
use stack::Boundary;

// ═══════════════════════════════════════════════════════════════════════════════
// Host functions
// ═══════════════════════════════════════════════════════════════════════════════

/// Host function whose return value the call site pushes.
///
/// Arguments are `(vm, this, args, captures)`; `captures` are the values
/// stored in the function object when it was created.
pub type NativeFn = fn(&mut Vm, Value, &[Value], &[Value]) -> Result<Value, JsError>;

/// Host function that pushes or schedules its own result
pub type BridgeFn = fn(&mut Vm, Value, &[Value], &[Value]) -> Result<(), JsError>;

#[derive(Clone, Copy)]
pub enum HostFn {
    Native(NativeFn),
    Bridge(BridgeFn),
}

struct NativeEntry {
    name: String,
    func: HostFn,
}

/// Host functions the VM itself relies on
#[derive(Debug, Clone, Copy)]
pub(crate) struct Intrinsics {
    pub function_prototype: NativeId,
    pub generator_next: NativeId,
    pub generator_return: NativeId,
    pub bound_function: NativeId,
}

/// Built-in prototypes
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Realm {
    pub object_prototype: HeapRef,
    pub function_prototype: HeapRef,
    pub array_prototype: HeapRef,
    pub string_prototype: HeapRef,
}

impl Traceable for Realm {
    fn trace<F: FnMut(HeapRef)>(&self, visitor: &mut F) {
        visitor(self.object_prototype);
        visitor(self.function_prototype);
        visitor(self.array_prototype);
        visitor(self.string_prototype);
    }

    fn relocate<F: Fn(HeapRef) -> HeapRef>(&mut self, map: &F) {
        self.object_prototype = map(self.object_prototype);
        self.function_prototype = map(self.function_prototype);
        self.array_prototype = map(self.array_prototype);
        self.string_prototype = map(self.string_prototype);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration & results
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Initial program counter
    pub start_pc: usize,
    /// Maximum number of simultaneous call frames
    pub max_call_depth: usize,
    /// Collect after this many allocations (0 = only on demand)
    pub gc_interval: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            start_pc: 0,
            max_call_depth: 10_000,
            gc_interval: 0,
        }
    }
}

/// Result of executing one step
#[derive(Debug)]
pub enum StepResult {
    /// More instructions remain
    Continue,
    /// The program finished; carries the top of the operand stack
    Complete(Value),
}

/// Seam through which host code calls back into the VM
pub trait Callable {
    /// Call `callee` as a call site would: host functions run immediately,
    /// bytecode functions get a frame that returns to the current position.
    fn call(&mut self, callee: Value, args: Vec<Value>, this: Value) -> Result<(), JsError>;

    /// Run one collection and return the number of reclaimed heap slots
    fn gc(&mut self) -> usize;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Vm
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Vm {
    pub(crate) code: Vec<Instruction>,
    pub(crate) constants: Vec<Constant>,
    pub(crate) pc: usize,
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<StackFrame>,
    pub(crate) envs: EnvironmentStack,
    pub(crate) heap: Heap,
    pub(crate) realm: Realm,
    natives: Vec<NativeEntry>,
    pub(crate) intrinsics: Intrinsics,
    pub(crate) config: VmConfig,
    /// Active `invoke` calls, innermost last
    pub(crate) boundaries: Vec<Boundary>,
    console: Box<dyn ConsoleProvider>,
}

impl Vm {
    /// Create a VM for `file`. The initializer registers the global
    /// bindings before any instruction runs.
    pub fn new<I>(file: ObjectFile, config: VmConfig, initializer: I) -> Result<Self, JsError>
    where
        I: FnOnce(&mut Vm) -> Result<(), JsError>,
    {
        let placeholder = HeapRef(0);
        let mut vm = Vm {
            code: file.instructions,
            constants: file.constants,
            pc: config.start_pc,
            stack: Vec::new(),
            frames: Vec::new(),
            envs: EnvironmentStack::new(),
            heap: Heap::new(),
            realm: Realm {
                object_prototype: placeholder,
                function_prototype: placeholder,
                array_prototype: placeholder,
                string_prototype: placeholder,
            },
            natives: Vec::new(),
            intrinsics: Intrinsics {
                function_prototype: NativeId(0),
                generator_next: NativeId(0),
                generator_return: NativeId(0),
                bound_function: NativeId(0),
            },
            config,
            boundaries: Vec::new(),
            console: Box::new(StdConsoleProvider::new()),
        };

        vm.intrinsics = Intrinsics {
            function_prototype: vm.register_native(
                "%FunctionPrototype%",
                HostFn::Native(builtins::function::function_prototype_call),
            ),
            generator_next: vm.register_native(
                "%GeneratorNext%",
                HostFn::Bridge(builtins::generator::generator_next),
            ),
            generator_return: vm.register_native(
                "%GeneratorReturn%",
                HostFn::Bridge(builtins::generator::generator_return),
            ),
            bound_function: vm.register_native(
                "%BoundFunction%",
                HostFn::Bridge(builtins::function::bound_function_call),
            ),
        };

        let object_prototype = vm.heap.alloc_object(Value::Null, ObjectKind::Ordinary);
        let function_prototype = vm.heap.alloc_object(
            Value::Reference(object_prototype),
            ObjectKind::Function(Box::new(JsFunction {
                name: JsString::from(""),
                param_count: 0,
                entry: None,
                upvalues: Default::default(),
                source_text: JsString::from("function () { [native code] }"),
                kind: FunctionKind::Native {
                    id: vm.intrinsics.function_prototype,
                    captures: Vec::new(),
                },
            })),
        );
        let array_prototype = vm
            .heap
            .alloc_object(Value::Reference(object_prototype), ObjectKind::Ordinary);
        let string_prototype = vm
            .heap
            .alloc_object(Value::Reference(object_prototype), ObjectKind::Ordinary);
        vm.realm = Realm {
            object_prototype,
            function_prototype,
            array_prototype,
            string_prototype,
        };

        initializer(&mut vm)?;
        Ok(vm)
    }

    /// Create a VM with the default configuration and built-in globals
    pub fn with_builtins(file: ObjectFile) -> Result<Self, JsError> {
        Self::new(file, VmConfig::default(), builtins::install)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Accessors & configuration
    // ────────────────────────────────────────────────────────────────────────

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    pub fn environments(&self) -> &EnvironmentStack {
        &self.envs
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn gc_stats(&self) -> GcStats {
        self.heap.stats()
    }

    /// Whether every instruction has run
    pub fn is_finished(&self) -> bool {
        self.pc >= self.code.len() && self.frames.is_empty()
    }

    /// Set the automatic collection interval (0 = only on demand)
    pub fn set_gc_interval(&mut self, interval: usize) {
        self.config.gc_interval = interval;
    }

    pub fn set_max_call_depth(&mut self, depth: usize) {
        self.config.max_call_depth = depth;
    }

    pub fn set_console(&mut self, console: Box<dyn ConsoleProvider>) {
        self.console = console;
    }

    pub(crate) fn console_write(&self, level: ConsoleLevel, message: &str) {
        self.console.write(level, message);
    }

    pub(crate) fn check_call_depth(&self) -> Result<(), JsError> {
        if self.frames.len() >= self.config.max_call_depth {
            return Err(JsError::CallStackOverflow {
                depth: self.frames.len(),
            });
        }
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────────────
    // Globals & host functions
    // ────────────────────────────────────────────────────────────────────────

    /// Add a host function to the native table
    pub fn register_native(&mut self, name: &str, func: HostFn) -> NativeId {
        let id = NativeId(self.natives.len());
        self.natives.push(NativeEntry {
            name: name.to_string(),
            func,
        });
        id
    }

    pub(crate) fn native(&self, id: NativeId) -> Result<HostFn, JsError> {
        self.natives
            .get(id.0)
            .map(|entry| entry.func)
            .ok_or_else(|| JsError::malformed(format!("unknown native function #{}", id.0)))
    }

    pub(crate) fn native_names(&self) -> Vec<String> {
        self.natives.iter().map(|entry| entry.name.clone()).collect()
    }

    pub fn define_global(&mut self, name: &str, value: Value) {
        self.envs.define_global(JsString::from(name), value);
    }

    /// Current value of a global binding
    pub fn get_global(&self, name: &str) -> Option<Value> {
        match self.envs.global()?.bindings.get(name)? {
            Binding::Value(value) => Some(value.clone()),
            Binding::Cell(cell) => self.heap.cell(*cell).ok().cloned(),
        }
    }

    /// Allocate an ordinary object inheriting from `Object.prototype`
    pub fn create_object(&mut self) -> HeapRef {
        let proto = Value::Reference(self.realm.object_prototype);
        self.heap.alloc_object(proto, ObjectKind::Ordinary)
    }

    pub fn create_array(&mut self, items: Vec<Value>) -> HeapRef {
        let proto = Value::Reference(self.realm.array_prototype);
        self.heap.alloc_object(proto, ObjectKind::Array(items))
    }

    /// Allocate a function object with its own empty `prototype` object
    pub fn create_function(&mut self, func: JsFunction) -> Result<HeapRef, JsError> {
        let proto = Value::Reference(self.realm.function_prototype);
        let function = self
            .heap
            .alloc_object(proto, ObjectKind::Function(Box::new(func)));
        let prototype = self.create_object();
        self.heap.define_property(
            function,
            PropertyKey::from("prototype"),
            PropertyDescriptor::hidden(Value::Reference(prototype)),
        )?;
        Ok(function)
    }

    /// Wrap a registered host function in a function object
    pub fn create_host_function(
        &mut self,
        name: &str,
        param_count: usize,
        id: NativeId,
        captures: Vec<Value>,
    ) -> Result<HeapRef, JsError> {
        let kind = match self.native(id)? {
            HostFn::Native(_) => FunctionKind::Native { id, captures },
            HostFn::Bridge(_) => FunctionKind::Bridge { id, captures },
        };
        self.create_function(JsFunction {
            name: JsString::from(name),
            param_count,
            entry: None,
            upvalues: Default::default(),
            source_text: JsString::from(format!("function {}() {{ [native code] }}", name)),
            kind,
        })
    }

    /// Register `func` and wrap it in a fresh function object
    pub fn create_native_function(
        &mut self,
        name: &str,
        param_count: usize,
        func: HostFn,
    ) -> Result<HeapRef, JsError> {
        let id = self.register_native(name, func);
        self.create_host_function(name, param_count, id, Vec::new())
    }

    /// Register `func` and install it as a non-enumerable method on `target`
    pub fn define_method(
        &mut self,
        target: HeapRef,
        name: &str,
        param_count: usize,
        func: HostFn,
    ) -> Result<HeapRef, JsError> {
        let function = self.create_native_function(name, param_count, func)?;
        self.heap.define_property(
            target,
            PropertyKey::from(name),
            PropertyDescriptor::hidden(Value::Reference(function)),
        )?;
        Ok(function)
    }

    /// Install a native accessor with only a getter on `target`
    pub fn define_getter(
        &mut self,
        target: HeapRef,
        name: &str,
        getter: NativeFn,
    ) -> Result<(), JsError> {
        let id = self.register_native(&format!("get {}", name), HostFn::Native(getter));
        let function = self.create_host_function(name, 0, id, Vec::new())?;
        self.heap.define_property(
            target,
            PropertyKey::from(name),
            PropertyDescriptor::getter(Value::Reference(function), false),
        )
    }

    // ────────────────────────────────────────────────────────────────────────
    // Execution entry points
    // ────────────────────────────────────────────────────────────────────────

    /// Run to completion and return the top of the operand stack
    pub fn exec(&mut self) -> Result<Value, JsError> {
        loop {
            if let StepResult::Complete(value) = self.step()? {
                return Ok(value);
            }
        }
    }

    /// Execute exactly one instruction
    pub fn step(&mut self) -> Result<StepResult, JsError> {
        if self.is_finished() {
            return Ok(StepResult::Complete(self.result_value()));
        }
        if let Err(e) = self.step_instruction() {
            if e.is_uncaught() {
                log::warn!("{}", e);
                self.console_write(ConsoleLevel::Error, &e.to_string());
            }
            return Err(e);
        }
        if self.is_finished() {
            return Ok(StepResult::Complete(self.result_value()));
        }
        Ok(StepResult::Continue)
    }

    fn result_value(&self) -> Value {
        self.stack.last().cloned().unwrap_or_default()
    }

    /// Call `callee` synchronously from host code and return its result.
    ///
    /// Exceptions not caught inside the call surface as
    /// [`JsError::Uncaught`]; the VM state is restored to the point of the
    /// call either way.
    pub fn invoke(&mut self, callee: Value, this: Value, args: Vec<Value>) -> Result<Value, JsError> {
        let boundary = Boundary {
            frames: self.frames.len(),
            envs: self.envs.len(),
            stack: self.stack.len(),
        };
        let saved_pc = self.pc;
        self.boundaries.push(boundary);

        let result = self.run_invocation(callee, this, args, boundary);

        self.boundaries.pop();
        self.pc = saved_pc;
        self.frames.truncate(boundary.frames);
        self.envs.truncate(boundary.envs);
        self.stack.truncate(boundary.stack);
        result
    }

    fn run_invocation(
        &mut self,
        callee: Value,
        this: Value,
        args: Vec<Value>,
        boundary: Boundary,
    ) -> Result<Value, JsError> {
        self.call_value(callee, args, this, false)?;
        while self.frames.len() > boundary.frames {
            if self.pc >= self.code.len() {
                return Err(JsError::malformed("function body runs past the end of the code"));
            }
            self.step_instruction()?;
        }
        Ok(if self.stack.len() > boundary.stack {
            self.stack.pop().unwrap_or_default()
        } else {
            Value::Undefined
        })
    }

    /// Run one collection pass and return the number of reclaimed slots.
    ///
    /// While a host call is active, host code may hold references the VM
    /// cannot see, so the collection is skipped and 0 is returned.
    pub fn collect_garbage(&mut self) -> usize {
        if !self.boundaries.is_empty() {
            log::debug!("gc: skipped inside a host call");
            return 0;
        }
        let mut roots = Roots {
            stack: &mut self.stack,
            frames: &mut self.frames,
            envs: &mut self.envs,
            realm: &mut self.realm,
        };
        self.heap.collect(&mut roots)
    }

    /// Collect at an instruction boundary once enough allocations happened
    pub(crate) fn maybe_collect(&mut self) {
        let interval = self.config.gc_interval;
        if interval > 0
            && self.boundaries.is_empty()
            && self.heap.allocations_since_collect() >= interval
        {
            self.collect_garbage();
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Host-side property access
    // ────────────────────────────────────────────────────────────────────────

    /// Read `key` from `target`, running a getter if one is found
    pub fn get_property(&mut self, target: &Value, key: &str) -> Result<Value, JsError> {
        let key = PropertyKey::from(key);
        match self.lookup_property(target, &key)? {
            property::Lookup::Value(value) => Ok(value),
            property::Lookup::Getter(getter) => self.invoke(getter, target.clone(), Vec::new()),
        }
    }

    /// Elements of an array value, holes as `undefined`
    pub fn array_items(&self, value: &Value) -> Result<Vec<Value>, JsError> {
        let r = value
            .as_reference()
            .ok_or_else(|| JsError::invalid_cast("array", value.kind_name()))?;
        let obj = self.heap.object(r)?;
        if obj.array_items().is_none() {
            return Err(JsError::invalid_cast("array", "object"));
        }
        obj.padded_elements()
            .ok_or_else(|| JsError::type_error("Invalid array length"))
    }
}

impl Callable for Vm {
    fn call(&mut self, callee: Value, args: Vec<Value>, this: Value) -> Result<(), JsError> {
        self.call_value(callee, args, this, false)
    }

    fn gc(&mut self) -> usize {
        self.collect_garbage()
    }
}

/// Everything outside the heap that can hold references
struct Roots<'a> {
    stack: &'a mut Vec<Value>,
    frames: &'a mut Vec<StackFrame>,
    envs: &'a mut EnvironmentStack,
    realm: &'a mut Realm,
}

impl Traceable for Roots<'_> {
    fn trace<F: FnMut(HeapRef)>(&self, visitor: &mut F) {
        self.realm.trace(visitor);
        self.envs.trace(visitor);
        self.stack.trace(visitor);
        self.frames.trace(visitor);
    }

    fn relocate<F: Fn(HeapRef) -> HeapRef>(&mut self, map: &F) {
        self.realm.relocate(map);
        self.envs.relocate(map);
        self.stack.relocate(map);
        self.frames.relocate(map);
    }
}
