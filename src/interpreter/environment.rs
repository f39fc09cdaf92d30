//! Scope chain
//!
//! Environments live on a single stack. Index 0 is always the global scope;
//! every call pushes exactly one `Lexer` scope, and block instructions push
//! and pop `Block` scopes above it.
//!
//! A lookup scans the stack from innermost to outermost. Inside a `Lexer`
//! scope the function's captured cells are checked after its own bindings,
//! so the current function's scopes always win over the scopes of its
//! callers. Closures that were not handed a cell for a name (a function's
//! own name, or a `var` declared after the closure) still reach it through
//! the scopes below them.

use serde::{Deserialize, Serialize};

use crate::error::JsError;
use crate::gc::{Heap, Traceable};
use crate::prelude::FxHashMap;
use crate::value::{CheapClone, HeapRef, JsString, Value};

/// A name binding: a plain slot, or a heap cell shared with closures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Binding {
    Value(Value),
    Cell(HeapRef),
}

/// Block scope variants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BlockKind {
    Normal,
    /// Target of `BreakLabel`
    Labeled { label: JsString, exit: usize },
    /// Target of `Break` (loops and switch)
    Iterable { exit: usize },
    /// Catch handler; the operand stack is cut back to `stack_height`
    Try {
        catch_target: usize,
        stack_height: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScopeKind {
    Global,
    /// Function scope with the cells its closure captured
    Lexer {
        upvalues: FxHashMap<JsString, HeapRef>,
    },
    Block(BlockKind),
}

/// Where `define` places a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hoist {
    /// `var`-style: nearest function or global scope
    FunctionLevel,
    /// `let`/`const`-style: innermost scope
    Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub kind: ScopeKind,
    pub bindings: FxHashMap<JsString, Binding>,
}

impl Environment {
    pub fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            bindings: FxHashMap::default(),
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self.kind, ScopeKind::Block(_))
    }

    /// Global and function scopes
    pub fn is_function_level(&self) -> bool {
        !self.is_block()
    }
}

impl Traceable for Environment {
    fn trace<F: FnMut(HeapRef)>(&self, visitor: &mut F) {
        if let ScopeKind::Lexer { upvalues } = &self.kind {
            upvalues.values().for_each(|cell| visitor(*cell));
        }
        for binding in self.bindings.values() {
            match binding {
                Binding::Value(value) => value.trace(visitor),
                Binding::Cell(cell) => visitor(*cell),
            }
        }
    }

    fn relocate<F: Fn(HeapRef) -> HeapRef>(&mut self, map: &F) {
        if let ScopeKind::Lexer { upvalues } = &mut self.kind {
            upvalues.values_mut().for_each(|cell| *cell = map(*cell));
        }
        for binding in self.bindings.values_mut() {
            match binding {
                Binding::Value(value) => value.relocate(map),
                Binding::Cell(cell) => *cell = map(*cell),
            }
        }
    }
}

/// Where a name currently resolves
enum Slot {
    Binding(usize),
    Upvalue(HeapRef),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentStack {
    envs: Vec<Environment>,
}

impl Default for EnvironmentStack {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvironmentStack {
    pub fn new() -> Self {
        Self {
            envs: vec![Environment::new(ScopeKind::Global)],
        }
    }

    pub fn len(&self) -> usize {
        self.envs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envs.is_empty()
    }

    pub fn push(&mut self, env: Environment) {
        self.envs.push(env);
    }

    /// Pop a block scope. The global scope and function scopes are owned by
    /// the call machinery and cannot be exited with `ExitBlockScope`.
    pub fn pop_block(&mut self) -> Result<Environment, JsError> {
        match self.envs.last() {
            Some(env) if env.is_block() => self
                .envs
                .pop()
                .ok_or_else(|| JsError::internal_error("environment stack empty")),
            _ => Err(JsError::malformed("ExitBlockScope without a block scope")),
        }
    }

    pub fn last(&self) -> Option<&Environment> {
        self.envs.last()
    }

    pub fn truncate(&mut self, len: usize) {
        self.envs.truncate(len.max(1));
    }

    /// Detach every scope from `start` upwards (generator suspension)
    pub fn split_off(&mut self, start: usize) -> Vec<Environment> {
        self.envs.split_off(start.clamp(1, self.envs.len()))
    }

    pub fn extend(&mut self, envs: Vec<Environment>) {
        self.envs.extend(envs);
    }

    pub fn global(&self) -> Option<&Environment> {
        self.envs.first()
    }

    /// Bind `name` in the global scope regardless of the current depth
    pub fn define_global(&mut self, name: JsString, value: Value) {
        if let Some(global) = self.envs.first_mut() {
            global.bindings.insert(name, Binding::Value(value));
        }
    }

    fn resolve(&self, name: &str) -> Option<Slot> {
        for (index, env) in self.envs.iter().enumerate().rev() {
            if env.bindings.contains_key(name) {
                return Some(Slot::Binding(index));
            }
            if let ScopeKind::Lexer { upvalues } = &env.kind {
                if let Some(cell) = upvalues.get(name) {
                    return Some(Slot::Upvalue(*cell));
                }
            }
        }
        None
    }

    pub fn lookup(&self, name: &str, heap: &Heap) -> Result<Value, JsError> {
        match self.resolve(name) {
            Some(Slot::Binding(index)) => {
                match self.envs.get(index).and_then(|env| env.bindings.get(name)) {
                    Some(Binding::Value(value)) => Ok(value.clone()),
                    Some(Binding::Cell(cell)) => heap.cell(*cell).cloned(),
                    None => Err(JsError::unbound_name(name)),
                }
            }
            Some(Slot::Upvalue(cell)) => heap.cell(cell).cloned(),
            None => Err(JsError::unbound_name(name)),
        }
    }

    pub fn define(
        &mut self,
        name: JsString,
        value: Value,
        hoist: Hoist,
        heap: &mut Heap,
    ) -> Result<(), JsError> {
        let env = match hoist {
            Hoist::Block => self.envs.last_mut(),
            Hoist::FunctionLevel => self
                .envs
                .iter_mut()
                .rev()
                .find(|env| env.is_function_level()),
        }
        .ok_or_else(|| JsError::internal_error("no scope to define in"))?;

        let existing = match env.bindings.get(name.as_str()) {
            Some(Binding::Cell(cell)) => Some(*cell),
            _ => None,
        };
        match existing {
            Some(cell) => *heap.cell_mut(cell)? = value,
            None => {
                env.bindings.insert(name, Binding::Value(value));
            }
        }
        Ok(())
    }

    pub fn assign(&mut self, name: &str, value: Value, heap: &mut Heap) -> Result<(), JsError> {
        match self.resolve(name) {
            Some(Slot::Binding(index)) => {
                let binding = self
                    .envs
                    .get_mut(index)
                    .and_then(|env| env.bindings.get_mut(name))
                    .ok_or_else(|| JsError::unbound_name(name))?;
                match binding {
                    Binding::Value(slot) => *slot = value,
                    Binding::Cell(cell) => *heap.cell_mut(*cell)? = value,
                }
                Ok(())
            }
            Some(Slot::Upvalue(cell)) => {
                *heap.cell_mut(cell)? = value;
                Ok(())
            }
            None => Err(JsError::unbound_name(name)),
        }
    }

    /// Share the binding `name` with a closure being created.
    ///
    /// Local bindings are boxed into a heap cell on first capture. Global
    /// names are not captured. A name that does not resolve yet is declared
    /// as an undefined cell in the nearest function scope, so a later
    /// definition fills the cell the closure already holds.
    pub fn capture(&mut self, name: &JsString, heap: &mut Heap) -> Result<Option<HeapRef>, JsError> {
        match self.resolve(name.as_str()) {
            Some(Slot::Upvalue(cell)) => Ok(Some(cell)),
            Some(Slot::Binding(0)) => Ok(None),
            Some(Slot::Binding(index)) => {
                let binding = self
                    .envs
                    .get_mut(index)
                    .and_then(|env| env.bindings.get_mut(name.as_str()))
                    .ok_or_else(|| JsError::unbound_name(name.as_str()))?;
                match binding {
                    Binding::Cell(cell) => Ok(Some(*cell)),
                    Binding::Value(value) => {
                        let cell = heap.alloc_cell(std::mem::take(value));
                        *binding = Binding::Cell(cell);
                        Ok(Some(cell))
                    }
                }
            }
            None => {
                let Some(env) = self
                    .envs
                    .iter_mut()
                    .rev()
                    .find(|env| env.is_function_level())
                else {
                    return Ok(None);
                };
                if matches!(env.kind, ScopeKind::Global) {
                    return Ok(None);
                }
                let cell = heap.alloc_cell(Value::Undefined);
                env.bindings.insert(name.cheap_clone(), Binding::Cell(cell));
                Ok(Some(cell))
            }
        }
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Environment> {
        self.envs.iter()
    }
}

impl Traceable for EnvironmentStack {
    fn trace<F: FnMut(HeapRef)>(&self, visitor: &mut F) {
        self.envs.iter().for_each(|env| env.trace(visitor));
    }

    fn relocate<F: Fn(HeapRef) -> HeapRef>(&mut self, map: &F) {
        self.envs.iter_mut().for_each(|env| env.relocate(map));
    }
}
