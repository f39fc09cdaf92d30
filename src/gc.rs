//! Heap storage and the compacting collector.
//!
//! The heap is a flat vector of [`HeapValue`] slots addressed by [`HeapRef`].
//! Slots are never freed individually. A collection traverses everything
//! reachable from the roots, builds a new vector holding only the discovered
//! slots in first-discovery order, and rewrites every reference in place.

use serde::{Deserialize, Serialize};

use crate::error::JsError;
use crate::interpreter::generator::GeneratorContext;
use crate::value::{
    HeapRef, IterationCursor, JsFunction, JsObject, ObjectKind, PropertyDescriptor, PropertyKey,
    Value,
};

// ============================================================================
// Traceable - reference discovery and relocation
// ============================================================================

/// Types that hold heap references.
///
/// `trace` reports every `HeapRef` held directly by the value. `relocate`
/// rewrites each of them through the forwarding function built by a
/// collection; it must visit exactly the references `trace` reports.
pub trait Traceable {
    fn trace<F: FnMut(HeapRef)>(&self, visitor: &mut F);

    fn relocate<F: Fn(HeapRef) -> HeapRef>(&mut self, map: &F);
}

impl<T: Traceable> Traceable for Vec<T> {
    fn trace<F: FnMut(HeapRef)>(&self, visitor: &mut F) {
        self.iter().for_each(|item| item.trace(visitor));
    }

    fn relocate<F: Fn(HeapRef) -> HeapRef>(&mut self, map: &F) {
        self.iter_mut().for_each(|item| item.relocate(map));
    }
}

impl<T: Traceable> Traceable for Option<T> {
    fn trace<F: FnMut(HeapRef)>(&self, visitor: &mut F) {
        if let Some(item) = self {
            item.trace(visitor);
        }
    }

    fn relocate<F: Fn(HeapRef) -> HeapRef>(&mut self, map: &F) {
        if let Some(item) = self {
            item.relocate(map);
        }
    }
}

impl Traceable for HeapRef {
    fn trace<F: FnMut(HeapRef)>(&self, visitor: &mut F) {
        visitor(*self);
    }

    fn relocate<F: Fn(HeapRef) -> HeapRef>(&mut self, map: &F) {
        *self = map(*self);
    }
}

// ============================================================================
// HeapValue - one heap slot
// ============================================================================

/// Contents of a heap slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HeapValue {
    /// Objects, arrays, functions and generator iterator objects
    Object(JsObject),
    /// A boxed binding shared between a scope and the closures capturing it
    Cell(Value),
    /// `for...in` / `for...of` cursor
    Iterator(IterationCursor),
    /// Suspended generator state
    Generator(Box<GeneratorContext>),
}

impl HeapValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            HeapValue::Object(obj) => match obj.kind {
                ObjectKind::Ordinary => "object",
                ObjectKind::Array(_) => "array",
                ObjectKind::Function(_) => "function",
                ObjectKind::Generator(_) => "generator object",
            },
            HeapValue::Cell(_) => "cell",
            HeapValue::Iterator(_) => "iterator",
            HeapValue::Generator(_) => "generator context",
        }
    }
}

impl Traceable for HeapValue {
    fn trace<F: FnMut(HeapRef)>(&self, visitor: &mut F) {
        match self {
            HeapValue::Object(obj) => obj.trace(visitor),
            HeapValue::Cell(value) => value.trace(visitor),
            HeapValue::Iterator(iter) => iter.trace(visitor),
            HeapValue::Generator(ctx) => ctx.trace(visitor),
        }
    }

    fn relocate<F: Fn(HeapRef) -> HeapRef>(&mut self, map: &F) {
        match self {
            HeapValue::Object(obj) => obj.relocate(map),
            HeapValue::Cell(value) => value.relocate(map),
            HeapValue::Iterator(iter) => iter.relocate(map),
            HeapValue::Generator(ctx) => ctx.relocate(map),
        }
    }
}

// ============================================================================
// GcStats - statistics about the heap
// ============================================================================

/// Statistics about the heap and collector
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Number of occupied slots
    pub heap_size: usize,
    /// Allocations since the last collection
    pub allocations_since_collect: usize,
    /// Completed collection passes
    pub collections: usize,
    /// Slots reclaimed by the most recent pass
    pub last_reclaimed: usize,
}

// ============================================================================
// Heap
// ============================================================================

/// Forwarding target for references that were already dangling
const DANGLING: HeapRef = HeapRef(usize::MAX);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Heap {
    slots: Vec<HeapValue>,
    #[serde(default)]
    allocations_since_collect: usize,
    #[serde(skip)]
    collections: usize,
    #[serde(skip)]
    last_reclaimed: usize,
}

/// First-discovery bookkeeping for one collection pass
struct Marker {
    forwarding: Vec<Option<usize>>,
    order: Vec<usize>,
    worklist: Vec<usize>,
    dangling: usize,
}

impl Marker {
    fn visit(&mut self, r: HeapRef) {
        match self.forwarding.get_mut(r.index()) {
            Some(slot @ None) => {
                *slot = Some(self.order.len());
                self.order.push(r.index());
                self.worklist.push(r.index());
            }
            Some(Some(_)) => {}
            None => self.dangling += 1,
        }
    }
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn stats(&self) -> GcStats {
        GcStats {
            heap_size: self.slots.len(),
            allocations_since_collect: self.allocations_since_collect,
            collections: self.collections,
            last_reclaimed: self.last_reclaimed,
        }
    }

    pub fn allocations_since_collect(&self) -> usize {
        self.allocations_since_collect
    }

    pub fn alloc(&mut self, value: HeapValue) -> HeapRef {
        let r = HeapRef(self.slots.len());
        self.slots.push(value);
        self.allocations_since_collect += 1;
        r
    }

    pub fn alloc_object(&mut self, proto: Value, kind: ObjectKind) -> HeapRef {
        self.alloc(HeapValue::Object(JsObject::new(proto, kind)))
    }

    pub fn alloc_cell(&mut self, value: Value) -> HeapRef {
        self.alloc(HeapValue::Cell(value))
    }

    pub fn get(&self, r: HeapRef) -> Result<&HeapValue, JsError> {
        self.slots
            .get(r.index())
            .ok_or(JsError::DanglingReference { index: r.index() })
    }

    pub fn get_mut(&mut self, r: HeapRef) -> Result<&mut HeapValue, JsError> {
        self.slots
            .get_mut(r.index())
            .ok_or(JsError::DanglingReference { index: r.index() })
    }

    pub fn object(&self, r: HeapRef) -> Result<&JsObject, JsError> {
        match self.get(r)? {
            HeapValue::Object(obj) => Ok(obj),
            other => Err(JsError::invalid_cast("object", other.kind_name())),
        }
    }

    pub fn object_mut(&mut self, r: HeapRef) -> Result<&mut JsObject, JsError> {
        match self.get_mut(r)? {
            HeapValue::Object(obj) => Ok(obj),
            other => Err(JsError::invalid_cast("object", other.kind_name())),
        }
    }

    /// The function record behind `value`, if it references a function object
    pub fn function_of(&self, value: &Value) -> Option<&JsFunction> {
        let r = value.as_reference()?;
        match self.slots.get(r.index())? {
            HeapValue::Object(obj) => obj.as_function(),
            _ => None,
        }
    }

    pub fn is_callable(&self, value: &Value) -> bool {
        self.function_of(value).is_some()
    }

    pub fn cell(&self, r: HeapRef) -> Result<&Value, JsError> {
        match self.get(r)? {
            HeapValue::Cell(value) => Ok(value),
            other => Err(JsError::invalid_cast("cell", other.kind_name())),
        }
    }

    pub fn cell_mut(&mut self, r: HeapRef) -> Result<&mut Value, JsError> {
        match self.get_mut(r)? {
            HeapValue::Cell(value) => Ok(value),
            other => Err(JsError::invalid_cast("cell", other.kind_name())),
        }
    }

    pub fn iterator_mut(&mut self, r: HeapRef) -> Result<&mut IterationCursor, JsError> {
        match self.get_mut(r)? {
            HeapValue::Iterator(iter) => Ok(iter),
            other => Err(JsError::invalid_cast("iterator", other.kind_name())),
        }
    }

    pub fn generator(&self, r: HeapRef) -> Result<&GeneratorContext, JsError> {
        match self.get(r)? {
            HeapValue::Generator(ctx) => Ok(ctx),
            other => Err(JsError::invalid_cast("generator context", other.kind_name())),
        }
    }

    pub fn generator_mut(&mut self, r: HeapRef) -> Result<&mut GeneratorContext, JsError> {
        match self.get_mut(r)? {
            HeapValue::Generator(ctx) => Ok(ctx),
            other => Err(JsError::invalid_cast("generator context", other.kind_name())),
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Object model access
    // ────────────────────────────────────────────────────────────────────────

    /// Walk the `__proto__` chain starting at `start` and return the first
    /// descriptor found for `key`, together with the object that owns it.
    pub fn find_property(
        &self,
        start: HeapRef,
        key: &PropertyKey,
    ) -> Result<Option<(HeapRef, PropertyDescriptor)>, JsError> {
        let mut current = start;
        // A chain longer than the heap must contain a cycle
        for _ in 0..=self.slots.len() {
            let obj = self.object(current)?;
            if let Some(desc) = obj.own_descriptor(key) {
                return Ok(Some((current, desc)));
            }
            match obj.proto() {
                Value::Reference(next) => current = next,
                _ => return Ok(None),
            }
        }
        Err(JsError::type_error("cyclic __proto__ chain"))
    }

    /// Chain-walking read of a data property. Missing keys and accessor
    /// properties read as `undefined`; the interpreter runs accessors itself.
    pub fn get_property(&self, obj: HeapRef, key: &PropertyKey) -> Result<Value, JsError> {
        Ok(self
            .find_property(obj, key)?
            .and_then(|(_, desc)| desc.value)
            .unwrap_or(Value::Undefined))
    }

    /// Write an own data property
    pub fn set_property(
        &mut self,
        obj: HeapRef,
        key: PropertyKey,
        value: Value,
    ) -> Result<(), JsError> {
        self.object_mut(obj)?.set_own(key, value);
        Ok(())
    }

    pub fn define_property(
        &mut self,
        obj: HeapRef,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> Result<(), JsError> {
        self.object_mut(obj)?.define(key, desc);
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────────────
    // Collection
    // ────────────────────────────────────────────────────────────────────────

    /// Run one collection pass and return the number of reclaimed slots.
    ///
    /// Every reference reachable from `roots` survives and is rewritten to
    /// its new index, both inside the heap and inside `roots`.
    pub fn collect<R: Traceable + ?Sized>(&mut self, roots: &mut R) -> usize {
        let old_len = self.slots.len();
        let mut marker = Marker {
            forwarding: vec![None; old_len],
            order: Vec::new(),
            worklist: Vec::new(),
            dangling: 0,
        };

        roots.trace(&mut |r| marker.visit(r));
        while let Some(index) = marker.worklist.pop() {
            if let Some(slot) = self.slots.get(index) {
                slot.trace(&mut |r| marker.visit(r));
            }
        }

        if marker.dangling > 0 {
            log::warn!("gc: {} references point past the heap", marker.dangling);
        }

        let mut old: Vec<Option<HeapValue>> =
            std::mem::take(&mut self.slots).into_iter().map(Some).collect();
        self.slots = marker
            .order
            .iter()
            .filter_map(|&index| old.get_mut(index).and_then(Option::take))
            .collect();

        let forwarding = marker.forwarding;
        let map = |r: HeapRef| {
            forwarding
                .get(r.index())
                .copied()
                .flatten()
                .map(HeapRef)
                .unwrap_or(DANGLING)
        };
        for slot in &mut self.slots {
            slot.relocate(&map);
        }
        roots.relocate(&map);

        let reclaimed = old_len - self.slots.len();
        self.allocations_since_collect = 0;
        self.collections += 1;
        self.last_reclaimed = reclaimed;
        log::debug!(
            "gc: heap {} -> {} slots, reclaimed {}",
            old_len,
            self.slots.len(),
            reclaimed
        );
        reclaimed
    }
}

// ============================================================================
// Tests
// ============================================================================
