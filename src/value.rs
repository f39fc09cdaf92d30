//! Value representation
//!
//! The tagged [`Value`] type, property keys and descriptors, and the object
//! and function records stored on the heap. Objects are only ever reached
//! through a [`HeapRef`]; a `Value::Reference` is the sole form of aliasing.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::JsError;
use crate::gc::Traceable;
use crate::prelude::{FxHashMap, IndexMap, index_map_new};

/// Trait for types that have cheap (O(1), reference-counted) clones.
///
/// This makes it explicit when a clone only bumps a reference count
/// rather than copying data.
pub trait CheapClone: Clone {
    /// Create a cheap (reference-counted) clone of this value.
    fn cheap_clone(&self) -> Self {
        self.clone()
    }
}

impl<T: ?Sized> CheapClone for Rc<T> {}

/// Name of the prototype slot every object carries
pub const PROTO_KEY: &str = "__proto__";

/// Largest run of holes an array index write may open in the element vector
pub const MAX_DENSE_GAP: usize = 1024;

/// Longest element list built from an array, holes included
pub const MAX_ELEMENT_LIST: u64 = 1 << 24;

// ═══════════════════════════════════════════════════════════════════════════════
// JsString
// ═══════════════════════════════════════════════════════════════════════════════

/// Reference-counted immutable string
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JsString(Rc<str>);

impl CheapClone for JsString {}

impl JsString {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of characters (not bytes)
    pub fn char_count(&self) -> usize {
        self.0.chars().count()
    }

    /// The character at `index` as a one-character string
    pub fn char_at(&self, index: usize) -> Option<JsString> {
        self.0.chars().nth(index).map(|c| JsString::from(c.to_string()))
    }
}

impl AsRef<str> for JsString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for JsString {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for JsString {
    fn eq(&self, other: &str) -> bool {
        self.0.as_ref() == other
    }
}

impl PartialEq<&str> for JsString {
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == *other
    }
}

impl From<&str> for JsString {
    fn from(s: &str) -> Self {
        JsString(s.into())
    }
}

impl From<String> for JsString {
    fn from(s: String) -> Self {
        JsString(s.into())
    }
}

impl fmt::Debug for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add<&str> for JsString {
    type Output = JsString;

    fn add(self, other: &str) -> JsString {
        let mut s = String::with_capacity(self.0.len() + other.len());
        s.push_str(&self.0);
        s.push_str(other);
        JsString::from(s)
    }
}

impl Serialize for JsString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for JsString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(JsString::from)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Heap references
// ═══════════════════════════════════════════════════════════════════════════════

/// Index of a heap slot. Collections relocate every live `HeapRef`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeapRef(pub usize);

impl HeapRef {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for HeapRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Index into the VM's native function table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NativeId(pub usize);

// ═══════════════════════════════════════════════════════════════════════════════
// Value
// ═══════════════════════════════════════════════════════════════════════════════

/// A VM value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Boolean(bool),
    Number(#[serde(with = "number_repr")] f64),
    String(JsString),
    /// Objects, arrays, functions, iterators and generator contexts
    Reference(HeapRef),
    /// Transient assignment target produced by `LoadLeftValue`
    LValue(Box<LValue>),
}

/// Assignment target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LValue {
    Name(JsString),
    Member { object: Value, key: PropertyKey },
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_reference(&self) -> Option<HeapRef> {
        match self {
            Value::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Short type name used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Reference(_) => "reference",
            Value::LValue(_) => "lvalue",
        }
    }

    /// Narrow to a number without coercion
    pub fn as_number(&self) -> Result<f64, JsError> {
        match self {
            Value::Number(n) => Ok(*n),
            other => Err(JsError::invalid_cast("number", other.kind_name())),
        }
    }

    /// Narrow to a non-negative integer (counts, labels, offsets)
    pub fn as_index(&self) -> Result<usize, JsError> {
        let n = self.as_number()?;
        if n.is_finite() && n >= 0.0 && n.fract() == 0.0 && n <= usize::MAX as f64 {
            Ok(n as usize)
        } else {
            Err(JsError::invalid_cast("index", number_to_string(n)))
        }
    }

    /// Boolean coercion: `0`, `NaN`, `""`, `null`, `undefined` and `false` are falsy
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Reference(_) | Value::LValue(_) => true,
        }
    }

    /// Lenient numeric coercion used by arithmetic
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Boolean(true) => 1.0,
            Value::Boolean(false) => 0.0,
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s.as_str()),
            Value::Reference(_) | Value::LValue(_) => f64::NAN,
        }
    }

    /// Strict equality (===). References compare by heap slot.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Reference(a), Value::Reference(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_equals(other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(JsString::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(JsString::from(s))
    }
}

impl From<JsString> for Value {
    fn from(s: JsString) -> Self {
        Value::String(s)
    }
}

impl From<HeapRef> for Value {
    fn from(r: HeapRef) -> Self {
        Value::Reference(r)
    }
}

impl Traceable for Value {
    fn trace<F: FnMut(HeapRef)>(&self, visitor: &mut F) {
        match self {
            Value::Reference(r) => visitor(*r),
            Value::LValue(lvalue) => {
                if let LValue::Member { object, .. } = lvalue.as_ref() {
                    object.trace(visitor);
                }
            }
            _ => {}
        }
    }

    fn relocate<F: Fn(HeapRef) -> HeapRef>(&mut self, map: &F) {
        match self {
            Value::Reference(r) => *r = map(*r),
            Value::LValue(lvalue) => {
                if let LValue::Member { object, .. } = lvalue.as_mut() {
                    object.relocate(map);
                }
            }
            _ => {}
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Numeric conversions
// ═══════════════════════════════════════════════════════════════════════════════

/// Format a number the way JavaScript's ToString does for the common cases
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if (1e-7..1e21).contains(&abs) {
        return format!("{}", n);
    }
    // Exponent form: Rust prints "1e21", JavaScript "1e+21"
    let text = format!("{:e}", n);
    match text.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
        _ => text,
    }
}

/// ToNumber for strings: surrounding whitespace is ignored, empty is 0
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    // Rust also accepts "inf" and "nan" spellings that JavaScript rejects
    if trimmed
        .bytes()
        .any(|b| b.is_ascii_alphabetic() && b != b'e' && b != b'E')
    {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// ToInt32
pub fn to_int32(n: f64) -> i32 {
    to_uint32(n) as i32
}

/// ToUint32
pub fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(4_294_967_296.0) as u32
}

/// Serde representation of `f64` that survives JSON: non-finite values are
/// written as the strings `"NaN"`, `"Infinity"` and `"-Infinity"`.
pub(crate) mod number_repr {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(n: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if n.is_nan() {
            serializer.serialize_str("NaN")
        } else if n.is_infinite() {
            serializer.serialize_str(if *n > 0.0 { "Infinity" } else { "-Infinity" })
        } else {
            serializer.serialize_f64(*n)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Text(text) => match text.as_str() {
                "NaN" => Ok(f64::NAN),
                "Infinity" => Ok(f64::INFINITY),
                "-Infinity" => Ok(f64::NEG_INFINITY),
                other => Err(D::Error::custom(format!("invalid number '{}'", other))),
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Property keys
// ═══════════════════════════════════════════════════════════════════════════════

/// Property key (string or array index)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    String(JsString),
    Index(u32),
}

impl PropertyKey {
    /// Convert an operand-stack value into a key
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Number(n) => {
                let idx = *n as u32;
                if idx as f64 == *n && *n >= 0.0 {
                    PropertyKey::Index(idx)
                } else {
                    PropertyKey::String(JsString::from(number_to_string(*n)))
                }
            }
            Value::String(s) => PropertyKey::from(s.cheap_clone()),
            Value::Undefined => PropertyKey::from("undefined"),
            Value::Null => PropertyKey::from("null"),
            Value::Boolean(b) => PropertyKey::from(if *b { "true" } else { "false" }),
            Value::Reference(_) | Value::LValue(_) => PropertyKey::from("[object Object]"),
        }
    }

    pub fn to_js_string(&self) -> JsString {
        match self {
            PropertyKey::String(s) => s.cheap_clone(),
            PropertyKey::Index(i) => JsString::from(i.to_string()),
        }
    }
}

fn canonical_index(s: &str) -> Option<u32> {
    let first = s.bytes().next()?;
    if !first.is_ascii_digit() {
        return None;
    }
    let idx = s.parse::<u32>().ok()?;
    // Reject non-canonical spellings such as "01"
    (idx.to_string() == s).then_some(idx)
}

impl From<&str> for PropertyKey {
    #[inline]
    fn from(s: &str) -> Self {
        match canonical_index(s) {
            Some(idx) => PropertyKey::Index(idx),
            None => PropertyKey::String(JsString::from(s)),
        }
    }
}

impl From<JsString> for PropertyKey {
    #[inline]
    fn from(s: JsString) -> Self {
        match canonical_index(s.as_str()) {
            Some(idx) => PropertyKey::Index(idx),
            None => PropertyKey::String(s),
        }
    }
}

impl From<u32> for PropertyKey {
    fn from(idx: u32) -> Self {
        PropertyKey::Index(idx)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::String(s) => write!(f, "{}", s),
            PropertyKey::Index(i) => write!(f, "{}", i),
        }
    }
}

// Keys serialize as plain strings so property tables stay JSON objects
impl Serialize for PropertyKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PropertyKey::String(s) => serializer.serialize_str(s.as_str()),
            PropertyKey::Index(i) => serializer.collect_str(i),
        }
    }
}

impl<'de> Deserialize<'de> for PropertyKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        JsString::deserialize(deserializer).map(PropertyKey::from)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Property descriptors
// ═══════════════════════════════════════════════════════════════════════════════

/// Object property descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub value: Option<Value>,
    pub enumerable: bool,
    pub writable: bool,
    /// Getter function (for accessor properties)
    pub getter: Option<Value>,
    /// Setter function (for accessor properties)
    pub setter: Option<Value>,
}

impl PropertyDescriptor {
    /// Enumerable, writable data property
    pub fn data(value: Value) -> Self {
        Self {
            value: Some(value),
            enumerable: true,
            writable: true,
            getter: None,
            setter: None,
        }
    }

    /// Writable data property hidden from enumeration
    pub fn hidden(value: Value) -> Self {
        Self {
            enumerable: false,
            ..Self::data(value)
        }
    }

    /// Accessor property with only a getter
    pub fn getter(getter: Value, enumerable: bool) -> Self {
        Self {
            value: None,
            enumerable,
            writable: true,
            getter: Some(getter),
            setter: None,
        }
    }

    pub fn is_accessor(&self) -> bool {
        self.getter.is_some() || self.setter.is_some()
    }
}

impl Traceable for PropertyDescriptor {
    fn trace<F: FnMut(HeapRef)>(&self, visitor: &mut F) {
        for slot in [&self.value, &self.getter, &self.setter].into_iter().flatten() {
            slot.trace(visitor);
        }
    }

    fn relocate<F: Fn(HeapRef) -> HeapRef>(&mut self, map: &F) {
        for slot in [&mut self.value, &mut self.getter, &mut self.setter]
            .into_iter()
            .flatten()
        {
            slot.relocate(map);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Objects
// ═══════════════════════════════════════════════════════════════════════════════

/// A heap object: an ordered property table plus a specialization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsObject {
    pub properties: IndexMap<PropertyKey, PropertyDescriptor>,
    pub kind: ObjectKind,
}

/// Object specializations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ObjectKind {
    Ordinary,
    /// Elements 0..n, exposed as index properties
    Array(Vec<Value>),
    Function(Box<JsFunction>),
    /// Iterator object returned by a generator call, bound to its context
    Generator(HeapRef),
}

impl JsObject {
    /// Create an object whose `__proto__` is `proto` (an object reference or null)
    pub fn new(proto: Value, kind: ObjectKind) -> Self {
        let mut properties = index_map_new();
        properties.insert(
            PropertyKey::from(PROTO_KEY),
            PropertyDescriptor::hidden(proto),
        );
        Self { properties, kind }
    }

    pub fn proto(&self) -> Value {
        self.properties
            .get(&PropertyKey::from(PROTO_KEY))
            .and_then(|d| d.value.clone())
            .unwrap_or(Value::Null)
    }

    pub fn as_function(&self) -> Option<&JsFunction> {
        match &self.kind {
            ObjectKind::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn array_items(&self) -> Option<&Vec<Value>> {
        match &self.kind {
            ObjectKind::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Array length: one past the highest dense or sparse element
    pub fn array_length(&self) -> Option<u64> {
        let ObjectKind::Array(items) = &self.kind else {
            return None;
        };
        let sparse_end = self
            .properties
            .keys()
            .filter_map(|key| match key {
                PropertyKey::Index(i) => Some(u64::from(*i) + 1),
                PropertyKey::String(_) => None,
            })
            .max()
            .unwrap_or(0);
        Some(sparse_end.max(items.len() as u64))
    }

    /// Array elements stored past the dense part, in index order
    pub fn sparse_elements(&self) -> Vec<(u32, Value)> {
        let mut elements: Vec<(u32, Value)> = self
            .properties
            .iter()
            .filter_map(|(key, desc)| match key {
                PropertyKey::Index(i) => Some((*i, desc.value.clone().unwrap_or_default())),
                PropertyKey::String(_) => None,
            })
            .collect();
        elements.sort_unstable_by_key(|(i, _)| *i);
        elements
    }

    /// Every element below the array length, holes as `undefined`.
    /// `None` for non-arrays and for arrays longer than `MAX_ELEMENT_LIST`.
    pub fn padded_elements(&self) -> Option<Vec<Value>> {
        let ObjectKind::Array(items) = &self.kind else {
            return None;
        };
        if self.array_length()? > MAX_ELEMENT_LIST {
            return None;
        }
        let mut values = items.clone();
        for (i, value) in self.sparse_elements() {
            values.resize(i as usize, Value::Undefined);
            values.push(value);
        }
        Some(values)
    }

    /// Own descriptor lookup; array elements appear as data properties
    pub fn own_descriptor(&self, key: &PropertyKey) -> Option<PropertyDescriptor> {
        if let (ObjectKind::Array(items), PropertyKey::Index(i)) = (&self.kind, key) {
            if let Some(value) = items.get(*i as usize) {
                return Some(PropertyDescriptor::data(value.clone()));
            }
        }
        self.properties.get(key).cloned()
    }

    /// Write an own data property. Existing writable data descriptors keep
    /// their flags; absent keys become enumerable and writable.
    ///
    /// Array index writes within `MAX_DENSE_GAP` of the end grow the element
    /// vector; writes further out are kept in the property table.
    pub fn set_own(&mut self, key: PropertyKey, value: Value) {
        if let PropertyKey::Index(i) = key {
            if let ObjectKind::Array(items) = &mut self.kind {
                let i = i as usize;
                if let Some(slot) = items.get_mut(i) {
                    *slot = value;
                    return;
                }
                if i - items.len() <= MAX_DENSE_GAP {
                    items.resize(i, Value::Undefined);
                    items.push(value);
                    self.absorb_sparse();
                    return;
                }
            }
        }
        match self.properties.get_mut(&key) {
            Some(desc) if desc.is_accessor() || !desc.writable => {}
            Some(desc) => desc.value = Some(value),
            None => {
                self.properties.insert(key, PropertyDescriptor::data(value));
            }
        }
    }

    /// Move sparse elements the dense part has grown over into it
    fn absorb_sparse(&mut self) {
        let ObjectKind::Array(items) = &mut self.kind else {
            return;
        };
        let len = items.len();
        self.properties.retain(|key, desc| match key {
            PropertyKey::Index(i) if (*i as usize) < len => {
                if let Some(slot) = items.get_mut(*i as usize) {
                    *slot = desc.value.take().unwrap_or_default();
                }
                false
            }
            _ => true,
        });
    }

    /// Install a descriptor, replacing any existing one
    pub fn define(&mut self, key: PropertyKey, desc: PropertyDescriptor) {
        if let (ObjectKind::Array(_), PropertyKey::Index(_)) = (&self.kind, &key) {
            if let Some(value) = desc.value {
                self.set_own(key, value);
            }
            return;
        }
        self.properties.insert(key, desc);
    }

    /// Own keys in order: array indices first, then the property table
    pub fn own_keys(&self, enumerable_only: bool) -> Vec<PropertyKey> {
        let mut keys = Vec::new();
        let is_array = matches!(self.kind, ObjectKind::Array(_));
        if let ObjectKind::Array(items) = &self.kind {
            keys.extend((0..items.len() as u32).map(PropertyKey::Index));
            keys.extend(
                self.sparse_elements()
                    .into_iter()
                    .map(|(i, _)| PropertyKey::Index(i)),
            );
        }
        keys.extend(
            self.properties
                .iter()
                .filter(|(k, _)| !is_array || matches!(k, PropertyKey::String(_)))
                .filter(|(_, d)| d.enumerable || !enumerable_only)
                .map(|(k, _)| k.clone()),
        );
        keys
    }

    /// Values of own enumerable data properties, in key order. Holes of a
    /// sparse array are skipped.
    pub fn own_enumerable_values(&self) -> Vec<Value> {
        if let ObjectKind::Array(items) = &self.kind {
            let mut values = items.clone();
            values.extend(self.sparse_elements().into_iter().map(|(_, v)| v));
            return values;
        }
        self.properties
            .values()
            .filter(|d| d.enumerable)
            .filter_map(|d| d.value.clone())
            .collect()
    }
}

impl Traceable for JsObject {
    fn trace<F: FnMut(HeapRef)>(&self, visitor: &mut F) {
        for desc in self.properties.values() {
            desc.trace(visitor);
        }
        match &self.kind {
            ObjectKind::Ordinary => {}
            ObjectKind::Array(items) => items.iter().for_each(|v| v.trace(visitor)),
            ObjectKind::Function(func) => func.trace(visitor),
            ObjectKind::Generator(ctx) => visitor(*ctx),
        }
    }

    fn relocate<F: Fn(HeapRef) -> HeapRef>(&mut self, map: &F) {
        for desc in self.properties.values_mut() {
            desc.relocate(map);
        }
        match &mut self.kind {
            ObjectKind::Ordinary => {}
            ObjectKind::Array(items) => items.iter_mut().for_each(|v| v.relocate(map)),
            ObjectKind::Function(func) => func.relocate(map),
            ObjectKind::Generator(ctx) => *ctx = map(*ctx),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Functions
// ═══════════════════════════════════════════════════════════════════════════════

/// Function record stored inside a function object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsFunction {
    pub name: JsString,
    pub param_count: usize,
    /// Instruction offset of the body; `None` for host functions
    pub entry: Option<usize>,
    /// Captured bindings: name to the heap cell shared with the defining scope
    pub upvalues: FxHashMap<JsString, HeapRef>,
    /// Source text returned by `toString`
    pub source_text: JsString,
    pub kind: FunctionKind,
}

/// Function variants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FunctionKind {
    Bytecode,
    /// Arrow function: `this` is fixed at creation
    Lambda { this: Value },
    Generator,
    /// Host function whose return value is pushed by the call site
    Native { id: NativeId, captures: Vec<Value> },
    /// Host function that pushes (or schedules) its own result
    Bridge { id: NativeId, captures: Vec<Value> },
}

impl JsFunction {
    /// `typeof` result for this function
    pub fn type_of(&self) -> &'static str {
        match self.kind {
            FunctionKind::Native { .. } => "[native]",
            FunctionKind::Bridge { .. } => "[bridge]",
            _ => "function",
        }
    }
}

impl Traceable for JsFunction {
    fn trace<F: FnMut(HeapRef)>(&self, visitor: &mut F) {
        for cell in self.upvalues.values() {
            visitor(*cell);
        }
        match &self.kind {
            FunctionKind::Lambda { this } => this.trace(visitor),
            FunctionKind::Native { captures, .. } | FunctionKind::Bridge { captures, .. } => {
                captures.iter().for_each(|v| v.trace(visitor))
            }
            FunctionKind::Bytecode | FunctionKind::Generator => {}
        }
    }

    fn relocate<F: Fn(HeapRef) -> HeapRef>(&mut self, map: &F) {
        for cell in self.upvalues.values_mut() {
            *cell = map(*cell);
        }
        match &mut self.kind {
            FunctionKind::Lambda { this } => this.relocate(map),
            FunctionKind::Native { captures, .. } | FunctionKind::Bridge { captures, .. } => {
                captures.iter_mut().for_each(|v| v.relocate(map))
            }
            FunctionKind::Bytecode | FunctionKind::Generator => {}
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Iteration cursors
// ═══════════════════════════════════════════════════════════════════════════════

/// Loop state behind `for...in` / `for...of`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IterationCursor {
    /// Keys or values taken when the loop started
    Snapshot { items: Vec<Value>, cursor: usize },
    /// An iterator object whose `next` is called once per loop step
    Protocol { iterator: Value, done: bool },
}

impl IterationCursor {
    pub fn snapshot(items: Vec<Value>) -> Self {
        IterationCursor::Snapshot { items, cursor: 0 }
    }

    pub fn protocol(iterator: Value) -> Self {
        IterationCursor::Protocol {
            iterator,
            done: false,
        }
    }
}

impl Traceable for IterationCursor {
    fn trace<F: FnMut(HeapRef)>(&self, visitor: &mut F) {
        match self {
            IterationCursor::Snapshot { items, .. } => items.iter().for_each(|v| v.trace(visitor)),
            IterationCursor::Protocol { iterator, .. } => iterator.trace(visitor),
        }
    }

    fn relocate<F: Fn(HeapRef) -> HeapRef>(&mut self, map: &F) {
        match self {
            IterationCursor::Snapshot { items, .. } => {
                items.iter_mut().for_each(|v| v.relocate(map))
            }
            IterationCursor::Protocol { iterator, .. } => iterator.relocate(map),
        }
    }
}
