//! Value rendering: `typeof`, string conversion and debug inspection

use super::Vm;
use crate::gc::HeapValue;
use crate::prelude::FxHashSet;
use crate::value::{
    FunctionKind, HeapRef, JsObject, JsString, ObjectKind, Value, number_to_string,
};

/// Nesting beyond this depth is abbreviated
const MAX_INSPECT_DEPTH: usize = 3;

impl Vm {
    /// Result of the `TypeOf` opcode
    pub fn type_of(&self, value: &Value) -> &'static str {
        match value {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Reference(_) => match self.heap.function_of(value) {
                Some(func) => func.type_of(),
                None => "object",
            },
            Value::LValue(_) => "object",
        }
    }

    /// String conversion used by `Add`, `join` and `String(x)`
    pub fn to_js_string(&self, value: &Value) -> JsString {
        let mut seen = FxHashSet::default();
        self.to_js_string_inner(value, &mut seen)
    }

    fn to_js_string_inner(&self, value: &Value, seen: &mut FxHashSet<HeapRef>) -> JsString {
        match value {
            Value::Undefined => JsString::from("undefined"),
            Value::Null => JsString::from("null"),
            Value::Boolean(b) => JsString::from(if *b { "true" } else { "false" }),
            Value::Number(n) => JsString::from(number_to_string(*n)),
            Value::String(s) => s.clone(),
            Value::LValue(_) => JsString::from("[lvalue]"),
            Value::Reference(r) => {
                let Ok(obj) = self.heap.object(*r) else {
                    return JsString::from("[object Object]");
                };
                match &obj.kind {
                    ObjectKind::Array(_) => {
                        // cyclic arrays render their back-edges as empty
                        if !seen.insert(*r) {
                            return JsString::from("");
                        }
                        let items = obj
                            .padded_elements()
                            .unwrap_or_else(|| obj.own_enumerable_values());
                        let parts: Vec<String> = items
                            .iter()
                            .map(|item| match item {
                                Value::Undefined | Value::Null => String::new(),
                                other => self.to_js_string_inner(other, seen).to_string(),
                            })
                            .collect();
                        seen.remove(r);
                        JsString::from(parts.join(","))
                    }
                    ObjectKind::Function(func) => func.source_text.clone(),
                    ObjectKind::Ordinary | ObjectKind::Generator(_) => {
                        JsString::from("[object Object]")
                    }
                }
            }
        }
    }

    /// Human-readable rendering; top-level strings are printed as-is
    pub fn display(&self, value: &Value) -> String {
        match value {
            Value::String(s) => s.to_string(),
            other => self.inspect(other),
        }
    }

    /// Debug rendering used by `print`, fault reports and the CLI
    pub fn inspect(&self, value: &Value) -> String {
        let mut seen = FxHashSet::default();
        let mut out = String::new();
        self.inspect_into(value, 0, &mut seen, &mut out);
        out
    }

    fn inspect_into(
        &self,
        value: &Value,
        depth: usize,
        seen: &mut FxHashSet<HeapRef>,
        out: &mut String,
    ) {
        match value {
            Value::String(s) => {
                out.push('"');
                for ch in s.as_str().chars() {
                    match ch {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        other => out.push(other),
                    }
                }
                out.push('"');
            }
            Value::Reference(r) => self.inspect_ref(*r, depth, seen, out),
            Value::LValue(_) => out.push_str("[lvalue]"),
            other => out.push_str(self.to_js_string(other).as_str()),
        }
    }

    fn inspect_ref(&self, r: HeapRef, depth: usize, seen: &mut FxHashSet<HeapRef>, out: &mut String) {
        let obj = match self.heap.get(r) {
            Ok(HeapValue::Object(obj)) => obj,
            Ok(HeapValue::Cell(_)) => return out.push_str("[cell]"),
            Ok(HeapValue::Iterator(_)) => return out.push_str("[iterator]"),
            Ok(HeapValue::Generator(_)) => return out.push_str("[generator context]"),
            Err(_) => {
                out.push_str(&format!("[dangling {}]", r));
                return;
            }
        };

        if let ObjectKind::Function(func) = &obj.kind {
            let label = match func.kind {
                FunctionKind::Generator => "GeneratorFunction",
                _ => "Function",
            };
            if func.name.is_empty() {
                out.push_str(&format!("[{} (anonymous)]", label));
            } else {
                out.push_str(&format!("[{}: {}]", label, func.name));
            }
            return;
        }
        if seen.contains(&r) {
            return out.push_str("[Circular]");
        }
        if depth >= MAX_INSPECT_DEPTH {
            let abbrev = match obj.kind {
                ObjectKind::Array(_) => "[Array]",
                _ => "[Object]",
            };
            return out.push_str(abbrev);
        }

        seen.insert(r);
        match &obj.kind {
            ObjectKind::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.inspect_into(item, depth + 1, seen, out);
                }
                let mut end = items.len() as u64;
                for (i, item) in obj.sparse_elements() {
                    if end > 0 {
                        out.push_str(", ");
                    }
                    let holes = u64::from(i) - end;
                    if holes > 0 {
                        let noun = if holes == 1 { "item" } else { "items" };
                        out.push_str(&format!("<{} empty {}>, ", holes, noun));
                    }
                    self.inspect_into(&item, depth + 1, seen, out);
                    end = u64::from(i) + 1;
                }
                out.push(']');
            }
            ObjectKind::Generator(_) => out.push_str("Object [Generator] {}"),
            _ => self.inspect_properties(obj, depth, seen, out),
        }
        seen.remove(&r);
    }

    fn inspect_properties(
        &self,
        obj: &JsObject,
        depth: usize,
        seen: &mut FxHashSet<HeapRef>,
        out: &mut String,
    ) {
        let entries: Vec<_> = obj
            .properties
            .iter()
            .filter(|(_, desc)| desc.enumerable)
            .collect();
        if entries.is_empty() {
            return out.push_str("{}");
        }
        out.push_str("{ ");
        for (i, (key, desc)) in entries.into_iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&format!("{}: ", key));
            match (&desc.value, desc.is_accessor()) {
                (_, true) => out.push_str("[Getter/Setter]"),
                (Some(value), false) => self.inspect_into(value, depth + 1, seen, out),
                (None, false) => out.push_str("undefined"),
            }
        }
        out.push_str(" }");
    }
}
