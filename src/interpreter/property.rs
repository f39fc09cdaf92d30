//! Property reads and writes with accessor dispatch
//!
//! Lookups walk the `__proto__` chain. When the resolved descriptor is an
//! accessor, its getter or setter runs with the original receiver as `this`.

use super::Vm;
use crate::error::JsError;
use crate::value::{PropertyKey, Value};

/// Outcome of resolving a key on a receiver
pub(crate) enum Lookup {
    Value(Value),
    /// Accessor found; the getter must run with the receiver as `this`
    Getter(Value),
}

impl Vm {
    pub(crate) fn lookup_property(
        &self,
        target: &Value,
        key: &PropertyKey,
    ) -> Result<Lookup, JsError> {
        let start = match target {
            Value::Reference(r) => *r,
            Value::String(s) => {
                if let PropertyKey::Index(i) = key {
                    let ch = s.char_at(*i as usize).map(Value::String);
                    return Ok(Lookup::Value(ch.unwrap_or_default()));
                }
                self.realm.string_prototype
            }
            Value::Number(_) | Value::Boolean(_) => self.realm.object_prototype,
            Value::Undefined | Value::Null => {
                return Err(JsError::type_error(format!(
                    "cannot read property '{}' of {}",
                    key,
                    target.kind_name()
                )));
            }
            Value::LValue(_) => return Err(JsError::invalid_cast("value", "lvalue")),
        };

        Ok(match self.heap.find_property(start, key)? {
            None => Lookup::Value(Value::Undefined),
            Some((_, desc)) => match (desc.getter, desc.value) {
                (Some(getter), _) => Lookup::Getter(getter),
                (None, Some(value)) => Lookup::Value(value),
                // setter-only accessor
                (None, None) => Lookup::Value(Value::Undefined),
            },
        })
    }

    /// `PropAccess`: push the value, or schedule the getter frame that will
    pub(crate) fn read_property(&mut self, target: Value, key: PropertyKey) -> Result<(), JsError> {
        match self.lookup_property(&target, &key)? {
            Lookup::Value(value) => {
                self.push(value);
                Ok(())
            }
            Lookup::Getter(getter) => self.call_value(getter, Vec::new(), target, false),
        }
    }

    /// Store through the chain: setters are scheduled with their result
    /// discarded, getter-only accessors ignore the write, anything else
    /// becomes an own data property of the receiver.
    pub(crate) fn write_property(
        &mut self,
        target: &Value,
        key: PropertyKey,
        value: Value,
    ) -> Result<(), JsError> {
        let obj = match target {
            Value::Reference(r) => *r,
            Value::Undefined | Value::Null => {
                return Err(JsError::type_error(format!(
                    "cannot set property '{}' of {}",
                    key,
                    target.kind_name()
                )));
            }
            // writes to primitives are dropped
            _ => return Ok(()),
        };

        match self.heap.find_property(obj, &key)? {
            Some((_, desc)) if desc.is_accessor() => match desc.setter {
                Some(setter) => self.call_value(setter, vec![value], target.clone(), true),
                None => Ok(()),
            },
            _ => self.heap.set_property(obj, key, value),
        }
    }

    /// Host-side write that runs a setter to completion
    pub fn set_property(&mut self, target: &Value, key: &str, value: Value) -> Result<(), JsError> {
        let key = PropertyKey::from(key);
        if let Value::Reference(obj) = target {
            if let Some((_, desc)) = self.heap.find_property(*obj, &key)? {
                if desc.is_accessor() {
                    if let Some(setter) = desc.setter {
                        self.invoke(setter, target.clone(), vec![value])?;
                    }
                    return Ok(());
                }
            }
        }
        self.write_property(target, key, value)
    }
}
