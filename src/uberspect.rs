//! Member resolution (C5). `spec.md`'s contract describes resolving a value
//! against a Java host object model (fields, JavaBean getters/setters,
//! reflection); that model is explicitly out of scope here ("the reflective
//! bean/property introspection of a specific host object model"). What
//! remains, and what this module implements, is the *interface* the
//! interpreter programs against plus a default implementation for this
//! crate's own collection/map/record shapes (design note §9: "A default
//! implementation can be provided for common collection/map/record
//! shapes"). A host with its own value universe implements `Uberspect`
//! itself and is free to ignore `DefaultUberspect` entirely.

use crate::error::{JexlError, JexlResult};
use crate::origin::Origin;
use crate::value::Value;
use std::collections::HashSet;

/// Ordered resolver strategy (§4.4): which tier wins when more than one
/// could resolve a name. With no host bean model, the only real choice left
/// is whether a map's own entries or a user-custom resolver (for `Foreign`
/// values) take priority; `MapStrategy` keeps the engine-level option from
/// the spec as a real, observable knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapStrategy {
    /// Maps win: `i.class` on a map returns `i.get("class")`.
    MapsFirst,
    /// Custom/bean-like resolution (via `CustomResolver`) wins over map
    /// entries of the same name.
    CustomFirst,
}

impl Default for MapStrategy {
    fn default() -> Self {
        MapStrategy::MapsFirst
    }
}

/// A permission filter consulted before any resolution returns a callable,
/// getter, or setter (§4.4). Deny by type name; `RESTRICTED` is the empty
/// allow-list (denies everything not explicitly allowed).
#[derive(Debug, Clone, Default)]
pub struct Permissions {
    denied_types: HashSet<String>,
    restricted: bool,
    allowed_types: HashSet<String>,
}

impl Permissions {
    pub fn allow_all() -> Self {
        Permissions::default()
    }

    pub fn deny_types(types: impl IntoIterator<Item = String>) -> Self {
        Permissions {
            denied_types: types.into_iter().collect(),
            restricted: false,
            allowed_types: HashSet::new(),
        }
    }

    /// `RESTRICTED`: nothing resolves unless its type name is in `allowed`.
    pub fn restricted(allowed: impl IntoIterator<Item = String>) -> Self {
        Permissions {
            denied_types: HashSet::new(),
            restricted: true,
            allowed_types: allowed.into_iter().collect(),
        }
    }

    pub fn is_denied(&self, type_name: &str) -> bool {
        if self.restricted {
            !self.allowed_types.contains(type_name)
        } else {
            self.denied_types.contains(type_name)
        }
    }
}

/// An iterator handle returned by `Uberspect::iterate`, abstracting over
/// whatever backs the iterable (this crate's own collections, or a host's).
/// `remove` backs the `remove` statement inside `for(var x : it)`; iterators
/// that don't support it return a `Method` error, per the open question in
/// `spec.md` §9.
pub trait JexlIterator {
    fn next_value(&mut self) -> Option<Value>;
    fn supports_remove(&self) -> bool {
        false
    }
    fn remove_current(&mut self) -> JexlResult<()> {
        Err(JexlError::method(
            Origin::unknown("<iterator>"),
            "remove",
            "this iterator does not support removal",
        ))
    }
}

/// A resolver for values this crate's `Value` enum has no native shape for
/// (`Value::Foreign`). Consulted by `DefaultUberspect` per `MapStrategy`.
pub trait CustomResolver {
    fn get_property(&self, target: &Value, name: &str) -> Option<Value>;
    fn set_property(&self, target: &Value, name: &str, value: Value) -> bool;
    fn invoke_method(&self, target: &Value, name: &str, args: &[Value]) -> Option<Value>;
    fn construct(&self, class_name: &str, args: &[Value]) -> Option<Value>;
}

pub trait Uberspect {
    fn get_property(&self, origin: &Origin, target: &Value, name: &str) -> JexlResult<Option<Value>>;
    fn set_property(&self, origin: &Origin, target: &Value, name: &str, value: Value) -> JexlResult<bool>;
    fn get_index(&self, origin: &Origin, target: &Value, index: &Value) -> JexlResult<Option<Value>>;
    fn set_index(&self, origin: &Origin, target: &Value, index: &Value, value: Value) -> JexlResult<bool>;
    fn invoke_method(
        &self,
        origin: &Origin,
        target: &Value,
        name: &str,
        args: &[Value],
    ) -> JexlResult<Option<Value>>;
    fn iterate(&self, origin: &Origin, target: &Value) -> JexlResult<Option<Box<dyn JexlIterator>>>;
    fn construct(&self, origin: &Origin, class_name: &str, args: &[Value]) -> JexlResult<Option<Value>>;
    fn permissions(&self) -> &Permissions;
}

/// The default resolver for this crate's own `Value` shapes: arrays/lists
/// indexed positionally, sets by membership, maps by key, plus a
/// user-custom tier for `Foreign` values.
pub struct DefaultUberspect {
    pub permissions: Permissions,
    pub map_strategy: MapStrategy,
    pub custom: Vec<Box<dyn CustomResolver>>,
}

impl Default for DefaultUberspect {
    fn default() -> Self {
        DefaultUberspect {
            permissions: Permissions::allow_all(),
            map_strategy: MapStrategy::default(),
            custom: Vec::new(),
        }
    }
}

struct VecIter {
    items: Vec<Value>,
    pos: usize,
    backing: Option<std::rc::Rc<std::cell::RefCell<Vec<Value>>>>,
    removed_at: Option<usize>,
}

impl JexlIterator for VecIter {
    fn next_value(&mut self) -> Option<Value> {
        if self.pos >= self.items.len() {
            return None;
        }
        let v = self.items[self.pos].clone();
        self.removed_at = Some(self.pos);
        self.pos += 1;
        Some(v)
    }

    fn supports_remove(&self) -> bool {
        self.backing.is_some()
    }

    fn remove_current(&mut self) -> JexlResult<()> {
        match (&self.backing, self.removed_at) {
            (Some(backing), Some(idx)) => {
                let mut b = backing.borrow_mut();
                if idx < b.len() {
                    b.remove(idx);
                    // subsequent indices shift down by one
                    self.pos -= 1;
                }
                Ok(())
            }
            _ => Err(JexlError::method(
                Origin::unknown("<iterator>"),
                "remove",
                "no current element to remove",
            )),
        }
    }
}

impl DefaultUberspect {
    fn check_permission(&self, origin: &Origin, target: &Value) -> JexlResult<()> {
        if self.permissions.is_denied(&target.type_name()) {
            return Err(JexlError::property(
                origin.clone(),
                target.type_name(),
                "access denied by permission filter",
            ));
        }
        Ok(())
    }
}

impl Uberspect for DefaultUberspect {
    fn get_property(&self, origin: &Origin, target: &Value, name: &str) -> JexlResult<Option<Value>> {
        self.check_permission(origin, target)?;
        let from_map = |entries: &std::rc::Rc<std::cell::RefCell<Vec<(Value, Value)>>>| {
            entries
                .borrow()
                .iter()
                .find(|(k, _)| matches!(k, Value::Str(s) if s.as_ref() == name))
                .map(|(_, v)| v.clone())
        };
        match target {
            Value::Map(entries) => match self.map_strategy {
                MapStrategy::MapsFirst => Ok(from_map(entries).or_else(|| self.custom_get(target, name))),
                MapStrategy::CustomFirst => Ok(self.custom_get(target, name).or_else(|| from_map(entries))),
            },
            Value::Array(items) | Value::List(items) if name == "length" || name == "size" => {
                Ok(Some(Value::Int(items.borrow().len() as i32)))
            }
            Value::Set(items) if name == "size" => Ok(Some(Value::Int(items.borrow().len() as i32))),
            Value::Str(s) if name == "length" => Ok(Some(Value::Int(s.chars().count() as i32))),
            Value::Foreign(_) => Ok(self.custom_get(target, name)),
            _ => Ok(None),
        }
    }

    fn set_property(&self, origin: &Origin, target: &Value, name: &str, value: Value) -> JexlResult<bool> {
        self.check_permission(origin, target)?;
        match target {
            Value::Map(entries) => {
                let mut entries = entries.borrow_mut();
                let key = Value::str(name);
                if let Some(slot) = entries
                    .iter_mut()
                    .find(|(k, _)| matches!(k, Value::Str(s) if s.as_ref() == name))
                {
                    slot.1 = value;
                } else {
                    entries.push((key, value));
                }
                Ok(true)
            }
            Value::Foreign(_) => Ok(self.custom.iter().any(|r| r.set_property(target, name, value.clone()))),
            _ => Ok(false),
        }
    }

    fn get_index(&self, origin: &Origin, target: &Value, index: &Value) -> JexlResult<Option<Value>> {
        self.check_permission(origin, target)?;
        match (target, index) {
            (Value::Array(items) | Value::List(items), Value::Int(i)) => {
                Ok(index_into(&items.borrow(), *i as i64))
            }
            (Value::Array(items) | Value::List(items), Value::Long(i)) => {
                Ok(index_into(&items.borrow(), *i))
            }
            (Value::Map(entries), key) => Ok(entries
                .borrow()
                .iter()
                .find(|(k, _)| values_shallow_eq(k, key))
                .map(|(_, v)| v.clone())),
            (Value::Set(items), key) => Ok(Some(Value::Bool(
                items.borrow().iter().any(|v| values_shallow_eq(v, key)),
            ))),
            _ => Ok(None),
        }
    }

    fn set_index(&self, origin: &Origin, target: &Value, index: &Value, value: Value) -> JexlResult<bool> {
        self.check_permission(origin, target)?;
        match (target, index) {
            (Value::Array(items) | Value::List(items), Value::Int(i)) => {
                set_index_into(&mut items.borrow_mut(), *i as i64, value)
            }
            (Value::Array(items) | Value::List(items), Value::Long(i)) => {
                set_index_into(&mut items.borrow_mut(), *i, value)
            }
            (Value::Map(entries), key) => {
                let mut entries = entries.borrow_mut();
                if let Some(slot) = entries.iter_mut().find(|(k, _)| values_shallow_eq(k, key)) {
                    slot.1 = value;
                } else {
                    entries.push((key.clone(), value));
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn invoke_method(
        &self,
        origin: &Origin,
        target: &Value,
        name: &str,
        args: &[Value],
    ) -> JexlResult<Option<Value>> {
        self.check_permission(origin, target)?;
        match target {
            Value::Array(items) | Value::List(items) => match (name, args) {
                ("size", []) => Ok(Some(Value::Int(items.borrow().len() as i32))),
                ("isEmpty", []) => Ok(Some(Value::Bool(items.borrow().is_empty()))),
                ("add", [v]) => {
                    items.borrow_mut().push(v.clone());
                    Ok(Some(Value::Bool(true)))
                }
                _ => Ok(None),
            },
            Value::Set(items) => match (name, args) {
                ("size", []) => Ok(Some(Value::Int(items.borrow().len() as i32))),
                ("contains", [v]) => Ok(Some(Value::Bool(
                    items.borrow().iter().any(|x| values_shallow_eq(x, v)),
                ))),
                _ => Ok(None),
            },
            Value::Map(entries) => match (name, args) {
                ("size", []) => Ok(Some(Value::Int(entries.borrow().len() as i32))),
                ("containsKey", [k]) => Ok(Some(Value::Bool(
                    entries.borrow().iter().any(|(ek, _)| values_shallow_eq(ek, k)),
                ))),
                _ => Ok(None),
            },
            Value::Str(s) => match (name, args) {
                ("length", []) => Ok(Some(Value::Int(s.chars().count() as i32))),
                ("toUpperCase", []) => Ok(Some(Value::str(s.to_uppercase()))),
                ("toLowerCase", []) => Ok(Some(Value::str(s.to_lowercase()))),
                _ => Ok(None),
            },
            Value::Foreign(_) => Ok(self.custom.iter().find_map(|r| r.invoke_method(target, name, args))),
            _ => Ok(None),
        }
    }

    fn iterate(&self, origin: &Origin, target: &Value) -> JexlResult<Option<Box<dyn JexlIterator>>> {
        self.check_permission(origin, target)?;
        match target {
            Value::Array(items) | Value::List(items) | Value::Set(items) => Ok(Some(Box::new(VecIter {
                items: items.borrow().clone(),
                pos: 0,
                backing: Some(std::rc::Rc::clone(items)),
                removed_at: None,
            }))),
            Value::Map(entries) => {
                let keys: Vec<Value> = entries.borrow().iter().map(|(k, _)| k.clone()).collect();
                Ok(Some(Box::new(VecIter {
                    items: keys,
                    pos: 0,
                    backing: None,
                    removed_at: None,
                })))
            }
            Value::Range(lo, hi) => {
                let items: Vec<Value> = (*lo..=*hi).map(Value::Long).collect();
                Ok(Some(Box::new(VecIter {
                    items,
                    pos: 0,
                    backing: None,
                    removed_at: None,
                })))
            }
            _ => Ok(None),
        }
    }

    fn construct(&self, _origin: &Origin, class_name: &str, args: &[Value]) -> JexlResult<Option<Value>> {
        Ok(self.custom.iter().find_map(|r| r.construct(class_name, args)))
    }

    fn permissions(&self) -> &Permissions {
        &self.permissions
    }
}

impl DefaultUberspect {
    fn custom_get(&self, target: &Value, name: &str) -> Option<Value> {
        self.custom.iter().find_map(|r| r.get_property(target, name))
    }
}

fn index_into(items: &[Value], i: i64) -> Option<Value> {
    let len = items.len() as i64;
    let idx = if i < 0 { len + i } else { i };
    if idx < 0 || idx >= len {
        None
    } else {
        Some(items[idx as usize].clone())
    }
}

fn set_index_into(items: &mut Vec<Value>, i: i64, value: Value) -> JexlResult<bool> {
    let len = items.len() as i64;
    let idx = if i < 0 { len + i } else { i };
    if idx < 0 {
        return Ok(false);
    }
    if idx >= len {
        while (items.len() as i64) < idx {
            items.push(Value::Null);
        }
        items.push(value);
    } else {
        items[idx as usize] = value;
    }
    Ok(true)
}

/// A conservative structural equality used only for container key/membership
/// lookups here; the `==` *operator* goes through `Arithmetic::compare`
/// instead, which is where numeric-tower coercion rules live.
pub fn values_shallow_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Long(x), Value::Long(y)) => x == y,
        (Value::Int(x), Value::Long(y)) | (Value::Long(y), Value::Int(x)) => *x as i64 == *y,
        (Value::F64(x), Value::F64(y)) => x == y,
        (Value::BigInt(x), Value::BigInt(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_length_property() {
        let u = DefaultUberspect::default();
        let origin = Origin::unknown("t");
        let arr = Value::array(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(
            u.get_property(&origin, &arr, "length").unwrap(),
            Some(Value::Int(2))
        );
    }

    #[test]
    fn map_get_and_set() {
        let u = DefaultUberspect::default();
        let origin = Origin::unknown("t");
        let map = Value::map(vec![(Value::str("a"), Value::Int(1))]);
        assert_eq!(u.get_property(&origin, &map, "a").unwrap(), Some(Value::Int(1)));
        u.set_property(&origin, &map, "b", Value::Int(2)).unwrap();
        assert_eq!(u.get_property(&origin, &map, "b").unwrap(), Some(Value::Int(2)));
    }

    #[test]
    fn negative_index_wraps_from_end() {
        let u = DefaultUberspect::default();
        let origin = Origin::unknown("t");
        let arr = Value::array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(
            u.get_index(&origin, &arr, &Value::Int(-1)).unwrap(),
            Some(Value::Int(3))
        );
    }

    #[test]
    fn permission_filter_denies() {
        let u = DefaultUberspect {
            permissions: Permissions::deny_types(["array".to_string()]),
            ..Default::default()
        };
        let origin = Origin::unknown("t");
        let arr = Value::array(vec![Value::Int(1)]);
        assert!(u.get_property(&origin, &arr, "length").is_err());
    }

    #[test]
    fn range_iterates_inclusive() {
        let u = DefaultUberspect::default();
        let origin = Origin::unknown("t");
        let mut it = u.iterate(&origin, &Value::Range(1, 3)).unwrap().unwrap();
        let mut out = vec![];
        while let Some(v) = it.next_value() {
            out.push(v);
        }
        assert_eq!(out.len(), 3);
    }
}
