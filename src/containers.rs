//! Shared container values and the scope chain.
//!
//! [`List`] and [`Map`] are reference-counted, interiorly mutable
//! containers: cloning a handle shares the underlying storage, so
//! mutations made through any handle (or through assignment operators in
//! evaluated expressions) are visible everywhere. A map optionally links to
//! a parent map; lookups walk the chain, which doubles as both prototype
//! inheritance for data maps and lexical scoping for variable environments.
//!
//! A distinguished *default global* map sits at the root of every chain.
//! Host-registered functions live there; descendant scopes may shadow its
//! entries but bare-name assignment never writes into it.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::Error;
use crate::value::Value;

/// Wrap a possibly-negative index into `[0, len)`; `-1` addresses the last
/// element. Out-of-range indices fail.
pub(crate) fn wrap_index(index: i64, len: usize) -> Result<usize, Error> {
    let wrapped = if index < 0 { index + len as i64 } else { index };
    if wrapped >= 0 && (wrapped as usize) < len {
        Ok(wrapped as usize)
    } else {
        Err(Error::IndexOutOfRange { index, len })
    }
}

/// Ordered, mutable sequence shared by reference.
#[derive(Clone, Default)]
pub struct List {
    items: Rc<RefCell<Vec<Value>>>,
}

impl List {
    pub fn new() -> List {
        List::default()
    }

    pub fn from_vec(items: Vec<Value>) -> List {
        List {
            items: Rc::new(RefCell::new(items)),
        }
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.items.borrow_mut().push(value.into());
    }

    pub fn pop(&self) -> Option<Value> {
        self.items.borrow_mut().pop()
    }

    /// Remove and return the element at `index` (negative wrap applies).
    pub fn pop_at(&self, index: i64) -> Result<Value, Error> {
        let mut items = self.items.borrow_mut();
        let i = wrap_index(index, items.len())?;
        Ok(items.remove(i))
    }

    /// The element at `index`, with negative wrap.
    pub fn at(&self, index: i64) -> Result<Value, Error> {
        let items = self.items.borrow();
        let i = wrap_index(index, items.len())?;
        Ok(items[i].clone())
    }

    /// Replace the element at `index`, with negative wrap.
    pub fn set(&self, index: i64, value: Value) -> Result<(), Error> {
        let mut items = self.items.borrow_mut();
        let i = wrap_index(index, items.len())?;
        items[i] = value;
        Ok(())
    }

    /// Snapshot of the current elements.
    pub fn values(&self) -> Vec<Value> {
        self.items.borrow().clone()
    }

    /// A forward-only cursor over the current elements.
    pub fn value_iterator(&self) -> ValueIterator {
        ValueIterator::from_values(self.values())
    }

    pub fn ptr_eq(&self, other: &List) -> bool {
        Rc::ptr_eq(&self.items, &other.items)
    }
}

impl PartialEq for List {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.items.borrow() == *other.items.borrow()
    }
}

impl fmt::Display for List {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let items = self.items.borrow();
        if items.is_empty() {
            return write!(f, "[]");
        }
        write!(f, "[ ")?;
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{item}")?;
        }
        write!(f, " ]")
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "List({self})")
    }
}

struct MapData {
    entries: Vec<(String, Value)>,
    parent: Option<Map>,
}

/// Insertion-ordered string-keyed mapping with an optional parent link,
/// shared by reference.
///
/// Maps are also the variable environment: evaluation scopes are maps
/// whose chains end at the default global.
#[derive(Clone)]
pub struct Map {
    data: Rc<RefCell<MapData>>,
}

impl Map {
    /// A fresh map whose parent is the default global, so that registered
    /// functions resolve through it.
    pub fn new() -> Map {
        Map::with_parent(Some(crate::builtinops::default_global()))
    }

    /// A fresh map with no parent at all. The default global itself is
    /// built this way; data maps that should not see the global can use it
    /// too.
    pub fn orphan() -> Map {
        Map::with_parent(None)
    }

    fn with_parent(parent: Option<Map>) -> Map {
        Map {
            data: Rc::new(RefCell::new(MapData {
                entries: Vec::new(),
                parent,
            })),
        }
    }

    /// A new empty map with `self` as parent.
    pub fn child(&self) -> Map {
        Map::with_parent(Some(self.clone()))
    }

    pub fn parent(&self) -> Option<Map> {
        self.data.borrow().parent.clone()
    }

    /// Number of entries in this map itself (parents excluded).
    pub fn len(&self) -> usize {
        self.data.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.borrow().entries.is_empty()
    }

    /// Look up `key` in this map only.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data
            .borrow()
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Look up `key` through the parent chain.
    pub fn find(&self, key: &str) -> Option<Value> {
        self.find_entry(key).map(|(_, v)| v)
    }

    /// Look up `key` through the parent chain, returning the containing
    /// map together with the value.
    pub fn find_entry(&self, key: &str) -> Option<(Map, Value)> {
        if let Some(value) = self.get(key) {
            return Some((self.clone(), value));
        }
        self.parent().and_then(|p| p.find_entry(key))
    }

    pub fn has(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    /// Write `key` into this map itself, preserving insertion order when
    /// the key already exists.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        let mut data = self.data.borrow_mut();
        if let Some(entry) = data.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            data.entries.push((key, value));
        }
    }

    /// Assign `key` the way bare-name assignment does: write into the
    /// nearest ancestor that already defines it, skipping the default
    /// global, or into this map when no ancestor does.
    pub fn set(&self, key: &str, value: Value) {
        match self.find_defining(key) {
            Some(owner) => owner.insert(key, value),
            None => self.insert(key, value),
        }
    }

    fn find_defining(&self, key: &str) -> Option<Map> {
        if self.is_default_global() {
            return None;
        }
        if self.get(key).is_some() {
            return Some(self.clone());
        }
        self.parent().and_then(|p| p.find_defining(key))
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut data = self.data.borrow_mut();
        let index = data.entries.iter().position(|(k, _)| k == key)?;
        Some(data.entries.remove(index).1)
    }

    /// Keys of this map itself, in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.data
            .borrow()
            .entries
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// A forward-only cursor over this map's own keys.
    pub fn key_iterator(&self) -> ValueIterator {
        ValueIterator::from_values(self.keys().into_iter().map(Value::Str).collect())
    }

    /// True when `ancestor` appears in this map's parent chain.
    pub fn instanceof(&self, ancestor: &Map) -> bool {
        let mut current = self.parent();
        while let Some(map) = current {
            if map.ptr_eq(ancestor) {
                return true;
            }
            current = map.parent();
        }
        false
    }

    pub fn ptr_eq(&self, other: &Map) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }

    fn is_default_global(&self) -> bool {
        self.ptr_eq(&crate::builtinops::default_global())
    }
}

impl Default for Map {
    fn default() -> Self {
        Map::new()
    }
}

impl PartialEq for Map {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        if self.len() != other.len() {
            return false;
        }
        self.data
            .borrow()
            .entries
            .iter()
            .all(|(k, v)| other.get(k).is_some_and(|ov| ov == *v))
    }
}

impl fmt::Display for Map {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let data = self.data.borrow();
        if data.entries.is_empty() {
            return write!(f, "{{}}");
        }
        write!(f, "{{ ")?;
        for (i, (key, value)) in data.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "\"{key}\": {value}")?;
        }
        write!(f, " }}")
    }
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Map({self})")
    }
}

struct IterState {
    items: Vec<Value>,
    pos: usize,
}

/// Stateful forward-only cursor over a snapshot of container contents.
/// Terminal state is reported as `None`.
#[derive(Clone)]
pub struct ValueIterator {
    state: Rc<RefCell<IterState>>,
}

impl ValueIterator {
    pub fn from_values(items: Vec<Value>) -> ValueIterator {
        ValueIterator {
            state: Rc::new(RefCell::new(IterState { items, pos: 0 })),
        }
    }

    /// Advance and yield the next value, or `None` once exhausted.
    pub fn advance(&self) -> Option<Value> {
        let mut state = self.state.borrow_mut();
        let value = state.items.get(state.pos).cloned()?;
        state.pos += 1;
        Some(value)
    }

    pub fn ptr_eq(&self, other: &ValueIterator) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl Iterator for ValueIterator {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        self.advance()
    }
}

impl fmt::Debug for ValueIterator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[Iterator]")
    }
}
