//! Mutable lists, dictionaries and the ordered `Treedata` tree.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::Value;

/// A mutable, ordered list.
///
/// Lists are clonable but never sharable: crossing a thread boundary always
/// deep-copies. Handles within one thread alias the same storage.
#[derive(Clone)]
pub struct List {
    items: Arc<Mutex<Vec<Value>>>,
}

impl List {
    pub fn new(items: Vec<Value>) -> Self {
        List {
            items: Arc::new(Mutex::new(items)),
        }
    }

    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.items) as *const () as usize
    }

    pub fn same(&self, other: &List) -> bool {
        Arc::ptr_eq(&self.items, &other.items)
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.lock().get(index).cloned()
    }

    /// Replace the element at `index`. Returns false when out of bounds.
    pub fn set(&self, index: usize, value: Value) -> bool {
        let mut items = self.items.lock();
        match items.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn push(&self, value: Value) {
        self.items.lock().push(value);
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Snapshot of the elements.
    pub fn snapshot(&self) -> Vec<Value> {
        self.items.lock().clone()
    }

    /// Replace the whole contents; aliases observe the change.
    pub fn replace_all(&self, items: Vec<Value>) {
        *self.items.lock() = items;
    }

    /// Sub-slice snapshot; bounds are clamped.
    pub fn slice(&self, start: usize, end: usize) -> Vec<Value> {
        let items = self.items.lock();
        let end = end.min(items.len());
        let start = start.min(end);
        items[start..end].to_vec()
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("List").field(&self.snapshot()).finish()
    }
}

/// A dictionary keyed by value representation.
///
/// Keys are any representable value; the internal map is keyed by the
/// key's canonical string representation so that structurally equal keys
/// collide.
#[derive(Clone)]
pub struct Dict {
    entries: Arc<Mutex<Vec<(Value, Value)>>>,
}

impl Dict {
    pub fn new(entries: Vec<(Value, Value)>) -> Self {
        let dict = Dict {
            entries: Arc::new(Mutex::new(Vec::new())),
        };
        for (k, v) in entries {
            dict.insert(k, v);
        }
        dict
    }

    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.entries) as *const () as usize
    }

    pub fn same(&self, other: &Dict) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        let entries = self.entries.lock();
        entries
            .iter()
            .find(|(k, _)| crate::equality::values_equal(k, key))
            .map(|(_, v)| v.clone())
    }

    /// Insert or replace the entry for `key`.
    pub fn insert(&self, key: Value, value: Value) {
        let mut entries = self.entries.lock();
        match entries
            .iter_mut()
            .find(|(k, _)| crate::equality::values_equal(k, &key))
        {
            Some(entry) => entry.1 = value,
            None => entries.push((key, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<(Value, Value)> {
        self.entries.lock().clone()
    }
}

impl fmt::Debug for Dict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.snapshot();
        let mut map = f.debug_map();
        for (k, v) in &entries {
            map.entry(k, v);
        }
        map.finish()
    }
}

/// An immutable ordered tree.
///
/// The `walk` statement traverses a `Treedata` depth-first; `prune` skips
/// the subtree rooted at the current node.
#[derive(Clone, Debug, PartialEq)]
pub struct Treedata {
    pub root: Value,
    pub children: Vec<TreedataNode>,
}

/// One node of a [`Treedata`] tree.
#[derive(Clone, Debug, PartialEq)]
pub struct TreedataNode {
    pub value: Value,
    pub children: Vec<TreedataNode>,
}

impl Treedata {
    pub fn leaf(root: Value) -> Self {
        Treedata {
            root,
            children: Vec::new(),
        }
    }
}
