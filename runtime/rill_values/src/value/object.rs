//! Mutable objects and immutable records.
//!
//! An `Object` is the only mutable value that can cross a thread boundary:
//! `share()` sets its shared bit (which never clears) and every mutating
//! operation runs under the object's reentrant lock. `synchronized(obj)`
//! blocks hold the same lock across several operations.

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use crate::pattern::Pattern;
use crate::Value;

/// Maximum length of an element key, in characters.
pub const MAX_ELEMENT_KEY_LEN: usize = 100;

/// Errors raised by object and record operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ObjectError {
    #[error("invalid element key `{0}`")]
    InvalidElementKey(String),
    #[error("cannot add a non-sharable value to a shared container")]
    CannotAddNonSharableToSharedContainer,
    #[error("object no longer matches its constraint after mutation of `{key}`")]
    ConstraintViolated { key: String },
}

impl ObjectError {
    /// Stable identifier surfaced to user code.
    pub const fn id(&self) -> &'static str {
        match self {
            ObjectError::InvalidElementKey(_) => "InvalidElementKey",
            ObjectError::CannotAddNonSharableToSharedContainer => {
                "CannotAddNonSharableToSharedContainer"
            }
            ObjectError::ConstraintViolated { .. } => "ConstraintViolated",
        }
    }
}

/// Validate an element key: 1–100 characters of the identifier class.
pub fn validate_element_key(key: &str) -> Result<(), ObjectError> {
    let mut chars = key.chars();
    let Some(first) = chars.next() else {
        return Err(ObjectError::InvalidElementKey(key.to_owned()));
    };
    if key.chars().count() > MAX_ELEMENT_KEY_LEN {
        return Err(ObjectError::InvalidElementKey(key.to_owned()));
    }
    let first_ok = first.is_ascii_alphabetic() || first == '_';
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if first_ok && rest_ok {
        Ok(())
    } else {
        Err(ObjectError::InvalidElementKey(key.to_owned()))
    }
}

struct ObjectData {
    entries: Vec<(String, Value)>,
    /// URL identity, when the object was loaded from / bound to a resource.
    url: Option<String>,
    /// Pattern re-validated after every property-path mutation.
    constraint: Option<Pattern>,
}

struct ObjectInner {
    shared: AtomicBool,
    data: ReentrantMutex<RefCell<ObjectData>>,
}

/// A mutable, string-keyed object.
///
/// Cloning an `Object` clones the handle, not the entries: both handles
/// observe the same mutations. Use [`Object::deep_clone`] for a detached
/// copy.
#[derive(Clone)]
pub struct Object {
    inner: Arc<ObjectInner>,
}

/// Guard holding an object's lock for a `synchronized` block.
pub struct ObjectGuard<'a> {
    _guard: ReentrantMutexGuard<'a, RefCell<ObjectData>>,
}

impl Object {
    /// Create an object from entries. Keys are validated.
    pub fn new(entries: Vec<(String, Value)>) -> Result<Self, ObjectError> {
        for (key, _) in &entries {
            validate_element_key(key)?;
        }
        Ok(Object {
            inner: Arc::new(ObjectInner {
                shared: AtomicBool::new(false),
                data: ReentrantMutex::new(RefCell::new(ObjectData {
                    entries,
                    url: None,
                    constraint: None,
                })),
            }),
        })
    }

    /// Empty object.
    pub fn empty() -> Self {
        // An empty entry list cannot fail key validation.
        Object {
            inner: Arc::new(ObjectInner {
                shared: AtomicBool::new(false),
                data: ReentrantMutex::new(RefCell::new(ObjectData {
                    entries: Vec::new(),
                    url: None,
                    constraint: None,
                })),
            }),
        }
    }

    /// Address-based identity.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    pub fn same(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether the shared bit is set.
    pub fn is_shared(&self) -> bool {
        self.inner.shared.load(Ordering::Acquire)
    }

    /// Set the shared bit. The bit never clears.
    pub fn share(&self) {
        self.inner.shared.store(true, Ordering::Release);
    }

    /// Hold the object's lock for the duration of the guard.
    pub fn lock(&self) -> ObjectGuard<'_> {
        ObjectGuard {
            _guard: self.inner.data.lock(),
        }
    }

    /// Get a property value.
    pub fn get(&self, key: &str) -> Option<Value> {
        let guard = self.inner.data.lock();
        let data = guard.borrow();
        data.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Set a property value.
    ///
    /// Under the object's lock. On a shared object the value must itself be
    /// sharable or clonable; clonable values are deep-copied in. When a
    /// constraint is installed, the mutation is rolled back if the object no
    /// longer matches.
    pub fn set(&self, key: &str, value: Value) -> Result<(), ObjectError> {
        validate_element_key(key)?;
        let stored = if self.is_shared() {
            crate::sharing::share_or_clone(&value)
                .map_err(|_| ObjectError::CannotAddNonSharableToSharedContainer)?
        } else {
            value
        };
        let guard = self.inner.data.lock();
        let constraint = guard.borrow().constraint.clone();
        let previous = {
            let mut data = guard.borrow_mut();
            match data.entries.iter_mut().find(|(k, _)| k == key) {
                Some(entry) => Some(std::mem::replace(&mut entry.1, stored)),
                None => {
                    data.entries.push((key.to_owned(), stored));
                    None
                }
            }
        };
        if let Some(pattern) = constraint {
            let this = Value::Object(self.clone());
            if !pattern.matches(&this) {
                // Roll the mutation back before reporting.
                let mut data = guard.borrow_mut();
                match previous {
                    Some(old) => {
                        if let Some(entry) = data.entries.iter_mut().find(|(k, _)| k == key) {
                            entry.1 = old;
                        }
                    }
                    None => data.entries.retain(|(k, _)| k != key),
                }
                return Err(ObjectError::ConstraintViolated {
                    key: key.to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Snapshot of the entries.
    pub fn entries(&self) -> Vec<(String, Value)> {
        let guard = self.inner.data.lock();
        let data = guard.borrow();
        data.entries.clone()
    }

    pub fn keys(&self) -> Vec<String> {
        let guard = self.inner.data.lock();
        let data = guard.borrow();
        data.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn len(&self) -> usize {
        let guard = self.inner.data.lock();
        let len = guard.borrow().entries.len();
        len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// URL identity, when bound.
    pub fn url(&self) -> Option<String> {
        let guard = self.inner.data.lock();
        let url = guard.borrow().url.clone();
        url
    }

    pub fn set_url(&self, url: impl Into<String>) {
        let guard = self.inner.data.lock();
        guard.borrow_mut().url = Some(url.into());
    }

    /// Install a constraint pattern re-validated after each mutation.
    pub fn set_constraint(&self, pattern: Pattern) {
        let guard = self.inner.data.lock();
        guard.borrow_mut().constraint = Some(pattern);
    }

    /// Detached deep copy (entries deep-cloned, shared bit cleared).
    pub fn deep_clone(&self) -> Result<Object, crate::sharing::ShareError> {
        let entries = self.entries();
        let mut cloned = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            cloned.push((key, crate::sharing::deep_clone(&value)?));
        }
        Object::new(cloned).map_err(|_| crate::sharing::ShareError::NotClonable)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries();
        let mut map = f.debug_map();
        for (k, v) in &entries {
            map.entry(k, v);
        }
        map.finish()
    }
}

/// An immutable, string-keyed record.
///
/// Entries are sorted by key at construction; records are structurally
/// shared across threads and cannot form cycles.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    entries: Arc<Vec<(String, Value)>>,
}

impl Record {
    /// Create a record. Keys are validated and entries sorted.
    pub fn new(mut entries: Vec<(String, Value)>) -> Result<Self, ObjectError> {
        for (key, _) in &entries {
            validate_element_key(key)?;
        }
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(Record {
            entries: Arc::new(entries),
        })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .binary_search_by(|(k, _)| k.as_str().cmp(key))
            .ok()
            .map(|i| &self.entries[i].1)
    }

    pub fn entries(&self) -> &[(String, Value)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
// Tests use expect() to panic on unexpected state, making failures immediately visible
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn element_key_rules() {
        assert!(validate_element_key("a").is_ok());
        assert!(validate_element_key("snake_case-1").is_ok());
        assert!(validate_element_key("").is_err());
        assert!(validate_element_key("1leading").is_err());
        assert!(validate_element_key(&"x".repeat(101)).is_err());
        assert!(validate_element_key(&"x".repeat(100)).is_ok());
    }

    #[test]
    fn shared_bit_never_clears() {
        let obj = Object::empty();
        assert!(!obj.is_shared());
        obj.share();
        assert!(obj.is_shared());
    }

    #[test]
    fn object_handles_share_mutations() {
        let obj = Object::empty();
        let alias = obj.clone();
        obj.set("a", Value::int(1)).expect("set");
        assert_eq!(alias.get("a"), Some(Value::int(1)));
    }

    #[test]
    fn record_lookup_is_sorted() {
        let rec = Record::new(vec![
            ("b".into(), Value::int(2)),
            ("a".into(), Value::int(1)),
        ])
        .expect("record");
        assert_eq!(rec.get("a"), Some(&Value::int(1)));
        assert_eq!(rec.entries()[0].0, "a");
    }
}
