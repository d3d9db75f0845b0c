//! Thread-safe string interner.
//!
//! Rill interns identifiers, property keys and module names — a small,
//! slowly-growing set — so a single lock-protected table is sufficient.
//! Interned strings are leaked (`Box::leak`) so lookups can hand out
//! `&'static str` without holding the lock.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::{Name, StringLookup};

#[derive(Default)]
struct InternTable {
    map: FxHashMap<&'static str, u32>,
    strings: Vec<&'static str>,
}

/// Thread-safe string interner producing [`Name`] ids.
#[derive(Default)]
pub struct StringInterner {
    table: RwLock<InternTable>,
}

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string, returning its stable [`Name`].
    ///
    /// Interning the same string twice returns the same name.
    pub fn intern(&self, s: &str) -> Name {
        if let Some(&index) = self.table.read().map.get(s) {
            return Name::from_raw(index);
        }
        let mut table = self.table.write();
        // Re-check: another thread may have interned between the locks.
        if let Some(&index) = table.map.get(s) {
            return Name::from_raw(index);
        }
        let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
        let index = u32::try_from(table.strings.len()).unwrap_or(u32::MAX);
        table.strings.push(leaked);
        table.map.insert(leaked, index);
        Name::from_raw(index)
    }

    /// Resolve a name back to its string.
    ///
    /// Returns an empty string for a name from a different interner whose
    /// index is out of range.
    pub fn lookup(&self, name: Name) -> &'static str {
        self.table
            .read()
            .strings
            .get(name.raw() as usize)
            .copied()
            .unwrap_or("")
    }

    /// Number of interned strings.
    pub fn len(&self) -> usize {
        self.table.read().strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StringLookup for StringInterner {
    fn lookup(&self, name: Name) -> &str {
        StringInterner::lookup(self, name)
    }
}

/// Shared handle to a [`StringInterner`].
///
/// The interner must be shared between the spawner and every LThread it
/// spawns, so names stay comparable across thread boundaries.
#[derive(Clone, Default)]
pub struct SharedInterner(Arc<StringInterner>);

impl SharedInterner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::ops::Deref for SharedInterner {
    type Target = StringInterner;

    #[inline]
    fn deref(&self) -> &StringInterner {
        &self.0
    }
}

impl StringLookup for SharedInterner {
    fn lookup(&self, name: Name) -> &str {
        self.0.lookup(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let interner = StringInterner::new();
        let a = interner.intern("alpha");
        let b = interner.intern("alpha");
        assert_eq!(a, b);
        assert_eq!(interner.lookup(a), "alpha");
    }

    #[test]
    fn distinct_strings_get_distinct_names() {
        let interner = StringInterner::new();
        let a = interner.intern("alpha");
        let b = interner.intern("beta");
        assert_ne!(a, b);
    }

    #[test]
    fn shared_interner_is_cloneable() {
        let shared = SharedInterner::new();
        let clone = shared.clone();
        let a = shared.intern("x");
        assert_eq!(clone.lookup(a), "x");
    }
}
