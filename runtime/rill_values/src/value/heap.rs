//! Arc-enforcement wrapper for heap-allocated value payloads.
//!
//! `Heap<T>` has a crate-private constructor: external code cannot build
//! heap values directly and must go through the factory methods on
//! [`Value`](crate::Value). All heap payloads are reference-counted with
//! `Arc`, so cloning a `Value` is cheap and immutable payloads can cross
//! thread boundaries by reference.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Reference-counted heap payload with a crate-private constructor.
pub struct Heap<T: ?Sized>(Arc<T>);

impl<T> Heap<T> {
    /// Allocate a payload. Crate-private: use the `Value` factories.
    #[inline]
    pub(crate) fn new(value: T) -> Self {
        Heap(Arc::new(value))
    }
}

impl<T: ?Sized> Heap<T> {
    /// Address-based identity, used by cycle-safe equality.
    #[inline]
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Whether two handles point at the same allocation.
    #[inline]
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: ?Sized> Clone for Heap<T> {
    #[inline]
    fn clone(&self) -> Self {
        Heap(Arc::clone(&self.0))
    }
}

impl<T: ?Sized> Deref for Heap<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Heap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<T: ?Sized + PartialEq> PartialEq for Heap<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || *self.0 == *other.0
    }
}

impl<T: ?Sized + Eq> Eq for Heap<T> {}

impl<T: ?Sized + std::hash::Hash> std::hash::Hash for Heap<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}
