//! Interned name identifiers.

use std::fmt;

/// An interned string identifier.
///
/// `Name` is a 4-byte index into the [`StringInterner`](crate::StringInterner)
/// that produced it. Comparing two names from the same interner is a single
/// `u32` comparison.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, serde::Serialize, serde::Deserialize)]
#[repr(transparent)]
pub struct Name(u32);

impl Name {
    /// Create a name from a raw index. Only the interner should call this.
    #[inline]
    pub(crate) const fn from_raw(index: u32) -> Self {
        Name(index)
    }

    /// The raw interner index.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.0)
    }
}

/// Read-only lookup of interned names.
///
/// Implemented by the interner and by anything that proxies it, so that
/// downstream crates can render names without depending on the concrete
/// interner type.
pub trait StringLookup {
    /// Resolve a name back to its string.
    fn lookup(&self, name: Name) -> &str;
}
