//! Quantities, ranges, functions, errors and struct values.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use rill_ir::{Chunk, Name, NodeId, SourcePositionStack};

use crate::Value;

// Quantities

/// Quantity-arithmetic failure for durations and other unit-carrying values.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum QuantityError {
    QuantityOverflow,
    QuantityUnderflow,
    /// A computed quantity exceeds the representable range of its unit.
    QuantityTooLarge,
}

impl QuantityError {
    pub const fn id(self) -> &'static str {
        match self {
            QuantityError::QuantityOverflow => "QuantityOverflow",
            QuantityError::QuantityUnderflow => "QuantityUnderflow",
            QuantityError::QuantityTooLarge => "QuantityTooLarge",
        }
    }
}

impl fmt::Display for QuantityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuantityError::QuantityOverflow => write!(f, "quantity overflow"),
            QuantityError::QuantityUnderflow => write!(f, "quantity underflow"),
            QuantityError::QuantityTooLarge => write!(f, "quantity is too large"),
        }
    }
}

impl std::error::Error for QuantityError {}

/// A duration in milliseconds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Duration(u64);

impl Duration {
    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Duration(ms)
    }

    #[inline]
    pub const fn millis(self) -> u64 {
        self.0
    }

    pub fn checked_add(self, rhs: Duration) -> Result<Duration, QuantityError> {
        self.0
            .checked_add(rhs.0)
            .map(Duration)
            .ok_or(QuantityError::QuantityOverflow)
    }

    pub fn checked_sub(self, rhs: Duration) -> Result<Duration, QuantityError> {
        self.0
            .checked_sub(rhs.0)
            .map(Duration)
            .ok_or(QuantityError::QuantityUnderflow)
    }

    /// Multiply by a non-negative integer factor.
    pub fn checked_mul(self, factor: i64) -> Result<Duration, QuantityError> {
        if factor < 0 {
            return Err(QuantityError::QuantityUnderflow);
        }
        let factor = u64::try_from(factor).map_err(|_| QuantityError::QuantityTooLarge)?;
        self.0
            .checked_mul(factor)
            .map(Duration)
            .ok_or(QuantityError::QuantityTooLarge)
    }

    pub fn as_std(self) -> std::time::Duration {
        std::time::Duration::from_millis(self.0)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 1000 && self.0 % 1000 == 0 {
            write!(f, "{}s", self.0 / 1000)
        } else {
            write!(f, "{}ms", self.0)
        }
    }
}

/// A point in time, in milliseconds since the Unix epoch.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct DateTime(i64);

impl DateTime {
    #[inline]
    pub const fn from_unix_millis(ms: i64) -> Self {
        DateTime(ms)
    }

    #[inline]
    pub const fn unix_millis(self) -> i64 {
        self.0
    }
}

// Ranges

/// An inclusive integer range.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct IntRange {
    pub start: i64,
    pub end: i64,
}

impl IntRange {
    pub const fn new(start: i64, end: i64) -> Self {
        IntRange { start, end }
    }

    pub fn contains(&self, n: i64) -> bool {
        n >= self.start && n <= self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> {
        self.start..=self.end
    }
}

/// A float range; the upper bound may be exclusive.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FloatRange {
    pub start: f64,
    pub end: f64,
    pub inclusive_end: bool,
}

impl FloatRange {
    pub fn contains(&self, f: f64) -> bool {
        if self.inclusive_end {
            f >= self.start && f <= self.end
        } else {
            f >= self.start && f < self.end
        }
    }

    pub fn is_empty(&self) -> bool {
        if self.inclusive_end {
            self.start > self.end
        } else {
            self.start >= self.end
        }
    }
}

/// An inclusive rune (character) range.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RuneRange {
    pub start: char,
    pub end: char,
}

impl RuneRange {
    pub fn contains(&self, c: char) -> bool {
        c >= self.start && c <= self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

/// An inclusive quantity (duration) range.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct QuantityRange {
    pub start: Duration,
    pub end: Duration,
}

impl QuantityRange {
    pub fn contains(&self, d: Duration) -> bool {
        d >= self.start && d <= self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

// Functions

/// Minimal execution environment visible to host functions.
///
/// `rill_core::Context` implements this; the indirection keeps the value
/// crate free of a dependency on the capability kernel. `as_any` lets host
/// functions that know their embedder downcast to the concrete context.
pub trait HostContext: Send + Sync {
    /// Whether the calling context has been cancelled.
    fn is_cancelled(&self) -> bool;

    /// Sleep up to `duration`, returning early when the context is
    /// cancelled. Returns `true` when the full duration elapsed.
    fn sleep_cancellable(&self, duration: Duration) -> bool;

    fn as_any(&self) -> &dyn std::any::Any;
}

/// What a host function returned.
///
/// Host functions may produce zero, one or two results; in the two-result
/// form the second slot is an error value or `Nil`.
#[derive(Clone, Debug)]
pub enum HostReturn {
    Void,
    One(Value),
    Two(Value, Value),
}

/// Host function implementation signature.
pub type HostFnDyn =
    Arc<dyn Fn(&dyn HostContext, &[Value]) -> Result<HostReturn, String> + Send + Sync>;

/// A host-provided function.
pub struct HostFunction {
    pub name: &'static str,
    /// Number of required parameters.
    pub required_params: usize,
    /// Number of trailing optional parameters.
    pub optional_params: usize,
    pub f: HostFnDyn,
}

impl HostFunction {
    pub fn new(
        name: &'static str,
        required_params: usize,
        f: impl Fn(&dyn HostContext, &[Value]) -> Result<HostReturn, String> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(HostFunction {
            name,
            required_params,
            optional_params: 0,
            f: Arc::new(f),
        })
    }

    pub fn with_optional(
        name: &'static str,
        required_params: usize,
        optional_params: usize,
        f: impl Fn(&dyn HostContext, &[Value]) -> Result<HostReturn, String> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(HostFunction {
            name,
            required_params,
            optional_params,
            f: Arc::new(f),
        })
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostFunction({})", self.name)
    }
}

/// A script-defined function.
///
/// One definition is shared by every reference, including recursive calls
/// and calls from other threads. Captured globals are frozen at definition
/// time and travel with the function; captured locals are a closure's
/// environment snapshot.
pub struct ScriptFunction {
    pub name: Option<Name>,
    /// The `FnExpr` node within `chunk`.
    pub node: NodeId,
    pub chunk: Arc<Chunk>,
    pub captured_globals: FxHashMap<Name, Value>,
    pub captured_locals: FxHashMap<Name, Value>,
}

impl fmt::Debug for ScriptFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScriptFunction({:?} in {})", self.node, self.chunk.name)
    }
}

/// A function value: script-defined or host-provided.
#[derive(Clone, Debug)]
pub enum FunctionValue {
    Script(Arc<ScriptFunction>),
    Host(Arc<HostFunction>),
}

impl FunctionValue {
    /// Identity: same definition.
    pub fn same(&self, other: &FunctionValue) -> bool {
        match (self, other) {
            (FunctionValue::Script(a), FunctionValue::Script(b)) => Arc::ptr_eq(a, b),
            (FunctionValue::Host(a), FunctionValue::Host(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// Errors

/// Payload of a `Value::Error`.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorData {
    /// Stable error identifier (`IntOverflow`, `NotAllowed`, ...).
    pub id: String,
    /// Human-readable message.
    pub message: String,
    /// Source-position stack, outermost call site first.
    pub position_stack: SourcePositionStack,
    /// Structured payload, `Nil` when absent.
    pub data: Value,
}

impl ErrorData {
    pub fn new(id: impl Into<String>, message: impl Into<String>) -> Self {
        ErrorData {
            id: id.into(),
            message: message.into(),
            position_stack: SourcePositionStack::new(),
            data: Value::Nil,
        }
    }
}

impl fmt::Display for ErrorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.message)?;
        if !self.position_stack.is_empty() {
            write!(f, " ({})", self.position_stack)?;
        }
        Ok(())
    }
}

// Structs

/// Physical layout of a struct type, materialized once.
///
/// Field offsets are memoized on the descriptor the first time a struct
/// type is instantiated; later field access is a name-indexed lookup.
#[derive(Debug)]
pub struct StructLayout {
    pub type_name: Name,
    pub fields: Vec<Name>,
    offsets: FxHashMap<Name, usize>,
}

impl StructLayout {
    pub fn new(type_name: Name, fields: Vec<Name>) -> Self {
        let offsets = fields
            .iter()
            .enumerate()
            .map(|(offset, name)| (*name, offset))
            .collect();
        StructLayout {
            type_name,
            fields,
            offsets,
        }
    }

    #[inline]
    pub fn offset_of(&self, field: Name) -> Option<usize> {
        self.offsets.get(&field).copied()
    }
}

/// Registry memoizing struct layouts per type name.
#[derive(Debug, Default)]
pub struct StructLayoutRegistry {
    layouts: RwLock<FxHashMap<Name, Arc<StructLayout>>>,
}

impl StructLayoutRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The layout for `type_name`, materializing it on first use.
    ///
    /// The layout is fixed at first materialization; a second call with
    /// different fields returns the original layout.
    pub fn materialize(&self, type_name: Name, fields: &[Name]) -> Arc<StructLayout> {
        if let Some(layout) = self.layouts.read().get(&type_name) {
            return Arc::clone(layout);
        }
        let mut layouts = self.layouts.write();
        Arc::clone(
            layouts
                .entry(type_name)
                .or_insert_with(|| Arc::new(StructLayout::new(type_name, fields.to_vec()))),
        )
    }

    pub fn get(&self, type_name: Name) -> Option<Arc<StructLayout>> {
        self.layouts.read().get(&type_name).cloned()
    }
}

/// A struct instance (value type: cloning copies the fields).
#[derive(Clone, Debug)]
pub struct StructValue {
    pub layout: Arc<StructLayout>,
    pub fields: Vec<Value>,
}

impl StructValue {
    pub fn field(&self, name: Name) -> Option<&Value> {
        self.layout.offset_of(name).and_then(|i| self.fields.get(i))
    }
}

/// A pointer to a struct (mutations visible through every handle).
#[derive(Clone, Debug)]
pub struct StructPointer {
    inner: Arc<Mutex<StructValue>>,
}

impl StructPointer {
    pub fn new(value: StructValue) -> Self {
        StructPointer {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    pub fn read(&self) -> StructValue {
        self.inner.lock().clone()
    }

    pub fn field(&self, name: Name) -> Option<Value> {
        let guard = self.inner.lock();
        guard.field(name).cloned()
    }

    /// Set a field by name. Returns false for an unknown field.
    pub fn set_field(&self, name: Name, value: Value) -> bool {
        let mut guard = self.inner.lock();
        match guard.layout.offset_of(name) {
            Some(offset) => {
                guard.fields[offset] = value;
                true
            }
            None => false,
        }
    }
}

// Markup

/// A minimal XML element value.
#[derive(Clone, Debug, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_ir::StringInterner;

    #[test]
    fn duration_arithmetic_is_checked() {
        let d = Duration::from_millis(u64::MAX);
        assert_eq!(
            d.checked_add(Duration::from_millis(1)),
            Err(QuantityError::QuantityOverflow)
        );
        assert_eq!(
            Duration::from_millis(1).checked_sub(Duration::from_millis(2)),
            Err(QuantityError::QuantityUnderflow)
        );
        assert_eq!(
            Duration::from_millis(2).checked_mul(3),
            Ok(Duration::from_millis(6))
        );
    }

    #[test]
    fn int_range_is_inclusive() {
        let range = IntRange::new(0, 3);
        assert!(range.contains(0));
        assert!(range.contains(3));
        assert!(!range.contains(4));
        assert_eq!(range.iter().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn struct_layout_is_materialized_once() {
        let interner = StringInterner::new();
        let point = interner.intern("Point");
        let x = interner.intern("x");
        let y = interner.intern("y");
        let registry = StructLayoutRegistry::new();
        let first = registry.materialize(point, &[x, y]);
        let second = registry.materialize(point, &[y]);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.offset_of(y), Some(1));
    }

    #[test]
    fn struct_pointer_mutations_are_visible() {
        let interner = StringInterner::new();
        let point = interner.intern("Point");
        let x = interner.intern("x");
        let layout = Arc::new(StructLayout::new(point, vec![x]));
        let ptr = StructPointer::new(StructValue {
            layout,
            fields: vec![Value::int(1)],
        });
        let alias = ptr.clone();
        assert!(ptr.set_field(x, Value::int(2)));
        assert_eq!(alias.field(x), Some(Value::int(2)));
    }
}
