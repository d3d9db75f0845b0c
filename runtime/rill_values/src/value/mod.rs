//! Runtime values for the Rill interpreter.
//!
//! # Arc Enforcement Architecture
//!
//! All heap allocations go through factory methods on `Value`. The
//! `Heap<T>` wrapper has a crate-private constructor, so external code
//! cannot create heap values directly:
//!
//! ```text
//! let s = Value::string("hello");          // OK
//! let l = Value::list(vec![]);             // OK
//! let s = Value::Str(Heap::new(...));      // ERROR: Heap::new is pub(crate)
//! ```
//!
//! # Thread Safety
//!
//! Immutable payloads use `Arc` internally and are shared freely across
//! LThreads. The mutable containers (`Object`, `List`, `Dict`,
//! `StructPointer`) carry their own locks; only `Object` may cross a
//! thread boundary without a deep copy, and only once its shared bit is
//! set (see `crate::sharing`).

mod collections;
mod composite;
mod heap;
mod object;
mod scalar_int;

use std::collections::BTreeMap;
use std::fmt;

pub use collections::{Dict, List, Treedata, TreedataNode};
pub use composite::{
    DateTime, Duration, ErrorData, FloatRange, FunctionValue, HostContext, HostFnDyn, HostFunction,
    HostReturn, IntRange, QuantityError, QuantityRange, RuneRange, ScriptFunction, StructLayout,
    StructLayoutRegistry, StructPointer, StructValue, XmlElement,
};
pub use heap::Heap;
pub use object::{validate_element_key, Object, ObjectError, ObjectGuard, MAX_ELEMENT_KEY_LEN};
pub use scalar_int::{ArithmeticError, ScalarInt};

/// Runtime value: the closed union every Rill value belongs to.
#[derive(Clone)]
pub enum Value {
    // Primitives (inline, no heap allocation)
    Nil,
    Bool(bool),
    Int(ScalarInt),
    Float(f64),
    Duration(Duration),
    DateTime(DateTime),
    Byte(u8),
    Rune(char),
    Ulid(ulid::Ulid),
    Uuid(uuid::Uuid),

    // Immutable heap strings and string-like resource names
    Str(Heap<String>),
    Path(Heap<String>),
    PathPattern(Heap<String>),
    Url(Heap<String>),
    UrlPattern(Heap<String>),
    Host(Heap<String>),
    HostPattern(Heap<String>),
    Scheme(Heap<String>),
    PropertyName(Heap<String>),
    Identifier(Heap<String>),

    // Slices
    ByteSlice(Heap<Vec<u8>>),
    RuneSlice(Heap<Vec<char>>),

    // Containers
    Object(Object),
    Record(object::Record),
    List(List),
    Tuple(Heap<Vec<Value>>),
    Dict(Dict),
    OrderedPair(Heap<(Value, Value)>),

    // Ranges
    IntRange(IntRange),
    FloatRange(FloatRange),
    RuneRange(RuneRange),
    QuantityRange(QuantityRange),

    // Behaviour
    Pattern(crate::pattern::Pattern),
    Function(FunctionValue),
    Namespace(Heap<BTreeMap<String, Value>>),
    Error(Heap<ErrorData>),

    // Option
    Some(Heap<Value>),
    None,

    // Trees and markup
    Treedata(Heap<Treedata>),
    XmlElement(Heap<XmlElement>),

    // Structs
    Struct(Box<StructValue>),
    StructPointer(StructPointer),
}

pub use object::Record;

// Factory methods (the only way to construct heap values)

impl Value {
    #[inline]
    pub fn int(n: i64) -> Self {
        Value::Int(ScalarInt::new(n))
    }

    #[inline]
    pub fn string(s: impl Into<String>) -> Self {
        Value::Str(Heap::new(s.into()))
    }

    #[inline]
    pub fn path(p: impl Into<String>) -> Self {
        Value::Path(Heap::new(p.into()))
    }

    #[inline]
    pub fn path_pattern(p: impl Into<String>) -> Self {
        Value::PathPattern(Heap::new(p.into()))
    }

    #[inline]
    pub fn url(u: impl Into<String>) -> Self {
        Value::Url(Heap::new(u.into()))
    }

    #[inline]
    pub fn url_pattern(u: impl Into<String>) -> Self {
        Value::UrlPattern(Heap::new(u.into()))
    }

    #[inline]
    pub fn host(h: impl Into<String>) -> Self {
        Value::Host(Heap::new(h.into()))
    }

    #[inline]
    pub fn host_pattern(h: impl Into<String>) -> Self {
        Value::HostPattern(Heap::new(h.into()))
    }

    #[inline]
    pub fn scheme(s: impl Into<String>) -> Self {
        Value::Scheme(Heap::new(s.into()))
    }

    #[inline]
    pub fn property_name(s: impl Into<String>) -> Self {
        Value::PropertyName(Heap::new(s.into()))
    }

    #[inline]
    pub fn identifier(s: impl Into<String>) -> Self {
        Value::Identifier(Heap::new(s.into()))
    }

    #[inline]
    pub fn byte_slice(bytes: Vec<u8>) -> Self {
        Value::ByteSlice(Heap::new(bytes))
    }

    #[inline]
    pub fn rune_slice(runes: Vec<char>) -> Self {
        Value::RuneSlice(Heap::new(runes))
    }

    #[inline]
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(List::new(items))
    }

    #[inline]
    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Heap::new(items))
    }

    /// Create an object value; keys are validated.
    pub fn object(entries: Vec<(String, Value)>) -> Result<Self, ObjectError> {
        Object::new(entries).map(Value::Object)
    }

    /// Create a record value; keys are validated and sorted.
    pub fn record(entries: Vec<(String, Value)>) -> Result<Self, ObjectError> {
        Record::new(entries).map(Value::Record)
    }

    #[inline]
    pub fn dict(entries: Vec<(Value, Value)>) -> Self {
        Value::Dict(Dict::new(entries))
    }

    #[inline]
    pub fn ordered_pair(first: Value, second: Value) -> Self {
        Value::OrderedPair(Heap::new((first, second)))
    }

    #[inline]
    pub fn some(v: Value) -> Self {
        Value::Some(Heap::new(v))
    }

    #[inline]
    pub fn namespace(members: BTreeMap<String, Value>) -> Self {
        Value::Namespace(Heap::new(members))
    }

    #[inline]
    pub fn error(data: ErrorData) -> Self {
        Value::Error(Heap::new(data))
    }

    #[inline]
    pub fn treedata(tree: Treedata) -> Self {
        Value::Treedata(Heap::new(tree))
    }

    #[inline]
    pub fn xml_element(elem: XmlElement) -> Self {
        Value::XmlElement(Heap::new(elem))
    }
}

// Accessors

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Option::Some(n.raw()),
            _ => Option::None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Option::Some(*b),
            _ => Option::None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Option::Some(s),
            _ => Option::None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Option::Some(*f),
            _ => Option::None,
        }
    }

    /// URL identity, for values that carry one (the containment rule).
    pub fn url_identity(&self) -> Option<String> {
        match self {
            Value::Url(u) => Option::Some((**u).clone()),
            Value::Object(o) => o.url(),
            _ => Option::None,
        }
    }

    /// Whether this value is an error value.
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Type name for error messages and the JSON wrapper convention.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Duration(_) => "duration",
            Value::DateTime(_) => "datetime",
            Value::Byte(_) => "byte",
            Value::Rune(_) => "rune",
            Value::Ulid(_) => "ulid",
            Value::Uuid(_) => "uuid",
            Value::Str(_) => "string",
            Value::Path(_) => "path",
            Value::PathPattern(_) => "path-pattern",
            Value::Url(_) => "url",
            Value::UrlPattern(_) => "url-pattern",
            Value::Host(_) => "host",
            Value::HostPattern(_) => "host-pattern",
            Value::Scheme(_) => "scheme",
            Value::PropertyName(_) => "property-name",
            Value::Identifier(_) => "identifier",
            Value::ByteSlice(_) => "byte-slice",
            Value::RuneSlice(_) => "rune-slice",
            Value::Object(_) => "object",
            Value::Record(_) => "record",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dictionary",
            Value::OrderedPair(_) => "ordered-pair",
            Value::IntRange(_) => "int-range",
            Value::FloatRange(_) => "float-range",
            Value::RuneRange(_) => "rune-range",
            Value::QuantityRange(_) => "quantity-range",
            Value::Pattern(_) => "pattern",
            Value::Function(_) => "function",
            Value::Namespace(_) => "namespace",
            Value::Error(_) => "error",
            Value::Some(_) | Value::None => "option",
            Value::Treedata(_) => "treedata",
            Value::XmlElement(_) => "xml-element",
            Value::Struct(_) | Value::StructPointer(_) => "struct",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        crate::equality::values_equal(self, other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Duration(d) => write!(f, "Duration({d})"),
            Value::DateTime(t) => write!(f, "DateTime({})", t.unix_millis()),
            Value::Byte(b) => write!(f, "Byte(0x{b:02x})"),
            Value::Rune(c) => write!(f, "Rune({c:?})"),
            Value::Ulid(u) => write!(f, "Ulid({u})"),
            Value::Uuid(u) => write!(f, "Uuid({u})"),
            Value::Str(s) => write!(f, "Str({:?})", &**s),
            Value::Path(p) => write!(f, "Path({})", &**p),
            Value::PathPattern(p) => write!(f, "PathPattern({})", &**p),
            Value::Url(u) => write!(f, "Url({})", &**u),
            Value::UrlPattern(u) => write!(f, "UrlPattern({})", &**u),
            Value::Host(h) => write!(f, "Host({})", &**h),
            Value::HostPattern(h) => write!(f, "HostPattern({})", &**h),
            Value::Scheme(s) => write!(f, "Scheme({})", &**s),
            Value::PropertyName(p) => write!(f, "PropertyName({})", &**p),
            Value::Identifier(i) => write!(f, "Identifier({})", &**i),
            Value::ByteSlice(b) => write!(f, "ByteSlice({} bytes)", b.len()),
            Value::RuneSlice(r) => write!(f, "RuneSlice({} runes)", r.len()),
            Value::Object(o) => write!(f, "Object({o:?})"),
            Value::Record(r) => write!(f, "Record({r:?})"),
            Value::List(l) => write!(f, "{l:?}"),
            Value::Tuple(items) => write!(f, "Tuple({:?})", &**items),
            Value::Dict(d) => write!(f, "Dict({d:?})"),
            Value::OrderedPair(p) => write!(f, "OrderedPair({:?}, {:?})", p.0, p.1),
            Value::IntRange(r) => write!(f, "IntRange({}..={})", r.start, r.end),
            Value::FloatRange(r) => write!(f, "FloatRange({}..{})", r.start, r.end),
            Value::RuneRange(r) => write!(f, "RuneRange({}..={})", r.start, r.end),
            Value::QuantityRange(r) => write!(f, "QuantityRange({}..={})", r.start, r.end),
            Value::Pattern(p) => write!(f, "Pattern({p:?})"),
            Value::Function(func) => write!(f, "Function({func:?})"),
            Value::Namespace(ns) => write!(f, "Namespace({} members)", ns.len()),
            Value::Error(e) => write!(f, "Error({})", &**e),
            Value::Some(v) => write!(f, "Some({:?})", &**v),
            Value::None => write!(f, "None"),
            Value::Treedata(t) => write!(f, "Treedata({:?})", t.root),
            Value::XmlElement(e) => write!(f, "XmlElement(<{}>)", e.name),
            Value::Struct(s) => write!(f, "Struct({s:?})"),
            Value::StructPointer(p) => write!(f, "StructPointer({:?})", p.read()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Duration(d) => write!(f, "{d}"),
            Value::DateTime(t) => write!(f, "datetime({})", t.unix_millis()),
            Value::Byte(b) => write!(f, "0x{b:02x}"),
            Value::Rune(c) => write!(f, "'{c}'"),
            Value::Ulid(u) => write!(f, "{u}"),
            Value::Uuid(u) => write!(f, "{u}"),
            Value::Str(s) => write!(f, "{}", &**s),
            Value::Path(p) | Value::PathPattern(p) => write!(f, "{}", &**p),
            Value::Url(u) | Value::UrlPattern(u) => write!(f, "{}", &**u),
            Value::Host(h) | Value::HostPattern(h) => write!(f, "{}", &**h),
            Value::Scheme(s) => write!(f, "{}://", &**s),
            Value::PropertyName(p) => write!(f, ".{}", &**p),
            Value::Identifier(i) => write!(f, "#{}", &**i),
            Value::ByteSlice(b) => write!(f, "0x[{} bytes]", b.len()),
            Value::RuneSlice(r) => {
                let s: String = r.iter().collect();
                write!(f, "{s}")
            }
            Value::Object(o) => {
                let entries = o.entries();
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Record(r) => {
                write!(f, "#{{")?;
                for (i, (k, v)) in r.entries().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::List(l) => {
                let items = l.snapshot();
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Tuple(items) => {
                write!(f, "#[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Dict(d) => {
                let entries = d.snapshot();
                write!(f, ":{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::OrderedPair(p) => write!(f, "({} : {})", p.0, p.1),
            Value::IntRange(r) => write!(f, "{}..{}", r.start, r.end),
            Value::FloatRange(r) => write!(f, "{}..{}", r.start, r.end),
            Value::RuneRange(r) => write!(f, "'{}'..'{}'", r.start, r.end),
            Value::QuantityRange(r) => write!(f, "{}..{}", r.start, r.end),
            Value::Pattern(_) => write!(f, "%pattern"),
            Value::Function(_) => write!(f, "fn"),
            Value::Namespace(_) => write!(f, "namespace"),
            Value::Error(e) => write!(f, "error({})", &**e),
            Value::Some(v) => write!(f, "some({})", &**v),
            Value::None => write!(f, "none"),
            Value::Treedata(t) => write!(f, "treedata({})", t.root),
            Value::XmlElement(e) => write!(f, "<{}>", e.name),
            Value::Struct(s) => write!(f, "struct({} fields)", s.fields.len()),
            Value::StructPointer(_) => write!(f, "*struct"),
        }
    }
}

#[cfg(test)]
mod tests;
