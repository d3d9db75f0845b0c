//! Runtime value model for Rill.
//!
//! Defines the closed [`Value`] union, the [`pattern::Pattern`] matcher
//! type that doubles as the JSON decoder driver, the cycle-safe equality
//! and containment rules, and the thread-transfer sharing discipline.

pub mod container;
pub mod equality;
pub mod json;
pub mod pattern;
pub mod sharing;
mod value;

pub use pattern::{
    EntryPattern, FnSignaturePattern, ListPattern, NamedPattern, ObjectPattern, Pattern,
    SequenceStrPattern, StrPatternElement,
};
pub use sharing::{deep_clone, is_clonable, is_sharable, share_or_clone, ShareError};
pub use value::{
    validate_element_key, ArithmeticError, DateTime, Dict, Duration, ErrorData, FloatRange,
    FunctionValue, Heap, HostContext, HostFnDyn, HostFunction, HostReturn, IntRange, List, Object,
    ObjectError, ObjectGuard, QuantityError, QuantityRange, Record, RuneRange, ScalarInt,
    ScriptFunction, StructLayout, StructLayoutRegistry, StructPointer, StructValue, Treedata,
    TreedataNode, Value, XmlElement, MAX_ELEMENT_KEY_LEN,
};
