//! The value-sharing discipline for thread transfer.
//!
//! Every value crossing a thread boundary (spawn arguments, cross-thread
//! returns) must be sharable — handed over by reference with the shared bit
//! set — or clonable — deep-copied. Exactly one of the two holds for any
//! transferable value; [`share_or_clone`] fails otherwise.
//!
//! - primitives and immutables: transferred by value (sharable),
//! - objects: sharable; the transfer sets the shared bit and recursively
//!   shares or clones the entries,
//! - lists, dictionaries, structs: clonable (deep copy),
//! - struct pointers: neither; the transfer fails.

use crate::value::StructValue;
use crate::Value;

/// Failure to move a value across a thread boundary.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ShareError {
    #[error("value is neither sharable nor clonable")]
    NotSharableNorClonable,
    #[error("value is not clonable")]
    NotClonable,
}

/// Safe to hand to another thread without a copy.
pub fn is_sharable(value: &Value) -> bool {
    match value {
        Value::Nil
        | Value::Bool(_)
        | Value::Int(_)
        | Value::Float(_)
        | Value::Duration(_)
        | Value::DateTime(_)
        | Value::Byte(_)
        | Value::Rune(_)
        | Value::Ulid(_)
        | Value::Uuid(_)
        | Value::Str(_)
        | Value::Path(_)
        | Value::PathPattern(_)
        | Value::Url(_)
        | Value::UrlPattern(_)
        | Value::Host(_)
        | Value::HostPattern(_)
        | Value::Scheme(_)
        | Value::PropertyName(_)
        | Value::Identifier(_)
        | Value::ByteSlice(_)
        | Value::RuneSlice(_)
        | Value::IntRange(_)
        | Value::FloatRange(_)
        | Value::RuneRange(_)
        | Value::QuantityRange(_)
        | Value::Pattern(_)
        | Value::Error(_)
        | Value::Treedata(_)
        | Value::XmlElement(_)
        | Value::None => true,
        // Function captures are frozen at definition time.
        Value::Function(_) => true,
        // Objects share by reference under their lock.
        Value::Object(_) => true,
        Value::Some(inner) => is_sharable(inner),
        Value::OrderedPair(pair) => is_sharable(&pair.0) && is_sharable(&pair.1),
        Value::Tuple(items) => items.iter().all(is_sharable),
        Value::Record(record) => record.entries().iter().all(|(_, v)| is_sharable(v)),
        Value::Namespace(members) => members.values().all(is_sharable),
        Value::List(_) | Value::Dict(_) | Value::Struct(_) | Value::StructPointer(_) => false,
    }
}

/// Safe to deep-copy for transfer.
pub fn is_clonable(value: &Value) -> bool {
    match value {
        Value::List(list) => list.snapshot().iter().all(transferable),
        Value::Dict(dict) => dict
            .snapshot()
            .iter()
            .all(|(k, v)| transferable(k) && transferable(v)),
        Value::Struct(s) => s.fields.iter().all(transferable),
        Value::StructPointer(_) => false,
        _ => false,
    }
}

fn transferable(value: &Value) -> bool {
    is_sharable(value) || is_clonable(value)
}

/// Deep-copy a clonable value; immutables are returned as-is.
pub fn deep_clone(value: &Value) -> Result<Value, ShareError> {
    match value {
        Value::List(list) => {
            let mut cloned = Vec::with_capacity(list.len());
            for item in list.snapshot() {
                cloned.push(deep_clone(&item)?);
            }
            Ok(Value::list(cloned))
        }
        Value::Dict(dict) => {
            let mut cloned = Vec::with_capacity(dict.len());
            for (k, v) in dict.snapshot() {
                cloned.push((deep_clone(&k)?, deep_clone(&v)?));
            }
            Ok(Value::dict(cloned))
        }
        Value::Object(object) => {
            let cloned = object.deep_clone()?;
            Ok(Value::Object(cloned))
        }
        Value::Struct(s) => {
            let mut fields = Vec::with_capacity(s.fields.len());
            for field in &s.fields {
                fields.push(deep_clone(field)?);
            }
            Ok(Value::Struct(Box::new(StructValue {
                layout: std::sync::Arc::clone(&s.layout),
                fields,
            })))
        }
        Value::StructPointer(_) => Err(ShareError::NotClonable),
        other if is_sharable(other) => Ok(other.clone()),
        _ => Err(ShareError::NotClonable),
    }
}

/// Prepare a value for thread transfer.
///
/// Sharable values are returned by reference — objects get their shared
/// bit set and their entries recursively prepared. Clonable values are
/// deep-copied. Anything else fails.
pub fn share_or_clone(value: &Value) -> Result<Value, ShareError> {
    if let Value::Object(object) = value {
        share_object(object)?;
        return Ok(value.clone());
    }
    if is_sharable(value) {
        return Ok(value.clone());
    }
    if is_clonable(value) {
        return deep_clone(value);
    }
    Err(ShareError::NotSharableNorClonable)
}

fn share_object(object: &crate::Object) -> Result<(), ShareError> {
    if object.is_shared() {
        return Ok(());
    }
    object.share();
    // Entries must themselves be transferable once the object is shared.
    for (key, entry) in object.entries() {
        if let Value::Object(_) = &entry {
            let shared = share_or_clone(&entry)?;
            let _ = object.set(&key, shared);
        } else if !is_sharable(&entry) {
            let cloned = deep_clone(&entry).map_err(|_| ShareError::NotSharableNorClonable)?;
            let _ = object.set(&key, cloned);
        }
    }
    Ok(())
}

/// Whether `share_or_clone` would mutate the receiver in the child's view:
/// true only for shared objects (reference transfer).
pub fn transfers_by_reference(value: &Value) -> bool {
    matches!(value, Value::Object(_))
}
