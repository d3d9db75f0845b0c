//! JSON representation of values.
//!
//! Every serializable value has a JSON form. JSON-native values (nil,
//! bool, float, string, list, object) serialize plainly; every other type
//! uses a single-key wrapper object `{"<typename>__value": <repr>}` so an
//! untyped reader can reconstruct the type. Integers serialize as decimal
//! strings to preserve the full 64-bit range.
//!
//! `parse_json_representation(json, pattern)` drives parsing: the pattern
//! chooses the representation variant; a `None` pattern accepts any
//! well-typed representation using the wrapper convention.

use serde_json::{json, Map, Value as Json};

use crate::pattern::Pattern;
use crate::value::{
    DateTime, Duration, FloatRange, IntRange, QuantityRange, RuneRange, Treedata, TreedataNode,
};
use crate::Value;

/// Suffix of the wrapper-object key.
const WRAPPER_SUFFIX: &str = "__value";

/// JSON representation failure.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum JsonReprError {
    #[error("values of type {type_name} have no JSON representation")]
    NotSerializable { type_name: &'static str },
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("JSON does not match the expected representation: {0}")]
    Mismatch(String),
}

fn mismatch(msg: impl Into<String>) -> JsonReprError {
    JsonReprError::Mismatch(msg.into())
}

// Writing

/// Serialize a value to its JSON representation (string form).
pub fn write_json_string(value: &Value) -> Result<String, JsonReprError> {
    let json = write_json_representation(value)?;
    serde_json::to_string(&json).map_err(|e| JsonReprError::InvalidJson(e.to_string()))
}

/// Serialize a value to its JSON representation.
pub fn write_json_representation(value: &Value) -> Result<Json, JsonReprError> {
    match value {
        // JSON-native forms, written plainly.
        Value::Nil => Ok(Json::Null),
        Value::Bool(b) => Ok(json!(b)),
        Value::Float(f) => Ok(json!(f)),
        Value::Str(s) => Ok(json!(&**s)),
        Value::List(list) => {
            let mut array = Vec::with_capacity(list.len());
            for item in list.snapshot() {
                array.push(write_json_representation(&item)?);
            }
            Ok(Json::Array(array))
        }
        Value::Object(object) => {
            let mut map = Map::new();
            for (key, entry) in object.entries() {
                map.insert(key, write_json_representation(&entry)?);
            }
            Ok(Json::Object(map))
        }
        // Everything else wraps.
        other => {
            let inner = write_typed(other)?;
            let mut map = Map::new();
            map.insert(format!("{}{WRAPPER_SUFFIX}", other.type_name()), inner);
            Ok(Json::Object(map))
        }
    }
}

/// The unwrapped (pattern-typed) representation of a value.
fn write_typed(value: &Value) -> Result<Json, JsonReprError> {
    match value {
        Value::Nil => Ok(Json::Null),
        Value::Bool(b) => Ok(json!(b)),
        Value::Float(f) => Ok(json!(f)),
        Value::Str(s) => Ok(json!(&**s)),
        // 64-bit integers exceed the interoperable JSON number range.
        Value::Int(n) => Ok(json!(n.raw().to_string())),
        Value::Duration(d) => Ok(json!(format!("{}ms", d.millis()))),
        Value::DateTime(t) => Ok(json!(t.unix_millis().to_string())),
        Value::Byte(b) => Ok(json!(b)),
        Value::Rune(c) => Ok(json!(c.to_string())),
        Value::Ulid(u) => Ok(json!(u.to_string())),
        Value::Uuid(u) => Ok(json!(u.to_string())),
        Value::Path(s)
        | Value::PathPattern(s)
        | Value::Url(s)
        | Value::UrlPattern(s)
        | Value::Host(s)
        | Value::HostPattern(s)
        | Value::Scheme(s)
        | Value::PropertyName(s)
        | Value::Identifier(s) => Ok(json!(&**s)),
        Value::ByteSlice(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
            Ok(json!(hex))
        }
        Value::RuneSlice(runes) => Ok(json!(runes.iter().collect::<String>())),
        Value::List(_) | Value::Object(_) => write_json_representation(value),
        Value::Record(record) => {
            let mut map = Map::new();
            for (key, entry) in record.entries() {
                map.insert(key.clone(), write_json_representation(entry)?);
            }
            Ok(Json::Object(map))
        }
        Value::Tuple(items) => {
            let mut array = Vec::with_capacity(items.len());
            for item in items.iter() {
                array.push(write_json_representation(item)?);
            }
            Ok(Json::Array(array))
        }
        Value::Dict(dict) => {
            let mut array = Vec::new();
            for (k, v) in dict.snapshot() {
                array.push(Json::Array(vec![
                    write_json_representation(&k)?,
                    write_json_representation(&v)?,
                ]));
            }
            Ok(Json::Array(array))
        }
        Value::OrderedPair(pair) => Ok(Json::Array(vec![
            write_json_representation(&pair.0)?,
            write_json_representation(&pair.1)?,
        ])),
        Value::IntRange(r) => Ok(json!({
            "start": r.start.to_string(),
            "end": r.end.to_string(),
        })),
        Value::FloatRange(r) => Ok(json!({
            "start": r.start,
            "end": r.end,
            "inclusiveEnd": r.inclusive_end,
        })),
        Value::RuneRange(r) => Ok(json!({
            "start": r.start.to_string(),
            "end": r.end.to_string(),
        })),
        Value::QuantityRange(r) => Ok(json!({
            "start": format!("{}ms", r.start.millis()),
            "end": format!("{}ms", r.end.millis()),
        })),
        Value::Some(inner) => Ok(json!({ "some": write_json_representation(inner)? })),
        Value::None => Ok(json!("none")),
        Value::Treedata(tree) => write_treedata(tree),
        Value::Pattern(_)
        | Value::Function(_)
        | Value::Namespace(_)
        | Value::Error(_)
        | Value::XmlElement(_)
        | Value::Struct(_)
        | Value::StructPointer(_) => Err(JsonReprError::NotSerializable {
            type_name: value.type_name(),
        }),
    }
}

fn write_treedata(tree: &Treedata) -> Result<Json, JsonReprError> {
    fn write_node(node: &TreedataNode) -> Result<Json, JsonReprError> {
        let children = node
            .children
            .iter()
            .map(write_node)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(json!({
            "value": write_json_representation(&node.value)?,
            "children": children,
        }))
    }
    let children = tree
        .children
        .iter()
        .map(write_node)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({
        "root": write_json_representation(&tree.root)?,
        "children": children,
    }))
}

// Parsing

/// Parse a JSON document into a value, driven by an optional pattern.
pub fn parse_json_representation(
    json: &str,
    pattern: Option<&Pattern>,
) -> Result<Value, JsonReprError> {
    let parsed: Json =
        serde_json::from_str(json).map_err(|e| JsonReprError::InvalidJson(e.to_string()))?;
    parse_value(&parsed, pattern)
}

fn parse_value(json: &Json, pattern: Option<&Pattern>) -> Result<Value, JsonReprError> {
    let Some(pattern) = pattern else {
        return parse_untyped(json);
    };
    match pattern {
        Pattern::Any => parse_untyped(json),
        Pattern::Named(named) => parse_value(json, Some(&named.target)),
        Pattern::Type(type_name) => parse_typed(type_name, json),
        Pattern::Exact(expected) => {
            let value = parse_untyped(json)?;
            if crate::equality::values_equal(expected, &value) {
                Ok(value)
            } else {
                Err(mismatch(format!("expected exactly {expected:?}")))
            }
        }
        Pattern::ExactStr(expected) => match json.as_str() {
            Some(s) if s == &**expected => Ok(Value::string(s)),
            _ => Err(mismatch(format!("expected the string {expected:?}"))),
        },
        Pattern::Union(members) => {
            for member in members.iter() {
                if let Ok(value) = parse_value(json, Some(member)) {
                    return Ok(value);
                }
            }
            Err(mismatch("no union member matched"))
        }
        Pattern::Difference(parts) => {
            let value = parse_value(json, Some(&parts.0))?;
            if parts.1.matches(&value) {
                Err(mismatch("value is excluded by the difference pattern"))
            } else {
                Ok(value)
            }
        }
        Pattern::List(list_pattern) => {
            let array = json
                .as_array()
                .ok_or_else(|| mismatch("expected a JSON array"))?;
            let mut items = Vec::with_capacity(array.len());
            if let Some(elements) = &list_pattern.elements {
                if elements.len() != array.len() {
                    return Err(mismatch(format!(
                        "expected {} elements, got {}",
                        elements.len(),
                        array.len()
                    )));
                }
                for (element, member) in array.iter().zip(elements.iter()) {
                    items.push(parse_value(element, Some(member))?);
                }
            } else {
                for element in array {
                    items.push(parse_value(element, list_pattern.general.as_ref())?);
                }
            }
            Ok(Value::list(items))
        }
        Pattern::Tuple(elements) => {
            let array = json
                .as_array()
                .ok_or_else(|| mismatch("expected a JSON array"))?;
            if array.len() != elements.len() {
                return Err(mismatch("tuple arity mismatch"));
            }
            let mut items = Vec::with_capacity(array.len());
            for (element, member) in array.iter().zip(elements.iter()) {
                items.push(parse_value(element, Some(member))?);
            }
            Ok(Value::tuple(items))
        }
        Pattern::Object(object_pattern) | Pattern::Record(object_pattern) => {
            let map = json
                .as_object()
                .ok_or_else(|| mismatch("expected a JSON object"))?;
            let mut entries = Vec::with_capacity(map.len());
            for entry in &object_pattern.entries {
                match map.get(&entry.name) {
                    Some(member) => {
                        entries.push((
                            entry.name.clone(),
                            parse_value(member, Some(&entry.pattern))?,
                        ));
                    }
                    None if entry.optional => {}
                    None => {
                        return Err(mismatch(format!("missing entry `{}`", entry.name)));
                    }
                }
            }
            for (key, member) in map {
                if !object_pattern.entries.iter().any(|e| &e.name == key) {
                    if !object_pattern.inexact {
                        return Err(mismatch(format!("unexpected entry `{key}`")));
                    }
                    entries.push((key.clone(), parse_untyped(member)?));
                }
            }
            let build = if matches!(pattern, Pattern::Record(_)) {
                Value::record(entries)
            } else {
                Value::object(entries)
            };
            build.map_err(|e| mismatch(e.to_string()))
        }
        Pattern::IntRange { start, end } => {
            let n = parse_int(json)?;
            let in_range = start.is_none_or(|s| n >= s) && end.is_none_or(|e| n <= e);
            if in_range {
                Ok(Value::int(n))
            } else {
                Err(mismatch("integer outside the pattern's range"))
            }
        }
        Pattern::FloatRange { start, end } => {
            let f = json
                .as_f64()
                .ok_or_else(|| mismatch("expected a JSON number"))?;
            let in_range = start.is_none_or(|s| f >= s) && end.is_none_or(|e| f <= e);
            if in_range {
                Ok(Value::Float(f))
            } else {
                Err(mismatch("float outside the pattern's range"))
            }
        }
        Pattern::SequenceStr(_) | Pattern::Regex(_) | Pattern::FunctionSignature(_) => {
            Err(mismatch("pattern has no JSON-parsing form"))
        }
    }
}

/// Untyped parsing: JSON-native forms plus the wrapper convention.
fn parse_untyped(json: &Json) -> Result<Value, JsonReprError> {
    match json {
        Json::Null => Ok(Value::Nil),
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Number(n) => n
            .as_f64()
            .map(Value::Float)
            .ok_or_else(|| mismatch("unrepresentable JSON number")),
        Json::String(s) => Ok(Value::string(s.clone())),
        Json::Array(array) => {
            let mut items = Vec::with_capacity(array.len());
            for element in array {
                items.push(parse_untyped(element)?);
            }
            Ok(Value::list(items))
        }
        Json::Object(map) => {
            // Single-key wrapper objects carry an explicit type.
            if map.len() == 1 {
                if let Some((key, inner)) = map.iter().next() {
                    if let Some(type_name) = key.strip_suffix(WRAPPER_SUFFIX) {
                        return parse_typed(type_name, inner);
                    }
                }
            }
            let mut entries = Vec::with_capacity(map.len());
            for (key, member) in map {
                entries.push((key.clone(), parse_untyped(member)?));
            }
            Value::object(entries).map_err(|e| mismatch(e.to_string()))
        }
    }
}

fn parse_int(json: &Json) -> Result<i64, JsonReprError> {
    json.as_str()
        .ok_or_else(|| mismatch("expected an integer encoded as a decimal string"))?
        .parse::<i64>()
        .map_err(|e| mismatch(format!("invalid integer: {e}")))
}

fn parse_duration(json: &Json) -> Result<Duration, JsonReprError> {
    let s = json
        .as_str()
        .ok_or_else(|| mismatch("expected a duration string"))?;
    if let Some(ms) = s.strip_suffix("ms") {
        let ms: u64 = ms
            .parse()
            .map_err(|_| mismatch("invalid duration millisecond count"))?;
        return Ok(Duration::from_millis(ms));
    }
    if let Some(secs) = s.strip_suffix('s') {
        let secs: u64 = secs
            .parse()
            .map_err(|_| mismatch("invalid duration second count"))?;
        let ms = secs
            .checked_mul(1000)
            .ok_or_else(|| mismatch("duration is too large"))?;
        return Ok(Duration::from_millis(ms));
    }
    Err(mismatch("invalid duration shape"))
}

/// Parsing of wrapped (explicitly typed) representations.
fn parse_typed(type_name: &str, json: &Json) -> Result<Value, JsonReprError> {
    match type_name {
        "nil" => Ok(Value::Nil),
        "bool" => json
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| mismatch("expected a JSON boolean")),
        "float" => json
            .as_f64()
            .map(Value::Float)
            .ok_or_else(|| mismatch("expected a JSON number")),
        "string" => json
            .as_str()
            .map(Value::string)
            .ok_or_else(|| mismatch("expected a JSON string")),
        "int" => parse_int(json).map(Value::int),
        "duration" => parse_duration(json).map(Value::Duration),
        "datetime" => {
            let ms: i64 = json
                .as_str()
                .ok_or_else(|| mismatch("expected a datetime string"))?
                .parse()
                .map_err(|_| mismatch("invalid datetime"))?;
            Ok(Value::DateTime(DateTime::from_unix_millis(ms)))
        }
        "byte" => {
            let n = json
                .as_u64()
                .ok_or_else(|| mismatch("expected a byte number"))?;
            u8::try_from(n)
                .map(Value::Byte)
                .map_err(|_| mismatch("byte out of range"))
        }
        "rune" => {
            let s = json
                .as_str()
                .ok_or_else(|| mismatch("expected a rune string"))?;
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), Option::None) => Ok(Value::Rune(c)),
                _ => Err(mismatch("expected a single-character string")),
            }
        }
        "ulid" => {
            let s = json
                .as_str()
                .ok_or_else(|| mismatch("expected a ULID string"))?;
            s.parse::<ulid::Ulid>()
                .map(Value::Ulid)
                .map_err(|e| mismatch(format!("invalid ULID: {e}")))
        }
        "uuid" => {
            let s = json
                .as_str()
                .ok_or_else(|| mismatch("expected a UUID string"))?;
            s.parse::<uuid::Uuid>()
                .map(Value::Uuid)
                .map_err(|e| mismatch(format!("invalid UUID: {e}")))
        }
        "path" => expect_string(json).map(Value::path),
        "path-pattern" => expect_string(json).map(Value::path_pattern),
        "url" => expect_string(json).map(Value::url),
        "url-pattern" => expect_string(json).map(Value::url_pattern),
        "host" => expect_string(json).map(Value::host),
        "host-pattern" => expect_string(json).map(Value::host_pattern),
        "scheme" => expect_string(json).map(Value::scheme),
        "property-name" => expect_string(json).map(Value::property_name),
        "identifier" => expect_string(json).map(Value::identifier),
        "byte-slice" => {
            let hex = expect_string(json)?;
            if hex.len() % 2 != 0 {
                return Err(mismatch("odd-length hex byte slice"));
            }
            let mut bytes = Vec::with_capacity(hex.len() / 2);
            for i in (0..hex.len()).step_by(2) {
                let byte = u8::from_str_radix(&hex[i..i + 2], 16)
                    .map_err(|_| mismatch("invalid hex byte"))?;
                bytes.push(byte);
            }
            Ok(Value::byte_slice(bytes))
        }
        "rune-slice" => Ok(Value::rune_slice(expect_string(json)?.chars().collect())),
        "record" => {
            let map = json
                .as_object()
                .ok_or_else(|| mismatch("expected a JSON object"))?;
            let mut entries = Vec::with_capacity(map.len());
            for (key, member) in map {
                entries.push((key.clone(), parse_untyped(member)?));
            }
            Value::record(entries).map_err(|e| mismatch(e.to_string()))
        }
        "tuple" => {
            let array = json
                .as_array()
                .ok_or_else(|| mismatch("expected a JSON array"))?;
            let mut items = Vec::with_capacity(array.len());
            for element in array {
                items.push(parse_untyped(element)?);
            }
            Ok(Value::tuple(items))
        }
        "dictionary" => {
            let array = json
                .as_array()
                .ok_or_else(|| mismatch("expected a JSON array of pairs"))?;
            let mut entries = Vec::with_capacity(array.len());
            for element in array {
                let pair = element
                    .as_array()
                    .filter(|p| p.len() == 2)
                    .ok_or_else(|| mismatch("expected [key, value] pairs"))?;
                entries.push((parse_untyped(&pair[0])?, parse_untyped(&pair[1])?));
            }
            Ok(Value::dict(entries))
        }
        "ordered-pair" => {
            let array = json
                .as_array()
                .filter(|p| p.len() == 2)
                .ok_or_else(|| mismatch("expected a two-element array"))?;
            Ok(Value::ordered_pair(
                parse_untyped(&array[0])?,
                parse_untyped(&array[1])?,
            ))
        }
        "int-range" => {
            let map = json
                .as_object()
                .ok_or_else(|| mismatch("expected a range object"))?;
            let start = parse_int(map.get("start").unwrap_or(&Json::Null))?;
            let end = parse_int(map.get("end").unwrap_or(&Json::Null))?;
            Ok(Value::IntRange(IntRange::new(start, end)))
        }
        "float-range" => {
            let map = json
                .as_object()
                .ok_or_else(|| mismatch("expected a range object"))?;
            let start = map
                .get("start")
                .and_then(Json::as_f64)
                .ok_or_else(|| mismatch("missing range start"))?;
            let end = map
                .get("end")
                .and_then(Json::as_f64)
                .ok_or_else(|| mismatch("missing range end"))?;
            let inclusive_end = map
                .get("inclusiveEnd")
                .and_then(Json::as_bool)
                .unwrap_or(true);
            Ok(Value::FloatRange(FloatRange {
                start,
                end,
                inclusive_end,
            }))
        }
        "rune-range" => {
            let map = json
                .as_object()
                .ok_or_else(|| mismatch("expected a range object"))?;
            let get_char = |key: &str| -> Result<char, JsonReprError> {
                let s = map
                    .get(key)
                    .and_then(Json::as_str)
                    .ok_or_else(|| mismatch("missing range bound"))?;
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), Option::None) => Ok(c),
                    _ => Err(mismatch("range bound must be a single character")),
                }
            };
            Ok(Value::RuneRange(RuneRange {
                start: get_char("start")?,
                end: get_char("end")?,
            }))
        }
        "quantity-range" => {
            let map = json
                .as_object()
                .ok_or_else(|| mismatch("expected a range object"))?;
            let start = parse_duration(map.get("start").unwrap_or(&Json::Null))?;
            let end = parse_duration(map.get("end").unwrap_or(&Json::Null))?;
            Ok(Value::QuantityRange(QuantityRange { start, end }))
        }
        "option" => {
            if json.as_str() == Some("none") {
                return Ok(Value::None);
            }
            let map = json
                .as_object()
                .ok_or_else(|| mismatch("expected an option object"))?;
            let inner = map
                .get("some")
                .ok_or_else(|| mismatch("expected a `some` entry"))?;
            Ok(Value::some(parse_untyped(inner)?))
        }
        "treedata" => {
            fn parse_node(json: &Json) -> Result<TreedataNode, JsonReprError> {
                let map = json
                    .as_object()
                    .ok_or_else(|| mismatch("expected a treedata node"))?;
                let value = parse_untyped(
                    map.get("value")
                        .ok_or_else(|| mismatch("missing node value"))?,
                )?;
                let children = map
                    .get("children")
                    .and_then(Json::as_array)
                    .map(|nodes| nodes.iter().map(parse_node).collect::<Result<Vec<_>, _>>())
                    .transpose()?
                    .unwrap_or_default();
                Ok(TreedataNode { value, children })
            }
            let map = json
                .as_object()
                .ok_or_else(|| mismatch("expected a treedata object"))?;
            let root = parse_untyped(
                map.get("root")
                    .ok_or_else(|| mismatch("missing treedata root"))?,
            )?;
            let children = map
                .get("children")
                .and_then(Json::as_array)
                .map(|nodes| nodes.iter().map(parse_node).collect::<Result<Vec<_>, _>>())
                .transpose()?
                .unwrap_or_default();
            Ok(Value::treedata(Treedata { root, children }))
        }
        other => Err(mismatch(format!("unknown representation type `{other}`"))),
    }
}

fn expect_string(json: &Json) -> Result<String, JsonReprError> {
    json.as_str()
        .map(str::to_owned)
        .ok_or_else(|| mismatch("expected a JSON string"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn round_trip(value: &Value) {
        let json = write_json_string(value).expect("serializable");
        let parsed = parse_json_representation(&json, Option::None).expect("parse");
        assert_eq!(&parsed, value, "round-trip failed for {json}");
    }

    #[test]
    fn int_round_trips_as_decimal_string() {
        let json = write_json_string(&Value::int(i64::MAX)).unwrap();
        assert_eq!(json, format!("{{\"int__value\":\"{}\"}}", i64::MAX));
        round_trip(&Value::int(i64::MAX));
    }

    #[test]
    fn native_forms_round_trip() {
        round_trip(&Value::Nil);
        round_trip(&Value::Bool(true));
        round_trip(&Value::Float(1.5));
        round_trip(&Value::string("hello"));
        round_trip(&Value::list(vec![Value::int(1), Value::string("x")]));
    }

    #[test]
    fn wrapped_forms_round_trip() {
        round_trip(&Value::path("/tmp/x"));
        round_trip(&Value::url("https://example.com/a"));
        round_trip(&Value::host("https://example.com"));
        round_trip(&Value::Duration(Duration::from_millis(1500)));
        round_trip(&Value::Byte(0xfe));
        round_trip(&Value::Rune('é'));
        round_trip(&Value::byte_slice(vec![0, 127, 255]));
        round_trip(&Value::tuple(vec![Value::int(1), Value::Nil]));
        round_trip(&Value::some(Value::int(3)));
        round_trip(&Value::None);
        round_trip(&Value::IntRange(IntRange::new(-1, 5)));
    }

    #[test]
    fn object_round_trips() {
        let object = Value::object(vec![
            ("a".into(), Value::int(1)),
            ("b".into(), Value::string("x")),
        ])
        .unwrap();
        round_trip(&object);
    }

    #[test]
    fn pattern_driven_int_parse() {
        let pattern = Pattern::of_type("int");
        let value = parse_json_representation("\"42\"", Some(&pattern)).unwrap();
        assert_eq!(value, Value::int(42));
    }

    #[test]
    fn pattern_rejects_wrong_shape() {
        let pattern = Pattern::of_type("int");
        assert!(parse_json_representation("42", Some(&pattern)).is_err());
    }

    #[test]
    fn functions_are_not_serializable() {
        let err = write_json_string(&Value::Pattern(Pattern::Any)).unwrap_err();
        assert!(matches!(err, JsonReprError::NotSerializable { .. }));
    }

    mod round_trip_law {
        use super::*;
        use proptest::prelude::*;

        fn leaf() -> impl Strategy<Value = Value> {
            prop_oneof![
                Just(Value::Nil),
                any::<bool>().prop_map(Value::Bool),
                any::<i64>().prop_map(Value::int),
                // Finite floats only; NaN is never equal to itself.
                any::<f64>()
                    .prop_filter("finite", |f| f.is_finite())
                    .prop_map(Value::Float),
                "[a-z0-9 ]{0,12}".prop_map(Value::string),
                "/[a-z0-9/]{0,12}".prop_map(Value::path),
                any::<u64>().prop_map(|ms| Value::Duration(Duration::from_millis(ms))),
                any::<u8>().prop_map(Value::Byte),
            ]
        }

        fn tree() -> impl Strategy<Value = Value> {
            leaf().prop_recursive(2, 16, 4, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..4).prop_map(Value::list),
                    prop::collection::vec(inner.clone(), 0..4).prop_map(Value::tuple),
                    prop::collection::vec(("[a-z]{1,6}", inner), 0..4).prop_map(|entries| {
                        let mut seen: Vec<(String, Value)> = Vec::new();
                        for (key, value) in entries {
                            if !seen.iter().any(|(k, _)| *k == key) {
                                seen.push((key, value));
                            }
                        }
                        Value::object(seen).expect("valid keys")
                    }),
                ]
            })
        }

        proptest! {
            // parseJSON ∘ writeJSON is the identity under value equality.
            #[test]
            fn parse_after_write_is_identity(value in tree()) {
                let json = write_json_string(&value).expect("serializable");
                let parsed =
                    parse_json_representation(&json, Option::None).expect("well-typed");
                prop_assert_eq!(parsed, value);
            }
        }
    }
}
