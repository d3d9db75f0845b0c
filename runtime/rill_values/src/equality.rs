//! Cycle-safe structural equality.
//!
//! Objects can form cycles (records cannot), so equality over the mutable
//! containers tracks visited identity pairs: when the same `(left, right)`
//! pair is reached again the comparison is already in progress and the pair
//! is treated as equal, which terminates cyclic comparisons.

use rustc_hash::FxHashSet;

use crate::Value;

type VisitedPairs = FxHashSet<(usize, usize)>;

/// Structural equality between two values.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    let mut visited = VisitedPairs::default();
    equal_inner(a, b, &mut visited)
}

fn equal_inner(a: &Value, b: &Value, visited: &mut VisitedPairs) -> bool {
    match (a, b) {
        (Value::Nil, Value::Nil) | (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Duration(x), Value::Duration(y)) => x == y,
        (Value::DateTime(x), Value::DateTime(y)) => x == y,
        (Value::Byte(x), Value::Byte(y)) => x == y,
        (Value::Rune(x), Value::Rune(y)) => x == y,
        (Value::Ulid(x), Value::Ulid(y)) => x == y,
        (Value::Uuid(x), Value::Uuid(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Path(x), Value::Path(y))
        | (Value::PathPattern(x), Value::PathPattern(y))
        | (Value::Url(x), Value::Url(y))
        | (Value::UrlPattern(x), Value::UrlPattern(y))
        | (Value::Host(x), Value::Host(y))
        | (Value::HostPattern(x), Value::HostPattern(y))
        | (Value::Scheme(x), Value::Scheme(y))
        | (Value::PropertyName(x), Value::PropertyName(y))
        | (Value::Identifier(x), Value::Identifier(y)) => x == y,
        (Value::ByteSlice(x), Value::ByteSlice(y)) => x == y,
        (Value::RuneSlice(x), Value::RuneSlice(y)) => x == y,
        (Value::IntRange(x), Value::IntRange(y)) => x == y,
        (Value::FloatRange(x), Value::FloatRange(y)) => x == y,
        (Value::RuneRange(x), Value::RuneRange(y)) => x == y,
        (Value::QuantityRange(x), Value::QuantityRange(y)) => x == y,
        (Value::Some(x), Value::Some(y)) => equal_inner(x, y, visited),
        (Value::OrderedPair(x), Value::OrderedPair(y)) => {
            equal_inner(&x.0, &y.0, visited) && equal_inner(&x.1, &y.1, visited)
        }
        (Value::Tuple(x), Value::Tuple(y)) => slice_equal(x, y, visited),
        (Value::List(x), Value::List(y)) => {
            if x.same(y) {
                return true;
            }
            if !visited.insert((x.addr(), y.addr())) {
                return true;
            }
            let xs = x.snapshot();
            let ys = y.snapshot();
            slice_equal(&xs, &ys, visited)
        }
        (Value::Object(x), Value::Object(y)) => {
            if x.same(y) {
                return true;
            }
            if !visited.insert((x.addr(), y.addr())) {
                return true;
            }
            let xs = x.entries();
            let ys = y.entries();
            if xs.len() != ys.len() {
                return false;
            }
            xs.iter().all(|(key, value)| {
                ys.iter()
                    .find(|(other_key, _)| other_key == key)
                    .is_some_and(|(_, other)| equal_inner(value, other, visited))
            })
        }
        (Value::Record(x), Value::Record(y)) => {
            let xs = x.entries();
            let ys = y.entries();
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys.iter())
                    .all(|((k1, v1), (k2, v2))| k1 == k2 && equal_inner(v1, v2, visited))
        }
        (Value::Dict(x), Value::Dict(y)) => {
            if x.same(y) {
                return true;
            }
            if !visited.insert((x.addr(), y.addr())) {
                return true;
            }
            let xs = x.snapshot();
            if xs.len() != y.len() {
                return false;
            }
            xs.iter()
                .all(|(k, v)| y.get(k).is_some_and(|other| equal_inner(v, &other, visited)))
        }
        (Value::Namespace(x), Value::Namespace(y)) => {
            x.len() == y.len()
                && x.iter().all(|(k, v)| {
                    y.get(k)
                        .is_some_and(|other| equal_inner(v, other, visited))
                })
        }
        (Value::Error(x), Value::Error(y)) => x.id == y.id && x.message == y.message,
        (Value::Function(x), Value::Function(y)) => x.same(y),
        (Value::Pattern(x), Value::Pattern(y)) => x.same_shape(y),
        (Value::Treedata(x), Value::Treedata(y)) => x == y,
        (Value::XmlElement(x), Value::XmlElement(y)) => x == y,
        (Value::Struct(x), Value::Struct(y)) => {
            x.layout.type_name == y.layout.type_name && slice_equal(&x.fields, &y.fields, visited)
        }
        (Value::StructPointer(x), Value::StructPointer(y)) => {
            if x.addr() == y.addr() {
                return true;
            }
            if !visited.insert((x.addr(), y.addr())) {
                return true;
            }
            let xv = x.read();
            let yv = y.read();
            xv.layout.type_name == yv.layout.type_name
                && slice_equal(&xv.fields, &yv.fields, visited)
        }
        _ => false,
    }
}

fn slice_equal(xs: &[Value], ys: &[Value], visited: &mut VisitedPairs) -> bool {
    xs.len() == ys.len()
        && xs
            .iter()
            .zip(ys.iter())
            .all(|(x, y)| equal_inner(x, y, visited))
}
