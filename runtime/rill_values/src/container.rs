//! The `Container` capability: containment tests and emptiness.
//!
//! Lists, tuples, objects, records and all ranges can answer "contains this
//! element?". Containment rule: when the candidate element carries a URL,
//! identity of URL decides; otherwise structural equality.

use crate::equality::values_equal;
use crate::Value;

/// Whether `value` is a container.
pub fn is_container(value: &Value) -> bool {
    matches!(
        value,
        Value::List(_)
            | Value::Tuple(_)
            | Value::Object(_)
            | Value::Record(_)
            | Value::IntRange(_)
            | Value::FloatRange(_)
            | Value::RuneRange(_)
            | Value::QuantityRange(_)
    )
}

/// Containment test. Returns `None` when `container` is not a container.
pub fn contains(container: &Value, element: &Value) -> Option<bool> {
    let found = match container {
        Value::List(list) => elements_contain(&list.snapshot(), element),
        Value::Tuple(items) => elements_contain(items, element),
        Value::Object(object) => {
            let entries = object.entries();
            let values: Vec<Value> = entries.into_iter().map(|(_, v)| v).collect();
            elements_contain(&values, element)
        }
        Value::Record(record) => {
            let values: Vec<Value> = record.entries().iter().map(|(_, v)| v.clone()).collect();
            elements_contain(&values, element)
        }
        Value::IntRange(range) => element.as_int().is_some_and(|n| range.contains(n)),
        Value::FloatRange(range) => element.as_float().is_some_and(|f| range.contains(f)),
        Value::RuneRange(range) => match element {
            Value::Rune(c) => range.contains(*c),
            _ => false,
        },
        Value::QuantityRange(range) => match element {
            Value::Duration(d) => range.contains(*d),
            _ => false,
        },
        _ => return None,
    };
    Some(found)
}

/// Emptiness test. Returns `None` when `value` is not a container.
pub fn is_empty(value: &Value) -> Option<bool> {
    match value {
        Value::List(list) => Some(list.is_empty()),
        Value::Tuple(items) => Some(items.is_empty()),
        Value::Object(object) => Some(object.is_empty()),
        Value::Record(record) => Some(record.is_empty()),
        Value::IntRange(range) => Some(range.is_empty()),
        Value::FloatRange(range) => Some(range.is_empty()),
        Value::RuneRange(range) => Some(range.is_empty()),
        Value::QuantityRange(range) => Some(range.is_empty()),
        _ => None,
    }
}

fn elements_contain(elements: &[Value], candidate: &Value) -> bool {
    // URL identity takes precedence over structural equality.
    if let Some(url) = candidate.url_identity() {
        return elements
            .iter()
            .any(|e| e.url_identity().as_deref() == Some(url.as_str()));
    }
    elements.iter().any(|e| values_equal(e, candidate))
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::value::IntRange;

    #[test]
    fn list_contains_structural() {
        let list = Value::list(vec![Value::int(1), Value::int(2)]);
        assert_eq!(contains(&list, &Value::int(2)), Some(true));
        assert_eq!(contains(&list, &Value::int(3)), Some(false));
    }

    #[test]
    fn ranges_contain_their_kind_only() {
        let range = Value::IntRange(IntRange::new(1, 5));
        assert_eq!(contains(&range, &Value::int(5)), Some(true));
        assert_eq!(contains(&range, &Value::string("5")), Some(false));
    }

    #[test]
    fn url_identity_wins_over_structure() {
        let a = crate::Object::empty();
        a.set_url("https://example.com/a");
        let b = crate::Object::empty();
        b.set_url("https://example.com/b");
        let list = Value::list(vec![Value::Object(a)]);

        // Structurally both objects are empty, but their URLs differ.
        assert_eq!(contains(&list, &Value::Object(b)), Some(false));
    }

    #[test]
    fn non_container_returns_none() {
        assert_eq!(contains(&Value::int(1), &Value::int(1)), None);
        assert_eq!(is_empty(&Value::Nil), None);
    }
}
