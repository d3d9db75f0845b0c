//! Runtime patterns.
//!
//! A `Pattern` is the closed union used for type tests (`match`,
//! constrained objects, manifest parameters) and for driving JSON decoding
//! (see `crate::json`). Patterns are immutable and cheap to clone.

mod sequence;

use std::fmt;
use std::sync::Arc;

pub use sequence::{SequenceStrPattern, StrPatternElement};

use crate::equality::values_equal;
use crate::value::FunctionValue;
use crate::Value;

/// One entry of an object or record pattern.
#[derive(Clone, Debug)]
pub struct EntryPattern {
    pub name: String,
    pub pattern: Pattern,
    pub optional: bool,
}

/// Positional or uniform list pattern.
#[derive(Clone, Debug)]
pub struct ListPattern {
    /// Positional element patterns, when the length is fixed.
    pub elements: Option<Vec<Pattern>>,
    /// Uniform element pattern, when any length is accepted.
    pub general: Option<Pattern>,
}

/// Object pattern: named entries, some optional.
#[derive(Clone, Debug)]
pub struct ObjectPattern {
    pub entries: Vec<EntryPattern>,
    /// Inexact patterns tolerate extra keys.
    pub inexact: bool,
}

/// A pattern registered under a name (optionally inside a namespace).
#[derive(Debug)]
pub struct NamedPattern {
    pub name: String,
    pub namespace: Option<String>,
    pub target: Pattern,
}

/// Function-signature pattern: arity-based matching of function values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FnSignaturePattern {
    pub param_count: usize,
    pub variadic: bool,
}

/// The closed pattern union.
#[derive(Clone)]
pub enum Pattern {
    /// Matches any value.
    Any,
    /// Matches values of a named type (`Value::type_name`).
    Type(Arc<str>),
    /// Matches exactly one value (structural equality).
    Exact(Arc<Value>),
    /// Matches exactly one string.
    ExactStr(Arc<str>),
    /// Regex-like element sequence over strings.
    SequenceStr(Arc<SequenceStrPattern>),
    Union(Arc<Vec<Pattern>>),
    /// Matches `base` minus `removed`.
    Difference(Arc<(Pattern, Pattern)>),
    List(Arc<ListPattern>),
    Tuple(Arc<Vec<Pattern>>),
    Object(Arc<ObjectPattern>),
    Record(Arc<ObjectPattern>),
    Named(Arc<NamedPattern>),
    Regex(Arc<regex::Regex>),
    FunctionSignature(FnSignaturePattern),
    IntRange {
        start: Option<i64>,
        end: Option<i64>,
    },
    FloatRange {
        start: Option<f64>,
        end: Option<f64>,
    },
}

impl Pattern {
    pub fn exact(value: Value) -> Self {
        Pattern::Exact(Arc::new(value))
    }

    pub fn exact_str(s: impl Into<String>) -> Self {
        let s: String = s.into();
        Pattern::ExactStr(Arc::from(s.as_str()))
    }

    pub fn of_type(type_name: &str) -> Self {
        Pattern::Type(Arc::from(type_name))
    }

    pub fn union(members: Vec<Pattern>) -> Self {
        Pattern::Union(Arc::new(members))
    }

    pub fn difference(base: Pattern, removed: Pattern) -> Self {
        Pattern::Difference(Arc::new((base, removed)))
    }

    pub fn list(pattern: ListPattern) -> Self {
        Pattern::List(Arc::new(pattern))
    }

    pub fn tuple(elements: Vec<Pattern>) -> Self {
        Pattern::Tuple(Arc::new(elements))
    }

    pub fn object(pattern: ObjectPattern) -> Self {
        Pattern::Object(Arc::new(pattern))
    }

    pub fn record(pattern: ObjectPattern) -> Self {
        Pattern::Record(Arc::new(pattern))
    }

    pub fn named(name: impl Into<String>, target: Pattern) -> Self {
        Pattern::Named(Arc::new(NamedPattern {
            name: name.into(),
            namespace: None,
            target,
        }))
    }

    pub fn named_in(
        namespace: impl Into<String>,
        name: impl Into<String>,
        target: Pattern,
    ) -> Self {
        Pattern::Named(Arc::new(NamedPattern {
            name: name.into(),
            namespace: Some(namespace.into()),
            target,
        }))
    }

    /// Compile a regex pattern. The regex is anchored to the whole string.
    pub fn regex(source: &str) -> Result<Self, regex::Error> {
        let anchored = format!("^(?:{source})$");
        Ok(Pattern::Regex(Arc::new(regex::Regex::new(&anchored)?)))
    }

    /// Whether `value` matches this pattern.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Type(type_name) => value.type_name() == &**type_name,
            Pattern::Exact(expected) => values_equal(expected, value),
            Pattern::ExactStr(expected) => value.as_str() == Some(&**expected),
            Pattern::SequenceStr(seq) => value.as_str().is_some_and(|s| seq.matches(s)),
            Pattern::Union(members) => members.iter().any(|p| p.matches(value)),
            Pattern::Difference(parts) => parts.0.matches(value) && !parts.1.matches(value),
            Pattern::List(pattern) => match value {
                Value::List(list) => {
                    let items = list.snapshot();
                    list_matches(pattern, &items)
                }
                _ => false,
            },
            Pattern::Tuple(elements) => match value {
                Value::Tuple(items) => {
                    items.len() == elements.len()
                        && elements.iter().zip(items.iter()).all(|(p, v)| p.matches(v))
                }
                _ => false,
            },
            Pattern::Object(pattern) => match value {
                Value::Object(object) => entries_match(pattern, &object.entries()),
                _ => false,
            },
            Pattern::Record(pattern) => match value {
                Value::Record(record) => entries_match(pattern, record.entries()),
                _ => false,
            },
            Pattern::Named(named) => named.target.matches(value),
            Pattern::Regex(re) => value.as_str().is_some_and(|s| re.is_match(s)),
            Pattern::FunctionSignature(sig) => match value {
                // Script arity lives on the definition node; only host
                // functions expose a parameter count to check here.
                Value::Function(FunctionValue::Host(host)) => {
                    sig.variadic || host.required_params <= sig.param_count
                }
                Value::Function(FunctionValue::Script(_)) => true,
                _ => false,
            },
            Pattern::IntRange { start, end } => value.as_int().is_some_and(|n| {
                start.is_none_or(|s| n >= s) && end.is_none_or(|e| n <= e)
            }),
            Pattern::FloatRange { start, end } => value.as_float().is_some_and(|f| {
                start.is_none_or(|s| f >= s) && end.is_none_or(|e| f <= e)
            }),
        }
    }

    /// Whether the pattern also has a JSON-parsing form.
    pub fn can_parse_json(&self) -> bool {
        !matches!(
            self,
            Pattern::FunctionSignature(_) | Pattern::Regex(_) | Pattern::SequenceStr(_)
        )
    }

    /// Parse a JSON document driven by this pattern.
    pub fn parse_json(&self, json: &str) -> Result<Value, crate::json::JsonReprError> {
        crate::json::parse_json_representation(json, Some(self))
    }

    /// Shallow shape identity, used by value equality for pattern values.
    pub fn same_shape(&self, other: &Pattern) -> bool {
        match (self, other) {
            (Pattern::Any, Pattern::Any) => true,
            (Pattern::Type(a), Pattern::Type(b)) => a == b,
            (Pattern::Exact(a), Pattern::Exact(b)) => values_equal(a, b),
            (Pattern::ExactStr(a), Pattern::ExactStr(b)) => a == b,
            (Pattern::SequenceStr(a), Pattern::SequenceStr(b)) => Arc::ptr_eq(a, b),
            (Pattern::Union(a), Pattern::Union(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.same_shape(y))
            }
            (Pattern::Difference(a), Pattern::Difference(b)) => {
                a.0.same_shape(&b.0) && a.1.same_shape(&b.1)
            }
            (Pattern::List(a), Pattern::List(b)) => Arc::ptr_eq(a, b),
            (Pattern::Tuple(a), Pattern::Tuple(b)) => Arc::ptr_eq(a, b),
            (Pattern::Object(a), Pattern::Object(b)) | (Pattern::Record(a), Pattern::Record(b)) => {
                Arc::ptr_eq(a, b)
            }
            (Pattern::Named(a), Pattern::Named(b)) => a.name == b.name && a.namespace == b.namespace,
            (Pattern::Regex(a), Pattern::Regex(b)) => a.as_str() == b.as_str(),
            (Pattern::FunctionSignature(a), Pattern::FunctionSignature(b)) => a == b,
            (
                Pattern::IntRange { start: s1, end: e1 },
                Pattern::IntRange { start: s2, end: e2 },
            ) => s1 == s2 && e1 == e2,
            (
                Pattern::FloatRange { start: s1, end: e1 },
                Pattern::FloatRange { start: s2, end: e2 },
            ) => s1 == s2 && e1 == e2,
            _ => false,
        }
    }
}

fn list_matches(pattern: &ListPattern, items: &[Value]) -> bool {
    if let Some(elements) = &pattern.elements {
        if items.len() != elements.len() {
            return false;
        }
        return elements.iter().zip(items.iter()).all(|(p, v)| p.matches(v));
    }
    if let Some(general) = &pattern.general {
        return items.iter().all(|v| general.matches(v));
    }
    true
}

fn entries_match(pattern: &ObjectPattern, entries: &[(String, Value)]) -> bool {
    for entry_pattern in &pattern.entries {
        match entries.iter().find(|(k, _)| *k == entry_pattern.name) {
            Some((_, value)) => {
                if !entry_pattern.pattern.matches(value) {
                    return false;
                }
            }
            None => {
                if !entry_pattern.optional {
                    return false;
                }
            }
        }
    }
    if !pattern.inexact {
        // Exact patterns reject keys the pattern does not name.
        for (key, _) in entries {
            if !pattern.entries.iter().any(|e| e.name == *key) {
                return false;
            }
        }
    }
    true
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Any => write!(f, "any"),
            Pattern::Type(t) => write!(f, "%{t}"),
            Pattern::Exact(v) => write!(f, "%exact({v:?})"),
            Pattern::ExactStr(s) => write!(f, "%str({s:?})"),
            Pattern::SequenceStr(_) => write!(f, "%str-sequence"),
            Pattern::Union(members) => write!(f, "%union({} members)", members.len()),
            Pattern::Difference(_) => write!(f, "%difference"),
            Pattern::List(_) => write!(f, "%list-pattern"),
            Pattern::Tuple(elements) => write!(f, "%tuple-pattern({})", elements.len()),
            Pattern::Object(_) => write!(f, "%object-pattern"),
            Pattern::Record(_) => write!(f, "%record-pattern"),
            Pattern::Named(n) => match &n.namespace {
                Some(ns) => write!(f, "%{ns}.{}", n.name),
                None => write!(f, "%{}", n.name),
            },
            Pattern::Regex(re) => write!(f, "%`{}`", re.as_str()),
            Pattern::FunctionSignature(sig) => write!(f, "%fn/{}", sig.param_count),
            Pattern::IntRange { start, end } => write!(f, "%int({start:?}..{end:?})"),
            Pattern::FloatRange { start, end } => write!(f, "%float({start:?}..{end:?})"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn type_pattern_matches_by_type_name() {
        assert!(Pattern::of_type("int").matches(&Value::int(3)));
        assert!(!Pattern::of_type("int").matches(&Value::string("3")));
    }

    #[test]
    fn union_matches_any_member() {
        let p = Pattern::union(vec![Pattern::of_type("int"), Pattern::of_type("string")]);
        assert!(p.matches(&Value::int(1)));
        assert!(p.matches(&Value::string("x")));
        assert!(!p.matches(&Value::Bool(true)));
    }

    #[test]
    fn difference_subtracts() {
        let p = Pattern::difference(Pattern::of_type("int"), Pattern::exact(Value::int(0)));
        assert!(p.matches(&Value::int(1)));
        assert!(!p.matches(&Value::int(0)));
    }

    #[test]
    fn object_pattern_optional_entries() {
        let p = Pattern::object(ObjectPattern {
            entries: vec![
                EntryPattern {
                    name: "a".into(),
                    pattern: Pattern::of_type("int"),
                    optional: false,
                },
                EntryPattern {
                    name: "b".into(),
                    pattern: Pattern::of_type("int"),
                    optional: true,
                },
            ],
            inexact: false,
        });
        let with_a = Value::object(vec![("a".into(), Value::int(1))]).unwrap();
        let with_extra = Value::object(vec![
            ("a".into(), Value::int(1)),
            ("c".into(), Value::int(3)),
        ])
        .unwrap();
        assert!(p.matches(&with_a));
        assert!(!p.matches(&with_extra));
    }

    #[test]
    fn int_range_pattern_bounds() {
        let p = Pattern::IntRange {
            start: Some(0),
            end: Some(10),
        };
        assert!(p.matches(&Value::int(10)));
        assert!(!p.matches(&Value::int(11)));
    }

    #[test]
    fn regex_pattern_is_anchored() {
        let p = Pattern::regex("[a-z]+").expect("valid regex");
        assert!(p.matches(&Value::string("abc")));
        assert!(!p.matches(&Value::string("abc1")));
    }
}
