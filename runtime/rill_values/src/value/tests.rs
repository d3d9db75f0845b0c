#![allow(clippy::unwrap_used, clippy::expect_used)]

use pretty_assertions::assert_eq;

use super::*;

#[test]
fn factory_methods() {
    let s = Value::string("hello");
    assert_eq!(s.as_str(), Option::Some("hello"));

    let list = Value::list(vec![Value::int(1), Value::int(2)]);
    let Value::List(inner) = &list else {
        panic!("list expected")
    };
    assert_eq!(inner.len(), 2);

    let opt = Value::some(Value::int(42));
    match opt {
        Value::Some(v) => assert_eq!(*v, Value::int(42)),
        _ => panic!("expected some"),
    }
}

#[test]
fn type_names_are_stable() {
    assert_eq!(Value::Nil.type_name(), "nil");
    assert_eq!(Value::int(1).type_name(), "int");
    assert_eq!(Value::path("/x").type_name(), "path");
    assert_eq!(Value::some(Value::Nil).type_name(), "option");
    assert_eq!(Value::None.type_name(), "option");
}

#[test]
fn display_forms() {
    assert_eq!(format!("{}", Value::int(42)), "42");
    assert_eq!(format!("{}", Value::Bool(true)), "true");
    assert_eq!(
        format!("{}", Value::list(vec![Value::int(1), Value::int(2)])),
        "[1, 2]"
    );
    assert_eq!(
        format!("{}", Value::Duration(Duration::from_millis(2000))),
        "2s"
    );
}

#[test]
fn equality_goes_through_structural_comparison() {
    assert_eq!(Value::string("a"), Value::string("a"));
    assert_ne!(Value::string("a"), Value::identifier("a"));
    assert_eq!(
        Value::tuple(vec![Value::int(1)]),
        Value::tuple(vec![Value::int(1)])
    );
}

#[test]
fn url_identity_from_object() {
    let object = Object::empty();
    object.set_url("ldb://main/users/0");
    assert_eq!(
        Value::Object(object).url_identity(),
        Option::Some("ldb://main/users/0".to_owned())
    );
}
