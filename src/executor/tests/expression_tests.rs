//! Tests for expression evaluation
//!
//! Precedence, operators, names, attributes and extensions

use maplit::hashmap;

use super::helpers::{eval, eval_in};
use crate::executor::errors::ErrorKind;
use crate::executor::types::Val;

#[test]
fn test_precedence() {
    let cases = hashmap! {
        "2 + 3 * 4" => Val::Int(14),
        "(2 + 3) * 4" => Val::Int(20),
        "-5 + 3" => Val::Int(-2),
        "2 ^ 3" => Val::Int(8),
        "2 ^ 3 ^ 2" => Val::Int(512),
        "-2 ^ 2" => Val::Int(-4),
        "10 - 4 - 3" => Val::Int(3),
        "5 - -3" => Val::Int(8),
    };
    for (text, expected) in cases {
        assert_eq!(eval(text).unwrap(), expected, "evaluating '{}'", text);
    }
}

#[test]
fn test_division() {
    assert_eq!(eval("8 / 2").unwrap(), Val::Int(4));
    assert_eq!(eval("7 / 2").unwrap(), Val::Float(3.5));

    let err = eval("1 / 0").unwrap_err();
    assert_eq!(err.kind, ErrorKind::DivisionByZero);
}

#[test]
fn test_integer_overflow_is_an_error() {
    let err = eval("9223372036854775807 + 1").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ArithmeticOverflow);
}

#[test]
fn test_comparison_and_logic() {
    assert_eq!(eval("1 < 2 and not 3 = 4").unwrap(), Val::Bool(true));
    assert_eq!(eval("2 >= 3 or 1 != 1").unwrap(), Val::Bool(false));
    assert_eq!(eval("2 = 2.0").unwrap(), Val::Bool(true));
}

#[test]
fn test_logic_requires_booleans() {
    let err = eval("1 and true").unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidType);
}

#[test]
fn test_string_concatenation() {
    assert_eq!(eval(r#""fee: " + 12"#).unwrap(), Val::str("fee: 12"));
}

#[test]
fn test_unknown_name_suggests_close_names() {
    let program = r#"{ "records": [ { "name": "amount", "fields": {} } ] }"#;
    let err = eval_in(program, "amout + 1").unwrap_err();
    assert_eq!(err.kind, ErrorKind::NameNotDefined);
    assert!(err.message.contains("amount"), "message: {}", err.message);
}

#[test]
fn test_extension_calls() {
    assert_eq!(eval("abs(-3) + max(1, 7, 2)").unwrap(), Val::Int(10));
    // Extensions without parameters are invoked by name alone
    assert_eq!(eval("pi > 3.14 and pi < 3.15").unwrap(), Val::Bool(true));
}

#[test]
fn test_extension_arity_is_checked() {
    let err = eval("abs(1, 2)").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ArgumentCount);
    assert!(err.message.contains("'abs'"));
}

#[test]
fn test_calling_a_value_is_an_error() {
    let program = r#"{ "records": [ { "name": "contract", "fields": { "amount": 1 } } ] }"#;
    let err = eval_in(program, "contract(1)").unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidType);
}

/* ===================== Attributes ===================== */

const CONTRACT: &str = r#"{
    "records": [
        {
            "name": "contract",
            "kind": "law",
            "fields": {
                "amount": 100,
                "party": { "name": "Ann", "age": 41 }
            }
        }
    ]
}"#;

#[test]
fn test_record_fields() {
    assert_eq!(eval_in(CONTRACT, "contract.amount * 2").unwrap(), Val::Int(200));
}

#[test]
fn test_attribute_chains() {
    assert_eq!(eval_in(CONTRACT, "contract.party.name").unwrap(), Val::str("Ann"));
    // `-` applies to the whole chain
    assert_eq!(eval_in(CONTRACT, "-contract.party.age").unwrap(), Val::Int(-41));
}

#[test]
fn test_missing_field() {
    let err = eval_in(CONTRACT, "contract.amont").unwrap_err();
    assert_eq!(err.kind, ErrorKind::FieldNotDefined);
    assert!(err.message.contains("law 'contract'"), "message: {}", err.message);
    assert!(err.message.contains("amount"), "message: {}", err.message);
}

#[test]
fn test_field_of_a_number() {
    let err = eval_in(CONTRACT, "contract.amount.value").unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidType);
}

#[test]
fn test_errors_carry_the_expression_location() {
    let err = eval("1 + true").unwrap_err();
    let location = err.location.expect("location attached");
    assert_eq!(location.text, "1 + true");
}
