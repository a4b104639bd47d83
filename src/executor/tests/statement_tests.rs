//! Tests for statements: declarations, scoping, conditionals and loops

use super::helpers::{lines, run_err, run_ok, run_program};
use crate::executor::errors::ErrorKind;
use crate::executor::types::{Flow, Val};

#[test]
fn test_declare_and_print() {
    let program = r#"{
        "main": [
            { "t": "Declare", "name": "fee", "value": "40 + 2" },
            { "t": "Print", "value": "fee" },
            { "t": "Print", "value": "\"due: \" + fee" }
        ]
    }"#;
    assert_eq!(run_ok(program), lines(&["42", "due: 42"]));
}

#[test]
fn test_duplicate_declaration() {
    let program = r#"{
        "main": [
            { "t": "Declare", "name": "x", "value": "1" },
            { "t": "Declare", "name": "x", "value": "2" }
        ]
    }"#;
    let err = run_err(program);
    assert_eq!(err.kind, ErrorKind::DuplicateName);
    assert_eq!(err.location.map(|l| l.file), Some("test.law".to_string()));
}

#[test]
fn test_assign_requires_a_declaration() {
    let program = r#"{ "main": [ { "t": "Assign", "target": "total", "value": "1" } ] }"#;
    let err = run_err(program);
    assert_eq!(err.kind, ErrorKind::NameNotDefined);
}

#[test]
fn test_blocks_shadow_and_assign_outer_names() {
    // Declaring in a block shadows; assigning reaches the declaring scope
    let program = r#"{
        "main": [
            { "t": "Declare", "name": "x", "value": "1" },
            { "t": "Declare", "name": "y", "value": "1" },
            { "t": "If", "branches": [ { "test": "true", "body": [
                { "t": "Declare", "name": "x", "value": "2" },
                { "t": "Assign", "target": "y", "value": "5" },
                { "t": "Print", "value": "x" }
            ] } ] },
            { "t": "Print", "value": "x" },
            { "t": "Print", "value": "y" }
        ]
    }"#;
    assert_eq!(run_ok(program), lines(&["2", "1", "5"]));
}

#[test]
fn test_block_names_do_not_leak() {
    let program = r#"{
        "main": [
            { "t": "If", "branches": [ { "test": "true", "body": [
                { "t": "Declare", "name": "inner", "value": "1" }
            ] } ] },
            { "t": "Print", "value": "inner" }
        ]
    }"#;
    let err = run_err(program);
    assert_eq!(err.kind, ErrorKind::NameNotDefined);
}

#[test]
fn test_if_else_when_chain() {
    let program = r#"{
        "procedures": [
            {
                "name": "grade",
                "params": ["points"],
                "body": [
                    { "t": "If",
                      "branches": [
                          { "test": "points > 10", "body": [ { "t": "Return", "value": "\"high\"" } ] },
                          { "test": "points > 5", "body": [ { "t": "Return", "value": "\"mid\"" } ] }
                      ],
                      "otherwise": [ { "t": "Return", "value": "\"low\"" } ]
                    }
                ]
            }
        ],
        "main": [
            { "t": "Print", "value": "grade(11)" },
            { "t": "Print", "value": "grade(6)" },
            { "t": "Print", "value": "grade(5)" }
        ]
    }"#;
    assert_eq!(run_ok(program), lines(&["high", "mid", "low"]));
}

#[test]
fn test_condition_must_be_boolean() {
    let program = r#"{
        "main": [ { "t": "If", "branches": [ { "test": "1", "body": [] } ] } ]
    }"#;
    let err = run_err(program);
    assert_eq!(err.kind, ErrorKind::InvalidType);
}

#[test]
fn test_while_with_break_and_continue() {
    let program = r#"{
        "main": [
            { "t": "Declare", "name": "i", "value": "0" },
            { "t": "While", "test": "true", "body": [
                { "t": "Assign", "target": "i", "value": "i + 1" },
                { "t": "If", "branches": [ { "test": "i = 3", "body": [ { "t": "Continue" } ] } ] },
                { "t": "If", "branches": [ { "test": "i > 5", "body": [ { "t": "Break" } ] } ] },
                { "t": "Print", "value": "i" }
            ] },
            { "t": "Print", "value": "\"done at \" + i" }
        ]
    }"#;
    assert_eq!(run_ok(program), lines(&["1", "2", "4", "5", "done at 6"]));
}

#[test]
fn test_repeat_sums_a_large_range() {
    let program = r#"{
        "main": [
            { "t": "Declare", "name": "total", "value": "0" },
            { "t": "Repeat", "var": "i", "from": "1", "to": "1000000", "body": [
                { "t": "Assign", "target": "total", "value": "total + i" }
            ] },
            { "t": "Print", "value": "total" }
        ]
    }"#;
    assert_eq!(run_ok(program), lines(&["500000500000"]));
}

#[test]
fn test_repeat_bounds() {
    // Whole floats are accepted, empty ranges run zero times
    let program = r#"{
        "main": [
            { "t": "Repeat", "var": "i", "from": "1", "to": "3.0", "body": [
                { "t": "Print", "value": "i" }
            ] },
            { "t": "Repeat", "from": "5", "to": "1", "body": [
                { "t": "Print", "value": "\"never\"" }
            ] }
        ]
    }"#;
    assert_eq!(run_ok(program), lines(&["1", "2", "3"]));

    let program = r#"{
        "main": [ { "t": "Repeat", "from": "1", "to": "2.5", "body": [] } ]
    }"#;
    assert_eq!(run_err(program).kind, ErrorKind::InvalidType);
}

#[test]
fn test_loop_variable_is_fresh_per_iteration() {
    let program = r#"{
        "main": [
            { "t": "Repeat", "var": "i", "from": "1", "to": "2", "body": [
                { "t": "Declare", "name": "twice", "value": "i * 2" },
                { "t": "Print", "value": "twice" }
            ] }
        ]
    }"#;
    assert_eq!(run_ok(program), lines(&["2", "4"]));
}

#[test]
fn test_top_level_flow() {
    let (flow, output) = run_program(
        r#"{ "main": [ { "t": "Print", "value": "1" }, { "t": "Return", "value": "42" }, { "t": "Print", "value": "2" } ] }"#,
    );
    assert_eq!(flow.unwrap(), Flow::Return(Val::Int(42)));
    assert_eq!(output, lines(&["1"]));

    let (flow, _) = run_program(r#"{ "main": [ { "t": "Break" } ] }"#);
    assert_eq!(flow.unwrap(), Flow::Break);

    let (flow, _) = run_program(r#"{ "main": [ { "t": "Expr", "expr": "1 + 1" } ] }"#);
    assert_eq!(flow.unwrap(), Flow::Stop);
}

#[test]
fn test_record_fields_are_read_only() {
    let program = r#"{
        "records": [ { "name": "contract", "kind": "law", "fields": { "amount": 1 } } ],
        "main": [ { "t": "Assign", "target": "contract.amount", "value": "2" } ]
    }"#;
    let err = run_err(program);
    assert_eq!(err.kind, ErrorKind::InvalidType);
    assert!(err.message.contains("read-only"));
}
