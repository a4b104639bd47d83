//! Tests for classes: construction, fields, methods and inheritance

use super::helpers::{lines, run_err, run_ok};
use crate::executor::errors::ErrorKind;

const ACCOUNT: &str = r#"
    {
        "name": "Account",
        "constructor": {
            "name": "constructor",
            "params": ["owner", { "name": "balance", "default": "0" }],
            "body": [
                { "t": "Assign", "target": "this.owner", "value": "owner" },
                { "t": "Assign", "target": "this.balance", "value": "balance" }
            ]
        },
        "methods": [
            {
                "name": "deposit",
                "params": ["amount"],
                "body": [
                    { "t": "Assign", "target": "this.balance", "value": "this.balance + amount" },
                    { "t": "Return", "value": "this.balance" }
                ]
            }
        ]
    }
"#;

fn with_account(main: &str) -> String {
    format!(r#"{{ "classes": [ {} ], "main": {} }}"#, ACCOUNT, main)
}

#[test]
fn test_constructor_and_methods() {
    let program = with_account(
        r#"[
            { "t": "Declare", "name": "a", "value": "Account(\"Ann\", 10)" },
            { "t": "Expr", "expr": "a.deposit(5)" },
            { "t": "Print", "value": "a.owner + \" has \" + a.balance" },
            { "t": "Declare", "name": "b", "value": "Account(\"Bob\")" },
            { "t": "Print", "value": "b.balance" }
        ]"#,
    );
    assert_eq!(run_ok(&program), lines(&["Ann has 15", "0"]));
}

#[test]
fn test_instances_are_shared_by_reference() {
    let program = with_account(
        r#"[
            { "t": "Declare", "name": "a", "value": "Account(\"Ann\")" },
            { "t": "Declare", "name": "b", "value": "a" },
            { "t": "Assign", "target": "b.balance", "value": "7" },
            { "t": "Print", "value": "a.balance" }
        ]"#,
    );
    assert_eq!(run_ok(&program), lines(&["7"]));
}

#[test]
fn test_constructor_arity() {
    let program = with_account(r#"[ { "t": "Expr", "expr": "Account()" } ]"#);
    let err = run_err(&program);
    assert_eq!(err.kind, ErrorKind::ArgumentCount);
    assert!(err.message.contains("Account.constructor"), "message: {}", err.message);
}

#[test]
fn test_missing_member() {
    let program = with_account(
        r#"[
            { "t": "Declare", "name": "a", "value": "Account(\"Ann\")" },
            { "t": "Print", "value": "a.balanse" }
        ]"#,
    );
    let err = run_err(&program);
    assert_eq!(err.kind, ErrorKind::FieldNotDefined);
    assert!(err.message.contains("Account instance"), "message: {}", err.message);
    assert!(err.message.contains("balance"), "message: {}", err.message);
}

/* ===================== Inheritance ===================== */

const ANIMALS: &str = r#"{
    "classes": [
        {
            "name": "Animal",
            "constructor": {
                "name": "constructor",
                "params": ["name"],
                "body": [ { "t": "Assign", "target": "this.name", "value": "name" } ]
            },
            "methods": [
                { "name": "speak", "body": [ { "t": "Return", "value": "\"...\"" } ] },
                { "name": "describe", "body": [ { "t": "Return", "value": "this.name + \" says \" + this.speak()" } ] }
            ]
        },
        {
            "name": "Dog",
            "parent": "Animal",
            "methods": [
                { "name": "speak", "body": [ { "t": "Return", "value": "\"woof\"" } ] }
            ]
        }
    ],
    "main": [
        { "t": "Declare", "name": "generic", "value": "Animal(\"Cat\")" },
        { "t": "Declare", "name": "rex", "value": "Dog(\"Rex\")" },
        { "t": "Print", "value": "generic.describe()" },
        { "t": "Print", "value": "rex.describe()" },
        { "t": "Print", "value": "rex.name" }
    ]
}"#;

#[test]
fn test_inherited_methods_dispatch_on_the_instance() {
    assert_eq!(
        run_ok(ANIMALS),
        lines(&["Cat says ...", "Rex says woof", "Rex"])
    );
}

#[test]
fn test_parent_constructor_consumes_leading_arguments() {
    // Dog has no constructor of its own: only the parent's argument is accepted
    let program = ANIMALS.replace(r#"Dog(\"Rex\")"#, r#"Dog(\"Rex\", 3)"#);
    let err = run_err(&program);
    assert_eq!(err.kind, ErrorKind::ArgumentCount);
}

#[test]
fn test_child_constructor_runs_after_the_parent() {
    let program = r#"{
        "classes": [
            {
                "name": "Base",
                "constructor": {
                    "name": "constructor",
                    "params": ["label"],
                    "body": [
                        { "t": "Assign", "target": "this.label", "value": "label" },
                        { "t": "Assign", "target": "this.order", "value": "\"base\"" }
                    ]
                }
            },
            {
                "name": "Derived",
                "parent": "Base",
                "constructor": {
                    "name": "constructor",
                    "params": ["label", "size"],
                    "body": [
                        { "t": "Assign", "target": "this.size", "value": "size" },
                        { "t": "Assign", "target": "this.order", "value": "this.order + \", derived\"" }
                    ]
                }
            }
        ],
        "main": [
            { "t": "Declare", "name": "d", "value": "Derived(\"box\", 3)" },
            { "t": "Print", "value": "d.label + \" \" + d.size" },
            { "t": "Print", "value": "d.order" }
        ]
    }"#;
    assert_eq!(run_ok(program), lines(&["box 3", "base, derived"]));
}
