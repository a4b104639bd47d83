use super::*;
use crate::executor::errors::ErrorKind;
use crate::parser::split_tokens;

fn compile_text(text: &str) -> LangResult<CompiledExpr> {
    let tokens = split_tokens(text).expect("split failed");
    compile(&tokens, &SourceLocation::new("test.law", 1, text))
}

fn postfix(text: &str) -> String {
    compile_text(text)
        .unwrap_or_else(|e| panic!("compile of '{}' failed: {}", text, e))
        .postfix()
}

fn error_message(text: &str) -> String {
    let err = compile_text(text).expect_err("expected a syntax error");
    assert_eq!(err.kind, ErrorKind::Syntax);
    err.message
}

/* ===================== Precedence ===================== */

#[test]
fn test_multiplication_binds_tighter() {
    assert_eq!(postfix("2 + 3 * 4"), "2 3 4 * +");
    assert_eq!(postfix("(2 + 3) * 4"), "2 3 + 4 *");
}

#[test]
fn test_unary_minus() {
    assert_eq!(postfix("-5 + 3"), "5 - 3 +");
    assert_eq!(postfix("5 - -3"), "5 3 - -");
}

#[test]
fn test_power_is_right_associative() {
    assert_eq!(postfix("2 ^ 3 ^ 2"), "2 3 2 ^ ^");
    assert_eq!(postfix("-2 ^ 2"), "2 2 ^ -");
}

#[test]
fn test_left_associative_chain() {
    assert_eq!(postfix("10 - 4 - 3"), "10 4 - 3 -");
    assert_eq!(postfix("8 / 2 / 2"), "8 2 / 2 /");
}

#[test]
fn test_logical_precedence() {
    assert_eq!(postfix("not a and b"), "a not b and");
    assert_eq!(postfix("a or b and c"), "a b c and or");
    assert_eq!(postfix("not x = 1"), "x 1 = not");
    assert_eq!(postfix("a > 1 and b <= 2"), "a 1 > b 2 <= and");
}

/* ===================== Calls And Attributes ===================== */

#[test]
fn test_calls() {
    assert_eq!(postfix("f()"), "[ f()");
    assert_eq!(postfix("f(1, 2 + 3)"), "[ 1 2 3 + f()");
    assert_eq!(postfix("1 + max(a, b) * 2"), "1 [ a b max() 2 * +");
}

#[test]
fn test_attribute_chains() {
    assert_eq!(postfix("a.b.c"), "a .b . .c .");
    assert_eq!(postfix("a.m(x).f"), "a .m . [ x ]() .f .");
    assert_eq!(postfix("-a.b + 1"), "a .b . - 1 +");
    assert_eq!(postfix("f(x).y"), "[ x f() .y .");
}

#[test]
fn test_background_marks_call_deferred() {
    assert_eq!(postfix("in background f(1)"), "[ 1 f()& in background");
    assert_eq!(postfix("in background worker"), "[ worker()& in background");
    assert_eq!(postfix("in background case.fee(2)"), "case .fee . [ 2 ]()& in background");
    assert_eq!(postfix("wait in background f()"), "[ f()& in background wait");
}

#[test]
fn test_wait_applies_to_attribute_chain() {
    assert_eq!(postfix("wait jobs.first + 1"), "jobs .first . wait 1 +");
}

#[test]
fn test_string_literals() {
    assert_eq!(postfix(r#""a b" + x"#), r#""a b" x +"#);
    let compiled = compile_text(r#""and or (""#).unwrap();
    assert_eq!(compiled.items, vec![Rpn::Push(Val::str("and or ("))]);
}

#[test]
fn test_literals() {
    let compiled = compile_text("true or empty = 2.5").unwrap();
    assert_eq!(
        compiled.items,
        vec![
            Rpn::Push(Val::Bool(true)),
            Rpn::Push(Val::Null),
            Rpn::Push(Val::Float(2.5)),
            Rpn::Op(Operator::Eq),
            Rpn::Op(Operator::Or),
        ]
    );
}

/* ===================== Diagnostics ===================== */

#[test]
fn test_missing_brackets_are_counted() {
    assert!(error_message("((1 + 2").contains("missing 2 closing brackets ')'"));
    assert!(error_message("(1 + 2").contains("missing 1 closing bracket ')'"));
    assert!(error_message("1 + 2))").contains("missing 2 opening brackets '('"));
}

#[test]
fn test_trailing_operator() {
    assert!(error_message("1 +").contains("ends with '+'"));
    assert!(error_message("not").contains("ends with 'not'"));
}

#[test]
fn test_back_to_back_operators() {
    assert!(error_message("1 * / 2").contains("'/' cannot follow '*'"));
    assert!(error_message("a not b").contains("missing operator"));
    assert!(error_message("1 2").contains("missing operator before '2'"));
    assert_eq!(postfix("1 * -2"), "1 2 - *");
}

#[test]
fn test_background_pair_must_be_complete() {
    assert!(error_message("in f()").contains("'in' must be followed by 'background'"));
    assert!(error_message("background f()").contains("'background' must be preceded by 'in'"));
    assert!(error_message("in background 1 + 2").contains("must be applied to a call"));
}

#[test]
fn test_malformed_and_oversized_numbers() {
    // Lexer tokens may carry shapes the text splitter never produces
    let location = SourceLocation::new("test.law", 1, "1e5");
    let err = compile(&["1e5".to_string()], &location).expect_err("1e5 is not a number");
    assert_eq!(err.kind, ErrorKind::Syntax);
    assert!(err.message.contains("invalid number '1e5'"), "message: {}", err.message);

    assert!(error_message("99999999999999999999").contains("out of range"));
}

#[test]
fn test_unrecognized_and_unbalanced() {
    assert!(error_message("a @ b").contains("unrecognized token '@'"));
    assert!(error_message(r#""open"#).contains("unbalanced string quote"));
    assert!(error_message("(1, 2)").contains("only allowed between call arguments"));
    assert!(error_message("").contains("empty expression"));
    assert!(error_message("()").contains("empty brackets"));
}

#[test]
fn test_error_names_expression_and_location() {
    let err = compile_text("1 + * 2").unwrap_err();
    assert!(err.message.contains("'1 + * 2'"));
    let location = err.location.expect("location attached");
    assert_eq!(location.file, "test.law");
    assert_eq!(location.line, 1);
}
